//! Bar-line markers (spec §3, §4.5) and the column-overlay classification
//! they drive.

use crate::view_state::DELTA;

/// What a given column should be painted as, driven by `BarMarkers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnOverlay {
    None,
    /// Bar line: three pixels wide when `beats_per_bar > 1`.
    Bar,
    /// Beat line within a bar: always one pixel wide.
    Beat,
}

/// Optional left/right bar-line markers plus a beats-per-bar count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarMarkers {
    pub left_t: Option<f64>,
    pub right_t: Option<f64>,
    pub beats_per_bar: u32,
}

impl BarMarkers {
    pub fn new() -> Self {
        Self {
            left_t: None,
            right_t: None,
            beats_per_bar: 1,
        }
    }

    /// Set the left marker. If both markers end up equal, both revert to
    /// undefined (spec §3 invariant, §8 S8).
    pub fn set_left(&mut self, t: f64) {
        self.left_t = Some(t);
        self.normalize();
    }

    pub fn set_right(&mut self, t: f64) {
        self.right_t = Some(t);
        self.normalize();
    }

    pub fn clear_left(&mut self) {
        self.left_t = None;
    }

    pub fn clear_right(&mut self) {
        self.right_t = None;
    }

    fn normalize(&mut self) {
        if let (Some(l), Some(r)) = (self.left_t, self.right_t) {
            if (l - r).abs() < DELTA {
                self.left_t = None;
                self.right_t = None;
            }
        }
    }

    /// Classify time `t` against the current markers. `secpp` is used as
    /// the tolerance window so that a time within half a column's width of
    /// an exact bar/beat position still counts as landing on it (spec §8
    /// S5: "columns whose time matches ... are marked").
    pub fn classify(&self, t: f64, secpp: f64) -> ColumnOverlay {
        let tol = (secpp / 2.0).max(DELTA);
        match (self.left_t, self.right_t) {
            (Some(l), Some(r)) if (r - l).abs() > DELTA => {
                let bar_width = (r - l).abs();
                let rel = (t - l) / bar_width;
                let rel_round = rel.round();
                if (rel - rel_round).abs() * bar_width < tol {
                    return ColumnOverlay::Bar;
                }
                if self.beats_per_bar > 1 {
                    let beat_width = bar_width / self.beats_per_bar as f64;
                    let beat_rel = (t - l) / beat_width;
                    let beat_round = beat_rel.round();
                    // Multiples of beats_per_bar are already bar lines.
                    if beat_round.rem_euclid(self.beats_per_bar as f64) != 0.0
                        && (beat_rel - beat_round).abs() * beat_width < tol
                    {
                        return ColumnOverlay::Beat;
                    }
                }
                ColumnOverlay::None
            }
            (Some(l), None) | (None, Some(l)) => {
                if (t - l).abs() < tol {
                    ColumnOverlay::Bar
                } else {
                    ColumnOverlay::None
                }
            }
            (None, None) => ColumnOverlay::None,
        }
    }
}

impl Default for BarMarkers {
    fn default() -> Self {
        Self::new()
    }
}
