//! Display composer (spec §4.5): owns the framebuffer (via the
//! `VideoBackend` façade), scrolls it, paints columns from the
//! `ResultCache`, applies the logarithmic-frequency interpolation, colour
//! map, and row/column overlays.
//!
//! Generalizes the teacher's `MyApp::update` painting loop (`plot.rs`)
//! from redrawing a bar chart every frame into scrolling and incrementally
//! repainting a pixel-column framebuffer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, warn};

use crate::bar_markers::ColumnOverlay;
use crate::palette::Palette;
use crate::result_cache::{CalcResult, ResultCache};
use crate::scheduler::Scheduler;
use crate::view_state::{CalcRequest, ViewState, DELTA};
use crate::video_backend::VideoBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOverlayColour {
    White,
    Black,
}

/// Which rows hold a piano/staff/guitar overlay line, recomputed whenever
/// `(min_freq, max_freq, maglen)` changes (spec §4.5).
struct RowOverlay {
    min_freq: f64,
    max_freq: f64,
    maglen: usize,
    /// `row -> (colour, thickness in rows)`.
    rows: Vec<(usize, RowOverlayColour, usize)>,
}

impl RowOverlay {
    fn empty() -> Self {
        Self { min_freq: -1.0, max_freq: -1.0, maglen: 0, rows: Vec::new() }
    }

    fn stale_for(&self, view: &ViewState) -> bool {
        self.min_freq != view.min_freq || self.max_freq != view.max_freq || self.maglen != view.maglen()
    }

    fn recompute(view: &ViewState) -> Self {
        let maglen = view.maglen();
        let freq_to_row = |f: f64| -> Option<usize> {
            if f < view.min_freq || f > view.max_freq || maglen < 2 {
                return None;
            }
            let idx = ((f.ln() - view.min_freq.ln()) / (view.max_freq.ln() - view.min_freq.ln())
                * (maglen - 1) as f64)
                .round();
            if idx < 0.0 {
                None
            } else {
                Some(idx as usize)
            }
        };

        let thick = if view.piano_overlay { 3 } else { 1 };
        let mut rows = Vec::new();

        if view.piano_overlay {
            for midi in 0..128 {
                let freq = 440.0 * 2f64.powf((midi as f64 - 69.0) / 12.0);
                if let Some(row) = freq_to_row(freq) {
                    let colour = if is_black_key(midi) { RowOverlayColour::Black } else { RowOverlayColour::White };
                    rows.push((row, colour, 1));
                }
            }
        }
        if view.staff_overlay {
            for &freq in STAFF_LINE_FREQS {
                if let Some(row) = freq_to_row(freq) {
                    rows.push((row, RowOverlayColour::White, thick));
                }
            }
        }
        if view.guitar_overlay {
            for &freq in GUITAR_STRING_FREQS {
                if let Some(row) = freq_to_row(freq) {
                    rows.push((row, RowOverlayColour::White, thick));
                }
            }
        }

        Self { min_freq: view.min_freq, max_freq: view.max_freq, maglen, rows }
    }

    fn colour_at(&self, row: usize) -> Option<RowOverlayColour> {
        for &(r, colour, thickness) in &self.rows {
            let half = thickness / 2;
            if row + half >= r && row <= r + half {
                return Some(colour);
            }
        }
        None
    }
}

fn is_black_key(midi: u32) -> bool {
    matches!(midi % 12, 1 | 3 | 6 | 8 | 10)
}

/// Treble + bass clef staff lines (standard five-line notation, spec
/// §4.5's "piano, staff, guitar" row overlay set).
const STAFF_LINE_FREQS: &[f64] = &[
    164.81, // E3 (bass bottom line)
    196.00, // G3
    246.94, // B3
    293.66, // D4
    349.23, // F4 (bass top line)
    329.63, // E4 (treble bottom line)
    392.00, // G4
    493.88, // B4
    587.33, // D5
    698.46, // F5 (treble top line)
];

/// Standard 6-string guitar open tuning.
const GUITAR_STRING_FREQS: &[f64] = &[82.41, 110.00, 146.83, 196.00, 246.94, 329.63];

/// Interpolate the linear spectrum (length `speclen+1`) into log-frequency
/// magnitude rows `[from_y, to_y)` (spec §4.5's numeric heart).
pub fn interpolate(
    result: &CalcResult,
    view: &ViewState,
    from_y: usize,
    to_y: usize,
) -> Vec<f64> {
    let speclen = result.speclen;
    let maglen = view.maglen();
    let nyquist = view.sample_rate / 2.0;

    let freq_at = |k: usize| -> f64 {
        if maglen <= 1 {
            return view.min_freq;
        }
        view.min_freq * (view.max_freq / view.min_freq).powf(k as f64 / (maglen - 1) as f64)
    };
    let specindex = |k: usize| -> f64 { freq_at(k) * speclen as f64 / nyquist };

    let mut out = Vec::with_capacity(to_y - from_y);
    for k in from_y..to_y {
        let this = specindex(k);
        let next = specindex(k + 1);

        if this > speclen as f64 {
            out.push(f64::NEG_INFINITY);
            continue;
        }

        if next > this + 1.0 {
            let lo = this.max(0.0);
            let hi = next.min(speclen as f64);
            let lo_bin = lo.floor() as usize;
            let hi_bin = hi.floor().min(speclen as f64) as usize;
            let mut sum = 0.0;
            let mut count = 0.0;
            for bin in lo_bin..=hi_bin.min(speclen) {
                let weight = if bin == lo_bin {
                    1.0 - (lo - lo_bin as f64)
                } else if bin == hi_bin {
                    hi - hi_bin as f64
                } else {
                    1.0
                };
                if weight > 0.0 {
                    sum += result.magnitude[bin] * weight;
                    count += weight;
                }
            }
            out.push((sum / count.max(1e-12)).log10());
        } else {
            let lo_bin = this.floor() as usize;
            let frac = this - lo_bin as f64;
            let hi_bin = (lo_bin + 1).min(speclen);
            let v = result.magnitude[lo_bin] * (1.0 - frac) + result.magnitude[hi_bin] * frac;
            out.push(v.log10());
        }
    }
    out
}

/// Frame buffer owner, scroll driver, paint/overlay engine (spec §4.5).
pub struct Compositor {
    view: Arc<RwLock<ViewState>>,
    results: Mutex<ResultCache>,
    scheduler: Arc<Scheduler>,
    backend: Arc<dyn VideoBackend>,
    palette: Palette,
    logmax: Mutex<f64>,
    row_overlay: Mutex<RowOverlay>,
    bad_colour_count: AtomicU64,
}

impl Compositor {
    pub fn new(view: Arc<RwLock<ViewState>>, scheduler: Arc<Scheduler>, backend: Arc<dyn VideoBackend>) -> Self {
        Self {
            view,
            results: Mutex::new(ResultCache::new()),
            scheduler,
            backend,
            palette: Palette::heat(),
            logmax: Mutex::new(f64::MIN),
            row_overlay: Mutex::new(RowOverlay::empty()),
            bad_colour_count: AtomicU64::new(0),
        }
    }

    pub fn results(&self) -> &Mutex<ResultCache> {
        &self.results
    }

    fn eviction_edge(view: &ViewState) -> f64 {
        view.disp_time - (view.lookahead() as f64 + view.disp_width as f64 / 2.0) * view.secpp()
    }

    /// Controller calls this when a `CalcResult` arrives from a worker.
    pub fn accept_result(&self, result: CalcResult) {
        let view = self.view.read().unwrap().clone();
        let stale = (result.fft_freq - view.fft_freq).abs() >= DELTA || result.window != view.window_function;
        let t = result.t;
        {
            let mut results = self.results.lock().unwrap();
            results.remember(result, Self::eviction_edge(&view));
        }
        if stale {
            debug!("Compositor: accepted stale-parameter result for t={t} (kept per spec open-question default)");
            return;
        }
        let x = view.column_for_time(t);
        if (0..view.disp_width as isize).contains(&x) {
            self.repaint_column(&view, x, 0, view.maglen(), false);
        }
    }

    /// Scroll driver entry point (spec §4.6 Clock ticks call this).
    pub fn do_scroll(&self, player_time: f64) {
        let (view, delta_px) = {
            let mut guard = self.view.write().unwrap();
            let secpp = guard.secpp();
            let new_time = (player_time / secpp).round() * secpp;
            if (new_time - guard.disp_time).abs() < DELTA {
                return;
            }
            let delta_px = ((new_time - guard.disp_time) / secpp).round() as isize;
            guard.disp_time = new_time;
            (guard.clone(), delta_px)
        };

        if delta_px.unsigned_abs() >= view.disp_width {
            self.repaint_display(false);
            return;
        }

        let w = view.disp_width;
        if delta_px > 0 {
            let keep = w - delta_px as usize;
            self.backend.with_surface(&mut |s| s.blit(delta_px, keep, 0));
        } else if delta_px < 0 {
            let shift = (-delta_px) as usize;
            let keep = w - shift;
            self.backend.with_surface(&mut |s| s.blit(0, keep, shift));
        }
        self.backend.update_rect(0, 0, w, view.disp_height);

        let lookahead = view.lookahead() as isize;
        if delta_px > 0 {
            let from_x = w as isize - delta_px;
            for x in (from_x - lookahead).max(-(lookahead))..(w as isize + lookahead) {
                self.repaint_column(&view, x, 0, view.maglen(), false);
            }
        } else if delta_px < 0 {
            let to_x = -delta_px;
            for x in (-lookahead)..(to_x + lookahead).min(w as isize + lookahead) {
                self.repaint_column(&view, x, 0, view.maglen(), false);
            }
        }
    }

    /// Repaint every column in `[left_x - LOOKAHEAD, right_x + LOOKAHEAD]`
    /// (spec §4.5). If `refresh_only`, only columns that already hold
    /// spectral data are repainted.
    pub fn repaint_display(&self, refresh_only: bool) {
        let view = self.view.read().unwrap().clone();
        let lookahead = view.lookahead() as isize;
        let maglen = view.maglen();
        for x in -lookahead..(view.disp_width as isize + lookahead) {
            self.repaint_column(&view, x, 0, maglen, refresh_only);
        }
    }

    /// Repaint one column (spec §4.5 `repaint_column`).
    fn repaint_column(&self, view: &ViewState, x: isize, from_y: usize, to_y: usize, refresh_only: bool) {
        if x < -(view.lookahead() as isize) || x >= view.disp_width as isize + view.lookahead() as isize {
            return;
        }
        let t = view.time_for_column(x);

        let overlay = view.bar_markers.classify(t, view.secpp());
        if overlay != ColumnOverlay::None {
            if refresh_only {
                return;
            }
            let colour = match overlay {
                ColumnOverlay::Bar if view.bar_markers.beats_per_bar > 1 => [255, 255, 255],
                ColumnOverlay::Bar => [255, 255, 255],
                ColumnOverlay::Beat => [200, 200, 200],
                ColumnOverlay::None => unreachable!(),
            };
            self.paint_overlay_column(x, from_y, to_y, colour);
            return;
        }

        let results = self.results.lock().unwrap();
        match results.recall(t, Some(view.fft_freq), Some(view.window_function)) {
            Some(result) => {
                let result = result.clone();
                drop(results);
                self.paint_column(view, x, from_y, to_y, &result);
            }
            None => {
                drop(results);
                if refresh_only {
                    return;
                }
                self.paint_background_column(x, from_y, to_y);
                self.scheduler.schedule(
                    CalcRequest { t, fft_freq: view.fft_freq, window: view.window_function },
                    &self.results.lock().unwrap(),
                );
            }
        }
    }

    fn paint_background_column(&self, x: isize, from_y: usize, to_y: usize) {
        if x < 0 {
            return;
        }
        self.backend.with_surface(&mut |s| {
            s.fill_rect(x as i32, from_y as i32, 1, to_y.saturating_sub(from_y), [0, 0, 0]);
        });
    }

    fn paint_overlay_column(&self, x: isize, from_y: usize, to_y: usize, colour: [u8; 3]) {
        if x < 0 {
            return;
        }
        self.backend.with_surface(&mut |s| {
            s.fill_rect(x as i32, from_y as i32, 1, to_y.saturating_sub(from_y), colour);
        });
    }

    /// Paint one column's spectral data (spec §4.5 `paint_column`).
    fn paint_column(&self, view: &ViewState, x: isize, from_y: usize, to_y: usize, result: &CalcResult) {
        if x < 0 {
            return;
        }
        let logmag = interpolate(result, view, from_y, to_y);
        let col_max = logmag.iter().cloned().filter(|v| v.is_finite()).fold(f64::MIN, f64::max);
        if col_max.is_finite() {
            let mut logmax = self.logmax.lock().unwrap();
            if col_max > *logmax {
                *logmax = col_max;
            }
        }
        let logmax = *self.logmax.lock().unwrap();

        {
            let mut overlay = self.row_overlay.lock().unwrap();
            if overlay.stale_for(view) {
                *overlay = RowOverlay::recompute(view);
            }
        }
        let overlay = self.row_overlay.lock().unwrap();
        let crosshair = !view.crosshair_disabled && x == view.crosshair_column as isize;

        self.backend.with_surface(&mut |s| {
            for (i, &logm) in logmag.iter().enumerate() {
                let row = from_y + i;
                let db = 20.0 * (logm - logmax);
                let mut colour = self.palette.colour_for_db(db, view.dyn_range_db);
                if colour == crate::palette::BAD_COLOUR {
                    self.bad_colour_count.fetch_add(1, Ordering::Relaxed);
                }
                if let Some(rc) = overlay.colour_at(row) {
                    colour = match rc {
                        RowOverlayColour::White => [255, 255, 255],
                        RowOverlayColour::Black => [0, 0, 0],
                    };
                }
                if crosshair {
                    colour = [colour[0].saturating_add(40), colour[1], colour[2].saturating_add(40)];
                }
                // y=0 is the lowest frequency row; the backend's y axis
                // grows downward, so row `maglen-1` is painted at pixel y=0.
                let py = (view.maglen() - 1 - row) as i32;
                s.put_pixel(x as i32, py, colour);
            }
        });
        if self.bad_colour_count.load(Ordering::Relaxed) > 0 {
            warn!("Compositor: {} bad (non-finite) magnitude pixels this column", self.bad_colour_count.swap(0, Ordering::Relaxed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_cache::AudioCache;
    use crate::bar_markers::BarMarkers;
    use crate::spectrum_engine::SpectrumEngine;
    use crate::video_backend::EguiVideoBackend;
    use crate::view_state::WindowFunction;
    use crate::window_table::WindowTable;

    fn sample_view() -> ViewState {
        ViewState {
            disp_width: 640,
            disp_height: 480,
            crosshair_column: 320,
            crosshair_disabled: false,
            disp_time: 10.0,
            min_freq: 27.5,
            max_freq: 14080.0,
            min_y: 0,
            max_y: 479,
            ppsec: 25.0,
            fps: 30.0,
            fft_freq: 5.0,
            window_function: WindowFunction::Kaiser,
            dyn_range_db: -100.0,
            auto_brightness: true,
            playing: false,
            sample_rate: 44100.0,
            bar_markers: BarMarkers::new(),
            piano_overlay: false,
            staff_overlay: false,
            guitar_overlay: false,
            freq_axes: false,
            time_axes: false,
            fullscreen: false,
        }
    }

    fn scheduler_for(view: Arc<RwLock<ViewState>>) -> Arc<Scheduler> {
        let (tx, _rx) = crossbeam_channel::unbounded();
        Scheduler::new(
            view,
            Arc::new(AudioCache::new(1)),
            Arc::new(WindowTable::new()),
            Arc::new(SpectrumEngine::new()),
            44100.0,
            tx,
        )
    }

    #[test]
    fn interpolation_top_endpoint_matches_nyquist_bin() {
        // spec §8 testable property 6: with maglen = speclen+1 and
        // max_freq = Nyquist, specindex(maglen-1) lands exactly on bin
        // `speclen`, so interpolate should return log10(spec[speclen]).
        let mut v = sample_view();
        let speclen = 256;
        v.max_freq = v.sample_rate / 2.0;
        v.min_y = 0;
        v.max_y = speclen as i32; // maglen = speclen + 1
        let magnitude: Vec<f64> = (0..=speclen).map(|i| (i + 1) as f64).collect();
        let result = CalcResult {
            t: 1.0,
            fft_freq: v.fft_freq,
            window: v.window_function,
            speclen,
            magnitude: Arc::new(magnitude),
        };
        let maglen = v.maglen();
        let out = interpolate(&result, &v, maglen - 1, maglen);
        assert!((out[0] - (result.magnitude[speclen]).log10()).abs() < 1e-9);
    }

    #[test]
    fn scroll_by_n_then_minus_n_restores_framebuffer_on_unaffected_columns() {
        let view = Arc::new(RwLock::new(sample_view()));
        let backend = Arc::new(EguiVideoBackend::new(640, 480));
        backend.init(640, 480, false).unwrap();

        backend.with_surface(&mut |s| {
            for x in 0..640 {
                s.put_pixel(x as i32, 0, [(x % 256) as u8, 0, 0]);
            }
        });
        let before = backend.snapshot_rgba().2;

        let n = 5usize;
        backend.with_surface(&mut |s| s.blit(n as i32, 640 - n, 0));
        backend.with_surface(&mut |s| s.blit(0, 640 - n, n as i32));

        let after = backend.snapshot_rgba().2;
        for x in n..(640 - n) {
            let i = x * 4;
            assert_eq!(before[i], after[i], "column {x} changed after scroll round-trip");
        }
        let _ = scheduler_for(view);
    }

    #[test]
    fn row_overlay_recomputes_only_when_stale() {
        let mut v = sample_view();
        v.piano_overlay = true;
        let overlay = RowOverlay::recompute(&v);
        assert!(!overlay.stale_for(&v));
        v.min_freq += 1.0;
        assert!(overlay.stale_for(&v));
    }
}
