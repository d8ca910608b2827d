//! Data model shared across the engine: `ViewState`, window-function tags,
//! and the `CalcRequest`/`CalcResult` types that flow between the
//! Compositor, Scheduler and ResultCache (spec §3).

use crate::bar_markers::BarMarkers;

/// Fixed numerical tolerance for time equality, used everywhere two column
/// times are compared. The only time-equality test used system-wide.
pub const DELTA: f64 = 1e-10;

/// Extra pre-computed columns on either side of the visible area, as a
/// fraction of the graph width.
pub const LOOKAHEAD_FRACTION: f64 = 0.10;

/// Supported window functions (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowFunction {
    Rectangular,
    Hann,
    Hamming,
    Bartlett,
    Blackman,
    Nuttall,
    Kaiser,
    DolphChebyshev,
}

impl WindowFunction {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.to_ascii_lowercase().as_str() {
            "rect" | "rectangular" | "none" => WindowFunction::Rectangular,
            "hann" | "hanning" => WindowFunction::Hann,
            "hamming" => WindowFunction::Hamming,
            "bartlett" | "triangular" => WindowFunction::Bartlett,
            "blackman" => WindowFunction::Blackman,
            "nuttall" => WindowFunction::Nuttall,
            "kaiser" => WindowFunction::Kaiser,
            "dolph" | "chebyshev" | "dolph-chebyshev" => WindowFunction::DolphChebyshev,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            WindowFunction::Rectangular => "rectangular",
            WindowFunction::Hann => "hann",
            WindowFunction::Hamming => "hamming",
            WindowFunction::Bartlett => "bartlett",
            WindowFunction::Blackman => "blackman",
            WindowFunction::Nuttall => "nuttall",
            WindowFunction::Kaiser => "kaiser",
            WindowFunction::DolphChebyshev => "dolph",
        }
    }
}

/// Process-wide view parameters. Mutated only by the Controller; every
/// worker request carries an immutable snapshot instead of reading this
/// live (spec §5, §9).
#[derive(Debug, Clone)]
pub struct ViewState {
    pub disp_width: usize,
    pub disp_height: usize,
    /// Pixel column, within `[0, disp_width)`, that represents "now".
    pub crosshair_column: usize,
    pub crosshair_disabled: bool,
    pub disp_time: f64,
    pub min_freq: f64,
    pub max_freq: f64,
    pub min_y: i32,
    pub max_y: i32,
    /// Pixel columns per second.
    pub ppsec: f64,
    pub fps: f64,
    pub fft_freq: f64,
    pub window_function: WindowFunction,
    pub dyn_range_db: f64,
    pub auto_brightness: bool,
    pub playing: bool,
    pub sample_rate: f64,
    pub bar_markers: BarMarkers,
    pub piano_overlay: bool,
    pub staff_overlay: bool,
    pub guitar_overlay: bool,
    pub freq_axes: bool,
    pub time_axes: bool,
    pub fullscreen: bool,
}

impl ViewState {
    /// Seconds represented by one pixel column.
    pub fn secpp(&self) -> f64 {
        1.0 / self.ppsec
    }

    /// Number of pixel rows of spectrogram data in one column.
    pub fn maglen(&self) -> usize {
        (self.max_y - self.min_y + 1).max(1) as usize
    }

    /// LOOKAHEAD: extra pre-computed columns on either side of the visible
    /// area, ~10% of the graph width (spec §9 open question: kept fixed).
    pub fn lookahead(&self) -> usize {
        ((self.disp_width as f64) * LOOKAHEAD_FRACTION).ceil() as usize
    }

    /// Clamp invalid parameter combinations silently (spec §7).
    pub fn clamp(&mut self) {
        if self.min_freq < self.fft_freq {
            self.min_freq = self.fft_freq;
        }
        let nyquist = self.sample_rate / 2.0;
        if self.max_freq > nyquist {
            self.max_freq = nyquist;
        }
        if self.min_freq >= self.max_freq {
            self.min_freq = (self.max_freq - 1.0).max(self.fft_freq).min(self.max_freq * 0.5);
        }
        if self.dyn_range_db > -6.0 {
            self.dyn_range_db = -6.0;
        }
        if self.ppsec <= 0.0 {
            self.ppsec = 1.0;
        }
        if self.fps <= 0.0 {
            self.fps = 1.0;
        }
    }

    /// Time represented by screen pixel column `x` (may be negative or
    /// beyond `disp_width` for lookahead columns), snapped to the secpp
    /// grid so every request/column time is a multiple of `secpp`.
    pub fn time_for_column(&self, x: isize) -> f64 {
        let secpp = self.secpp();
        let raw = self.disp_time + (x as f64 - self.crosshair_column as f64) * secpp;
        (raw / secpp).round() * secpp
    }

    /// Inverse of `time_for_column`, rounded to the nearest pixel.
    pub fn column_for_time(&self, t: f64) -> isize {
        let secpp = self.secpp();
        self.crosshair_column as isize + ((t - self.disp_time) / secpp).round() as isize
    }
}

/// Immutable request for one column's spectrum, created by the Compositor
/// and consumed by exactly one worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalcRequest {
    pub t: f64,
    pub fft_freq: f64,
    pub window: WindowFunction,
}

impl CalcRequest {
    pub fn matches_params(&self, other: &CalcRequest) -> bool {
        (self.fft_freq - other.fft_freq).abs() < DELTA && self.window == other.window
    }

    pub fn same(&self, other: &CalcRequest) -> bool {
        (self.t - other.t).abs() < DELTA && self.matches_params(other)
    }
}
