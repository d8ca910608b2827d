//! CLI surface (spec §6): one or more audio files plus the flag set that
//! seeds `ViewState` before the first frame is painted.
//!
//! Grounded on the teacher's `clap`-derive-free interactive picker in
//! `main.rs` (which prompts for device/channels/rate); generalized into a
//! proper `clap::Parser` struct covering every flag the spec names, since
//! this crate replaces interactive prompting with non-interactive flags.

use std::path::PathBuf;

use clap::Parser;

use crate::view_state::WindowFunction;

#[derive(Parser, Debug)]
#[command(name = "spettro", about = "Logarithmic-frequency spectrogram viewer", version)]
pub struct Cli {
    /// Audio file(s) to display.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Start playing immediately.
    #[arg(short = 'p', long = "autoplay")]
    pub autoplay: bool,

    /// Exit when playback reaches the end of the file.
    #[arg(short = 'e', long = "exit-at-end")]
    pub exit_at_end: bool,

    /// Window width in pixels.
    #[arg(short = 'w', long = "width", default_value_t = 640)]
    pub width: usize,

    /// Window height in pixels.
    #[arg(short = 'h', long = "height", default_value_t = 480)]
    pub height: usize,

    /// Minimum displayed frequency, Hz.
    #[arg(short = 'n', long = "min-freq", default_value_t = 27.5)]
    pub min_freq: f64,

    /// Maximum displayed frequency, Hz.
    #[arg(short = 'x', long = "max-freq", default_value_t = 14080.0)]
    pub max_freq: f64,

    /// Dynamic range floor, dB (must stay <= -6).
    #[arg(short = 'd', long = "dyn-range", default_value_t = -100.0)]
    pub dyn_range_db: f64,

    /// Scroll rate, frames per second.
    #[arg(short = 'S', long = "fps", default_value_t = 30.0)]
    pub fps: f64,

    /// Horizontal resolution, pixel columns per second.
    #[arg(short = 'P', long = "ppsec", default_value_t = 25.0)]
    pub ppsec: f64,

    /// FFT frequency resolution, Hz (inverse of the analysis window).
    #[arg(short = 'f', long = "fft-freq", default_value_t = 5.0)]
    pub fft_freq: f64,

    /// Window function: rect, hann, hamming, bartlett, blackman, nuttall, kaiser, dolph.
    #[arg(short = 'W', long = "window", default_value = "kaiser")]
    pub window: String,

    /// Start time, seconds.
    #[arg(short = 't', long = "start-time", default_value_t = 0.0)]
    pub start_time: f64,

    /// Fix the auto-brightness ceiling instead of tracking the loudest column seen.
    #[arg(short = 'M', long = "logmax")]
    pub logmax: Option<f64>,

    /// Overlay a piano keyboard next to the frequency axis.
    #[arg(short = 'k', long = "piano")]
    pub piano: bool,

    /// Overlay musical staff lines.
    #[arg(short = 's', long = "staff")]
    pub staff: bool,

    /// Overlay guitar string lines.
    #[arg(short = 'g', long = "guitar")]
    pub guitar: bool,

    /// Show the frequency axis.
    #[arg(short = 'a', long = "freq-axis")]
    pub freq_axis: bool,

    /// Show the time axis.
    #[arg(short = 'A', long = "time-axis")]
    pub time_axis: bool,

    /// Left bar-line marker, seconds.
    #[arg(short = 'l', long = "left-bar")]
    pub left_bar: Option<f64>,

    /// Right bar-line marker, seconds.
    #[arg(short = 'r', long = "right-bar")]
    pub right_bar: Option<f64>,

    /// Beats per bar (for beat-line subdivision).
    #[arg(short = 'b', long = "beats-per-bar", default_value_t = 1)]
    pub beats_per_bar: u32,

    /// Worker thread count (default: number of CPUs).
    #[arg(short = 'j', long = "max-threads")]
    pub max_threads: Option<usize>,

    /// Write a screenshot to this PNG path and exit.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

impl Cli {
    /// Parse the window-function flag, falling back to Kaiser (the
    /// spec-default) with a warning on an unrecognised key.
    pub fn window_function(&self) -> WindowFunction {
        WindowFunction::parse(&self.window).unwrap_or_else(|| {
            log::warn!("cli: unrecognised window key '{}', falling back to kaiser", self.window);
            WindowFunction::Kaiser
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_invocation() {
        let cli = Cli::parse_from(["spettro", "song.wav"]);
        assert_eq!(cli.files.len(), 1);
        assert_eq!(cli.window_function(), WindowFunction::Kaiser);
        assert_eq!(cli.width, 640);
    }

    #[test]
    fn parses_full_flag_set() {
        let cli = Cli::parse_from([
            "spettro", "-p", "-e", "-w", "800", "-h", "600", "-n", "20", "-x", "8000", "-d", "-90",
            "-S", "60", "-P", "50", "-f", "10", "-W", "hann", "-t", "1.5", "-M", "0.0", "-k", "-s",
            "-g", "-a", "-A", "-l", "1.0", "-r", "2.0", "-b", "4", "-j", "2", "-o", "out.png", "song.wav",
        ]);
        assert!(cli.autoplay);
        assert!(cli.exit_at_end);
        assert_eq!(cli.window_function(), WindowFunction::Hann);
        assert_eq!(cli.left_bar, Some(1.0));
        assert_eq!(cli.max_threads, Some(2));
        assert_eq!(cli.output.as_deref(), Some(std::path::Path::new("out.png")));
    }
}
