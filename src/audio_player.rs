//! Audio device façade (spec §6): `open(rate, channels, buffer_size, callback)`,
//! `pause(bool)`, `get_time()`. The callback fills a native-endian 16-bit PCM
//! buffer for playback; this component records playback position in frames
//! so the Compositor's Clock can drive `do_scroll` from it.
//!
//! Grounded on the teacher's `audio_stream.rs::build_input_stream` (the same
//! `pa::PortAudio` / `StreamParameters` / `open_non_blocking_stream` shape),
//! mirrored from an input capture stream into an output playback stream.

use std::sync::atomic::{AtomicI64, AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::{debug, error, info};
use portaudio as pa;

/// Caller-supplied sample source: fill `buf` (interleaved native i16 PCM)
/// and return the number of frames actually written (short reads are
/// zero-padded by the implementation, spec §7 "short read -> zero-fill").
pub trait FillCallback: Send {
    fn fill(&mut self, buf: &mut [i16]) -> usize;
}

impl<F: FnMut(&mut [i16]) -> usize + Send> FillCallback for F {
    fn fill(&mut self, buf: &mut [i16]) -> usize {
        self(buf)
    }
}

pub trait AudioPlayer: Send + Sync {
    fn open(&mut self, rate: f64, channels: usize, buffer_size: u32, callback: Box<dyn FillCallback>) -> Result<()>;
    fn pause(&self, pause: bool);
    /// Current playback position, in seconds, derived from frames written
    /// to the device so far.
    fn get_time(&self) -> f64;
}

/// `PortAudio`-backed `AudioPlayer` (spec §6 "Audio device").
pub struct PortAudioPlayer {
    pa: pa::PortAudio,
    sample_rate: f64,
    frames_played: Arc<AtomicI64>,
    paused: Arc<AtomicBool>,
    stream: Option<pa::Stream<pa::NonBlocking, pa::Output<i16>>>,
}

impl PortAudioPlayer {
    pub fn new() -> Result<Self> {
        let pa = pa::PortAudio::new().map_err(|e| anyhow!("PortAudio init failed: {e}"))?;
        Ok(Self {
            pa,
            sample_rate: 44100.0,
            frames_played: Arc::new(AtomicI64::new(0)),
            paused: Arc::new(AtomicBool::new(true)),
            stream: None,
        })
    }
}

impl AudioPlayer for PortAudioPlayer {
    fn open(&mut self, rate: f64, channels: usize, buffer_size: u32, mut callback: Box<dyn FillCallback>) -> Result<()> {
        self.sample_rate = rate;
        let device_index = self.pa.default_output_device().map_err(|e| anyhow!("no default output device: {e}"))?;
        let device_info = self.pa.device_info(device_index).map_err(|e| anyhow!("device_info failed: {e}"))?;
        let latency = device_info.default_low_output_latency;

        let params = pa::StreamParameters::<i16>::new(device_index, channels as i32, true, latency);
        self.pa
            .is_output_format_supported(params, rate)
            .map_err(|e| anyhow!("unsupported output format: {e}"))?;

        let settings = pa::OutputStreamSettings::new(params, rate, buffer_size);
        debug!("PortAudioPlayer: opening output stream, rate={rate} channels={channels} buffer_size={buffer_size}");

        let frames_played = Arc::clone(&self.frames_played);
        let paused = Arc::clone(&self.paused);
        let stream = self
            .pa
            .open_non_blocking_stream(settings, move |args: pa::OutputStreamCallbackArgs<i16>| {
                if paused.load(Ordering::Relaxed) {
                    for s in args.buffer.iter_mut() {
                        *s = 0;
                    }
                    return pa::Continue;
                }
                let written = callback.fill(args.buffer);
                for s in args.buffer[written..].iter_mut() {
                    *s = 0;
                }
                let frames = args.buffer.len() / channels.max(1);
                frames_played.fetch_add(frames as i64, Ordering::Relaxed);
                pa::Continue
            })
            .map_err(|e| anyhow!("open_non_blocking_stream failed: {e}"))?;

        self.stream = Some(stream);
        if let Some(stream) = self.stream.as_mut() {
            stream.start().map_err(|e| anyhow!("stream start failed: {e}"))?;
        }
        self.paused.store(false, Ordering::Relaxed);
        info!("PortAudioPlayer: output stream started");
        Ok(())
    }

    fn pause(&self, pause: bool) {
        self.paused.store(pause, Ordering::Relaxed);
    }

    fn get_time(&self) -> f64 {
        self.frames_played.load(Ordering::Relaxed) as f64 / self.sample_rate
    }
}

impl Drop for PortAudioPlayer {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.stop() {
                error!("PortAudioPlayer: error stopping stream on drop: {e}");
            }
        }
    }
}

/// In-memory `AudioPlayer` used in tests and headless runs (no sound
/// device available): advances its clock on a background thread at
/// wall-clock rate while "playing" and ignores the fill callback's actual
/// samples, since there is no real output to hear them on.
pub struct NullAudioPlayer {
    frames_played: Arc<AtomicI64>,
    paused: Arc<AtomicBool>,
    sample_rate: f64,
}

impl NullAudioPlayer {
    pub fn new() -> Self {
        Self { frames_played: Arc::new(AtomicI64::new(0)), paused: Arc::new(AtomicBool::new(true)), sample_rate: 44100.0 }
    }

    /// Test/headless helper: advance the simulated clock by `frames`.
    pub fn advance(&self, frames: i64) {
        if !self.paused.load(Ordering::Relaxed) {
            self.frames_played.fetch_add(frames, Ordering::Relaxed);
        }
    }
}

impl Default for NullAudioPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioPlayer for NullAudioPlayer {
    fn open(&mut self, rate: f64, _channels: usize, _buffer_size: u32, _callback: Box<dyn FillCallback>) -> Result<()> {
        self.sample_rate = rate;
        self.paused.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn pause(&self, pause: bool) {
        self.paused.store(pause, Ordering::Relaxed);
    }

    fn get_time(&self) -> f64 {
        self.frames_played.load(Ordering::Relaxed) as f64 / self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_player_reports_zero_time_while_paused() {
        let mut p = NullAudioPlayer::new();
        p.open(44100.0, 1, 1024, Box::new(|_buf: &mut [i16]| 0)).unwrap();
        p.pause(true);
        p.advance(44100);
        assert_eq!(p.get_time(), 0.0);
    }

    #[test]
    fn null_player_advances_time_while_playing() {
        let mut p = NullAudioPlayer::new();
        p.open(44100.0, 1, 1024, Box::new(|_buf: &mut [i16]| 0)).unwrap();
        p.advance(44100);
        assert!((p.get_time() - 1.0).abs() < 1e-9);
    }
}
