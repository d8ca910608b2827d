//! Pre-emptive audio cache (spec §4.1): keeps a contiguous decoded window
//! of audio in both native-channel 16-bit and mono-float form, movable by
//! `reposition`, readable concurrently by any thread via `read`.
//!
//! Generalizes the teacher's `CircularBuffer` (`audio_stream.rs`): same
//! push/resize-under-lock discipline, but a slide window instead of a ring,
//! and a second derived mono-float buffer kept in lock-step for zero-copy
//! FFT reads (spec §9 design note: "worth preserving for latency").

use std::sync::RwLock;

use log::{debug, warn};

use crate::audio_source::{AudioSource, Frames, SampleFormat};
use crate::view_state::ViewState;

/// Extra margin, in columns, folded into the cache window on either side
/// of the visible display (spec §4.1's `LOOKAHEAD` term in `W_len`).
const LOOKAHEAD_COLUMNS_MARGIN: f64 = 1.0;

struct Window {
    start: i64,
    len: usize,
    native: Vec<i16>,
    mono: Vec<f32>,
    channels: usize,
}

impl Window {
    fn empty(channels: usize) -> Self {
        Self { start: 0, len: 0, native: Vec::new(), mono: Vec::new(), channels }
    }
}

/// Single shared decoded-audio window. Readers (workers, the playback
/// callback) take the RW lock shared; `reposition` (main thread only)
/// takes it exclusively.
pub struct AudioCache {
    window: RwLock<Window>,
}

impl AudioCache {
    pub fn new(channels: usize) -> Self {
        Self { window: RwLock::new(Window::empty(channels)) }
    }

    /// Desired `[W_start, W_start + W_len)` for `view` against `source`
    /// (spec §4.1 formulas).
    fn desired_window(view: &ViewState, source: &dyn AudioSource) -> (i64, usize) {
        let lookahead = view.lookahead() as f64;
        let secpp = view.secpp();
        let w_len_secs = (view.disp_width as f64 + 2.0 * lookahead) * secpp
            + LOOKAHEAD_COLUMNS_MARGIN / view.fft_freq;
        let w_len = (w_len_secs * source.sample_rate()).ceil().max(1.0) as usize;

        let w_start_secs = view.disp_time
            - (view.disp_width as f64 / 2.0 + lookahead) * secpp
            - 1.0 / (2.0 * view.fft_freq);
        let w_start = (w_start_secs * source.sample_rate()).round() as i64;

        (w_start, w_len)
    }

    /// Recompute and refill the cache window for `view`. Only the main
    /// thread calls this (spec §4.1, §5). If the size is unchanged and the
    /// new range overlaps the old, only the exposed tail/head is refilled;
    /// otherwise the whole window is reallocated and refilled.
    pub fn reposition(&self, view: &ViewState, source: &dyn AudioSource) {
        let (new_start, new_len) = Self::desired_window(view, source);
        let mut win = self.window.write().unwrap();

        if new_len != win.len {
            debug!("AudioCache: resizing window {} -> {} frames", win.len, new_len);
            *win = Window::empty(win.channels);
            win.start = new_start;
            win.len = new_len;
            win.native = vec![0i16; new_len * win.channels];
            win.mono = vec![0.0f32; new_len];
            fill_range(&mut win, 0, new_len, new_start, source);
            return;
        }

        let old_start = win.start;
        let shift = new_start - old_start;
        if shift == 0 {
            return;
        }

        let overlap_start = old_start.max(new_start);
        let overlap_end = (old_start + win.len as i64).min(new_start + new_len as i64);
        if overlap_end <= overlap_start {
            debug!("AudioCache: new window disjoint from old, full refill");
            win.start = new_start;
            fill_range(&mut win, 0, new_len, new_start, source);
            return;
        }

        let ch = win.channels;
        let overlap_len = (overlap_end - overlap_start) as usize;
        let src_off = (overlap_start - old_start) as usize;
        let dst_off = (overlap_start - new_start) as usize;

        if shift > 0 {
            for i in 0..overlap_len {
                let s = src_off + i;
                let d = dst_off + i;
                for c in 0..ch {
                    win.native[d * ch + c] = win.native[s * ch + c];
                }
                win.mono[d] = win.mono[s];
            }
        } else {
            for i in (0..overlap_len).rev() {
                let s = src_off + i;
                let d = dst_off + i;
                for c in 0..ch {
                    win.native[d * ch + c] = win.native[s * ch + c];
                }
                win.mono[d] = win.mono[s];
            }
        }

        win.start = new_start;
        if dst_off > 0 {
            fill_range(&mut win, 0, dst_off, new_start, source);
        }
        let tail_start = dst_off + overlap_len;
        if tail_start < new_len {
            fill_range(&mut win, tail_start, new_len, new_start, source);
        }
    }

    /// Read `len` frames starting at absolute frame `start`, in `format`.
    /// Silence-pads any part of the range outside the file or outside the
    /// currently cached window (spec §4.1; a wholly-miss is a soft error,
    /// logged and reported via the returned `bool`: `true` means the read
    /// was a full cache hit).
    pub fn read(&self, start: i64, len: usize, format: SampleFormat) -> (Frames, bool) {
        let win = self.window.read().unwrap();
        let win_end = win.start + win.len as i64;
        let req_end = start + len as i64;

        if req_end <= win.start || start >= win_end {
            warn!("AudioCache::read: range [{start}, {req_end}) wholly outside cache window [{}, {win_end})", win.start);
            return (silence(format, win.channels, len), false);
        }

        let overlap_start = start.max(win.start);
        let overlap_end = req_end.min(win_end);
        let overlap_len = (overlap_end - overlap_start) as usize;
        let hit = overlap_start == start && overlap_end == req_end;
        if !hit {
            debug!("AudioCache::read: partial hit, silence-padding non-overlapping side");
        }

        let dst_off = (overlap_start - start) as usize;
        let src_off = (overlap_start - win.start) as usize;
        let ch = win.channels;

        match format {
            SampleFormat::Native16 => {
                let mut out = vec![0i16; len * ch];
                out[dst_off * ch..(dst_off + overlap_len) * ch]
                    .copy_from_slice(&win.native[src_off * ch..(src_off + overlap_len) * ch]);
                (Frames::Native16(out), hit)
            }
            SampleFormat::MonoFloat => {
                let mut out = vec![0.0f32; len];
                out[dst_off..dst_off + overlap_len]
                    .copy_from_slice(&win.mono[src_off..src_off + overlap_len]);
                (Frames::MonoFloat(out), hit)
            }
        }
    }

    /// Serialise the native-channel buffer as a WAV file for debugging.
    pub fn dump(&self, path: &str, sample_rate: u32) -> anyhow::Result<()> {
        let win = self.window.read().unwrap();
        let spec = hound::WavSpec {
            channels: win.channels as u16,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &s in &win.native {
            writer.write_sample(s)?;
        }
        writer.finalize()?;
        Ok(())
    }
}

fn silence(format: SampleFormat, channels: usize, len: usize) -> Frames {
    match format {
        SampleFormat::Native16 => Frames::Native16(vec![0i16; len * channels]),
        SampleFormat::MonoFloat => Frames::MonoFloat(vec![0.0f32; len]),
    }
}

/// Fill `win.native`/`win.mono` indices `[from, to)` (relative to
/// `win_start`) by reading `source` at the corresponding absolute frames,
/// zero-filling on short decoder reads. Averages native channels down to
/// mono for the derived float buffer.
fn fill_range(win: &mut Window, from: usize, to: usize, win_start: i64, source: &dyn AudioSource) {
    let count = to - from;
    if count == 0 {
        return;
    }
    let abs_start = win_start + from as i64;
    let ch = win.channels;

    let (frames, available) = source
        .read(abs_start, count, SampleFormat::Native16)
        .unwrap_or((Frames::Native16(vec![0i16; count * ch]), 0));
    if available < count {
        debug!("AudioCache: short decoder read, zero-filling {} trailing frames", count - available);
    }

    if let Frames::Native16(samples) = frames {
        win.native[from * ch..to * ch].copy_from_slice(&samples);
        for i in 0..count {
            let base = i * ch;
            let sum: i32 = (0..ch).map(|c| samples[base + c] as i32).sum();
            win.mono[from + i] = (sum as f32 / ch as f32) / i16::MAX as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar_markers::BarMarkers;
    use crate::view_state::WindowFunction;

    struct ConstSource {
        frames: u64,
        rate: f64,
        channels: usize,
        value: i16,
    }

    impl AudioSource for ConstSource {
        fn length_frames(&self) -> u64 {
            self.frames
        }
        fn sample_rate(&self) -> f64 {
            self.rate
        }
        fn channels(&self) -> usize {
            self.channels
        }
        fn read(&self, start: i64, len: usize, format: SampleFormat) -> anyhow::Result<(Frames, usize)> {
            if start < 0 || start as u64 >= self.frames {
                return Ok((silence(format, self.channels, len), 0));
            }
            let available = (self.frames - start as u64).min(len as u64) as usize;
            match format {
                SampleFormat::Native16 => {
                    let mut out = vec![0i16; len * self.channels];
                    for i in 0..available {
                        for c in 0..self.channels {
                            out[i * self.channels + c] = self.value;
                        }
                    }
                    Ok((Frames::Native16(out), available))
                }
                SampleFormat::MonoFloat => {
                    let mut out = vec![0.0f32; len];
                    for v in out.iter_mut().take(available) {
                        *v = self.value as f32 / i16::MAX as f32;
                    }
                    Ok((Frames::MonoFloat(out), available))
                }
            }
        }
    }

    fn view() -> ViewState {
        ViewState {
            disp_width: 64,
            disp_height: 48,
            crosshair_column: 32,
            crosshair_disabled: false,
            disp_time: 5.0,
            min_freq: 27.5,
            max_freq: 14080.0,
            min_y: 0,
            max_y: 47,
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

    #[test]
    fn reposition_then_read_is_a_cache_hit_within_window() {
        let source = ConstSource { frames: 1_000_000, rate: 44100.0, channels: 1, value: 1000 };
        let cache = AudioCache::new(1);
        let v = view();
        cache.reposition(&v, &source);

        let start = (v.disp_time * v.sample_rate) as i64;
        let (frames, hit) = cache.read(start, 10, SampleFormat::Native16);
        assert!(hit);
        if let Frames::Native16(s) = frames {
            assert!(s.iter().all(|&x| x == 1000));
        } else {
            panic!("expected Native16");
        }
    }

    #[test]
    fn read_wholly_outside_cache_returns_silence() {
        let source = ConstSource { frames: 1_000_000, rate: 44100.0, channels: 1, value: 1000 };
        let cache = AudioCache::new(1);
        let v = view();
        cache.reposition(&v, &source);

        let (frames, hit) = cache.read(-1_000_000, 10, SampleFormat::MonoFloat);
        assert!(!hit);
        if let Frames::MonoFloat(s) = frames {
            assert!(s.iter().all(|&x| x == 0.0));
        } else {
            panic!("expected MonoFloat");
        }
    }

    #[test]
    fn reposition_with_unchanged_size_slides_window() {
        let source = ConstSource { frames: 1_000_000, rate: 44100.0, channels: 1, value: 1000 };
        let cache = AudioCache::new(1);
        let mut v = view();
        cache.reposition(&v, &source);
        let first_start = cache.window.read().unwrap().start;

        v.disp_time += 1.0;
        cache.reposition(&v, &source);
        let second_start = cache.window.read().unwrap().start;
        assert!(second_start > first_start);
    }
}
