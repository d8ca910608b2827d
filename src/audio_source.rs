//! Audio decoder façade (spec §6, external interface). Decodes sample
//! frames for a given frame range on demand; everything above this trait
//! treats the concrete decoder as a pluggable collaborator.

use anyhow::{anyhow, Result};
use log::{debug, warn};

/// Sample frames read back from an `AudioSource`, in the format the caller
/// asked for.
pub enum Frames {
    /// Native-channel 16-bit PCM, interleaved.
    Native16(Vec<i16>),
    /// Mono float in `[-1, 1]`, channels averaged down.
    MonoFloat(Vec<f32>),
}

/// What format a `read` call should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Native16,
    MonoFloat,
}

/// Decodes sample frames for a given frame range on demand (spec §6).
/// A concrete implementation owns whatever decoder state it needs; the rest
/// of the engine only calls through this trait.
pub trait AudioSource: Send + Sync {
    fn length_frames(&self) -> u64;
    fn sample_rate(&self) -> f64;
    fn channels(&self) -> usize;

    /// Read `len` frames starting at `start` (may be negative or run past
    /// EOF; the AudioCache clamps before calling through). Returns the
    /// number of frames actually decoded; the caller zero-fills the rest.
    fn read(&self, start: i64, len: usize, format: SampleFormat) -> Result<(Frames, usize)>;
}

/// `hound`-backed WAV decoder (spec §3 "Supplemented Features": a concrete
/// decoder is needed to exercise AudioCache/Scheduler/Compositor
/// end-to-end). Grounded on the `hound`-based decode pattern used for STFT
/// input in `other_examples/giacomopiccinini-spectrs__src-stft-stft.rs.rs`.
pub struct WavAudioSource {
    samples: Vec<i16>,
    channels: usize,
    sample_rate: u32,
    length_frames: u64,
}

impl WavAudioSource {
    pub fn open(path: &str) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| anyhow!("failed to open WAV file {path}: {e}"))?;
        let spec = reader.spec();
        let channels = spec.channels as usize;
        if channels == 0 {
            return Err(anyhow!("{path}: WAV file declares zero channels"));
        }

        let samples: Vec<i16> = match spec.sample_format {
            hound::SampleFormat::Int => match spec.bits_per_sample {
                16 => reader.samples::<i16>().collect::<Result<_, _>>()?,
                8 => reader
                    .samples::<i8>()
                    .map(|s| s.map(|v| (v as i16) << 8))
                    .collect::<Result<_, _>>()?,
                24 | 32 => reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| (v >> 16) as i16))
                    .collect::<Result<_, _>>()?,
                other => return Err(anyhow!("{path}: unsupported bit depth {other}")),
            },
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
                .collect::<Result<_, _>>()?,
        };

        let length_frames = (samples.len() / channels) as u64;
        debug!(
            "WavAudioSource: opened {path} ({} frames, {channels} ch, {} Hz)",
            length_frames, spec.sample_rate
        );

        Ok(Self {
            samples,
            channels,
            sample_rate: spec.sample_rate,
            length_frames,
        })
    }
}

impl AudioSource for WavAudioSource {
    fn length_frames(&self) -> u64 {
        self.length_frames
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate as f64
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn read(&self, start: i64, len: usize, format: SampleFormat) -> Result<(Frames, usize)> {
        let req_end = start + len as i64;
        let file_end = self.length_frames as i64;

        // Clip [start, req_end) to [0, length_frames); only the part outside
        // the file is silence (spec §4.1: "negative start -> prepend
        // silence", "past end-of-file -> append silence"), not the whole
        // range just because `start` itself is negative.
        let overlap_start = start.max(0);
        let overlap_end = req_end.min(file_end);
        if overlap_end <= overlap_start {
            warn!("WavAudioSource::read: range [{start}, {req_end}) wholly outside file [0, {file_end})");
            return Ok((zero_frames(format, self.channels, len), 0));
        }

        let dst_off = (overlap_start - start) as usize;
        let overlap_len = (overlap_end - overlap_start) as usize;
        let ch = self.channels;

        match format {
            SampleFormat::Native16 => {
                let mut out = vec![0i16; len * ch];
                let src = &self.samples[(overlap_start as usize) * ch..(overlap_start as usize + overlap_len) * ch];
                out[dst_off * ch..(dst_off + overlap_len) * ch].copy_from_slice(src);
                Ok((Frames::Native16(out), overlap_len))
            }
            SampleFormat::MonoFloat => {
                let mut out = vec![0.0f32; len];
                for frame in 0..overlap_len {
                    let base = (overlap_start as usize + frame) * ch;
                    let sum: i32 = (0..ch).map(|c| self.samples[base + c] as i32).sum();
                    out[dst_off + frame] = (sum as f32 / ch as f32) / i16::MAX as f32;
                }
                Ok((Frames::MonoFloat(out), overlap_len))
            }
        }
    }
}

fn zero_frames(format: SampleFormat, channels: usize, len: usize) -> Frames {
    match format {
        SampleFormat::Native16 => Frames::Native16(vec![0i16; len * channels]),
        SampleFormat::MonoFloat => Frames::MonoFloat(vec![0.0f32; len]),
    }
}
