//! Stateless FFT kernel: real-to-halfcomplex transform plus magnitude
//! conversion (spec §4.4). Generalizes the teacher's `compute_spectrum`
//! (`fft_analysis.rs`) from a fixed Blackman-Harris/rustfft pipeline to an
//! arbitrary window / `realfft` pipeline with a process-wide planner lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use realfft::{RealFftPlanner, RealToComplex};

use crate::window_table::WindowTable;

/// Good FFT lengths factor as `2^a * 3^b * 5^c * 7^d * {1, 11, 13}` (never
/// both 11 and 13 at once).
fn is_good_length(n: usize) -> bool {
    if n == 0 {
        return false;
    }
    let mut m = n;
    for p in [2usize, 3, 5, 7] {
        while m % p == 0 {
            m /= p;
        }
    }
    m == 1 || m == 11 || m == 13
}

/// Pick the smallest `speclen ≈ sample_rate / (2*fft_freq)` such that
/// `2*speclen` is an efficient FFT length. Searches outward from the ideal
/// value, preferring the next-higher candidate on ties (spec §4.4, §8
/// testable property 5).
pub fn speclen_for(fft_freq: f64, sample_rate: f64) -> usize {
    let ideal = (sample_rate / (2.0 * fft_freq)).round().max(1.0) as usize;
    if is_good_length(ideal) {
        return ideal;
    }
    let mut delta = 1usize;
    loop {
        let hi = ideal + delta;
        if is_good_length(hi) {
            return hi;
        }
        if ideal > delta {
            let lo = ideal - delta;
            if is_good_length(lo) {
                return lo;
            }
        }
        delta += 1;
    }
}

/// The fft_freq a given speclen actually represents, the inverse of
/// `speclen_for`'s rounding.
pub fn effective_fft_freq(speclen: usize, sample_rate: f64) -> f64 {
    sample_rate / (2.0 * speclen as f64)
}

type PlanCache = HashMap<usize, Arc<dyn RealToComplex<f64>>>;

/// Real-FFT planner + cache. Plan *creation* is serialised by a
/// process-wide mutex (the underlying library's planner is not
/// re-entrant); plan *execution* (`process`) takes `&self` and is safe to
/// call concurrently from multiple worker threads given distinct buffers.
pub struct SpectrumEngine {
    planner: Mutex<RealFftPlanner<f64>>,
    plans: Mutex<PlanCache>,
}

impl SpectrumEngine {
    pub fn new() -> Self {
        Self {
            planner: Mutex::new(RealFftPlanner::new()),
            plans: Mutex::new(HashMap::new()),
        }
    }

    fn plan_for(&self, len: usize) -> Arc<dyn RealToComplex<f64>> {
        {
            let plans = self.plans.lock().unwrap();
            if let Some(p) = plans.get(&len) {
                return p.clone();
            }
        }
        let mut planner = self.planner.lock().unwrap();
        let mut plans = self.plans.lock().unwrap();
        plans
            .entry(len)
            .or_insert_with(|| planner.plan_fft_forward(len))
            .clone()
    }

    /// Compute the magnitude spectrum of a centred `2*speclen`-sample audio
    /// window, optionally multiplied by `window` coefficients (skipped for
    /// rectangular). Returns `speclen + 1` bins from DC to Nyquist.
    ///
    /// An FFT planner failure is unrecoverable per spec §7 ("Unusable FFT
    /// plan — fatal"): this is the one place in the engine allowed to
    /// panic rather than propagate a soft error.
    pub fn compute(&self, audio: &[f64], window: Option<&[f64]>, speclen: usize) -> Vec<f64> {
        let n = 2 * speclen;
        assert_eq!(audio.len(), n, "SpectrumEngine::compute: audio window length mismatch");

        let plan = self.plan_for(n);
        let mut indata = plan.make_input_vec();
        match window {
            Some(w) => {
                for i in 0..n {
                    indata[i] = audio[i] * w[i];
                }
            }
            None => indata.copy_from_slice(audio),
        }

        let mut spectrum = plan.make_output_vec();
        let mut scratch = plan.make_scratch_vec();
        plan.process_with_scratch(&mut indata, &mut spectrum, &mut scratch)
            .expect("FFT planner failure is fatal");

        let mut out = vec![0.0_f64; speclen + 1];
        out[0] = spectrum[0].re.abs();
        for k in 1..speclen {
            out[k] = spectrum[k].re.hypot(spectrum[k].im);
        }
        out[speclen] = spectrum[speclen].re.abs();
        out
    }

    /// Convenience wrapper that looks up window coefficients from `table`.
    pub fn compute_windowed(
        &self,
        audio: &[f64],
        window_fn: crate::view_state::WindowFunction,
        speclen: usize,
        table: &WindowTable,
    ) -> Vec<f64> {
        let coeffs = table.get(window_fn, 2 * speclen);
        self.compute(audio, coeffs.as_deref().map(|v| v.as_slice()), speclen)
    }
}

impl Default for SpectrumEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view_state::WindowFunction;

    #[test]
    fn good_length_accepts_known_efficient_sizes() {
        assert!(is_good_length(1024));
        assert!(is_good_length(4410)); // 2*3^2*5*7^2
        assert!(is_good_length(11 * 16));
        assert!(is_good_length(13 * 16));
        assert!(!is_good_length(11 * 13));
    }

    #[test]
    fn speclen_for_matches_scenario_s1() {
        // spec.md S1: fft_freq=5, sample_rate=44100 -> speclen=4410.
        assert_eq!(speclen_for(5.0, 44100.0), 4410);
    }

    #[test]
    fn speclen_round_trip_stays_within_one_good_length_step() {
        let sr = 48000.0;
        for fft_freq in [1.0, 3.3, 5.0, 20.0, 50.0] {
            let speclen = speclen_for(fft_freq, sr);
            let eff = effective_fft_freq(speclen, sr);
            let back = speclen_for(eff, sr);
            assert!((speclen as isize - back as isize).unsigned_abs() <= 1);
        }
    }

    #[test]
    fn compute_dc_term_of_constant_signal() {
        let engine = SpectrumEngine::new();
        let speclen = 8;
        let audio = vec![1.0_f64; 2 * speclen];
        let out = engine.compute(&audio, None, speclen);
        assert_eq!(out.len(), speclen + 1);
        // A DC-only input produces all its energy in bin 0.
        assert!(out[0] > 0.0);
        for &v in &out[1..] {
            assert!(v < out[0]);
        }
    }

    #[test]
    fn compute_windowed_skips_coefficients_for_rectangular() {
        let engine = SpectrumEngine::new();
        let table = WindowTable::new();
        let speclen = 4;
        let audio: Vec<f64> = (0..2 * speclen).map(|i| i as f64).collect();
        let rect = engine.compute_windowed(&audio, WindowFunction::Rectangular, speclen, &table);
        let direct = engine.compute(&audio, None, speclen);
        assert_eq!(rect, direct);
    }
}
