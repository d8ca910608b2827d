//! Memoised window-function coefficients (spec §3 `WindowEntry`, §4.4).
//!
//! Arrays are computed once per `(function, length)` and never freed while
//! the process lives, since a worker may still hold a reference to one
//! (spec §3). Generalizes the teacher's hand-rolled
//! `apply_blackman_harris` (`fft_analysis.rs`) to the full function set.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex};

use log::debug;
use rayon::prelude::*;

use crate::view_state::WindowFunction;

const KAISER_BETA: f64 = 20.0;
const DOLPH_CHEBYSHEV_ATTEN_DB: f64 = 126.6;

#[derive(Hash, PartialEq, Eq, Clone, Copy)]
struct Key {
    function: WindowFunction,
    len: usize,
}

/// Cache of window coefficient arrays, keyed by `(function, length)`.
/// Rectangular windows have no coefficients: callers skip multiplication.
pub struct WindowTable {
    entries: Mutex<HashMap<Key, Arc<Vec<f64>>>>,
}

impl WindowTable {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return cached coefficients for `(function, len)`, computing and
    /// inserting them on first request. `None` for `Rectangular`, meaning
    /// "no windowing applied".
    pub fn get(&self, function: WindowFunction, len: usize) -> Option<Arc<Vec<f64>>> {
        if function == WindowFunction::Rectangular {
            return None;
        }
        let key = Key { function, len };
        {
            let entries = self.entries.lock().unwrap();
            if let Some(coeffs) = entries.get(&key) {
                return Some(coeffs.clone());
            }
        }
        let coeffs = Arc::new(compute_window(function, len));
        let mut entries = self.entries.lock().unwrap();
        let coeffs = entries.entry(key).or_insert(coeffs).clone();
        debug!("WindowTable: computed {} coefficients for {:?} len={}", coeffs.len(), function, len);
        Some(coeffs)
    }
}

impl Default for WindowTable {
    fn default() -> Self {
        Self::new()
    }
}

fn compute_window(function: WindowFunction, len: usize) -> Vec<f64> {
    match function {
        WindowFunction::Rectangular => vec![1.0; len],
        WindowFunction::Hann => cosine_sum(len, &[0.5, 0.5]),
        WindowFunction::Hamming => cosine_sum(len, &[0.54, 0.46]),
        WindowFunction::Blackman => cosine_sum(len, &[0.42, 0.5, 0.08]),
        WindowFunction::Nuttall => cosine_sum(len, &[0.355768, 0.487396, 0.144232, 0.012604]),
        WindowFunction::Bartlett => bartlett(len),
        WindowFunction::Kaiser => kaiser(len, KAISER_BETA),
        WindowFunction::DolphChebyshev => dolph_chebyshev(len, DOLPH_CHEBYSHEV_ATTEN_DB),
    }
}

/// Generalised cosine window: `a0 - a1*cos(2*pi*i/(N-1)) + a2*cos(4*pi*i/(N-1)) - ...`
/// alternating sign, covering Hann/Hamming/Blackman/Nuttall with one body.
fn cosine_sum(len: usize, coeffs: &[f64]) -> Vec<f64> {
    if len <= 1 {
        return vec![1.0; len];
    }
    let denom = (len - 1) as f64;
    (0..len)
        .into_par_iter()
        .map(|i| {
            let mut sign = 1.0;
            let mut sum = coeffs[0];
            for (h, &c) in coeffs.iter().enumerate().skip(1) {
                sign = -sign;
                sum += sign * c * (2.0 * PI * h as f64 * i as f64 / denom).cos();
            }
            sum
        })
        .collect()
}

fn bartlett(len: usize) -> Vec<f64> {
    if len <= 1 {
        return vec![1.0; len];
    }
    let denom = (len - 1) as f64;
    (0..len)
        .into_par_iter()
        .map(|i| 1.0 - (2.0 * i as f64 / denom - 1.0).abs())
        .collect()
}

fn bessel_i0(x: f64) -> f64 {
    let mut sum = 1.0;
    let mut term = 1.0;
    let mut k = 1.0;
    let half_x_sq = (x / 2.0).powi(2);
    while term > sum * 1e-15 && k < 200.0 {
        term *= half_x_sq / (k * k);
        sum += term;
        k += 1.0;
    }
    sum
}

fn kaiser(len: usize, beta: f64) -> Vec<f64> {
    if len <= 1 {
        return vec![1.0; len];
    }
    let denom = (len - 1) as f64;
    let i0_beta = bessel_i0(beta);
    (0..len)
        .into_par_iter()
        .map(|i| {
            let ratio = 2.0 * i as f64 / denom - 1.0;
            let arg = beta * (1.0 - ratio * ratio).max(0.0).sqrt();
            bessel_i0(arg) / i0_beta
        })
        .collect()
}

fn cheby_poly(n: f64, x: f64) -> f64 {
    if x.abs() <= 1.0 {
        (n * x.acos()).cos()
    } else {
        (n * x.acosh()).cosh()
    }
}

/// Dolph-Chebyshev window via the direct-summation formula (classic DSP
/// construction: inverse DFT of a Chebyshev-polynomial ripple spectrum).
fn dolph_chebyshev(len: usize, atten_db: f64) -> Vec<f64> {
    if len <= 1 {
        return vec![1.0; len];
    }
    let n = len as f64;
    let r = 10f64.powf(atten_db / 20.0);
    let x0 = (1.0 / (n - 1.0) * r.acosh()).cosh();
    let m = len / 2;
    let raw: Vec<f64> = (0..len)
        .into_par_iter()
        .map(|i| {
            let mut sum = 0.0;
            for k in 1..=m {
                let angle_arg = x0 * (PI * k as f64 / n).cos();
                let poly = cheby_poly(n - 1.0, angle_arg);
                sum += poly * (2.0 * PI * i as f64 * k as f64 / n).cos();
            }
            (1.0 + 2.0 * sum) / n
        })
        .collect();
    let max = raw.iter().cloned().fold(f64::MIN_POSITIVE, f64::max);
    raw.into_iter().map(|v| v / max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangular_has_no_coefficients() {
        let table = WindowTable::new();
        assert!(table.get(WindowFunction::Rectangular, 1024).is_none());
    }

    #[test]
    fn repeated_requests_share_the_same_allocation() {
        let table = WindowTable::new();
        let a = table.get(WindowFunction::Hann, 512).unwrap();
        let b = table.get(WindowFunction::Hann, 512).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn hann_window_is_symmetric_and_bounded() {
        let table = WindowTable::new();
        let w = table.get(WindowFunction::Hann, 8).unwrap();
        for i in 0..w.len() {
            assert!((w[i] - w[w.len() - 1 - i]).abs() < 1e-9);
            assert!(w[i] >= -1e-9 && w[i] <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn kaiser_window_peaks_at_center() {
        let table = WindowTable::new();
        let w = table.get(WindowFunction::Kaiser, 9).unwrap();
        let center = w[4];
        for (i, &v) in w.iter().enumerate() {
            if i != 4 {
                assert!(v <= center + 1e-9);
            }
        }
    }
}
