//! Ordered cache of computed column spectra, keyed by time (spec §4.2).
//! Generalizes the teacher's retain/sort pattern in
//! `fft_analysis.rs::compute_spectrum` from a one-shot filter into a
//! standing, evictable cache.

use std::sync::Arc;

use log::debug;

use crate::view_state::{WindowFunction, DELTA};

/// Immutable once produced; owned by the cache after insertion.
#[derive(Debug, Clone)]
pub struct CalcResult {
    pub t: f64,
    pub fft_freq: f64,
    pub window: WindowFunction,
    pub speclen: usize,
    /// Linear magnitude, length `speclen + 1` (indices 0..=Nyquist).
    pub magnitude: Arc<Vec<f64>>,
}

/// Ordered sequence of `CalcResult` by `t` ascending.
pub struct ResultCache {
    entries: Vec<CalcResult>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Evict entries older than `eviction_edge`, then insert `result` in
    /// time order. Per spec §9's open question, this crate keeps a stale
    /// `(fft_freq, window)` entry rather than evicting on parameter
    /// mismatch — only time-based eviction happens here; `recall` is what
    /// filters by current parameters.
    pub fn remember(&mut self, result: CalcResult, eviction_edge: f64) {
        self.entries.retain(|e| e.t >= eviction_edge - DELTA);

        let is_duplicate = self.entries.iter().any(|e| {
            (e.t - result.t).abs() < DELTA
                && (e.fft_freq - result.fft_freq).abs() < DELTA
                && e.window == result.window
        });
        if is_duplicate {
            debug!("ResultCache: dropping duplicate result for t={}", result.t);
            return;
        }

        let pos = self.entries.iter().position(|e| e.t > result.t).unwrap_or(self.entries.len());
        self.entries.insert(pos, result);
    }

    /// Linear scan from the head, matching `|t' - t| < DELTA`; `fft_freq`
    /// and `window` are wildcards when `None`. Uses the tail-time
    /// shortcut: if the query time is past the last entry, returns `None`
    /// immediately without scanning.
    pub fn recall(&self, t: f64, fft_freq: Option<f64>, window: Option<WindowFunction>) -> Option<&CalcResult> {
        if let Some(tail) = self.entries.last() {
            if t > tail.t + DELTA {
                return None;
            }
        } else {
            return None;
        }
        self.entries.iter().find(|e| {
            (e.t - t).abs() < DELTA
                && fft_freq.map_or(true, |f| (e.fft_freq - f).abs() < DELTA)
                && window.map_or(true, |w| e.window == w)
        })
    }

    pub fn drop_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(t: f64, fft_freq: f64, window: WindowFunction) -> CalcResult {
        CalcResult {
            t,
            fft_freq,
            window,
            speclen: 4,
            magnitude: Arc::new(vec![0.0; 5]),
        }
    }

    #[test]
    fn remember_inserts_in_time_order() {
        let mut cache = ResultCache::new();
        cache.remember(result(3.0, 5.0, WindowFunction::Hann), f64::MIN);
        cache.remember(result(1.0, 5.0, WindowFunction::Hann), f64::MIN);
        cache.remember(result(2.0, 5.0, WindowFunction::Hann), f64::MIN);
        let ts: Vec<f64> = (0..cache.len()).map(|_| 0.0).collect();
        let _ = ts;
        assert_eq!(cache.entries.iter().map(|e| e.t).collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn remember_drops_exact_duplicate() {
        let mut cache = ResultCache::new();
        cache.remember(result(1.0, 5.0, WindowFunction::Hann), f64::MIN);
        cache.remember(result(1.0, 5.0, WindowFunction::Hann), f64::MIN);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn remember_keeps_stale_parameter_variant() {
        let mut cache = ResultCache::new();
        cache.remember(result(1.0, 5.0, WindowFunction::Hann), f64::MIN);
        cache.remember(result(1.0, 5.0, WindowFunction::Kaiser), f64::MIN);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn recall_uses_tail_shortcut_and_wildcards() {
        let mut cache = ResultCache::new();
        cache.remember(result(1.0, 5.0, WindowFunction::Hann), f64::MIN);
        assert!(cache.recall(1.0, None, None).is_some());
        assert!(cache.recall(1.0, Some(5.0), Some(WindowFunction::Hann)).is_some());
        assert!(cache.recall(1.0, Some(6.0), None).is_none());
        assert!(cache.recall(100.0, None, None).is_none());
    }

    #[test]
    fn remember_evicts_entries_before_edge() {
        let mut cache = ResultCache::new();
        cache.remember(result(1.0, 5.0, WindowFunction::Hann), f64::MIN);
        cache.remember(result(2.0, 5.0, WindowFunction::Hann), f64::MIN);
        cache.remember(result(10.0, 5.0, WindowFunction::Hann), 5.0);
        assert_eq!(cache.entries.iter().map(|e| e.t).collect::<Vec<_>>(), vec![10.0]);
    }

    // Property-based coverage of spec §8 property 4: after `remember(r)`
    // followed by advancing the eviction edge, no retained entry precedes it.
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn monotone_eviction_holds_for_any_insert_sequence(
                entries in prop::collection::vec((0i64..100, 0i64..200), 0..200)
            ) {
                let mut cache = ResultCache::new();
                let mut edge = f64::MIN;
                for (t, edge_bump) in entries {
                    cache.remember(result(t as f64, 5.0, WindowFunction::Hann), edge);
                    for e in &cache.entries {
                        prop_assert!(e.t >= edge - DELTA);
                    }
                    edge = edge.max(edge_bump as f64 - 100.0);
                }
            }

            #[test]
            fn remains_sorted_by_time(
                times in prop::collection::vec(0i64..50, 0..100)
            ) {
                let mut cache = ResultCache::new();
                for t in times {
                    cache.remember(result(t as f64, 5.0, WindowFunction::Hann), f64::MIN);
                }
                for w in cache.entries.windows(2) {
                    prop_assert!(w[0].t <= w[1].t);
                }
            }
        }
    }
}
