//! Work scheduler + FFT worker pool (spec §4.3): turns pixel-column
//! `CalcRequest`s into `CalcResult`s, honouring the current view so stale
//! work is never executed.
//!
//! Generalizes the teacher's poll-loop-with-mutex-and-sleep shape
//! (`fft_analysis.rs::start_fft_processing`, `audio_stream.rs::start_sampling_thread`)
//! from a single fixed-rate FFT thread into an N-worker pool pulling from
//! an ordered, filterable pending list.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use log::{debug, warn};

use crate::audio_cache::AudioCache;
use crate::audio_source::SampleFormat;
use crate::result_cache::{CalcResult, ResultCache};
use crate::spectrum_engine::{speclen_for, SpectrumEngine};
use crate::view_state::{CalcRequest, ViewState};
use crate::window_table::WindowTable;

/// How long an idle worker sleeps between `get_work` polls (spec §5).
const IDLE_SLEEP: Duration = Duration::from_millis(100);

struct SchedulerState {
    /// Sorted ascending by `t`; scanning from the head yields earliest
    /// centre-time first (spec §3 `PendingList` invariant).
    pending: Vec<CalcRequest>,
    in_flight: Vec<CalcRequest>,
}

/// Pending list + in-flight set + worker pool. Shared by reference between
/// the main thread (schedule/drop_all_work) and the worker threads
/// (get_work); all mutation of pending/in-flight happens under one mutex,
/// the worker body itself runs outside the lock (spec §5).
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    jobs_in_flight: AtomicUsize,
    view: Arc<RwLock<ViewState>>,
    audio: Arc<AudioCache>,
    windows: Arc<WindowTable>,
    engine: Arc<SpectrumEngine>,
    sample_rate: f64,
    result_tx: Sender<CalcResult>,
    shutdown: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        view: Arc<RwLock<ViewState>>,
        audio: Arc<AudioCache>,
        windows: Arc<WindowTable>,
        engine: Arc<SpectrumEngine>,
        sample_rate: f64,
        result_tx: Sender<CalcResult>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SchedulerState { pending: Vec::new(), in_flight: Vec::new() }),
            jobs_in_flight: AtomicUsize::new(0),
            view,
            audio,
            windows,
            engine,
            sample_rate,
            result_tx,
            shutdown: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Spawn `n` worker threads (default: number of CPUs, spec §4.3).
    pub fn spawn_workers(self: &Arc<Self>, n: usize) {
        let mut workers = self.workers.lock().unwrap();
        for _ in 0..n {
            let sched = Arc::clone(self);
            workers.push(thread::spawn(move || sched.worker_loop()));
        }
    }

    fn worker_loop(&self) {
        while !self.shutdown.load(Ordering::Relaxed) {
            let view_snapshot = self.view.read().unwrap().clone();
            match self.get_work(&view_snapshot) {
                Some(req) => self.compute_and_post(req, &view_snapshot),
                None => thread::sleep(IDLE_SLEEP),
            }
        }
    }

    fn compute_and_post(&self, req: CalcRequest, view: &ViewState) {
        let speclen = speclen_for(req.fft_freq, self.sample_rate);
        let centre_frame = (req.t * self.sample_rate).round() as i64;
        let start = centre_frame - speclen as i64;
        let len = 2 * speclen;

        let (frames, hit) = self.audio.read(start, len, SampleFormat::MonoFloat);
        if !hit {
            warn!("Scheduler: worker dropped request t={} (audio cache mispositioned)", req.t);
            self.finish(&req);
            return;
        }
        let audio = match frames {
            crate::audio_source::Frames::MonoFloat(v) => v,
            _ => unreachable!("read(..., SampleFormat::MonoFloat) always returns MonoFloat"),
        };
        let audio_f64: Vec<f64> = audio.iter().map(|&s| s as f64).collect();

        let magnitude = self.engine.compute_windowed(&audio_f64, req.window, speclen, &self.windows);
        let _ = view;
        let result = CalcResult {
            t: req.t,
            fft_freq: req.fft_freq,
            window: req.window,
            speclen,
            magnitude: Arc::new(magnitude),
        };
        self.finish(&req);
        if self.result_tx.send(result).is_err() {
            debug!("Scheduler: result channel closed, controller has shut down");
        }
    }

    fn finish(&self, req: &CalcRequest) {
        let mut state = self.state.lock().unwrap();
        state.in_flight.retain(|r| !r.same(req));
        self.jobs_in_flight.store(state.in_flight.len(), Ordering::Relaxed);
    }

    /// Refuse `req` if already in-flight, already pending, or already in
    /// `results`. If a pending entry shares `t` but differs in
    /// `(fft_freq, window)`, replace it (the earlier one was for stale
    /// parameters). Otherwise insert in time order (spec §4.3).
    pub fn schedule(&self, req: CalcRequest, results: &ResultCache) {
        if results.recall(req.t, Some(req.fft_freq), Some(req.window)).is_some() {
            return;
        }
        let mut state = self.state.lock().unwrap();
        if state.in_flight.iter().any(|r| r.same(&req)) {
            return;
        }
        if let Some(pos) = state.pending.iter().position(|r| (r.t - req.t).abs() < crate::view_state::DELTA) {
            if state.pending[pos].same(&req) {
                return;
            }
            debug!("Scheduler: replacing stale pending entry for t={}", req.t);
            state.pending[pos] = req;
            return;
        }
        let pos = state.pending.iter().position(|r| r.t > req.t).unwrap_or(state.pending.len());
        state.pending.insert(pos, req);
    }

    /// Clear the pending list. In-flight workers are not cancelled; their
    /// results are filtered on arrival by the Controller (spec §4.3, §5).
    pub fn drop_all_work(&self) {
        let mut state = self.state.lock().unwrap();
        state.pending.clear();
    }

    /// Drop pending entries whose `t` no longer lies on the new, coarser
    /// `secpp` grid after a time-zoom-out (spec §4.7: triggered by a 0.5x
    /// time-zoom; spec §8 testable property S4).
    pub fn reschedule_for_bigger_secpp(&self, new_secpp: f64) {
        let mut state = self.state.lock().unwrap();
        state.pending.retain(|r| {
            let ratio = r.t / new_secpp;
            (ratio - ratio.round()).abs() < crate::view_state::DELTA
        });
    }

    /// Worker-side dequeue (spec §4.3 policy, steps 1-4).
    fn get_work(&self, view: &ViewState) -> Option<CalcRequest> {
        let lookahead_secs = view.lookahead() as f64 * view.secpp();
        let left_edge = view.time_for_column(0) - lookahead_secs;
        let right_edge = view.time_for_column(view.disp_width as isize - 1) + lookahead_secs;

        let mut state = self.state.lock().unwrap();

        // Step 1: drop entries strictly before the left lookahead edge.
        state.pending.retain(|r| r.t >= left_edge - crate::view_state::DELTA);

        // Step 2: first on-screen entry with matching params; mismatching
        // params are dropped in passing.
        let mut chosen_idx = None;
        let mut i = 0;
        while i < state.pending.len() {
            let r = state.pending[i];
            if r.t < left_edge - crate::view_state::DELTA || r.t > right_edge + crate::view_state::DELTA {
                i += 1;
                continue;
            }
            let params_match = (r.fft_freq - view.fft_freq).abs() < crate::view_state::DELTA
                && r.window == view.window_function;
            if !params_match {
                debug!("Scheduler: dropping on-screen request with stale params t={}", r.t);
                state.pending.remove(i);
                continue;
            }
            chosen_idx = Some(i);
            break;
        }

        // Step 3: earliest look-behind entry, strictly left of visible region.
        let chosen_idx = chosen_idx.or_else(|| {
            state
                .pending
                .iter()
                .position(|r| r.t < left_edge - crate::view_state::DELTA)
        });

        let chosen = chosen_idx.map(|idx| state.pending.remove(idx));
        if let Some(req) = chosen {
            state.in_flight.push(req);
            self.jobs_in_flight.store(state.in_flight.len(), Ordering::Relaxed);
            Some(req)
        } else {
            None
        }
    }

    pub fn jobs_in_flight(&self) -> usize {
        self.jobs_in_flight.load(Ordering::Relaxed)
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Signal workers to exit and wait for them (spec §4.3 `stop`).
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let mut workers = self.workers.lock().unwrap();
        for w in workers.drain(..) {
            let _ = w.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_cache::AudioCache;
    use crate::bar_markers::BarMarkers;
    use crate::view_state::WindowFunction;

    fn view(disp_width: usize) -> ViewState {
        ViewState {
            disp_width,
            disp_height: 48,
            crosshair_column: disp_width / 2,
            crosshair_disabled: false,
            disp_time: 10.0,
            min_freq: 27.5,
            max_freq: 14080.0,
            min_y: 0,
            max_y: 47,
            ppsec: 10.0,
            fps: 30.0,
            fft_freq: 5.0,
            window_function: WindowFunction::Hann,
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

    fn scheduler(v: ViewState) -> Arc<Scheduler> {
        let (tx, _rx) = crossbeam_channel::unbounded();
        Scheduler::new(
            Arc::new(RwLock::new(v)),
            Arc::new(AudioCache::new(1)),
            Arc::new(WindowTable::new()),
            Arc::new(SpectrumEngine::new()),
            44100.0,
            tx,
        )
    }

    #[test]
    fn schedule_rejects_duplicate_pending() {
        let sched = scheduler(view(64));
        let results = ResultCache::new();
        let req = CalcRequest { t: 1.0, fft_freq: 5.0, window: WindowFunction::Hann };
        sched.schedule(req, &results);
        sched.schedule(req, &results);
        assert_eq!(sched.pending_len(), 1);
    }

    #[test]
    fn schedule_replaces_stale_params_at_same_time() {
        let sched = scheduler(view(64));
        let results = ResultCache::new();
        sched.schedule(CalcRequest { t: 1.0, fft_freq: 5.0, window: WindowFunction::Hann }, &results);
        sched.schedule(CalcRequest { t: 1.0, fft_freq: 10.0, window: WindowFunction::Hann }, &results);
        assert_eq!(sched.pending_len(), 1);
        let state = sched.state.lock().unwrap();
        assert_eq!(state.pending[0].fft_freq, 10.0);
    }

    #[test]
    fn schedule_refuses_request_already_in_result_cache() {
        let sched = scheduler(view(64));
        let mut results = ResultCache::new();
        results.remember(
            CalcResult { t: 1.0, fft_freq: 5.0, window: WindowFunction::Hann, speclen: 4, magnitude: Arc::new(vec![0.0; 5]) },
            f64::MIN,
        );
        sched.schedule(CalcRequest { t: 1.0, fft_freq: 5.0, window: WindowFunction::Hann }, &results);
        assert_eq!(sched.pending_len(), 0);
    }

    #[test]
    fn drop_all_work_empties_pending_list() {
        let sched = scheduler(view(64));
        let results = ResultCache::new();
        for i in 0..10 {
            sched.schedule(CalcRequest { t: i as f64, fft_freq: 5.0, window: WindowFunction::Hann }, &results);
        }
        sched.drop_all_work();
        assert_eq!(sched.pending_len(), 0);
    }

    #[test]
    fn get_work_returns_in_time_order_within_visible_region() {
        let v = view(64);
        let sched = scheduler(v.clone());
        let results = ResultCache::new();
        sched.schedule(CalcRequest { t: v.disp_time + 0.5, fft_freq: 5.0, window: WindowFunction::Hann }, &results);
        sched.schedule(CalcRequest { t: v.disp_time, fft_freq: 5.0, window: WindowFunction::Hann }, &results);

        let first = sched.get_work(&v).unwrap();
        let second = sched.get_work(&v).unwrap();
        assert!(first.t <= second.t);
    }

    #[test]
    fn get_work_drops_stale_param_entries_on_screen() {
        let v = view(64);
        let sched = scheduler(v.clone());
        let results = ResultCache::new();
        sched.schedule(CalcRequest { t: v.disp_time, fft_freq: 999.0, window: WindowFunction::Hann }, &results);
        assert_eq!(sched.get_work(&v), None);
        assert_eq!(sched.pending_len(), 0);
    }

    // Property-based coverage of spec §8 property 2: for any sequence of
    // `schedule`/`get_work` calls, a given `(t, fft_freq, window)` triple
    // never appears in pending and in-flight at once.
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Schedule { t: i64, fft_freq: i64 },
            GetWork,
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0i64..20, 0i64..3).prop_map(|(t, f)| Op::Schedule { t, fft_freq: f }),
                Just(Op::GetWork),
            ]
        }

        proptest! {
            #[test]
            fn no_duplicate_across_pending_and_in_flight(ops in prop::collection::vec(op_strategy(), 0..200)) {
                let sched = scheduler(view(64));
                let results = ResultCache::new();
                for op in ops {
                    match op {
                        Op::Schedule { t, fft_freq } => {
                            let req = CalcRequest {
                                t: t as f64,
                                fft_freq: (fft_freq + 1) as f64,
                                window: WindowFunction::Hann,
                            };
                            sched.schedule(req, &results);
                        }
                        Op::GetWork => {
                            let v = view(64);
                            let _ = sched.get_work(&v);
                        }
                    }
                    let state = sched.state.lock().unwrap();
                    let mut seen: Vec<(i64, i64)> = Vec::new();
                    for r in state.pending.iter().chain(state.in_flight.iter()) {
                        let key = (r.t.round() as i64, r.fft_freq.round() as i64);
                        prop_assert!(!seen.contains(&key), "duplicate triple {:?} across pending/in_flight", key);
                        seen.push(key);
                    }
                }
            }

            #[test]
            fn pending_list_stays_sorted_by_time(
                times in prop::collection::vec(0i64..50, 0..100)
            ) {
                let sched = scheduler(view(1_000_000));
                let results = ResultCache::new();
                for t in times {
                    sched.schedule(
                        CalcRequest { t: t as f64, fft_freq: 5.0, window: WindowFunction::Hann },
                        &results,
                    );
                }
                let state = sched.state.lock().unwrap();
                for w in state.pending.windows(2) {
                    prop_assert!(w[0].t <= w[1].t);
                }
            }
        }
    }
}
