//! Periodic scroll driver (spec §4.6): a single timer firing at `1/fps`,
//! coalescing ticks into one "scroll pending" flag so a slow main loop
//! never processes more than one scroll per service. Grounded on the
//! teacher's 100ms `request_repaint_after` timer pattern in
//! `plot.rs::MyApp::update`, generalized from a fixed 100ms GUI repaint
//! rate into a reconfigurable fps-driven background ticker.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Fires at `1/fps`; each tick sets a coalesced "pending" flag that the
/// main loop clears and services on its own schedule (spec §4.6).
pub struct Clock {
    pending: Arc<AtomicBool>,
    interval_millis: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Clock {
    pub fn start(fps: f64) -> Self {
        let pending = Arc::new(AtomicBool::new(false));
        let interval_millis = Arc::new(AtomicU64::new(fps_to_millis(fps)));
        let shutdown = Arc::new(AtomicBool::new(false));

        let pending_clone = Arc::clone(&pending);
        let interval_clone = Arc::clone(&interval_millis);
        let shutdown_clone = Arc::clone(&shutdown);
        let thread = thread::spawn(move || {
            while !shutdown_clone.load(Ordering::Relaxed) {
                let millis = interval_clone.load(Ordering::Relaxed).max(1);
                thread::sleep(Duration::from_millis(millis));
                pending_clone.store(true, Ordering::Release);
            }
        });

        Self { pending, interval_millis, shutdown, thread: Some(thread) }
    }

    /// Update the timer interval when `fps` (or the underlying step)
    /// changes (spec §4.6).
    pub fn set_fps(&self, fps: f64) {
        self.interval_millis.store(fps_to_millis(fps), Ordering::Relaxed);
    }

    /// Clear and return whether a scroll tick is pending. Multiple ticks
    /// before the main loop calls this collapse into a single `true`.
    pub fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}

fn fps_to_millis(fps: f64) -> u64 {
    if fps <= 0.0 {
        1000
    } else {
        (1000.0 / fps).round().max(1.0) as u64
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}
