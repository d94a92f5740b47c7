//! `PeriodicTask` — a small "start(period, initial_delay, task)/cancel" abstraction standing in
//! for a concrete scheduled-executor dependency.
//!
//! One dedicated OS thread holding only a stop flag, so the task never outlives (or is kept
//! alive by) whatever it's maintaining.

use std::{
    sync::{Arc, Condvar, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

/// A periodic background task with start/cancel semantics.
///
/// Only one task body runs per `PeriodicTask`; the thread synchronizes against itself implicitly
/// by virtue of running the body to completion before sleeping and checking again, so a slow tick
/// is never overlapped by the next.
pub(crate) struct PeriodicTask {
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawns a thread that runs `task` once after `initial_delay`, then every `period` until
    /// cancelled.
    pub(crate) fn start<T>(period: Duration, initial_delay: Duration, mut task: T) -> Self
    where
        T: FnMut() + Send + 'static,
    {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let stop_clone = stop.clone();

        let handle = thread::spawn(move || {
            if sleep_or_stop(&stop_clone, initial_delay) {
                return;
            }

            loop {
                if *stop_clone.0.lock().unwrap() {
                    return;
                }

                task();

                if sleep_or_stop(&stop_clone, period) {
                    return;
                }
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signals the task thread to stop and waits for it to exit.
    pub(crate) fn cancel(&mut self) {
        *self.stop.0.lock().unwrap() = true;
        self.stop.1.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Sleeps for `duration`, waking early if stopped. Returns `true` if it was stopped.
fn sleep_or_stop(stop: &(Mutex<bool>, Condvar), duration: Duration) -> bool {
    let guard = stop.0.lock().unwrap();
    if *guard {
        return true;
    }
    let (guard, _) = stop.1.wait_timeout(guard, duration).unwrap();
    *guard
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn runs_repeatedly_until_cancelled() {
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();

        let mut task = PeriodicTask::start(Duration::from_millis(10), Duration::from_millis(0), move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(55));
        task.cancel();

        assert!(count.load(Ordering::SeqCst) >= 2);
    }
}
