//! A blocking counting semaphore: the permit primitive `ConcurrentPool` is built on.
//!
//! Built on `std::sync::{Mutex, Condvar}` rather than an async future, since acquisition here
//! blocks the calling thread rather than yielding to an executor.

use std::{
    sync::{Condvar, Mutex},
    time::{Duration, Instant},
};

/// A timeout passed to [`Semaphore::acquire`].
#[derive(Clone, Copy, Debug)]
pub enum Wait {
    /// Return immediately if no permit is free.
    NonBlocking,
    /// Block until a permit is free, no matter how long that takes.
    Indefinite,
    /// Block until a permit is free or the duration elapses.
    Timed(Duration),
}

impl Wait {
    /// Builds a `Wait` from a signed millisecond timeout: negative means indefinite, zero means
    /// non-blocking, otherwise block up to that many milliseconds.
    pub fn from_millis_signed(timeout_ms: i64) -> Self {
        if timeout_ms < 0 {
            Wait::Indefinite
        } else if timeout_ms == 0 {
            Wait::NonBlocking
        } else {
            Wait::Timed(Duration::from_millis(timeout_ms as u64))
        }
    }
}

/// A counting semaphore with blocking, optionally-timed acquisition.
#[derive(Debug)]
pub struct Semaphore {
    state: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    /// Creates a semaphore with `permits` initial permits.
    pub fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(permits),
            condvar: Condvar::new(),
        }
    }

    /// Attempts to acquire one permit, blocking per `wait`. Returns `true` if a permit was
    /// acquired, `false` on timeout.
    pub fn acquire(&self, wait: Wait) -> bool {
        let mut guard = self.state.lock().unwrap();

        match wait {
            Wait::NonBlocking => {
                if *guard > 0 {
                    *guard -= 1;
                    true
                } else {
                    false
                }
            }
            Wait::Indefinite => {
                while *guard == 0 {
                    guard = self.condvar.wait(guard).unwrap();
                }
                *guard -= 1;
                true
            }
            Wait::Timed(timeout) => {
                let deadline = Instant::now() + timeout;
                while *guard == 0 {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (next_guard, timeout_result) =
                        self.condvar.wait_timeout(guard, deadline - now).unwrap();
                    guard = next_guard;
                    if timeout_result.timed_out() && *guard == 0 {
                        return false;
                    }
                }
                *guard -= 1;
                true
            }
        }
    }

    /// Releases one permit back to the semaphore, waking a single blocked waiter if any.
    pub fn release(&self) {
        let mut guard = self.state.lock().unwrap();
        *guard += 1;
        self.condvar.notify_one();
    }

    /// The number of permits currently available (i.e. not held).
    pub fn available(&self) -> usize {
        *self.state.lock().unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn non_blocking_fails_when_empty() {
        let sem = Semaphore::new(0);
        assert!(!sem.acquire(Wait::NonBlocking));
    }

    #[test]
    fn acquire_release_round_trips() {
        let sem = Semaphore::new(1);
        assert!(sem.acquire(Wait::NonBlocking));
        assert!(!sem.acquire(Wait::NonBlocking));
        sem.release();
        assert!(sem.acquire(Wait::NonBlocking));
    }

    #[test]
    fn timed_acquire_times_out() {
        let sem = Semaphore::new(0);
        let start = Instant::now();
        assert!(!sem.acquire(Wait::Timed(Duration::from_millis(30))));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn indefinite_wakes_on_release() {
        let sem = Arc::new(Semaphore::new(0));
        let sem2 = sem.clone();
        let handle = thread::spawn(move || sem2.acquire(Wait::Indefinite));

        thread::sleep(Duration::from_millis(20));
        sem.release();

        assert!(handle.join().unwrap());
    }
}
