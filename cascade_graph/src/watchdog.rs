//! Deadline watchdog for realtime callbacks.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::fault;

struct WatchdogState {
    deadline: Instant,
    stopped: bool,
}

struct WatchdogInner {
    name: String,
    timeout: Duration,
    state: Mutex<WatchdogState>,
    condition: Condvar,
}

impl WatchdogInner {
    /// An expiring watchdog aborts while holding the state lock, poisoning
    /// it; resets and teardown racing the abort still need access.
    fn lock_state(&self) -> std::sync::MutexGuard<'_, WatchdogState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Aborts the engine unless [`reset`](Watchdog::reset) is called before the
/// deadline elapses. An IO node resets its watchdog once per successful
/// block; the watchdog expiring means the audio thread has stalled.
pub struct Watchdog {
    inner: Arc<WatchdogInner>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Watchdog {
    /// Start a watchdog whose first deadline is `timeout` from now.
    pub fn start(name: impl Into<String>, timeout: Duration) -> Watchdog {
        let inner = Arc::new(WatchdogInner {
            name: name.into(),
            timeout,
            state: Mutex::new(WatchdogState {
                deadline: Instant::now() + timeout,
                stopped: false,
            }),
            condition: Condvar::new(),
        });

        let thread_inner = inner.clone();
        let thread = std::thread::Builder::new()
            .name(format!("watchdog: {}", thread_inner.name))
            .spawn(move || {
                let mut state = thread_inner.lock_state();
                loop {
                    if state.stopped {
                        return;
                    }
                    let now = Instant::now();
                    if now >= state.deadline {
                        fault!("watchdog hit timeout: {}", thread_inner.name);
                    }
                    let wait = state.deadline - now;
                    let (next, _) = thread_inner.condition.wait_timeout(state, wait).unwrap();
                    state = next;
                }
            })
            .unwrap_or_else(|e| fault!("could not spawn watchdog thread: {e}"));

        Watchdog {
            inner,
            thread: Mutex::new(Some(thread)),
        }
    }

    /// Push the deadline out by the configured timeout.
    pub fn reset(&self) {
        let mut state = self.inner.lock_state();
        state.deadline = Instant::now() + self.inner.timeout;
    }

    /// Disarm the watchdog. Only used on teardown paths; there is no
    /// pause/resume.
    pub fn stop(&self) {
        let mut state = self.inner.lock_state();
        state.stopped = true;
        self.inner.condition.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn take_thread(&self) -> Option<JoinHandle<()>> {
        self.thread.lock().unwrap().take()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
        if let Some(thread) = self.thread.lock().unwrap().take() {
            // An expired watchdog's thread has already aborted; ignore its
            // panic payload.
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_fatal_within_tolerance() {
        let watchdog = Watchdog::start("test deadline", Duration::from_millis(50));
        let thread = watchdog.take_thread().unwrap();
        let started = Instant::now();
        let result = thread.join();
        let elapsed = started.elapsed();
        assert!(result.is_err(), "watchdog thread should have aborted");
        assert!(elapsed >= Duration::from_millis(40), "expired early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(500), "expired late: {elapsed:?}");
    }

    #[test]
    fn reset_keeps_the_watchdog_alive() {
        let watchdog = Watchdog::start("reset deadline", Duration::from_millis(50));
        for _ in 0..5 {
            std::thread::sleep(Duration::from_millis(20));
            watchdog.reset();
        }
        let thread = watchdog.take_thread().unwrap();
        watchdog.stop();
        assert!(thread.join().is_ok());
    }
}
