//! Thread-backed implementation of the delayed-callback capability.

use std::time::Duration;

use crossbeam_channel as xch;
use hubctl_traits::{Scheduler, Task, TimerHandle};

/// Runs each task on a short-lived named thread after its delay.
///
/// Cancellation is checked when the delay elapses; a cancelled task is
/// dropped without running.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl ThreadScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let fire = handle.clone();
        let spawned = std::thread::Builder::new()
            .name("hub-timer".into())
            .spawn(move || {
                let _ = xch::after(delay).recv();
                if fire.is_cancelled() {
                    tracing::trace!(?delay, "timer cancelled");
                    return;
                }
                task();
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "could not start timer thread; task dropped");
            handle.cancel();
        }
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_after_delay_unless_cancelled() {
        let hits = Arc::new(AtomicUsize::new(0));
        let s = ThreadScheduler::new();

        let h1 = hits.clone();
        s.schedule(Duration::from_millis(5), Box::new(move || {
            h1.fetch_add(1, Ordering::SeqCst);
        }));
        let h2 = hits.clone();
        let cancelled = s.schedule(Duration::from_millis(30), Box::new(move || {
            h2.fetch_add(10, Ordering::SeqCst);
        }));
        cancelled.cancel();

        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
