//! Background analog sampling and the periodic mapper tick.
//!
//! [`AnalogSampler`] owns the [`AnalogSource`] on its own thread and keeps
//! only the newest sample (latest wins) plus a queue of button presses.
//! [`AnalogRunner`] wakes every mapper tick, handles buttons and feeds the
//! hub's mapper.
//!
//! Both spawn exactly one thread and join it on drop.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use hubctl_traits::{AnalogEvent, AnalogSource, Clock};

use crate::hub::Hub;

/// Button presses reported by the analog board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Stop,
    Direction,
}

pub struct AnalogSampler {
    rx: xch::Receiver<i32>,
    buttons: xch::Receiver<Button>,
    last_ok: Arc<AtomicU64>,
    epoch: Instant,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl AnalogSampler {
    /// Spawn the reader thread. `timeout` bounds each blocking read and so
    /// also bounds how long drop waits for the thread.
    pub fn spawn<S, C>(mut source: S, timeout: Duration, clock: C) -> std::io::Result<Self>
    where
        S: AnalogSource + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let (tx, rx) = xch::bounded(1);
        let drain = rx.clone();
        let (button_tx, buttons) = xch::unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = shutdown.clone();
        let last_ok = Arc::new(AtomicU64::new(0));
        let seen = last_ok.clone();
        let epoch = clock.now();

        let join_handle = std::thread::Builder::new()
            .name("analog-sampler".into())
            .spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    match source.read(timeout) {
                        Ok(AnalogEvent::Sample(v)) => {
                            // Replace an unread sample instead of blocking on it.
                            if let Err(xch::TrySendError::Full(v)) = tx.try_send(v) {
                                let _ = drain.try_recv();
                                let _ = tx.try_send(v);
                            }
                            seen.store(clock.ms_since(epoch), Ordering::Relaxed);
                        }
                        Ok(AnalogEvent::StopPressed) => {
                            if button_tx.send(Button::Stop).is_err() {
                                break;
                            }
                        }
                        Ok(AnalogEvent::DirectionPressed) => {
                            if button_tx.send(Button::Direction).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::trace!(error = %e, "analog read");
                        }
                    }
                }
                tracing::trace!("analog sampler exiting");
            })?;

        Ok(Self {
            rx,
            buttons,
            last_ok,
            epoch,
            shutdown,
            join_handle: Some(join_handle),
        })
    }

    /// Newest sample since the previous call, if any.
    pub fn latest(&self) -> Option<i32> {
        self.rx.try_iter().last()
    }

    /// Button presses since the previous call, oldest first.
    pub fn buttons(&self) -> Vec<Button> {
        self.buttons.try_iter().collect()
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    /// Milliseconds since the last good sample, measured against `now_ms` (ms since [`Self::epoch`]).
    pub fn stalled_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_ok.load(Ordering::Relaxed))
    }
}

impl Drop for AnalogSampler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take()
            && let Err(e) = handle.join()
        {
            tracing::warn!(?e, "analog sampler thread panicked during shutdown");
        }
    }
}

/// Drives [`Hub::analog_tick`] from an [`AnalogSampler`] at the mapper tick rate.
pub struct AnalogRunner {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl AnalogRunner {
    pub fn spawn<C>(hub: Arc<Hub>, sampler: AnalogSampler, clock: C) -> std::io::Result<Self>
    where
        C: Clock + Send + Sync + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = shutdown.clone();
        let tick = hub.mapper_tick();
        let disconnect_ms = u64::try_from(hub.disconnect_after().as_millis()).unwrap_or(u64::MAX);

        let join_handle = std::thread::Builder::new()
            .name("analog-tick".into())
            .spawn(move || {
                let mut was_connected = true;
                while !stop.load(Ordering::Relaxed) {
                    for button in sampler.buttons() {
                        let res = match button {
                            Button::Stop => hub.emergency_stop(),
                            Button::Direction => hub.reverse(),
                        };
                        if let Err(e) = res {
                            tracing::warn!(error = %e, ?button, "button action failed");
                        }
                    }

                    let stalled = sampler.stalled_for(clock.ms_since(sampler.epoch()));
                    let connected = stalled <= disconnect_ms;
                    if connected != was_connected {
                        if connected {
                            tracing::info!("analog source connected");
                        } else {
                            tracing::warn!(stalled_ms = stalled, "analog source disconnected");
                        }
                        was_connected = connected;
                    }
                    hub.analog_tick(sampler.latest(), connected);
                    clock.sleep(tick);
                }
                tracing::trace!("analog runner exiting");
            })?;

        Ok(Self {
            shutdown,
            join_handle: Some(join_handle),
        })
    }

    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take()
            && let Err(e) = handle.join()
        {
            tracing::warn!(?e, "analog runner thread panicked during shutdown");
        }
    }
}

impl Drop for AnalogRunner {
    fn drop(&mut self) {
        self.halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::ScriptedAnalog;
    use hubctl_traits::MonotonicClock;

    #[test]
    fn latest_keeps_only_newest_sample() {
        let src = ScriptedAnalog::new([
            AnalogEvent::Sample(100),
            AnalogEvent::Sample(200),
            AnalogEvent::StopPressed,
            AnalogEvent::Sample(300),
        ]);
        let s = AnalogSampler::spawn(src, Duration::from_millis(5), MonotonicClock::new()).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(s.latest(), Some(300));
        assert_eq!(s.latest(), None);
        assert_eq!(s.buttons(), vec![Button::Stop]);
    }

    #[test]
    fn stall_grows_after_script_ends() {
        let src = ScriptedAnalog::new([AnalogEvent::Sample(512)]);
        let clock = MonotonicClock::new();
        let s = AnalogSampler::spawn(src, Duration::from_millis(5), clock).unwrap();
        std::thread::sleep(Duration::from_millis(80));
        let now = clock.ms_since(s.epoch());
        assert!(s.stalled_for(now) >= 50);
    }
}
