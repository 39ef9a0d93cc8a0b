//! `Hub` facade and its type-state builder.
//!
//! The builder enforces at compile time that a transport is provided before
//! `build()` is available. `try_build()` is always available for dynamic checks.
//!
//! A built hub owns the dispatcher thread. Every producer (manual controls,
//! the notification path, trigger timers and the analog tick) goes through
//! the same [`DispatcherHandle`], so only the dispatcher ever writes.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use hubctl_traits::{Clock, MonotonicClock, Scheduler, SharedClock, Transport};

use crate::automation::{TriggerAutomation, TriggerObserver};
use crate::codec::{DecodedEvent, LogicalCommand, PortModes, SensorMode, decode_with};
use crate::config::{MotorCfg, RuntimeCfg, SensorCfg};
use crate::dispatcher::{self, DispatchStats, Dispatcher, DispatcherHandle, SpeedState, Tier};
use crate::error::{BuildError, DecodeError, HubError, Result};
use crate::format::{color_name, hex};
use crate::link::LinkState;
use crate::mapper::{AnalogSpeedMapper, TickDecision, TickInput};
use crate::scheduler::ThreadScheduler;
use crate::stabilizer::ColorStabilizer;
use crate::trigger::TriggerState;

/// Observer for stable color-index readings: `(port, color)`.
pub type ColorObserver = Arc<dyn Fn(u8, u8) + Send + Sync>;

#[inline]
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    handle: DispatcherHandle,
    link: LinkState,
    modes: PortModes,
    motor: MotorCfg,
    sensor: SensorCfg,
    reverse_pause: Duration,
    disconnect_after: Duration,
    /// `None` while color-index filtering is disabled.
    stabilizer: Mutex<Option<ColorStabilizer>>,
    /// The trigger was armed when the sensor was last unsubscribed.
    trigger_paused: AtomicBool,
    color_observers: Mutex<Vec<ColorObserver>>,
    trigger: TriggerAutomation<SharedClock>,
    mapper: Mutex<AnalogSpeedMapper>,
    direction_changing: Arc<AtomicBool>,
    scheduler: Arc<dyn Scheduler>,
    clock: SharedClock,
}

impl Inner {
    fn handle_notification(&self, bytes: &[u8]) -> std::result::Result<DecodedEvent, DecodeError> {
        let event = match decode_with(bytes, &self.modes) {
            Ok(ev) => ev,
            Err(e) => {
                tracing::warn!(error = %e, frame = %hex(bytes), "undecodable notification");
                return Err(e);
            }
        };
        tracing::debug!(event = %event, "notification");
        match &event {
            DecodedEvent::PortValueColor {
                port,
                index: Some(index),
            } if *port == self.sensor.port => self.observe_color(*port, *index),
            DecodedEvent::PortValueRgb { port, r, g, b } if *port == self.sensor.port => {
                self.trigger.on_rgb(*r, *g, *b);
            }
            DecodedEvent::GenericError { command, code } => {
                tracing::warn!(command, code, "hub reported an error");
            }
            _ => {}
        }
        Ok(event)
    }

    fn observe_color(&self, port: u8, index: u8) {
        let stable = match lock(&self.stabilizer).as_mut() {
            Some(stabilizer) => stabilizer.observe(index),
            None => return,
        };
        if let Some(color) = stable {
            tracing::info!(port, color, name = color_name(color), "stable color");
            let observers: Vec<ColorObserver> = lock(&self.color_observers).clone();
            for obs in &observers {
                obs(port, color);
            }
        }
    }

    fn speed(&self, speed: i32, tier: Tier) -> std::result::Result<(), HubError> {
        let cmd = self.motor.speed_command(speed)?;
        self.handle.enqueue(cmd, tier)
    }
}

/// Running hub control pipeline.
pub struct Hub {
    inner: Arc<Inner>,
    dispatcher: Mutex<Option<Dispatcher>>,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("motor_port", &self.inner.motor.port)
            .field("sensor_port", &self.inner.sensor.port)
            .field("speed", &self.current_speed())
            .field("connected", &self.inner.link.is_connected())
            .finish_non_exhaustive()
    }
}

impl Hub {
    /// Start building a Hub.
    pub fn builder() -> HubBuilder<Missing> {
        HubBuilder::default()
    }

    /// Decode one inbound notification and route it to the stabilizer or the trigger.
    ///
    /// The transport callback calls this; it never blocks on the dispatcher.
    pub fn handle_notification(&self, bytes: &[u8]) -> std::result::Result<DecodedEvent, DecodeError> {
        self.inner.handle_notification(bytes)
    }

    /// Queue any command on the given tier.
    pub fn enqueue(&self, cmd: LogicalCommand, tier: Tier) -> std::result::Result<(), HubError> {
        self.inner.handle.enqueue(cmd, tier)
    }

    /// Manual speed change. Coalesced, and opens the manual-override window.
    pub fn set_speed(&self, speed: i32) -> std::result::Result<(), HubError> {
        self.inner.speed(speed, Tier::Coalesced)?;
        lock(&self.inner.mapper).note_manual(self.inner.clock.now());
        tracing::debug!(speed, "manual speed");
        Ok(())
    }

    /// Stop the drive motor ahead of anything queued.
    pub fn stop(&self) -> std::result::Result<(), HubError> {
        self.inner.speed(0, Tier::Priority)
    }

    /// Stop every emergency-stop port.
    pub fn emergency_stop(&self) -> std::result::Result<(), HubError> {
        tracing::warn!(ports = ?self.inner.motor.estop_ports, "emergency stop");
        for &port in &self.inner.motor.estop_ports {
            let cmd = self.inner.motor.speed_command_on(port, 0)?;
            self.inner.handle.enqueue(cmd, Tier::Priority)?;
        }
        Ok(())
    }

    /// Reverse the train: stop, pause, restart at the negated speed.
    ///
    /// The mapper is suppressed until the restart has been queued. A second
    /// call while a reversal is in progress is ignored.
    pub fn reverse(&self) -> std::result::Result<(), HubError> {
        let inner = &self.inner;
        let current = inner.handle.current_speed().desired;
        if current == 0 {
            tracing::debug!("reverse ignored; train stopped");
            return Ok(());
        }
        if inner.direction_changing.swap(true, Ordering::AcqRel) {
            tracing::debug!("reverse already in progress");
            return Ok(());
        }
        if let Err(e) = inner.speed(0, Tier::Priority) {
            inner.direction_changing.store(false, Ordering::Release);
            return Err(e);
        }
        tracing::info!(from = current, to = -current, "direction change");

        let weak: Weak<Inner> = Arc::downgrade(inner);
        inner.scheduler.schedule(
            inner.reverse_pause,
            Box::new(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.link.is_connected() {
                    if let Err(e) = inner.speed(-current, Tier::Priority) {
                        tracing::warn!(error = %e, "reverse restart not queued");
                    }
                } else {
                    tracing::debug!("link down; reverse restart skipped");
                }
                inner.direction_changing.store(false, Ordering::Release);
            }),
        );
        Ok(())
    }

    pub fn is_reversing(&self) -> bool {
        self.inner.direction_changing.load(Ordering::Acquire)
    }

    fn sensor_format(&self, notify: bool) -> LogicalCommand {
        LogicalCommand::SetPortInputFormat {
            port: self.inner.sensor.port,
            mode: self.inner.sensor.mode.mode_number(),
            delta: 1,
            notify,
        }
    }

    /// Subscribe to the color sensor in the configured mode (normal tier).
    ///
    /// Re-arms the trigger if [`Hub::unsubscribe_sensor`] disarmed it.
    pub fn subscribe_sensor(&self) -> std::result::Result<(), HubError> {
        self.inner.handle.enqueue(self.sensor_format(true), Tier::Normal)?;
        if self.inner.trigger_paused.swap(false, Ordering::AcqRel) {
            self.inner.trigger.set_enabled(true);
        }
        Ok(())
    }

    /// Stop sensor notifications, forget the color history and disarm the trigger.
    pub fn unsubscribe_sensor(&self) -> std::result::Result<(), HubError> {
        self.inner.handle.enqueue(self.sensor_format(false), Tier::Normal)?;
        if let Some(stabilizer) = lock(&self.inner.stabilizer).as_mut() {
            stabilizer.clear();
        }
        if self.inner.trigger.is_enabled() {
            self.inner.trigger_paused.store(true, Ordering::Release);
            self.inner.trigger.set_enabled(false);
        }
        tracing::info!(port = self.inner.sensor.port, "sensor unsubscribed");
        Ok(())
    }

    /// Change color-index sensitivity. Enables filtering if it was off and
    /// clears the window either way.
    pub fn reconfigure_stabilizer(
        &self,
        threshold: usize,
        capacity: usize,
    ) -> std::result::Result<(), HubError> {
        if threshold == 0 || threshold > capacity {
            return Err(HubError::Config(format!(
                "stabilizer threshold {threshold} outside 1..={capacity}"
            )));
        }
        let mut slot = lock(&self.inner.stabilizer);
        match slot.as_mut() {
            Some(s) => s.reconfigure(threshold, capacity),
            None => *slot = Some(ColorStabilizer::new(threshold, capacity)),
        }
        tracing::info!(threshold, capacity, "stabilizer reconfigured");
        Ok(())
    }

    pub fn request_hub_name(&self) -> std::result::Result<(), HubError> {
        self.inner
            .handle
            .enqueue(LogicalCommand::request_hub_name(), Tier::Normal)
    }

    /// One mapper tick. `sample` is the newest raw value since the last tick.
    pub fn analog_tick(&self, sample: Option<i32>, source_connected: bool) -> TickDecision {
        let inner = &self.inner;
        inner.trigger.poll();
        let input = TickInput {
            now: inner.clock.now(),
            sample,
            source_connected,
            direction_changing: inner.direction_changing.load(Ordering::Acquire),
            desired: inner.handle.current_speed().desired,
        };
        let decision = lock(&inner.mapper).tick(input);
        if let TickDecision::Adjust { from, to } = decision {
            tracing::debug!(from, to, "analog speed step");
            if let Err(e) = inner.speed(to, Tier::Coalesced) {
                tracing::warn!(error = %e, speed = to, "analog speed not queued");
            }
        }
        decision
    }

    pub fn on_stable_color(&self, observer: ColorObserver) {
        lock(&self.inner.color_observers).push(observer);
    }

    pub fn on_trigger_state(&self, observer: TriggerObserver) {
        self.inner.trigger.on_state(observer);
    }

    pub fn trigger_state(&self) -> TriggerState {
        self.inner.trigger.state()
    }

    pub fn set_trigger_enabled(&self, enabled: bool) {
        self.inner.trigger.set_enabled(enabled);
    }

    pub fn current_speed(&self) -> SpeedState {
        self.inner.handle.current_speed()
    }

    /// Report link liveness. Delayed actions become no-ops while it is down.
    pub fn set_connected(&self, connected: bool) {
        let was = self.inner.link.set(connected);
        if was != connected {
            if connected {
                tracing::info!("hub link up");
            } else {
                tracing::warn!("hub link down");
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.link.is_connected()
    }

    pub fn mapper_tick(&self) -> Duration {
        lock(&self.inner.mapper).tick_interval()
    }

    pub fn disconnect_after(&self) -> Duration {
        self.inner.disconnect_after
    }

    /// Drain the dispatcher and stop it. Later calls return zeroed stats.
    pub fn shutdown(&self) -> DispatchStats {
        self.inner.trigger.set_enabled(false);
        self.inner.link.set(false);
        match lock(&self.dispatcher).take() {
            Some(d) => d.shutdown(),
            None => DispatchStats::default(),
        }
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct HubBuilder<T> {
    transport: Option<Box<dyn Transport + Send>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    clock: Option<SharedClock>,
    cfg: Option<RuntimeCfg>,
    _t: PhantomData<T>,
}

impl Default for HubBuilder<Missing> {
    fn default() -> Self {
        Self {
            transport: None,
            scheduler: None,
            clock: None,
            cfg: None,
            _t: PhantomData,
        }
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn validate(cfg: &RuntimeCfg) -> Result<()> {
    let st = &cfg.stabilizer;
    if st.capacity == 0 || st.threshold == 0 || st.threshold > st.capacity {
        return Err(invalid("stabilizer threshold must be in 1..=capacity"));
    }
    let m = &cfg.mapper;
    if m.tick.is_zero() {
        return Err(invalid("mapper tick must be > 0"));
    }
    if !m.gain.is_finite() {
        return Err(invalid("mapper gain must be finite"));
    }
    if m.min_magnitude < 0 || m.min_magnitude > m.max_magnitude || m.max_magnitude > 100 {
        return Err(invalid("mapper magnitudes must satisfy 0 <= min <= max <= 100"));
    }
    for b in &m.bands {
        if b.min > b.max || !b.rate.is_finite() {
            return Err(invalid("rate band must have min <= max and a finite rate"));
        }
    }
    if cfg.motor.max_power > crate::codec::command::MAX_POWER_LIMIT {
        return Err(invalid("max_power must be <= 100"));
    }
    if cfg.trigger.bindings.iter().any(|b| {
        b.band.red.min > b.band.red.max
            || b.band.green.min > b.band.green.max
            || b.band.blue.min > b.band.blue.max
    }) {
        return Err(invalid("trigger band must have min <= max"));
    }
    Ok(())
}

impl<T> HubBuilder<T> {
    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<Hub> {
        let transport = self
            .transport
            .ok_or_else(|| eyre::Report::new(BuildError::MissingTransport))?;
        let cfg = self.cfg.unwrap_or_default();
        validate(&cfg)?;
        let clock: SharedClock = self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let scheduler: Arc<dyn Scheduler> = self
            .scheduler
            .unwrap_or_else(|| Arc::new(ThreadScheduler::new()));

        let mut dispatcher_cfg = cfg.dispatcher;
        dispatcher_cfg.motor_port = cfg.motor.port;
        let (handle, mut dispatch_loop) = dispatcher::channel(transport, dispatcher_cfg);

        let link = LinkState::default();
        let modes = PortModes::new(SensorMode::Rgb).with_port(cfg.sensor.port, cfg.sensor.mode);
        let stabilizer = cfg
            .stabilizer
            .enabled
            .then(|| ColorStabilizer::new(cfg.stabilizer.threshold, cfg.stabilizer.capacity));
        let trigger = TriggerAutomation::new(
            cfg.trigger.clone(),
            cfg.motor.clone(),
            handle.clone(),
            scheduler.clone(),
            link.clone(),
            clock.clone(),
        );

        let inner = Arc::new(Inner {
            handle: handle.clone(),
            link,
            modes,
            motor: cfg.motor.clone(),
            sensor: cfg.sensor,
            reverse_pause: cfg.direction.pause,
            disconnect_after: cfg.mapper.disconnect_after,
            stabilizer: Mutex::new(stabilizer),
            trigger_paused: AtomicBool::new(false),
            color_observers: Mutex::new(Vec::new()),
            trigger,
            mapper: Mutex::new(AnalogSpeedMapper::new(cfg.mapper.clone())),
            direction_changing: Arc::new(AtomicBool::new(false)),
            scheduler,
            clock,
        });

        let weak = Arc::downgrade(&inner);
        dispatch_loop.connect(Box::new(move |bytes: &[u8]| {
            if let Some(inner) = weak.upgrade() {
                let _ = inner.handle_notification(bytes);
            }
        }))?;
        let dispatcher = Dispatcher::start(handle, dispatch_loop)?;
        tracing::info!(
            motor_port = cfg.motor.port,
            sensor_port = cfg.sensor.port,
            sensor_mode = ?cfg.sensor.mode,
            "hub started"
        );
        Ok(Hub {
            inner,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Provide a custom scheduler; defaults to [`ThreadScheduler`].
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Provide a custom clock; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_config(mut self, cfg: RuntimeCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }
}

impl HubBuilder<Missing> {
    pub fn with_transport(self, transport: impl Transport + Send + 'static) -> HubBuilder<Set> {
        HubBuilder {
            transport: Some(Box::new(transport)),
            scheduler: self.scheduler,
            clock: self.clock,
            cfg: self.cfg,
            _t: PhantomData,
        }
    }
}

impl HubBuilder<Set> {
    /// Validate and start the hub. Only available once a transport is set.
    pub fn build(self) -> Result<Hub> {
        self.try_build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::RecordingTransport;

    #[test]
    fn try_build_without_transport_fails() {
        let err = Hub::builder().try_build().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingTransport)
        ));
    }

    #[test]
    fn rejects_inverted_magnitudes() {
        let mut cfg = RuntimeCfg::default();
        cfg.mapper.min_magnitude = 80;
        cfg.mapper.max_magnitude = 40;
        let err = Hub::builder()
            .with_transport(RecordingTransport::new())
            .with_config(cfg)
            .build()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::InvalidConfig(_))
        ));
    }

    #[test]
    fn emergency_stop_hits_every_port() {
        let transport = RecordingTransport::new();
        let log = transport.log();
        let hub = Hub::builder().with_transport(transport).build().unwrap();
        hub.emergency_stop().unwrap();
        hub.shutdown();
        let ports: Vec<u8> = log.frames().iter().map(|f| f[3]).collect();
        assert_eq!(ports, vec![0, 1, 2]);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let hub = Hub::builder()
            .with_transport(RecordingTransport::new())
            .build()
            .unwrap();
        hub.set_speed(40).unwrap();
        assert_eq!(hub.shutdown().sent, 1);
        assert_eq!(hub.shutdown(), DispatchStats::default());
        assert!(matches!(hub.set_speed(50), Err(HubError::Closed)));
    }
}
