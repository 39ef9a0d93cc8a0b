//! Simulated devices: a hub that answers like a real one, a color sensor
//! that plays back a track layout and a knob that sweeps analog values.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use hubctl_traits::{AnalogEvent, AnalogSource, BoxError, NotifyFn, Transport};

use crate::error::HwError;

const HUB_PROPERTIES: u8 = 0x01;
const HUB_ACTIONS: u8 = 0x02;
const HUB_ATTACHED_IO: u8 = 0x04;
const PORT_VALUE_SINGLE: u8 = 0x45;
const PORT_OUTPUT_COMMAND: u8 = 0x81;
const PORT_OUTPUT_FEEDBACK: u8 = 0x82;

const START_SPEED: u8 = 0x07;
const WRITE_DIRECT_MODE_DATA: u8 = 0x51;
const ACTION_DISCONNECT: u8 = 0x02;
const ACTION_SHUTDOWN: u8 = 0x2F;
const PROPERTY_ADVERTISING_NAME: u8 = 0x01;
const PROPERTY_REQUEST_UPDATE: u8 = 0x05;
const PROPERTY_UPDATE: u8 = 0x06;
/// Buffer empty and command completed.
const FEEDBACK_DONE: u8 = 0x0A;

/// LEGO train motor.
pub const IO_TRAIN_MOTOR: u16 = 0x0002;
/// Color and distance sensor.
pub const IO_COLOR_DISTANCE: u16 = 0x0025;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

type Callback = Arc<dyn Fn(&[u8]) + Send + Sync>;

#[derive(Default)]
struct SimState {
    written: Vec<Vec<u8>>,
    speeds: BTreeMap<u8, i8>,
}

#[derive(Clone)]
struct Shared {
    state: Arc<Mutex<SimState>>,
    notify: Arc<Mutex<Option<Callback>>>,
    up: Arc<AtomicBool>,
}

impl Shared {
    fn emit(&self, frame: &[u8]) {
        if !self.up.load(Ordering::Acquire) {
            return;
        }
        // Call outside the lock; the receiver may take its own locks.
        let cb = lock(&self.notify).clone();
        if let Some(cb) = cb {
            cb(frame);
        }
    }
}

/// In-process hub speaking enough LWP3 to exercise the whole stack.
///
/// Output commands are acknowledged with a completed feedback frame and the
/// name request is answered. Input-format setups are not acknowledged: the
/// decoder reads 0x47 frames as port values. Motor speeds
/// are tracked per port so tests can assert on what the train "does".
pub struct SimulatedHub {
    name: String,
    attached: Vec<(u8, u16)>,
    shared: Shared,
}

/// Test-side view of a [`SimulatedHub`] that stays valid after the hub has
/// been moved into a dispatcher.
#[derive(Clone)]
pub struct SimHubHandle {
    shared: Shared,
}

impl SimulatedHub {
    /// A hub with a train motor on port 0 and a color sensor on port 0x12.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attached: vec![(0x00, IO_TRAIN_MOTOR), (0x12, IO_COLOR_DISTANCE)],
            shared: Shared {
                state: Arc::default(),
                notify: Arc::default(),
                up: Arc::new(AtomicBool::new(false)),
            },
        }
    }

    /// Replace the attached devices announced on connect.
    #[must_use]
    pub fn with_devices(mut self, devices: impl IntoIterator<Item = (u8, u16)>) -> Self {
        self.attached = devices.into_iter().collect();
        self
    }

    pub fn handle(&self) -> SimHubHandle {
        SimHubHandle {
            shared: self.shared.clone(),
        }
    }

    fn respond(&self, frame: &[u8]) {
        let Some(&kind) = frame.get(2) else { return };
        match kind {
            PORT_OUTPUT_COMMAND if frame.len() >= 6 => {
                let port = frame[3];
                let sub = frame[5];
                let speed = match sub {
                    START_SPEED => frame.get(6),
                    WRITE_DIRECT_MODE_DATA => frame.get(7),
                    _ => None,
                };
                if let Some(&raw) = speed {
                    lock(&self.shared.state)
                        .speeds
                        .insert(port, i8::from_le_bytes([raw]));
                }
                if frame[4] & 0x01 != 0 {
                    self.shared
                        .emit(&[5, 0, PORT_OUTPUT_FEEDBACK, port, FEEDBACK_DONE]);
                }
            }
            HUB_PROPERTIES
                if frame.get(3) == Some(&PROPERTY_ADVERTISING_NAME)
                    && frame.get(4) == Some(&PROPERTY_REQUEST_UPDATE) =>
            {
                let mut reply = vec![0, 0, HUB_PROPERTIES, PROPERTY_ADVERTISING_NAME, PROPERTY_UPDATE];
                reply.extend(self.name.bytes().take(14));
                reply[0] = u8::try_from(reply.len()).unwrap_or(u8::MAX);
                self.shared.emit(&reply);
            }
            HUB_ACTIONS if matches!(frame.get(3), Some(&(ACTION_DISCONNECT | ACTION_SHUTDOWN))) => {
                tracing::debug!("simulated hub going down on request");
                self.shared.up.store(false, Ordering::Release);
            }
            _ => {}
        }
    }
}

impl Transport for SimulatedHub {
    fn connect(&mut self, on_notify: NotifyFn) -> Result<(), BoxError> {
        *lock(&self.shared.notify) = Some(Arc::from(on_notify));
        self.shared.up.store(true, Ordering::Release);
        for &(port, io) in &self.attached {
            let [lo, hi] = io.to_le_bytes();
            self.shared.emit(&[
                15, 0, HUB_ATTACHED_IO, port, 1, lo, hi, 0, 0, 0, 0x10, 0, 0, 0, 0x10,
            ]);
        }
        tracing::info!(name = %self.name, "simulated hub connected");
        Ok(())
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), BoxError> {
        if !self.shared.up.load(Ordering::Acquire) {
            return Err(Box::new(HwError::Disconnected));
        }
        lock(&self.shared.state).written.push(frame.to_vec());
        self.respond(frame);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BoxError> {
        self.shared.up.store(false, Ordering::Release);
        *lock(&self.shared.notify) = None;
        Ok(())
    }
}

impl SimHubHandle {
    /// Deliver a raw notification as if the hub had sent it.
    pub fn inject(&self, frame: &[u8]) {
        self.shared.emit(frame);
    }

    /// Drop or restore the radio link. Writes fail while it is down.
    pub fn set_link(&self, up: bool) {
        self.shared.up.store(up, Ordering::Release);
    }

    pub fn is_up(&self) -> bool {
        self.shared.up.load(Ordering::Acquire)
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        lock(&self.shared.state).written.clone()
    }

    /// Last speed commanded on `port`, if any.
    pub fn speed(&self, port: u8) -> Option<i8> {
        lock(&self.shared.state).speeds.get(&port).copied()
    }
}

/// What the sensor sees while over one stretch of track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    Rgb(u8, u8, u8),
    Index(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorSegment {
    pub duration: Duration,
    pub reading: Reading,
}

impl ColorSegment {
    pub const fn rgb(ms: u64, r: u8, g: u8, b: u8) -> Self {
        Self {
            duration: Duration::from_millis(ms),
            reading: Reading::Rgb(r, g, b),
        }
    }

    pub const fn index(ms: u64, index: u8) -> Self {
        Self {
            duration: Duration::from_millis(ms),
            reading: Reading::Index(index),
        }
    }
}

/// A color sensor moving over a looped sequence of track segments.
#[derive(Debug, Clone)]
pub struct SimulatedColorSensor {
    port: u8,
    segments: Vec<ColorSegment>,
}

impl SimulatedColorSensor {
    pub fn new(port: u8, segments: Vec<ColorSegment>) -> Self {
        Self { port, segments }
    }

    /// Reading at `elapsed` since the start of the loop.
    pub fn reading_at(&self, elapsed: Duration) -> Option<Reading> {
        let lap: Duration = self.segments.iter().map(|s| s.duration).sum();
        if lap.is_zero() {
            return self.segments.first().map(|s| s.reading);
        }
        let mut t = Duration::from_nanos(
            u64::try_from(elapsed.as_nanos() % lap.as_nanos()).unwrap_or_default(),
        );
        for seg in &self.segments {
            if t < seg.duration {
                return Some(seg.reading);
            }
            t -= seg.duration;
        }
        None
    }

    /// Port value frame for `reading`. RGB uses the 10-bit wide layout.
    pub fn frame(&self, reading: Reading) -> Vec<u8> {
        match reading {
            Reading::Index(i) => vec![5, 0, PORT_VALUE_SINGLE, self.port, i],
            Reading::Rgb(r, g, b) => {
                let mut f = vec![10, 0, PORT_VALUE_SINGLE, self.port];
                for c in [r, g, b] {
                    f.extend((u16::from(c) * 4).to_le_bytes());
                }
                f
            }
        }
    }
}

/// Thread that injects sensor readings into a simulated hub at a fixed rate.
pub struct SensorFeed {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl SensorFeed {
    pub fn spawn(
        sensor: SimulatedColorSensor,
        hub: SimHubHandle,
        period: Duration,
    ) -> std::io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = shutdown.clone();
        let join_handle = std::thread::Builder::new()
            .name("sim-sensor".into())
            .spawn(move || {
                let start = Instant::now();
                while !stop.load(Ordering::Relaxed) {
                    if let Some(r) = sensor.reading_at(start.elapsed()) {
                        hub.inject(&sensor.frame(r));
                    }
                    std::thread::sleep(period);
                }
            })?;
        Ok(Self {
            shutdown,
            join_handle: Some(join_handle),
        })
    }
}

impl Drop for SensorFeed {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take()
            && let Err(e) = handle.join()
        {
            tracing::warn!(?e, "sensor feed thread panicked during shutdown");
        }
    }
}

/// Analog knob replaying a list of values, with optional button presses.
pub struct SimulatedKnob {
    values: Vec<i32>,
    presses: Vec<(usize, AnalogEvent)>,
    interval: Duration,
    next: usize,
}

impl SimulatedKnob {
    /// Emit `values` in a loop, one every `interval`.
    pub fn new(values: Vec<i32>, interval: Duration) -> Self {
        Self {
            values,
            presses: Vec::new(),
            interval,
            next: 0,
        }
    }

    /// Emit `event` just before the sample at position `at` in the first pass.
    #[must_use]
    pub fn with_press(mut self, at: usize, event: AnalogEvent) -> Self {
        self.presses.push((at, event));
        self
    }
}

impl AnalogSource for SimulatedKnob {
    fn read(&mut self, timeout: Duration) -> Result<AnalogEvent, BoxError> {
        if let Some(pos) = self.presses.iter().position(|(at, _)| *at == self.next) {
            return Ok(self.presses.remove(pos).1);
        }
        if self.values.is_empty() || self.interval > timeout {
            std::thread::sleep(timeout);
            return Err(Box::new(HwError::Timeout));
        }
        std::thread::sleep(self.interval);
        let v = self.values[self.next % self.values.len()];
        self.next += 1;
        Ok(AnalogEvent::Sample(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> (SimulatedHub, SimHubHandle, Arc<Mutex<Vec<Vec<u8>>>>) {
        let mut hub = SimulatedHub::new("Train");
        let h = hub.handle();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        hub.connect(Box::new(move |b| sink.lock().unwrap().push(b.to_vec())))
            .unwrap();
        (hub, h, seen)
    }

    #[test]
    fn announces_devices_on_connect() {
        let (_hub, _h, seen) = connected();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(&seen[1][..7], &[15, 0, 0x04, 0x12, 1, 0x25, 0x00]);
    }

    #[test]
    fn acknowledges_speed_and_tracks_it() {
        let (mut hub, h, seen) = connected();
        hub.write(&[9, 0, 0x81, 0x00, 0x11, 0x07, 0xCE, 0x64, 0x00]).unwrap();
        assert_eq!(h.speed(0), Some(-50));
        assert_eq!(seen.lock().unwrap().last().unwrap(), &vec![5, 0, 0x82, 0, 0x0A]);
    }

    #[test]
    fn answers_name_request() {
        let (mut hub, _h, seen) = connected();
        hub.write(&[5, 0, 0x01, 0x01, 0x05]).unwrap();
        let reply = seen.lock().unwrap().last().unwrap().clone();
        assert_eq!(reply, vec![10, 0, 0x01, 0x01, 0x06, b'T', b'r', b'a', b'i', b'n']);
    }

    #[test]
    fn writes_fail_while_link_is_down() {
        let (mut hub, h, _seen) = connected();
        h.set_link(false);
        let err = hub.write(&[5, 0, 0x01, 0x01, 0x05]).unwrap_err();
        assert!(err.downcast_ref::<HwError>().is_some());
        h.set_link(true);
        assert!(hub.write(&[5, 0, 0x01, 0x01, 0x05]).is_ok());
    }

    #[test]
    fn sensor_loops_over_segments() {
        let s = SimulatedColorSensor::new(
            0x12,
            vec![ColorSegment::rgb(100, 10, 10, 10), ColorSegment::index(50, 9)],
        );
        assert_eq!(s.reading_at(Duration::from_millis(20)), Some(Reading::Rgb(10, 10, 10)));
        assert_eq!(s.reading_at(Duration::from_millis(120)), Some(Reading::Index(9)));
        assert_eq!(s.reading_at(Duration::from_millis(160)), Some(Reading::Rgb(10, 10, 10)));
    }

    #[test]
    fn rgb_frame_uses_wide_channels() {
        let s = SimulatedColorSensor::new(0x12, vec![]);
        assert_eq!(
            s.frame(Reading::Rgb(200, 1, 0)),
            vec![10, 0, 0x45, 0x12, 0x20, 0x03, 0x04, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn knob_emits_press_before_sample() {
        let mut k = SimulatedKnob::new(vec![100, 200], Duration::from_millis(1))
            .with_press(1, AnalogEvent::DirectionPressed);
        let t = Duration::from_millis(50);
        assert_eq!(k.read(t).unwrap(), AnalogEvent::Sample(100));
        assert_eq!(k.read(t).unwrap(), AnalogEvent::DirectionPressed);
        assert_eq!(k.read(t).unwrap(), AnalogEvent::Sample(200));
        assert_eq!(k.read(t).unwrap(), AnalogEvent::Sample(100));
    }
}
