#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use hubctl_core::config::MotorCfg;
use hubctl_core::mocks::{FrameLog, ManualScheduler, RecordingTransport};
use hubctl_core::{Hub, RuntimeCfg, encode};
use hubctl_traits::clock::test_clock::TestClock;

pub const SENSOR: u8 = 0x12;

pub struct Rig {
    pub hub: Hub,
    pub clock: TestClock,
    pub sched: ManualScheduler<TestClock>,
    pub log: FrameLog,
}

pub fn rig(cfg: RuntimeCfg) -> Rig {
    let clock = TestClock::new();
    let sched = ManualScheduler::new(clock.clone());
    let transport = RecordingTransport::new();
    let log = transport.log();
    let hub = Hub::builder()
        .with_transport(transport)
        .with_clock(Arc::new(clock.clone()))
        .with_scheduler(Arc::new(sched.clone()))
        .with_config(cfg)
        .build()
        .expect("hub builds");
    Rig {
        hub,
        clock,
        sched,
        log,
    }
}

/// Poll `cond` on real time; the dispatcher runs on its own thread.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// 8-bit RGB port value notification from the color sensor.
pub fn rgb_frame(r: u8, g: u8, b: u8) -> [u8; 7] {
    [7, 0x00, 0x45, SENSOR, r, g, b]
}

pub fn color_frame(index: u8) -> [u8; 5] {
    [5, 0x00, 0x45, SENSOR, index]
}

/// Wire bytes of a drive-motor speed command in the default style.
pub fn speed_frame(speed: i32) -> Vec<u8> {
    let cmd = MotorCfg::default().speed_command(speed).expect("valid speed");
    encode(&cmd).expect("encodes").into_vec()
}

pub fn count(log: &FrameLog, frame: &[u8]) -> usize {
    log.frames().iter().filter(|f| f.as_slice() == frame).count()
}
