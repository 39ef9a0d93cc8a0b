//! Trigger automation driven end to end through `Hub::handle_notification`.

mod common;

use common::{count, rgb_frame, rig, speed_frame, wait_until};
use hubctl_core::{RuntimeCfg, TriggerState};

const RED: (u8, u8, u8) = (210, 30, 25);
const GREY: (u8, u8, u8) = (90, 90, 90);

fn feed(r: &common::Rig, rgb: (u8, u8, u8)) {
    r.hub
        .handle_notification(&rgb_frame(rgb.0, rgb.1, rgb.2))
        .expect("decodes");
}

fn running_at(speed: i32) -> common::Rig {
    let r = rig(RuntimeCfg::default());
    r.hub.set_speed(speed).unwrap();
    assert!(wait_until(|| r.hub.current_speed().last_transmitted == Some(speed)));
    r
}

#[test]
fn match_shorter_than_required_never_stops() {
    let r = running_at(60);
    for _ in 0..3 {
        feed(&r, RED);
        r.clock.advance_ms(50);
    }
    // 0.10 s of red, then the color goes away.
    feed(&r, GREY);
    r.clock.advance_ms(50);
    feed(&r, GREY);
    assert_eq!(r.hub.trigger_state(), TriggerState::Idle);
    r.hub.shutdown();
    assert_eq!(count(&r.log, &speed_frame(0)), 0);
}

#[test]
fn sustained_match_stops_exactly_once() {
    let r = running_at(60);
    for _ in 0..=10 {
        feed(&r, RED);
        r.clock.advance_ms(50);
    }
    r.hub.shutdown();
    assert_eq!(count(&r.log, &speed_frame(0)), 1);
}

#[test]
fn cooldown_blocks_retrigger() {
    let mut cfg = RuntimeCfg::default();
    cfg.trigger.bindings[0].action = hubctl_core::config::TriggerAction::Stop;
    let r = rig(cfg);
    r.hub.set_speed(60).unwrap();
    assert!(wait_until(|| r.hub.current_speed().last_transmitted == Some(60)));

    for _ in 0..4 {
        feed(&r, RED);
        r.clock.advance_ms(50);
    }
    assert!(matches!(r.hub.trigger_state(), TriggerState::Cooldown { .. }));
    // Restart, then keep showing red for the rest of the cooldown.
    r.hub.set_speed(60).unwrap();
    for _ in 0..50 {
        feed(&r, RED);
        r.clock.advance_ms(50);
    }
    r.hub.shutdown();
    assert_eq!(count(&r.log, &speed_frame(0)), 1);
}

#[test]
fn resume_restores_speed_after_dwell() {
    let r = running_at(70);
    for _ in 0..4 {
        feed(&r, RED);
        r.clock.advance_ms(50);
    }
    assert!(wait_until(|| r.hub.current_speed().last_transmitted == Some(0)));
    r.clock.advance_ms(2000);
    assert_eq!(r.sched.run_due(), 1);
    assert!(wait_until(|| r.hub.current_speed().last_transmitted == Some(70)));
    assert!(matches!(
        r.hub.trigger_state(),
        TriggerState::PostResumeBlocked { .. }
    ));

    // Blocked window: more red does nothing.
    for _ in 0..10 {
        feed(&r, RED);
        r.clock.advance_ms(50);
    }
    r.hub.shutdown();
    assert_eq!(count(&r.log, &speed_frame(0)), 1);
}

#[test]
fn resume_is_skipped_when_link_dropped() {
    let r = running_at(70);
    for _ in 0..4 {
        feed(&r, RED);
        r.clock.advance_ms(50);
    }
    r.hub.set_connected(false);
    r.clock.advance_ms(2000);
    r.sched.run_due();
    r.hub.shutdown();
    assert_eq!(count(&r.log, &speed_frame(70)), 1);
    assert_eq!(r.log.frames().last(), Some(&speed_frame(0)));
}

#[test]
fn stopped_train_has_nothing_to_resume() {
    let r = rig(RuntimeCfg::default());
    for _ in 0..4 {
        feed(&r, RED);
        r.clock.advance_ms(50);
    }
    r.clock.advance_ms(2000);
    r.sched.run_due();
    r.hub.shutdown();
    // Only the trigger's stop went out.
    assert_eq!(r.log.frames(), vec![speed_frame(0)]);
}
