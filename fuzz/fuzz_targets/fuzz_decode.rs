#![no_main]
use hubctl_core::{PortModes, SensorMode, decode_with};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&mode, frame)) = data.split_first() else {
        return;
    };
    let sensor = if mode & 1 == 0 {
        SensorMode::Rgb
    } else {
        SensorMode::ColorIndex
    };
    if let Ok(event) = decode_with(frame, &PortModes::new(sensor)) {
        // Rendering must not panic either.
        let _ = event.to_string();
    }
});
