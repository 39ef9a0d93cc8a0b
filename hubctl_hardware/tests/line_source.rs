use std::io::Cursor;
use std::time::Duration;

use hubctl_hardware::{HwError, LineAnalogSource};
use hubctl_traits::{AnalogEvent, AnalogSource};

fn err_of(e: &hubctl_traits::BoxError) -> &HwError {
    e.downcast_ref::<HwError>().unwrap()
}

#[test]
fn reads_samples_and_buttons_then_reports_disconnect() {
    let input = Cursor::new(b"512\r\nSTOP\nnoise\n\n700\nDIR\n".to_vec());
    let mut src = LineAnalogSource::spawn(input).unwrap();
    let t = Duration::from_millis(500);

    assert_eq!(src.read(t).unwrap(), AnalogEvent::Sample(512));
    assert_eq!(src.read(t).unwrap(), AnalogEvent::StopPressed);
    // Garbage and blank lines are skipped.
    assert_eq!(src.read(t).unwrap(), AnalogEvent::Sample(700));
    assert_eq!(src.read(t).unwrap(), AnalogEvent::DirectionPressed);

    let e = src.read(Duration::from_millis(10)).unwrap_err();
    assert!(matches!(err_of(&e), HwError::Disconnected));
}

/// Serial-port-like reader that never has data.
struct Idle;

impl std::io::Read for Idle {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        std::thread::sleep(Duration::from_millis(5));
        Err(std::io::ErrorKind::TimedOut.into())
    }
}

#[test]
fn idle_stream_times_out() {
    let mut src = LineAnalogSource::spawn(std::io::BufReader::new(Idle)).unwrap();
    let e = src.read(Duration::from_millis(20)).unwrap_err();
    assert!(matches!(err_of(&e), HwError::Timeout));
}
