use std::io::BufRead;
use std::time::Duration;

use crossbeam_channel as xch;
use hubctl_traits::{AnalogEvent, AnalogSource, BoxError};

use crate::error::{HwError, Result};

/// Parse one line of the analog board protocol.
///
/// Integers are raw flex-sensor samples; `STOP` and `DIR` are the two buttons.
pub fn parse_line(line: &str) -> Result<AnalogEvent> {
    let t = line.trim();
    match t {
        "STOP" => Ok(AnalogEvent::StopPressed),
        "DIR" => Ok(AnalogEvent::DirectionPressed),
        _ => t
            .parse::<i32>()
            .map(AnalogEvent::Sample)
            .map_err(|_| HwError::Parse(t.to_string())),
    }
}

/// [`AnalogSource`] over a line-oriented byte stream.
///
/// A detached reader thread parses lines into a channel. It ends at EOF, on
/// a hard read error, or once this source has been dropped and the next
/// line arrives.
pub struct LineAnalogSource {
    rx: xch::Receiver<AnalogEvent>,
}

impl LineAnalogSource {
    pub fn spawn<R: BufRead + Send + 'static>(reader: R) -> std::io::Result<Self> {
        let (tx, rx) = xch::bounded(64);
        std::thread::Builder::new()
            .name("analog-lines".into())
            .spawn(move || read_lines(reader, &tx))?;
        Ok(Self { rx })
    }
}

fn read_lines<R: BufRead>(mut reader: R, tx: &xch::Sender<AnalogEvent>) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => {
                tracing::debug!("analog board stream closed");
                return;
            }
            Ok(_) if line.trim().is_empty() => {}
            Ok(_) => match parse_line(&line) {
                Ok(ev) => {
                    if tx.send(ev).is_err() {
                        return;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "skipping analog line"),
            },
            // Serial ports report idle periods as timeouts.
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                tracing::warn!(error = %e, "analog board read failed");
                return;
            }
        }
    }
}

impl AnalogSource for LineAnalogSource {
    fn read(&mut self, timeout: Duration) -> std::result::Result<AnalogEvent, BoxError> {
        match self.rx.recv_timeout(timeout) {
            Ok(ev) => Ok(ev),
            Err(xch::RecvTimeoutError::Timeout) => Err(Box::new(HwError::Timeout)),
            Err(xch::RecvTimeoutError::Disconnected) => {
                // The stream is gone for good; keep the caller's poll rate.
                std::thread::sleep(timeout);
                Err(Box::new(HwError::Disconnected))
            }
        }
    }
}

/// Open the analog board on a serial port (the board prints at 9600 baud).
#[cfg(feature = "serial")]
pub fn open_serial(path: &str, baud: u32) -> Result<LineAnalogSource> {
    let port = serialport::new(path, baud)
        .timeout(Duration::from_millis(1000))
        .open()
        .map_err(|e| HwError::Serial(e.to_string()))?;
    tracing::info!(path, baud, "analog board opened");
    Ok(LineAnalogSource::spawn(std::io::BufReader::new(port))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("512", AnalogEvent::Sample(512))]
    #[case("  0\r\n", AnalogEvent::Sample(0))]
    #[case("-3", AnalogEvent::Sample(-3))]
    #[case("STOP\r\n", AnalogEvent::StopPressed)]
    #[case("DIR", AnalogEvent::DirectionPressed)]
    fn parses_board_lines(#[case] line: &str, #[case] expected: AnalogEvent) {
        assert_eq!(parse_line(line).unwrap(), expected);
    }

    #[rstest]
    #[case("stop")]
    #[case("12.5")]
    #[case("x")]
    fn rejects_garbage(#[case] line: &str) {
        assert!(matches!(parse_line(line), Err(HwError::Parse(_))));
    }
}
