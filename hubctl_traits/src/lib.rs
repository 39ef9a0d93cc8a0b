//! Seam traits shared by the hub control stack.
//!
//! Everything that touches the outside world (the hub link, the analog
//! input board, wall-clock time and delayed callbacks) goes through one of
//! these traits so the core can be driven by simulated devices in tests.
pub mod clock;
pub mod scheduler;

pub use clock::{Clock, MonotonicClock, SharedClock};
pub use scheduler::{Scheduler, Task, TimerHandle};

/// Boxed error used at every seam.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Callback receiving raw inbound notification bytes from the hub.
pub type NotifyFn = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Byte link to a single hub.
///
/// Only the dispatcher loop calls `write`; producers never hold a transport.
pub trait Transport {
    /// Open the link and register the notification callback.
    fn connect(&mut self, on_notify: NotifyFn) -> Result<(), BoxError>;

    /// Write one complete frame.
    fn write(&mut self, frame: &[u8]) -> Result<(), BoxError>;

    fn disconnect(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self, on_notify: NotifyFn) -> Result<(), BoxError> {
        (**self).connect(on_notify)
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), BoxError> {
        (**self).write(frame)
    }

    fn disconnect(&mut self) -> Result<(), BoxError> {
        (**self).disconnect()
    }
}

/// One item produced by the analog input board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalogEvent {
    /// Raw analog sample (board defined range, typically 0..=1023).
    Sample(i32),
    /// The stop button was pressed.
    StopPressed,
    /// The direction button was pressed.
    DirectionPressed,
}

/// Push-style analog input source.
pub trait AnalogSource {
    /// Block for at most `timeout` waiting for the next event.
    fn read(&mut self, timeout: std::time::Duration) -> Result<AnalogEvent, BoxError>;
}

impl<S: AnalogSource + ?Sized> AnalogSource for Box<S> {
    fn read(&mut self, timeout: std::time::Duration) -> Result<AnalogEvent, BoxError> {
        (**self).read(timeout)
    }
}
