use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared hub link liveness flag.
///
/// Timers that fire after a delay check this before sending anything.
#[derive(Debug, Clone)]
pub struct LinkState(Arc<AtomicBool>);

impl Default for LinkState {
    fn default() -> Self {
        Self::new(true)
    }
}

impl LinkState {
    pub fn new(connected: bool) -> Self {
        Self(Arc::new(AtomicBool::new(connected)))
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns the previous value.
    pub fn set(&self, connected: bool) -> bool {
        self.0.swap(connected, Ordering::AcqRel)
    }
}
