use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A one-shot stop flag broadcast to every workload task.
///
/// Clones share the same flag. Raising it is idempotent and checking it never blocks.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    raised: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal.
    ///
    /// # Returns
    /// `true` if this call raised it, `false` if it was already raised.
    pub fn raise(&self) -> bool {
        !self.raised.swap(true, Ordering::Release)
    }

    #[inline]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}
