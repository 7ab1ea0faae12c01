//! Ambient call context: deadline + cancellation, threaded explicitly
//! through store calls and state functions (per the design note against
//! inferring a language-specific ambient-logger pattern — this plays the
//! same role Go's `context.Context` plays in the source protocol).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::CryptoError;

#[derive(Clone)]
pub struct Context {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl Context {
    pub fn background() -> Self {
        Self { deadline: None, cancelled: Arc::new(AtomicBool::new(false)) }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Call at the top of any store operation; translates cancellation or
    /// deadline expiry into the same fatal error class as any other
    /// store-unavailability failure.
    pub fn check(&self) -> Result<(), CryptoError> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(CryptoError::Context("cancelled".into()));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                return Err(CryptoError::Context("deadline exceeded".into()));
            }
        }
        Ok(())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
