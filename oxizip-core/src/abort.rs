//! Cooperative cancellation.

use crate::error::{OxiZipError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag checked between chunks by readers, writers, and workers.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    /// Create an un-triggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Fail with [`OxiZipError::Aborted`] once cancellation was requested.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_aborted() {
            Err(OxiZipError::Aborted)
        } else {
            Ok(())
        }
    }
}
