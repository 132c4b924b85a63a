//! # Re-entrancy Latch
//!
//! Deposits and redemptions hand control to an external asset-transfer
//! collaborator, and that collaborator may call back into the treasury.
//! Ordering (effects before interactions) narrows the window; the latch
//! closes it.
//!
//! The latch is a shared flag. The treasury calls [`ReentrancyLatch::enter`]
//! at the start of every operation (ledger, oracle and vault alike) and
//! keeps the returned [`LatchGuard`] alive until the operation has committed
//! or rolled back; the guard clears the flag on drop, including on the error
//! path. Handles are cheap clones of the same flag, so a collaborator
//! that was given a handle sees exactly what the vault sees.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Returned when an operation starts while another one is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("re-entrant call rejected: an operation is already in progress")]
pub struct ReentrancyError;

/// Shared "operation in progress" flag.
#[derive(Debug, Clone, Default)]
pub struct ReentrancyLatch {
    entered: Arc<AtomicBool>,
}

impl ReentrancyLatch {
    /// Creates an open latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes the latch for the lifetime of the returned guard.
    ///
    /// # Errors
    ///
    /// [`ReentrancyError`] if the latch is already closed.
    pub fn enter(&self) -> Result<LatchGuard, ReentrancyError> {
        self.entered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ReentrancyError)?;
        Ok(LatchGuard {
            entered: Arc::clone(&self.entered),
        })
    }

    /// True while some operation holds the latch.
    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }
}

/// Re-opens the latch when dropped.
#[derive(Debug)]
pub struct LatchGuard {
    entered: Arc<AtomicBool>,
}

impl Drop for LatchGuard {
    fn drop(&mut self) {
        self.entered.store(false, Ordering::Release);
    }
}
