//! # Error Taxonomy
//!
//! Each component has its own error enum. [`TreasuryError`] is what the
//! composed [`crate::treasury::Treasury`] returns: a thin wrapper that keeps
//! the component error intact.
//!
//! Every error maps onto exactly one [`ErrorCategory`], which is what
//! callers actually branch on (the node turns it into an HTTP status or a
//! JSON-RPC code), plus a stable SCREAMING_SNAKE reason code for machines.
//! Nothing in the core retries: a failed operation has already been rolled
//! back in full by the time the error surfaces.

use ballast_protocol::MathError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::nav_oracle::OracleError;
use crate::reentrancy::ReentrancyError;
use crate::share_ledger::LedgerError;
use crate::treasury_vault::VaultError;

/// What kind of failure this is, independent of which component raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed or out-of-range input. Caller-fixable.
    Validation,
    /// Caller lacks the role for this operation.
    Authorization,
    /// Operation doesn't fit the current state (already processed, not
    /// ready yet, proposal mismatch). May succeed later.
    StateConflict,
    /// Not enough collateral, shares or allowance.
    ResourceInsufficiency,
    /// Would push a protected parameter outside its envelope.
    BoundViolation,
    /// Arithmetic overflow or an operation already in flight.
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Authorization => "authorization",
            ErrorCategory::StateConflict => "state_conflict",
            ErrorCategory::ResourceInsufficiency => "resource_insufficiency",
            ErrorCategory::BoundViolation => "bound_violation",
            ErrorCategory::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Category for a fixed-point arithmetic failure.
pub fn math_category(error: &MathError) -> ErrorCategory {
    match error {
        MathError::UnsupportedDecimals(_) => ErrorCategory::Validation,
        MathError::Overflow | MathError::DivisionByZero => ErrorCategory::Internal,
    }
}

/// Any error a treasury operation can return.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreasuryError {
    /// Share ledger rejected the operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// NAV oracle rejected the operation.
    #[error(transparent)]
    Oracle(#[from] OracleError),

    /// Treasury vault rejected the operation.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// Another operation still holds the re-entrancy latch.
    #[error(transparent)]
    Reentrancy(#[from] ReentrancyError),
}

impl TreasuryError {
    /// Taxonomy bucket.
    pub fn category(&self) -> ErrorCategory {
        match self {
            TreasuryError::Ledger(e) => e.category(),
            TreasuryError::Oracle(e) => e.category(),
            TreasuryError::Vault(e) => e.category(),
            TreasuryError::Reentrancy(_) => ErrorCategory::Internal,
        }
    }

    /// Machine-readable reason code.
    pub fn reason_code(&self) -> &'static str {
        match self {
            TreasuryError::Ledger(e) => e.reason_code(),
            TreasuryError::Oracle(e) => e.reason_code(),
            TreasuryError::Vault(e) => e.reason_code(),
            TreasuryError::Reentrancy(_) => "REENTRANCY",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballast_protocol::Address;

    #[test]
    fn wrapped_errors_keep_category_and_code() {
        let err: TreasuryError = LedgerError::Unauthorized {
            caller: Address::from("mallory"),
        }
        .into();
        assert_eq!(err.category(), ErrorCategory::Authorization);
        assert_eq!(err.reason_code(), "UNAUTHORIZED");
        assert_eq!(err.to_string(), "mallory is not authorized to mint or burn shares");
    }

    #[test]
    fn math_errors_map_to_internal_or_validation() {
        assert_eq!(math_category(&MathError::Overflow), ErrorCategory::Internal);
        assert_eq!(
            math_category(&MathError::UnsupportedDecimals(40)),
            ErrorCategory::Validation
        );
    }

    #[test]
    fn category_display_is_snake_case() {
        assert_eq!(ErrorCategory::ResourceInsufficiency.to_string(), "resource_insufficiency");
        assert_eq!(
            serde_json::to_value(ErrorCategory::StateConflict).unwrap(),
            "state_conflict"
        );
    }
}
