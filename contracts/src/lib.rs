// Copyright (c) 2026 Ballast Contributors. MIT License.
// See LICENSE for details.

//! # Ballast Treasury Contracts
//!
//! The accounting and settlement core of the Ballast stable unit: a token
//! backed by approved collateral whose balances rebase with an attested net
//! asset value.
//!
//! - **Share Ledger**: rebasing balances. Holders own shares; balances are
//!   shares priced at the current NAV.
//! - **NAV Oracle**: multi-signer, bounded, staleness-tracked NAV reports.
//! - **Treasury Vault**: deposit/redemption state machine, collateral
//!   accounting and a coverage circuit breaker.
//! - **Treasury**: wires the three together with the collateral
//!   collaborators and runs every operation all-or-nothing.
//!
//! ## Design Principles
//!
//! 1. Money math goes through `ballast_protocol::math`. One rounding rule
//!    (toward zero), checked arithmetic everywhere else.
//! 2. State transitions are explicit: enum variants, not boolean flags.
//! 3. Components talk through narrow capabilities (`NavSource`,
//!    `ShareSupply`, `ShareMinter`), never through each other's internals.
//! 4. Accounting first, external transfer last, one re-entrancy latch held
//!    by the treasury around every operation.
//! 5. Every public type is serializable (serde) for the node's API and
//!    event stream.

pub mod collateral;
pub mod error;
pub mod events;
pub mod nav_oracle;
pub mod reentrancy;
pub mod share_ledger;
pub mod treasury;
pub mod treasury_vault;

pub use collateral::{
    AssetTransfer, CollateralKind, CollateralRegistry, InMemoryCustody, StaticCollateralRegistry,
    TransferError,
};
pub use error::{ErrorCategory, TreasuryError};
pub use events::{EventSink, RecordingSink, TreasuryEvent};
pub use nav_oracle::{AttestationOutcome, NavOracle, NavReport, OracleConfig, OracleError};
pub use share_ledger::{LedgerError, NavSource, ParNav, ShareLedger, ShareMinter, ShareSupply};
pub use treasury::{HealthSummary, Treasury, TreasuryConfig};
pub use treasury_vault::{
    CircuitBreakerState, RedemptionId, RedemptionRequest, RedemptionStatus, TreasuryVault,
    VaultConfig, VaultError,
};
