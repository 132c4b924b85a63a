//! # Treasury Vault
//!
//! Holds the collateral and runs the deposit/redemption state machine.
//!
//! ## Deposits
//!
//! Collateral in, shares out. The deposit is normalized to 18 decimals, the
//! mint fee is skimmed (it stays in the vault as collateral) and the rest is
//! converted to shares **at the current NAV**.
//!
//! ## Redemptions
//!
//! ```text
//!   request ──▶ PENDING ──(delay)──▶ PROCESSING ──▶ COMPLETED
//!                  │
//!                  └──(requester cancels)──▶ CANCELLED
//! ```
//!
//! Requesting a redemption burns the shares *immediately* at the current
//! NAV and records the resulting amount. That lock is what stops a holder
//! from requesting just before a NAV drop (or cancelling just before a NAV
//! rise) to extract value: the payout is fixed at request time. Only the
//! redeem fee and the denormalization into the payout kind's precision
//! touch it afterwards.
//!
//! Cancelling re-mints the *shares* at whatever NAV is current, which gives
//! back the share position rather than the original amount.
//!
//! `PROCESSING` only exists while the payout transfer is in flight; a
//! re-entrant settlement attempt sees a non-pending request and bounces.
//!
//! ## Circuit breaker
//!
//! Anyone may ask the vault to compare collateral value against the stable
//! supply. Below the threshold the breaker trips and deposits stop until the
//! owner resets it. The reset does not re-check the ratio; that is the
//! operator's call.
//!
//! Every mutating entry point performs the external transfer last. The
//! treasury holds its re-entrancy latch around each call.
//!
//! The vault itself is never a counterparty: it cannot deposit into itself,
//! receive freshly minted shares or queue a redemption.
//!
//! ## Rollback
//!
//! Between [`TreasuryVault::begin`] and [`TreasuryVault::commit`] the vault
//! keeps a checkpoint of its scalar state plus the prior version of every
//! redemption request it touched. [`TreasuryVault::rollback`] puts those
//! back, so undoing an operation never copies the whole request book.

use ballast_protocol::clock::to_chrono;
use ballast_protocol::config::{
    DEFAULT_MINT_FEE_BPS, DEFAULT_MIN_DEPOSIT, DEFAULT_REDEEM_FEE_BPS, DEFAULT_REDEMPTION_DELAY,
    MAX_CIRCUIT_BREAKER_THRESHOLD_BPS, MAX_FEE_BPS, MAX_REDEMPTION_DELAY, MIN_REDEMPTION_DELAY,
};
use ballast_protocol::math::{
    amount_for_shares, bps_of, denormalize, normalize, ratio_bps, shares_for_amount,
};
use ballast_protocol::{amount_serde, Address, MathError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::collateral::{AssetTransfer, CollateralKind, CollateralRegistry, TransferError};
use crate::error::{math_category, ErrorCategory};
use crate::events::TreasuryEvent;
use crate::share_ledger::{LedgerError, NavSource, ShareMinter};

/// Monotonic redemption identifier, starting at 1.
pub type RedemptionId = u64;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the treasury vault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// Owner-only operation called by someone else.
    #[error("{caller} is not the vault owner")]
    Unauthorized {
        /// Who tried.
        caller: Address,
    },

    /// Only the requester may cancel a redemption.
    #[error("{caller} did not request redemption {id}")]
    NotRequester {
        /// Who tried.
        caller: Address,
        /// The request.
        id: RedemptionId,
    },

    /// The registry doesn't accept this kind.
    #[error("collateral {0} is not approved")]
    NotApprovedCollateral(CollateralKind),

    /// The circuit breaker has tripped.
    #[error("circuit breaker is active; deposits are blocked")]
    CircuitBreakerActive,

    /// Deposits are paused.
    #[error("deposits are paused")]
    DepositsPaused,

    /// Redemption requests are paused.
    #[error("redemptions are paused")]
    RedemptionsPaused,

    /// Zero, or more than the caller holds.
    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount {
        /// The offending amount.
        amount: u128,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Deposit below the minimum (or too small to mint a single share).
    #[error("deposit of {normalized} is below the minimum of {minimum}")]
    InsufficientDeposit {
        /// Deposit, normalized to 18 decimals.
        normalized: u128,
        /// Configured minimum.
        minimum: u128,
    },

    /// Empty recipient address.
    #[error("invalid recipient")]
    InvalidRecipient,

    /// The vault's own address used as depositor, recipient or requester.
    #[error("the vault cannot be its own counterparty")]
    VaultAsCounterparty,

    /// The asset collaborator doesn't know this kind's precision.
    #[error("unknown decimals for collateral {0}")]
    UnknownCollateralDecimals(CollateralKind),

    /// No such redemption.
    #[error("redemption {0} not found")]
    RequestNotFound(RedemptionId),

    /// Redemption is no longer pending.
    #[error("redemption {id} is already {status}")]
    RedemptionAlreadyProcessed {
        /// The request.
        id: RedemptionId,
        /// Its current status.
        status: RedemptionStatus,
    },

    /// The redemption delay hasn't elapsed.
    #[error("redemption {id} is not ready until {ready_at}")]
    RedemptionNotReady {
        /// The request.
        id: RedemptionId,
        /// Earliest settlement time.
        ready_at: DateTime<Utc>,
    },

    /// The vault can't cover the payout in any kind.
    #[error("insufficient {kind} collateral: need {required}, hold {available}")]
    InsufficientCollateral {
        /// The kind that was tried last.
        kind: CollateralKind,
        /// Native payout amount.
        required: u128,
        /// Native on-hand amount.
        available: u128,
    },

    /// Fee above [`MAX_FEE_BPS`].
    #[error("fee of {bps} bps exceeds the {max} bps cap")]
    FeeTooHigh {
        /// Requested fee.
        bps: u32,
        /// Cap.
        max: u32,
    },

    /// Delay outside `[MIN_REDEMPTION_DELAY, MAX_REDEMPTION_DELAY]`.
    #[error("redemption delay of {secs}s is outside [{min}s, {max}s]")]
    InvalidRedemptionDelay {
        /// Requested delay.
        secs: u64,
        /// Floor.
        min: u64,
        /// Ceiling.
        max: u64,
    },

    /// Breaker threshold outside `1..=MAX_CIRCUIT_BREAKER_THRESHOLD_BPS`.
    #[error("circuit breaker threshold of {bps} bps is outside [1, {max}]")]
    InvalidCircuitBreakerThreshold {
        /// Requested threshold.
        bps: u32,
        /// Cap.
        max: u32,
    },

    /// The ledger refused a mint or burn.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The asset collaborator refused a transfer.
    #[error("asset transfer failed: {0}")]
    Transfer(#[from] TransferError),

    /// Arithmetic failure.
    #[error("vault arithmetic: {0}")]
    Math(#[from] MathError),
}

impl VaultError {
    /// Taxonomy bucket.
    pub fn category(&self) -> ErrorCategory {
        match self {
            VaultError::Unauthorized { .. } | VaultError::NotRequester { .. } => {
                ErrorCategory::Authorization
            }
            VaultError::NotApprovedCollateral(_)
            | VaultError::InvalidAmount { .. }
            | VaultError::InsufficientDeposit { .. }
            | VaultError::InvalidRecipient
            | VaultError::VaultAsCounterparty
            | VaultError::UnknownCollateralDecimals(_)
            | VaultError::RequestNotFound(_) => ErrorCategory::Validation,
            VaultError::CircuitBreakerActive
            | VaultError::DepositsPaused
            | VaultError::RedemptionsPaused
            | VaultError::RedemptionAlreadyProcessed { .. }
            | VaultError::RedemptionNotReady { .. } => ErrorCategory::StateConflict,
            VaultError::InsufficientCollateral { .. } => ErrorCategory::ResourceInsufficiency,
            VaultError::FeeTooHigh { .. }
            | VaultError::InvalidRedemptionDelay { .. }
            | VaultError::InvalidCircuitBreakerThreshold { .. } => ErrorCategory::BoundViolation,
            VaultError::Ledger(e) => e.category(),
            VaultError::Transfer(TransferError::InsufficientFunds { .. }) => {
                ErrorCategory::ResourceInsufficiency
            }
            VaultError::Transfer(TransferError::UnknownAsset(_)) => ErrorCategory::Validation,
            VaultError::Transfer(TransferError::Rejected(_)) => ErrorCategory::Internal,
            VaultError::Math(e) => math_category(e),
        }
    }

    /// Machine-readable reason code.
    pub fn reason_code(&self) -> &'static str {
        match self {
            VaultError::Unauthorized { .. } => "UNAUTHORIZED",
            VaultError::NotRequester { .. } => "NOT_REQUESTER",
            VaultError::NotApprovedCollateral(_) => "NOT_APPROVED_COLLATERAL",
            VaultError::CircuitBreakerActive => "CIRCUIT_BREAKER_ACTIVE",
            VaultError::DepositsPaused => "DEPOSITS_PAUSED",
            VaultError::RedemptionsPaused => "REDEMPTIONS_PAUSED",
            VaultError::InvalidAmount { .. } => "INVALID_AMOUNT",
            VaultError::InsufficientDeposit { .. } => "INSUFFICIENT_DEPOSIT",
            VaultError::InvalidRecipient => "INVALID_RECIPIENT",
            VaultError::VaultAsCounterparty => "VAULT_AS_COUNTERPARTY",
            VaultError::UnknownCollateralDecimals(_) => "UNKNOWN_COLLATERAL_DECIMALS",
            VaultError::RequestNotFound(_) => "REQUEST_NOT_FOUND",
            VaultError::RedemptionAlreadyProcessed { .. } => "REDEMPTION_ALREADY_PROCESSED",
            VaultError::RedemptionNotReady { .. } => "REDEMPTION_NOT_READY",
            VaultError::InsufficientCollateral { .. } => "INSUFFICIENT_COLLATERAL",
            VaultError::FeeTooHigh { .. } => "FEE_TOO_HIGH",
            VaultError::InvalidRedemptionDelay { .. } => "INVALID_REDEMPTION_DELAY",
            VaultError::InvalidCircuitBreakerThreshold { .. } => "INVALID_CIRCUIT_BREAKER_THRESHOLD",
            VaultError::Ledger(e) => e.reason_code(),
            VaultError::Transfer(TransferError::InsufficientFunds { .. }) => "INSUFFICIENT_FUNDS",
            VaultError::Transfer(TransferError::UnknownAsset(_)) => "UNKNOWN_ASSET",
            VaultError::Transfer(TransferError::Rejected(_)) => "TRANSFER_REJECTED",
            VaultError::Math(_) => "ARITHMETIC_ERROR",
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Lifecycle of a redemption request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedemptionStatus {
    /// Shares burned, waiting out the delay.
    Pending,
    /// Payout transfer in flight.
    Processing,
    /// Paid out. Terminal.
    Completed,
    /// Cancelled by the requester, shares restored. Terminal.
    Cancelled,
}

impl RedemptionStatus {
    /// No transition leaves a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, RedemptionStatus::Completed | RedemptionStatus::Cancelled)
    }
}

impl std::fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RedemptionStatus::Pending => write!(f, "PENDING"),
            RedemptionStatus::Processing => write!(f, "PROCESSING"),
            RedemptionStatus::Completed => write!(f, "COMPLETED"),
            RedemptionStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A queued redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRequest {
    /// Identifier.
    pub id: RedemptionId,
    /// Who asked.
    pub requester: Address,
    /// Amount fixed at request time, 18 decimals.
    #[serde(with = "amount_serde")]
    pub locked_amount: u128,
    /// Shares burned at request time.
    #[serde(with = "amount_serde")]
    pub locked_shares: u128,
    /// Collateral the requester would like back.
    pub preferred_collateral: CollateralKind,
    /// When the request was made.
    pub requested_at: DateTime<Utc>,
    /// When it was settled or cancelled.
    pub processed_at: Option<DateTime<Utc>>,
    /// Where it is in its lifecycle.
    pub status: RedemptionStatus,
    /// Kind actually paid out.
    pub payout_collateral: Option<CollateralKind>,
    /// Native quantity actually paid out.
    #[serde(with = "amount_serde::option")]
    pub payout_amount: Option<u128>,
    /// Redeem fee withheld, 18 decimals.
    #[serde(with = "amount_serde::option")]
    pub fee: Option<u128>,
}

/// Owner-tunable vault parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Fee skimmed from deposits, bps.
    pub mint_fee_bps: u32,
    /// Fee withheld from redemptions, bps.
    pub redeem_fee_bps: u32,
    /// Cooling-off period between request and settlement.
    pub redemption_delay: Duration,
    /// Smallest accepted deposit, 18 decimals.
    #[serde(with = "amount_serde")]
    pub min_deposit: u128,
    /// New deposits blocked.
    pub deposits_paused: bool,
    /// New redemption requests blocked.
    pub redemptions_paused: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            mint_fee_bps: DEFAULT_MINT_FEE_BPS,
            redeem_fee_bps: DEFAULT_REDEEM_FEE_BPS,
            redemption_delay: DEFAULT_REDEMPTION_DELAY,
            min_deposit: DEFAULT_MIN_DEPOSIT,
            deposits_paused: false,
            redemptions_paused: false,
        }
    }
}

/// Collateral-coverage circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    /// Whether checks may trip it.
    pub enabled: bool,
    /// Whether deposits are currently blocked by it.
    pub tripped: bool,
    /// Coverage floor, bps of supply.
    pub threshold_bps: u32,
    /// When it last tripped.
    pub tripped_at: Option<DateTime<Utc>>,
    /// Coverage seen by the last check. `None` before the first check or
    /// when supply was zero.
    #[serde(with = "amount_serde::option")]
    pub last_ratio_bps: Option<u128>,
}

/// What a deposit did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepositReceipt {
    /// Deposit, 18 decimals.
    #[serde(with = "amount_serde")]
    pub normalized_amount: u128,
    /// Mint fee skimmed, 18 decimals.
    #[serde(with = "amount_serde")]
    pub fee: u128,
    /// Amount the recipient received.
    #[serde(with = "amount_serde")]
    pub minted_amount: u128,
    /// Shares minted.
    #[serde(with = "amount_serde")]
    pub shares: u128,
}

/// What a settled redemption paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedemptionSettlement {
    /// The request.
    pub id: RedemptionId,
    /// Who was paid.
    pub requester: Address,
    /// Kind paid out.
    pub collateral: CollateralKind,
    /// Native quantity paid out.
    #[serde(with = "amount_serde")]
    pub payout_amount: u128,
    /// Fee withheld, 18 decimals.
    #[serde(with = "amount_serde")]
    pub fee: u128,
}

/// Everything a vault operation needs from outside the vault.
pub struct VaultContext<'a> {
    /// Ledger the vault mints into and burns from.
    pub ledger: &'a mut dyn ShareMinter,
    /// Current NAV.
    pub nav: &'a dyn NavSource,
    /// Collateral allow-list.
    pub registry: &'a dyn CollateralRegistry,
    /// Asset mover.
    pub assets: &'a mut dyn AssetTransfer,
    /// The serialized clock's reading for this operation.
    pub now: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// State saved by [`TreasuryVault::begin`].
#[derive(Debug, Clone)]
struct VaultCheckpoint {
    config: VaultConfig,
    collateral_balances: BTreeMap<CollateralKind, u128>,
    total_collateral_value: u128,
    total_fees_collected: u128,
    next_request_id: RedemptionId,
    total_pending_redemption_shares: u128,
    circuit_breaker: CircuitBreakerState,
    /// Prior version of each request written since the checkpoint, first
    /// write only. `None` for requests created since.
    requests: Vec<(RedemptionId, Option<RedemptionRequest>)>,
}

/// The treasury vault.
#[derive(Debug, Clone)]
pub struct TreasuryVault {
    address: Address,
    owner: Address,
    config: VaultConfig,
    collateral_balances: BTreeMap<CollateralKind, u128>,
    total_collateral_value: u128,
    total_fees_collected: u128,
    requests: BTreeMap<RedemptionId, RedemptionRequest>,
    next_request_id: RedemptionId,
    total_pending_redemption_shares: u128,
    circuit_breaker: CircuitBreakerState,
    checkpoint: Option<VaultCheckpoint>,
    events: Vec<TreasuryEvent>,
}

impl TreasuryVault {
    /// Creates an empty vault.
    ///
    /// `address` is both the vault's custody account and the identity it
    /// mints and burns shares under.
    pub fn new(
        address: Address,
        owner: Address,
        config: VaultConfig,
        breaker_enabled: bool,
        breaker_threshold_bps: u32,
    ) -> Result<Self, VaultError> {
        check_fee(config.mint_fee_bps)?;
        check_fee(config.redeem_fee_bps)?;
        check_delay(config.redemption_delay)?;
        check_breaker_threshold(breaker_threshold_bps)?;
        if config.min_deposit == 0 {
            return Err(VaultError::InvalidAmount {
                amount: 0,
                reason: "minimum deposit must be positive",
            });
        }

        Ok(Self {
            address,
            owner,
            config,
            collateral_balances: BTreeMap::new(),
            total_collateral_value: 0,
            total_fees_collected: 0,
            requests: BTreeMap::new(),
            next_request_id: 1,
            total_pending_redemption_shares: 0,
            circuit_breaker: CircuitBreakerState {
                enabled: breaker_enabled,
                tripped: false,
                threshold_bps: breaker_threshold_bps,
                tripped_at: None,
                last_ratio_bps: None,
            },
            checkpoint: None,
            events: Vec::new(),
        })
    }

    // -- Transactions -------------------------------------------------------

    /// Starts recording what the next operations change.
    pub fn begin(&mut self) {
        self.checkpoint = Some(VaultCheckpoint {
            config: self.config.clone(),
            collateral_balances: self.collateral_balances.clone(),
            total_collateral_value: self.total_collateral_value,
            total_fees_collected: self.total_fees_collected,
            next_request_id: self.next_request_id,
            total_pending_redemption_shares: self.total_pending_redemption_shares,
            circuit_breaker: self.circuit_breaker.clone(),
            requests: Vec::new(),
        });
    }

    /// Keeps everything since [`TreasuryVault::begin`].
    pub fn commit(&mut self) {
        self.checkpoint = None;
    }

    /// Undoes everything since [`TreasuryVault::begin`] and drops the
    /// buffered events. A no-op without an open checkpoint.
    pub fn rollback(&mut self) {
        self.events.clear();
        let Some(checkpoint) = self.checkpoint.take() else {
            return;
        };
        self.config = checkpoint.config;
        self.collateral_balances = checkpoint.collateral_balances;
        self.total_collateral_value = checkpoint.total_collateral_value;
        self.total_fees_collected = checkpoint.total_fees_collected;
        self.next_request_id = checkpoint.next_request_id;
        self.total_pending_redemption_shares = checkpoint.total_pending_redemption_shares;
        self.circuit_breaker = checkpoint.circuit_breaker;
        for (id, previous) in checkpoint.requests.into_iter().rev() {
            match previous {
                Some(request) => self.requests.insert(id, request),
                None => self.requests.remove(&id),
            };
        }
    }

    /// Remembers request `id` as it is now, unless it was already recorded
    /// in this checkpoint.
    fn record_request(&mut self, id: RedemptionId) {
        if let Some(checkpoint) = self.checkpoint.as_mut() {
            if checkpoint.requests.iter().all(|(seen, _)| *seen != id) {
                checkpoint.requests.push((id, self.requests.get(&id).cloned()));
            }
        }
    }

    fn ensure_not_vault(&self, who: &Address) -> Result<(), VaultError> {
        if who == &self.address {
            return Err(VaultError::VaultAsCounterparty);
        }
        Ok(())
    }

    // -- Deposits -----------------------------------------------------------

    /// Pulls `amount` (native precision) of `kind` from `caller` and mints
    /// shares to `recipient`.
    pub fn deposit(
        &mut self,
        ctx: &mut VaultContext<'_>,
        caller: &Address,
        kind: &CollateralKind,
        amount: u128,
        recipient: &Address,
    ) -> Result<DepositReceipt, VaultError> {
        if !ctx.registry.is_approved_collateral(kind) {
            return Err(VaultError::NotApprovedCollateral(kind.clone()));
        }
        if self.circuit_breaker.tripped {
            return Err(VaultError::CircuitBreakerActive);
        }
        if self.config.deposits_paused {
            return Err(VaultError::DepositsPaused);
        }
        if amount == 0 {
            return Err(VaultError::InvalidAmount {
                amount,
                reason: "deposit must be positive",
            });
        }
        if recipient.is_empty() {
            return Err(VaultError::InvalidRecipient);
        }
        self.ensure_not_vault(caller)?;
        self.ensure_not_vault(recipient)?;
        let decimals = ctx
            .assets
            .decimals(kind)
            .ok_or_else(|| VaultError::UnknownCollateralDecimals(kind.clone()))?;

        let normalized = normalize(amount, decimals)?;
        let fee = bps_of(normalized, self.config.mint_fee_bps)?;
        let minted_amount = normalized - fee;
        let nav = ctx.nav.nav_per_share();
        let shares = shares_for_amount(minted_amount, nav)?;
        if normalized < self.config.min_deposit || shares == 0 {
            return Err(VaultError::InsufficientDeposit {
                normalized,
                minimum: self.config.min_deposit,
            });
        }

        let balance = self
            .collateral_balance(kind)
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;
        let total_value = self
            .total_collateral_value
            .checked_add(normalized)
            .ok_or(MathError::Overflow)?;
        let fees = self
            .total_fees_collected
            .checked_add(fee)
            .ok_or(MathError::Overflow)?;

        // Effects.
        self.collateral_balances.insert(kind.clone(), balance);
        self.total_collateral_value = total_value;
        self.total_fees_collected = fees;
        ctx.ledger.mint(&self.address, recipient, shares, ctx.nav)?;

        // Interaction.
        ctx.assets.transfer_from(kind, caller, amount)?;

        info!(
            depositor = %caller,
            recipient = %recipient,
            collateral = %kind,
            amount,
            normalized,
            shares,
            fee,
            "deposit accepted"
        );
        self.events.push(TreasuryEvent::Deposited {
            depositor: caller.clone(),
            recipient: recipient.clone(),
            collateral: kind.clone(),
            collateral_amount: amount,
            normalized_amount: normalized,
            minted_amount,
            shares,
            fee,
        });
        Ok(DepositReceipt {
            normalized_amount: normalized,
            fee,
            minted_amount,
            shares,
        })
    }

    // -- Redemptions --------------------------------------------------------

    /// Burns `stable_amount` worth of `caller`'s shares at the current NAV
    /// and queues a redemption.
    pub fn request_redemption(
        &mut self,
        ctx: &mut VaultContext<'_>,
        caller: &Address,
        stable_amount: u128,
        preferred: &CollateralKind,
    ) -> Result<RedemptionRequest, VaultError> {
        if self.config.redemptions_paused {
            return Err(VaultError::RedemptionsPaused);
        }
        if stable_amount == 0 {
            return Err(VaultError::InvalidAmount {
                amount: stable_amount,
                reason: "redemption must be positive",
            });
        }
        if !ctx.registry.is_approved_collateral(preferred) {
            return Err(VaultError::NotApprovedCollateral(preferred.clone()));
        }
        self.ensure_not_vault(caller)?;

        let nav = ctx.nav.nav_per_share();
        let balance = amount_for_shares(ctx.ledger.shares_of(caller), nav)?;
        if stable_amount > balance {
            return Err(VaultError::InvalidAmount {
                amount: stable_amount,
                reason: "exceeds balance",
            });
        }
        let locked_shares = shares_for_amount(stable_amount, nav)?;
        if locked_shares == 0 {
            return Err(VaultError::InvalidAmount {
                amount: stable_amount,
                reason: "converts to zero shares",
            });
        }
        let locked_amount = amount_for_shares(locked_shares, nav)?;
        let pending = self
            .total_pending_redemption_shares
            .checked_add(locked_shares)
            .ok_or(MathError::Overflow)?;
        let id = self.next_request_id;
        let next_id = id.checked_add(1).ok_or(MathError::Overflow)?;

        ctx.ledger.burn(&self.address, caller, locked_shares, ctx.nav)?;

        let request = RedemptionRequest {
            id,
            requester: caller.clone(),
            locked_amount,
            locked_shares,
            preferred_collateral: preferred.clone(),
            requested_at: ctx.now,
            processed_at: None,
            status: RedemptionStatus::Pending,
            payout_collateral: None,
            payout_amount: None,
            fee: None,
        };
        self.record_request(id);
        self.requests.insert(id, request.clone());
        self.next_request_id = next_id;
        self.total_pending_redemption_shares = pending;

        let ready_at = ctx.now + to_chrono(self.config.redemption_delay);
        info!(
            id,
            requester = %caller,
            locked_amount,
            locked_shares,
            preferred = %preferred,
            %ready_at,
            "redemption requested"
        );
        self.events.push(TreasuryEvent::RedemptionRequested {
            id,
            requester: caller.clone(),
            locked_amount,
            locked_shares,
            preferred_collateral: preferred.clone(),
            ready_at,
        });
        Ok(request)
    }

    /// Cancels a pending redemption and re-mints its shares to the
    /// requester. Returns the shares restored.
    pub fn cancel_redemption(
        &mut self,
        ctx: &mut VaultContext<'_>,
        caller: &Address,
        id: RedemptionId,
    ) -> Result<u128, VaultError> {
        let request = self
            .requests
            .get(&id)
            .ok_or(VaultError::RequestNotFound(id))?;
        if &request.requester != caller {
            return Err(VaultError::NotRequester {
                caller: caller.clone(),
                id,
            });
        }
        if request.status != RedemptionStatus::Pending {
            return Err(VaultError::RedemptionAlreadyProcessed {
                id,
                status: request.status,
            });
        }
        let shares = request.locked_shares;

        ctx.ledger.mint(&self.address, caller, shares, ctx.nav)?;
        self.record_request(id);
        if let Some(request) = self.requests.get_mut(&id) {
            request.status = RedemptionStatus::Cancelled;
            request.processed_at = Some(ctx.now);
        }
        // Pending requests are always counted, so this cannot underflow.
        self.total_pending_redemption_shares -= shares;

        info!(id, requester = %caller, shares, "redemption cancelled");
        self.events.push(TreasuryEvent::RedemptionCancelled {
            id,
            requester: caller.clone(),
            restored_shares: shares,
        });
        Ok(shares)
    }

    /// Settles one redemption whose delay has elapsed. Anyone may call.
    pub fn process_redemption(
        &mut self,
        ctx: &mut VaultContext<'_>,
        id: RedemptionId,
    ) -> Result<RedemptionSettlement, VaultError> {
        self.settle(ctx, id)
    }

    /// Settles every listed redemption, or none of them. The caller is
    /// responsible for discarding partial effects on error; the treasury
    /// does that with [`TreasuryVault::rollback`].
    pub fn process_batch_redemptions(
        &mut self,
        ctx: &mut VaultContext<'_>,
        ids: &[RedemptionId],
    ) -> Result<Vec<RedemptionSettlement>, VaultError> {
        let mut settlements = Vec::with_capacity(ids.len());
        for &id in ids {
            settlements.push(self.settle(ctx, id)?);
        }
        Ok(settlements)
    }

    fn settle(
        &mut self,
        ctx: &mut VaultContext<'_>,
        id: RedemptionId,
    ) -> Result<RedemptionSettlement, VaultError> {
        let request = self
            .requests
            .get(&id)
            .ok_or(VaultError::RequestNotFound(id))?;
        if request.status != RedemptionStatus::Pending {
            return Err(VaultError::RedemptionAlreadyProcessed {
                id,
                status: request.status,
            });
        }
        let ready_at = request.requested_at + to_chrono(self.config.redemption_delay);
        if ctx.now < ready_at {
            return Err(VaultError::RedemptionNotReady { id, ready_at });
        }

        let requester = request.requester.clone();
        let locked_shares = request.locked_shares;
        let fee = bps_of(request.locked_amount, self.config.redeem_fee_bps)?;
        let payout = request.locked_amount - fee;
        let preferred = request.preferred_collateral.clone();

        let (kind, decimals, native) = self.select_payout(ctx, &preferred, payout)?;
        let available = self.collateral_balance(&kind);
        if available < native {
            return Err(VaultError::InsufficientCollateral {
                kind,
                required: native,
                available,
            });
        }
        let released_value = normalize(native, decimals)?;
        let fees = self
            .total_fees_collected
            .checked_add(fee)
            .ok_or(MathError::Overflow)?;

        // Effects.
        self.collateral_balances.insert(kind.clone(), available - native);
        self.total_collateral_value = self.total_collateral_value.saturating_sub(released_value);
        self.total_fees_collected = fees;
        self.total_pending_redemption_shares -= locked_shares;
        self.record_request(id);
        if let Some(request) = self.requests.get_mut(&id) {
            request.status = RedemptionStatus::Processing;
            request.processed_at = Some(ctx.now);
            request.payout_collateral = Some(kind.clone());
            request.payout_amount = Some(native);
            request.fee = Some(fee);
        }

        // Interaction.
        if native > 0 {
            ctx.assets.transfer_to(&kind, &requester, native)?;
        }

        if let Some(request) = self.requests.get_mut(&id) {
            request.status = RedemptionStatus::Completed;
        }
        info!(
            id,
            requester = %requester,
            collateral = %kind,
            payout = native,
            fee,
            "redemption processed"
        );
        self.events.push(TreasuryEvent::RedemptionProcessed {
            id,
            requester: requester.clone(),
            collateral: kind.clone(),
            payout: native,
            fee,
        });
        Ok(RedemptionSettlement {
            id,
            requester,
            collateral: kind,
            payout_amount: native,
            fee,
        })
    }

    /// Picks the payout kind: the preferred one if it covers the payout,
    /// otherwise the first other kind (registry order, then any remaining
    /// held kinds) with a non-zero balance. Falls back to the preferred kind
    /// so that the shortfall is reported against it.
    fn select_payout(
        &self,
        ctx: &VaultContext<'_>,
        preferred: &CollateralKind,
        payout: u128,
    ) -> Result<(CollateralKind, u8, u128), VaultError> {
        let quote = |kind: &CollateralKind| -> Result<(u8, u128), VaultError> {
            let decimals = ctx
                .assets
                .decimals(kind)
                .ok_or_else(|| VaultError::UnknownCollateralDecimals(kind.clone()))?;
            Ok((decimals, denormalize(payout, decimals)?))
        };

        let (decimals, native) = quote(preferred)?;
        if self.collateral_balance(preferred) >= native {
            return Ok((preferred.clone(), decimals, native));
        }

        let mut candidates = ctx.registry.list_approved_collateral();
        for held in self.collateral_balances.keys() {
            if !candidates.contains(held) {
                candidates.push(held.clone());
            }
        }
        for kind in candidates.iter().filter(|k| *k != preferred) {
            if self.collateral_balance(kind) > 0 {
                let (decimals, native) = quote(kind)?;
                return Ok((kind.clone(), decimals, native));
            }
        }
        Ok((preferred.clone(), decimals, native))
    }

    // -- Circuit breaker ----------------------------------------------------

    /// Compares collateral value with `total_supply` (rebased, 18 decimals)
    /// and trips the breaker if coverage is below the threshold. Returns
    /// whether the breaker is tripped afterwards. Anyone may call.
    pub fn check_circuit_breaker(
        &mut self,
        total_supply: u128,
        now: DateTime<Utc>,
    ) -> Result<bool, VaultError> {
        let ratio = self.collateral_ratio_bps(total_supply)?;
        self.circuit_breaker.last_ratio_bps = ratio;
        let Some(ratio) = ratio else {
            return Ok(self.circuit_breaker.tripped);
        };
        let threshold = self.circuit_breaker.threshold_bps;
        if self.circuit_breaker.enabled
            && !self.circuit_breaker.tripped
            && ratio < u128::from(threshold)
        {
            self.circuit_breaker.tripped = true;
            self.circuit_breaker.tripped_at = Some(now);
            warn!(
                ratio_bps = ratio,
                threshold_bps = threshold,
                collateral_value = self.total_collateral_value,
                total_supply,
                "circuit breaker tripped; deposits blocked"
            );
            self.events.push(TreasuryEvent::CircuitBreakerTripped {
                ratio_bps: ratio,
                threshold_bps: threshold,
            });
        }
        Ok(self.circuit_breaker.tripped)
    }

    /// Collateral value over `total_supply`, in bps. `None` for zero supply.
    pub fn collateral_ratio_bps(&self, total_supply: u128) -> Result<Option<u128>, VaultError> {
        if total_supply == 0 {
            return Ok(None);
        }
        Ok(Some(ratio_bps(self.total_collateral_value, total_supply)?))
    }

    // -- Administration -----------------------------------------------------

    fn ensure_owner(&self, caller: &Address) -> Result<(), VaultError> {
        if caller != &self.owner {
            return Err(VaultError::Unauthorized {
                caller: caller.clone(),
            });
        }
        Ok(())
    }

    /// Sets mint and redeem fees.
    pub fn set_fees(&mut self, caller: &Address, mint_fee_bps: u32, redeem_fee_bps: u32) -> Result<(), VaultError> {
        self.ensure_owner(caller)?;
        check_fee(mint_fee_bps)?;
        check_fee(redeem_fee_bps)?;
        self.config.mint_fee_bps = mint_fee_bps;
        self.config.redeem_fee_bps = redeem_fee_bps;
        info!(mint_fee_bps, redeem_fee_bps, "fees updated");
        self.events.push(TreasuryEvent::FeesUpdated {
            mint_fee_bps,
            redeem_fee_bps,
        });
        Ok(())
    }

    /// Sets the redemption delay. Applies to pending requests too.
    pub fn set_redemption_delay(&mut self, caller: &Address, delay: Duration) -> Result<(), VaultError> {
        self.ensure_owner(caller)?;
        check_delay(delay)?;
        self.config.redemption_delay = delay;
        info!(delay_secs = delay.as_secs(), "redemption delay updated");
        self.events.push(TreasuryEvent::RedemptionDelayUpdated {
            delay_secs: delay.as_secs(),
        });
        Ok(())
    }

    /// Sets the minimum deposit (18 decimals).
    pub fn set_min_deposit(&mut self, caller: &Address, min_deposit: u128) -> Result<(), VaultError> {
        self.ensure_owner(caller)?;
        if min_deposit == 0 {
            return Err(VaultError::InvalidAmount {
                amount: 0,
                reason: "minimum deposit must be positive",
            });
        }
        self.config.min_deposit = min_deposit;
        info!(min_deposit, "minimum deposit updated");
        self.events
            .push(TreasuryEvent::MinDepositUpdated { min_deposit });
        Ok(())
    }

    /// Pauses or resumes deposits.
    pub fn pause_deposits(&mut self, caller: &Address, paused: bool) -> Result<(), VaultError> {
        self.ensure_owner(caller)?;
        self.config.deposits_paused = paused;
        info!(paused, "deposit pause flag set");
        self.events.push(TreasuryEvent::DepositsPaused { paused });
        Ok(())
    }

    /// Pauses or resumes redemption requests. Settlement of already
    /// queued requests is not affected.
    pub fn pause_redemptions(&mut self, caller: &Address, paused: bool) -> Result<(), VaultError> {
        self.ensure_owner(caller)?;
        self.config.redemptions_paused = paused;
        info!(paused, "redemption pause flag set");
        self.events.push(TreasuryEvent::RedemptionsPaused { paused });
        Ok(())
    }

    /// Enables/disables the breaker and sets its threshold. A tripped
    /// breaker stays tripped until [`TreasuryVault::reset_circuit_breaker`].
    pub fn configure_circuit_breaker(
        &mut self,
        caller: &Address,
        enabled: bool,
        threshold_bps: u32,
    ) -> Result<(), VaultError> {
        self.ensure_owner(caller)?;
        check_breaker_threshold(threshold_bps)?;
        self.circuit_breaker.enabled = enabled;
        self.circuit_breaker.threshold_bps = threshold_bps;
        info!(enabled, threshold_bps, "circuit breaker configured");
        self.events.push(TreasuryEvent::CircuitBreakerConfigured {
            enabled,
            threshold_bps,
        });
        Ok(())
    }

    /// Clears a tripped breaker without re-checking coverage.
    pub fn reset_circuit_breaker(&mut self, caller: &Address) -> Result<(), VaultError> {
        self.ensure_owner(caller)?;
        self.circuit_breaker.tripped = false;
        self.circuit_breaker.tripped_at = None;
        info!(by = %caller, "circuit breaker reset");
        self.events
            .push(TreasuryEvent::CircuitBreakerReset { by: caller.clone() });
        Ok(())
    }

    // -- Reads --------------------------------------------------------------

    /// The vault's custody and minting identity.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The owner.
    pub fn owner(&self) -> &Address {
        &self.owner
    }

    /// Current parameters.
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Request `id`.
    pub fn redemption_request(&self, id: RedemptionId) -> Option<&RedemptionRequest> {
        self.requests.get(&id)
    }

    /// All of `requester`'s requests, oldest first.
    pub fn requests_of(&self, requester: &Address) -> Vec<&RedemptionRequest> {
        self.requests
            .values()
            .filter(|r| &r.requester == requester)
            .collect()
    }

    /// Every request, oldest first.
    pub fn requests(&self) -> impl Iterator<Item = &RedemptionRequest> + '_ {
        self.requests.values()
    }

    /// Requests in `PENDING`.
    pub fn pending_redemption_count(&self) -> usize {
        self.requests
            .values()
            .filter(|r| r.status == RedemptionStatus::Pending)
            .count()
    }

    /// Shares locked by pending requests.
    pub fn total_pending_redemption_shares(&self) -> u128 {
        self.total_pending_redemption_shares
    }

    /// On-hand quantity of `kind`, native precision.
    pub fn collateral_balance(&self, kind: &CollateralKind) -> u128 {
        self.collateral_balances.get(kind).copied().unwrap_or(0)
    }

    /// Every held kind and its on-hand quantity.
    pub fn collateral_balances(&self) -> &BTreeMap<CollateralKind, u128> {
        &self.collateral_balances
    }

    /// Collateral value, 18 decimals.
    pub fn total_collateral_value(&self) -> u128 {
        self.total_collateral_value
    }

    /// Fees collected so far, 18 decimals.
    pub fn total_fees_collected(&self) -> u128 {
        self.total_fees_collected
    }

    /// Breaker state.
    pub fn circuit_breaker(&self) -> &CircuitBreakerState {
        &self.circuit_breaker
    }

    /// Earliest settlement time of request `id` under the current delay.
    pub fn redemption_ready_at(&self, id: RedemptionId) -> Option<DateTime<Utc>> {
        self.requests
            .get(&id)
            .map(|r| r.requested_at + to_chrono(self.config.redemption_delay))
    }

    /// Id the next request will get.
    pub fn next_request_id(&self) -> RedemptionId {
        self.next_request_id
    }

    /// Drains the events buffered since the last call.
    pub fn take_events(&mut self) -> Vec<TreasuryEvent> {
        std::mem::take(&mut self.events)
    }
}

fn check_fee(bps: u32) -> Result<(), VaultError> {
    if bps > MAX_FEE_BPS {
        return Err(VaultError::FeeTooHigh {
            bps,
            max: MAX_FEE_BPS,
        });
    }
    Ok(())
}

fn check_delay(delay: Duration) -> Result<(), VaultError> {
    if delay < MIN_REDEMPTION_DELAY || delay > MAX_REDEMPTION_DELAY {
        return Err(VaultError::InvalidRedemptionDelay {
            secs: delay.as_secs(),
            min: MIN_REDEMPTION_DELAY.as_secs(),
            max: MAX_REDEMPTION_DELAY.as_secs(),
        });
    }
    Ok(())
}

fn check_breaker_threshold(bps: u32) -> Result<(), VaultError> {
    if bps == 0 || bps > MAX_CIRCUIT_BREAKER_THRESHOLD_BPS {
        return Err(VaultError::InvalidCircuitBreakerThreshold {
            bps,
            max: MAX_CIRCUIT_BREAKER_THRESHOLD_BPS,
        });
    }
    Ok(())
}
