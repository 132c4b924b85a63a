//! # Treasury
//!
//! The single entry point. [`Treasury`] owns the ledger, the oracle, the
//! vault, both collaborators and the clock, and runs every operation the
//! same way:
//!
//! 1. Close the re-entrancy latch. It stays closed until the operation
//!    has committed or rolled back, so a collaborator called mid-operation
//!    cannot start another one.
//! 2. Read the clock once. That reading is "now" for the whole operation.
//! 3. Open a transaction on the ledger, the oracle, the vault and the asset
//!    collaborator. Each one records only what it overwrites.
//! 4. Run the operation.
//! 5. On success, commit everywhere and publish the buffered events.
//!    On error, roll everything back, which also drops the buffered events.
//!
//! So an operation either happens completely or not at all, and subscribers
//! only ever hear about operations that happened. Serialization between
//! callers is the embedder's job: `&mut self` makes it impossible to do
//! otherwise in-process, and the node puts the whole treasury behind one
//! mutex.

use ballast_protocol::config::DEFAULT_CIRCUIT_BREAKER_THRESHOLD_BPS;
use ballast_protocol::crypto::Hash32;
use ballast_protocol::{amount_serde, Address, Clock};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::collateral::{AssetTransfer, CollateralKind, CollateralRegistry};
use crate::error::TreasuryError;
use crate::events::EventSink;
use crate::nav_oracle::{AttestationOutcome, NavOracle, OracleConfig};
use crate::reentrancy::ReentrancyLatch;
use crate::share_ledger::ShareLedger;
use crate::treasury_vault::{
    CircuitBreakerState, DepositReceipt, RedemptionId, RedemptionRequest, RedemptionSettlement,
    TreasuryVault, VaultConfig, VaultContext,
};

/// Everything needed to stand up a treasury.
#[derive(Debug, Clone)]
pub struct TreasuryConfig {
    /// Administrator of the oracle and the vault.
    pub owner: Address,
    /// The vault's custody and minting identity.
    pub vault_address: Address,
    /// Initial attestor set.
    pub attestors: Vec<Address>,
    /// Oracle tunables.
    pub oracle: OracleConfig,
    /// Vault tunables.
    pub vault: VaultConfig,
    /// Whether the circuit breaker starts enabled.
    pub circuit_breaker_enabled: bool,
    /// Coverage floor, bps.
    pub circuit_breaker_threshold_bps: u32,
}

impl TreasuryConfig {
    /// Defaults everywhere, no attestors.
    pub fn new(owner: Address, vault_address: Address) -> Self {
        Self {
            owner,
            vault_address,
            attestors: Vec::new(),
            oracle: OracleConfig::default(),
            vault: VaultConfig::default(),
            circuit_breaker_enabled: true,
            circuit_breaker_threshold_bps: DEFAULT_CIRCUIT_BREAKER_THRESHOLD_BPS,
        }
    }
}

/// Point-in-time view for dashboards and the node's `/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    /// Current NAV per share.
    #[serde(with = "amount_serde")]
    pub nav_per_share: u128,
    /// Whether the current report is within the staleness window.
    pub nav_fresh: bool,
    /// Age of the current report.
    pub seconds_since_last_report: Option<i64>,
    /// Business date of the current report.
    pub last_report_date: Option<u64>,
    /// Rebased supply.
    #[serde(with = "amount_serde")]
    pub total_supply: u128,
    /// Raw shares outstanding.
    #[serde(with = "amount_serde")]
    pub total_shares: u128,
    /// Accounts holding shares.
    pub holders: usize,
    /// Collateral value, 18 decimals.
    #[serde(with = "amount_serde")]
    pub total_collateral_value: u128,
    /// Coverage in bps; `None` for zero supply.
    #[serde(with = "amount_serde::option")]
    pub collateral_ratio_bps: Option<u128>,
    /// Breaker state.
    pub circuit_breaker: CircuitBreakerState,
    /// Deposit pause flag.
    pub deposits_paused: bool,
    /// Redemption pause flag.
    pub redemptions_paused: bool,
    /// Requests waiting to settle.
    pub pending_redemptions: usize,
    /// Shares locked by pending requests.
    #[serde(with = "amount_serde")]
    pub pending_redemption_shares: u128,
    /// Fees collected so far.
    #[serde(with = "amount_serde")]
    pub total_fees_collected: u128,
    /// Authorized attestors.
    pub attestors: usize,
    /// Signatures needed to finalize a report.
    pub attestation_threshold: usize,
    /// Signatures on the in-flight proposal, if there is one.
    pub pending_attestation_signers: Option<usize>,
}

/// The composed treasury.
pub struct Treasury {
    ledger: ShareLedger,
    oracle: NavOracle,
    vault: TreasuryVault,
    registry: Box<dyn CollateralRegistry>,
    assets: Box<dyn AssetTransfer>,
    clock: Arc<dyn Clock>,
    sink: Option<Arc<dyn EventSink>>,
    latch: ReentrancyLatch,
}

impl Treasury {
    /// Wires a fresh treasury together.
    pub fn new(
        config: TreasuryConfig,
        registry: impl CollateralRegistry + 'static,
        assets: impl AssetTransfer + 'static,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TreasuryError> {
        let oracle = NavOracle::new(config.owner.clone(), config.attestors, config.oracle)?;
        let vault = TreasuryVault::new(
            config.vault_address.clone(),
            config.owner,
            config.vault,
            config.circuit_breaker_enabled,
            config.circuit_breaker_threshold_bps,
        )?;
        Ok(Self {
            ledger: ShareLedger::new(config.vault_address),
            oracle,
            vault,
            registry: Box::new(registry),
            assets: Box::new(assets),
            clock,
            sink: None,
            latch: ReentrancyLatch::new(),
        })
    }

    /// Publishes committed events to `sink`.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    fn execute<T>(
        &mut self,
        operation: &'static str,
        op: impl FnOnce(&mut Self, DateTime<Utc>) -> Result<T, TreasuryError>,
    ) -> Result<T, TreasuryError> {
        let _guard = self.latch.enter().map_err(|err| {
            warn!(operation, "operation refused: another one is in flight");
            TreasuryError::from(err)
        })?;
        let now = self.clock.now();
        self.ledger.begin();
        self.oracle.begin();
        self.vault.begin();
        self.assets.begin();

        match op(self, now) {
            Ok(value) => {
                self.ledger.commit();
                self.oracle.commit();
                self.vault.commit();
                self.assets.commit();
                self.publish();
                debug!(operation, "operation committed");
                Ok(value)
            }
            Err(err) => {
                self.ledger.rollback();
                self.oracle.rollback();
                self.vault.rollback();
                self.assets.rollback();
                warn!(
                    operation,
                    category = %err.category(),
                    reason = err.reason_code(),
                    error = %err,
                    "operation rolled back"
                );
                Err(err)
            }
        }
    }

    fn publish(&mut self) {
        let mut events = self.ledger.take_events();
        events.extend(self.oracle.take_events());
        events.extend(self.vault.take_events());
        if let Some(sink) = &self.sink {
            for event in &events {
                sink.publish(event);
            }
        }
    }

    fn vault_parts(&mut self, now: DateTime<Utc>) -> (&mut TreasuryVault, VaultContext<'_>) {
        (
            &mut self.vault,
            VaultContext {
                ledger: &mut self.ledger,
                nav: &self.oracle,
                registry: self.registry.as_ref(),
                assets: self.assets.as_mut(),
                now,
            },
        )
    }

    // -- Vault operations ---------------------------------------------------

    /// Deposits `amount` (native precision) of `kind` and mints to `recipient`.
    pub fn deposit(
        &mut self,
        caller: &Address,
        kind: &CollateralKind,
        amount: u128,
        recipient: &Address,
    ) -> Result<DepositReceipt, TreasuryError> {
        self.execute("deposit", |t, now| {
            let (vault, mut ctx) = t.vault_parts(now);
            Ok(vault.deposit(&mut ctx, caller, kind, amount, recipient)?)
        })
    }

    /// Burns `stable_amount` of `caller`'s balance and queues a redemption.
    pub fn request_redemption(
        &mut self,
        caller: &Address,
        stable_amount: u128,
        preferred: &CollateralKind,
    ) -> Result<RedemptionRequest, TreasuryError> {
        self.execute("request_redemption", |t, now| {
            let (vault, mut ctx) = t.vault_parts(now);
            Ok(vault.request_redemption(&mut ctx, caller, stable_amount, preferred)?)
        })
    }

    /// Cancels `caller`'s pending redemption `id`. Returns the shares restored.
    pub fn cancel_redemption(&mut self, caller: &Address, id: RedemptionId) -> Result<u128, TreasuryError> {
        self.execute("cancel_redemption", |t, now| {
            let (vault, mut ctx) = t.vault_parts(now);
            Ok(vault.cancel_redemption(&mut ctx, caller, id)?)
        })
    }

    /// Settles redemption `id`.
    pub fn process_redemption(&mut self, id: RedemptionId) -> Result<RedemptionSettlement, TreasuryError> {
        self.execute("process_redemption", |t, now| {
            let (vault, mut ctx) = t.vault_parts(now);
            Ok(vault.process_redemption(&mut ctx, id)?)
        })
    }

    /// Settles all of `ids` or none of them.
    pub fn process_batch_redemptions(
        &mut self,
        ids: &[RedemptionId],
    ) -> Result<Vec<RedemptionSettlement>, TreasuryError> {
        self.execute("process_batch_redemptions", |t, now| {
            let (vault, mut ctx) = t.vault_parts(now);
            Ok(vault.process_batch_redemptions(&mut ctx, ids)?)
        })
    }

    /// Evaluates collateral coverage. Returns whether the breaker is tripped.
    pub fn check_circuit_breaker(&mut self) -> Result<bool, TreasuryError> {
        self.execute("check_circuit_breaker", |t, now| {
            let supply = t.ledger.total_supply(&t.oracle)?;
            Ok(t.vault.check_circuit_breaker(supply, now)?)
        })
    }

    /// Owner: sets mint and redeem fees.
    pub fn set_fees(&mut self, caller: &Address, mint_fee_bps: u32, redeem_fee_bps: u32) -> Result<(), TreasuryError> {
        self.execute("set_fees", |t, _| Ok(t.vault.set_fees(caller, mint_fee_bps, redeem_fee_bps)?))
    }

    /// Owner: sets the redemption delay.
    pub fn set_redemption_delay(&mut self, caller: &Address, delay: Duration) -> Result<(), TreasuryError> {
        self.execute("set_redemption_delay", |t, _| Ok(t.vault.set_redemption_delay(caller, delay)?))
    }

    /// Owner: sets the minimum deposit.
    pub fn set_min_deposit(&mut self, caller: &Address, min_deposit: u128) -> Result<(), TreasuryError> {
        self.execute("set_min_deposit", |t, _| Ok(t.vault.set_min_deposit(caller, min_deposit)?))
    }

    /// Owner: pauses or resumes deposits.
    pub fn pause_deposits(&mut self, caller: &Address, paused: bool) -> Result<(), TreasuryError> {
        self.execute("pause_deposits", |t, _| Ok(t.vault.pause_deposits(caller, paused)?))
    }

    /// Owner: pauses or resumes redemption requests.
    pub fn pause_redemptions(&mut self, caller: &Address, paused: bool) -> Result<(), TreasuryError> {
        self.execute("pause_redemptions", |t, _| Ok(t.vault.pause_redemptions(caller, paused)?))
    }

    /// Owner: configures the circuit breaker.
    pub fn configure_circuit_breaker(
        &mut self,
        caller: &Address,
        enabled: bool,
        threshold_bps: u32,
    ) -> Result<(), TreasuryError> {
        self.execute("configure_circuit_breaker", |t, _| {
            Ok(t.vault.configure_circuit_breaker(caller, enabled, threshold_bps)?)
        })
    }

    /// Owner: clears a tripped circuit breaker.
    pub fn reset_circuit_breaker(&mut self, caller: &Address) -> Result<(), TreasuryError> {
        self.execute("reset_circuit_breaker", |t, _| Ok(t.vault.reset_circuit_breaker(caller)?))
    }

    // -- Oracle operations --------------------------------------------------

    /// Submits `caller`'s attestation.
    pub fn attest_nav(
        &mut self,
        caller: &Address,
        total_assets: u128,
        report_date: u64,
        proof_reference: Hash32,
    ) -> Result<AttestationOutcome, TreasuryError> {
        self.execute("attest_nav", |t, now| {
            Ok(t.oracle.attest_nav(caller, total_assets, report_date, proof_reference, &t.ledger, now)?)
        })
    }

    /// Drops an expired in-flight proposal. Returns whether one was dropped.
    pub fn sweep_expired_attestation(&mut self) -> Result<bool, TreasuryError> {
        self.execute("sweep_expired_attestation", |t, now| Ok(t.oracle.sweep_expired(now)))
    }

    /// Owner: adds or removes an attestor.
    pub fn set_authorized_attestor(
        &mut self,
        caller: &Address,
        attestor: &Address,
        authorized: bool,
    ) -> Result<(), TreasuryError> {
        self.execute("set_authorized_attestor", |t, _| {
            Ok(t.oracle.set_authorized_attestor(caller, attestor, authorized)?)
        })
    }

    /// Owner: sets the attestation threshold.
    pub fn set_attestation_threshold(&mut self, caller: &Address, threshold: usize) -> Result<(), TreasuryError> {
        self.execute("set_attestation_threshold", |t, _| {
            Ok(t.oracle.set_attestation_threshold(caller, threshold)?)
        })
    }

    /// Owner: sets the NAV increase bound.
    pub fn set_max_change_bps(&mut self, caller: &Address, bps: u32) -> Result<(), TreasuryError> {
        self.execute("set_max_change_bps", |t, _| Ok(t.oracle.set_max_change_bps(caller, bps)?))
    }

    /// Owner: sets the NAV decrease tolerance.
    pub fn set_max_decrease_bps(&mut self, caller: &Address, bps: u32) -> Result<(), TreasuryError> {
        self.execute("set_max_decrease_bps", |t, _| Ok(t.oracle.set_max_decrease_bps(caller, bps)?))
    }

    /// Owner: sets the staleness window.
    pub fn set_max_staleness(&mut self, caller: &Address, max_staleness: Duration) -> Result<(), TreasuryError> {
        self.execute("set_max_staleness", |t, _| Ok(t.oracle.set_max_staleness(caller, max_staleness)?))
    }

    /// Owner: sets the proposal expiry.
    pub fn set_attestation_expiry(&mut self, caller: &Address, expiry: Duration) -> Result<(), TreasuryError> {
        self.execute("set_attestation_expiry", |t, _| Ok(t.oracle.set_attestation_expiry(caller, expiry)?))
    }

    // -- Ledger operations --------------------------------------------------

    /// Moves `amount` from `caller` to `to`. Returns the shares moved.
    pub fn transfer(&mut self, caller: &Address, to: &Address, amount: u128) -> Result<u128, TreasuryError> {
        self.execute("transfer", |t, _| Ok(t.ledger.transfer(caller, to, amount, &t.oracle)?))
    }

    /// Moves `amount` from `from` to `to` using `spender`'s allowance.
    pub fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<u128, TreasuryError> {
        self.execute("transfer_from", |t, _| {
            Ok(t.ledger.transfer_from(spender, from, to, amount, &t.oracle)?)
        })
    }

    /// Sets `owner`'s allowance for `spender`.
    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: u128) -> Result<(), TreasuryError> {
        self.execute("approve", |t, _| Ok(t.ledger.approve(owner, spender, amount)?))
    }

    /// Moves raw shares. Returns the amount they were worth.
    pub fn transfer_shares(&mut self, caller: &Address, to: &Address, shares: u128) -> Result<u128, TreasuryError> {
        self.execute("transfer_shares", |t, _| {
            Ok(t.ledger.transfer_shares(caller, to, shares, &t.oracle)?)
        })
    }

    // -- Reads --------------------------------------------------------------

    /// The share ledger.
    pub fn ledger(&self) -> &ShareLedger {
        &self.ledger
    }

    /// The NAV oracle.
    pub fn oracle(&self) -> &NavOracle {
        &self.oracle
    }

    /// The vault.
    pub fn vault(&self) -> &TreasuryVault {
        &self.vault
    }

    /// The collateral allow-list.
    pub fn approved_collateral(&self) -> Vec<CollateralKind> {
        self.registry.list_approved_collateral()
    }

    /// The clock's current reading.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// A handle on the latch every operation holds while it runs.
    pub fn reentrancy_latch(&self) -> ReentrancyLatch {
        self.latch.clone()
    }

    /// Current NAV per share.
    pub fn nav_per_share(&self) -> u128 {
        self.oracle.nav_per_share()
    }

    /// Whether the current NAV report is fresh.
    pub fn is_fresh(&self) -> bool {
        self.oracle.is_fresh(self.clock.now())
    }

    /// Rebased balance of `account`.
    pub fn balance_of(&self, account: &Address) -> Result<u128, TreasuryError> {
        Ok(self.ledger.balance_of(account, &self.oracle)?)
    }

    /// Raw shares of `account`.
    pub fn shares_of(&self, account: &Address) -> u128 {
        self.ledger.shares_of(account)
    }

    /// Rebased supply.
    pub fn total_supply(&self) -> Result<u128, TreasuryError> {
        Ok(self.ledger.total_supply(&self.oracle)?)
    }

    /// Raw shares outstanding.
    pub fn total_shares(&self) -> u128 {
        self.ledger.total_shares()
    }

    /// Shares `amount` converts to now.
    pub fn get_shares_by_amount(&self, amount: u128) -> Result<u128, TreasuryError> {
        Ok(self.ledger.get_shares_by_amount(amount, &self.oracle)?)
    }

    /// Amount `shares` convert to now.
    pub fn get_amount_by_shares(&self, shares: u128) -> Result<u128, TreasuryError> {
        Ok(self.ledger.get_amount_by_shares(shares, &self.oracle)?)
    }

    /// Remaining allowance.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> u128 {
        self.ledger.allowance(owner, spender)
    }

    /// Collateral coverage in bps; `None` for zero supply.
    pub fn collateral_ratio_bps(&self) -> Result<Option<u128>, TreasuryError> {
        let supply = self.total_supply()?;
        Ok(self.vault.collateral_ratio_bps(supply)?)
    }

    /// Point-in-time health view.
    pub fn health(&self) -> Result<HealthSummary, TreasuryError> {
        let now = self.clock.now();
        let total_supply = self.total_supply()?;
        let config = self.vault.config();
        Ok(HealthSummary {
            nav_per_share: self.oracle.nav_per_share(),
            nav_fresh: self.oracle.is_fresh(now),
            seconds_since_last_report: self.oracle.seconds_since_last_report(now),
            last_report_date: self.oracle.current_report().map(|r| r.report_date),
            total_supply,
            total_shares: self.ledger.total_shares(),
            holders: self.ledger.holder_count(),
            total_collateral_value: self.vault.total_collateral_value(),
            collateral_ratio_bps: self.vault.collateral_ratio_bps(total_supply)?,
            circuit_breaker: self.vault.circuit_breaker().clone(),
            deposits_paused: config.deposits_paused,
            redemptions_paused: config.redemptions_paused,
            pending_redemptions: self.vault.pending_redemption_count(),
            pending_redemption_shares: self.vault.total_pending_redemption_shares(),
            total_fees_collected: self.vault.total_fees_collected(),
            attestors: self.oracle.attestors().len(),
            attestation_threshold: self.oracle.threshold(),
            pending_attestation_signers: self
                .oracle
                .pending_attestation()
                .map(|p| p.signer_count()),
        })
    }
}
