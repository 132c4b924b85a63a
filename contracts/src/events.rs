//! # Treasury Events
//!
//! Every mutating operation emits notifications for indexers, dashboards
//! and the node's WebSocket stream. Components buffer their events while an
//! operation runs; the [`crate::treasury::Treasury`] publishes the buffer
//! only if the whole operation commits, so a subscriber never sees an event
//! for an effect that was rolled back.
//!
//! The ledger deliberately emits *two* events per balance movement:
//! [`TreasuryEvent::Transfer`] in rebased amount units and
//! [`TreasuryEvent::TransferShares`] in raw shares. Wallets care about the
//! first, accounting back-ends about the second.

use ballast_protocol::amount_serde;
use ballast_protocol::Address;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::collateral::CollateralKind;
use crate::treasury_vault::RedemptionId;

/// A notification emitted by the ledger, oracle or vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreasuryEvent {
    // -- Share Ledger -------------------------------------------------------
    /// Rebased balance moved. `from == None` is a mint, `to == None` a burn.
    Transfer {
        from: Option<Address>,
        to: Option<Address>,
        #[serde(with = "amount_serde")]
        amount: u128,
    },
    /// Raw shares moved. Always paired with a [`TreasuryEvent::Transfer`].
    TransferShares {
        from: Option<Address>,
        to: Option<Address>,
        #[serde(with = "amount_serde")]
        shares: u128,
    },
    /// An allowance was set.
    Approval {
        owner: Address,
        spender: Address,
        #[serde(with = "amount_serde")]
        amount: u128,
    },

    // -- NAV Oracle ---------------------------------------------------------
    /// An attestor signed the in-flight proposal.
    AttestationSubmitted {
        attestor: Address,
        proposal_hash: String,
        report_date: u64,
        signer_count: usize,
        threshold: usize,
    },
    /// An in-flight proposal outlived the expiry window and was dropped.
    AttestationExpired {
        proposal_hash: String,
        report_date: u64,
        created_at: DateTime<Utc>,
    },
    /// A proposal was discarded because the attestor set or threshold changed.
    AttestationDiscarded { proposal_hash: String },
    /// A new NAV report was finalized.
    NavUpdated {
        report_date: u64,
        #[serde(with = "amount_serde")]
        nav_per_share: u128,
        #[serde(with = "amount_serde")]
        previous_nav_per_share: u128,
        #[serde(with = "amount_serde")]
        total_assets: u128,
        #[serde(with = "amount_serde")]
        total_shares: u128,
        attestor: Address,
    },
    /// An attestor was added or removed.
    AttestorUpdated { attestor: Address, authorized: bool },
    /// The attestation threshold changed.
    ThresholdUpdated { threshold: usize },
    /// Oracle bounds or timing parameters changed.
    OracleParametersUpdated {
        max_change_bps: u32,
        max_decrease_bps: u32,
        max_staleness_secs: u64,
        attestation_expiry_secs: u64,
    },

    // -- Treasury Vault -----------------------------------------------------
    /// Collateral came in and shares were minted.
    Deposited {
        depositor: Address,
        recipient: Address,
        collateral: CollateralKind,
        #[serde(with = "amount_serde")]
        collateral_amount: u128,
        #[serde(with = "amount_serde")]
        normalized_amount: u128,
        #[serde(with = "amount_serde")]
        minted_amount: u128,
        #[serde(with = "amount_serde")]
        shares: u128,
        #[serde(with = "amount_serde")]
        fee: u128,
    },
    /// Shares were burned and a redemption queued.
    RedemptionRequested {
        id: RedemptionId,
        requester: Address,
        #[serde(with = "amount_serde")]
        locked_amount: u128,
        #[serde(with = "amount_serde")]
        locked_shares: u128,
        preferred_collateral: CollateralKind,
        ready_at: DateTime<Utc>,
    },
    /// A pending redemption was cancelled and its shares restored.
    RedemptionCancelled {
        id: RedemptionId,
        requester: Address,
        #[serde(with = "amount_serde")]
        restored_shares: u128,
    },
    /// A redemption settled and collateral left the vault.
    RedemptionProcessed {
        id: RedemptionId,
        requester: Address,
        collateral: CollateralKind,
        #[serde(with = "amount_serde")]
        payout: u128,
        #[serde(with = "amount_serde")]
        fee: u128,
    },
    /// Mint/redeem fees changed.
    FeesUpdated { mint_fee_bps: u32, redeem_fee_bps: u32 },
    /// Redemption delay changed.
    RedemptionDelayUpdated { delay_secs: u64 },
    /// Minimum deposit changed.
    MinDepositUpdated {
        #[serde(with = "amount_serde")]
        min_deposit: u128,
    },
    /// Deposits were paused or resumed.
    DepositsPaused { paused: bool },
    /// Redemption requests were paused or resumed.
    RedemptionsPaused { paused: bool },
    /// Circuit breaker enabled/threshold changed.
    CircuitBreakerConfigured { enabled: bool, threshold_bps: u32 },
    /// Coverage fell below the threshold; deposits are now blocked.
    CircuitBreakerTripped {
        #[serde(with = "amount_serde")]
        ratio_bps: u128,
        threshold_bps: u32,
    },
    /// An operator cleared a tripped breaker.
    CircuitBreakerReset { by: Address },
}

impl TreasuryEvent {
    /// Short name of the event, used as a metrics label and log field.
    pub fn name(&self) -> &'static str {
        match self {
            TreasuryEvent::Transfer { .. } => "transfer",
            TreasuryEvent::TransferShares { .. } => "transfer_shares",
            TreasuryEvent::Approval { .. } => "approval",
            TreasuryEvent::AttestationSubmitted { .. } => "attestation_submitted",
            TreasuryEvent::AttestationExpired { .. } => "attestation_expired",
            TreasuryEvent::AttestationDiscarded { .. } => "attestation_discarded",
            TreasuryEvent::NavUpdated { .. } => "nav_updated",
            TreasuryEvent::AttestorUpdated { .. } => "attestor_updated",
            TreasuryEvent::ThresholdUpdated { .. } => "threshold_updated",
            TreasuryEvent::OracleParametersUpdated { .. } => "oracle_parameters_updated",
            TreasuryEvent::Deposited { .. } => "deposited",
            TreasuryEvent::RedemptionRequested { .. } => "redemption_requested",
            TreasuryEvent::RedemptionCancelled { .. } => "redemption_cancelled",
            TreasuryEvent::RedemptionProcessed { .. } => "redemption_processed",
            TreasuryEvent::FeesUpdated { .. } => "fees_updated",
            TreasuryEvent::RedemptionDelayUpdated { .. } => "redemption_delay_updated",
            TreasuryEvent::MinDepositUpdated { .. } => "min_deposit_updated",
            TreasuryEvent::DepositsPaused { .. } => "deposits_paused",
            TreasuryEvent::RedemptionsPaused { .. } => "redemptions_paused",
            TreasuryEvent::CircuitBreakerConfigured { .. } => "circuit_breaker_configured",
            TreasuryEvent::CircuitBreakerTripped { .. } => "circuit_breaker_tripped",
            TreasuryEvent::CircuitBreakerReset { .. } => "circuit_breaker_reset",
        }
    }
}

/// Receives committed events.
pub trait EventSink: Send + Sync {
    /// Called once per event, in emission order, after the operation commits.
    fn publish(&self, event: &TreasuryEvent);
}

/// Keeps every published event in memory. Handy in tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<TreasuryEvent>>>,
}

impl RecordingSink {
    /// Creates an empty sink. Clones share the same buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far.
    pub fn events(&self) -> Vec<TreasuryEvent> {
        self.events.lock().clone()
    }

    /// Names of everything published so far.
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(TreasuryEvent::name).collect()
    }

    /// Forgets everything published so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: &TreasuryEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag_and_string_amounts() {
        let event = TreasuryEvent::Transfer {
            from: None,
            to: Some(Address::from("alice")),
            amount: 10u128.pow(21),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "transfer");
        assert_eq!(json["amount"], "1000000000000000000000");
        assert!(json["from"].is_null());
    }

    #[test]
    fn recording_sink_clones_share_buffer() {
        let sink = RecordingSink::new();
        let handle = sink.clone();
        sink.publish(&TreasuryEvent::DepositsPaused { paused: true });
        assert_eq!(handle.names(), vec!["deposits_paused"]);
        handle.clear();
        assert!(sink.events().is_empty());
    }
}
