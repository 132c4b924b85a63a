//! # NAV Attestation Oracle
//!
//! Publishes the exchange rate between shares and amounts. A small set of
//! authorized attestors (custodian, auditor, fund administrator) report the
//! treasury's total assets for a business date; the oracle divides by the
//! ledger's total shares and installs the result as the new NAV per share.
//!
//! ## Single vs. multi-signer
//!
//! With `threshold == 1` an attestation finalizes on the spot. With a higher
//! threshold the first signer opens a *proposal*, keyed by a domain-separated
//! BLAKE3 hash of `(total_assets, report_date, proof_reference)`, and every
//! further distinct attestor signing the same tuple adds to it. When the
//! signer count reaches the threshold the report finalizes and the slot
//! clears.
//!
//! ```text
//!   attest(A) ──▶ Pending{A}          (1 of 3)
//!   attest(B) ──▶ Pending{A,B}        (2 of 3)
//!   attest(D, other tuple) ──▶ ProposalMismatch
//!   attest(C) ──▶ Finalized           (3 of 3)
//! ```
//!
//! Only one proposal is in flight at a time. A proposal older than the
//! attestation expiry is dropped the next time anyone touches the oracle.
//!
//! ## Bounds
//!
//! A new NAV may rise by at most `max_change_bps` over the previous report
//! and fall by at most `max_decrease_bps` (a much tighter band: the backing
//! principal should not shrink, the band only absorbs fees and rounding).
//! A change exactly at either bound is accepted.
//!
//! History is append-only, so a rollback checkpoint only needs its length.

use ballast_protocol::clock::to_chrono;
use ballast_protocol::config::{
    ATTESTATION_DOMAIN, DEFAULT_ATTESTATION_EXPIRY, DEFAULT_ATTESTATION_THRESHOLD,
    DEFAULT_MAX_NAV_CHANGE_BPS, DEFAULT_MAX_STALENESS, DEFAULT_NAV_DECREASE_TOLERANCE_BPS,
    MAX_NAV_CHANGE_BPS_CAP, MAX_NAV_DECREASE_TOLERANCE_BPS, PRECISION,
};
use ballast_protocol::crypto::{domain_separated_hash, Hash32};
use ballast_protocol::math::{bps_of, nav_from_assets};
use ballast_protocol::{amount_serde, Address, MathError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::{math_category, ErrorCategory};
use crate::events::TreasuryEvent;
use crate::share_ledger::{NavSource, ShareSupply};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the NAV oracle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// Owner-only operation called by someone else.
    #[error("{caller} is not the oracle owner")]
    Unauthorized {
        /// Who tried.
        caller: Address,
    },

    /// Caller is not an authorized attestor.
    #[error("{caller} is not an authorized attestor")]
    NotAttestor {
        /// Who tried.
        caller: Address,
    },

    /// Report date zero is reserved.
    #[error("report date must be positive")]
    InvalidReportDate,

    /// Report date doesn't move forward.
    #[error("report date {proposed} does not exceed current report date {latest}")]
    StaleReportDate {
        /// Report date of the current report.
        latest: u64,
        /// Report date that was proposed.
        proposed: u64,
    },

    /// Reported assets would price shares at zero.
    #[error("total assets {total_assets} price {total_shares} shares at zero")]
    InvalidTotalAssets {
        /// Proposed total assets.
        total_assets: u128,
        /// Shares outstanding at finalization.
        total_shares: u128,
    },

    /// This attestor already signed the in-flight proposal.
    #[error("{attestor} already signed the pending proposal")]
    AlreadySigned {
        /// The repeat signer.
        attestor: Address,
    },

    /// A different proposal is already in flight.
    #[error("a different proposal ({pending}) is pending")]
    ProposalMismatch {
        /// Hex hash of the in-flight proposal.
        pending: String,
    },

    /// NAV moved more than the configured band allows.
    #[error("NAV change from {previous} to {proposed} exceeds the {limit_bps} bps limit")]
    NavChangeExceedsLimit {
        /// NAV per share of the current report.
        previous: u128,
        /// NAV per share the attestation implies.
        proposed: u128,
        /// The band that was violated.
        limit_bps: u32,
    },

    /// Threshold outside `1..=attestor_count`.
    #[error("threshold {threshold} invalid for {attestors} attestors")]
    InvalidThreshold {
        /// Requested threshold.
        threshold: usize,
        /// Authorized attestors.
        attestors: usize,
    },

    /// A tunable is outside its allowed range.
    #[error("{parameter} = {value} is outside [{min}, {max}]")]
    ParameterOutOfRange {
        /// Parameter name.
        parameter: &'static str,
        /// Requested value.
        value: u64,
        /// Lowest allowed.
        min: u64,
        /// Highest allowed.
        max: u64,
    },

    /// Attestor address is empty.
    #[error("invalid attestor address")]
    InvalidAttestor,

    /// NAV computation failed.
    #[error("oracle arithmetic: {0}")]
    Math(#[from] MathError),
}

impl OracleError {
    /// Taxonomy bucket.
    pub fn category(&self) -> ErrorCategory {
        match self {
            OracleError::Unauthorized { .. } | OracleError::NotAttestor { .. } => {
                ErrorCategory::Authorization
            }
            OracleError::InvalidReportDate
            | OracleError::StaleReportDate { .. }
            | OracleError::InvalidTotalAssets { .. }
            | OracleError::InvalidAttestor => ErrorCategory::Validation,
            OracleError::AlreadySigned { .. } | OracleError::ProposalMismatch { .. } => {
                ErrorCategory::StateConflict
            }
            OracleError::NavChangeExceedsLimit { .. }
            | OracleError::InvalidThreshold { .. }
            | OracleError::ParameterOutOfRange { .. } => ErrorCategory::BoundViolation,
            OracleError::Math(e) => math_category(e),
        }
    }

    /// Machine-readable reason code.
    pub fn reason_code(&self) -> &'static str {
        match self {
            OracleError::Unauthorized { .. } => "UNAUTHORIZED",
            OracleError::NotAttestor { .. } => "NOT_ATTESTOR",
            OracleError::InvalidReportDate => "INVALID_REPORT_DATE",
            OracleError::StaleReportDate { .. } => "STALE_REPORT_DATE",
            OracleError::InvalidTotalAssets { .. } => "INVALID_TOTAL_ASSETS",
            OracleError::AlreadySigned { .. } => "ALREADY_SIGNED",
            OracleError::ProposalMismatch { .. } => "PROPOSAL_MISMATCH",
            OracleError::NavChangeExceedsLimit { .. } => "NAV_CHANGE_EXCEEDS_LIMIT",
            OracleError::InvalidThreshold { .. } => "INVALID_THRESHOLD",
            OracleError::ParameterOutOfRange { .. } => "PARAMETER_OUT_OF_RANGE",
            OracleError::InvalidAttestor => "INVALID_ATTESTOR",
            OracleError::Math(_) => "ARITHMETIC_ERROR",
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An immutable, finalized NAV snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavReport {
    /// Attested total assets, 18 decimals.
    #[serde(with = "amount_serde")]
    pub total_assets: u128,
    /// Ledger total shares when the report finalized.
    #[serde(with = "amount_serde")]
    pub total_shares_at_report: u128,
    /// `total_assets × PRECISION / total_shares`, or par for an empty ledger.
    #[serde(with = "amount_serde")]
    pub nav_per_share: u128,
    /// When the report finalized.
    pub attested_at: DateTime<Utc>,
    /// Business identifier, strictly increasing (e.g. `20260630`).
    pub report_date: u64,
    /// Hash of the off-chain evidence.
    #[serde(with = "hex::serde")]
    pub proof_reference: Hash32,
    /// The attestor whose signature finalized the report.
    pub attestor: Address,
}

/// A multi-signer proposal that hasn't reached the threshold yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAttestation {
    /// Key of this proposal.
    #[serde(with = "hex::serde")]
    pub proposal_hash: Hash32,
    /// Proposed total assets.
    #[serde(with = "amount_serde")]
    pub total_assets: u128,
    /// Proposed report date.
    pub report_date: u64,
    /// Proposed proof reference.
    #[serde(with = "hex::serde")]
    pub proof_reference: Hash32,
    /// Attestors who signed so far.
    pub signers: BTreeSet<Address>,
    /// When the first signature arrived.
    pub created_at: DateTime<Utc>,
}

impl PendingAttestation {
    /// Distinct signers so far.
    pub fn signer_count(&self) -> usize {
        self.signers.len()
    }
}

/// What an accepted attestation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttestationOutcome {
    /// The report is now current.
    Finalized {
        /// The installed report.
        report: NavReport,
    },
    /// The signature was recorded; more are needed.
    Pending {
        /// Key of the in-flight proposal.
        #[serde(with = "hex::serde")]
        proposal_hash: Hash32,
        /// Signatures so far.
        signer_count: usize,
        /// Signatures needed.
        threshold: usize,
    },
}

/// Oracle tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Distinct attestors needed to finalize.
    pub threshold: usize,
    /// Largest allowed NAV increase per report.
    pub max_change_bps: u32,
    /// Largest allowed NAV decrease per report.
    pub max_decrease_bps: u32,
    /// Age after which the current report is stale.
    pub max_staleness: Duration,
    /// Age after which an in-flight proposal is dropped.
    pub attestation_expiry: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_ATTESTATION_THRESHOLD,
            max_change_bps: DEFAULT_MAX_NAV_CHANGE_BPS,
            max_decrease_bps: DEFAULT_NAV_DECREASE_TOLERANCE_BPS,
            max_staleness: DEFAULT_MAX_STALENESS,
            attestation_expiry: DEFAULT_ATTESTATION_EXPIRY,
        }
    }
}

/// Key under which a proposal is tracked.
pub fn proposal_hash(total_assets: u128, report_date: u64, proof_reference: &Hash32) -> Hash32 {
    domain_separated_hash(
        ATTESTATION_DOMAIN,
        &[
            &total_assets.to_be_bytes(),
            &report_date.to_be_bytes(),
            proof_reference,
        ],
    )
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct OracleCheckpoint {
    attestors: BTreeSet<Address>,
    config: OracleConfig,
    current: Option<NavReport>,
    pending: Option<PendingAttestation>,
    history_len: usize,
}

/// The NAV attestation oracle.
#[derive(Debug, Clone)]
pub struct NavOracle {
    owner: Address,
    attestors: BTreeSet<Address>,
    config: OracleConfig,
    current: Option<NavReport>,
    history: Vec<NavReport>,
    pending: Option<PendingAttestation>,
    checkpoint: Option<OracleCheckpoint>,
    events: Vec<TreasuryEvent>,
}

impl NavOracle {
    /// Creates an oracle with no report yet.
    ///
    /// # Errors
    ///
    /// [`OracleError::InvalidThreshold`] if the threshold is zero or exceeds
    /// the attestor count, [`OracleError::ParameterOutOfRange`] for bounds
    /// outside the protocol envelope.
    pub fn new(
        owner: Address,
        attestors: impl IntoIterator<Item = Address>,
        config: OracleConfig,
    ) -> Result<Self, OracleError> {
        let attestors: BTreeSet<Address> = attestors.into_iter().collect();
        if attestors.iter().any(Address::is_empty) {
            return Err(OracleError::InvalidAttestor);
        }
        // An oracle may start without attestors; the first one is added later.
        if config.threshold == 0 || config.threshold > attestors.len().max(1) {
            return Err(OracleError::InvalidThreshold {
                threshold: config.threshold,
                attestors: attestors.len(),
            });
        }
        check_range("max_change_bps", u64::from(config.max_change_bps), 0, u64::from(MAX_NAV_CHANGE_BPS_CAP))?;
        check_range(
            "max_decrease_bps",
            u64::from(config.max_decrease_bps),
            0,
            u64::from(MAX_NAV_DECREASE_TOLERANCE_BPS),
        )?;
        check_range("max_staleness_secs", config.max_staleness.as_secs(), 1, u64::MAX)?;
        check_range("attestation_expiry_secs", config.attestation_expiry.as_secs(), 1, u64::MAX)?;

        Ok(Self {
            owner,
            attestors,
            config,
            current: None,
            history: Vec::new(),
            pending: None,
            checkpoint: None,
            events: Vec::new(),
        })
    }

    // -- Transactions -------------------------------------------------------

    /// Remembers the current state for [`NavOracle::rollback`].
    pub fn begin(&mut self) {
        self.checkpoint = Some(OracleCheckpoint {
            attestors: self.attestors.clone(),
            config: self.config.clone(),
            current: self.current.clone(),
            pending: self.pending.clone(),
            history_len: self.history.len(),
        });
    }

    /// Drops the checkpoint.
    pub fn commit(&mut self) {
        self.checkpoint = None;
    }

    /// Returns to the checkpoint and drops the buffered events.
    pub fn rollback(&mut self) {
        self.events.clear();
        if let Some(checkpoint) = self.checkpoint.take() {
            self.attestors = checkpoint.attestors;
            self.config = checkpoint.config;
            self.current = checkpoint.current;
            self.pending = checkpoint.pending;
            self.history.truncate(checkpoint.history_len);
        }
    }

    // -- Attestation --------------------------------------------------------

    /// Records `caller`'s attestation of `total_assets` for `report_date`.
    ///
    /// `supply` is read only when the report finalizes.
    pub fn attest_nav(
        &mut self,
        caller: &Address,
        total_assets: u128,
        report_date: u64,
        proof_reference: Hash32,
        supply: &dyn ShareSupply,
        now: DateTime<Utc>,
    ) -> Result<AttestationOutcome, OracleError> {
        if !self.attestors.contains(caller) {
            return Err(OracleError::NotAttestor {
                caller: caller.clone(),
            });
        }
        if report_date == 0 {
            return Err(OracleError::InvalidReportDate);
        }
        if let Some(current) = &self.current {
            if report_date <= current.report_date {
                return Err(OracleError::StaleReportDate {
                    latest: current.report_date,
                    proposed: report_date,
                });
            }
        }

        self.expire_pending(now);
        let hash = proposal_hash(total_assets, report_date, &proof_reference);
        let threshold = self.config.threshold;

        let signer_count = match self.pending.as_mut() {
            Some(pending) if pending.proposal_hash != hash => {
                return Err(OracleError::ProposalMismatch {
                    pending: hex::encode(pending.proposal_hash),
                });
            }
            Some(pending) => {
                if !pending.signers.insert(caller.clone()) {
                    return Err(OracleError::AlreadySigned {
                        attestor: caller.clone(),
                    });
                }
                pending.signer_count()
            }
            None => {
                if threshold > 1 {
                    self.pending = Some(PendingAttestation {
                        proposal_hash: hash,
                        total_assets,
                        report_date,
                        proof_reference,
                        signers: BTreeSet::from([caller.clone()]),
                        created_at: now,
                    });
                }
                1
            }
        };

        self.events.push(TreasuryEvent::AttestationSubmitted {
            attestor: caller.clone(),
            proposal_hash: hex::encode(hash),
            report_date,
            signer_count,
            threshold,
        });

        if signer_count < threshold {
            info!(
                attestor = %caller,
                report_date,
                signer_count,
                threshold,
                "attestation recorded, awaiting more signers"
            );
            return Ok(AttestationOutcome::Pending {
                proposal_hash: hash,
                signer_count,
                threshold,
            });
        }

        let report = self.finalize(caller, total_assets, report_date, proof_reference, supply, now)?;
        self.pending = None;
        Ok(AttestationOutcome::Finalized { report })
    }

    fn finalize(
        &mut self,
        attestor: &Address,
        total_assets: u128,
        report_date: u64,
        proof_reference: Hash32,
        supply: &dyn ShareSupply,
        now: DateTime<Utc>,
    ) -> Result<NavReport, OracleError> {
        let total_shares = supply.total_shares();
        let nav = nav_from_assets(total_assets, total_shares)?;
        if nav == 0 {
            return Err(OracleError::InvalidTotalAssets {
                total_assets,
                total_shares,
            });
        }

        let previous = self.nav_per_share();
        if self.current.is_some() {
            self.check_bounds(previous, nav)?;
        }

        let report = NavReport {
            total_assets,
            total_shares_at_report: total_shares,
            nav_per_share: nav,
            attested_at: now,
            report_date,
            proof_reference,
            attestor: attestor.clone(),
        };
        if let Some(superseded) = self.current.replace(report.clone()) {
            self.history.push(superseded);
        }

        info!(
            report_date,
            nav_per_share = nav,
            previous_nav_per_share = previous,
            total_assets,
            total_shares,
            attestor = %attestor,
            "NAV report finalized"
        );
        self.events.push(TreasuryEvent::NavUpdated {
            report_date,
            nav_per_share: nav,
            previous_nav_per_share: previous,
            total_assets,
            total_shares,
            attestor: attestor.clone(),
        });
        Ok(report)
    }

    fn check_bounds(&self, previous: u128, proposed: u128) -> Result<(), OracleError> {
        let (delta, limit_bps) = if proposed >= previous {
            (proposed - previous, self.config.max_change_bps)
        } else {
            (previous - proposed, self.config.max_decrease_bps)
        };
        if delta > bps_of(previous, limit_bps)? {
            return Err(OracleError::NavChangeExceedsLimit {
                previous,
                proposed,
                limit_bps,
            });
        }
        Ok(())
    }

    fn expire_pending(&mut self, now: DateTime<Utc>) -> bool {
        let expiry = to_chrono(self.config.attestation_expiry);
        let expired = matches!(&self.pending, Some(p) if now - p.created_at > expiry);
        if !expired {
            return false;
        }
        if let Some(stale) = self.pending.take() {
            warn!(
                proposal = %hex::encode(stale.proposal_hash),
                report_date = stale.report_date,
                signer_count = stale.signer_count(),
                created_at = %stale.created_at,
                "pending attestation expired"
            );
            self.events.push(TreasuryEvent::AttestationExpired {
                proposal_hash: hex::encode(stale.proposal_hash),
                report_date: stale.report_date,
                created_at: stale.created_at,
            });
        }
        true
    }

    /// Drops the in-flight proposal if it has expired. Returns whether one
    /// was dropped. The node's keeper calls this so that expiry shows up in
    /// the event stream without waiting for the next attestation.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> bool {
        self.expire_pending(now)
    }

    fn discard_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            info!(
                proposal = %hex::encode(pending.proposal_hash),
                "pending attestation discarded after attestor set change"
            );
            self.events.push(TreasuryEvent::AttestationDiscarded {
                proposal_hash: hex::encode(pending.proposal_hash),
            });
        }
    }

    // -- Administration -----------------------------------------------------

    fn ensure_owner(&self, caller: &Address) -> Result<(), OracleError> {
        if caller != &self.owner {
            return Err(OracleError::Unauthorized {
                caller: caller.clone(),
            });
        }
        Ok(())
    }

    /// Adds or removes an attestor. Removing one lowers the threshold to
    /// the remaining attestor count (never below one).
    pub fn set_authorized_attestor(
        &mut self,
        caller: &Address,
        attestor: &Address,
        authorized: bool,
    ) -> Result<(), OracleError> {
        self.ensure_owner(caller)?;
        if attestor.is_empty() {
            return Err(OracleError::InvalidAttestor);
        }
        let changed = if authorized {
            self.attestors.insert(attestor.clone())
        } else {
            self.attestors.remove(attestor)
        };
        if !changed {
            return Ok(());
        }

        self.discard_pending();
        info!(attestor = %attestor, authorized, "attestor updated");
        self.events.push(TreasuryEvent::AttestorUpdated {
            attestor: attestor.clone(),
            authorized,
        });

        let ceiling = self.attestors.len().max(1);
        if self.config.threshold > ceiling {
            self.config.threshold = ceiling;
            info!(threshold = ceiling, "attestation threshold lowered");
            self.events
                .push(TreasuryEvent::ThresholdUpdated { threshold: ceiling });
        }
        Ok(())
    }

    /// Sets how many distinct attestors must agree.
    pub fn set_attestation_threshold(&mut self, caller: &Address, threshold: usize) -> Result<(), OracleError> {
        self.ensure_owner(caller)?;
        if threshold == 0 || threshold > self.attestors.len() {
            return Err(OracleError::InvalidThreshold {
                threshold,
                attestors: self.attestors.len(),
            });
        }
        if threshold == self.config.threshold {
            return Ok(());
        }
        self.discard_pending();
        self.config.threshold = threshold;
        info!(threshold, "attestation threshold updated");
        self.events.push(TreasuryEvent::ThresholdUpdated { threshold });
        Ok(())
    }

    /// Sets the largest allowed NAV increase per report.
    pub fn set_max_change_bps(&mut self, caller: &Address, max_change_bps: u32) -> Result<(), OracleError> {
        self.ensure_owner(caller)?;
        check_range("max_change_bps", u64::from(max_change_bps), 0, u64::from(MAX_NAV_CHANGE_BPS_CAP))?;
        self.config.max_change_bps = max_change_bps;
        self.parameters_updated();
        Ok(())
    }

    /// Sets the largest allowed NAV decrease per report.
    pub fn set_max_decrease_bps(&mut self, caller: &Address, max_decrease_bps: u32) -> Result<(), OracleError> {
        self.ensure_owner(caller)?;
        check_range(
            "max_decrease_bps",
            u64::from(max_decrease_bps),
            0,
            u64::from(MAX_NAV_DECREASE_TOLERANCE_BPS),
        )?;
        self.config.max_decrease_bps = max_decrease_bps;
        self.parameters_updated();
        Ok(())
    }

    /// Sets the age after which the current report is stale.
    pub fn set_max_staleness(&mut self, caller: &Address, max_staleness: Duration) -> Result<(), OracleError> {
        self.ensure_owner(caller)?;
        check_range("max_staleness_secs", max_staleness.as_secs(), 1, u64::MAX)?;
        self.config.max_staleness = max_staleness;
        self.parameters_updated();
        Ok(())
    }

    /// Sets the age after which an in-flight proposal is dropped.
    pub fn set_attestation_expiry(&mut self, caller: &Address, expiry: Duration) -> Result<(), OracleError> {
        self.ensure_owner(caller)?;
        check_range("attestation_expiry_secs", expiry.as_secs(), 1, u64::MAX)?;
        self.config.attestation_expiry = expiry;
        self.parameters_updated();
        Ok(())
    }

    fn parameters_updated(&mut self) {
        let c = &self.config;
        info!(
            max_change_bps = c.max_change_bps,
            max_decrease_bps = c.max_decrease_bps,
            max_staleness_secs = c.max_staleness.as_secs(),
            attestation_expiry_secs = c.attestation_expiry.as_secs(),
            "oracle parameters updated"
        );
        self.events.push(TreasuryEvent::OracleParametersUpdated {
            max_change_bps: c.max_change_bps,
            max_decrease_bps: c.max_decrease_bps,
            max_staleness_secs: c.max_staleness.as_secs(),
            attestation_expiry_secs: c.attestation_expiry.as_secs(),
        });
    }

    // -- Reads --------------------------------------------------------------

    /// Whether the current report is younger than `max_staleness`. No
    /// report means not fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match &self.current {
            Some(report) => now - report.attested_at <= to_chrono(self.config.max_staleness),
            None => false,
        }
    }

    /// Seconds since the current report finalized, if there is one.
    pub fn seconds_since_last_report(&self, now: DateTime<Utc>) -> Option<i64> {
        self.current
            .as_ref()
            .map(|report| (now - report.attested_at).num_seconds())
    }

    /// The current report.
    pub fn current_report(&self) -> Option<&NavReport> {
        self.current.as_ref()
    }

    /// Current NAV per share; par until the first report.
    pub fn nav_per_share(&self) -> u128 {
        self.current
            .as_ref()
            .map(|report| report.nav_per_share)
            .unwrap_or(PRECISION)
    }

    /// Superseded reports, oldest first.
    pub fn history(&self) -> &[NavReport] {
        &self.history
    }

    /// Number of superseded reports.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Superseded report at `index` (0 = oldest).
    pub fn report_at(&self, index: usize) -> Option<&NavReport> {
        self.history.get(index)
    }

    /// The in-flight proposal, if any.
    pub fn pending_attestation(&self) -> Option<&PendingAttestation> {
        self.pending.as_ref()
    }

    /// Authorized attestors, sorted.
    pub fn attestors(&self) -> Vec<Address> {
        self.attestors.iter().cloned().collect()
    }

    /// Whether `who` may attest.
    pub fn is_attestor(&self, who: &Address) -> bool {
        self.attestors.contains(who)
    }

    /// Signatures needed to finalize.
    pub fn threshold(&self) -> usize {
        self.config.threshold
    }

    /// Current tunables.
    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// The owner.
    pub fn owner(&self) -> &Address {
        &self.owner
    }

    /// Drains the events buffered since the last call.
    pub fn take_events(&mut self) -> Vec<TreasuryEvent> {
        std::mem::take(&mut self.events)
    }
}

impl NavSource for NavOracle {
    fn nav_per_share(&self) -> u128 {
        NavOracle::nav_per_share(self)
    }
}

fn check_range(parameter: &'static str, value: u64, min: u64, max: u64) -> Result<(), OracleError> {
    if value < min || value > max {
        return Err(OracleError::ParameterOutOfRange {
            parameter,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct Supply(u128);

    impl ShareSupply for Supply {
        fn total_shares(&self) -> u128 {
            self.0
        }
    }

    fn addr(s: &str) -> Address {
        Address::from(s)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 30, 0, 0, 0).unwrap()
    }

    fn oracle(attestors: &[&str], threshold: usize) -> NavOracle {
        NavOracle::new(
            addr("owner"),
            attestors.iter().map(|a| addr(a)),
            OracleConfig {
                threshold,
                ..OracleConfig::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn construction_validates_threshold() {
        let err = NavOracle::new(
            addr("owner"),
            vec![addr("a")],
            OracleConfig {
                threshold: 2,
                ..OracleConfig::default()
            },
        )
        .unwrap_err();
        assert_eq!(err, OracleError::InvalidThreshold { threshold: 2, attestors: 1 });
    }

    #[test]
    fn no_report_means_par_and_not_fresh() {
        let o = oracle(&["a"], 1);
        assert_eq!(o.nav_per_share(), PRECISION);
        assert!(!o.is_fresh(t0()));
        assert_eq!(o.seconds_since_last_report(t0()), None);
    }

    #[test]
    fn single_signer_finalizes_immediately() {
        let mut o = oracle(&["a"], 1);
        let outcome = o
            .attest_nav(&addr("a"), 1_050 * PRECISION, 1, [1; 32], &Supply(1_000 * PRECISION), t0())
            .unwrap();
        let AttestationOutcome::Finalized { report } = outcome else {
            panic!("expected finalization");
        };
        // First report is not bounded.
        assert_eq!(report.nav_per_share, PRECISION + PRECISION / 20);
        assert_eq!(o.history_len(), 0);
        assert!(o.is_fresh(t0()));
    }

    #[test]
    fn rollback_returns_to_checkpoint() {
        let mut o = oracle(&["a", "b"], 1);
        let supply = Supply(1_000 * PRECISION);
        o.attest_nav(&addr("a"), 1_000 * PRECISION, 1, [0; 32], &supply, t0()).unwrap();
        o.take_events();

        o.begin();
        o.attest_nav(&addr("b"), 1_001 * PRECISION, 2, [0; 32], &supply, t0()).unwrap();
        o.set_authorized_attestor(&addr("owner"), &addr("c"), true).unwrap();
        o.set_attestation_threshold(&addr("owner"), 3).unwrap();
        assert_eq!(o.history_len(), 1);
        o.rollback();

        assert_eq!(o.history_len(), 0);
        assert_eq!(o.current_report().map(|r| r.report_date), Some(1));
        assert_eq!(o.nav_per_share(), PRECISION);
        assert!(!o.is_attestor(&addr("c")));
        assert_eq!(o.threshold(), 1);
        assert!(o.take_events().is_empty());
    }

    #[test]
    fn non_attestor_rejected() {
        let mut o = oracle(&["a"], 1);
        let err = o
            .attest_nav(&addr("z"), PRECISION, 1, [0; 32], &Supply(0), t0())
            .unwrap_err();
        assert_eq!(err.reason_code(), "NOT_ATTESTOR");
    }

    #[test]
    fn report_date_must_increase() {
        let mut o = oracle(&["a"], 1);
        o.attest_nav(&addr("a"), PRECISION, 5, [0; 32], &Supply(PRECISION), t0()).unwrap();
        let err = o
            .attest_nav(&addr("a"), PRECISION, 5, [0; 32], &Supply(PRECISION), t0())
            .unwrap_err();
        assert_eq!(err, OracleError::StaleReportDate { latest: 5, proposed: 5 });
        assert_eq!(
            o.attest_nav(&addr("a"), PRECISION, 0, [0; 32], &Supply(PRECISION), t0()),
            Err(OracleError::InvalidReportDate)
        );
    }

    #[test]
    fn decrease_tolerance_is_tighter_than_increase_bound() {
        let mut o = oracle(&["a"], 1);
        let supply = Supply(10_000 * PRECISION);
        o.attest_nav(&addr("a"), 10_000 * PRECISION, 1, [0; 32], &supply, t0()).unwrap();

        // -10 bps: accepted.
        o.attest_nav(&addr("a"), 9_990 * PRECISION, 2, [0; 32], &supply, t0()).unwrap();
        // 0.999 -> 0.9979 is roughly -11 bps: rejected.
        let err = o
            .attest_nav(&addr("a"), 9_979 * PRECISION, 3, [0; 32], &supply, t0())
            .unwrap_err();
        assert!(matches!(err, OracleError::NavChangeExceedsLimit { limit_bps: 10, .. }));
        assert_eq!(o.history_len(), 1);
    }

    #[test]
    fn zero_assets_with_outstanding_shares_rejected() {
        let mut o = oracle(&["a"], 1);
        let err = o
            .attest_nav(&addr("a"), 0, 1, [0; 32], &Supply(PRECISION), t0())
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn removing_attestor_lowers_threshold_and_discards_proposal() {
        let mut o = oracle(&["a", "b", "c"], 3);
        o.attest_nav(&addr("a"), PRECISION, 1, [0; 32], &Supply(PRECISION), t0()).unwrap();
        assert!(o.pending_attestation().is_some());

        o.set_authorized_attestor(&addr("owner"), &addr("c"), false).unwrap();
        assert_eq!(o.threshold(), 2);
        assert!(o.pending_attestation().is_none());

        o.set_authorized_attestor(&addr("owner"), &addr("b"), false).unwrap();
        o.set_authorized_attestor(&addr("owner"), &addr("a"), false).unwrap();
        assert_eq!(o.threshold(), 1);
        assert!(o.attestors().is_empty());
    }

    #[test]
    fn threshold_setter_bounds() {
        let mut o = oracle(&["a", "b"], 1);
        assert!(o.set_attestation_threshold(&addr("a"), 2).is_err());
        assert_eq!(
            o.set_attestation_threshold(&addr("owner"), 3),
            Err(OracleError::InvalidThreshold { threshold: 3, attestors: 2 })
        );
        assert!(o.set_attestation_threshold(&addr("owner"), 0).is_err());
        o.set_attestation_threshold(&addr("owner"), 2).unwrap();
        assert_eq!(o.threshold(), 2);
    }

    #[test]
    fn parameter_setters_enforce_envelope() {
        let mut o = oracle(&["a"], 1);
        let err = o.set_max_change_bps(&addr("owner"), MAX_NAV_CHANGE_BPS_CAP + 1).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::BoundViolation);
        assert!(o.set_max_staleness(&addr("owner"), Duration::ZERO).is_err());
        o.set_attestation_expiry(&addr("owner"), Duration::from_secs(600)).unwrap();
        assert_eq!(o.config().attestation_expiry, Duration::from_secs(600));
        let events = o.take_events();
        assert_eq!(events.last().map(TreasuryEvent::name), Some("oracle_parameters_updated"));
    }

    #[test]
    fn proposal_hash_depends_on_every_field() {
        let base = proposal_hash(1, 2, &[3; 32]);
        assert_ne!(base, proposal_hash(9, 2, &[3; 32]));
        assert_ne!(base, proposal_hash(1, 9, &[3; 32]));
        assert_ne!(base, proposal_hash(1, 2, &[9; 32]));
        assert_eq!(base, proposal_hash(1, 2, &[3; 32]));
    }

    #[test]
    fn report_serializes_proof_as_hex() {
        let mut o = oracle(&["a"], 1);
        o.attest_nav(&addr("a"), PRECISION, 7, [0xab; 32], &Supply(PRECISION), t0()).unwrap();
        let json = serde_json::to_value(o.current_report().unwrap()).unwrap();
        assert_eq!(json["proof_reference"], "ab".repeat(32));
        assert_eq!(json["nav_per_share"], PRECISION.to_string());
    }
}
