//! Integration tests for the NAV attestation oracle.
//!
//! Covers the bound rules around the exact edge, the multi-signer
//! threshold flow including mismatching and repeated signatures, and
//! proposal expiry.

use ballast_contracts::events::TreasuryEvent;
use ballast_contracts::nav_oracle::{AttestationOutcome, NavOracle, OracleConfig, OracleError};
use ballast_contracts::share_ledger::ShareSupply;
use ballast_protocol::config::PRECISION;
use ballast_protocol::crypto::sha256_array;
use ballast_protocol::Address;
use chrono::{DateTime, Duration, TimeZone, Utc};

struct Supply(u128);

impl ShareSupply for Supply {
    fn total_shares(&self) -> u128 {
        self.0
    }
}

fn addr(s: &str) -> Address {
    Address::from(s)
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 30, 18, 0, 0).unwrap()
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

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

#[test]
fn increase_exactly_at_bound_is_accepted_one_unit_more_is_not() {
    let supply = Supply(1_000 * PRECISION);
    let mut o = oracle(&["auditor"], 1);
    let proof = sha256_array(b"statement-1");
    o.attest_nav(&addr("auditor"), 1_000 * PRECISION, 1, proof, &supply, start())
        .unwrap();

    // +100 bps and one wei of NAV on top.
    let err = o
        .attest_nav(&addr("auditor"), 1_010 * PRECISION + 1_000, 2, proof, &supply, start())
        .unwrap_err();
    assert_eq!(
        err,
        OracleError::NavChangeExceedsLimit {
            previous: PRECISION,
            proposed: PRECISION + PRECISION / 100 + 1,
            limit_bps: 100,
        }
    );

    // Exactly +100 bps.
    let outcome = o
        .attest_nav(&addr("auditor"), 1_010 * PRECISION, 2, proof, &supply, start())
        .unwrap();
    match outcome {
        AttestationOutcome::Finalized { report } => {
            assert_eq!(report.nav_per_share, PRECISION + PRECISION / 100);
            assert_eq!(report.total_shares_at_report, 1_000 * PRECISION);
        }
        other => panic!("expected finalization, got {other:?}"),
    }
    assert_eq!(o.history_len(), 1);
    assert_eq!(o.report_at(0).unwrap().nav_per_share, PRECISION);
}

#[test]
fn raised_bound_admits_larger_moves() {
    let supply = Supply(100 * PRECISION);
    let mut o = oracle(&["auditor"], 1);
    o.attest_nav(&addr("auditor"), 100 * PRECISION, 1, [0; 32], &supply, start())
        .unwrap();
    assert!(o
        .attest_nav(&addr("auditor"), 105 * PRECISION, 2, [0; 32], &supply, start())
        .is_err());
    o.set_max_change_bps(&addr("owner"), 500).unwrap();
    o.attest_nav(&addr("auditor"), 105 * PRECISION, 2, [0; 32], &supply, start())
        .unwrap();
    assert_eq!(o.nav_per_share(), PRECISION + PRECISION / 20);
}

#[test]
fn decrease_tolerance_is_configurable() {
    let supply = Supply(100 * PRECISION);
    let mut o = oracle(&["auditor"], 1);
    o.attest_nav(&addr("auditor"), 100 * PRECISION, 1, [0; 32], &supply, start())
        .unwrap();
    // -50 bps is outside the default 10 bps band.
    assert!(o
        .attest_nav(&addr("auditor"), 995 * PRECISION / 10, 2, [0; 32], &supply, start())
        .is_err());
    o.set_max_decrease_bps(&addr("owner"), 50).unwrap();
    o.attest_nav(&addr("auditor"), 995 * PRECISION / 10, 2, [0; 32], &supply, start())
        .unwrap();
    assert_eq!(o.nav_per_share(), PRECISION - PRECISION / 200);
}

#[test]
fn empty_ledger_reports_at_par() {
    let mut o = oracle(&["auditor"], 1);
    o.attest_nav(&addr("auditor"), 0, 1, [0; 32], &Supply(0), start())
        .unwrap();
    assert_eq!(o.nav_per_share(), PRECISION);
}

// ---------------------------------------------------------------------------
// Threshold
// ---------------------------------------------------------------------------

#[test]
fn three_of_four_finalizes_on_third_signature_and_rejects_mismatch() {
    let supply = Supply(1_000 * PRECISION);
    let mut o = oracle(&["a", "b", "c", "d"], 3);
    let proof = sha256_array(b"custodian statement 2026-06-30");
    let assets = 1_000 * PRECISION;

    let first = o
        .attest_nav(&addr("a"), assets, 20260630, proof, &supply, start())
        .unwrap();
    assert!(matches!(first, AttestationOutcome::Pending { signer_count: 1, threshold: 3, .. }));

    assert_eq!(
        o.attest_nav(&addr("a"), assets, 20260630, proof, &supply, start()),
        Err(OracleError::AlreadySigned { attestor: addr("a") })
    );

    let second = o
        .attest_nav(&addr("b"), assets, 20260630, proof, &supply, start())
        .unwrap();
    assert!(matches!(second, AttestationOutcome::Pending { signer_count: 2, .. }));
    assert!(o.current_report().is_none());

    // A fourth attestor proposing different data before finalization.
    let err = o
        .attest_nav(&addr("d"), assets + 1, 20260630, proof, &supply, start())
        .unwrap_err();
    assert!(matches!(err, OracleError::ProposalMismatch { .. }));
    assert_eq!(o.pending_attestation().unwrap().signer_count(), 2);

    let third = o
        .attest_nav(&addr("c"), assets, 20260630, proof, &supply, start())
        .unwrap();
    let AttestationOutcome::Finalized { report } = third else {
        panic!("third signature must finalize");
    };
    assert_eq!(report.attestor, addr("c"));
    assert_eq!(report.report_date, 20260630);
    assert!(o.pending_attestation().is_none());
}

#[test]
fn expired_proposal_is_replaced_on_next_touch() {
    let supply = Supply(PRECISION);
    let mut o = oracle(&["a", "b"], 2);

    o.attest_nav(&addr("a"), PRECISION, 1, [1; 32], &supply, start())
        .unwrap();
    o.take_events();

    let later = start() + Duration::hours(1) + Duration::seconds(1);
    let outcome = o
        .attest_nav(&addr("b"), 2 * PRECISION, 1, [2; 32], &supply, later)
        .unwrap();
    assert!(matches!(outcome, AttestationOutcome::Pending { signer_count: 1, .. }));

    let names: Vec<_> = o.take_events().iter().map(TreasuryEvent::name).collect();
    assert_eq!(names, vec!["attestation_expired", "attestation_submitted"]);
    assert_eq!(o.pending_attestation().unwrap().created_at, later);
}

#[test]
fn proposal_at_exact_expiry_is_still_live() {
    let supply = Supply(PRECISION);
    let mut o = oracle(&["a", "b"], 2);
    o.attest_nav(&addr("a"), PRECISION, 1, [1; 32], &supply, start())
        .unwrap();
    let outcome = o
        .attest_nav(&addr("b"), PRECISION, 1, [1; 32], &supply, start() + Duration::hours(1))
        .unwrap();
    assert!(matches!(outcome, AttestationOutcome::Finalized { .. }));
}

#[test]
fn sweep_drops_expired_proposal() {
    let supply = Supply(PRECISION);
    let mut o = oracle(&["a", "b"], 2);
    o.attest_nav(&addr("a"), PRECISION, 1, [1; 32], &supply, start())
        .unwrap();
    assert!(!o.sweep_expired(start() + Duration::minutes(30)));
    assert!(o.sweep_expired(start() + Duration::hours(2)));
    assert!(o.pending_attestation().is_none());
}

// ---------------------------------------------------------------------------
// Freshness
// ---------------------------------------------------------------------------

#[test]
fn staleness_window_is_inclusive() {
    let mut o = oracle(&["a"], 1);
    o.attest_nav(&addr("a"), PRECISION, 1, [0; 32], &Supply(PRECISION), start())
        .unwrap();
    assert!(o.is_fresh(start() + Duration::hours(26)));
    assert!(!o.is_fresh(start() + Duration::hours(26) + Duration::seconds(1)));
    assert_eq!(o.seconds_since_last_report(start() + Duration::minutes(5)), Some(300));
}
