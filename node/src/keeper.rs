//! # Keeper
//!
//! Background housekeeping that nobody else is obliged to trigger:
//! evaluating the circuit breaker, dropping expired attestation proposals
//! and flagging a stale NAV. Runs every `KEEPER_INTERVAL` by default.

use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::api::AppState;
use crate::metrics::bps_fraction;

/// What one keeper pass observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeeperReport {
    /// Breaker state after the check.
    pub breaker_tripped: bool,
    /// Whether an expired proposal was dropped.
    pub swept_attestation: bool,
    /// Whether the NAV report is within its staleness window.
    pub nav_fresh: bool,
}

/// Runs [`tick`] forever at `interval`.
pub async fn run(state: AppState, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(interval_secs = interval.as_secs(), "keeper started");
    loop {
        ticker.tick().await;
        tick(&state);
    }
}

/// One keeper pass. Failures are logged; the next pass tries again.
pub fn tick(state: &AppState) -> KeeperReport {
    let mut report = KeeperReport::default();
    let health = {
        let mut treasury = state.treasury.lock();
        match treasury.check_circuit_breaker() {
            Ok(tripped) => report.breaker_tripped = tripped,
            Err(e) => tracing::warn!(error = %e, "circuit breaker check failed"),
        }
        match treasury.sweep_expired_attestation() {
            Ok(swept) => report.swept_attestation = swept,
            Err(e) => tracing::warn!(error = %e, "attestation sweep failed"),
        }
        treasury.health()
    };

    match health {
        Ok(health) => {
            report.nav_fresh = health.nav_fresh;
            state.metrics.observe_health(&health);
            if health.circuit_breaker.tripped {
                tracing::warn!(
                    coverage = health.collateral_ratio_bps.map(bps_fraction),
                    threshold_bps = health.circuit_breaker.threshold_bps,
                    "circuit breaker is tripped; deposits blocked until reset"
                );
            }
            // A ledger that has never been attested is at par and is not
            // flagged.
            if !health.nav_fresh && health.last_report_date.is_some() {
                tracing::warn!(
                    last_report_date = health.last_report_date,
                    seconds_since_last_report = health.seconds_since_last_report,
                    "NAV report is stale"
                );
            }
        }
        Err(e) => tracing::warn!(error = %e, "health summary unavailable"),
    }
    state.metrics.keeper_runs_total.inc();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis::{DevAccounts, Genesis};
    use ballast_protocol::config::PRECISION;
    use ballast_protocol::crypto::Keypair;
    use ballast_protocol::{Address, ManualClock};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn attestor(seed: u8) -> Address {
        Keypair::from_seed(&[seed; 32]).address()
    }

    fn state() -> (AppState, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap());
        let mut genesis = Genesis::devnet(&DevAccounts::deterministic());
        genesis.vault.mint_fee_bps = 0;
        genesis.attestors = vec![attestor(10), attestor(11)];
        genesis.oracle.threshold = 2;
        let state = AppState::from_genesis(&genesis, Arc::new(clock.clone()), "test".into()).unwrap();
        (state, clock)
    }

    #[test]
    fn trips_breaker_when_coverage_drops() {
        let (state, _) = state();
        {
            let mut t = state.treasury.lock();
            let alice = DevAccounts::deterministic().alice.address();
            t.deposit(&alice, &"DAI".into(), 9_000 * PRECISION, &alice).unwrap();
            t.attest_nav(&attestor(10), 10_000 * PRECISION, 1, [0; 32]).unwrap();
            t.attest_nav(&attestor(11), 10_000 * PRECISION, 1, [0; 32]).unwrap();
        }
        let report = tick(&state);
        assert!(report.breaker_tripped);
        assert!(report.nav_fresh);
        assert_eq!(state.metrics.circuit_breaker_tripped.get(), 1);
        assert_eq!(state.metrics.keeper_runs_total.get(), 1);
    }

    #[test]
    fn sweeps_expired_proposal() {
        let (state, clock) = state();
        state
            .treasury
            .lock()
            .attest_nav(&attestor(10), 0, 1, [0; 32])
            .unwrap();
        assert!(!tick(&state).swept_attestation);

        clock.advance(chrono::Duration::hours(2));
        assert!(tick(&state).swept_attestation);
        assert!(state.treasury.lock().oracle().pending_attestation().is_none());
    }

    #[test]
    fn empty_treasury_is_quiet() {
        let (state, _) = state();
        let report = tick(&state);
        assert_eq!(
            report,
            KeeperReport {
                breaker_tripped: false,
                swept_attestation: false,
                nav_fresh: false,
            }
        );
    }
}
