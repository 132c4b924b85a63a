//! # Protocol Configuration & Constants
//!
//! Every magic number in Ballast lives here. If you're hardcoding a bound
//! somewhere else, you're doing it wrong and the next audit will say so.
//!
//! Two kinds of values live in this file:
//!
//! - **Hard bounds** (`MAX_*`, `MIN_*`): the envelope inside which owners
//!   may reconfigure the treasury. Changing these is a code change, not an
//!   admin call.
//! - **Defaults** (`DEFAULT_*`): what a freshly constructed treasury starts
//!   with when genesis doesn't say otherwise.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Fixed-point Units
// ---------------------------------------------------------------------------

/// Fixed-point scale for NAV per share and for stable-unit amounts.
/// 18 decimals, because that's what every collateral token on the planet
/// already speaks.
pub const PRECISION: u128 = 1_000_000_000_000_000_000;

/// Decimal places of the stable unit. `PRECISION == 10^STABLE_DECIMALS`.
pub const STABLE_DECIMALS: u8 = 18;

/// Basis-point denominator. 1 bp = 0.01%.
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Largest decimal count we accept for a collateral kind. `10^38` is the
/// biggest power of ten a `u128` can hold.
pub const MAX_COLLATERAL_DECIMALS: u8 = 38;

// ---------------------------------------------------------------------------
// Token Metadata
// ---------------------------------------------------------------------------

/// Display name of the rebasing stable unit.
pub const TOKEN_NAME: &str = "Ballast Dollar";

/// Ticker of the rebasing stable unit.
pub const TOKEN_SYMBOL: &str = "bUSD";

/// Protocol version reported by the node.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Fee Bounds
// ---------------------------------------------------------------------------

/// Hard cap on mint and redeem fees. 100 bps = 1%. Anything above that is
/// a business model, not a fee.
pub const MAX_FEE_BPS: u32 = 100;

/// Default mint fee.
pub const DEFAULT_MINT_FEE_BPS: u32 = 0;

/// Default redeem fee.
pub const DEFAULT_REDEEM_FEE_BPS: u32 = 10;

// ---------------------------------------------------------------------------
// Redemption Pacing
// ---------------------------------------------------------------------------

/// Floor on the redemption delay. One hour is long enough that a holder
/// can't request, watch a NAV update land, and settle inside the same
/// attestation window.
pub const MIN_REDEMPTION_DELAY: Duration = Duration::from_secs(60 * 60);

/// Ceiling on the redemption delay. A week is the longest a holder should
/// ever wait for their own money.
pub const MAX_REDEMPTION_DELAY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default redemption delay: one day.
pub const DEFAULT_REDEMPTION_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Default minimum deposit, normalized to stable precision: one whole unit.
pub const DEFAULT_MIN_DEPOSIT: u128 = PRECISION;

// ---------------------------------------------------------------------------
// NAV Attestation
// ---------------------------------------------------------------------------

/// Default ceiling on a single NAV increase. 100 bps per report is already
/// a very good day for a treasury-bill portfolio.
pub const DEFAULT_MAX_NAV_CHANGE_BPS: u32 = 100;

/// Upper bound owners may configure for `max_change_bps`.
pub const MAX_NAV_CHANGE_BPS_CAP: u32 = 5_000;

/// Default tolerance on a single NAV decrease. Backing principal should not
/// shrink; the band only absorbs fees and rounding.
pub const DEFAULT_NAV_DECREASE_TOLERANCE_BPS: u32 = 10;

/// Upper bound on the decrease tolerance.
pub const MAX_NAV_DECREASE_TOLERANCE_BPS: u32 = 500;

/// A NAV report older than this is stale. 26 hours gives a daily attestor
/// a two-hour grace window.
pub const DEFAULT_MAX_STALENESS: Duration = Duration::from_secs(26 * 60 * 60);

/// An in-flight multi-signer proposal is dropped after this long.
pub const DEFAULT_ATTESTATION_EXPIRY: Duration = Duration::from_secs(60 * 60);

/// Default number of distinct attestors that must agree.
pub const DEFAULT_ATTESTATION_THRESHOLD: usize = 1;

/// Domain tag mixed into every attestation proposal hash.
pub const ATTESTATION_DOMAIN: &str = "ballast/nav-attestation/v1";

/// Domain tag for signed node calls.
pub const CALL_SIGNING_DOMAIN: &str = "ballast/rpc-call/v1";

// ---------------------------------------------------------------------------
// Circuit Breaker
// ---------------------------------------------------------------------------

/// Default coverage floor: 95% collateral per unit of supply.
pub const DEFAULT_CIRCUIT_BREAKER_THRESHOLD_BPS: u32 = 9_500;

/// Highest coverage floor owners may configure (150%).
pub const MAX_CIRCUIT_BREAKER_THRESHOLD_BPS: u32 = 15_000;

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default interface the node listens on. Loopback only unless the
/// operator asks for more.
pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";

/// Default RPC/API port.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

/// How often the node's keeper loop re-evaluates the circuit breaker and
/// NAV freshness.
pub const KEEPER_INTERVAL: Duration = Duration::from_secs(30);
