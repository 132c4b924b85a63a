// Copyright (c) 2026 Ballast Contributors. MIT License.
// See LICENSE for details.

//! # Ballast Protocol: Core Primitives
//!
//! The small, boring foundation under the Ballast treasury: a stable-value
//! token that rebases with an attested net asset value.
//!
//! Nothing in this crate knows what a vault or an oracle is. It provides the
//! vocabulary the contracts speak:
//!
//! - **config**: Hard bounds and defaults. The only home for magic numbers.
//! - **math**: Fixed-point conversions with a single rounding rule
//!   (toward zero) and a 256-bit intermediate so large supplies don't wrap.
//! - **identity**: Opaque account addresses.
//! - **crypto**: BLAKE3/SHA-256 helpers for proposal keys and proof
//!   references, Ed25519 keys and signed-call digests.
//! - **clock**: Injectable time source.
//! - **amount_serde**: `u128` amounts as decimal strings on the wire.
//!
//! ## Design Philosophy
//!
//! 1. If it touches money, it uses checked arithmetic. No exceptions.
//! 2. One rounding rule, one place. Conversions live in [`math`].
//! 3. Time is a capability, not a global.

pub mod amount_serde;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod identity;
pub mod math;

pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::Address;
pub use math::MathError;
