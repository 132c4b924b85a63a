//! # Identity Module
//!
//! Who is calling? The treasury core doesn't authenticate anyone itself: the
//! execution environment does that and hands the core an [`Address`]. The
//! node checks an Ed25519 signature over each call (see
//! [`crate::crypto::signatures`]) and derives the address from the key. From then on every authorization decision in the
//! ledger, oracle and vault is a plain equality or set-membership check on
//! addresses.
//!
//! Accounts are implicit. There is no registration step and no account
//! object; a never-seen address simply has zero shares.

pub mod address;

pub use address::Address;
