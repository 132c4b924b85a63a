//! # Cryptography for Ballast
//!
//! Two hash functions and one signature scheme:
//!
//! - **BLAKE3** (domain-separated) for internal identifiers, most notably
//!   the key under which a multi-signer NAV proposal is tracked.
//! - **SHA-256** for proof references. Auditors and custodians publish
//!   SHA-256 digests of their reports; we store whatever they publish.
//! - **Ed25519** for signed node calls. An account address is the hex of
//!   the public key that signs for it.
//!
//! Everything here is a thin, type-safe wrapper around audited crates.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{
    blake3_hash, domain_separated_hash, parse_hash32, sha256, sha256_array, Hash32,
    HashParseError,
};
pub use keys::{Keypair, PublicKey, Signature, SignatureError};
pub use signatures::{call_digest, sign_call, verify_call};
