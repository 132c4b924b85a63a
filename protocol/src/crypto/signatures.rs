//! # Signed Calls
//!
//! Every state-changing request to a node is signed by the account it acts
//! for. The signature covers a domain-separated BLAKE3 digest of
//!
//! ```text
//!   len(method) ‖ method ‖ nonce ‖ canonical JSON of the arguments
//! ```
//!
//! so a signature for one method, nonce or argument set is useless for any
//! other. Nonces are per signer and must strictly increase; the node keeps
//! track of the last one it accepted.

use crate::config::CALL_SIGNING_DOMAIN;
use crate::crypto::hash::{domain_separated_hash, Hash32};
use crate::identity::Address;

use super::keys::{Keypair, PublicKey, Signature, SignatureError};

/// Digest a call signature commits to.
pub fn call_digest(method: &str, nonce: u64, args: &[u8]) -> Hash32 {
    let method_len = (method.len() as u64).to_be_bytes();
    domain_separated_hash(
        CALL_SIGNING_DOMAIN,
        &[&method_len, method.as_bytes(), &nonce.to_be_bytes(), args],
    )
}

/// Signs a call as `keypair`'s account.
///
/// # Example
///
/// ```
/// use ballast_protocol::crypto::{sign_call, verify_call, Keypair};
///
/// let alice = Keypair::from_seed(&[1; 32]);
/// let args = br#"{"amount":"5"}"#;
/// let signature = sign_call(&alice, "ballast_transfer", 1, args);
/// assert!(verify_call(&alice.address(), "ballast_transfer", 1, args, &signature).is_ok());
/// assert!(verify_call(&alice.address(), "ballast_transfer", 2, args, &signature).is_err());
/// ```
pub fn sign_call(keypair: &Keypair, method: &str, nonce: u64, args: &[u8]) -> Signature {
    keypair.sign(&call_digest(method, nonce, args))
}

/// Checks that `signer`'s key signed this exact call. Returns the signer's
/// canonical (lowercase) address.
pub fn verify_call(
    signer: &Address,
    method: &str,
    nonce: u64,
    args: &[u8],
    signature: &Signature,
) -> Result<Address, SignatureError> {
    let key = PublicKey::from_address(signer)?;
    key.verify(&call_digest(method, nonce, args), signature)?;
    Ok(key.address())
}
