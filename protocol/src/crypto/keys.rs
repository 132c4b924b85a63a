//! # Operator Keys
//!
//! Ed25519 keypairs for everyone who calls the node: holders, attestors and
//! the owner. An account's [`Address`] is the lowercase hex of its public
//! key, so the key that checks a signature can always be recovered from the
//! address that claims to have made it.
//!
//! Key bytes are never logged.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::identity::Address;

/// Errors decoding keys or checking signatures. Deliberately terse about
/// which part of a signature was wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// Secret key is not 32 bytes of hex.
    #[error("invalid secret key")]
    InvalidSecretKey,

    /// Not a hex-encoded Ed25519 point, or an address that isn't one.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Not 64 bytes of hex.
    #[error("invalid signature bytes: expected 64 bytes of hex")]
    InvalidSignatureBytes,

    /// Well-formed, but not made by this key over this message.
    #[error("signature verification failed")]
    VerificationFailed,
}

/// A signing identity.
///
/// Does not implement `Serialize`: exporting a secret goes through
/// [`Keypair::secret_key_hex`] on purpose.
pub struct Keypair {
    signing_key: SigningKey,
}

/// The public half of a [`Keypair`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(#[serde(with = "hex::serde")] [u8; 32]);

/// A 64-byte Ed25519 signature, hex on the wire.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 64]);

impl Keypair {
    /// Fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed. Tests and devnet fixtures.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Loads a keypair from its hex-encoded secret (surrounding whitespace
    /// is ignored, so a key file may end in a newline).
    pub fn from_hex(secret: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(secret.trim()).map_err(|_| SignatureError::InvalidSecretKey)?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SignatureError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    /// Hex-encoded secret. Handle with care.
    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// The verifying half.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// The account this keypair controls.
    pub fn address(&self) -> Address {
        self.public_key().address()
    }

    /// Signs `message`. Deterministic for a given key and message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

impl PublicKey {
    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decodes lowercase or uppercase hex, with or without `0x`.
    pub fn from_hex(input: &str) -> Result<Self, SignatureError> {
        let trimmed = input.strip_prefix("0x").unwrap_or(input);
        let bytes = hex::decode(trimmed).map_err(|_| SignatureError::InvalidPublicKey)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SignatureError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| SignatureError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    /// Recovers the key behind a key-derived address.
    pub fn from_address(address: &Address) -> Result<Self, SignatureError> {
        Self::from_hex(address.as_str())
    }

    /// The account this key controls.
    pub fn address(&self) -> Address {
        Address::new(self.to_hex())
    }

    /// Checks `signature` over `message` with strict Ed25519 rules.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), SignatureError> {
        let key = VerifyingKey::from_bytes(&self.0).map_err(|_| SignatureError::InvalidPublicKey)?;
        let signature = DalekSignature::from_bytes(&signature.0);
        key.verify_strict(message, &signature)
            .map_err(|_| SignatureError::VerificationFailed)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Signature {
    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decodes 128 hex characters, with or without `0x`.
    pub fn from_hex(input: &str) -> Result<Self, SignatureError> {
        let trimmed = input.strip_prefix("0x").unwrap_or(input);
        let bytes = hex::decode(trimmed).map_err(|_| SignatureError::InvalidSignatureBytes)?;
        let bytes: [u8; 64] = bytes
            .try_into()
            .map_err(|_| SignatureError::InvalidSignatureBytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Signature::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let kp = Keypair::generate();
        let sig = kp.sign(b"deposit 100 USDC");
        assert!(kp.public_key().verify(b"deposit 100 USDC", &sig).is_ok());
        assert_eq!(
            kp.public_key().verify(b"deposit 101 USDC", &sig),
            Err(SignatureError::VerificationFailed)
        );
    }

    #[test]
    fn address_round_trips_to_key() {
        let kp = Keypair::from_seed(&[7; 32]);
        let address = kp.address();
        assert_eq!(address.as_str().len(), 64);
        assert_eq!(PublicKey::from_address(&address).unwrap(), kp.public_key());
        assert_eq!(
            PublicKey::from_address(&Address::from("owner")),
            Err(SignatureError::InvalidPublicKey)
        );
    }

    #[test]
    fn secret_hex_round_trip() {
        let kp = Keypair::generate();
        let restored = Keypair::from_hex(&format!("{}\n", kp.secret_key_hex())).unwrap();
        assert_eq!(restored.public_key(), kp.public_key());
        assert!(Keypair::from_hex("abcd").is_err());
    }

    #[test]
    fn signature_hex_rejects_wrong_length() {
        let sig = Keypair::from_seed(&[1; 32]).sign(b"x");
        assert_eq!(Signature::from_hex(&sig.to_hex()).unwrap(), sig);
        assert_eq!(
            Signature::from_hex("00ff"),
            Err(SignatureError::InvalidSignatureBytes)
        );
    }

    #[test]
    fn debug_never_prints_the_secret() {
        let kp = Keypair::from_seed(&[9; 32]);
        let rendered = format!("{kp:?}");
        assert!(!rendered.contains(&kp.secret_key_hex()));
    }
}
