// Copyright (c) 2026 The Headrace Project

//! Ed25519 signing and verification with mandatory domain separation.

use ed25519_dalek::{Signer, Verifier};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Errors from decoding key or signature material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// The bytes do not describe a valid Ed25519 verification key.
    #[error("malformed verification key")]
    MalformedKey,

    /// Signature bytes had the wrong length.
    #[error("malformed signature: expected 64 bytes, got {0}")]
    MalformedSignature(usize),
}

/// A party's private signing key.
///
/// Only ever signs messages prefixed with a domain separator from
/// [`crate::domain_separators`], so signatures cannot cross protocol
/// contexts.
#[derive(Clone)]
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

impl SigningKey {
    /// Generate a fresh random signing key.
    pub fn generate() -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::generate(&mut OsRng),
        }
    }

    /// Rebuild a signing key from its 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// The 32-byte seed, for keyfile storage.
    pub fn to_seed(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// The matching verification key.
    pub fn verification_key(&self) -> VerificationKey {
        VerificationKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Sign `message` under the given domain separator.
    pub fn sign(&self, domain: &str, message: &[u8]) -> PartySignature {
        let mut buf = Vec::with_capacity(domain.len() + message.len());
        buf.extend_from_slice(domain.as_bytes());
        buf.extend_from_slice(message);
        PartySignature {
            bytes: self.inner.sign(&buf).to_bytes(),
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        write!(f, "SigningKey({})", self.verification_key())
    }
}

/// A party's public verification key.
#[derive(Clone, Copy)]
pub struct VerificationKey {
    inner: ed25519_dalek::VerifyingKey,
}

impl VerificationKey {
    /// Decode from the canonical 32-byte form.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SignatureError> {
        let inner = ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map_err(|_| SignatureError::MalformedKey)?;
        Ok(Self { inner })
    }

    /// The canonical 32-byte encoding.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Verify `signature` over `message` under the given domain separator.
    pub fn verify(&self, domain: &str, message: &[u8], signature: &PartySignature) -> bool {
        let mut buf = Vec::with_capacity(domain.len() + message.len());
        buf.extend_from_slice(domain.as_bytes());
        buf.extend_from_slice(message);
        let sig = ed25519_dalek::Signature::from_bytes(&signature.bytes);
        self.inner.verify(&buf, &sig).is_ok()
    }
}

impl PartialEq for VerificationKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for VerificationKey {}

impl PartialOrd for VerificationKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VerificationKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl Hash for VerificationKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_bytes().hash(state);
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerificationKey({self})")
    }
}

// Shortened hex rendering for log output.
impl fmt::Display for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.to_bytes()[..8]))
    }
}

impl Serialize for VerificationKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_bytes().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VerificationKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = <[u8; 32]>::deserialize(deserializer)?;
        VerificationKey::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// A single party's Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PartySignature {
    bytes: [u8; 64],
}

impl PartySignature {
    /// Decode from raw bytes; must be exactly 64 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        let bytes: [u8; 64] = bytes
            .try_into()
            .map_err(|_| SignatureError::MalformedSignature(bytes.len()))?;
        Ok(Self { bytes })
    }

    /// The canonical 64-byte encoding.
    pub fn to_bytes(&self) -> [u8; 64] {
        self.bytes
    }
}

impl fmt::Debug for PartySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartySignature({}..)", hex::encode(&self.bytes[..8]))
    }
}

// Serde helpers: signatures travel as plain byte strings so the wire and
// journal encodings stay canonical.
impl Serialize for PartySignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.bytes)
    }
}

impl<'de> Deserialize<'de> for PartySignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        PartySignature::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_separators::SNAPSHOT_SIGNING_DOMAIN;

    #[test]
    fn test_sign_verify_roundtrip() {
        let key = SigningKey::generate();
        let sig = key.sign(SNAPSHOT_SIGNING_DOMAIN, b"message");
        assert!(key
            .verification_key()
            .verify(SNAPSHOT_SIGNING_DOMAIN, b"message", &sig));
    }

    #[test]
    fn test_wrong_domain_rejected() {
        let key = SigningKey::generate();
        let sig = key.sign(SNAPSHOT_SIGNING_DOMAIN, b"message");
        assert!(!key
            .verification_key()
            .verify("headrace_other_domain", b"message", &sig));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let key = SigningKey::generate();
        let other = SigningKey::generate();
        let sig = key.sign(SNAPSHOT_SIGNING_DOMAIN, b"message");
        assert!(!other
            .verification_key()
            .verify(SNAPSHOT_SIGNING_DOMAIN, b"message", &sig));
    }

    #[test]
    fn test_seed_roundtrip() {
        let key = SigningKey::generate();
        let restored = SigningKey::from_seed(&key.to_seed());
        assert_eq!(key.verification_key(), restored.verification_key());
    }
}
