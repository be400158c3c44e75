// Copyright (c) 2026 The Headrace Project

//! On-disk identity keyfile.
//!
//! The node's signing key is stored as a small JSON document holding the
//! hex-encoded 32-byte seed. JSON keeps the file inspectable and leaves
//! room for additional fields without breaking old files.

use crate::signing::SigningKey;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Errors reading or writing a keyfile.
#[derive(Debug, Error)]
pub enum KeyfileError {
    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file was not valid keyfile JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The seed field did not decode to 32 bytes of hex.
    #[error("malformed seed in keyfile")]
    MalformedSeed,
}

/// JSON layout of the keyfile on disk.
#[derive(Serialize, Deserialize)]
struct KeyfileJson {
    /// Hex-encoded 32-byte Ed25519 seed.
    seed: String,
}

/// Write `key` to `path` as a keyfile.
pub fn write_keyfile<P: AsRef<Path>>(path: P, key: &SigningKey) -> Result<(), KeyfileError> {
    let json = KeyfileJson {
        seed: hex::encode(key.to_seed()),
    };
    Ok(serde_json::to_writer_pretty(File::create(path)?, &json)?)
}

/// Read a signing key back from a keyfile.
pub fn read_keyfile<P: AsRef<Path>>(path: P) -> Result<SigningKey, KeyfileError> {
    let json: KeyfileJson = serde_json::from_reader(File::open(path)?)?;
    let bytes = hex::decode(&json.seed).map_err(|_| KeyfileError::MalformedSeed)?;
    let seed: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| KeyfileError::MalformedSeed)?;
    Ok(SigningKey::from_seed(&seed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyfile_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");

        let key = SigningKey::generate();
        write_keyfile(&path, &key).unwrap();
        let restored = read_keyfile(&path).unwrap();

        assert_eq!(key.verification_key(), restored.verification_key());
    }

    #[test]
    fn test_keyfile_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        std::fs::write(&path, b"{\"seed\": \"zz\"}").unwrap();
        assert!(matches!(
            read_keyfile(&path),
            Err(KeyfileError::MalformedSeed)
        ));
    }
}
