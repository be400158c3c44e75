// Copyright (c) 2026 The Headrace Project

//! Base-ledger transaction model.
//!
//! This is the slice of the base chain's transaction format the head
//! cares about: inputs, value-carrying outputs, a slot validity range,
//! and a typed datum describing which head lifecycle step the
//! transaction performs. Real deployments map these onto the base
//! ledger's native format at the submission boundary.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::datum::HeadDatum;

/// Hash identifying a base-ledger transaction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TxHash(pub [u8; 32]);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// Reference to an output on the base chain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ChainOutputRef {
    /// The producing transaction.
    pub tx: TxHash,

    /// Output position within that transaction.
    pub index: u32,
}

impl ChainOutputRef {
    /// Reference output `index` of `tx`.
    pub fn new(tx: TxHash, index: u32) -> Self {
        Self { tx, index }
    }
}

impl fmt::Display for ChainOutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx, self.index)
    }
}

/// Address of a base-chain output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Address {
    /// Payment to a key hash.
    Key([u8; 32]),

    /// Payment to a script hash.
    Script([u8; 32]),

    /// Pre-upgrade address form. Still spendable on the base chain but
    /// not representable inside a head.
    Legacy(Vec<u8>),
}

/// A value-carrying output on the base chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainOutput {
    /// Where the value goes.
    pub address: Address,

    /// Amount in the base chain's smallest unit.
    pub value: u64,

    /// An attached reference script, if any.
    pub reference_script: Option<Vec<u8>>,
}

impl ChainOutput {
    /// A plain key-addressed output.
    pub fn to_key(key: [u8; 32], value: u64) -> Self {
        Self {
            address: Address::Key(key),
            value,
            reference_script: None,
        }
    }

    /// A script-addressed output.
    pub fn to_script(script: [u8; 32], value: u64) -> Self {
        Self {
            address: Address::Script(script),
            value,
            reference_script: None,
        }
    }
}

/// Slot validity window of a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityBounds {
    /// First slot (inclusive) the transaction is valid in.
    pub lower: Option<u64>,

    /// Last slot (inclusive) the transaction is valid in.
    pub upper: Option<u64>,
}

/// A base-ledger transaction performing one head lifecycle step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTx {
    /// Consumed outputs.
    pub inputs: Vec<ChainOutputRef>,

    /// Created outputs.
    pub outputs: Vec<ChainOutput>,

    /// Slot validity window, when constrained.
    pub validity: ValidityBounds,

    /// Which lifecycle step this transaction performs.
    pub datum: HeadDatum,
}

impl ChainTx {
    /// Deterministic transaction hash over all fields.
    pub fn hash(&self) -> TxHash {
        let mut hasher = Sha256::new();
        hasher.update((self.inputs.len() as u64).to_le_bytes());
        for input in &self.inputs {
            hasher.update(input.tx.0);
            hasher.update(input.index.to_le_bytes());
        }
        hasher.update((self.outputs.len() as u64).to_le_bytes());
        for output in &self.outputs {
            match &output.address {
                Address::Key(key) => {
                    hasher.update([0u8]);
                    hasher.update(key);
                }
                Address::Script(script) => {
                    hasher.update([1u8]);
                    hasher.update(script);
                }
                Address::Legacy(bytes) => {
                    hasher.update([2u8]);
                    hasher.update((bytes.len() as u64).to_le_bytes());
                    hasher.update(bytes);
                }
            }
            hasher.update(output.value.to_le_bytes());
            match &output.reference_script {
                Some(script) => {
                    hasher.update([1u8]);
                    hasher.update((script.len() as u64).to_le_bytes());
                    hasher.update(script);
                }
                None => hasher.update([0u8]),
            }
        }
        hasher.update(self.validity.lower.unwrap_or(0).to_le_bytes());
        hasher.update(self.validity.upper.unwrap_or(u64::MAX).to_le_bytes());
        hasher.update(self.datum.hash_bytes());
        TxHash(hasher.finalize().into())
    }

    /// Reference to this transaction's output at `index`.
    pub fn output_ref(&self, index: u32) -> ChainOutputRef {
        ChainOutputRef::new(self.hash(), index)
    }
}
