// Copyright (c) 2026 The Headrace Project

//! The off-chain ledger interface.
//!
//! The head engine treats transactions and UTxO sets as opaque except
//! through [`Ledger`]: a pure validator that either applies a transaction
//! to a UTxO set or rejects it. The bundled [`SimpleLedger`] works over
//! tagged-integer outputs and is what the test suite runs against; a
//! production deployment substitutes the base ledger's own rules.

use headrace_keys::domain_separators::UTXO_HASH_DOMAIN;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Stable identifier of an off-chain transaction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TxId(pub u64);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// Reference to a single output. In the simple scheme an output is fully
/// described by its tag.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct OutputRef(pub u64);

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "out#{}", self.0)
    }
}

/// A UTxO set: the outputs currently available to be spent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    outputs: BTreeSet<OutputRef>,
}

impl Utxo {
    /// The empty UTxO set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a UTxO set from a list of outputs.
    pub fn from_outputs(outputs: impl IntoIterator<Item = OutputRef>) -> Self {
        Self {
            outputs: outputs.into_iter().collect(),
        }
    }

    /// Whether `output` is spendable in this set.
    pub fn contains(&self, output: &OutputRef) -> bool {
        self.outputs.contains(output)
    }

    /// Number of outputs in the set.
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Iterate outputs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &OutputRef> {
        self.outputs.iter()
    }

    /// Union of two UTxO sets.
    pub fn union(&self, other: &Utxo) -> Utxo {
        Utxo {
            outputs: self.outputs.union(&other.outputs).copied().collect(),
        }
    }

    /// Deterministic hash over the canonical (sorted) encoding.
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(UTXO_HASH_DOMAIN.as_bytes());
        hasher.update((self.outputs.len() as u64).to_le_bytes());
        for output in &self.outputs {
            hasher.update(output.0.to_le_bytes());
        }
        hasher.finalize().into()
    }
}

impl FromIterator<OutputRef> for Utxo {
    fn from_iter<I: IntoIterator<Item = OutputRef>>(iter: I) -> Self {
        Self::from_outputs(iter)
    }
}

/// An off-chain transaction in the simple scheme: it consumes a set of
/// outputs and produces a set of fresh ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    /// Stable transaction identifier.
    pub id: TxId,

    /// Outputs consumed.
    pub inputs: BTreeSet<OutputRef>,

    /// Outputs created.
    pub outputs: BTreeSet<OutputRef>,
}

impl Tx {
    /// Build a transaction from input and output tags.
    pub fn new(
        id: u64,
        inputs: impl IntoIterator<Item = u64>,
        outputs: impl IntoIterator<Item = u64>,
    ) -> Self {
        Self {
            id: TxId(id),
            inputs: inputs.into_iter().map(OutputRef).collect(),
            outputs: outputs.into_iter().map(OutputRef).collect(),
        }
    }
}

/// Reasons a transaction cannot be applied to a UTxO set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// An input is not present in the UTxO set. It may be spent already,
    /// or simply not have arrived yet.
    #[error("{tx}: input {missing} not in the UTxO set")]
    MissingInput {
        /// The rejected transaction.
        tx: TxId,
        /// The first input that was not found.
        missing: OutputRef,
    },

    /// An output the transaction would create already exists.
    #[error("{tx}: output {clash} already exists")]
    OutputClash {
        /// The rejected transaction.
        tx: TxId,
        /// The conflicting output.
        clash: OutputRef,
    },
}

/// A pure transaction validator over UTxO sets.
pub trait Ledger {
    /// The UTxO set a fresh head starts from before any commits.
    fn initial(&self) -> Utxo;

    /// Apply `tx` to `utxo`, yielding the successor set or a rejection.
    /// Must be deterministic and side-effect free.
    fn apply(&self, utxo: &Utxo, tx: &Tx) -> Result<Utxo, LedgerError>;

    /// Fold a sequence of transactions over a UTxO set, stopping at the
    /// first rejection.
    fn apply_all<'a>(
        &self,
        utxo: &Utxo,
        txs: impl IntoIterator<Item = &'a Tx>,
    ) -> Result<Utxo, LedgerError> {
        let mut current = utxo.clone();
        for tx in txs {
            current = self.apply(&current, tx)?;
        }
        Ok(current)
    }
}

/// Ledger over tagged-integer outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleLedger;

impl Ledger for SimpleLedger {
    fn initial(&self) -> Utxo {
        Utxo::empty()
    }

    fn apply(&self, utxo: &Utxo, tx: &Tx) -> Result<Utxo, LedgerError> {
        for input in &tx.inputs {
            if !utxo.contains(input) {
                return Err(LedgerError::MissingInput {
                    tx: tx.id,
                    missing: *input,
                });
            }
        }
        for output in &tx.outputs {
            if utxo.contains(output) {
                return Err(LedgerError::OutputClash {
                    tx: tx.id,
                    clash: *output,
                });
            }
        }
        let mut outputs = utxo.outputs.clone();
        for input in &tx.inputs {
            outputs.remove(input);
        }
        outputs.extend(tx.outputs.iter().copied());
        Ok(Utxo { outputs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_spends_and_creates() {
        let ledger = SimpleLedger;
        let utxo = Utxo::from_outputs([OutputRef(1), OutputRef(2)]);
        let tx = Tx::new(1, [1], [3]);

        let next = ledger.apply(&utxo, &tx).unwrap();
        assert!(!next.contains(&OutputRef(1)));
        assert!(next.contains(&OutputRef(2)));
        assert!(next.contains(&OutputRef(3)));
    }

    #[test]
    fn test_apply_rejects_missing_input() {
        let ledger = SimpleLedger;
        let utxo = Utxo::from_outputs([OutputRef(1)]);
        let tx = Tx::new(1, [2], [3]);

        assert_eq!(
            ledger.apply(&utxo, &tx),
            Err(LedgerError::MissingInput {
                tx: TxId(1),
                missing: OutputRef(2),
            })
        );
    }

    #[test]
    fn test_apply_rejects_output_clash() {
        let ledger = SimpleLedger;
        let utxo = Utxo::from_outputs([OutputRef(1), OutputRef(3)]);
        let tx = Tx::new(1, [1], [3]);

        assert!(matches!(
            ledger.apply(&utxo, &tx),
            Err(LedgerError::OutputClash { .. })
        ));
    }

    #[test]
    fn test_apply_all_stops_at_first_rejection() {
        let ledger = SimpleLedger;
        let utxo = Utxo::from_outputs([OutputRef(1)]);
        let txs = [Tx::new(1, [1], [2]), Tx::new(2, [9], [10])];

        assert!(ledger.apply_all(&utxo, txs.iter()).is_err());
    }

    #[test]
    fn test_utxo_hash_is_order_independent() {
        let a = Utxo::from_outputs([OutputRef(2), OutputRef(1)]);
        let b = Utxo::from_outputs([OutputRef(1), OutputRef(2)]);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_utxo_hash_distinguishes_sets() {
        let a = Utxo::from_outputs([OutputRef(1)]);
        let b = Utxo::from_outputs([OutputRef(2)]);
        assert_ne!(a.hash(), b.hash());
    }
}
