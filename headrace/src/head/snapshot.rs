// Copyright (c) 2026 The Headrace Project

//! Snapshots: signed, numbered agreements on the head's UTxO.

use crate::ledger::{TxId, Utxo};
use headrace_keys::domain_separators::SNAPSHOT_SIGNING_DOMAIN;
use headrace_keys::{MultiSignature, Party, PartyIndex};
use serde::{Deserialize, Serialize};

/// A numbered, agreed-upon UTxO state of the open head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot number; 0 is the state collected at opening.
    pub number: u64,

    /// The UTxO set after applying `confirmed`.
    pub utxo: Utxo,

    /// Transactions folded into this snapshot, in application order.
    pub confirmed: Vec<TxId>,
}

impl Snapshot {
    /// Canonical bytes every party signs.
    ///
    /// Binds the signature to the snapshot number, the resulting UTxO and
    /// the exact transaction sequence, so a signature can never be
    /// replayed for a different snapshot.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + 32 + 8 * self.confirmed.len());
        bytes.extend_from_slice(&self.number.to_le_bytes());
        bytes.extend_from_slice(&self.utxo.hash());
        bytes.extend_from_slice(&(self.confirmed.len() as u64).to_le_bytes());
        for tx_id in &self.confirmed {
            bytes.extend_from_slice(&tx_id.0.to_le_bytes());
        }
        bytes
    }
}

/// A snapshot together with the signatures that make it binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedSnapshot {
    /// The agreed snapshot body.
    pub snapshot: Snapshot,

    /// One signature per party over the body's signing bytes.
    ///
    /// Snapshot 0 is the exception: it is implied by the collect
    /// transaction on chain and carries no signatures.
    pub signatures: MultiSignature,
}

impl SignedSnapshot {
    /// The initial snapshot formed at opening: number 0, no signatures.
    pub fn genesis(utxo: Utxo) -> Self {
        Self {
            snapshot: Snapshot {
                number: 0,
                utxo,
                confirmed: Vec::new(),
            },
            signatures: MultiSignature::new(),
        }
    }

    /// Verify that every party signed this exact body.
    ///
    /// Snapshot 0 needs no signatures.
    pub fn verify(&self, parties: &[Party]) -> bool {
        if self.snapshot.number == 0 {
            return true;
        }
        self.signatures
            .verify_all(
                parties,
                SNAPSHOT_SIGNING_DOMAIN,
                &self.snapshot.signing_bytes(),
            )
            .is_ok()
    }

    /// Wrap a bare body without signatures. Only for exercising
    /// constructors in tests; `verify` fails for any number > 0.
    #[cfg(test)]
    pub fn unsigned_for_tests(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            signatures: MultiSignature::new(),
        }
    }
}

/// The single snapshot a head may have in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInProgress {
    /// The party that proposed it.
    pub leader: PartyIndex,

    /// The candidate body every party signs.
    pub body: Snapshot,

    /// Signatures collected so far.
    pub acks: MultiSignature,
}

/// The party that proposes snapshot `number`.
///
/// Leadership rotates round-robin starting from the first party, so
/// snapshot 1 belongs to the party at position 0.
pub fn leader_for(parties: &[Party], number: u64) -> &Party {
    let position = (number.saturating_sub(1) as usize) % parties.len();
    &parties[position]
}

#[cfg(test)]
mod tests {
    use super::*;
    use headrace_keys::SigningKey;

    fn parties(n: u32) -> Vec<Party> {
        (0..n)
            .map(|i| Party::new(i, SigningKey::generate().verification_key()))
            .collect()
    }

    #[test]
    fn test_leader_rotates_round_robin() {
        let parties = parties(3);
        assert_eq!(leader_for(&parties, 1).index, 0);
        assert_eq!(leader_for(&parties, 2).index, 1);
        assert_eq!(leader_for(&parties, 3).index, 2);
        assert_eq!(leader_for(&parties, 4).index, 0);
    }

    #[test]
    fn test_signing_bytes_bind_number_and_body() {
        let base = Snapshot {
            number: 1,
            utxo: Utxo::empty(),
            confirmed: vec![TxId(1)],
        };
        let mut other_number = base.clone();
        other_number.number = 2;
        let mut other_txs = base.clone();
        other_txs.confirmed = vec![TxId(2)];

        assert_ne!(base.signing_bytes(), other_number.signing_bytes());
        assert_ne!(base.signing_bytes(), other_txs.signing_bytes());
    }

    #[test]
    fn test_genesis_verifies_without_signatures() {
        let snapshot = SignedSnapshot::genesis(Utxo::empty());
        assert!(snapshot.verify(&parties(3)));
    }
}
