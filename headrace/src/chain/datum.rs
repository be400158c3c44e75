// Copyright (c) 2026 The Headrace Project

//! Typed head datums.
//!
//! Every head transaction carries a datum naming the lifecycle step it
//! performs together with the data the step commits to on chain. The
//! observers drive the tracked [`super::ChainState`] exclusively from
//! these datums, which is what makes construction and observation exact
//! duals.

use crate::chain::HeadId;
use crate::head::HeadParameters;
use crate::ledger::Utxo;
use headrace_keys::PartyIndex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The head lifecycle step a transaction performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadDatum {
    /// Announce a new head and lay down one initial marker per party.
    Init {
        /// Identifier derived from the seed input.
        head_id: HeadId,
        /// The frozen party list and contestation period.
        parameters: HeadParameters,
    },

    /// A party deposits outputs into the head.
    Commit {
        /// The head being committed to.
        head_id: HeadId,
        /// The committing party.
        party: PartyIndex,
        /// The deposited outputs, in the head's off-chain namespace.
        utxo: Utxo,
    },

    /// All commits are in; the head opens.
    Collect {
        /// The head being opened.
        head_id: HeadId,
        /// Hash of the union of all committed UTxO.
        utxo_hash: [u8; 32],
    },

    /// The head starts its contestation phase.
    Close {
        /// The head being closed.
        head_id: HeadId,
        /// Number of the closing snapshot.
        snapshot_number: u64,
        /// Hash of the closing snapshot's UTxO.
        utxo_hash: [u8; 32],
        /// Unix time after which fanout becomes possible.
        deadline: u64,
    },

    /// A party overrules the closing snapshot with a newer one.
    Contest {
        /// The head being contested.
        head_id: HeadId,
        /// Number of the contesting snapshot.
        snapshot_number: u64,
        /// Hash of the contesting snapshot's UTxO.
        utxo_hash: [u8; 32],
        /// The contesting party.
        contester: PartyIndex,
        /// Extended fanout deadline.
        deadline: u64,
    },

    /// The head is torn down before opening; commits are reimbursed.
    Abort {
        /// The head being aborted.
        head_id: HeadId,
    },

    /// The final snapshot's UTxO is materialised on the base chain.
    Fanout {
        /// The head being finalised.
        head_id: HeadId,
        /// The materialised UTxO.
        utxo: Utxo,
    },
}

impl HeadDatum {
    /// The head this datum belongs to.
    pub fn head_id(&self) -> &HeadId {
        match self {
            Self::Init { head_id, .. }
            | Self::Commit { head_id, .. }
            | Self::Collect { head_id, .. }
            | Self::Close { head_id, .. }
            | Self::Contest { head_id, .. }
            | Self::Abort { head_id }
            | Self::Fanout { head_id, .. } => head_id,
        }
    }

    /// Deterministic digest of the datum, folded into the transaction hash.
    pub fn hash_bytes(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        match self {
            Self::Init { head_id, parameters } => {
                hasher.update([0u8]);
                hasher.update(head_id.0);
                hasher.update((parameters.parties.len() as u64).to_le_bytes());
                for party in &parameters.parties {
                    hasher.update(party.index.to_le_bytes());
                    hasher.update(party.verification_key.to_bytes());
                }
                hasher.update(parameters.contestation_period.to_le_bytes());
            }
            Self::Commit { head_id, party, utxo } => {
                hasher.update([1u8]);
                hasher.update(head_id.0);
                hasher.update(party.to_le_bytes());
                hasher.update(utxo.hash());
            }
            Self::Collect { head_id, utxo_hash } => {
                hasher.update([2u8]);
                hasher.update(head_id.0);
                hasher.update(utxo_hash);
            }
            Self::Close {
                head_id,
                snapshot_number,
                utxo_hash,
                deadline,
            } => {
                hasher.update([3u8]);
                hasher.update(head_id.0);
                hasher.update(snapshot_number.to_le_bytes());
                hasher.update(utxo_hash);
                hasher.update(deadline.to_le_bytes());
            }
            Self::Contest {
                head_id,
                snapshot_number,
                utxo_hash,
                contester,
                deadline,
            } => {
                hasher.update([4u8]);
                hasher.update(head_id.0);
                hasher.update(snapshot_number.to_le_bytes());
                hasher.update(utxo_hash);
                hasher.update(contester.to_le_bytes());
                hasher.update(deadline.to_le_bytes());
            }
            Self::Abort { head_id } => {
                hasher.update([5u8]);
                hasher.update(head_id.0);
            }
            Self::Fanout { head_id, utxo } => {
                hasher.update([6u8]);
                hasher.update(head_id.0);
                hasher.update(utxo.hash());
            }
        }
        hasher.finalize().into()
    }
}
