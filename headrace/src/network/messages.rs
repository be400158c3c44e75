// Copyright (c) 2026 The Headrace Project

//! Messages exchanged between head parties.

use crate::ledger::{Tx, TxId};
use headrace_keys::{PartyIndex, PartySignature};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A message between head parties.
///
/// Transactions travel in full so a party can validate and acknowledge
/// without a separate fetch round; acknowledgements carry only the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Request that every party applies `tx` to its local UTxO set.
    ReqTx {
        /// The transaction to apply.
        tx: Tx,
    },

    /// `party` has applied the transaction and vouches for it.
    AckTx {
        /// The acknowledging party.
        party: PartyIndex,
        /// Which transaction is acknowledged.
        tx_id: TxId,
    },

    /// The leader for `number` proposes the next snapshot.
    ReqSn {
        /// The proposing party; must be the leader for `number`.
        leader: PartyIndex,
        /// The proposed snapshot number.
        number: u64,
        /// Confirmed transactions to fold into the snapshot, in order.
        tx_ids: Vec<TxId>,
    },

    /// `party` signs off on the pending snapshot.
    AckSn {
        /// The signing party.
        party: PartyIndex,
        /// Signature over the snapshot's signing bytes.
        signature: PartySignature,
        /// Which snapshot number is signed.
        number: u64,
    },

    /// Peer liveness beacon.
    Ping {
        /// Self-reported host name of the peer.
        host: String,
    },
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReqTx { tx } => write!(f, "ReqTx({})", tx.id),
            Self::AckTx { party, tx_id } => write!(f, "AckTx({party}, {tx_id})"),
            Self::ReqSn { leader, number, tx_ids } => {
                write!(f, "ReqSn({leader}, n={number}, {} txs)", tx_ids.len())
            }
            Self::AckSn { party, number, .. } => write!(f, "AckSn({party}, n={number})"),
            Self::Ping { host } => write!(f, "Ping({host})"),
        }
    }
}
