// Copyright (c) 2026 The Headrace Project

//! Head state: what a party knows about its head at any moment.

use crate::head::snapshot::{SignedSnapshot, SnapshotInProgress};
use crate::ledger::{Tx, TxId, Utxo};
use headrace_keys::{Party, PartyIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Parameters frozen at head initialisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadParameters {
    /// The ordered, fixed party list.
    pub parties: Vec<Party>,

    /// Contestation period in seconds.
    pub contestation_period: u64,
}

impl HeadParameters {
    /// Look up a party by index.
    pub fn party(&self, index: PartyIndex) -> Option<&Party> {
        self.parties.iter().find(|p| p.index == index)
    }

    /// Whether `index` names a party of this head.
    pub fn has_party(&self, index: PartyIndex) -> bool {
        self.party(index).is_some()
    }
}

/// State while the head gathers commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialHead {
    /// Frozen parameters.
    pub parameters: HeadParameters,

    /// Commits observed so far, per party.
    pub committed: BTreeMap<PartyIndex, Utxo>,

    /// Parties that have not committed yet.
    pub pending_commits: BTreeSet<PartyIndex>,
}

impl InitialHead {
    /// Union of everything committed so far.
    pub fn committed_utxo(&self) -> Utxo {
        self.committed
            .values()
            .fold(Utxo::empty(), |acc, u| acc.union(u))
    }
}

/// State of an open head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenHead {
    /// Frozen parameters.
    pub parameters: HeadParameters,

    /// The latest snapshot every party signed.
    pub confirmed_snapshot: SignedSnapshot,

    /// The confirmed snapshot's UTxO with the seen-transaction suffix
    /// applied.
    pub local_utxo: Utxo,

    /// Transactions applied locally since the confirmed snapshot, in
    /// application order.
    pub seen_txs: Vec<Tx>,

    /// Acknowledgements collected per seen transaction.
    pub tx_acks: BTreeMap<TxId, BTreeSet<PartyIndex>>,

    /// Transactions every party acknowledged, in confirmation order,
    /// not yet folded into a snapshot.
    pub confirmed_txs: Vec<TxId>,

    /// The at-most-one snapshot currently collecting signatures.
    pub pending: Option<SnapshotInProgress>,
}

impl OpenHead {
    /// Find a seen transaction by id.
    pub fn seen_tx(&self, id: TxId) -> Option<&Tx> {
        self.seen_txs.iter().find(|tx| tx.id == id)
    }

    /// Whether `id` has been acknowledged by every party.
    pub fn is_confirmed(&self, id: TxId) -> bool {
        self.confirmed_txs.contains(&id)
    }
}

/// State of a closed head during contestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedHead {
    /// Frozen parameters.
    pub parameters: HeadParameters,

    /// The best snapshot we hold.
    pub confirmed_snapshot: SignedSnapshot,

    /// Snapshot number the head is currently closed with on chain.
    pub closed_number: u64,

    /// Unix time after which fanout becomes possible.
    pub contestation_deadline: u64,

    /// Parties observed contesting so far.
    pub contesters: BTreeSet<PartyIndex>,

    /// Whether we already posted our contest.
    pub contest_posted: bool,

    /// Whether we already posted the fanout.
    pub fanout_posted: bool,
}

/// What a party knows about its head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadState {
    /// No head known.
    Idle,

    /// A head is gathering commits.
    Initial(InitialHead),

    /// The head is open: transactions flow and snapshots confirm.
    Open(OpenHead),

    /// The head is closed; the contestation clock is running.
    Closed(ClosedHead),

    /// The head is gone; this is terminal.
    Final {
        /// The UTxO the head settled with.
        utxo: Utxo,
    },
}

impl HeadState {
    /// Short tag for logs and error messages.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initial(_) => "initial",
            Self::Open(_) => "open",
            Self::Closed(_) => "closed",
            Self::Final { .. } => "final",
        }
    }

    /// The frozen parameters, once a head exists.
    pub fn parameters(&self) -> Option<&HeadParameters> {
        match self {
            Self::Idle | Self::Final { .. } => None,
            Self::Initial(s) => Some(&s.parameters),
            Self::Open(s) => Some(&s.parameters),
            Self::Closed(s) => Some(&s.parameters),
        }
    }
}
