// Copyright (c) 2026 The Headrace Project

//! Events consumed and effects produced by the head logic.
//!
//! Everything that can change head state arrives as an [`Event`]; every
//! externally visible consequence leaves as an [`Effect`]. The logic in
//! [`super::update`] is the only thing between the two.

use crate::chain::{ChainPoint, ChainState, Observation, PostChainTx};
use crate::head::snapshot::Snapshot;
use crate::ledger::{Tx, Utxo};
use crate::network::Message;
use headrace_keys::Party;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A request from the client owning this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientCommand {
    /// Initialise a new head with these parties.
    Init {
        /// The ordered party list, which must include this node.
        parties: Vec<Party>,
    },

    /// Deposit this UTxO into the head.
    Commit {
        /// The outputs to deposit.
        utxo: Utxo,
    },

    /// Submit a transaction inside the head.
    NewTx {
        /// The transaction.
        tx: Tx,
    },

    /// Close the head with the best confirmed snapshot.
    Close,

    /// Report the current local UTxO set.
    GetUtxo,

    /// Tear the head down before it opens.
    Abort,
}

impl fmt::Display for ClientCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init { parties } => write!(f, "Init({} parties)", parties.len()),
            Self::Commit { utxo } => write!(f, "Commit({} outputs)", utxo.len()),
            Self::NewTx { tx } => write!(f, "NewTx({})", tx.id),
            Self::Close => write!(f, "Close"),
            Self::GetUtxo => write!(f, "GetUtxo"),
            Self::Abort => write!(f, "Abort"),
        }
    }
}

/// A notification to the client owning this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientNotification {
    /// A head was initialised; commits may now be posted.
    ReadyToCommit {
        /// The head's party list.
        parties: Vec<Party>,
    },

    /// Every commit was collected; the head is open.
    HeadIsOpen {
        /// The opening UTxO.
        utxo: Utxo,
    },

    /// A transaction was acknowledged by every party.
    TxReceived {
        /// The confirmed transaction.
        tx: Tx,
    },

    /// A snapshot collected every signature.
    SnapshotConfirmed {
        /// The confirmed snapshot body.
        snapshot: Snapshot,
    },

    /// The head closed; contestation is running.
    HeadIsClosed {
        /// Unix time after which the head can fan out.
        deadline: u64,
    },

    /// The head settled back to the base chain.
    HeadIsFinalized {
        /// The settled UTxO.
        utxo: Utxo,
    },

    /// A peer signalled liveness.
    PeerConnected {
        /// The peer's self-reported host.
        host: String,
    },

    /// The current local UTxO set, answering `GetUtxo`.
    CurrentUtxo {
        /// The local UTxO set.
        utxo: Utxo,
    },

    /// A command could not be carried out.
    CommandFailed {
        /// Human-readable reason.
        reason: String,
    },

    /// A waiting event was discarded under queue pressure.
    Dropped {
        /// The discarded event.
        event: Box<Event>,
    },
}

/// Anything that can change head state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A client request.
    Command(ClientCommand),

    /// A message from a peer (possibly ourselves, via loopback).
    Network(Message),

    /// A head transaction observed on the base chain.
    Observation(Observation),

    /// Wall-clock advance derived from a new block.
    Tick {
        /// Slot of the block.
        slot: u64,
        /// Unix time of the slot, in seconds.
        timestamp: u64,
    },

    /// The base chain rolled back; `chain_state` is the restored view.
    Rollback {
        /// The point rolled back to.
        point: ChainPoint,
        /// The chain state at that point.
        chain_state: Box<ChainState>,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(cmd) => write!(f, "command {cmd}"),
            Self::Network(msg) => write!(f, "message {msg}"),
            Self::Observation(obs) => write!(f, "observation {obs}"),
            Self::Tick { slot, .. } => write!(f, "tick @{slot}"),
            Self::Rollback { point, .. } => write!(f, "rollback to {point}"),
        }
    }
}

/// An externally visible consequence of applying an event.
///
/// Effects are dispatched in the order returned, after the causing event
/// has been made durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Broadcast to every party, ourselves included.
    SendToPeers(Message),

    /// Tell the client something happened.
    NotifyClient(ClientNotification),

    /// Ask the chain layer to post a head transaction.
    PostTx(PostChainTx),

    /// Re-enqueue `event` after `duration`.
    Delay {
        /// How long to wait.
        duration: Duration,
        /// The event to deliver afterwards.
        event: Event,
    },
}
