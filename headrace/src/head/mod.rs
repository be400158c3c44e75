// Copyright (c) 2026 The Headrace Project

//! The head protocol state machine.
//!
//! This module is the deterministic core of the node: a pure function
//! from the current [`HeadState`] and one [`events::Event`] to a new
//! state plus a list of [`events::Effect`]s. All I/O stays outside; the
//! node applies events one at a time and dispatches whatever comes back.

pub mod events;
mod snapshot;
mod state;
mod update;

pub use snapshot::{leader_for, SignedSnapshot, Snapshot, SnapshotInProgress};
pub use state::{ClosedHead, HeadParameters, HeadState, InitialHead, OpenHead};
pub use update::{update, Environment, Outcome};

use crate::ledger::{LedgerError, TxId};
use headrace_keys::PartyIndex;
use thiserror::Error;

/// Protocol violations detected by the head logic.
///
/// These never mutate state: the offending event is reported and the
/// head carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogicError {
    /// The event does not apply to the current state.
    #[error("{event} is not valid in the {state} state")]
    InvalidEvent {
        /// The offending event.
        event: Box<events::Event>,
        /// Tag of the state it hit.
        state: &'static str,
    },

    /// The ledger refused a transaction.
    #[error("ledger rejected {tx}: {cause}")]
    LedgerRejection {
        /// The rejected transaction.
        tx: TxId,
        /// The ledger's reason.
        cause: LedgerError,
    },

    /// A party's signature failed verification where one was required.
    #[error("signature from party {party} does not verify")]
    BadSignature {
        /// The offending party.
        party: PartyIndex,
    },
}
