// Copyright (c) 2026 The Headrace Project

//! Observers for head lifecycle transactions.
//!
//! Each observer matches one transaction kind against the tracked
//! [`ChainState`] and, when it applies, returns the head-facing
//! [`Observation`] together with the advanced state. A transaction for a
//! different head, or one that does not fit the current state, yields
//! `None` silently. These functions are the sole authority moving the
//! chain state through `Idle → Initial → Open → Closed → Final`.

use crate::chain::{
    ChainContext, ChainState, ChainTx, ClosedState, CommitInfo, FinalState, HeadDatum,
    InitialState, OpenState,
};
use crate::head::HeadParameters;
use crate::ledger::Utxo;
use headrace_keys::PartyIndex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// A head lifecycle step observed on the base chain, as reported to the
/// head logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Observation {
    /// A head including us was initialised.
    OnInit {
        /// The frozen parameters from the init datum.
        parameters: HeadParameters,
    },

    /// A party's commit landed.
    OnCommit {
        /// The committing party.
        party: PartyIndex,
        /// The deposited outputs, in the off-chain namespace.
        utxo: Utxo,
    },

    /// All commits were collected; the head is open.
    OnCollect,

    /// The head was torn down before opening.
    OnAbort,

    /// The head was closed.
    OnClose {
        /// Snapshot number the head closed with.
        snapshot_number: u64,
        /// Unix time after which fanout becomes possible.
        deadline: u64,
    },

    /// A party contested the close.
    OnContest {
        /// Number of the contesting snapshot.
        snapshot_number: u64,
        /// The contesting party.
        contester: PartyIndex,
        /// The extended deadline.
        deadline: u64,
    },

    /// The final UTxO was materialised.
    OnFanout {
        /// The materialised UTxO.
        utxo: Utxo,
    },
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnInit { parameters } => {
                write!(f, "OnInit({} parties)", parameters.parties.len())
            }
            Self::OnCommit { party, utxo } => {
                write!(f, "OnCommit({party}, {} outputs)", utxo.len())
            }
            Self::OnCollect => write!(f, "OnCollect"),
            Self::OnAbort => write!(f, "OnAbort"),
            Self::OnClose { snapshot_number, .. } => write!(f, "OnClose(n={snapshot_number})"),
            Self::OnContest {
                snapshot_number,
                contester,
                ..
            } => write!(f, "OnContest(n={snapshot_number}, by {contester})"),
            Self::OnFanout { utxo } => write!(f, "OnFanout({} outputs)", utxo.len()),
        }
    }
}

/// Match `tx` against the tracked state with every observer in turn.
pub fn observe_tx(
    ctx: &ChainContext,
    state: &ChainState,
    tx: &ChainTx,
) -> Option<(Observation, ChainState)> {
    observe_init(ctx, state, tx)
        .or_else(|| observe_commit(state, tx))
        .or_else(|| observe_collect(state, tx))
        .or_else(|| observe_abort(state, tx))
        .or_else(|| observe_close(state, tx))
        .or_else(|| observe_contest(state, tx))
        .or_else(|| observe_fanout(state, tx))
}

/// Observe an init transaction announcing a head that includes us.
pub fn observe_init(
    ctx: &ChainContext,
    state: &ChainState,
    tx: &ChainTx,
) -> Option<(Observation, ChainState)> {
    if !matches!(state, ChainState::Idle) {
        return None;
    }
    let HeadDatum::Init { head_id, parameters } = &tx.datum else {
        return None;
    };
    // Only heads we participate in are tracked; the key must match, not
    // just the index.
    if parameters.party(ctx.party.index) != Some(&ctx.party) {
        return None;
    }
    if tx.outputs.len() != 1 + parameters.parties.len() {
        return None;
    }

    let markers = parameters
        .parties
        .iter()
        .enumerate()
        .map(|(position, party)| (party.index, tx.output_ref(1 + position as u32)))
        .collect();

    debug!(%head_id, "observed init");
    let next = InitialState {
        head_id: *head_id,
        parameters: parameters.clone(),
        head_output: tx.output_ref(0),
        markers,
        commits: Default::default(),
    };
    Some((
        Observation::OnInit {
            parameters: parameters.clone(),
        },
        ChainState::Initial(next),
    ))
}

/// Observe a party's commit to the tracked head.
pub fn observe_commit(state: &ChainState, tx: &ChainTx) -> Option<(Observation, ChainState)> {
    let ChainState::Initial(initial) = state else {
        return None;
    };
    let HeadDatum::Commit { head_id, party, utxo } = &tx.datum else {
        return None;
    };
    if *head_id != initial.head_id {
        return None;
    }
    // A party commits by spending its marker, exactly once.
    if !initial.markers.contains_key(party) {
        return None;
    }
    let value = tx.outputs.first()?.value;

    let mut next = initial.clone();
    next.markers.remove(party);
    next.commits.insert(
        *party,
        CommitInfo {
            output: tx.output_ref(0),
            value,
            utxo: utxo.clone(),
        },
    );

    debug!(%head_id, party, value, "observed commit");
    Some((
        Observation::OnCommit {
            party: *party,
            utxo: utxo.clone(),
        },
        ChainState::Initial(next),
    ))
}

/// Observe the collect transaction opening the tracked head.
pub fn observe_collect(state: &ChainState, tx: &ChainTx) -> Option<(Observation, ChainState)> {
    let ChainState::Initial(initial) = state else {
        return None;
    };
    let HeadDatum::Collect { head_id, utxo_hash } = &tx.datum else {
        return None;
    };
    if *head_id != initial.head_id || !initial.markers.is_empty() {
        return None;
    }
    let utxo = initial.committed_utxo();
    if utxo.hash() != *utxo_hash {
        return None;
    }

    debug!(%head_id, outputs = utxo.len(), "observed collect, head is open");
    let next = OpenState {
        head_id: initial.head_id,
        parameters: initial.parameters.clone(),
        head_output: tx.output_ref(0),
        value: initial.committed_value(),
        utxo,
    };
    Some((Observation::OnCollect, ChainState::Open(next)))
}

/// Observe the abort transaction tearing the tracked head down.
pub fn observe_abort(state: &ChainState, tx: &ChainTx) -> Option<(Observation, ChainState)> {
    let ChainState::Initial(initial) = state else {
        return None;
    };
    let HeadDatum::Abort { head_id } = &tx.datum else {
        return None;
    };
    if *head_id != initial.head_id {
        return None;
    }

    debug!(%head_id, "observed abort");
    let next = FinalState {
        head_id: initial.head_id,
        utxo: initial.committed_utxo(),
    };
    Some((Observation::OnAbort, ChainState::Final(next)))
}

/// Observe the close transaction starting contestation.
pub fn observe_close(state: &ChainState, tx: &ChainTx) -> Option<(Observation, ChainState)> {
    let ChainState::Open(open) = state else {
        return None;
    };
    let HeadDatum::Close {
        head_id,
        snapshot_number,
        utxo_hash,
        deadline,
    } = &tx.datum
    else {
        return None;
    };
    if *head_id != open.head_id {
        return None;
    }

    debug!(%head_id, snapshot_number, deadline, "observed close");
    let next = ClosedState {
        head_id: open.head_id,
        parameters: open.parameters.clone(),
        head_output: tx.output_ref(0),
        value: open.value,
        snapshot_number: *snapshot_number,
        utxo_hash: *utxo_hash,
        deadline: *deadline,
        contesters: Default::default(),
    };
    Some((
        Observation::OnClose {
            snapshot_number: *snapshot_number,
            deadline: *deadline,
        },
        ChainState::Closed(next),
    ))
}

/// Observe a contest overruling the closing snapshot.
///
/// The closed state's snapshot number, deadline and contester set are
/// taken from the contest datum, which is what the on-chain validator
/// checked.
pub fn observe_contest(state: &ChainState, tx: &ChainTx) -> Option<(Observation, ChainState)> {
    let ChainState::Closed(closed) = state else {
        return None;
    };
    let HeadDatum::Contest {
        head_id,
        snapshot_number,
        utxo_hash,
        contester,
        deadline,
    } = &tx.datum
    else {
        return None;
    };
    if *head_id != closed.head_id {
        return None;
    }
    // On-chain rules: a contest must beat the current snapshot, and each
    // party contests at most once.
    if *snapshot_number <= closed.snapshot_number || closed.contesters.contains(contester) {
        return None;
    }
    if !closed.parameters.has_party(*contester) {
        return None;
    }

    let mut next = closed.clone();
    next.head_output = tx.output_ref(0);
    next.snapshot_number = *snapshot_number;
    next.utxo_hash = *utxo_hash;
    next.deadline = *deadline;
    next.contesters.insert(*contester);

    debug!(%head_id, snapshot_number, contester, "observed contest");
    Some((
        Observation::OnContest {
            snapshot_number: *snapshot_number,
            contester: *contester,
            deadline: *deadline,
        },
        ChainState::Closed(next),
    ))
}

/// Observe the fanout transaction finalising the head.
pub fn observe_fanout(state: &ChainState, tx: &ChainTx) -> Option<(Observation, ChainState)> {
    let ChainState::Closed(closed) = state else {
        return None;
    };
    let HeadDatum::Fanout { head_id, utxo } = &tx.datum else {
        return None;
    };
    if *head_id != closed.head_id || utxo.hash() != closed.utxo_hash {
        return None;
    }

    debug!(%head_id, "observed fanout, head is final");
    let next = FinalState {
        head_id: closed.head_id,
        utxo: utxo.clone(),
    };
    Some((
        Observation::OnFanout { utxo: utxo.clone() },
        ChainState::Final(next),
    ))
}
