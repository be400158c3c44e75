// Copyright (c) 2026 The Headrace Project

//! The on-chain head lifecycle as driven and observed off-chain.
//!
//! A head anchors to the base chain through seven transaction kinds:
//! init, commit, collect, close, contest, abort and fanout. This module
//! provides the dual families of operations over them:
//!
//! - **Constructors** ([`construct`]) are pure functions from the tracked
//!   [`ChainState`] and arguments to a base-ledger transaction (or a
//!   structured rejection).
//! - **Observers** ([`observe`]) match transactions seen in blocks against
//!   the tracked state and are the only authority advancing it through
//!   `Idle → Initial → Open → Closed → Final`.
//!
//! The [`follower`] submodule turns raw block events into head events and
//! maintains the bounded rollback history.

pub mod construct;
mod datum;
pub mod follower;
pub mod observe;
#[cfg(test)]
pub(crate) mod testing;
mod tx;

pub use datum::HeadDatum;
pub use follower::{ChainFollower, LocalChainState, RollbackError, SECURITY_PARAMETER};
pub use observe::{observe_tx, Observation};
pub use tx::{Address, ChainOutput, ChainOutputRef, ChainTx, TxHash, ValidityBounds};

use crate::head::{HeadParameters, SignedSnapshot};
use crate::ledger::Utxo;
use headrace_keys::{Party, PartyIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Hard cap on the total value a single head may hold on mainnet.
///
/// Commits that would push the head past this ceiling are rejected with
/// [`CommitError::CommittedTooMuchForMainnet`]. Testnets are uncapped.
pub const MAINNET_COMMIT_CAP: u64 = 100_000_000_000;

/// Which base network the node is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// The real network, value-capped.
    Mainnet,
    /// Test network, uncapped.
    Testnet,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mainnet => write!(f, "mainnet"),
            Self::Testnet => write!(f, "testnet"),
        }
    }
}

/// Identifier of a head, derived from its seed input.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct HeadId(pub [u8; 32]);

impl fmt::Display for HeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// A position on the base chain: slot plus block hash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ChainPoint {
    /// Slot of the block.
    pub slot: u64,

    /// Hash of the block.
    pub block_hash: [u8; 32],
}

impl ChainPoint {
    /// The origin of the chain, before any block.
    pub fn origin() -> Self {
        Self {
            slot: 0,
            block_hash: [0u8; 32],
        }
    }
}

impl fmt::Display for ChainPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {} ({})", self.slot, hex::encode(&self.block_hash[..8]))
    }
}

/// A slot paired with its wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointInTime {
    /// The slot.
    pub slot: u64,

    /// Unix time of that slot, in seconds.
    pub timestamp: u64,
}

/// Header of an observed block, as delivered by the chain follower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Slot the block was produced in.
    pub slot: u64,

    /// Block hash.
    pub hash: [u8; 32],

    /// Unix time of the slot, in seconds.
    pub timestamp: u64,
}

impl BlockHeader {
    /// The chain point this header identifies.
    pub fn point(&self) -> ChainPoint {
        ChainPoint {
            slot: self.slot,
            block_hash: self.hash,
        }
    }
}

/// Static context for constructing head transactions.
#[derive(Debug, Clone)]
pub struct ChainContext {
    /// Which network the transactions target.
    pub network: Network,

    /// Our own party identity.
    pub party: Party,
}

/// A party's commit as tracked on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// The commit output holding the deposited value.
    pub output: ChainOutputRef,

    /// Total deposited value.
    pub value: u64,

    /// The deposited outputs in the head's off-chain namespace.
    pub utxo: Utxo,
}

/// Tracked state while the head gathers commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialState {
    /// The head being set up.
    pub head_id: HeadId,

    /// Frozen parameters from the init transaction.
    pub parameters: HeadParameters,

    /// The head output carrying the lifecycle forward.
    pub head_output: ChainOutputRef,

    /// Unspent initial markers, one per party that has not committed yet.
    pub markers: BTreeMap<PartyIndex, ChainOutputRef>,

    /// Commits observed so far.
    pub commits: BTreeMap<PartyIndex, CommitInfo>,
}

impl InitialState {
    /// Union of all committed UTxO observed so far.
    pub fn committed_utxo(&self) -> Utxo {
        self.commits
            .values()
            .fold(Utxo::empty(), |acc, c| acc.union(&c.utxo))
    }

    /// Total committed value.
    pub fn committed_value(&self) -> u64 {
        self.commits.values().map(|c| c.value).sum()
    }

    /// Parties that have not committed yet.
    pub fn pending_parties(&self) -> BTreeSet<PartyIndex> {
        self.markers.keys().copied().collect()
    }
}

/// Tracked state of an open head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenState {
    /// The open head.
    pub head_id: HeadId,

    /// Frozen parameters.
    pub parameters: HeadParameters,

    /// The head output carrying the lifecycle forward.
    pub head_output: ChainOutputRef,

    /// Total value locked in the head.
    pub value: u64,

    /// The UTxO collected at opening, in the off-chain namespace.
    pub utxo: Utxo,
}

/// Tracked state of a closed head awaiting fanout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedState {
    /// The closed head.
    pub head_id: HeadId,

    /// Frozen parameters.
    pub parameters: HeadParameters,

    /// The head output carrying the lifecycle forward.
    pub head_output: ChainOutputRef,

    /// Total value locked in the head.
    pub value: u64,

    /// Number of the currently winning snapshot.
    pub snapshot_number: u64,

    /// UTxO hash of the currently winning snapshot.
    pub utxo_hash: [u8; 32],

    /// Unix time after which fanout becomes possible.
    pub deadline: u64,

    /// Parties that have contested so far.
    pub contesters: BTreeSet<PartyIndex>,
}

/// Tracked state of a finalised head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalState {
    /// The finalised head.
    pub head_id: HeadId,

    /// The UTxO materialised (fanout) or reimbursed (abort).
    pub utxo: Utxo,
}

/// The on-chain lifecycle state tracked off-chain.
///
/// Only the observers in [`observe`] advance this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainState {
    /// No head known.
    Idle,

    /// A head is gathering commits.
    Initial(InitialState),

    /// The head is open.
    Open(OpenState),

    /// The head is closed, contestation running.
    Closed(ClosedState),

    /// The head is finalised; no further transitions.
    Final(FinalState),
}

impl ChainState {
    /// Short tag for logs.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initial(_) => "initial",
            Self::Open(_) => "open",
            Self::Closed(_) => "closed",
            Self::Final(_) => "final",
        }
    }

    /// The tracked head id, if any head is known.
    pub fn head_id(&self) -> Option<&HeadId> {
        match self {
            Self::Idle => None,
            Self::Initial(s) => Some(&s.head_id),
            Self::Open(s) => Some(&s.head_id),
            Self::Closed(s) => Some(&s.head_id),
            Self::Final(s) => Some(&s.head_id),
        }
    }
}

/// A head transaction the logic wants posted on chain.
///
/// The chain layer resolves the intent against its tracked state, builds
/// the concrete transaction with [`construct`], and submits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostChainTx {
    /// Announce a new head with these parameters.
    Init {
        /// The parameters to freeze on chain.
        parameters: HeadParameters,
    },

    /// Deposit this UTxO into the head.
    Commit {
        /// The outputs to deposit, in the off-chain namespace.
        utxo: Utxo,
    },

    /// Tear the head down before opening.
    Abort,

    /// Open the head once every party has committed.
    Collect,

    /// Close the head with this snapshot.
    Close {
        /// The snapshot to close with.
        snapshot: SignedSnapshot,
    },

    /// Overrule the closing snapshot.
    Contest {
        /// The newer snapshot.
        snapshot: SignedSnapshot,
    },

    /// Materialise the final UTxO after the deadline.
    Fanout {
        /// The UTxO to materialise.
        utxo: Utxo,
    },
}

impl fmt::Display for PostChainTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init { .. } => write!(f, "init"),
            Self::Commit { .. } => write!(f, "commit"),
            Self::Abort => write!(f, "abort"),
            Self::Collect => write!(f, "collect"),
            Self::Close { snapshot } => write!(f, "close(n={})", snapshot.snapshot.number),
            Self::Contest { snapshot } => write!(f, "contest(n={})", snapshot.snapshot.number),
            Self::Fanout { .. } => write!(f, "fanout"),
        }
    }
}

/// Submission side of the chain client, as seen by the node.
pub trait TxSubmitter: Send {
    /// Resolve and submit `intent`. Submission is fire-and-forget: the
    /// outcome is learned by observing (or not observing) the transaction
    /// in a later block.
    fn submit(&self, intent: &PostChainTx) -> Result<(), SubmissionError>;
}

/// Errors from the submission seam.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// The intent cannot be built against the current chain state.
    #[error("cannot build {intent} transaction: {reason}")]
    CannotBuild {
        /// The rejected intent, for logs.
        intent: String,
        /// Why construction failed.
        reason: String,
    },

    /// The submission client is unreachable. Fatal to the node.
    #[error("chain submission failed: {0}")]
    SubmissionFailed(String),
}

/// Rejections from the commit constructor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    /// A committed output uses a legacy address form.
    #[error("cannot commit {output}: legacy address form")]
    UnsupportedLegacyOutput {
        /// The offending output.
        output: ChainOutputRef,
    },

    /// A committed output carries a reference script.
    #[error("cannot commit {output}: output carries a reference script")]
    CannotCommitReferenceScript {
        /// The offending output.
        output: ChainOutputRef,
    },

    /// The commit would exceed the mainnet value ceiling.
    #[error("committed too much for mainnet: {amount} > cap {cap}")]
    CommittedTooMuchForMainnet {
        /// Total value the head would hold.
        amount: u64,
        /// The ceiling.
        cap: u64,
    },

    /// Our initial marker is not spendable (already committed, or the
    /// init transaction did not include us).
    #[error("cannot find own initial marker for party {party}")]
    CannotFindOwnInitial {
        /// Our party index.
        party: PartyIndex,
    },
}

/// Rejections from the collect constructor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectError {
    /// Not every party has committed yet.
    #[error("cannot collect: {missing} parties have not committed")]
    MissingCommits {
        /// How many commits are outstanding.
        missing: usize,
    },
}

/// Rejections from the close constructor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloseError {
    /// The validity window is wider than the contestation period allows.
    #[error(
        "close validity bounds too wide: slots {lower_slot}..={upper_slot} \
         exceed contestation period of {contestation_period}s"
    )]
    ValidityBoundsTooWide {
        /// Lower validity slot.
        lower_slot: u64,
        /// Upper validity slot.
        upper_slot: u64,
        /// The head's contestation period in seconds.
        contestation_period: u64,
    },
}

/// Rejections from the contest constructor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContestError {
    /// The proposed snapshot does not beat the one the head closed with.
    #[error("contest snapshot {proposed} does not beat closed snapshot {closed}")]
    SnapshotNotNewer {
        /// Number the head is currently closed with.
        closed: u64,
        /// Number of the proposed contesting snapshot.
        proposed: u64,
    },

    /// We already contested; a party contests at most once.
    #[error("party {party} has already contested")]
    AlreadyContested {
        /// Our party index.
        party: PartyIndex,
    },
}

/// Rejections from the fanout constructor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FanoutError {
    /// The contestation deadline has not passed yet.
    #[error("fanout before deadline: now {now} <= deadline {deadline}")]
    DeadlineNotReached {
        /// Wall-clock time of the attempted lower validity bound.
        now: u64,
        /// The contestation deadline.
        deadline: u64,
    },

    /// The UTxO to materialise does not match the winning snapshot.
    #[error("fanout UTxO does not match the winning snapshot")]
    UtxoMismatch,
}
