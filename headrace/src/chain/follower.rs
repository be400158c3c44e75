// Copyright (c) 2026 The Headrace Project

//! Chain following: turning raw block events into head events.
//!
//! The follower consumes `RollForward`/`RollBackward` notifications from
//! the base chain client, runs every transaction through the observers,
//! and keeps a bounded, rewindable history of chain states so rollbacks
//! within the base chain's security window can be honoured.

use crate::chain::{observe, BlockHeader, ChainContext, ChainPoint, ChainState, ChainTx};
use crate::head::events::Event;
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, info, warn};

/// How many chain states are retained for rollback, matching the base
/// chain's security parameter: deeper rollbacks cannot happen on an
/// honest chain.
pub const SECURITY_PARAMETER: usize = 2160;

/// Errors from rolling the tracked chain backward.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RollbackError {
    /// The requested point is older than the retained window. Fatal: the
    /// node cannot reconstruct a consistent view and must resynchronise
    /// from scratch.
    #[error("unrecoverable rollback to slot {slot}: older than the retained window")]
    UnrecoverableRollback {
        /// Slot of the requested rollback point.
        slot: u64,
    },
}

/// Bounded, rewindable history of observed chain states.
///
/// Each entry records the state as of one chain point. `rollback`
/// restores the newest entry at or before the requested point.
#[derive(Debug, Clone)]
pub struct LocalChainState {
    entries: VecDeque<(ChainPoint, ChainState)>,
    capacity: usize,
}

impl LocalChainState {
    /// Start tracking from `state` at the chain origin.
    pub fn new(state: ChainState) -> Self {
        Self::with_capacity(SECURITY_PARAMETER, state)
    }

    /// Start tracking with a custom retention window.
    pub fn with_capacity(capacity: usize, state: ChainState) -> Self {
        let mut entries = VecDeque::with_capacity(capacity.min(1024));
        entries.push_back((ChainPoint::origin(), state));
        Self { entries, capacity }
    }

    /// The most recent point and state.
    pub fn current(&self) -> &(ChainPoint, ChainState) {
        self.entries
            .back()
            .expect("history always retains at least one entry")
    }

    /// Record `state` as of `point`, evicting beyond the window.
    pub fn record(&mut self, point: ChainPoint, state: ChainState) {
        self.entries.push_back((point, state));
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Restore the newest state at or before `point`. The history is left
    /// untouched when the point is outside the retained window.
    pub fn rollback(
        &mut self,
        point: &ChainPoint,
    ) -> Result<&(ChainPoint, ChainState), RollbackError> {
        let keep = self
            .entries
            .iter()
            .rposition(|(recorded, _)| recorded.slot <= point.slot)
            .ok_or(RollbackError::UnrecoverableRollback { slot: point.slot })?;
        self.entries.truncate(keep + 1);
        Ok(self.current())
    }
}

/// Follows the base chain on behalf of one head party.
pub struct ChainFollower {
    ctx: ChainContext,
    local: LocalChainState,
}

impl ChainFollower {
    /// Start following from an untracked (idle) chain state.
    pub fn new(ctx: ChainContext) -> Self {
        Self::resume(ctx, ChainState::Idle)
    }

    /// Resume following from a known chain state.
    pub fn resume(ctx: ChainContext, state: ChainState) -> Self {
        Self {
            ctx,
            local: LocalChainState::new(state),
        }
    }

    /// The currently tracked chain state.
    pub fn chain_state(&self) -> &ChainState {
        &self.local.current().1
    }

    /// The point the follower is at.
    pub fn point(&self) -> &ChainPoint {
        &self.local.current().0
    }

    /// Process one new block: observe every head transaction in it, then
    /// advance the clock.
    ///
    /// Returns the head events in order: zero or more observations
    /// followed by exactly one tick.
    pub fn roll_forward(&mut self, header: &BlockHeader, txs: &[ChainTx]) -> Vec<Event> {
        let mut events = Vec::new();
        let mut state = self.chain_state().clone();

        for tx in txs {
            if let Some((observation, next)) = observe::observe_tx(&self.ctx, &state, tx) {
                info!(slot = header.slot, %observation, "head transaction observed");
                events.push(Event::Observation(observation));
                state = next;
            }
        }

        self.local.record(header.point(), state);
        events.push(Event::Tick {
            slot: header.slot,
            timestamp: header.timestamp,
        });
        events
    }

    /// Process a rollback: restore the matching chain state and tell the
    /// head logic about it.
    pub fn roll_backward(&mut self, point: &ChainPoint) -> Result<Event, RollbackError> {
        let (restored_point, restored_state) = match self.local.rollback(point) {
            Ok(entry) => entry.clone(),
            Err(e) => {
                warn!(slot = point.slot, "rollback beyond the retained window");
                return Err(e);
            }
        };
        debug!(
            to_slot = restored_point.slot,
            state = restored_state.tag(),
            "rolled chain state back"
        );
        Ok(Event::Rollback {
            point: restored_point,
            chain_state: Box::new(restored_state),
        })
    }
}
