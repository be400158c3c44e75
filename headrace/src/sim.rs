// Copyright (c) 2026 The Headrace Project

//! In-process devnet harness.
//!
//! Production deployments bring their own transport and chain client;
//! this module provides working stand-ins for both so a multi-party head
//! can run entirely inside one process: a [`SimChain`] that builds
//! blocks from submitted intents and feeds every node's follower, and a
//! [`LoopbackNetwork`] that delivers broadcasts to all registered nodes,
//! the sender included. The `run --devnet` command and the integration
//! tests are built on it.

use crate::chain::{
    construct, observe, ChainContext, ChainFollower, ChainOutput, ChainOutputRef, ChainState,
    ChainTx, PointInTime, PostChainTx, SubmissionError, TxHash, TxSubmitter,
};
use crate::head::events::Event;
use crate::network::{Message, NetworkError, PeerSender};
use crate::node::NodeHandle;
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Value of the faucet output backing each simulated commit.
pub const FAUCET_VALUE: u64 = 1_000;

/// Wall-clock time of slot 0.
const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

fn timestamp_of(slot: u64) -> u64 {
    GENESIS_TIMESTAMP + slot
}

struct ChainInner {
    slot: u64,
    state: ChainState,
    mempool: Vec<ChainTx>,
    nodes: Vec<(ChainFollower, NodeHandle)>,
    observer_ctx: Option<ChainContext>,
    next_seed: u64,
}

impl ChainInner {
    fn fresh_ref(&mut self) -> ChainOutputRef {
        self.next_seed += 1;
        let mut hasher = Sha256::new();
        hasher.update(b"sim-faucet");
        hasher.update(self.next_seed.to_le_bytes());
        ChainOutputRef::new(TxHash(hasher.finalize().into()), 0)
    }
}

/// A simulated base chain shared by every node in the process.
#[derive(Clone)]
pub struct SimChain {
    inner: Arc<Mutex<ChainInner>>,
}

impl Default for SimChain {
    fn default() -> Self {
        Self::new()
    }
}

impl SimChain {
    /// An empty chain at slot 0.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ChainInner {
                slot: 0,
                state: ChainState::Idle,
                mempool: Vec::new(),
                nodes: Vec::new(),
                observer_ctx: None,
                next_seed: 0,
            })),
        }
    }

    /// A submission client for one party.
    pub fn client(&self, ctx: ChainContext) -> SimChainClient {
        SimChainClient {
            ctx,
            inner: self.inner.clone(),
        }
    }

    /// Attach a node: its follower starts at the chain origin and every
    /// produced block is delivered to it.
    pub fn attach(&self, ctx: ChainContext, handle: NodeHandle) {
        let mut inner = self.lock();
        if inner.observer_ctx.is_none() {
            inner.observer_ctx = Some(ctx.clone());
        }
        inner.nodes.push((ChainFollower::new(ctx), handle));
    }

    /// Produce the next block from whatever was submitted, advance the
    /// authoritative state, and deliver the block to every attached node.
    pub fn produce_block(&self) {
        let mut inner = self.lock();
        inner.slot += 1;
        let slot = inner.slot;

        let mut hasher = Sha256::new();
        hasher.update(b"sim-block");
        hasher.update(slot.to_le_bytes());
        let header = crate::chain::BlockHeader {
            slot,
            hash: hasher.finalize().into(),
            timestamp: timestamp_of(slot),
        };

        let submitted = std::mem::take(&mut inner.mempool);
        let mut included = Vec::new();
        if let Some(ctx) = inner.observer_ctx.clone() {
            for tx in submitted {
                match observe::observe_tx(&ctx, &inner.state, &tx) {
                    Some((_, next)) => {
                        inner.state = next;
                        included.push(tx);
                    }
                    // Stale against the current state (e.g. a second
                    // collect); the chain would reject it too.
                    None => debug!(slot, "dropping stale submitted tx"),
                }
            }
        }

        for (follower, handle) in &mut inner.nodes {
            for event in follower.roll_forward(&header, &included) {
                handle.enqueue(event);
            }
        }
    }

    /// Produce several blocks back to back.
    pub fn produce_blocks(&self, count: usize) {
        for _ in 0..count {
            self.produce_block();
        }
    }

    /// Current slot.
    pub fn slot(&self) -> u64 {
        self.lock().slot
    }

    /// Tag of the authoritative chain state, for status output.
    pub fn state_tag(&self) -> &'static str {
        self.lock().state.tag()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChainInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One party's submission seam into the [`SimChain`].
pub struct SimChainClient {
    ctx: ChainContext,
    inner: Arc<Mutex<ChainInner>>,
}

impl TxSubmitter for SimChainClient {
    fn submit(&self, intent: &PostChainTx) -> Result<(), SubmissionError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let tx = build_tx(&mut inner, &self.ctx, intent).map_err(|reason| {
            SubmissionError::CannotBuild {
                intent: intent.to_string(),
                reason,
            }
        })?;
        inner.mempool.push(tx);
        Ok(())
    }
}

/// Resolve an intent against the authoritative state into a concrete
/// transaction.
fn build_tx(
    inner: &mut ChainInner,
    ctx: &ChainContext,
    intent: &PostChainTx,
) -> Result<ChainTx, String> {
    match (intent, inner.state.clone()) {
        (PostChainTx::Init { parameters }, ChainState::Idle) => {
            let seed = inner.fresh_ref();
            Ok(construct::initialize(ctx, parameters, seed))
        }

        (PostChainTx::Commit { utxo }, ChainState::Initial(initial)) => {
            let backing = (
                inner.fresh_ref(),
                ChainOutput::to_key(ctx.party.verification_key.to_bytes(), FAUCET_VALUE),
            );
            construct::commit(ctx, &initial, &[backing], utxo).map_err(|e| e.to_string())
        }

        (PostChainTx::Abort, ChainState::Initial(initial)) => {
            Ok(construct::abort(ctx, &initial))
        }

        (PostChainTx::Collect, ChainState::Initial(initial)) => {
            construct::collect(ctx, &initial).map_err(|e| e.to_string())
        }

        (PostChainTx::Close { snapshot }, ChainState::Open(open)) => {
            let lower = inner.slot;
            let upper_slot = lower + open.parameters.contestation_period;
            let upper = PointInTime {
                slot: upper_slot,
                timestamp: timestamp_of(upper_slot),
            };
            construct::close(ctx, &open, snapshot, lower, upper).map_err(|e| e.to_string())
        }

        (PostChainTx::Contest { snapshot }, ChainState::Closed(closed)) => {
            construct::contest(ctx, &closed, snapshot).map_err(|e| e.to_string())
        }

        (PostChainTx::Fanout { utxo }, ChainState::Closed(closed)) => {
            let slot = inner.slot + 1;
            let lower = PointInTime {
                slot,
                timestamp: timestamp_of(slot),
            };
            construct::fanout(ctx, &closed, utxo, lower).map_err(|e| e.to_string())
        }

        (intent, state) => Err(format!(
            "{intent} cannot be posted while the chain is {}",
            state.tag()
        )),
    }
}

/// Broadcast seam delivering every message to every registered node,
/// the sender included.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    handles: Arc<Mutex<Vec<NodeHandle>>>,
}

impl LoopbackNetwork {
    /// An empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node for delivery.
    pub fn register(&self, handle: NodeHandle) {
        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }
}

impl PeerSender for LoopbackNetwork {
    fn broadcast(&self, message: &Message) -> Result<(), NetworkError> {
        let handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        for handle in handles.iter() {
            handle.enqueue(Event::Network(message.clone()));
        }
        Ok(())
    }
}
