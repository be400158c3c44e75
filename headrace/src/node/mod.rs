// Copyright (c) 2026 The Headrace Project

//! The node: single owner of the head state.
//!
//! Exactly one worker consumes the event queue. For every event it runs
//! the pure update function, makes the event durable in the journal, and
//! only then dispatches the effects, in order. That serialisation is the
//! whole concurrency policy: network, chain follower and client threads
//! communicate with the core purely by enqueueing events.

use crate::chain::{SubmissionError, TxSubmitter};
use crate::head::events::{ClientNotification, Effect, Event};
use crate::head::{update, Environment, HeadState, Outcome};
use crate::journal::{EventJournal, EventRecord, JournalError};
use crate::ledger::Ledger;
use crate::network::PeerSender;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// How long the worker sleeps on an empty queue before re-checking the
/// shutdown flag.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Default bound on events parked in the wait queue.
pub const DEFAULT_WAIT_QUEUE_DEPTH: usize = 256;

/// Fatal node failures. Anything here ends the process; recovery is a
/// restart followed by journal replay.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The journal is corrupt, contested or unwritable.
    #[error(transparent)]
    Journal(#[from] JournalError),

    /// The chain submission client is gone.
    #[error(transparent)]
    ChainSubmission(SubmissionError),
}

/// Where the node's effects go.
pub struct NodeOutputs {
    /// Broadcast seam to the other parties (and ourselves).
    pub network: Box<dyn PeerSender>,

    /// Submission seam to the base chain.
    pub chain: Box<dyn TxSubmitter>,

    /// Client notification stream.
    pub notifications: Sender<ClientNotification>,
}

/// Handle for feeding events to a running node.
#[derive(Clone)]
pub struct NodeHandle {
    sender: Sender<Event>,
    shutdown: Arc<AtomicBool>,
}

impl NodeHandle {
    /// Enqueue an event for the worker. Returns false when the node has
    /// already stopped.
    pub fn enqueue(&self, event: Event) -> bool {
        self.sender.send(event).is_ok()
    }

    /// Ask the worker to drain and stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// The head node.
pub struct Node<L: Ledger> {
    env: Environment,
    ledger: L,
    state: HeadState,
    journal: EventJournal,
    outputs: NodeOutputs,
    events: Receiver<Event>,
    sender: Sender<Event>,
    shutdown: Arc<AtomicBool>,
    wait_queue: VecDeque<Event>,
    wait_queue_depth: usize,
    known_hosts: HashSet<String>,
}

impl<L: Ledger> Node<L> {
    /// Build a node, replaying the journal to recover the head state.
    pub fn new(
        env: Environment,
        ledger: L,
        mut journal: EventJournal,
        outputs: NodeOutputs,
    ) -> Result<(Self, NodeHandle), NodeError> {
        let records = journal.load_all()?;
        let state = replay(&env, &ledger, &records);
        if !records.is_empty() {
            info!(
                events = records.len(),
                state = state.tag(),
                "recovered head state from journal"
            );
        }

        let (sender, events) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = NodeHandle {
            sender: sender.clone(),
            shutdown: shutdown.clone(),
        };
        let node = Self {
            env,
            ledger,
            state,
            journal,
            outputs,
            events,
            sender,
            shutdown,
            wait_queue: VecDeque::new(),
            wait_queue_depth: DEFAULT_WAIT_QUEUE_DEPTH,
            known_hosts: HashSet::new(),
        };
        Ok((node, handle))
    }

    /// Override the wait-queue bound.
    pub fn with_wait_queue_depth(mut self, depth: usize) -> Self {
        self.wait_queue_depth = depth.max(1);
        self
    }

    /// The current head state. Only meaningful before `run` or from
    /// tests driving the node synchronously.
    pub fn state(&self) -> &HeadState {
        &self.state
    }

    /// Run the worker loop until shutdown is requested (blocks).
    pub fn run(&mut self) -> Result<(), NodeError> {
        info!(party = %self.env.party, "node worker started");
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.events.recv_timeout(IDLE_POLL) {
                Ok(event) => self.step(event)?,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // Drain whatever is already queued, then flush and stop. Posted
        // transactions that are still in flight will be observed (or
        // not) after the next start, via replay plus resynchronisation.
        self.process_pending()?;
        self.journal.flush()?;
        info!("node worker stopped");
        Ok(())
    }

    /// Apply everything currently queued without blocking. Returns the
    /// number of events applied.
    pub fn process_pending(&mut self) -> Result<usize, NodeError> {
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            self.step(event)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Apply a single event: update, persist, dispatch.
    pub fn step(&mut self, event: Event) -> Result<(), NodeError> {
        match update(&self.env, &self.ledger, &self.state, &event) {
            Outcome::NewState { state, effects } => {
                // Absorbed without a trace (duplicate message, idle
                // tick): nothing to persist or dispatch.
                if state == self.state && effects.is_empty() {
                    return Ok(());
                }
                // Durable before visible: the journal write precedes any
                // effect of the event.
                self.journal.append(&event)?;
                debug!(%event, state = state.tag(), "event applied");
                self.state = state;
                self.dispatch(effects)?;
                self.retry_waiting()?;
            }
            Outcome::Wait => {
                debug!(%event, "event parked for retry");
                self.wait_queue.push_back(event);
                if self.wait_queue.len() > self.wait_queue_depth {
                    if let Some(dropped) = self.wait_queue.pop_front() {
                        warn!(event = %dropped, "wait queue full, dropping oldest");
                        self.notify(ClientNotification::Dropped {
                            event: Box::new(dropped),
                        });
                    }
                }
            }
            Outcome::Error(cause) => {
                warn!(%event, %cause, "event rejected");
                if matches!(event, Event::Command(_)) {
                    self.notify(ClientNotification::CommandFailed {
                        reason: cause.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Re-apply parked events once, in arrival order. Events that still
    /// cannot proceed go back to the queue.
    fn retry_waiting(&mut self) -> Result<(), NodeError> {
        let parked: Vec<Event> = self.wait_queue.drain(..).collect();
        for event in parked {
            self.step(event)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, effects: Vec<Effect>) -> Result<(), NodeError> {
        for effect in effects {
            match effect {
                Effect::SendToPeers(message) => {
                    if let Err(e) = self.outputs.network.broadcast(&message) {
                        // Best-effort transport; peers recover via the
                        // protocol's own retries.
                        warn!(%message, error = %e, "broadcast failed");
                    }
                }

                Effect::NotifyClient(notification) => {
                    if let ClientNotification::PeerConnected { host } = &notification {
                        if !self.known_hosts.insert(host.clone()) {
                            continue;
                        }
                    }
                    self.notify(notification);
                }

                Effect::PostTx(intent) => match self.outputs.chain.submit(&intent) {
                    Ok(()) => debug!(%intent, "chain transaction submitted"),
                    Err(SubmissionError::CannotBuild { intent, reason }) => {
                        // The chain state moved under us; a later
                        // observation will settle the disagreement.
                        warn!(intent = %intent, reason = %reason, "chain transaction not buildable");
                    }
                    Err(fatal @ SubmissionError::SubmissionFailed(_)) => {
                        error!(error = %fatal, "chain submission client failed");
                        return Err(NodeError::ChainSubmission(fatal));
                    }
                },

                Effect::Delay { duration, event } => {
                    if duration.is_zero() {
                        let _ = self.sender.send(event);
                    } else {
                        let sender = self.sender.clone();
                        thread::spawn(move || {
                            thread::sleep(duration);
                            let _ = sender.send(event);
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn notify(&self, notification: ClientNotification) {
        if self.outputs.notifications.send(notification).is_err() {
            debug!("client notification receiver is gone");
        }
    }
}

/// Rebuild head state by re-applying journalled events.
///
/// Replay drops effects on the floor: they were already dispatched in
/// the run that journalled them (at-most-once delivery).
pub fn replay<L: Ledger>(env: &Environment, ledger: &L, records: &[EventRecord]) -> HeadState {
    let mut state = HeadState::Idle;
    for record in records {
        match update(env, ledger, &state, &record.event) {
            Outcome::NewState { state: next, .. } => state = next,
            // Only applied events are journalled, so these indicate a
            // version skew; skipping keeps replay total.
            Outcome::Wait | Outcome::Error(_) => {
                warn!(event_id = record.event_id, "journalled event did not re-apply");
            }
        }
    }
    state
}
