// Copyright (c) 2026 The Headrace Project

//! Common test utilities for the integration suite.
//!
//! Two rigs are provided. [`ProtocolRig`] drives the pure update
//! function for several parties with loopback broadcast semantics and no
//! I/O at all, which makes it the workhorse for protocol-level and
//! property tests. `devnet` builds real nodes wired to the in-process
//! simulator for end-to-end lifecycle tests.

#![allow(dead_code)]

use headrace::head::events::{ClientNotification, Effect, Event};
use headrace::head::{update, Environment, HeadParameters, HeadState, Outcome, SignedSnapshot};
use headrace::ledger::{SimpleLedger, Utxo};
use std::collections::VecDeque;

use headrace_keys::{Party, SigningKey};

/// Deterministic keys and the matching ordered party list.
pub fn keys_and_parties(n: u32) -> (Vec<SigningKey>, Vec<Party>) {
    let keys: Vec<_> = (0..n)
        .map(|i| SigningKey::from_seed(&[i as u8 + 1; 32]))
        .collect();
    let parties = keys
        .iter()
        .enumerate()
        .map(|(i, k)| Party::new(i as u32, k.verification_key()))
        .collect();
    (keys, parties)
}

/// Environments for every party of an `n`-party head.
pub fn environments(n: u32) -> Vec<Environment> {
    let (keys, parties) = keys_and_parties(n);
    keys.into_iter()
        .zip(parties)
        .map(|(signing_key, party)| Environment {
            party,
            signing_key,
            contestation_period: 60,
        })
        .collect()
}

/// An open head for every party, all starting from `utxo`.
pub fn open_heads(n: u32, utxo: Utxo) -> Vec<HeadState> {
    let (_, parties) = keys_and_parties(n);
    (0..n as usize)
        .map(|_| {
            HeadState::Open(headrace::head::OpenHead {
                parameters: HeadParameters {
                    parties: parties.clone(),
                    contestation_period: 60,
                },
                confirmed_snapshot: SignedSnapshot::genesis(utxo.clone()),
                local_utxo: utxo.clone(),
                seen_txs: Vec::new(),
                tx_acks: Default::default(),
                confirmed_txs: Vec::new(),
                pending: None,
            })
        })
        .collect()
}

/// Pure multi-party protocol rig.
///
/// Broadcasts loop back to every party (sender included) in party
/// order; `Wait` outcomes are parked per party and retried after each
/// applied event, the way the node does it.
pub struct ProtocolRig {
    pub envs: Vec<Environment>,
    pub states: Vec<HeadState>,
    /// Applied (journalled) events per party, in application order.
    pub applied: Vec<Vec<Event>>,
    /// Notifications per party, in delivery order.
    pub notifications: Vec<Vec<ClientNotification>>,
    ledger: SimpleLedger,
    queue: VecDeque<(usize, Event)>,
    waiting: Vec<VecDeque<Event>>,
}

impl ProtocolRig {
    /// A rig over `n` parties with all heads open at `utxo`.
    pub fn open(n: u32, utxo: Utxo) -> Self {
        let envs = environments(n);
        let states = open_heads(n, utxo);
        Self {
            applied: vec![Vec::new(); envs.len()],
            notifications: vec![Vec::new(); envs.len()],
            waiting: vec![VecDeque::new(); envs.len()],
            queue: VecDeque::new(),
            ledger: SimpleLedger,
            envs,
            states,
        }
    }

    /// Enqueue an event for one party and pump until quiescent.
    pub fn deliver(&mut self, party: usize, event: Event) {
        self.queue.push_back((party, event));
        self.pump();
    }

    /// Process queued deliveries until nothing moves any more.
    pub fn pump(&mut self) {
        while let Some((party, event)) = self.queue.pop_front() {
            self.apply(party, event);
        }
    }

    fn apply(&mut self, party: usize, event: Event) {
        match update(&self.envs[party], &self.ledger, &self.states[party], &event) {
            Outcome::NewState { state, effects } => {
                self.applied[party].push(event);
                self.states[party] = state;
                for effect in effects {
                    self.dispatch(party, effect);
                }
                // Retry everything this party had parked.
                let parked: Vec<Event> = self.waiting[party].drain(..).collect();
                for event in parked {
                    self.apply(party, event);
                }
            }
            Outcome::Wait => self.waiting[party].push_back(event),
            Outcome::Error(_) => {}
        }
    }

    fn dispatch(&mut self, party: usize, effect: Effect) {
        match effect {
            Effect::SendToPeers(message) => {
                for receiver in 0..self.envs.len() {
                    self.queue
                        .push_back((receiver, Event::Network(message.clone())));
                }
            }
            Effect::NotifyClient(notification) => {
                self.notifications[party].push(notification);
            }
            // No chain in this rig; close/fanout paths are exercised by
            // the devnet tests.
            Effect::PostTx(_) => {}
            Effect::Delay { event, .. } => self.queue.push_back((party, event)),
        }
    }

    /// The confirmed snapshot number at `party`.
    pub fn snapshot_number(&self, party: usize) -> u64 {
        match &self.states[party] {
            HeadState::Open(open) => open.confirmed_snapshot.snapshot.number,
            other => panic!("party {party} is not open: {}", other.tag()),
        }
    }
}

pub mod devnet {
    //! Real nodes wired to the in-process simulator, driven
    //! synchronously.

    use super::*;
    use headrace::chain::{ChainContext, Network};
    use headrace::journal::EventJournal;
    use headrace::node::{Node, NodeHandle, NodeOutputs};
    use headrace::sim::{LoopbackNetwork, SimChain};
    use std::path::Path;
    use std::sync::mpsc::Receiver;

    pub struct DevnetParty {
        pub node: Node<SimpleLedger>,
        pub handle: NodeHandle,
        pub notifications: Receiver<ClientNotification>,
    }

    pub struct Devnet {
        pub chain: SimChain,
        pub network: LoopbackNetwork,
        pub parties: Vec<DevnetParty>,
        pub party_list: Vec<Party>,
    }

    impl Devnet {
        /// `n` nodes journalling under `dir`, sharing a simulated chain
        /// and loopback network.
        pub fn start(dir: &Path, n: u32) -> Self {
            let (keys, party_list) = keys_and_parties(n);
            let chain = SimChain::new();
            let network = LoopbackNetwork::new();
            let mut parties = Vec::new();

            for (index, key) in keys.into_iter().enumerate() {
                let party = party_list[index];
                let env = Environment {
                    party,
                    signing_key: key,
                    contestation_period: 60,
                };
                let ctx = ChainContext {
                    network: Network::Testnet,
                    party,
                };
                let journal =
                    EventJournal::open(dir.join(format!("party-{index}/events.log"))).unwrap();
                let (notify_tx, notify_rx) = std::sync::mpsc::channel();
                let outputs = NodeOutputs {
                    network: Box::new(network.clone()),
                    chain: Box::new(chain.client(ctx.clone())),
                    notifications: notify_tx,
                };
                let (node, handle) = Node::new(env, SimpleLedger, journal, outputs).unwrap();
                network.register(handle.clone());
                chain.attach(ctx, handle.clone());
                parties.push(DevnetParty {
                    node,
                    handle,
                    notifications: notify_rx,
                });
            }

            Self {
                chain,
                network,
                parties,
                party_list,
            }
        }

        /// Let every node process whatever is queued, until the whole
        /// devnet is quiescent.
        pub fn settle(&mut self) {
            loop {
                let mut applied = 0;
                for party in &mut self.parties {
                    applied += party.node.process_pending().unwrap();
                }
                if applied == 0 {
                    break;
                }
            }
        }

        /// Produce one block and settle.
        pub fn tick(&mut self) {
            self.chain.produce_block();
            self.settle();
        }

        /// Produce blocks until `party` receives a matching notification
        /// (or panic after `max_blocks`).
        pub fn tick_until(
            &mut self,
            party: usize,
            what: &str,
            max_blocks: usize,
            pred: impl Fn(&ClientNotification) -> bool,
        ) -> ClientNotification {
            for _ in 0..max_blocks {
                self.tick();
                let received: Vec<_> = self.parties[party].notifications.try_iter().collect();
                if let Some(n) = received.into_iter().find(|n| pred(n)) {
                    return n;
                }
            }
            panic!("gave up waiting for {what}");
        }
    }
}
