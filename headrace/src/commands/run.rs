// Copyright (c) 2026 The Headrace Project

//! `headrace run` - run a local devnet head end to end.
//!
//! Production transports and chain clients plug in from outside this
//! crate; `run` wires the node into the in-process simulator instead and
//! drives a full head lifecycle: init, commit, one in-head transaction
//! with its snapshot, close, contestation, fanout. Useful as a smoke
//! test of a node installation and as a reference for integrators.

use anyhow::{bail, Context, Result};
use headrace_keys::{read_keyfile, Party, SigningKey};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

use crate::chain::{ChainContext, Network};
use crate::config::{keyfile_path_from_config, Config};
use crate::head::events::{ClientCommand, ClientNotification, Event};
use crate::head::Environment;
use crate::journal::EventJournal;
use crate::ledger::{SimpleLedger, Tx, Utxo};
use crate::node::{Node, NodeHandle, NodeOutputs};
use crate::sim::{LoopbackNetwork, SimChain};

pub fn run(config_path: &Path, parties: u32, block_interval_ms: u64) -> Result<()> {
    if parties == 0 || parties > 10 {
        bail!("party count must be between 1 and 10");
    }
    let config = Config::load(config_path)?;
    let our_key = read_keyfile(keyfile_path_from_config(config_path))
        .context("Failed to read identity keyfile; run `headrace init` first")?;

    // Fresh journals per devnet run; state from old runs would replay
    // into the new head otherwise.
    let devnet_dir = config_path.parent().unwrap_or(Path::new(".")).join("devnet");
    if devnet_dir.exists() {
        std::fs::remove_dir_all(&devnet_dir)?;
    }

    // We are party 0; the remaining parties get fresh devnet identities.
    let mut keys: Vec<SigningKey> = vec![our_key];
    keys.extend((1..parties).map(|_| SigningKey::generate()));
    let party_list: Vec<Party> = keys
        .iter()
        .enumerate()
        .map(|(i, k)| Party::new(i as u32, k.verification_key()))
        .collect();

    let chain = SimChain::new();
    let network = LoopbackNetwork::new();
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })?;
    }

    let mut handles: Vec<NodeHandle> = Vec::new();
    let mut workers = Vec::new();
    let mut our_notifications = None;
    // Held open so sim parties' sends do not fail; never read.
    let mut muted_notifications = Vec::new();

    for (index, key) in keys.into_iter().enumerate() {
        let party = party_list[index];
        let env = Environment {
            party,
            signing_key: key,
            contestation_period: config.contestation_period_secs,
        };
        let ctx = ChainContext {
            // The simulator is its own network; the cap demo belongs to
            // real deployments.
            network: Network::Testnet,
            party,
        };
        let journal = EventJournal::open(devnet_dir.join(format!("party-{index}/events.log")))?;
        let (notify_tx, notify_rx) = channel::<ClientNotification>();
        let outputs = NodeOutputs {
            network: Box::new(network.clone()),
            chain: Box::new(chain.client(ctx.clone())),
            notifications: notify_tx,
        };
        let (mut node, handle) = Node::new(env, SimpleLedger, journal, outputs)?;
        node = node.with_wait_queue_depth(config.wait_queue_depth);

        network.register(handle.clone());
        chain.attach(ctx, handle.clone());
        handles.push(handle);
        if index == 0 {
            our_notifications = Some(notify_rx);
        } else {
            muted_notifications.push(notify_rx);
        }

        workers.push(thread::spawn(move || node.run()));
    }
    let notifications = our_notifications.expect("party 0 always exists");

    info!(parties, "devnet started");
    let block_interval = Duration::from_millis(block_interval_ms.max(10));
    let mut driver = Driver {
        chain: &chain,
        notifications: &notifications,
        shutdown: &shutdown,
        block_interval,
    };

    // The scripted lifecycle.
    handles[0].enqueue(Event::Command(ClientCommand::Init {
        parties: party_list.clone(),
    }));
    driver.wait_for("head initialised", |n| {
        matches!(n, ClientNotification::ReadyToCommit { .. })
    })?;

    for (index, handle) in handles.iter().enumerate() {
        let base = (index as u64 + 1) * 100;
        handle.enqueue(Event::Command(ClientCommand::Commit {
            utxo: Utxo::from_outputs([base, base + 1].map(crate::ledger::OutputRef)),
        }));
    }
    driver.wait_for("head open", |n| {
        matches!(n, ClientNotification::HeadIsOpen { .. })
    })?;

    handles[0].enqueue(Event::Command(ClientCommand::NewTx {
        tx: Tx::new(1, [100], [900]),
    }));
    driver.wait_for("transaction confirmed", |n| {
        matches!(n, ClientNotification::TxReceived { .. })
    })?;
    driver.wait_for("snapshot confirmed", |n| {
        matches!(n, ClientNotification::SnapshotConfirmed { .. })
    })?;

    handles[0].enqueue(Event::Command(ClientCommand::Close));
    driver.wait_for("head closed", |n| {
        matches!(n, ClientNotification::HeadIsClosed { .. })
    })?;
    driver.wait_for("head finalised", |n| {
        matches!(n, ClientNotification::HeadIsFinalized { .. })
    })?;

    println!("Devnet head lifecycle complete.");
    for handle in &handles {
        handle.shutdown();
    }
    for worker in workers {
        match worker.join() {
            Ok(result) => result?,
            Err(_) => bail!("node worker panicked"),
        }
    }
    Ok(())
}

struct Driver<'a> {
    chain: &'a SimChain,
    notifications: &'a Receiver<ClientNotification>,
    shutdown: &'a AtomicBool,
    block_interval: Duration,
}

impl Driver<'_> {
    /// Produce blocks until party 0 receives a matching notification,
    /// printing everything that arrives along the way.
    fn wait_for(
        &mut self,
        what: &str,
        matches: impl Fn(&ClientNotification) -> bool,
    ) -> Result<()> {
        // Generous bound: a full contestation period plus slack, in blocks.
        let max_blocks = 10_000u64;
        for _ in 0..max_blocks {
            if self.shutdown.load(Ordering::SeqCst) {
                bail!("interrupted while waiting for {what}");
            }
            self.chain.produce_block();
            thread::sleep(self.block_interval);
            for notification in self.notifications.try_iter() {
                println!("<- {notification:?}");
                if matches(&notification) {
                    return Ok(());
                }
            }
        }
        bail!("gave up waiting for {what} after {max_blocks} blocks")
    }
}
