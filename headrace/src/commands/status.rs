// Copyright (c) 2026 The Headrace Project

//! `headrace status` - summarise the node's recovered head state.

use anyhow::{Context, Result};
use headrace_keys::{read_keyfile, Party};
use std::path::Path;

use crate::config::{journal_path_from_config, keyfile_path_from_config, Config};
use crate::head::{Environment, HeadState};
use crate::journal::EventJournal;
use crate::ledger::SimpleLedger;
use crate::node::replay;

pub fn run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    let key = read_keyfile(keyfile_path_from_config(config_path))
        .context("Failed to read identity keyfile; run `headrace init` first")?;

    println!("=== Headrace Node ===");
    println!("Network:          {}", config.network);
    println!("Verification key: {}", key.verification_key());

    // A devnet run journals under devnet/party-0 instead of the
    // standard location.
    let mut journal_path = journal_path_from_config(config_path);
    if !journal_path.exists() {
        let devnet = config_path
            .parent()
            .unwrap_or(Path::new("."))
            .join("devnet/party-0/events.log");
        if devnet.exists() {
            journal_path = devnet;
        } else {
            println!("Head state:       idle (no journal yet)");
            return Ok(());
        }
    }

    let mut journal = EventJournal::open(&journal_path)?;
    let records = journal.load_all()?;
    let env = Environment {
        party: Party::new(config.party_index, key.verification_key()),
        signing_key: key,
        contestation_period: config.contestation_period_secs,
    };
    let state = replay(&env, &SimpleLedger, &records);

    println!("Journalled events: {}", records.len());
    println!("Head state:       {}", state.tag());
    match &state {
        HeadState::Open(open) => {
            println!(
                "Confirmed snapshot: {} ({} outputs)",
                open.confirmed_snapshot.snapshot.number,
                open.confirmed_snapshot.snapshot.utxo.len()
            );
            println!("Local UTxO:       {} outputs", open.local_utxo.len());
        }
        HeadState::Closed(closed) => {
            println!("Closed with snapshot: {}", closed.closed_number);
            println!("Contestation deadline: {}", closed.contestation_deadline);
        }
        HeadState::Final { utxo } => {
            println!("Settled UTxO:     {} outputs", utxo.len());
        }
        _ => {}
    }
    Ok(())
}
