// Copyright (c) 2026 The Headrace Project

//! Property-based tests over random event sequences.
//!
//! These drive the multi-party rig with arbitrary transaction
//! submissions (valid and invalid alike) and check the invariants that
//! must survive any interleaving.

mod common;

use common::{environments, open_heads, ProtocolRig};
use headrace::head::events::{ClientCommand, ClientNotification, Event};
use headrace::head::{update, HeadState, Outcome};
use headrace::ledger::{OutputRef, SimpleLedger, Tx, Utxo};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

const PARTIES: u32 = 3;

fn seed_utxo() -> Utxo {
    Utxo::from_outputs((1..=8).map(OutputRef))
}

/// A random submission: which party submits, what it spends, what it
/// creates. Inputs overlap the seed set; outputs land in a disjoint
/// range so collisions with inputs cannot happen.
fn submissions() -> impl Strategy<Value = Vec<(usize, u64, u64)>> {
    proptest::collection::vec(
        (0..PARTIES as usize, 1..12u64, 100..1_000u64),
        0..20,
    )
}

fn run_rig(ops: &[(usize, u64, u64)]) -> ProtocolRig {
    let mut rig = ProtocolRig::open(PARTIES, seed_utxo());
    for (i, (party, input, output)) in ops.iter().enumerate() {
        rig.deliver(
            *party,
            Event::Command(ClientCommand::NewTx {
                tx: Tx::new(i as u64 + 1, [*input], [*output]),
            }),
        );
    }
    rig.pump();
    rig
}

proptest! {
    /// Property: replaying a party's journalled events from the initial
    /// state reproduces its final state exactly.
    #[test]
    fn prop_replay_determinism(ops in submissions()) {
        let rig = run_rig(&ops);
        let envs = environments(PARTIES);

        for party in 0..PARTIES as usize {
            let mut state = open_heads(PARTIES, seed_utxo()).remove(party);
            for event in &rig.applied[party] {
                match update(&envs[party], &SimpleLedger, &state, event) {
                    Outcome::NewState { state: next, .. } => state = next,
                    other => {
                        return Err(TestCaseError::fail(format!(
                            "journalled event failed to re-apply: {other:?}"
                        )))
                    }
                }
            }
            prop_assert_eq!(&state, &rig.states[party], "party {} diverged", party);
        }
    }

    /// Property: the confirmed snapshot number never decreases, at any
    /// party, under any submission sequence.
    #[test]
    fn prop_snapshot_monotonicity(ops in submissions()) {
        let mut rig = ProtocolRig::open(PARTIES, seed_utxo());
        let mut high_water = vec![0u64; PARTIES as usize];

        for (i, (party, input, output)) in ops.iter().enumerate() {
            rig.deliver(
                *party,
                Event::Command(ClientCommand::NewTx {
                    tx: Tx::new(i as u64 + 1, [*input], [*output]),
                }),
            );
            for p in 0..PARTIES as usize {
                let number = rig.snapshot_number(p);
                prop_assert!(
                    number >= high_water[p],
                    "party {} went from snapshot {} back to {}",
                    p,
                    high_water[p],
                    number
                );
                high_water[p] = number;
            }
        }
    }

    /// Property: a transaction is reported to the client at most once
    /// per party, no matter how submissions interleave.
    #[test]
    fn prop_tx_received_at_most_once(ops in submissions()) {
        let rig = run_rig(&ops);

        for party in 0..PARTIES as usize {
            let mut seen = std::collections::HashMap::new();
            for notification in &rig.notifications[party] {
                if let ClientNotification::TxReceived { tx } = notification {
                    *seen.entry(tx.id).or_insert(0u32) += 1;
                }
            }
            for (tx_id, count) in seen {
                prop_assert_eq!(count, 1, "party {} saw {} twice", party, tx_id);
            }
        }
    }

    /// Property: every party that ends open agrees on the confirmed
    /// snapshot with every other open party.
    #[test]
    fn prop_parties_converge(ops in submissions()) {
        let rig = run_rig(&ops);

        let reference = match &rig.states[0] {
            HeadState::Open(open) => open.confirmed_snapshot.clone(),
            other => {
                return Err(TestCaseError::fail(format!(
                    "party 0 left the open state: {}",
                    other.tag()
                )))
            }
        };
        for party in 1..PARTIES as usize {
            match &rig.states[party] {
                HeadState::Open(open) => {
                    prop_assert_eq!(&open.confirmed_snapshot, &reference);
                }
                other => {
                    return Err(TestCaseError::fail(format!(
                        "party {party} left the open state: {}",
                        other.tag()
                    )))
                }
            }
        }
    }
}
