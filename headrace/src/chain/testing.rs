// Copyright (c) 2026 The Headrace Project

//! Shared fixtures for chain-layer unit tests.

use crate::chain::{
    construct, observe, ChainContext, ChainOutput, ChainOutputRef, ChainState, ClosedState,
    InitialState, Network, OpenState, TxHash,
};
use crate::head::HeadParameters;
use crate::ledger::{OutputRef, Utxo};
use headrace_keys::{Party, SigningKey};

/// Deterministic party list: party `i` signs with seed `[i; 32]`.
pub(crate) fn keys_and_parties(n: u32) -> (Vec<SigningKey>, Vec<Party>) {
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

/// A context for party `own` of an `n`-party testnet head, plus the
/// head parameters.
pub(crate) fn ctx_for(n: u32, own: usize) -> (ChainContext, HeadParameters) {
    let (_, parties) = keys_and_parties(n);
    let ctx = ChainContext {
        network: Network::Testnet,
        party: parties[own],
    };
    let parameters = HeadParameters {
        parties,
        contestation_period: 60,
    };
    (ctx, parameters)
}

/// A distinct spendable output reference per tag.
pub(crate) fn seed_ref(tag: u8) -> ChainOutputRef {
    ChainOutputRef::new(TxHash([tag; 32]), 0)
}

/// A committable key-addressed output of the given value.
pub(crate) fn chain_output_for(value: u64) -> ChainOutput {
    ChainOutput::to_key([9u8; 32], value)
}

/// Drive Idle through init observation for an `n`-party head.
pub(crate) fn initial_state(n: u32, own: usize) -> (ChainContext, InitialState) {
    let (ctx, parameters) = ctx_for(n, own);
    let tx = construct::initialize(&ctx, &parameters, seed_ref(1));
    match observe::observe_init(&ctx, &ChainState::Idle, &tx) {
        Some((_, ChainState::Initial(s))) => (ctx, s),
        _ => panic!("init tx must be observable"),
    }
}

/// Drive an `n`-party head through everyone's commit and the collect,
/// all via the observers.
pub(crate) fn open_state(n: u32, own: usize) -> (ChainContext, OpenState) {
    let (ctx, mut state) = initial_state(n, own);
    let mut chain = ChainState::Initial(state.clone());

    for position in 0..n as usize {
        let (party_ctx, _) = ctx_for(n, position);
        let deposit = (seed_ref(100 + position as u8), chain_output_for(10));
        let utxo = Utxo::from_outputs([OutputRef(position as u64 + 1)]);
        let tx = construct::commit(&party_ctx, &state, &[deposit], &utxo)
            .expect("commit must build");
        let (_, next) = observe::observe_commit(&chain, &tx).expect("commit must observe");
        chain = next;
        state = match &chain {
            ChainState::Initial(s) => s.clone(),
            other => panic!("expected initial state, got {}", other.tag()),
        };
    }

    let tx = construct::collect(&ctx, &state).expect("collect must build");
    match observe::observe_collect(&chain, &tx) {
        Some((_, ChainState::Open(s))) => (ctx, s),
        _ => panic!("collect tx must be observable"),
    }
}

/// A closed state over `open` with the given snapshot number and
/// deadline.
pub(crate) fn closed_state(open: &OpenState, snapshot_number: u64, deadline: u64) -> ClosedState {
    ClosedState {
        head_id: open.head_id,
        parameters: open.parameters.clone(),
        head_output: open.head_output,
        value: open.value,
        snapshot_number,
        utxo_hash: open.utxo.hash(),
        deadline,
        contesters: Default::default(),
    }
}
