// Copyright (c) 2026 The Headrace Project

//! The pure head update function.
//!
//! `update` is total over (state, event): every pair yields exactly one
//! [`Outcome`]. `Wait` means the event is fine but cannot be acted on
//! yet and should be retried; `Error` reports a protocol violation and
//! leaves the state untouched. Duplicate or out-of-order peer messages
//! are absorbed silently.

use crate::chain::{ChainState, Observation, PostChainTx};
use crate::head::events::{ClientCommand, ClientNotification, Effect, Event};
use crate::head::snapshot::{leader_for, SignedSnapshot, Snapshot, SnapshotInProgress};
use crate::head::state::{ClosedHead, HeadParameters, HeadState, InitialHead, OpenHead};
use crate::head::LogicError;
use crate::ledger::{Ledger, LedgerError, Tx, TxId, Utxo};
use crate::network::Message;
use headrace_keys::domain_separators::SNAPSHOT_SIGNING_DOMAIN;
use headrace_keys::{MultiSignature, Party, PartyIndex, PartySignature, SigningKey};
use std::time::Duration;
use tracing::{debug, warn};

/// Per-node context the logic runs in.
pub struct Environment {
    /// Our own identity.
    pub party: Party,

    /// Our snapshot-signing key.
    pub signing_key: SigningKey,

    /// Contestation period (seconds) used when we initialise a head.
    pub contestation_period: u64,
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The event applied; adopt `state` and dispatch `effects` in order.
    NewState {
        /// The successor state.
        state: HeadState,
        /// Effects to dispatch, in order.
        effects: Vec<Effect>,
    },

    /// The event is valid but cannot be acted on yet; retry it later.
    Wait,

    /// The event violates the protocol; state is unchanged.
    Error(LogicError),
}

impl Outcome {
    fn next(state: HeadState, effects: Vec<Effect>) -> Self {
        Self::NewState { state, effects }
    }

    /// Absorb an event without changing anything.
    fn ignored(state: &HeadState) -> Self {
        Self::NewState {
            state: state.clone(),
            effects: Vec::new(),
        }
    }
}

fn invalid(event: &Event, state: &HeadState) -> Outcome {
    Outcome::Error(LogicError::InvalidEvent {
        event: Box::new(event.clone()),
        state: state.tag(),
    })
}

/// Apply one event to the head state.
pub fn update<L: Ledger>(
    env: &Environment,
    ledger: &L,
    state: &HeadState,
    event: &Event,
) -> Outcome {
    match event {
        Event::Command(command) => on_command(env, ledger, state, command, event),
        Event::Network(message) => on_message(env, ledger, state, message),
        Event::Observation(observation) => on_observation(env, state, observation),
        Event::Tick { timestamp, .. } => on_tick(env, state, *timestamp),
        Event::Rollback { chain_state, .. } => on_rollback(env, state, chain_state),
    }
}

// ----------------------------------------------------------------------------
// Client commands
// ----------------------------------------------------------------------------

fn on_command<L: Ledger>(
    env: &Environment,
    ledger: &L,
    state: &HeadState,
    command: &ClientCommand,
    event: &Event,
) -> Outcome {
    match (state, command) {
        (HeadState::Idle, ClientCommand::Init { parties }) => {
            if !well_formed_party_list(parties) || !parties.contains(&env.party) {
                return invalid(event, state);
            }
            let parameters = HeadParameters {
                parties: parties.clone(),
                contestation_period: env.contestation_period,
            };
            Outcome::next(
                state.clone(),
                vec![Effect::PostTx(PostChainTx::Init { parameters })],
            )
        }

        (HeadState::Initial(initial), ClientCommand::Commit { utxo }) => {
            if !initial.pending_commits.contains(&env.party.index) {
                return invalid(event, state);
            }
            Outcome::next(
                state.clone(),
                vec![Effect::PostTx(PostChainTx::Commit { utxo: utxo.clone() })],
            )
        }

        (HeadState::Initial(_), ClientCommand::Abort) => {
            Outcome::next(state.clone(), vec![Effect::PostTx(PostChainTx::Abort)])
        }

        (HeadState::Open(open), ClientCommand::NewTx { tx }) => {
            // Fail fast on transactions we could never get confirmed,
            // instead of broadcasting them.
            if let Err(cause) = ledger.apply(&open.local_utxo, tx) {
                return Outcome::Error(LogicError::LedgerRejection { tx: tx.id, cause });
            }
            Outcome::next(
                state.clone(),
                vec![Effect::SendToPeers(Message::ReqTx { tx: tx.clone() })],
            )
        }

        (HeadState::Open(open), ClientCommand::Close) => Outcome::next(
            state.clone(),
            vec![Effect::PostTx(PostChainTx::Close {
                snapshot: open.confirmed_snapshot.clone(),
            })],
        ),

        (HeadState::Open(open), ClientCommand::GetUtxo) => Outcome::next(
            state.clone(),
            vec![Effect::NotifyClient(ClientNotification::CurrentUtxo {
                utxo: open.local_utxo.clone(),
            })],
        ),

        _ => invalid(event, state),
    }
}

/// Party indices must be dense and in list order, so that the leader
/// schedule is the same on every node.
fn well_formed_party_list(parties: &[Party]) -> bool {
    !parties.is_empty()
        && parties
            .iter()
            .enumerate()
            .all(|(position, party)| party.index == position as PartyIndex)
}

// ----------------------------------------------------------------------------
// Peer messages
// ----------------------------------------------------------------------------

fn on_message<L: Ledger>(
    env: &Environment,
    ledger: &L,
    state: &HeadState,
    message: &Message,
) -> Outcome {
    if let Message::Ping { host } = message {
        return Outcome::next(
            state.clone(),
            vec![Effect::NotifyClient(ClientNotification::PeerConnected {
                host: host.clone(),
            })],
        );
    }

    match state {
        HeadState::Open(open) => match message {
            Message::ReqTx { tx } => on_req_tx(env, ledger, open, tx),
            Message::AckTx { party, tx_id } => on_ack_tx(env, open, *party, *tx_id),
            Message::ReqSn {
                leader,
                number,
                tx_ids,
            } => on_req_sn(env, ledger, state, open, *leader, *number, tx_ids, message),
            Message::AckSn {
                party,
                signature,
                number,
            } => on_ack_sn(env, ledger, open, *party, signature, *number),
            Message::Ping { .. } => unreachable!("handled above"),
        },

        // The head is about to open; hold peer traffic until it has.
        HeadState::Initial(_) => Outcome::Wait,

        // Late or early traffic outside a usable head state.
        _ => {
            debug!(state = state.tag(), %message, "ignoring peer message");
            Outcome::ignored(state)
        }
    }
}

fn on_req_tx<L: Ledger>(env: &Environment, ledger: &L, open: &OpenHead, tx: &Tx) -> Outcome {
    if open.seen_tx(tx.id).is_some() || open.is_confirmed(tx.id) {
        return Outcome::ignored(&HeadState::Open(open.clone()));
    }
    let local_utxo = match ledger.apply(&open.local_utxo, tx) {
        Ok(next) => next,
        // Inputs may simply not have arrived yet; retry once something
        // else has been applied.
        Err(_) => return Outcome::Wait,
    };

    let mut next = open.clone();
    next.local_utxo = local_utxo;
    next.seen_txs.push(tx.clone());
    next.tx_acks.entry(tx.id).or_default();

    Outcome::next(
        HeadState::Open(next),
        vec![Effect::SendToPeers(Message::AckTx {
            party: env.party.index,
            tx_id: tx.id,
        })],
    )
}

fn on_ack_tx(env: &Environment, open: &OpenHead, party: PartyIndex, tx_id: TxId) -> Outcome {
    if !open.parameters.has_party(party) {
        warn!(party, %tx_id, "ack from unknown party");
        return Outcome::ignored(&HeadState::Open(open.clone()));
    }
    if open.is_confirmed(tx_id) {
        return Outcome::ignored(&HeadState::Open(open.clone()));
    }
    let Some(tx) = open.seen_tx(tx_id).cloned() else {
        // Ack arrived ahead of the request; retry after the ReqTx.
        return Outcome::Wait;
    };

    let mut next = open.clone();
    let acks = next.tx_acks.entry(tx_id).or_default();
    if !acks.insert(party) {
        return Outcome::ignored(&HeadState::Open(open.clone()));
    }

    let all_acked = next
        .parameters
        .parties
        .iter()
        .all(|p| acks.contains(&p.index));
    if !all_acked {
        return Outcome::next(HeadState::Open(next), Vec::new());
    }

    next.confirmed_txs.push(tx_id);
    let mut effects = vec![Effect::NotifyClient(ClientNotification::TxReceived { tx })];
    effects.extend(maybe_request_snapshot(env, &next));
    Outcome::next(HeadState::Open(next), effects)
}

#[allow(clippy::too_many_arguments)]
fn on_req_sn<L: Ledger>(
    env: &Environment,
    ledger: &L,
    state: &HeadState,
    open: &OpenHead,
    leader: PartyIndex,
    number: u64,
    tx_ids: &[TxId],
    message: &Message,
) -> Outcome {
    if let Some(pending) = &open.pending {
        if pending.body.number == number {
            // Rebroadcast of the snapshot we are already signing.
            return Outcome::ignored(state);
        }
    }

    // Snapshot numbers are strictly sequential, and only the scheduled
    // leader may request one; anything else is a protocol violation.
    let expected = open.confirmed_snapshot.snapshot.number + 1;
    if number != expected || leader_for(&open.parameters.parties, number).index != leader {
        return Outcome::Error(LogicError::InvalidEvent {
            event: Box::new(Event::Network(message.clone())),
            state: state.tag(),
        });
    }

    // Every requested transaction must already be confirmed locally;
    // otherwise our acks are still in flight and we retry later.
    if tx_ids.iter().any(|id| !open.is_confirmed(*id)) {
        return Outcome::Wait;
    }

    let body = match snapshot_body(ledger, open, number, tx_ids) {
        Ok(body) => body,
        Err((tx, cause)) => return Outcome::Error(LogicError::LedgerRejection { tx, cause }),
    };

    let signature = sign_snapshot(&env.signing_key, &body);
    let mut next = open.clone();
    next.pending = Some(SnapshotInProgress {
        leader,
        body,
        acks: MultiSignature::new(),
    });

    debug!(number, leader, txs = tx_ids.len(), "signing snapshot request");
    Outcome::next(
        HeadState::Open(next),
        vec![Effect::SendToPeers(Message::AckSn {
            party: env.party.index,
            signature,
            number,
        })],
    )
}

fn on_ack_sn<L: Ledger>(
    env: &Environment,
    ledger: &L,
    open: &OpenHead,
    party: PartyIndex,
    signature: &PartySignature,
    number: u64,
) -> Outcome {
    let current = HeadState::Open(open.clone());
    let Some(pending) = &open.pending else {
        return Outcome::ignored(&current);
    };
    if pending.body.number != number || pending.acks.contains(party) {
        return Outcome::ignored(&current);
    }
    let Some(signer) = open.parameters.party(party) else {
        warn!(party, number, "snapshot ack from unknown party");
        return Outcome::ignored(&current);
    };

    // A signature over anything but our candidate body is dropped on the
    // floor: it may be for a stale body, or simply forged.
    let body_bytes = pending.body.signing_bytes();
    if !signer
        .verification_key
        .verify(SNAPSHOT_SIGNING_DOMAIN, &body_bytes, signature)
    {
        warn!(party, number, "snapshot ack signature does not verify");
        return Outcome::ignored(&current);
    }

    let mut acks = pending.acks.clone();
    acks.insert(party, *signature);

    let mut next = open.clone();
    if !acks.is_complete(&next.parameters.parties) {
        next.pending = Some(SnapshotInProgress {
            leader: pending.leader,
            body: pending.body.clone(),
            acks,
        });
        return Outcome::next(HeadState::Open(next), Vec::new());
    }

    // Every party signed: promote the candidate.
    let confirmed = SignedSnapshot {
        snapshot: pending.body.clone(),
        signatures: acks,
    };
    if let Err(bad) = confirmed.signatures.verify_all(
        &next.parameters.parties,
        SNAPSHOT_SIGNING_DOMAIN,
        &body_bytes,
    ) {
        return Outcome::Error(LogicError::BadSignature {
            party: bad.first().copied().unwrap_or(party),
        });
    }

    let snapshot = confirmed.snapshot.clone();
    next.pending = None;
    promote_snapshot(ledger, &mut next, confirmed);

    let mut effects = vec![Effect::NotifyClient(ClientNotification::SnapshotConfirmed {
        snapshot,
    })];
    effects.extend(maybe_request_snapshot(env, &next));
    Outcome::next(HeadState::Open(next), effects)
}

/// Compute the deterministic candidate body for snapshot `number`.
fn snapshot_body<L: Ledger>(
    ledger: &L,
    open: &OpenHead,
    number: u64,
    tx_ids: &[TxId],
) -> Result<Snapshot, (TxId, LedgerError)> {
    let mut utxo = open.confirmed_snapshot.snapshot.utxo.clone();
    for id in tx_ids {
        let tx = open
            .seen_tx(*id)
            .ok_or((*id, missing_tx_error(*id)))?;
        utxo = ledger.apply(&utxo, tx).map_err(|cause| (*id, cause))?;
    }
    Ok(Snapshot {
        number,
        utxo,
        confirmed: tx_ids.to_vec(),
    })
}

fn missing_tx_error(id: TxId) -> LedgerError {
    LedgerError::MissingInput {
        tx: id,
        missing: crate::ledger::OutputRef(0),
    }
}

fn sign_snapshot(key: &SigningKey, body: &Snapshot) -> PartySignature {
    key.sign(SNAPSHOT_SIGNING_DOMAIN, &body.signing_bytes())
}

/// Adopt `confirmed` and rebase the unconfirmed suffix on top of it.
fn promote_snapshot<L: Ledger>(ledger: &L, open: &mut OpenHead, confirmed: SignedSnapshot) {
    let snapshotted = confirmed.snapshot.confirmed.clone();
    open.confirmed_txs.retain(|id| !snapshotted.contains(id));
    for id in &snapshotted {
        open.tx_acks.remove(id);
    }

    let remaining: Vec<Tx> = open
        .seen_txs
        .iter()
        .filter(|tx| !snapshotted.contains(&tx.id))
        .cloned()
        .collect();

    let mut local = confirmed.snapshot.utxo.clone();
    let mut kept = Vec::with_capacity(remaining.len());
    for tx in remaining {
        match ledger.apply(&local, &tx) {
            Ok(next) => {
                local = next;
                kept.push(tx);
            }
            Err(cause) => {
                // Cannot rebase this transaction on the agreed state.
                warn!(tx = %tx.id, %cause, "dropping seen transaction after snapshot");
                open.tx_acks.remove(&tx.id);
            }
        }
    }

    open.confirmed_snapshot = confirmed;
    open.seen_txs = kept;
    open.local_utxo = local;
}

/// When we lead the next snapshot and confirmed work is queued, request it.
fn maybe_request_snapshot(env: &Environment, open: &OpenHead) -> Option<Effect> {
    let number = open.confirmed_snapshot.snapshot.number + 1;
    if open.pending.is_some() || open.confirmed_txs.is_empty() {
        return None;
    }
    if leader_for(&open.parameters.parties, number).index != env.party.index {
        return None;
    }
    // Request in seen order so the candidate applies cleanly on every
    // node regardless of confirmation order.
    let tx_ids = open
        .seen_txs
        .iter()
        .map(|tx| tx.id)
        .filter(|id| open.confirmed_txs.contains(id))
        .collect();
    Some(Effect::SendToPeers(Message::ReqSn {
        leader: env.party.index,
        number,
        tx_ids,
    }))
}

// ----------------------------------------------------------------------------
// Chain observations
// ----------------------------------------------------------------------------

fn on_observation(env: &Environment, state: &HeadState, observation: &Observation) -> Outcome {
    match (state, observation) {
        (HeadState::Idle, Observation::OnInit { parameters }) => {
            if parameters.party(env.party.index) != Some(&env.party) {
                debug!("observed init for a head we are not part of");
                return Outcome::ignored(state);
            }
            let next = InitialHead {
                parameters: parameters.clone(),
                committed: Default::default(),
                pending_commits: parameters.parties.iter().map(|p| p.index).collect(),
            };
            Outcome::next(
                HeadState::Initial(next),
                vec![Effect::NotifyClient(ClientNotification::ReadyToCommit {
                    parties: parameters.parties.clone(),
                })],
            )
        }

        (HeadState::Initial(initial), Observation::OnCommit { party, utxo }) => {
            if !initial.pending_commits.contains(party) {
                return Outcome::ignored(state);
            }
            let mut next = initial.clone();
            next.committed.insert(*party, utxo.clone());
            next.pending_commits.remove(party);

            let effects = if next.pending_commits.is_empty() {
                vec![Effect::PostTx(PostChainTx::Collect)]
            } else {
                Vec::new()
            };
            Outcome::next(HeadState::Initial(next), effects)
        }

        (HeadState::Initial(initial), Observation::OnAbort) => {
            let utxo = initial.committed_utxo();
            Outcome::next(
                HeadState::Final { utxo: utxo.clone() },
                vec![Effect::NotifyClient(ClientNotification::HeadIsFinalized {
                    utxo,
                })],
            )
        }

        (HeadState::Initial(initial), Observation::OnCollect) => {
            let utxo = initial.committed_utxo();
            let next = OpenHead {
                parameters: initial.parameters.clone(),
                confirmed_snapshot: SignedSnapshot::genesis(utxo.clone()),
                local_utxo: utxo.clone(),
                seen_txs: Vec::new(),
                tx_acks: Default::default(),
                confirmed_txs: Vec::new(),
                pending: None,
            };
            Outcome::next(
                HeadState::Open(next),
                vec![Effect::NotifyClient(ClientNotification::HeadIsOpen { utxo })],
            )
        }

        (
            HeadState::Open(open),
            Observation::OnClose {
                snapshot_number,
                deadline,
            },
        ) => {
            let next = ClosedHead {
                parameters: open.parameters.clone(),
                confirmed_snapshot: open.confirmed_snapshot.clone(),
                closed_number: *snapshot_number,
                contestation_deadline: *deadline,
                contesters: Default::default(),
                contest_posted: false,
                fanout_posted: false,
            };
            // The zero-delay tick forces an immediate re-examination, so
            // a contest goes out without waiting for the next block.
            Outcome::next(
                HeadState::Closed(next),
                vec![
                    Effect::NotifyClient(ClientNotification::HeadIsClosed {
                        deadline: *deadline,
                    }),
                    Effect::Delay {
                        duration: Duration::ZERO,
                        event: Event::Tick {
                            slot: 0,
                            timestamp: 0,
                        },
                    },
                ],
            )
        }

        (
            HeadState::Closed(closed),
            Observation::OnContest {
                snapshot_number,
                contester,
                deadline,
            },
        ) => {
            let mut next = closed.clone();
            next.closed_number = *snapshot_number;
            next.contestation_deadline = *deadline;
            next.contesters.insert(*contester);
            if *contester == env.party.index {
                next.contest_posted = true;
            }
            Outcome::next(HeadState::Closed(next), Vec::new())
        }

        (HeadState::Closed(_), Observation::OnFanout { utxo }) => Outcome::next(
            HeadState::Final { utxo: utxo.clone() },
            vec![Effect::NotifyClient(ClientNotification::HeadIsFinalized {
                utxo: utxo.clone(),
            })],
        ),

        _ => {
            debug!(state = state.tag(), %observation, "ignoring observation");
            Outcome::ignored(state)
        }
    }
}

// ----------------------------------------------------------------------------
// Time
// ----------------------------------------------------------------------------

fn on_tick(env: &Environment, state: &HeadState, timestamp: u64) -> Outcome {
    let HeadState::Closed(closed) = state else {
        return Outcome::ignored(state);
    };

    let mut next = closed.clone();
    let mut effects = Vec::new();

    let ours = next.confirmed_snapshot.snapshot.number;
    if !next.contest_posted
        && ours > next.closed_number
        && !next.contesters.contains(&env.party.index)
    {
        debug!(ours, on_chain = next.closed_number, "contesting close");
        effects.push(Effect::PostTx(PostChainTx::Contest {
            snapshot: next.confirmed_snapshot.clone(),
        }));
        next.contest_posted = true;
    }

    if !next.fanout_posted
        && timestamp >= next.contestation_deadline
        && ours == next.closed_number
    {
        debug!(deadline = next.contestation_deadline, "posting fanout");
        effects.push(Effect::PostTx(PostChainTx::Fanout {
            utxo: next.confirmed_snapshot.snapshot.utxo.clone(),
        }));
        next.fanout_posted = true;
    }

    if effects.is_empty() {
        Outcome::ignored(state)
    } else {
        Outcome::next(HeadState::Closed(next), effects)
    }
}

// ----------------------------------------------------------------------------
// Rollbacks
// ----------------------------------------------------------------------------

/// Re-derive the head state after the chain rolled back to `chain`.
///
/// Anything the chain is authoritative for (commit sets, the closed
/// snapshot number, contesters) is taken from the restored chain state.
/// Off-chain progress is preserved where the lifecycle stage survived
/// the rollback and rebuilt from re-observation where it did not.
fn on_rollback(env: &Environment, state: &HeadState, chain: &ChainState) -> Outcome {
    let next = match (state, chain) {
        (_, ChainState::Idle) => HeadState::Idle,

        // Pre-open, the chain is the sole authority.
        (_, ChainState::Initial(restored)) => HeadState::Initial(InitialHead {
            parameters: restored.parameters.clone(),
            committed: restored
                .commits
                .iter()
                .map(|(party, info)| (*party, info.utxo.clone()))
                .collect(),
            pending_commits: restored.markers.keys().copied().collect(),
        }),

        // Still open: snapshots live off-chain and survive the rollback.
        (HeadState::Open(open), ChainState::Open(_)) => HeadState::Open(open.clone()),

        // The close was rolled back; reopen with the snapshot we kept.
        (HeadState::Closed(closed), ChainState::Open(_)) => {
            let utxo = closed.confirmed_snapshot.snapshot.utxo.clone();
            HeadState::Open(OpenHead {
                parameters: closed.parameters.clone(),
                confirmed_snapshot: closed.confirmed_snapshot.clone(),
                local_utxo: utxo,
                seen_txs: Vec::new(),
                tx_acks: Default::default(),
                confirmed_txs: Vec::new(),
                pending: None,
            })
        }

        // No off-chain snapshot survived (e.g. restart straight into a
        // rollback); start from the collected state.
        (_, ChainState::Open(restored)) => {
            let utxo = restored.utxo.clone();
            HeadState::Open(OpenHead {
                parameters: restored.parameters.clone(),
                confirmed_snapshot: SignedSnapshot::genesis(utxo.clone()),
                local_utxo: utxo,
                seen_txs: Vec::new(),
                tx_acks: Default::default(),
                confirmed_txs: Vec::new(),
                pending: None,
            })
        }

        // A contest was rolled back: resync the on-chain fields, keep our
        // snapshot, and allow reposting.
        (HeadState::Closed(closed), ChainState::Closed(restored)) => {
            HeadState::Closed(ClosedHead {
                parameters: restored.parameters.clone(),
                confirmed_snapshot: closed.confirmed_snapshot.clone(),
                closed_number: restored.snapshot_number,
                contestation_deadline: restored.deadline,
                contesters: restored.contesters.clone(),
                contest_posted: restored.contesters.contains(&env.party.index),
                fanout_posted: false,
            })
        }

        // The fanout was rolled back; the settled UTxO is the winning
        // snapshot's, so it can be reposted.
        (HeadState::Final { utxo }, ChainState::Closed(restored)) => {
            HeadState::Closed(ClosedHead {
                parameters: restored.parameters.clone(),
                confirmed_snapshot: SignedSnapshot {
                    snapshot: Snapshot {
                        number: restored.snapshot_number,
                        utxo: utxo.clone(),
                        confirmed: Vec::new(),
                    },
                    signatures: MultiSignature::new(),
                },
                closed_number: restored.snapshot_number,
                contestation_deadline: restored.deadline,
                contesters: restored.contesters.clone(),
                contest_posted: restored.contesters.contains(&env.party.index),
                fanout_posted: false,
            })
        }

        // Closed on chain but nothing usable locally: track the close,
        // without a snapshot to fan out with.
        (_, ChainState::Closed(restored)) => HeadState::Closed(ClosedHead {
            parameters: restored.parameters.clone(),
            confirmed_snapshot: SignedSnapshot::genesis(Utxo::empty()),
            closed_number: restored.snapshot_number,
            contestation_deadline: restored.deadline,
            contesters: restored.contesters.clone(),
            contest_posted: restored.contesters.contains(&env.party.index),
            fanout_posted: false,
        }),

        (_, ChainState::Final(restored)) => HeadState::Final {
            utxo: restored.utxo.clone(),
        },
    };

    warn!(from = state.tag(), to = next.tag(), "head state rolled back");
    Outcome::next(next, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SimpleLedger;
    use headrace_keys::SigningKey;

    fn keys_and_parties(n: u32) -> (Vec<SigningKey>, Vec<Party>) {
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

    fn env_for(keys: &[SigningKey], parties: &[Party], own: usize) -> Environment {
        Environment {
            party: parties[own],
            signing_key: keys[own].clone(),
            contestation_period: 60,
        }
    }

    fn open_head(parties: &[Party], utxo: Utxo) -> OpenHead {
        OpenHead {
            parameters: HeadParameters {
                parties: parties.to_vec(),
                contestation_period: 60,
            },
            confirmed_snapshot: SignedSnapshot::genesis(utxo.clone()),
            local_utxo: utxo,
            seen_txs: Vec::new(),
            tx_acks: Default::default(),
            confirmed_txs: Vec::new(),
            pending: None,
        }
    }

    // A snapshot request from anyone but the round-robin leader is a
    // protocol violation.
    #[test]
    fn test_req_sn_from_non_leader_is_invalid() {
        let (keys, parties) = keys_and_parties(3);
        let env = env_for(&keys, &parties, 1);
        let state = HeadState::Open(open_head(&parties, Utxo::empty()));

        let event = Event::Network(Message::ReqSn {
            leader: 1,
            number: 1,
            tx_ids: vec![],
        });
        let outcome = update(&env, &SimpleLedger, &state, &event);
        assert!(matches!(
            outcome,
            Outcome::Error(LogicError::InvalidEvent { .. })
        ));
    }

    // Snapshot numbers are strictly sequential.
    #[test]
    fn test_req_sn_skipping_ahead_is_invalid() {
        let (keys, parties) = keys_and_parties(3);
        let env = env_for(&keys, &parties, 1);
        let state = HeadState::Open(open_head(&parties, Utxo::empty()));

        let event = Event::Network(Message::ReqSn {
            leader: 0,
            number: 2,
            tx_ids: vec![],
        });
        let outcome = update(&env, &SimpleLedger, &state, &event);
        assert!(matches!(
            outcome,
            Outcome::Error(LogicError::InvalidEvent { .. })
        ));
    }

    // An ack whose signature covers a different body is dropped without
    // an error and without touching the confirmed snapshot.
    #[test]
    fn test_ack_sn_with_bad_signature_is_silently_dropped() {
        let (keys, parties) = keys_and_parties(3);
        let env = env_for(&keys, &parties, 0);
        let mut open = open_head(&parties, Utxo::empty());
        let body = Snapshot {
            number: 1,
            utxo: Utxo::empty(),
            confirmed: vec![],
        };
        open.pending = Some(SnapshotInProgress {
            leader: 0,
            body: body.clone(),
            acks: MultiSignature::new(),
        });
        let state = HeadState::Open(open);

        let mut other_body = body;
        other_body.number = 9;
        let forged = keys[1].sign(SNAPSHOT_SIGNING_DOMAIN, &other_body.signing_bytes());

        let event = Event::Network(Message::AckSn {
            party: 1,
            signature: forged,
            number: 1,
        });
        match update(&env, &SimpleLedger, &state, &event) {
            Outcome::NewState { state: next, effects } => {
                assert!(effects.is_empty());
                assert_eq!(next, state);
            }
            other => panic!("expected silent drop, got {other:?}"),
        }
    }

    #[test]
    fn test_new_tx_with_unknown_input_is_rejected_to_client() {
        let (keys, parties) = keys_and_parties(2);
        let env = env_for(&keys, &parties, 0);
        let state = HeadState::Open(open_head(&parties, Utxo::empty()));

        let event = Event::Command(ClientCommand::NewTx {
            tx: Tx::new(1, [42], [43]),
        });
        assert!(matches!(
            update(&env, &SimpleLedger, &state, &event),
            Outcome::Error(LogicError::LedgerRejection { tx: TxId(1), .. })
        ));
    }

    #[test]
    fn test_commands_invalid_outside_their_state() {
        let (keys, parties) = keys_and_parties(2);
        let env = env_for(&keys, &parties, 0);

        let close_in_idle = Event::Command(ClientCommand::Close);
        assert!(matches!(
            update(&env, &SimpleLedger, &HeadState::Idle, &close_in_idle),
            Outcome::Error(LogicError::InvalidEvent { .. })
        ));
    }

    #[test]
    fn test_duplicate_req_tx_is_ignored() {
        let (keys, parties) = keys_and_parties(2);
        let env = env_for(&keys, &parties, 0);
        let utxo = Utxo::from_outputs([crate::ledger::OutputRef(1)]);
        let tx = Tx::new(1, [1], [2]);

        let state = HeadState::Open(open_head(&parties, utxo));
        let event = Event::Network(Message::ReqTx { tx: tx.clone() });
        let Outcome::NewState { state: once, .. } =
            update(&env, &SimpleLedger, &state, &event)
        else {
            panic!("first request must apply");
        };
        match update(&env, &SimpleLedger, &once, &event) {
            Outcome::NewState { state: twice, effects } => {
                assert_eq!(once, twice);
                assert!(effects.is_empty());
            }
            other => panic!("duplicate must be ignored, got {other:?}"),
        }
    }
}
