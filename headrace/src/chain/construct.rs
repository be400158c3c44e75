// Copyright (c) 2026 The Headrace Project

//! Constructors for head lifecycle transactions.
//!
//! Every function here is pure: given the tracked chain state and
//! arguments it either yields a fully formed [`ChainTx`] or a structured
//! rejection. Nothing is submitted from here.
//!
//! Slots are one second long, so slot differences compare directly
//! against the contestation period.

use crate::chain::{
    ChainContext, ChainOutput, ChainOutputRef, ChainTx, ClosedState, CloseError, CollectError,
    CommitError, ContestError, FanoutError, HeadDatum, HeadId, InitialState, Network, OpenState,
    PointInTime, ValidityBounds, MAINNET_COMMIT_CAP,
};
use crate::head::{HeadParameters, SignedSnapshot};
use crate::ledger::Utxo;
use headrace_keys::domain_separators::HEAD_ID_DOMAIN;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Derive the head identifier from the seed input it spends.
///
/// Spending the seed makes the identifier unique: no second head can ever
/// be initialised from the same input.
pub fn derive_head_id(seed: &ChainOutputRef) -> HeadId {
    let mut hasher = Sha256::new();
    hasher.update(HEAD_ID_DOMAIN.as_bytes());
    hasher.update(seed.tx.0);
    hasher.update(seed.index.to_le_bytes());
    HeadId(hasher.finalize().into())
}

/// Build the init transaction announcing a head with `parameters`.
///
/// Always succeeds given a spendable seed. Output 0 is the head output;
/// outputs 1..=n are the per-party initial markers, in party order.
pub fn initialize(
    _ctx: &ChainContext,
    parameters: &HeadParameters,
    seed: ChainOutputRef,
) -> ChainTx {
    let head_id = derive_head_id(&seed);
    let mut outputs = vec![ChainOutput::to_script(head_id.0, 0)];
    outputs.extend(
        parameters
            .parties
            .iter()
            .map(|_| ChainOutput::to_script(head_id.0, 0)),
    );
    debug!(%head_id, parties = parameters.parties.len(), "built init tx");
    ChainTx {
        inputs: vec![seed],
        outputs,
        validity: ValidityBounds::default(),
        datum: HeadDatum::Init {
            head_id,
            parameters: parameters.clone(),
        },
    }
}

/// Build a commit transaction depositing `to_commit` into the head.
///
/// Spends our initial marker together with the committed outputs and
/// locks their value at the head script; `utxo` is the off-chain
/// rendering of the deposit, recorded in the datum so every party opens
/// the head with the same set. Committing nothing is allowed.
pub fn commit(
    ctx: &ChainContext,
    initial: &InitialState,
    to_commit: &[(ChainOutputRef, ChainOutput)],
    utxo: &Utxo,
) -> Result<ChainTx, CommitError> {
    let marker = initial
        .markers
        .get(&ctx.party.index)
        .copied()
        .ok_or(CommitError::CannotFindOwnInitial {
            party: ctx.party.index,
        })?;

    let mut value = 0u64;
    for (output_ref, output) in to_commit {
        if matches!(output.address, crate::chain::Address::Legacy(_)) {
            return Err(CommitError::UnsupportedLegacyOutput {
                output: *output_ref,
            });
        }
        if output.reference_script.is_some() {
            return Err(CommitError::CannotCommitReferenceScript {
                output: *output_ref,
            });
        }
        value += output.value;
    }

    if ctx.network == Network::Mainnet {
        let amount = initial.committed_value() + value;
        if amount > MAINNET_COMMIT_CAP {
            return Err(CommitError::CommittedTooMuchForMainnet {
                amount,
                cap: MAINNET_COMMIT_CAP,
            });
        }
    }

    let mut inputs = vec![marker];
    inputs.extend(to_commit.iter().map(|(r, _)| *r));

    debug!(
        head_id = %initial.head_id,
        party = ctx.party.index,
        value,
        outputs = to_commit.len(),
        "built commit tx"
    );
    Ok(ChainTx {
        inputs,
        outputs: vec![ChainOutput::to_script(initial.head_id.0, value)],
        validity: ValidityBounds::default(),
        datum: HeadDatum::Commit {
            head_id: initial.head_id,
            party: ctx.party.index,
            utxo: utxo.clone(),
        },
    })
}

/// Build the abort transaction tearing the head down before it opens.
///
/// Spends the head output, every unspent marker and every commit, and
/// reimburses each committed party at its own key.
pub fn abort(_ctx: &ChainContext, initial: &InitialState) -> ChainTx {
    let mut inputs = vec![initial.head_output];
    inputs.extend(initial.markers.values().copied());
    inputs.extend(initial.commits.values().map(|c| c.output));

    let outputs = initial
        .commits
        .iter()
        .filter_map(|(party, info)| {
            let key = initial
                .parameters
                .parties
                .iter()
                .find(|p| p.index == *party)?
                .verification_key
                .to_bytes();
            Some(ChainOutput::to_key(key, info.value))
        })
        .collect();

    ChainTx {
        inputs,
        outputs,
        validity: ValidityBounds::default(),
        datum: HeadDatum::Abort {
            head_id: initial.head_id,
        },
    }
}

/// Build the collect transaction opening the head.
///
/// Requires every party to have committed; gathers all commits into the
/// head output.
pub fn collect(_ctx: &ChainContext, initial: &InitialState) -> Result<ChainTx, CollectError> {
    if !initial.markers.is_empty() {
        return Err(CollectError::MissingCommits {
            missing: initial.markers.len(),
        });
    }

    let mut inputs = vec![initial.head_output];
    inputs.extend(initial.commits.values().map(|c| c.output));

    let utxo_hash = initial.committed_utxo().hash();
    Ok(ChainTx {
        inputs,
        outputs: vec![ChainOutput::to_script(
            initial.head_id.0,
            initial.committed_value(),
        )],
        validity: ValidityBounds::default(),
        datum: HeadDatum::Collect {
            head_id: initial.head_id,
            utxo_hash,
        },
    })
}

/// Build the close transaction starting the contestation phase.
///
/// The validity window must fit inside the contestation period, otherwise
/// the deadline the transaction commits to could already be stale when it
/// lands.
pub fn close(
    _ctx: &ChainContext,
    open: &OpenState,
    snapshot: &SignedSnapshot,
    lower_slot: u64,
    upper: PointInTime,
) -> Result<ChainTx, CloseError> {
    let contestation_period = open.parameters.contestation_period;
    if upper.slot.saturating_sub(lower_slot) > contestation_period {
        return Err(CloseError::ValidityBoundsTooWide {
            lower_slot,
            upper_slot: upper.slot,
            contestation_period,
        });
    }

    let deadline = upper.timestamp + contestation_period;
    Ok(ChainTx {
        inputs: vec![open.head_output],
        outputs: vec![ChainOutput::to_script(open.head_id.0, open.value)],
        validity: ValidityBounds {
            lower: Some(lower_slot),
            upper: Some(upper.slot),
        },
        datum: HeadDatum::Close {
            head_id: open.head_id,
            snapshot_number: snapshot.snapshot.number,
            utxo_hash: snapshot.snapshot.utxo.hash(),
            deadline,
        },
    })
}

/// Build a contest transaction overruling the closing snapshot.
///
/// Each contest extends the deadline by one contestation period, giving
/// the remaining parties room to answer.
pub fn contest(
    ctx: &ChainContext,
    closed: &ClosedState,
    snapshot: &SignedSnapshot,
) -> Result<ChainTx, ContestError> {
    if snapshot.snapshot.number <= closed.snapshot_number {
        return Err(ContestError::SnapshotNotNewer {
            closed: closed.snapshot_number,
            proposed: snapshot.snapshot.number,
        });
    }
    if closed.contesters.contains(&ctx.party.index) {
        return Err(ContestError::AlreadyContested {
            party: ctx.party.index,
        });
    }

    Ok(ChainTx {
        inputs: vec![closed.head_output],
        outputs: vec![ChainOutput::to_script(closed.head_id.0, closed.value)],
        validity: ValidityBounds::default(),
        datum: HeadDatum::Contest {
            head_id: closed.head_id,
            snapshot_number: snapshot.snapshot.number,
            utxo_hash: snapshot.snapshot.utxo.hash(),
            contester: ctx.party.index,
            deadline: closed.deadline + closed.parameters.contestation_period,
        },
    })
}

/// Build the fanout transaction materialising the final UTxO.
///
/// Only valid strictly after the contestation deadline, and only for the
/// UTxO of the winning snapshot.
pub fn fanout(
    _ctx: &ChainContext,
    closed: &ClosedState,
    utxo: &Utxo,
    lower: PointInTime,
) -> Result<ChainTx, FanoutError> {
    if utxo.hash() != closed.utxo_hash {
        return Err(FanoutError::UtxoMismatch);
    }
    if lower.timestamp <= closed.deadline {
        return Err(FanoutError::DeadlineNotReached {
            now: lower.timestamp,
            deadline: closed.deadline,
        });
    }

    // The base ledger decides real value placement at fanout; the model
    // splits the locked value evenly, remainder on the first output.
    let outputs = if utxo.is_empty() {
        vec![ChainOutput::to_script(closed.head_id.0, closed.value)]
    } else {
        let n = utxo.len() as u64;
        let share = closed.value / n;
        let remainder = closed.value % n;
        utxo.iter()
            .enumerate()
            .map(|(i, output_ref)| {
                let mut hasher = Sha256::new();
                hasher.update(output_ref.0.to_le_bytes());
                let key: [u8; 32] = hasher.finalize().into();
                let value = if i == 0 { share + remainder } else { share };
                ChainOutput::to_key(key, value)
            })
            .collect()
    };

    Ok(ChainTx {
        inputs: vec![closed.head_output],
        outputs,
        validity: ValidityBounds {
            lower: Some(lower.slot),
            upper: None,
        },
        datum: HeadDatum::Fanout {
            head_id: closed.head_id,
            utxo: utxo.clone(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::{ctx_for, initial_state, open_state, seed_ref};
    use crate::chain::Address;
    use crate::head::Snapshot;

    #[test]
    fn test_head_id_is_stable_per_seed() {
        let seed = seed_ref(1);
        assert_eq!(derive_head_id(&seed), derive_head_id(&seed));
        assert_ne!(derive_head_id(&seed), derive_head_id(&seed_ref(2)));
    }

    #[test]
    fn test_initialize_lays_one_marker_per_party() {
        let (ctx, parameters) = ctx_for(3, 0);
        let tx = initialize(&ctx, &parameters, seed_ref(1));
        assert_eq!(tx.outputs.len(), 1 + 3);
    }

    #[test]
    fn test_commit_rejects_legacy_output() {
        let (ctx, initial) = initial_state(3, 0);
        let bad = ChainOutput {
            address: Address::Legacy(vec![1, 2, 3]),
            value: 5,
            reference_script: None,
        };
        let result = commit(&ctx, &initial, &[(seed_ref(9), bad)], &Utxo::empty());
        assert!(matches!(
            result,
            Err(CommitError::UnsupportedLegacyOutput { .. })
        ));
    }

    #[test]
    fn test_commit_rejects_reference_script() {
        let (ctx, initial) = initial_state(3, 0);
        let bad = ChainOutput {
            address: Address::Key([7u8; 32]),
            value: 5,
            reference_script: Some(vec![0xCA, 0xFE]),
        };
        let result = commit(&ctx, &initial, &[(seed_ref(9), bad)], &Utxo::empty());
        assert!(matches!(
            result,
            Err(CommitError::CannotCommitReferenceScript { .. })
        ));
    }

    #[test]
    fn test_commit_enforces_mainnet_cap() {
        let (mut ctx, initial) = initial_state(2, 0);
        ctx.network = Network::Mainnet;
        let too_much = ChainOutput::to_key([7u8; 32], MAINNET_COMMIT_CAP + 1);
        let result = commit(&ctx, &initial, &[(seed_ref(9), too_much)], &Utxo::empty());
        assert!(matches!(
            result,
            Err(CommitError::CommittedTooMuchForMainnet { .. })
        ));
    }

    #[test]
    fn test_commit_uncapped_on_testnet() {
        let (ctx, initial) = initial_state(2, 0);
        let big = ChainOutput::to_key([7u8; 32], MAINNET_COMMIT_CAP + 1);
        assert!(commit(&ctx, &initial, &[(seed_ref(9), big)], &Utxo::empty()).is_ok());
    }

    #[test]
    fn test_commit_requires_own_marker() {
        let (ctx, mut initial) = initial_state(2, 0);
        initial.markers.remove(&0);
        let result = commit(&ctx, &initial, &[], &Utxo::empty());
        assert_eq!(
            result,
            Err(CommitError::CannotFindOwnInitial { party: 0 })
        );
    }

    #[test]
    fn test_collect_requires_all_commits() {
        let (ctx, initial) = initial_state(2, 0);
        assert!(matches!(
            collect(&ctx, &initial),
            Err(CollectError::MissingCommits { missing: 2 })
        ));
    }

    #[test]
    fn test_close_rejects_wide_validity_bounds() {
        let (ctx, open) = open_state(2, 0);
        let snapshot = SignedSnapshot::genesis(open.utxo.clone());
        let upper = PointInTime {
            slot: open.parameters.contestation_period + 100,
            timestamp: 10_000,
        };
        let result = close(&ctx, &open, &snapshot, 0, upper);
        assert!(matches!(result, Err(CloseError::ValidityBoundsTooWide { .. })));
    }

    #[test]
    fn test_close_sets_deadline_past_upper_bound() {
        let (ctx, open) = open_state(2, 0);
        let snapshot = SignedSnapshot::genesis(open.utxo.clone());
        let upper = PointInTime {
            slot: 50,
            timestamp: 10_000,
        };
        let tx = close(&ctx, &open, &snapshot, 10, upper).unwrap();
        match tx.datum {
            HeadDatum::Close { deadline, .. } => {
                assert_eq!(deadline, 10_000 + open.parameters.contestation_period)
            }
            other => panic!("unexpected datum: {other:?}"),
        }
    }

    #[test]
    fn test_contest_requires_newer_snapshot() {
        let (ctx, open) = open_state(2, 0);
        let closed = crate::chain::testing::closed_state(&open, 3, 10_000);
        let stale = Snapshot {
            number: 3,
            utxo: open.utxo.clone(),
            confirmed: vec![],
        };
        let result = contest(&ctx, &closed, &SignedSnapshot::unsigned_for_tests(stale));
        assert!(matches!(result, Err(ContestError::SnapshotNotNewer { .. })));
    }

    #[test]
    fn test_fanout_waits_for_deadline() {
        let (ctx, open) = open_state(2, 0);
        let closed = crate::chain::testing::closed_state(&open, 0, 10_000);
        let early = PointInTime {
            slot: 1,
            timestamp: closed.deadline,
        };
        let result = fanout(&ctx, &closed, &open.utxo, early);
        assert!(matches!(result, Err(FanoutError::DeadlineNotReached { .. })));
    }
}
