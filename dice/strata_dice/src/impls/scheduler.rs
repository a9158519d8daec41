/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Restart-based scheduling.
//!
//! Work proceeds in rounds. Each round runs, in parallel, every pending key whose requested
//! keys are all available. A computation that is not ready adds the keys it is missing to
//! the pending set and is retried once they are computed. A round in which nothing can run
//! means the pending keys wait on each other.

use std::sync::Arc;

use dupe::Dupe;
use dupe::IterDupedExt;
use indexmap::IndexMap;
use indexmap::IndexSet;

use crate::api::cancellation::CancellationHandle;
use crate::api::computations::DiceComputations;
use crate::api::demand::Suspend;
use crate::api::error::DiceError;
use crate::cycles::find_cycle;
use crate::dice::DiceShared;
use crate::impls::key::DiceKey;
use crate::impls::key::DiceValue;

pub(crate) enum Outcome {
    Done(DiceValue),
    NotReady(Vec<DiceKey>),
    Cancelled,
}

/// Runs one computation of the key, storing its value if it completes.
pub(crate) fn evaluate(
    shared: &Arc<DiceShared>,
    cancellation: &CancellationHandle,
    key: &DiceKey,
) -> Outcome {
    let mut ctx = DiceComputations::new(shared.dupe(), cancellation.dupe());
    let result = key.compute(&mut ctx);
    let (deps, missing) = ctx.finish();
    match result {
        Ok(value) => Outcome::Done(shared.cache.write().insert_computed(key.dupe(), value, deps)),
        Err(Suspend::NotReady) => Outcome::NotReady(missing),
        Err(Suspend::Cancelled) => Outcome::Cancelled,
    }
}

pub(crate) struct SchedulerOptions {
    pub(crate) keep_going: bool,
    pub(crate) threads: usize,
}

/// Computes the keys and everything they request.
pub(crate) fn run(
    shared: &Arc<DiceShared>,
    cancellation: &CancellationHandle,
    roots: Vec<DiceKey>,
    options: &SchedulerOptions,
) -> Result<(), DiceError> {
    let mut pending: IndexSet<DiceKey> = {
        let cache = shared.cache.read();
        roots.into_iter().filter(|k| !cache.contains(k)).collect()
    };
    // Keys requested by the last invocation of a suspended key.
    let mut waiting: IndexMap<DiceKey, Vec<DiceKey>> = IndexMap::new();
    let mut round = 0;

    while !pending.is_empty() {
        if cancellation.is_cancelled() {
            return Err(DiceError::Cancelled);
        }
        round += 1;

        let frontier: Vec<DiceKey> = {
            let cache = shared.cache.read();
            pending.retain(|k| !cache.contains(k));
            waiting.retain(|k, _| pending.contains(k));
            pending
                .iter()
                .filter(|k| match waiting.get(*k) {
                    Some(missing) => missing.iter().all(|m| cache.contains(m)),
                    None => true,
                })
                .map(|k| k.dupe())
                .collect()
        };
        if pending.is_empty() {
            break;
        }
        if frontier.is_empty() {
            let cycle = find_cycle(&waiting).unwrap_or_else(|| pending.iter().duped().collect());
            return Err(DiceError::Cycle(cycle));
        }
        if let Some(key) = frontier.iter().find(|k| k.is_injected()) {
            return Err(DiceError::MissingInjected(key.dupe()));
        }

        tracing::debug!(
            "DICE round {}: {} runnable of {} pending keys",
            round,
            frontier.len(),
            pending.len()
        );

        for (key, outcome) in run_round(shared, cancellation, frontier, options.threads) {
            match outcome {
                Outcome::Done(value) => {
                    pending.shift_remove(&key);
                    waiting.shift_remove(&key);
                    if !options.keep_going {
                        if let Some(error) = key.value_failure(&value) {
                            return Err(DiceError::FailFast(key, error));
                        }
                    }
                }
                Outcome::NotReady(missing) => {
                    tracing::debug!(
                        "{} is not ready, restarting after {} keys",
                        key,
                        missing.len()
                    );
                    for m in &missing {
                        pending.insert(m.dupe());
                    }
                    waiting.insert(key, missing);
                }
                Outcome::Cancelled => return Err(DiceError::Cancelled),
            }
        }
    }
    Ok(())
}

fn run_round(
    shared: &Arc<DiceShared>,
    cancellation: &CancellationHandle,
    frontier: Vec<DiceKey>,
    threads: usize,
) -> Vec<(DiceKey, Outcome)> {
    let workers = threads.clamp(1, frontier.len().max(1));
    if workers == 1 {
        return frontier
            .into_iter()
            .map(|key| {
                let outcome = evaluate(shared, cancellation, &key);
                (key, outcome)
            })
            .collect();
    }

    let (work_sender, work_receiver) = crossbeam_channel::unbounded();
    for item in frontier.into_iter().enumerate() {
        // The receiver is alive until the end of the round.
        let _ignored = work_sender.send(item);
    }
    drop(work_sender);

    let (done_sender, done_receiver) = crossbeam_channel::unbounded();
    std::thread::scope(|s| {
        for _ in 0..workers {
            let work_receiver = work_receiver.clone();
            let done_sender = done_sender.clone();
            s.spawn(move || {
                for (index, key) in work_receiver.iter() {
                    let outcome = evaluate(shared, cancellation, &key);
                    let _ignored = done_sender.send((index, key, outcome));
                }
            });
        }
    });
    drop(done_sender);

    let mut results: Vec<(usize, DiceKey, Outcome)> = done_receiver.iter().collect();
    results.sort_by_key(|(index, _, _)| *index);
    results
        .into_iter()
        .map(|(_, key, outcome)| (key, outcome))
        .collect()
}
