/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::sync::Arc;

use dupe::Dupe;
use parking_lot::RwLock;

use crate::api::cancellation::CancellationHandle;
use crate::api::data::DiceData;
use crate::api::error::DiceError;
use crate::api::key::InjectedKey;
use crate::api::key::Key;
use crate::impls::cache::DiceCache;
use crate::impls::key::DiceKey;
use crate::impls::key::DiceValue;
use crate::impls::scheduler;
use crate::impls::scheduler::Outcome;
use crate::impls::scheduler::SchedulerOptions;

pub(crate) struct DiceShared {
    pub(crate) cache: RwLock<DiceCache>,
    pub(crate) data: DiceData,
}

/// The computation engine. Holds the cache of computed values for the life of the build.
pub struct Dice {
    shared: Arc<DiceShared>,
    threads: usize,
}

pub struct DiceBuilder {
    data: DiceData,
    threads: usize,
}

impl DiceBuilder {
    pub fn set<T: Send + Sync + 'static>(&mut self, value: T) {
        self.data.set(value);
    }

    /// Number of worker threads used by the scheduler.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn build(self) -> Arc<Dice> {
        Arc::new(Dice {
            shared: Arc::new(DiceShared {
                cache: RwLock::new(DiceCache::default()),
                data: self.data,
            }),
            threads: self.threads,
        })
    }
}

impl Dice {
    pub fn builder() -> DiceBuilder {
        DiceBuilder {
            data: DiceData::default(),
            threads: std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }

    pub fn updater(self: &Arc<Self>) -> DiceTransactionUpdater {
        DiceTransactionUpdater {
            dice: self.dupe(),
            changes: Vec::new(),
        }
    }

    pub fn global_data(&self) -> &DiceData {
        &self.shared.data
    }
}

enum Change {
    Inject(DiceKey, DiceValue),
    Invalidate(DiceKey),
}

/// Records changes to injected values and invalidations, applied on commit.
pub struct DiceTransactionUpdater {
    dice: Arc<Dice>,
    changes: Vec<Change>,
}

impl DiceTransactionUpdater {
    /// Sets the values of injected keys.
    pub fn changed_to<K: InjectedKey>(
        &mut self,
        changes: impl IntoIterator<Item = (K, <K as InjectedKey>::Value)>,
    ) {
        for (key, value) in changes {
            self.changes
                .push(Change::Inject(DiceKey::new(key), DiceValue::new(value)));
        }
    }

    /// Marks computed keys as needing recomputation, along with everything depending on them.
    pub fn changed<K: Key>(&mut self, keys: impl IntoIterator<Item = K>) {
        for key in keys {
            self.changes.push(Change::Invalidate(DiceKey::new(key)));
        }
    }

    pub fn commit(self) -> DiceTransaction {
        {
            let mut cache = self.dice.shared.cache.write();
            let mut invalidated = 0;
            for change in self.changes {
                match change {
                    Change::Inject(key, value) => {
                        if cache.set_injected(key, value) {
                            invalidated += 1;
                        }
                    }
                    Change::Invalidate(key) => invalidated += cache.invalidate(&key),
                }
            }
            tracing::debug!(
                "DICE commit: {} changes applied, {} values cached",
                invalidated,
                cache.len()
            );
        }
        DiceTransaction {
            dice: self.dice,
            cancellation: CancellationHandle::default(),
            keep_going: false,
        }
    }
}

/// Outcome of a single invocation of a computation.
#[derive(Debug)]
pub enum Evaluation<V> {
    Ready(V),
    /// The computation requested keys that are not computed yet. Nothing was cached.
    NotReady { missing: Vec<DiceKey> },
}

/// A view of the engine in which computations are requested.
pub struct DiceTransaction {
    dice: Arc<Dice>,
    cancellation: CancellationHandle,
    keep_going: bool,
}

impl DiceTransaction {
    /// Continue computing other keys after a key computed to a failure.
    pub fn with_keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancellation.dupe()
    }

    pub fn global_data(&self) -> &DiceData {
        &self.dice.shared.data
    }

    pub fn updater(&self) -> DiceTransactionUpdater {
        self.dice.updater()
    }

    /// Computes a key, and everything it depends on.
    pub fn compute<K: Key>(&self, key: &K) -> Result<K::Value, DiceError> {
        let mut values = self.compute_many(std::slice::from_ref(key))?;
        values.pop().ok_or(DiceError::Cancelled)
    }

    pub fn compute_many<K: Key>(&self, keys: &[K]) -> Result<Vec<K::Value>, DiceError> {
        let roots: Vec<DiceKey> = keys.iter().map(|k| DiceKey::new(k.clone())).collect();
        scheduler::run(
            &self.dice.shared,
            &self.cancellation,
            roots.clone(),
            &SchedulerOptions {
                keep_going: self.keep_going,
                threads: self.dice.threads,
            },
        )?;
        let cache = self.dice.shared.cache.read();
        roots
            .iter()
            .map(|k| {
                cache
                    .get(k)
                    .and_then(|v| v.downcast::<K::Value>())
                    .ok_or_else(|| DiceError::MissingInjected(k.dupe()))
            })
            .collect()
    }

    /// Invokes the computation of the key once, without computing what it requests.
    pub fn try_compute<K: Key>(&self, key: &K) -> Result<Evaluation<K::Value>, DiceError> {
        let key = DiceKey::new(key.clone());
        if let Some(v) = self.dice.shared.cache.read().get(&key) {
            if let Some(v) = v.downcast::<K::Value>() {
                return Ok(Evaluation::Ready(v));
            }
        }
        if key.is_injected() {
            return Err(DiceError::MissingInjected(key));
        }
        match scheduler::evaluate(&self.dice.shared, &self.cancellation, &key) {
            Outcome::Done(v) => v
                .downcast::<K::Value>()
                .map(Evaluation::Ready)
                .ok_or(DiceError::MissingInjected(key)),
            Outcome::NotReady(missing) => Ok(Evaluation::NotReady { missing }),
            Outcome::Cancelled => Err(DiceError::Cancelled),
        }
    }

    pub fn is_cached<K: Key>(&self, key: &K) -> bool {
        self.dice
            .shared
            .cache
            .read()
            .contains(&DiceKey::new(key.clone()))
    }
}
