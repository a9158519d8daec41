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
use indexmap::IndexSet;

use crate::api::cancellation::CancellationHandle;
use crate::api::data::DiceData;
use crate::api::demand::Demand;
use crate::api::demand::Suspend;
use crate::api::key::Key;
use crate::dice::DiceShared;
use crate::impls::key::DiceKey;
use crate::impls::key::DiceValue;

/// Notified around every batch of requests made by a computation.
pub trait FetchObserver: Send + Sync {
    fn pre_fetch(&self);

    fn post_fetch(&self);
}

/// The context a [`Key`] computes in: gives access to the values of other keys.
pub struct DiceComputations {
    shared: Arc<DiceShared>,
    cancellation: CancellationHandle,
    deps: IndexSet<DiceKey>,
    missing: IndexSet<DiceKey>,
    observer: Option<Arc<dyn FetchObserver>>,
}

fn downcast_value<K: Key>(value: &DiceValue) -> K::Value {
    match value.downcast::<K::Value>() {
        Some(v) => v,
        None => unreachable!("cached value type does not match its key type"),
    }
}

impl DiceComputations {
    pub(crate) fn new(shared: Arc<DiceShared>, cancellation: CancellationHandle) -> Self {
        DiceComputations {
            shared,
            cancellation,
            deps: IndexSet::new(),
            missing: IndexSet::new(),
            observer: None,
        }
    }

    /// Requested keys, and the requested keys that were not computed yet.
    pub(crate) fn finish(self) -> (Vec<DiceKey>, Vec<DiceKey>) {
        (
            self.deps.into_iter().collect(),
            self.missing.into_iter().collect(),
        )
    }

    pub fn global_data(&self) -> &DiceData {
        &self.shared.data
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Installs an observer for subsequent requests, returning the previous one.
    pub fn set_fetch_observer(
        &mut self,
        observer: Option<Arc<dyn FetchObserver>>,
    ) -> Option<Arc<dyn FetchObserver>> {
        std::mem::replace(&mut self.observer, observer)
    }

    fn fetch_batch(&mut self, keys: Vec<DiceKey>) -> Demand<Vec<DiceValue>> {
        if self.cancellation.is_cancelled() {
            return Err(Suspend::Cancelled);
        }
        let observer = self.observer.dupe();
        if let Some(observer) = &observer {
            observer.pre_fetch();
        }
        let result = {
            let cache = self.shared.cache.read();
            let mut values = Vec::with_capacity(keys.len());
            let mut ready = true;
            for key in keys {
                match cache.get(&key) {
                    Some(v) => values.push(v.dupe()),
                    None => {
                        ready = false;
                        self.missing.insert(key.dupe());
                    }
                }
                self.deps.insert(key);
            }
            if ready {
                Ok(values)
            } else {
                Err(Suspend::NotReady)
            }
        };
        if let Some(observer) = &observer {
            observer.post_fetch();
        }
        result
    }

    /// Requests the value of a key.
    pub fn compute<K: Key>(&mut self, key: &K) -> Demand<K::Value> {
        let values = self.fetch_batch(vec![DiceKey::new(key.clone())])?;
        match values.first() {
            Some(v) => Ok(downcast_value::<K>(v)),
            None => Err(Suspend::NotReady),
        }
    }

    /// Requests the values of several keys in one batch. Either all values are available,
    /// or all missing keys are recorded and the computation is not ready.
    pub fn compute_many<K: Key>(&mut self, keys: &[K]) -> Demand<Vec<K::Value>> {
        let values = self.fetch_batch(keys.iter().map(|k| DiceKey::new(k.clone())).collect())?;
        Ok(values.iter().map(downcast_value::<K>).collect())
    }

    /// Like [`compute_many`](Self::compute_many) for two key types in a single batch.
    pub fn compute_many2<K1: Key, K2: Key>(
        &mut self,
        keys1: &[K1],
        keys2: &[K2],
    ) -> Demand<(Vec<K1::Value>, Vec<K2::Value>)> {
        let batch = keys1
            .iter()
            .map(|k| DiceKey::new(k.clone()))
            .chain(keys2.iter().map(|k| DiceKey::new(k.clone())))
            .collect();
        let values = self.fetch_batch(batch)?;
        let (values1, values2) = values.split_at(keys1.len());
        Ok((
            values1.iter().map(downcast_value::<K1>).collect(),
            values2.iter().map(downcast_value::<K2>).collect(),
        ))
    }
}
