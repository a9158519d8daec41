/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::collections::HashMap;
use std::collections::HashSet;

use dupe::Dupe;

use crate::impls::key::DiceKey;
use crate::impls::key::DiceValue;

struct NodeEntry {
    value: DiceValue,
    deps: Vec<DiceKey>,
}

/// Computed and injected values, with the edges needed to invalidate them.
#[derive(Default)]
pub(crate) struct DiceCache {
    nodes: HashMap<DiceKey, NodeEntry>,
    rdeps: HashMap<DiceKey, HashSet<DiceKey>>,
}

impl DiceCache {
    pub(crate) fn get(&self, key: &DiceKey) -> Option<&DiceValue> {
        self.nodes.get(key).map(|e| &e.value)
    }

    pub(crate) fn contains(&self, key: &DiceKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Stores a computed value. Values are written once: if another worker stored the key
    /// first, that value is kept and returned.
    pub(crate) fn insert_computed(
        &mut self,
        key: DiceKey,
        value: DiceValue,
        deps: Vec<DiceKey>,
    ) -> DiceValue {
        if let Some(existing) = self.nodes.get(&key) {
            return existing.value.dupe();
        }
        for dep in &deps {
            self.rdeps.entry(dep.dupe()).or_default().insert(key.dupe());
        }
        self.nodes.insert(
            key,
            NodeEntry {
                value: value.dupe(),
                deps,
            },
        );
        value
    }

    /// Sets the value of an injected key. Returns false if the value did not change.
    pub(crate) fn set_injected(&mut self, key: DiceKey, value: DiceValue) -> bool {
        if let Some(existing) = self.nodes.get(&key) {
            if key.value_equals(&existing.value, &value) {
                return false;
            }
        }
        self.invalidate_rdeps(&key);
        self.nodes.insert(
            key,
            NodeEntry {
                value,
                deps: Vec::new(),
            },
        );
        true
    }

    /// Drops the value of the key and of everything that depends on it.
    pub(crate) fn invalidate(&mut self, key: &DiceKey) -> usize {
        let rdeps = self.invalidate_rdeps(key);
        rdeps + usize::from(self.remove(key))
    }

    fn invalidate_rdeps(&mut self, key: &DiceKey) -> usize {
        let mut removed = 0;
        let mut queue: Vec<DiceKey> = self
            .rdeps
            .remove(key)
            .map(|s| s.into_iter().collect())
            .unwrap_or_default();
        while let Some(k) = queue.pop() {
            if let Some(rdeps) = self.rdeps.remove(&k) {
                queue.extend(rdeps);
            }
            if self.remove(&k) {
                removed += 1;
            }
        }
        removed
    }

    fn remove(&mut self, key: &DiceKey) -> bool {
        match self.nodes.remove(key) {
            Some(entry) => {
                for dep in entry.deps {
                    if let Some(rdeps) = self.rdeps.get_mut(&dep) {
                        rdeps.remove(key);
                    }
                }
                true
            }
            None => false,
        }
    }
}
