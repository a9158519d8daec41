/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Cycle detection in DICE

use std::collections::HashSet;

use dupe::Dupe;
use indexmap::IndexMap;
use indexmap::IndexSet;

use crate::impls::key::DiceKey;

/// Finds a cycle in the graph of suspended keys, each waiting on the keys it requested.
///
/// Returns the keys of the first cycle found, starting from the key first reached twice.
pub(crate) fn find_cycle(waiting: &IndexMap<DiceKey, Vec<DiceKey>>) -> Option<Vec<DiceKey>> {
    let mut done = HashSet::new();
    for root in waiting.keys() {
        let mut stack = IndexSet::new();
        if let Some(cycle) = visit(root, waiting, &mut stack, &mut done) {
            return Some(cycle);
        }
    }
    None
}

fn visit(
    key: &DiceKey,
    waiting: &IndexMap<DiceKey, Vec<DiceKey>>,
    stack: &mut IndexSet<DiceKey>,
    done: &mut HashSet<DiceKey>,
) -> Option<Vec<DiceKey>> {
    if let Some(pos) = stack.get_index_of(key) {
        return Some(stack.iter().skip(pos).map(|k| k.dupe()).collect());
    }
    if done.contains(key) {
        return None;
    }
    stack.insert(key.dupe());
    for next in waiting.get(key).into_iter().flatten() {
        if let Some(cycle) = visit(next, waiting, stack, done) {
            return Some(cycle);
        }
    }
    stack.pop();
    done.insert(key.dupe());
    None
}

#[cfg(test)]
mod tests {
    use allocative::Allocative;
    use derive_more::Display;
    use indexmap::IndexMap;

    use crate::cycles::find_cycle;
    use crate::impls::key::DiceKey;
    use crate::DiceComputations;
    use crate::Demand;
    use crate::Key;

    #[derive(Allocative, Clone, Debug, Display, PartialEq, Eq, Hash)]
    struct K(usize);

    impl Key for K {
        type Value = ();

        fn compute(&self, _ctx: &mut DiceComputations) -> Demand<()> {
            Ok(())
        }

        fn equality(_: &(), _: &()) -> bool {
            true
        }
    }

    fn k(i: usize) -> DiceKey {
        DiceKey::new(K(i))
    }

    #[test]
    fn cycle_detection_when_no_cycles() {
        let waiting = IndexMap::from([
            (k(1), vec![k(2), k(3)]),
            (k(2), vec![k(3)]),
            (k(3), vec![k(4)]),
        ]);
        assert!(find_cycle(&waiting).is_none());
    }

    #[test]
    fn cycle_detection_when_cycles() {
        let waiting = IndexMap::from([
            (k(1), vec![k(2)]),
            (k(2), vec![k(3)]),
            (k(3), vec![k(4), k(2)]),
        ]);
        let cycle = find_cycle(&waiting).unwrap();
        assert_eq!(vec![k(2), k(3)], cycle);
    }
}
