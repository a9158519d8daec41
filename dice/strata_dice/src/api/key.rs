/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::fmt::Debug;
use std::fmt::Display;
use std::hash::Hash;

use allocative::Allocative;

use crate::api::computations::DiceComputations;
use crate::api::demand::Demand;

/// A computation node.
pub trait Key: Allocative + Debug + Display + Clone + Eq + Hash + Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;

    /// Computes the value. Must be a pure function of the key and of the values requested
    /// through `ctx`: it may be invoked several times, and only the last invocation counts.
    fn compute(&self, ctx: &mut DiceComputations) -> Demand<Self::Value>;

    /// Whether two values are the same, used to skip invalidation when a value does not
    /// change.
    fn equality(x: &Self::Value, y: &Self::Value) -> bool;

    /// The error carried by a value, if the value represents a failure.
    fn failure(_value: &Self::Value) -> Option<&strata_error::Error> {
        None
    }

    #[doc(hidden)]
    fn is_injected() -> bool {
        false
    }
}

/// A key whose value is set from outside through
/// [`DiceTransactionUpdater::changed_to`](crate::DiceTransactionUpdater::changed_to).
pub trait InjectedKey:
    Allocative + Debug + Display + Clone + Eq + Hash + Send + Sync + 'static
{
    type Value: Clone + Send + Sync + 'static;

    fn equality(x: &Self::Value, y: &Self::Value) -> bool;
}

impl<K> Key for K
where
    K: InjectedKey,
{
    type Value = K::Value;

    fn compute(&self, _ctx: &mut DiceComputations) -> Demand<Self::Value> {
        // Only reached when the value was never injected, the scheduler reports it.
        Err(crate::Suspend::NotReady)
    }

    fn equality(x: &Self::Value, y: &Self::Value) -> bool {
        <K as InjectedKey>::equality(x, y)
    }

    fn is_injected() -> bool {
        true
    }
}
