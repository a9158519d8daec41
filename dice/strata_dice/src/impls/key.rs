/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Type erasure of keys and values.

use std::any::Any;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use dupe::Dupe;
use gazebo::cmp::PartialEqAny;

use crate::api::computations::DiceComputations;
use crate::api::demand::Demand;
use crate::api::key::Key;

/// A computed value, of the `Value` type of its key.
#[derive(Clone, Dupe)]
pub(crate) struct DiceValue(Arc<dyn Any + Send + Sync>);

impl DiceValue {
    pub(crate) fn new<V: Send + Sync + 'static>(value: V) -> Self {
        DiceValue(Arc::new(value))
    }

    pub(crate) fn downcast<V: Clone + 'static>(&self) -> Option<V> {
        self.0.downcast_ref::<V>().cloned()
    }
}

trait DiceKeyDyn: fmt::Display + fmt::Debug + Send + Sync + 'static {
    fn eq_token(&self) -> PartialEqAny<'_>;
    fn hash(&self, state: &mut dyn Hasher);
    fn as_any(&self) -> &dyn Any;
    fn compute(&self, ctx: &mut DiceComputations) -> Demand<DiceValue>;
    fn is_injected(&self) -> bool;
    fn value_equals(&self, x: &DiceValue, y: &DiceValue) -> bool;
    fn value_failure(&self, value: &DiceValue) -> Option<strata_error::Error>;
}

impl<K: Key> DiceKeyDyn for K {
    fn eq_token(&self) -> PartialEqAny<'_> {
        PartialEqAny::new(self)
    }

    fn hash(&self, mut state: &mut dyn Hasher) {
        Hash::hash(self, &mut state)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn compute(&self, ctx: &mut DiceComputations) -> Demand<DiceValue> {
        Ok(DiceValue::new(Key::compute(self, ctx)?))
    }

    fn is_injected(&self) -> bool {
        K::is_injected()
    }

    fn value_equals(&self, x: &DiceValue, y: &DiceValue) -> bool {
        match (x.0.downcast_ref::<K::Value>(), y.0.downcast_ref::<K::Value>()) {
            (Some(x), Some(y)) => K::equality(x, y),
            _ => false,
        }
    }

    fn value_failure(&self, value: &DiceValue) -> Option<strata_error::Error> {
        let value = value.0.downcast_ref::<K::Value>()?;
        K::failure(value).map(|e| e.dupe())
    }
}

/// A key of any type.
#[derive(Clone, Dupe)]
pub struct DiceKey(Arc<dyn DiceKeyDyn>);

impl DiceKey {
    pub(crate) fn new<K: Key>(key: K) -> Self {
        DiceKey(Arc::new(key))
    }

    pub fn downcast_ref<K: Key>(&self) -> Option<&K> {
        self.0.as_any().downcast_ref::<K>()
    }

    pub(crate) fn compute(&self, ctx: &mut DiceComputations) -> Demand<DiceValue> {
        self.0.compute(ctx)
    }

    pub(crate) fn is_injected(&self) -> bool {
        self.0.is_injected()
    }

    pub(crate) fn value_equals(&self, x: &DiceValue, y: &DiceValue) -> bool {
        self.0.value_equals(x, y)
    }

    pub(crate) fn value_failure(&self, value: &DiceValue) -> Option<strata_error::Error> {
        self.0.value_failure(value)
    }
}

impl PartialEq for DiceKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.eq_token() == other.0.eq_token()
    }
}

impl Eq for DiceKey {}

impl Hash for DiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.as_any().type_id().hash(state);
        DiceKeyDyn::hash(&*self.0, state)
    }
}

impl fmt::Display for DiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for DiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}
