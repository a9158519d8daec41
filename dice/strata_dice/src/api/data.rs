/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::any::type_name;
use std::any::Any;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use strata_error::internal_error;

/// Per-engine data available to every computation, typically services and configuration.
#[derive(Default, Clone)]
pub struct DiceData {
    values: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl DiceData {
    pub fn set<T: Send + Sync + 'static>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> strata_error::Result<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .ok_or_else(|| internal_error!("DiceData has no value of type `{}`", type_name::<T>()))
    }

    pub fn try_get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }
}

#[cfg(test)]
mod tests {
    use crate::DiceData;

    #[test]
    fn test_set_get() {
        let mut data = DiceData::default();
        data.set(17u32);
        data.set("hello".to_owned());
        assert_eq!(17, *data.get::<u32>().unwrap());
        assert_eq!("hello", data.get::<String>().unwrap());
        assert!(data.get::<u64>().is_err());
        assert!(data.try_get::<u64>().is_none());
    }
}
