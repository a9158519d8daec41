/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

pub(crate) mod cancellation;
pub(crate) mod computations;
pub(crate) mod data;
pub(crate) mod demand;
pub(crate) mod error;
pub(crate) mod key;
