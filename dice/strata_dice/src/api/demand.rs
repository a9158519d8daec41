/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

/// Why a computation stopped before producing a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspend {
    /// Some requested keys are not computed yet. The computation is invoked again once they
    /// are.
    NotReady,
    /// The transaction was cancelled.
    Cancelled,
}

/// Result of requesting values from the environment.
pub type Demand<T> = Result<T, Suspend>;
