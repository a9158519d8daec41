/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::fmt;

use itertools::Itertools;
use strata_error::ErrorTag;
use strata_error::ProvidesTag;

use crate::impls::key::DiceKey;

#[derive(Debug, thiserror::Error)]
pub enum DiceError {
    #[error("Cycle detected: {}", .0.iter().join(" -> "))]
    Cycle(Vec<DiceKey>),
    #[error("{}", FailFastDisplay(.0, .1))]
    FailFast(DiceKey, strata_error::Error),
    #[error("Computation was cancelled")]
    Cancelled,
    #[error("Value of injected key `{0}` was never set")]
    MissingInjected(DiceKey),
}

struct FailFastDisplay<'a>(&'a DiceKey, &'a strata_error::Error);

impl fmt::Display for FailFastDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Computing `{}` failed: {}", self.0, self.1)
    }
}

impl ProvidesTag for DiceError {
    fn error_tag(&self) -> ErrorTag {
        match self {
            DiceError::Cycle(_) => ErrorTag::Cycle,
            DiceError::FailFast(_, e) => e.best_tag(),
            DiceError::Cancelled => ErrorTag::Tier0,
            DiceError::MissingInjected(_) => ErrorTag::InternalError,
        }
    }
}
