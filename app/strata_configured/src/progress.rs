/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use strata_core::target::label::TargetLabel;

/// Notified as targets finish analysis.
pub trait ConfiguredTargetProgress: Send + Sync {
    fn done_configure_target(&self, label: &TargetLabel);
}
