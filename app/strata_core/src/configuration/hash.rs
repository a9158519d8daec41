/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use allocative::Allocative;

use crate::configuration::options::BuildOptions;

/// Hash of a configuration, serialized as a hex string.
///
/// Computed over all option values, so two configurations with the same options have the
/// same hash.
#[derive(
    Clone,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Allocative,
    derive_more::Display,
    Ord,
    PartialOrd
)]
pub struct ConfigurationHash(String);

impl ConfigurationHash {
    pub(crate) fn of(options: &BuildOptions) -> ConfigurationHash {
        // `BuildOptions` only contains ordered maps, so its debug output is canonical.
        let hash = blake3::hash(format!("{:?}", options).as_bytes());
        ConfigurationHash(hash.to_hex().to_string())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The prefix used when displaying configuration keys.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}
