/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::sync::Arc;

use allocative::Allocative;
use dupe::Dupe;
use strata_core::configuration::config_setting::ConfigSettingData;
use strata_core::configuration::data::Configuration;
use strata_core::target::label::TargetLabel;

/// Answers `select()` key lookups while configuring an attribute.
pub trait AttrConfigurationContext {
    /// The settings of the condition if it matches the current configuration, `None` if it
    /// does not match.
    fn matches(&self, label: &TargetLabel) -> strata_error::Result<Option<&ConfigSettingData>>;

    fn cfg(&self) -> &Configuration;
}

/// The settings of one `select()` condition, resolved against a configuration.
#[derive(Clone, Dupe, Debug, PartialEq, Eq, Allocative)]
pub struct ConfigMatchingProvider(Arc<ConfigMatchingProviderData>);

#[derive(Debug, PartialEq, Eq, Allocative)]
struct ConfigMatchingProviderData {
    label: TargetLabel,
    settings: ConfigSettingData,
    matches: bool,
}

impl ConfigMatchingProvider {
    pub fn new(label: TargetLabel, settings: ConfigSettingData, matches: bool) -> Self {
        ConfigMatchingProvider(Arc::new(ConfigMatchingProviderData {
            label,
            settings,
            matches,
        }))
    }

    pub fn label(&self) -> &TargetLabel {
        &self.0.label
    }

    pub fn settings(&self) -> &ConfigSettingData {
        &self.0.settings
    }

    pub fn matches(&self) -> bool {
        self.0.matches
    }

    pub fn refines(&self, other: &ConfigMatchingProvider) -> bool {
        self.0.settings.refines(&other.0.settings)
    }
}
