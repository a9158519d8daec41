/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Resolution of the `select()` conditions used by a target.

use dupe::Dupe;
use itertools::Itertools;
use starlark_map::small_map::SmallMap;
use strata_core::configuration::config_setting::ConfigSettingData;
use strata_core::configuration::data::Configuration;
use strata_core::target::label::TargetLabel;
use strata_dice::DiceComputations;
use strata_error::ErrorTag;
use strata_node::attrs::coerced_attr::CoercedAttr;
use strata_node::attrs::configuration_context::AttrConfigurationContext;
use strata_node::attrs::configuration_context::ConfigMatchingProvider;
use strata_node::attrs::configured_attr::ConfiguredAttr;
use strata_node::nodes::target_node::TargetNode;

use crate::alias::resolve_configured_target_dependencies;
use crate::alias::TransitivePackages;
use crate::dependencies::Dependency;
use crate::dependencies::DependencyKind;
use crate::errors::Abort;
use crate::errors::AnalysisFailure;
use crate::errors::ConfiguredValueCreationError;
use crate::errors::RootCauses;

/// The conditions a target's `select()` keys resolved to, keyed by the label as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigConditions {
    conditions: SmallMap<TargetLabel, ConfigMatchingProvider>,
}

impl ConfigConditions {
    pub fn empty() -> ConfigConditions {
        ConfigConditions::default()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn get(&self, label: &TargetLabel) -> Option<&ConfigMatchingProvider> {
        self.conditions.get(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TargetLabel, &ConfigMatchingProvider)> {
        self.conditions.iter()
    }
}

struct ConditionsContext<'a> {
    conditions: &'a ConfigConditions,
    cfg: &'a Configuration,
}

impl AttrConfigurationContext for ConditionsContext<'_> {
    fn matches(&self, label: &TargetLabel) -> strata_error::Result<Option<&ConfigSettingData>> {
        match self.conditions.get(label) {
            Some(condition) if condition.matches() => Ok(Some(condition.settings())),
            Some(_) => Ok(None),
            None => Err(strata_error::internal_error!(
                "`select()` key `{}` was not resolved",
                label
            )),
        }
    }

    fn cfg(&self) -> &Configuration {
        self.cfg
    }
}

/// Resolves the `select()` expressions of an attribute value.
pub(crate) fn configure_attr(
    value: &CoercedAttr,
    conditions: &ConfigConditions,
    configuration: Option<&Configuration>,
) -> strata_error::Result<ConfiguredAttr> {
    match configuration {
        Some(cfg) => value.configure(&ConditionsContext { conditions, cfg }),
        None => value.as_unconfigured().ok_or_else(|| {
            strata_error::strata_error!(
                ErrorTag::ConfigCondition,
                "`select()` cannot be resolved without a configuration"
            )
        }),
    }
}

/// Analyzes every `select()` key of the target in the target's own configuration and
/// collects their settings.
///
/// Keys resolve through aliases. A key whose value does not provide settings is an error.
pub(crate) fn get_config_conditions(
    ctx: &mut DiceComputations,
    target: &TargetNode,
    configuration: Option<&Configuration>,
    transitive_packages: &mut TransitivePackages,
    causes: &mut RootCauses,
) -> Result<ConfigConditions, Abort> {
    let keys: Vec<TargetLabel> = target.select_keys().into_iter().unique().collect();
    let Some(configuration) = configuration else {
        return Ok(ConfigConditions::empty());
    };
    if keys.is_empty() {
        return Ok(ConfigConditions::empty());
    }

    let label = target.label();
    let cfg = configuration.key();
    let deps: Vec<Dependency> = keys
        .iter()
        .map(|key| {
            Dependency::new(
                DependencyKind::ConfigCondition,
                key.dupe(),
                Some(configuration.dupe()),
            )
        })
        .collect();

    let values = match resolve_configured_target_dependencies(
        ctx,
        label,
        Some(cfg),
        &deps,
        transitive_packages,
        causes,
    ) {
        Ok(values) => values,
        Err(Abort::Failure(AnalysisFailure::Dependency {
            error,
            dep_reported_own_error,
        })) => {
            return Err(AnalysisFailure::Dependency {
                error: error.with_message(format!(
                    "errors encountered resolving select() keys for {}",
                    label
                )),
                dep_reported_own_error,
            }
            .into());
        }
        Err(e) => return Err(e),
    };

    let mut conditions = SmallMap::with_capacity(keys.len());
    for (key, value) in keys.into_iter().zip(values) {
        match value.providers().config_matching() {
            Some(provider) => {
                conditions.insert(key, provider.dupe());
            }
            None => {
                return Err(AnalysisFailure::Dependency {
                    error: ConfiguredValueCreationError::of_target(
                        label.dupe(),
                        Some(cfg.dupe()),
                        ErrorTag::ConfigCondition,
                        format!("{} is not a valid select() condition for {}.", key, label),
                    ),
                    dep_reported_own_error: false,
                }
                .into());
            }
        }
    }
    Ok(ConfigConditions { conditions })
}
