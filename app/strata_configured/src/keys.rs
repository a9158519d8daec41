/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Keys of the dependency environment used by analysis.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use allocative::Allocative;
use dupe::Dupe;
use itertools::Itertools;
use strata_core::configuration::data::Configuration;
use strata_core::configuration::data::ConfigurationKey;
use strata_core::target::label::PackageLabel;
use strata_core::target::label::TargetLabel;
use strata_dice::Demand;
use strata_dice::DiceComputations;
use strata_dice::InjectedKey;
use strata_dice::Key;
use strata_node::package::Package;

/// A target in a configuration: the unit of analysis.
///
/// `cfg` is `None` for targets that are not configurable. `exec_platform` forces the
/// execution platform of the default exec group, set for toolchains resolved for a specific
/// platform.
#[derive(Debug, Clone, Dupe, PartialEq, Eq, Hash, PartialOrd, Ord, Allocative)]
pub struct ConfiguredTargetKey {
    label: TargetLabel,
    cfg: Option<ConfigurationKey>,
    exec_platform: Option<TargetLabel>,
}

impl ConfiguredTargetKey {
    pub fn new(label: TargetLabel, cfg: Option<ConfigurationKey>) -> Self {
        ConfiguredTargetKey {
            label,
            cfg,
            exec_platform: None,
        }
    }

    pub fn with_exec_platform(mut self, platform: Option<TargetLabel>) -> Self {
        self.exec_platform = platform;
        self
    }

    pub fn label(&self) -> &TargetLabel {
        &self.label
    }

    pub fn cfg(&self) -> Option<&ConfigurationKey> {
        self.cfg.as_ref()
    }

    pub fn exec_platform(&self) -> Option<&TargetLabel> {
        self.exec_platform.as_ref()
    }
}

impl fmt::Display for ConfiguredTargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)?;
        if let Some(cfg) = &self.cfg {
            write!(f, " ({})", cfg)?;
        }
        if let Some(platform) = &self.exec_platform {
            write!(f, " [exec {}]", platform)?;
        }
        Ok(())
    }
}

/// A loaded package. Set by the loading phase.
#[derive(Debug, Clone, Dupe, PartialEq, Eq, Hash, Allocative, derive_more::Display)]
#[display("package {}", _0)]
pub struct PackageKey(pub PackageLabel);

impl InjectedKey for PackageKey {
    type Value = strata_error::Result<Package>;

    fn equality(x: &Self::Value, y: &Self::Value) -> bool {
        match (x, y) {
            (Ok(x), Ok(y)) => x == y,
            _ => false,
        }
    }
}

/// The configuration object for a configuration key.
#[derive(Debug, Clone, Dupe, PartialEq, Eq, Hash, Allocative, derive_more::Display)]
#[display("configuration {}", _0)]
pub struct ConfigurationLookupKey(pub ConfigurationKey);

impl Key for ConfigurationLookupKey {
    type Value = Configuration;

    fn compute(&self, _ctx: &mut DiceComputations) -> Demand<Configuration> {
        Ok(Configuration::new(self.0.dupe()))
    }

    fn equality(x: &Configuration, y: &Configuration) -> bool {
        x == y
    }
}

/// Configuration fragments needed by a target and everything it depends on, used to trim
/// the configuration of dependency edges.
#[derive(Debug, Clone, Dupe, PartialEq, Eq, Hash, Allocative, derive_more::Display)]
#[display("transitive fragments of {}", _0)]
pub struct TransitiveFragmentsKey(pub TargetLabel);

impl Key for TransitiveFragmentsKey {
    type Value = strata_error::Result<Arc<BTreeSet<String>>>;

    fn compute(&self, ctx: &mut DiceComputations) -> Demand<Self::Value> {
        let package = match ctx.compute(&PackageKey(self.0.pkg().dupe()))? {
            Ok(package) => package,
            Err(e) => return Ok(Err(e)),
        };
        let target = match package.get_target(self.0.name()) {
            Ok(target) => target.dupe(),
            Err(e) => return Ok(Err(e.into())),
        };

        let mut fragments = target.required_fragments();
        for (attr, _) in target.attrs() {
            for aspect in attr.aspects() {
                fragments.extend(aspect.required_fragments().iter().cloned());
            }
        }

        let deps: Vec<TransitiveFragmentsKey> = target
            .unconfigured_deps()
            .into_iter()
            .unique()
            .map(TransitiveFragmentsKey)
            .collect();
        // Broken dependencies are reported by the edge itself.
        for dep in ctx.compute_many(&deps)?.into_iter().flatten() {
            fragments.extend(dep.iter().cloned());
        }
        Ok(Ok(Arc::new(fragments)))
    }

    fn equality(x: &Self::Value, y: &Self::Value) -> bool {
        match (x, y) {
            (Ok(x), Ok(y)) => x == y,
            _ => false,
        }
    }
}
