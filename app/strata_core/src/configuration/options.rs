/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use allocative::Allocative;

use crate::target::filter::LabelFilter;
use crate::target::label::TargetLabel;

/// Extra execution constraints the configuration adds for targets matching a filter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Allocative)]
pub struct ExecConstraintRule {
    pub filter: LabelFilter,
    pub constraints: Vec<TargetLabel>,
}

/// Options every configuration carries regardless of fragment trimming.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Allocative)]
pub struct PlatformOptions {
    pub target_platform: Option<TargetLabel>,
    pub extra_execution_constraints: Vec<ExecConstraintRule>,
    /// Targets whose toolchain resolution should be traced.
    pub debug_toolchain_resolution: Vec<LabelFilter>,
}

/// The raw option values a configuration is made of.
///
/// Options are grouped in named fragments (`cpp`, `java`, ...). Rules declare which fragments
/// they read, which lets dependencies be analyzed in configurations trimmed down to those
/// fragments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Allocative)]
pub struct BuildOptions {
    fragments: BTreeMap<String, BTreeMap<String, String>>,
    feature_flags: BTreeMap<TargetLabel, String>,
    platform: PlatformOptions,
}

impl BuildOptions {
    pub fn with_option(mut self, fragment: &str, option: &str, value: &str) -> Self {
        self.set_option(fragment, option, value);
        self
    }

    pub fn with_feature_flag(mut self, flag: TargetLabel, value: &str) -> Self {
        self.feature_flags.insert(flag, value.to_owned());
        self
    }

    pub fn with_target_platform(mut self, platform: TargetLabel) -> Self {
        self.platform.target_platform = Some(platform);
        self
    }

    pub fn with_extra_execution_constraints(
        mut self,
        filter: LabelFilter,
        constraints: Vec<TargetLabel>,
    ) -> Self {
        self.platform
            .extra_execution_constraints
            .push(ExecConstraintRule {
                filter,
                constraints,
            });
        self
    }

    pub fn with_debug_toolchain_resolution(mut self, filter: LabelFilter) -> Self {
        self.platform.debug_toolchain_resolution.push(filter);
        self
    }

    pub fn set_option(&mut self, fragment: &str, option: &str, value: &str) {
        self.fragments
            .entry(fragment.to_owned())
            .or_default()
            .insert(option.to_owned(), value.to_owned());
    }

    pub fn set_target_platform(&mut self, platform: Option<TargetLabel>) {
        self.platform.target_platform = platform;
    }

    pub fn clear_feature_flags(&mut self) {
        self.feature_flags.clear();
    }

    pub fn option(&self, fragment: &str, option: &str) -> Option<&str> {
        self.fragments
            .get(fragment)
            .and_then(|f| f.get(option))
            .map(String::as_str)
    }

    /// Looks up a `fragment.option` setting.
    pub fn setting(&self, name: &str) -> Option<&str> {
        let (fragment, option) = name.split_once('.')?;
        self.option(fragment, option)
    }

    pub fn feature_flag(&self, flag: &TargetLabel) -> Option<&str> {
        self.feature_flags.get(flag).map(String::as_str)
    }

    pub fn feature_flags(&self) -> &BTreeMap<TargetLabel, String> {
        &self.feature_flags
    }

    pub fn fragment_names(&self) -> impl Iterator<Item = &str> {
        self.fragments.keys().map(String::as_str)
    }

    pub fn platform(&self) -> &PlatformOptions {
        &self.platform
    }

    /// Keeps only the named fragments. Platform options and feature flags are always kept.
    pub fn trim(&self, fragments: &BTreeSet<String>) -> BuildOptions {
        BuildOptions {
            fragments: self
                .fragments
                .iter()
                .filter(|(name, _)| fragments.contains(*name))
                .map(|(name, values)| (name.clone(), values.clone()))
                .collect(),
            feature_flags: self.feature_flags.clone(),
            platform: self.platform.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::configuration::options::BuildOptions;

    #[test]
    fn test_trim() {
        let options = BuildOptions::default()
            .with_option("cpp", "opt", "-O2")
            .with_option("java", "version", "17");
        let trimmed = options.trim(&BTreeSet::from(["cpp".to_owned()]));
        assert_eq!(Some("-O2"), trimmed.option("cpp", "opt"));
        assert_eq!(None, trimmed.option("java", "version"));
        assert_eq!(Some("-O2"), trimmed.setting("cpp.opt"));
        assert_eq!(vec!["cpp"], trimmed.fragment_names().collect::<Vec<_>>());
    }
}
