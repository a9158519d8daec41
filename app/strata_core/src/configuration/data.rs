/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use allocative::Allocative;
use dupe::Dupe;

use crate::configuration::hash::ConfigurationHash;
use crate::configuration::options::BuildOptions;
use crate::target::label::TargetLabel;

#[derive(Debug, Allocative)]
struct ConfigurationKeyData {
    hash: ConfigurationHash,
    options: BuildOptions,
}

/// Identity of a configuration. Two keys are equal iff their options are equal.
#[derive(Clone, Dupe, Allocative)]
pub struct ConfigurationKey(Arc<ConfigurationKeyData>);

impl ConfigurationKey {
    pub fn new(options: BuildOptions) -> ConfigurationKey {
        let hash = ConfigurationHash::of(&options);
        ConfigurationKey(Arc::new(ConfigurationKeyData { hash, options }))
    }

    pub fn hash(&self) -> &ConfigurationHash {
        &self.0.hash
    }

    pub fn options(&self) -> &BuildOptions {
        &self.0.options
    }
}

impl PartialEq for ConfigurationKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.hash == other.0.hash
    }
}

impl Eq for ConfigurationKey {}

impl Hash for ConfigurationKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash.hash(state)
    }
}

impl PartialOrd for ConfigurationKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ConfigurationKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.hash.cmp(&other.0.hash)
    }
}

impl fmt::Display for ConfigurationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cfg:{}", self.0.hash.short())
    }
}

impl fmt::Debug for ConfigurationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Debug, Allocative)]
struct ConfigurationData {
    key: ConfigurationKey,
}

/// A configuration as seen by analysis: immutable, shared by every node analyzed in it.
#[derive(Clone, Dupe, Debug, Allocative)]
pub struct Configuration(Arc<ConfigurationData>);

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Configuration {}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.key(), f)
    }
}

impl Configuration {
    pub fn new(key: ConfigurationKey) -> Configuration {
        Configuration(Arc::new(ConfigurationData { key }))
    }

    pub fn key(&self) -> &ConfigurationKey {
        &self.0.key
    }

    pub fn options(&self) -> &BuildOptions {
        self.0.key.options()
    }

    pub fn target_platform(&self) -> Option<&TargetLabel> {
        self.options().platform().target_platform.as_ref()
    }

    /// Execution constraints this configuration adds for the given target.
    pub fn additional_execution_constraints_for(&self, label: &TargetLabel) -> Vec<TargetLabel> {
        let mut out = Vec::new();
        for rule in &self.options().platform().extra_execution_constraints {
            if rule.filter.matches(label) {
                for c in &rule.constraints {
                    if !out.contains(c) {
                        out.push(c.dupe());
                    }
                }
            }
        }
        out
    }

    pub fn debug_toolchain_resolution_for(&self, label: &TargetLabel) -> bool {
        self.options()
            .platform()
            .debug_toolchain_resolution
            .iter()
            .any(|f| f.matches(label))
    }
}

#[cfg(test)]
mod tests {
    use dupe::Dupe;

    use crate::configuration::data::Configuration;
    use crate::configuration::data::ConfigurationKey;
    use crate::configuration::options::BuildOptions;
    use crate::target::filter::LabelFilter;
    use crate::target::label::TargetLabel;

    #[test]
    fn test_key_equality() {
        let a = ConfigurationKey::new(BuildOptions::default().with_option("cpp", "opt", "1"));
        let b = ConfigurationKey::new(BuildOptions::default().with_option("cpp", "opt", "1"));
        let c = ConfigurationKey::new(BuildOptions::default().with_option("cpp", "opt", "2"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.to_string().starts_with("cfg:"));
    }

    #[test]
    fn test_additional_constraints() {
        let linux = TargetLabel::testing_parse("//constraints:linux");
        let options = BuildOptions::default()
            .with_extra_execution_constraints(
                LabelFilter::parse("//app/...").unwrap(),
                vec![linux.dupe()],
            )
            .with_extra_execution_constraints(
                LabelFilter::parse("//app:bin").unwrap(),
                vec![linux.dupe()],
            );
        let cfg = Configuration::new(ConfigurationKey::new(options));
        assert_eq!(
            vec![linux],
            cfg.additional_execution_constraints_for(&TargetLabel::testing_parse("//app:bin"))
        );
        assert!(
            cfg.additional_execution_constraints_for(&TargetLabel::testing_parse("//lib:util"))
                .is_empty()
        );
    }
}
