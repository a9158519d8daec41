/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::collections::BTreeMap;

use allocative::Allocative;

use crate::configuration::options::BuildOptions;
use crate::target::label::TargetLabel;

/// Parsed settings of a `config_setting` target.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Allocative)]
pub struct ConfigSettingData {
    /// `fragment.option` to expected value.
    pub values: BTreeMap<String, String>,
    /// Feature flag to expected value.
    pub flag_values: BTreeMap<TargetLabel, String>,
}

impl ConfigSettingData {
    fn is_subset<K: Ord, V: Eq>(a: &BTreeMap<K, V>, b: &BTreeMap<K, V>) -> bool {
        a.len() <= b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
    }

    fn len_sum(&self) -> usize {
        self.values.len() + self.flag_values.len()
    }

    /// Whether every expected value is set in the options.
    pub fn matches(&self, options: &BuildOptions) -> bool {
        self.values
            .iter()
            .all(|(k, v)| options.setting(k) == Some(v.as_str()))
            && self
                .flag_values
                .iter()
                .all(|(k, v)| options.feature_flag(k) == Some(v.as_str()))
    }

    /// `self` is strictly more specific than `that`.
    pub fn refines(&self, that: &ConfigSettingData) -> bool {
        self.len_sum() > that.len_sum()
            && Self::is_subset(&that.values, &self.values)
            && Self::is_subset(&that.flag_values, &self.flag_values)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::configuration::config_setting::ConfigSettingData;
    use crate::configuration::options::BuildOptions;

    fn setting(values: &[(&str, &str)]) -> ConfigSettingData {
        ConfigSettingData {
            values: values
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            flag_values: BTreeMap::new(),
        }
    }

    #[test]
    fn test_matches() {
        let options = BuildOptions::default()
            .with_option("cpp", "opt", "2")
            .with_option("cpu", "arch", "x86");
        assert!(setting(&[("cpp.opt", "2")]).matches(&options));
        assert!(setting(&[("cpp.opt", "2"), ("cpu.arch", "x86")]).matches(&options));
        assert!(!setting(&[("cpp.opt", "3")]).matches(&options));
        assert!(!setting(&[("cpp.missing", "2")]).matches(&options));
    }

    #[test]
    fn test_refines() {
        let a = setting(&[("cpp.opt", "2")]);
        let ab = setting(&[("cpp.opt", "2"), ("cpu.arch", "x86")]);
        let c = setting(&[("cpu.arch", "arm")]);
        assert!(ab.refines(&a));
        assert!(!a.refines(&ab));
        assert!(!a.refines(&a));
        assert!(!ab.refines(&c));
    }
}
