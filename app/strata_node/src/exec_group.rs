/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::collections::BTreeSet;

use allocative::Allocative;
use starlark_map::small_map::SmallMap;
use strata_core::target::label::TargetLabel;

/// Name of the exec group built from the requirements of the rule itself.
pub const DEFAULT_EXEC_GROUP_NAME: &str = "default-exec-group";

/// Toolchain types and execution constraints needed by a set of actions of a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Allocative)]
pub struct ExecGroup {
    required_toolchains: BTreeSet<TargetLabel>,
    exec_compatible_with: BTreeSet<TargetLabel>,
    copy_from_default: bool,
}

impl ExecGroup {
    pub fn new(
        required_toolchains: impl IntoIterator<Item = TargetLabel>,
        exec_compatible_with: impl IntoIterator<Item = TargetLabel>,
    ) -> Self {
        ExecGroup {
            required_toolchains: required_toolchains.into_iter().collect(),
            exec_compatible_with: exec_compatible_with.into_iter().collect(),
            copy_from_default: false,
        }
    }

    /// A group that also gets the requirements of the default exec group.
    pub fn copy_from_default(mut self) -> Self {
        self.copy_from_default = true;
        self
    }

    pub fn required_toolchains(&self) -> &BTreeSet<TargetLabel> {
        &self.required_toolchains
    }

    pub fn exec_compatible_with(&self) -> &BTreeSet<TargetLabel> {
        &self.exec_compatible_with
    }

    fn inherit(&self, default: &ExecGroup) -> ExecGroup {
        if !self.copy_from_default {
            return self.clone();
        }
        ExecGroup {
            required_toolchains: self
                .required_toolchains
                .union(&default.required_toolchains)
                .cloned()
                .collect(),
            exec_compatible_with: self
                .exec_compatible_with
                .union(&default.exec_compatible_with)
                .cloned()
                .collect(),
            copy_from_default: false,
        }
    }
}

/// The exec groups of a target, the default group first.
#[derive(Debug, Clone, PartialEq, Eq, Allocative)]
pub struct ExecGroupCollection {
    groups: SmallMap<String, ExecGroup>,
}

impl ExecGroupCollection {
    pub fn new(default: ExecGroup, declared: &SmallMap<String, ExecGroup>) -> Self {
        let mut groups = SmallMap::with_capacity(declared.len() + 1);
        let inherited: Vec<(String, ExecGroup)> = declared
            .iter()
            .filter(|(name, _)| name.as_str() != DEFAULT_EXEC_GROUP_NAME)
            .map(|(name, group)| (name.clone(), group.inherit(&default)))
            .collect();
        groups.insert(DEFAULT_EXEC_GROUP_NAME.to_owned(), default);
        for (name, group) in inherited {
            groups.insert(name, group);
        }
        ExecGroupCollection { groups }
    }

    pub fn get(&self, name: &str) -> Option<&ExecGroup> {
        self.groups.get(name)
    }

    pub fn default_group(&self) -> Option<&ExecGroup> {
        self.groups.get(DEFAULT_EXEC_GROUP_NAME)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExecGroup)> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use starlark_map::small_map::SmallMap;
    use strata_core::target::label::TargetLabel;

    use crate::exec_group::ExecGroup;
    use crate::exec_group::ExecGroupCollection;
    use crate::exec_group::DEFAULT_EXEC_GROUP_NAME;

    #[test]
    fn test_inheritance() {
        let cc = TargetLabel::testing_parse("//cpp:toolchain_type");
        let py = TargetLabel::testing_parse("//py:toolchain_type");
        let linux = TargetLabel::testing_parse("//os:linux");
        let default = ExecGroup::new([cc.clone()], [linux.clone()]);
        let mut declared = SmallMap::new();
        declared.insert(
            "link".to_owned(),
            ExecGroup::new([py.clone()], []).copy_from_default(),
        );
        declared.insert("test".to_owned(), ExecGroup::new([py.clone()], []));
        let groups = ExecGroupCollection::new(default, &declared);

        assert_eq!(
            vec![DEFAULT_EXEC_GROUP_NAME, "link", "test"],
            groups.iter().map(|(n, _)| n).collect::<Vec<_>>()
        );
        let link = groups.get("link").unwrap();
        assert!(link.required_toolchains().contains(&cc));
        assert!(link.required_toolchains().contains(&py));
        assert!(link.exec_compatible_with().contains(&linux));
        let test = groups.get("test").unwrap();
        assert!(!test.required_toolchains().contains(&cc));
    }
}
