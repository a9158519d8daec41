/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::collections::BTreeSet;
use std::sync::Arc;

use allocative::Allocative;
use starlark_map::small_map::SmallMap;
use strata_core::target::label::TargetLabel;
use strata_error::ErrorTag;
use strata_error::ProvidesTag;

use crate::attrs::attr::Attribute;
use crate::attrs::coerced_attr::CoercedAttr;
use crate::exec_group::ExecGroup;

/// Target-level execution constraints, unioned with the rule's.
pub const EXEC_COMPATIBLE_WITH_ATTR: &str = "exec_compatible_with";

#[derive(Debug, thiserror::Error)]
enum RuleClassError {
    #[error("Rule `{0}` declares attribute `{1}` twice")]
    DuplicateAttribute(String, String),
}

impl ProvidesTag for RuleClassError {
    fn error_tag(&self) -> ErrorTag {
        ErrorTag::Input
    }
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Allocative,
    derive_more::Display
)]
pub struct RuleClassId(String);

impl RuleClassId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Metadata of a rule: what it needs from toolchain resolution and which attributes it has.
#[derive(Debug, PartialEq, Eq, Allocative)]
pub struct RuleClass {
    id: RuleClassId,
    attributes: Vec<Attribute>,
    required_toolchains: BTreeSet<TargetLabel>,
    exec_compatible_with: BTreeSet<TargetLabel>,
    exec_groups: SmallMap<String, ExecGroup>,
    uses_toolchain_resolution: bool,
    use_toolchain_transition: bool,
    configurable: bool,
    required_fragments: BTreeSet<String>,
}

impl RuleClass {
    pub fn builder(id: &str) -> RuleClassBuilder {
        RuleClassBuilder {
            class: RuleClass {
                id: RuleClassId(id.to_owned()),
                attributes: vec![
                    Attribute::value(EXEC_COMPATIBLE_WITH_ATTR, CoercedAttr::List(Vec::new()))
                        .nonconfigurable(),
                ],
                required_toolchains: BTreeSet::new(),
                exec_compatible_with: BTreeSet::new(),
                exec_groups: SmallMap::new(),
                uses_toolchain_resolution: true,
                use_toolchain_transition: false,
                configurable: true,
                required_fragments: BTreeSet::new(),
            },
        }
    }

    pub fn id(&self) -> &RuleClassId {
        &self.id
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    pub fn required_toolchains(&self) -> &BTreeSet<TargetLabel> {
        &self.required_toolchains
    }

    pub fn exec_compatible_with(&self) -> &BTreeSet<TargetLabel> {
        &self.exec_compatible_with
    }

    pub fn exec_groups(&self) -> &SmallMap<String, ExecGroup> {
        &self.exec_groups
    }

    pub fn uses_toolchain_resolution(&self) -> bool {
        self.uses_toolchain_resolution
    }

    /// Resolved toolchains become dependencies of the target, analyzed on the execution
    /// platform of their exec group.
    pub fn use_toolchain_transition(&self) -> bool {
        self.use_toolchain_transition
    }

    pub fn is_configurable(&self) -> bool {
        self.configurable
    }

    pub fn required_fragments(&self) -> &BTreeSet<String> {
        &self.required_fragments
    }
}

pub struct RuleClassBuilder {
    class: RuleClass,
}

impl RuleClassBuilder {
    pub fn attribute(mut self, attr: Attribute) -> Self {
        self.class.attributes.push(attr);
        self
    }

    pub fn required_toolchain(mut self, toolchain_type: TargetLabel) -> Self {
        self.class.required_toolchains.insert(toolchain_type);
        self
    }

    pub fn exec_compatible_with(mut self, constraint: TargetLabel) -> Self {
        self.class.exec_compatible_with.insert(constraint);
        self
    }

    pub fn exec_group(mut self, name: &str, group: ExecGroup) -> Self {
        self.class.exec_groups.insert(name.to_owned(), group);
        self
    }

    pub fn uses_toolchain_resolution(mut self, value: bool) -> Self {
        self.class.uses_toolchain_resolution = value;
        self
    }

    pub fn use_toolchain_transition(mut self, value: bool) -> Self {
        self.class.use_toolchain_transition = value;
        self
    }

    pub fn configurable(mut self, value: bool) -> Self {
        self.class.configurable = value;
        self
    }

    pub fn required_fragment(mut self, fragment: &str) -> Self {
        self.class.required_fragments.insert(fragment.to_owned());
        self
    }

    pub fn build(self) -> strata_error::Result<Arc<RuleClass>> {
        let attrs = &self.class.attributes;
        for (i, attr) in attrs.iter().enumerate() {
            if attrs[..i].iter().any(|a| a.name() == attr.name()) {
                return Err(RuleClassError::DuplicateAttribute(
                    self.class.id.to_string(),
                    attr.name().to_owned(),
                )
                .into());
            }
        }
        Ok(Arc::new(self.class))
    }
}

#[cfg(test)]
mod tests {
    use crate::attrs::attr::Attribute;
    use crate::rule::RuleClass;
    use crate::rule::EXEC_COMPATIBLE_WITH_ATTR;

    #[test]
    fn test_builder() {
        let rule = RuleClass::builder("cc_library")
            .attribute(Attribute::dep("deps"))
            .required_fragment("cpp")
            .build()
            .unwrap();
        assert!(rule.attribute("deps").is_some());
        assert!(rule.attribute(EXEC_COMPATIBLE_WITH_ATTR).is_some());
        assert!(rule.uses_toolchain_resolution());
        assert!(rule.is_configurable());
    }

    #[test]
    fn test_duplicate_attribute() {
        let e = RuleClass::builder("cc_library")
            .attribute(Attribute::dep("deps"))
            .attribute(Attribute::dep("deps"))
            .build()
            .unwrap_err();
        assert_eq!(
            "Rule `cc_library` declares attribute `deps` twice",
            e.to_string()
        );
    }
}
