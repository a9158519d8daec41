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
use dupe::Dupe;
use starlark_map::small_map::SmallMap;
use strata_core::target::label::TargetLabel;
use strata_error::ErrorTag;
use strata_error::ProvidesTag;

use crate::attrs::attr::AttrKind;
use crate::attrs::attr::Attribute;
use crate::attrs::coerced_attr::CoercedAttr;
use crate::attrs::configured_attr::ConfiguredAttr;
use crate::rule::RuleClass;
use crate::rule::EXEC_COMPATIBLE_WITH_ATTR;

#[derive(Debug, thiserror::Error)]
enum TargetNodeError {
    #[error("Target `{0}` sets unknown attribute `{1}`")]
    UnknownAttribute(TargetLabel, String),
    #[error("Attribute `{1}` of `{0}` is not configurable, `select()` is not allowed")]
    SelectInNonConfigurable(TargetLabel, String),
    #[error("Attribute `{1}` of `{0}` must be a list of labels")]
    NotLabelList(TargetLabel, String),
}

impl ProvidesTag for TargetNodeError {
    fn error_tag(&self) -> ErrorTag {
        ErrorTag::Input
    }
}

#[derive(Debug, PartialEq, Eq, Allocative)]
pub enum TargetKind {
    Rule(Arc<RuleClass>),
    /// A file of the package, used as a dependency. Never configured.
    SourceFile,
}

#[derive(Debug, PartialEq, Eq, Allocative)]
struct TargetNodeData {
    label: TargetLabel,
    kind: TargetKind,
    /// Explicitly set attributes, in rule declaration order.
    attrs: SmallMap<String, CoercedAttr>,
}

/// A target as loaded from its package.
#[derive(Debug, Clone, Dupe, PartialEq, Eq, Allocative)]
pub struct TargetNode(Arc<TargetNodeData>);

impl TargetNode {
    pub fn new(
        label: TargetLabel,
        rule: Arc<RuleClass>,
        attrs: Vec<(&str, CoercedAttr)>,
    ) -> strata_error::Result<TargetNode> {
        let mut values: SmallMap<String, CoercedAttr> = SmallMap::new();
        for (name, value) in attrs {
            let Some(attr) = rule.attribute(name) else {
                return Err(TargetNodeError::UnknownAttribute(label, name.to_owned()).into());
            };
            if !attr.is_configurable() {
                let mut keys = Vec::new();
                value.select_keys(&mut keys);
                if !keys.is_empty() {
                    return Err(
                        TargetNodeError::SelectInNonConfigurable(label, name.to_owned()).into(),
                    );
                }
            }
            values.insert(name.to_owned(), value);
        }
        Ok(TargetNode(Arc::new(TargetNodeData {
            label,
            kind: TargetKind::Rule(rule),
            attrs: values,
        })))
    }

    pub fn source_file(label: TargetLabel) -> TargetNode {
        TargetNode(Arc::new(TargetNodeData {
            label,
            kind: TargetKind::SourceFile,
            attrs: SmallMap::new(),
        }))
    }

    pub fn label(&self) -> &TargetLabel {
        &self.0.label
    }

    pub fn kind(&self) -> &TargetKind {
        &self.0.kind
    }

    pub fn rule(&self) -> Option<&Arc<RuleClass>> {
        match &self.0.kind {
            TargetKind::Rule(rule) => Some(rule),
            TargetKind::SourceFile => None,
        }
    }

    /// Whether the target is analyzed in a configuration.
    pub fn is_configurable(&self) -> bool {
        match &self.0.kind {
            TargetKind::Rule(rule) => rule.is_configurable(),
            TargetKind::SourceFile => false,
        }
    }

    /// The value of an attribute, falling back to the rule default.
    pub fn attr(&self, name: &str) -> Option<&CoercedAttr> {
        if let Some(v) = self.0.attrs.get(name) {
            return Some(v);
        }
        self.rule()?.attribute(name).map(Attribute::default)
    }

    /// Every attribute of the rule with its value.
    pub fn attrs(&self) -> impl Iterator<Item = (&Attribute, &CoercedAttr)> {
        self.rule()
            .into_iter()
            .flat_map(|rule| rule.attributes())
            .map(|attr| {
                let value = self.0.attrs.get(attr.name()).unwrap_or(attr.default());
                (attr, value)
            })
    }

    /// Labels of all `select()` conditions used by the attributes, in first-use order.
    pub fn select_keys(&self) -> Vec<TargetLabel> {
        let mut keys = Vec::new();
        for (_, value) in self.attrs() {
            value.select_keys(&mut keys);
        }
        keys
    }

    /// Execution constraints declared on the target itself.
    pub fn exec_compatible_with(&self) -> strata_error::Result<Vec<TargetLabel>> {
        let Some(value) = self.attr(EXEC_COMPATIBLE_WITH_ATTR) else {
            return Ok(Vec::new());
        };
        match value.as_unconfigured() {
            Some(ConfiguredAttr::List(items)) => items
                .iter()
                .map(|item| {
                    item.as_label().map(|l| l.dupe()).ok_or_else(|| {
                        TargetNodeError::NotLabelList(
                            self.label().dupe(),
                            EXEC_COMPATIBLE_WITH_ATTR.to_owned(),
                        )
                        .into()
                    })
                })
                .collect(),
            _ => Err(TargetNodeError::NotLabelList(
                self.label().dupe(),
                EXEC_COMPATIBLE_WITH_ATTR.to_owned(),
            )
            .into()),
        }
    }

    /// Labels of dependency attributes, across every `select()` branch.
    pub fn unconfigured_deps(&self) -> Vec<TargetLabel> {
        let mut deps = Vec::new();
        for (attr, value) in self.attrs() {
            if attr.kind() == AttrKind::Dep {
                value.all_labels(&mut deps);
            }
        }
        deps
    }

    pub fn required_fragments(&self) -> BTreeSet<String> {
        match self.rule() {
            Some(rule) => rule.required_fragments().clone(),
            None => BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use dupe::Dupe;
    use strata_core::target::label::TargetLabel;

    use crate::attrs::attr::Attribute;
    use crate::attrs::coerced_attr::CoercedAttr;
    use crate::attrs::coerced_attr::CoercedSelector;
    use crate::nodes::target_node::TargetNode;
    use crate::rule::RuleClass;
    use crate::rule::EXEC_COMPATIBLE_WITH_ATTR;

    #[test]
    fn test_attrs_and_keys() {
        let rule = RuleClass::builder("cc_binary")
            .attribute(Attribute::dep("deps"))
            .attribute(Attribute::value("copts", CoercedAttr::List(Vec::new())))
            .build()
            .unwrap();
        let cond = TargetLabel::testing_parse("//c:opt");
        let util = TargetLabel::testing_parse("//lib:util");
        let fast = TargetLabel::testing_parse("//lib:fast");
        let node = TargetNode::new(
            TargetLabel::testing_parse("//app:bin"),
            rule,
            vec![(
                "deps",
                CoercedAttr::Concat(vec![
                    CoercedAttr::label_list(&[util.dupe()]),
                    CoercedAttr::Selector(Box::new(
                        CoercedSelector::new(
                            vec![(cond.dupe(), CoercedAttr::label_list(&[fast.dupe()]))],
                            Some(CoercedAttr::label_list(&[])),
                        )
                        .unwrap(),
                    )),
                ]),
            )],
        )
        .unwrap();
        assert!(node.is_configurable());
        assert_eq!(vec![cond], node.select_keys());
        assert_eq!(vec![util, fast], node.unconfigured_deps());
        assert_eq!(Some(&CoercedAttr::List(Vec::new())), node.attr("copts"));
        assert!(node.exec_compatible_with().unwrap().is_empty());
    }

    #[test]
    fn test_errors() {
        let rule = RuleClass::builder("cc_binary").build().unwrap();
        let label = TargetLabel::testing_parse("//app:bin");
        assert!(
            TargetNode::new(label.dupe(), rule.dupe(), vec![("srcs", CoercedAttr::None)]).is_err()
        );
        let select = CoercedAttr::Selector(Box::new(
            CoercedSelector::new(Vec::new(), Some(CoercedAttr::List(Vec::new()))).unwrap(),
        ));
        // An empty select has no keys, so it is accepted even on a non-configurable attribute.
        assert_matches!(
            TargetNode::new(label, rule, vec![(EXEC_COMPATIBLE_WITH_ATTR, select)]),
            Ok(_)
        );
    }

    #[test]
    fn test_source_file() {
        let node = TargetNode::source_file(TargetLabel::testing_parse("//app:main.cc"));
        assert!(!node.is_configurable());
        assert!(node.select_keys().is_empty());
    }
}
