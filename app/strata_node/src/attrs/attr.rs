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
use strata_core::configuration::transition::TransitionRef;

use crate::aspect::AspectClass;
use crate::attrs::coerced_attr::CoercedAttr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Allocative)]
pub enum AttrKind {
    /// Labels in the value are dependency edges.
    Dep,
    /// Plain data, labels in it are not followed.
    Value,
}

/// How the configuration of a dependency edge is derived from the configuration of the
/// node that declares it.
#[derive(Debug, Clone, PartialEq, Eq, Allocative)]
pub enum AttrTransition {
    /// Same configuration as the node.
    Target,
    /// Configuration of the execution platform of the given exec group, the default group
    /// if none.
    Exec { exec_group: Option<String> },
    /// No configuration.
    Null,
    Custom(TransitionRef),
}

/// Declaration of one attribute of a rule or aspect.
#[derive(Debug, Clone, PartialEq, Eq, Allocative)]
pub struct Attribute {
    name: String,
    kind: AttrKind,
    default: CoercedAttr,
    transition: AttrTransition,
    aspects: Vec<Arc<AspectClass>>,
    configurable: bool,
}

impl Attribute {
    /// A label or label list attribute, empty by default.
    pub fn dep(name: &str) -> Attribute {
        Attribute {
            name: name.to_owned(),
            kind: AttrKind::Dep,
            default: CoercedAttr::List(Vec::new()),
            transition: AttrTransition::Target,
            aspects: Vec::new(),
            configurable: true,
        }
    }

    pub fn value(name: &str, default: CoercedAttr) -> Attribute {
        Attribute {
            name: name.to_owned(),
            kind: AttrKind::Value,
            default,
            transition: AttrTransition::Target,
            aspects: Vec::new(),
            configurable: true,
        }
    }

    pub fn with_default(mut self, default: CoercedAttr) -> Self {
        self.default = default;
        self
    }

    pub fn with_transition(mut self, transition: AttrTransition) -> Self {
        self.transition = transition;
        self
    }

    pub fn with_aspect(mut self, aspect: Arc<AspectClass>) -> Self {
        self.aspects.push(aspect);
        self
    }

    pub fn nonconfigurable(mut self) -> Self {
        self.configurable = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AttrKind {
        self.kind
    }

    pub fn default(&self) -> &CoercedAttr {
        &self.default
    }

    pub fn transition(&self) -> &AttrTransition {
        &self.transition
    }

    pub fn aspects(&self) -> &[Arc<AspectClass>] {
        &self.aspects
    }

    pub fn is_configurable(&self) -> bool {
        self.configurable
    }
}
