/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The interface between the evaluator and rule implementations.

use std::sync::Arc;

use dupe::Dupe;
use starlark_map::small_map::SmallMap;
use strata_core::configuration::data::Configuration;
use strata_core::target::label::TargetLabel;
use strata_dice::DiceComputations;
use strata_dice::Key;
use strata_dice::Suspend;
use strata_error::ErrorTag;
use strata_node::aspect::AspectClass;
use strata_node::aspect::AspectId;
use strata_node::attrs::configured_attr::ConfiguredAttr;
use strata_node::exec_group::ExecGroupCollection;
use strata_node::exec_group::DEFAULT_EXEC_GROUP_NAME;
use strata_node::nodes::target_node::TargetNode;

use crate::conditions::configure_attr;
use crate::conditions::ConfigConditions;
use crate::dependencies::DependencyBundle;
use crate::diagnostics::Event;
use crate::diagnostics::StoredEvents;
use crate::toolchain::ResolvedToolchainContext;
use crate::toolchain::ToolchainCollection;
use crate::value::ConfiguredTargetAndData;
use crate::value::Providers;

/// How a rule implementation stops early.
#[derive(Debug)]
pub enum Unwind {
    /// A value requested through the context is not computed yet.
    Suspend(Suspend),
    Error(strata_error::Error),
}

impl From<Suspend> for Unwind {
    fn from(s: Suspend) -> Self {
        Unwind::Suspend(s)
    }
}

impl From<strata_error::Error> for Unwind {
    fn from(e: strata_error::Error) -> Self {
        Unwind::Error(e)
    }
}

pub enum RuleOutput {
    Providers(Providers),
    /// The target stands for another target, which must be one of its dependencies.
    Alias(TargetLabel),
}

/// What a rule implementation sees of the target being analyzed.
pub struct RuleContext<'a> {
    pub(crate) target: &'a TargetNode,
    pub(crate) configuration: Option<&'a Configuration>,
    pub(crate) conditions: &'a ConfigConditions,
    pub(crate) deps: &'a DependencyBundle,
    pub(crate) toolchains: Option<&'a ToolchainCollection<ResolvedToolchainContext>>,
    pub(crate) exec_groups: &'a ExecGroupCollection,
    pub(crate) events: &'a mut StoredEvents,
    pub(crate) dice: &'a mut DiceComputations,
}

impl RuleContext<'_> {
    pub fn label(&self) -> &TargetLabel {
        self.target.label()
    }

    pub fn target(&self) -> &TargetNode {
        self.target
    }

    pub fn configuration(&self) -> Option<&Configuration> {
        self.configuration
    }

    /// The value of an attribute with `select()` resolved.
    pub fn attr(&self, name: &str) -> strata_error::Result<ConfiguredAttr> {
        let value = self.target.attr(name).ok_or_else(|| {
            strata_error::strata_error!(
                ErrorTag::Input,
                "`{}` has no attribute `{}`",
                self.target.label(),
                name
            )
        })?;
        configure_attr(value, self.conditions, self.configuration)
    }

    /// Values of the dependencies declared by an attribute.
    pub fn deps<'a>(&'a self, attr: &'a str) -> impl Iterator<Item = &'a ConfiguredTargetAndData> {
        self.deps.attr(attr)
    }

    pub fn dependencies(&self) -> &DependencyBundle {
        self.deps
    }

    pub fn exec_groups(&self) -> &ExecGroupCollection {
        self.exec_groups
    }

    pub fn toolchain_context(&self, exec_group: &str) -> Option<&ResolvedToolchainContext> {
        self.toolchains?.get(exec_group)
    }

    /// The toolchain resolved for a type in the default exec group.
    pub fn toolchain(&self, toolchain_type: &TargetLabel) -> Option<&ConfiguredTargetAndData> {
        self.toolchain_context(DEFAULT_EXEC_GROUP_NAME)?
            .toolchain(toolchain_type)
    }

    pub fn report_error(&mut self, message: impl Into<String>) {
        let label = self.target.label().dupe();
        self.events.handle(Event::error(Some(label), message));
    }

    pub fn report_warning(&mut self, message: impl Into<String>) {
        let label = self.target.label().dupe();
        self.events.handle(Event::warning(Some(label), message));
    }

    /// Requests another value from the environment.
    pub fn compute<K: Key>(&mut self, key: &K) -> Result<K::Value, Unwind> {
        Ok(self.dice.compute(key)?)
    }
}

/// What an aspect implementation sees of the target it is applied to.
pub struct AspectContext<'a> {
    pub(crate) aspect: &'a AspectClass,
    pub(crate) base: &'a ConfiguredTargetAndData,
    pub(crate) deps: &'a DependencyBundle,
    pub(crate) events: &'a mut StoredEvents,
    pub(crate) dice: &'a mut DiceComputations,
}

impl AspectContext<'_> {
    pub fn aspect(&self) -> &AspectClass {
        self.aspect
    }

    pub fn base(&self) -> &ConfiguredTargetAndData {
        self.base
    }

    /// Values of the dependencies declared by an attribute of the aspect.
    pub fn deps<'a>(&'a self, attr: &'a str) -> impl Iterator<Item = &'a ConfiguredTargetAndData> {
        self.deps.aspect_attr(self.aspect.id(), attr)
    }

    pub fn report_error(&mut self, message: impl Into<String>) {
        let label = self.base.label().dupe();
        self.events.handle(Event::error(Some(label), message));
    }

    pub fn compute<K: Key>(&mut self, key: &K) -> Result<K::Value, Unwind> {
        Ok(self.dice.compute(key)?)
    }
}

pub trait RuleImplementation: Send + Sync {
    fn build(&self, ctx: &mut RuleContext<'_>) -> Result<RuleOutput, Unwind>;
}

pub trait AspectImplementation: Send + Sync {
    fn build(&self, ctx: &mut AspectContext<'_>) -> Result<Providers, Unwind>;
}

/// Implementations of rules and aspects, by id.
#[derive(Default, Clone)]
pub struct RuleRegistry {
    rules: SmallMap<String, Arc<dyn RuleImplementation>>,
    aspects: SmallMap<AspectId, Arc<dyn AspectImplementation>>,
}

impl RuleRegistry {
    pub fn new() -> RuleRegistry {
        RuleRegistry::default()
    }

    /// A registry with `config_setting` and `alias`.
    pub fn with_builtins() -> RuleRegistry {
        let mut registry = RuleRegistry::new();
        crate::builtin_rules::register_builtin_rules(&mut registry);
        registry
    }

    pub fn register_rule(&mut self, id: &str, implementation: Arc<dyn RuleImplementation>) {
        self.rules.insert(id.to_owned(), implementation);
    }

    pub fn register_aspect(
        &mut self,
        id: &AspectId,
        implementation: Arc<dyn AspectImplementation>,
    ) {
        self.aspects.insert(id.clone(), implementation);
    }

    pub fn rule(&self, id: &str) -> Option<&Arc<dyn RuleImplementation>> {
        self.rules.get(id)
    }

    pub fn aspect(&self, id: &AspectId) -> Option<&Arc<dyn AspectImplementation>> {
        self.aspects.get(id)
    }
}
