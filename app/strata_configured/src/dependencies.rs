/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Computes the dependency edges of a target, their configurations, and their values.

use std::collections::HashMap;
use std::sync::Arc;

use dupe::Dupe;
use itertools::Itertools;
use strata_core::configuration::data::Configuration;
use strata_core::configuration::data::ConfigurationKey;
use strata_core::configuration::options::BuildOptions;
use strata_core::configuration::transition::ExecTransition;
use strata_core::configuration::transition::TransitionRef;
use strata_core::configuration::transition::TransitionResult;
use strata_core::target::label::PackageLabel;
use strata_core::target::label::TargetLabel;
use strata_dice::DiceComputations;
use strata_error::ErrorTag;
use strata_node::aspect::AspectClass;
use strata_node::aspect::AspectId;
use strata_node::attrs::attr::AttrKind;
use strata_node::attrs::attr::AttrTransition;
use strata_node::attrs::attr::Attribute;
use strata_node::attrs::coerced_attr::CoercedAttr;
use strata_node::exec_group::DEFAULT_EXEC_GROUP_NAME;
use strata_node::nodes::target_node::TargetNode;
use strata_node::package::Package;

use crate::alias::resolve_configured_target_dependencies;
use crate::alias::TransitivePackages;
use crate::aspect::AspectKey;
use crate::conditions::configure_attr;
use crate::conditions::ConfigConditions;
use crate::diagnostics::Event;
use crate::diagnostics::StoredEvents;
use crate::errors::as_creation_error;
use crate::errors::Abort;
use crate::errors::AnalysisFailure;
use crate::errors::Cause;
use crate::errors::ConfiguredValueCreationError;
use crate::errors::RootCauses;
use crate::keys::ConfigurationLookupKey;
use crate::keys::ConfiguredTargetKey;
use crate::keys::PackageKey;
use crate::keys::TransitiveFragmentsKey;
use crate::toolchain::ComputedToolchainContexts;
use crate::value::ConfiguredTargetAndData;

/// Why a dependency edge exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    Attribute { attr: String },
    AspectAttribute { aspect: AspectId, attr: String },
    Toolchain { exec_group: String },
    ConfigCondition,
}

/// A dependency edge with its configuration resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    kind: DependencyKind,
    label: TargetLabel,
    configuration: Option<Configuration>,
    exec_platform: Option<TargetLabel>,
    /// Set for edges produced by a split transition.
    transition_key: Option<String>,
    aspects: Vec<Arc<AspectClass>>,
}

impl Dependency {
    pub fn new(
        kind: DependencyKind,
        label: TargetLabel,
        configuration: Option<Configuration>,
    ) -> Dependency {
        Dependency {
            kind,
            label,
            configuration,
            exec_platform: None,
            transition_key: None,
            aspects: Vec::new(),
        }
    }

    pub fn kind(&self) -> &DependencyKind {
        &self.kind
    }

    pub fn label(&self) -> &TargetLabel {
        &self.label
    }

    pub fn configuration(&self) -> Option<&Configuration> {
        self.configuration.as_ref()
    }

    pub fn cfg(&self) -> Option<&ConfigurationKey> {
        self.configuration.as_ref().map(Configuration::key)
    }

    pub fn transition_key(&self) -> Option<&str> {
        self.transition_key.as_deref()
    }

    pub fn aspects(&self) -> &[Arc<AspectClass>] {
        &self.aspects
    }

    pub fn key(&self) -> ConfiguredTargetKey {
        ConfiguredTargetKey::new(self.label.dupe(), self.cfg().map(Dupe::dupe))
            .with_exec_platform(self.exec_platform.dupe())
    }
}

/// Values of the dependencies of a target, in edge order.
#[derive(Debug, Clone, Default)]
pub struct DependencyBundle {
    entries: Vec<(Dependency, ConfiguredTargetAndData)>,
}

impl DependencyBundle {
    pub fn iter(&self) -> impl Iterator<Item = (&Dependency, &ConfiguredTargetAndData)> {
        self.entries.iter().map(|(d, v)| (d, v))
    }

    /// Values of the edges declared by an attribute.
    pub fn attr<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ConfiguredTargetAndData> {
        self.entries.iter().filter_map(move |(d, v)| match &d.kind {
            DependencyKind::Attribute { attr } if attr == name => Some(v),
            _ => None,
        })
    }

    pub fn aspect_attr<'a>(
        &'a self,
        aspect: &'a AspectId,
        name: &'a str,
    ) -> impl Iterator<Item = &'a ConfiguredTargetAndData> {
        self.entries.iter().filter_map(move |(d, v)| match &d.kind {
            DependencyKind::AspectAttribute { aspect: a, attr } if a == aspect && attr == name => {
                Some(v)
            }
            _ => None,
        })
    }

    pub fn keys(&self) -> Vec<ConfiguredTargetKey> {
        self.entries.iter().map(|(d, _)| d.key()).unique().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An edge before its configuration is known.
struct DependencyEdge {
    kind: DependencyKind,
    label: TargetLabel,
    transition: TransitionRef,
    exec_platform: Option<TargetLabel>,
    aspects: Vec<Arc<AspectClass>>,
}

pub(crate) struct DependencyContext<'a> {
    pub(crate) target: &'a TargetNode,
    pub(crate) configuration: Option<&'a Configuration>,
    pub(crate) conditions: &'a ConfigConditions,
    pub(crate) toolchains: Option<&'a ComputedToolchainContexts>,
    /// When set, only the attributes of this aspect are followed.
    pub(crate) aspect: Option<&'a AspectClass>,
}

impl DependencyContext<'_> {
    fn creation_error(&self, code: ErrorTag, message: String) -> Abort {
        ConfiguredValueCreationError::of_target(
            self.target.label().dupe(),
            self.configuration.map(|c| c.key().dupe()),
            code,
            message,
        )
        .into()
    }

    fn attr_transition(&self, attr: &Attribute) -> Result<TransitionRef, Abort> {
        Ok(match attr.transition() {
            AttrTransition::Target => TransitionRef::no_transition(),
            AttrTransition::Null => TransitionRef::null(),
            AttrTransition::Custom(t) => t.dupe(),
            AttrTransition::Exec { exec_group } => {
                let group = exec_group.as_deref().unwrap_or(DEFAULT_EXEC_GROUP_NAME);
                if let Some(computed) = self.toolchains {
                    if computed.exec_groups.get(group).is_none() {
                        return Err(self.creation_error(
                            ErrorTag::InvalidExecGroup,
                            format!(
                                "Attribute `{}` of `{}` uses undeclared exec group `{}`",
                                attr.name(),
                                self.target.label(),
                                group
                            ),
                        ));
                    }
                }
                let platform = self
                    .toolchains
                    .and_then(|c| c.contexts.as_ref())
                    .and_then(|c| c.get(group))
                    .and_then(|c| c.execution_platform());
                match platform {
                    Some(platform) => TransitionRef::new(ExecTransition::new(platform.dupe())),
                    None => TransitionRef::toolchain_trimming(),
                }
            }
        })
    }

    fn edge(
        &self,
        attr: &Attribute,
        kind: DependencyKind,
        label: TargetLabel,
    ) -> Result<DependencyEdge, Abort> {
        Ok(DependencyEdge {
            kind,
            label,
            transition: self.attr_transition(attr)?,
            exec_platform: None,
            aspects: attr.aspects().to_vec(),
        })
    }

    /// Edges from the attributes of the target (or of the aspect) and from its toolchains.
    fn collect_edges(&self) -> Result<Vec<DependencyEdge>, Abort> {
        let mut edges = Vec::new();
        let configure = |attr: &Attribute, value: &CoercedAttr| {
            configure_attr(value, self.conditions, self.configuration).map_err(|e| {
                self.creation_error(
                    e.best_tag(),
                    format!(
                        "Error configuring attribute `{}` of `{}`: {}",
                        attr.name(),
                        self.target.label(),
                        e
                    ),
                )
            })
        };

        match self.aspect {
            None => {
                for (attr, value) in self.target.attrs() {
                    if attr.kind() != AttrKind::Dep {
                        continue;
                    }
                    for label in configure(attr, value)?.labels() {
                        let kind = DependencyKind::Attribute {
                            attr: attr.name().to_owned(),
                        };
                        edges.push(self.edge(attr, kind, label)?);
                    }
                }
            }
            Some(aspect) => {
                for attr in aspect.attributes() {
                    if attr.kind() != AttrKind::Dep {
                        continue;
                    }
                    for label in configure(attr, attr.default())?.labels() {
                        let kind = DependencyKind::AspectAttribute {
                            aspect: aspect.id().clone(),
                            attr: attr.name().to_owned(),
                        };
                        let mut edge = self.edge(attr, kind, label)?;
                        edge.aspects.clear();
                        edges.push(edge);
                    }
                }
            }
        }

        let use_toolchain_transition = self
            .target
            .rule()
            .map_or(false, |r| r.use_toolchain_transition());
        if let Some(contexts) = self.toolchains.and_then(|c| c.contexts.as_ref()) {
            for (group, context) in contexts.iter() {
                for label in context.resolved_toolchain_labels() {
                    let (transition, exec_platform) = if use_toolchain_transition {
                        (
                            TransitionRef::toolchain_trimming(),
                            context.execution_platform().map(Dupe::dupe),
                        )
                    } else {
                        (TransitionRef::no_transition(), None)
                    };
                    edges.push(DependencyEdge {
                        kind: DependencyKind::Toolchain {
                            exec_group: group.to_owned(),
                        },
                        label: label.dupe(),
                        transition,
                        exec_platform,
                        aspects: Vec::new(),
                    });
                }
            }
        }
        Ok(edges)
    }
}

/// Loads the target nodes of the edges. Edges whose target cannot be loaded are reported and
/// recorded as root causes.
fn dependent_node_map(
    ctx: &mut DiceComputations,
    dcx: &DependencyContext<'_>,
    edges: Vec<DependencyEdge>,
    transitive_packages: &mut TransitivePackages,
    causes: &mut RootCauses,
    events: &mut StoredEvents,
) -> Result<Vec<(DependencyEdge, TargetNode)>, Abort> {
    let package_keys: Vec<PackageKey> = edges
        .iter()
        .map(|e| PackageKey(e.label.pkg().dupe()))
        .unique()
        .collect();
    let packages: HashMap<PackageLabel, strata_error::Result<Package>> = package_keys
        .iter()
        .map(|k| k.0.dupe())
        .zip(ctx.compute_many(&package_keys)?)
        .collect();

    let from = dcx.target.label();
    let mut out = Vec::with_capacity(edges.len());
    for edge in edges {
        let found = match packages.get(edge.label.pkg()) {
            Some(Ok(package)) => {
                transitive_packages.add(package.label());
                package
                    .get_target(edge.label.name())
                    .map(|t| t.dupe())
                    .map_err(strata_error::Error::from)
            }
            Some(Err(e)) => Err(e.dupe()),
            None => Err(strata_error::internal_error!(
                "package of `{}` was not requested",
                edge.label
            )),
        };
        match found {
            Ok(target) => out.push((edge, target)),
            Err(e) => {
                events.handle(Event::error(Some(from.dupe()), e.to_string()));
                causes.add(Cause::new(
                    edge.label.dupe(),
                    None,
                    e.best_tag(),
                    e.to_string(),
                ));
            }
        }
    }
    Ok(out)
}

/// Applies the edge transitions and trims the resulting configurations to the fragments the
/// dependency needs.
fn resolve_configurations(
    ctx: &mut DiceComputations,
    dcx: &DependencyContext<'_>,
    nodes: Vec<(DependencyEdge, TargetNode)>,
) -> Result<Vec<Dependency>, Abort> {
    let Some(parent) = dcx.configuration else {
        return Ok(nodes
            .into_iter()
            .map(|(edge, _)| Dependency {
                kind: edge.kind,
                label: edge.label,
                configuration: None,
                exec_platform: edge.exec_platform,
                transition_key: None,
                aspects: edge.aspects,
            })
            .collect());
    };

    let fragment_keys: Vec<TransitiveFragmentsKey> = nodes
        .iter()
        .filter(|(_, target)| target.is_configurable())
        .map(|(edge, _)| TransitiveFragmentsKey(edge.label.dupe()))
        .unique()
        .collect();
    let fragments: HashMap<TargetLabel, _> = fragment_keys
        .iter()
        .map(|k| k.0.dupe())
        .zip(ctx.compute_many(&fragment_keys)?)
        .collect();

    let mut pending: Vec<(DependencyEdge, Option<String>, Option<ConfigurationKey>)> = Vec::new();
    for (edge, target) in nodes {
        if !target.is_configurable() {
            pending.push((edge, None, None));
            continue;
        }
        let result = edge.transition.apply(parent.options()).map_err(|e| {
            dcx.creation_error(
                ErrorTag::Transition,
                format!(
                    "Error applying transition `{}` to `{}`: {}",
                    edge.transition.id(),
                    edge.label,
                    e
                ),
            )
        })?;
        let trim = |options: BuildOptions| {
            match fragments.get(&edge.label) {
                Some(Ok(needed)) => ConfigurationKey::new(options.trim(needed)),
                _ => ConfigurationKey::new(options),
            }
        };
        match result {
            TransitionResult::NoConfig => pending.push((edge, None, None)),
            TransitionResult::Patched(options) => {
                let cfg = trim(options);
                pending.push((edge, None, Some(cfg)));
            }
            TransitionResult::Split(splits) => {
                let splits: Vec<(String, ConfigurationKey)> =
                    splits.into_iter().map(|(k, o)| (k, trim(o))).collect();
                for (split_key, cfg) in splits {
                    let split_edge = DependencyEdge {
                        kind: edge.kind.clone(),
                        label: edge.label.dupe(),
                        transition: edge.transition.dupe(),
                        exec_platform: edge.exec_platform.dupe(),
                        aspects: edge.aspects.clone(),
                    };
                    pending.push((split_edge, Some(split_key), Some(cfg)));
                }
            }
        }
    }

    let config_keys: Vec<ConfigurationLookupKey> = pending
        .iter()
        .filter_map(|(_, _, cfg)| cfg.as_ref().map(|c| ConfigurationLookupKey(c.dupe())))
        .unique()
        .collect();
    let configurations: HashMap<ConfigurationKey, Configuration> = config_keys
        .iter()
        .map(|k| k.0.dupe())
        .zip(ctx.compute_many(&config_keys)?)
        .collect();

    let mut deps: Vec<Dependency> = Vec::with_capacity(pending.len());
    for (edge, transition_key, cfg) in pending {
        let configuration = cfg.and_then(|c| configurations.get(&c).map(Dupe::dupe));
        let dep = Dependency {
            kind: edge.kind,
            label: edge.label,
            configuration,
            exec_platform: edge.exec_platform,
            transition_key,
            aspects: edge.aspects,
        };
        if !deps.contains(&dep) {
            deps.push(dep);
        }
    }
    Ok(deps)
}

/// Applies the aspects attached to the edges and merges their providers into the values.
fn apply_aspects(
    ctx: &mut DiceComputations,
    dcx: &DependencyContext<'_>,
    deps: &[Dependency],
    values: Vec<ConfiguredTargetAndData>,
    causes: &mut RootCauses,
) -> Result<Vec<ConfiguredTargetAndData>, Abort> {
    let mut requests: Vec<(usize, AspectKey)> = Vec::new();
    for (i, (dep, value)) in deps.iter().zip(&values).enumerate() {
        if value.target.rule().is_none() || value.value.is_empty() {
            continue;
        }
        for aspect in dep.aspects() {
            let base =
                ConfiguredTargetKey::new(value.label().dupe(), value.value.cfg().map(Dupe::dupe));
            requests.push((i, AspectKey::new(aspect.dupe(), base)));
        }
    }
    if requests.is_empty() {
        return Ok(values);
    }

    let keys: Vec<AspectKey> = requests.iter().map(|(_, k)| k.clone()).collect();
    let aspect_values = ctx.compute_many(&keys)?;

    let mut failure: Option<ConfiguredValueCreationError> = None;
    let mut values = values;
    for ((i, key), aspect_value) in requests.into_iter().zip(aspect_values) {
        match aspect_value {
            Ok(aspect_value) => {
                let merged = values[i]
                    .with_extra_providers(aspect_value.providers())
                    .map_err(|e| AnalysisFailure::Dependency {
                        error: ConfiguredValueCreationError::of_target(
                            dcx.target.label().dupe(),
                            dcx.configuration.map(|c| c.key().dupe()),
                            ErrorTag::DuplicateProvider,
                            format!(
                                "Aspect `{}` applied to `{}`: {}",
                                key.aspect().id(),
                                key.base().label(),
                                e
                            ),
                        ),
                        dep_reported_own_error: false,
                    })?;
                values[i] = merged;
            }
            Err(e) => {
                let e = as_creation_error(key.base().label(), key.base().cfg(), &e);
                causes.add_all(e.root_causes());
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }
    }
    match failure {
        Some(e) => Err(AnalysisFailure::Aspect(e).into()),
        None => Ok(values),
    }
}

/// Computes the dependencies of a target (or of an aspect applied to it): collects edges,
/// loads the dependency targets, resolves configurations and evaluates the dependencies.
///
/// Problems loading dependency targets are added to `causes` without failing here.
pub(crate) fn compute_dependencies(
    ctx: &mut DiceComputations,
    dcx: &DependencyContext<'_>,
    transitive_packages: &mut TransitivePackages,
    causes: &mut RootCauses,
    events: &mut StoredEvents,
) -> Result<DependencyBundle, Abort> {
    let edges = dcx.collect_edges()?;
    let nodes = dependent_node_map(ctx, dcx, edges, transitive_packages, causes, events)?;
    let deps = resolve_configurations(ctx, dcx, nodes)?;
    let owner_cfg = dcx.configuration.map(|c| c.key().dupe());
    let values = resolve_configured_target_dependencies(
        ctx,
        dcx.target.label(),
        owner_cfg.as_ref(),
        &deps,
        transitive_packages,
        causes,
    )?;
    let values = apply_aspects(ctx, dcx, &deps, values, causes)?;
    Ok(DependencyBundle {
        entries: deps.into_iter().zip(values).collect(),
    })
}
