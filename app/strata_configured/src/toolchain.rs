/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Toolchain resolution: picking an execution platform and the toolchain implementations
//! for every exec group of a target.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use allocative::Allocative;
use dupe::Dupe;
use dupe::IterDupedExt;
use dupe::OptionDupedExt;
use itertools::Itertools;
use starlark_map::small_map::SmallMap;
use strata_core::configuration::data::Configuration;
use strata_core::configuration::data::ConfigurationKey;
use strata_core::configuration::transition::TransitionRef;
use strata_core::configuration::transition::TransitionResult;
use strata_core::target::label::TargetLabel;
use strata_dice::Demand;
use strata_dice::DiceComputations;
use strata_dice::InjectedKey;
use strata_dice::Key;
use strata_error::ErrorTag;
use strata_error::ProvidesTag;
use strata_node::exec_group::ExecGroup;
use strata_node::exec_group::ExecGroupCollection;
use strata_node::exec_group::DEFAULT_EXEC_GROUP_NAME;
use strata_node::nodes::target_node::TargetNode;

use crate::dependencies::DependencyBundle;
use crate::dependencies::DependencyKind;
use crate::errors::Abort;
use crate::errors::AnalysisFailure;
use crate::errors::ConfiguredValueCreationError;
use crate::value::ConfiguredTargetAndData;

#[derive(Debug, thiserror::Error)]
pub enum ToolchainResolutionError {
    #[error("Unable to find an execution platform for toolchains [{0}] and target platform {1}")]
    NoMatchingExecutionPlatform(String, String),
    #[error("No matching toolchains found for types {0}")]
    NoMatchingToolchains(String),
    #[error("Execution platform `{0}` is not registered")]
    UnknownExecutionPlatform(TargetLabel),
    #[error("Target platform `{0}` is not registered")]
    UnknownTargetPlatform(TargetLabel),
}

impl ProvidesTag for ToolchainResolutionError {
    fn error_tag(&self) -> ErrorTag {
        ErrorTag::ToolchainResolution
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlatform {
    pub label: TargetLabel,
    pub constraints: BTreeSet<TargetLabel>,
}

/// A `toolchain()` declaration: an implementation of a toolchain type and where it can be
/// used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainRegistration {
    pub toolchain_type: TargetLabel,
    pub implementation: TargetLabel,
    pub exec_compatible_with: BTreeSet<TargetLabel>,
    pub target_compatible_with: BTreeSet<TargetLabel>,
}

impl ToolchainRegistration {
    pub fn new(toolchain_type: TargetLabel, implementation: TargetLabel) -> Self {
        ToolchainRegistration {
            toolchain_type,
            implementation,
            exec_compatible_with: BTreeSet::new(),
            target_compatible_with: BTreeSet::new(),
        }
    }

    pub fn exec_compatible_with(mut self, constraint: TargetLabel) -> Self {
        self.exec_compatible_with.insert(constraint);
        self
    }

    pub fn target_compatible_with(mut self, constraint: TargetLabel) -> Self {
        self.target_compatible_with.insert(constraint);
        self
    }
}

/// Platforms and toolchains registered in the workspace, in priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisteredToolchains {
    execution_platforms: Vec<ExecutionPlatform>,
    target_platforms: BTreeMap<TargetLabel, BTreeSet<TargetLabel>>,
    toolchains: Vec<ToolchainRegistration>,
}

impl RegisteredToolchains {
    pub fn new() -> Self {
        RegisteredToolchains::default()
    }

    pub fn with_execution_platform(
        mut self,
        label: TargetLabel,
        constraints: impl IntoIterator<Item = TargetLabel>,
    ) -> Self {
        self.execution_platforms.push(ExecutionPlatform {
            label,
            constraints: constraints.into_iter().collect(),
        });
        self
    }

    pub fn with_target_platform(
        mut self,
        label: TargetLabel,
        constraints: impl IntoIterator<Item = TargetLabel>,
    ) -> Self {
        self.target_platforms
            .insert(label, constraints.into_iter().collect());
        self
    }

    pub fn with_toolchain(mut self, toolchain: ToolchainRegistration) -> Self {
        self.toolchains.push(toolchain);
        self
    }

    fn find_toolchain(
        &self,
        toolchain_type: &TargetLabel,
        exec_constraints: &BTreeSet<TargetLabel>,
        target_constraints: &BTreeSet<TargetLabel>,
    ) -> Option<&ToolchainRegistration> {
        self.toolchains.iter().find(|t| {
            &t.toolchain_type == toolchain_type
                && t.exec_compatible_with.is_subset(exec_constraints)
                && t.target_compatible_with.is_subset(target_constraints)
        })
    }

    fn resolve(
        &self,
        key: &ToolchainContextKey,
    ) -> Result<UnloadedToolchainContext, ToolchainResolutionError> {
        let target_platform = key.cfg.options().platform().target_platform.dupe();
        let empty = BTreeSet::new();
        let target_constraints = match &target_platform {
            Some(platform) => self
                .target_platforms
                .get(platform)
                .ok_or_else(|| ToolchainResolutionError::UnknownTargetPlatform(platform.dupe()))?,
            None => &empty,
        };

        let candidates: Vec<&ExecutionPlatform> = match &key.forced_execution_platform {
            Some(forced) => vec![
                self.execution_platforms
                    .iter()
                    .find(|p| &p.label == forced)
                    .ok_or_else(|| {
                        ToolchainResolutionError::UnknownExecutionPlatform(forced.dupe())
                    })?,
            ],
            None => self.execution_platforms.iter().collect(),
        };
        let candidates: Vec<&ExecutionPlatform> = candidates
            .into_iter()
            .filter(|p| {
                let ok = key.exec_constraints.is_subset(&p.constraints);
                if !ok && key.debug {
                    tracing::info!(
                        "ToolchainResolution: Rejected execution platform {}, missing constraints",
                        p.label
                    );
                }
                ok
            })
            .collect();

        if candidates.is_empty()
            && key.required_toolchains.is_empty()
            && self.execution_platforms.is_empty()
        {
            return Ok(UnloadedToolchainContext::new(None, target_platform, BTreeMap::new()));
        }

        for platform in &candidates {
            let mut resolved = BTreeMap::new();
            for toolchain_type in &key.required_toolchains {
                let found =
                    self.find_toolchain(toolchain_type, &platform.constraints, target_constraints);
                match found {
                    Some(t) => {
                        resolved.insert(toolchain_type.dupe(), t.implementation.dupe());
                    }
                    None => {
                        if key.debug {
                            tracing::info!(
                                "ToolchainResolution: No {} toolchain found for execution platform {}",
                                toolchain_type,
                                platform.label
                            );
                        }
                        break;
                    }
                }
            }
            if resolved.len() == key.required_toolchains.len() {
                if key.debug {
                    tracing::info!(
                        "ToolchainResolution: Selected execution platform {}, {}",
                        platform.label,
                        resolved
                            .iter()
                            .map(|(ty, imp)| format!("type {} -> toolchain {}", ty, imp))
                            .join(", ")
                    );
                }
                return Ok(UnloadedToolchainContext::new(
                    Some(platform.label.dupe()),
                    target_platform,
                    resolved,
                ));
            }
        }

        let missing: Vec<&TargetLabel> = key
            .required_toolchains
            .iter()
            .filter(|ty| {
                !candidates
                    .iter()
                    .any(|p| self.find_toolchain(ty, &p.constraints, target_constraints).is_some())
            })
            .collect();
        if !candidates.is_empty() && !missing.is_empty() {
            return Err(ToolchainResolutionError::NoMatchingToolchains(
                missing.iter().join(", "),
            ));
        }
        Err(ToolchainResolutionError::NoMatchingExecutionPlatform(
            key.required_toolchains.iter().join(", "),
            target_platform.map_or_else(|| "<none>".to_owned(), |p| p.to_string()),
        ))
    }
}

/// The registered platforms and toolchains. Set by the loading phase.
#[derive(Debug, Clone, Dupe, PartialEq, Eq, Hash, Allocative, derive_more::Display)]
#[display("registered toolchains")]
pub struct RegisteredToolchainsKey;

impl InjectedKey for RegisteredToolchainsKey {
    type Value = Arc<RegisteredToolchains>;

    fn equality(x: &Self::Value, y: &Self::Value) -> bool {
        x == y
    }
}

/// Toolchain resolution for one exec group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Allocative)]
pub struct ToolchainContextKey {
    cfg: ConfigurationKey,
    required_toolchains: BTreeSet<TargetLabel>,
    exec_constraints: BTreeSet<TargetLabel>,
    forced_execution_platform: Option<TargetLabel>,
    debug: bool,
}

impl fmt::Display for ToolchainContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "toolchain resolution [{}] ({})",
            self.required_toolchains.iter().join(", "),
            self.cfg
        )?;
        if let Some(platform) = &self.forced_execution_platform {
            write!(f, " on {}", platform)?;
        }
        Ok(())
    }
}

impl ToolchainContextKey {
    pub fn new(cfg: ConfigurationKey, group: &ExecGroup) -> Self {
        ToolchainContextKey {
            cfg,
            required_toolchains: group.required_toolchains().clone(),
            exec_constraints: group.exec_compatible_with().clone(),
            forced_execution_platform: None,
            debug: false,
        }
    }

    pub fn with_forced_execution_platform(mut self, platform: Option<TargetLabel>) -> Self {
        self.forced_execution_platform = platform;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn required_toolchains(&self) -> &BTreeSet<TargetLabel> {
        &self.required_toolchains
    }
}

impl Key for ToolchainContextKey {
    type Value = strata_error::Result<UnloadedToolchainContext>;

    fn compute(&self, ctx: &mut DiceComputations) -> Demand<Self::Value> {
        let registered = ctx.compute(&RegisteredToolchainsKey)?;
        Ok(registered.resolve(self).map_err(strata_error::Error::from))
    }

    fn equality(x: &Self::Value, y: &Self::Value) -> bool {
        match (x, y) {
            (Ok(x), Ok(y)) => x == y,
            _ => false,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct UnloadedToolchainContextData {
    execution_platform: Option<TargetLabel>,
    target_platform: Option<TargetLabel>,
    /// Toolchain type to the implementation resolved for it.
    toolchains: BTreeMap<TargetLabel, TargetLabel>,
}

/// The outcome of toolchain resolution, before the toolchain targets are analyzed.
#[derive(Debug, Clone, Dupe, PartialEq, Eq)]
pub struct UnloadedToolchainContext(Arc<UnloadedToolchainContextData>);

impl UnloadedToolchainContext {
    fn new(
        execution_platform: Option<TargetLabel>,
        target_platform: Option<TargetLabel>,
        toolchains: BTreeMap<TargetLabel, TargetLabel>,
    ) -> Self {
        UnloadedToolchainContext(Arc::new(UnloadedToolchainContextData {
            execution_platform,
            target_platform,
            toolchains,
        }))
    }

    pub fn execution_platform(&self) -> Option<&TargetLabel> {
        self.0.execution_platform.as_ref()
    }

    pub fn target_platform(&self) -> Option<&TargetLabel> {
        self.0.target_platform.as_ref()
    }

    pub fn resolved_toolchain(&self, toolchain_type: &TargetLabel) -> Option<&TargetLabel> {
        self.0.toolchains.get(toolchain_type)
    }

    pub fn resolved_toolchain_labels(&self) -> impl Iterator<Item = &TargetLabel> {
        self.0.toolchains.values()
    }
}

/// One toolchain context per exec group, the default group first.
#[derive(Debug, Clone)]
pub struct ToolchainCollection<T> {
    contexts: SmallMap<String, T>,
}

impl<T> ToolchainCollection<T> {
    fn new() -> Self {
        ToolchainCollection {
            contexts: SmallMap::new(),
        }
    }

    fn insert(&mut self, exec_group: &str, context: T) {
        self.contexts.insert(exec_group.to_owned(), context);
    }

    pub fn default_context(&self) -> Option<&T> {
        self.contexts.get(DEFAULT_EXEC_GROUP_NAME)
    }

    pub fn get(&self, exec_group: &str) -> Option<&T> {
        self.contexts.get(exec_group)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.contexts.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl ToolchainCollection<UnloadedToolchainContext> {
    /// Toolchain implementations over every exec group.
    pub fn resolved_toolchain_labels(&self) -> BTreeSet<TargetLabel> {
        self.contexts
            .values()
            .flat_map(|c| c.resolved_toolchain_labels())
            .duped()
            .collect()
    }
}

/// The analyzed toolchains of one exec group, handed to the rule implementation.
#[derive(Debug, Clone)]
pub struct ResolvedToolchainContext {
    execution_platform: Option<TargetLabel>,
    target_platform: Option<TargetLabel>,
    toolchains: BTreeMap<TargetLabel, ConfiguredTargetAndData>,
}

impl ResolvedToolchainContext {
    pub(crate) fn load(
        exec_group: &str,
        unloaded: &UnloadedToolchainContext,
        deps: &DependencyBundle,
    ) -> strata_error::Result<ResolvedToolchainContext> {
        let mut toolchains = BTreeMap::new();
        for (toolchain_type, implementation) in &unloaded.0.toolchains {
            let dep = deps
                .iter()
                .find(|(dep, _)| {
                    dep.label() == implementation
                        && matches!(
                            dep.kind(),
                            DependencyKind::Toolchain { exec_group: g } if g == exec_group
                        )
                })
                .map(|(_, value)| value.dupe());
            match dep {
                Some(value) => {
                    toolchains.insert(toolchain_type.dupe(), value);
                }
                None => {
                    return Err(strata_error::internal_error!(
                        "toolchain `{}` of exec group `{}` was not analyzed",
                        implementation,
                        exec_group
                    ));
                }
            }
        }
        Ok(ResolvedToolchainContext {
            execution_platform: unloaded.0.execution_platform.dupe(),
            target_platform: unloaded.0.target_platform.dupe(),
            toolchains,
        })
    }

    pub fn execution_platform(&self) -> Option<&TargetLabel> {
        self.execution_platform.as_ref()
    }

    pub fn target_platform(&self) -> Option<&TargetLabel> {
        self.target_platform.as_ref()
    }

    pub fn toolchain(&self, toolchain_type: &TargetLabel) -> Option<&ConfiguredTargetAndData> {
        self.toolchains.get(toolchain_type)
    }
}

pub(crate) fn load_toolchain_contexts(
    unloaded: &ToolchainCollection<UnloadedToolchainContext>,
    deps: &DependencyBundle,
) -> strata_error::Result<ToolchainCollection<ResolvedToolchainContext>> {
    let mut out = ToolchainCollection::new();
    for (group, context) in unloaded.iter() {
        out.insert(group, ResolvedToolchainContext::load(group, context, deps)?);
    }
    Ok(out)
}

pub(crate) struct ComputedToolchainContexts {
    pub(crate) exec_groups: ExecGroupCollection,
    /// `None` when the rule opts out of toolchain resolution.
    pub(crate) contexts: Option<ToolchainCollection<UnloadedToolchainContext>>,
}

/// Resolves toolchains for every exec group of a rule target.
///
/// Resolution runs in the configuration with feature flags trimmed. A forced execution
/// platform applies to the default exec group only.
pub(crate) fn compute_unloaded_toolchain_contexts(
    ctx: &mut DiceComputations,
    target: &TargetNode,
    configuration: &Configuration,
    forced_execution_platform: Option<&TargetLabel>,
) -> Result<ComputedToolchainContexts, Abort> {
    let label = target.label();
    let creation_error = |e: strata_error::Error| {
        Abort::from(ConfiguredValueCreationError::of_target(
            label.dupe(),
            Some(configuration.key().dupe()),
            e.best_tag(),
            e.to_string(),
        ))
    };

    let Some(rule) = target.rule() else {
        return Ok(ComputedToolchainContexts {
            exec_groups: ExecGroupCollection::new(ExecGroup::default(), &SmallMap::new()),
            contexts: None,
        });
    };

    let mut exec_constraints: Vec<TargetLabel> =
        rule.exec_compatible_with().iter().duped().collect();
    exec_constraints.extend(target.exec_compatible_with().map_err(creation_error)?);
    exec_constraints.extend(configuration.additional_execution_constraints_for(label));
    let default_group = ExecGroup::new(rule.required_toolchains().iter().duped(), exec_constraints);
    let exec_groups = ExecGroupCollection::new(default_group, rule.exec_groups());

    if !rule.uses_toolchain_resolution() {
        return Ok(ComputedToolchainContexts {
            exec_groups,
            contexts: None,
        });
    }

    let toolchain_cfg = match TransitionRef::toolchain_trimming()
        .apply(configuration.options())
        .map_err(creation_error)?
    {
        TransitionResult::Patched(options) => ConfigurationKey::new(options),
        other => {
            return Err(creation_error(strata_error::internal_error!(
                "toolchain trimming produced {:?}",
                other
            )));
        }
    };
    let debug = configuration.debug_toolchain_resolution_for(label);

    let mut names = Vec::with_capacity(exec_groups.len());
    let mut keys = Vec::with_capacity(exec_groups.len());
    for (name, group) in exec_groups.iter() {
        let forced = if name == DEFAULT_EXEC_GROUP_NAME {
            forced_execution_platform.duped()
        } else {
            None
        };
        names.push(name.to_owned());
        keys.push(
            ToolchainContextKey::new(toolchain_cfg.dupe(), group)
                .with_forced_execution_platform(forced)
                .with_debug(debug),
        );
    }

    let values = ctx.compute_many(&keys)?;
    let mut contexts = ToolchainCollection::new();
    for (name, value) in names.iter().zip(values) {
        match value {
            Ok(context) => contexts.insert(name, context),
            Err(e) => return Err(AnalysisFailure::ToolchainResolution(e).into()),
        }
    }
    Ok(ComputedToolchainContexts {
        exec_groups,
        contexts: Some(contexts),
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use strata_core::configuration::data::ConfigurationKey;
    use strata_core::configuration::options::BuildOptions;
    use strata_core::target::label::TargetLabel;
    use strata_node::exec_group::ExecGroup;

    use crate::toolchain::RegisteredToolchains;
    use crate::toolchain::ToolchainContextKey;
    use crate::toolchain::ToolchainRegistration;
    use crate::toolchain::ToolchainResolutionError;

    fn l(s: &str) -> TargetLabel {
        TargetLabel::testing_parse(s)
    }

    fn registry() -> RegisteredToolchains {
        RegisteredToolchains::new()
            .with_execution_platform(l("//platforms:arm"), [l("//cpu:arm")])
            .with_execution_platform(l("//platforms:x86"), [l("//cpu:x86")])
            .with_target_platform(l("//platforms:linux"), [l("//os:linux")])
            .with_toolchain(
                ToolchainRegistration::new(l("//cpp:toolchain_type"), l("//cpp:gcc"))
                    .exec_compatible_with(l("//cpu:x86"))
                    .target_compatible_with(l("//os:linux")),
            )
    }

    fn key(types: &[&str], constraints: &[&str]) -> ToolchainContextKey {
        let cfg = ConfigurationKey::new(
            BuildOptions::default().with_target_platform(l("//platforms:linux")),
        );
        let group = ExecGroup::new(
            types.iter().map(|t| l(t)),
            constraints.iter().map(|c| l(c)),
        );
        ToolchainContextKey::new(cfg, &group)
    }

    #[test]
    fn test_resolve_picks_compatible_platform() {
        let ctx = registry().resolve(&key(&["//cpp:toolchain_type"], &[])).unwrap();
        assert_eq!(Some(&l("//platforms:x86")), ctx.execution_platform());
        assert_eq!(
            Some(&l("//cpp:gcc")),
            ctx.resolved_toolchain(&l("//cpp:toolchain_type"))
        );
    }

    #[test]
    fn test_resolve_no_toolchains_first_platform() {
        let ctx = registry().resolve(&key(&[], &[])).unwrap();
        assert_eq!(Some(&l("//platforms:arm")), ctx.execution_platform());
    }

    #[test]
    fn test_resolve_missing_type() {
        assert_matches!(
            registry().resolve(&key(&["//go:toolchain_type"], &[])),
            Err(ToolchainResolutionError::NoMatchingToolchains(types))
                if types == "//go:toolchain_type"
        );
    }

    #[test]
    fn test_resolve_constraints_leave_no_toolchain() {
        // Only arm satisfies the constraint, and gcc needs x86.
        assert_matches!(
            registry().resolve(&key(&["//cpp:toolchain_type"], &["//cpu:arm"])),
            Err(ToolchainResolutionError::NoMatchingToolchains(types))
                if types == "//cpp:toolchain_type"
        );
    }

    #[test]
    fn test_resolve_constraints_exclude_all() {
        assert_matches!(
            registry().resolve(&key(&["//cpp:toolchain_type"], &["//cpu:riscv"])),
            Err(ToolchainResolutionError::NoMatchingExecutionPlatform(..))
        );
    }

    #[test]
    fn test_resolve_forced_platform() {
        let forced = key(&[], &[]).with_forced_execution_platform(Some(l("//platforms:x86")));
        let ctx = registry().resolve(&forced).unwrap();
        assert_eq!(Some(&l("//platforms:x86")), ctx.execution_platform());

        let unknown = key(&[], &[]).with_forced_execution_platform(Some(l("//platforms:riscv")));
        assert_matches!(
            registry().resolve(&unknown),
            Err(ToolchainResolutionError::UnknownExecutionPlatform(_))
        );
    }
}
