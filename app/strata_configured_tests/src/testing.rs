/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! A small workspace of packages, rules and toolchains to analyze.

use std::collections::BTreeMap;
use std::sync::Arc;

use dupe::Dupe;
use parking_lot::Mutex;
use strata_configured::aspect::AspectKey;
use strata_configured::config::AnalysisConfig;
use strata_configured::dependencies::DependencyKind;
use strata_configured::diagnostics::CollectingEventHandler;
use strata_configured::diagnostics::Event;
use strata_configured::errors::ConfiguredValueCreationError;
use strata_configured::keys::ConfigurationLookupKey;
use strata_configured::keys::ConfiguredTargetKey;
use strata_configured::keys::PackageKey;
use strata_configured::keys::TransitiveFragmentsKey;
use strata_configured::progress::ConfiguredTargetProgress;
use strata_configured::rule::AspectContext;
use strata_configured::rule::AspectImplementation;
use strata_configured::rule::RuleContext;
use strata_configured::rule::RuleImplementation;
use strata_configured::rule::RuleOutput;
use strata_configured::rule::RuleRegistry;
use strata_configured::rule::Unwind;
use strata_configured::services::AnalysisServices;
use strata_configured::services::SetAnalysisServices;
use strata_configured::toolchain::RegisteredToolchains;
use strata_configured::toolchain::RegisteredToolchainsKey;
use strata_configured::toolchain::ToolchainContextKey;
use strata_configured::toolchain::ToolchainRegistration;
use strata_configured::value::ConfiguredTargetValue;
use strata_configured::value::ProviderValue;
use strata_configured::value::Providers;
use strata_core::configuration::data::Configuration;
use strata_core::configuration::data::ConfigurationKey;
use strata_core::configuration::options::BuildOptions;
use strata_core::target::label::PackageLabel;
use strata_core::target::label::TargetLabel;
use strata_dice::Dice;
use strata_dice::DiceKey;
use strata_dice::DiceTransaction;
use strata_dice::Evaluation;
use strata_node::aspect::AspectId;
use strata_node::attrs::attr::Attribute;
use strata_node::attrs::coerced_attr::CoercedAttr;
use strata_node::exec_group::DEFAULT_EXEC_GROUP_NAME;
use strata_node::nodes::target_node::TargetNode;
use strata_node::package::Package;
use strata_node::rule::RuleClass;
use strata_node::rule::RuleClassBuilder;

pub(crate) fn l(s: &str) -> TargetLabel {
    TargetLabel::testing_parse(s)
}

pub(crate) fn pkg(s: &str) -> PackageLabel {
    PackageLabel::new(s).unwrap()
}

pub(crate) fn label_list(labels: &[&str]) -> CoercedAttr {
    CoercedAttr::label_list(&labels.iter().map(|s| l(s)).collect::<Vec<_>>())
}

/// Options with the `//platforms:linux` target platform.
pub(crate) fn linux() -> BuildOptions {
    BuildOptions::default().with_target_platform(l("//platforms:linux"))
}

pub(crate) fn ct(label: &str, cfg: &ConfigurationKey) -> ConfiguredTargetKey {
    ConfiguredTargetKey::new(l(label), Some(cfg.dupe()))
}

/// Platforms `arm` and `x86`, and a C++ toolchain that only runs on `x86` for `linux`.
pub(crate) fn registered_toolchains() -> RegisteredToolchains {
    RegisteredToolchains::new()
        .with_execution_platform(l("//platforms:arm"), [l("//cpu:arm")])
        .with_execution_platform(l("//platforms:x86"), [l("//cpu:x86")])
        .with_target_platform(l("//platforms:linux"), [l("//os:linux")])
        .with_target_platform(l("//platforms:x86"), [l("//cpu:x86")])
        .with_toolchain(
            ToolchainRegistration::new(l("//cpp:toolchain_type"), l("//cpp:gcc"))
                .exec_compatible_with(l("//cpu:x86"))
                .target_compatible_with(l("//os:linux")),
        )
}

/// A rule analyzed by [`TestRule`]: `deps` plus string attributes driving its behavior.
pub(crate) fn test_rule(id: &str) -> RuleClassBuilder {
    RuleClass::builder(id)
        .attribute(Attribute::dep("deps"))
        .attribute(Attribute::value("value", CoercedAttr::string("")))
        .attribute(Attribute::value("fail", CoercedAttr::string("")))
        .attribute(Attribute::value("warn", CoercedAttr::string("")))
        .attribute(Attribute::value("lookup", CoercedAttr::string("")))
}

pub(crate) fn simple_rule() -> Arc<RuleClass> {
    test_rule("test_rule").build().unwrap()
}

/// The toolchain implementation rule. Toolchains do not resolve toolchains themselves.
pub(crate) fn toolchain_rule() -> Arc<RuleClass> {
    test_rule("cc_toolchain")
        .uses_toolchain_resolution(false)
        .build()
        .unwrap()
}

pub(crate) fn target(
    label: &str,
    rule: &Arc<RuleClass>,
    attrs: Vec<(&str, CoercedAttr)>,
) -> TargetNode {
    TargetNode::new(l(label), rule.dupe(), attrs).unwrap()
}

fn mode_of(configuration: Option<&Configuration>) -> String {
    configuration
        .and_then(|c| c.options().option("cpp", "mode"))
        .unwrap_or("none")
        .to_owned()
}

fn platform_of(configuration: Option<&Configuration>) -> String {
    configuration
        .and_then(|c| c.target_platform())
        .map_or_else(|| "none".to_owned(), |p| p.to_string())
}

/// Reports the `fail` and `warn` attributes, requests the configuration named by `lookup`, and
/// describes what it saw of its dependencies and toolchains as providers.
pub(crate) struct TestRule;

impl RuleImplementation for TestRule {
    fn build(&self, ctx: &mut RuleContext<'_>) -> Result<RuleOutput, Unwind> {
        let warn = ctx.attr("warn")?;
        if let Some(message) = warn.as_str().filter(|m| !m.is_empty()) {
            ctx.report_warning(message);
        }
        let lookup = ctx.attr("lookup")?;
        if let Some(value) = lookup.as_str().filter(|m| !m.is_empty()) {
            let options = BuildOptions::default().with_option("lookup", "value", value);
            let key = ConfigurationKey::new(options);
            ctx.compute(&ConfigurationLookupKey(key))?;
        }
        let fail = ctx.attr("fail")?;
        if let Some(message) = fail.as_str().filter(|m| !m.is_empty()) {
            ctx.report_error(message);
        }

        let mut deps = Vec::new();
        let mut dep_targets = Vec::new();
        let mut dep_modes = Vec::new();
        let mut dep_platforms = Vec::new();
        let mut aspect_infos = Vec::new();
        let mut toolchains = Vec::new();
        for (dep, value) in ctx.dependencies().iter() {
            match dep.kind() {
                DependencyKind::Attribute { .. } => {
                    deps.push(value.label().dupe());
                    dep_targets.push(value.target.label().dupe());
                    dep_modes.push(ProviderValue::Text(mode_of(value.configuration.as_ref())));
                    let platform = platform_of(value.configuration.as_ref());
                    dep_platforms.push(ProviderValue::Text(platform));
                    if let Some(info) = value.providers().get("aspect_info") {
                        aspect_infos.push(info.clone());
                    }
                }
                DependencyKind::Toolchain { .. } => toolchains.push(value.label().dupe()),
                _ => {}
            }
        }
        let exec_platform = ctx
            .toolchain_context(DEFAULT_EXEC_GROUP_NAME)
            .and_then(|c| c.execution_platform())
            .map_or_else(|| "none".to_owned(), |p| p.to_string());
        let value = ctx.attr("value")?.as_str().unwrap_or_default().to_owned();

        Ok(RuleOutput::Providers(
            Providers::new()
                .with("deps", ProviderValue::Labels(deps))
                .with("dep_targets", ProviderValue::Labels(dep_targets))
                .with("dep_modes", ProviderValue::List(dep_modes))
                .with("dep_platforms", ProviderValue::List(dep_platforms))
                .with("aspect_infos", ProviderValue::List(aspect_infos))
                .with("toolchains", ProviderValue::Labels(toolchains))
                .with("exec_platform", ProviderValue::Text(exec_platform))
                .with("mode", ProviderValue::Text(mode_of(ctx.configuration())))
                .with("value", ProviderValue::Text(value)),
        ))
    }
}

/// Describes the base target and the `_tool` dependencies of the aspect.
pub(crate) struct TestAspect;

impl AspectImplementation for TestAspect {
    fn build(&self, ctx: &mut AspectContext<'_>) -> Result<Providers, Unwind> {
        let tools: Vec<String> = ctx.deps("_tool").map(|d| d.label().to_string()).collect();
        let info = format!(
            "{} on {} with {}",
            ctx.aspect().id().as_str(),
            ctx.base().label(),
            tools.join(",")
        );
        Ok(Providers::new().with("aspect_info", ProviderValue::Text(info)))
    }
}

/// Provides `mode`, which [`TestRule`] provides as well.
pub(crate) struct ConflictingAspect;

impl AspectImplementation for ConflictingAspect {
    fn build(&self, _ctx: &mut AspectContext<'_>) -> Result<Providers, Unwind> {
        Ok(Providers::new().with("mode", ProviderValue::Text("aspect".to_owned())))
    }
}

#[derive(Default)]
pub(crate) struct RecordingProgress {
    done: Mutex<Vec<TargetLabel>>,
}

impl ConfiguredTargetProgress for RecordingProgress {
    fn done_configure_target(&self, label: &TargetLabel) {
        self.done.lock().push(label.dupe());
    }
}

pub(crate) struct TestWorkspace {
    packages: BTreeMap<PackageLabel, Vec<TargetNode>>,
    package_errors: BTreeMap<PackageLabel, String>,
    missing_packages: Vec<PackageLabel>,
    toolchains: RegisteredToolchains,
    rules: RuleRegistry,
    config: AnalysisConfig,
}

impl TestWorkspace {
    pub(crate) fn new() -> TestWorkspace {
        TestWorkspace {
            packages: BTreeMap::new(),
            package_errors: BTreeMap::new(),
            missing_packages: Vec::new(),
            toolchains: registered_toolchains(),
            rules: RuleRegistry::with_builtins(),
            config: AnalysisConfig {
                cpu_permits: 2,
                scheduler_threads: 2,
                ..AnalysisConfig::default()
            },
        }
    }

    pub(crate) fn add(mut self, node: TargetNode) -> Self {
        self.packages
            .entry(node.label().pkg().dupe())
            .or_default()
            .push(node);
        self
    }

    /// The package loads, but is flagged as containing errors.
    pub(crate) fn package_error(mut self, package: &str, message: &str) -> Self {
        self.package_errors.insert(pkg(package), message.to_owned());
        self
    }

    /// The package fails to load.
    pub(crate) fn missing_package(mut self, package: &str) -> Self {
        self.missing_packages.push(pkg(package));
        self
    }

    pub(crate) fn aspect(
        mut self,
        id: &str,
        implementation: Arc<dyn AspectImplementation>,
    ) -> Self {
        self.rules.register_aspect(&AspectId::new(id), implementation);
        self
    }

    pub(crate) fn config(mut self, f: impl FnOnce(&mut AnalysisConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Creates the environment. Every rule without a registered implementation runs
    /// [`TestRule`].
    pub(crate) fn build(mut self) -> TestEnv {
        for node in self.packages.values().flatten() {
            if let Some(rule) = node.rule() {
                if self.rules.rule(rule.id().as_str()).is_none() {
                    self.rules.register_rule(rule.id().as_str(), Arc::new(TestRule));
                }
            }
        }

        let events = Arc::new(CollectingEventHandler::default());
        let progress = Arc::new(RecordingProgress::default());
        let services = AnalysisServices::new(self.config.clone(), self.rules, events.dupe())
            .with_progress(progress.dupe());
        let mut builder = Dice::builder().threads(self.config.scheduler_threads);
        builder.set_analysis_services(services);
        let dice = builder.build();

        let mut packages: Vec<(PackageKey, strata_error::Result<Package>)> = Vec::new();
        for (label, targets) in self.packages {
            let mut package = Package::new(label.dupe(), targets).unwrap();
            if let Some(message) = self.package_errors.get(&label) {
                package = package.with_error(message);
            }
            packages.push((PackageKey(label), Ok(package)));
        }
        for label in self.missing_packages {
            let error = strata_error::strata_error!(
                strata_error::ErrorTag::PackageLoading,
                "no such package `{}`",
                label
            );
            packages.push((PackageKey(label), Err(error)));
        }

        let mut updater = dice.updater();
        updater.changed_to(packages);
        updater.changed_to([(RegisteredToolchainsKey, Arc::new(self.toolchains))]);
        updater.commit();

        TestEnv {
            dice,
            events,
            progress,
        }
    }
}

pub(crate) struct TestEnv {
    pub(crate) dice: Arc<Dice>,
    events: Arc<CollectingEventHandler>,
    progress: Arc<RecordingProgress>,
}

impl TestEnv {
    pub(crate) fn tx(&self) -> DiceTransaction {
        self.dice.updater().commit()
    }

    pub(crate) fn keep_going(&self) -> DiceTransaction {
        self.dice.updater().commit().with_keep_going(true)
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.events()
    }

    pub(crate) fn errors(&self) -> Vec<Event> {
        self.events.errors()
    }

    pub(crate) fn error_messages(&self) -> Vec<String> {
        self.errors().into_iter().map(|e| e.message).collect()
    }

    pub(crate) fn progress(&self) -> Vec<TargetLabel> {
        self.progress.done.lock().clone()
    }

    /// Replaces the targets of a package, as if its build file was edited.
    pub(crate) fn reload_package(&self, package: &str, targets: Vec<TargetNode>) {
        let package = Package::new(pkg(package), targets).unwrap();
        let mut updater = self.dice.updater();
        updater.changed_to([(PackageKey(package.label().dupe()), Ok(package))]);
        updater.commit();
    }
}

/// Computes the keys an evaluation was waiting for.
pub(crate) fn compute_missing(tx: &DiceTransaction, missing: &[DiceKey]) -> anyhow::Result<()> {
    for key in missing {
        if let Some(k) = key.downcast_ref::<ConfiguredTargetKey>() {
            tx.compute(k)?;
        } else if let Some(k) = key.downcast_ref::<ConfigurationLookupKey>() {
            tx.compute(k)?;
        } else if let Some(k) = key.downcast_ref::<ToolchainContextKey>() {
            tx.compute(k)?;
        } else if let Some(k) = key.downcast_ref::<TransitiveFragmentsKey>() {
            tx.compute(k)?;
        } else if let Some(k) = key.downcast_ref::<AspectKey>() {
            tx.compute(k)?;
        } else {
            anyhow::bail!("unexpected missing key `{}`", key);
        }
    }
    Ok(())
}

/// Invokes the evaluation of `key` until it is ready, computing what it asks for in between.
/// Returns the value and the keys it waited for, in order.
pub(crate) fn drive(
    tx: &DiceTransaction,
    key: &ConfiguredTargetKey,
) -> anyhow::Result<(strata_error::Result<ConfiguredTargetValue>, Vec<DiceKey>)> {
    let mut waited = Vec::new();
    for _ in 0..32 {
        match tx.try_compute(key)? {
            Evaluation::Ready(value) => return Ok((value, waited)),
            Evaluation::NotReady { missing } => {
                compute_missing(tx, &missing)?;
                waited.extend(missing);
            }
        }
    }
    anyhow::bail!("`{}` never became ready", key)
}

pub(crate) fn text<'a>(value: &'a ConfiguredTargetValue, name: &str) -> &'a str {
    match value.providers().get(name) {
        Some(ProviderValue::Text(t)) => t,
        other => panic!("expected text provider `{}`, got {:?}", name, other),
    }
}

pub(crate) fn labels(value: &ConfiguredTargetValue, name: &str) -> Vec<String> {
    match value.providers().get(name) {
        Some(ProviderValue::Labels(ls)) => ls.iter().map(|l| l.to_string()).collect(),
        other => panic!("expected labels provider `{}`, got {:?}", name, other),
    }
}

pub(crate) fn texts(value: &ConfiguredTargetValue, name: &str) -> Vec<String> {
    match value.providers().get(name) {
        Some(ProviderValue::List(items)) => items
            .iter()
            .map(|item| match item {
                ProviderValue::Text(t) => t.clone(),
                other => panic!("expected text in `{}`, got {:?}", name, other),
            })
            .collect(),
        other => panic!("expected list provider `{}`, got {:?}", name, other),
    }
}

pub(crate) fn creation_error(e: &strata_error::Error) -> &ConfiguredValueCreationError {
    match e.downcast_ref::<ConfiguredValueCreationError>() {
        Some(e) => e,
        None => panic!("not a creation error: {}", e),
    }
}
