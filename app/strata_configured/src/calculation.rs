/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Analysis of one configured target.
//!
//! The evaluation may be suspended at every request for another value and is then invoked
//! again from the start once the requested values are available. Nothing observable happens
//! before the evaluation completes: diagnostics are buffered and only replayed once a value
//! or a failure is produced.

use std::collections::BTreeSet;
use std::sync::Arc;

use dupe::Dupe;
use starlark_map::small_map::SmallMap;
use strata_core::configuration::data::Configuration;
use strata_core::configuration::data::ConfigurationKey;
use strata_core::target::label::TargetLabel;
use strata_dice::Demand;
use strata_dice::Dice;
use strata_dice::DiceComputations;
use strata_dice::FetchObserver;
use strata_dice::Key;
use strata_error::ErrorTag;
use strata_node::exec_group::ExecGroup;
use strata_node::exec_group::ExecGroupCollection;
use strata_node::nodes::target_node::TargetNode;

use crate::alias::TransitivePackages;
use crate::conditions::get_config_conditions;
use crate::conditions::ConfigConditions;
use crate::dependencies::compute_dependencies;
use crate::dependencies::DependencyBundle;
use crate::dependencies::DependencyContext;
use crate::dependencies::DependencyKind;
use crate::diagnostics::Event;
use crate::diagnostics::StoredEvents;
use crate::errors::Abort;
use crate::errors::AnalysisFailure;
use crate::errors::Cause;
use crate::errors::ConfiguredValueCreationError;
use crate::errors::RootCauses;
use crate::keys::ConfigurationLookupKey;
use crate::keys::ConfiguredTargetKey;
use crate::keys::PackageKey;
use crate::rule::RuleContext;
use crate::rule::RuleOutput;
use crate::rule::Unwind;
use crate::services::AnalysisServices;
use crate::services::HasAnalysisServices;
use crate::throttle::CpuSection;
use crate::toolchain::compute_unloaded_toolchain_contexts;
use crate::toolchain::load_toolchain_contexts;
use crate::toolchain::ComputedToolchainContexts;
use crate::value::ConfiguredTargetValue;

/// Analyzes targets in a new transaction of `dice`, in the keep-going mode of the installed
/// [`AnalysisConfig`](crate::config::AnalysisConfig).
///
/// Without keep-going the first failure aborts the whole request.
pub fn analyze_targets(
    dice: &Arc<Dice>,
    keys: &[ConfiguredTargetKey],
) -> strata_error::Result<Vec<strata_error::Result<ConfiguredTargetValue>>> {
    let keep_going = dice.global_data().get_analysis_services()?.config.keep_going;
    tracing::debug!("Analyzing {} targets, keep going: {}", keys.len(), keep_going);
    let tx = dice.updater().commit().with_keep_going(keep_going);
    Ok(tx.compute_many(keys)?)
}

pub trait ConfiguredTargetCalculation {
    fn get_configured_target(
        &mut self,
        key: &ConfiguredTargetKey,
    ) -> Demand<strata_error::Result<ConfiguredTargetValue>>;
}

impl ConfiguredTargetCalculation for DiceComputations {
    fn get_configured_target(
        &mut self,
        key: &ConfiguredTargetKey,
    ) -> Demand<strata_error::Result<ConfiguredTargetValue>> {
        self.compute(key)
    }
}

impl Key for ConfiguredTargetKey {
    type Value = strata_error::Result<ConfiguredTargetValue>;

    fn compute(&self, ctx: &mut DiceComputations) -> Demand<Self::Value> {
        let services = match ctx.global_data().get_analysis_services() {
            Ok(services) => services,
            Err(e) => return Ok(Err(e)),
        };

        let section = CpuSection::enter(&services.throttle);
        let observer: Option<Arc<dyn FetchObserver>> =
            if services.config.unblock_cpu_work_when_fetching_deps {
                Some(section.dupe() as Arc<dyn FetchObserver>)
            } else {
                None
            };
        let previous = ctx.set_fetch_observer(observer);

        let mut analysis = Analysis::new(self, services);
        let result = analysis.evaluate(ctx);

        ctx.set_fetch_observer(previous);
        drop(section);

        let result = match result {
            Ok(value) => Ok(value),
            Err(Abort::Suspend(s)) => return Err(s),
            Err(Abort::Failure(failure)) => Err(analysis.report_failure(failure)),
        };
        Ok(analysis.finish(result))
    }

    fn equality(x: &Self::Value, y: &Self::Value) -> bool {
        match (x, y) {
            (Ok(x), Ok(y)) => x == y,
            _ => false,
        }
    }

    fn failure(value: &Self::Value) -> Option<&strata_error::Error> {
        value.as_ref().err()
    }
}

/// State of one evaluation attempt.
struct Analysis<'a> {
    key: &'a ConfiguredTargetKey,
    services: Arc<AnalysisServices>,
    events: StoredEvents,
    causes: RootCauses,
    transitive_packages: TransitivePackages,
    /// Toolchains resolved for the target, to attribute dependency failures to them.
    toolchain_labels: BTreeSet<TargetLabel>,
}

impl<'a> Analysis<'a> {
    fn new(key: &'a ConfiguredTargetKey, services: Arc<AnalysisServices>) -> Self {
        let transitive_packages =
            TransitivePackages::new(services.config.store_transitive_packages);
        Analysis {
            key,
            services,
            events: StoredEvents::default(),
            causes: RootCauses::default(),
            transitive_packages,
            toolchain_labels: BTreeSet::new(),
        }
    }

    fn label(&self) -> &TargetLabel {
        self.key.label()
    }

    fn cfg(&self) -> Option<ConfigurationKey> {
        self.key.cfg().map(Dupe::dupe)
    }

    fn creation_error(&self, code: ErrorTag, message: String) -> Abort {
        ConfiguredValueCreationError::of_target(self.label().dupe(), self.cfg(), code, message)
            .into()
    }

    fn evaluate(&mut self, ctx: &mut DiceComputations) -> Result<ConfiguredTargetValue, Abort> {
        let key = self.key;
        let label = key.label();

        let cfg_keys: Vec<ConfigurationLookupKey> = key
            .cfg()
            .map(|c| ConfigurationLookupKey(c.dupe()))
            .into_iter()
            .collect();
        let (packages, configurations) =
            ctx.compute_many2(&[PackageKey(label.pkg().dupe())], &cfg_keys)?;
        let package = match packages.into_iter().next() {
            Some(Ok(package)) => package,
            Some(Err(e)) => return Err(self.creation_error(e.best_tag(), e.to_string())),
            None => {
                return Err(self.creation_error(
                    ErrorTag::InternalError,
                    format!("package of `{}` was not requested", label),
                ));
            }
        };
        let configuration = configurations.into_iter().next();

        let target = match package.get_target(label.name()) {
            Ok(target) => target.dupe(),
            Err(e) => return Err(self.creation_error(ErrorTag::TargetNotFound, e.to_string())),
        };
        self.transitive_packages.add(package.label());
        if package.containing_errors() {
            self.causes.add(Cause::new(
                label.dupe(),
                self.cfg(),
                ErrorTag::PackageLoading,
                format!(
                    "package {} contains errors: {}",
                    package.label(),
                    package.error_message().unwrap_or_default()
                ),
            ));
        }

        if target.is_configurable() != configuration.is_some() {
            tracing::warn!(
                "Target {} requested {} a configuration, producing an empty value",
                label,
                if configuration.is_some() { "with" } else { "without" }
            );
            return Ok(ConfiguredTargetValue::empty(label.dupe(), self.cfg()));
        }

        let computed = match (&configuration, target.rule()) {
            (Some(configuration), Some(_)) => Some(compute_unloaded_toolchain_contexts(
                ctx,
                &target,
                configuration,
                key.exec_platform(),
            )?),
            _ => None,
        };
        if let Some(contexts) = computed.as_ref().and_then(|c| c.contexts.as_ref()) {
            self.toolchain_labels = contexts.resolved_toolchain_labels();
        }

        let conditions = get_config_conditions(
            ctx,
            &target,
            configuration.as_ref(),
            &mut self.transitive_packages,
            &mut self.causes,
        )?;
        if !self.causes.is_empty() && !conditions.is_empty() {
            return Err(ConfiguredValueCreationError::new(
                label.dupe(),
                self.cfg(),
                "Cannot compute config conditions",
                self.causes.clone(),
            )
            .into());
        }

        let dcx = DependencyContext {
            target: &target,
            configuration: configuration.as_ref(),
            conditions: &conditions,
            toolchains: computed.as_ref(),
            aspect: None,
        };
        let deps = compute_dependencies(
            ctx,
            &dcx,
            &mut self.transitive_packages,
            &mut self.causes,
            &mut self.events,
        )?;
        if !self.causes.is_empty() {
            return Err(AnalysisFailure::Unreported(ConfiguredValueCreationError::new(
                label.dupe(),
                self.cfg(),
                "Analysis failed",
                self.causes.clone(),
            ))
            .into());
        }

        let value = self.create_configured_target(
            ctx,
            &target,
            configuration.as_ref(),
            &conditions,
            computed.as_ref(),
            &deps,
        )?;
        Ok(value.with_edges(
            deps.keys(),
            self.toolchain_labels.clone(),
            self.transitive_packages.take_shared(),
        ))
    }

    fn create_configured_target(
        &mut self,
        ctx: &mut DiceComputations,
        target: &TargetNode,
        configuration: Option<&Configuration>,
        conditions: &ConfigConditions,
        computed: Option<&ComputedToolchainContexts>,
        deps: &DependencyBundle,
    ) -> Result<ConfiguredTargetValue, Abort> {
        let key = self.key;
        let label = key.label();
        let Some(rule) = target.rule() else {
            return Ok(ConfiguredTargetValue::source_file(label.dupe()));
        };
        let Some(implementation) = self.services.rules.rule(rule.id().as_str()).map(Dupe::dupe)
        else {
            return Err(self.creation_error(
                ErrorTag::InternalError,
                format!("No implementation registered for rule `{}`", rule.id()),
            ));
        };

        let toolchains = match computed.and_then(|c| c.contexts.as_ref()) {
            Some(unloaded) => Some(
                load_toolchain_contexts(unloaded, deps)
                    .map_err(|e| self.creation_error(e.best_tag(), e.to_string()))?,
            ),
            None => None,
        };
        let no_exec_groups;
        let exec_groups = match computed {
            Some(c) => &c.exec_groups,
            None => {
                no_exec_groups = ExecGroupCollection::new(ExecGroup::default(), &SmallMap::new());
                &no_exec_groups
            }
        };

        let errors_before = self.events.errors().count();
        let built = {
            let mut rctx = RuleContext {
                target,
                configuration,
                conditions,
                deps,
                toolchains: toolchains.as_ref(),
                exec_groups,
                events: &mut self.events,
                dice: &mut *ctx,
            };
            implementation.build(&mut rctx)
        };
        let output = match built {
            Ok(output) => Some(output),
            Err(Unwind::Suspend(s)) => return Err(Abort::Suspend(s)),
            Err(Unwind::Error(e)) => match e.best_tag() {
                tag @ (ErrorTag::ActionConflict | ErrorTag::InvalidExecGroup) => {
                    return Err(self.creation_error(tag, e.to_string()));
                }
                _ => {
                    self.events.handle(Event::error(Some(label.dupe()), e.to_string()));
                    None
                }
            },
        };

        let mut causes = RootCauses::default();
        for event in self.events.errors().skip(errors_before) {
            causes.add(Cause::new(
                label.dupe(),
                self.cfg(),
                ErrorTag::Analysis,
                event.message.clone(),
            ));
        }
        if !causes.is_empty() {
            return Err(ConfiguredValueCreationError::new(
                label.dupe(),
                self.cfg(),
                format!("Analysis of target '{}' failed", label),
                causes,
            )
            .into());
        }

        match output {
            Some(RuleOutput::Providers(providers)) => {
                Ok(ConfiguredTargetValue::rule(label.dupe(), self.cfg(), providers))
            }
            Some(RuleOutput::Alias(actual)) => {
                let found = deps.iter().find(|(dep, _)| {
                    dep.label() == &actual && matches!(dep.kind(), DependencyKind::Attribute { .. })
                });
                match found {
                    Some((_, value)) => {
                        Ok(ConfiguredTargetValue::alias(label.dupe(), &value.value))
                    }
                    None => Err(self.creation_error(
                        ErrorTag::Analysis,
                        format!(
                            "`{}` aliases `{}`, which is not one of its dependencies",
                            label, actual
                        ),
                    )),
                }
            }
            None => Err(self.creation_error(
                ErrorTag::InternalError,
                format!("rule `{}` produced no output", rule.id()),
            )),
        }
    }

    /// Turns a failure into the value of the node, reporting it unless it was reported
    /// already.
    fn report_failure(&mut self, failure: AnalysisFailure) -> ConfiguredValueCreationError {
        let label = self.key.label().dupe();
        match failure {
            AnalysisFailure::Dependency {
                error,
                dep_reported_own_error,
            } => {
                if !dep_reported_own_error {
                    self.events.handle(Event::error(Some(label.dupe()), error.message()));
                }
                let caused_by_toolchain = error
                    .root_causes()
                    .labels()
                    .any(|l| self.toolchain_labels.contains(l));
                let error = if caused_by_toolchain {
                    let message = format!("errors encountered resolving toolchains for {}", label);
                    self.events.handle(Event::error(Some(label.dupe()), message.clone()));
                    error.with_message(message)
                } else {
                    error
                };
                error.reported()
            }
            AnalysisFailure::Creation(error) => {
                if !error.message().is_empty() {
                    self.events.handle(Event::error(Some(label.dupe()), error.message()));
                }
                error.reported()
            }
            AnalysisFailure::Aspect(error) => error.reported(),
            AnalysisFailure::ToolchainResolution(e) => {
                let message = format!("While resolving toolchains for target {}: {}", label, e);
                self.events.handle(Event::error(Some(label.dupe()), message.clone()));
                ConfiguredValueCreationError::of_target(label, self.cfg(), e.best_tag(), message)
                    .reported()
            }
            AnalysisFailure::Unreported(error) => error,
        }
    }

    fn finish(
        self,
        result: Result<ConfiguredTargetValue, ConfiguredValueCreationError>,
    ) -> strata_error::Result<ConfiguredTargetValue> {
        self.events.replay_on(&*self.services.events);
        match result {
            Ok(value) => {
                if let Some(progress) = &self.services.progress {
                    progress.done_configure_target(self.key.label());
                }
                Ok(value)
            }
            Err(e) => {
                tracing::debug!("Analysis of {} failed: {}", self.key, e);
                Err(e.into())
            }
        }
    }
}
