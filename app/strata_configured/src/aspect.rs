/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Aspects: extra analysis of a dependency requested by the attribute that declares the edge.

use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use allocative::Allocative;
use dupe::Dupe;
use strata_dice::Demand;
use strata_dice::DiceComputations;
use strata_dice::Key;
use strata_error::ErrorTag;
use strata_node::aspect::AspectClass;
use strata_node::aspect::AspectId;

use crate::alias::TransitivePackages;
use crate::conditions::ConfigConditions;
use crate::dependencies::compute_dependencies;
use crate::dependencies::DependencyContext;
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
use crate::rule::AspectContext;
use crate::rule::Unwind;
use crate::services::AnalysisServices;
use crate::services::HasAnalysisServices;
use crate::value::ConfiguredTargetAndData;
use crate::value::Providers;

/// An aspect applied to a configured target.
#[derive(Debug, Clone, PartialEq, Eq, Allocative)]
pub struct AspectKey {
    aspect: Arc<AspectClass>,
    base: ConfiguredTargetKey,
}

impl Hash for AspectKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.aspect.id().hash(state);
        self.base.hash(state);
    }
}

impl fmt::Display for AspectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aspect {} on {}", self.aspect.id(), self.base)
    }
}

impl AspectKey {
    pub fn new(aspect: Arc<AspectClass>, base: ConfiguredTargetKey) -> Self {
        AspectKey { aspect, base }
    }

    pub fn aspect(&self) -> &AspectClass {
        &self.aspect
    }

    pub fn base(&self) -> &ConfiguredTargetKey {
        &self.base
    }
}

#[derive(Debug, PartialEq, Eq)]
struct AspectValueData {
    aspect: AspectId,
    base: ConfiguredTargetKey,
    providers: Providers,
}

/// Providers an aspect adds to the target it is applied to.
#[derive(Debug, Clone, Dupe, PartialEq, Eq)]
pub struct AspectValue(Arc<AspectValueData>);

impl AspectValue {
    pub fn aspect(&self) -> &AspectId {
        &self.0.aspect
    }

    pub fn base(&self) -> &ConfiguredTargetKey {
        &self.0.base
    }

    pub fn providers(&self) -> &Providers {
        &self.0.providers
    }
}

impl Key for AspectKey {
    type Value = strata_error::Result<AspectValue>;

    fn compute(&self, ctx: &mut DiceComputations) -> Demand<Self::Value> {
        let services = match ctx.global_data().get_analysis_services() {
            Ok(services) => services,
            Err(e) => return Ok(Err(e)),
        };
        let mut events = StoredEvents::default();
        let result = match evaluate_aspect(self, ctx, &services, &mut events) {
            Ok(value) => Ok(value),
            Err(Abort::Suspend(s)) => return Err(s),
            Err(Abort::Failure(failure)) => Err(report_failure(self, failure, &mut events)),
        };
        events.replay_on(&*services.events);
        Ok(result.map_err(strata_error::Error::from))
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

fn report_failure(
    key: &AspectKey,
    failure: AnalysisFailure,
    events: &mut StoredEvents,
) -> ConfiguredValueCreationError {
    let label = key.base.label();
    match failure {
        AnalysisFailure::Dependency {
            error,
            dep_reported_own_error,
        } => {
            if !dep_reported_own_error {
                events.handle(Event::error(Some(label.dupe()), error.message()));
            }
            error.reported()
        }
        AnalysisFailure::Creation(error) => {
            if !error.message().is_empty() {
                events.handle(Event::error(Some(label.dupe()), error.message()));
            }
            error.reported()
        }
        AnalysisFailure::Aspect(error) => error.reported(),
        AnalysisFailure::ToolchainResolution(e) => {
            events.handle(Event::error(Some(label.dupe()), e.to_string()));
            ConfiguredValueCreationError::of_target(
                label.dupe(),
                key.base.cfg().map(Dupe::dupe),
                e.best_tag(),
                e.to_string(),
            )
            .reported()
        }
        AnalysisFailure::Unreported(error) => error,
    }
}

fn evaluate_aspect(
    key: &AspectKey,
    ctx: &mut DiceComputations,
    services: &AnalysisServices,
    events: &mut StoredEvents,
) -> Result<AspectValue, Abort> {
    let base_value = match ctx.compute(&key.base)? {
        Ok(value) => value,
        Err(e) => {
            let error = as_creation_error(key.base.label(), key.base.cfg(), &e);
            return Err(AnalysisFailure::Aspect(error).into());
        }
    };
    let label = base_value.label().dupe();
    let cfg = base_value.cfg().map(Dupe::dupe);
    let creation_error = |code: ErrorTag, message: String| {
        Abort::from(ConfiguredValueCreationError::of_target(
            label.dupe(),
            cfg.dupe(),
            code,
            message,
        ))
    };

    let cfg_keys: Vec<ConfigurationLookupKey> =
        cfg.iter().map(|c| ConfigurationLookupKey(c.dupe())).collect();
    let (packages, configurations) =
        ctx.compute_many2(&[PackageKey(label.pkg().dupe())], &cfg_keys)?;
    let target = match packages.into_iter().next() {
        Some(Ok(package)) => match package.get_target(label.name()) {
            Ok(target) => target.dupe(),
            Err(e) => return Err(creation_error(ErrorTag::TargetNotFound, e.to_string())),
        },
        Some(Err(e)) => return Err(creation_error(e.best_tag(), e.to_string())),
        None => {
            return Err(creation_error(
                ErrorTag::InternalError,
                format!("package of `{}` was not requested", label),
            ));
        }
    };
    let base = ConfiguredTargetAndData {
        value: base_value,
        target,
        configuration: configurations.into_iter().next(),
    };

    let mut causes = RootCauses::default();
    let mut transitive_packages = TransitivePackages::new(false);
    let conditions = ConfigConditions::empty();
    let dcx = DependencyContext {
        target: &base.target,
        configuration: base.configuration.as_ref(),
        conditions: &conditions,
        toolchains: None,
        aspect: Some(&key.aspect),
    };
    let deps = compute_dependencies(ctx, &dcx, &mut transitive_packages, &mut causes, events)?;
    if !causes.is_empty() {
        return Err(AnalysisFailure::Unreported(ConfiguredValueCreationError::new(
            label.dupe(),
            cfg.dupe(),
            format!("Analysis of aspect '{}' on {} failed", key.aspect.id(), label),
            causes,
        ))
        .into());
    }

    let Some(implementation) = services.rules.aspect(key.aspect.id()) else {
        return Err(creation_error(
            ErrorTag::InternalError,
            format!("No implementation registered for aspect `{}`", key.aspect.id()),
        ));
    };

    let errors_before = events.errors().count();
    let built = {
        let mut actx = AspectContext {
            aspect: &key.aspect,
            base: &base,
            deps: &deps,
            events: &mut *events,
            dice: &mut *ctx,
        };
        implementation.build(&mut actx)
    };
    let providers = match built {
        Ok(providers) => Some(providers),
        Err(Unwind::Suspend(s)) => return Err(Abort::Suspend(s)),
        Err(Unwind::Error(e)) => {
            events.handle(Event::error(Some(label.dupe()), format!("{:#}", e)));
            None
        }
    };

    let mut causes = RootCauses::default();
    for event in events.errors().skip(errors_before) {
        causes.add(Cause::new(
            label.dupe(),
            cfg.dupe(),
            ErrorTag::Analysis,
            event.message.clone(),
        ));
    }
    match providers {
        Some(providers) if causes.is_empty() => Ok(AspectValue(Arc::new(AspectValueData {
            aspect: key.aspect.id().clone(),
            base: key.base.dupe(),
            providers,
        }))),
        _ => Err(ConfiguredValueCreationError::new(
            label.dupe(),
            cfg,
            format!("Analysis of aspect '{}' on {} failed", key.aspect.id(), label),
            causes,
        )
        .into()),
    }
}
