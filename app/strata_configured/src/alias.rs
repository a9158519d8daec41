/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Evaluates a batch of dependencies, following aliases to the targets they stand for.
//!
//! The value of an alias carries the label of its actual target, which may live in another
//! package. The first pass requests every dependency value together with the package of the
//! requested label; a second pass loads the packages of actual targets that live elsewhere.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;

use dupe::Dupe;
use dupe::IterDupedExt;
use dupe::OptionDupedExt;
use itertools::Itertools;
use strata_core::configuration::data::Configuration;
use strata_core::configuration::data::ConfigurationKey;
use strata_core::target::label::PackageLabel;
use strata_core::target::label::TargetLabel;
use strata_dice::DiceComputations;
use strata_error::choose_more_important_with_first_if_tie;
use strata_error::ErrorTag;
use strata_node::nodes::target_node::TargetNode;
use strata_node::package::Package;

use crate::dependencies::Dependency;
use crate::errors::as_creation_error;
use crate::errors::Abort;
use crate::errors::AnalysisFailure;
use crate::errors::ConfiguredValueCreationError;
use crate::errors::RootCauses;
use crate::keys::ConfigurationLookupKey;
use crate::keys::ConfiguredTargetKey;
use crate::keys::PackageKey;
use crate::value::ConfiguredTargetAndData;
use crate::value::ConfiguredTargetValue;

/// Packages loaded for a node and its dependencies, when recording is enabled.
#[derive(Debug, Default)]
pub(crate) struct TransitivePackages(Option<BTreeSet<PackageLabel>>);

impl TransitivePackages {
    pub(crate) fn new(enabled: bool) -> Self {
        TransitivePackages(if enabled { Some(BTreeSet::new()) } else { None })
    }

    pub(crate) fn add(&mut self, package: &PackageLabel) {
        if let Some(packages) = &mut self.0 {
            packages.insert(package.dupe());
        }
    }

    pub(crate) fn add_all(&mut self, other: Option<&BTreeSet<PackageLabel>>) {
        if let (Some(packages), Some(other)) = (&mut self.0, other) {
            packages.extend(other.iter().duped());
        }
    }

    pub(crate) fn take_shared(&mut self) -> Option<Arc<BTreeSet<PackageLabel>>> {
        self.0.take().map(Arc::new)
    }
}

/// The most important failure among dependency values. Ties keep the first one seen.
#[derive(Default)]
struct DependencyFailures {
    code: Option<ErrorTag>,
    root_error: Option<ConfiguredValueCreationError>,
    /// Some failure was found here rather than reported by the dependency itself.
    unreported: bool,
}

impl DependencyFailures {
    fn add(&mut self, error: ConfiguredValueCreationError, causes: &mut RootCauses) {
        causes.add_all(error.root_causes());
        let code = choose_more_important_with_first_if_tie(self.code, error.detailed_code());
        if self.root_error.is_none() || code != self.code {
            self.root_error = Some(error);
        }
        self.code = code;
    }

    fn add_unreported(&mut self, error: ConfiguredValueCreationError, causes: &mut RootCauses) {
        self.unreported = true;
        self.add(error, causes);
    }

    /// Raises the failure on behalf of `label`, with every cause collected so far.
    fn into_result(
        self,
        label: &TargetLabel,
        cfg: Option<&ConfigurationKey>,
        causes: &RootCauses,
    ) -> Result<(), Abort> {
        match self.root_error {
            Some(error) => Err(AnalysisFailure::Dependency {
                error: ConfiguredValueCreationError::new(
                    label.dupe(),
                    cfg.duped(),
                    error.message(),
                    causes.clone(),
                )
                .with_detailed_code(choose_more_important_with_first_if_tie(
                    causes.most_important(),
                    self.code,
                )),
                dep_reported_own_error: !self.unreported,
            }
            .into()),
            None => Ok(()),
        }
    }
}

struct PartialValue {
    value: ConfiguredTargetValue,
    target: Option<TargetNode>,
    configuration: Option<Configuration>,
}

fn lookup_target(
    dep: &Dependency,
    value: &ConfiguredTargetValue,
    package: &strata_error::Result<Package>,
) -> Result<TargetNode, ConfiguredValueCreationError> {
    let found = match package {
        Ok(package) => package
            .get_target(value.label().name())
            .map(|t| t.dupe())
            .map_err(strata_error::Error::from),
        Err(e) => Err(e.dupe()),
    };
    found.map_err(|e| as_creation_error(dep.label(), dep.cfg(), &e))
}

/// Evaluates `deps`, returning their values in the same order.
///
/// Every failing dependency contributes its root causes to `causes`; the most important
/// failure is then raised as a dependency failure.
pub(crate) fn resolve_configured_target_dependencies(
    ctx: &mut DiceComputations,
    owner: &TargetLabel,
    owner_cfg: Option<&ConfigurationKey>,
    deps: &[Dependency],
    transitive_packages: &mut TransitivePackages,
    causes: &mut RootCauses,
) -> Result<Vec<ConfiguredTargetAndData>, Abort> {
    if deps.is_empty() {
        return Ok(Vec::new());
    }

    // First pass: dependency values and the packages of the requested labels.
    let keys: Vec<ConfiguredTargetKey> = deps.iter().map(Dependency::key).collect();
    let package_keys: Vec<PackageKey> = deps
        .iter()
        .map(|d| PackageKey(d.label().pkg().dupe()))
        .collect();
    let (values, packages) = ctx.compute_many2(&keys, &package_keys)?;

    let mut failures = DependencyFailures::default();
    let mut partial: Vec<Option<PartialValue>> = Vec::with_capacity(deps.len());
    for ((dep, value), package) in deps.iter().zip(values).zip(&packages) {
        let value = match value {
            Ok(value) => value,
            Err(e) => {
                failures.add(as_creation_error(dep.label(), dep.cfg(), &e), causes);
                partial.push(None);
                continue;
            }
        };
        transitive_packages.add_all(value.transitive_packages());

        let target = if value.label().pkg() == dep.label().pkg() {
            match lookup_target(dep, &value, package) {
                Ok(target) => Some(target),
                Err(e) => {
                    failures.add_unreported(e, causes);
                    partial.push(None);
                    continue;
                }
            }
        } else {
            None
        };
        // The value may have been computed in another configuration, for example by an
        // alias with a transition. Those configurations are looked up below.
        let configuration = if value.cfg() == dep.cfg() {
            dep.configuration().map(Dupe::dupe)
        } else {
            None
        };
        partial.push(Some(PartialValue {
            value,
            target,
            configuration,
        }));
    }
    failures.into_result(owner, owner_cfg, causes)?;

    // Second pass: packages of actual targets elsewhere, and refreshed configurations.
    let alias_packages: Vec<PackageKey> = partial
        .iter()
        .flatten()
        .filter(|p| p.target.is_none())
        .map(|p| PackageKey(p.value.label().pkg().dupe()))
        .unique()
        .collect();
    let refreshed: Vec<ConfigurationLookupKey> = partial
        .iter()
        .flatten()
        .filter(|p| p.configuration.is_none())
        .filter_map(|p| p.value.cfg().map(|c| ConfigurationLookupKey(c.dupe())))
        .unique()
        .collect();
    if !alias_packages.is_empty() || !refreshed.is_empty() {
        let (packages, configurations) = ctx.compute_many2(&alias_packages, &refreshed)?;
        let packages: HashMap<PackageLabel, strata_error::Result<Package>> = alias_packages
            .iter()
            .map(|k| k.0.dupe())
            .zip(packages)
            .collect();
        let configurations: HashMap<ConfigurationKey, Configuration> = refreshed
            .iter()
            .map(|k| k.0.dupe())
            .zip(configurations)
            .collect();

        let mut failures = DependencyFailures::default();
        for (dep, slot) in deps.iter().zip(partial.iter_mut()) {
            let Some(p) = slot else {
                continue;
            };
            if p.target.is_none() {
                let package = packages.get(p.value.label().pkg()).ok_or_else(|| {
                    Abort::from(ConfiguredValueCreationError::of_target(
                        dep.label().dupe(),
                        dep.cfg().map(Dupe::dupe),
                        ErrorTag::InternalError,
                        format!("package of `{}` was not requested", p.value.label()),
                    ))
                })?;
                match lookup_target(dep, &p.value, package) {
                    Ok(target) => p.target = Some(target),
                    Err(e) => {
                        failures.add_unreported(e, causes);
                        *slot = None;
                        continue;
                    }
                }
            }
            if p.configuration.is_none() {
                p.configuration = p
                    .value
                    .cfg()
                    .and_then(|c| configurations.get(c))
                    .map(Dupe::dupe);
            }
        }
        failures.into_result(owner, owner_cfg, causes)?;
    }

    partial
        .into_iter()
        .zip(deps)
        .map(|(p, dep)| match p {
            Some(PartialValue {
                value,
                target: Some(target),
                configuration,
            }) => Ok(ConfiguredTargetAndData {
                value,
                target,
                configuration,
            }),
            _ => Err(ConfiguredValueCreationError::of_target(
                dep.label().dupe(),
                dep.cfg().map(Dupe::dupe),
                ErrorTag::InternalError,
                format!("dependency `{}` was not resolved", dep.label()),
            )
            .into()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use strata_core::target::label::TargetLabel;
    use strata_error::ErrorTag;

    use crate::alias::DependencyFailures;
    use crate::errors::Abort;
    use crate::errors::AnalysisFailure;
    use crate::errors::Cause;
    use crate::errors::ConfiguredValueCreationError;
    use crate::errors::RootCauses;

    fn failed(label: &str, code: ErrorTag) -> ConfiguredValueCreationError {
        ConfiguredValueCreationError::of_target(
            TargetLabel::testing_parse(label),
            None,
            code,
            format!("{} failed", label),
        )
    }

    #[test]
    fn test_detailed_code_ranks_every_cause() {
        let mut causes = RootCauses::default();
        causes.add(Cause::new(
            TargetLabel::testing_parse("//b:lost"),
            None,
            ErrorTag::TargetNotFound,
            "no such target",
        ));
        let mut failures = DependencyFailures::default();
        failures.add(failed("//a:broken", ErrorTag::Analysis), &mut causes);

        let owner = TargetLabel::testing_parse("//top:all");
        assert_matches!(
            failures.into_result(&owner, None, &causes),
            Err(Abort::Failure(AnalysisFailure::Dependency {
                error,
                dep_reported_own_error: true,
            })) => {
                assert_eq!(&owner, error.label());
                assert_eq!("//a:broken failed", error.message());
                assert_eq!(2, error.root_causes().len());
                assert_eq!(Some(ErrorTag::TargetNotFound), error.detailed_code());
            }
        );
    }

    #[test]
    fn test_lookup_failure_does_not_hide_siblings() {
        let mut causes = RootCauses::default();
        let mut failures = DependencyFailures::default();
        failures.add_unreported(failed("//a:gone", ErrorTag::TargetNotFound), &mut causes);
        failures.add(failed("//b:broken", ErrorTag::Analysis), &mut causes);

        let owner = TargetLabel::testing_parse("//top:all");
        assert_matches!(
            failures.into_result(&owner, None, &causes),
            Err(Abort::Failure(AnalysisFailure::Dependency {
                error,
                dep_reported_own_error: false,
            })) => {
                assert_eq!("//a:gone failed", error.message());
                assert_eq!(2, error.root_causes().len());
            }
        );
    }

    #[test]
    fn test_no_failures() {
        let owner = TargetLabel::testing_parse("//top:all");
        assert_matches!(
            DependencyFailures::default().into_result(&owner, None, &RootCauses::default()),
            Ok(())
        );
    }
}
