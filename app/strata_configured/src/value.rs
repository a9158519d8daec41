/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Results of analysis.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use dupe::Dupe;
use strata_core::configuration::data::Configuration;
use strata_core::configuration::data::ConfigurationKey;
use strata_core::target::label::PackageLabel;
use strata_core::target::label::TargetLabel;
use strata_error::ErrorTag;
use strata_node::attrs::configuration_context::ConfigMatchingProvider;
use strata_node::nodes::target_node::TargetNode;

use crate::keys::ConfiguredTargetKey;

/// Provider name under which `select()` conditions expose their settings.
pub const CONFIG_MATCHING_PROVIDER: &str = "ConfigMatchingProvider";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderValue {
    Text(String),
    Labels(Vec<TargetLabel>),
    ConfigMatching(ConfigMatchingProvider),
    List(Vec<ProviderValue>),
}

#[derive(Debug, thiserror::Error)]
#[error("Provider `{0}` provided twice")]
pub struct DuplicateProviderError(pub String);

impl strata_error::ProvidesTag for DuplicateProviderError {
    fn error_tag(&self) -> ErrorTag {
        ErrorTag::DuplicateProvider
    }
}

/// Named values a target exposes to the targets depending on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Providers(BTreeMap<String, ProviderValue>);

impl Providers {
    pub fn new() -> Providers {
        Providers::default()
    }

    pub fn with(mut self, name: &str, value: ProviderValue) -> Self {
        self.0.insert(name.to_owned(), value);
        self
    }

    pub fn insert(
        &mut self,
        name: &str,
        value: ProviderValue,
    ) -> Result<(), DuplicateProviderError> {
        if self.0.contains_key(name) {
            return Err(DuplicateProviderError(name.to_owned()));
        }
        self.0.insert(name.to_owned(), value);
        Ok(())
    }

    /// Adds every provider of `other`, failing on the first name both have.
    pub fn merge(&mut self, other: &Providers) -> Result<(), DuplicateProviderError> {
        if let Some(name) = other.0.keys().find(|k| self.0.contains_key(*k)) {
            return Err(DuplicateProviderError(name.clone()));
        }
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ProviderValue> {
        self.0.get(name)
    }

    pub fn config_matching(&self) -> Option<&ConfigMatchingProvider> {
        match self.0.get(CONFIG_MATCHING_PROVIDER) {
            Some(ProviderValue::ConfigMatching(p)) => Some(p),
            _ => None,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ValueKind {
    /// Produced when the key's configuration does not fit the target's configurability.
    Empty,
    SourceFile,
    Rule,
}

#[derive(Debug, PartialEq, Eq)]
struct ConfiguredTargetValueData {
    label: TargetLabel,
    cfg: Option<ConfigurationKey>,
    kind: ValueKind,
    providers: Providers,
    /// Set when the value was produced by an alias, to the label of the alias.
    alias_label: Option<TargetLabel>,
    dependencies: Vec<ConfiguredTargetKey>,
    toolchains: BTreeSet<TargetLabel>,
    transitive_packages: Option<Arc<BTreeSet<PackageLabel>>>,
}

/// The analyzed form of a target.
///
/// For an alias, `label` and `cfg` are those of the target the alias resolves to.
#[derive(Debug, Clone, Dupe, PartialEq, Eq)]
pub struct ConfiguredTargetValue(Arc<ConfiguredTargetValueData>);

impl ConfiguredTargetValue {
    pub fn empty(label: TargetLabel, cfg: Option<ConfigurationKey>) -> Self {
        Self::build(label, cfg, ValueKind::Empty, Providers::new())
    }

    pub fn source_file(label: TargetLabel) -> Self {
        Self::build(label, None, ValueKind::SourceFile, Providers::new())
    }

    pub fn rule(label: TargetLabel, cfg: Option<ConfigurationKey>, providers: Providers) -> Self {
        Self::build(label, cfg, ValueKind::Rule, providers)
    }

    fn build(
        label: TargetLabel,
        cfg: Option<ConfigurationKey>,
        kind: ValueKind,
        providers: Providers,
    ) -> Self {
        ConfiguredTargetValue(Arc::new(ConfiguredTargetValueData {
            label,
            cfg,
            kind,
            providers,
            alias_label: None,
            dependencies: Vec::new(),
            toolchains: BTreeSet::new(),
            transitive_packages: None,
        }))
    }

    /// The value of `alias` standing for the value of its actual target.
    pub fn alias(alias: TargetLabel, actual: &ConfiguredTargetValue) -> Self {
        ConfiguredTargetValue(Arc::new(ConfiguredTargetValueData {
            label: actual.0.label.dupe(),
            cfg: actual.0.cfg.dupe(),
            kind: actual.0.kind.clone(),
            providers: actual.0.providers.clone(),
            alias_label: Some(alias),
            dependencies: Vec::new(),
            toolchains: BTreeSet::new(),
            transitive_packages: None,
        }))
    }

    pub(crate) fn with_edges(
        self,
        dependencies: Vec<ConfiguredTargetKey>,
        toolchains: BTreeSet<TargetLabel>,
        transitive_packages: Option<Arc<BTreeSet<PackageLabel>>>,
    ) -> Self {
        let data = &self.0;
        ConfiguredTargetValue(Arc::new(ConfiguredTargetValueData {
            label: data.label.dupe(),
            cfg: data.cfg.dupe(),
            kind: data.kind.clone(),
            providers: data.providers.clone(),
            alias_label: data.alias_label.dupe(),
            dependencies,
            toolchains,
            transitive_packages,
        }))
    }

    pub fn label(&self) -> &TargetLabel {
        &self.0.label
    }

    pub fn cfg(&self) -> Option<&ConfigurationKey> {
        self.0.cfg.as_ref()
    }

    pub fn providers(&self) -> &Providers {
        &self.0.providers
    }

    pub fn is_empty(&self) -> bool {
        self.0.kind == ValueKind::Empty
    }

    pub fn is_source_file(&self) -> bool {
        self.0.kind == ValueKind::SourceFile
    }

    pub fn alias_label(&self) -> Option<&TargetLabel> {
        self.0.alias_label.as_ref()
    }

    /// Keys of the direct dependencies, including toolchains, in resolution order.
    pub fn dependencies(&self) -> &[ConfiguredTargetKey] {
        &self.0.dependencies
    }

    /// Toolchain implementations resolved for the target, over every exec group.
    pub fn toolchains(&self) -> &BTreeSet<TargetLabel> {
        &self.0.toolchains
    }

    /// Packages loaded for this target and its dependencies, when recorded.
    pub fn transitive_packages(&self) -> Option<&BTreeSet<PackageLabel>> {
        self.0.transitive_packages.as_deref()
    }
}

/// A configured value together with the target node and configuration it came from.
#[derive(Debug, Clone, Dupe, PartialEq, Eq)]
pub struct ConfiguredTargetAndData {
    pub value: ConfiguredTargetValue,
    pub target: TargetNode,
    pub configuration: Option<Configuration>,
}

impl ConfiguredTargetAndData {
    pub fn label(&self) -> &TargetLabel {
        self.value.label()
    }

    pub fn providers(&self) -> &Providers {
        self.value.providers()
    }

    /// The same dependency with additional providers, contributed by aspects.
    pub(crate) fn with_extra_providers(
        &self,
        extra: &Providers,
    ) -> Result<ConfiguredTargetAndData, DuplicateProviderError> {
        if extra.is_empty() {
            return Ok(self.dupe());
        }
        let mut providers = self.value.providers().clone();
        providers.merge(extra)?;
        let data = &self.value.0;
        let value = ConfiguredTargetValue(Arc::new(ConfiguredTargetValueData {
            label: data.label.dupe(),
            cfg: data.cfg.dupe(),
            kind: data.kind.clone(),
            providers,
            alias_label: data.alias_label.dupe(),
            dependencies: data.dependencies.clone(),
            toolchains: data.toolchains.clone(),
            transitive_packages: data.transitive_packages.dupe(),
        }));
        Ok(ConfiguredTargetAndData {
            value,
            target: self.target.dupe(),
            configuration: self.configuration.dupe(),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use strata_core::target::label::TargetLabel;

    use crate::value::ConfiguredTargetValue;
    use crate::value::ProviderValue;
    use crate::value::Providers;

    #[test]
    fn test_merge_duplicate() {
        let mut a = Providers::new().with("info", ProviderValue::Text("a".to_owned()));
        let b = Providers::new().with("info", ProviderValue::Text("b".to_owned()));
        assert_matches!(a.merge(&b), Err(e) if e.0 == "info");

        let c = Providers::new().with("extra", ProviderValue::Text("c".to_owned()));
        a.merge(&c).unwrap();
        assert_eq!(vec!["extra", "info"], a.names().collect::<Vec<_>>());
    }

    #[test]
    fn test_alias_takes_actual_label() {
        let actual = ConfiguredTargetValue::rule(
            TargetLabel::testing_parse("//y:b"),
            None,
            Providers::new().with("info", ProviderValue::Text("b".to_owned())),
        );
        let alias = ConfiguredTargetValue::alias(TargetLabel::testing_parse("//x:a"), &actual);
        assert_eq!("//y:b", alias.label().to_string());
        assert_eq!(Some("//x:a".to_owned()), alias.alias_label().map(|l| l.to_string()));
        assert_eq!(actual.providers(), alias.providers());
    }
}
