/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use allocative::Allocative;
use dupe::Dupe;
use itertools::Itertools;
use strata_core::configuration::config_setting::ConfigSettingData;
use strata_core::target::label::TargetLabel;
use strata_error::ErrorTag;
use strata_error::ProvidesTag;

use crate::attrs::configuration_context::AttrConfigurationContext;
use crate::attrs::configured_attr::ConfiguredAttr;

#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error("None of {} conditions matched configuration `{}` and no default was set:\n{}",
        .1.len(),
        .0,
        .1.iter().map(|s| format!("  {}", s)).join("\n"),
    )]
    MissingDefault(String, Vec<TargetLabel>),
    #[error(
        "Both select keys `{0}` and `{1}` match the configuration, but neither is more specific"
    )]
    TwoKeysDoNotRefineEachOther(String, String),
    #[error("concat with no items (internal error)")]
    ConcatEmpty,
    #[error("duplicate key `{0}` in `select()`")]
    DuplicateKey(String),
}

impl ProvidesTag for SelectError {
    fn error_tag(&self) -> ErrorTag {
        match self {
            SelectError::ConcatEmpty => ErrorTag::InternalError,
            _ => ErrorTag::ConfigCondition,
        }
    }
}

/// The `select()` expression of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Allocative)]
pub struct CoercedSelector {
    entries: Vec<(TargetLabel, CoercedAttr)>,
    default: Option<CoercedAttr>,
}

impl CoercedSelector {
    pub fn new(
        entries: Vec<(TargetLabel, CoercedAttr)>,
        default: Option<CoercedAttr>,
    ) -> strata_error::Result<CoercedSelector> {
        for (i, (k, _)) in entries.iter().enumerate() {
            if entries[..i].iter().any(|(prev, _)| prev == k) {
                return Err(SelectError::DuplicateKey(k.to_string()).into());
            }
        }
        Ok(CoercedSelector { entries, default })
    }

    pub fn entries(&self) -> &[(TargetLabel, CoercedAttr)] {
        &self.entries
    }

    pub fn default(&self) -> Option<&CoercedAttr> {
        self.default.as_ref()
    }
}

/// An attribute value as written in the package, possibly containing `select()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Allocative)]
pub enum CoercedAttr {
    None,
    Bool(bool),
    String(String),
    Label(TargetLabel),
    List(Vec<CoercedAttr>),
    Dict(Vec<(CoercedAttr, CoercedAttr)>),
    Selector(Box<CoercedSelector>),
    Concat(Vec<CoercedAttr>),
}

impl CoercedAttr {
    pub fn string(s: &str) -> CoercedAttr {
        CoercedAttr::String(s.to_owned())
    }

    pub fn label_list(labels: &[TargetLabel]) -> CoercedAttr {
        CoercedAttr::List(labels.iter().map(|l| CoercedAttr::Label(l.dupe())).collect())
    }

    /// Finds the entry to use among the matching conditions of a `select()`.
    ///
    /// When several conditions match, the one that refines all others wins.
    pub fn select_the_most_specific<'a>(
        ctx: &dyn AttrConfigurationContext,
        select_entries: &'a [(TargetLabel, CoercedAttr)],
    ) -> strata_error::Result<Option<&'a CoercedAttr>> {
        let mut matching: Option<(&TargetLabel, &ConfigSettingData, &CoercedAttr)> = None;
        for (k, v) in select_entries {
            matching = match (ctx.matches(k)?, matching) {
                (None, matching) => matching,
                (Some(conf), None) => Some((k, conf, v)),
                (Some(conf), Some((prev_k, prev_conf, prev_v))) => {
                    if conf.refines(prev_conf) {
                        Some((k, conf, v))
                    } else if prev_conf.refines(conf) {
                        Some((prev_k, prev_conf, prev_v))
                    } else {
                        return Err(SelectError::TwoKeysDoNotRefineEachOther(
                            prev_k.to_string(),
                            k.to_string(),
                        )
                        .into());
                    }
                }
            }
        }
        Ok(matching.map(|(_k, _conf, v)| v))
    }

    /// Returns the "configured" representation of the attribute in the provided context.
    pub fn configure(
        &self,
        ctx: &dyn AttrConfigurationContext,
    ) -> strata_error::Result<ConfiguredAttr> {
        match self {
            CoercedAttr::None => Ok(ConfiguredAttr::None),
            CoercedAttr::Bool(b) => Ok(ConfiguredAttr::Bool(*b)),
            CoercedAttr::String(s) => Ok(ConfiguredAttr::String(s.clone())),
            CoercedAttr::Label(l) => Ok(ConfiguredAttr::Label(l.dupe())),
            CoercedAttr::List(items) => Ok(ConfiguredAttr::List(
                items
                    .iter()
                    .map(|item| item.configure(ctx))
                    .collect::<strata_error::Result<_>>()?,
            )),
            CoercedAttr::Dict(entries) => Ok(ConfiguredAttr::Dict(
                entries
                    .iter()
                    .map(|(k, v)| {
                        Ok::<_, strata_error::Error>((k.configure(ctx)?, v.configure(ctx)?))
                    })
                    .collect::<strata_error::Result<_>>()?,
            )),
            CoercedAttr::Selector(selector) => {
                if let Some(v) = Self::select_the_most_specific(ctx, &selector.entries)? {
                    return v.configure(ctx);
                }
                selector
                    .default
                    .as_ref()
                    .ok_or_else(|| {
                        SelectError::MissingDefault(
                            ctx.cfg().to_string(),
                            selector.entries.iter().map(|(k, _)| k.dupe()).collect(),
                        )
                    })?
                    .configure(ctx)
            }
            CoercedAttr::Concat(items) => {
                let singleton = items.len() == 1;
                let mut it = items.iter().map(|item| item.configure(ctx));
                let first = it.next().ok_or(SelectError::ConcatEmpty)??;
                if singleton {
                    Ok(first)
                } else {
                    first.concat(&mut it)
                }
            }
        }
    }

    /// Condition labels of every `select()` in the value, including nested ones.
    pub fn select_keys(&self, out: &mut Vec<TargetLabel>) {
        match self {
            CoercedAttr::Selector(selector) => {
                for (k, v) in &selector.entries {
                    if !out.contains(k) {
                        out.push(k.dupe());
                    }
                    v.select_keys(out);
                }
                if let Some(d) = &selector.default {
                    d.select_keys(out);
                }
            }
            CoercedAttr::List(items) | CoercedAttr::Concat(items) => {
                for item in items {
                    item.select_keys(out);
                }
            }
            CoercedAttr::Dict(entries) => {
                for (k, v) in entries {
                    k.select_keys(out);
                    v.select_keys(out);
                }
            }
            CoercedAttr::None
            | CoercedAttr::Bool(_)
            | CoercedAttr::String(_)
            | CoercedAttr::Label(_) => {}
        }
    }

    /// Labels reachable through any branch of any `select()`, excluding the condition keys.
    pub fn all_labels(&self, out: &mut Vec<TargetLabel>) {
        match self {
            CoercedAttr::Label(l) => {
                if !out.contains(l) {
                    out.push(l.dupe());
                }
            }
            CoercedAttr::Selector(selector) => {
                for (_, v) in &selector.entries {
                    v.all_labels(out);
                }
                if let Some(d) = &selector.default {
                    d.all_labels(out);
                }
            }
            CoercedAttr::List(items) | CoercedAttr::Concat(items) => {
                for item in items {
                    item.all_labels(out);
                }
            }
            CoercedAttr::Dict(entries) => {
                for (k, v) in entries {
                    k.all_labels(out);
                    v.all_labels(out);
                }
            }
            CoercedAttr::None | CoercedAttr::Bool(_) | CoercedAttr::String(_) => {}
        }
    }

    /// The value when it contains no `select()`.
    pub fn as_unconfigured(&self) -> Option<ConfiguredAttr> {
        match self {
            CoercedAttr::None => Some(ConfiguredAttr::None),
            CoercedAttr::Bool(b) => Some(ConfiguredAttr::Bool(*b)),
            CoercedAttr::String(s) => Some(ConfiguredAttr::String(s.clone())),
            CoercedAttr::Label(l) => Some(ConfiguredAttr::Label(l.dupe())),
            CoercedAttr::List(items) => Some(ConfiguredAttr::List(
                items.iter().map(|i| i.as_unconfigured()).collect::<Option<_>>()?,
            )),
            CoercedAttr::Dict(entries) => Some(ConfiguredAttr::Dict(
                entries
                    .iter()
                    .map(|(k, v)| Some((k.as_unconfigured()?, v.as_unconfigured()?)))
                    .collect::<Option<_>>()?,
            )),
            CoercedAttr::Selector(_) | CoercedAttr::Concat(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use assert_matches::assert_matches;
    use dupe::Dupe;
    use strata_core::configuration::config_setting::ConfigSettingData;
    use strata_core::configuration::data::Configuration;
    use strata_core::configuration::data::ConfigurationKey;
    use strata_core::configuration::options::BuildOptions;
    use strata_core::target::label::TargetLabel;

    use crate::attrs::coerced_attr::CoercedAttr;
    use crate::attrs::coerced_attr::CoercedSelector;
    use crate::attrs::coerced_attr::SelectError;
    use crate::attrs::configuration_context::AttrConfigurationContext;
    use crate::attrs::configured_attr::ConfiguredAttr;

    struct TestContext {
        cfg: Configuration,
        conditions: BTreeMap<TargetLabel, ConfigSettingData>,
    }

    impl AttrConfigurationContext for TestContext {
        fn matches(
            &self,
            label: &TargetLabel,
        ) -> strata_error::Result<Option<&ConfigSettingData>> {
            Ok(self
                .conditions
                .get(label)
                .filter(|s| s.matches(self.cfg.options())))
        }

        fn cfg(&self) -> &Configuration {
            &self.cfg
        }
    }

    fn setting(values: &[(&str, &str)]) -> ConfigSettingData {
        ConfigSettingData {
            values: values
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            flag_values: BTreeMap::new(),
        }
    }

    fn ctx() -> TestContext {
        let options = BuildOptions::default()
            .with_option("cpp", "opt", "2")
            .with_option("cpu", "arch", "x86");
        TestContext {
            cfg: Configuration::new(ConfigurationKey::new(options)),
            conditions: BTreeMap::from([
                (
                    TargetLabel::testing_parse("//c:opt"),
                    setting(&[("cpp.opt", "2")]),
                ),
                (
                    TargetLabel::testing_parse("//c:opt_x86"),
                    setting(&[("cpp.opt", "2"), ("cpu.arch", "x86")]),
                ),
                (
                    TargetLabel::testing_parse("//c:x86"),
                    setting(&[("cpu.arch", "x86")]),
                ),
                (
                    TargetLabel::testing_parse("//c:arm"),
                    setting(&[("cpu.arch", "arm")]),
                ),
            ]),
        }
    }

    fn select(keys: &[&str], default: Option<&str>) -> CoercedAttr {
        CoercedAttr::Selector(Box::new(
            CoercedSelector::new(
                keys.iter()
                    .map(|k| (TargetLabel::testing_parse(k), CoercedAttr::string(k)))
                    .collect(),
                default.map(CoercedAttr::string),
            )
            .unwrap(),
        ))
    }

    #[test]
    fn test_refinement_picks_most_specific() {
        let attr = select(&["//c:opt", "//c:opt_x86"], None);
        assert_eq!(
            ConfiguredAttr::String("//c:opt_x86".to_owned()),
            attr.configure(&ctx()).unwrap()
        );
    }

    #[test]
    fn test_ambiguous() {
        let attr = select(&["//c:opt", "//c:x86"], None);
        let e = attr.configure(&ctx()).unwrap_err();
        assert_matches!(
            e.downcast_ref::<SelectError>(),
            Some(SelectError::TwoKeysDoNotRefineEachOther(_, _))
        );
    }

    #[test]
    fn test_default_and_missing() {
        let attr = select(&["//c:arm"], Some("fallback"));
        assert_eq!(
            ConfiguredAttr::String("fallback".to_owned()),
            attr.configure(&ctx()).unwrap()
        );
        let attr = select(&["//c:arm"], None);
        let e = attr.configure(&ctx()).unwrap_err();
        assert_matches!(
            e.downcast_ref::<SelectError>(),
            Some(SelectError::MissingDefault(_, keys)) if keys.len() == 1
        );
    }

    #[test]
    fn test_concat_and_keys() {
        let a = TargetLabel::testing_parse("//lib:a");
        let b = TargetLabel::testing_parse("//lib:b");
        let attr = CoercedAttr::Concat(vec![
            CoercedAttr::label_list(&[a.dupe()]),
            CoercedAttr::Selector(Box::new(
                CoercedSelector::new(
                    vec![(
                        TargetLabel::testing_parse("//c:x86"),
                        CoercedAttr::label_list(&[b.dupe()]),
                    )],
                    Some(CoercedAttr::label_list(&[])),
                )
                .unwrap(),
            )),
        ]);
        assert_eq!(
            vec![a.dupe(), b.dupe()],
            attr.configure(&ctx()).unwrap().labels()
        );
        let mut keys = Vec::new();
        attr.select_keys(&mut keys);
        assert_eq!(vec![TargetLabel::testing_parse("//c:x86")], keys);
        let mut labels = Vec::new();
        attr.all_labels(&mut labels);
        assert_eq!(vec![a, b], labels);
    }

    #[test]
    fn test_duplicate_key() {
        let k = TargetLabel::testing_parse("//c:x86");
        let e = CoercedSelector::new(
            vec![
                (k.dupe(), CoercedAttr::None),
                (k.dupe(), CoercedAttr::None),
            ],
            None,
        )
        .unwrap_err();
        assert_matches!(e.downcast_ref::<SelectError>(), Some(SelectError::DuplicateKey(_)));
    }
}
