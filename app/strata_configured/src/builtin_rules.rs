/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Rules every workspace has.

use std::sync::Arc;

use dupe::Dupe;
use strata_core::configuration::config_setting::ConfigSettingData;
use strata_core::target::label::TargetLabel;
use strata_error::ErrorTag;
use strata_node::attrs::attr::Attribute;
use strata_node::attrs::coerced_attr::CoercedAttr;
use strata_node::attrs::configuration_context::ConfigMatchingProvider;
use strata_node::attrs::configured_attr::ConfiguredAttr;
use strata_node::rule::RuleClass;

use crate::rule::RuleContext;
use crate::rule::RuleImplementation;
use crate::rule::RuleOutput;
use crate::rule::RuleRegistry;
use crate::rule::Unwind;
use crate::value::ProviderValue;
use crate::value::Providers;
use crate::value::CONFIG_MATCHING_PROVIDER;

pub const CONFIG_SETTING_RULE: &str = "config_setting";
pub const ALIAS_RULE: &str = "alias";

/// `config_setting(values = {"fragment.option": "value"}, flag_values = {flag: "value"})`
pub fn config_setting_rule() -> strata_error::Result<Arc<RuleClass>> {
    RuleClass::builder(CONFIG_SETTING_RULE)
        .attribute(Attribute::value("values", CoercedAttr::Dict(Vec::new())).nonconfigurable())
        .attribute(
            Attribute::value("flag_values", CoercedAttr::Dict(Vec::new())).nonconfigurable(),
        )
        .uses_toolchain_resolution(false)
        .build()
}

/// `alias(actual = label)`
pub fn alias_rule() -> strata_error::Result<Arc<RuleClass>> {
    RuleClass::builder(ALIAS_RULE)
        .attribute(Attribute::dep("actual"))
        .uses_toolchain_resolution(false)
        .build()
}

pub(crate) fn register_builtin_rules(registry: &mut RuleRegistry) {
    registry.register_rule(CONFIG_SETTING_RULE, Arc::new(ConfigSettingImpl));
    registry.register_rule(ALIAS_RULE, Arc::new(AliasImpl));
}

fn dict_entries<'a>(
    attr: &'a ConfiguredAttr,
    name: &str,
) -> strata_error::Result<&'a [(ConfiguredAttr, ConfiguredAttr)]> {
    attr.as_dict().ok_or_else(|| {
        strata_error::strata_error!(ErrorTag::Input, "`{}` must be a dict", name)
    })
}

struct ConfigSettingImpl;

impl RuleImplementation for ConfigSettingImpl {
    fn build(&self, ctx: &mut RuleContext<'_>) -> Result<RuleOutput, Unwind> {
        let mut settings = ConfigSettingData::default();

        let values = ctx.attr("values")?;
        for (k, v) in dict_entries(&values, "values")? {
            match (k.as_str(), v.as_str()) {
                (Some(k), Some(v)) if k.contains('.') => {
                    settings.values.insert(k.to_owned(), v.to_owned());
                }
                _ => {
                    ctx.report_error(format!(
                        "`values` entries must map `fragment.option` to a string, got {:?}: {:?}",
                        k, v
                    ));
                }
            }
        }

        let flag_values = ctx.attr("flag_values")?;
        for (k, v) in dict_entries(&flag_values, "flag_values")? {
            match (k.as_label(), v.as_str()) {
                (Some(flag), Some(v)) => {
                    settings.flag_values.insert(flag.dupe(), v.to_owned());
                }
                _ => {
                    ctx.report_error(format!(
                        "`flag_values` entries must map a label to a string, got {:?}: {:?}",
                        k, v
                    ));
                }
            }
        }

        if settings.values.is_empty() && settings.flag_values.is_empty() {
            ctx.report_error("Either `values` or `flag_values` must be set");
        }

        let Some(configuration) = ctx.configuration() else {
            return Err(strata_error::internal_error!(
                "`{}` analyzed without a configuration",
                ctx.label()
            )
            .into());
        };
        let matches = settings.matches(configuration.options());
        let provider = ConfigMatchingProvider::new(ctx.label().dupe(), settings, matches);
        Ok(RuleOutput::Providers(Providers::new().with(
            CONFIG_MATCHING_PROVIDER,
            ProviderValue::ConfigMatching(provider),
        )))
    }
}

struct AliasImpl;

impl RuleImplementation for AliasImpl {
    fn build(&self, ctx: &mut RuleContext<'_>) -> Result<RuleOutput, Unwind> {
        let actual = ctx.attr("actual")?;
        let actual: TargetLabel = match actual.as_label() {
            Some(label) => label.dupe(),
            None => {
                return Err(strata_error::strata_error!(
                    ErrorTag::Input,
                    "`actual` of alias `{}` must be a single label",
                    ctx.label()
                )
                .into());
            }
        };
        Ok(RuleOutput::Alias(actual))
    }
}
