/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::collections::BTreeSet;
use std::sync::Arc;

use dupe::Dupe;
use strata_configured::keys::ConfiguredTargetKey;
use strata_configured::toolchain::ToolchainContextKey;
use strata_core::configuration::data::ConfigurationKey;
use strata_core::configuration::options::BuildOptions;
use strata_core::target::filter::LabelFilter;
use strata_error::ErrorTag;
use strata_node::attrs::attr::AttrTransition;
use strata_node::attrs::attr::Attribute;
use strata_node::attrs::coerced_attr::CoercedAttr;
use strata_node::exec_group::ExecGroup;
use strata_node::rule::RuleClass;

use crate::testing::creation_error;
use crate::testing::ct;
use crate::testing::drive;
use crate::testing::l;
use crate::testing::label_list;
use crate::testing::labels;
use crate::testing::linux;
use crate::testing::simple_rule;
use crate::testing::target;
use crate::testing::test_rule;
use crate::testing::text;
use crate::testing::texts;
use crate::testing::toolchain_rule;
use crate::testing::TestWorkspace;

fn c1() -> ConfigurationKey {
    ConfigurationKey::new(linux())
}

fn cc_binary() -> Arc<RuleClass> {
    test_rule("cc_binary")
        .required_toolchain(l("//cpp:toolchain_type"))
        .build()
        .unwrap()
}

/// `//app:bin` needs the C++ toolchain and depends on `//lib:util`.
fn workspace(rule: &Arc<RuleClass>) -> TestWorkspace {
    TestWorkspace::new()
        .add(target("//app:bin", rule, vec![("deps", label_list(&["//lib:util"]))]))
        .add(target("//lib:util", &simple_rule(), vec![]))
        .add(target("//cpp:gcc", &toolchain_rule(), vec![]))
}

#[test]
fn test_resolves_toolchain_and_execution_platform() -> anyhow::Result<()> {
    let env = workspace(&cc_binary()).build();
    let tx = env.tx();
    let key = ct("//app:bin", &c1());
    let (value, waited) = drive(&tx, &key)?;
    let value = value?;

    assert!(waited
        .iter()
        .any(|k| k.downcast_ref::<ToolchainContextKey>().is_some()));
    assert!(waited
        .iter()
        .filter_map(|k| k.downcast_ref::<ConfiguredTargetKey>())
        .any(|k| k == &ct("//lib:util", &c1())));

    assert_eq!(&BTreeSet::from([l("//cpp:gcc")]), value.toolchains());
    assert_eq!(vec!["//cpp:gcc"], labels(&value, "toolchains"));
    assert_eq!(vec!["//lib:util"], labels(&value, "deps"));
    assert_eq!("//platforms:x86", text(&value, "exec_platform"));
    assert!(value.dependencies().contains(&ct("//cpp:gcc", &c1())));
    assert!(env.events().is_empty());
    Ok(())
}

#[test]
fn test_rule_without_toolchain_resolution() -> anyhow::Result<()> {
    let genrule = test_rule("genrule")
        .uses_toolchain_resolution(false)
        .build()?;
    let env = TestWorkspace::new()
        .add(target("//app:gen", &genrule, vec![]))
        .add(target("//app:plain", &simple_rule(), vec![]))
        .build();
    let tx = env.tx();
    let resolution = ToolchainContextKey::new(c1(), &ExecGroup::default());

    let value = tx.compute(&ct("//app:gen", &c1()))??;
    assert_eq!("none", text(&value, "exec_platform"));
    assert!(value.toolchains().is_empty());
    assert!(!tx.is_cached(&resolution));

    // Resolution without toolchain types still picks the first execution platform.
    let value = tx.compute(&ct("//app:plain", &c1()))??;
    assert_eq!("//platforms:arm", text(&value, "exec_platform"));
    assert!(tx.is_cached(&resolution));
    Ok(())
}

#[test]
fn test_opt_out_ignores_required_toolchains() -> anyhow::Result<()> {
    let rule = test_rule("cc_genrule")
        .required_toolchain(l("//cpp:toolchain_type"))
        .uses_toolchain_resolution(false)
        .build()?;
    let env = workspace(&rule).build();
    let tx = env.tx();
    let (value, waited) = drive(&tx, &ct("//app:bin", &c1()))?;
    let value = value?;

    assert!(!waited
        .iter()
        .any(|k| k.downcast_ref::<ToolchainContextKey>().is_some()));
    assert!(value.toolchains().is_empty());
    assert!(labels(&value, "toolchains").is_empty());
    assert_eq!("none", text(&value, "exec_platform"));
    assert_eq!(vec![ct("//lib:util", &c1())], value.dependencies());
    assert!(!tx.is_cached(&ct("//cpp:gcc", &c1())));
    Ok(())
}

#[test]
fn test_unregistered_toolchain_type() -> anyhow::Result<()> {
    let go_binary = test_rule("go_binary")
        .required_toolchain(l("//go:toolchain_type"))
        .build()?;
    let env = TestWorkspace::new()
        .add(target("//app:go", &go_binary, vec![]))
        .build();
    let error = env.keep_going().compute(&ct("//app:go", &c1()))?.unwrap_err();
    let error = creation_error(&error);

    assert_eq!(Some(ErrorTag::ToolchainResolution), error.detailed_code());
    assert!(error.already_reported());
    assert_eq!(
        vec![
            "While resolving toolchains for target //app:go: \
             No matching toolchains found for types //go:toolchain_type"
                .to_owned()
        ],
        env.error_messages()
    );
    Ok(())
}

#[test]
fn test_failing_toolchain_is_attributed() -> anyhow::Result<()> {
    let env = TestWorkspace::new()
        .add(target("//app:bin", &cc_binary(), vec![]))
        .add(target(
            "//cpp:gcc",
            &toolchain_rule(),
            vec![("fail", CoercedAttr::string("no compiler"))],
        ))
        .build();
    let error = env.keep_going().compute(&ct("//app:bin", &c1()))?.unwrap_err();
    let error = creation_error(&error);

    assert_eq!(
        "errors encountered resolving toolchains for //app:bin",
        error.message()
    );
    let gcc = l("//cpp:gcc");
    assert!(error.root_causes().labels().any(|l| l == &gcc));
    let messages = env.error_messages();
    assert!(messages.iter().any(|m| m == "no compiler"));
    assert!(messages
        .iter()
        .any(|m| m == "errors encountered resolving toolchains for //app:bin"));
    Ok(())
}

#[test]
fn test_toolchain_transition_forces_execution_platform() -> anyhow::Result<()> {
    let rule = test_rule("cc_binary")
        .required_toolchain(l("//cpp:toolchain_type"))
        .use_toolchain_transition(true)
        .build()?;
    let env = workspace(&rule).build();
    let value = env.tx().compute(&ct("//app:bin", &c1()))??;

    let toolchain = ConfiguredTargetKey::new(l("//cpp:gcc"), Some(c1()))
        .with_exec_platform(Some(l("//platforms:x86")));
    assert!(value.dependencies().contains(&toolchain));
    assert!(!value.dependencies().contains(&ct("//cpp:gcc", &c1())));
    Ok(())
}

#[test]
fn test_exec_attribute_uses_execution_platform() -> anyhow::Result<()> {
    let rule = test_rule("cc_gen")
        .required_toolchain(l("//cpp:toolchain_type"))
        .attribute(
            Attribute::dep("tools").with_transition(AttrTransition::Exec { exec_group: None }),
        )
        .build()?;
    let env = TestWorkspace::new()
        .add(target("//app:gen", &rule, vec![("tools", label_list(&["//tools:gen"]))]))
        .add(target("//tools:gen", &simple_rule(), vec![]))
        .add(target("//cpp:gcc", &toolchain_rule(), vec![]))
        .build();
    let value = env.tx().compute(&ct("//app:gen", &c1()))??;

    assert_eq!(vec!["//platforms:x86"], texts(&value, "dep_platforms"));
    let exec_cfg = ConfigurationKey::new(
        BuildOptions::default().with_target_platform(l("//platforms:x86")),
    );
    assert!(value.dependencies().contains(&ct("//tools:gen", &exec_cfg)));
    Ok(())
}

#[test]
fn test_undeclared_exec_group() -> anyhow::Result<()> {
    let rule = test_rule("cc_gen")
        .attribute(Attribute::dep("tools").with_transition(AttrTransition::Exec {
            exec_group: Some("nope".to_owned()),
        }))
        .build()?;
    let env = TestWorkspace::new()
        .add(target("//app:gen", &rule, vec![("tools", label_list(&["//tools:gen"]))]))
        .add(target("//tools:gen", &simple_rule(), vec![]))
        .build();
    let error = env.keep_going().compute(&ct("//app:gen", &c1()))?.unwrap_err();
    let error = creation_error(&error);

    assert_eq!(Some(ErrorTag::InvalidExecGroup), error.detailed_code());
    assert!(error.message().contains("undeclared exec group `nope`"));
    Ok(())
}

#[test]
fn test_exec_group_toolchains_are_dependencies() -> anyhow::Result<()> {
    let rule = test_rule("cc_multi")
        .exec_group("compile", ExecGroup::new([l("//cpp:toolchain_type")], []))
        .build()?;
    let env = workspace(&rule).build();
    let value = env.tx().compute(&ct("//app:bin", &c1()))??;

    assert_eq!(&BTreeSet::from([l("//cpp:gcc")]), value.toolchains());
    assert_eq!(vec!["//cpp:gcc"], labels(&value, "toolchains"));
    assert_eq!("//platforms:arm", text(&value, "exec_platform"));
    Ok(())
}

#[test]
fn test_extra_execution_constraints() -> anyhow::Result<()> {
    let env = workspace(&cc_binary()).build();
    let options = linux()
        .with_extra_execution_constraints(LabelFilter::parse("//app:all")?, vec![l("//cpu:arm")]);
    let cfg = ConfigurationKey::new(options);

    let error = env.keep_going().compute(&ct("//app:bin", &cfg))?.unwrap_err();
    assert_eq!(
        Some(ErrorTag::ToolchainResolution),
        creation_error(&error).detailed_code()
    );
    // The constraints only apply to matching targets.
    assert!(env.keep_going().compute(&ct("//lib:util", &cfg))?.is_ok());
    Ok(())
}

#[test]
fn test_debug_toolchain_resolution_flag() -> anyhow::Result<()> {
    let env = workspace(&cc_binary()).build();
    let options = linux().with_debug_toolchain_resolution(LabelFilter::parse("//app:bin")?);
    let cfg = ConfigurationKey::new(options);
    let tx = env.tx();
    tx.compute(&ct("//app:bin", &cfg))??;

    let group = ExecGroup::new([l("//cpp:toolchain_type")], []);
    let debugged = ToolchainContextKey::new(cfg.dupe(), &group).with_debug(true);
    assert!(tx.is_cached(&debugged));
    assert!(!tx.is_cached(&ToolchainContextKey::new(cfg, &group)));
    Ok(())
}
