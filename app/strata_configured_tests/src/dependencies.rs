/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::sync::Arc;

use strata_configured::builtin_rules::alias_rule;
use strata_configured::builtin_rules::config_setting_rule;
use strata_configured::keys::ConfiguredTargetKey;
use strata_core::configuration::data::ConfigurationKey;
use strata_core::configuration::options::BuildOptions;
use strata_core::configuration::transition::SplitTransition;
use strata_core::configuration::transition::TransitionRef;
use strata_error::ErrorTag;
use strata_node::attrs::attr::AttrTransition;
use strata_node::attrs::attr::Attribute;
use strata_node::attrs::coerced_attr::CoercedAttr;
use strata_node::attrs::coerced_attr::CoercedSelector;
use strata_node::nodes::target_node::TargetNode;
use strata_node::rule::RuleClass;

use crate::testing::creation_error;
use crate::testing::ct;
use crate::testing::l;
use crate::testing::label_list;
use crate::testing::labels;
use crate::testing::linux;
use crate::testing::simple_rule;
use crate::testing::target;
use crate::testing::test_rule;
use crate::testing::text;
use crate::testing::texts;
use crate::testing::TestWorkspace;

fn cfg(options: BuildOptions) -> ConfigurationKey {
    ConfigurationKey::new(options)
}

fn cc_library() -> Arc<RuleClass> {
    test_rule("cc_library").required_fragment("cpp").build().unwrap()
}

fn config_setting(label: &str, values: &[(&str, &str)]) -> TargetNode {
    let values = values
        .iter()
        .map(|(k, v)| (CoercedAttr::string(k), CoercedAttr::string(v)))
        .collect();
    target(
        label,
        &config_setting_rule().unwrap(),
        vec![("values", CoercedAttr::Dict(values))],
    )
}

fn select(entries: &[(&str, CoercedAttr)], default: Option<CoercedAttr>) -> CoercedAttr {
    let entries = entries.iter().map(|(k, v)| (l(k), v.clone())).collect();
    CoercedAttr::Selector(Box::new(CoercedSelector::new(entries, default).unwrap()))
}

#[test]
fn test_alias_resolves_to_actual_target() -> anyhow::Result<()> {
    let env = TestWorkspace::new()
        .add(target("//top:t", &simple_rule(), vec![("deps", label_list(&["//x:a"]))]))
        .add(target("//x:a", &alias_rule()?, vec![("actual", CoercedAttr::Label(l("//y:b")))]))
        .add(target("//y:b", &simple_rule(), vec![("value", CoercedAttr::string("real"))]))
        .build();
    let c1 = cfg(linux());
    let tx = env.tx();

    let alias = tx.compute(&ct("//x:a", &c1))??;
    assert_eq!(&l("//y:b"), alias.label());
    assert_eq!(Some(&l("//x:a")), alias.alias_label());
    assert_eq!("real", text(&alias, "value"));

    let value = tx.compute(&ct("//top:t", &c1))??;
    assert_eq!(vec!["//y:b"], labels(&value, "deps"));
    assert_eq!(vec!["//y:b"], labels(&value, "dep_targets"));
    // The edge keeps the label as written.
    assert_eq!(vec![ct("//x:a", &c1)], value.dependencies());
    Ok(())
}

#[test]
fn test_split_transition() -> anyhow::Result<()> {
    let split = TransitionRef::new(SplitTransition::new("cpp", "mode", &["dbg", "opt"]));
    let rule = test_rule("multi")
        .attribute(Attribute::dep("variants").with_transition(AttrTransition::Custom(split)))
        .build()?;
    let env = TestWorkspace::new()
        .add(target("//app:multi", &rule, vec![("variants", label_list(&["//lib:cc"]))]))
        .add(target("//lib:cc", &cc_library(), vec![]))
        .build();
    let value = env.tx().compute(&ct("//app:multi", &cfg(linux())))??;

    assert_eq!(vec!["dbg", "opt"], texts(&value, "dep_modes"));
    assert_eq!(
        vec![
            ct("//lib:cc", &cfg(linux().with_option("cpp", "mode", "dbg"))),
            ct("//lib:cc", &cfg(linux().with_option("cpp", "mode", "opt"))),
        ],
        value.dependencies()
    );
    Ok(())
}

#[test]
fn test_configurations_are_trimmed_to_needed_fragments() -> anyhow::Result<()> {
    let env = TestWorkspace::new()
        .add(target(
            "//app:t",
            &simple_rule(),
            vec![("deps", label_list(&["//lib:cc", "//lib:plain", "//lib:wrap"]))],
        ))
        .add(target("//lib:cc", &cc_library(), vec![]))
        .add(target("//lib:plain", &simple_rule(), vec![]))
        .add(target("//lib:wrap", &simple_rule(), vec![("deps", label_list(&["//lib:cc"]))]))
        .build();
    let full = linux()
        .with_option("cpp", "mode", "fast")
        .with_option("java", "version", "17");
    let value = env.tx().compute(&ct("//app:t", &cfg(full)))??;

    assert_eq!(vec!["fast", "none", "fast"], texts(&value, "dep_modes"));
    let cpp_only = cfg(linux().with_option("cpp", "mode", "fast"));
    assert_eq!(
        vec![
            ct("//lib:cc", &cpp_only),
            ct("//lib:plain", &cfg(linux())),
            ct("//lib:wrap", &cpp_only),
        ],
        value.dependencies()
    );
    Ok(())
}

fn select_workspace(value: CoercedAttr) -> TestWorkspace {
    TestWorkspace::new()
        .add(target("//sel:t", &simple_rule(), vec![("value", value)]))
        .add(config_setting("//conds:dbg", &[("cpp.mode", "dbg")]))
        .add(config_setting(
            "//conds:dbg_x86",
            &[("cpp.mode", "dbg"), ("cpp.arch", "x86")],
        ))
        .add(target("//lib:plain", &simple_rule(), vec![]))
}

#[test]
fn test_select_picks_most_specific_condition() -> anyhow::Result<()> {
    let value = select(
        &[
            ("//conds:dbg", CoercedAttr::string("debug")),
            ("//conds:dbg_x86", CoercedAttr::string("debug-x86")),
        ],
        Some(CoercedAttr::string("other")),
    );
    let env = select_workspace(value).build();
    let tx = env.tx();
    let analyze = |options: BuildOptions| -> anyhow::Result<String> {
        let value = tx.compute(&ct("//sel:t", &cfg(options)))??;
        Ok(text(&value, "value").to_owned())
    };

    assert_eq!("debug", analyze(linux().with_option("cpp", "mode", "dbg"))?);
    assert_eq!(
        "debug-x86",
        analyze(
            linux()
                .with_option("cpp", "mode", "dbg")
                .with_option("cpp", "arch", "x86")
        )?
    );
    assert_eq!("other", analyze(linux().with_option("cpp", "mode", "opt"))?);
    assert!(env.events().is_empty());
    Ok(())
}

#[test]
fn test_select_on_dependencies() -> anyhow::Result<()> {
    let deps = select(
        &[("//conds:dbg", label_list(&["//lib:plain"]))],
        Some(label_list(&[])),
    );
    let env = TestWorkspace::new()
        .add(target("//sel:t", &simple_rule(), vec![("deps", deps)]))
        .add(config_setting("//conds:dbg", &[("cpp.mode", "dbg")]))
        .add(target("//lib:plain", &simple_rule(), vec![]))
        .build();
    let tx = env.tx();

    let debug = tx.compute(&ct("//sel:t", &cfg(linux().with_option("cpp", "mode", "dbg"))))??;
    assert_eq!(vec!["//lib:plain"], labels(&debug, "deps"));
    let opt = tx.compute(&ct("//sel:t", &cfg(linux().with_option("cpp", "mode", "opt"))))??;
    assert!(labels(&opt, "deps").is_empty());
    Ok(())
}

#[test]
fn test_select_key_must_be_a_condition() -> anyhow::Result<()> {
    let value = select(
        &[("//lib:plain", CoercedAttr::string("x"))],
        Some(CoercedAttr::string("y")),
    );
    let env = select_workspace(value).build();
    let error = env.keep_going().compute(&ct("//sel:t", &cfg(linux())))?.unwrap_err();
    let error = creation_error(&error);

    assert_eq!(Some(ErrorTag::ConfigCondition), error.detailed_code());
    assert_eq!(
        vec!["//lib:plain is not a valid select() condition for //sel:t.".to_owned()],
        env.error_messages()
    );
    Ok(())
}

#[test]
fn test_select_without_match_or_default() -> anyhow::Result<()> {
    let deps = select(&[("//conds:dbg", label_list(&["//lib:plain"]))], None);
    let env = TestWorkspace::new()
        .add(target("//sel:t", &simple_rule(), vec![("deps", deps)]))
        .add(config_setting("//conds:dbg", &[("cpp.mode", "dbg")]))
        .add(target("//lib:plain", &simple_rule(), vec![]))
        .build();
    let error = env.keep_going().compute(&ct("//sel:t", &cfg(linux())))?.unwrap_err();

    assert_eq!(ErrorTag::ConfigCondition, error.best_tag());
    let messages = env.error_messages();
    assert_eq!(1, messages.len());
    assert!(
        messages[0]
            .starts_with("Error configuring attribute `deps` of `//sel:t`: None of 1 conditions")
    );
    Ok(())
}

#[test]
fn test_conditions_of_a_broken_package() -> anyhow::Result<()> {
    let value = select(
        &[("//conds:dbg", CoercedAttr::string("debug"))],
        Some(CoercedAttr::string("other")),
    );
    let env = select_workspace(value).package_error("//sel", "oops").build();
    let error = env.keep_going().compute(&ct("//sel:t", &cfg(linux())))?.unwrap_err();
    let error = creation_error(&error);

    assert_eq!("Cannot compute config conditions", error.message());
    assert_eq!(Some(ErrorTag::PackageLoading), error.detailed_code());
    assert_eq!(
        vec!["Cannot compute config conditions".to_owned()],
        env.error_messages()
    );
    Ok(())
}

#[test]
fn test_source_file_and_null_transition_dependencies() -> anyhow::Result<()> {
    let rule = test_rule("with_data")
        .attribute(Attribute::dep("data").with_transition(AttrTransition::Null))
        .build()?;
    let env = TestWorkspace::new()
        .add(target(
            "//p:t",
            &rule,
            vec![
                ("deps", label_list(&["//p:file.txt"])),
                ("data", label_list(&["//p:lib"])),
            ],
        ))
        .add(TargetNode::source_file(l("//p:file.txt")))
        .add(target("//p:lib", &simple_rule(), vec![]))
        .build();
    let value = env.tx().compute(&ct("//p:t", &cfg(linux())))??;

    assert_eq!(vec!["//p:file.txt", "//p:lib"], labels(&value, "deps"));
    assert_eq!(vec!["none", "none"], texts(&value, "dep_platforms"));
    assert_eq!(
        vec![
            ConfiguredTargetKey::new(l("//p:file.txt"), None),
            ConfiguredTargetKey::new(l("//p:lib"), None),
        ],
        value.dependencies()
    );
    Ok(())
}

#[test]
fn test_dependency_in_missing_package() -> anyhow::Result<()> {
    let env = TestWorkspace::new()
        .add(target("//p:t", &simple_rule(), vec![("deps", label_list(&["//gone:x"]))]))
        .missing_package("//gone")
        .build();
    let error = env.keep_going().compute(&ct("//p:t", &cfg(linux())))?.unwrap_err();
    let error = creation_error(&error);

    assert_eq!("Analysis failed", error.message());
    assert_eq!(Some(ErrorTag::PackageLoading), error.root_causes().most_important());
    assert_eq!(vec![&l("//gone:x")], error.root_causes().labels().collect::<Vec<_>>());
    let errors = env.errors();
    assert_eq!(1, errors.len());
    assert_eq!(Some(l("//p:t")), errors[0].label);
    Ok(())
}
