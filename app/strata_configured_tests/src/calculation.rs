/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::collections::BTreeSet;

use assert_matches::assert_matches;
use strata_configured::calculation::analyze_targets;
use strata_configured::config::AnalysisConfig;
use strata_configured::diagnostics::EventKind;
use strata_configured::keys::ConfiguredTargetKey;
use strata_core::configuration::data::ConfigurationKey;
use strata_dice::DiceError;
use strata_dice::Evaluation;
use strata_error::ErrorTag;
use strata_node::attrs::coerced_attr::CoercedAttr;
use strata_node::nodes::target_node::TargetNode;

use crate::testing::creation_error;
use crate::testing::ct;
use crate::testing::drive;
use crate::testing::l;
use crate::testing::label_list;
use crate::testing::labels;
use crate::testing::linux;
use crate::testing::pkg;
use crate::testing::simple_rule;
use crate::testing::target;
use crate::testing::text;
use crate::testing::TestWorkspace;

fn c1() -> ConfigurationKey {
    ConfigurationKey::new(linux())
}

/// `//top:t` depends on `//lib:a`, which depends on `//base:b`.
fn chain() -> TestWorkspace {
    let rule = simple_rule();
    TestWorkspace::new()
        .add(target("//top:t", &rule, vec![("deps", label_list(&["//lib:a"]))]))
        .add(target(
            "//lib:a",
            &rule,
            vec![
                ("deps", label_list(&["//base:b"])),
                ("value", CoercedAttr::string("one")),
            ],
        ))
        .add(target("//base:b", &rule, vec![]))
}

#[test]
fn test_analyze_chain() -> anyhow::Result<()> {
    let env = chain().build();
    let value = env.tx().compute(&ct("//top:t", &c1()))??;

    assert_eq!(&l("//top:t"), value.label());
    assert_eq!(Some(&c1()), value.cfg());
    assert_eq!(vec!["//lib:a"], labels(&value, "deps"));
    assert_eq!(vec![ct("//lib:a", &c1())], value.dependencies());
    assert!(env.events().is_empty());
    Ok(())
}

#[test]
fn test_env_config_with_tracing() -> anyhow::Result<()> {
    strata_core::logging::init_tracing_for_writer(std::io::sink)?;
    let from_env = AnalysisConfig::from_env()?;
    let env = chain()
        .config(|c| {
            c.keep_going = from_env.keep_going;
            c.unblock_cpu_work_when_fetching_deps = from_env.unblock_cpu_work_when_fetching_deps;
        })
        .build();
    let value = env.tx().compute(&ct("//top:t", &c1()))??;
    assert_eq!(vec!["//lib:a"], labels(&value, "deps"));
    Ok(())
}

#[test]
fn test_same_value_across_transactions() -> anyhow::Result<()> {
    let env = chain().build();
    let key = ct("//top:t", &c1());
    let first = env.tx().compute(&key)??;
    let tx = env.tx();
    assert!(tx.is_cached(&key));
    assert_eq!(first, tx.compute(&key)??);

    let fresh = chain().build();
    assert_eq!(first, fresh.tx().compute(&key)??);
    Ok(())
}

#[test]
fn test_not_ready_leaves_no_trace() -> anyhow::Result<()> {
    let rule = simple_rule();
    let env = TestWorkspace::new()
        .add(target(
            "//r:t",
            &rule,
            vec![
                ("warn", CoercedAttr::string("careful")),
                ("lookup", CoercedAttr::string("x")),
            ],
        ))
        .build();
    let key = ct("//r:t", &c1());
    let tx = env.tx();

    assert_matches!(tx.try_compute(&key)?, Evaluation::NotReady { .. });
    assert!(!tx.is_cached(&key));
    assert!(env.events().is_empty());
    assert!(env.progress().is_empty());

    // The rule reports its warning before requesting the lookup, then restarts.
    let (value, waited) = drive(&tx, &key)?;
    assert!(waited.len() >= 2);
    assert!(value.is_ok());
    let warnings: Vec<String> = env
        .events()
        .into_iter()
        .filter(|e| e.kind == EventKind::Warning)
        .map(|e| e.message)
        .collect();
    assert_eq!(vec!["careful"], warnings);
    assert_eq!(vec![l("//r:t")], env.progress());
    Ok(())
}

fn broken_deps() -> TestWorkspace {
    let rule = simple_rule();
    TestWorkspace::new()
        .add(target(
            "//top:all",
            &rule,
            vec![("deps", label_list(&["//a:broken", "//b:lost"]))],
        ))
        .add(target("//a:broken", &rule, vec![("fail", CoercedAttr::string("boom"))]))
        .add(target("//b:other", &rule, vec![]))
}

#[test]
fn test_keep_going_collects_every_root_cause() -> anyhow::Result<()> {
    let env = broken_deps().build();
    let failure = env
        .keep_going()
        .compute(&ct("//top:all", &c1()))?
        .unwrap_err();
    assert_eq!(ErrorTag::TargetNotFound, failure.best_tag());
    let error = creation_error(&failure);

    assert_eq!(&l("//top:all"), error.label());
    assert_eq!(2, error.root_causes().len());
    assert_eq!(Some(ErrorTag::TargetNotFound), error.root_causes().most_important());
    assert_eq!(Some(ErrorTag::TargetNotFound), error.detailed_code());
    let causes: BTreeSet<String> = error.root_causes().labels().map(|l| l.to_string()).collect();
    assert_eq!(
        BTreeSet::from(["//a:broken".to_owned(), "//b:lost".to_owned()]),
        causes
    );
    assert!(error.already_reported());
    assert!(env.error_messages().iter().any(|m| m == "boom"));
    Ok(())
}

#[test]
fn test_fail_fast_aborts() {
    let env = broken_deps().build();
    assert_matches!(
        env.tx().compute(&ct("//top:all", &c1())),
        Err(DiceError::FailFast(..))
    );
}

#[test]
fn test_analyze_targets_in_keep_going_mode() -> anyhow::Result<()> {
    let env = broken_deps().config(|c| c.keep_going = true).build();
    let keys = vec![ct("//a:broken", &c1()), ct("//b:other", &c1())];
    let results = analyze_targets(&env.dice, &keys)?;

    assert_eq!(2, results.len());
    let error = results[0].as_ref().unwrap_err();
    assert_eq!("Analysis of target '//a:broken' failed", error.to_string());
    assert_eq!(ErrorTag::Analysis, error.best_tag());
    assert!(results[1].is_ok());
    Ok(())
}

#[test]
fn test_configurability_mismatch_is_empty() -> anyhow::Result<()> {
    let env = TestWorkspace::new()
        .add(target("//p:t", &simple_rule(), vec![]))
        .add(TargetNode::source_file(l("//p:src.txt")))
        .build();
    let tx = env.tx();

    let unconfigured = tx.compute(&ConfiguredTargetKey::new(l("//p:t"), None))??;
    assert!(unconfigured.is_empty());
    let configured_file = tx.compute(&ct("//p:src.txt", &c1()))??;
    assert!(configured_file.is_empty());
    let file = tx.compute(&ConfiguredTargetKey::new(l("//p:src.txt"), None))??;
    assert!(file.is_source_file());
    assert!(env.errors().is_empty());
    Ok(())
}

#[test]
fn test_missing_package() -> anyhow::Result<()> {
    let env = TestWorkspace::new().missing_package("//gone").build();
    let error = env.keep_going().compute(&ct("//gone:t", &c1()))?.unwrap_err();

    assert_eq!(Some(ErrorTag::PackageLoading), creation_error(&error).detailed_code());
    let errors = env.errors();
    assert_eq!(1, errors.len());
    assert_eq!(Some(l("//gone:t")), errors[0].label);
    assert!(errors[0].message.contains("//gone"));
    Ok(())
}

#[test]
fn test_missing_target() -> anyhow::Result<()> {
    let env = TestWorkspace::new()
        .add(target("//p:t", &simple_rule(), vec![]))
        .build();
    let error = env.keep_going().compute(&ct("//p:nope", &c1()))?.unwrap_err();
    let error = creation_error(&error);

    assert_eq!(Some(ErrorTag::TargetNotFound), error.detailed_code());
    assert!(error.already_reported());
    assert_eq!(1, env.errors().len());
    Ok(())
}

#[test]
fn test_package_with_errors() -> anyhow::Result<()> {
    let env = TestWorkspace::new()
        .add(target("//p:t", &simple_rule(), vec![]))
        .package_error("//p", "syntax error")
        .build();
    let error = env.keep_going().compute(&ct("//p:t", &c1()))?.unwrap_err();
    let error = creation_error(&error);

    assert_eq!("Analysis failed", error.message());
    assert!(!error.already_reported());
    assert_eq!(Some(ErrorTag::PackageLoading), error.root_causes().most_important());
    let cause = error.root_causes().iter().next().unwrap();
    assert!(cause.message.contains("contains errors: syntax error"));
    assert!(env.errors().is_empty());
    Ok(())
}

#[test]
fn test_events_and_progress() -> anyhow::Result<()> {
    let rule = simple_rule();
    let env = TestWorkspace::new()
        .add(target("//p:t", &rule, vec![("deps", label_list(&["//p:dep"]))]))
        .add(target("//p:dep", &rule, vec![("warn", CoercedAttr::string("deprecated"))]))
        .build();
    env.tx().compute(&ct("//p:t", &c1()))??;

    let events = env.events();
    assert_eq!(1, events.len());
    assert_eq!(EventKind::Warning, events[0].kind);
    assert_eq!(Some(l("//p:dep")), events[0].label);
    assert_eq!("deprecated", events[0].message);

    let mut done = env.progress();
    done.sort();
    assert_eq!(vec![l("//p:dep"), l("//p:t")], done);
    Ok(())
}

#[test]
fn test_transitive_packages() -> anyhow::Result<()> {
    let env = chain().config(|c| c.store_transitive_packages = true).build();
    let value = env.tx().compute(&ct("//top:t", &c1()))??;
    assert_eq!(
        Some(&BTreeSet::from([pkg("//base"), pkg("//lib"), pkg("//top")])),
        value.transitive_packages()
    );

    let env = chain().build();
    let value = env.tx().compute(&ct("//top:t", &c1()))??;
    assert_eq!(None, value.transitive_packages());
    Ok(())
}

#[test]
fn test_package_change_invalidates_dependents() -> anyhow::Result<()> {
    let env = chain().build();
    let top = ct("//top:t", &c1());
    let lib = ct("//lib:a", &c1());
    let before = env.tx().compute(&top)??;
    assert_eq!("one", text(&env.tx().compute(&lib)??, "value"));

    env.reload_package(
        "//lib",
        vec![target(
            "//lib:a",
            &simple_rule(),
            vec![
                ("deps", label_list(&["//base:b"])),
                ("value", CoercedAttr::string("two")),
            ],
        )],
    );
    let tx = env.tx();
    assert!(!tx.is_cached(&top));
    assert!(!tx.is_cached(&lib));
    assert!(tx.is_cached(&ct("//base:b", &c1())));

    assert_eq!("two", text(&tx.compute(&lib)??, "value"));
    let after = tx.compute(&top)??;
    assert_eq!(before.label(), after.label());
    assert_eq!(before.dependencies(), after.dependencies());
    assert_eq!(before.cfg(), after.cfg());
    Ok(())
}
