/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::sync::Arc;

use dupe::Dupe;
use strata_configured::aspect::AspectKey;
use strata_core::configuration::data::ConfigurationKey;
use strata_error::ErrorTag;
use strata_node::aspect::AspectClass;
use strata_node::attrs::attr::Attribute;
use strata_node::rule::RuleClass;

use crate::testing::creation_error;
use crate::testing::ct;
use crate::testing::l;
use crate::testing::label_list;
use crate::testing::linux;
use crate::testing::simple_rule;
use crate::testing::target;
use crate::testing::test_rule;
use crate::testing::texts;
use crate::testing::ConflictingAspect;
use crate::testing::TestAspect;
use crate::testing::TestWorkspace;

fn c1() -> ConfigurationKey {
    ConfigurationKey::new(linux())
}

fn aspect(id: &str, tool: &str) -> Arc<AspectClass> {
    Arc::new(
        AspectClass::new(id)
            .with_attribute(Attribute::dep("_tool").with_default(label_list(&[tool]))),
    )
}

/// A rule whose `protos` dependencies get the aspect applied.
fn proto_user(aspect: &Arc<AspectClass>) -> Arc<RuleClass> {
    test_rule("proto_user")
        .attribute(Attribute::dep("protos").with_aspect(aspect.dupe()))
        .build()
        .unwrap()
}

fn workspace(aspect: &Arc<AspectClass>) -> TestWorkspace {
    TestWorkspace::new()
        .add(target(
            "//app:t",
            &proto_user(aspect),
            vec![("protos", label_list(&["//lib:proto"]))],
        ))
        .add(target("//lib:proto", &simple_rule(), vec![]))
        .add(target("//tools:gen", &simple_rule(), vec![]))
}

#[test]
fn test_aspect_providers_reach_the_dependent() -> anyhow::Result<()> {
    let generator = aspect("gen_aspect", "//tools:gen");
    let env = workspace(&generator)
        .aspect("gen_aspect", Arc::new(TestAspect))
        .build();
    let tx = env.tx();
    let value = tx.compute(&ct("//app:t", &c1()))??;

    assert_eq!(
        vec!["gen_aspect on //lib:proto with //tools:gen"],
        texts(&value, "aspect_infos")
    );
    assert!(tx.is_cached(&AspectKey::new(generator, ct("//lib:proto", &c1()))));
    // The base value itself is unchanged.
    let base = tx.compute(&ct("//lib:proto", &c1()))??;
    assert!(base.providers().get("aspect_info").is_none());
    Ok(())
}

#[test]
fn test_aspect_provider_clash() -> anyhow::Result<()> {
    let modes = aspect("mode_aspect", "//tools:gen");
    let env = workspace(&modes)
        .aspect("mode_aspect", Arc::new(ConflictingAspect))
        .build();
    let error = env.keep_going().compute(&ct("//app:t", &c1()))?.unwrap_err();
    let error = creation_error(&error);

    assert_eq!(Some(ErrorTag::DuplicateProvider), error.detailed_code());
    assert_eq!(
        "Aspect `mode_aspect` applied to `//lib:proto`: Provider `mode` provided twice",
        error.message()
    );
    assert_eq!(vec![error.message().to_owned()], env.error_messages());
    Ok(())
}

#[test]
fn test_aspect_dependency_missing() -> anyhow::Result<()> {
    let broken = aspect("broken_aspect", "//tools:missing");
    let env = workspace(&broken)
        .aspect("broken_aspect", Arc::new(TestAspect))
        .build();
    let error = env.keep_going().compute(&ct("//app:t", &c1()))?.unwrap_err();
    let error = creation_error(&error);

    assert_eq!(
        "Analysis of aspect 'broken_aspect' on //lib:proto failed",
        error.message()
    );
    assert!(error.already_reported());
    assert_eq!(Some(ErrorTag::TargetNotFound), error.root_causes().most_important());
    assert!(error.root_causes().labels().any(|label| label == &l("//tools:missing")));
    let errors = env.errors();
    assert_eq!(1, errors.len());
    assert_eq!(Some(l("//lib:proto")), errors[0].label);
    Ok(())
}
