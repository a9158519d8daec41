/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Configuration transitions.
//!
//! A transition maps the configuration of a node to the configuration(s) its dependencies are
//! analyzed in.

use std::fmt::Debug;
use std::sync::Arc;

use allocative::Allocative;
use dupe::Dupe;
use starlark_map::small_map::SmallMap;

use crate::configuration::options::BuildOptions;
use crate::target::label::TargetLabel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// The dependency is analyzed without configuration.
    NoConfig,
    Patched(BuildOptions),
    /// One configuration per split key, in declaration order.
    Split(SmallMap<String, BuildOptions>),
}

pub trait Transition: Debug + Send + Sync + 'static {
    /// Transitions with equal ids must produce equal results.
    fn id(&self) -> &str;

    fn apply(&self, options: &BuildOptions) -> strata_error::Result<TransitionResult>;
}

/// Shared reference to a transition, compared by id.
#[derive(Clone, Dupe, Debug)]
pub struct TransitionRef(Arc<dyn Transition>);

impl TransitionRef {
    pub fn new<T: Transition>(transition: T) -> Self {
        TransitionRef(Arc::new(transition))
    }

    pub fn no_transition() -> Self {
        Self::new(NoTransition)
    }

    pub fn null() -> Self {
        Self::new(NullTransition)
    }

    pub fn toolchain_trimming() -> Self {
        Self::new(ToolchainTrimmingTransition)
    }

    pub fn id(&self) -> &str {
        self.0.id()
    }

    pub fn apply(&self, options: &BuildOptions) -> strata_error::Result<TransitionResult> {
        self.0.apply(options)
    }
}

impl PartialEq for TransitionRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for TransitionRef {}

impl std::hash::Hash for TransitionRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state)
    }
}

impl Allocative for TransitionRef {
    fn visit<'a, 'b: 'a>(&self, visitor: &'a mut allocative::Visitor<'b>) {
        visitor.visit_simple_sized::<Self>();
    }
}

/// Keeps the parent configuration.
#[derive(Debug)]
pub struct NoTransition;

impl Transition for NoTransition {
    fn id(&self) -> &str {
        "none"
    }

    fn apply(&self, options: &BuildOptions) -> strata_error::Result<TransitionResult> {
        Ok(TransitionResult::Patched(options.clone()))
    }
}

/// Drops the configuration, used for source files and other non-configurable targets.
#[derive(Debug)]
pub struct NullTransition;

impl Transition for NullTransition {
    fn id(&self) -> &str {
        "null"
    }

    fn apply(&self, _options: &BuildOptions) -> strata_error::Result<TransitionResult> {
        Ok(TransitionResult::NoConfig)
    }
}

/// Removes feature flags, so toolchains are resolved once per configuration regardless of
/// the flags set by each consumer.
#[derive(Debug)]
pub struct ToolchainTrimmingTransition;

impl Transition for ToolchainTrimmingTransition {
    fn id(&self) -> &str {
        "toolchain_trimming"
    }

    fn apply(&self, options: &BuildOptions) -> strata_error::Result<TransitionResult> {
        let mut options = options.clone();
        options.clear_feature_flags();
        Ok(TransitionResult::Patched(options))
    }
}

/// Sets a single option.
#[derive(Debug)]
pub struct PatchTransition {
    id: String,
    fragment: String,
    option: String,
    value: String,
}

impl PatchTransition {
    pub fn new(fragment: &str, option: &str, value: &str) -> Self {
        PatchTransition {
            id: format!("patch({}.{}={})", fragment, option, value),
            fragment: fragment.to_owned(),
            option: option.to_owned(),
            value: value.to_owned(),
        }
    }
}

impl Transition for PatchTransition {
    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&self, options: &BuildOptions) -> strata_error::Result<TransitionResult> {
        let mut options = options.clone();
        options.set_option(&self.fragment, &self.option, &self.value);
        Ok(TransitionResult::Patched(options))
    }
}

/// Analyzes the dependency once per value of an option.
#[derive(Debug)]
pub struct SplitTransition {
    id: String,
    fragment: String,
    option: String,
    values: Vec<String>,
}

impl SplitTransition {
    pub fn new(fragment: &str, option: &str, values: &[&str]) -> Self {
        SplitTransition {
            id: format!("split({}.{}={})", fragment, option, values.join(",")),
            fragment: fragment.to_owned(),
            option: option.to_owned(),
            values: values.iter().map(|v| (*v).to_owned()).collect(),
        }
    }
}

impl Transition for SplitTransition {
    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&self, options: &BuildOptions) -> strata_error::Result<TransitionResult> {
        let mut split = SmallMap::with_capacity(self.values.len());
        for value in &self.values {
            let mut options = options.clone();
            options.set_option(&self.fragment, &self.option, value);
            split.insert(value.clone(), options);
        }
        Ok(TransitionResult::Split(split))
    }
}

/// Switches to the configuration of an execution platform.
#[derive(Debug)]
pub struct ExecTransition {
    id: String,
    exec_platform: TargetLabel,
}

impl ExecTransition {
    pub fn new(exec_platform: TargetLabel) -> Self {
        ExecTransition {
            id: format!("exec({})", exec_platform),
            exec_platform,
        }
    }
}

impl Transition for ExecTransition {
    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&self, options: &BuildOptions) -> strata_error::Result<TransitionResult> {
        let mut options = options.clone();
        options.clear_feature_flags();
        options.set_target_platform(Some(self.exec_platform.dupe()));
        Ok(TransitionResult::Patched(options))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use crate::configuration::options::BuildOptions;
    use crate::configuration::transition::ExecTransition;
    use crate::configuration::transition::PatchTransition;
    use crate::configuration::transition::SplitTransition;
    use crate::configuration::transition::TransitionRef;
    use crate::configuration::transition::TransitionResult;
    use crate::target::label::TargetLabel;

    fn options() -> BuildOptions {
        BuildOptions::default()
            .with_option("cpp", "opt", "0")
            .with_feature_flag(TargetLabel::testing_parse("//flags:fast"), "on")
    }

    #[test]
    fn test_builtin() {
        assert_matches!(
            TransitionRef::null().apply(&options()).unwrap(),
            TransitionResult::NoConfig
        );
        assert_eq!(
            TransitionResult::Patched(options()),
            TransitionRef::no_transition().apply(&options()).unwrap()
        );
        assert_matches!(
            TransitionRef::toolchain_trimming().apply(&options()).unwrap(),
            TransitionResult::Patched(o) if o.feature_flags().is_empty()
        );
    }

    #[test]
    fn test_patch_and_split() {
        let patched = TransitionRef::new(PatchTransition::new("cpp", "opt", "2"))
            .apply(&options())
            .unwrap();
        assert_matches!(
            patched,
            TransitionResult::Patched(o) if o.option("cpp", "opt") == Some("2")
        );

        let split = TransitionRef::new(SplitTransition::new("cpu", "arch", &["x86", "arm"]))
            .apply(&options())
            .unwrap();
        let TransitionResult::Split(split) = split else {
            panic!("expected split");
        };
        assert_eq!(
            vec!["x86", "arm"],
            split.keys().map(String::as_str).collect::<Vec<_>>()
        );
        assert_eq!(Some("arm"), split.get("arm").unwrap().option("cpu", "arch"));
    }

    #[test]
    fn test_exec() {
        let exec = TargetLabel::testing_parse("//platforms:linux");
        let result = TransitionRef::new(ExecTransition::new(exec.clone()))
            .apply(&options())
            .unwrap();
        assert_matches!(
            result,
            TransitionResult::Patched(o) if o.platform().target_platform == Some(exec)
        );
    }

    #[test]
    fn test_eq_by_id() {
        assert_eq!(
            TransitionRef::new(PatchTransition::new("a", "b", "c")),
            TransitionRef::new(PatchTransition::new("a", "b", "c"))
        );
        assert_ne!(TransitionRef::null(), TransitionRef::no_transition());
    }
}
