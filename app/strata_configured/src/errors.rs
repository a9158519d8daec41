/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Failure values of analysis, and the root causes they carry.

use std::fmt;

use dupe::Dupe;
use dupe::OptionDupedExt;
use indexmap::IndexSet;
use strata_core::configuration::data::ConfigurationKey;
use strata_core::target::label::TargetLabel;
use strata_dice::Suspend;
use strata_error::choose_more_important_with_first_if_tie;
use strata_error::ErrorTag;
use strata_error::ProvidesTag;

/// A failure attributed to a specific target, the label shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cause {
    pub label: TargetLabel,
    pub cfg: Option<ConfigurationKey>,
    pub code: ErrorTag,
    pub message: String,
}

impl Cause {
    pub fn new(
        label: TargetLabel,
        cfg: Option<ConfigurationKey>,
        code: ErrorTag,
        message: impl Into<String>,
    ) -> Cause {
        Cause {
            label,
            cfg,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cfg {
            Some(cfg) => write!(f, "{} ({}): {}", self.label, cfg, self.message),
            None => write!(f, "{}: {}", self.label, self.message),
        }
    }
}

/// Ordered, deduplicated root causes, tracking the most important failure code seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootCauses {
    causes: IndexSet<Cause>,
    most_important: Option<ErrorTag>,
}

impl RootCauses {
    pub fn single(cause: Cause) -> RootCauses {
        let mut causes = RootCauses::default();
        causes.add(cause);
        causes
    }

    pub fn add(&mut self, cause: Cause) {
        self.most_important =
            choose_more_important_with_first_if_tie(self.most_important, Some(cause.code));
        self.causes.insert(cause);
    }

    pub fn add_all(&mut self, other: &RootCauses) {
        for cause in other.iter() {
            self.add(cause.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.causes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.causes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cause> {
        self.causes.iter()
    }

    pub fn labels(&self) -> impl Iterator<Item = &TargetLabel> {
        self.causes.iter().map(|c| &c.label)
    }

    pub fn most_important(&self) -> Option<ErrorTag> {
        self.most_important
    }
}

/// The failure of a configured target.
///
/// `already_reported` tells whether the message was shown to the user when the failure was
/// discovered. Unreported failures are left to whoever requested the evaluation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ConfiguredValueCreationError {
    label: TargetLabel,
    cfg: Option<ConfigurationKey>,
    message: String,
    root_causes: RootCauses,
    detailed_code: Option<ErrorTag>,
    already_reported: bool,
}

impl ProvidesTag for ConfiguredValueCreationError {
    fn error_tag(&self) -> ErrorTag {
        self.detailed_code.unwrap_or(ErrorTag::Analysis)
    }
}

impl ConfiguredValueCreationError {
    pub fn new(
        label: TargetLabel,
        cfg: Option<ConfigurationKey>,
        message: impl Into<String>,
        root_causes: RootCauses,
    ) -> ConfiguredValueCreationError {
        let detailed_code = root_causes.most_important();
        ConfiguredValueCreationError {
            label,
            cfg,
            message: message.into(),
            root_causes,
            detailed_code,
            already_reported: false,
        }
    }

    /// A failure of the target itself, which is its own root cause.
    pub fn of_target(
        label: TargetLabel,
        cfg: Option<ConfigurationKey>,
        code: ErrorTag,
        message: impl Into<String>,
    ) -> ConfiguredValueCreationError {
        let message = message.into();
        let cause = Cause::new(label.dupe(), cfg.dupe(), code, message.clone());
        Self::new(label, cfg, message, RootCauses::single(cause))
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_detailed_code(mut self, code: Option<ErrorTag>) -> Self {
        self.detailed_code = code;
        self
    }

    pub(crate) fn reported(mut self) -> Self {
        self.already_reported = true;
        self
    }

    pub fn label(&self) -> &TargetLabel {
        &self.label
    }

    pub fn cfg(&self) -> Option<&ConfigurationKey> {
        self.cfg.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn root_causes(&self) -> &RootCauses {
        &self.root_causes
    }

    pub fn detailed_code(&self) -> Option<ErrorTag> {
        self.detailed_code
    }

    pub fn already_reported(&self) -> bool {
        self.already_reported
    }
}

/// Finds the creation failure inside an error computed for `label`, wrapping errors of other
/// shapes into one.
pub(crate) fn as_creation_error(
    label: &TargetLabel,
    cfg: Option<&ConfigurationKey>,
    error: &strata_error::Error,
) -> ConfiguredValueCreationError {
    match error.downcast_ref::<ConfiguredValueCreationError>() {
        Some(e) => e.clone(),
        None => ConfiguredValueCreationError::of_target(
            label.dupe(),
            cfg.duped(),
            error.best_tag(),
            format!("{:#}", error),
        ),
    }
}

/// How an evaluation failed, before it is turned into the value of the node.
#[derive(Debug)]
pub(crate) enum AnalysisFailure {
    /// A requested value failed. The failure shown is the most important one among them.
    Dependency {
        error: ConfiguredValueCreationError,
        dep_reported_own_error: bool,
    },
    /// The node itself failed; a non-empty message is reported.
    Creation(ConfiguredValueCreationError),
    /// An aspect applied to a dependency failed, already reported by the aspect.
    Aspect(ConfiguredValueCreationError),
    ToolchainResolution(strata_error::Error),
    /// Root causes were collected without a failure being reported for this node.
    Unreported(ConfiguredValueCreationError),
}

/// Why an evaluation stopped before producing a value.
#[derive(Debug)]
pub(crate) enum Abort {
    Suspend(Suspend),
    Failure(AnalysisFailure),
}

impl From<Suspend> for Abort {
    fn from(s: Suspend) -> Self {
        Abort::Suspend(s)
    }
}

impl From<AnalysisFailure> for Abort {
    fn from(f: AnalysisFailure) -> Self {
        Abort::Failure(f)
    }
}

impl From<ConfiguredValueCreationError> for Abort {
    fn from(e: ConfiguredValueCreationError) -> Self {
        Abort::Failure(AnalysisFailure::Creation(e))
    }
}

#[cfg(test)]
mod tests {
    use strata_core::target::label::TargetLabel;
    use strata_error::ErrorTag;

    use crate::errors::as_creation_error;
    use crate::errors::Cause;
    use crate::errors::ConfiguredValueCreationError;
    use crate::errors::RootCauses;

    fn cause(label: &str, code: ErrorTag) -> Cause {
        Cause::new(TargetLabel::testing_parse(label), None, code, "failed")
    }

    #[test]
    fn test_root_causes_dedup_and_order() {
        let mut causes = RootCauses::default();
        causes.add(cause("//a:a", ErrorTag::Analysis));
        causes.add(cause("//b:b", ErrorTag::TargetNotFound));
        causes.add(cause("//a:a", ErrorTag::Analysis));
        assert_eq!(2, causes.len());
        assert_eq!(
            vec!["//a:a", "//b:b"],
            causes.labels().map(|l| l.to_string()).collect::<Vec<_>>()
        );
        assert_eq!(Some(ErrorTag::TargetNotFound), causes.most_important());
    }

    #[test]
    fn test_most_important_first_wins_tie() {
        let mut causes = RootCauses::default();
        causes.add(cause("//a:a", ErrorTag::Analysis));
        causes.add(cause("//b:b", ErrorTag::Analysis));
        assert_eq!(Some(ErrorTag::Analysis), causes.most_important());
    }

    #[test]
    fn test_creation_error_roundtrips_through_error() {
        let label = TargetLabel::testing_parse("//app:bin");
        let e = ConfiguredValueCreationError::of_target(
            label.clone(),
            None,
            ErrorTag::ToolchainResolution,
            "no toolchain",
        );
        let err = strata_error::Error::from(e);
        assert_eq!(ErrorTag::ToolchainResolution, err.best_tag());
        let back = as_creation_error(&label, None, &err);
        assert_eq!("no toolchain", back.message());
        assert_eq!(1, back.root_causes().len());
    }

    #[test]
    fn test_foreign_error_wrapped() {
        let label = TargetLabel::testing_parse("//app:bin");
        let err = strata_error::strata_error!(ErrorTag::PackageLoading, "BUILD file broken");
        let e = as_creation_error(&label, None, &err);
        assert_eq!(Some(ErrorTag::PackageLoading), e.detailed_code());
        assert_eq!(label, e.root_causes().iter().next().unwrap().label);
    }
}
