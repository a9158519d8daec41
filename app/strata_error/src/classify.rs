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

/// Structured failure code attached to every error.
///
/// Codes drive two things: which of several root causes gets surfaced as the "most important"
/// one (see [`tag_rank`]), and whether an error is considered a user or an infra failure.
#[derive(Debug, Clone, Copy, Dupe, PartialEq, Eq, Hash, Allocative)]
pub enum ErrorTag {
    InternalError,
    Tier0,
    Cycle,
    PackageLoading,
    TargetNotFound,
    ToolchainResolution,
    ConfigCondition,
    Transition,
    DuplicateProvider,
    ActionConflict,
    InvalidExecGroup,
    Analysis,
    DependencyEvaluation,
    Input,
}

impl ErrorTag {
    pub fn as_str_name(self) -> &'static str {
        match self {
            ErrorTag::InternalError => "INTERNAL_ERROR",
            ErrorTag::Tier0 => "TIER0",
            ErrorTag::Cycle => "CYCLE",
            ErrorTag::PackageLoading => "PACKAGE_LOADING",
            ErrorTag::TargetNotFound => "TARGET_NOT_FOUND",
            ErrorTag::ToolchainResolution => "TOOLCHAIN_RESOLUTION",
            ErrorTag::ConfigCondition => "CONFIG_CONDITION",
            ErrorTag::Transition => "TRANSITION",
            ErrorTag::DuplicateProvider => "DUPLICATE_PROVIDER",
            ErrorTag::ActionConflict => "ACTION_CONFLICT",
            ErrorTag::InvalidExecGroup => "INVALID_EXEC_GROUP",
            ErrorTag::Analysis => "ANALYSIS",
            ErrorTag::DependencyEvaluation => "DEPENDENCY_EVALUATION",
            ErrorTag::Input => "INPUT",
        }
    }
}

/// Whether a failure is the user's or the system's fault.
#[derive(Debug, Clone, Copy, Dupe, PartialEq, Eq, Hash, Allocative)]
pub enum Category {
    User,
    Infra,
}

/// Pick the most interesting tag from a list of tags.
pub fn best_tag(tags: impl IntoIterator<Item = ErrorTag>) -> Option<ErrorTag> {
    tags.into_iter().min_by_key(|t| tag_rank(*t))
}

/// Returns the more important of the two codes. On a tie `first` wins, so folding over a
/// sequence keeps the earliest of the highest ranked codes.
pub fn choose_more_important_with_first_if_tie(
    first: Option<ErrorTag>,
    second: Option<ErrorTag>,
) -> Option<ErrorTag> {
    match (first, second) {
        (None, x) | (x, None) => x,
        (Some(a), Some(b)) => {
            if tag_rank(b) < tag_rank(a) {
                Some(b)
            } else {
                Some(a)
            }
        }
    }
}

/// Tag rank: smaller is more interesting.
pub(crate) fn tag_rank(tag: ErrorTag) -> u32 {
    match tag {
        ErrorTag::InternalError => line!(),
        ErrorTag::Tier0 => line!(),
        ErrorTag::Cycle => line!(),
        ErrorTag::PackageLoading => line!(),
        ErrorTag::TargetNotFound => line!(),
        ErrorTag::ToolchainResolution => line!(),
        ErrorTag::ConfigCondition => line!(),
        ErrorTag::Transition => line!(),
        ErrorTag::DuplicateProvider => line!(),
        ErrorTag::ActionConflict => line!(),
        ErrorTag::InvalidExecGroup => line!(),
        ErrorTag::Analysis => line!(),
        ErrorTag::DependencyEvaluation => line!(),
        ErrorTag::Input => line!(),
    }
}

/// Some tags are known to be either infrastructure or user errors.
pub(crate) fn error_tag_category(tag: ErrorTag) -> Category {
    match tag {
        ErrorTag::InternalError => Category::Infra,
        ErrorTag::Tier0 => Category::Infra,
        ErrorTag::Cycle
        | ErrorTag::PackageLoading
        | ErrorTag::TargetNotFound
        | ErrorTag::ToolchainResolution
        | ErrorTag::ConfigCondition
        | ErrorTag::Transition
        | ErrorTag::DuplicateProvider
        | ErrorTag::ActionConflict
        | ErrorTag::InvalidExecGroup
        | ErrorTag::Analysis
        | ErrorTag::DependencyEvaluation
        | ErrorTag::Input => Category::User,
    }
}

#[cfg(test)]
mod tests {
    use crate::classify::best_tag;
    use crate::classify::choose_more_important_with_first_if_tie;
    use crate::ErrorTag;

    #[test]
    fn test_best_tag() {
        assert_eq!(
            Some(ErrorTag::InternalError),
            best_tag([ErrorTag::Analysis, ErrorTag::InternalError])
        );
        assert_eq!(None, best_tag([]));
    }

    #[test]
    fn test_first_wins_tie() {
        assert_eq!(
            Some(ErrorTag::Analysis),
            choose_more_important_with_first_if_tie(Some(ErrorTag::Analysis), None)
        );
        assert_eq!(
            Some(ErrorTag::TargetNotFound),
            choose_more_important_with_first_if_tie(
                Some(ErrorTag::Analysis),
                Some(ErrorTag::TargetNotFound)
            )
        );
        assert_eq!(
            Some(ErrorTag::PackageLoading),
            choose_more_important_with_first_if_tie(
                Some(ErrorTag::PackageLoading),
                Some(ErrorTag::Analysis)
            )
        );
    }
}
