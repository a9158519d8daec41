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

use crate::target::label::PackageLabel;
use crate::target::label::TargetLabel;

/// Selects a set of targets: a single label, every target of a package (`//foo:all`) or
/// every target below a package (`//foo/...`).
#[derive(
    Clone,
    Dupe,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Allocative,
    derive_more::Display
)]
pub enum LabelFilter {
    #[display("{}", _0)]
    Exact(TargetLabel),
    #[display("{}:all", _0)]
    Package(PackageLabel),
    #[display("{}/...", _0)]
    Recursive(PackageLabel),
}

impl LabelFilter {
    pub fn parse(pattern: &str) -> strata_error::Result<Self> {
        if pattern == "//..." {
            return Ok(LabelFilter::Recursive(PackageLabel::new("//")?));
        }
        if let Some(pkg) = pattern.strip_suffix("/...") {
            return Ok(LabelFilter::Recursive(PackageLabel::new(pkg)?));
        }
        if let Some(pkg) = pattern.strip_suffix(":all") {
            return Ok(LabelFilter::Package(PackageLabel::new(pkg)?));
        }
        Ok(LabelFilter::Exact(TargetLabel::parse(pattern)?))
    }

    pub fn matches(&self, label: &TargetLabel) -> bool {
        match self {
            LabelFilter::Exact(l) => l == label,
            LabelFilter::Package(p) => label.pkg() == p,
            LabelFilter::Recursive(p) => label.pkg().starts_with(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::target::filter::LabelFilter;
    use crate::target::label::TargetLabel;

    #[test]
    fn test_matches() {
        let label = TargetLabel::testing_parse("//foo/bar:baz");
        assert!(LabelFilter::parse("//foo/bar:baz").unwrap().matches(&label));
        assert!(LabelFilter::parse("//foo/bar:all").unwrap().matches(&label));
        assert!(LabelFilter::parse("//foo/...").unwrap().matches(&label));
        assert!(LabelFilter::parse("//...").unwrap().matches(&label));
        assert!(!LabelFilter::parse("//foo:all").unwrap().matches(&label));
        assert!(!LabelFilter::parse("//foo/bar:qux").unwrap().matches(&label));
    }
}
