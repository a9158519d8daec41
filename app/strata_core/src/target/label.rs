/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::sync::Arc;

use allocative::Allocative;
use dupe::Dupe;
use strata_error::ErrorTag;
use strata_error::ProvidesTag;

#[derive(Debug, thiserror::Error)]
pub enum LabelError {
    #[error("label `{0}` must start with `//`")]
    MissingPrefix(String),
    #[error("label `{0}` has an empty target name")]
    EmptyName(String),
    #[error("label `{0}` contains invalid character `{1}`")]
    InvalidChar(String, char),
}

impl ProvidesTag for LabelError {
    fn error_tag(&self) -> ErrorTag {
        ErrorTag::Input
    }
}

fn check_chars(label: &str, part: &str, allow_slash: bool) -> Result<(), LabelError> {
    for c in part.chars() {
        let ok = c.is_ascii_alphanumeric()
            || matches!(c, '_' | '-' | '.' | '+' | '=' | '@' | '~')
            || (allow_slash && c == '/');
        if !ok {
            return Err(LabelError::InvalidChar(label.to_owned(), c));
        }
    }
    Ok(())
}

/// A package path, displayed with a leading `//`.
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
#[display("//{}", _0)]
pub struct PackageLabel(Arc<str>);

impl PackageLabel {
    /// Parses `//foo/bar` (the leading `//` is required).
    pub fn new(path: &str) -> strata_error::Result<Self> {
        let stripped = path
            .strip_prefix("//")
            .ok_or_else(|| LabelError::MissingPrefix(path.to_owned()))?;
        let stripped = stripped.trim_end_matches('/');
        check_chars(path, stripped, true)?;
        Ok(PackageLabel(stripped.into()))
    }

    pub fn path(&self) -> &str {
        &self.0
    }

    /// Whether `self` is `other` or lives below it.
    pub fn starts_with(&self, other: &PackageLabel) -> bool {
        if other.0.is_empty() {
            return true;
        }
        match self.0.strip_prefix(&*other.0) {
            Some("") => true,
            Some(rest) => rest.starts_with('/'),
            None => false,
        }
    }

    fn last_component(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

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
pub struct TargetName(Arc<str>);

impl TargetName {
    pub fn new(name: &str) -> strata_error::Result<Self> {
        if name.is_empty() {
            return Err(LabelError::EmptyName(name.to_owned()).into());
        }
        check_chars(name, name, true)?;
        Ok(TargetName(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A fully qualified target, `//pkg:name`.
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
#[display("{}:{}", pkg, name)]
pub struct TargetLabel {
    pkg: PackageLabel,
    name: TargetName,
}

impl TargetLabel {
    pub fn new(pkg: PackageLabel, name: TargetName) -> Self {
        TargetLabel { pkg, name }
    }

    /// Parses `//pkg:name`, or `//pkg` as shorthand for `//pkg:<last component of pkg>`.
    pub fn parse(label: &str) -> strata_error::Result<Self> {
        match label.rsplit_once(':') {
            Some((pkg, name)) => {
                let pkg = PackageLabel::new(pkg)?;
                if name.is_empty() {
                    return Err(LabelError::EmptyName(label.to_owned()).into());
                }
                check_chars(label, name, true)?;
                Ok(TargetLabel::new(pkg, TargetName(name.into())))
            }
            None => {
                let pkg = PackageLabel::new(label)?;
                let name = pkg.last_component();
                if name.is_empty() {
                    return Err(LabelError::EmptyName(label.to_owned()).into());
                }
                let name = TargetName(name.into());
                Ok(TargetLabel::new(pkg, name))
            }
        }
    }

    /// Parse a label in tests, panicking on malformed input.
    pub fn testing_parse(label: &str) -> Self {
        match Self::parse(label) {
            Ok(label) => label,
            Err(e) => panic!("invalid test label `{}`: {:#}", label, e),
        }
    }

    pub fn pkg(&self) -> &PackageLabel {
        &self.pkg
    }

    pub fn name(&self) -> &TargetName {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use crate::target::label::LabelError;
    use crate::target::label::PackageLabel;
    use crate::target::label::TargetLabel;

    #[test]
    fn test_parse_full() {
        let label = TargetLabel::testing_parse("//foo/bar:baz");
        assert_eq!("//foo/bar", label.pkg().to_string());
        assert_eq!("baz", label.name().as_str());
        assert_eq!("//foo/bar:baz", label.to_string());
    }

    #[test]
    fn test_parse_shorthand() {
        let label = TargetLabel::testing_parse("//foo/bar");
        assert_eq!("//foo/bar:bar", label.to_string());
    }

    #[test]
    fn test_parse_errors() {
        let e = TargetLabel::parse("foo:bar").unwrap_err();
        assert_matches!(e.downcast_ref::<LabelError>(), Some(LabelError::MissingPrefix(_)));
        let e = TargetLabel::parse("//foo:").unwrap_err();
        assert_matches!(e.downcast_ref::<LabelError>(), Some(LabelError::EmptyName(_)));
        let e = TargetLabel::parse("//fo o:x").unwrap_err();
        assert_matches!(e.downcast_ref::<LabelError>(), Some(LabelError::InvalidChar(_, ' ')));
    }

    #[test]
    fn test_starts_with() {
        let a = PackageLabel::new("//foo/bar").unwrap();
        assert!(a.starts_with(&PackageLabel::new("//foo").unwrap()));
        assert!(a.starts_with(&PackageLabel::new("//").unwrap()));
        assert!(!a.starts_with(&PackageLabel::new("//fo").unwrap()));
    }
}
