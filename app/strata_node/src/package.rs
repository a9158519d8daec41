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
use starlark_map::small_map::SmallMap;
use strata_core::target::label::PackageLabel;
use strata_core::target::label::TargetLabel;
use strata_core::target::label::TargetName;
use strata_error::ErrorTag;
use strata_error::ProvidesTag;

use crate::nodes::target_node::TargetNode;

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("no such target '{0}': target '{1}' not declared in package '{2}'")]
    NoSuchTarget(TargetLabel, TargetName, String),
    #[error("Target `{0}` does not belong to package `{1}`")]
    WrongPackage(TargetLabel, PackageLabel),
    #[error("Target `{0}` is declared twice")]
    DuplicateTarget(TargetLabel),
}

impl ProvidesTag for PackageError {
    fn error_tag(&self) -> ErrorTag {
        match self {
            PackageError::NoSuchTarget(..) => ErrorTag::TargetNotFound,
            PackageError::WrongPackage(..) | PackageError::DuplicateTarget(..) => {
                ErrorTag::PackageLoading
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq, Allocative)]
struct PackageData {
    label: PackageLabel,
    targets: SmallMap<TargetName, TargetNode>,
    /// Set when loading reported errors. The targets that could be loaded are still
    /// available.
    error: Option<String>,
}

/// The result of loading a package.
#[derive(Debug, Clone, Dupe, PartialEq, Eq, Allocative)]
pub struct Package(Arc<PackageData>);

impl Package {
    pub fn new(label: PackageLabel, targets: Vec<TargetNode>) -> strata_error::Result<Package> {
        let mut map = SmallMap::with_capacity(targets.len());
        for target in targets {
            if target.label().pkg() != &label {
                return Err(PackageError::WrongPackage(target.label().dupe(), label).into());
            }
            let name = target.label().name().dupe();
            if map.insert(name, target.dupe()).is_some() {
                return Err(PackageError::DuplicateTarget(target.label().dupe()).into());
            }
        }
        Ok(Package(Arc::new(PackageData {
            label,
            targets: map,
            error: None,
        })))
    }

    /// Marks the package as having had loading errors.
    pub fn with_error(self, message: &str) -> Package {
        Package(Arc::new(PackageData {
            label: self.0.label.dupe(),
            targets: self.0.targets.clone(),
            error: Some(message.to_owned()),
        }))
    }

    pub fn label(&self) -> &PackageLabel {
        &self.0.label
    }

    pub fn get_target(&self, name: &TargetName) -> Result<&TargetNode, PackageError> {
        self.0.targets.get(name).ok_or_else(|| {
            PackageError::NoSuchTarget(
                TargetLabel::new(self.0.label.dupe(), name.dupe()),
                name.dupe(),
                self.0.label.path().to_owned(),
            )
        })
    }

    pub fn targets(&self) -> impl Iterator<Item = &TargetNode> {
        self.0.targets.values()
    }

    pub fn containing_errors(&self) -> bool {
        self.0.error.is_some()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.0.error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use strata_core::target::label::PackageLabel;
    use strata_core::target::label::TargetLabel;
    use strata_core::target::label::TargetName;

    use crate::nodes::target_node::TargetNode;
    use crate::package::Package;
    use crate::package::PackageError;

    #[test]
    fn test_get_target() {
        let pkg = Package::new(
            PackageLabel::new("//app").unwrap(),
            vec![TargetNode::source_file(TargetLabel::testing_parse("//app:main.cc"))],
        )
        .unwrap();
        assert!(pkg.get_target(&TargetName::new("main.cc").unwrap()).is_ok());
        let e = pkg.get_target(&TargetName::new("bin").unwrap()).unwrap_err();
        assert_eq!(
            "no such target '//app:bin': target 'bin' not declared in package 'app'",
            e.to_string()
        );
        assert!(!pkg.containing_errors());
        assert!(pkg.with_error("syntax error").containing_errors());
    }

    #[test]
    fn test_wrong_package() {
        let e = Package::new(
            PackageLabel::new("//app").unwrap(),
            vec![TargetNode::source_file(TargetLabel::testing_parse("//lib:x"))],
        )
        .unwrap_err();
        assert_matches!(e.downcast_ref::<PackageError>(), Some(PackageError::WrongPackage(..)));
    }
}
