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
use strata_core::target::label::TargetLabel;
use strata_error::ErrorTag;
use strata_error::ProvidesTag;

#[derive(Debug, thiserror::Error)]
enum ConcatError {
    #[error("Cannot concatenate values of different types: `{0}` and `{1}`")]
    Mismatch(&'static str, &'static str),
    #[error("Cannot concatenate values of type `{0}`")]
    NotConcatable(&'static str),
}

impl ProvidesTag for ConcatError {
    fn error_tag(&self) -> ErrorTag {
        ErrorTag::Input
    }
}

/// An attribute value after `select()` resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Allocative)]
pub enum ConfiguredAttr {
    None,
    Bool(bool),
    String(String),
    Label(TargetLabel),
    List(Vec<ConfiguredAttr>),
    Dict(Vec<(ConfiguredAttr, ConfiguredAttr)>),
}

impl ConfiguredAttr {
    fn type_name(&self) -> &'static str {
        match self {
            ConfiguredAttr::None => "none",
            ConfiguredAttr::Bool(_) => "bool",
            ConfiguredAttr::String(_) => "string",
            ConfiguredAttr::Label(_) => "label",
            ConfiguredAttr::List(_) => "list",
            ConfiguredAttr::Dict(_) => "dict",
        }
    }

    /// Concatenates the values of `select() + select()` expressions.
    pub(crate) fn concat(
        self,
        items: &mut dyn Iterator<Item = strata_error::Result<ConfiguredAttr>>,
    ) -> strata_error::Result<ConfiguredAttr> {
        let mut acc = self;
        for item in items {
            let item = item?;
            acc = match (acc, item) {
                (ConfiguredAttr::List(mut a), ConfiguredAttr::List(b)) => {
                    a.extend(b);
                    ConfiguredAttr::List(a)
                }
                (ConfiguredAttr::String(mut a), ConfiguredAttr::String(b)) => {
                    a.push_str(&b);
                    ConfiguredAttr::String(a)
                }
                (ConfiguredAttr::Dict(mut a), ConfiguredAttr::Dict(b)) => {
                    a.extend(b);
                    ConfiguredAttr::Dict(a)
                }
                (a, b) if a.type_name() != b.type_name() => {
                    return Err(ConcatError::Mismatch(a.type_name(), b.type_name()).into());
                }
                (a, _) => return Err(ConcatError::NotConcatable(a.type_name()).into()),
            };
        }
        Ok(acc)
    }

    /// Every label mentioned in the value, in order.
    pub fn labels(&self) -> Vec<TargetLabel> {
        let mut out = Vec::new();
        self.collect_labels(&mut out);
        out
    }

    fn collect_labels(&self, out: &mut Vec<TargetLabel>) {
        match self {
            ConfiguredAttr::Label(l) => out.push(l.dupe()),
            ConfiguredAttr::List(items) => {
                for item in items {
                    item.collect_labels(out);
                }
            }
            ConfiguredAttr::Dict(entries) => {
                for (k, v) in entries {
                    k.collect_labels(out);
                    v.collect_labels(out);
                }
            }
            ConfiguredAttr::None | ConfiguredAttr::Bool(_) | ConfiguredAttr::String(_) => {}
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfiguredAttr::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&TargetLabel> {
        match self {
            ConfiguredAttr::Label(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&[(ConfiguredAttr, ConfiguredAttr)]> {
        match self {
            ConfiguredAttr::Dict(entries) => Some(entries),
            _ => None,
        }
    }
}
