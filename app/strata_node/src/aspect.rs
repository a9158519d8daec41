/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::collections::BTreeSet;

use allocative::Allocative;

use crate::attrs::attr::Attribute;

#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Allocative,
    derive_more::Display
)]
pub struct AspectId(String);

impl AspectId {
    pub fn new(id: &str) -> Self {
        AspectId(id.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Metadata of an aspect: the attributes it adds to the node it is applied to.
#[derive(Debug, Clone, PartialEq, Eq, Allocative)]
pub struct AspectClass {
    id: AspectId,
    attributes: Vec<Attribute>,
    required_fragments: BTreeSet<String>,
}

impl AspectClass {
    pub fn new(id: &str) -> Self {
        AspectClass {
            id: AspectId::new(id),
            attributes: Vec::new(),
            required_fragments: BTreeSet::new(),
        }
    }

    pub fn with_attribute(mut self, attr: Attribute) -> Self {
        self.attributes.push(attr);
        self
    }

    pub fn with_required_fragment(mut self, fragment: &str) -> Self {
        self.required_fragments.insert(fragment.to_owned());
        self
    }

    pub fn id(&self) -> &AspectId {
        &self.id
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn required_fragments(&self) -> &BTreeSet<String> {
        &self.required_fragments
    }
}
