/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::error::Error as StdError;
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dupe::Dupe;

use crate::ErrorTag;

static ROOT_IDS: AtomicU64 = AtomicU64::new(0);

/// Identity of the place a failure was first created.
///
/// Every copy and every context-wrapped version of a failure shares the root id, so two errors
/// can be checked for a common origin. Ids come from a process-wide counter and must not leak
/// into user-visible output.
#[derive(
    allocative::Allocative,
    Copy,
    Clone,
    Debug,
    Dupe,
    PartialEq,
    Eq,
    Hash
)]
pub struct UniqueRootId(u64);

pub(crate) struct ErrorRoot {
    id: UniqueRootId,
    description: String,
    error_tag: ErrorTag,
    source: Option<Arc<dyn StdError + Send + Sync + 'static>>,
}

impl ErrorRoot {
    pub(crate) fn new(
        description: String,
        error_tag: ErrorTag,
        source: Option<Arc<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        let id = UniqueRootId(ROOT_IDS.fetch_add(1, Ordering::Relaxed));
        Self {
            id,
            description,
            error_tag,
            source,
        }
    }

    pub(crate) fn description(&self) -> &str {
        &self.description
    }

    pub(crate) fn id(&self) -> UniqueRootId {
        self.id
    }

    pub(crate) fn error_tag(&self) -> ErrorTag {
        self.error_tag
    }

    pub(crate) fn source(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }
}

impl fmt::Debug for ErrorRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.description, f)
    }
}
