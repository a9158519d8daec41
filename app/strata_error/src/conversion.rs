/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Conversions from foreign error types.

use std::error::Error as StdError;
use std::sync::Arc;

use crate::root::ErrorRoot;
use crate::ErrorTag;

/// Wraps any std error, keeping it available for [`crate::Error::downcast_ref`].
#[cold]
pub fn from_std_with_tag<E>(e: E, tag: ErrorTag) -> crate::Error
where
    E: StdError + Send + Sync + 'static,
{
    let description = e.to_string();
    crate::Error::from_root(ErrorRoot::new(description, tag, Some(Arc::new(e))))
}

/// Converts an `anyhow` error, flattening its context chain into the description.
#[cold]
pub fn from_any_with_tag(e: anyhow::Error, tag: ErrorTag) -> crate::Error {
    crate::Error::new(tag, format!("{:#}", e))
}
