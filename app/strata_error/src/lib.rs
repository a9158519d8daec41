/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The error type used throughout strata.
//!
//! Errors are cheap to clone: failures are cached as values in the dependency environment and
//! handed to every dependent that requests them.
//!
//! Error enums are declared with [`thiserror::Error`] and implement [`ProvidesTag`], which is
//! what allows `?` to turn them into a [`Error`] carrying a failure code.

mod classify;
mod context;
pub mod conversion;
mod error;
pub mod macros;
mod root;

pub use classify::best_tag;
pub use classify::choose_more_important_with_first_if_tie;
pub use classify::Category;
pub use classify::ErrorTag;
pub use context::ContextValue;
pub use context::ErrorContext;
pub use error::Error;
pub use root::UniqueRootId;

pub type Result<T> = std::result::Result<T, crate::Error>;

/// Attaches a failure code to an error type.
///
/// Implemented by every error enum that is converted into [`Error`].
pub trait ProvidesTag {
    fn error_tag(&self) -> ErrorTag;
}

#[doc(hidden)]
pub mod __for_macro {
    pub use anyhow;
}
