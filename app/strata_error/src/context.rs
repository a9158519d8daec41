/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::fmt;
use std::sync::Arc;

use crate::ErrorTag;

/// A piece of context attached on the way up from an error root.
#[derive(Clone)]
pub enum ContextValue {
    Dyn(Arc<str>),
    Tags(Vec<ErrorTag>),
}

impl ContextValue {
    /// Returns whether the context should be included in the error message
    pub(crate) fn should_display(&self) -> bool {
        match self {
            Self::Dyn(..) => true,
            Self::Tags(..) => false,
        }
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dyn(v) => f.write_str(v),
            Self::Tags(tags) => write!(f, "{tags:?}"),
        }
    }
}

impl fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        ContextValue::Dyn(value.into())
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        ContextValue::Dyn(value.into())
    }
}

/// Adds context to results and options, converting them into a [`crate::Result`].
pub trait ErrorContext<T>: Sized {
    fn error_context<C: Into<ContextValue>>(self, context: C) -> crate::Result<T>;

    fn with_error_context<C, F>(self, f: F) -> crate::Result<T>
    where
        C: Into<ContextValue>,
        F: FnOnce() -> C;

    fn tag(self, tag: ErrorTag) -> crate::Result<T>;

    /// Treats the failure as a broken invariant.
    fn internal_error(self, message: &str) -> crate::Result<T>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    crate::Error: From<E>,
{
    #[track_caller]
    fn error_context<C: Into<ContextValue>>(self, context: C) -> crate::Result<T> {
        self.map_err(|e| crate::Error::from(e).context(context))
    }

    #[track_caller]
    fn with_error_context<C, F>(self, f: F) -> crate::Result<T>
    where
        C: Into<ContextValue>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| crate::Error::from(e).context(f()))
    }

    fn tag(self, tag: ErrorTag) -> crate::Result<T> {
        self.map_err(|e| crate::Error::from(e).tag([tag]))
    }

    fn internal_error(self, message: &str) -> crate::Result<T> {
        self.map_err(|e| {
            crate::Error::from(e)
                .context(format!("{message} (internal error)"))
                .tag([ErrorTag::InternalError])
        })
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn error_context<C: Into<ContextValue>>(self, context: C) -> crate::Result<T> {
        self.ok_or_else(|| crate::Error::new(ErrorTag::Input, context.into().to_string()))
    }

    fn with_error_context<C, F>(self, f: F) -> crate::Result<T>
    where
        C: Into<ContextValue>,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| crate::Error::new(ErrorTag::Input, f().into().to_string()))
    }

    fn tag(self, tag: ErrorTag) -> crate::Result<T> {
        self.ok_or_else(|| crate::Error::new(tag, "missing value".to_owned()))
    }

    fn internal_error(self, message: &str) -> crate::Result<T> {
        self.ok_or_else(|| crate::internal_error!("{}", message))
    }
}

#[cfg(test)]
mod tests {
    use crate::ErrorContext;
    use crate::ErrorTag;

    #[test]
    fn test_context_on_option() {
        let e = None::<u32>.error_context("nothing here").unwrap_err();
        assert_eq!("nothing here", e.to_string());
        assert_eq!(ErrorTag::Input, e.best_tag());
    }

    #[test]
    fn test_internal_error_on_result() {
        let r: crate::Result<()> = Err(crate::Error::new(ErrorTag::Analysis, "root".to_owned()));
        let e = r.internal_error("lost a node").unwrap_err();
        assert_eq!(ErrorTag::InternalError, e.best_tag());
        assert_eq!("lost a node (internal error)", e.to_string());
    }
}
