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
use std::sync::Arc;

use dupe::Dupe;

use crate::classify::best_tag;
use crate::classify::error_tag_category;
use crate::context::ContextValue;
use crate::root::ErrorRoot;
use crate::Category;
use crate::ErrorTag;
use crate::ProvidesTag;
use crate::UniqueRootId;

/// The core error type.
///
/// An error is a root (a description, a failure code and optionally the typed error it was
/// created from) plus a stack of context added as it propagated.
#[derive(Clone, Dupe)]
pub struct Error(pub(crate) Arc<ErrorKind>);

pub(crate) enum ErrorKind {
    Root(Box<ErrorRoot>),
    WithContext(ContextValue, Error),
}

impl Error {
    #[cold]
    #[track_caller]
    pub fn new(error_tag: ErrorTag, description: String) -> Self {
        Self(Arc::new(ErrorKind::Root(Box::new(ErrorRoot::new(
            description,
            error_tag,
            None,
        )))))
    }

    #[cold]
    pub(crate) fn from_root(root: ErrorRoot) -> Self {
        Self(Arc::new(ErrorKind::Root(Box::new(root))))
    }

    fn iter_kinds(&self) -> impl Iterator<Item = &ErrorKind> {
        let mut cur = Some(self);
        std::iter::from_fn(move || {
            let out = cur?;
            match &*out.0 {
                ErrorKind::WithContext(_, next) => cur = Some(next),
                ErrorKind::Root(_) => cur = None,
            };
            Some(out.0.as_ref())
        })
    }

    fn iter_context(&self) -> impl Iterator<Item = &ContextValue> {
        self.iter_kinds().filter_map(|kind| match kind {
            ErrorKind::WithContext(ctx, _) => Some(ctx),
            ErrorKind::Root(_) => None,
        })
    }

    fn root(&self) -> &ErrorRoot {
        let mut cur = self;
        loop {
            match &*cur.0 {
                ErrorKind::Root(root) => return root,
                ErrorKind::WithContext(_, inner) => cur = inner,
            }
        }
    }

    pub fn context<C: Into<ContextValue>>(self, context: C) -> Self {
        Self(Arc::new(ErrorKind::WithContext(context.into(), self)))
    }

    pub fn tag(self, tags: impl IntoIterator<Item = ErrorTag>) -> Self {
        let tags: Vec<ErrorTag> = tags.into_iter().collect();
        if tags.is_empty() {
            self
        } else {
            self.context(ContextValue::Tags(tags))
        }
    }

    /// All tags, root tag first, deduplicated.
    pub fn tags(&self) -> Vec<ErrorTag> {
        let mut tags = vec![self.root().error_tag()];
        let mut context: Vec<&ContextValue> = self.iter_context().collect();
        context.reverse();
        for ctx in context {
            if let ContextValue::Tags(ts) = ctx {
                for t in ts {
                    if !tags.contains(t) {
                        tags.push(*t);
                    }
                }
            }
        }
        tags
    }

    /// The most important failure code attached to this error.
    pub fn best_tag(&self) -> ErrorTag {
        best_tag(self.tags()).unwrap_or_else(|| self.root().error_tag())
    }

    pub fn category(&self) -> Category {
        error_tag_category(self.best_tag())
    }

    pub fn root_id(&self) -> UniqueRootId {
        self.root().id()
    }

    /// The message of the error root, without any context.
    pub fn description(&self) -> &str {
        self.root().description()
    }

    /// Finds the typed error this error was created from.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let mut source: Option<&(dyn StdError + 'static)> = match self.root().source() {
            Some(s) => Some(s),
            None => None,
        };
        while let Some(s) = source {
            if let Some(e) = s.downcast_ref::<E>() {
                return Some(e);
            }
            source = s.source();
        }
        None
    }

    pub fn is_internal(&self) -> bool {
        self.tags().contains(&ErrorTag::InternalError)
    }
}

impl<E> From<E> for Error
where
    E: StdError + ProvidesTag + Send + Sync + 'static,
{
    #[cold]
    #[track_caller]
    fn from(value: E) -> Self {
        let tag = value.error_tag();
        crate::conversion::from_std_with_tag(value, tag)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut messages: Vec<String> = self
            .iter_context()
            .filter(|c| c.should_display())
            .map(|c| c.to_string())
            .collect();
        messages.push(self.root().description().to_owned());
        let mut iter = messages.iter();
        if let Some(top) = iter.next() {
            f.write_str(top)?;
        }
        if f.alternate() {
            let rest: Vec<&String> = iter.collect();
            if !rest.is_empty() {
                f.write_str("\n\nCaused by:")?;
                for (i, m) in rest.iter().enumerate() {
                    write!(f, "\n    {i}: {m}")?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self)?;
        write!(f, "\n\nTags: {:?}", self.tags())
    }
}

/// Lets an [`Error`] flow into code that works with `anyhow`.
struct AsStdError(Error);

impl fmt::Display for AsStdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for AsStdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl StdError for AsStdError {}

impl From<Error> for anyhow::Error {
    fn from(value: Error) -> Self {
        anyhow::Error::new(AsStdError(value))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use dupe::Dupe;

    use crate::Category;
    use crate::ErrorTag;
    use crate::ProvidesTag;

    #[derive(Debug, thiserror::Error)]
    #[error("no such package `{0}`")]
    struct NoSuchPackage(String);

    impl ProvidesTag for NoSuchPackage {
        fn error_tag(&self) -> ErrorTag {
            ErrorTag::PackageLoading
        }
    }

    #[test]
    fn test_display_with_context() {
        let e = crate::Error::from(NoSuchPackage("foo".to_owned()))
            .context("loading //foo:bar")
            .context("analyzing //app:bin");
        assert_eq!("analyzing //app:bin", format!("{}", e));
        assert_eq!(
            "analyzing //app:bin\n\nCaused by:\n    0: loading //foo:bar\n    1: no such package `foo`",
            format!("{:#}", e)
        );
        assert_eq!("no such package `foo`", e.description());
    }

    #[test]
    fn test_downcast() {
        let e = crate::Error::from(NoSuchPackage("foo".to_owned())).context("ctx");
        assert_matches!(e.downcast_ref::<NoSuchPackage>(), Some(NoSuchPackage(p)) if p == "foo");
        assert_matches!(e.downcast_ref::<std::fmt::Error>(), None);
    }

    #[test]
    fn test_tags_and_category() {
        let e = crate::Error::from(NoSuchPackage("foo".to_owned()));
        assert_eq!(vec![ErrorTag::PackageLoading], e.tags());
        assert_eq!(Category::User, e.category());

        let e = e.tag([ErrorTag::InternalError]);
        assert_eq!(ErrorTag::InternalError, e.best_tag());
        assert_eq!(Category::Infra, e.category());
    }

    #[test]
    fn test_clone_keeps_root_id() {
        let e = crate::Error::new(ErrorTag::Analysis, "boom".to_owned());
        let c = e.dupe().context("more");
        assert_eq!(e.root_id(), c.root_id());
        let other = crate::Error::new(ErrorTag::Analysis, "boom".to_owned());
        assert_ne!(e.root_id(), other.root_id());
    }
}
