/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

/// Creates an [`Error`](crate::Error) with the given tag from a format string.
#[macro_export]
macro_rules! strata_error {
    ($tag:expr, $fmt:literal $(, $args:expr)* $(,)?) => {
        $crate::Error::new($tag, format!($fmt $(, $args)*))
    };
}

/// Creates an error for a broken invariant.
#[macro_export]
macro_rules! internal_error {
    ($fmt:literal $(, $args:expr)* $(,)?) => {
        $crate::Error::new(
            $crate::ErrorTag::InternalError,
            format!(concat!($fmt, " (internal error)") $(, $args)*),
        )
    };
}

#[cfg(test)]
mod tests {
    use crate::ErrorTag;

    #[test]
    fn test_internal_error() {
        let e = crate::internal_error!("missing {} for {}", "value", "//a:b");
        assert_eq!("missing value for //a:b (internal error)", e.to_string());
        assert_eq!(ErrorTag::InternalError, e.best_tag());
    }

    #[test]
    fn test_strata_error() {
        let e = crate::strata_error!(ErrorTag::TargetNotFound, "no such target '{}'", "//a:b");
        assert_eq!("no such target '//a:b'", e.to_string());
    }
}
