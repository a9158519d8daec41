/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Typed overrides read from environment variables.

mod helper;

pub use helper::parse_bool;
pub use helper::parse_from_str;
pub use helper::EnvHelper;

/// Reads an environment variable once and caches the parsed value.
///
/// ```ignore
/// let keep_going: Option<bool> = strata_env!("STRATA_KEEP_GOING", bool)?;
/// let permits: Option<usize> = strata_env!("STRATA_CPU_PERMITS", type = usize)?;
/// let raw: Option<&str> = strata_env!("STRATA_LOG")?;
/// ```
#[macro_export]
macro_rules! strata_env {
    ($var:expr, bool) => {{
        static ENV_HELPER: $crate::env::EnvHelper<bool> =
            $crate::env::EnvHelper::with_converter_from_macro($var, $crate::env::parse_bool);
        ENV_HELPER.get().map(|v| v.copied())
    }};
    ($var:expr, type = $ty:ty) => {{
        static ENV_HELPER: $crate::env::EnvHelper<$ty> =
            $crate::env::EnvHelper::with_converter_from_macro(
                $var,
                $crate::env::parse_from_str::<$ty>,
            );
        ENV_HELPER.get()
    }};
    ($var:expr) => {{
        static ENV_HELPER: $crate::env::EnvHelper<String> =
            $crate::env::EnvHelper::with_converter_from_macro(
                $var,
                $crate::env::parse_from_str::<String>,
            );
        ENV_HELPER.get().map(|v| v.map(String::as_str))
    }};
}
