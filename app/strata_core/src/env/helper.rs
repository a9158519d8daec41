/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::env;
use std::env::VarError;
use std::fmt::Display;
use std::str::FromStr;

use once_cell::sync::OnceCell;
use strata_error::ErrorContext;
use strata_error::ErrorTag;

pub struct EnvHelper<T> {
    convert: fn(&str) -> strata_error::Result<T>,
    var: &'static str,
    cell: OnceCell<Option<T>>,
}

impl<T> EnvHelper<T> {
    pub const fn with_converter_from_macro(
        var: &'static str,
        convert: fn(&str) -> strata_error::Result<T>,
    ) -> Self {
        Self {
            convert,
            var,
            cell: OnceCell::new(),
        }
    }

    // `EnvHelper` caches the computed value, so it only makes sense in a static.
    pub fn get(&'static self) -> strata_error::Result<Option<&'static T>> {
        let var = self.var;
        let convert = self.convert;

        self.cell
            .get_or_try_init(move || match env::var(var) {
                Ok(v) => {
                    tracing::info!("Env override found: ${} = {}", var, v);
                    Ok(Some((convert)(&v)?))
                }
                Err(VarError::NotPresent) => Ok(None),
                Err(VarError::NotUnicode(..)) => Err(strata_error::strata_error!(
                    ErrorTag::Tier0,
                    "Variable is not unicode"
                )),
            })
            .map(Option::as_ref)
            .with_error_context(|| format!("Invalid value for ${}", var))
    }
}

pub fn parse_from_str<T>(s: &str) -> strata_error::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    T::from_str(s).map_err(|e| strata_error::strata_error!(ErrorTag::Input, "{}", e))
}

/// Accepts `1`/`0`, `true`/`false` and `yes`/`no`.
pub fn parse_bool(s: &str) -> strata_error::Result<bool> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(strata_error::strata_error!(
            ErrorTag::Input,
            "Expected a boolean, got `{}`",
            s
        )),
    }
}

#[cfg(test)]
mod tests {
    use crate::env::parse_bool;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("1").unwrap());
        assert!(parse_bool("True").unwrap());
        assert!(!parse_bool("no").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_unset_var() {
        let v: Option<&usize> =
            crate::strata_env!("STRATA_TEST_SURELY_UNSET_VARIABLE", type = usize).unwrap();
        assert_eq!(None, v);
    }
}
