/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use strata_error::conversion::from_std_with_tag;
use strata_error::ErrorContext;
use strata_error::ErrorTag;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::strata_env;

pub fn init_tracing_for_writer<W>(writer: W) -> strata_error::Result<()>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    // By default, show warnings/errors.
    // If the user specifies STRATA_LOG, we want to honour that.
    const ENV_VAR: &str = "STRATA_LOG";

    let filter = match strata_env!(ENV_VAR)? {
        Some(v) => EnvFilter::try_new(v)
            .map_err(|e| from_std_with_tag(e, ErrorTag::Tier0))
            .with_error_context(|| format!("Failed to parse ${} as a filter", ENV_VAR))?,
        None => EnvFilter::new("warn"),
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| from_std_with_tag(e, ErrorTag::Tier0))
        .error_context("Failed to install the tracing subscriber")?;

    Ok(())
}
