/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Configured-target analysis.
//!
//! A [`ConfiguredTargetKey`](keys::ConfiguredTargetKey) names a target in a configuration;
//! computing it loads the target, resolves its toolchains, `select()` conditions and
//! dependencies, and runs the rule implementation registered for the target's rule.

mod alias;
pub mod aspect;
pub mod builtin_rules;
pub mod calculation;
pub mod conditions;
pub mod config;
pub mod dependencies;
pub mod diagnostics;
pub mod errors;
pub mod keys;
pub mod progress;
pub mod rule;
pub mod services;
pub mod throttle;
pub mod toolchain;
pub mod value;
