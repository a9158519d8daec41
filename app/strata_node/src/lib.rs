/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Facts produced by package loading.
//!
//! Everything here is immutable once constructed and shared by reference between analysis
//! nodes.

pub mod aspect;
pub mod attrs;
pub mod exec_group;
pub mod nodes;
pub mod package;
pub mod rule;
