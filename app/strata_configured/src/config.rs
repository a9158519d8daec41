/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::time::Duration;

use strata_core::strata_env;

/// Settings of the analysis phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Keep analyzing other targets after a failure.
    pub keep_going: bool,
    /// How many nodes may do CPU-bound analysis work at the same time.
    pub cpu_permits: usize,
    /// Give the CPU permit back while waiting for requested values.
    pub unblock_cpu_work_when_fetching_deps: bool,
    /// Record the packages loaded by each configured target and its dependencies.
    pub store_transitive_packages: bool,
    /// Acquiring a CPU permit slower than this is logged.
    pub stall_log_threshold: Duration,
    pub scheduler_threads: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism().map_or(1, |n| n.get());
        AnalysisConfig {
            keep_going: false,
            cpu_permits: parallelism,
            unblock_cpu_work_when_fetching_deps: true,
            store_transitive_packages: false,
            stall_log_threshold: Duration::from_millis(5),
            scheduler_threads: parallelism,
        }
    }
}

impl AnalysisConfig {
    /// Defaults overridden by `$STRATA_*` environment variables.
    pub fn from_env() -> strata_error::Result<AnalysisConfig> {
        let mut config = AnalysisConfig::default();
        if let Some(v) = strata_env!("STRATA_KEEP_GOING", bool)? {
            config.keep_going = v;
        }
        if let Some(v) = strata_env!("STRATA_CPU_PERMITS", type = usize)? {
            config.cpu_permits = (*v).max(1);
        }
        if let Some(v) = strata_env!("STRATA_UNBLOCK_CPU_WHEN_FETCHING", bool)? {
            config.unblock_cpu_work_when_fetching_deps = v;
        }
        if let Some(v) = strata_env!("STRATA_STORE_TRANSITIVE_PACKAGES", bool)? {
            config.store_transitive_packages = v;
        }
        if let Some(v) = strata_env!("STRATA_THROTTLE_STALL_MS", type = u64)? {
            config.stall_log_threshold = Duration::from_millis(*v);
        }
        if let Some(v) = strata_env!("STRATA_SCHEDULER_THREADS", type = usize)? {
            config.scheduler_threads = (*v).max(1);
        }
        Ok(config)
    }
}
