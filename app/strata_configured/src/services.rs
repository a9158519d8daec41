/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::sync::Arc;

use dupe::Dupe;
use strata_dice::DiceBuilder;
use strata_dice::DiceData;

use crate::config::AnalysisConfig;
use crate::diagnostics::EventHandler;
use crate::progress::ConfiguredTargetProgress;
use crate::rule::RuleRegistry;
use crate::throttle::CpuPermits;

/// Everything analysis needs besides the values in the environment.
#[derive(Clone)]
pub struct AnalysisServices {
    pub config: AnalysisConfig,
    pub rules: Arc<RuleRegistry>,
    pub throttle: Arc<CpuPermits>,
    pub events: Arc<dyn EventHandler>,
    pub progress: Option<Arc<dyn ConfiguredTargetProgress>>,
}

impl AnalysisServices {
    pub fn new(config: AnalysisConfig, rules: RuleRegistry, events: Arc<dyn EventHandler>) -> Self {
        let throttle = CpuPermits::new(config.cpu_permits, config.stall_log_threshold);
        AnalysisServices {
            config,
            rules: Arc::new(rules),
            throttle,
            events,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ConfiguredTargetProgress>) -> Self {
        self.progress = Some(progress);
        self
    }
}

pub trait SetAnalysisServices {
    fn set_analysis_services(&mut self, services: AnalysisServices);
}

impl SetAnalysisServices for DiceBuilder {
    fn set_analysis_services(&mut self, services: AnalysisServices) {
        self.set(Arc::new(services));
    }
}

pub trait HasAnalysisServices {
    fn get_analysis_services(&self) -> strata_error::Result<Arc<AnalysisServices>>;
}

impl HasAnalysisServices for DiceData {
    fn get_analysis_services(&self) -> strata_error::Result<Arc<AnalysisServices>> {
        Ok(self.get::<Arc<AnalysisServices>>()?.dupe())
    }
}
