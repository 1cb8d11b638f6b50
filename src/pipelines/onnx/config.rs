// Copyright 2023 The spanmarker-onnx Authors
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::common::error::SpanMarkerError;
use ort::{Environment, ExecutionProvider, GraphOptimizationLevel, SessionBuilder};
use std::sync::Arc;

/// # ONNX Runtime session configuration
/// Shared by the encoder and classifier sessions of a model.
#[derive(Debug)]
pub struct ONNXEnvironmentConfig {
    pub optimization_level: Option<GraphOptimizationLevel>,
    pub num_intra_threads: Option<i16>,
    pub num_inter_threads: Option<i16>,
    pub parallel_execution: Option<bool>,
    pub enable_memory_pattern: Option<bool>,
    /// Execution providers registered on the environment, CPU if `None`
    pub execution_providers: Option<Vec<ExecutionProvider>>,
}

impl Default for ONNXEnvironmentConfig {
    /// All graph optimizations, sequential execution and one intra-op thread per available core
    fn default() -> Self {
        ONNXEnvironmentConfig {
            optimization_level: Some(GraphOptimizationLevel::Level3),
            num_intra_threads: std::thread::available_parallelism()
                .ok()
                .map(|threads| i16::try_from(threads.get()).unwrap_or(i16::MAX)),
            num_inter_threads: None,
            parallel_execution: Some(false),
            enable_memory_pattern: None,
            execution_providers: None,
        }
    }
}

impl ONNXEnvironmentConfig {
    pub fn get_environment(&self, name: &str) -> Result<Arc<Environment>, SpanMarkerError> {
        let mut builder = Environment::builder().with_name(name);
        if let Some(execution_providers) = &self.execution_providers {
            builder = builder.with_execution_providers(execution_providers.as_slice());
        }
        Ok(builder.build()?.into_arc())
    }

    pub(crate) fn get_session_builder(
        &self,
        environment: &Arc<Environment>,
    ) -> Result<SessionBuilder, SpanMarkerError> {
        let mut session_builder = SessionBuilder::new(environment)?;
        let optimization_level = match &self.optimization_level {
            Some(GraphOptimizationLevel::Level3) => Some(GraphOptimizationLevel::Level3),
            Some(GraphOptimizationLevel::Level2) => Some(GraphOptimizationLevel::Level2),
            Some(GraphOptimizationLevel::Level1) => Some(GraphOptimizationLevel::Level1),
            Some(GraphOptimizationLevel::Disable) => Some(GraphOptimizationLevel::Disable),
            None => None,
        };
        if let Some(optimization_level) = optimization_level {
            session_builder = session_builder.with_optimization_level(optimization_level)?;
        }
        if let Some(num_intra_threads) = self.num_intra_threads {
            session_builder = session_builder.with_intra_threads(num_intra_threads)?;
        }
        if let Some(num_inter_threads) = self.num_inter_threads {
            session_builder = session_builder.with_inter_threads(num_inter_threads)?;
        }
        if let Some(parallel_execution) = self.parallel_execution {
            session_builder = session_builder.with_parallel_execution(parallel_execution)?;
        }
        if let Some(enable_memory_pattern) = self.enable_memory_pattern {
            session_builder = session_builder.with_memory_pattern(enable_memory_pattern)?;
        }
        Ok(session_builder)
    }
}
