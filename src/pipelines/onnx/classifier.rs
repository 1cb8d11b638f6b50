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
use crate::pipelines::onnx::common::{
    declared_input_axis, get_input_output_mapping, InputOutputNameMapping,
};
use crate::pipelines::onnx::config::ONNXEnvironmentConfig;
use crate::pipelines::onnx::conversion::{ort_value_to_array, OrtInputArray};
use crate::span_marker::signature::CLASSIFIER_OUTPUT_NAME;
use ndarray::{Array3, Ix3};
use ort::{Environment, Session};
use std::path::PathBuf;
use std::sync::Arc;

/// # ONNX Session for the span classifier of a SpanMarker model
/// Maps `[batch, marker_pairs, 2 * hidden_size]` span features to
/// `[batch, marker_pairs, num_labels]` logits.
pub struct ONNXSpanClassifier {
    session: Session,
    name_mapping: InputOutputNameMapping,
}

impl ONNXSpanClassifier {
    pub fn new(
        model_file: PathBuf,
        environment: &Arc<Environment>,
        onnx_config: &ONNXEnvironmentConfig,
    ) -> Result<Self, SpanMarkerError> {
        let session = onnx_config
            .get_session_builder(environment)?
            .with_model_from_file(model_file)?;
        let name_mapping = get_input_output_mapping(&session);
        if name_mapping.input_names.len() != 1 {
            return Err(SpanMarkerError::InvalidConfigurationError(format!(
                "The span classifier graph must have a single input, got {:?}",
                name_mapping.input_names
            )));
        }
        Ok(Self {
            session,
            name_mapping,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Number of marker pair slots the graph was exported with, `None` if the axis is dynamic
    pub fn fixed_num_slots(&self) -> Option<usize> {
        self.name_mapping
            .input_names
            .first()
            .and_then(|input_name| declared_input_axis(&self.session, input_name, 1))
    }

    pub fn forward(&self, features: Array3<f32>) -> Result<Array3<f32>, SpanMarkerError> {
        let input_array = OrtInputArray::from_f32(features);
        let outputs = self
            .session
            .run(vec![input_array.to_value(&self.session)?])?;
        let logits = outputs
            .get(self.name_mapping.output_position(CLASSIFIER_OUTPUT_NAME))
            .ok_or_else(|| {
                SpanMarkerError::OrtError(
                    "The span classifier graph returned no output".to_string(),
                )
            })?;
        Ok(ort_value_to_array(logits)?.into_dimensionality::<Ix3>()?)
    }
}
