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
use crate::span_marker::signature::{
    ATTENTION_MASK_NAME, INPUT_IDS_NAME, LAST_HIDDEN_STATE_NAME, POSITION_IDS_NAME,
};
use ndarray::{Array3, ArrayView2, ArrayView3, ArrayViewD, Ix3};
use ort::{Environment, Session};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// # ONNX Session for the transformer encoder of a SpanMarker model
pub struct ONNXEncoder {
    session: Session,
    name_mapping: InputOutputNameMapping,
}

impl ONNXEncoder {
    pub fn new(
        model_file: PathBuf,
        environment: &Arc<Environment>,
        onnx_config: &ONNXEnvironmentConfig,
    ) -> Result<Self, SpanMarkerError> {
        let session = onnx_config
            .get_session_builder(environment)?
            .with_model_from_file(model_file)?;
        let name_mapping = get_input_output_mapping(&session);
        Ok(Self {
            session,
            name_mapping,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Sequence length the graph was exported with, `None` if the sequence axis is dynamic
    pub fn fixed_sequence_length(&self) -> Option<usize> {
        declared_input_axis(&self.session, INPUT_IDS_NAME, 1)
    }

    /// Runs the encoder.
    ///
    /// # Arguments
    ///
    /// * `input_ids` - `[batch, sequence]` token ids, markers included
    /// * `attention_mask` - `[batch, sequence, sequence]` attention mask
    /// * `position_ids` - `[batch, sequence]` position ids
    ///
    /// # Returns
    ///
    /// * `last_hidden_state` - `[batch, sequence, hidden_size]`
    pub fn forward(
        &self,
        input_ids: ArrayView2<i64>,
        attention_mask: ArrayView3<i64>,
        position_ids: ArrayView2<i64>,
    ) -> Result<Array3<f32>, SpanMarkerError> {
        let mut input_dict: HashMap<&str, ArrayViewD<i64>> = HashMap::new();
        input_dict.insert(INPUT_IDS_NAME, input_ids.view().into_dyn());
        input_dict.insert(ATTENTION_MASK_NAME, attention_mask.view().into_dyn());
        input_dict.insert(POSITION_IDS_NAME, position_ids.view().into_dyn());

        let inputs_arrays = self
            .name_mapping
            .input_names
            .iter()
            .zip(self.session.inputs.iter())
            .map(|(input_name, input)| {
                input_dict
                    .remove(input_name.as_str())
                    .map(|array| OrtInputArray::from_i64(array, &input.input_type))
                    .ok_or_else(|| {
                        SpanMarkerError::OrtError(format!(
                            "{input_name} not found but expected by model."
                        ))
                    })
            })
            .collect::<Result<Vec<_>, SpanMarkerError>>()?;
        let input_values = inputs_arrays
            .iter()
            .map(|array| array.to_value(&self.session))
            .collect::<Result<Vec<_>, SpanMarkerError>>()?;

        let outputs = self.session.run(input_values)?;
        let last_hidden_state = outputs
            .get(self.name_mapping.output_position(LAST_HIDDEN_STATE_NAME))
            .ok_or_else(|| {
                SpanMarkerError::OrtError("The encoder graph returned no output".to_string())
            })?;
        Ok(ort_value_to_array(last_hidden_state)?.into_dimensionality::<Ix3>()?)
    }
}
