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
use crate::pipelines::onnx::classifier::ONNXSpanClassifier;
use crate::pipelines::onnx::common::validate_signature;
use crate::pipelines::onnx::config::ONNXEnvironmentConfig;
use crate::pipelines::onnx::encoder::ONNXEncoder;
use crate::pipelines::span_marker::SpanMarkerBackend;
use crate::resources::ResourceProvider;
use crate::span_marker::collator::SpanMarkerBatch;
use crate::span_marker::signature::{
    CLASSIFIER_INPUT_NAMES, CLASSIFIER_OUTPUT_NAMES, ENCODER_INPUT_NAMES, LAST_HIDDEN_STATE_NAME,
};
use ndarray::{s, Array3, ArrayView1, ArrayView3};
use tracing::debug;

/// Gathers the hidden states of every start/end marker pair into the classifier input.
///
/// # Arguments
///
/// * `last_hidden_state` - `[batch, sequence, hidden_size]` encoder output
/// * `start_marker_indices` - `[batch]` position of the first start marker of each row
/// * `num_marker_pairs` - `[batch]` number of marker pairs of each row
/// * `num_slots` - marker pair slots of the classifier input, the classifier graph's fixed second
///   axis, or `sequence / 2` for a graph with a dynamic axis
///
/// # Returns
///
/// * `[batch, num_slots, 2 * hidden_size]` features. Pair `j` of row `i` is the hidden state of
///   start marker `start_i + j` followed by the one of end marker `start_i + n_i + j`. Slots past
///   `n_i` are zero.
pub fn build_feature_vector(
    last_hidden_state: ArrayView3<f32>,
    start_marker_indices: ArrayView1<i64>,
    num_marker_pairs: ArrayView1<i64>,
    num_slots: usize,
) -> Result<Array3<f32>, SpanMarkerError> {
    let (batch_size, sequence_length, hidden_size) = last_hidden_state.dim();
    if start_marker_indices.len() != batch_size || num_marker_pairs.len() != batch_size {
        return Err(SpanMarkerError::InternalConsistencyError(format!(
            "Got {} start marker indices and {} marker pair counts for a batch of {batch_size}",
            start_marker_indices.len(),
            num_marker_pairs.len()
        )));
    }
    let to_usize = |value: i64| {
        usize::try_from(value).map_err(|_| {
            SpanMarkerError::InternalConsistencyError(format!(
                "Negative marker index or count: {value}"
            ))
        })
    };

    let mut features = Array3::<f32>::zeros((batch_size, num_slots, 2 * hidden_size));
    for (row, (start, pairs)) in start_marker_indices
        .iter()
        .zip(num_marker_pairs.iter())
        .enumerate()
    {
        let (start, pairs) = (to_usize(*start)?, to_usize(*pairs)?);
        if pairs > num_slots {
            return Err(SpanMarkerError::InternalConsistencyError(format!(
                "{pairs} marker pairs do not fit in {num_slots} classifier slots"
            )));
        }
        let end = start + pairs;
        if end + pairs > sequence_length {
            return Err(SpanMarkerError::InternalConsistencyError(format!(
                "{pairs} marker pairs starting at {start} do not fit in a sequence of {sequence_length}"
            )));
        }
        features
            .slice_mut(s![row, ..pairs, ..hidden_size])
            .assign(&last_hidden_state.slice(s![row, start..end, ..]));
        features
            .slice_mut(s![row, ..pairs, hidden_size..])
            .assign(&last_hidden_state.slice(s![row, end..end + pairs, ..]));
    }
    Ok(features)
}

/// # SpanMarker model exported as an encoder graph and a span classifier graph
pub struct ONNXSpanMarker {
    encoder: ONNXEncoder,
    classifier: ONNXSpanClassifier,
}

impl ONNXSpanMarker {
    /// Loads both graphs in a shared ONNX Runtime environment and checks their signatures.
    ///
    /// # Arguments
    ///
    /// * `encoder_resource` - encoder graph (`encoder.onnx`)
    /// * `classifier_resource` - span classifier graph (`classifier.onnx`)
    /// * `onnx_config` - session configuration
    ///
    /// # Example
    ///
    /// ```no_run
    /// # fn main() -> anyhow::Result<()> {
    /// use spanmarker_onnx::pipelines::onnx::{ONNXEnvironmentConfig, ONNXSpanMarker};
    /// use spanmarker_onnx::resources::LocalResource;
    /// use std::path::PathBuf;
    ///
    /// let encoder = LocalResource::from(PathBuf::from("path/to/encoder.onnx"));
    /// let classifier = LocalResource::from(PathBuf::from("path/to/classifier.onnx"));
    /// let backend = ONNXSpanMarker::new(&encoder, &classifier, &ONNXEnvironmentConfig::default())?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        encoder_resource: &dyn ResourceProvider,
        classifier_resource: &dyn ResourceProvider,
        onnx_config: &ONNXEnvironmentConfig,
    ) -> Result<Self, SpanMarkerError> {
        let environment = onnx_config.get_environment("SpanMarker")?;
        let encoder = ONNXEncoder::new(
            encoder_resource.get_local_path()?,
            &environment,
            onnx_config,
        )?;
        validate_signature(
            encoder.session(),
            &ENCODER_INPUT_NAMES,
            &[LAST_HIDDEN_STATE_NAME],
        )?;
        let classifier = ONNXSpanClassifier::new(
            classifier_resource.get_local_path()?,
            &environment,
            onnx_config,
        )?;
        validate_signature(
            classifier.session(),
            &CLASSIFIER_INPUT_NAMES,
            &CLASSIFIER_OUTPUT_NAMES,
        )?;
        Ok(Self {
            encoder,
            classifier,
        })
    }

    pub fn encoder(&self) -> &ONNXEncoder {
        &self.encoder
    }

    pub fn classifier(&self) -> &ONNXSpanClassifier {
        &self.classifier
    }

    /// Marker pair slots of the classifier input for an encoder output of `sequence_length`
    pub fn num_slots(&self, sequence_length: usize) -> usize {
        self.classifier
            .fixed_num_slots()
            .unwrap_or(sequence_length / 2)
    }
}

impl SpanMarkerBackend for ONNXSpanMarker {
    fn fixed_sequence_length(&self) -> Option<usize> {
        self.encoder.fixed_sequence_length()
    }

    fn forward(&self, batch: &SpanMarkerBatch) -> Result<Array3<f32>, SpanMarkerError> {
        debug!(
            "Encoding a batch of {} rows of {} tokens",
            batch.batch_size(),
            batch.sequence_length()
        );
        if let Some(sequence_length) = self.encoder.fixed_sequence_length() {
            if batch.sequence_length() != sequence_length {
                return Err(SpanMarkerError::InternalConsistencyError(format!(
                    "The encoder graph expects sequences of {sequence_length} tokens, got {}",
                    batch.sequence_length()
                )));
            }
        }
        let last_hidden_state = self.encoder.forward(
            batch.input_ids.view(),
            batch.attention_mask.view(),
            batch.position_ids.view(),
        )?;
        let features = build_feature_vector(
            last_hidden_state.view(),
            batch.start_marker_indices.view(),
            batch.num_marker_pairs.view(),
            self.num_slots(last_hidden_state.shape()[1]),
        )?;
        self.classifier.forward(features)
    }
}
