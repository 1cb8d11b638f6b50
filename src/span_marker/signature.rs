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

//! # Graph signature of an exported SpanMarker model
//!
//! A SpanMarker model is exported as two ONNX graphs: the transformer encoder and the span
//! classifier. This module holds the names and dynamic axes both graphs are exported with, and
//! generates dummy inputs matching the encoder and classifier signatures. Dummy inputs are used to
//! smoke-test freshly exported graphs before serving them.

use crate::common::error::SpanMarkerError;
use crate::span_marker::config::SpanMarkerConfig;
use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Opset the graphs are exported with
pub const ORT_OPSET: i64 = 13;
/// Name of the dynamic batch axis (axis 0 of every input and output)
pub const BATCH_AXIS_NAME: &str = "batch_size";

pub const INPUT_IDS_NAME: &str = "input_ids";
pub const ATTENTION_MASK_NAME: &str = "attention_mask";
pub const POSITION_IDS_NAME: &str = "position_ids";
pub const LAST_HIDDEN_STATE_NAME: &str = "last_hidden_state";
pub const POOLER_OUTPUT_NAME: &str = "pooler_output";
pub const CLASSIFIER_INPUT_NAME: &str = "input";
pub const CLASSIFIER_OUTPUT_NAME: &str = "output";

pub const ENCODER_INPUT_NAMES: [&str; 3] =
    [INPUT_IDS_NAME, ATTENTION_MASK_NAME, POSITION_IDS_NAME];
pub const ENCODER_OUTPUT_NAMES: [&str; 2] = [LAST_HIDDEN_STATE_NAME, POOLER_OUTPUT_NAME];
pub const CLASSIFIER_INPUT_NAMES: [&str; 1] = [CLASSIFIER_INPUT_NAME];
pub const CLASSIFIER_OUTPUT_NAMES: [&str; 1] = [CLASSIFIER_OUTPUT_NAME];

/// Batch size of the dummy classifier input
pub const CLASSIFIER_DUMMY_BATCH_SIZE: usize = 4;
/// Number of marker pairs of the dummy classifier input
pub const CLASSIFIER_DUMMY_NUM_MARKERS: usize = 256;

/// Checks that a graph declares every expected name.
///
/// # Arguments
///
/// * `graph` - graph description used in the error message (e.g. `"encoder inputs"`)
/// * `declared` - names declared by the loaded graph
/// * `expected` - names the graph must declare
pub fn check_names<S: AsRef<str>>(
    graph: &str,
    declared: &[S],
    expected: &[&str],
) -> Result<(), SpanMarkerError> {
    let missing = expected
        .iter()
        .filter(|name| !declared.iter().any(|declared| declared.as_ref() == **name))
        .copied()
        .collect::<Vec<&str>>();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SpanMarkerError::InvalidConfigurationError(format!(
            "The {graph} are missing {missing:?}, declared: {:?}",
            declared.iter().map(AsRef::as_ref).collect::<Vec<&str>>()
        )))
    }
}

#[derive(Debug, Clone)]
/// # Dummy inputs of the encoder graph
pub struct DummyEncoderInputs {
    /// `[1, sequence]` ids in `[0, vocab_size)`
    pub input_ids: Array2<i64>,
    /// `[1, sequence, sequence]` values in `{0, 1}`
    pub attention_mask: Array3<i64>,
    /// `[1, sequence]` positions in `[0, sequence)`
    pub position_ids: Array2<i64>,
}

/// # Seeded generator of dummy inputs
pub struct DummyInputGenerator {
    rng: StdRng,
}

impl DummyInputGenerator {
    pub const BATCH_SIZE: usize = 1;

    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generates encoder inputs of sequence length `model_max_length_default`.
    pub fn encoder_inputs(&mut self, config: &SpanMarkerConfig) -> DummyEncoderInputs {
        let sequence_length = config.model_max_length_default;
        let vocab_size = config.vocab_size().max(1) as i64;
        let rng = &mut self.rng;

        let input_ids = Array2::from_shape_fn((Self::BATCH_SIZE, sequence_length), |_| {
            rng.gen_range(0..vocab_size)
        });
        let attention_mask = Array3::from_shape_fn(
            (Self::BATCH_SIZE, sequence_length, sequence_length),
            |_| rng.gen_range(0..=1),
        );
        let position_ids = Array2::from_shape_fn((Self::BATCH_SIZE, sequence_length), |_| {
            rng.gen_range(0..sequence_length.max(1) as i64)
        });
        DummyEncoderInputs {
            input_ids,
            attention_mask,
            position_ids,
        }
    }

    /// Generates a classifier input of shape `[4, 256, 2 * hidden_size]`, uniform in `[-1, 1)`.
    pub fn classifier_input(&mut self, config: &SpanMarkerConfig) -> Array3<f32> {
        let rng = &mut self.rng;
        Array3::from_shape_fn(
            (
                CLASSIFIER_DUMMY_BATCH_SIZE,
                CLASSIFIER_DUMMY_NUM_MARKERS,
                2 * config.hidden_size(),
            ),
            |_| rng.gen_range(-1.0f32..1.0),
        )
    }
}

impl Default for DummyInputGenerator {
    fn default() -> Self {
        Self::new(42)
    }
}
