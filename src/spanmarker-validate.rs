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

use ndarray::Array1;
use spanmarker_onnx::pipelines::onnx::{
    build_feature_vector, validate_signature, ONNXEnvironmentConfig, ONNXSpanMarker,
};
use spanmarker_onnx::resources::LocalResource;
use spanmarker_onnx::span_marker::signature::{ENCODER_INPUT_NAMES, ENCODER_OUTPUT_NAMES};
use spanmarker_onnx::span_marker::{DummyInputGenerator, SpanMarkerConfig};
use spanmarker_onnx::{Config, SpanMarkerError};
use std::path::PathBuf;
use tracing::info;

pub fn main() -> Result<(), SpanMarkerError> {
    tracing_subscriber::fmt::init();

    let args: Vec<_> = std::env::args().collect();
    if args.len() != 4 {
        return Err(SpanMarkerError::ValueError(format!(
            "usage: {} encoder.onnx classifier.onnx config.json",
            args[0].as_str()
        )));
    }
    let encoder_resource = LocalResource::from(PathBuf::from(&args[1]));
    let classifier_resource = LocalResource::from(PathBuf::from(&args[2]));
    let config = SpanMarkerConfig::from_file(&args[3])?;

    let model = ONNXSpanMarker::new(
        &encoder_resource,
        &classifier_resource,
        &ONNXEnvironmentConfig::default(),
    )?;
    // Loading checks the names inference uses, an exported encoder also declares `pooler_output`
    validate_signature(
        model.encoder().session(),
        &ENCODER_INPUT_NAMES,
        &ENCODER_OUTPUT_NAMES,
    )?;
    info!("Graph signatures validated");

    if let Some(sequence_length) = model.encoder().fixed_sequence_length() {
        if sequence_length != config.model_max_length_default {
            return Err(SpanMarkerError::InvalidConfigurationError(format!(
                "The encoder graph takes sequences of {sequence_length} tokens, \
                `model_max_length_default` is {}",
                config.model_max_length_default
            )));
        }
    }

    let mut generator = DummyInputGenerator::default();
    let encoder_inputs = generator.encoder_inputs(&config);
    let last_hidden_state = model.encoder().forward(
        encoder_inputs.input_ids.view(),
        encoder_inputs.attention_mask.view(),
        encoder_inputs.position_ids.view(),
    )?;
    println!("encoder last_hidden_state: {:?}", last_hidden_state.shape());

    let classifier_input = generator.classifier_input(&config);
    let logits = model.classifier().forward(classifier_input)?;
    println!("classifier output: {:?}", logits.shape());

    // One marker pair gathered from the dummy encoder output
    let sequence_length = last_hidden_state.shape()[1];
    let pair_start = (sequence_length as i64 - 2).max(0);
    let features = build_feature_vector(
        last_hidden_state.view(),
        Array1::from_elem(1, pair_start).view(),
        Array1::from_elem(1, 1).view(),
        model.num_slots(sequence_length),
    )?;
    let logits = model.classifier().forward(features)?;
    println!("chained output: {:?}", logits.shape());
    if logits.shape()[2] != config.num_labels() {
        return Err(SpanMarkerError::InvalidConfigurationError(format!(
            "The classifier predicts {} labels, the configuration declares {}",
            logits.shape()[2],
            config.num_labels()
        )));
    }

    Ok(())
}
