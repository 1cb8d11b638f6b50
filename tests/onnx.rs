extern crate anyhow;

use ndarray::Array1;
use spanmarker_onnx::pipelines::onnx::{
    build_feature_vector, validate_signature, ONNXEnvironmentConfig, ONNXSpanMarker,
};
use spanmarker_onnx::pipelines::span_marker::{
    EntityOffsets, PredictOutput, SpanMarkerModel, SpanMarkerModelConfig,
};
use spanmarker_onnx::resources::LocalResource;
use spanmarker_onnx::span_marker::signature::{ENCODER_INPUT_NAMES, ENCODER_OUTPUT_NAMES};
use spanmarker_onnx::span_marker::{DummyInputGenerator, SpanMarkerConfig};
use spanmarker_onnx::Config;
use std::path::PathBuf;

/// Exported model directory holding `encoder.onnx`, `classifier.onnx`, `config.json` and
/// `tokenizer.json`, e.g. an export of `tomaarsen/span-marker-bert-base-fewnerd-fine-super`
fn model_directory() -> PathBuf {
    std::env::var("SPANMARKER_ONNX_MODEL")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("spanmarker-onnx"))
}

fn resource(file_name: &str) -> LocalResource {
    LocalResource::from(model_directory().join(file_name))
}

#[test]
#[cfg_attr(not(feature = "all-tests"), ignore)]
fn onnx_signature_and_dummy_inputs() -> anyhow::Result<()> {
    let config = SpanMarkerConfig::from_file(model_directory().join("config.json"))?;
    let model = ONNXSpanMarker::new(
        &resource("encoder.onnx"),
        &resource("classifier.onnx"),
        &ONNXEnvironmentConfig::default(),
    )?;
    validate_signature(
        model.encoder().session(),
        &ENCODER_INPUT_NAMES,
        &ENCODER_OUTPUT_NAMES,
    )?;
    // Only the batch axis is exported as dynamic
    assert_eq!(
        model.encoder().fixed_sequence_length(),
        Some(config.model_max_length_default)
    );
    assert_eq!(model.classifier().fixed_num_slots(), Some(256));

    let mut generator = DummyInputGenerator::default();
    let inputs = generator.encoder_inputs(&config);
    let last_hidden_state = model.encoder().forward(
        inputs.input_ids.view(),
        inputs.attention_mask.view(),
        inputs.position_ids.view(),
    )?;
    assert_eq!(
        last_hidden_state.shape(),
        &[1, config.model_max_length_default, config.hidden_size()]
    );

    let logits = model
        .classifier()
        .forward(generator.classifier_input(&config))?;
    assert_eq!(logits.shape(), &[4, 256, config.num_labels()]);

    let sequence_length = last_hidden_state.shape()[1];
    let features = build_feature_vector(
        last_hidden_state.view(),
        Array1::from_elem(1, sequence_length as i64 - 2).view(),
        Array1::from_elem(1, 1).view(),
        model.num_slots(sequence_length),
    )?;
    assert_eq!(features.shape(), &[1, 256, 2 * config.hidden_size()]);
    let logits = model.classifier().forward(features)?;
    assert_eq!(logits.shape(), &[1, 256, config.num_labels()]);
    Ok(())
}

#[test]
#[cfg_attr(not(feature = "all-tests"), ignore)]
fn onnx_span_marker_predict() -> anyhow::Result<()> {
    let model = SpanMarkerModel::new(SpanMarkerModelConfig::new(
        resource("encoder.onnx"),
        resource("classifier.onnx"),
        resource("config.json"),
        resource("tokenizer.json"),
    ))?;

    let output = model.predict(
        "Amelia Earhart flew her single engine Lockheed Vega 5B across the Atlantic to Paris.",
    )?;

    let entities = match output {
        PredictOutput::Single(entities) => entities,
        PredictOutput::Batch(_) => panic!("expected a flat list of entities"),
    };
    assert!(!entities.is_empty());
    let ranges = entities
        .iter()
        .map(|entity| match entity.offsets {
            EntityOffsets::Chars {
                char_start_index,
                char_end_index,
            } => (char_start_index, char_end_index),
            EntityOffsets::Words { .. } => panic!("expected character offsets"),
        })
        .collect::<Vec<(usize, usize)>>();
    assert!(ranges.windows(2).all(|pair| pair[0].1 <= pair[1].0));
    assert!(entities
        .iter()
        .all(|entity| entity.score > 0.0 && entity.score <= 1.0));

    let output = model.predict(vec![
        vec!["Caesar", "led", "the", "Roman", "armies"],
        vec!["Paris", "is", "in", "France"],
    ])?;
    assert_eq!(output.into_batch().len(), 2);
    Ok(())
}
