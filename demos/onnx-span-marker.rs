use std::path::PathBuf;

use spanmarker_onnx::pipelines::span_marker::{
    SentenceRecord, SpanMarkerModel, SpanMarkerModelConfig,
};
use spanmarker_onnx::resources::LocalResource;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let model_directory = PathBuf::from("span-marker-bert-base-fewnerd-fine-super-onnx");
    let model = SpanMarkerModel::new(SpanMarkerModelConfig::new(
        LocalResource::from(model_directory.join("spanmarker_encoder.onnx")),
        LocalResource::from(model_directory.join("spanmarker_classifier.onnx")),
        LocalResource::from(model_directory.join("config.json")),
        LocalResource::from(model_directory.join("tokenizer.json")),
    ))?;

    let output = model.predict(
        "Amelia Earhart flew her single engine Lockheed Vega 5B across the Atlantic to Paris.",
    )?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    // Sentences of the same document, given to the model with their neighbors as context
    let records = vec![
        SentenceRecord::new(vec!["Caesar", "led", "the", "Roman", "armies", "."])
            .with_document(0, 0),
        SentenceRecord::new(vec!["He", "crossed", "the", "Rubicon", "."]).with_document(0, 1),
    ];
    let output = model.predict(records)?;
    println!("{:?}", output);
    Ok(())
}
