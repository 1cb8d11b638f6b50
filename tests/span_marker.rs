extern crate anyhow;

use ndarray::Array3;
use spanmarker_onnx::pipelines::span_marker::{
    Entity, EntityOffsets, EntitySpan, PredictInput, PredictOutput, SentenceRecord,
    SpanMarkerBackend, SpanMarkerModel,
};
use spanmarker_onnx::span_marker::{SpanMarkerBatch, SpanMarkerConfig, SpanMarkerTokenizer};
use spanmarker_onnx::SpanMarkerError;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;

const TOKENIZER: &str = r#"{
    "version": "1.0",
    "truncation": null,
    "padding": null,
    "added_tokens": [
        {"id": 0, "content": "[PAD]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
        {"id": 1, "content": "[UNK]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
        {"id": 2, "content": "[CLS]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
        {"id": 3, "content": "[SEP]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
        {"id": 4, "content": "<start>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
        {"id": 5, "content": "<end>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
    ],
    "normalizer": null,
    "pre_tokenizer": {"type": "Whitespace"},
    "post_processor": {"type": "BertProcessing", "sep": ["[SEP]", 3], "cls": ["[CLS]", 2]},
    "decoder": null,
    "model": {
        "type": "WordLevel",
        "vocab": {
            "[PAD]": 0, "[UNK]": 1, "[CLS]": 2, "[SEP]": 3, "<start>": 4, "<end>": 5,
            "Amelia": 6, "Earhart": 7, "flew": 8, "to": 9, "Paris": 10, ".": 11,
            "Caesar": 12, "led": 13, "the": 14, "Roman": 15, "armies": 16,
            "New": 17, "York": 18, "City": 19, "is": 20, "big": 21
        },
        "unk_token": "[UNK]"
    }
}"#;

const CONFIG: &str = r#"{
    "id2label": {"0": "O", "1": "person", "2": "location"},
    "entity_max_length": 3,
    "marker_max_length": 4,
    "model_max_length": 16,
    "encoder": {"vocab_size": 22, "hidden_size": 4, "model_type": "bert", "pad_token_id": 0}
}"#;

const PERSON: usize = 1;
const LOCATION: usize = 2;

/// Backend labeling a span from the token ids of its first and last token
#[derive(Clone)]
struct LookupBackend {
    entities: HashMap<(i64, i64), usize>,
    calls: Arc<AtomicUsize>,
    max_text_tokens: Arc<AtomicUsize>,
    sequence_lengths: Arc<Mutex<Vec<usize>>>,
    fixed_sequence_length: Option<usize>,
}

impl LookupBackend {
    fn new() -> Self {
        let entities = HashMap::from([
            ((6, 7), PERSON),     // Amelia Earhart
            ((10, 10), LOCATION), // Paris
            ((12, 12), PERSON),   // Caesar
            ((15, 15), LOCATION), // Roman
            ((17, 19), LOCATION), // New York City
        ]);
        Self {
            entities,
            calls: Arc::new(AtomicUsize::new(0)),
            max_text_tokens: Arc::new(AtomicUsize::new(0)),
            sequence_lengths: Arc::new(Mutex::new(vec![])),
            fixed_sequence_length: None,
        }
    }

    /// Backend behaving like graphs exported with a fixed sequence axis, whose classifier
    /// takes `sequence / 2` marker pair slots
    fn with_fixed_sequence_length(sequence_length: usize) -> Self {
        Self {
            fixed_sequence_length: Some(sequence_length),
            ..Self::new()
        }
    }
}

impl SpanMarkerBackend for LookupBackend {
    fn fixed_sequence_length(&self) -> Option<usize> {
        self.fixed_sequence_length
    }

    fn forward(&self, batch: &SpanMarkerBatch) -> Result<Array3<f32>, SpanMarkerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sequence_lengths
            .lock()
            .unwrap()
            .push(batch.sequence_length());
        let max_pairs = match self.fixed_sequence_length {
            Some(sequence_length) => sequence_length / 2,
            None => batch.num_marker_pairs.iter().copied().max().unwrap_or(0) as usize,
        };
        let mut logits = Array3::<f32>::zeros((batch.batch_size(), max_pairs, 3));
        for row in 0..batch.batch_size() {
            let first_marker = batch.start_marker_indices[row] as usize;
            let pairs = batch.num_marker_pairs[row] as usize;
            self.max_text_tokens.fetch_max(first_marker, Ordering::SeqCst);
            for pair in 0..pairs {
                let start = batch.position_ids[[row, first_marker + pair]] as usize;
                let end = batch.position_ids[[row, first_marker + pairs + pair]] as usize;
                let key = (batch.input_ids[[row, start]], batch.input_ids[[row, end]]);
                let label = self.entities.get(&key).copied().unwrap_or(0);
                logits[[row, pair, label]] = 5.0;
            }
        }
        Ok(logits)
    }
}

/// Backend returning logits for a single row whatever the batch
struct TruncatedBackend;

impl SpanMarkerBackend for TruncatedBackend {
    fn forward(&self, _batch: &SpanMarkerBatch) -> Result<Array3<f32>, SpanMarkerError> {
        Ok(Array3::zeros((1, 1, 3)))
    }
}

fn model<B: SpanMarkerBackend + 'static>(backend: B) -> anyhow::Result<SpanMarkerModel> {
    let config: SpanMarkerConfig = serde_json::from_str(CONFIG)?;
    let tokenizer = Tokenizer::from_str(TOKENIZER).map_err(anyhow::Error::msg)?;
    let tokenizer = SpanMarkerTokenizer::new(tokenizer, &config)?;
    Ok(SpanMarkerModel::from_parts(backend, tokenizer, config, 2)?)
}

fn summary(entities: &[Entity]) -> Vec<(EntitySpan, String, EntityOffsets)> {
    entities
        .iter()
        .map(|entity| (entity.span.clone(), entity.label.clone(), entity.offsets))
        .collect()
}

fn text(span: &str) -> EntitySpan {
    EntitySpan::Text(span.to_string())
}

fn chars(char_start_index: usize, char_end_index: usize) -> EntityOffsets {
    EntityOffsets::Chars {
        char_start_index,
        char_end_index,
    }
}

fn words(word_start_index: usize, word_end_index: usize) -> EntityOffsets {
    EntityOffsets::Words {
        word_start_index,
        word_end_index,
    }
}

#[test]
fn span_marker_string_sentence() -> anyhow::Result<()> {
    let backend = LookupBackend::new();
    let calls = backend.calls.clone();
    let model = model(backend)?;

    let output = model.predict("Amelia Earhart flew to Paris.")?;

    let entities = match output {
        PredictOutput::Single(entities) => entities,
        PredictOutput::Batch(_) => panic!("expected a flat list of entities"),
    };
    assert_eq!(
        summary(&entities),
        vec![
            (text("Amelia Earhart"), "person".to_string(), chars(0, 14)),
            (text("Paris"), "location".to_string(), chars(23, 28)),
        ]
    );
    let expected_score = 5f32.exp() / (5f32.exp() + 2.0);
    assert!(entities
        .iter()
        .all(|entity| (entity.score - expected_score).abs() < 1e-5));
    // 6 words, 15 candidate spans spread over 4 samples, 2 samples per batch
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn span_marker_pretokenized_sentence() -> anyhow::Result<()> {
    let model = model(LookupBackend::new())?;

    let output = model.predict(vec!["Caesar", "led", "the", "Roman", "armies"])?;

    let entities = match output {
        PredictOutput::Single(entities) => entities,
        PredictOutput::Batch(_) => panic!("expected a flat list of entities"),
    };
    assert_eq!(
        summary(&entities),
        vec![
            (
                EntitySpan::Words(vec!["Caesar".to_string()]),
                "person".to_string(),
                words(0, 1)
            ),
            (
                EntitySpan::Words(vec!["Roman".to_string()]),
                "location".to_string(),
                words(3, 4)
            ),
        ]
    );
    Ok(())
}

#[test]
fn span_marker_batch_of_sentences() -> anyhow::Result<()> {
    let model = model(LookupBackend::new())?;

    let output = model.predict(vec!["Amelia Earhart flew to Paris.", "New York City is big"])?;

    let entities = match output {
        PredictOutput::Batch(entities) => entities,
        PredictOutput::Single(_) => panic!("expected one list of entities per sentence"),
    };
    assert_eq!(entities.len(), 2);
    assert_eq!(entities[0].len(), 2);
    assert_eq!(
        summary(&entities[1]),
        vec![(text("New York City"), "location".to_string(), chars(0, 13))]
    );
    Ok(())
}

#[test]
fn span_marker_empty_input() -> anyhow::Result<()> {
    let backend = LookupBackend::new();
    let calls = backend.calls.clone();
    let model = model(backend)?;

    assert_eq!(model.predict(Vec::<String>::new())?, PredictOutput::Single(vec![]));
    assert_eq!(model.predict("")?, PredictOutput::Single(vec![]));
    assert_eq!(
        model.predict(PredictInput::Texts(vec![]))?,
        PredictOutput::Batch(vec![])
    );
    assert_eq!(serde_json::to_string(&model.predict("")?)?, "[]");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn span_marker_document_context() -> anyhow::Result<()> {
    let backend = LookupBackend::new();
    let max_text_tokens = backend.max_text_tokens.clone();
    let model = model(backend)?;
    let sentences = vec![
        vec!["New", "York", "City", "is", "big"],
        vec!["Caesar", "led", "the", "Roman", "armies"],
    ];

    let without_context = model.predict(sentences.clone())?.into_batch();
    assert_eq!(max_text_tokens.load(Ordering::SeqCst), 7);

    // The second sentence comes first in the document
    let records = vec![
        SentenceRecord::new(sentences[0].clone()).with_document(0, 1),
        SentenceRecord::new(sentences[1].clone()).with_document(0, 0),
    ];
    let with_context = model.predict(records)?.into_batch();

    assert_eq!(max_text_tokens.load(Ordering::SeqCst), 12);
    assert_eq!(with_context, without_context);
    assert_eq!(
        summary(&with_context[0]),
        vec![(
            EntitySpan::Words(vec!["New".to_string(), "York".to_string(), "City".to_string()]),
            "location".to_string(),
            words(0, 3)
        )]
    );
    Ok(())
}

#[test]
fn span_marker_pads_to_fixed_sequence_length() -> anyhow::Result<()> {
    // model_max_length + 2 * marker_max_length
    let backend = LookupBackend::with_fixed_sequence_length(24);
    let sequence_lengths = backend.sequence_lengths.clone();
    let fixed_model = model(backend)?;
    let dynamic_model = model(LookupBackend::new())?;
    let sentences = vec!["Amelia Earhart flew to Paris.", "Caesar led"];

    let output = fixed_model.predict(sentences.clone())?;

    assert_eq!(output, dynamic_model.predict(sentences)?);
    let sequence_lengths = sequence_lengths.lock().unwrap().clone();
    assert!(!sequence_lengths.is_empty());
    assert!(sequence_lengths.iter().all(|length| *length == 24));
    Ok(())
}

#[test]
fn span_marker_rejects_too_short_fixed_sequence_length() {
    let result = model(LookupBackend::with_fixed_sequence_length(20));

    let error = result.err().and_then(|error| error.downcast::<SpanMarkerError>().ok());
    assert!(matches!(
        error,
        Some(SpanMarkerError::InvalidConfigurationError(_))
    ));
}

#[test]
fn span_marker_rejects_mixed_sentences() -> anyhow::Result<()> {
    let model = model(LookupBackend::new())?;

    let result = model.predict(vec![
        SentenceRecord::new("Amelia Earhart flew to Paris."),
        SentenceRecord::new(vec!["Caesar", "led"]),
    ]);

    assert!(matches!(result, Err(SpanMarkerError::ValueError(_))));
    Ok(())
}

#[test]
fn span_marker_rejects_malformed_logits() -> anyhow::Result<()> {
    let model = model(TruncatedBackend)?;

    let result = model.predict(vec!["Amelia Earhart flew to Paris.", "New York City is big"]);

    assert!(matches!(
        result,
        Err(SpanMarkerError::InternalConsistencyError(_))
    ));
    Ok(())
}
