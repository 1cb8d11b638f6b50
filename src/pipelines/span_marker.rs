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

//! # SpanMarker Named Entity Recognition pipeline
//! Extracts entities with a SpanMarker model exported to ONNX as an encoder graph and a span
//! classifier graph. Every span of up to `entity_max_length` words is scored, and the most
//! confident non-overlapping spans are returned.
//!
//! ```no_run
//! use spanmarker_onnx::pipelines::span_marker::{SpanMarkerModel, SpanMarkerModelConfig};
//! use spanmarker_onnx::resources::LocalResource;
//! use std::path::PathBuf;
//! # fn main() -> anyhow::Result<()> {
//! let config = SpanMarkerModelConfig::new(
//!     LocalResource::from(PathBuf::from("path/to/encoder.onnx")),
//!     LocalResource::from(PathBuf::from("path/to/classifier.onnx")),
//!     LocalResource::from(PathBuf::from("path/to/config.json")),
//!     LocalResource::from(PathBuf::from("path/to/tokenizer.json")),
//! );
//! let model = SpanMarkerModel::new(config)?;
//!
//! let entities = model.predict("Amelia Earhart flew her single engine Lockheed Vega 5B to Paris.")?;
//! # Ok(())
//! # }
//! ```
//! Output: \
//! ```no_run
//! # use spanmarker_onnx::pipelines::span_marker::{Entity, EntityOffsets, EntitySpan, PredictOutput};
//! # let output =
//! PredictOutput::Single(vec![
//!     Entity {
//!         span: EntitySpan::Text(String::from("Amelia Earhart")),
//!         label: String::from("person-other"),
//!         score: 0.7659,
//!         offsets: EntityOffsets::Chars {
//!             char_start_index: 0,
//!             char_end_index: 14,
//!         },
//!     },
//!     Entity {
//!         span: EntitySpan::Text(String::from("Paris")),
//!         label: String::from("location-GPE"),
//!         score: 0.9808,
//!         offsets: EntityOffsets::Chars {
//!             char_start_index: 58,
//!             char_end_index: 63,
//!         },
//!     },
//! ])
//! # ;
//! ```
//!
//! Sentences sharing a `document_id` can be given the tokens of their neighbors as context by
//! passing [`SentenceRecord`]s with both `document_id` and `sentence_id` set.

use crate::common::error::SpanMarkerError;
use crate::pipelines::onnx::{ONNXEnvironmentConfig, ONNXSpanMarker};
use crate::resources::ResourceProvider;
use crate::span_marker::collator::{SpanMarkerBatch, SpanMarkerDataCollator};
use crate::span_marker::config::SpanMarkerConfig;
use crate::span_marker::context::{add_context, spread_sample, SpanMarkerSample};
use crate::span_marker::decoder::{decode_spans, SelectedSpan};
use crate::span_marker::tokenizer::{
    get_all_valid_spans, Sentence, SpanMarkerTokenizer, TokenizedSentence,
};
use crate::Config;
use ndarray::{Array3, ArrayView1};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Input shapes accepted by [`SpanMarkerModel::predict`], reported when an input is rejected
pub const ACCEPTED_INPUTS: &str = "SpanMarkerModel::predict could not recognize the input. It accepts the following:\n\
    * a string sentence,\n\
    * a pre-tokenized sentence, i.e. a list of words,\n\
    * a list of string sentences,\n\
    * a list of pre-tokenized sentences, i.e. a list of lists of words,\n\
    * a list of records with a `tokens` field (string or list of words) and optional `document_id` \
    and `sentence_id` fields. If both ids are provided, they are used to add document-level context.";

/// # Backend computing span logits for a collated batch
/// Implemented by [`ONNXSpanMarker`]; any other implementation can be plugged in with
/// [`SpanMarkerModel::from_parts`].
pub trait SpanMarkerBackend: Send {
    /// Sequence length every collated row must be padded to, `None` if any length is accepted
    fn fixed_sequence_length(&self) -> Option<usize> {
        None
    }

    /// Returns `[batch, marker_pairs, num_labels]` logits, where `marker_pairs` is at least the
    /// largest `num_marker_pairs` of the batch.
    fn forward(&self, batch: &SpanMarkerBatch) -> Result<Array3<f32>, SpanMarkerError>;
}

impl<T: SpanMarkerBackend + ?Sized> SpanMarkerBackend for Box<T> {
    fn fixed_sequence_length(&self) -> Option<usize> {
        T::fixed_sequence_length(self)
    }

    fn forward(&self, batch: &SpanMarkerBatch) -> Result<Array3<f32>, SpanMarkerError> {
        T::forward(self, batch)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// # Sentence with optional document-level information
pub struct SentenceRecord {
    pub tokens: Sentence,
    #[serde(default)]
    pub document_id: Option<i64>,
    #[serde(default)]
    pub sentence_id: Option<i64>,
}

impl SentenceRecord {
    pub fn new(tokens: impl Into<Sentence>) -> Self {
        Self {
            tokens: tokens.into(),
            document_id: None,
            sentence_id: None,
        }
    }

    pub fn with_document(mut self, document_id: i64, sentence_id: i64) -> Self {
        self.document_id = Some(document_id);
        self.sentence_id = Some(sentence_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
/// # Input of a SpanMarker prediction
pub enum PredictInput {
    /// Single string sentence
    Text(String),
    /// Single pre-tokenized sentence
    Words(Vec<String>),
    /// Batch of string sentences
    Texts(Vec<String>),
    /// Batch of pre-tokenized sentences
    TokenizedSentences(Vec<Vec<String>>),
    /// Batch of sentences with optional document and sentence ids
    Records(Vec<SentenceRecord>),
}

impl PredictInput {
    /// Interprets a list of strings as a single pre-tokenized sentence if no element contains a
    /// space, and as a batch of string sentences otherwise.
    pub fn from_strings(strings: Vec<String>) -> Self {
        if strings.iter().all(|string| !string.contains(' ')) {
            PredictInput::Words(strings)
        } else {
            PredictInput::Texts(strings)
        }
    }

    /// Whether the input is a single sentence, i.e. whether the output is a flat list of entities
    pub fn is_single(&self) -> bool {
        matches!(self, PredictInput::Text(_) | PredictInput::Words(_))
    }

    fn into_records(self) -> Vec<SentenceRecord> {
        match self {
            PredictInput::Text(text) => vec![SentenceRecord::new(text)],
            PredictInput::Words(words) => vec![SentenceRecord::new(words)],
            PredictInput::Texts(texts) => texts.into_iter().map(SentenceRecord::new).collect(),
            PredictInput::TokenizedSentences(sentences) => {
                sentences.into_iter().map(SentenceRecord::new).collect()
            }
            PredictInput::Records(records) => records,
        }
    }
}

impl From<&str> for PredictInput {
    fn from(text: &str) -> Self {
        PredictInput::Text(text.to_string())
    }
}

impl From<String> for PredictInput {
    fn from(text: String) -> Self {
        PredictInput::Text(text)
    }
}

impl From<Vec<String>> for PredictInput {
    fn from(strings: Vec<String>) -> Self {
        PredictInput::from_strings(strings)
    }
}

impl From<Vec<&str>> for PredictInput {
    fn from(strings: Vec<&str>) -> Self {
        PredictInput::from_strings(strings.into_iter().map(String::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for PredictInput {
    fn from(strings: [&str; N]) -> Self {
        PredictInput::from_strings(strings.into_iter().map(String::from).collect())
    }
}

impl From<Vec<Vec<String>>> for PredictInput {
    fn from(sentences: Vec<Vec<String>>) -> Self {
        PredictInput::TokenizedSentences(sentences)
    }
}

impl From<Vec<Vec<&str>>> for PredictInput {
    fn from(sentences: Vec<Vec<&str>>) -> Self {
        PredictInput::TokenizedSentences(
            sentences
                .into_iter()
                .map(|words| words.into_iter().map(String::from).collect())
                .collect(),
        )
    }
}

impl From<Vec<SentenceRecord>> for PredictInput {
    fn from(records: Vec<SentenceRecord>) -> Self {
        PredictInput::Records(records)
    }
}

fn string_list(values: &[Value]) -> Option<Vec<String>> {
    values
        .iter()
        .map(|value| value.as_str().map(String::from))
        .collect()
}

impl TryFrom<Value> for PredictInput {
    type Error = SpanMarkerError;

    /// Validates a JSON value into one of the accepted input shapes.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let invalid = || SpanMarkerError::ValueError(ACCEPTED_INPUTS.to_string());
        match value {
            Value::String(text) => Ok(PredictInput::Text(text)),
            Value::Array(values) => {
                if values.is_empty() {
                    return Ok(PredictInput::Texts(vec![]));
                }
                if let Some(strings) = string_list(&values) {
                    return Ok(PredictInput::from_strings(strings));
                }
                if let Some(sentences) = values
                    .iter()
                    .map(|value| value.as_array().and_then(|words| string_list(words)))
                    .collect::<Option<Vec<Vec<String>>>>()
                {
                    return Ok(PredictInput::TokenizedSentences(sentences));
                }
                if values.iter().all(Value::is_object) {
                    let records = values
                        .into_iter()
                        .map(serde_json::from_value::<SentenceRecord>)
                        .collect::<Result<Vec<SentenceRecord>, _>>()
                        .map_err(|_| invalid())?;
                    return Ok(PredictInput::Records(records));
                }
                Err(invalid())
            }
            _ => Err(invalid()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
/// # Text of an entity
pub enum EntitySpan {
    /// Substring of a string sentence
    Text(String),
    /// Words of a pre-tokenized sentence
    Words(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
/// # Position of an entity
/// Half-open character range for string sentences, word range for pre-tokenized sentences.
pub enum EntityOffsets {
    Chars {
        char_start_index: usize,
        char_end_index: usize,
    },
    Words {
        word_start_index: usize,
        word_end_index: usize,
    },
}

impl EntityOffsets {
    fn start(&self) -> usize {
        match self {
            EntityOffsets::Chars {
                char_start_index, ..
            } => *char_start_index,
            EntityOffsets::Words {
                word_start_index, ..
            } => *word_start_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// # Entity extracted by a SpanMarker model
pub struct Entity {
    pub span: EntitySpan,
    pub label: String,
    pub score: f32,
    #[serde(flatten)]
    pub offsets: EntityOffsets,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
/// # Output of a SpanMarker prediction
/// A flat list for a single sentence, a list of lists otherwise.
pub enum PredictOutput {
    Single(Vec<Entity>),
    Batch(Vec<Vec<Entity>>),
}

impl PredictOutput {
    /// Entities of every sentence, in input order
    pub fn into_batch(self) -> Vec<Vec<Entity>> {
        match self {
            PredictOutput::Single(entities) => vec![entities],
            PredictOutput::Batch(entities) => entities,
        }
    }
}

/// # Configuration for SpanMarkerModel
pub struct SpanMarkerModelConfig {
    /// Encoder graph resource (`encoder.onnx`)
    pub encoder_resource: Box<dyn ResourceProvider + Send>,
    /// Span classifier graph resource (`classifier.onnx`)
    pub classifier_resource: Box<dyn ResourceProvider + Send>,
    /// SpanMarker configuration resource (`config.json`)
    pub config_resource: Box<dyn ResourceProvider + Send>,
    /// Tokenizer resource (`tokenizer.json`)
    pub tokenizer_resource: Box<dyn ResourceProvider + Send>,
    /// ONNX Runtime session options
    pub onnx_config: ONNXEnvironmentConfig,
    /// Number of marker samples per forward pass
    pub batch_size: usize,
}

impl SpanMarkerModelConfig {
    pub fn new<RE, RC, RF, RT>(
        encoder_resource: RE,
        classifier_resource: RC,
        config_resource: RF,
        tokenizer_resource: RT,
    ) -> SpanMarkerModelConfig
    where
        RE: ResourceProvider + Send + 'static,
        RC: ResourceProvider + Send + 'static,
        RF: ResourceProvider + Send + 'static,
        RT: ResourceProvider + Send + 'static,
    {
        SpanMarkerModelConfig {
            encoder_resource: Box::new(encoder_resource),
            classifier_resource: Box::new(classifier_resource),
            config_resource: Box::new(config_resource),
            tokenizer_resource: Box::new(tokenizer_resource),
            onnx_config: ONNXEnvironmentConfig::default(),
            batch_size: 4,
        }
    }
}

/// Scores and labels gathered for one input sentence
#[derive(Debug, Default)]
struct SentencePredictions {
    scores: Vec<f32>,
    labels: Vec<i64>,
}

/// # SpanMarkerModel for Named Entity Recognition
pub struct SpanMarkerModel {
    backend: Box<dyn SpanMarkerBackend>,
    tokenizer: SpanMarkerTokenizer,
    collator: SpanMarkerDataCollator,
    config: SpanMarkerConfig,
    outside_id: i64,
    batch_size: usize,
}

impl SpanMarkerModel {
    /// Build a new `SpanMarkerModel` running the two exported ONNX graphs
    ///
    /// # Arguments
    ///
    /// * `config` - `SpanMarkerModelConfig` containing the graph, configuration and tokenizer resources
    pub fn new(config: SpanMarkerModelConfig) -> Result<SpanMarkerModel, SpanMarkerError> {
        let span_marker_config =
            SpanMarkerConfig::from_file(config.config_resource.get_local_path()?)?;
        let tokenizer = SpanMarkerTokenizer::from_file(
            config.tokenizer_resource.get_local_path()?,
            &span_marker_config,
        )?;
        let backend = ONNXSpanMarker::new(
            &*config.encoder_resource,
            &*config.classifier_resource,
            &config.onnx_config,
        )?;
        Self::from_parts(backend, tokenizer, span_marker_config, config.batch_size)
    }

    /// Build a new `SpanMarkerModel` from an already loaded backend and tokenizer
    ///
    /// Rows are padded to the backend's fixed sequence length when it has one. That length must
    /// hold `model_max_length` text tokens and `marker_max_length` marker pairs.
    pub fn from_parts<B: SpanMarkerBackend + 'static>(
        backend: B,
        tokenizer: SpanMarkerTokenizer,
        config: SpanMarkerConfig,
        batch_size: usize,
    ) -> Result<SpanMarkerModel, SpanMarkerError> {
        let outside_id = config.outside_id()?;
        let padded_length = backend.fixed_sequence_length();
        if let Some(padded_length) = padded_length {
            let longest_row = tokenizer.model_max_length() + 2 * config.marker_max_length;
            if padded_length < longest_row {
                return Err(SpanMarkerError::InvalidConfigurationError(format!(
                    "The encoder graph takes sequences of {padded_length} tokens, but \
                    `model_max_length` + 2 * `marker_max_length` is {longest_row}"
                )));
            }
        }
        let collator = SpanMarkerDataCollator::from_tokenizer(&tokenizer, config.position_offset())
            .with_padded_length(padded_length);
        Ok(SpanMarkerModel {
            backend: Box::new(backend),
            tokenizer,
            collator,
            config,
            outside_id,
            batch_size: batch_size.max(1),
        })
    }

    pub fn config(&self) -> &SpanMarkerConfig {
        &self.config
    }

    pub fn tokenizer(&self) -> &SpanMarkerTokenizer {
        &self.tokenizer
    }

    /// Extracts entities from one or more sentences.
    ///
    /// # Arguments
    ///
    /// * `input` - a string sentence, a list of words, a batch of either, or [`SentenceRecord`]s
    ///
    /// # Returns
    ///
    /// * `PredictOutput::Single` with the entities of the sentence for a single sentence input,
    ///   `PredictOutput::Batch` with the entities of every sentence otherwise. Entities are sorted
    ///   by position.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use spanmarker_onnx::pipelines::span_marker::{SpanMarkerModel, SpanMarkerModelConfig};
    /// # use spanmarker_onnx::resources::LocalResource;
    /// # use std::path::PathBuf;
    /// # fn main() -> anyhow::Result<()> {
    /// # let config = SpanMarkerModelConfig::new(
    /// #     LocalResource::from(PathBuf::from("path/to/encoder.onnx")),
    /// #     LocalResource::from(PathBuf::from("path/to/classifier.onnx")),
    /// #     LocalResource::from(PathBuf::from("path/to/config.json")),
    /// #     LocalResource::from(PathBuf::from("path/to/tokenizer.json")),
    /// # );
    /// let model = SpanMarkerModel::new(config)?;
    /// let output = model.predict(vec![
    ///     vec!["Caesar", "led", "the", "Roman", "armies"],
    ///     vec!["New", "York", "City", "is", "big"],
    /// ])?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn predict<I: Into<PredictInput>>(&self, input: I) -> Result<PredictOutput, SpanMarkerError> {
        let input = input.into();
        let single = input.is_single();
        let records = input.into_records();

        if records.iter().all(|record| record.tokens.is_empty()) {
            return Ok(if single {
                PredictOutput::Single(vec![])
            } else {
                PredictOutput::Batch(vec![vec![]; records.len()])
            });
        }
        let pretokenized = matches!(records[0].tokens, Sentence::Words(_));
        if records
            .iter()
            .any(|record| matches!(record.tokens, Sentence::Words(_)) != pretokenized)
        {
            return Err(SpanMarkerError::ValueError(format!(
                "String and pre-tokenized sentences cannot be mixed in a batch.\n{ACCEPTED_INPUTS}"
            )));
        }

        let tokenized = records
            .iter()
            .map(|record| self.tokenizer.tokenize(&record.tokens))
            .collect::<Result<Vec<TokenizedSentence>, SpanMarkerError>>()?;
        let (tokenized, document_ids) = self.maybe_add_context(&records, tokenized);

        let samples = tokenized
            .iter()
            .enumerate()
            .flat_map(|(id, sentence)| {
                let spans = get_all_valid_spans(sentence.num_words(), self.config.entity_max_length);
                let (document_id, sentence_id) = document_ids
                    .as_ref()
                    .map_or((None, None), |(document_ids, sentence_ids)| {
                        (Some(document_ids[id]), Some(sentence_ids[id]))
                    });
                spread_sample(
                    id,
                    sentence,
                    &spans,
                    self.config.marker_max_length,
                    document_id,
                    sentence_id,
                )
            })
            .collect::<Vec<SpanMarkerSample>>();

        let mut predictions = (0..records.len())
            .map(|_| SentencePredictions::default())
            .collect::<Vec<SentencePredictions>>();
        let num_batches = (samples.len() + self.batch_size - 1) / self.batch_size;
        for (batch_index, chunk) in samples.chunks(self.batch_size).enumerate() {
            debug!("Predicting batch {}/{}", batch_index + 1, num_batches);
            let batch = self.collator.collate(chunk);
            let logits = self.backend.forward(&batch)?;
            self.accumulate(&batch, &logits, &mut predictions)?;
        }

        let mut entities = Vec::with_capacity(records.len());
        for ((record, sentence), prediction) in records
            .iter()
            .zip(tokenized.iter())
            .zip(predictions.iter())
        {
            let num_words = sentence.num_words();
            let spans = get_all_valid_spans(num_words, self.config.entity_max_length);
            let selected = decode_spans(
                &spans,
                &prediction.scores,
                &prediction.labels,
                num_words,
                self.outside_id,
            )?;
            entities.push(self.to_entities(&record.tokens, sentence, &selected)?);
        }

        if single && entities.len() == 1 {
            Ok(PredictOutput::Single(entities.remove(0)))
        } else {
            Ok(PredictOutput::Batch(entities))
        }
    }

    /// Adds document-level context if every record carries a document and a sentence id.
    fn maybe_add_context(
        &self,
        records: &[SentenceRecord],
        tokenized: Vec<TokenizedSentence>,
    ) -> (Vec<TokenizedSentence>, Option<(Vec<i64>, Vec<i64>)>) {
        let ids = records
            .iter()
            .map(|record| record.document_id.zip(record.sentence_id))
            .collect::<Option<Vec<(i64, i64)>>>();
        match ids {
            Some(ids) => {
                if !self.config.trained_with_document_context {
                    warn!(
                        "This model was trained without document-level context: \
                        inference with document-level context may cause decreased performance."
                    );
                }
                let (document_ids, sentence_ids): (Vec<i64>, Vec<i64>) = ids.into_iter().unzip();
                let with_context = add_context(
                    &tokenized,
                    &document_ids,
                    &sentence_ids,
                    self.tokenizer.model_max_length(),
                    self.config.max_prev_context,
                    self.config.max_next_context,
                );
                (with_context, Some((document_ids, sentence_ids)))
            }
            None => {
                if records
                    .iter()
                    .any(|record| record.document_id.is_some() || record.sentence_id.is_some())
                {
                    warn!(
                        "Document-level context requires a `document_id` and a `sentence_id` \
                        for every sentence, predicting without context."
                    );
                } else if self.config.trained_with_document_context {
                    warn!(
                        "This model was trained with document-level context: \
                        inference without document-level context may cause decreased performance."
                    );
                }
                (tokenized, None)
            }
        }
    }

    /// Appends the softmax score and label of every marker pair to the sentence it belongs to.
    fn accumulate(
        &self,
        batch: &SpanMarkerBatch,
        logits: &Array3<f32>,
        predictions: &mut [SentencePredictions],
    ) -> Result<(), SpanMarkerError> {
        let (rows, max_pairs, num_labels) = logits.dim();
        let required_pairs = batch.num_marker_pairs.iter().copied().max().unwrap_or(0) as usize;
        if rows != batch.batch_size() || max_pairs < required_pairs || num_labels == 0 {
            return Err(SpanMarkerError::InternalConsistencyError(format!(
                "Expected logits of shape [{}, >={required_pairs}, num_labels], got {:?}",
                batch.batch_size(),
                logits.shape()
            )));
        }
        for (row, id) in batch.ids.iter().enumerate() {
            let prediction = &mut predictions[*id];
            for pair in 0..batch.num_marker_pairs[row] as usize {
                let (label, score) = softmax_max(logits.slice(ndarray::s![row, pair, ..]))?;
                prediction.scores.push(score);
                prediction.labels.push(label as i64);
            }
        }
        Ok(())
    }

    fn to_entities(
        &self,
        sentence: &Sentence,
        tokenized: &TokenizedSentence,
        selected: &[SelectedSpan],
    ) -> Result<Vec<Entity>, SpanMarkerError> {
        let mut entities = selected
            .iter()
            .map(|span| {
                let (start, end) = (span.word_start_index, span.word_end_index);
                let (span_text, offsets) = match sentence {
                    Sentence::Text(text) => {
                        let char_start_index = tokenized.word_char_offsets[start].0;
                        let char_end_index = tokenized.word_char_offsets[end - 1].1;
                        let span_text = text
                            .chars()
                            .skip(char_start_index)
                            .take(char_end_index.saturating_sub(char_start_index))
                            .collect::<String>();
                        (
                            EntitySpan::Text(span_text),
                            EntityOffsets::Chars {
                                char_start_index,
                                char_end_index,
                            },
                        )
                    }
                    Sentence::Words(words) => (
                        EntitySpan::Words(words[start..end].to_vec()),
                        EntityOffsets::Words {
                            word_start_index: start,
                            word_end_index: end,
                        },
                    ),
                };
                Ok(Entity {
                    span: span_text,
                    label: self.config.label(span.label_id)?.to_string(),
                    score: span.score,
                    offsets,
                })
            })
            .collect::<Result<Vec<Entity>, SpanMarkerError>>()?;
        entities.sort_by_key(|entity| entity.offsets.start());
        Ok(entities)
    }
}

/// Index and probability of the most likely label
fn softmax_max(logits: ArrayView1<f32>) -> Result<(usize, f32), SpanMarkerError> {
    let (argmax, max) = logits
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (index, value)| {
            if *value > max {
                (index, *value)
            } else {
                (best, max)
            }
        });
    let normalizer = logits.iter().map(|value| (value - max).exp()).sum::<f32>();
    let score = 1.0 / normalizer;
    if score.is_nan() {
        return Err(SpanMarkerError::InternalConsistencyError(format!(
            "The span classifier returned logits without a finite maximum: {logits}"
        )));
    }
    Ok((argmax, score))
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::array;
    use serde_json::json;

    #[test]
    fn softmax_max_returns_argmax_and_probability() -> anyhow::Result<()> {
        let (label, score) = softmax_max(array![0.0f32, 2.0, 0.0].view())?;
        assert_eq!(label, 1);
        let expected = 2f32.exp() / (2.0 + 2f32.exp());
        assert!((score - expected).abs() < 1e-6);

        let (label, score) = softmax_max(array![1.0f32, 1.0].view())?;
        assert_eq!(label, 0);
        assert!((score - 0.5).abs() < 1e-6);

        let (label, score) = softmax_max(array![f32::NEG_INFINITY, 0.0].view())?;
        assert_eq!(label, 1);
        assert!((score - 1.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn softmax_max_rejects_logits_without_finite_maximum() {
        for logits in [
            array![f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY],
            array![f32::NAN, f32::NAN, f32::NAN],
            array![0.0f32, f32::INFINITY, f32::INFINITY],
        ] {
            assert!(matches!(
                softmax_max(logits.view()),
                Err(SpanMarkerError::InternalConsistencyError(_))
            ));
        }
    }

    #[test]
    fn strings_without_spaces_are_a_single_sentence() {
        assert_eq!(
            PredictInput::from(vec!["Caesar", "led", "armies"]),
            PredictInput::Words(vec![
                "Caesar".to_string(),
                "led".to_string(),
                "armies".to_string()
            ])
        );
        assert!(matches!(
            PredictInput::from(vec!["Caesar led", "New York"]),
            PredictInput::Texts(_)
        ));
        assert!(PredictInput::from("Caesar led").is_single());
        assert!(!PredictInput::from(vec![vec!["Caesar"], vec!["led"]]).is_single());
    }

    #[test]
    fn validates_json_input() -> anyhow::Result<()> {
        assert_eq!(
            PredictInput::try_from(json!("Amelia flew"))?,
            PredictInput::Text("Amelia flew".to_string())
        );
        assert!(matches!(
            PredictInput::try_from(json!([["Amelia", "flew"], ["to", "Paris"]]))?,
            PredictInput::TokenizedSentences(sentences) if sentences.len() == 2
        ));
        assert!(matches!(
            PredictInput::try_from(json!(["Amelia flew", "to Paris"]))?,
            PredictInput::Texts(_)
        ));
        assert_eq!(
            PredictInput::try_from(json!([{"tokens": "Amelia flew", "document_id": 1, "sentence_id": 0}]))?,
            PredictInput::Records(vec![SentenceRecord::new("Amelia flew").with_document(1, 0)])
        );
        assert_eq!(PredictInput::try_from(json!([]))?, PredictInput::Texts(vec![]));
        Ok(())
    }

    #[test]
    fn rejects_unrecognized_json_input() {
        for value in [json!(42), json!([1, 2]), json!(["Amelia", ["flew"]]), json!({"tokens": 3})] {
            match PredictInput::try_from(value) {
                Err(SpanMarkerError::ValueError(message)) => {
                    assert!(message.contains("a list of pre-tokenized sentences"))
                }
                other => panic!("expected a value error, got {other:?}"),
            }
        }
        assert!(matches!(
            PredictInput::try_from(json!([{"document_id": 1}])),
            Err(SpanMarkerError::ValueError(_))
        ));
    }

    #[test]
    fn entities_serialize_with_flat_offsets() -> anyhow::Result<()> {
        let output = PredictOutput::Single(vec![Entity {
            span: EntitySpan::Words(vec!["Caesar".to_string()]),
            label: "person".to_string(),
            score: 0.5,
            offsets: EntityOffsets::Words {
                word_start_index: 0,
                word_end_index: 1,
            },
        }]);

        assert_eq!(
            serde_json::to_value(&output)?,
            json!([{"span": ["Caesar"], "label": "person", "score": 0.5, "word_start_index": 0, "word_end_index": 1}])
        );
        assert_eq!(
            serde_json::to_value(PredictOutput::Batch(vec![vec![], vec![]]))?,
            json!([[], []])
        );
        Ok(())
    }

    #[test]
    #[ignore] // no need to run, compilation is enough to verify it is Send
    fn test() {
        fn is_send<T: Send>() {}
        is_send::<SpanMarkerModel>();
    }
}
