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

//! # SpanMarker tokenizer
//!
//! Wraps a [Tokenizers](https://github.com/huggingface/tokenizers) tokenizer loaded from a
//! `tokenizer.json` file and keeps track of the word boundaries SpanMarker needs: the token range
//! and character range of every word, and the ids of the `<start>` / `<end>` marker tokens.

use crate::common::error::SpanMarkerError;
use crate::span_marker::config::{SpanMarkerConfig, END_MARKER_TOKEN, START_MARKER_TOKEN};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokenizers::tokenizer::Tokenizer as HFBaseTokenizer;
use tokenizers::{EncodeInput, Encoding, InputSequence};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// # Sentence to extract entities from
#[serde(untagged)]
pub enum Sentence {
    /// Raw string, split into words by the tokenizer's pre-tokenizer
    Text(String),
    /// Pre-tokenized sentence, i.e. a list of words
    Words(Vec<String>),
}

impl Sentence {
    pub fn is_empty(&self) -> bool {
        match self {
            Sentence::Text(text) => text.is_empty(),
            Sentence::Words(words) => words.is_empty(),
        }
    }
}

impl From<&str> for Sentence {
    fn from(text: &str) -> Self {
        Sentence::Text(text.to_string())
    }
}

impl From<String> for Sentence {
    fn from(text: String) -> Self {
        Sentence::Text(text)
    }
}

impl From<Vec<String>> for Sentence {
    fn from(words: Vec<String>) -> Self {
        Sentence::Words(words)
    }
}

impl From<Vec<&str>> for Sentence {
    fn from(words: Vec<&str>) -> Self {
        Sentence::Words(words.into_iter().map(String::from).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
/// # Tokenized sentence with its word boundaries
pub struct TokenizedSentence {
    /// Token ids, special tokens included
    pub input_ids: Vec<i64>,
    /// Range of `input_ids` holding the sentence tokens (special tokens excluded)
    pub content_range: (usize, usize),
    /// Half-open token range of every retained word
    pub word_token_ranges: Vec<(usize, usize)>,
    /// Half-open character range of every retained word. For pre-tokenized input the
    /// offsets are relative to the word itself.
    pub word_char_offsets: Vec<(usize, usize)>,
}

impl TokenizedSentence {
    pub fn num_words(&self) -> usize {
        self.word_token_ranges.len()
    }

    pub fn num_tokens(&self) -> usize {
        self.input_ids.len()
    }

    /// Token ids of the sentence itself, without special tokens
    pub fn content_ids(&self) -> &[i64] {
        &self.input_ids[self.content_range.0..self.content_range.1]
    }

    /// Position of the first token of word `word_index`
    pub fn start_token_position(&self, word_index: usize) -> usize {
        self.word_token_ranges[word_index].0
    }

    /// Position of the last token of word `word_index`
    pub fn end_token_position(&self, word_index: usize) -> usize {
        let (start, end) = self.word_token_ranges[word_index];
        end.max(start + 1) - 1
    }
}

/// Enumerates every candidate span of a sentence.
///
/// Spans are half-open word ranges of at most `entity_max_length` words, ordered by start and then
/// by end. Model outputs are paired with spans positionally, so this order is part of the model
/// contract.
///
/// # Example
///
/// ```
/// use spanmarker_onnx::span_marker::get_all_valid_spans;
/// let spans = get_all_valid_spans(3, 2);
/// assert_eq!(spans, vec![(0, 1), (0, 2), (1, 2), (1, 3), (2, 3)]);
/// ```
pub fn get_all_valid_spans(num_words: usize, entity_max_length: usize) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    for start in 0..num_words {
        let last_end = num_words.min(start + entity_max_length);
        for end in start + 1..=last_end {
            spans.push((start, end));
        }
    }
    spans
}

/// # SpanMarker tokenizer
pub struct SpanMarkerTokenizer {
    tokenizer: HFBaseTokenizer,
    start_marker_id: u32,
    end_marker_id: u32,
    pad_token_id: u32,
    model_max_length: usize,
}

impl SpanMarkerTokenizer {
    /// Create a new tokenizer from a `tokenizer.json` file.
    ///
    /// # Arguments
    /// - `tokenizer_file` path to the tokenizer model, pre- and post-processing options and vocabulary
    /// - `config` SpanMarker configuration, providing the maximum sequence length and optionally the
    ///   marker token ids
    ///
    /// # Example
    ///
    /// ```no_run
    /// # fn main() -> anyhow::Result<()> {
    /// use spanmarker_onnx::span_marker::{SpanMarkerConfig, SpanMarkerTokenizer};
    /// use spanmarker_onnx::Config;
    /// let config = SpanMarkerConfig::from_file("path/to/config.json")?;
    /// let tokenizer = SpanMarkerTokenizer::from_file("path/to/tokenizer.json", &config)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(
        tokenizer_file: P,
        config: &SpanMarkerConfig,
    ) -> Result<Self, SpanMarkerError> {
        let tokenizer = HFBaseTokenizer::from_file(tokenizer_file)?;
        Self::new(tokenizer, config)
    }

    pub fn new(
        tokenizer: HFBaseTokenizer,
        config: &SpanMarkerConfig,
    ) -> Result<Self, SpanMarkerError> {
        let start_marker_id =
            Self::marker_id(&tokenizer, config.start_marker_id, START_MARKER_TOKEN)?;
        let end_marker_id = Self::marker_id(&tokenizer, config.end_marker_id, END_MARKER_TOKEN)?;
        let pad_token_id = tokenizer
            .get_padding()
            .map(|padding| padding.pad_id)
            .or_else(|| {
                config
                    .encoder
                    .pad_token_id
                    .and_then(|pad_token_id| u32::try_from(pad_token_id).ok())
            })
            .unwrap_or(0);
        if config.model_max_length == 0 {
            return Err(SpanMarkerError::InvalidConfigurationError(
                "`model_max_length` must be strictly positive".to_string(),
            ));
        }
        Ok(Self {
            tokenizer,
            start_marker_id,
            end_marker_id,
            pad_token_id,
            model_max_length: config.model_max_length,
        })
    }

    fn marker_id(
        tokenizer: &HFBaseTokenizer,
        configured_id: Option<u32>,
        token: &str,
    ) -> Result<u32, SpanMarkerError> {
        configured_id
            .or_else(|| tokenizer.token_to_id(token))
            .ok_or_else(|| {
                SpanMarkerError::InvalidConfigurationError(format!(
                    "Marker token {token} not found in the tokenizer vocabulary"
                ))
            })
    }

    pub fn start_marker_id(&self) -> u32 {
        self.start_marker_id
    }

    pub fn end_marker_id(&self) -> u32 {
        self.end_marker_id
    }

    pub fn pad_token_id(&self) -> u32 {
        self.pad_token_id
    }

    pub fn model_max_length(&self) -> usize {
        self.model_max_length
    }

    /// Tokenizes a sentence, adding the special tokens of the underlying tokenizer.
    ///
    /// Sentences longer than `model_max_length` tokens are truncated (the trailing special tokens
    /// are kept) and only the words whose tokens were all retained are reported.
    pub fn tokenize(&self, sentence: &Sentence) -> Result<TokenizedSentence, SpanMarkerError> {
        let encoding = match sentence {
            Sentence::Text(text) => self.tokenizer.encode_char_offsets(text.as_str(), true)?,
            Sentence::Words(words) => self.tokenizer.encode_char_offsets(
                EncodeInput::Single(InputSequence::from(words.as_slice())),
                true,
            )?,
        };
        let expected_words = match sentence {
            Sentence::Text(_) => None,
            Sentence::Words(words) => Some(words.len()),
        };
        self.encoding_to_tokenized_sentence(&encoding, expected_words)
    }

    fn encoding_to_tokenized_sentence(
        &self,
        encoding: &Encoding,
        expected_words: Option<usize>,
    ) -> Result<TokenizedSentence, SpanMarkerError> {
        let ids = encoding.get_ids();
        let special_tokens_mask = encoding.get_special_tokens_mask();
        let word_ids = encoding.get_word_ids();
        let offsets = encoding.get_offsets();

        let content_start = special_tokens_mask
            .iter()
            .position(|mask| *mask == 0)
            .unwrap_or(ids.len());
        let content_end = special_tokens_mask
            .iter()
            .rposition(|mask| *mask == 0)
            .map_or(content_start, |position| position + 1);
        let prefix = &ids[..content_start];
        let suffix = &ids[content_end..];

        let max_content_tokens = self
            .model_max_length
            .saturating_sub(prefix.len() + suffix.len());
        let kept_content_end = content_end.min(content_start + max_content_tokens);
        if kept_content_end < content_end {
            warn!(
                "Sentence of {} tokens truncated to the maximum length of {} tokens",
                ids.len(),
                self.model_max_length
            );
        }

        let num_words = word_ids
            .iter()
            .flatten()
            .map(|word_id| *word_id as usize + 1)
            .max()
            .unwrap_or(0)
            .max(expected_words.unwrap_or(0));
        let mut token_ranges: Vec<Option<(usize, usize)>> = vec![None; num_words];
        let mut char_offsets: Vec<Option<(usize, usize)>> = vec![None; num_words];
        for position in content_start..content_end {
            if let Some(word_id) = word_ids[position] {
                let word_id = word_id as usize;
                let (offset_start, offset_end) = offsets[position];
                token_ranges[word_id] = Some(match token_ranges[word_id] {
                    Some((start, _)) => (start, position + 1),
                    None => (position, position + 1),
                });
                char_offsets[word_id] = Some(match char_offsets[word_id] {
                    Some((start, _)) => (start, offset_end),
                    None => (offset_start, offset_end),
                });
            }
        }

        // Words producing no token are anchored at the next token
        let mut next_position = kept_content_end;
        let mut word_token_ranges = vec![(0, 0); num_words];
        let mut word_char_offsets = vec![(0, 0); num_words];
        for word_id in (0..num_words).rev() {
            word_token_ranges[word_id] = token_ranges[word_id]
                .unwrap_or((next_position.min(content_end), next_position.min(content_end)));
            word_char_offsets[word_id] = char_offsets[word_id].unwrap_or((0, 0));
            next_position = word_token_ranges[word_id].0;
        }
        let retained_words = word_token_ranges
            .iter()
            .take_while(|(_, end)| *end <= kept_content_end)
            .count();
        word_token_ranges.truncate(retained_words);
        word_char_offsets.truncate(retained_words);

        let input_ids = prefix
            .iter()
            .chain(ids[content_start..kept_content_end].iter())
            .chain(suffix.iter())
            .map(|id| *id as i64)
            .collect::<Vec<i64>>();

        Ok(TokenizedSentence {
            input_ids,
            content_range: (content_start, kept_content_end),
            word_token_ranges,
            word_char_offsets,
        })
    }
}
