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

//! # Marker samples and document-level context
//!
//! A tokenized sentence is turned into one or more [`SpanMarkerSample`]s, each holding the sentence
//! tokens and the token positions of at most `marker_max_length` candidate spans. When sentences
//! carry document and sentence ids, the tokens of neighboring sentences of the same document can
//! be added around each sentence before spreading.

use crate::span_marker::tokenizer::TokenizedSentence;

#[derive(Debug, Clone, PartialEq)]
/// # Model input for a subset of the candidate spans of one sentence
pub struct SpanMarkerSample {
    /// Index of the sentence in the original input
    pub id: usize,
    /// Text token ids (special tokens and context included), without markers
    pub input_ids: Vec<i64>,
    /// Token position of the first token of every span in this sample
    pub start_position_ids: Vec<i64>,
    /// Token position of the last token of every span in this sample
    pub end_position_ids: Vec<i64>,
    /// Number of words of the sentence
    pub num_words: usize,
    pub document_id: Option<i64>,
    pub sentence_id: Option<i64>,
}

impl SpanMarkerSample {
    pub fn num_tokens(&self) -> usize {
        self.input_ids.len()
    }

    pub fn num_marker_pairs(&self) -> usize {
        self.start_position_ids.len()
    }
}

/// Spreads the candidate spans of a sentence over as many samples as needed to keep at most
/// `marker_max_length` marker pairs per sample.
///
/// Samples are returned in span order, so concatenating their predictions restores the
/// enumeration order of `spans`. A sentence without candidate spans yields no sample.
pub fn spread_sample(
    id: usize,
    tokenized: &TokenizedSentence,
    spans: &[(usize, usize)],
    marker_max_length: usize,
    document_id: Option<i64>,
    sentence_id: Option<i64>,
) -> Vec<SpanMarkerSample> {
    spans
        .chunks(marker_max_length.max(1))
        .map(|chunk| SpanMarkerSample {
            id,
            input_ids: tokenized.input_ids.clone(),
            start_position_ids: chunk
                .iter()
                .map(|(start, _)| tokenized.start_token_position(*start) as i64)
                .collect(),
            end_position_ids: chunk
                .iter()
                .map(|(_, end)| tokenized.end_token_position(*end - 1) as i64)
                .collect(),
            num_words: tokenized.num_words(),
            document_id,
            sentence_id,
        })
        .collect()
}

/// Adds the tokens of neighboring sentences around every sentence of a document.
///
/// Sentences are grouped by `document_ids` and ordered by `sentence_ids`. Previous and next
/// sentences are added alternately (closest first) until the sequence would exceed
/// `model_max_length` tokens, or until `max_prev_context` / `max_next_context` sentences have been
/// added on the respective side. A neighbor that does not fit entirely is cut so that the tokens
/// closest to the sentence are kept.
///
/// The returned sentences are in the input order. Their word token ranges and content range are
/// shifted past the prepended context, so span positions keep pointing at the sentence words.
pub fn add_context(
    sentences: &[TokenizedSentence],
    document_ids: &[i64],
    sentence_ids: &[i64],
    model_max_length: usize,
    max_prev_context: Option<usize>,
    max_next_context: Option<usize>,
) -> Vec<TokenizedSentence> {
    let mut order = (0..sentences.len()).collect::<Vec<usize>>();
    order.sort_by_key(|&index| (document_ids[index], sentence_ids[index]));

    let mut with_context = sentences.to_vec();
    for (position, &index) in order.iter().enumerate() {
        let sentence = &sentences[index];
        let document_id = document_ids[index];
        let mut budget = model_max_length.saturating_sub(sentence.num_tokens());

        let mut previous = order[..position]
            .iter()
            .rev()
            .take_while(|&&other| document_ids[other] == document_id)
            .take(max_prev_context.unwrap_or(usize::MAX));
        let mut next = order[position + 1..]
            .iter()
            .take_while(|&&other| document_ids[other] == document_id)
            .take(max_next_context.unwrap_or(usize::MAX));

        // Closest sentences first: previous context is stored in reverse order
        let mut previous_context: Vec<&[i64]> = Vec::new();
        let mut next_context: Vec<&[i64]> = Vec::new();
        let (mut previous_done, mut next_done) = (false, false);
        while budget > 0 && !(previous_done && next_done) {
            if !previous_done {
                match previous.next() {
                    Some(&other) => {
                        let tokens = sentences[other].content_ids();
                        let taken = tokens.len().min(budget);
                        previous_context.push(&tokens[tokens.len() - taken..]);
                        budget -= taken;
                        previous_done = taken < tokens.len();
                    }
                    None => previous_done = true,
                }
            }
            if !next_done && budget > 0 {
                match next.next() {
                    Some(&other) => {
                        let tokens = sentences[other].content_ids();
                        let taken = tokens.len().min(budget);
                        next_context.push(&tokens[..taken]);
                        budget -= taken;
                        next_done = taken < tokens.len();
                    }
                    None => next_done = true,
                }
            }
        }

        let (content_start, content_end) = sentence.content_range;
        let shift = previous_context.iter().map(|tokens| tokens.len()).sum::<usize>();
        let mut input_ids = Vec::with_capacity(model_max_length);
        input_ids.extend_from_slice(&sentence.input_ids[..content_start]);
        for tokens in previous_context.iter().rev() {
            input_ids.extend_from_slice(tokens);
        }
        input_ids.extend_from_slice(&sentence.input_ids[content_start..content_end]);
        for tokens in next_context.iter() {
            input_ids.extend_from_slice(tokens);
        }
        input_ids.extend_from_slice(&sentence.input_ids[content_end..]);

        let target = &mut with_context[index];
        target.input_ids = input_ids;
        target.content_range = (content_start + shift, content_end + shift);
        target
            .word_token_ranges
            .iter_mut()
            .for_each(|(start, end)| {
                *start += shift;
                *end += shift;
            });
    }
    with_context
}
