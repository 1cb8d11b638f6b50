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

//! # Span decoding
//!
//! Turns the per-candidate-span predictions of a sentence into a list of non-overlapping entities.
//! Candidates are visited from the most to the least confident one (ties keep the enumeration
//! order), and a candidate is accepted only if none of its words has been claimed by a previously
//! accepted span. The selection is returned sorted by position.
//!
//! ```
//! use spanmarker_onnx::span_marker::decode_spans;
//! # fn main() -> Result<(), spanmarker_onnx::SpanMarkerError> {
//! let spans = [(0, 2), (1, 3), (3, 4)];
//! let scores = [0.9, 0.8, 0.7];
//! let labels = [1, 2, 3];
//! let selected = decode_spans(&spans, &scores, &labels, 4, -1)?;
//!
//! assert_eq!(selected.len(), 2);
//! assert_eq!((selected[0].word_start_index, selected[0].word_end_index), (0, 2));
//! assert_eq!((selected[1].word_start_index, selected[1].word_end_index), (3, 4));
//! # Ok(())
//! # }
//! ```

use crate::common::error::SpanMarkerError;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// # Span accepted by the decoder, in word offsets
pub struct SelectedSpan {
    /// Index of the first word of the span
    pub word_start_index: usize,
    /// Index one past the last word of the span
    pub word_end_index: usize,
    /// Predicted label id
    pub label_id: i64,
    /// Confidence of the predicted label
    pub score: f32,
}

/// Selects the most confident, non-overlapping spans of a sentence.
///
/// # Arguments
///
/// * `spans` - candidate `(word_start_index, word_end_index)` pairs, half-open, in enumeration order
/// * `scores` - confidence of the predicted label for each candidate
/// * `labels` - predicted label id for each candidate
/// * `num_words` - number of words in the sentence
/// * `outside_label_id` - label id marking a candidate as "not an entity"
///
/// # Returns
///
/// * `Vec<SelectedSpan>` sorted by `word_start_index`
///
/// # Errors
///
/// `SpanMarkerError::InternalConsistencyError` if the three inputs differ in length or a span does
/// not fit in `num_words`.
pub fn decode_spans(
    spans: &[(usize, usize)],
    scores: &[f32],
    labels: &[i64],
    num_words: usize,
    outside_label_id: i64,
) -> Result<Vec<SelectedSpan>, SpanMarkerError> {
    if spans.len() != scores.len() || spans.len() != labels.len() {
        return Err(SpanMarkerError::InternalConsistencyError(format!(
            "Got {} spans for {} scores and {} labels",
            spans.len(),
            scores.len(),
            labels.len()
        )));
    }
    if let Some((start, end)) = spans
        .iter()
        .find(|(start, end)| end <= start || *end > num_words)
    {
        return Err(SpanMarkerError::InternalConsistencyError(format!(
            "Span ({start}, {end}) is invalid for a sentence of {num_words} words"
        )));
    }

    let mut candidates = spans
        .iter()
        .zip(scores.iter())
        .zip(labels.iter())
        .map(|((&(start, end), &score), &label_id)| SelectedSpan {
            word_start_index: start,
            word_end_index: end,
            label_id,
            score,
        })
        .collect::<Vec<SelectedSpan>>();
    // `sort_by_key` is stable: equal scores keep the enumeration order
    candidates.sort_by_key(|candidate| Reverse(OrderedFloat(candidate.score)));

    let mut word_selected = vec![false; num_words];
    let mut selected = Vec::new();
    for candidate in candidates {
        if candidate.label_id == outside_label_id {
            continue;
        }
        let words = &mut word_selected[candidate.word_start_index..candidate.word_end_index];
        if words.iter().any(|claimed| *claimed) {
            continue;
        }
        words.iter_mut().for_each(|claimed| *claimed = true);
        selected.push(candidate);
    }
    selected.sort_by_key(|span| span.word_start_index);
    Ok(selected)
}
