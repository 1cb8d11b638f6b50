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

//! # Batch collation
//!
//! Expands marker samples into the dense inputs of the encoder graph. Every row holds the text
//! tokens, followed by one start marker per candidate span, followed by the matching end markers:
//!
//! ```text
//! [CLS] Amelia Earhart flew [SEP] <start> <start> ... <end> <end> ... [PAD] ...
//! ```
//!
//! Markers share the position id of the token they mark, text tokens only attend to text tokens,
//! and each marker attends to the text tokens and to its own start/end pair.
//!
//! Graphs exported with a fixed sequence axis need every row padded to that length, set with
//! [`SpanMarkerDataCollator::with_padded_length`]. Otherwise rows are padded to the longest one.

use crate::span_marker::context::SpanMarkerSample;
use crate::span_marker::tokenizer::SpanMarkerTokenizer;
use ndarray::{s, Array1, Array2, Array3};

#[derive(Debug, Clone)]
/// # Collated inputs for a batch of marker samples
pub struct SpanMarkerBatch {
    /// Index of the input sentence of every row
    pub ids: Vec<usize>,
    /// `[batch, sequence]` token ids, markers and padding included
    pub input_ids: Array2<i64>,
    /// `[batch, sequence, sequence]` attention mask (1 = attend)
    pub attention_mask: Array3<i64>,
    /// `[batch, sequence]` position ids
    pub position_ids: Array2<i64>,
    /// `[batch]` index of the first start marker (equal to the number of text tokens)
    pub start_marker_indices: Array1<i64>,
    /// `[batch]` number of start/end marker pairs
    pub num_marker_pairs: Array1<i64>,
    /// `[batch]` number of words in the sentence
    pub num_words: Array1<i64>,
    pub document_ids: Option<Array1<i64>>,
    pub sentence_ids: Option<Array1<i64>>,
}

impl SpanMarkerBatch {
    pub fn batch_size(&self) -> usize {
        self.ids.len()
    }

    pub fn sequence_length(&self) -> usize {
        self.input_ids.ncols()
    }
}

/// # Data collator for SpanMarker samples
#[derive(Debug, Clone)]
pub struct SpanMarkerDataCollator {
    pad_token_id: i64,
    start_marker_id: i64,
    end_marker_id: i64,
    position_offset: i64,
    padded_length: Option<usize>,
}

impl SpanMarkerDataCollator {
    pub fn new(
        pad_token_id: i64,
        start_marker_id: i64,
        end_marker_id: i64,
        position_offset: i64,
    ) -> Self {
        Self {
            pad_token_id,
            start_marker_id,
            end_marker_id,
            position_offset,
            padded_length: None,
        }
    }

    /// Pads every row to `padded_length` tokens. Rows longer than that keep their own length.
    pub fn with_padded_length(mut self, padded_length: Option<usize>) -> Self {
        self.padded_length = padded_length;
        self
    }

    pub fn padded_length(&self) -> Option<usize> {
        self.padded_length
    }

    pub fn from_tokenizer(tokenizer: &SpanMarkerTokenizer, position_offset: i64) -> Self {
        Self::new(
            tokenizer.pad_token_id() as i64,
            tokenizer.start_marker_id() as i64,
            tokenizer.end_marker_id() as i64,
            position_offset,
        )
    }

    /// Collates samples into a padded batch. The sequence length is the padded length if set,
    /// or the longest `num_tokens + 2 * num_marker_pairs` among the samples.
    pub fn collate(&self, samples: &[SpanMarkerSample]) -> SpanMarkerBatch {
        let batch_size = samples.len();
        let sequence_length = samples
            .iter()
            .map(|sample| sample.num_tokens() + 2 * sample.num_marker_pairs())
            .chain(self.padded_length)
            .max()
            .unwrap_or(0);

        let mut input_ids = Array2::from_elem((batch_size, sequence_length), self.pad_token_id);
        let mut position_ids = Array2::<i64>::zeros((batch_size, sequence_length));
        let mut attention_mask = Array3::<i64>::zeros((batch_size, sequence_length, sequence_length));

        for (row, sample) in samples.iter().enumerate() {
            let num_tokens = sample.num_tokens();
            let num_pairs = sample.num_marker_pairs();
            let start_marker_index = num_tokens;
            let end_marker_index = num_tokens + num_pairs;
            let total = end_marker_index + num_pairs;

            for (position, token_id) in sample.input_ids.iter().enumerate() {
                input_ids[[row, position]] = *token_id;
                position_ids[[row, position]] = position as i64 + self.position_offset;
            }
            for pair in 0..num_pairs {
                input_ids[[row, start_marker_index + pair]] = self.start_marker_id;
                input_ids[[row, end_marker_index + pair]] = self.end_marker_id;
                position_ids[[row, start_marker_index + pair]] =
                    sample.start_position_ids[pair] + self.position_offset;
                position_ids[[row, end_marker_index + pair]] =
                    sample.end_position_ids[pair] + self.position_offset;
            }

            // Text tokens attend to each other, markers attend to all text tokens
            attention_mask
                .slice_mut(s![row, ..total, ..num_tokens])
                .fill(1);
            for pair in 0..num_pairs {
                let start = start_marker_index + pair;
                let end = end_marker_index + pair;
                for (query, key) in [(start, start), (start, end), (end, start), (end, end)] {
                    attention_mask[[row, query, key]] = 1;
                }
            }
        }

        let column = |values: Vec<i64>| Array1::from_vec(values);
        let optional_column = |values: Vec<Option<i64>>| {
            values
                .into_iter()
                .collect::<Option<Vec<i64>>>()
                .map(Array1::from_vec)
        };

        SpanMarkerBatch {
            ids: samples.iter().map(|sample| sample.id).collect(),
            input_ids,
            attention_mask,
            position_ids,
            start_marker_indices: column(
                samples
                    .iter()
                    .map(|sample| sample.num_tokens() as i64)
                    .collect(),
            ),
            num_marker_pairs: column(
                samples
                    .iter()
                    .map(|sample| sample.num_marker_pairs() as i64)
                    .collect(),
            ),
            num_words: column(
                samples
                    .iter()
                    .map(|sample| sample.num_words as i64)
                    .collect(),
            ),
            document_ids: optional_column(samples.iter().map(|sample| sample.document_id).collect()),
            sentence_ids: optional_column(samples.iter().map(|sample| sample.sentence_id).collect()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample(input_ids: Vec<i64>, spans: &[(i64, i64)]) -> SpanMarkerSample {
        SpanMarkerSample {
            id: 0,
            input_ids,
            start_position_ids: spans.iter().map(|(start, _)| *start).collect(),
            end_position_ids: spans.iter().map(|(_, end)| *end).collect(),
            num_words: 2,
            document_id: None,
            sentence_id: None,
        }
    }

    #[test]
    fn lays_out_markers_after_text_tokens() {
        let collator = SpanMarkerDataCollator::new(0, 4, 5, 0);
        let samples = [sample(vec![2, 10, 11, 3], &[(1, 1), (1, 2), (2, 2)])];

        let batch = collator.collate(&samples);

        assert_eq!(batch.sequence_length(), 10);
        assert_eq!(
            batch.input_ids.row(0).to_vec(),
            vec![2, 10, 11, 3, 4, 4, 4, 5, 5, 5]
        );
        assert_eq!(
            batch.position_ids.row(0).to_vec(),
            vec![0, 1, 2, 3, 1, 1, 2, 1, 2, 2]
        );
        assert_eq!(batch.start_marker_indices.to_vec(), vec![4]);
        assert_eq!(batch.num_marker_pairs.to_vec(), vec![3]);
        assert_eq!(batch.num_words.to_vec(), vec![2]);
        assert!(batch.document_ids.is_none());
    }

    #[test]
    fn attention_pattern() {
        let collator = SpanMarkerDataCollator::new(0, 4, 5, 0);
        let samples = [sample(vec![2, 10, 3], &[(1, 1), (1, 1)])];

        let batch = collator.collate(&samples);
        let mask = batch.attention_mask.slice(s![0, .., ..]);

        // text tokens only see text tokens
        assert_eq!(mask.row(0).to_vec(), vec![1, 1, 1, 0, 0, 0, 0]);
        // first start marker sees the text, itself and its end marker
        assert_eq!(mask.row(3).to_vec(), vec![1, 1, 1, 1, 0, 1, 0]);
        // second end marker
        assert_eq!(mask.row(6).to_vec(), vec![1, 1, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn pads_shorter_rows() {
        let collator = SpanMarkerDataCollator::new(0, 4, 5, 2);
        let mut short = sample(vec![2, 10, 3], &[(1, 1)]);
        short.id = 1;
        let samples = [sample(vec![2, 10, 11, 3], &[(1, 1), (2, 2)]), short];

        let batch = collator.collate(&samples);

        assert_eq!(batch.ids, vec![0, 1]);
        assert_eq!(batch.sequence_length(), 8);
        assert_eq!(
            batch.input_ids.row(1).to_vec(),
            vec![2, 10, 3, 4, 5, 0, 0, 0]
        );
        assert_eq!(
            batch.position_ids.row(1).to_vec(),
            vec![2, 3, 4, 3, 3, 0, 0, 0]
        );
        assert_eq!(batch.attention_mask.slice(s![1, 5.., ..]).sum(), 0);
        assert_eq!(batch.attention_mask.slice(s![1, .., 5..]).sum(), 0);
    }

    #[test]
    fn pads_to_the_exported_sequence_length() {
        let collator = SpanMarkerDataCollator::new(0, 4, 5, 0).with_padded_length(Some(12));
        let samples = [sample(vec![2, 10, 11, 3], &[(1, 1), (1, 2), (2, 2)])];

        let batch = collator.collate(&samples);

        assert_eq!(batch.input_ids.shape(), &[1, 12]);
        assert_eq!(batch.position_ids.shape(), &[1, 12]);
        assert_eq!(batch.attention_mask.shape(), &[1, 12, 12]);
        assert_eq!(
            batch.input_ids.row(0).to_vec(),
            vec![2, 10, 11, 3, 4, 4, 4, 5, 5, 5, 0, 0]
        );
        assert_eq!(batch.attention_mask.slice(s![0, 10.., ..]).sum(), 0);
        assert_eq!(batch.start_marker_indices.to_vec(), vec![4]);
    }

    #[test]
    fn keeps_document_ids_when_all_samples_have_them() {
        let collator = SpanMarkerDataCollator::new(0, 4, 5, 0);
        let mut first = sample(vec![2, 10, 3], &[(1, 1)]);
        first.document_id = Some(3);
        first.sentence_id = Some(0);
        let mut second = first.clone();
        second.sentence_id = Some(1);

        let batch = collator.collate(&[first.clone(), second]);
        assert_eq!(batch.document_ids.map(|ids| ids.to_vec()), Some(vec![3, 3]));
        assert_eq!(batch.sentence_ids.map(|ids| ids.to_vec()), Some(vec![0, 1]));

        let batch = collator.collate(&[first, sample(vec![2, 10, 3], &[(1, 1)])]);
        assert!(batch.document_ids.is_none());
    }
}
