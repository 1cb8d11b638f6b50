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

//! # SpanMarker building blocks
//!
//! - [`SpanMarkerConfig`]: model configuration (`config.json`)
//! - [`SpanMarkerTokenizer`]: tokenization with word boundaries and marker tokens
//! - [`get_all_valid_spans`]: candidate span enumeration
//! - [`spread_sample`] and [`add_context`]: marker samples and document-level context
//! - [`SpanMarkerDataCollator`]: dense encoder inputs for a batch of samples
//! - [`decode_spans`]: greedy selection of non-overlapping spans
//! - [`signature`]: names and dummy inputs of the exported graphs

pub mod collator;
pub mod config;
pub mod context;
pub mod decoder;
pub mod signature;
pub mod tokenizer;

pub use collator::{SpanMarkerBatch, SpanMarkerDataCollator};
pub use config::{EncoderConfig, SpanMarkerConfig};
pub use context::{add_context, spread_sample, SpanMarkerSample};
pub use decoder::{decode_spans, SelectedSpan};
pub use signature::{DummyEncoderInputs, DummyInputGenerator};
pub use tokenizer::{get_all_valid_spans, Sentence, SpanMarkerTokenizer, TokenizedSentence};
