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

//! # SpanMarker Named Entity Recognition with ONNX Runtime
//!
//! Runs [SpanMarker](https://github.com/tomaarsen/SpanMarkerNER) models exported as two ONNX graphs,
//! a transformer encoder and a span classifier. Every span of up to `entity_max_length` words is
//! marked with a `<start>`/`<end>` marker pair appended to the sentence tokens, the encoder hidden
//! states of each pair are classified, and the most confident non-overlapping spans are returned.
//!
//! The crate is organized as follows:
//! - [`span_marker`]: model configuration, tokenization, span enumeration, batch collation, span
//!   decoding and the signature of the exported graphs
//! - [`pipelines::onnx`]: ONNX Runtime sessions for the two graphs
//! - [`pipelines::span_marker`]: the end-to-end prediction pipeline
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
//! let output = model.predict(vec![
//!     "Amelia Earhart flew her single engine Lockheed Vega 5B to Paris.",
//!     "Caesar led the Roman armies in the Gallic Wars.",
//! ])?;
//! # Ok(())
//! # }
//! ```
//!
//! Model resources can also be fetched from a remote location and cached locally (feature
//! `remote`, enabled by default) using [`resources::RemoteResource`]. The cache location defaults
//! to `~/.cache/.spanmarker` and can be changed with the `SPANMARKER_CACHE` environment variable.

mod common;
pub mod pipelines;
pub mod span_marker;

pub use common::error::SpanMarkerError;
pub use common::resources;
pub use common::Config;
