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

//! # ONNX Runtime backend
//!
//! Runs SpanMarker models exported as two ONNX graphs: the transformer encoder and the span
//! classifier. The encoder output is turned into the classifier input by gathering the hidden
//! states of every start/end marker pair (see [`build_feature_vector`]).

pub(crate) mod classifier;
pub(crate) mod common;
pub mod config;
pub(crate) mod conversion;
pub(crate) mod encoder;
pub mod models;

pub use classifier::ONNXSpanClassifier;
pub use common::validate_signature;
pub use config::ONNXEnvironmentConfig;
pub use encoder::ONNXEncoder;
pub use models::{build_feature_vector, ONNXSpanMarker};
