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

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpanMarkerError {
    #[error("Endpoint not available error: {0}")]
    FileDownloadError(String),

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Tokenizer error: {0}")]
    TokenizerError(String),

    #[error("Invalid configuration error: {0}")]
    InvalidConfigurationError(String),

    #[error("ONNX Runtime error: {0}")]
    OrtError(String),

    #[error("Value error: {0}")]
    ValueError(String),

    #[error("Internal consistency error: {0}")]
    InternalConsistencyError(String),
}

#[cfg(feature = "remote")]
impl From<cached_path::Error> for SpanMarkerError {
    fn from(error: cached_path::Error) -> Self {
        SpanMarkerError::FileDownloadError(error.to_string())
    }
}

impl From<std::io::Error> for SpanMarkerError {
    fn from(error: std::io::Error) -> Self {
        SpanMarkerError::IOError(error.to_string())
    }
}

impl From<tokenizers::Error> for SpanMarkerError {
    fn from(error: tokenizers::Error) -> Self {
        SpanMarkerError::TokenizerError(error.to_string())
    }
}

impl From<serde_json::Error> for SpanMarkerError {
    fn from(error: serde_json::Error) -> Self {
        SpanMarkerError::InvalidConfigurationError(error.to_string())
    }
}

impl From<ort::OrtError> for SpanMarkerError {
    fn from(error: ort::OrtError) -> Self {
        SpanMarkerError::OrtError(error.to_string())
    }
}

impl From<ndarray::ShapeError> for SpanMarkerError {
    fn from(error: ndarray::ShapeError) -> Self {
        SpanMarkerError::InternalConsistencyError(error.to_string())
    }
}
