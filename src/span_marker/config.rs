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

use crate::common::error::SpanMarkerError;
use crate::Config;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Label used for spans that are not entities when `outside_id` is not set explicitly.
pub const OUTSIDE_LABEL: &str = "O";
/// Token inserted before the text tokens' position of a candidate span start.
pub const START_MARKER_TOKEN: &str = "<start>";
/// Token inserted at the position of a candidate span end.
pub const END_MARKER_TOKEN: &str = "<end>";

fn default_entity_max_length() -> usize {
    8
}

fn default_marker_max_length() -> usize {
    128
}

fn default_model_max_length() -> usize {
    256
}

fn default_model_max_length_default() -> usize {
    512
}

/// # Configuration of the underlying transformer encoder
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EncoderConfig {
    pub vocab_size: usize,
    pub hidden_size: usize,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub pad_token_id: Option<i64>,
}

/// # SpanMarker model configuration
/// Mirrors the `config.json` saved alongside a trained SpanMarker model.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpanMarkerConfig {
    pub id2label: HashMap<i64, String>,
    #[serde(default)]
    pub label2id: Option<HashMap<String, i64>>,
    #[serde(default)]
    pub outside_id: Option<i64>,
    #[serde(default = "default_entity_max_length")]
    pub entity_max_length: usize,
    #[serde(default = "default_marker_max_length")]
    pub marker_max_length: usize,
    #[serde(default = "default_model_max_length")]
    pub model_max_length: usize,
    #[serde(default = "default_model_max_length_default")]
    pub model_max_length_default: usize,
    #[serde(default)]
    pub max_prev_context: Option<usize>,
    #[serde(default)]
    pub max_next_context: Option<usize>,
    #[serde(default)]
    pub trained_with_document_context: bool,
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub start_marker_id: Option<u32>,
    #[serde(default)]
    pub end_marker_id: Option<u32>,
}

impl Config for SpanMarkerConfig {}

impl SpanMarkerConfig {
    /// Id of the label marking a span as "not an entity".
    ///
    /// Uses `outside_id` if present, otherwise the id of the `"O"` label.
    pub fn outside_id(&self) -> Result<i64, SpanMarkerError> {
        if let Some(outside_id) = self.outside_id {
            return Ok(outside_id);
        }
        if let Some(outside_id) = self
            .label2id
            .as_ref()
            .and_then(|label2id| label2id.get(OUTSIDE_LABEL))
        {
            return Ok(*outside_id);
        }
        self.id2label
            .iter()
            .find(|(_, label)| label.as_str() == OUTSIDE_LABEL)
            .map(|(id, _)| *id)
            .ok_or_else(|| {
                SpanMarkerError::InvalidConfigurationError(format!(
                    "No `outside_id` provided and no `{OUTSIDE_LABEL}` label found in `id2label`"
                ))
            })
    }

    pub fn label(&self, label_id: i64) -> Result<&str, SpanMarkerError> {
        self.id2label
            .get(&label_id)
            .map(String::as_str)
            .ok_or_else(|| {
                SpanMarkerError::InternalConsistencyError(format!(
                    "Label id {label_id} not found in `id2label`"
                ))
            })
    }

    pub fn num_labels(&self) -> usize {
        self.id2label.len()
    }

    pub fn vocab_size(&self) -> usize {
        self.encoder.vocab_size
    }

    pub fn hidden_size(&self) -> usize {
        self.encoder.hidden_size
    }

    /// Offset added to every position id fed to the encoder.
    ///
    /// RoBERTa-family encoders reserve the first `pad_token_id + 1` positions.
    pub fn position_offset(&self) -> i64 {
        match self.encoder.model_type.as_deref() {
            Some("roberta") | Some("xlm-roberta") | Some("camembert") => {
                self.encoder.pad_token_id.unwrap_or(1) + 1
            }
            _ => 0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"{
        "id2label": {"0": "O", "1": "person", "2": "location"},
        "label2id": {"O": 0, "person": 1, "location": 2},
        "entity_max_length": 6,
        "marker_max_length": 64,
        "model_max_length": 128,
        "trained_with_document_context": false,
        "encoder": {"vocab_size": 30524, "hidden_size": 768, "model_type": "bert", "pad_token_id": 0},
        "span_marker_version": "1.2.4"
    }"#;

    #[test]
    fn parses_span_marker_config() -> anyhow::Result<()> {
        let config: SpanMarkerConfig = serde_json::from_str(CONFIG)?;
        assert_eq!(config.entity_max_length, 6);
        assert_eq!(config.marker_max_length, 64);
        assert_eq!(config.model_max_length, 128);
        assert_eq!(config.model_max_length_default, 512);
        assert_eq!(config.max_prev_context, None);
        assert_eq!(config.num_labels(), 3);
        assert_eq!(config.label(2)?, "location");
        assert_eq!(config.hidden_size(), 768);
        assert_eq!(config.position_offset(), 0);
        Ok(())
    }

    #[test]
    fn resolves_outside_id() -> anyhow::Result<()> {
        let mut config: SpanMarkerConfig = serde_json::from_str(CONFIG)?;
        assert_eq!(config.outside_id()?, 0);

        config.label2id = None;
        assert_eq!(config.outside_id()?, 0);

        config.outside_id = Some(2);
        assert_eq!(config.outside_id()?, 2);
        Ok(())
    }

    #[test]
    fn missing_outside_label_is_a_configuration_error() -> anyhow::Result<()> {
        let mut config: SpanMarkerConfig = serde_json::from_str(CONFIG)?;
        config.label2id = None;
        config.id2label.remove(&0);
        assert!(matches!(
            config.outside_id(),
            Err(SpanMarkerError::InvalidConfigurationError(_))
        ));
        Ok(())
    }

    #[test]
    fn unknown_label_id() -> anyhow::Result<()> {
        let config: SpanMarkerConfig = serde_json::from_str(CONFIG)?;
        assert!(matches!(
            config.label(7),
            Err(SpanMarkerError::InternalConsistencyError(_))
        ));
        Ok(())
    }

    #[test]
    fn roberta_position_offset() -> anyhow::Result<()> {
        let mut config: SpanMarkerConfig = serde_json::from_str(CONFIG)?;
        config.encoder.model_type = Some("roberta".to_string());
        config.encoder.pad_token_id = Some(1);
        assert_eq!(config.position_offset(), 2);
        Ok(())
    }

    #[test]
    fn loads_from_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(CONFIG.as_bytes())?;
        let config = SpanMarkerConfig::from_file(file.path())?;
        assert_eq!(config.vocab_size(), 30524);
        Ok(())
    }
}
