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
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// # Utility to deserialize JSON config files
pub trait Config
where
    for<'de> Self: Deserialize<'de>,
{
    /// Loads a `Config` object from a JSON file. The format is expected to be aligned with the
    /// [SpanMarker](https://github.com/tomaarsen/SpanMarkerNER) `config.json` saved next to a trained model.
    ///
    /// # Arguments
    ///
    /// * `path` - `Path` to the configuration JSON file.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use spanmarker_onnx::span_marker::SpanMarkerConfig;
    /// use spanmarker_onnx::Config;
    /// use std::path::Path;
    ///
    /// # fn main() -> Result<(), spanmarker_onnx::SpanMarkerError> {
    /// let config_path = Path::new("path/to/config.json");
    /// let config = SpanMarkerConfig::from_file(config_path)?;
    /// # Ok(())
    /// # }
    /// ```
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SpanMarkerError> {
        let f = File::open(path.as_ref()).map_err(|e| {
            SpanMarkerError::IOError(format!(
                "{} configuration file not found: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let br = BufReader::new(f);
        let config: Self = serde_json::from_reader(br)?;
        Ok(config)
    }
}
