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
use crate::span_marker::signature::check_names;
use ort::Session;
use std::collections::HashMap;

#[derive(Debug)]
pub(crate) struct InputOutputNameMapping {
    pub(crate) input_names: Vec<String>,
    pub(crate) output_names: HashMap<String, usize>,
}

impl InputOutputNameMapping {
    /// Position of output `name`, or of the first output if the graph uses another name
    pub(crate) fn output_position(&self, name: &str) -> usize {
        self.output_names.get(name).copied().unwrap_or(0)
    }
}

pub(crate) fn get_input_output_mapping(session: &Session) -> InputOutputNameMapping {
    let input_names = session
        .inputs
        .iter()
        .map(|input| input.name.clone())
        .collect::<Vec<String>>();

    let output_names = session
        .outputs
        .iter()
        .enumerate()
        .map(|(pos, output)| (output.name.clone(), pos))
        .collect::<HashMap<String, usize>>();

    InputOutputNameMapping {
        input_names,
        output_names,
    }
}

/// Size of `axis` in a declared input shape, `None` if the axis is dynamic or absent
pub(crate) fn fixed_axis(dimensions: &[Option<u32>], axis: usize) -> Option<usize> {
    dimensions
        .get(axis)
        .copied()
        .flatten()
        .filter(|size| *size > 0)
        .map(|size| size as usize)
}

/// Size of `axis` of input `input_name` as declared by the graph, `None` if dynamic
pub(crate) fn declared_input_axis(session: &Session, input_name: &str, axis: usize) -> Option<usize> {
    session
        .inputs
        .iter()
        .find(|input| input.name == input_name)
        .and_then(|input| fixed_axis(&input.dimensions, axis))
}

/// Checks that a loaded graph declares the expected input and output names.
///
/// # Arguments
///
/// * `session` - session over the loaded graph
/// * `expected_inputs` - input names the graph must declare
/// * `expected_outputs` - output names the graph must declare
///
/// # Errors
///
/// `SpanMarkerError::InvalidConfigurationError` listing the missing names.
pub fn validate_signature(
    session: &Session,
    expected_inputs: &[&str],
    expected_outputs: &[&str],
) -> Result<(), SpanMarkerError> {
    let inputs = session
        .inputs
        .iter()
        .map(|input| input.name.as_str())
        .collect::<Vec<&str>>();
    let outputs = session
        .outputs
        .iter()
        .map(|output| output.name.as_str())
        .collect::<Vec<&str>>();
    check_names("graph inputs", &inputs, expected_inputs)?;
    check_names("graph outputs", &outputs, expected_outputs)
}
