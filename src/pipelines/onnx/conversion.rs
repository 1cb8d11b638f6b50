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

//! Conversion between `ndarray` arrays and ONNX Runtime values.

use crate::common::error::SpanMarkerError;
use ndarray::{Array, ArrayD, ArrayViewD, CowArray, Dimension, IxDyn};
use ort::tensor::TensorElementDataType;
use ort::{Session, Value};

/// Owned input array in the element type the graph declares
#[derive(Debug)]
pub(crate) enum OrtInputArray<'a> {
    Int64(CowArray<'a, i64, IxDyn>),
    Int32(CowArray<'a, i32, IxDyn>),
    Float32(CowArray<'a, f32, IxDyn>),
}

impl<'a> OrtInputArray<'a> {
    /// Integer input, cast to `int32` if the graph declares it so.
    pub(crate) fn from_i64(
        array: ArrayViewD<'a, i64>,
        input_type: &TensorElementDataType,
    ) -> Self {
        match input_type {
            TensorElementDataType::Int32 => {
                OrtInputArray::Int32(CowArray::from(array.mapv(|value| value as i32)))
            }
            _ => OrtInputArray::Int64(CowArray::from(array)),
        }
    }

    pub(crate) fn from_f32<D: Dimension>(array: Array<f32, D>) -> Self {
        OrtInputArray::Float32(CowArray::from(array.into_dyn()))
    }

    pub(crate) fn to_value(&'a self, session: &Session) -> Result<Value<'a>, SpanMarkerError> {
        Ok(match self {
            OrtInputArray::Int64(array) => Value::from_array(session.allocator(), array)?,
            OrtInputArray::Int32(array) => Value::from_array(session.allocator(), array)?,
            OrtInputArray::Float32(array) => Value::from_array(session.allocator(), array)?,
        })
    }
}

/// Copies a `float32` output into an owned array.
pub(crate) fn ort_value_to_array(value: &Value) -> Result<ArrayD<f32>, SpanMarkerError> {
    let tensor = value.try_extract::<f32>()?;
    let array = tensor.view().to_owned();
    Ok(array)
}
