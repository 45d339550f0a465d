//! Tensor element type codes (`TensorProto.DataType`).

use std::fmt;

/// Element types the vecport tools care about, plus a catch-all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// 32-bit float (code 1).
    Float,
    /// 32-bit signed integer (code 6).
    Int32,
    /// 64-bit signed integer (code 7).
    Int64,
    /// Any other code, kept verbatim.
    Other(i32),
}

impl ElementType {
    /// `TensorProto.DataType.FLOAT`.
    pub const FLOAT_CODE: i32 = 1;
    /// `TensorProto.DataType.INT32`.
    pub const INT32_CODE: i32 = 6;
    /// `TensorProto.DataType.INT64`.
    pub const INT64_CODE: i32 = 7;

    /// Classify a raw ONNX data type code.
    pub fn from_code(code: i32) -> Self {
        match code {
            Self::FLOAT_CODE => Self::Float,
            Self::INT32_CODE => Self::Int32,
            Self::INT64_CODE => Self::Int64,
            other => Self::Other(other),
        }
    }

    /// The raw ONNX data type code.
    pub fn code(self) -> i32 {
        match self {
            Self::Float => Self::FLOAT_CODE,
            Self::Int32 => Self::INT32_CODE,
            Self::Int64 => Self::INT64_CODE,
            Self::Other(code) => code,
        }
    }

    /// Readable name used in verification reports.
    pub fn name(self) -> String {
        match self {
            Self::Float => "FLOAT32".to_string(),
            Self::Int32 => "INT32".to_string(),
            Self::Int64 => "INT64".to_string(),
            Self::Other(code) => code.to_string(),
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Integer width of the exported token inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IntWidth {
    /// `int32` inputs.
    I32,
    /// `int64` inputs.
    I64,
}

impl IntWidth {
    /// The ONNX element type for this width.
    pub fn element_type(self) -> ElementType {
        match self {
            Self::I32 => ElementType::Int32,
            Self::I64 => ElementType::Int64,
        }
    }

    /// Width from an element type, if it is one of the two integer codes.
    pub fn from_element_type(elem: ElementType) -> Option<Self> {
        match elem {
            ElementType::Int32 => Some(Self::I32),
            ElementType::Int64 => Some(Self::I64),
            _ => None,
        }
    }

    /// Bit count.
    pub fn bits(self) -> u32 {
        match self {
            Self::I32 => 32,
            Self::I64 => 64,
        }
    }
}

impl fmt::Display for IntWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32 => f.write_str("int32"),
            Self::I64 => f.write_str("int64"),
        }
    }
}
