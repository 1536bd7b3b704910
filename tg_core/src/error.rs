//! Error types for tensor operations and backward passes.

use thiserror::Error;

use crate::shape::Shape;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("shape mismatch in {op}: {lhs} vs {rhs}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },

    #[error("{op} received an empty tensor of shape {shape}")]
    EmptyTensor { op: &'static str, shape: Shape },

    #[error("backward needs a scalar loss, got shape {shape}")]
    NotScalar { shape: Shape },

    #[error("{len} values do not fill shape {shape}")]
    DataLength { len: usize, shape: Shape },

    #[error("label {label} is out of range for {classes} classes")]
    LabelOutOfRange { label: usize, classes: usize },

    #[error("{op} needs a [rows, cols] matrix, got shape {shape}")]
    NotMatrix { op: &'static str, shape: Shape },

    #[error("loss was not recorded on this tape; it may predate a reset")]
    DetachedLoss,
}

impl Error {
    /// True for every error caused by incompatible or invalid dimensions.
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            Error::ShapeMismatch { .. }
                | Error::NotScalar { .. }
                | Error::DataLength { .. }
                | Error::NotMatrix { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
