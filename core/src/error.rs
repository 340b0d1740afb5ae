//! Error taxonomy for the pipeline engine (spec.md §7).

use crate::descriptor::BufferDescriptor;
use thiserror::Error;

/// Identifies a pipeline piece in error contexts, without borrowing into the pipeline.
pub type PieceId = usize;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("out of memory while allocating {context}")]
    OutOfMemory { context: String },

    #[error("descriptor mismatch: expected {expected:?}, got {actual:?}")]
    DescriptorMismatch {
        expected: BufferDescriptor,
        actual: BufferDescriptor,
    },

    #[error("module {op} cannot upgrade parameters from v{from} to v{to}")]
    UnsupportedParamVersion { op: String, from: u32, to: u32 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("type error: field {field} on {op} expected {expected}, got {actual}")]
    TypeError {
        op: String,
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("out of bounds: field {field} on {op} ({reason})")]
    OutOfBounds {
        op: String,
        field: String,
        reason: String,
    },

    #[error("pipeline failed at piece {piece_id}: {cause}")]
    PipelineFailed { piece_id: PieceId, cause: String },

    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, PipelineError>;
