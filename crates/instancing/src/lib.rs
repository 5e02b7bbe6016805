//! Instance Batch Builder.
//!
//! Produces N transforms for copies of one geometry/material pair and keeps
//! them in a single buffer so the whole batch is drawn with one submission.
//!
//! # Invariants
//! - A batch built for N instances holds exactly N transforms, forever.
//! - Instance index equals write order; mutation never reorders.
//! - Any mutation re-flags the buffer dirty until the backend re-uploads it.
//! - N = 0 is valid: empty buffer, no draw.

mod batch;
mod builder;

pub use batch::{BatchDraw, InstanceBatch, InstanceTransform, TransformBuffer};
pub use builder::{BatchBuilder, ScatterPolicy};

/// Errors from batch construction and mutation.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("scatter range must be finite and non-negative: {0:?}")]
    InvalidRange(ScatterPolicy),
    #[error("instance index {index} out of range for batch of {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

pub fn crate_info() -> &'static str {
    "perfscene-instancing v0.1.0"
}
