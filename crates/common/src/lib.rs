//! Shared types used across the perfscene crates.
//!
//! Handles are plain copyable indices; the registries that own the
//! underlying resources live in `perfscene-assets` and `perfscene-scene`.

mod types;

pub use types::{BatchId, GeometryHandle, MaterialHandle, ObjectId, Transform};
