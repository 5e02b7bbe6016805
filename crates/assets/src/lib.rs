//! Scene resources: geometry and material descriptors, the registry that
//! hands out handles for them, and CPU-side mesh generation.
//!
//! Objects and batches reference resources by handle. Sharing one handle
//! between many objects is what lets the renderer reuse GPU buffers and
//! pipelines instead of creating one set per object.

mod mesh;
mod registry;

use perfscene_common::{GeometryHandle, MaterialHandle};

pub use mesh::{GeometryDesc, GeometryPart, MeshData, build_mesh};
pub use registry::{GeometryEntry, MaterialDesc, ResourceRegistry, ShaderPrecision};

/// Errors from resource operations.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown geometry: {0:?}")]
    UnknownGeometry(GeometryHandle),
    #[error("unknown material: {0:?}")]
    UnknownMaterial(MaterialHandle),
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("invalid material: {0}")]
    InvalidMaterial(String),
}

pub fn crate_info() -> &'static str {
    "perfscene-assets v0.1.0"
}
