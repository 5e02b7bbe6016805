//! Scene graph for the performance demo.
//!
//! # Invariants
//! - Objects and batches only reference registered geometries and materials.
//! - Iteration over objects and batches is deterministic (BTreeMap).
//! - Disposing an object releases resources no other object or batch uses.

mod config;
mod light;
mod scene;
mod setup;

use perfscene_assets::AssetError;
use perfscene_common::{BatchId, ObjectId};
use perfscene_instancing::BatchError;

pub use config::{
    BatchConfig, CameraConfig, DemoConfig, DisplacedPlaneConfig, RendererConfig, ShadowConfig,
};
pub use light::{DirectionalLight, ShadowSettings};
pub use scene::{Scene, SceneObject};
pub use setup::{DemoScene, DrawStrategy, Population, build_demo_scene, populate};

/// Errors from scene operations.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("unknown object: {0:?}")]
    UnknownObject(ObjectId),
    #[error("unknown batch: {0:?}")]
    UnknownBatch(BatchId),
    #[error("unknown draw strategy: {0} (expected separate, shared, merged or instanced)")]
    UnknownStrategy(String),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn crate_info() -> &'static str {
    "perfscene-scene v0.1.0"
}
