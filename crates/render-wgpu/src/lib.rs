//! wgpu render backend for the instancing demo.
//!
//! Draws whatever [`perfscene_render::FramePlan`] lists: an optional
//! directional-light shadow pass, then one draw per submission, so an
//! instance batch of any size costs one draw call.
//!
//! # Invariants
//! - Renderer never mutates the scene.
//! - Instance buffers change only through `upload_batch`.
//! - Camera motion lives in [`OrbitCamera`], outside the scene.

mod camera;
mod gpu;
mod shaders;

pub use camera::OrbitCamera;
pub use gpu::{SurfaceFrame, WgpuRenderer};
