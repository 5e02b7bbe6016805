//! Rendering Adapter: renderer-agnostic interface.
//!
//! # Invariants
//! - Renderers never mutate the scene.
//! - Every backend draws exactly what [`FramePlan::build`] lists, so the
//!   statistics reported by the headless renderer match the GPU backend.
//! - A non-empty instance batch is one submission; an empty one is none.

mod headless;
mod info;
mod plan;
mod renderer;

pub use headless::HeadlessRenderer;
pub use info::RenderInfo;
pub use plan::{DrawSource, DrawSubmission, FramePlan, ShadowPass};
pub use renderer::{Controls, RenderView, Renderer, StaticControls};

pub fn crate_info() -> &'static str {
    "perfscene-render v0.1.0"
}
