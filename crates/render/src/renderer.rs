use glam::{Mat4, Vec3};
use perfscene_common::BatchId;
use perfscene_instancing::InstanceBatch;
use perfscene_scene::Scene;

/// Camera/view configuration for rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderView {
    /// Camera position in world space.
    pub eye: Vec3,
    /// Point the camera is looking at.
    pub target: Vec3,
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for RenderView {
    fn default() -> Self {
        Self {
            eye: Vec3::new(2.0, 2.0, 6.0),
            target: Vec3::ZERO,
            fov_degrees: 75.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl RenderView {
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_degrees.to_radians(),
            self.aspect.max(f32::EPSILON),
            self.near,
            self.far,
        )
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

/// Renderer-agnostic interface. All backends implement this trait.
///
/// The renderer reads the scene and a view; it never mutates the scene.
/// Instance buffers reach the backend only through [`Renderer::upload_batch`],
/// which the frame driver calls for batches whose buffer is dirty.
pub trait Renderer {
    /// The output type produced by this renderer for one frame.
    type Output;

    /// Copy a batch's transform buffer to the backend.
    fn upload_batch(&mut self, id: BatchId, batch: &InstanceBatch);

    /// Render one frame from the given scene and view.
    fn render(&mut self, scene: &Scene, view: &RenderView) -> Self::Output;
}

/// Camera controls: advanced once per frame, then asked for the view.
pub trait Controls {
    fn update(&mut self, dt: f32);

    fn view(&self) -> RenderView;
}

/// Controls that never move. Used for headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticControls(pub RenderView);

impl Controls for StaticControls {
    fn update(&mut self, _dt: f32) {}

    fn view(&self) -> RenderView {
        self.0
    }
}
