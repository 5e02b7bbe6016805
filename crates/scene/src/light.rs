use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Shadow-map parameters of a directional light.
///
/// The shadow camera is orthographic; keeping its bounds tight around the
/// shadow casters and `map_size` small is what keeps the shadow pass cheap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    pub map_size: u32,
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
    pub near: f32,
    pub far: f32,
    /// World-space offset along the surface normal applied before the depth test.
    pub normal_bias: f32,
    /// Re-render the shadow map every frame.
    pub auto_update: bool,
    /// One-shot request to re-render the shadow map when `auto_update` is off.
    pub needs_update: bool,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            map_size: 1024,
            left: -6.0,
            right: 6.0,
            top: 3.0,
            bottom: -3.0,
            near: 0.5,
            far: 10.0,
            normal_bias: 0.05,
            auto_update: true,
            needs_update: false,
        }
    }
}

/// Directional light shining from `position` towards `target`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionalLight {
    pub position: Vec3,
    pub target: Vec3,
    pub color: [f32; 3],
    pub intensity: f32,
    pub cast_shadow: bool,
    pub shadow: ShadowSettings,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.25, 3.0, 2.25),
            target: Vec3::ZERO,
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
            cast_shadow: false,
            shadow: ShadowSettings::default(),
        }
    }
}

impl DirectionalLight {
    /// Unit vector pointing from the surface towards the light.
    pub fn direction(&self) -> Vec3 {
        (self.position - self.target).normalize_or(Vec3::Y)
    }

    /// Whether this frame must render the shadow map.
    pub fn shadow_pass_due(&self) -> bool {
        self.cast_shadow && (self.shadow.auto_update || self.shadow.needs_update)
    }

    /// View-projection of the orthographic shadow camera, depth in [0, 1].
    pub fn shadow_view_projection(&self) -> Mat4 {
        let s = &self.shadow;
        let up = if self.direction().abs_diff_eq(Vec3::Y, 1e-4) {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_at_rh(self.position, self.target, up);
        let proj = Mat4::orthographic_rh(s.left, s.right, s.bottom, s.top, s.near, s.far);
        proj * view
    }
}
