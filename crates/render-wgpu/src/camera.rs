use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Vec3};
use perfscene_render::{Controls, RenderView};
use perfscene_scene::CameraConfig;

/// Keeps the camera off the poles, where the orbit basis flips.
const PITCH_LIMIT: f32 = FRAC_PI_2 - 0.01;

/// Orbit camera around a target point: drag to rotate, scroll to zoom.
///
/// Input accumulates into pending deltas; [`Controls::update`] applies them.
/// With damping on, each update applies a share of what is pending, so
/// motion eases out over the next frames instead of stopping dead.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub radius: f32,
    /// Angle about +Y, zero looking down -Z.
    pub yaw: f32,
    /// Elevation above the XZ plane.
    pub pitch: f32,
    pub fov_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub damping: bool,
    /// Share of the pending motion applied per 60 Hz frame.
    pub damping_factor: f32,
    /// Radians per pixel dragged.
    pub sensitivity: f32,
    pub min_radius: f32,
    pub max_radius: f32,
    pending_yaw: f32,
    pending_pitch: f32,
    /// Log of the pending radius scale.
    pending_zoom: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::from_config(&CameraConfig::default(), 16.0 / 9.0)
    }
}

impl OrbitCamera {
    pub fn from_config(config: &CameraConfig, aspect: f32) -> Self {
        let offset = config.position - config.target;
        let radius = offset.length().max(1e-3);
        Self {
            target: config.target,
            radius,
            yaw: offset.x.atan2(offset.z),
            pitch: (offset.y / radius).clamp(-1.0, 1.0).asin(),
            fov_degrees: config.fov_degrees,
            aspect,
            near: config.near,
            far: config.far,
            damping: config.damping,
            damping_factor: config.damping_factor.clamp(0.0, 1.0),
            sensitivity: 0.005,
            min_radius: 0.5,
            max_radius: config.far * 0.5,
            pending_yaw: 0.0,
            pending_pitch: 0.0,
            pending_zoom: 0.0,
        }
    }

    /// Camera position in world space.
    pub fn eye(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        self.target + Vec3::new(sy * cp, sp, cy * cp) * self.radius
    }

    /// Queue a rotation from a mouse drag, in pixels.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.pending_yaw -= dx * self.sensitivity;
        self.pending_pitch += dy * self.sensitivity;
    }

    /// Queue a zoom from scroll lines; positive moves closer.
    pub fn zoom(&mut self, lines: f32) {
        self.pending_zoom -= lines * 0.1;
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    /// Whether pending input is still being applied.
    pub fn is_moving(&self) -> bool {
        self.pending_yaw.abs() > 1e-5 || self.pending_pitch.abs() > 1e-5 || self.pending_zoom.abs() > 1e-5
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.target, Vec3::Y)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.view().view_projection()
    }

    /// Share of the pending motion to apply this update.
    fn step_share(&self, dt: f32) -> f32 {
        if !self.damping {
            return 1.0;
        }
        1.0 - (1.0 - self.damping_factor).powf(dt.max(0.0) * 60.0)
    }
}

impl Controls for OrbitCamera {
    fn update(&mut self, dt: f32) {
        let share = self.step_share(dt);
        let (yaw, pitch, zoom) = (
            self.pending_yaw * share,
            self.pending_pitch * share,
            self.pending_zoom * share,
        );
        self.pending_yaw -= yaw;
        self.pending_pitch -= pitch;
        self.pending_zoom -= zoom;

        self.yaw += yaw;
        self.pitch = (self.pitch + pitch).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.radius = (self.radius * zoom.exp()).clamp(self.min_radius, self.max_radius.max(self.min_radius));

        if !self.is_moving() {
            self.pending_yaw = 0.0;
            self.pending_pitch = 0.0;
            self.pending_zoom = 0.0;
        }
    }

    fn view(&self) -> RenderView {
        RenderView {
            eye: self.eye(),
            target: self.target,
            fov_degrees: self.fov_degrees,
            aspect: self.aspect,
            near: self.near,
            far: self.far,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_configured_position() {
        let cam = OrbitCamera::default();
        assert!(cam.eye().abs_diff_eq(Vec3::new(2.0, 2.0, 6.0), 1e-4));
        let vp = cam.view_projection();
        assert!(!vp.col(0).x.is_nan());
    }

    #[test]
    fn undamped_rotation_applies_at_once() {
        let mut cam = OrbitCamera::from_config(
            &CameraConfig {
                damping: false,
                ..CameraConfig::default()
            },
            1.0,
        );
        let start = cam.yaw;
        cam.rotate(-100.0, 0.0);
        cam.update(1.0 / 60.0);
        assert!((cam.yaw - start - 0.5).abs() < 1e-5);
        assert!(!cam.is_moving());
    }

    #[test]
    fn damped_rotation_eases_out() {
        let mut cam = OrbitCamera::default();
        let start = cam.yaw;
        cam.rotate(-100.0, 0.0);
        cam.update(1.0 / 60.0);
        let first = cam.yaw - start;
        assert!(first > 0.0 && first < 0.5);
        assert!(cam.is_moving());

        for _ in 0..600 {
            cam.update(1.0 / 60.0);
        }
        assert!((cam.yaw - start - 0.5).abs() < 1e-3);
    }

    #[test]
    fn no_time_no_motion() {
        let mut cam = OrbitCamera::default();
        let eye = cam.eye();
        cam.rotate(50.0, 50.0);
        cam.update(0.0);
        assert!(cam.eye().abs_diff_eq(eye, 1e-6));
    }

    #[test]
    fn pitch_is_clamped_and_radius_bounded() {
        let mut cam = OrbitCamera::from_config(
            &CameraConfig {
                damping: false,
                ..CameraConfig::default()
            },
            1.0,
        );
        cam.rotate(0.0, 100_000.0);
        cam.update(0.016);
        assert!(cam.pitch <= PITCH_LIMIT);

        cam.zoom(1000.0);
        cam.update(0.016);
        assert!((cam.radius - cam.min_radius).abs() < 1e-5);
    }

    #[test]
    fn view_tracks_aspect() {
        let mut cam = OrbitCamera::default();
        cam.set_aspect(800, 400);
        assert_eq!(cam.view().aspect, 2.0);
        cam.set_aspect(0, 0);
        assert_eq!(cam.view().aspect, 1.0);
    }
}
