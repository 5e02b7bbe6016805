use std::path::Path;

use glam::Vec3;
use perfscene_assets::ShaderPrecision;
use serde::{Deserialize, Serialize};

use crate::SceneError;
use crate::light::ShadowSettings;
use crate::setup::DrawStrategy;

/// Demo configuration, loadable from YAML. Every field has a default, so a
/// partial file (or none at all) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub strategy: DrawStrategy,
    pub batch: BatchConfig,
    pub camera: CameraConfig,
    pub renderer: RendererConfig,
    pub shadows: ShadowConfig,
    /// Add the cube, torus knot, sphere and floor used to compare shadow settings.
    pub show_reference_meshes: bool,
    pub displaced_plane: DisplacedPlaneConfig,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            strategy: DrawStrategy::Instanced,
            batch: BatchConfig::default(),
            camera: CameraConfig::default(),
            renderer: RendererConfig::default(),
            shadows: ShadowConfig::default(),
            show_reference_meshes: false,
            displaced_plane: DisplacedPlaneConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub count: usize,
    /// Side of the cube, centred on the origin, that instances are scattered in.
    pub extent: f32,
    /// Edge length of each instanced box.
    pub instance_size: f32,
    pub seed: Option<u64>,
    /// Radians per second each instance spins about Y. Zero keeps the buffer static.
    pub spin_rate: f32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            count: 50,
            extent: 10.0,
            instance_size: 0.5,
            seed: None,
            spin_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: Vec3,
    pub target: Vec3,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub damping: bool,
    pub damping_factor: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: Vec3::new(2.0, 2.0, 6.0),
            target: Vec3::ZERO,
            fov_degrees: 75.0,
            near: 0.1,
            far: 100.0,
            damping: true,
            damping_factor: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Disable to measure uncapped frame rates.
    pub vsync: bool,
    pub high_performance: bool,
    pub clear_color: [f32; 4],
    /// Samples per pixel for the main pass; 1 disables antialiasing.
    pub msaa_samples: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            vsync: true,
            high_performance: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            msaa_samples: 4,
        }
    }
}

/// Finely subdivided floor plane lifted by a vertex shader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplacedPlaneConfig {
    pub enabled: bool,
    pub size: f32,
    /// Quads per side.
    pub segments: u32,
    /// Compiled into the shader as a pipeline constant.
    pub strength: f32,
    pub precision: ShaderPrecision,
}

impl Default for DisplacedPlaneConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            size: 10.0,
            segments: 256,
            strength: 1.5,
            precision: ShaderPrecision::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub settings: ShadowSettings,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            settings: ShadowSettings::default(),
        }
    }
}

impl DemoConfig {
    pub fn from_yaml(text: &str) -> Result<Self, SceneError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn to_yaml(&self) -> Result<String, SceneError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_yaml(&text)?;
        tracing::info!(path = %path.as_ref().display(), "config loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_demo() {
        let c = DemoConfig::default();
        assert_eq!(c.batch.count, 50);
        assert_eq!(c.batch.extent, 10.0);
        assert_eq!(c.camera.position, Vec3::new(2.0, 2.0, 6.0));
        assert_eq!(c.camera.fov_degrees, 75.0);
        assert_eq!(c.shadows.settings.map_size, 1024);
        assert_eq!(c.strategy, DrawStrategy::Instanced);
        assert_eq!(c.renderer.msaa_samples, 4);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let c = DemoConfig::from_yaml(
            "strategy: merged\nbatch:\n  count: 200\n  seed: 9\nshadows:\n  auto_update: false\n  map_size: 512\n",
        )
        .unwrap();
        assert_eq!(c.strategy, DrawStrategy::Merged);
        assert_eq!(c.batch.count, 200);
        assert_eq!(c.batch.seed, Some(9));
        assert_eq!(c.batch.extent, 10.0);
        assert!(c.shadows.enabled);
        assert!(!c.shadows.settings.auto_update);
        assert_eq!(c.shadows.settings.map_size, 512);
        assert_eq!(c.shadows.settings.far, 10.0);
    }

    #[test]
    fn displaced_plane_from_yaml() {
        let c = DemoConfig::from_yaml(
            "displaced_plane:\n  enabled: true\n  strength: 2.5\n  precision: high\n",
        )
        .unwrap();
        assert!(c.displaced_plane.enabled);
        assert_eq!(c.displaced_plane.strength, 2.5);
        assert_eq!(c.displaced_plane.precision, ShaderPrecision::High);
        assert_eq!(c.displaced_plane.segments, 256);
        assert!(!DemoConfig::default().displaced_plane.enabled);
    }

    #[test]
    fn empty_yaml_is_default() {
        let c = DemoConfig::from_yaml("{}").unwrap();
        assert_eq!(c, DemoConfig::default());
    }

    #[test]
    fn yaml_round_trip_through_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut c = DemoConfig::default();
        c.renderer.vsync = false;
        c.show_reference_meshes = true;
        std::fs::write(tmp.path(), c.to_yaml().unwrap()).unwrap();

        let loaded = DemoConfig::load(tmp.path()).unwrap();
        assert_eq!(loaded, c);
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let err = DemoConfig::from_yaml("batch: [1, 2").unwrap_err();
        assert!(matches!(err, SceneError::Config(_)));
    }
}
