use std::collections::BTreeMap;
use std::path::Path;

use perfscene_common::{GeometryHandle, MaterialHandle};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::AssetError;
use crate::mesh::GeometryDesc;

/// Material descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MaterialDesc {
    /// Lit base colour, receives the directional light and shadows.
    Standard { color: [f32; 4] },
    /// Unlit, shades by surface normal.
    Normal,
    /// Unlit vertex-displaced surface. `strength` is baked into the pipeline
    /// as a shader constant, so each distinct value gets its own pipeline.
    Displaced {
        strength: f32,
        precision: ShaderPrecision,
    },
}

/// Arithmetic precision of the displacement shader's height function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderPrecision {
    High,
    Medium,
    #[default]
    Low,
}

impl ShaderPrecision {
    /// Step the height is rounded to; zero keeps full f32 precision.
    /// Medium and low follow the mantissa widths of GLSL `mediump` and `lowp`.
    pub fn quantum(&self) -> f32 {
        match self {
            Self::High => 0.0,
            Self::Medium => 1.0 / 1024.0,
            Self::Low => 1.0 / 256.0,
        }
    }
}

impl MaterialDesc {
    pub fn displaced(strength: f32) -> Self {
        Self::Displaced {
            strength,
            precision: ShaderPrecision::default(),
        }
    }

    pub fn validate(&self) -> Result<(), AssetError> {
        match self {
            Self::Standard { color } if !color.iter().all(|c| c.is_finite()) => {
                Err(AssetError::InvalidMaterial(format!("{self:?}")))
            }
            Self::Displaced { strength, .. } if !strength.is_finite() => {
                Err(AssetError::InvalidMaterial(format!("{self:?}")))
            }
            _ => Ok(()),
        }
    }
}

impl Default for MaterialDesc {
    fn default() -> Self {
        Self::Standard {
            color: [0.8, 0.8, 0.8, 1.0],
        }
    }
}

/// A registered geometry plus the data the planner needs without rebuilding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryEntry {
    pub desc: GeometryDesc,
    pub triangles: u64,
    content_hash: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MaterialEntry {
    desc: MaterialDesc,
    content_hash: u64,
}

/// Registry of geometries and materials referenced by handle.
///
/// `add_*` always allocates a fresh handle, even for a descriptor that is
/// already registered. `intern_*` returns the existing handle for an identical
/// descriptor, keyed by a SHA-256 content hash.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceRegistry {
    geometries: BTreeMap<GeometryHandle, GeometryEntry>,
    materials: BTreeMap<MaterialHandle, MaterialEntry>,
    next_geometry: u64,
    next_material: u64,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a geometry under a new handle.
    pub fn add_geometry(&mut self, desc: GeometryDesc) -> Result<GeometryHandle, AssetError> {
        desc.validate()?;
        let content_hash = content_hash(&desc)?;
        Ok(self.insert_geometry(desc, content_hash))
    }

    /// Register a geometry, reusing the handle of an identical one if present.
    pub fn intern_geometry(&mut self, desc: GeometryDesc) -> Result<GeometryHandle, AssetError> {
        desc.validate()?;
        let hash = content_hash(&desc)?;
        let existing = self
            .geometries
            .iter()
            .find(|(_, e)| e.content_hash == hash && e.desc == desc)
            .map(|(h, _)| *h);
        Ok(match existing {
            Some(handle) => handle,
            None => self.insert_geometry(desc, hash),
        })
    }

    /// Register a material under a new handle.
    pub fn add_material(&mut self, desc: MaterialDesc) -> Result<MaterialHandle, AssetError> {
        desc.validate()?;
        let content_hash = content_hash(&desc)?;
        Ok(self.insert_material(desc, content_hash))
    }

    /// Register a material, reusing the handle of an identical one if present.
    pub fn intern_material(&mut self, desc: MaterialDesc) -> Result<MaterialHandle, AssetError> {
        desc.validate()?;
        let hash = content_hash(&desc)?;
        let existing = self
            .materials
            .iter()
            .find(|(_, e)| e.content_hash == hash && e.desc == desc)
            .map(|(h, _)| *h);
        Ok(match existing {
            Some(handle) => handle,
            None => self.insert_material(desc, hash),
        })
    }

    pub fn geometry(&self, handle: GeometryHandle) -> Option<&GeometryEntry> {
        self.geometries.get(&handle)
    }

    pub fn material(&self, handle: MaterialHandle) -> Option<&MaterialDesc> {
        self.materials.get(&handle).map(|e| &e.desc)
    }

    /// Triangle count of a registered geometry.
    pub fn triangles(&self, handle: GeometryHandle) -> Result<u64, AssetError> {
        self.geometries
            .get(&handle)
            .map(|e| e.triangles)
            .ok_or(AssetError::UnknownGeometry(handle))
    }

    pub fn contains_geometry(&self, handle: GeometryHandle) -> bool {
        self.geometries.contains_key(&handle)
    }

    pub fn contains_material(&self, handle: MaterialHandle) -> bool {
        self.materials.contains_key(&handle)
    }

    /// Release a geometry. The handle is never reused.
    pub fn dispose_geometry(&mut self, handle: GeometryHandle) -> Result<GeometryDesc, AssetError> {
        let entry = self
            .geometries
            .remove(&handle)
            .ok_or(AssetError::UnknownGeometry(handle))?;
        tracing::debug!(?handle, "geometry disposed");
        Ok(entry.desc)
    }

    /// Release a material. The handle is never reused.
    pub fn dispose_material(&mut self, handle: MaterialHandle) -> Result<MaterialDesc, AssetError> {
        let entry = self
            .materials
            .remove(&handle)
            .ok_or(AssetError::UnknownMaterial(handle))?;
        tracing::debug!(?handle, "material disposed");
        Ok(entry.desc)
    }

    pub fn geometry_count(&self) -> usize {
        self.geometries.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn geometries(&self) -> impl Iterator<Item = (GeometryHandle, &GeometryEntry)> {
        self.geometries.iter().map(|(h, e)| (*h, e))
    }

    /// Save the registry to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AssetError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Load a registry from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let file = std::fs::File::open(path)?;
        let registry: Self = serde_json::from_reader(file)?;
        Ok(registry)
    }

    fn insert_geometry(&mut self, desc: GeometryDesc, content_hash: u64) -> GeometryHandle {
        let handle = GeometryHandle(self.next_geometry);
        self.next_geometry += 1;
        let triangles = desc.triangle_count();
        self.geometries.insert(
            handle,
            GeometryEntry {
                desc,
                triangles,
                content_hash,
            },
        );
        handle
    }

    fn insert_material(&mut self, desc: MaterialDesc, content_hash: u64) -> MaterialHandle {
        let handle = MaterialHandle(self.next_material);
        self.next_material += 1;
        self.materials
            .insert(handle, MaterialEntry { desc, content_hash });
        handle
    }
}

fn content_hash<T: Serialize>(value: &T) -> Result<u64, AssetError> {
    let bytes = serde_json::to_vec(value)?;
    let digest = Sha256::digest(&bytes);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    Ok(u64::from_le_bytes(head))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_always_allocates() {
        let mut reg = ResourceRegistry::new();
        let a = reg.add_geometry(GeometryDesc::cube(0.5)).unwrap();
        let b = reg.add_geometry(GeometryDesc::cube(0.5)).unwrap();
        assert_ne!(a, b);
        assert_eq!(reg.geometry_count(), 2);
    }

    #[test]
    fn intern_dedups_identical_descriptors() {
        let mut reg = ResourceRegistry::new();
        let a = reg.intern_geometry(GeometryDesc::cube(0.5)).unwrap();
        let b = reg.intern_geometry(GeometryDesc::cube(0.5)).unwrap();
        let c = reg.intern_geometry(GeometryDesc::cube(1.0)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(reg.geometry_count(), 2);

        let m1 = reg.intern_material(MaterialDesc::Normal).unwrap();
        let m2 = reg.intern_material(MaterialDesc::Normal).unwrap();
        assert_eq!(m1, m2);
        assert_eq!(reg.material_count(), 1);
    }

    #[test]
    fn triangles_are_recorded() {
        let mut reg = ResourceRegistry::new();
        let h = reg.add_geometry(GeometryDesc::cube(2.0)).unwrap();
        assert_eq!(reg.triangles(h).unwrap(), 12);
    }

    #[test]
    fn dispose_releases_and_never_reuses_handle() {
        let mut reg = ResourceRegistry::new();
        let h = reg.add_geometry(GeometryDesc::cube(0.5)).unwrap();
        reg.dispose_geometry(h).unwrap();
        assert!(!reg.contains_geometry(h));
        assert!(matches!(
            reg.dispose_geometry(h),
            Err(AssetError::UnknownGeometry(_))
        ));

        let next = reg.add_geometry(GeometryDesc::cube(0.5)).unwrap();
        assert_ne!(h, next);
    }

    #[test]
    fn invalid_geometry_not_registered() {
        let mut reg = ResourceRegistry::new();
        assert!(reg.add_geometry(GeometryDesc::cube(-1.0)).is_err());
        assert_eq!(reg.geometry_count(), 0);
    }

    #[test]
    fn displaced_materials_intern_by_strength_and_precision() {
        let mut reg = ResourceRegistry::new();
        let a = reg.intern_material(MaterialDesc::displaced(1.5)).unwrap();
        let b = reg.intern_material(MaterialDesc::displaced(1.5)).unwrap();
        let c = reg
            .intern_material(MaterialDesc::Displaced {
                strength: 1.5,
                precision: ShaderPrecision::High,
            })
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(matches!(
            reg.add_material(MaterialDesc::displaced(f32::NAN)),
            Err(AssetError::InvalidMaterial(_))
        ));
        assert_eq!(reg.material_count(), 2);
    }

    #[test]
    fn precision_quantum_coarsens_with_lower_precision() {
        assert_eq!(ShaderPrecision::High.quantum(), 0.0);
        assert!(ShaderPrecision::Medium.quantum() < ShaderPrecision::Low.quantum());
        assert_eq!(ShaderPrecision::default(), ShaderPrecision::Low);
    }

    #[test]
    fn save_and_load() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut reg = ResourceRegistry::new();
        let g = reg.add_geometry(GeometryDesc::cube(0.5)).unwrap();
        reg.add_material(MaterialDesc::Normal).unwrap();
        reg.save(tmp.path()).unwrap();

        let mut loaded = ResourceRegistry::load(tmp.path()).unwrap();
        assert_eq!(loaded.geometry_count(), 1);
        assert_eq!(loaded.material_count(), 1);
        // Interning still finds the entry after a reload.
        let again = loaded.intern_geometry(GeometryDesc::cube(0.5)).unwrap();
        assert_eq!(again, g);
    }
}
