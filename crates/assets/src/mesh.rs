use std::f32::consts::{PI, TAU};

use glam::{Mat3, Mat4, Vec3};
use perfscene_common::Transform;
use serde::{Deserialize, Serialize};

use crate::AssetError;

/// Geometry descriptor. The renderer turns it into vertex data with [`build_mesh`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeometryDesc {
    Box {
        width: f32,
        height: f32,
        depth: f32,
    },
    Sphere {
        radius: f32,
        width_segments: u32,
        height_segments: u32,
    },
    /// Plane in the local XY plane, facing +Z.
    Plane {
        width: f32,
        height: f32,
        width_segments: u32,
        height_segments: u32,
    },
    TorusKnot {
        radius: f32,
        tube: f32,
        tubular_segments: u32,
        radial_segments: u32,
        p: u32,
        q: u32,
    },
    /// Several geometries baked into a single vertex/index set.
    Merged { parts: Vec<GeometryPart> },
}

/// One input of a merged geometry: the source geometry and the transform
/// applied to its vertices before merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryPart {
    pub geometry: GeometryDesc,
    pub transform: Transform,
}

impl GeometryDesc {
    pub fn cube(size: f32) -> Self {
        Self::Box {
            width: size,
            height: size,
            depth: size,
        }
    }

    /// Reject non-finite or non-positive sizes and zero segment counts.
    pub fn validate(&self) -> Result<(), AssetError> {
        let sizes_ok = |sizes: &[f32]| sizes.iter().all(|s| s.is_finite() && *s > 0.0);
        let ok = match self {
            Self::Box {
                width,
                height,
                depth,
            } => sizes_ok(&[*width, *height, *depth]),
            Self::Sphere {
                radius,
                width_segments,
                height_segments,
            } => sizes_ok(&[*radius]) && *width_segments >= 3 && *height_segments >= 2,
            Self::Plane {
                width,
                height,
                width_segments,
                height_segments,
            } => sizes_ok(&[*width, *height]) && *width_segments >= 1 && *height_segments >= 1,
            Self::TorusKnot {
                radius,
                tube,
                tubular_segments,
                radial_segments,
                p,
                q,
            } => {
                sizes_ok(&[*radius, *tube])
                    && *tubular_segments >= 3
                    && *radial_segments >= 3
                    && *p >= 1
                    && *q >= 1
            }
            Self::Merged { parts } => {
                for part in parts {
                    part.geometry.validate()?;
                }
                return Ok(());
            }
        };
        if ok {
            Ok(())
        } else {
            Err(AssetError::InvalidGeometry(format!("{self:?}")))
        }
    }

    /// Triangle count of the generated mesh, computed without building it.
    pub fn triangle_count(&self) -> u64 {
        match self {
            Self::Box { .. } => 12,
            Self::Sphere {
                width_segments,
                height_segments,
                ..
            } => 2 * *width_segments as u64 * (*height_segments as u64).saturating_sub(1),
            Self::Plane {
                width_segments,
                height_segments,
                ..
            } => 2 * *width_segments as u64 * *height_segments as u64,
            Self::TorusKnot {
                tubular_segments,
                radial_segments,
                ..
            } => 2 * *tubular_segments as u64 * *radial_segments as u64,
            Self::Merged { parts } => parts.iter().map(|p| p.geometry.triangle_count()).sum(),
        }
    }
}

/// CPU-side mesh: positions, normals and a triangle list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> u64 {
        (self.indices.len() / 3) as u64
    }

    /// Bake a transform into the vertices. Normals use the inverse-transpose.
    pub fn transformed(mut self, matrix: Mat4) -> Self {
        let normal_matrix = Mat3::from_mat4(matrix).inverse().transpose();
        for p in &mut self.positions {
            *p = matrix.transform_point3(Vec3::from(*p)).to_array();
        }
        for n in &mut self.normals {
            *n = (normal_matrix * Vec3::from(*n)).normalize_or_zero().to_array();
        }
        self
    }

    /// Concatenate meshes, offsetting each part's indices.
    pub fn merge(parts: impl IntoIterator<Item = MeshData>) -> Self {
        let mut out = MeshData::default();
        for part in parts {
            let base = out.positions.len() as u32;
            out.positions.extend(part.positions);
            out.normals.extend(part.normals);
            out.indices.extend(part.indices.into_iter().map(|i| i + base));
        }
        out
    }
}

/// Generate the vertex data for a geometry descriptor.
pub fn build_mesh(desc: &GeometryDesc) -> Result<MeshData, AssetError> {
    desc.validate()?;
    let mesh = match desc {
        GeometryDesc::Box {
            width,
            height,
            depth,
        } => box_mesh(*width, *height, *depth),
        GeometryDesc::Sphere {
            radius,
            width_segments,
            height_segments,
        } => sphere_mesh(*radius, *width_segments, *height_segments),
        GeometryDesc::Plane {
            width,
            height,
            width_segments,
            height_segments,
        } => plane_mesh(*width, *height, *width_segments, *height_segments),
        GeometryDesc::TorusKnot {
            radius,
            tube,
            tubular_segments,
            radial_segments,
            p,
            q,
        } => torus_knot_mesh(
            *radius,
            *tube,
            *tubular_segments,
            *radial_segments,
            *p as f32,
            *q as f32,
        ),
        GeometryDesc::Merged { parts } => {
            let mut built = Vec::with_capacity(parts.len());
            for part in parts {
                built.push(build_mesh(&part.geometry)?.transformed(part.transform.matrix()));
            }
            MeshData::merge(built)
        }
    };
    Ok(mesh)
}

fn box_mesh(width: f32, height: f32, depth: f32) -> MeshData {
    let (x, y, z) = (width * 0.5, height * 0.5, depth * 0.5);
    #[rustfmt::skip]
    let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
        ([0.0, 0.0, 1.0],  [[-x, -y,  z], [ x, -y,  z], [ x,  y,  z], [-x,  y,  z]]),
        ([0.0, 0.0, -1.0], [[ x, -y, -z], [-x, -y, -z], [-x,  y, -z], [ x,  y, -z]]),
        ([1.0, 0.0, 0.0],  [[ x, -y,  z], [ x, -y, -z], [ x,  y, -z], [ x,  y,  z]]),
        ([-1.0, 0.0, 0.0], [[-x, -y, -z], [-x, -y,  z], [-x,  y,  z], [-x,  y, -z]]),
        ([0.0, 1.0, 0.0],  [[-x,  y,  z], [ x,  y,  z], [ x,  y, -z], [-x,  y, -z]]),
        ([0.0, -1.0, 0.0], [[-x, -y, -z], [ x, -y, -z], [ x, -y,  z], [-x, -y,  z]]),
    ];

    let mut mesh = MeshData::default();
    for (normal, corners) in faces {
        let base = mesh.positions.len() as u32;
        for corner in corners {
            mesh.positions.push(corner);
            mesh.normals.push(normal);
        }
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }
    mesh
}

fn plane_mesh(width: f32, height: f32, width_segments: u32, height_segments: u32) -> MeshData {
    let mut mesh = MeshData::default();
    let columns = width_segments + 1;

    for iy in 0..=height_segments {
        let y = height * 0.5 - iy as f32 * height / height_segments as f32;
        for ix in 0..=width_segments {
            let x = ix as f32 * width / width_segments as f32 - width * 0.5;
            mesh.positions.push([x, y, 0.0]);
            mesh.normals.push([0.0, 0.0, 1.0]);
        }
    }

    for iy in 0..height_segments {
        for ix in 0..width_segments {
            let a = ix + columns * iy;
            let b = ix + columns * (iy + 1);
            let c = ix + 1 + columns * (iy + 1);
            let d = ix + 1 + columns * iy;
            mesh.indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }
    mesh
}

fn sphere_mesh(radius: f32, width_segments: u32, height_segments: u32) -> MeshData {
    let mut mesh = MeshData::default();
    let columns = width_segments + 1;

    for iy in 0..=height_segments {
        let v = iy as f32 / height_segments as f32;
        let theta = v * PI;
        for ix in 0..=width_segments {
            let u = ix as f32 / width_segments as f32;
            let phi = u * TAU;
            let p = Vec3::new(
                -radius * phi.cos() * theta.sin(),
                radius * theta.cos(),
                radius * phi.sin() * theta.sin(),
            );
            mesh.positions.push(p.to_array());
            mesh.normals.push(p.normalize_or_zero().to_array());
        }
    }

    // The poles collapse to a point, so the first and last rows emit one
    // triangle per quad instead of two.
    for iy in 0..height_segments {
        for ix in 0..width_segments {
            let a = iy * columns + ix + 1;
            let b = iy * columns + ix;
            let c = (iy + 1) * columns + ix;
            let d = (iy + 1) * columns + ix + 1;
            if iy != 0 {
                mesh.indices.extend_from_slice(&[a, b, d]);
            }
            if iy != height_segments - 1 {
                mesh.indices.extend_from_slice(&[b, c, d]);
            }
        }
    }
    mesh
}

fn torus_knot_mesh(
    radius: f32,
    tube: f32,
    tubular_segments: u32,
    radial_segments: u32,
    p: f32,
    q: f32,
) -> MeshData {
    let curve = |u: f32| {
        let qu_over_p = q / p * u;
        let cs = qu_over_p.cos();
        Vec3::new(
            radius * (2.0 + cs) * 0.5 * u.cos(),
            radius * (2.0 + cs) * 0.5 * u.sin(),
            radius * qu_over_p.sin() * 0.5,
        )
    };

    let mut mesh = MeshData::default();
    for i in 0..=tubular_segments {
        let u = i as f32 / tubular_segments as f32 * p * TAU;
        let p1 = curve(u);
        let p2 = curve(u + 0.01);

        // Frenet-like frame along the curve.
        let t = p2 - p1;
        let mut n = p2 + p1;
        let b = t.cross(n).normalize_or_zero();
        n = b.cross(t).normalize_or_zero();

        for j in 0..=radial_segments {
            let v = j as f32 / radial_segments as f32 * TAU;
            let cx = -tube * v.cos();
            let cy = tube * v.sin();
            let vertex = p1 + n * cx + b * cy;
            mesh.positions.push(vertex.to_array());
            mesh.normals.push((vertex - p1).normalize_or_zero().to_array());
        }
    }

    let ring = radial_segments + 1;
    for j in 1..=tubular_segments {
        for i in 1..=radial_segments {
            let a = ring * (j - 1) + (i - 1);
            let b = ring * j + (i - 1);
            let c = ring * j + i;
            let d = ring * (j - 1) + i;
            mesh.indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn torus_knot() -> GeometryDesc {
        GeometryDesc::TorusKnot {
            radius: 1.0,
            tube: 0.4,
            tubular_segments: 128,
            radial_segments: 32,
            p: 2,
            q: 3,
        }
    }

    #[test]
    fn box_has_24_vertices_and_12_triangles() {
        let mesh = build_mesh(&GeometryDesc::cube(0.5)).unwrap();
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.triangle_count(), 12);
        for p in &mesh.positions {
            assert!(p.iter().all(|c| c.abs() == 0.25));
        }
    }

    #[test]
    fn triangle_counts_match_generated_meshes() {
        let descs = [
            GeometryDesc::cube(2.0),
            GeometryDesc::Sphere {
                radius: 1.0,
                width_segments: 32,
                height_segments: 32,
            },
            GeometryDesc::Plane {
                width: 10.0,
                height: 10.0,
                width_segments: 4,
                height_segments: 3,
            },
            torus_knot(),
        ];
        for desc in &descs {
            let mesh = build_mesh(desc).unwrap();
            assert_eq!(mesh.triangle_count(), desc.triangle_count(), "{desc:?}");
            assert_eq!(mesh.positions.len(), mesh.normals.len());
            let max = mesh.vertex_count() as u32;
            assert!(mesh.indices.iter().all(|i| *i < max));
        }
    }

    #[test]
    fn torus_knot_default_has_8192_triangles() {
        assert_eq!(torus_knot().triangle_count(), 8192);
        let mesh = build_mesh(&torus_knot()).unwrap();
        assert_eq!(mesh.vertex_count(), 129 * 33);
    }

    #[test]
    fn displacement_plane_is_256_by_256_quads() {
        let desc = GeometryDesc::Plane {
            width: 10.0,
            height: 10.0,
            width_segments: 256,
            height_segments: 256,
        };
        assert_eq!(desc.triangle_count(), 256 * 256 * 2);
        let mesh = build_mesh(&desc).unwrap();
        assert_eq!(mesh.triangle_count(), 256 * 256 * 2);
        assert_eq!(mesh.vertex_count(), 257 * 257);
    }

    #[test]
    fn sphere_normals_are_unit_length() {
        let mesh = build_mesh(&GeometryDesc::Sphere {
            radius: 2.0,
            width_segments: 8,
            height_segments: 6,
        })
        .unwrap();
        for n in &mesh.normals {
            assert!((Vec3::from(*n).length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn merged_geometry_sums_parts_and_offsets_indices() {
        let parts = (0..3)
            .map(|i| GeometryPart {
                geometry: GeometryDesc::cube(0.5),
                transform: Transform::from_position(Vec3::new(i as f32 * 2.0, 0.0, 0.0))
                    .with_rotation(Quat::from_rotation_y(0.3 * i as f32)),
            })
            .collect();
        let merged = GeometryDesc::Merged { parts };
        let mesh = build_mesh(&merged).unwrap();

        assert_eq!(merged.triangle_count(), 36);
        assert_eq!(mesh.triangle_count(), 36);
        assert_eq!(mesh.vertex_count(), 72);
        assert_eq!(*mesh.indices.iter().max().unwrap(), 71);
        // Third cube is centered at x = 4.
        let cx: f32 = mesh.positions[48..].iter().map(|p| p[0]).sum::<f32>() / 24.0;
        assert!((cx - 4.0).abs() < 1e-4);
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        let bad = [
            GeometryDesc::cube(0.0),
            GeometryDesc::Box {
                width: f32::NAN,
                height: 1.0,
                depth: 1.0,
            },
            GeometryDesc::Plane {
                width: 1.0,
                height: 1.0,
                width_segments: 0,
                height_segments: 1,
            },
        ];
        for desc in &bad {
            assert!(matches!(
                build_mesh(desc),
                Err(AssetError::InvalidGeometry(_))
            ));
        }
    }

    #[test]
    fn transformed_rotates_normals() {
        let mesh = build_mesh(&GeometryDesc::Plane {
            width: 1.0,
            height: 1.0,
            width_segments: 1,
            height_segments: 1,
        })
        .unwrap()
        .transformed(Mat4::from_rotation_x(-PI * 0.5));
        let n = Vec3::from(mesh.normals[0]);
        assert!((n - Vec3::Y).length() < 1e-5);
    }
}
