use std::f32::consts::PI;
use std::fmt;
use std::str::FromStr;

use glam::{Quat, Vec3};
use perfscene_assets::{GeometryDesc, GeometryPart, MaterialDesc};
use perfscene_common::{BatchId, ObjectId, Transform};
use perfscene_instancing::{BatchBuilder, InstanceTransform, ScatterPolicy};
use serde::{Deserialize, Serialize};

use crate::SceneError;
use crate::config::{BatchConfig, DemoConfig, DisplacedPlaneConfig};
use crate::light::DirectionalLight;
use crate::scene::{Scene, SceneObject};

/// How N identical boxes are put into the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawStrategy {
    /// One geometry, one material and one mesh per box: N draws.
    Separate,
    /// One shared geometry and material, still one mesh per box: N draws.
    Shared,
    /// All boxes baked into one geometry: 1 draw, boxes can no longer move.
    Merged,
    /// One instance batch: 1 draw, boxes move by rewriting their transforms.
    #[default]
    Instanced,
}

impl DrawStrategy {
    pub const ALL: [DrawStrategy; 4] = [
        DrawStrategy::Separate,
        DrawStrategy::Shared,
        DrawStrategy::Merged,
        DrawStrategy::Instanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Separate => "separate",
            Self::Shared => "shared",
            Self::Merged => "merged",
            Self::Instanced => "instanced",
        }
    }
}

impl fmt::Display for DrawStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DrawStrategy {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "naive" {
            return Ok(Self::Separate);
        }
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| SceneError::UnknownStrategy(s.to_string()))
    }
}

/// What a strategy added to the scene.
#[derive(Debug, Clone, Default)]
pub struct Population {
    pub objects: Vec<ObjectId>,
    pub batch: Option<BatchId>,
}

/// Add `config.count` boxes to the scene using the given strategy.
///
/// Every strategy scatters the boxes with the same policy and seed, so the
/// resulting layouts are identical and only the draw cost differs.
pub fn populate(
    scene: &mut Scene,
    strategy: DrawStrategy,
    config: &BatchConfig,
) -> Result<Population, SceneError> {
    let policy = ScatterPolicy::cube(config.extent);
    let builder = BatchBuilder::new(config.count)
        .policy(policy)
        .maybe_seed(config.seed);
    let box_geometry = GeometryDesc::cube(config.instance_size);
    let mut population = Population::default();

    match strategy {
        DrawStrategy::Separate => {
            for (i, t) in builder.generate()?.into_iter().enumerate() {
                let resources = scene.resources_mut();
                let geometry = resources.add_geometry(box_geometry.clone())?;
                let material = resources.add_material(MaterialDesc::Normal)?;
                let object = SceneObject::mesh(format!("box_{i}"), geometry, material)
                    .with_transform(to_transform(&t));
                population.objects.push(scene.add(object)?);
            }
        }
        DrawStrategy::Shared => {
            let transforms = builder.generate()?;
            let resources = scene.resources_mut();
            let geometry = resources.intern_geometry(box_geometry)?;
            let material = resources.intern_material(MaterialDesc::Normal)?;
            for (i, t) in transforms.iter().enumerate() {
                let object = SceneObject::mesh(format!("box_{i}"), geometry, material)
                    .with_transform(to_transform(t));
                population.objects.push(scene.add(object)?);
            }
        }
        DrawStrategy::Merged => {
            let parts: Vec<GeometryPart> = builder
                .generate()?
                .iter()
                .map(|t| GeometryPart {
                    geometry: box_geometry.clone(),
                    transform: to_transform(t),
                })
                .collect();
            if !parts.is_empty() {
                let resources = scene.resources_mut();
                let geometry = resources.add_geometry(GeometryDesc::Merged { parts })?;
                let material = resources.intern_material(MaterialDesc::Normal)?;
                let object = SceneObject::mesh("merged_boxes", geometry, material);
                population.objects.push(scene.add(object)?);
            }
        }
        DrawStrategy::Instanced => {
            let resources = scene.resources_mut();
            let geometry = resources.intern_geometry(box_geometry)?;
            let material = resources.intern_material(MaterialDesc::Normal)?;
            let batch = builder.build(geometry, material)?.with_name("boxes");
            population.batch = Some(scene.add_batch(batch)?);
        }
    }

    tracing::info!(
        %strategy,
        count = config.count,
        objects = population.objects.len(),
        batched = population.batch.is_some(),
        "boxes populated"
    );
    Ok(population)
}

/// A ready-to-render demo scene and the handles the frame loop animates.
#[derive(Debug)]
pub struct DemoScene {
    pub scene: Scene,
    pub population: Population,
    /// Torus knot rotated about Y over time, when reference meshes are shown.
    pub spinner: Option<ObjectId>,
    pub displaced_plane: Option<ObjectId>,
}

/// Build the scene described by the config: the boxes, one directional light
/// and optionally the reference meshes.
pub fn build_demo_scene(config: &DemoConfig) -> Result<DemoScene, SceneError> {
    let mut scene = Scene::new();

    let mut shadow = config.shadows.settings;
    if !shadow.auto_update {
        // A static shadow map still has to be drawn once.
        shadow.needs_update = true;
    }
    scene.add_light(DirectionalLight {
        cast_shadow: config.shadows.enabled,
        shadow,
        ..DirectionalLight::default()
    });

    let spinner = if config.show_reference_meshes {
        Some(add_reference_meshes(&mut scene)?)
    } else {
        None
    };

    let displaced_plane = if config.displaced_plane.enabled {
        Some(add_displaced_plane(&mut scene, &config.displaced_plane)?)
    } else {
        None
    };

    let population = populate(&mut scene, config.strategy, &config.batch)?;

    Ok(DemoScene {
        scene,
        population,
        spinner,
        displaced_plane,
    })
}

/// Cube, torus knot, sphere and floor, with each one casting or receiving
/// shadows only where it shows. Returns the torus knot.
fn add_reference_meshes(scene: &mut Scene) -> Result<ObjectId, SceneError> {
    let resources = scene.resources_mut();
    let standard = resources.intern_material(MaterialDesc::default())?;
    let cube = resources.add_geometry(GeometryDesc::cube(2.0))?;
    let knot = resources.add_geometry(GeometryDesc::TorusKnot {
        radius: 1.0,
        tube: 0.4,
        tubular_segments: 128,
        radial_segments: 32,
        p: 2,
        q: 3,
    })?;
    let sphere = resources.add_geometry(GeometryDesc::Sphere {
        radius: 1.0,
        width_segments: 32,
        height_segments: 32,
    })?;
    let floor = resources.add_geometry(GeometryDesc::Plane {
        width: 10.0,
        height: 10.0,
        width_segments: 1,
        height_segments: 1,
    })?;

    scene.add(
        SceneObject::mesh("cube", cube, standard)
            .with_transform(Transform::from_position(Vec3::new(-5.0, 0.0, 0.0)))
            .with_shadows(true, false),
    )?;
    let knot_id = scene.add(SceneObject::mesh("torus_knot", knot, standard).with_shadows(true, false))?;
    scene.add(
        SceneObject::mesh("sphere", sphere, standard)
            .with_transform(Transform::from_position(Vec3::new(5.0, 0.0, 0.0)))
            .with_shadows(true, false),
    )?;
    scene.add(
        SceneObject::mesh("floor", floor, standard)
            .with_transform(
                Transform::from_position(Vec3::new(0.0, -2.0, 0.0))
                    .with_rotation(Quat::from_rotation_x(-PI * 0.5)),
            )
            .with_shadows(false, true),
    )?;
    Ok(knot_id)
}

/// Horizontal plane whose vertices are lifted on the GPU. It neither casts nor
/// receives shadows, so it only costs main-pass vertex work.
fn add_displaced_plane(scene: &mut Scene, config: &DisplacedPlaneConfig) -> Result<ObjectId, SceneError> {
    let resources = scene.resources_mut();
    let geometry = resources.add_geometry(GeometryDesc::Plane {
        width: config.size,
        height: config.size,
        width_segments: config.segments,
        height_segments: config.segments,
    })?;
    let material = resources.intern_material(MaterialDesc::Displaced {
        strength: config.strength,
        precision: config.precision,
    })?;
    scene.add(
        SceneObject::mesh("displaced_plane", geometry, material)
            .with_transform(Transform::default().with_rotation(Quat::from_rotation_x(-PI * 0.5))),
    )
}

fn to_transform(t: &InstanceTransform) -> Transform {
    Transform::from_position(t.position).with_rotation(t.rotation)
}
