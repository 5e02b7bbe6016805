use perfscene_common::{BatchId, GeometryHandle, MaterialHandle, ObjectId};
use perfscene_scene::Scene;

use crate::info::RenderInfo;

/// Where a draw submission's transforms come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawSource {
    Object(ObjectId),
    Batch(BatchId),
}

/// One command to the backend: a geometry/material pair drawn `instance_count` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawSubmission {
    pub source: DrawSource,
    pub geometry: GeometryHandle,
    pub material: MaterialHandle,
    pub instance_count: u32,
    pub receive_shadow: bool,
    /// Triangles rasterized by this submission, all instances included.
    pub triangles: u64,
}

/// Depth-only pass rendering the shadow map of one light.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadowPass {
    /// Index into [`Scene::lights`].
    pub light: usize,
    pub submissions: Vec<DrawSubmission>,
}

/// Everything one frame will submit, in submission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FramePlan {
    pub shadow: Option<ShadowPass>,
    pub main: Vec<DrawSubmission>,
}

impl FramePlan {
    /// Plan a frame: one submission per visible object, one per non-empty
    /// batch, and a shadow pass for [`Scene::shadow_light`].
    pub fn build(scene: &Scene) -> Self {
        let resources = scene.resources();
        let triangles = |g: GeometryHandle, instances: u32| {
            resources.triangles(g).unwrap_or(0) * instances as u64
        };

        let mut main = Vec::with_capacity(scene.object_count() + scene.batch_count());
        let mut casters = Vec::new();

        for (id, object) in scene.objects() {
            if !object.visible {
                continue;
            }
            let submission = DrawSubmission {
                source: DrawSource::Object(*id),
                geometry: object.geometry,
                material: object.material,
                instance_count: 1,
                receive_shadow: object.receive_shadow,
                triangles: triangles(object.geometry, 1),
            };
            if object.cast_shadow {
                casters.push(submission);
            }
            main.push(submission);
        }

        for (id, batch) in scene.batches() {
            let Some(draw) = batch.draw() else {
                continue;
            };
            let submission = DrawSubmission {
                source: DrawSource::Batch(id),
                geometry: draw.geometry,
                material: draw.material,
                instance_count: draw.instance_count,
                receive_shadow: batch.receive_shadow,
                triangles: triangles(draw.geometry, draw.instance_count),
            };
            if batch.cast_shadow {
                casters.push(submission);
            }
            main.push(submission);
        }

        let shadow = scene.shadow_light().map(|light| ShadowPass {
            light,
            submissions: casters,
        });

        Self { shadow, main }
    }

    pub fn draw_calls(&self) -> usize {
        self.main.len()
    }

    pub fn shadow_draw_calls(&self) -> usize {
        self.shadow.as_ref().map_or(0, |s| s.submissions.len())
    }

    /// Statistics for this plan, as reported after the frame is drawn.
    pub fn info(&self, frame: u64, scene: &Scene, uploads: u32) -> RenderInfo {
        RenderInfo {
            frame,
            draw_calls: self.draw_calls() as u32,
            shadow_draw_calls: self.shadow_draw_calls() as u32,
            triangles: self.main.iter().map(|s| s.triangles).sum(),
            shadow_triangles: self
                .shadow
                .as_ref()
                .map_or(0, |s| s.submissions.iter().map(|d| d.triangles).sum()),
            instances: self.main.iter().map(|s| s.instance_count as u64).sum(),
            geometries: scene.resources().geometry_count() as u32,
            materials: scene.resources().material_count() as u32,
            uploads,
        }
    }
}
