use std::collections::BTreeMap;

use perfscene_common::BatchId;
use perfscene_instancing::InstanceBatch;
use perfscene_scene::Scene;

use crate::info::RenderInfo;
use crate::plan::FramePlan;
use crate::renderer::{RenderView, Renderer};

/// Renderer without a GPU: plans each frame and reports its statistics.
///
/// Keeps a copy of every uploaded transform buffer so callers can check what
/// a real backend would hold.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    frame: u64,
    pending_uploads: u32,
    uploaded: BTreeMap<BatchId, Vec<[[f32; 4]; 4]>>,
    upload_counts: BTreeMap<BatchId, u32>,
    last_plan: FramePlan,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.frame
    }

    /// How many times the batch has been uploaded.
    pub fn upload_count(&self, id: BatchId) -> u32 {
        self.upload_counts.get(&id).copied().unwrap_or(0)
    }

    /// Matrices last uploaded for the batch.
    pub fn uploaded(&self, id: BatchId) -> Option<&[[[f32; 4]; 4]]> {
        self.uploaded.get(&id).map(Vec::as_slice)
    }

    pub fn last_plan(&self) -> &FramePlan {
        &self.last_plan
    }
}

impl Renderer for HeadlessRenderer {
    type Output = RenderInfo;

    fn upload_batch(&mut self, id: BatchId, batch: &InstanceBatch) {
        self.uploaded.insert(id, batch.buffer().to_raw());
        *self.upload_counts.entry(id).or_default() += 1;
        self.pending_uploads += 1;
    }

    fn render(&mut self, scene: &Scene, _view: &RenderView) -> RenderInfo {
        let plan = FramePlan::build(scene);
        let info = plan.info(self.frame, scene, self.pending_uploads);
        tracing::debug!(%info, "headless frame");
        self.frame += 1;
        self.pending_uploads = 0;
        self.last_plan = plan;
        info
    }
}
