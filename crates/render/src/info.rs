use std::fmt;

/// Per-frame renderer statistics, for manual inspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderInfo {
    pub frame: u64,
    /// Submissions in the main pass.
    pub draw_calls: u32,
    /// Submissions in the shadow pass, zero when the shadow map was not redrawn.
    pub shadow_draw_calls: u32,
    pub triangles: u64,
    pub shadow_triangles: u64,
    pub instances: u64,
    pub geometries: u32,
    pub materials: u32,
    /// Instance buffers uploaded before this frame.
    pub uploads: u32,
}

impl RenderInfo {
    pub fn total_draw_calls(&self) -> u32 {
        self.draw_calls + self.shadow_draw_calls
    }
}

impl fmt::Display for RenderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame={} calls={} shadow_calls={} triangles={} shadow_triangles={} instances={} geometries={} materials={} uploads={}",
            self.frame,
            self.draw_calls,
            self.shadow_draw_calls,
            self.triangles,
            self.shadow_triangles,
            self.instances,
            self.geometries,
            self.materials,
            self.uploads,
        )
    }
}
