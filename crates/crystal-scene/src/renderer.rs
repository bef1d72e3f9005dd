use serde::Serialize;

/// Per-frame renderer counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct RenderCounters {
    pub draw_calls: u32,
    pub triangles: u64,
    pub geometries: u32,
    pub materials: u32,
    pub programs: u32,
    /// Approximate heap usage in bytes, when the platform reports it.
    pub heap_bytes: Option<u64>,
}

/// Source of renderer counters, sampled by the frame monitor.
pub trait RendererInfo {
    fn counters(&self) -> RenderCounters;
}

impl RendererInfo for RenderCounters {
    fn counters(&self) -> RenderCounters {
        *self
    }
}
