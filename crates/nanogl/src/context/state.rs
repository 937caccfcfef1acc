use crate::arena::{ProgramId, VertexArrayId};

/// Binding state shared by every draw on one context.
///
/// Read before each bind to skip redundant native calls; written after each
/// bind that actually happens. Last writer wins.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct ContextState {
    /// Program made current by the last program bind.
    pub program: Option<ProgramId>,
    /// Vertex array made current by the last vertex-array bind.
    pub vertex_array: Option<VertexArrayId>,
}

impl ContextState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every binding, e.g. after the native context was lost.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
