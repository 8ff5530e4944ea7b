//! Lattice edges with a parameter, twin lookup across layer links, and a
//! canonical base edge.

use std::cell::OnceCell;

use crate::core::Vec2;

use super::neighborhood::SampleNeighborhood;
use super::sample::{SampleRef, TimeMesh};

#[derive(Debug, Clone)]
pub struct SampleEdge {
    source: SampleRef,
    target: SampleRef,
    alpha: f64,
    /// Unset until looked up; `Some(None)` caches the absence of a twin.
    twin: OnceCell<Option<(SampleRef, SampleRef)>>,
}

impl PartialEq for SampleEdge {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.target == other.target && self.alpha == other.alpha
    }
}

impl SampleEdge {
    #[must_use]
    pub fn new(source: SampleRef, target: SampleRef, alpha: f64) -> Self {
        Self {
            source,
            target,
            alpha,
            twin: OnceCell::new(),
        }
    }

    #[must_use]
    pub const fn source(&self) -> SampleRef {
        self.source
    }

    #[must_use]
    pub const fn target(&self) -> SampleRef {
        self.target
    }

    #[must_use]
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    #[must_use]
    pub const fn layer(&self) -> usize {
        self.source.layer
    }

    /// Same edge, traversed the other way.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self::new(self.target, self.source, 1.0 - self.alpha)
    }

    #[must_use]
    pub fn position(&self, mesh: &TimeMesh) -> Vec2 {
        let p0 = mesh.sample(self.source).position;
        let p1 = mesh.sample(self.target).position;
        p0.lerp(p1, self.alpha)
    }

    /// Interpolated time at the edge parameter.
    #[must_use]
    pub fn time(&self, mesh: &TimeMesh) -> f64 {
        let t0 = mesh.sample(self.source).time;
        let t1 = mesh.sample(self.target).time;
        t0 + (t1 - t0) * self.alpha
    }

    /// True iff `min(t₀,t₁) ≤ t ≤ max(t₀,t₁)`.
    #[must_use]
    pub fn contains_time(&self, mesh: &TimeMesh, t: f64) -> bool {
        let t0 = mesh.sample(self.source).time;
        let t1 = mesh.sample(self.target).time;
        t0.min(t1) <= t && t <= t0.max(t1)
    }

    /// Degree-2 neighborhood view of this edge.
    #[must_use]
    pub fn neighborhood<'a>(&self, mesh: &'a TimeMesh) -> SampleNeighborhood<'a> {
        SampleNeighborhood::from_edge(
            mesh.layer(self.source.layer),
            self.source.index,
            self.target.index,
            self.alpha,
        )
    }

    /// Edge between the linked counterparts of both endpoints, if they are
    /// lattice neighbors on a common layer.
    #[must_use]
    pub fn twin(&self, mesh: &TimeMesh) -> Option<Self> {
        let (source, target) = (*self.twin.get_or_init(|| self.find_twin(mesh)))?;
        Some(Self::new(source, target, self.alpha))
    }

    fn find_twin(&self, mesh: &TimeMesh) -> Option<(SampleRef, SampleRef)> {
        let s0 = mesh.sample(self.source).link?;
        let s1 = mesh.sample(self.target).link?;
        if s0.layer != s1.layer || (s0, s1) == (self.source, self.target) {
            return None;
        }
        mesh.layer(s0.layer)
            .are_neighbors(s0.index, s1.index)
            .then_some((s0, s1))
    }

    /// Canonical representative among this edge and its twin.
    ///
    /// Ordered by layer index, then smaller data index, then larger data index.
    #[must_use]
    pub fn base(&self, mesh: &TimeMesh) -> Self {
        match self.twin(mesh) {
            Some(twin) if twin.key() < self.key() => twin,
            _ => self.clone(),
        }
    }

    fn key(&self) -> (usize, usize, usize) {
        let (a, b) = (self.source.index, self.target.index);
        (self.source.layer, a.min(b), a.max(b))
    }

    /// Same undirected lattice edge, ignoring the parameter.
    #[must_use]
    pub fn same_edge(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::region::RegionGraph;
    use crate::mesh::sample::MeshLayer;

    /// Two 2×2 layers glued along their shared border column.
    fn glued() -> TimeMesh {
        let mut layers = Vec::new();
        for index in 0..2 {
            let origin = Vec2::new(index as f64, 0.0);
            let mut layer = MeshLayer::new(index, index as u32, origin, 1.0, 2, 2);
            for cy in 0..2 {
                for cx in 0..2 {
                    layer.add_sample(cx, cy, cy as f64);
                }
            }
            layers.push(layer);
        }
        let mut mesh = TimeMesh::new(layers, RegionGraph::new());
        // right column of layer 0 == left column of layer 1
        let r0 = mesh.layer(0).sample_at_cell(1, 0).unwrap();
        let r1 = mesh.layer(0).sample_at_cell(1, 1).unwrap();
        let l0 = mesh.layer(1).sample_at_cell(0, 0).unwrap();
        let l1 = mesh.layer(1).sample_at_cell(0, 1).unwrap();
        mesh.link(SampleRef::new(0, r0), SampleRef::new(1, l0));
        mesh.link(SampleRef::new(0, r1), SampleRef::new(1, l1));
        mesh
    }

    #[test]
    fn twin_crosses_layer_links() {
        let mesh = glued();
        let edge = SampleEdge::new(SampleRef::new(1, 0), SampleRef::new(1, 2), 0.5);
        let twin = edge.twin(&mesh).unwrap();
        assert_eq!(twin.layer(), 0);
        assert!(twin.position(&mesh).distance_to(edge.position(&mesh)) < 1e-12);
        assert_eq!(edge.base(&mesh), twin);
        assert_eq!(twin.base(&mesh), twin);
    }

    #[test]
    fn missing_twin_is_cached() {
        let mesh = glued();
        let edge = SampleEdge::new(SampleRef::new(0, 0), SampleRef::new(0, 1), 0.0);
        assert!(edge.twin(&mesh).is_none());
        assert_eq!(edge.twin.get(), Some(&None));
        assert_eq!(edge.base(&mesh), edge);
    }

    #[test]
    fn time_containment_is_inclusive() {
        let mesh = glued();
        let edge = SampleEdge::new(SampleRef::new(0, 0), SampleRef::new(0, 2), 0.25);
        assert!(edge.contains_time(&mesh, 0.0));
        assert!(edge.contains_time(&mesh, 1.0));
        assert!(!edge.contains_time(&mesh, 1.5));
        assert!((edge.time(&mesh) - 0.25).abs() < 1e-12);
        assert!((edge.reversed().time(&mesh) - 0.25).abs() < 1e-12);
    }
}
