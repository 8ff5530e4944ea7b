//! Synthetic sketches with analytic isolines and geodesics.
//!
//! Both primitives live on a single layer whose time function is `t = y`:
//! - [`TubeSketch`]: a flat sheet, or a tube whose left and right borders are
//!   linked so courses wrap around;
//! - [`ForkSketch`]: a flat trunk that splits into two flat legs at a fork
//!   interface.
//!
//! # Example
//!
//! ```ignore
//! let tube = TubeSketch::new(40.0, 60.0, 2.0).circular(true);
//! let mut mesh = tube.build();
//! subdivide_regions(&mut mesh, &tube, SubdivisionOptions::from_params(&params))?;
//! let (sampling, _) = SamplingAlgorithm::new(&mesh, params, Oracles::new(&tube, &tube))?.run()?;
//! ```

use crate::core::Vec2;

use super::course::CoursePath;
use super::edge::SampleEdge;
use super::oracles::{DistanceSampler, GeodesicPath, IsolineTracer, PathPoint};
use super::region::{RegionGraph, RegionId};
use super::sample::{MeshLayer, SampleRef, TimeMesh};

const EPS: f64 = 1e-9;

/// Single-layer sheet or tube with time equal to height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TubeSketch {
    columns: usize,
    rows: usize,
    spacing: f64,
    circular: bool,
}

impl TubeSketch {
    /// Lattice covering `width × height` (rounded to whole cells of `spacing`).
    #[must_use]
    pub fn new(width: f64, height: f64, spacing: f64) -> Self {
        Self {
            columns: cells(width, spacing),
            rows: cells(height, spacing),
            spacing,
            circular: false,
        }
    }

    #[must_use]
    pub const fn circular(mut self, circular: bool) -> Self {
        self.circular = circular;
        self
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.columns as f64 * self.spacing
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.rows as f64 * self.spacing
    }

    #[must_use]
    pub const fn is_circular(&self) -> bool {
        self.circular
    }

    /// Builds the lattice and its bottom → body → top region graph.
    #[must_use]
    pub fn build(&self) -> TimeMesh {
        let mut layer = MeshLayer::new(0, 0, Vec2::ZERO, self.spacing, self.columns + 1, self.rows + 1);
        let mut graph = RegionGraph::new();
        let bottom = graph.add_interface(0.0);
        let body = graph.add_simple(0.0, self.height());
        let top = graph.add_interface(self.height());
        // endpoints are valid by construction
        let _ = graph.connect(bottom, body, self.course_at(0.0));
        let _ = graph.connect(body, top, self.course_at(self.height()));

        for cy in 0..=self.rows {
            for cx in 0..=self.columns {
                let index = layer.add_sample(cx, cy, cy as f64 * self.spacing);
                let sample = layer.sample_mut(index);
                sample.flow = Vec2::Y;
                sample.region = Some(body);
            }
        }

        let mut mesh = TimeMesh::new(vec![layer], graph);
        if self.circular {
            for cy in 0..=self.rows {
                let first = mesh.layer(0).sample_at_cell(0, cy as isize);
                let last = mesh.layer(0).sample_at_cell(self.columns as isize, cy as isize);
                if let (Some(first), Some(last)) = (first, last) {
                    mesh.link(SampleRef::new(0, first), SampleRef::new(0, last));
                }
            }
        }
        mesh
    }

    /// Horizontal course at height `t`.
    #[must_use]
    pub fn course_at(&self, t: f64) -> CoursePath {
        horizontal_course(0.0, self.width(), t, self.circular)
    }
}

impl IsolineTracer for TubeSketch {
    fn trace(
        &self,
        mesh: &TimeMesh,
        region: RegionId,
        time: f64,
        start: &SampleEdge,
    ) -> Option<CoursePath> {
        let node = mesh.graph.node(region)?;
        if time < node.t_min - EPS || time > node.t_max + EPS || !start.contains_time(mesh, time) {
            return None;
        }
        Some(self.course_at(time))
    }
}

impl DistanceSampler for TubeSketch {
    fn query_between(
        &self,
        layer1: usize,
        p1: Vec2,
        layer2: usize,
        p2: Vec2,
        _refine: bool,
    ) -> Option<GeodesicPath> {
        if layer1 != 0 || layer2 != 0 {
            return None;
        }
        let width = self.width();
        let dx = p2.x - p1.x;
        if !self.circular || dx.abs() <= width * 0.5 {
            return straight(p1, p2);
        }
        // shorter way around crosses the linked border
        let (exit_x, entry_x, wrapped_dx) = if dx > 0.0 {
            (0.0, width, dx - width)
        } else {
            (width, 0.0, dx + width)
        };
        let s = ((exit_x - p1.x) / wrapped_dx).clamp(0.0, 1.0);
        let cross_y = p1.y + (p2.y - p1.y) * s;
        let exit = Vec2::new(exit_x, cross_y);
        let entry = Vec2::new(entry_x, cross_y);
        let d1 = p1.distance_to(exit);
        let total = d1 + entry.distance_to(p2);
        GeodesicPath::new(vec![
            PathPoint::new(0, p1, 0.0),
            PathPoint::new(0, exit, d1),
            PathPoint::new(0, entry, d1).linked(),
            PathPoint::new(0, p2, total),
        ])
        .ok()
    }
}

/// Flat trunk splitting into two flat legs at `fork_height`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForkSketch {
    columns: usize,
    fork_rows: usize,
    rows: usize,
    leg_columns: usize,
    spacing: f64,
}

impl ForkSketch {
    /// Trunk of `width × fork_height`, legs of `leg_width` each up to `height`.
    #[must_use]
    pub fn new(width: f64, fork_height: f64, height: f64, leg_width: f64, spacing: f64) -> Self {
        let columns = cells(width, spacing);
        Self {
            columns,
            fork_rows: cells(fork_height, spacing),
            rows: cells(height, spacing).max(cells(fork_height, spacing) + 1),
            leg_columns: cells(leg_width, spacing).min(columns.saturating_sub(1) / 2).max(1),
            spacing,
        }
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.columns as f64 * self.spacing
    }

    #[must_use]
    pub fn fork_height(&self) -> f64 {
        self.fork_rows as f64 * self.spacing
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.rows as f64 * self.spacing
    }

    #[must_use]
    pub fn leg_width(&self) -> f64 {
        self.leg_columns as f64 * self.spacing
    }

    fn right_leg_start(&self) -> f64 {
        self.width() - self.leg_width()
    }

    /// Builds the lattice (no samples in the gap between the legs) and the
    /// trunk → fork → legs region graph.
    #[must_use]
    pub fn build(&self) -> TimeMesh {
        let (h1, h) = (self.fork_height(), self.height());
        let mut graph = RegionGraph::new();
        let bottom = graph.add_interface(0.0);
        let trunk = graph.add_simple(0.0, h1);
        let fork = graph.add_interface(h1);
        let left = graph.add_simple(h1, h);
        let right = graph.add_simple(h1, h);
        let top_left = graph.add_interface(h);
        let top_right = graph.add_interface(h);
        let (w, lw, rs) = (self.width(), self.leg_width(), self.right_leg_start());
        let _ = graph.connect(bottom, trunk, horizontal_course(0.0, w, 0.0, false));
        let _ = graph.connect(trunk, fork, horizontal_course(0.0, w, h1, false));
        let _ = graph.connect(fork, left, horizontal_course(0.0, lw, h1, false));
        let _ = graph.connect(fork, right, horizontal_course(rs, w, h1, false));
        let _ = graph.connect(left, top_left, horizontal_course(0.0, lw, h, false));
        let _ = graph.connect(right, top_right, horizontal_course(rs, w, h, false));

        let mut layer = MeshLayer::new(0, 0, Vec2::ZERO, self.spacing, self.columns + 1, self.rows + 1);
        for cy in 0..=self.rows {
            for cx in 0..=self.columns {
                let region = if cy <= self.fork_rows {
                    trunk
                } else if cx <= self.leg_columns {
                    left
                } else if cx >= self.columns - self.leg_columns {
                    right
                } else {
                    continue;
                };
                let index = layer.add_sample(cx, cy, cy as f64 * self.spacing);
                let sample = layer.sample_mut(index);
                sample.flow = Vec2::Y;
                sample.region = Some(region);
            }
        }
        TimeMesh::new(vec![layer], graph)
    }
}

impl IsolineTracer for ForkSketch {
    fn trace(
        &self,
        mesh: &TimeMesh,
        region: RegionId,
        time: f64,
        start: &SampleEdge,
    ) -> Option<CoursePath> {
        let node = mesh.graph.node(region)?;
        if time < node.t_min - EPS || time > node.t_max + EPS || !start.contains_time(mesh, time) {
            return None;
        }
        if time <= self.fork_height() + EPS && node.t_max <= self.fork_height() + EPS {
            return Some(horizontal_course(0.0, self.width(), time, false));
        }
        let x = start.position(mesh).x;
        if x <= self.leg_width() + EPS {
            Some(horizontal_course(0.0, self.leg_width(), time, false))
        } else if x >= self.right_leg_start() - EPS {
            Some(horizontal_course(self.right_leg_start(), self.width(), time, false))
        } else {
            None
        }
    }
}

impl DistanceSampler for ForkSketch {
    fn query_between(
        &self,
        layer1: usize,
        p1: Vec2,
        layer2: usize,
        p2: Vec2,
        _refine: bool,
    ) -> Option<GeodesicPath> {
        if layer1 != 0 || layer2 != 0 {
            return None;
        }
        straight(p1, p2)
    }
}

fn cells(extent: f64, spacing: f64) -> usize {
    ((extent / spacing).round() as usize).max(1)
}

fn straight(p1: Vec2, p2: Vec2) -> Option<GeodesicPath> {
    GeodesicPath::new(vec![
        PathPoint::new(0, p1, 0.0),
        PathPoint::new(0, p2, p1.distance_to(p2)),
    ])
    .ok()
}

fn horizontal_course(x0: f64, x1: f64, t: f64, circular: bool) -> CoursePath {
    CoursePath::line(0, Vec2::new(x0, t), Vec2::new(x1, t), circular)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tube_links_wrap_the_border() {
        let tube = TubeSketch::new(10.0, 6.0, 2.0).circular(true);
        let mesh = tube.build();
        let layer = mesh.layer(0);
        assert_eq!(layer.samples().len(), 6 * 4);
        let first = layer.sample_at_cell(0, 1).unwrap();
        let last = layer.sample_at_cell(5, 1).unwrap();
        assert_eq!(layer.sample(first).link, Some(SampleRef::new(0, last)));
        assert_eq!(mesh.graph.edge_count(), 2);
        assert!((tube.course_at(2.0).length() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn tube_geodesic_wraps_around() {
        let tube = TubeSketch::new(10.0, 6.0, 2.0).circular(true);
        let path = tube
            .query_between(0, Vec2::new(1.0, 0.0), 0, Vec2::new(9.0, 0.0), false)
            .unwrap();
        assert!((path.dist() - 2.0).abs() < 1e-12);
        let (_, mid) = path.point_at(1.0);
        assert!(mid.x == 0.0 || mid.x == 10.0);
        let flat = TubeSketch::new(10.0, 6.0, 2.0);
        let path = flat
            .query_between(0, Vec2::new(1.0, 0.0), 0, Vec2::new(9.0, 0.0), false)
            .unwrap();
        assert!((path.dist() - 8.0).abs() < 1e-12);
    }

    #[test]
    fn tube_tracer_respects_region_range() {
        let tube = TubeSketch::new(10.0, 6.0, 2.0);
        let mesh = tube.build();
        let body = RegionId(1);
        let edge = SampleEdge::new(SampleRef::new(0, 0), SampleRef::new(0, 6), 0.5);
        assert!(tube.trace(&mesh, body, 1.0, &edge).is_some());
        assert!(tube.trace(&mesh, body, 3.0, &edge).is_none());
    }

    #[test]
    fn fork_has_two_legs() {
        let fork = ForkSketch::new(20.0, 10.0, 20.0, 8.0, 2.0);
        let mesh = fork.build();
        assert_eq!(mesh.graph.node_count(), 7);
        let fork_node = mesh.graph.node(RegionId(2)).unwrap();
        assert_eq!(fork_node.inputs.len(), 1);
        assert_eq!(fork_node.outputs.len(), 2);
        assert!(mesh.layer(0).sample_at_cell(5, 8).is_none());
        assert!(mesh.layer(0).sample_at_cell(5, 5).is_some());
        assert!(mesh.graph.node(RegionId(3)).unwrap().sample_count > 0);
    }
}
