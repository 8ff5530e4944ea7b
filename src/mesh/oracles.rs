//! Contracts of the external collaborators the sampler consumes.
//!
//! The sampler never traces isolines or computes geodesics itself: it calls
//! these oracles synchronously and treats them as pure functions.

use thiserror::Error;

use crate::core::Vec2;

use super::course::CoursePath;
use super::edge::SampleEdge;
use super::region::RegionId;
use super::sample::TimeMesh;

/// Traces the isoline of `time` through `region`, starting on `start`.
pub trait IsolineTracer {
    fn trace(
        &self,
        mesh: &TimeMesh,
        region: RegionId,
        time: f64,
        start: &SampleEdge,
    ) -> Option<CoursePath>;
}

/// Shortest path queries on the sketch surface.
pub trait DistanceSampler {
    fn query_between(
        &self,
        layer1: usize,
        p1: Vec2,
        layer2: usize,
        p2: Vec2,
        refine: bool,
    ) -> Option<GeodesicPath>;
}

/// Distance from a point to the nearest seam, in sketch units.
pub trait SeamOracle {
    fn seam_distance(&self, layer: usize, p: Vec2) -> f64;
}

/// Seam oracle of a sketch without seams.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSeams;

impl SeamOracle for NoSeams {
    fn seam_distance(&self, _layer: usize, _p: Vec2) -> f64 {
        f64::INFINITY
    }
}

/// Straight-line distances within a single layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanSampler;

impl DistanceSampler for EuclideanSampler {
    fn query_between(
        &self,
        layer1: usize,
        p1: Vec2,
        layer2: usize,
        p2: Vec2,
        _refine: bool,
    ) -> Option<GeodesicPath> {
        if layer1 != layer2 {
            return None;
        }
        GeodesicPath::new(vec![
            PathPoint::new(layer1, p1, 0.0),
            PathPoint::new(layer2, p2, p1.distance_to(p2)),
        ])
        .ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathPoint {
    pub layer: usize,
    pub position: Vec2,
    /// Accumulated distance from the start.
    pub dist: f64,
    /// Reached through a layer link.
    pub from_link: bool,
}

impl PathPoint {
    #[must_use]
    pub const fn new(layer: usize, position: Vec2, dist: f64) -> Self {
        Self {
            layer,
            position,
            dist,
            from_link: false,
        }
    }

    #[must_use]
    pub const fn linked(mut self) -> Self {
        self.from_link = true;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeodesicError {
    #[error("geodesic path is empty")]
    Empty,
    #[error("geodesic path must start at distance 0, got {0}")]
    NonZeroStart(f64),
    #[error("geodesic distances decrease at point {0}")]
    NotMonotone(usize),
}

/// Geodesic between two sketch points with monotone accumulated distances.
#[derive(Debug, Clone, PartialEq)]
pub struct GeodesicPath {
    points: Vec<PathPoint>,
}

impl GeodesicPath {
    pub fn new(points: Vec<PathPoint>) -> Result<Self, GeodesicError> {
        let first = points.first().ok_or(GeodesicError::Empty)?;
        if first.dist != 0.0 {
            return Err(GeodesicError::NonZeroStart(first.dist));
        }
        if let Some(bad) = points.windows(2).position(|w| w[1].dist < w[0].dist) {
            return Err(GeodesicError::NotMonotone(bad + 1));
        }
        Ok(Self { points })
    }

    #[must_use]
    pub fn points(&self) -> &[PathPoint] {
        &self.points
    }

    /// Total length.
    #[must_use]
    pub fn dist(&self) -> f64 {
        self.points.last().map_or(0.0, |p| p.dist)
    }

    #[must_use]
    pub fn start(&self) -> PathPoint {
        self.points[0]
    }

    #[must_use]
    pub fn end(&self) -> PathPoint {
        self.points[self.points.len() - 1]
    }

    /// Layer and position at accumulated distance `d`.
    #[must_use]
    pub fn point_at(&self, d: f64) -> (usize, Vec2) {
        let d = d.clamp(0.0, self.dist());
        let idx = self.points.partition_point(|p| p.dist <= d);
        if idx == 0 {
            let p = self.points[0];
            return (p.layer, p.position);
        }
        if idx >= self.points.len() {
            let p = self.end();
            return (p.layer, p.position);
        }
        let a = self.points[idx - 1];
        let b = self.points[idx];
        let span = b.dist - a.dist;
        if span <= 0.0 || a.layer != b.layer || b.from_link {
            return (a.layer, a.position);
        }
        (a.layer, a.position.lerp(b.position, (d - a.dist) / span))
    }

    /// `parts − 1` interior points splitting the path into equal arc lengths.
    #[must_use]
    pub fn split(&self, parts: usize) -> Vec<(usize, Vec2)> {
        let total = self.dist();
        (1..parts)
            .map(|k| self.point_at(total * k as f64 / parts as f64))
            .collect()
    }

    /// Unit direction leaving the start point, when the first step stays on its layer.
    #[must_use]
    pub fn start_direction(&self) -> Option<Vec2> {
        let a = self.points.first()?;
        let b = self.points.get(1)?;
        if b.layer != a.layer || b.from_link {
            return None;
        }
        (b.position - a.position).normalized()
    }

    /// Unit direction arriving at the end point, when the last step stays on its layer.
    #[must_use]
    pub fn end_direction(&self) -> Option<Vec2> {
        let n = self.points.len();
        if n < 2 {
            return None;
        }
        let a = self.points[n - 2];
        let b = self.points[n - 1];
        if b.layer != a.layer || b.from_link {
            return None;
        }
        (b.position - a.position).normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_monotone_paths() {
        let err = GeodesicPath::new(vec![
            PathPoint::new(0, Vec2::ZERO, 0.0),
            PathPoint::new(0, Vec2::X, 2.0),
            PathPoint::new(0, Vec2::Y, 1.0),
        ])
        .unwrap_err();
        assert_eq!(err, GeodesicError::NotMonotone(2));
        assert_eq!(GeodesicPath::new(Vec::new()).unwrap_err(), GeodesicError::Empty);
    }

    #[test]
    fn point_at_follows_arc_length() {
        let path = EuclideanSampler
            .query_between(0, Vec2::ZERO, 0, Vec2::new(0.0, 10.0), false)
            .unwrap();
        let (_, p) = path.point_at(2.5);
        assert!(p.distance_to(Vec2::new(0.0, 2.5)) < 1e-12);
        let mid = path.split(4);
        assert_eq!(mid.len(), 3);
        assert!(mid[1].1.distance_to(Vec2::new(0.0, 5.0)) < 1e-12);
        assert_eq!(path.start_direction(), Some(Vec2::Y));
    }

    #[test]
    fn link_jumps_do_not_interpolate() {
        let path = GeodesicPath::new(vec![
            PathPoint::new(0, Vec2::new(1.0, 0.0), 0.0),
            PathPoint::new(0, Vec2::new(0.0, 0.0), 1.0),
            PathPoint::new(0, Vec2::new(10.0, 0.0), 1.0).linked(),
            PathPoint::new(0, Vec2::new(9.0, 0.0), 2.0),
        ])
        .unwrap();
        let (_, p) = path.point_at(1.5);
        assert!(p.distance_to(Vec2::new(9.5, 0.0)) < 1e-12);
        assert!(EuclideanSampler.query_between(0, Vec2::ZERO, 1, Vec2::ZERO, false).is_none());
    }
}
