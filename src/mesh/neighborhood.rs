//! Interpolation patches of one to four lattice samples.
//!
//! A neighborhood is located by lattice cell lookup and dispatches on its
//! degree: a single sample, a segment, a triangle (cell with a missing corner)
//! or a full axis-aligned quad.
//!
//! # Example
//!
//! ```ignore
//! let nh = layer.neighborhood(p).ok_or(SamplingError::MissingNeighborhood { .. })?;
//! let t = nh.interpolate_with(|s| s.time);
//! ```

use crate::core::{Orientation, Tolerance, Vec2};

use super::edge::SampleEdge;
use super::sample::{MeshLayer, Sample, SampleRef};

/// Samples of a neighborhood, tagged by degree.
///
/// Quad corners are stored in perimeter order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Patch {
    Point([usize; 1]),
    Segment([usize; 2]),
    Triangle([usize; 3]),
    Quad([usize; 4]),
}

impl Patch {
    #[must_use]
    pub fn samples(&self) -> &[usize] {
        match self {
            Self::Point(s) => s,
            Self::Segment(s) => s,
            Self::Triangle(s) => s,
            Self::Quad(s) => s,
        }
    }

    #[must_use]
    pub fn degree(&self) -> usize {
        self.samples().len()
    }

    fn reversed(self) -> Self {
        match self {
            Self::Point(s) => Self::Point(s),
            Self::Segment([a, b]) => Self::Segment([b, a]),
            Self::Triangle([a, b, c]) => Self::Triangle([c, b, a]),
            Self::Quad([a, b, c, d]) => Self::Quad([d, c, b, a]),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SampleNeighborhood<'a> {
    layer: &'a MeshLayer,
    patch: Patch,
    weights: [f64; 4],
}

impl<'a> SampleNeighborhood<'a> {
    /// Builds a neighborhood and computes the interpolation weights of `query`.
    #[must_use]
    pub fn new(layer: &'a MeshLayer, patch: Patch, query: Vec2) -> Self {
        let weights = compute_weights(layer, &patch, query);
        Self {
            layer,
            patch,
            weights,
        }
    }

    /// Degree-2 neighborhood with explicit edge parameter.
    #[must_use]
    pub fn from_edge(layer: &'a MeshLayer, source: usize, target: usize, alpha: f64) -> Self {
        Self {
            layer,
            patch: Patch::Segment([source, target]),
            weights: [1.0 - alpha, alpha, 0.0, 0.0],
        }
    }

    #[must_use]
    pub const fn layer(&self) -> &'a MeshLayer {
        self.layer
    }

    #[must_use]
    pub const fn patch(&self) -> Patch {
        self.patch
    }

    #[must_use]
    pub fn degree(&self) -> usize {
        self.patch.degree()
    }

    #[must_use]
    pub fn samples(&self) -> &[usize] {
        self.patch.samples()
    }

    #[must_use]
    pub fn sample_refs(&self) -> Vec<SampleRef> {
        let layer = self.layer.index();
        self.samples()
            .iter()
            .map(|&i| SampleRef::new(layer, i))
            .collect()
    }

    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights[..self.degree()]
    }

    fn positions(&self) -> Vec<Vec2> {
        self.samples()
            .iter()
            .map(|&i| self.layer.sample(i).position)
            .collect()
    }

    #[must_use]
    pub fn orientation(&self) -> Orientation {
        match self.patch {
            Patch::Point(_) | Patch::Segment(_) => Orientation::Indecisive,
            Patch::Triangle(_) | Patch::Quad(_) => Orientation::of(&self.positions()),
        }
    }

    /// Variant of this neighborhood with the requested winding.
    #[must_use]
    pub fn oriented(&self, ccw: bool) -> Self {
        let flip = match self.orientation() {
            Orientation::Ccw => !ccw,
            Orientation::Cw => ccw,
            Orientation::Indecisive => false,
        };
        if !flip {
            return *self;
        }
        let degree = self.degree();
        let mut weights = [0.0; 4];
        for (k, w) in self.weights().iter().enumerate() {
            weights[degree - 1 - k] = *w;
        }
        Self {
            layer: self.layer,
            patch: self.patch.reversed(),
            weights,
        }
    }

    /// Containment test with the default geometric tolerance.
    #[must_use]
    pub fn contains(&self, q: Vec2) -> bool {
        self.contains_with(q, Tolerance::CONTAINS)
    }

    #[must_use]
    pub fn contains_with(&self, q: Vec2, eps: f64) -> bool {
        let pts = self.positions();
        match self.patch {
            Patch::Point(_) => pts[0].distance_to(q) <= eps,
            Patch::Segment(_) => {
                let t = project_to_segment(pts[0], pts[1], q);
                pts[0].lerp(pts[1], t).distance_to(q) <= eps
            }
            Patch::Triangle(_) => barycentric(pts[0], pts[1], pts[2], q)
                .is_some_and(|bary| bary.iter().all(|&w| w >= -eps)),
            Patch::Quad(_) => {
                let (lo, hi) = bounds(&pts);
                q.x >= lo.x - eps && q.x <= hi.x + eps && q.y >= lo.y - eps && q.y <= hi.y + eps
            }
        }
    }

    /// Weighted sum of per-sample values given in sample order.
    #[must_use]
    pub fn interpolate(&self, values: &[f64]) -> f64 {
        self.weights()
            .iter()
            .zip(values)
            .map(|(w, v)| w * v)
            .sum()
    }

    #[must_use]
    pub fn interpolate_with(&self, f: impl Fn(&Sample) -> f64) -> f64 {
        self.samples()
            .iter()
            .zip(self.weights())
            .map(|(&i, w)| w * f(self.layer.sample(i)))
            .sum()
    }

    #[must_use]
    pub fn interpolate_vec(&self, f: impl Fn(&Sample) -> Vec2) -> Vec2 {
        self.samples()
            .iter()
            .zip(self.weights())
            .fold(Vec2::ZERO, |acc, (&i, &w)| acc + f(self.layer.sample(i)) * w)
    }

    #[must_use]
    pub fn has_value(&self, f: impl Fn(&Sample) -> f64, value: f64) -> bool {
        let (lo, hi) = self
            .samples()
            .iter()
            .map(|&i| f(self.layer.sample(i)))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        lo <= value && value <= hi
    }

    /// Constituent edges whose endpoint values bracket `value`.
    #[must_use]
    pub fn value_edges(&self, f: impl Fn(&Sample) -> f64, value: f64) -> Vec<SampleEdge> {
        let samples = self.samples();
        let pairs: Vec<(usize, usize)> = match self.patch {
            Patch::Point(_) => Vec::new(),
            Patch::Segment([a, b]) => vec![(a, b)],
            Patch::Triangle(_) | Patch::Quad(_) => (0..samples.len())
                .map(|k| (samples[k], samples[(k + 1) % samples.len()]))
                .collect(),
        };
        let layer = self.layer.index();
        pairs
            .into_iter()
            .filter_map(|(a, b)| {
                let v0 = f(self.layer.sample(a));
                let v1 = f(self.layer.sample(b));
                if v0.min(v1) > value || v0.max(v1) < value {
                    return None;
                }
                let alpha = if v0 == v1 {
                    0.0
                } else {
                    (value - v0) / (v1 - v0)
                };
                Some(SampleEdge::new(
                    SampleRef::new(layer, a),
                    SampleRef::new(layer, b),
                    alpha,
                ))
            })
            .collect()
    }

    /// Interpolated position of the neighborhood.
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.interpolate_vec(|s| s.position)
    }
}

impl MeshLayer {
    /// Neighborhood of the lattice cell containing `q`.
    #[must_use]
    pub fn neighborhood(&self, q: Vec2) -> Option<SampleNeighborhood<'_>> {
        let (width, height) = self.dimensions();
        if width == 0 || height == 0 {
            return None;
        }
        let (mut cx, mut cy) = self.cell_of(q);
        // points on the last lattice line belong to the previous cell
        if cx == width as isize - 1 && width > 1 {
            cx -= 1;
        }
        if cy == height as isize - 1 && height > 1 {
            cy -= 1;
        }
        let corners = [(cx, cy), (cx + 1, cy), (cx + 1, cy + 1), (cx, cy + 1)];
        let present: Vec<usize> = corners
            .iter()
            .filter_map(|&(x, y)| self.sample_at_cell(x, y))
            .collect();
        let patch = match present.as_slice() {
            [] => return None,
            [a] => Patch::Point([*a]),
            [a, b] => Patch::Segment([*a, *b]),
            [a, b, c] => Patch::Triangle([*a, *b, *c]),
            [a, b, c, d] => Patch::Quad([*a, *b, *c, *d]),
            _ => return None,
        };
        let nh = SampleNeighborhood::new(self, patch, q);
        nh.contains(q).then_some(nh)
    }
}

fn project_to_segment(a: Vec2, b: Vec2, q: Vec2) -> f64 {
    let ab = b - a;
    let len2 = ab.length_squared();
    if len2 <= 0.0 {
        return 0.0;
    }
    ((q - a).dot(ab) / len2).clamp(0.0, 1.0)
}

fn barycentric(a: Vec2, b: Vec2, c: Vec2, q: Vec2) -> Option<[f64; 3]> {
    let denom = (b - a).cross(c - a);
    if denom.abs() <= f64::EPSILON {
        return None;
    }
    let wb = (q - a).cross(c - a) / denom;
    let wc = (b - a).cross(q - a) / denom;
    Some([1.0 - wb - wc, wb, wc])
}

fn bounds(pts: &[Vec2]) -> (Vec2, Vec2) {
    pts.iter().fold(
        (Vec2::new(f64::INFINITY, f64::INFINITY), Vec2::new(f64::NEG_INFINITY, f64::NEG_INFINITY)),
        |(lo, hi), &p| (lo.min(p), hi.max(p)),
    )
}

fn compute_weights(layer: &MeshLayer, patch: &Patch, q: Vec2) -> [f64; 4] {
    let pts: Vec<Vec2> = patch
        .samples()
        .iter()
        .map(|&i| layer.sample(i).position)
        .collect();
    let mut weights = [0.0; 4];
    match patch {
        Patch::Point(_) => weights[0] = 1.0,
        Patch::Segment(_) => {
            let t = project_to_segment(pts[0], pts[1], q);
            weights[0] = 1.0 - t;
            weights[1] = t;
        }
        Patch::Triangle(_) => {
            let bary = barycentric(pts[0], pts[1], pts[2], q).unwrap_or([1.0 / 3.0; 3]);
            let clamped = bary.map(|w| w.max(0.0));
            let sum: f64 = clamped.iter().sum();
            for k in 0..3 {
                weights[k] = if sum > 0.0 { clamped[k] / sum } else { 1.0 / 3.0 };
            }
        }
        Patch::Quad(_) => {
            let (lo, hi) = bounds(&pts);
            let dx = (hi.x - lo.x).max(f64::EPSILON);
            let dy = (hi.y - lo.y).max(f64::EPSILON);
            let mut sum = 0.0;
            for (k, p) in pts.iter().enumerate() {
                let wx = 1.0 - ((q.x - p.x).abs() / dx).clamp(0.0, 1.0);
                let wy = 1.0 - ((q.y - p.y).abs() / dy).clamp(0.0, 1.0);
                weights[k] = wx * wy;
                sum += weights[k];
            }
            if sum > 0.0 {
                for w in &mut weights {
                    *w /= sum;
                }
            } else {
                weights = [0.25; 4];
            }
        }
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(skip: Option<(usize, usize)>) -> MeshLayer {
        let mut layer = MeshLayer::new(0, 0, Vec2::ZERO, 1.0, 3, 3);
        for cy in 0..3 {
            for cx in 0..3 {
                if Some((cx, cy)) != skip {
                    let i = layer.add_sample(cx, cy, cy as f64 * 10.0);
                    layer.sample_mut(i).curvature = cx as f64;
                }
            }
        }
        layer
    }

    #[test]
    fn quad_weights_are_bilinear() {
        let layer = layer(None);
        let nh = layer.neighborhood(Vec2::new(0.25, 0.5)).unwrap();
        assert_eq!(nh.degree(), 4);
        let sum: f64 = nh.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert!((nh.interpolate_with(|s| s.time) - 5.0).abs() < 1e-12);
        assert!((nh.interpolate_with(|s| s.curvature) - 0.25).abs() < 1e-12);
        assert_eq!(nh.orientation(), Orientation::Ccw);
    }

    #[test]
    fn missing_corner_yields_triangle() {
        let layer = layer(Some((1, 1)));
        let nh = layer.neighborhood(Vec2::new(0.2, 0.2)).unwrap();
        assert_eq!(nh.degree(), 3);
        let p = nh.position();
        assert!(p.distance_to(Vec2::new(0.2, 0.2)) < 1e-9);
        assert!(!nh.contains(Vec2::new(0.9, 0.9)));
    }

    #[test]
    fn last_lattice_line_is_covered() {
        let layer = layer(None);
        let nh = layer.neighborhood(Vec2::new(2.0, 2.0)).unwrap();
        assert!((nh.interpolate_with(|s| s.time) - 20.0).abs() < 1e-12);
        assert!(layer.neighborhood(Vec2::new(5.0, 5.0)).is_none());
    }

    #[test]
    fn value_edges_bracket_the_value() {
        let layer = layer(None);
        let nh = layer.neighborhood(Vec2::new(0.5, 0.5)).unwrap();
        assert!(nh.has_value(|s| s.time, 2.5));
        assert!(!nh.has_value(|s| s.time, 12.5));
        let edges = nh.value_edges(|s| s.time, 2.5);
        assert_eq!(edges.len(), 2);
        for edge in &edges {
            assert!((edge.alpha() - 0.25).abs() < 1e-12 || (edge.alpha() - 0.75).abs() < 1e-12);
        }
    }

    #[test]
    fn flat_edges_use_zero_alpha() {
        let layer = layer(None);
        let nh = SampleNeighborhood::new(&layer, Patch::Segment([0, 1]), Vec2::new(0.5, 0.0));
        let edges = nh.value_edges(|s| s.time, 0.0);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].alpha(), 0.0);
    }

    #[test]
    fn oriented_flips_winding_and_weights() {
        let layer = layer(None);
        let nh = layer.neighborhood(Vec2::new(0.1, 0.1)).unwrap();
        let cw = nh.oriented(false);
        assert_eq!(cw.orientation(), Orientation::Cw);
        assert!((cw.interpolate_with(|s| s.time) - nh.interpolate_with(|s| s.time)).abs() < 1e-12);
        assert_eq!(nh.oriented(true).samples(), nh.samples());
    }
}
