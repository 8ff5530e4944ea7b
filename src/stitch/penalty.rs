//! Wale penalties between stitches, memoized per stitch pair.
//!
//! ```text
//! base(s, t) = dist_w · (d / wale_dist)²
//! wale(s, t) = dist_w · (diff / wale_dist)²
//!            + seam_w · Σ_{irregular ends} min(seam_support, seam(p) / course_dist)
//!            + flow_w · Σ_{ends} (1 − ⟨direction, flow⟩)
//! ```
//!
//! where `d` is the geodesic distance and `diff = d − wale_dist` when
//! `min_wale_diff` is set (`d` otherwise).

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::core::Vec2;
use crate::mesh::{GeodesicPath, TimeMesh};
use crate::params::SamplingParams;
use crate::solver::Oracles;

use super::set::StitchSet;

/// Distance used for stitch pairs the distance oracle cannot connect.
pub const UNREACHABLE: f64 = 1e9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenaltyWeights {
    pub dist: f64,
    pub seam: f64,
    pub flow: f64,
    pub seam_support: f64,
    pub min_wale_diff: bool,
    pub course_dist: f64,
    pub wale_dist: f64,
}

impl PenaltyWeights {
    #[must_use]
    pub fn from_params(params: &SamplingParams) -> Self {
        let w = &params.weights;
        Self {
            dist: w.dist,
            seam: w.seam,
            flow: w.flow,
            seam_support: w.seam_support,
            min_wale_diff: w.min_wale_diff,
            course_dist: params.course_dist,
            wale_dist: params.wale_dist,
        }
    }
}

/// Geodesic data of one stitch pair.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PairEntry {
    dist: f64,
    flow: f64,
}

/// Cache statistics for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PenaltyCacheStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
}

impl PenaltyCacheStats {
    /// Hit rate in `[0, 1]`; zero before any lookup.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Pair-indexed memo of geodesic distances and flow costs.
#[derive(Debug, Default)]
pub struct PenaltyCache {
    pairs: RefCell<HashMap<(u32, u32), PairEntry>>,
    hits: Cell<usize>,
    misses: Cell<usize>,
}

impl PenaltyCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_insert_with(&self, key: (u32, u32), compute: impl FnOnce() -> PairEntry) -> PairEntry {
        if let Some(entry) = self.pairs.borrow().get(&key) {
            self.hits.set(self.hits.get() + 1);
            return *entry;
        }
        self.misses.set(self.misses.get() + 1);
        let entry = compute();
        self.pairs.borrow_mut().insert(key, entry);
        entry
    }

    /// Drops every entry and zeroes the counters.
    pub fn clear(&mut self) {
        self.pairs.get_mut().clear();
        self.hits.set(0);
        self.misses.set(0);
    }

    #[must_use]
    pub fn stats(&self) -> PenaltyCacheStats {
        PenaltyCacheStats {
            entries: self.pairs.borrow().len(),
            hits: self.hits.get(),
            misses: self.misses.get(),
        }
    }
}

/// Penalty evaluator bound to a mesh and its oracles.
pub struct Penalties<'a> {
    mesh: &'a TimeMesh,
    oracles: Oracles<'a>,
    weights: PenaltyWeights,
    cache: PenaltyCache,
}

impl<'a> Penalties<'a> {
    #[must_use]
    pub fn new(mesh: &'a TimeMesh, oracles: Oracles<'a>, weights: PenaltyWeights) -> Self {
        Self {
            mesh,
            oracles,
            weights,
            cache: PenaltyCache::new(),
        }
    }

    #[must_use]
    pub const fn weights(&self) -> &PenaltyWeights {
        &self.weights
    }

    #[must_use]
    pub fn cache_stats(&self) -> PenaltyCacheStats {
        self.cache.stats()
    }

    /// Resets the memo and its counters; stitch indices are only stable
    /// within one stitch set.
    pub fn reset(&mut self) {
        self.cache.clear();
    }

    /// Geodesic between two stitches, if the distance oracle finds one.
    #[must_use]
    pub fn geodesic(&self, stitches: &StitchSet, source: usize, target: usize) -> Option<GeodesicPath> {
        self.oracles.distance.query_between(
            stitches.layer(source),
            stitches.position(source),
            stitches.layer(target),
            stitches.position(target),
            false,
        )
    }

    fn flow_at(&self, layer: usize, p: Vec2) -> Option<Vec2> {
        if layer >= self.mesh.layers.len() {
            return None;
        }
        self.mesh
            .layer(layer)
            .neighborhood(p)?
            .interpolate_vec(|s| s.flow)
            .normalized()
    }

    fn entry(&self, stitches: &StitchSet, source: usize, target: usize) -> PairEntry {
        self.cache.get_or_insert_with((source as u32, target as u32), || {
            let Some(path) = self.geodesic(stitches, source, target) else {
                return PairEntry {
                    dist: UNREACHABLE,
                    flow: 0.0,
                };
            };
            let mut flow = 0.0;
            let start = path.start();
            if let (Some(d), Some(f)) = (path.start_direction(), self.flow_at(start.layer, start.position)) {
                flow += 1.0 - d.dot(f);
            }
            let end = path.end();
            if let (Some(d), Some(f)) = (path.end_direction(), self.flow_at(end.layer, end.position)) {
                flow += 1.0 - d.dot(f);
            }
            PairEntry {
                dist: path.dist(),
                flow,
            }
        })
    }

    /// Distance-only penalty.
    #[must_use]
    pub fn base(&self, stitches: &StitchSet, source: usize, target: usize) -> f64 {
        let d = self.entry(stitches, source, target).dist / self.weights.wale_dist;
        self.weights.dist * d * d
    }

    fn seam_term(&self, stitches: &StitchSet, index: usize) -> f64 {
        let d = self
            .oracles
            .seams
            .seam_distance(stitches.layer(index), stitches.position(index));
        (d / self.weights.course_dist).min(self.weights.seam_support)
    }

    /// Full wale penalty; `*_irregular` marks ends taking part in a shaping link.
    #[must_use]
    pub fn wale(
        &self,
        stitches: &StitchSet,
        source: usize,
        target: usize,
        source_irregular: bool,
        target_irregular: bool,
    ) -> f64 {
        let w = &self.weights;
        let entry = self.entry(stitches, source, target);
        let diff = if w.min_wale_diff {
            entry.dist - w.wale_dist
        } else {
            entry.dist
        };
        let mut penalty = w.dist * (diff / w.wale_dist).powi(2);
        if source_irregular {
            penalty += w.seam * self.seam_term(stitches, source);
        }
        if target_irregular {
            penalty += w.seam * self.seam_term(stitches, target);
        }
        penalty + w.flow * entry.flow
    }

    /// Seam distance of a point, in course distances.
    #[must_use]
    pub fn seam_distance(&self, layer: usize, p: Vec2) -> f64 {
        self.oracles.seams.seam_distance(layer, p) / self.weights.course_dist
    }
}

impl std::fmt::Debug for Penalties<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Penalties")
            .field("weights", &self.weights)
            .field("cache", &self.cache.stats())
            .finish_non_exhaustive()
    }
}
