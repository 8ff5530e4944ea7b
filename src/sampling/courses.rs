//! Coarse course plan: which courses exist, how regions chain them and which
//! interfaces need a wale binding.

use std::collections::HashMap;

use crate::core::Tolerance;
use crate::error::SamplingError;
use crate::mesh::{CoursePath, RegionId, TimeMesh, stitch_alpha};
use crate::solver::{AlignStep, RegionSolution, ShortRowSolution};
use crate::stitch::StitchPoint;

/// One coarse course with its solved stitch count.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseSlot {
    /// Counter-clockwise course path.
    pub path: CoursePath,
    pub count: usize,
    pub time: f64,
    pub region: RegionId,
}

impl CourseSlot {
    #[must_use]
    pub fn is_circular(&self) -> bool {
        self.path.is_circular()
    }

    /// Stitch locations along the path at the given density multiplier.
    #[must_use]
    pub fn stitch_points(&self, density: usize) -> Vec<StitchPoint> {
        let n = self.count * density;
        (0..n)
            .map(|i| {
                let alpha = stitch_alpha(i, n);
                let point = self.path.sample_at(alpha);
                StitchPoint::new(point.layer, point.position, alpha)
            })
            .collect()
    }
}

/// Consecutive courses inside one simple region.
#[derive(Debug, Clone, PartialEq)]
pub struct CoursePair {
    pub region: RegionId,
    pub source: usize,
    pub target: usize,
    pub short_rows: ShortRowSolution,
}

/// Interface whose input and output courses are joined by a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceSlot {
    pub region: RegionId,
    pub inputs: Vec<usize>,
    pub outputs: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoursePlan {
    pub courses: Vec<CourseSlot>,
    /// Course of every region edge, by edge id.
    pub edge_courses: Vec<usize>,
    pub pairs: Vec<CoursePair>,
    pub interfaces: Vec<InterfaceSlot>,
}

impl CoursePlan {
    #[must_use]
    pub fn stitch_count(&self) -> usize {
        self.courses.iter().map(|c| c.count).sum()
    }

    /// Whether `course` is the source of some pair; `false` for the last
    /// course of every region chain.
    #[must_use]
    pub fn starts_pair(&self, course: usize) -> bool {
        self.pairs.iter().any(|p| p.source == course)
    }

    /// Lays out every course from the global edge counts and the solved
    /// regions.
    ///
    /// The two edges around a single-input single-output interface share one
    /// course when their isolines match and their counts agree.
    pub fn build(
        mesh: &TimeMesh,
        counts: &[usize],
        regions: &[RegionSolution],
    ) -> Result<Self, SamplingError> {
        let graph = &mesh.graph;
        if counts.len() != graph.edge_count() {
            return Err(SamplingError::Invariant(format!(
                "{} edge counts for {} edges",
                counts.len(),
                graph.edge_count()
            )));
        }
        let eps = Tolerance::CONTAINS;
        let paths: Vec<CoursePath> = graph.edges().iter().map(|e| e.course.oriented(true).0).collect();

        let mut partner: HashMap<usize, usize> = HashMap::new();
        let mut merged = Vec::new();
        for node in graph.interfaces().filter(|n| n.is_trivial_interface()) {
            let (a, b) = (node.inputs[0].0, node.outputs[0].0);
            if counts[a] == counts[b] && paths[a].matches(&paths[b], eps) {
                partner.insert(a, b);
                partner.insert(b, a);
                merged.push(node.id);
            }
        }

        let mut plan = Self::default();
        let mut edge_courses: Vec<Option<usize>> = vec![None; counts.len()];
        for edge in graph.edges() {
            let e = edge.id.0;
            if edge_courses[e].is_some() {
                continue;
            }
            let region = graph.edge_region(edge.id).unwrap_or(edge.source);
            plan.courses.push(CourseSlot {
                path: paths[e].clone(),
                count: counts[e],
                time: edge.time,
                region,
            });
            let course = plan.courses.len() - 1;
            edge_courses[e] = Some(course);
            if let Some(&other) = partner.get(&e) {
                edge_courses[other] = Some(course);
            }
        }
        plan.edge_courses = edge_courses.into_iter().flatten().collect();

        for solution in regions {
            let node = graph.node(solution.region).ok_or_else(|| {
                SamplingError::Invariant(format!("unknown region {}", solution.region.0))
            })?;
            let (Some(input), Some(output)) = (node.inputs.first(), node.outputs.first()) else {
                return Err(SamplingError::Invariant(format!(
                    "region {} lacks a boundary course",
                    node.id.0
                )));
            };
            let mut chain = vec![plan.edge_courses[input.0]];
            for ((time, path), &count) in solution.isolines.iter().zip(&solution.counts) {
                plan.courses.push(CourseSlot {
                    path: path.clone(),
                    count,
                    time: *time,
                    region: node.id,
                });
                chain.push(plan.courses.len() - 1);
            }
            chain.push(plan.edge_courses[output.0]);
            if solution.short_rows.len() + 1 != chain.len() {
                return Err(SamplingError::Invariant(format!(
                    "region {} has {} short-row solutions for {} courses",
                    node.id.0,
                    solution.short_rows.len(),
                    chain.len()
                )));
            }
            for (pair, short_rows) in chain.windows(2).zip(&solution.short_rows) {
                plan.pairs.push(CoursePair {
                    region: node.id,
                    source: pair[0],
                    target: pair[1],
                    short_rows: short_rows.clone(),
                });
            }
        }

        for node in graph.interfaces() {
            if node.inputs.is_empty() || node.outputs.is_empty() || merged.contains(&node.id) {
                continue;
            }
            plan.interfaces.push(InterfaceSlot {
                region: node.id,
                inputs: node.inputs.iter().map(|e| plan.edge_courses[e.0]).collect(),
                outputs: node.outputs.iter().map(|e| plan.edge_courses[e.0]).collect(),
            });
        }
        Ok(plan)
    }
}

/// Group of wales whose stitches only connect among themselves: one source
/// to one or two targets, or two sources to one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub sources: Vec<usize>,
    pub targets: Vec<usize>,
}

impl Cluster {
    /// Clusters of an alignment between the course starting at `source_start`
    /// (`ns` stitches) and the one at `target_start` (`nt` stitches).
    #[must_use]
    pub fn from_steps(
        steps: &[AlignStep],
        (source_start, ns): (usize, usize),
        (target_start, nt): (usize, usize),
    ) -> Vec<Self> {
        steps
            .iter()
            .map(|step| {
                let (ds, dt) = step.linking.deltas();
                Self {
                    sources: (0..ds).map(|k| source_start + (step.source + k) % ns).collect(),
                    targets: (0..dt).map(|k| target_start + (step.target + k) % nt).collect(),
                }
            })
            .collect()
    }

    /// Groups consecutive `(source, target)` wales sharing a stitch.
    #[must_use]
    pub fn from_pairs(pairs: &[(usize, usize)]) -> Vec<Self> {
        let mut clusters: Vec<Self> = Vec::new();
        let mut last: Option<(usize, usize)> = None;
        for &(s, t) in pairs {
            match (last, clusters.last_mut()) {
                (Some((ls, _)), Some(cluster)) if ls == s && cluster.sources.len() == 1 => {
                    cluster.targets.push(t);
                }
                (Some((_, lt)), Some(cluster)) if lt == t && cluster.targets.len() == 1 => {
                    cluster.sources.push(s);
                }
                _ => clusters.push(Self {
                    sources: vec![s],
                    targets: vec![t],
                }),
            }
            last = Some((s, t));
        }
        clusters
    }

    #[must_use]
    pub fn is_regular(&self) -> bool {
        self.sources.len() == self.targets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::Linking;

    #[test]
    fn steps_wrap_around_the_target_ring() {
        let steps = [
            AlignStep {
                linking: Linking::OneOne,
                source: 0,
                target: 3,
            },
            AlignStep {
                linking: Linking::OneTwo,
                source: 1,
                target: 4,
            },
        ];
        let clusters = Cluster::from_steps(&steps, (10, 2), (20, 5));
        assert_eq!(clusters[0].sources, vec![10]);
        assert_eq!(clusters[0].targets, vec![23]);
        assert_eq!(clusters[1].sources, vec![11]);
        assert_eq!(clusters[1].targets, vec![24, 20]);
        assert!(clusters[0].is_regular());
        assert!(!clusters[1].is_regular());
    }

    #[test]
    fn pairs_group_by_shared_stitch() {
        let pairs = [(0, 10), (1, 11), (1, 12), (2, 13), (3, 13), (4, 14)];
        let clusters = Cluster::from_pairs(&pairs);
        assert_eq!(clusters.len(), 4);
        assert_eq!(clusters[1].targets, vec![11, 12]);
        assert_eq!(clusters[2].sources, vec![2, 3]);
        assert_eq!(clusters[3].sources, vec![4]);
    }
}
