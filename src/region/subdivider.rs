//! Splitting of long simple regions by tracing intermediate isolines.
//!
//! # Example
//!
//! ```ignore
//! let report = subdivide_regions(&mut mesh, &tracer, SubdivisionOptions::new(10.0))?;
//! assert!(report.warnings.is_empty());
//! ```

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::error::SamplingError;
use crate::mesh::{
    CoursePath, IsolineTracer, RegionId, RegionNode, SampleEdge, SampleRef, TimeMesh,
};
use crate::params::SamplingParams;

/// Minimum separation of split times, in units of the maximum time range.
pub const SPLIT_MARGIN: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubdivisionOptions {
    pub max_dt: f64,
    /// Ignore user split hints and only use uniform candidates.
    pub uniform_split: bool,
}

impl SubdivisionOptions {
    #[must_use]
    pub const fn new(max_dt: f64) -> Self {
        Self {
            max_dt,
            uniform_split: false,
        }
    }

    #[must_use]
    pub const fn from_params(params: &SamplingParams) -> Self {
        Self {
            max_dt: params.max_region_dt,
            uniform_split: params.uniform_region_split,
        }
    }

    #[must_use]
    pub const fn uniform_split(mut self, uniform: bool) -> Self {
        self.uniform_split = uniform;
        self
    }
}

/// Outcome of [`subdivide_regions`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubdivisionReport {
    /// Split times per original region.
    pub splits: BTreeMap<RegionId, Vec<f64>>,
    pub warnings: Vec<String>,
}

impl SubdivisionReport {
    #[must_use]
    pub fn inserted_regions(&self) -> usize {
        self.splits.values().map(Vec::len).sum()
    }
}

/// Split times of a simple region whose time range exceeds `max_dt`.
#[must_use]
pub fn split_times(node: &RegionNode, options: SubdivisionOptions) -> Vec<f64> {
    let (t_min, t_max) = (node.t_min, node.t_max);
    let dt = t_max - t_min;
    if !node.is_simple() || !(dt > options.max_dt) || options.max_dt <= 0.0 {
        return Vec::new();
    }
    let k = (dt / options.max_dt).floor() as usize;
    let margin = SPLIT_MARGIN * options.max_dt;

    let mut candidates: Vec<f64> = if options.uniform_split {
        Vec::new()
    } else {
        node.split_hints.clone()
    };
    candidates.extend((0..=k).map(|i| t_min + dt * i as f64 / k as f64));
    candidates.retain(|t| (t - t_min).abs() >= margin && (t - t_max).abs() >= margin);
    candidates.sort_by(f64::total_cmp);

    let mut accepted: Vec<f64> = Vec::new();
    for t in candidates {
        if accepted.iter().all(|a| (t - a).abs() >= margin) {
            accepted.push(t);
        }
    }
    accepted
}

/// Lattice edge from `sample` to a neighbor that brackets `time`.
fn edges_containing(mesh: &TimeMesh, sample: SampleRef, time: f64) -> Vec<SampleEdge> {
    let layer = mesh.layer(sample.layer);
    let t0 = layer.sample(sample.index).time;
    layer
        .neighbors(sample.index)
        .into_iter()
        .filter_map(|n| {
            let t1 = layer.sample(n).time;
            if t0.min(t1) > time || t0.max(t1) < time {
                return None;
            }
            let alpha = if t0 == t1 { 0.0 } else { (time - t0) / (t1 - t0) };
            Some(SampleEdge::new(sample, SampleRef::new(sample.layer, n), alpha))
        })
        .collect()
}

fn trace_from(
    mesh: &TimeMesh,
    tracer: &dyn IsolineTracer,
    region: RegionId,
    time: f64,
    samples: &[SampleRef],
    accept: impl Fn(Option<RegionId>) -> bool,
) -> Option<CoursePath> {
    samples
        .iter()
        .filter(|&&s| accept(mesh.sample(s).region))
        .flat_map(|&s| edges_containing(mesh, s, time))
        .find_map(|edge| tracer.trace(mesh, region, time, &edge))
}

/// Traces the isoline of `time` inside `region`.
///
/// Border samples of the region are tried first, then border samples of
/// adjacent interfaces when the region holds no sample, then inner samples
/// (with a warning).
pub fn find_isoline(
    mesh: &TimeMesh,
    tracer: &dyn IsolineTracer,
    region: RegionId,
    time: f64,
    warnings: &mut Vec<String>,
) -> Result<CoursePath, SamplingError> {
    let node = mesh
        .graph
        .node(region)
        .ok_or(SamplingError::UnresolvedSplit { region, time })?;
    let border = mesh.border_samples();

    if let Some(path) = trace_from(mesh, tracer, region, time, &border, |r| r == Some(region)) {
        return Ok(path);
    }

    if node.sample_count == 0 {
        let adjacent: Vec<RegionId> = node
            .inputs
            .iter()
            .chain(&node.outputs)
            .filter_map(|&e| mesh.graph.edge_interface(e))
            .collect();
        let found = trace_from(mesh, tracer, region, time, &border, |r| {
            r.is_some_and(|r| adjacent.contains(&r))
        });
        if let Some(path) = found {
            return Ok(path);
        }
    }

    let message = format!(
        "isoline at t={time} not found from borders of region {}, using inner samples",
        region.0
    );
    warn!("{message}");
    warnings.push(message);
    let inner = mesh.inner_samples();
    trace_from(mesh, tracer, region, time, &inner, |r| r == Some(region))
        .ok_or(SamplingError::UnresolvedSplit { region, time })
}

/// Traces every requested split time, returning the isolines sorted by time.
pub fn splitting_isolines(
    mesh: &TimeMesh,
    tracer: &dyn IsolineTracer,
    split_map: &BTreeMap<RegionId, Vec<f64>>,
    warnings: &mut Vec<String>,
) -> Result<BTreeMap<RegionId, Vec<(f64, CoursePath)>>, SamplingError> {
    let mut result = BTreeMap::new();
    for (&region, times) in split_map {
        let mut sorted = times.clone();
        sorted.sort_by(f64::total_cmp);
        let mut isolines = Vec::with_capacity(sorted.len());
        for t in sorted {
            isolines.push((t, find_isoline(mesh, tracer, region, t, warnings)?));
        }
        result.insert(region, isolines);
    }
    Ok(result)
}

/// Splits every simple region longer than `max_dt`.
///
/// Each split time becomes a trivial interface between two simple regions;
/// samples above a split move to the region they now belong to.
pub fn subdivide_regions(
    mesh: &mut TimeMesh,
    tracer: &dyn IsolineTracer,
    options: SubdivisionOptions,
) -> Result<SubdivisionReport, SamplingError> {
    let mut report = SubdivisionReport::default();
    let split_map: BTreeMap<RegionId, Vec<f64>> = mesh
        .graph
        .simple_regions()
        .map(|node| (node.id, split_times(node, options)))
        .filter(|(_, times)| !times.is_empty())
        .collect();
    if split_map.is_empty() {
        return Ok(report);
    }

    let isolines = splitting_isolines(mesh, tracer, &split_map, &mut report.warnings)?;
    for (region, lines) in isolines {
        insert_splits(mesh, region, lines)?;
        debug!(
            "region {} split at {:?}",
            region.0,
            split_map.get(&region).map(Vec::as_slice).unwrap_or_default()
        );
    }
    mesh.recount_regions();
    report.splits = split_map;
    Ok(report)
}

fn insert_splits(
    mesh: &mut TimeMesh,
    region: RegionId,
    lines: Vec<(f64, CoursePath)>,
) -> Result<(), SamplingError> {
    let node = mesh
        .graph
        .node(region)
        .ok_or_else(|| SamplingError::Invariant(format!("unknown region {}", region.0)))?;
    let (t_min, t_max) = (node.t_min, node.t_max);
    let outputs = node.outputs.clone();

    let mut bounds = Vec::with_capacity(lines.len());
    let mut previous = region;
    let mut previous_start = t_min;
    for (t, course) in lines {
        mesh.graph.set_time_range(previous, previous_start, t);
        let interface = mesh.graph.add_interface(t);
        let next = mesh.graph.add_simple(t, t_max);
        mesh.graph.connect(previous, interface, course.clone())?;
        mesh.graph.connect(interface, next, course)?;
        bounds.push((t, next));
        previous = next;
        previous_start = t;
    }
    for edge in outputs {
        mesh.graph.retarget_source(edge, previous);
    }

    for layer in &mut mesh.layers {
        for sample in layer.samples_mut() {
            if sample.region != Some(region) {
                continue;
            }
            if let Some(&(_, target)) = bounds.iter().rev().find(|(t, _)| sample.time > *t) {
                sample.region = Some(target);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::mesh::RegionGraph;
    use crate::mesh::primitives::TubeSketch;

    /// Declines every trace that starts on one of `refused`.
    struct Refusing<'a> {
        tube: &'a TubeSketch,
        refused: HashSet<SampleRef>,
    }

    impl IsolineTracer for Refusing<'_> {
        fn trace(
            &self,
            mesh: &TimeMesh,
            region: RegionId,
            time: f64,
            start: &SampleEdge,
        ) -> Option<CoursePath> {
            if self.refused.contains(&start.source()) {
                return None;
            }
            self.tube.trace(mesh, region, time, start)
        }
    }

    fn region(t_min: f64, t_max: f64) -> RegionNode {
        let mut graph = RegionGraph::new();
        let id = graph.add_simple(t_min, t_max);
        graph.node(id).cloned().unwrap()
    }

    #[test]
    fn uniform_candidates_respect_margins() {
        let node = region(0.0, 30.0);
        assert_eq!(split_times(&node, SubdivisionOptions::new(10.0)), vec![10.0, 20.0]);
        assert!(split_times(&region(0.0, 10.0), SubdivisionOptions::new(10.0)).is_empty());
    }

    #[test]
    fn hints_compete_with_uniform_candidates() {
        let mut node = region(0.0, 30.0);
        node.split_hints = vec![3.0, 12.0];
        // 3 violates the boundary margin and 12 is too close to 10
        assert_eq!(split_times(&node, SubdivisionOptions::new(10.0)), vec![10.0, 20.0]);
        node.split_hints = vec![7.0];
        assert_eq!(split_times(&node, SubdivisionOptions::new(10.0)), vec![7.0, 20.0]);
        let uniform = SubdivisionOptions::new(10.0).uniform_split(true);
        assert_eq!(split_times(&node, uniform), vec![10.0, 20.0]);
    }

    #[test]
    fn subdivision_inserts_trivial_interfaces() {
        let tube = TubeSketch::new(10.0, 30.0, 1.0);
        let mut mesh = tube.build();
        let report = subdivide_regions(&mut mesh, &tube, SubdivisionOptions::new(10.0)).unwrap();
        assert_eq!(report.inserted_regions(), 2);
        assert!(report.warnings.is_empty());

        let simple: Vec<_> = mesh.graph.simple_regions().collect();
        assert_eq!(simple.len(), 3);
        assert!(mesh.graph.validate().is_ok());
        let mut ranges: Vec<(f64, f64)> = simple.iter().map(|n| (n.t_min, n.t_max)).collect();
        ranges.sort_by(|a, b| a.0.total_cmp(&b.0));
        assert_eq!(ranges, vec![(0.0, 10.0), (10.0, 20.0), (20.0, 30.0)]);
        for node in mesh.graph.interfaces() {
            assert!(node.inputs.len() <= 1 && node.outputs.len() <= 1);
        }
        assert!(mesh.graph.simple_regions().all(|n| n.sample_count > 0));
        assert!(mesh.graph.topological_order().is_ok());
    }

    #[test]
    fn border_failures_fall_back_to_inner_samples() {
        let tube = TubeSketch::new(10.0, 30.0, 1.0);
        let mut mesh = tube.build();
        let tracer = Refusing {
            tube: &tube,
            refused: mesh.border_samples().into_iter().collect(),
        };
        let report = subdivide_regions(&mut mesh, &tracer, SubdivisionOptions::new(10.0)).unwrap();
        assert_eq!(report.inserted_regions(), 2);
        // one warning per split time
        assert_eq!(report.warnings.len(), 2);
        assert!(report.warnings.iter().all(|w| w.contains("using inner samples")));
        assert!(mesh.graph.validate().is_ok());
    }

    #[test]
    fn untraceable_split_is_reported() {
        let tube = TubeSketch::new(10.0, 30.0, 1.0);
        let mut mesh = tube.build();
        let everything: HashSet<SampleRef> = mesh
            .border_samples()
            .into_iter()
            .chain(mesh.inner_samples())
            .collect();
        let region = mesh.graph.simple_regions().next().unwrap().id;
        let tracer = Refusing {
            tube: &tube,
            refused: everything,
        };
        let mut warnings = Vec::new();
        match find_isoline(&mesh, &tracer, region, 10.0, &mut warnings) {
            Err(SamplingError::UnresolvedSplit { region: r, time }) => {
                assert_eq!(r, region);
                assert_eq!(time, 10.0);
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(warnings.len(), 1);

        let err = subdivide_regions(&mut mesh, &tracer, SubdivisionOptions::new(10.0)).unwrap_err();
        assert!(matches!(err, SamplingError::UnresolvedSplit { .. }));
    }
}
