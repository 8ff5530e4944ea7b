use std::time::Duration;

use crate::mesh::RegionId;
use crate::mesh::primitives::TubeSketch;
use crate::params::SamplingParams;
use crate::solver::{Batch, Oracles, RegionBoundary, RegionSolver, isoline_counts};

#[test]
fn candidates_alternate_around_the_wale_estimate() {
    assert_eq!(isoline_counts(100.0, 10.0, 40, 40, 2.0, 3), vec![9, 10, 8]);
    // 40 → 5 needs at least two intermediate isolines at S = 2
    assert_eq!(isoline_counts(20.0, 10.0, 40, 5, 2.0, 3), vec![2, 3, 4]);
    assert_eq!(isoline_counts(5.0, 10.0, 8, 8, 2.0, 1), vec![0]);
}

fn tube_solver<'a>(
    tube: &'a TubeSketch,
    mesh: &'a crate::mesh::TimeMesh,
    params: &'a SamplingParams,
) -> RegionSolver<'a> {
    RegionSolver::new(
        mesh,
        Oracles::new(tube, tube),
        params,
        RegionId(1),
        RegionBoundary::new(tube.course_at(0.0), 4),
        RegionBoundary::new(tube.course_at(40.0), 4),
    )
    .unwrap()
}

#[test]
fn uniform_tube_gets_evenly_spaced_isolines() {
    let tube = TubeSketch::new(40.0, 40.0, 2.0);
    let mesh = tube.build();
    let params = SamplingParams::default();
    let solution = tube_solver(&tube, &mesh, &params).solve().unwrap();

    let times: Vec<f64> = solution.isolines.iter().map(|(t, _)| *t).collect();
    assert_eq!(times, vec![10.0, 20.0, 30.0]);
    assert_eq!(solution.counts, vec![4, 4, 4]);
    assert_eq!(solution.short_rows.len(), 4);
    assert!(solution.short_rows.iter().all(|s| s.total_rows() == 0));
    assert!(solution.error.abs() < 1e-9);
}

#[test]
fn search_resumes_across_batches() {
    let tube = TubeSketch::new(40.0, 40.0, 2.0);
    let mesh = tube.build();
    let params = SamplingParams::default();
    let mut solver = tube_solver(&tube, &mesh, &params);
    let batch = Batch::new(1, Duration::from_secs(1));
    let mut calls = 0;
    while !solver.iterate(batch).unwrap() {
        calls += 1;
        assert!(calls < 100);
    }
    // three stages per candidate plus the completion
    assert!(solver.steps() >= 4);
    let (solution, warnings) = solver.finish().unwrap();
    assert_eq!(solution.isoline_count(), 3);
    assert!(warnings.is_empty());
}

#[test]
fn interfaces_are_rejected() {
    let tube = TubeSketch::new(40.0, 40.0, 2.0);
    let mesh = tube.build();
    let params = SamplingParams::default();
    let result = RegionSolver::new(
        &mesh,
        Oracles::new(&tube, &tube),
        &params,
        RegionId(0),
        RegionBoundary::new(tube.course_at(0.0), 4),
        RegionBoundary::new(tube.course_at(0.0), 4),
    );
    assert!(result.is_err());
}
