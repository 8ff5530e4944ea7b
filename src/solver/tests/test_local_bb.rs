use crate::error::SamplingError;
use crate::solver::{LocalBranchAndBound, LocalOptions, LocalProblem, NoRelaxation};

fn solve(problem: LocalProblem) -> Result<crate::solver::LocalCounts, SamplingError> {
    LocalBranchAndBound::new(problem, LocalOptions::default(), &NoRelaxation).solve()
}

#[test]
fn single_isoline_is_pinned_by_shaping() {
    let problem = LocalProblem::new(10, 40, vec![20.0], 2.0);
    assert_eq!(problem.bounds(0, 10_000), (20, 20));
    let counts = solve(problem).unwrap();
    assert_eq!(counts.counts, vec![20]);
    assert!((counts.error - 500.0).abs() < 1e-9);
}

#[test]
fn inner_counts_compromise_between_targets_and_boundaries() {
    let counts = solve(LocalProblem::new(10, 10, vec![12.0, 12.0], 2.0)).unwrap();
    assert_eq!(counts.counts, vec![11, 11]);
    assert!((counts.error - 4.0).abs() < 1e-9);
}

#[test]
fn shaping_chain_doubles_each_step() {
    let problem = LocalProblem::new(4, 32, vec![5.0, 5.0], 2.0);
    assert_eq!(problem.bounds(0, 10_000), (8, 8));
    assert_eq!(problem.bounds(1, 10_000), (16, 16));
    let counts = solve(problem).unwrap();
    assert_eq!(counts.counts, vec![8, 16]);
    for pair in [4, 8, 16, 32].windows(2) {
        assert!(pair[1] <= pair[0] * 2 && pair[0] <= pair[1] * 2);
    }
}

#[test]
fn empty_region_only_measures_boundary_mismatch() {
    let counts = solve(LocalProblem::new(10, 12, Vec::new(), 2.0)).unwrap();
    assert!(counts.counts.is_empty());
    assert!((counts.error - 4.0).abs() < 1e-9);

    let infeasible = solve(LocalProblem::new(10, 30, Vec::new(), 2.0));
    assert!(matches!(infeasible, Err(SamplingError::NoSolution { stage: "local" })));
}

#[test]
fn targets_interpolate_boundary_lengths() {
    let problem = LocalProblem::from_lengths((10, 100.0), (20, 200.0), &[150.0], 10.0, true, 2.0);
    assert!((problem.cdata[0] - 15.0).abs() < 1e-9);

    let problem = LocalProblem::from_lengths((10, 100.0), (10, 100.0), &[100.0, 20.0], 10.0, true, 2.0);
    assert!((problem.cdata[0] - 10.0).abs() < 1e-9);
    assert_eq!(problem.cdata[1], 4.0);

    let problem = LocalProblem::from_lengths((10, 100.0), (20, 200.0), &[150.0], 5.0, false, 2.0);
    assert!((problem.cdata[0] - 30.0).abs() < 1e-9);
}
