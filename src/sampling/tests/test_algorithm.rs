use std::time::Duration;

use crate::error::SamplingError;
use crate::mesh::primitives::TubeSketch;
use crate::params::SamplingParams;
use crate::sampling::{SamplingAlgorithm, SamplingStage};
use crate::solver::{Batch, Oracles};

fn run_to(sampler: &mut SamplingAlgorithm<'_>, stage: SamplingStage) {
    let mut calls = 0;
    while sampler.stage() < stage && !sampler.is_done() {
        sampler.iterate(Batch::unbounded()).unwrap();
        calls += 1;
        assert!(calls < 100);
    }
}

#[test]
fn flat_tube_plans_five_courses() {
    let tube = TubeSketch::new(40.0, 40.0, 2.0);
    let mesh = tube.build();
    let mut sampler =
        SamplingAlgorithm::new(&mesh, SamplingParams::default(), Oracles::new(&tube, &tube)).unwrap();
    run_to(&mut sampler, SamplingStage::Instantiate);

    assert_eq!(sampler.global_solution().unwrap().counts, vec![4, 4]);
    assert_eq!(sampler.region_solutions().len(), 1);
    let plan = sampler.plan();
    assert_eq!(plan.courses.len(), 5);
    assert_eq!(plan.pairs.len(), 4);
    assert!(plan.interfaces.is_empty());
    assert_eq!(plan.stitch_count(), 20);
    // bottom edge, isolines at 10, 20, 30, top edge
    let chain: Vec<f64> = plan.pairs.iter().map(|p| plan.courses[p.source].time).collect();
    assert_eq!(chain, vec![0.0, 10.0, 20.0, 30.0]);
    assert_eq!(plan.courses[plan.pairs[3].target].time, 40.0);
}

#[test]
fn flat_tube_wales_run_straight_up() {
    let tube = TubeSketch::new(40.0, 40.0, 2.0);
    let mesh = tube.build();
    let mut sampler =
        SamplingAlgorithm::new(&mesh, SamplingParams::default(), Oracles::new(&tube, &tube)).unwrap();
    run_to(&mut sampler, SamplingStage::Subdivide);

    let coarse = sampler.coarse_stitches().clone();
    assert_eq!(coarse.len(), 20);
    assert!(coarse.validate().is_ok());
    for i in 0..coarse.len() {
        for j in coarse.next_wales(i) {
            assert!((coarse.position(i).x - coarse.position(j).x).abs() < 1e-9);
        }
    }
    assert!(sampler.diagnostics().distribution_error.abs() < 1e-9);

    run_to(&mut sampler, SamplingStage::Split);
    let fine = sampler.stitches();
    // every coarse stitch becomes a 2 x 2 block, the top course included
    assert_eq!(fine.len(), coarse.len() * 4);
    assert_eq!(fine.courses().len(), 10);
    for i in 0..fine.len() {
        let next = fine.next_wales(i);
        assert!(next.len() <= 1);
        for j in next {
            assert!((fine.position(i).x - fine.position(j).x).abs() < 1e-9);
            assert!(fine.position(j).y > fine.position(i).y);
        }
    }
}

#[test]
fn small_batches_report_monotone_progress() {
    let tube = TubeSketch::new(40.0, 40.0, 2.0);
    let mesh = tube.build();
    let mut sampler =
        SamplingAlgorithm::new(&mesh, SamplingParams::default(), Oracles::new(&tube, &tube)).unwrap();
    let batch = Batch::new(1, Duration::from_secs(1));
    let mut last = sampler.progress();
    assert_eq!(last, 0.0);
    let mut calls = 0;
    while !sampler.iterate(batch).unwrap() {
        let progress = sampler.progress();
        assert!(progress >= last);
        assert!(progress < 1.0);
        last = progress;
        calls += 1;
        assert!(calls < 10_000);
    }
    assert!(calls > SamplingStage::COUNT);
    assert_eq!(sampler.progress(), 1.0);
    // further calls are no-ops
    assert!(sampler.iterate(batch).unwrap());

    let (sampling, diagnostics) = sampler.finish().unwrap();
    assert_eq!(sampling.stitches.len(), 80);
    assert_eq!(diagnostics.stitch_count, 80);
    assert_eq!(diagnostics.coarse_stitch_count, 20);
    assert_eq!(
        diagnostics.stitch_count,
        diagnostics.coarse_stitch_count * 4 + diagnostics.short_row_stitch_count
    );
    assert_eq!(diagnostics.course_count, 10);
    assert_eq!(diagnostics.short_row_count, 0);
    assert!(!diagnostics.has_warnings());
    assert!((sampling.course_dist - 5.0).abs() < 1e-12);
    assert!((sampling.wale_dist - 5.0).abs() < 1e-12);
    assert_eq!(sampling.sketch_refs, vec![0]);
}

#[test]
fn finishing_early_names_the_pending_stage() {
    let tube = TubeSketch::new(40.0, 40.0, 2.0);
    let mesh = tube.build();
    let sampler =
        SamplingAlgorithm::new(&mesh, SamplingParams::default(), Oracles::new(&tube, &tube)).unwrap();
    match sampler.finish() {
        Err(SamplingError::NoSolution { stage }) => assert_eq!(stage, "global"),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn invalid_params_are_rejected_up_front() {
    let tube = TubeSketch::new(40.0, 40.0, 2.0);
    let mesh = tube.build();
    let mut params = SamplingParams::default();
    params.subdiv = 0;
    let err = SamplingAlgorithm::new(&mesh, params, Oracles::new(&tube, &tube)).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn single_subdivision_keeps_coarse_stitches() {
    let tube = TubeSketch::new(40.0, 40.0, 2.0);
    let mesh = tube.build();
    let mut params = SamplingParams::default();
    params.subdiv = 1;
    let (sampling, _) = SamplingAlgorithm::new(&mesh, params, Oracles::new(&tube, &tube))
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(sampling.stitches.len(), 20);
    assert_eq!(sampling.stitches.courses().len(), 5);
}

#[test]
fn top_course_rows_stack_below_it() {
    let tube = TubeSketch::new(40.0, 40.0, 2.0);
    let mesh = tube.build();
    let mut params = SamplingParams::default();
    params.subdiv = 3;
    let (sampling, diagnostics) = SamplingAlgorithm::new(&mesh, params, Oracles::new(&tube, &tube))
        .unwrap()
        .run()
        .unwrap();
    let fine = &sampling.stitches;
    assert_eq!(fine.len(), diagnostics.coarse_stitch_count * 9);
    // three rows per coarse course; the last pair spans five transitions
    assert_eq!(fine.courses().len(), 15);
    let times: Vec<f64> = fine.courses().iter().map(|c| f64::from(c.time)).collect();
    let top = times.iter().copied().fold(f64::MIN, f64::max);
    assert!((top - 40.0).abs() < 1e-3);
    let upper: Vec<f64> = times.iter().copied().filter(|&t| t > 30.0 + 1e-3).collect();
    assert_eq!(upper.len(), 5);
    for t in upper {
        let step = (t - 30.0) / 2.0;
        assert!((step - step.round()).abs() < 1e-3, "row at {t}");
    }
}
