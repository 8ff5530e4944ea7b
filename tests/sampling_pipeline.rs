use knit_sampler::core::Vec2;
use knit_sampler::mesh::SeamOracle;
use knit_sampler::region::{SubdivisionOptions, subdivide_regions};
use knit_sampler::{
    Batch, ForkSketch, Oracles, SamplingAlgorithm, SamplingParams, StitchSampling, TubeSketch,
};

/// Seam along the left border `x = 0`.
struct LeftSeam;

impl SeamOracle for LeftSeam {
    fn seam_distance(&self, _layer: usize, p: Vec2) -> f64 {
        p.x.abs()
    }
}

fn fine_course_stitches(sampler: &SamplingAlgorithm<'_>, subdiv: usize) -> usize {
    let plan = sampler.plan();
    let rows: usize = plan.courses.iter().map(|c| c.count * subdiv).sum();
    let intermediate: usize = plan
        .pairs
        .iter()
        .map(|p| {
            let (a, b) = (plan.courses[p.source].count, plan.courses[p.target].count);
            let own: usize = (1..subdiv).map(|r| (a * subdiv + b * r) - a * r).sum();
            // upper rows of a course that ends its chain
            let top = if plan.starts_pair(p.target) { 0 } else { (subdiv - 1) * b * subdiv };
            own + top
        })
        .sum();
    rows + intermediate
}

#[test]
fn circular_tube_samples_closed_courses() {
    let tube = TubeSketch::new(60.0, 40.0, 2.0).circular(true);
    let mesh = tube.build();
    let mut params = SamplingParams::default();
    params.subdiv = 3;
    let mut sampler = SamplingAlgorithm::new(&mesh, params, Oracles::new(&tube, &tube)).unwrap();
    while !sampler.iterate(Batch::default()).unwrap() {}

    let expected = fine_course_stitches(&sampler, 3);
    let fine = sampler.stitches();
    assert!(fine.validate().is_ok());
    assert_eq!(fine.course_stitch_count(), expected);
    for (c, course) in fine.courses().iter().enumerate() {
        assert!(fine.is_circular(c));
        assert_eq!(fine.next_course(course.end as usize - 1), Some(course.start as usize));
    }
    let (sampling, diagnostics) = sampler.finish().unwrap();
    assert_eq!(diagnostics.stitch_count, sampling.stitches.len());
    assert_eq!(sampling.stitches.len(), diagnostics.coarse_stitch_count * 9);
}

#[test]
fn low_curvature_inserts_short_rows() {
    let tube = TubeSketch::new(40.0, 40.0, 2.0);
    let mut mesh = tube.build();
    for sample in mesh.layers[0].samples_mut() {
        sample.curvature = 0.5;
    }
    let params = SamplingParams::default();
    let mut sampler = SamplingAlgorithm::new(&mesh, params, Oracles::new(&tube, &tube)).unwrap();
    while !sampler.iterate(Batch::default()).unwrap() {}

    let expected = fine_course_stitches(&sampler, 2);
    let planned: usize = sampler
        .plan()
        .pairs
        .iter()
        .map(|p| p.short_rows.total_rows())
        .sum();
    assert!(planned > 0);

    let (sampling, diagnostics) = sampler.finish().unwrap();
    let stitches = &sampling.stitches;
    assert!(stitches.validate().is_ok());
    assert!(diagnostics.short_row_count > 0);
    assert_eq!(stitches.course_stitch_count(), expected);
    assert_eq!(stitches.len(), expected + diagnostics.short_row_stitch_count);
    assert_eq!(
        stitches.len(),
        diagnostics.coarse_stitch_count * 4 + diagnostics.short_row_stitch_count
    );
    for row in stitches.short_rows() {
        let first = row.start as usize;
        let below = stitches.prev_wales(first);
        assert_eq!(below.len(), 1);
        assert!(f64::from(row.time) > f64::from(stitches.courses()[0].time));
    }

    // removing the short rows restores plain wales
    let mut cleared = stitches.clone();
    cleared.clear_short_rows().unwrap();
    assert_eq!(cleared.len(), expected);
    assert!(cleared.validate().is_ok());
}

#[test]
fn fork_binds_trunk_to_both_legs() {
    let fork = ForkSketch::new(40.0, 20.0, 40.0, 10.0, 2.0);
    let mesh = fork.build();
    let mut sampler = SamplingAlgorithm::new(
        &mesh,
        SamplingParams::default(),
        Oracles::new(&fork, &fork).seams(&LeftSeam),
    )
    .unwrap();
    while !sampler.iterate(Batch::default()).unwrap() {}

    let counts = sampler.global_solution().unwrap().counts.clone();
    // edge 1 enters the fork, edges 2 and 3 leave it
    assert_eq!(counts[1], counts[2] + counts[3]);
    assert_eq!(sampler.plan().interfaces.len(), 1);
    assert_eq!(sampler.region_solutions().len(), 3);

    let (sampling, diagnostics) = sampler.finish().unwrap();
    assert!(sampling.stitches.validate().is_ok());
    // a seam everywhere means no shaping column falls back to the policy
    assert_eq!(diagnostics.defaulted_discontinuities, 0);
}

#[test]
fn subdivided_regions_are_sampled_with_persisted_output() {
    let tube = TubeSketch::new(40.0, 60.0, 2.0).circular(true);
    let mut mesh = tube.build();
    let mut params = SamplingParams::default();
    params.max_region_dt = 20.0;
    let report = subdivide_regions(&mut mesh, &tube, SubdivisionOptions::from_params(&params)).unwrap();
    assert!(report.inserted_regions() > 0);

    let (sampling, diagnostics) = SamplingAlgorithm::new(&mesh, params, Oracles::new(&tube, &tube))
        .unwrap()
        .run()
        .unwrap();
    assert!(diagnostics.region_count > 1);
    // each region chain ends in a course that still gets its upper rows
    assert_eq!(
        sampling.stitches.len(),
        diagnostics.coarse_stitch_count * 4 + diagnostics.short_row_stitch_count
    );

    let restored = StitchSampling::from_bytes(&sampling.to_bytes()).unwrap();
    assert_eq!(restored.stitches.len(), sampling.stitches.len());
    assert_eq!(restored.stitches.courses(), sampling.stitches.courses());
    assert_eq!(restored.sketch_refs, sampling.sketch_refs);
    for i in 0..sampling.stitches.len() {
        assert_eq!(restored.stitches.next_wales(i), sampling.stitches.next_wales(i));
        assert_eq!(restored.stitches.prev_course(i), sampling.stitches.prev_course(i));
    }
}
