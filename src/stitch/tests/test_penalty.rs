use crate::core::Vec2;
use crate::mesh::SeamOracle;
use crate::mesh::primitives::TubeSketch;
use crate::params::SamplingParams;
use crate::solver::Oracles;
use crate::stitch::{Penalties, PenaltyWeights, StitchPoint, StitchSet};

/// Seam along the vertical line `x = 0`.
struct LeftSeam;

impl SeamOracle for LeftSeam {
    fn seam_distance(&self, _layer: usize, p: Vec2) -> f64 {
        p.x.abs()
    }
}

fn stitches() -> StitchSet {
    let mut set = StitchSet::new();
    let point = |x, y| StitchPoint::new(0, Vec2::new(x, y), 0.0);
    set.push_course(&[point(5.0, 0.0)], false, 0.0, 1).unwrap();
    set.push_course(&[point(5.0, 10.0), point(15.0, 10.0)], false, 10.0, 1).unwrap();
    set
}

#[test]
fn straight_wales_cost_nothing() {
    let tube = TubeSketch::new(40.0, 40.0, 2.0);
    let mesh = tube.build();
    let params = SamplingParams::default();
    let penalties = Penalties::new(&mesh, Oracles::new(&tube, &tube), PenaltyWeights::from_params(&params));
    let set = stitches();

    assert!((penalties.base(&set, 0, 1) - 1.0).abs() < 1e-9);
    assert!(penalties.wale(&set, 0, 1, false, false).abs() < 1e-9);
    // no seams: irregular ends pay the full seam support
    assert!((penalties.wale(&set, 0, 1, true, true) - 2.0).abs() < 1e-9);

    let stats = penalties.cache_stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 2);
}

#[test]
fn diagonal_wales_pay_length_and_flow() {
    let tube = TubeSketch::new(40.0, 40.0, 2.0);
    let mesh = tube.build();
    let params = SamplingParams::default();
    let penalties = Penalties::new(&mesh, Oracles::new(&tube, &tube), PenaltyWeights::from_params(&params));
    let set = stitches();

    let d = 200f64.sqrt();
    assert!((penalties.base(&set, 0, 2) - 2.0).abs() < 1e-9);
    let length = ((d - 10.0) / 10.0).powi(2);
    let flow = 0.5 * 2.0 * (1.0 - std::f64::consts::FRAC_1_SQRT_2);
    assert!((penalties.wale(&set, 0, 2, false, false) - (length + flow)).abs() < 1e-9);
}

#[test]
fn seams_lower_the_shaping_cost_nearby() {
    let tube = TubeSketch::new(40.0, 40.0, 2.0);
    let mesh = tube.build();
    let params = SamplingParams::default();
    let oracles = Oracles::new(&tube, &tube).seams(&LeftSeam);
    let mut penalties = Penalties::new(&mesh, oracles, PenaltyWeights::from_params(&params));
    let set = stitches();

    // source at x = 5 is half a course away from the seam
    assert!((penalties.wale(&set, 0, 1, true, false) - 0.25).abs() < 1e-9);
    // target at x = 15 sits one and a half courses away
    assert!((penalties.wale(&set, 0, 2, false, true) - penalties.wale(&set, 0, 2, false, false) - 0.75).abs() < 1e-9);
    assert!((penalties.seam_distance(0, Vec2::new(30.0, 0.0)) - 3.0).abs() < 1e-12);

    penalties.reset();
    assert_eq!(penalties.cache_stats().entries, 0);
}
