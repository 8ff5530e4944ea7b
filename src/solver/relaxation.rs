//! Continuous relaxations consumed by the integer solvers.
//!
//! Relaxations are black boxes returning real-valued vectors. The solvers
//! round, clamp and check feasibility themselves, and only adopt a rounded
//! relaxation when it beats their incumbent.

use super::global_bb::GlobalNode;

/// Inputs of the global stitch-count relaxation.
#[derive(Debug, Clone, Copy)]
pub struct GlobalRelaxation<'a> {
    /// Target count per region edge.
    pub cdata: &'a [f64],
    /// Wale amplification per constraint node.
    pub wdata: &'a [f64],
    pub nodes: &'a [GlobalNode],
    pub course_weight: f64,
    pub simplicity_weight: f64,
    pub global_shaping: bool,
    pub aliasing_level: f64,
    pub constraint_tol: f64,
}

/// Inputs of the per-region count relaxation.
#[derive(Debug, Clone, Copy)]
pub struct LocalRelaxation<'a> {
    pub cdata: &'a [f64],
    pub start: f64,
    pub end: f64,
    pub course_weight: f64,
    pub simplicity_weight: f64,
    pub shaping: f64,
    pub constraint_tol: f64,
}

/// Inputs of the short-row relaxation.
#[derive(Debug, Clone, Copy)]
pub struct ShortRowRelaxation<'a> {
    /// Expected short rows per sample.
    pub cdata: &'a [f64],
    pub wale_weight: f64,
    pub simplicity_weight: f64,
    pub circular: bool,
    pub simplicity_power: f64,
}

/// Continuous optimizer used to pick branch-and-bound pivots.
///
/// Every method may decline by returning `None`.
pub trait ContinuousRelaxation {
    fn optimize_global(&self, _problem: &GlobalRelaxation<'_>) -> Option<Vec<f64>> {
        None
    }

    fn optimize_local(&self, _problem: &LocalRelaxation<'_>) -> Option<Vec<f64>> {
        None
    }

    fn optimize_short_rows(&self, _problem: &ShortRowRelaxation<'_>) -> Option<Vec<f64>> {
        None
    }
}

/// Relaxation that declines every problem.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRelaxation;

impl ContinuousRelaxation for NoRelaxation {}
