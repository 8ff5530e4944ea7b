//! Integer solvers of the sampling pipeline.
//!
//! - [`dtw`]: alignment kernels used by short rows, wale binding and
//!   distribution;
//! - [`global_bb`]: stitch counts of every region edge;
//! - [`local_bb`], [`short_row`], [`local_solver`]: counts and short rows
//!   inside one simple region;
//! - [`wale_binder`]: stitch bindings across interfaces.
//!
//! All branch-and-bound solvers are resumable: `iterate(batch)` performs a
//! bounded amount of work and reports whether the search is complete.

pub mod branching;
pub mod dtw;
pub mod global_bb;
pub mod local_bb;
pub mod local_solver;
pub mod relaxation;
pub mod short_row;
pub mod wale_binder;

#[cfg(test)]
mod tests;

use crate::mesh::{DistanceSampler, IsolineTracer, NoSeams, SeamOracle};

pub use branching::{Batch, Budget};
pub use dtw::{AlignOptions, AlignResult, AlignStep, Alignment, Linking, align, find_alignment, find_constrained_alignment};
pub use global_bb::{GlobalNode, GlobalOptions, GlobalProblem, GlobalSolution, GlobalSolver};
pub use local_bb::{LocalBranchAndBound, LocalCounts, LocalOptions, LocalProblem};
pub use local_solver::{RegionBoundary, RegionSolution, RegionSolver, isoline_counts};
pub use relaxation::{ContinuousRelaxation, NoRelaxation};
pub use short_row::{ShortRowCost, ShortRowSolution, solve_short_rows};
pub use wale_binder::{Binding, BindingOptions, CourseShape, StitchSlot, bind_interface};

/// External oracles consulted by the solvers and the sampling driver.
#[derive(Clone, Copy)]
pub struct Oracles<'a> {
    pub tracer: &'a dyn IsolineTracer,
    pub distance: &'a dyn DistanceSampler,
    pub seams: &'a dyn SeamOracle,
    pub relaxation: &'a dyn ContinuousRelaxation,
}

impl<'a> Oracles<'a> {
    /// Oracles without seams and without continuous relaxation.
    #[must_use]
    pub fn new(tracer: &'a dyn IsolineTracer, distance: &'a dyn DistanceSampler) -> Self {
        Self {
            tracer,
            distance,
            seams: &NoSeams,
            relaxation: &NoRelaxation,
        }
    }

    #[must_use]
    pub fn seams(mut self, seams: &'a dyn SeamOracle) -> Self {
        self.seams = seams;
        self
    }

    #[must_use]
    pub fn relaxation(mut self, relaxation: &'a dyn ContinuousRelaxation) -> Self {
        self.relaxation = relaxation;
        self
    }
}

impl std::fmt::Debug for Oracles<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Oracles").finish_non_exhaustive()
    }
}
