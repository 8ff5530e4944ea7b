//! Crate-level error type.
//!
//! Every variant except [`SamplingError::InvalidParams`] is a fatal invariant
//! violation: it aborts the run. Time budgets running out are not errors (the
//! solvers keep their incumbent), and infeasible branches are pruned without
//! surfacing.

use crate::mesh::{GraphError, RegionId, TopologyError};

/// Errors that abort a sampling run.
#[derive(Debug, thiserror::Error)]
pub enum SamplingError {
    /// A requested split time could not be traced in its region.
    #[error("no isoline found for time {time} in region {}", region.0)]
    UnresolvedSplit { region: RegionId, time: f64 },

    /// A point had no lattice neighborhood on its layer.
    #[error("no neighborhood at ({x}, {y}) on layer {layer}")]
    MissingNeighborhood { layer: usize, x: f64, y: f64 },

    /// A wale pointer was about to break the stitch graph invariants.
    #[error("invalid wale between stitches {source_stitch} and {target}: {reason}")]
    InvalidWale {
        source_stitch: usize,
        target: usize,
        reason: &'static str,
    },

    /// A stage completed without any finite-error solution.
    #[error("stage `{stage}` completed without a solution")]
    NoSolution { stage: &'static str },

    /// Interface bindings with several inputs and several outputs.
    #[error("cannot bind {inputs} input courses to {outputs} output courses")]
    UnsupportedBinding { inputs: usize, outputs: usize },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// Any other structural invariant.
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("invalid sampling parameters: {0}")]
    InvalidParams(String),
}

impl SamplingError {
    /// Whether the error comes from configuration rather than the run itself.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidParams(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        let err = SamplingError::UnresolvedSplit {
            region: RegionId(3),
            time: 12.5,
        };
        assert_eq!(err.to_string(), "no isoline found for time 12.5 in region 3");
        let err = SamplingError::NoSolution { stage: "global" };
        assert!(err.to_string().contains("global"));
        assert!(!err.is_configuration());
        assert!(SamplingError::InvalidParams("x".into()).is_configuration());
    }

    #[test]
    fn wraps_graph_errors() {
        let err: SamplingError = GraphError::UnknownRegion(RegionId(9)).into();
        assert_eq!(err.to_string(), "unknown region 9");
    }
}
