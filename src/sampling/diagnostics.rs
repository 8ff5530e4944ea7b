//! Summary of a sampling run.
//!
//! Collected by [`SamplingAlgorithm`](super::SamplingAlgorithm) while it runs
//! and available at any point through `diagnostics()`.
//!
//! ```ignore
//! let sampling = sampler.run()?;
//! let diagnostics = sampler.diagnostics();
//! log::info!("{diagnostics}");
//! for warning in &diagnostics.warnings {
//!     log::warn!("{warning}");
//! }
//! ```

use std::fmt;

use crate::stitch::PenaltyCacheStats;

use super::metrics::SamplingTimingReport;

/// Counters, errors and warnings of one sampling run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SamplingDiagnostics {
    /// Simple regions solved by the local stage.
    pub region_count: usize,

    /// Stitches of the coarse set, before subdivision.
    pub coarse_stitch_count: usize,

    /// Stitches of the final set, short rows included.
    pub stitch_count: usize,

    pub course_count: usize,

    pub short_row_count: usize,

    /// Stitches that belong to short rows.
    pub short_row_stitch_count: usize,

    /// Short-row cells dropped because their wale was not a plain 1-1 link.
    pub skipped_short_rows: usize,

    /// Subdivision transitions whose discontinuity column came from the
    /// configured policy rather than a finite seam distance.
    pub defaulted_discontinuities: usize,

    /// Objective of the global count solution.
    pub global_error: f64,

    /// Sum of the per-region errors of the local stage.
    pub local_error: f64,

    /// Sum of the interface binding errors.
    pub binding_error: f64,

    /// Sum of the in-region wale alignment costs.
    pub distribution_error: f64,

    /// Penalty cache counters, accumulated over every stage.
    pub cache: PenaltyCacheStats,

    /// Only populated with the `sampling_metrics` feature on non-wasm targets.
    pub timing: Option<SamplingTimingReport>,

    pub warnings: Vec<String>,
}

impl SamplingDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Adds the counters of a penalty cache that is about to be reset.
    pub fn absorb_cache(&mut self, stats: PenaltyCacheStats) {
        self.cache.entries += stats.entries;
        self.cache.hits += stats.hits;
        self.cache.misses += stats.misses;
    }

    /// Total error over the solver stages.
    #[must_use]
    pub fn total_error(&self) -> f64 {
        self.global_error + self.local_error + self.binding_error + self.distribution_error
    }

    /// One-line summary for logging.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = vec![format!(
            "stitches:{} courses:{} short-rows:{}",
            self.stitch_count, self.course_count, self.short_row_count
        )];
        if self.skipped_short_rows > 0 {
            parts.push(format!("skipped:{}", self.skipped_short_rows));
        }
        if self.defaulted_discontinuities > 0 {
            parts.push(format!("defaulted:{}", self.defaulted_discontinuities));
        }
        if !self.warnings.is_empty() {
            parts.push(format!("warnings:{}", self.warnings.len()));
        }
        parts.join(" ")
    }
}

impl fmt::Display for SamplingDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_only_nonzero_issues() {
        let mut diagnostics = SamplingDiagnostics {
            stitch_count: 96,
            course_count: 12,
            ..SamplingDiagnostics::default()
        };
        assert_eq!(diagnostics.summary(), "stitches:96 courses:12 short-rows:0");
        diagnostics.skipped_short_rows = 3;
        diagnostics.add_warning("isoline traced from inner samples");
        assert_eq!(
            diagnostics.to_string(),
            "stitches:96 courses:12 short-rows:0 skipped:3 warnings:1"
        );
        assert!(diagnostics.has_warnings());
    }

    #[test]
    fn cache_counters_accumulate() {
        let mut diagnostics = SamplingDiagnostics::new();
        let stats = PenaltyCacheStats {
            entries: 4,
            hits: 6,
            misses: 4,
        };
        diagnostics.absorb_cache(stats);
        diagnostics.absorb_cache(stats);
        assert_eq!(diagnostics.cache.entries, 8);
        assert!((diagnostics.cache.hit_rate() - 0.6).abs() < 1e-12);
    }
}
