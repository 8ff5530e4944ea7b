//! Sampling configuration.
//!
//! All parameter structs implement `Default` and deserialize from partial
//! documents: any missing field takes its default value.
//!
//! # Example
//!
//! ```ignore
//! let params = SamplingParams::default()
//!     .course_dist(8.0)
//!     .subdiv(3)
//!     .short_rows(ShortRowParams::default().mode(ShortRowMode::Qip));
//! params.validate()?;
//! ```

use serde::{Deserialize, Serialize};

use crate::error::SamplingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShortRowMode {
    None,
    #[default]
    Max,
    Qip,
}

/// Objective used by the sub-sample phase search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubSampleMetric {
    #[default]
    Total,
    Min,
}

/// Vertical placement of short-row cells within shorter columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShortRowAlignment {
    #[default]
    Bottom,
    Top,
    Middle,
}

/// Interface binding layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingLayout {
    #[default]
    Optimal,
    /// Skip the shift search when every output course is flat.
    Trivial,
}

/// Where subdivision concentrates the shaping of a wale cluster when no seam
/// distance decides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscontinuityPolicy {
    #[default]
    RCol,
    LCol,
    RDiag,
    LDiag,
    Rand,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub course: f64,
    pub simplicity: f64,
    pub wale: f64,
    pub dist: f64,
    pub seam: f64,
    pub flow: f64,
    /// Cap of the seam penalty, in multiples of the course distance.
    pub seam_support: f64,
    /// Penalize the deviation of wale lengths from the wale distance instead
    /// of their raw length.
    pub min_wale_diff: bool,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            course: 1.0,
            simplicity: 1.0,
            wale: 1.0,
            dist: 1.0,
            seam: 0.5,
            flow: 0.5,
            seam_support: 2.0,
            min_wale_diff: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalParams {
    /// Replace the simplicity term by a hard shaping bound per simple region.
    pub global_shaping: bool,
    /// Equalize per-course counts on flat-sided interfaces.
    pub uniform_branching: bool,
    /// Round interface counts up to even numbers.
    pub even_interfaces: bool,
    pub constraint_tol: f64,
    pub aliasing_level: f64,
    pub budget_ms: u64,
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self {
            global_shaping: false,
            uniform_branching: false,
            even_interfaces: false,
            constraint_tol: 1e-3,
            aliasing_level: 0.0,
            budget_ms: 1000,
        }
    }
}

impl GlobalParams {
    #[must_use]
    pub const fn global_shaping(mut self, enabled: bool) -> Self {
        self.global_shaping = enabled;
        self
    }

    #[must_use]
    pub const fn uniform_branching(mut self, enabled: bool) -> Self {
        self.uniform_branching = enabled;
        self
    }

    #[must_use]
    pub const fn even_interfaces(mut self, enabled: bool) -> Self {
        self.even_interfaces = enabled;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalParams {
    /// Number of candidate isoline counts explored per region.
    pub branches: usize,
    /// Interpolate the course-count model linearly between both boundaries.
    pub linear_interpolation: bool,
    pub max_count: usize,
    pub budget_ms: u64,
}

impl Default for LocalParams {
    fn default() -> Self {
        Self {
            branches: 3,
            linear_interpolation: true,
            max_count: 10_000,
            budget_ms: 1000,
        }
    }
}

impl LocalParams {
    #[must_use]
    pub const fn branches(mut self, branches: usize) -> Self {
        self.branches = branches;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortRowParams {
    pub mode: ShortRowMode,
    pub simplicity_power: f64,
    pub sub_sample: bool,
    pub ss_depth: usize,
    pub ss_threshold: f64,
    pub ss_metric: SubSampleMetric,
    pub alignment: ShortRowAlignment,
}

impl Default for ShortRowParams {
    fn default() -> Self {
        Self {
            mode: ShortRowMode::Max,
            simplicity_power: 2.0,
            sub_sample: false,
            ss_depth: 4,
            ss_threshold: 0.5,
            ss_metric: SubSampleMetric::Total,
            alignment: ShortRowAlignment::Bottom,
        }
    }
}

impl ShortRowParams {
    #[must_use]
    pub const fn mode(mut self, mode: ShortRowMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub const fn sub_sample(mut self, enabled: bool) -> Self {
        self.sub_sample = enabled;
        self
    }

    #[must_use]
    pub const fn alignment(mut self, alignment: ShortRowAlignment) -> Self {
        self.alignment = alignment;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WaleParams {
    /// Splits kept per course in the binding frontier (`None` keeps all).
    pub k_best: Option<usize>,
    pub layout: BindingLayout,
}

impl WaleParams {
    #[must_use]
    pub const fn k_best(mut self, k: Option<usize>) -> Self {
        self.k_best = k;
        self
    }

    #[must_use]
    pub const fn layout(mut self, layout: BindingLayout) -> Self {
        self.layout = layout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubdivisionParams {
    pub discontinuity: DiscontinuityPolicy,
    /// Seed of the `rand` discontinuity policy.
    pub seed: u64,
}

/// Top-level sampling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    pub course_dist: f64,
    pub wale_dist: f64,
    pub shaping_factor: f64,
    pub subdiv: usize,
    pub max_region_dt: f64,
    pub uniform_region_split: bool,
    pub weights: Weights,
    pub global: GlobalParams,
    pub local: LocalParams,
    pub short_rows: ShortRowParams,
    pub wales: WaleParams,
    pub subdivision: SubdivisionParams,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            course_dist: 10.0,
            wale_dist: 10.0,
            shaping_factor: 2.0,
            subdiv: 2,
            max_region_dt: 50.0,
            uniform_region_split: false,
            weights: Weights::default(),
            global: GlobalParams::default(),
            local: LocalParams::default(),
            short_rows: ShortRowParams::default(),
            wales: WaleParams::default(),
            subdivision: SubdivisionParams::default(),
        }
    }
}

impl SamplingParams {
    #[must_use]
    pub const fn course_dist(mut self, dist: f64) -> Self {
        self.course_dist = dist;
        self
    }

    #[must_use]
    pub const fn wale_dist(mut self, dist: f64) -> Self {
        self.wale_dist = dist;
        self
    }

    #[must_use]
    pub const fn shaping_factor(mut self, factor: f64) -> Self {
        self.shaping_factor = factor;
        self
    }

    #[must_use]
    pub const fn subdiv(mut self, subdiv: usize) -> Self {
        self.subdiv = subdiv;
        self
    }

    #[must_use]
    pub const fn max_region_dt(mut self, dt: f64) -> Self {
        self.max_region_dt = dt;
        self
    }

    #[must_use]
    pub const fn weights(mut self, weights: Weights) -> Self {
        self.weights = weights;
        self
    }

    #[must_use]
    pub const fn global(mut self, global: GlobalParams) -> Self {
        self.global = global;
        self
    }

    #[must_use]
    pub const fn local(mut self, local: LocalParams) -> Self {
        self.local = local;
        self
    }

    #[must_use]
    pub const fn short_rows(mut self, short_rows: ShortRowParams) -> Self {
        self.short_rows = short_rows;
        self
    }

    #[must_use]
    pub const fn wales(mut self, wales: WaleParams) -> Self {
        self.wales = wales;
        self
    }

    #[must_use]
    pub const fn subdivision(mut self, subdivision: SubdivisionParams) -> Self {
        self.subdivision = subdivision;
        self
    }

    /// Rejects configurations the solvers cannot honor.
    pub fn validate(&self) -> Result<(), SamplingError> {
        positive("course_dist", self.course_dist)?;
        positive("wale_dist", self.wale_dist)?;
        positive("max_region_dt", self.max_region_dt)?;
        if !(self.shaping_factor > 1.0 && self.shaping_factor <= 2.0) {
            return Err(SamplingError::InvalidParams(format!(
                "shaping_factor must lie in (1, 2], got {}",
                self.shaping_factor
            )));
        }
        if self.subdiv == 0 {
            return Err(SamplingError::InvalidParams("subdiv must be at least 1".into()));
        }
        if self.local.branches == 0 {
            return Err(SamplingError::InvalidParams("local.branches must be at least 1".into()));
        }
        if self.wales.k_best == Some(0) {
            return Err(SamplingError::InvalidParams("wales.k_best must be at least 1".into()));
        }
        if !(self.short_rows.simplicity_power >= 1.0) {
            return Err(SamplingError::InvalidParams(
                "short_rows.simplicity_power must be at least 1".into(),
            ));
        }
        let w = &self.weights;
        for (name, value) in [
            ("weights.course", w.course),
            ("weights.simplicity", w.simplicity),
            ("weights.wale", w.wale),
            ("weights.dist", w.dist),
            ("weights.seam", w.seam),
            ("weights.flow", w.flow),
            ("weights.seam_support", w.seam_support),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(SamplingError::InvalidParams(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<(), SamplingError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SamplingError::InvalidParams(format!(
            "{name} must be finite and positive, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(SamplingParams::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_shaping() {
        for factor in [1.0, 2.5, f64::NAN] {
            let params = SamplingParams::default().shaping_factor(factor);
            assert!(matches!(params.validate(), Err(SamplingError::InvalidParams(_))));
        }
        assert!(SamplingParams::default().shaping_factor(1.5).validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_values() {
        assert!(SamplingParams::default().subdiv(0).validate().is_err());
        assert!(SamplingParams::default().course_dist(0.0).validate().is_err());
        let weights = Weights {
            seam: -1.0,
            ..Weights::default()
        };
        assert!(SamplingParams::default().weights(weights).validate().is_err());
        let wales = WaleParams::default().k_best(Some(0));
        assert!(SamplingParams::default().wales(wales).validate().is_err());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let params: SamplingParams = serde_json::from_str(
            r#"{ "course_dist": 4.0, "short_rows": { "mode": "qip" }, "subdivision": { "discontinuity": "ldiag" } }"#,
        )
        .unwrap();
        assert_eq!(params.course_dist, 4.0);
        assert_eq!(params.wale_dist, 10.0);
        assert_eq!(params.short_rows.mode, ShortRowMode::Qip);
        assert_eq!(params.short_rows.simplicity_power, 2.0);
        assert_eq!(params.subdivision.discontinuity, DiscontinuityPolicy::LDiag);
    }

    #[test]
    fn json_round_trip() {
        let params = SamplingParams::default()
            .subdiv(3)
            .wales(WaleParams::default().layout(BindingLayout::Trivial));
        let json = serde_json::to_string(&params).unwrap();
        let back: SamplingParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }
}
