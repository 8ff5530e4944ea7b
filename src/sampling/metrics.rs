//! Opt-in wall-clock timing of the sampling stages.
//!
//! Active only with the `sampling_metrics` feature on non-wasm targets; every
//! call is a no-op otherwise and [`SamplingMetrics::end`] returns `None`.
//!
//! ```ignore
//! let mut metrics = SamplingMetrics::default();
//! metrics.begin();
//! let done = metrics.time(SamplingStage::Global, || solver.iterate(batch));
//! if let Some(report) = metrics.end() {
//!     println!("global: {} ms", report.stage_ms(SamplingStage::Global));
//! }
//! ```

use super::stage::SamplingStage;

/// Cumulative nanoseconds spent in each stage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SamplingTimingReport {
    pub stage_ns: [u64; SamplingStage::COUNT],
}

impl SamplingTimingReport {
    #[must_use]
    pub fn total_ns(&self) -> u64 {
        self.stage_ns.iter().fold(0u64, |acc, &ns| acc.saturating_add(ns))
    }

    #[must_use]
    pub fn total_ms(&self) -> f64 {
        self.total_ns() as f64 / 1_000_000.0
    }

    #[must_use]
    pub fn stage_ms(&self, stage: SamplingStage) -> f64 {
        self.stage_ns[stage.index()] as f64 / 1_000_000.0
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(feature = "sampling_metrics", not(target_arch = "wasm32")))] {
        /// Accumulator of stage timings.
        #[derive(Debug, Default)]
        pub struct SamplingMetrics {
            report: SamplingTimingReport,
        }

        impl SamplingMetrics {
            /// Resets every counter.
            pub fn begin(&mut self) {
                self.report = SamplingTimingReport::default();
            }

            #[must_use]
            pub fn end(&self) -> Option<SamplingTimingReport> {
                Some(self.report.clone())
            }

            /// Runs `f` and adds its duration to `stage`.
            pub fn time<R>(&mut self, stage: SamplingStage, f: impl FnOnce() -> R) -> R {
                let start = std::time::Instant::now();
                let result = f();
                let nanos = start.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64;
                let slot = &mut self.report.stage_ns[stage.index()];
                *slot = slot.saturating_add(nanos);
                result
            }
        }
    } else {
        /// Accumulator of stage timings (disabled build).
        #[derive(Debug, Default)]
        pub struct SamplingMetrics;

        impl SamplingMetrics {
            pub fn begin(&mut self) {}

            #[must_use]
            pub fn end(&self) -> Option<SamplingTimingReport> {
                None
            }

            pub fn time<R>(&mut self, stage: SamplingStage, f: impl FnOnce() -> R) -> R {
                let _ = stage;
                f()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_totals() {
        let mut report = SamplingTimingReport::default();
        report.stage_ns[SamplingStage::Global.index()] = 1_000;
        report.stage_ns[SamplingStage::Split.index()] = 2_000;
        assert_eq!(report.total_ns(), 3_000);
        assert!((report.total_ms() - 0.003).abs() < 1e-12);
        assert!((report.stage_ms(SamplingStage::Split) - 0.002).abs() < 1e-12);
    }

    #[test]
    fn time_returns_the_closure_result() {
        let mut metrics = SamplingMetrics::default();
        metrics.begin();
        assert_eq!(metrics.time(SamplingStage::Local, || 7), 7);
        let report = metrics.end();
        if cfg!(all(feature = "sampling_metrics", not(target_arch = "wasm32"))) {
            assert!(report.is_some());
        } else {
            assert!(report.is_none());
        }
    }
}
