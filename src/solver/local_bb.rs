//! Stitch counts of the intermediate isolines of one simple region.
//!
//! The boundary counts `start` and `end` are fixed by the global solution.
//! Every inner count `n_k` must stay within a factor `S` of its neighbors,
//! and the objective trades course accuracy against count changes:
//!
//! ```text
//! E = course_w · Σ (n_k − cdata_k)² + simplicity_w · Σ (n_k − n_{k+1})²
//! ```

use log::debug;

use crate::error::SamplingError;

use super::branching::{Alternating, Batch, Budget, Direction, batch_expired};
use super::relaxation::{ContinuousRelaxation, LocalRelaxation};

const ROUNDING_EPS: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct LocalProblem {
    pub start: usize,
    pub end: usize,
    /// Target count per intermediate isoline.
    pub cdata: Vec<f64>,
    pub shaping: f64,
}

impl LocalProblem {
    #[must_use]
    pub fn new(start: usize, end: usize, cdata: Vec<f64>, shaping: f64) -> Self {
        Self {
            start,
            end,
            cdata,
            shaping,
        }
    }

    /// Targets `cdata_k = max(4, length_k · α + c₀)`.
    ///
    /// With `linear` set, `(α, c₀)` interpolate the boundary counts over the
    /// boundary lengths; otherwise `α = 1 / course_dist` and `c₀ = 0`.
    #[must_use]
    pub fn from_lengths(
        (start, start_length): (usize, f64),
        (end, end_length): (usize, f64),
        lengths: &[f64],
        course_dist: f64,
        linear: bool,
        shaping: f64,
    ) -> Self {
        let (alpha, c0) = if linear {
            let dl = end_length - start_length;
            if dl.abs() > ROUNDING_EPS {
                let alpha = (end as f64 - start as f64) / dl;
                (alpha, start as f64 - alpha * start_length)
            } else {
                let alpha = 1.0 / course_dist;
                let mean_count = (start + end) as f64 * 0.5;
                let mean_length = (start_length + end_length) * 0.5;
                (alpha, mean_count - alpha * mean_length)
            }
        } else {
            (1.0 / course_dist, 0.0)
        };
        let cdata = lengths.iter().map(|l| (l * alpha + c0).max(4.0)).collect();
        Self::new(start, end, cdata, shaping)
    }

    #[must_use]
    pub fn variable_count(&self) -> usize {
        self.cdata.len()
    }

    /// Admissible range of the `k`-th inner count (0-based).
    #[must_use]
    pub fn bounds(&self, k: usize, max_count: usize) -> (i64, i64) {
        let n = self.cdata.len();
        let (start, end) = (self.start as f64, self.end as f64);
        let from_start = self.shaping.powi(k as i32 + 1);
        let from_end = self.shaping.powi((n - k) as i32);
        let floor = 4.min(self.start.min(self.end)).max(1) as f64;
        let lo = floor
            .max((start / from_start - ROUNDING_EPS).ceil())
            .max((end / from_end - ROUNDING_EPS).ceil());
        let hi = (max_count as f64)
            .min((start * from_start + ROUNDING_EPS).floor())
            .min((end * from_end + ROUNDING_EPS).floor());
        (lo as i64, hi as i64)
    }

    fn shaped(&self, a: f64, b: f64) -> bool {
        a > 0.0 && b > 0.0 && b <= a * self.shaping + ROUNDING_EPS && a <= b * self.shaping + ROUNDING_EPS
    }

    /// Objective of a complete assignment; infinite when shaping fails.
    #[must_use]
    pub fn error(&self, counts: &[f64], options: &LocalOptions) -> f64 {
        let mut error = 0.0;
        let mut previous = self.start as f64;
        for (&n, &c) in counts.iter().zip(&self.cdata) {
            if !self.shaped(previous, n) {
                return f64::INFINITY;
            }
            error += options.course_weight * (n - c).powi(2);
            error += options.simplicity_weight * (n - previous).powi(2);
            previous = n;
        }
        let end = self.end as f64;
        if !self.shaped(previous, end) {
            return f64::INFINITY;
        }
        error + options.simplicity_weight * (previous - end).powi(2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalOptions {
    pub course_weight: f64,
    pub simplicity_weight: f64,
    pub constraint_tol: f64,
    pub max_count: usize,
    pub budget_ms: Option<u64>,
}

impl Default for LocalOptions {
    fn default() -> Self {
        Self {
            course_weight: 1.0,
            simplicity_weight: 1.0,
            constraint_tol: 1e-3,
            max_count: 10_000,
            budget_ms: None,
        }
    }
}

impl LocalOptions {
    #[must_use]
    pub fn from_params(params: &crate::params::SamplingParams) -> Self {
        Self {
            course_weight: params.weights.course,
            simplicity_weight: params.weights.simplicity,
            constraint_tol: params.global.constraint_tol,
            max_count: params.local.max_count,
            budget_ms: Some(params.local.budget_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalCounts {
    /// Count per intermediate isoline, in time order.
    pub counts: Vec<usize>,
    pub error: f64,
    pub iterations: usize,
}

#[derive(Debug, Clone)]
struct Frame {
    candidates: Alternating,
    partial: f64,
}

/// Resumable depth-first branch-and-bound over the inner counts.
#[derive(Debug, Clone)]
pub struct LocalBranchAndBound {
    problem: LocalProblem,
    options: LocalOptions,
    bounds: Vec<(i64, i64)>,
    center: Vec<i64>,
    assignment: Vec<i64>,
    stack: Vec<Frame>,
    best: Option<Vec<i64>>,
    best_error: f64,
    budget: Budget,
    started: bool,
    done: bool,
    iterations: usize,
}

impl LocalBranchAndBound {
    #[must_use]
    pub fn new(
        problem: LocalProblem,
        options: LocalOptions,
        relaxation: &dyn ContinuousRelaxation,
    ) -> Self {
        let n = problem.variable_count();
        let bounds: Vec<(i64, i64)> = (0..n).map(|k| problem.bounds(k, options.max_count)).collect();
        let mut solver = Self {
            center: vec![0; n],
            assignment: vec![0; n],
            bounds,
            problem,
            options,
            stack: Vec::new(),
            best: None,
            best_error: f64::INFINITY,
            budget: options.budget_ms.map_or_else(Budget::unlimited, Budget::new),
            started: false,
            done: false,
            iterations: 0,
        };
        if n == 0 {
            solver.best_error = solver.problem.error(&[], &solver.options);
            if solver.best_error.is_finite() {
                solver.best = Some(Vec::new());
            }
            solver.done = true;
        } else {
            solver.choose_pivot(relaxation);
        }
        solver
    }

    fn choose_pivot(&mut self, relaxation: &dyn ContinuousRelaxation) {
        let round = |values: &[f64]| -> Vec<f64> {
            values
                .iter()
                .zip(&self.bounds)
                .map(|(v, &(lo, hi))| (v.round() as i64).clamp(lo, hi.max(lo)) as f64)
                .collect()
        };
        let mut pivots = vec![round(&self.problem.cdata)];
        let relaxed = relaxation.optimize_local(&LocalRelaxation {
            cdata: &self.problem.cdata,
            start: self.problem.start as f64,
            end: self.problem.end as f64,
            course_weight: self.options.course_weight,
            simplicity_weight: self.options.simplicity_weight,
            shaping: self.problem.shaping,
            constraint_tol: self.options.constraint_tol,
        });
        if let Some(relaxed) = relaxed.filter(|r| r.len() == self.problem.variable_count()) {
            pivots.push(round(&relaxed));
        }
        self.center = pivots[0].iter().map(|&v| v as i64).collect();
        for pivot in pivots {
            let error = self.problem.error(&pivot, &self.options);
            if error < self.best_error {
                self.best_error = error;
                self.center = pivot.iter().map(|&v| v as i64).collect();
                self.best = Some(self.center.clone());
            }
        }
    }

    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    #[must_use]
    pub const fn best_error(&self) -> f64 {
        self.best_error
    }

    /// Runs up to one batch; returns `true` once the search is complete.
    pub fn iterate(&mut self, batch: Batch) -> bool {
        if self.done {
            return true;
        }
        self.budget.start();
        let deadline = batch.deadline();
        let mut steps = 0usize;
        while steps < batch.iterations {
            if self.step() || self.budget.expired() {
                self.done = true;
                self.stack.clear();
                debug!(
                    "local branch-and-bound finished after {} iterations (error {})",
                    self.iterations, self.best_error
                );
                return true;
            }
            steps += 1;
            if steps % 64 == 0 && batch_expired(deadline) {
                break;
            }
        }
        false
    }

    /// Unconstrained minimizer of the terms fixed at `depth`.
    fn minimizer(&self, depth: usize, previous: f64) -> f64 {
        let (cw, sw) = (self.options.course_weight, self.options.simplicity_weight);
        let target = self.problem.cdata[depth];
        if depth + 1 == self.problem.variable_count() {
            let end = self.problem.end as f64;
            (cw * target + sw * (previous + end)) / (cw + 2.0 * sw).max(f64::MIN_POSITIVE)
        } else {
            (cw * target + sw * previous) / (cw + sw).max(f64::MIN_POSITIVE)
        }
    }

    fn step(&mut self) -> bool {
        if !self.started {
            self.started = true;
            let (lo, hi) = self.bounds[0];
            self.stack.push(Frame {
                candidates: Alternating::new(self.center[0], lo, hi),
                partial: 0.0,
            });
        }
        let Some(depth) = self.stack.len().checked_sub(1) else {
            return true;
        };
        let frame = &mut self.stack[depth];
        let Some((value, direction)) = frame.candidates.next_candidate() else {
            self.stack.pop();
            return self.stack.is_empty();
        };
        let partial = frame.partial;
        self.iterations += 1;

        let previous = if depth == 0 {
            self.problem.start as f64
        } else {
            self.assignment[depth - 1] as f64
        };
        let n = value as f64;
        let last = depth + 1 == self.problem.variable_count();
        let (cw, sw) = (self.options.course_weight, self.options.simplicity_weight);
        let mut delta = cw * (n - self.problem.cdata[depth]).powi(2) + sw * (n - previous).powi(2);
        let mut feasible = self.problem.shaped(previous, n);
        if last {
            let end = self.problem.end as f64;
            delta += sw * (n - end).powi(2);
            feasible &= self.problem.shaped(n, end);
        }

        if !feasible || partial + delta >= self.best_error {
            let minimizer = self.minimizer(depth, previous);
            let beyond = match (direction, feasible) {
                (Direction::Up, true) => n >= minimizer,
                (Direction::Up, false) => n > previous,
                (Direction::Down, true) => n <= minimizer,
                (Direction::Down, false) => n < previous,
                (Direction::Center, _) => false,
            };
            if beyond {
                if let Some(frame) = self.stack.last_mut() {
                    frame.candidates.close(direction);
                }
            }
            return false;
        }

        self.assignment[depth] = value;
        if last {
            self.best_error = partial + delta;
            self.best = Some(self.assignment.clone());
            return false;
        }
        let (lo, hi) = self.bounds[depth + 1];
        self.stack.push(Frame {
            candidates: Alternating::new(self.center[depth + 1], lo, hi),
            partial: partial + delta,
        });
        false
    }

    pub fn solve(mut self) -> Result<LocalCounts, SamplingError> {
        while !self.iterate(Batch::unbounded()) {}
        self.solution()
    }

    pub fn solution(&self) -> Result<LocalCounts, SamplingError> {
        let best = self
            .best
            .as_ref()
            .ok_or(SamplingError::NoSolution { stage: "local" })?;
        Ok(LocalCounts {
            counts: best.iter().map(|&n| n.max(1) as usize).collect(),
            error: self.best_error,
            iterations: self.iterations,
        })
    }
}
