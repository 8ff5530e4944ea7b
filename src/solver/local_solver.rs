//! Per-region search over the number of intermediate isolines.
//!
//! Each candidate count `N` moves through `Init → ShortRow → Isoline →
//! Complete`, one stage per [`RegionSolver::iterate`] call. Candidates wait in
//! a best-first queue keyed by their accumulated error; since every stage only
//! adds non-negative error, the first completed candidate is optimal.

use log::debug;

use crate::ds::PairingQueue;
use crate::error::SamplingError;
use crate::mesh::{CoursePath, RegionId, TimeMesh};
use crate::params::SamplingParams;
use crate::region::find_isoline;

use super::Oracles;
use super::branching::{Alternating, Batch, batch_expired};
use super::local_bb::{LocalBranchAndBound, LocalOptions, LocalProblem};
use super::short_row::{ShortRowSolution, solve_short_rows};

/// Candidate isoline counts for a region of time range `dt`.
///
/// Starts from `max(minN, round(dt / wale_dist) − 1)` and alternates around
/// it, never going below the minimum count `minN` the shaping factor allows.
#[must_use]
pub fn isoline_counts(
    dt: f64,
    wale_dist: f64,
    start: usize,
    end: usize,
    shaping: f64,
    branches: usize,
) -> Vec<usize> {
    let (a, b) = (start.max(1) as f64, end.max(1) as f64);
    let ratio = (a / b).max(b / a);
    let min_n = ((ratio.ln() / shaping.ln() - 1e-9).ceil() as i64 - 1).max(0);
    let n0 = ((dt / wale_dist).round() as i64 - 1).max(min_n);
    let mut candidates = Alternating::new(n0, min_n, n0 + branches as i64);
    std::iter::from_fn(|| candidates.next_candidate().map(|(n, _)| n as usize))
        .take(branches)
        .collect()
}

/// Boundary course of a region with its fixed stitch count.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionBoundary {
    pub course: CoursePath,
    pub count: usize,
}

impl RegionBoundary {
    #[must_use]
    pub fn new(course: CoursePath, count: usize) -> Self {
        Self { course, count }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionSolution {
    pub region: RegionId,
    /// Intermediate isolines in time order.
    pub isolines: Vec<(f64, CoursePath)>,
    /// Stitch count of each intermediate isoline.
    pub counts: Vec<usize>,
    /// Short rows of each consecutive course pair, from the start boundary.
    pub short_rows: Vec<ShortRowSolution>,
    pub error: f64,
}

impl RegionSolution {
    /// Number of intermediate isolines.
    #[must_use]
    pub fn isoline_count(&self) -> usize {
        self.isolines.len()
    }
}

#[derive(Debug, Clone)]
enum Stage {
    Init,
    ShortRow {
        isolines: Vec<(f64, CoursePath)>,
    },
    Isoline {
        isolines: Vec<(f64, CoursePath)>,
        short_rows: Vec<ShortRowSolution>,
        error: f64,
    },
    Complete(RegionSolution),
}

#[derive(Debug, Clone)]
struct Candidate {
    n: usize,
    stage: Stage,
}

/// Resumable isoline-count search of one simple region.
pub struct RegionSolver<'a> {
    mesh: &'a TimeMesh,
    oracles: Oracles<'a>,
    params: SamplingParams,
    region: RegionId,
    time_range: (f64, f64),
    start: RegionBoundary,
    end: RegionBoundary,
    states: Vec<Candidate>,
    queue: PairingQueue<usize>,
    solution: Option<RegionSolution>,
    warnings: Vec<String>,
    steps: usize,
}

impl<'a> RegionSolver<'a> {
    pub fn new(
        mesh: &'a TimeMesh,
        oracles: Oracles<'a>,
        params: &SamplingParams,
        region: RegionId,
        start: RegionBoundary,
        end: RegionBoundary,
    ) -> Result<Self, SamplingError> {
        let node = mesh
            .graph
            .node(region)
            .filter(|n| n.is_simple())
            .ok_or_else(|| SamplingError::Invariant(format!("region {} is not simple", region.0)))?;
        let time_range = (node.t_min, node.t_max);
        let counts = isoline_counts(
            node.time_range(),
            params.wale_dist,
            start.count,
            end.count,
            params.shaping_factor,
            params.local.branches,
        );
        let mut solver = Self {
            mesh,
            oracles,
            params: *params,
            region,
            time_range,
            start,
            end,
            states: Vec::with_capacity(counts.len()),
            queue: PairingQueue::new(),
            solution: None,
            warnings: Vec::new(),
            steps: 0,
        };
        for n in counts {
            solver.push(Candidate { n, stage: Stage::Init }, 0.0);
        }
        debug!(
            "region {}: {} isoline count candidates",
            region.0,
            solver.states.len()
        );
        Ok(solver)
    }

    fn push(&mut self, candidate: Candidate, priority: f64) {
        self.states.push(candidate);
        self.queue.insert(self.states.len() - 1, priority);
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.solution.is_some() || self.queue.is_empty()
    }

    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Number of stage transitions processed so far.
    #[must_use]
    pub const fn steps(&self) -> usize {
        self.steps
    }

    /// Runs stage transitions for one batch; `true` once a solution exists
    /// or every candidate was pruned.
    pub fn iterate(&mut self, batch: Batch) -> Result<bool, SamplingError> {
        let deadline = batch.deadline();
        for _ in 0..batch.iterations {
            if self.is_done() {
                return Ok(true);
            }
            self.step()?;
            if batch_expired(deadline) {
                break;
            }
        }
        Ok(self.is_done())
    }

    fn step(&mut self) -> Result<(), SamplingError> {
        let Some((index, priority)) = self.queue.pop_with_priority() else {
            return Ok(());
        };
        self.steps += 1;
        let Candidate { n, stage } = self.states[index].clone();
        match stage {
            Stage::Init => {
                let isolines = self.trace_isolines(n)?;
                self.push(
                    Candidate {
                        n,
                        stage: Stage::ShortRow { isolines },
                    },
                    priority,
                );
            }
            Stage::ShortRow { isolines } => {
                let short_rows = self.solve_short_rows(&isolines)?;
                let error = short_rows.iter().map(|s| s.error).sum::<f64>();
                self.push(
                    Candidate {
                        n,
                        stage: Stage::Isoline {
                            isolines,
                            short_rows,
                            error,
                        },
                    },
                    priority + error,
                );
            }
            Stage::Isoline {
                isolines,
                short_rows,
                error,
            } => {
                let lengths: Vec<f64> = isolines.iter().map(|(_, c)| c.length()).collect();
                let problem = LocalProblem::from_lengths(
                    (self.start.count, self.start.course.length()),
                    (self.end.count, self.end.course.length()),
                    &lengths,
                    self.params.course_dist,
                    self.params.local.linear_interpolation,
                    self.params.shaping_factor,
                );
                let solver = LocalBranchAndBound::new(
                    problem,
                    LocalOptions::from_params(&self.params),
                    self.oracles.relaxation,
                );
                match solver.solve() {
                    Ok(counts) => {
                        let total = error + counts.error;
                        self.push(
                            Candidate {
                                n,
                                stage: Stage::Complete(RegionSolution {
                                    region: self.region,
                                    isolines,
                                    counts: counts.counts,
                                    short_rows,
                                    error: total,
                                }),
                            },
                            total,
                        );
                    }
                    // infeasible candidate
                    Err(SamplingError::NoSolution { .. }) => {
                        debug!("region {}: no counts for {n} isolines", self.region.0);
                    }
                    Err(other) => return Err(other),
                }
            }
            Stage::Complete(solution) => {
                debug!(
                    "region {} solved with {} isolines (error {})",
                    self.region.0,
                    solution.isoline_count(),
                    solution.error
                );
                self.solution = Some(solution);
            }
        }
        Ok(())
    }

    fn trace_isolines(&mut self, n: usize) -> Result<Vec<(f64, CoursePath)>, SamplingError> {
        let (t_min, t_max) = self.time_range;
        let dt = (t_max - t_min) / (n + 1) as f64;
        (1..=n)
            .map(|k| {
                let t = t_min + dt * k as f64;
                let course = find_isoline(self.mesh, self.oracles.tracer, self.region, t, &mut self.warnings)?;
                Ok((t, course.oriented(true).0))
            })
            .collect()
    }

    fn solve_short_rows(
        &self,
        isolines: &[(f64, CoursePath)],
    ) -> Result<Vec<ShortRowSolution>, SamplingError> {
        let courses: Vec<&CoursePath> = std::iter::once(&self.start.course)
            .chain(isolines.iter().map(|(_, c)| c))
            .chain(std::iter::once(&self.end.course))
            .collect();
        courses
            .windows(2)
            .map(|pair| solve_short_rows(self.mesh, self.oracles, &self.params, pair[0], pair[1]))
            .collect()
    }

    /// Runs the search to completion.
    pub fn solve(mut self) -> Result<RegionSolution, SamplingError> {
        while !self.iterate(Batch::unbounded())? {}
        self.into_solution()
    }

    pub fn into_solution(self) -> Result<RegionSolution, SamplingError> {
        self.solution.ok_or(SamplingError::NoSolution { stage: "local" })
    }

    /// Takes the solution and the warnings collected while tracing.
    pub fn finish(self) -> Result<(RegionSolution, Vec<String>), SamplingError> {
        let warnings = self.warnings;
        let solution = self.solution.ok_or(SamplingError::NoSolution { stage: "local" })?;
        Ok((solution, warnings))
    }
}
