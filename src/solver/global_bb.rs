//! Global stitch-count branch-and-bound over all region edges.
//!
//! One integer count per region edge. Interfaces conserve the number of
//! stitches (`Σ inputs = Σ outputs`), and the objective is
//!
//! ```text
//! E = course_w · Σ (n_e − cdata_e)² + simplicity_w · Σ_simple (n_in − n_out)²
//! ```
//!
//! where the simplicity term may be replaced by a hard shaping bound per
//! simple region (`global_shaping`).
//!
//! # Example
//!
//! ```ignore
//! let problem = GlobalProblem::from_graph(&mesh.graph, &params);
//! let solution = GlobalSolver::new(problem, GlobalOptions::from_params(&params), &NoRelaxation)
//!     .solve()?;
//! ```

use log::{debug, warn};

use crate::error::SamplingError;
use crate::mesh::{RegionGraph, RegionId, RegionKind};
use crate::params::SamplingParams;

use super::branching::{Alternating, Batch, Budget, Direction, batch_expired};
use super::relaxation::{ContinuousRelaxation, GlobalRelaxation};

/// Constraint node of the global problem.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalNode {
    pub region: RegionId,
    pub kind: RegionKind,
    pub inputs: Vec<usize>,
    pub outputs: Vec<usize>,
    /// Allowed count ratio across a simple region (`≥ 1`).
    pub wale_amplification: f64,
    /// All courses of the node are flat.
    pub flat: bool,
}

impl GlobalNode {
    #[must_use]
    pub fn interface(region: RegionId, inputs: Vec<usize>, outputs: Vec<usize>) -> Self {
        Self {
            region,
            kind: RegionKind::Interface,
            inputs,
            outputs,
            wale_amplification: 1.0,
            flat: true,
        }
    }

    #[must_use]
    pub fn simple(region: RegionId, input: usize, output: usize, wale_amplification: f64) -> Self {
        Self {
            region,
            kind: RegionKind::Simple,
            inputs: vec![input],
            outputs: vec![output],
            wale_amplification: wale_amplification.max(1.0),
            flat: true,
        }
    }

    #[must_use]
    pub const fn circular(mut self, circular: bool) -> Self {
        self.flat = !circular;
        self
    }

    /// Interfaces with both inputs and outputs conserve stitches.
    #[must_use]
    pub fn conserves(&self) -> bool {
        self.kind == RegionKind::Interface && !self.inputs.is_empty() && !self.outputs.is_empty()
    }

    fn members(&self) -> impl Iterator<Item = usize> + '_ {
        self.inputs.iter().chain(&self.outputs).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalProblem {
    pub cdata: Vec<f64>,
    pub nodes: Vec<GlobalNode>,
}

impl GlobalProblem {
    #[must_use]
    pub fn new(cdata: Vec<f64>, nodes: Vec<GlobalNode>) -> Self {
        Self { cdata, nodes }
    }

    /// Targets `cdata_e = max(4, course width / course distance)` per edge.
    #[must_use]
    pub fn from_graph(graph: &RegionGraph, params: &SamplingParams) -> Self {
        let cdata = graph
            .edges()
            .iter()
            .map(|e| (e.course.length() / params.course_dist).max(4.0))
            .collect();
        let circular = |edges: &[crate::mesh::EdgeId]| {
            edges
                .iter()
                .filter_map(|&e| graph.edge(e))
                .any(|e| e.course.is_circular())
        };
        let nodes = graph
            .nodes()
            .iter()
            .map(|node| {
                let inputs: Vec<usize> = node.inputs.iter().map(|e| e.0).collect();
                let outputs: Vec<usize> = node.outputs.iter().map(|e| e.0).collect();
                let is_circular = circular(&node.inputs) || circular(&node.outputs);
                match node.kind {
                    RegionKind::Interface => {
                        GlobalNode::interface(node.id, inputs, outputs).circular(is_circular)
                    }
                    RegionKind::Simple => {
                        let courses = node.time_range() / params.wale_dist;
                        GlobalNode {
                            region: node.id,
                            kind: RegionKind::Simple,
                            inputs,
                            outputs,
                            wale_amplification: params.shaping_factor.powf(courses).max(1.0),
                            flat: !is_circular,
                        }
                    }
                }
            })
            .collect();
        Self { cdata, nodes }
    }

    #[must_use]
    pub fn variable_count(&self) -> usize {
        self.cdata.len()
    }

    /// `(snMin, snMax)` shared by every variable.
    #[must_use]
    pub fn bounds(&self) -> (i64, i64) {
        if self.cdata.is_empty() {
            return (1, 1);
        }
        let min = self.cdata.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.cdata.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let fan = self
            .nodes
            .iter()
            .filter(|n| n.kind == RegionKind::Interface)
            .map(|n| n.inputs.len().max(n.outputs.len()))
            .max()
            .unwrap_or(1)
            .max(1);
        let lo = (min.floor() as i64).max(1);
        let hi = (max.ceil() as i64 * fan as i64).max(lo);
        (lo, hi)
    }

    /// Objective of a complete assignment; infinite when a hard constraint fails.
    #[must_use]
    pub fn error(&self, counts: &[f64], options: &GlobalOptions) -> f64 {
        let mut error: f64 = counts
            .iter()
            .zip(&self.cdata)
            .map(|(n, c)| options.course_weight * (n - c).powi(2))
            .sum();
        for node in &self.nodes {
            let inp: f64 = node.inputs.iter().map(|&e| counts[e]).sum();
            let out: f64 = node.outputs.iter().map(|&e| counts[e]).sum();
            match node.kind {
                RegionKind::Interface if node.conserves() => {
                    if (inp - out).abs() > options.constraint_tol {
                        return f64::INFINITY;
                    }
                }
                RegionKind::Interface => {}
                RegionKind::Simple => {
                    error += simple_term(inp, out, node.wale_amplification, options);
                }
            }
        }
        error
    }

    fn conservation_violation(&self, counts: &[f64]) -> f64 {
        self.nodes
            .iter()
            .filter(|n| n.conserves())
            .map(|n| {
                let inp: f64 = n.inputs.iter().map(|&e| counts[e]).sum();
                let out: f64 = n.outputs.iter().map(|&e| counts[e]).sum();
                (inp - out).abs()
            })
            .sum()
    }
}

fn simple_term(inp: f64, out: f64, amplification: f64, options: &GlobalOptions) -> f64 {
    if options.global_shaping {
        if out / amplification <= inp && inp <= out * amplification {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        options.simplicity_weight * (inp - out).powi(2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalOptions {
    pub course_weight: f64,
    pub simplicity_weight: f64,
    pub global_shaping: bool,
    pub uniform_branching: bool,
    pub even_interfaces: bool,
    pub constraint_tol: f64,
    pub aliasing_level: f64,
    pub budget_ms: Option<u64>,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self::from_params(&SamplingParams::default())
    }
}

impl GlobalOptions {
    #[must_use]
    pub fn from_params(params: &SamplingParams) -> Self {
        Self {
            course_weight: params.weights.course,
            simplicity_weight: params.weights.simplicity,
            global_shaping: params.global.global_shaping,
            uniform_branching: params.global.uniform_branching,
            even_interfaces: params.global.even_interfaces,
            constraint_tol: params.global.constraint_tol,
            aliasing_level: params.global.aliasing_level,
            budget_ms: Some(params.global.budget_ms),
        }
    }

    #[must_use]
    pub const fn unbounded(mut self) -> Self {
        self.budget_ms = None;
        self
    }
}

/// Origin of the pivot the search was centered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotKind {
    Default,
    Relaxed,
    Rounded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSolution {
    /// Count per region edge.
    pub counts: Vec<usize>,
    pub error: f64,
    pub pivot: PivotKind,
    pub iterations: usize,
    /// The search ran out of time before exhausting the tree.
    pub timed_out: bool,
}

#[derive(Debug, Clone)]
struct Frame {
    candidates: Alternating,
    partial: f64,
}

/// Resumable depth-first branch-and-bound.
#[derive(Debug, Clone)]
pub struct GlobalSolver {
    problem: GlobalProblem,
    options: GlobalOptions,
    order: Vec<usize>,
    /// Conservation node completed (and inferred) at each depth.
    inferred: Vec<Option<usize>>,
    /// Simple nodes whose terms become known at each depth.
    completed: Vec<Vec<usize>>,
    center: Vec<i64>,
    bounds: (i64, i64),
    pivot: PivotKind,
    assignment: Vec<i64>,
    stack: Vec<Frame>,
    best: Option<Vec<i64>>,
    best_error: f64,
    budget: Budget,
    started: bool,
    done: bool,
    timed_out: bool,
    iterations: usize,
}

impl GlobalSolver {
    #[must_use]
    pub fn new(
        problem: GlobalProblem,
        options: GlobalOptions,
        relaxation: &dyn ContinuousRelaxation,
    ) -> Self {
        let order = variable_order(&problem);
        let mut position = vec![0usize; problem.variable_count()];
        for (depth, &var) in order.iter().enumerate() {
            position[var] = depth;
        }
        let mut inferred = vec![None; order.len()];
        let mut completed = vec![Vec::new(); order.len()];
        for (index, node) in problem.nodes.iter().enumerate() {
            let Some(last) = node.members().map(|v| position[v]).max() else {
                continue;
            };
            if node.conserves() {
                inferred[last] = Some(index);
            } else if node.kind == RegionKind::Simple {
                completed[last].push(index);
            }
        }

        let bounds = problem.bounds();
        let mut solver = Self {
            center: vec![0; problem.variable_count()],
            assignment: vec![0; problem.variable_count()],
            problem,
            options,
            order,
            inferred,
            completed,
            bounds,
            pivot: PivotKind::Default,
            stack: Vec::new(),
            best: None,
            best_error: f64::INFINITY,
            budget: options.budget_ms.map_or_else(Budget::unlimited, Budget::new),
            started: false,
            done: false,
            timed_out: false,
            iterations: 0,
        };
        solver.choose_pivot(relaxation);
        solver
    }

    /// Picks the best of the default, relaxed and rounded-relaxed pivots and
    /// adopts any feasible rounded pivot as incumbent.
    fn choose_pivot(&mut self, relaxation: &dyn ContinuousRelaxation) {
        let (lo, hi) = self.bounds;
        let round = |v: &[f64]| -> Vec<f64> {
            v.iter()
                .map(|x| (x.round() as i64).clamp(lo, hi) as f64)
                .collect()
        };
        let default = round(&self.problem.cdata);
        let mut pivots = vec![(PivotKind::Default, default)];

        let wdata: Vec<f64> = self
            .problem
            .nodes
            .iter()
            .map(|n| n.wale_amplification)
            .collect();
        let relaxed = relaxation.optimize_global(&GlobalRelaxation {
            cdata: &self.problem.cdata,
            wdata: &wdata,
            nodes: &self.problem.nodes,
            course_weight: self.options.course_weight,
            simplicity_weight: self.options.simplicity_weight,
            global_shaping: self.options.global_shaping,
            aliasing_level: self.options.aliasing_level,
            constraint_tol: self.options.constraint_tol,
        });
        if let Some(relaxed) = relaxed.filter(|r| r.len() == self.problem.variable_count()) {
            let rounded = round(&relaxed);
            pivots.push((PivotKind::Relaxed, relaxed));
            pivots.push((PivotKind::Rounded, rounded));
        }

        let mut relaxed_options = self.options;
        relaxed_options.constraint_tol = f64::INFINITY;
        let score = |v: &[f64]| {
            self.problem.error(v, &relaxed_options) + 1e6 * self.problem.conservation_violation(v)
        };
        let mut best_score = f64::INFINITY;
        for (kind, pivot) in &pivots {
            let s = score(pivot);
            if s < best_score {
                best_score = s;
                self.pivot = *kind;
                self.center = pivot.iter().map(|x| x.round() as i64).collect();
            }
            if *kind != PivotKind::Relaxed {
                let error = self.problem.error(pivot, &self.options);
                if error < self.best_error {
                    self.best_error = error;
                    self.best = Some(pivot.iter().map(|&x| x as i64).collect());
                }
            }
        }
        debug!(
            "global pivot {:?}, incumbent error {}",
            self.pivot, self.best_error
        );
    }

    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    #[must_use]
    pub const fn best_error(&self) -> f64 {
        self.best_error
    }

    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.iterations
    }

    fn candidates_at(&self, depth: usize) -> Option<Alternating> {
        let var = self.order[depth];
        let (lo, hi) = self.bounds;
        match self.inferred[depth] {
            Some(node_index) => {
                let node = &self.problem.nodes[node_index];
                let (same, other) = if node.inputs.contains(&var) {
                    (&node.inputs, &node.outputs)
                } else {
                    (&node.outputs, &node.inputs)
                };
                let other_sum: i64 = other.iter().map(|&e| self.assignment[e]).sum();
                let same_sum: i64 = same
                    .iter()
                    .filter(|&&e| e != var)
                    .map(|&e| self.assignment[e])
                    .sum();
                let value = other_sum - same_sum;
                (lo <= value && value <= hi).then(|| Alternating::single(value))
            }
            None => Some(Alternating::new(self.center[var], lo, hi)),
        }
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
            if self.step() {
                self.finish(false);
                return true;
            }
            steps += 1;
            if steps % 64 == 0 && batch_expired(deadline) {
                break;
            }
            if steps % 256 == 0 && self.budget.expired() {
                self.finish(true);
                return true;
            }
        }
        if self.budget.expired() {
            self.finish(true);
            return true;
        }
        false
    }

    /// One candidate evaluation; `true` when the tree is exhausted.
    fn step(&mut self) -> bool {
        if self.order.is_empty() {
            return true;
        }
        if !self.started {
            self.started = true;
            match self.candidates_at(0) {
                Some(candidates) => self.stack.push(Frame {
                    candidates,
                    partial: 0.0,
                }),
                None => return true,
            }
        }
        let Some(depth) = self.stack.len().checked_sub(1) else {
            return true;
        };
        let frame = &mut self.stack[depth];
        let Some((value, direction)) = frame.candidates.next_candidate() else {
            self.stack.pop();
            return self.stack.is_empty();
        };
        self.iterations += 1;
        let partial = frame.partial;

        let var = self.order[depth];
        let target = self.problem.cdata[var];
        let course = self.options.course_weight * (value as f64 - target).powi(2);
        if partial + course >= self.best_error {
            let monotone = match direction {
                Direction::Up => value as f64 >= target,
                Direction::Down => value as f64 <= target,
                Direction::Center => false,
            };
            if monotone {
                if let Some(frame) = self.stack.last_mut() {
                    frame.candidates.close(direction);
                }
            }
            return false;
        }

        self.assignment[var] = value;
        let mut next = partial + course;
        for &node_index in &self.completed[depth] {
            let node = &self.problem.nodes[node_index];
            let inp: i64 = node.inputs.iter().map(|&e| self.assignment[e]).sum();
            let out: i64 = node.outputs.iter().map(|&e| self.assignment[e]).sum();
            next += simple_term(inp as f64, out as f64, node.wale_amplification, &self.options);
        }
        if !(next < self.best_error) {
            return false;
        }

        if depth + 1 == self.order.len() {
            self.best_error = next;
            self.best = Some(self.assignment.clone());
            return false;
        }
        if let Some(candidates) = self.candidates_at(depth + 1) {
            self.stack.push(Frame {
                candidates,
                partial: next,
            });
        }
        false
    }

    fn finish(&mut self, timed_out: bool) {
        self.done = true;
        self.timed_out = timed_out;
        self.stack.clear();
        debug!(
            "global branch-and-bound finished after {} iterations (error {}, timed out: {timed_out})",
            self.iterations, self.best_error
        );
    }

    /// Runs the search to completion (or budget exhaustion).
    pub fn solve(mut self) -> Result<GlobalSolution, SamplingError> {
        while !self.iterate(Batch::unbounded()) {}
        self.solution()
    }

    fn error_of(&self, counts: &[i64]) -> f64 {
        let as_f64: Vec<f64> = counts.iter().map(|&n| n as f64).collect();
        self.problem.error(&as_f64, &self.options)
    }

    /// Best solution found so far, with post-hoc adjustments applied.
    ///
    /// Adjustments that would make the solution infeasible are dropped.
    pub fn solution(&self) -> Result<GlobalSolution, SamplingError> {
        let Some(best) = self.best.as_ref() else {
            return Err(SamplingError::NoSolution { stage: "global" });
        };
        let mut counts = best.clone();
        if self.options.uniform_branching {
            apply_uniform_branching(&self.problem, &mut counts);
        }
        if self.options.even_interfaces {
            apply_even_interfaces(&self.problem, &mut counts);
        }
        let mut error = self.error_of(&counts);
        if !error.is_finite() && counts != *best {
            warn!("interface adjustments break a hard shaping bound, keeping the unadjusted counts");
            counts.clone_from(best);
            error = self.error_of(&counts);
        }
        Ok(GlobalSolution {
            counts: counts.iter().map(|&n| n.max(1) as usize).collect(),
            error,
            pivot: self.pivot,
            iterations: self.iterations,
            timed_out: self.timed_out,
        })
    }
}

/// Edges of conservation cliques first (node by node), then the rest.
fn variable_order(problem: &GlobalProblem) -> Vec<usize> {
    let mut seen = vec![false; problem.variable_count()];
    let mut order = Vec::with_capacity(problem.variable_count());
    for node in problem.nodes.iter().filter(|n| n.conserves()) {
        for var in node.members() {
            if !seen[var] {
                seen[var] = true;
                order.push(var);
            }
        }
    }
    for (var, was_seen) in seen.iter().enumerate() {
        if !was_seen {
            order.push(var);
        }
    }
    order
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 { a.abs() } else { gcd(b, a % b) }
}

/// Equalizes per-course counts on flat branching interfaces.
fn apply_uniform_branching(problem: &GlobalProblem, counts: &mut [i64]) {
    for node in problem.nodes.iter().filter(|n| n.conserves() && n.flat) {
        let (ni, no) = (node.inputs.len() as i64, node.outputs.len() as i64);
        if ni == 1 && no == 1 {
            continue;
        }
        let lcm = ni / gcd(ni, no) * no;
        let total: i64 = node.inputs.iter().map(|&e| counts[e]).sum();
        let total = ((total as f64 / lcm as f64).round() as i64).max(1) * lcm;
        for &e in &node.inputs {
            counts[e] = total / ni;
        }
        for &e in &node.outputs {
            counts[e] = total / no;
        }
    }
}

/// Rounds interface totals up to even values, adding the missing stitch on
/// each side to the course furthest below its target.
fn apply_even_interfaces(problem: &GlobalProblem, counts: &mut [i64]) {
    for node in problem.nodes.iter().filter(|n| n.kind == RegionKind::Interface) {
        let side = if node.inputs.is_empty() {
            &node.outputs
        } else {
            &node.inputs
        };
        let total: i64 = side.iter().map(|&e| counts[e]).sum();
        if side.is_empty() || total % 2 == 0 {
            continue;
        }
        for side in [&node.inputs, &node.outputs] {
            let pick = side.iter().copied().max_by(|&a, &b| {
                let da = problem.cdata[a] - counts[a] as f64;
                let db = problem.cdata[b] - counts[b] as f64;
                da.total_cmp(&db)
            });
            if let Some(e) = pick {
                counts[e] += 1;
            }
        }
    }
}
