//! Resumable six-stage sampling driver.
//!
//! ```text
//! global → local → instantiate → distribute → subdivide → split
//! ```
//!
//! Each call to [`SamplingAlgorithm::iterate`] performs at most one batch of
//! work inside the current stage. Stage boundaries are the only points where
//! intermediate results (counts, course plan, coarse stitches) change shape.

use std::collections::HashMap;

use log::{debug, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::SamplingError;
use crate::mesh::{EdgeId, GeodesicPath, RegionId, TimeMesh, stitch_alpha};
use crate::params::SamplingParams;
use crate::solver::branching::batch_expired;
use crate::solver::{
    AlignOptions, Batch, BindingOptions, CourseShape, GlobalOptions, GlobalProblem, GlobalSolution,
    GlobalSolver, Oracles, RegionBoundary, RegionSolution, RegionSolver, ShortRowSolution, align,
    bind_interface,
};
use crate::stitch::{Penalties, PenaltyWeights, StitchPoint, StitchSet};

use super::StitchSampling;
use super::courses::{Cluster, CoursePlan};
use super::diagnostics::SamplingDiagnostics;
use super::metrics::SamplingMetrics;
use super::split::{level_offsets, level_runs, transition_rows};
use super::stage::SamplingStage;
use super::subdivide::{discontinuity_column, interface_links, last_column, row_links, row_width};

/// Fine courses of one coarse pair, from its source row to its target row.
#[derive(Debug, Clone)]
struct FinePair {
    region: RegionId,
    courses: Vec<usize>,
    short_rows: ShortRowSolution,
}

type Task<'a> = fn(&mut SamplingAlgorithm<'a>, usize) -> Result<(), SamplingError>;

/// Stitch sampling of a region-annotated time mesh.
///
/// # Example
///
/// ```ignore
/// let mut sampler = SamplingAlgorithm::new(&mesh, params, Oracles::new(&tracer, &geodesics))?;
/// while !sampler.iterate(Batch::default())? {
///     report(sampler.stage(), sampler.progress());
/// }
/// let (sampling, diagnostics) = sampler.finish()?;
/// ```
pub struct SamplingAlgorithm<'a> {
    mesh: &'a TimeMesh,
    oracles: Oracles<'a>,
    params: SamplingParams,
    penalties: Penalties<'a>,
    stage: SamplingStage,
    finished: bool,
    /// Next task of the current stage.
    cursor: usize,

    global_solver: GlobalSolver,
    global: Option<GlobalSolution>,
    simple_regions: Vec<RegionId>,
    region_solver: Option<RegionSolver<'a>>,
    regions: Vec<RegionSolution>,

    plan: CoursePlan,
    coarse: StitchSet,
    pair_clusters: Vec<Vec<Cluster>>,
    interface_clusters: Vec<Vec<Cluster>>,

    fine: StitchSet,
    /// Fine course of every coarse course.
    fine_courses: Vec<usize>,
    /// First fine sub-column of every coarse stitch.
    fine_base: Vec<usize>,
    fine_pairs: Vec<FinePair>,
    rng: StdRng,

    diagnostics: SamplingDiagnostics,
    metrics: SamplingMetrics,
}

impl<'a> SamplingAlgorithm<'a> {
    /// Validates the configuration and the region graph, then prepares the
    /// global count search.
    pub fn new(
        mesh: &'a TimeMesh,
        params: SamplingParams,
        oracles: Oracles<'a>,
    ) -> Result<Self, SamplingError> {
        params.validate()?;
        mesh.graph.validate()?;
        let simple_regions: Vec<RegionId> = mesh
            .graph
            .topological_order()?
            .into_iter()
            .filter(|&r| mesh.graph.node(r).is_some_and(|n| n.is_simple()))
            .collect();
        let problem = GlobalProblem::from_graph(&mesh.graph, &params);
        let global_solver = GlobalSolver::new(problem, GlobalOptions::from_params(&params), oracles.relaxation);
        let mut metrics = SamplingMetrics::default();
        metrics.begin();
        debug!(
            "sampling {} regions over {} edges",
            simple_regions.len(),
            mesh.graph.edge_count()
        );
        Ok(Self {
            mesh,
            oracles,
            penalties: Penalties::new(mesh, oracles, PenaltyWeights::from_params(&params)),
            rng: StdRng::seed_from_u64(params.subdivision.seed),
            params,
            stage: SamplingStage::Global,
            finished: false,
            cursor: 0,
            global_solver,
            global: None,
            simple_regions,
            region_solver: None,
            regions: Vec::new(),
            plan: CoursePlan::default(),
            coarse: StitchSet::new(),
            pair_clusters: Vec::new(),
            interface_clusters: Vec::new(),
            fine: StitchSet::new(),
            fine_courses: Vec::new(),
            fine_base: Vec::new(),
            fine_pairs: Vec::new(),
            diagnostics: SamplingDiagnostics::new(),
            metrics,
        })
    }

    #[must_use]
    pub const fn stage(&self) -> SamplingStage {
        self.stage
    }

    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.finished
    }

    #[must_use]
    pub const fn params(&self) -> &SamplingParams {
        &self.params
    }

    /// Overall progress in `[0, 1]`: `(stage + stage fraction) / 6`.
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.finished {
            return 1.0;
        }
        let fraction = |total: usize| {
            if total == 0 {
                0.0
            } else {
                (self.cursor as f64 / total as f64).min(1.0)
            }
        };
        let within = match self.stage {
            SamplingStage::Global => {
                if self.global_solver.is_done() {
                    1.0
                } else {
                    0.0
                }
            }
            SamplingStage::Local => fraction(self.simple_regions.len()),
            SamplingStage::Instantiate => fraction(self.instantiate_tasks()),
            SamplingStage::Distribute => fraction(self.plan.pairs.len()),
            SamplingStage::Subdivide => fraction(self.subdivide_tasks()),
            SamplingStage::Split => fraction(self.fine_pairs.len()),
        };
        (self.stage.index() as f64 + within) / SamplingStage::COUNT as f64
    }

    #[must_use]
    pub const fn diagnostics(&self) -> &SamplingDiagnostics {
        &self.diagnostics
    }

    #[must_use]
    pub const fn global_solution(&self) -> Option<&GlobalSolution> {
        self.global.as_ref()
    }

    /// Solved regions, in topological order.
    #[must_use]
    pub fn region_solutions(&self) -> &[RegionSolution] {
        &self.regions
    }

    #[must_use]
    pub const fn plan(&self) -> &CoursePlan {
        &self.plan
    }

    /// Stitches before subdivision.
    #[must_use]
    pub const fn coarse_stitches(&self) -> &StitchSet {
        &self.coarse
    }

    /// Subdivided stitches, complete once the split stage is done.
    #[must_use]
    pub const fn stitches(&self) -> &StitchSet {
        &self.fine
    }

    /// Runs one batch of the current stage; `true` once every stage is done.
    pub fn iterate(&mut self, batch: Batch) -> Result<bool, SamplingError> {
        if self.finished {
            return Ok(true);
        }
        let stage = self.stage;
        let mut metrics = std::mem::take(&mut self.metrics);
        let result = metrics.time(stage, || self.step_stage(batch));
        self.metrics = metrics;
        if result? {
            self.complete_stage()?;
        }
        Ok(self.finished)
    }

    /// Runs every remaining stage without limits.
    pub fn run(mut self) -> Result<(StitchSampling, SamplingDiagnostics), SamplingError> {
        while !self.iterate(Batch::unbounded())? {}
        self.finish()
    }

    /// Takes the final stitches and the run diagnostics.
    pub fn finish(self) -> Result<(StitchSampling, SamplingDiagnostics), SamplingError> {
        if !self.finished {
            return Err(SamplingError::NoSolution {
                stage: self.stage.name(),
            });
        }
        let s = self.params.subdiv as f64;
        let sampling = StitchSampling::new(
            self.fine,
            self.params.course_dist / s,
            self.params.wale_dist / s,
            self.mesh.sketch_refs(),
        );
        Ok((sampling, self.diagnostics))
    }

    fn step_stage(&mut self, batch: Batch) -> Result<bool, SamplingError> {
        match self.stage {
            SamplingStage::Global => Ok(self.global_solver.iterate(batch)),
            SamplingStage::Local => self.step_local(batch),
            SamplingStage::Instantiate => {
                let total = self.instantiate_tasks();
                self.run_tasks(batch, total, Self::instantiate_task)
            }
            SamplingStage::Distribute => {
                let total = self.plan.pairs.len();
                self.run_tasks(batch, total, Self::distribute_pair)
            }
            SamplingStage::Subdivide => {
                let total = self.subdivide_tasks();
                self.run_tasks(batch, total, Self::subdivide_task)
            }
            SamplingStage::Split => {
                let total = self.fine_pairs.len();
                self.run_tasks(batch, total, Self::split_pair)
            }
        }
    }

    fn run_tasks(&mut self, batch: Batch, total: usize, task: Task<'a>) -> Result<bool, SamplingError> {
        let deadline = batch.deadline();
        let mut steps = 0;
        while self.cursor < total && steps < batch.iterations {
            let index = self.cursor;
            task(self, index)?;
            self.cursor += 1;
            steps += 1;
            if batch_expired(deadline) {
                break;
            }
        }
        Ok(self.cursor >= total)
    }

    fn complete_stage(&mut self) -> Result<(), SamplingError> {
        let stage = self.stage;
        match stage {
            SamplingStage::Global => {
                let solution = self.global_solver.solution()?;
                debug!(
                    "global counts {:?} (error {}, {} iterations)",
                    solution.counts, solution.error, solution.iterations
                );
                self.diagnostics.global_error = solution.error;
                self.global = Some(solution);
            }
            SamplingStage::Local => {
                let counts = self.global_counts()?.to_vec();
                self.plan = CoursePlan::build(self.mesh, &counts, &self.regions)?;
                self.coarse = StitchSet::with_capacity(self.plan.stitch_count());
                self.diagnostics.region_count = self.regions.len();
            }
            SamplingStage::Instantiate => {
                self.diagnostics.coarse_stitch_count = self.coarse.len();
            }
            SamplingStage::Distribute => {
                self.coarse.validate()?;
                self.diagnostics.absorb_cache(self.penalties.cache_stats());
                self.penalties.reset();
                let s = self.params.subdiv;
                self.fine = StitchSet::with_capacity(self.coarse.len() * s * s);
                self.fine_courses = vec![0; self.plan.courses.len()];
                self.fine_base = vec![0; self.coarse.len()];
            }
            SamplingStage::Subdivide => {
                let defaulted = self.diagnostics.defaulted_discontinuities;
                if defaulted > 0 {
                    let message = format!(
                        "{defaulted} shaping columns had no seam distance, used the {:?} policy",
                        self.params.subdivision.discontinuity
                    );
                    warn!("{message}");
                    self.diagnostics.add_warning(message);
                }
            }
            SamplingStage::Split => {
                self.fine.validate()?;
                self.diagnostics.absorb_cache(self.penalties.cache_stats());
                self.penalties.reset();
                let d = &mut self.diagnostics;
                d.stitch_count = self.fine.len();
                d.course_count = self.fine.courses().len();
                d.short_row_count = self.fine.short_rows().len();
                d.short_row_stitch_count = self.fine.len() - self.fine.course_stitch_count();
                d.timing = self.metrics.end();
                debug!("sampling complete: {}", d.summary());
                self.finished = true;
            }
        }
        debug!("stage {stage} complete");
        self.cursor = 0;
        if let Some(next) = stage.next() {
            self.stage = next;
        }
        Ok(())
    }

    fn global_counts(&self) -> Result<&[usize], SamplingError> {
        self.global
            .as_ref()
            .map(|g| g.counts.as_slice())
            .ok_or(SamplingError::NoSolution { stage: "global" })
    }

    // ── local ───────────────────────────────────────────────────────────────

    fn step_local(&mut self, batch: Batch) -> Result<bool, SamplingError> {
        let deadline = batch.deadline();
        while self.cursor < self.simple_regions.len() {
            let mut solver = match self.region_solver.take() {
                Some(solver) => solver,
                None => self.region_solver_for(self.simple_regions[self.cursor])?,
            };
            if !solver.iterate(batch)? {
                self.region_solver = Some(solver);
                return Ok(false);
            }
            let (solution, warnings) = solver.finish()?;
            self.diagnostics.local_error += solution.error;
            self.diagnostics.warnings.extend(warnings);
            self.regions.push(solution);
            self.cursor += 1;
            if batch_expired(deadline) {
                break;
            }
        }
        Ok(self.cursor >= self.simple_regions.len())
    }

    fn region_solver_for(&self, region: RegionId) -> Result<RegionSolver<'a>, SamplingError> {
        let counts = self.global_counts()?;
        let graph = &self.mesh.graph;
        let node = graph.node(region).ok_or(crate::mesh::GraphError::UnknownRegion(region))?;
        let boundary = |edges: &[EdgeId]| -> Result<RegionBoundary, SamplingError> {
            let edge = match edges {
                [id] => graph.edge(*id),
                _ => None,
            }
            .ok_or_else(|| {
                SamplingError::Invariant(format!("region {} needs one course per side", region.0))
            })?;
            Ok(RegionBoundary::new(edge.course.oriented(true).0, counts[edge.id.0]))
        };
        RegionSolver::new(
            self.mesh,
            self.oracles,
            &self.params,
            region,
            boundary(&node.inputs)?,
            boundary(&node.outputs)?,
        )
    }

    // ── instantiate ─────────────────────────────────────────────────────────

    fn instantiate_tasks(&self) -> usize {
        self.plan.courses.len() + self.plan.interfaces.len()
    }

    fn instantiate_task(&mut self, index: usize) -> Result<(), SamplingError> {
        let courses = self.plan.courses.len();
        if index >= courses {
            return self.bind(index - courses);
        }
        let slot = &self.plan.courses[index];
        let points = slot.stitch_points(1);
        self.coarse
            .push_course(&points, slot.is_circular(), slot.time, slot.region.0)?;
        Ok(())
    }

    fn bind(&mut self, index: usize) -> Result<(), SamplingError> {
        let slot = &self.plan.interfaces[index];
        let shapes = |courses: &[usize]| -> Vec<CourseShape> {
            courses
                .iter()
                .map(|&c| CourseShape::new(self.plan.courses[c].count, self.plan.courses[c].is_circular()))
                .collect()
        };
        let starts = |courses: &[usize]| -> Vec<usize> {
            courses
                .iter()
                .map(|&c| self.coarse.courses()[c].start as usize)
                .collect()
        };
        let (sources, targets) = (shapes(&slot.inputs), shapes(&slot.outputs));
        let (source_starts, target_starts) = (starts(&slot.inputs), starts(&slot.outputs));
        let region = slot.region;

        let (coarse, penalties) = (&self.coarse, &self.penalties);
        let binding = bind_interface(
            &sources,
            &targets,
            |s, t, si, ti| {
                penalties.wale(
                    coarse,
                    source_starts[s.course] + s.stitch,
                    target_starts[t.course] + t.stitch,
                    si,
                    ti,
                )
            },
            BindingOptions::from_params(&self.params),
        )?;
        let pairs: Vec<(usize, usize)> = binding
            .pairs
            .iter()
            .map(|(s, t)| (source_starts[s.course] + s.stitch, target_starts[t.course] + t.stitch))
            .collect();
        for &(s, t) in &pairs {
            self.coarse.add_wale(s, t)?;
        }
        debug!(
            "interface {} bound with {} wales (error {})",
            region.0,
            pairs.len(),
            binding.error
        );
        self.diagnostics.binding_error += binding.error;
        self.interface_clusters.push(Cluster::from_pairs(&pairs));
        Ok(())
    }

    // ── distribute ──────────────────────────────────────────────────────────

    fn distribute_pair(&mut self, index: usize) -> Result<(), SamplingError> {
        let pair = &self.plan.pairs[index];
        let source = self.coarse.courses()[pair.source];
        let target = self.coarse.courses()[pair.target];
        let circular = self.coarse.is_circular(pair.source) && self.coarse.is_circular(pair.target);
        let (ss, ts) = (source.start as usize, target.start as usize);

        let (coarse, penalties) = (&self.coarse, &self.penalties);
        let result = align(
            source.len(),
            target.len(),
            |s, t, si, ti| penalties.wale(coarse, ss + s, ts + t, si, ti),
            &AlignOptions::new().circular(circular).minimal(true),
        )
        .ok_or(SamplingError::NoSolution {
            stage: "distribute",
        })?;
        for &(s, t) in &result.path {
            self.coarse.add_wale(ss + s, ts + t)?;
        }
        self.diagnostics.distribution_error += result.cost;
        self.pair_clusters.push(Cluster::from_steps(
            &result.steps,
            (ss, source.len()),
            (ts, target.len()),
        ));
        Ok(())
    }

    // ── subdivide ───────────────────────────────────────────────────────────

    fn subdivide_tasks(&self) -> usize {
        self.plan.courses.len() + self.plan.pairs.len() + self.plan.interfaces.len()
    }

    fn subdivide_task(&mut self, index: usize) -> Result<(), SamplingError> {
        let (courses, pairs) = (self.plan.courses.len(), self.plan.pairs.len());
        if index < courses {
            self.first_row(index)
        } else if index < courses + pairs {
            self.subdivide_pair(index - courses)
        } else {
            self.link_interface(index - courses - pairs)
        }
    }

    /// Fine copy of coarse course `course`, `subdiv` stitches per coarse stitch.
    fn first_row(&mut self, course: usize) -> Result<(), SamplingError> {
        let s = self.params.subdiv;
        let slot = &self.plan.courses[course];
        let points = slot.stitch_points(s);
        let fine = self
            .fine
            .push_course(&points, slot.is_circular(), slot.time, slot.region.0)?;
        let start = self.fine.courses()[fine].start as usize;
        self.fine_courses[course] = fine;
        for (k, stitch) in self.coarse.courses()[course].indices().enumerate() {
            self.fine_base[stitch] = start + k * s;
        }
        Ok(())
    }

    fn sub_columns(&self, coarse: &[usize]) -> Vec<usize> {
        let s = self.params.subdiv;
        let base = &self.fine_base;
        coarse
            .iter()
            .flat_map(|&x| (0..s).map(move |q| base[x] + q))
            .collect()
    }

    /// Fine rows between the source and target courses of coarse pair
    /// `index`.
    ///
    /// Rows `1..s` belong to the source stitches. A target course that starts
    /// no further pair also receives its `s − 1` upper rows here, stacked
    /// below it, so every course contributes `s` fine rows.
    fn subdivide_pair(&mut self, index: usize) -> Result<(), SamplingError> {
        let s = self.params.subdiv;
        let pair = &self.plan.pairs[index];
        let (region, short_rows) = (pair.region, pair.short_rows.clone());
        let (source, target) = (self.fine_courses[pair.source], self.fine_courses[pair.target]);
        let (t0, t1) = (self.plan.courses[pair.source].time, self.plan.courses[pair.target].time);
        let extra = if self.plan.starts_pair(pair.target) { 0 } else { s - 1 };
        let transitions = s + extra;
        let circular = self.fine.is_circular(source) && self.fine.is_circular(target);
        let clusters = std::mem::take(&mut self.pair_clusters[index]);

        // cells[c][r]: fine stitches of cluster c on row r
        let mut cells: Vec<Vec<Vec<usize>>> = clusters
            .iter()
            .map(|c| {
                let mut rows = vec![Vec::new(); transitions + 1];
                rows[0] = self.sub_columns(&c.sources);
                rows[transitions] = self.sub_columns(&c.targets);
                rows
            })
            .collect();
        let mut geodesics: HashMap<(usize, usize), Option<GeodesicPath>> = HashMap::new();
        let mut courses = vec![source];
        for r in 1..transitions {
            let f = r as f64 / transitions as f64;
            let mut points = Vec::new();
            let mut widths = Vec::with_capacity(clusters.len());
            for (cluster, rows) in clusters.iter().zip(&cells) {
                let w = row_width(cluster.sources.len(), cluster.targets.len(), s, r.min(s));
                for q in 0..w {
                    let u = (q as f64 + 0.5) / w as f64;
                    let from = proportional(&rows[0], u);
                    let to = proportional(&rows[transitions], u);
                    let path = geodesics
                        .entry((from, to))
                        .or_insert_with(|| self.penalties.geodesic(&self.fine, from, to));
                    points.push(self.between(path.as_ref(), from, to, f));
                }
                widths.push(w);
            }
            let total = points.len();
            for (k, point) in points.iter_mut().enumerate() {
                point.alpha = stitch_alpha(k, total);
            }
            let course = self
                .fine
                .push_course(&points, circular, t0 + (t1 - t0) * f, region.0)?;
            let mut next = self.fine.courses()[course].start as usize;
            for (rows, w) in cells.iter_mut().zip(widths) {
                rows[r] = (next..next + w).collect();
                next += w;
            }
            courses.push(course);
        }
        courses.push(target);

        for rows in &cells {
            for r in 0..transitions {
                let (from, to) = (&rows[r], &rows[r + 1]);
                let column = match last_column(from.len(), to.len()) {
                    Some(last) => self.discontinuity(from, last, r),
                    None => 0,
                };
                for (a, b) in row_links(from.len(), to.len(), column)? {
                    self.fine.add_wale(from[a], to[b])?;
                }
            }
        }
        self.fine_pairs.push(FinePair {
            region,
            courses,
            short_rows,
        });
        Ok(())
    }

    fn between(&self, path: Option<&GeodesicPath>, from: usize, to: usize, f: f64) -> StitchPoint {
        let (layer, position) = match path {
            Some(path) => path.point_at(path.dist() * f),
            None => (
                self.fine.layer(from),
                self.fine.position(from).lerp(self.fine.position(to), f),
            ),
        };
        StitchPoint::new(layer, position, 0.0)
    }

    /// Shaping column of a fine transition: closest to a seam, else the
    /// configured policy.
    fn discontinuity(&mut self, row: &[usize], last: usize, transition: usize) -> usize {
        let seam = row[..=last]
            .iter()
            .enumerate()
            .map(|(d, &x)| (d, self.penalties.seam_distance(self.fine.layer(x), self.fine.position(x))))
            .filter(|(_, distance)| distance.is_finite())
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((column, _)) = seam {
            return column;
        }
        self.diagnostics.defaulted_discontinuities += 1;
        discontinuity_column(
            self.params.subdivision.discontinuity,
            last,
            transition,
            self.params.subdiv,
            &mut self.rng,
        )
    }

    fn link_interface(&mut self, index: usize) -> Result<(), SamplingError> {
        let clusters = std::mem::take(&mut self.interface_clusters[index]);
        for cluster in &clusters {
            let from = self.sub_columns(&cluster.sources);
            let to = self.sub_columns(&cluster.targets);
            for (a, b) in interface_links(from.len(), to.len())? {
                self.fine.add_wale(from[a], to[b])?;
            }
        }
        Ok(())
    }

    // ── split ───────────────────────────────────────────────────────────────

    fn split_pair(&mut self, index: usize) -> Result<(), SamplingError> {
        let pair = self.fine_pairs[index].clone();
        for transition in 0..pair.courses.len().saturating_sub(1) {
            self.split_transition(&pair, transition)?;
        }
        Ok(())
    }

    fn split_transition(&mut self, pair: &FinePair, transition: usize) -> Result<(), SamplingError> {
        let transitions = pair.courses.len() - 1;
        let row = self.fine.courses()[pair.courses[transition]];
        let next_time = f64::from(self.fine.courses()[pair.courses[transition + 1]].time);
        let time = f64::from(row.time);
        let circular = self.fine.is_circular(pair.courses[transition]);
        let stitches: Vec<usize> = row.indices().collect();

        let mut counts = Vec::with_capacity(stitches.len());
        let mut targets = Vec::with_capacity(stitches.len());
        for &x in &stitches {
            let rows = transition_rows(pair.short_rows.rows_at(self.fine.alpha(x)), transition, transitions);
            let next = self.fine.next_wales(x);
            let plain = match next.as_slice() {
                [y] if self.fine.prev_wales(*y).len() == 1 => Some(*y),
                _ => None,
            };
            if plain.is_none() {
                self.diagnostics.skipped_short_rows += rows;
            }
            counts.push(if plain.is_some() { rows } else { 0 });
            targets.push(plain);
        }
        let max = counts.iter().copied().max().unwrap_or(0);
        if max == 0 {
            return Ok(());
        }

        let paths: Vec<Option<GeodesicPath>> = stitches
            .iter()
            .zip(&counts)
            .zip(&targets)
            .map(|((&x, &m), y)| match y {
                Some(y) if m > 0 => self.penalties.geodesic(&self.fine, x, *y),
                _ => None,
            })
            .collect();
        let offsets = level_offsets(&counts, self.params.short_rows.alignment);
        let mut cells: Vec<Vec<usize>> = counts.iter().map(|&m| Vec::with_capacity(m)).collect();
        for level in 0..max {
            let occupied: Vec<bool> = counts
                .iter()
                .zip(&offsets)
                .map(|(&m, &o)| m > 0 && level >= o && level < o + m)
                .collect();
            for run in level_runs(&occupied, circular) {
                let points: Vec<StitchPoint> = run
                    .iter()
                    .map(|&q| {
                        let (x, y) = (stitches[q], targets[q].unwrap_or(stitches[q]));
                        let f = (level - offsets[q] + 1) as f64 / (counts[q] + 1) as f64;
                        let mut point = self.between(paths[q].as_ref(), x, y, f);
                        point.alpha = self.fine.alpha(x);
                        point
                    })
                    .collect();
                let level_time = time + (next_time - time) * (level + 1) as f64 / (max + 1) as f64;
                let group = self.fine.push_short_row(&points, level_time, pair.region.0)?;
                let start = self.fine.short_rows()[group].start as usize;
                for (offset, &q) in run.iter().enumerate() {
                    cells[q].push(start + offset);
                }
            }
        }

        for ((&x, target), column) in stitches.iter().zip(&targets).zip(&cells) {
            let Some(y) = *target else { continue };
            if column.is_empty() {
                continue;
            }
            self.fine.remove_wale(x, y)?;
            let mut previous = x;
            for &cell in column {
                self.fine.add_wale(previous, cell)?;
                previous = cell;
            }
            self.fine.add_wale(previous, y)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SamplingAlgorithm<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplingAlgorithm")
            .field("stage", &self.stage)
            .field("finished", &self.finished)
            .field("cursor", &self.cursor)
            .field("coarse", &self.coarse.len())
            .field("fine", &self.fine.len())
            .finish_non_exhaustive()
    }
}

/// Element of `items` at relative position `u ∈ [0, 1)`.
fn proportional(items: &[usize], u: f64) -> usize {
    let k = ((u * items.len() as f64) as usize).min(items.len().saturating_sub(1));
    items[k]
}
