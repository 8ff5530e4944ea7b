//! Short-row counts between two consecutive courses.
//!
//! Both courses are sampled at the same resolution and aligned. Each source
//! sample then gets an expected number of short rows from the distance to
//! its matches (`d / (κ · wale_dist) − 1`), which is rounded under one of the
//! [`ShortRowMode`]s. At least one sample always keeps zero short rows, so the
//! course stays realizable.
//!
//! # Example
//!
//! ```ignore
//! let cost = ShortRowCost::new(1.0, 1.0, false, 2.0);
//! let mut rows = round_short_rows(&expected, ShortRowMode::Max, &cost, &NoRelaxation);
//! enforce_zero(&mut rows, &expected, &cost);
//! ```

use std::cell::RefCell;

use log::debug;

use crate::core::Vec2;
use crate::error::SamplingError;
use crate::mesh::{CoursePath, CoursePoint, TimeMesh, stitch_alpha};
use crate::params::{SamplingParams, ShortRowMode, SubSampleMetric};

use super::Oracles;
use super::dtw::{AlignOptions, AlignResult, align};
use super::relaxation::{ContinuousRelaxation, ShortRowRelaxation};

/// Distance reported for sample pairs the distance oracle cannot connect.
const UNREACHABLE: f64 = 1e9;
const CURVATURE_EPS: f64 = 1e-3;

/// Weights of the short-row objective
/// `Σ wale_w·(sr_i − e_i)² + simplicity_w·Σ |sr_i − sr_{i+1}|^p`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShortRowCost {
    pub wale_weight: f64,
    pub simplicity_weight: f64,
    pub circular: bool,
    pub power: f64,
}

impl ShortRowCost {
    #[must_use]
    pub const fn new(wale_weight: f64, simplicity_weight: f64, circular: bool, power: f64) -> Self {
        Self {
            wale_weight,
            simplicity_weight,
            circular,
            power,
        }
    }

    #[must_use]
    pub fn from_params(params: &SamplingParams, circular: bool) -> Self {
        Self::new(
            params.weights.wale,
            params.weights.simplicity,
            circular,
            params.short_rows.simplicity_power,
        )
    }
}

/// Mean of each value with its direct neighbors.
#[must_use]
pub fn smooth_distances(values: &[f64], circular: bool) -> Vec<f64> {
    let n = values.len();
    if n < 3 {
        return values.to_vec();
    }
    (0..n)
        .map(|i| {
            let mut sum = values[i];
            let mut count = 1.0;
            let prev = if i > 0 { Some(i - 1) } else { circular.then_some(n - 1) };
            let next = if i + 1 < n { Some(i + 1) } else { circular.then_some(0) };
            for j in [prev, next].into_iter().flatten() {
                sum += values[j];
                count += 1.0;
            }
            sum / count
        })
        .collect()
}

/// `d_i / (κ_i · wale_dist) − 1` per sample.
#[must_use]
pub fn expected_short_rows(distances: &[f64], curvatures: &[f64], wale_dist: f64) -> Vec<f64> {
    distances
        .iter()
        .zip(curvatures)
        .map(|(d, k)| d / (k.max(CURVATURE_EPS) * wale_dist) - 1.0)
        .collect()
}

/// Objective value of an integer assignment.
#[must_use]
pub fn short_row_error(rows: &[usize], expected: &[f64], cost: &ShortRowCost) -> f64 {
    let accuracy: f64 = rows
        .iter()
        .zip(expected)
        .map(|(&r, e)| cost.wale_weight * (r as f64 - e).powi(2))
        .sum();
    let n = rows.len();
    let pairs = if cost.circular && n > 2 { n } else { n.saturating_sub(1) };
    let simplicity: f64 = (0..pairs)
        .map(|i| (rows[i] as f64 - rows[(i + 1) % n] as f64).abs().powf(cost.power))
        .sum();
    accuracy + cost.simplicity_weight * simplicity
}

/// Integer short rows from the expected values.
///
/// `qip` adopts the relaxation's rounded answer when it is offered and beats
/// plain rounding; otherwise it falls back to `max`.
#[must_use]
pub fn round_short_rows(
    expected: &[f64],
    mode: ShortRowMode,
    cost: &ShortRowCost,
    relaxation: &dyn ContinuousRelaxation,
) -> Vec<usize> {
    let rounded = |values: &[f64]| -> Vec<usize> {
        values.iter().map(|v| v.round().max(0.0) as usize).collect()
    };
    match mode {
        ShortRowMode::None => vec![0; expected.len()],
        ShortRowMode::Max => rounded(expected),
        ShortRowMode::Qip => {
            let fallback = rounded(expected);
            let relaxed = relaxation.optimize_short_rows(&ShortRowRelaxation {
                cdata: expected,
                wale_weight: cost.wale_weight,
                simplicity_weight: cost.simplicity_weight,
                circular: cost.circular,
                simplicity_power: cost.power,
            });
            match relaxed.filter(|r| r.len() == expected.len()) {
                Some(relaxed) => {
                    let candidate = rounded(&relaxed);
                    if short_row_error(&candidate, expected, cost)
                        <= short_row_error(&fallback, expected, cost)
                    {
                        candidate
                    } else {
                        fallback
                    }
                }
                None => fallback,
            }
        }
    }
}

/// Zeroes the entry with the smallest error increase unless a zero exists.
///
/// Returns the index that was cleared.
pub fn enforce_zero(rows: &mut [usize], expected: &[f64], cost: &ShortRowCost) -> Option<usize> {
    if rows.is_empty() || rows.contains(&0) {
        return None;
    }
    let base = short_row_error(rows, expected, cost);
    let mut best: Option<(usize, f64)> = None;
    for i in 0..rows.len() {
        let kept = rows[i];
        rows[i] = 0;
        let increase = short_row_error(rows, expected, cost) - base;
        rows[i] = kept;
        if best.is_none_or(|(_, b)| increase < b) {
            best = Some((i, increase));
        }
    }
    let (index, _) = best?;
    rows[index] = 0;
    Some(index)
}

/// Short rows of one course pair, indexed by source sample.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortRowSolution {
    /// Course parameter of each source sample.
    pub alphas: Vec<f64>,
    pub expected: Vec<f64>,
    pub rows: Vec<usize>,
    pub error: f64,
    pub circular: bool,
    /// Target phase chosen by the sub-sample search.
    pub phase: f64,
    /// Sample forced to zero short rows.
    pub zeroed: Option<usize>,
}

impl ShortRowSolution {
    /// Short rows of the sample closest to `alpha`.
    #[must_use]
    pub fn rows_at(&self, alpha: f64) -> usize {
        let distance = |a: f64| {
            let d = (a - alpha).abs();
            if self.circular { d.min(1.0 - d) } else { d }
        };
        self.alphas
            .iter()
            .zip(&self.rows)
            .min_by(|(a, _), (b, _)| distance(**a).total_cmp(&distance(**b)))
            .map_or(0, |(_, &r)| r)
    }

    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.rows.iter().sum()
    }
}

struct PairSampling<'a> {
    oracles: Oracles<'a>,
    source: Vec<CoursePoint>,
    target: Vec<CoursePoint>,
    cache: RefCell<Vec<Option<f64>>>,
}

impl PairSampling<'_> {
    fn distance(&self, s: usize, t: usize) -> f64 {
        let n = self.target.len();
        if let Some(d) = self.cache.borrow()[s * n + t] {
            return d;
        }
        let (a, b) = (self.source[s], self.target[t]);
        let d = self
            .oracles
            .distance
            .query_between(a.layer, a.position, b.layer, b.position, false)
            .map_or(UNREACHABLE, |path| path.dist());
        self.cache.borrow_mut()[s * n + t] = Some(d);
        d
    }

    fn align(&self, circular: bool) -> Result<AlignResult, SamplingError> {
        let options = AlignOptions::new().circular(circular).minimal(true);
        align(
            self.source.len(),
            self.target.len(),
            |s, t, _, _| self.distance(s, t).powi(2),
            &options,
        )
        .ok_or(SamplingError::NoSolution { stage: "short rows" })
    }

    /// Mean matched distance per source sample.
    fn matched_distances(&self, alignment: &AlignResult) -> Vec<f64> {
        let mut sums = vec![0.0; self.source.len()];
        let mut counts = vec![0usize; self.source.len()];
        for &(s, t) in &alignment.path {
            sums[s] += self.distance(s, t);
            counts[s] += 1;
        }
        sums.iter()
            .zip(&counts)
            .map(|(s, &c)| if c == 0 { 0.0 } else { s / c as f64 })
            .collect()
    }
}

/// One sub-sample phase candidate.
struct PhaseTrial<'a> {
    metric: f64,
    distances: Vec<f64>,
    alignment: AlignResult,
    pair: PairSampling<'a>,
}

impl<'a> PhaseTrial<'a> {
    fn evaluate(
        pair: PairSampling<'a>,
        circular: bool,
        kind: SubSampleMetric,
    ) -> Result<Self, SamplingError> {
        let alignment = pair.align(circular)?;
        let distances = pair.matched_distances(&alignment);
        Ok(Self {
            metric: metric(&distances, kind),
            distances,
            alignment,
            pair,
        })
    }
}

fn curvature_at(mesh: &TimeMesh, point: &CoursePoint) -> Result<f64, SamplingError> {
    let Vec2 { x, y } = point.position;
    let missing = SamplingError::MissingNeighborhood {
        layer: point.layer,
        x,
        y,
    };
    if point.layer >= mesh.layers.len() {
        return Err(missing);
    }
    mesh.layer(point.layer)
        .neighborhood(point.position)
        .map(|nh| nh.interpolate_with(|s| s.curvature))
        .ok_or(missing)
}

fn metric(distances: &[f64], metric: SubSampleMetric) -> f64 {
    match metric {
        SubSampleMetric::Total => distances.iter().sum(),
        SubSampleMetric::Min => distances.iter().copied().fold(f64::INFINITY, f64::min),
    }
}

/// Solves the short rows between `source` and the next course `target`.
pub fn solve_short_rows(
    mesh: &TimeMesh,
    oracles: Oracles<'_>,
    params: &SamplingParams,
    source: &CoursePath,
    target: &CoursePath,
) -> Result<ShortRowSolution, SamplingError> {
    let circular = source.is_circular() || target.is_circular();
    let n = ((source.length().max(target.length()) / params.course_dist).ceil() as usize).max(2);
    let alphas: Vec<f64> = (0..n)
        .map(|i| stitch_alpha(i, n))
        .collect();
    let target_at = |phase: f64| -> Vec<CoursePoint> {
        (0..n)
            .map(|i| target.sample_at(stitch_alpha(i, n) + phase))
            .collect()
    };
    let sampling = |phase: f64| PairSampling {
        oracles,
        source: source.sample_uniform(n),
        target: target_at(phase),
        cache: RefCell::new(vec![None; n * n]),
    };

    let mut pair = sampling(0.0);
    let mut alignment = pair.align(circular)?;
    let mut distances = pair.matched_distances(&alignment);
    let mut phase = 0.0;

    let source_curvature = pair
        .source
        .iter()
        .map(|p| curvature_at(mesh, p))
        .collect::<Result<Vec<_>, _>>()?;
    let curvatures = |pair: &PairSampling<'_>, alignment: &AlignResult| -> Result<Vec<f64>, SamplingError> {
        let mut sums = vec![0.0; n];
        let mut counts = vec![0usize; n];
        for &(s, t) in &alignment.path {
            sums[s] += 0.5 * (source_curvature[s] + curvature_at(mesh, &pair.target[t])?);
            counts[s] += 1;
        }
        Ok(sums
            .iter()
            .zip(&counts)
            .zip(&source_curvature)
            .map(|((s, &c), &k)| if c == 0 { k } else { s / c as f64 })
            .collect())
    };

    let short = &params.short_rows;
    if short.sub_sample {
        let expected = expected_short_rows(
            &smooth_distances(&distances, circular),
            &curvatures(&pair, &alignment)?,
            params.wale_dist,
        );
        let average = expected.iter().sum::<f64>() / expected.len() as f64;
        if average >= short.ss_threshold {
            let half = 0.5 / n as f64;
            let (mut lo, mut hi) = (-half, half);
            let mut best = metric(&distances, short.ss_metric);
            for _ in 0..short.ss_depth {
                let mid = 0.5 * (lo + hi);
                let (left_phase, right_phase) = (0.5 * (lo + mid), 0.5 * (mid + hi));
                let left = PhaseTrial::evaluate(sampling(left_phase), circular, short.ss_metric)?;
                let right = PhaseTrial::evaluate(sampling(right_phase), circular, short.ss_metric)?;
                let (chosen, p) = if left.metric <= right.metric {
                    hi = mid;
                    (left, left_phase)
                } else {
                    lo = mid;
                    (right, right_phase)
                };
                if chosen.metric < best {
                    best = chosen.metric;
                    phase = p;
                    distances = chosen.distances;
                    pair = chosen.pair;
                    alignment = chosen.alignment;
                }
            }
            debug!("short-row phase {phase} (metric {best})");
        }
    }

    let expected = expected_short_rows(
        &smooth_distances(&distances, circular),
        &curvatures(&pair, &alignment)?,
        params.wale_dist,
    );
    let cost = ShortRowCost::from_params(params, circular);
    let mut rows = round_short_rows(&expected, short.mode, &cost, oracles.relaxation);
    let zeroed = enforce_zero(&mut rows, &expected, &cost);
    let error = short_row_error(&rows, &expected, &cost);
    Ok(ShortRowSolution {
        alphas,
        expected,
        rows,
        error,
        circular,
        phase,
        zeroed,
    })
}
