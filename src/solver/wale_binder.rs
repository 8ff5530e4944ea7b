//! Wale bindings across interfaces.
//!
//! An interface with `N` input and `M` output courses carries the same
//! number of stitches `T` on both sides. The binder decides which input
//! stitch continues into which output stitch:
//!
//! - 1↔1 uses the shaping-aware alignment of [`super::dtw::align`];
//! - 1↔M concatenates the outputs in some order, each circular output rotated
//!   by a split offset, and matches the result against the input shifted
//!   cyclically. Orders, splits and shifts are searched exhaustively with
//!   pruning on the partial error;
//! - N↔1 is solved as the transposed 1↔N problem;
//! - N↔M with both sides above one is not supported.

use log::debug;

use crate::error::SamplingError;
use crate::params::{BindingLayout, SamplingParams};

use super::dtw::{AlignOptions, align};

/// Shape of one course taking part in a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CourseShape {
    pub count: usize,
    pub circular: bool,
}

impl CourseShape {
    #[must_use]
    pub const fn new(count: usize, circular: bool) -> Self {
        Self { count, circular }
    }
}

/// Stitch `stitch` of course `course` on one side of the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StitchSlot {
    pub course: usize,
    pub stitch: usize,
}

impl StitchSlot {
    #[must_use]
    pub const fn new(course: usize, stitch: usize) -> Self {
        Self { course, stitch }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindingOptions {
    /// Splits kept per course (`None` keeps all).
    pub k_best: Option<usize>,
    pub layout: BindingLayout,
}

impl BindingOptions {
    #[must_use]
    pub fn from_params(params: &SamplingParams) -> Self {
        Self {
            k_best: params.wales.k_best,
            layout: params.wales.layout,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    /// Order in which the multi-course side is concatenated.
    pub perm: Vec<usize>,
    /// Rotation of each course of the multi-course side, by course index.
    pub splits: Vec<usize>,
    /// Cyclic shift of the single-course side.
    pub shift: usize,
    /// `(source, target)` stitch pairs.
    pub pairs: Vec<(StitchSlot, StitchSlot)>,
    pub error: f64,
}

impl Binding {
    fn empty() -> Self {
        Self {
            perm: Vec::new(),
            splits: Vec::new(),
            shift: 0,
            pairs: Vec::new(),
            error: 0.0,
        }
    }

    fn transposed(mut self) -> Self {
        for pair in &mut self.pairs {
            *pair = (pair.1, pair.0);
        }
        self
    }
}

/// Binds the stitches of `sources` to those of `targets`.
///
/// `penalty(source, target, source_irregular, target_irregular)` prices one
/// wale.
pub fn bind_interface(
    sources: &[CourseShape],
    targets: &[CourseShape],
    penalty: impl Fn(StitchSlot, StitchSlot, bool, bool) -> f64,
    options: BindingOptions,
) -> Result<Binding, SamplingError> {
    if sources.is_empty() || targets.is_empty() {
        return Ok(Binding::empty());
    }
    match (sources.len(), targets.len()) {
        (1, 1) => bind_single(sources[0], targets[0], &penalty),
        (1, _) => bind_split(sources[0], targets, &penalty, options),
        (_, 1) => {
            let transposed = |t: StitchSlot, s: StitchSlot, ti: bool, si: bool| penalty(s, t, si, ti);
            bind_split(targets[0], sources, &transposed, options).map(Binding::transposed)
        }
        (inputs, outputs) => Err(SamplingError::UnsupportedBinding { inputs, outputs }),
    }
}

fn bind_single(
    source: CourseShape,
    target: CourseShape,
    penalty: &impl Fn(StitchSlot, StitchSlot, bool, bool) -> f64,
) -> Result<Binding, SamplingError> {
    let options = AlignOptions::new()
        .circular(source.circular && target.circular)
        .minimal(true);
    let result = align(
        source.count,
        target.count,
        |s, t, si, ti| penalty(StitchSlot::new(0, s), StitchSlot::new(0, t), si, ti),
        &options,
    )
    .ok_or(SamplingError::NoSolution {
        stage: "wale binding",
    })?;
    let shift = result.path.first().map_or(0, |&(_, t)| t);
    Ok(Binding {
        perm: vec![0],
        splits: vec![shift],
        shift: 0,
        pairs: result
            .path
            .iter()
            .map(|&(s, t)| (StitchSlot::new(0, s), StitchSlot::new(0, t)))
            .collect(),
        error: result.cost,
    })
}

/// Next permutation in lexicographic order; `false` after the last one.
fn next_permutation(perm: &mut [usize]) -> bool {
    let n = perm.len();
    if n < 2 {
        return false;
    }
    let Some(i) = (0..n - 1).rev().find(|&i| perm[i] < perm[i + 1]) else {
        return false;
    };
    let j = (i + 1..n).rev().find(|&j| perm[j] > perm[i]).unwrap_or(i + 1);
    perm.swap(i, j);
    perm[i + 1..].reverse();
    true
}

fn bind_split(
    source: CourseShape,
    targets: &[CourseShape],
    penalty: &impl Fn(StitchSlot, StitchSlot, bool, bool) -> f64,
    options: BindingOptions,
) -> Result<Binding, SamplingError> {
    let total = source.count;
    let target_total: usize = targets.iter().map(|t| t.count).sum();
    if total != target_total {
        return Err(SamplingError::Invariant(format!(
            "interface binds {total} stitches to {target_total}"
        )));
    }
    if total == 0 {
        return Ok(Binding::empty());
    }

    let trivial_flat =
        options.layout == BindingLayout::Trivial && targets.iter().all(|t| !t.circular);
    let shifts = if source.circular && !trivial_flat { total } else { 1 };

    // error of course `course` placed at `base`, rotated by `split`, with `shift`
    let course_error = |course: usize, base: usize, split: usize, shift: usize, cap: f64| {
        let count = targets[course].count;
        let mut sum = 0.0;
        for k in 0..count {
            let s = StitchSlot::new(0, (base + k + shift) % total);
            let t = StitchSlot::new(course, (split + k) % count);
            sum += penalty(s, t, false, false);
            if sum >= cap {
                return f64::INFINITY;
            }
        }
        sum
    };

    let mut best: Option<(Vec<usize>, Vec<usize>, usize)> = None;
    let mut best_error = f64::INFINITY;
    let mut perm: Vec<usize> = (0..targets.len()).collect();
    let mut evaluated = 0usize;
    loop {
        let mut bases = Vec::with_capacity(perm.len());
        let mut offset = 0;
        for &course in &perm {
            bases.push(offset);
            offset += targets[course].count;
        }

        let candidates: Vec<Vec<usize>> = perm
            .iter()
            .zip(&bases)
            .map(|(&course, &base)| {
                let shape = targets[course];
                if !shape.circular || shape.count == 0 {
                    return vec![0];
                }
                let mut splits: Vec<(usize, f64)> = (0..shape.count)
                    .map(|o| (o, course_error(course, base, o, 0, f64::INFINITY)))
                    .collect();
                if let Some(k) = options.k_best.filter(|&k| k < splits.len()) {
                    splits.sort_by(|a, b| a.1.total_cmp(&b.1));
                    splits.truncate(k);
                }
                splits.into_iter().map(|(o, _)| o).collect()
            })
            .collect();

        for shift in 0..shifts {
            let mut partial = 0.0;
            let mut chosen = vec![0usize; targets.len()];
            for ((&course, &base), splits) in perm.iter().zip(&bases).zip(&candidates) {
                let mut course_best = f64::INFINITY;
                for &split in splits {
                    evaluated += 1;
                    let error = course_error(course, base, split, shift, (best_error - partial).min(course_best));
                    if error < course_best {
                        course_best = error;
                        chosen[course] = split;
                    }
                }
                partial += course_best;
                if partial >= best_error {
                    break;
                }
            }
            if partial < best_error {
                best_error = partial;
                best = Some((perm.clone(), chosen, shift));
            }
        }

        if !next_permutation(&mut perm) {
            break;
        }
    }

    let (perm, splits, shift) = best.ok_or(SamplingError::NoSolution {
        stage: "wale binding",
    })?;
    debug!("1-{} binding: perm {perm:?}, shift {shift}, {evaluated} split evaluations", targets.len());

    let mut pairs = Vec::with_capacity(total);
    let mut base = 0;
    for &course in &perm {
        let count = targets[course].count;
        for k in 0..count {
            pairs.push((
                StitchSlot::new(0, (base + k + shift) % total),
                StitchSlot::new(course, (splits[course] + k) % count),
            ));
        }
        base += count;
    }
    Ok(Binding {
        perm,
        splits,
        shift,
        pairs,
        error: best_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permutations_are_lexicographic() {
        let mut perm = vec![0, 1, 2];
        let mut all = vec![perm.clone()];
        while next_permutation(&mut perm) {
            all.push(perm.clone());
        }
        assert_eq!(all.len(), 6);
        assert_eq!(all[1], vec![0, 2, 1]);
        assert_eq!(all[5], vec![2, 1, 0]);
        assert!(!next_permutation(&mut [4]));
    }
}
