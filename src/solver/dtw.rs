//! Dynamic time warping kernels.
//!
//! - [`find_alignment`]: unconstrained DTW over an `M × N` cost grid.
//! - [`find_constrained_alignment`]: DTW that bounds how many consecutive
//!   cells may reuse the same source or target.
//! - [`align`]: state-space alignment of (possibly circular) sequences using
//!   1-1, 1-2 and 2-1 links, solved best-first.
//!
//! # Example
//!
//! ```ignore
//! let result = align(4, 8, |s, t, _, _| (s as f64 / 3.0 - t as f64 / 7.0).abs(),
//!     &AlignOptions::default().minimal(true)).unwrap();
//! assert_eq!(result.count(Linking::OneTwo), 4);
//! ```

use std::collections::HashMap;

use crate::ds::PairingQueue;

/// Priority bonus per irregular link used to break ties in minimal mode.
const IRREGULAR_EPS: f64 = 1e-9;

/// Monotone warping path with its accumulated cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    /// Cells from `(0, 0)` to `(M − 1, N − 1)`.
    pub path: Vec<(usize, usize)>,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Move {
    Start,
    Left,
    Up,
    Diagonal,
}

fn traceback(moves: &[Move], m: usize, n: usize) -> Vec<(usize, usize)> {
    let mut path = Vec::with_capacity(m + n);
    let (mut i, mut j) = (m - 1, n - 1);
    loop {
        path.push((i, j));
        match moves[i * n + j] {
            Move::Start => break,
            Move::Left => j -= 1,
            Move::Up => i -= 1,
            Move::Diagonal => {
                i -= 1;
                j -= 1;
            }
        }
    }
    path.reverse();
    path
}

/// Unconstrained DTW: `cost[i,j] = d(i,j) + min(left, up, diagonal)`.
///
/// Returns `None` for empty sequences.
pub fn find_alignment(m: usize, n: usize, penalty: impl Fn(usize, usize) -> f64) -> Option<Alignment> {
    if m == 0 || n == 0 {
        return None;
    }
    let mut cost = vec![0.0; m * n];
    let mut moves = vec![Move::Start; m * n];
    cost[0] = penalty(0, 0);
    for j in 1..n {
        cost[j] = cost[j - 1] + penalty(0, j);
        moves[j] = Move::Left;
    }
    for i in 1..m {
        cost[i * n] = cost[(i - 1) * n] + penalty(i, 0);
        moves[i * n] = Move::Up;
    }
    for i in 1..m {
        for j in 1..n {
            let candidates = [
                (cost[(i - 1) * n + j - 1], Move::Diagonal),
                (cost[i * n + j - 1], Move::Left),
                (cost[(i - 1) * n + j], Move::Up),
            ];
            let (best, mv) = candidates
                .into_iter()
                .fold((f64::INFINITY, Move::Diagonal), |acc, c| if c.0 < acc.0 { c } else { acc });
            cost[i * n + j] = best + penalty(i, j);
            moves[i * n + j] = mv;
        }
    }
    Some(Alignment {
        path: traceback(&moves, m, n),
        cost: cost[m * n - 1],
    })
}

/// DTW where a source may be matched to at most `max_source_use` consecutive
/// targets and a target to at most `max_target_use` consecutive sources.
///
/// The limits do not apply on the first and last row/column. A reused counter
/// becomes previous + 1, a fresh one restarts at 1.
pub fn find_constrained_alignment(
    m: usize,
    n: usize,
    max_source_use: usize,
    max_target_use: usize,
    penalty: impl Fn(usize, usize) -> f64,
) -> Option<Alignment> {
    if m == 0 || n == 0 {
        return None;
    }
    let mut cost = vec![f64::INFINITY; m * n];
    let mut moves = vec![Move::Start; m * n];
    // (source usage, target usage) of the best path into each cell
    let mut usage = vec![(1usize, 1usize); m * n];

    cost[0] = penalty(0, 0);
    for j in 1..n {
        cost[j] = cost[j - 1] + penalty(0, j);
        moves[j] = Move::Left;
        usage[j] = (usage[j - 1].0 + 1, 1);
    }
    for i in 1..m {
        cost[i * n] = cost[(i - 1) * n] + penalty(i, 0);
        moves[i * n] = Move::Up;
        usage[i * n] = (1, usage[(i - 1) * n].1 + 1);
    }
    for i in 1..m {
        for j in 1..n {
            let mut best = (f64::INFINITY, Move::Diagonal, (1, 1));
            let diag = cost[(i - 1) * n + j - 1];
            if diag < best.0 {
                best = (diag, Move::Diagonal, (1, 1));
            }
            let left = i * n + j - 1;
            if (usage[left].0 < max_source_use || i == m - 1) && cost[left] < best.0 {
                best = (cost[left], Move::Left, (usage[left].0 + 1, 1));
            }
            let up = (i - 1) * n + j;
            if (usage[up].1 < max_target_use || j == n - 1) && cost[up] < best.0 {
                best = (cost[up], Move::Up, (1, usage[up].1 + 1));
            }
            if best.0.is_finite() {
                cost[i * n + j] = best.0 + penalty(i, j);
                moves[i * n + j] = best.1;
                usage[i * n + j] = best.2;
            }
        }
    }
    let total = cost[m * n - 1];
    total.is_finite().then(|| Alignment {
        path: traceback(&moves, m, n),
        cost: total,
    })
}

/// Link type of the state-space alignment: `(sources, targets)` consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Linking {
    OneOne,
    /// One source to two targets (increase).
    OneTwo,
    /// Two sources to one target (decrease).
    TwoOne,
}

impl Linking {
    #[must_use]
    pub const fn deltas(self) -> (usize, usize) {
        match self {
            Self::OneOne => (1, 1),
            Self::OneTwo => (1, 2),
            Self::TwoOne => (2, 1),
        }
    }

    #[must_use]
    pub const fn is_irregular(self) -> bool {
        !matches!(self, Self::OneOne)
    }
}

/// One link of an alignment, anchored at its first source and target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignStep {
    pub linking: Linking,
    pub source: usize,
    pub target: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignOptions {
    /// Both sequences are rings.
    pub circular: bool,
    /// Prefer fewer irregular links among equal-cost alignments.
    pub minimal: bool,
    pub can_link_12: bool,
    pub can_link_21: bool,
    /// Sources that must not be split over two targets.
    pub regular_sources: Option<Vec<bool>>,
    /// Targets that must not merge two sources.
    pub regular_targets: Option<Vec<bool>>,
}

impl Default for AlignOptions {
    /// Flat alignment allowing both shaping links.
    fn default() -> Self {
        Self {
            circular: false,
            minimal: false,
            can_link_12: true,
            can_link_21: true,
            regular_sources: None,
            regular_targets: None,
        }
    }
}

impl AlignOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn circular(mut self, circular: bool) -> Self {
        self.circular = circular;
        self
    }

    #[must_use]
    pub fn minimal(mut self, minimal: bool) -> Self {
        self.minimal = minimal;
        self
    }

    #[must_use]
    pub fn shaping(mut self, can_link_12: bool, can_link_21: bool) -> Self {
        self.can_link_12 = can_link_12;
        self.can_link_21 = can_link_21;
        self
    }

    #[must_use]
    pub fn regular_sources(mut self, regular: Vec<bool>) -> Self {
        self.regular_sources = Some(regular);
        self
    }

    #[must_use]
    pub fn regular_targets(mut self, regular: Vec<bool>) -> Self {
        self.regular_targets = Some(regular);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignResult {
    /// Matched `(source, target)` pairs in traversal order.
    pub path: Vec<(usize, usize)>,
    pub steps: Vec<AlignStep>,
    pub cost: f64,
}

impl AlignResult {
    #[must_use]
    pub fn count(&self, linking: Linking) -> usize {
        self.steps.iter().filter(|s| s.linking == linking).count()
    }
}

#[derive(Debug, Clone, Copy)]
struct SearchNode {
    source: usize,
    target: usize,
    rem_source: usize,
    rem_target: usize,
    cost: f64,
    priority: f64,
    parent: Option<usize>,
    step: Option<AlignStep>,
}

/// Best-first alignment of `num_sources` against `num_targets` elements.
///
/// `penalty(s, t, source_irregular, target_irregular)` prices one matched
/// pair; it must be non-negative. Returns `None` when no sequence of allowed
/// links consumes both sides.
pub fn align(
    num_sources: usize,
    num_targets: usize,
    penalty: impl Fn(usize, usize, bool, bool) -> f64,
    options: &AlignOptions,
) -> Option<AlignResult> {
    if num_sources == 0 || num_targets == 0 {
        return (num_sources == num_targets).then(|| AlignResult {
            path: Vec::new(),
            steps: Vec::new(),
            cost: 0.0,
        });
    }
    let (ns, nt) = (num_sources, num_targets);
    let feasible = |rs: usize, rt: usize| !(rs * 2 < rt || rt * 2 < rs);
    if !feasible(ns, nt) {
        return None;
    }
    let regular = |flags: &Option<Vec<bool>>, index: usize| {
        flags
            .as_ref()
            .and_then(|f| f.get(index).copied())
            .unwrap_or(false)
    };

    let mut nodes: Vec<SearchNode> = Vec::new();
    let mut queue = PairingQueue::new();
    let mut best: HashMap<(usize, usize, usize, usize), f64> = HashMap::new();
    let offsets = if options.circular { nt } else { 1 };
    for offset in 0..offsets {
        let node = SearchNode {
            source: 0,
            target: offset,
            rem_source: ns,
            rem_target: nt,
            cost: 0.0,
            priority: 0.0,
            parent: None,
            step: None,
        };
        best.insert((0, offset, ns, nt), 0.0);
        nodes.push(node);
        queue.insert(nodes.len() - 1, 0.0);
    }

    while let Some((index, priority)) = queue.pop_with_priority() {
        let node = nodes[index];
        let key = (node.source % ns, node.target % nt, node.rem_source, node.rem_target);
        if best.get(&key).is_some_and(|&b| priority > b) {
            continue;
        }
        if node.rem_source == 0 && node.rem_target == 0 {
            return Some(unroll(&nodes, index, ns, nt));
        }

        for linking in [Linking::OneOne, Linking::OneTwo, Linking::TwoOne] {
            let (ds, dt) = linking.deltas();
            if ds > node.rem_source || dt > node.rem_target {
                continue;
            }
            let (rs, rt) = (node.rem_source - ds, node.rem_target - dt);
            if !feasible(rs, rt) {
                continue;
            }
            let (s, t) = (node.source % ns, node.target % nt);
            let cost = match linking {
                Linking::OneOne => penalty(s, t, false, false),
                Linking::OneTwo => {
                    if !options.can_link_12 || regular(&options.regular_sources, s) {
                        continue;
                    }
                    penalty(s, t, true, false) + penalty(s, (t + 1) % nt, true, false)
                }
                Linking::TwoOne => {
                    if !options.can_link_21 || regular(&options.regular_targets, t) {
                        continue;
                    }
                    penalty(s, t, false, true) + penalty((s + 1) % ns, t, false, true)
                }
            };
            let bonus = if options.minimal && linking.is_irregular() {
                IRREGULAR_EPS
            } else {
                0.0
            };
            let next_cost = node.cost + cost;
            let next_priority = node.priority + cost + bonus;
            let next_key = ((s + ds) % ns, (t + dt) % nt, rs, rt);
            if best.get(&next_key).is_some_and(|&b| b <= next_priority) {
                continue;
            }
            best.insert(next_key, next_priority);
            nodes.push(SearchNode {
                source: node.source + ds,
                target: node.target + dt,
                rem_source: rs,
                rem_target: rt,
                cost: next_cost,
                priority: next_priority,
                parent: Some(index),
                step: Some(AlignStep {
                    linking,
                    source: s,
                    target: t,
                }),
            });
            queue.insert(nodes.len() - 1, next_priority);
        }
    }
    None
}

fn unroll(nodes: &[SearchNode], last: usize, ns: usize, nt: usize) -> AlignResult {
    let mut steps = Vec::new();
    let mut cursor = Some(last);
    while let Some(index) = cursor {
        if let Some(step) = nodes[index].step {
            steps.push(step);
        }
        cursor = nodes[index].parent;
    }
    steps.reverse();

    let mut path = Vec::with_capacity(steps.len() * 2);
    for step in &steps {
        let (s, t) = (step.source, step.target);
        match step.linking {
            Linking::OneOne => path.push((s, t)),
            Linking::OneTwo => {
                path.push((s, t));
                path.push((s, (t + 1) % nt));
            }
            Linking::TwoOne => {
                path.push((s, t));
                path.push(((s + 1) % ns, t));
            }
        }
    }
    AlignResult {
        path,
        steps,
        cost: nodes[last].cost,
    }
}
