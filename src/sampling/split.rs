//! Short-row placement helpers.

use crate::params::ShortRowAlignment;

/// Rows of a coarse pair with `rows` short rows that land on fine
/// transition `transition` out of `transitions`.
#[must_use]
pub const fn transition_rows(rows: usize, transition: usize, transitions: usize) -> usize {
    rows * (transition + 1) / transitions - rows * transition / transitions
}

/// First level of each column given the per-column row counts.
#[must_use]
pub fn level_offsets(counts: &[usize], alignment: ShortRowAlignment) -> Vec<usize> {
    let max = counts.iter().copied().max().unwrap_or(0);
    counts
        .iter()
        .map(|&m| match alignment {
            ShortRowAlignment::Bottom => 0,
            ShortRowAlignment::Top => max - m,
            ShortRowAlignment::Middle => (max - m) / 2,
        })
        .collect()
}

/// Maximal runs of occupied columns, in course order.
///
/// On circular rows a run may wrap past the last column; a fully occupied
/// ring yields one run starting at column 0.
#[must_use]
pub fn level_runs(occupied: &[bool], circular: bool) -> Vec<Vec<usize>> {
    let n = occupied.len();
    let start = if circular {
        match occupied.iter().position(|&o| !o) {
            Some(free) => (free + 1) % n,
            None => return if n == 0 { Vec::new() } else { vec![(0..n).collect()] },
        }
    } else {
        0
    };
    let mut runs = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    for k in 0..n {
        let q = (start + k) % n;
        if occupied[q] {
            current.push(q);
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_spread_over_transitions() {
        let per = |rows| (0..3).map(|t| transition_rows(rows, t, 3)).collect::<Vec<_>>();
        assert_eq!(per(0), vec![0, 0, 0]);
        assert_eq!(per(1), vec![0, 0, 1]);
        assert_eq!(per(2), vec![0, 1, 1]);
        assert_eq!(per(4), vec![1, 1, 2]);
        assert_eq!(per(4).iter().sum::<usize>(), 4);
    }

    #[test]
    fn offsets_follow_alignment() {
        let counts = [1, 3, 0, 2];
        assert_eq!(level_offsets(&counts, ShortRowAlignment::Bottom), vec![0, 0, 0, 0]);
        assert_eq!(level_offsets(&counts, ShortRowAlignment::Top), vec![2, 0, 3, 1]);
        assert_eq!(level_offsets(&counts, ShortRowAlignment::Middle), vec![1, 0, 1, 0]);
    }

    #[test]
    fn flat_runs_stop_at_the_ends() {
        let occupied = [true, true, false, true, false, true];
        assert_eq!(level_runs(&occupied, false), vec![vec![0, 1], vec![3], vec![5]]);
    }

    #[test]
    fn circular_runs_wrap() {
        let occupied = [true, true, false, true, false, true];
        assert_eq!(level_runs(&occupied, true), vec![vec![3], vec![5, 0, 1]]);
        assert_eq!(level_runs(&[true; 3], true), vec![vec![0, 1, 2]]);
        assert!(level_runs(&[false; 3], true).is_empty());
    }
}
