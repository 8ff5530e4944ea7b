//! Fine-row layout of a subdivided wale cluster.
//!
//! A cluster joining `a` coarse sources to `b` coarse targets becomes `s`
//! fine transitions. Fine row `r` of the cluster holds `a·s + (b − a)·r`
//! stitches, so every transition carries at most one shaping link, placed at
//! the discontinuity column.

use rand::Rng;

use crate::error::SamplingError;
use crate::params::DiscontinuityPolicy;

/// Width of fine row `row` of an `a → b` cluster subdivided `subdiv` times.
#[must_use]
pub fn row_width(a: usize, b: usize, subdiv: usize, row: usize) -> usize {
    if b >= a {
        a * subdiv + (b - a) * row
    } else {
        a * subdiv - (a - b) * row
    }
}

/// Policy column of transition `transition` (of `subdiv`) among `0..=last`.
pub fn discontinuity_column<R: Rng + ?Sized>(
    policy: DiscontinuityPolicy,
    last: usize,
    transition: usize,
    subdiv: usize,
    rng: &mut R,
) -> usize {
    let diagonal = || {
        let steps = subdiv.saturating_sub(1).max(1) as f64;
        ((last as f64 * transition as f64 / steps).round() as usize).min(last)
    };
    match policy {
        DiscontinuityPolicy::RCol => last,
        DiscontinuityPolicy::LCol => 0,
        DiscontinuityPolicy::RDiag => diagonal(),
        DiscontinuityPolicy::LDiag => last - diagonal(),
        DiscontinuityPolicy::Rand => rng.random_range(0..=last),
    }
}

/// Highest admissible discontinuity column between rows of `from` and `to`
/// stitches; `None` when the rows need no shaping link.
#[must_use]
pub fn last_column(from: usize, to: usize) -> Option<usize> {
    if to == from + 1 {
        from.checked_sub(1)
    } else if from == to + 1 {
        from.checked_sub(2)
    } else {
        None
    }
}

/// Wales between consecutive fine rows, as local `(from, to)` columns.
///
/// Equal widths link column to column. An increase splits `column` into two
/// targets; a decrease merges `column` and `column + 1`.
pub fn row_links(from: usize, to: usize, column: usize) -> Result<Vec<(usize, usize)>, SamplingError> {
    if from == to {
        return Ok((0..from).map(|q| (q, q)).collect());
    }
    let Some(last) = last_column(from, to) else {
        return Err(SamplingError::Invariant(format!(
            "fine rows of {from} and {to} stitches differ by more than one"
        )));
    };
    if column > last {
        return Err(SamplingError::Invariant(format!(
            "discontinuity column {column} beyond {last}"
        )));
    }
    let links = if to > from {
        (0..from)
            .flat_map(|q| match q.cmp(&column) {
                std::cmp::Ordering::Less => vec![(q, q)],
                std::cmp::Ordering::Equal => vec![(q, q), (q, q + 1)],
                std::cmp::Ordering::Greater => vec![(q, q + 1)],
            })
            .collect()
    } else {
        (0..from)
            .map(|q| if q <= column { (q, q) } else { (q, q - 1) })
            .collect()
    };
    Ok(links)
}

/// Zero-height wales of an interface cluster: sub-columns map onto
/// sub-columns, spreading or gathering by two where the counts differ.
pub fn interface_links(from: usize, to: usize) -> Result<Vec<(usize, usize)>, SamplingError> {
    if from == to {
        Ok((0..from).map(|q| (q, q)).collect())
    } else if to == 2 * from {
        Ok((0..from).flat_map(|q| [(q, 2 * q), (q, 2 * q + 1)]).collect())
    } else if from == 2 * to {
        Ok((0..from).map(|q| (q, q / 2)).collect())
    } else {
        Err(SamplingError::Invariant(format!(
            "interface cluster of {from} and {to} sub-columns"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn widths_interpolate_between_cluster_ends() {
        assert_eq!((0..=3).map(|r| row_width(1, 2, 3, r)).collect::<Vec<_>>(), vec![3, 4, 5, 6]);
        assert_eq!((0..=3).map(|r| row_width(2, 1, 3, r)).collect::<Vec<_>>(), vec![6, 5, 4, 3]);
        assert_eq!(row_width(1, 1, 4, 2), 4);
    }

    #[test]
    fn cluster_stitch_totals() {
        // rows 0..s−1 belong to the cluster, row s is the next coarse course
        let total = |a, b, s| (0..s).map(|r| row_width(a, b, s, r)).sum::<usize>();
        assert_eq!(total(1, 1, 3), 9);
        assert_eq!(total(1, 2, 3), 9 + 3);
        assert_eq!(total(2, 1, 2), 8 - 1);
    }

    #[test]
    fn policies_pick_their_columns() {
        let mut rng = StdRng::seed_from_u64(7);
        let pick = |policy, t: usize, rng: &mut StdRng| discontinuity_column(policy, 4, t, 3, rng);
        assert_eq!(pick(DiscontinuityPolicy::RCol, 1, &mut rng), 4);
        assert_eq!(pick(DiscontinuityPolicy::LCol, 1, &mut rng), 0);
        assert_eq!(pick(DiscontinuityPolicy::RDiag, 0, &mut rng), 0);
        assert_eq!(pick(DiscontinuityPolicy::RDiag, 1, &mut rng), 2);
        assert_eq!(pick(DiscontinuityPolicy::RDiag, 2, &mut rng), 4);
        assert_eq!(pick(DiscontinuityPolicy::LDiag, 2, &mut rng), 0);
        for _ in 0..20 {
            assert!(pick(DiscontinuityPolicy::Rand, 1, &mut rng) <= 4);
        }
    }

    #[test]
    fn increase_splits_the_column() {
        let links = row_links(3, 4, 1).unwrap();
        assert_eq!(links, vec![(0, 0), (1, 1), (1, 2), (2, 3)]);
        assert_eq!(last_column(3, 4), Some(2));
    }

    #[test]
    fn decrease_merges_the_column() {
        let links = row_links(4, 3, 2).unwrap();
        assert_eq!(links, vec![(0, 0), (1, 1), (2, 2), (3, 2)]);
        assert_eq!(last_column(4, 3), Some(2));
        assert!(row_links(4, 3, 3).is_err());
        assert!(row_links(4, 6, 0).is_err());
    }

    #[test]
    fn interface_clusters_spread_by_two() {
        assert_eq!(interface_links(2, 4).unwrap(), vec![(0, 0), (0, 1), (1, 2), (1, 3)]);
        assert_eq!(interface_links(4, 2).unwrap(), vec![(0, 0), (1, 0), (2, 1), (3, 1)]);
        assert!(interface_links(3, 4).is_err());
    }
}
