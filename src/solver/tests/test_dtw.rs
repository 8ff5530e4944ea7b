use proptest::prelude::*;

use crate::solver::{AlignOptions, Linking, align, find_alignment, find_constrained_alignment};

fn is_monotone(path: &[(usize, usize)], m: usize, n: usize) -> bool {
    path.first() == Some(&(0, 0))
        && path.last() == Some(&(m - 1, n - 1))
        && path.windows(2).all(|w| {
            let (di, dj) = (w[1].0 - w[0].0, w[1].1 - w[0].1);
            matches!((di, dj), (0, 1) | (1, 0) | (1, 1))
        })
}

#[test]
fn circular_ring_without_shaping_aligns_one_to_one() {
    let options = AlignOptions::new().circular(true).minimal(true);
    let result = align(10, 10, |s, t, _, _| (s as f64 - t as f64).abs(), &options).unwrap();
    assert_eq!(result.cost, 0.0);
    assert_eq!(result.path.len(), 10);
    assert_eq!(result.count(Linking::OneOne), 10);
    assert!(result.path.iter().all(|&(s, t)| s == t));
}

#[test]
fn doubling_uses_only_increases() {
    let options = AlignOptions::new().minimal(true);
    let penalty = |s: usize, t: usize, _: bool, _: bool| (s as f64 / 3.0 - t as f64 / 7.0).abs();
    let result = align(4, 8, penalty, &options).unwrap();
    assert_eq!(result.count(Linking::OneTwo), 4);
    assert_eq!(result.count(Linking::OneOne), 0);
    assert_eq!(result.count(Linking::TwoOne), 0);
    assert_eq!(result.path.len(), 8);
}

#[test]
fn shaping_gates_make_alignment_infeasible() {
    let penalty = |_: usize, _: usize, _: bool, _: bool| 1.0;
    let options = AlignOptions::new().shaping(false, true);
    assert!(align(4, 8, penalty, &options).is_none());
    assert!(align(3, 7, penalty, &AlignOptions::new()).is_none());

    let regular = AlignOptions::new().regular_sources(vec![true, false, false, false]);
    let result = align(4, 8, penalty, &regular);
    assert!(result.is_none(), "source 0 cannot split, so 8 targets are out of reach");
}

#[test]
fn decreases_merge_sources() {
    let penalty = |s: usize, t: usize, _: bool, _: bool| (s as f64 / 5.0 - t as f64 / 3.0).abs();
    let result = align(6, 4, penalty, &AlignOptions::new().minimal(true)).unwrap();
    assert_eq!(result.count(Linking::TwoOne), 2);
    assert_eq!(result.count(Linking::OneOne), 2);
    let sources: Vec<usize> = result.path.iter().map(|p| p.0).collect();
    assert_eq!(sources, (0..6).collect::<Vec<_>>());
}

#[test]
fn unconstrained_alignment_follows_the_cheap_diagonal() {
    let result = find_alignment(3, 3, |i, j| (i as f64 - j as f64).abs()).unwrap();
    assert_eq!(result.path, vec![(0, 0), (1, 1), (2, 2)]);
    assert_eq!(result.cost, 0.0);
    assert!(find_alignment(0, 3, |_, _| 0.0).is_none());
}

#[test]
fn constrained_alignment_limits_interior_reuse() {
    let (m, n, max_use) = (4, 8, 2);
    let result =
        find_constrained_alignment(m, n, max_use, max_use, |i, j| (i as f64 / 3.0 - j as f64 / 7.0).abs())
            .unwrap();
    assert!(is_monotone(&result.path, m, n));
    for source in 1..m - 1 {
        let uses = result.path.iter().filter(|p| p.0 == source).count();
        assert!(uses <= max_use, "source {source} used {uses} times");
    }
}

proptest! {
    #[test]
    fn unconstrained_paths_are_monotone(
        m in 1usize..10,
        n in 1usize..10,
        costs in prop::collection::vec(0.0f64..10.0, 100),
    ) {
        let result = find_alignment(m, n, |i, j| costs[(i * 10 + j) % costs.len()]).unwrap();
        prop_assert!(is_monotone(&result.path, m, n));
        let total: f64 = result.path.iter().map(|&(i, j)| costs[(i * 10 + j) % costs.len()]).sum();
        prop_assert!((total - result.cost).abs() < 1e-9);
    }
}
