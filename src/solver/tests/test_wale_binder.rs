use crate::error::SamplingError;
use crate::params::BindingLayout;
use crate::solver::{BindingOptions, CourseShape, StitchSlot, bind_interface};

fn flat(count: usize) -> CourseShape {
    CourseShape::new(count, false)
}

fn ring(count: usize) -> CourseShape {
    CourseShape::new(count, true)
}

#[test]
fn flat_split_keeps_natural_order() {
    // outputs sit side by side above the input
    let position = |slot: StitchSlot, output: bool| {
        let offset = if output { slot.course as f64 * 4.0 } else { 0.0 };
        offset + slot.stitch as f64 + 0.5
    };
    let binding = bind_interface(
        &[flat(8)],
        &[flat(4), flat(4)],
        |s, t, _, _| (position(s, false) - position(t, true)).abs(),
        BindingOptions::default(),
    )
    .unwrap();
    assert_eq!(binding.perm, vec![0, 1]);
    assert_eq!(binding.shift, 0);
    assert_eq!(binding.splits, vec![0, 0]);
    assert_eq!(binding.pairs.len(), 8);
    assert_eq!(binding.error, 0.0);
    assert!(binding
        .pairs
        .contains(&(StitchSlot::new(0, 5), StitchSlot::new(1, 1))));
}

#[test]
fn merge_is_solved_transposed() {
    let position = |slot: StitchSlot, merged: bool| {
        let offset = if merged { 0.0 } else { slot.course as f64 * 4.0 };
        offset + slot.stitch as f64
    };
    let binding = bind_interface(
        &[flat(4), flat(4)],
        &[flat(8)],
        |s, t, _, _| (position(s, false) - position(t, true)).abs(),
        BindingOptions::default(),
    )
    .unwrap();
    assert_eq!(binding.error, 0.0);
    assert_eq!(binding.pairs.len(), 8);
    assert!(binding
        .pairs
        .contains(&(StitchSlot::new(1, 0), StitchSlot::new(0, 4))));
}

#[test]
fn circular_outputs_find_their_splits() {
    // output 0 stitch k sits at (k + 1) % 4, output 1 stitch k at 4 + (k + 3) % 4
    let target_position = |slot: StitchSlot| match slot.course {
        0 => ((slot.stitch + 1) % 4) as f64,
        _ => 4.0 + ((slot.stitch + 3) % 4) as f64,
    };
    let penalty = |s: StitchSlot, t: StitchSlot, _: bool, _: bool| {
        (s.stitch as f64 - target_position(t)).abs()
    };
    for k_best in [None, Some(1)] {
        let options = BindingOptions {
            k_best,
            layout: BindingLayout::Optimal,
        };
        let binding = bind_interface(&[ring(8)], &[ring(4), ring(4)], penalty, options).unwrap();
        assert_eq!(binding.error, 0.0);
        assert_eq!(binding.perm, vec![0, 1]);
        assert_eq!(binding.splits, vec![3, 1]);
        assert_eq!(binding.shift, 0);
    }
}

#[test]
fn circular_source_is_shifted() {
    // outputs are flat but the ring starts two stitches later
    let penalty = |s: StitchSlot, t: StitchSlot, _: bool, _: bool| {
        let target = (t.course * 3 + t.stitch + 2) % 6;
        (s.stitch as f64 - target as f64).abs()
    };
    let binding =
        bind_interface(&[ring(6)], &[flat(3), flat(3)], penalty, BindingOptions::default()).unwrap();
    assert_eq!(binding.error, 0.0);
    assert_eq!(binding.shift, 2);

    let trivial = BindingOptions {
        k_best: None,
        layout: BindingLayout::Trivial,
    };
    let binding = bind_interface(&[ring(6)], &[flat(3), flat(3)], penalty, trivial).unwrap();
    assert_eq!(binding.shift, 0);
    assert!(binding.error > 0.0);
}

#[test]
fn single_courses_use_alignment() {
    let penalty = |s: StitchSlot, t: StitchSlot, _: bool, _: bool| {
        let target = (t.stitch + 2) % 6;
        let d = (s.stitch as f64 - target as f64).abs();
        d.min(6.0 - d)
    };
    let binding = bind_interface(&[ring(6)], &[ring(6)], penalty, BindingOptions::default()).unwrap();
    assert_eq!(binding.error, 0.0);
    assert_eq!(binding.pairs.len(), 6);
    for (s, t) in &binding.pairs {
        assert_eq!(s.stitch, (t.stitch + 2) % 6);
    }
}

#[test]
fn unsupported_and_inconsistent_bindings_fail() {
    let zero = |_: StitchSlot, _: StitchSlot, _: bool, _: bool| 0.0;
    let err = bind_interface(&[flat(2), flat(2)], &[flat(2), flat(2)], zero, BindingOptions::default());
    assert!(matches!(
        err,
        Err(SamplingError::UnsupportedBinding {
            inputs: 2,
            outputs: 2
        })
    ));
    let err = bind_interface(&[flat(5)], &[flat(2), flat(2)], zero, BindingOptions::default());
    assert!(matches!(err, Err(SamplingError::Invariant(_))));
    let empty = bind_interface(&[], &[flat(2)], zero, BindingOptions::default()).unwrap();
    assert!(empty.pairs.is_empty());
}
