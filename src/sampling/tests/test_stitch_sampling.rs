use crate::core::Vec2;
use crate::sampling::StitchSampling;
use crate::stitch::{StitchDecodeError, StitchPoint, StitchSet};

fn sampling() -> StitchSampling {
    let row = |y: f64| -> Vec<StitchPoint> {
        (0..3)
            .map(|i| StitchPoint::new(0, Vec2::new(f64::from(i) * 5.0, y), f64::from(i) / 3.0))
            .collect()
    };
    let mut set = StitchSet::new();
    set.push_course(&row(0.0), true, 0.0, 1).unwrap();
    set.push_course(&row(5.0), true, 5.0, 1).unwrap();
    for i in 0..3 {
        set.add_wale(i, i + 3).unwrap();
    }
    StitchSampling::new(set, 5.0, 4.5, vec![7, 9])
}

#[test]
fn bytes_restore_spacing_and_sketches() {
    let original = sampling();
    let restored = StitchSampling::from_bytes(&original.to_bytes()).unwrap();
    assert_eq!(restored.course_dist, 5.0);
    assert_eq!(restored.wale_dist, 4.5);
    assert_eq!(restored.sketch_refs, vec![7, 9]);
    let (a, b) = (&original.stitches, &restored.stitches);
    assert_eq!(a.len(), b.len());
    assert_eq!(a.courses(), b.courses());
    assert!(b.is_circular(1));
    for i in 0..a.len() {
        assert_eq!(a.next_wales(i), b.next_wales(i));
        assert_eq!(a.next_course(i), b.next_course(i));
    }
}

#[test]
fn damaged_buffers_are_rejected() {
    let bytes = sampling().to_bytes();
    assert_eq!(
        StitchSampling::from_bytes(b"KNSTxxxx").unwrap_err(),
        StitchDecodeError::BadHeader
    );
    let mut versioned = bytes.clone();
    versioned[4] = 9;
    assert_eq!(
        StitchSampling::from_bytes(&versioned).unwrap_err(),
        StitchDecodeError::Version(9)
    );
    assert_eq!(
        StitchSampling::from_bytes(&bytes[..30]).unwrap_err(),
        StitchDecodeError::Truncated(28)
    );
}
