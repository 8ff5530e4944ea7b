//! Packed record layout of one stitch.
//!
//! | field | type | meaning |
//! |---|---|---|
//! | `sx`, `sy` | f32 | position on the sketch layer |
//! | `sa` | f32 | course parameter |
//! | `li` | u16 | layer index |
//! | `ym` | u16 | yarn mask |
//! | `gd` | u32 | `(group << 1) \| short_row` |
//! | `pc`, `nc` | u32 | previous / next course stitch |
//! | `pw0`, `pw1`, `nw0`, `nw1` | u32 | previous / next wale stitches |
//!
//! Pointers hold `index + 1`; zero is the null pointer.

use crate::ds::{FieldId, FieldType, PackedLayout};

/// Encodes an optional stitch index as a packed pointer.
#[must_use]
pub const fn encode_pointer(index: Option<usize>) -> u32 {
    match index {
        Some(i) => i as u32 + 1,
        None => 0,
    }
}

/// Decodes a packed pointer.
#[must_use]
pub const fn decode_pointer(pointer: u32) -> Option<usize> {
    match pointer {
        0 => None,
        p => Some(p as usize - 1),
    }
}

#[must_use]
pub const fn encode_group(group: usize, short_row: bool) -> u32 {
    ((group as u32) << 1) | short_row as u32
}

/// `(group, short_row)` of a packed `gd` value.
#[must_use]
pub const fn decode_group(gd: u32) -> (usize, bool) {
    ((gd >> 1) as usize, gd & 1 == 1)
}

/// Column handles of the stitch layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StitchFields {
    pub sx: FieldId,
    pub sy: FieldId,
    pub sa: FieldId,
    pub li: FieldId,
    pub ym: FieldId,
    pub gd: FieldId,
    pub pc: FieldId,
    pub nc: FieldId,
    pub pw: [FieldId; 2],
    pub nw: [FieldId; 2],
}

impl StitchFields {
    // column order of `stitch_layout`
    const fn new() -> Self {
        Self {
            sx: FieldId(0),
            sy: FieldId(1),
            sa: FieldId(2),
            li: FieldId(3),
            ym: FieldId(4),
            gd: FieldId(5),
            pc: FieldId(6),
            nc: FieldId(7),
            pw: [FieldId(8), FieldId(9)],
            nw: [FieldId(10), FieldId(11)],
        }
    }
}

pub const STITCH_FIELDS: StitchFields = StitchFields::new();

#[must_use]
pub fn stitch_layout() -> PackedLayout {
    PackedLayout::new(&[
        ("sx", FieldType::F32),
        ("sy", FieldType::F32),
        ("sa", FieldType::F32),
        ("li", FieldType::U16),
        ("ym", FieldType::U16),
        ("gd", FieldType::U32),
        ("pc", FieldType::U32),
        ("nc", FieldType::U32),
        ("pw0", FieldType::U32),
        ("pw1", FieldType::U32),
        ("nw0", FieldType::U32),
        ("nw1", FieldType::U32),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_handles_match_the_layout() {
        let layout = stitch_layout();
        assert_eq!(layout.stride(), 3 * 4 + 2 * 2 + 7 * 4);
        assert_eq!(layout.field("gd"), Some(STITCH_FIELDS.gd));
        assert_eq!(layout.field("nw1"), Some(STITCH_FIELDS.nw[1]));
        assert_eq!(layout.field("pw0"), Some(STITCH_FIELDS.pw[0]));
    }

    #[test]
    fn pointers_and_groups_round_trip() {
        assert_eq!(encode_pointer(None), 0);
        assert_eq!(decode_pointer(encode_pointer(Some(0))), Some(0));
        assert_eq!(decode_pointer(0), None);
        assert_eq!(encode_group(3, true), 7);
        assert_eq!(decode_group(7), (3, true));
        assert_eq!(decode_group(6), (3, false));
    }
}
