//! Stitch graph: packed stitch records, course and short-row groups, and the
//! wale penalties used to connect consecutive courses.

mod layout;
mod penalty;
mod set;

#[cfg(test)]
mod tests;

pub use layout::{
    STITCH_FIELDS, StitchFields, decode_group, decode_pointer, encode_group, encode_pointer,
    stitch_layout,
};
pub use penalty::{Penalties, PenaltyCache, PenaltyCacheStats, PenaltyWeights, UNREACHABLE};
pub use set::{StitchDecodeError, StitchGroup, StitchPoint, StitchSet};
