//! Low-level containers shared by the solvers and the stitch graph.

mod packed_array;
mod pairing_queue;

pub use packed_array::{
    FieldId, FieldType, FieldValue, PackedArray, PackedArrayError, PackedLayout, PackedScalar,
};
pub use pairing_queue::PairingQueue;
