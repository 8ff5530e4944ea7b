//! Region subdivision: split times and isoline search.

mod subdivider;

pub use subdivider::{
    SPLIT_MARGIN, SubdivisionOptions, SubdivisionReport, find_isoline, split_times,
    splitting_isolines, subdivide_regions,
};
