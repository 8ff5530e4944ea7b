//! Sampling driver: turns a region-annotated time mesh into a knit stitch
//! graph.
//!
//! The driver runs six resumable stages (see [`SamplingStage`]):
//! - **global**: stitch counts of every region edge;
//! - **local**: isoline counts and short rows inside each simple region;
//! - **instantiate**: coarse courses, with wale bindings across interfaces;
//! - **distribute**: wales between consecutive coarse courses;
//! - **subdivide**: `subdiv × subdiv` fine stitches per coarse stitch;
//! - **split**: short rows materialized between fine courses.
//!
//! # Example
//!
//! ```ignore
//! let mut sampler = SamplingAlgorithm::new(&mesh, SamplingParams::default(), oracles)?;
//! while !sampler.iterate(Batch::default())? {}
//! let (sampling, diagnostics) = sampler.finish()?;
//! let bytes = sampling.to_bytes();
//! ```

mod algorithm;
mod courses;
mod diagnostics;
mod metrics;
mod split;
mod stage;
mod subdivide;

#[cfg(test)]
mod tests;

pub use algorithm::SamplingAlgorithm;
pub use courses::{Cluster, CoursePair, CoursePlan, CourseSlot, InterfaceSlot};
pub use diagnostics::SamplingDiagnostics;
pub use metrics::{SamplingMetrics, SamplingTimingReport};
pub use split::{level_offsets, level_runs, transition_rows};
pub use stage::SamplingStage;
pub use subdivide::{discontinuity_column, interface_links, last_column, row_links, row_width};

use crate::stitch::{StitchDecodeError, StitchSet};

const MAGIC: &[u8; 4] = b"KNSM";
const VERSION: u32 = 1;

/// Final product of a sampling run.
#[derive(Debug, Clone, PartialEq)]
pub struct StitchSampling {
    pub stitches: StitchSet,
    /// Spacing between fine courses.
    pub course_dist: f64,
    /// Spacing between fine wales.
    pub wale_dist: f64,
    /// Sketch of every mesh layer, by layer index.
    pub sketch_refs: Vec<u32>,
}

impl StitchSampling {
    #[must_use]
    pub const fn new(stitches: StitchSet, course_dist: f64, wale_dist: f64, sketch_refs: Vec<u32>) -> Self {
        Self {
            stitches,
            course_dist,
            wale_dist,
            sketch_refs,
        }
    }

    /// Persists the spacing, the sketch references and the stitch buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let stitches = self.stitches.to_bytes();
        let mut out = Vec::with_capacity(28 + 4 * self.sketch_refs.len() + stitches.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&self.course_dist.to_le_bytes());
        out.extend_from_slice(&self.wale_dist.to_le_bytes());
        out.extend_from_slice(&(self.sketch_refs.len() as u32).to_le_bytes());
        for sketch in &self.sketch_refs {
            out.extend_from_slice(&sketch.to_le_bytes());
        }
        out.extend_from_slice(&stitches);
        out
    }

    /// Reloads a sampling written by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StitchDecodeError> {
        let mut reader = Reader { bytes, at: 0 };
        if reader.take(4)? != MAGIC {
            return Err(StitchDecodeError::BadHeader);
        }
        let version = u32::from_le_bytes(reader.array()?);
        if version != VERSION {
            return Err(StitchDecodeError::Version(version));
        }
        let course_dist = f64::from_le_bytes(reader.array()?);
        let wale_dist = f64::from_le_bytes(reader.array()?);
        let count = u32::from_le_bytes(reader.array()?) as usize;
        let sketch_refs = (0..count)
            .map(|_| reader.array().map(u32::from_le_bytes))
            .collect::<Result<Vec<_>, _>>()?;
        let stitches = StitchSet::from_bytes(reader.rest())?;
        Ok(Self::new(stitches, course_dist, wale_dist, sketch_refs))
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], StitchDecodeError> {
        let slice = self
            .bytes
            .get(self.at..self.at + n)
            .ok_or(StitchDecodeError::Truncated(self.at))?;
        self.at += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], StitchDecodeError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.at..]
    }
}
