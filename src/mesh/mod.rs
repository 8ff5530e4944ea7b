//! Sketch mesh model: time-labeled sample lattices, interpolation patches,
//! course paths, the region graph and the contracts of the external oracles.

mod course;
mod edge;
mod neighborhood;
mod oracles;
pub mod primitives;
mod region;
mod sample;

pub use course::{CourseError, CoursePath, CoursePoint, stitch_alpha};
pub use edge::SampleEdge;
pub use neighborhood::{Patch, SampleNeighborhood};
pub use oracles::{
    DistanceSampler, EuclideanSampler, GeodesicError, GeodesicPath, IsolineTracer, NoSeams,
    PathPoint, SeamOracle,
};
pub use region::{
    EdgeId, GraphError, RegionEdge, RegionGraph, RegionId, RegionKind, RegionNode, TopologyError,
};
pub use sample::{MeshLayer, Sample, SampleRef, TimeMesh};
