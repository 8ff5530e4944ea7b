#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Stitch-mesh sampling for machine knitting.
//!
//! Given a time-labeled sketch mesh, the crate decides how many stitches each
//! course carries, where short rows go, and how stitches connect across
//! courses (wales) and along them (course pointers).
//!
//! ```ignore
//! use knit_sampler::{Oracles, SamplingAlgorithm, SamplingParams, TubeSketch};
//! use knit_sampler::region::{SubdivisionOptions, subdivide_regions};
//!
//! let params = SamplingParams::default();
//! let tube = TubeSketch::new(40.0, 60.0, 2.0).circular(true);
//! let mut mesh = tube.build();
//! subdivide_regions(&mut mesh, &tube, SubdivisionOptions::from_params(&params))?;
//! let (sampling, diagnostics) =
//!     SamplingAlgorithm::new(&mesh, params, Oracles::new(&tube, &tube))?.run()?;
//! println!("{diagnostics}");
//! ```

pub mod core;
pub mod ds;
pub mod error;
pub mod mesh;
pub mod params;
pub mod region;
pub mod sampling;
pub mod solver;
pub mod stitch;

pub use error::SamplingError;
pub use mesh::primitives::{ForkSketch, TubeSketch};
pub use mesh::{RegionGraph, RegionId, TimeMesh};
pub use params::SamplingParams;
pub use sampling::{SamplingAlgorithm, SamplingDiagnostics, SamplingStage, StitchSampling};
pub use solver::{Batch, Oracles};
pub use stitch::{StitchGroup, StitchSet};
