//! Stages of the sampling pipeline.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SamplingStage {
    Global,
    Local,
    Instantiate,
    Distribute,
    Subdivide,
    Split,
}

impl SamplingStage {
    pub const COUNT: usize = 6;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Global,
        Self::Local,
        Self::Instantiate,
        Self::Distribute,
        Self::Subdivide,
        Self::Split,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Global => Some(Self::Local),
            Self::Local => Some(Self::Instantiate),
            Self::Instantiate => Some(Self::Distribute),
            Self::Distribute => Some(Self::Subdivide),
            Self::Subdivide => Some(Self::Split),
            Self::Split => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Local => "local",
            Self::Instantiate => "instantiate",
            Self::Distribute => "distribute",
            Self::Subdivide => "subdivide",
            Self::Split => "split",
        }
    }
}

impl fmt::Display for SamplingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
