use enumflags2::{bitflags, BitFlags};
use serde_derive::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Pipeline stage a GPU program runs at
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuProgramType {
    Vertex,
    Fragment,
    Geometry,
    Hull,
    Domain,
    Compute,
}

impl GpuProgramType {
    pub const ALL: [GpuProgramType; 6] = [
        GpuProgramType::Vertex,
        GpuProgramType::Fragment,
        GpuProgramType::Geometry,
        GpuProgramType::Hull,
        GpuProgramType::Domain,
        GpuProgramType::Compute,
    ];
}

impl Display for GpuProgramType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuProgramType::Vertex => write!(f, "vertex"),
            GpuProgramType::Fragment => write!(f, "fragment"),
            GpuProgramType::Geometry => write!(f, "geometry"),
            GpuProgramType::Hull => write!(f, "hull"),
            GpuProgramType::Domain => write!(f, "domain"),
            GpuProgramType::Compute => write!(f, "compute"),
        }
    }
}

/// How often a constant is expected to change, used to skip uploads of unchanged values
#[bitflags]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
#[repr(u32)]
pub enum GpuParamVariabilityFlagBits {
    Global = 1 << 0,
    PerObject = 1 << 1,
    Lights = 1 << 2,
    PassIterationNumber = 1 << 3,
}

pub type GpuParamVariability = BitFlags<GpuParamVariabilityFlagBits>;

pub mod backend;
pub mod null;
