use crate::GpuProgramType;
use std::any::Any;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug)]
pub enum BackendError {
    Unsupported,
}

pub trait Backend: Send + Sync {
    fn create_device(&self) -> Result<Arc<dyn Device>, BackendError>;
    fn name(&self) -> &str;
}

#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Debug)]
pub enum DeviceError {
    Unknown,
    UnsupportedSyntax(String),
    InvalidProgram(String),
    InvalidParameters,
}

impl Display for DeviceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceError::Unknown => write!(f, "unknown device error"),
            DeviceError::UnsupportedSyntax(syntax) => {
                write!(f, "syntax '{}' is not supported by this device", syntax)
            }
            DeviceError::InvalidProgram(reason) => write!(f, "invalid program: {}", reason),
            DeviceError::InvalidParameters => write!(f, "invalid parameters"),
        }
    }
}

impl std::error::Error for DeviceError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramObjectDesc {
    pub ty: GpuProgramType,
    /// Profile the program binary was compiled for (e.g `arbvp1`, `vs_1_1`)
    pub syntax: String,
}

/// A low-level program living on the device, created from a compiled binary
pub struct ProgramObject {
    pub desc: ProgramObjectDesc,
    pub backend_data: Box<dyn Any + Send + Sync>,
}

impl ProgramObject {
    pub fn new(desc: ProgramObjectDesc, backend_data: Box<dyn Any + Send + Sync>) -> Self {
        Self { desc, backend_data }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct UniformLocation(pub i32);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformBufferDesc {
    pub size_in_bytes: usize,
    /// Binding point shared by every program block bound to this buffer
    pub binding: u32,
}

/// Device memory backing a uniform block
pub struct UniformBuffer {
    pub desc: UniformBufferDesc,
    pub backend_data: Box<dyn Any + Send + Sync>,
}

impl UniformBuffer {
    pub fn new(desc: UniformBufferDesc, backend_data: Box<dyn Any + Send + Sync>) -> Self {
        Self { desc, backend_data }
    }
}

/// A uniform as reported by the device after the program has been created
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveUniform {
    pub name: String,
    pub location: UniformLocation,
    pub array_size: usize,
}

/// Typed uniform upload
///
/// `count` is the number of array elements, `data` holds at least `count` elements worth of values.
/// Matrices are described as `rows` x `columns`; `transpose` is set when `data` is row-major.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum UniformValue<'a> {
    Float {
        components: u8,
        count: usize,
        data: &'a [f32],
    },
    Double {
        components: u8,
        count: usize,
        data: &'a [f64],
    },
    Int {
        components: u8,
        count: usize,
        data: &'a [i32],
    },
    FloatMatrix {
        rows: u8,
        columns: u8,
        count: usize,
        transpose: bool,
        data: &'a [f32],
    },
    DoubleMatrix {
        rows: u8,
        columns: u8,
        count: usize,
        transpose: bool,
        data: &'a [f64],
    },
}

impl UniformValue<'_> {
    pub fn count(&self) -> usize {
        match self {
            UniformValue::Float { count, .. }
            | UniformValue::Double { count, .. }
            | UniformValue::Int { count, .. }
            | UniformValue::FloatMatrix { count, .. }
            | UniformValue::DoubleMatrix { count, .. } => *count,
        }
    }
}

pub trait Device: Send + Sync {
    /// Whether programs compiled for `syntax` can be created on this device
    fn is_syntax_supported(&self, syntax: &str) -> bool;

    /// Whether constant registers are 4 components wide, padding every vector and matrix row
    fn pads_constants(&self) -> bool;

    fn create_program(
        &self,
        desc: &ProgramObjectDesc,
        code: &[u8],
        debug_name: &str,
    ) -> Result<ProgramObject, DeviceError>;

    fn active_uniforms(&self, program: &ProgramObject) -> Vec<ActiveUniform>;

    fn set_program_uniform(
        &self,
        program: &ProgramObject,
        location: UniformLocation,
        value: UniformValue,
    );

    /// Index of the uniform block called `name`, `None` if the program does not use it
    fn uniform_block_index(&self, program: &ProgramObject, name: &str) -> Option<u32>;

    fn create_uniform_buffer(
        &self,
        desc: &UniformBufferDesc,
        debug_name: &str,
    ) -> Result<UniformBuffer, DeviceError>;

    fn bind_uniform_block(&self, program: &ProgramObject, block_index: u32, binding: u32);

    /// Replace the contents of `buffer` starting at its first byte
    fn write_uniform_buffer(&self, buffer: &UniformBuffer, data: &[f32]);
}
