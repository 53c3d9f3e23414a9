use std::fmt::{Display, Formatter};
use ze_gfx::GpuProgramType;

pub struct ShaderCompilerInput<'a> {
    pub name: &'a str,
    pub stage: GpuProgramType,
    pub code: &'a str,
    pub profile: &'a str,
    pub entry_point: &'a str,
    pub arguments: &'a [String],
}

/// Type of a parameter as reported by the compiler
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CompilerType {
    Float,
    Float1,
    Float2,
    Float3,
    Float4,
    Half,
    Half1,
    Half2,
    Half3,
    Half4,
    /// `rows` x `columns`, both in 2..=4
    FloatMatrix {
        rows: u8,
        columns: u8,
    },
    HalfMatrix {
        rows: u8,
        columns: u8,
    },
    Int,
    Int1,
    Int2,
    Int3,
    Int4,
    Sampler1D,
    Sampler2D,
    Sampler3D,
    SamplerCube,
    SamplerRect,
    Struct,
    Array,
    /// Anything the engine has no constant type for (bool, fixed, string...)
    Other(String),
}

impl CompilerType {
    pub fn is_sampler(&self) -> bool {
        matches!(
            self,
            CompilerType::Sampler1D
                | CompilerType::Sampler2D
                | CompilerType::Sampler3D
                | CompilerType::SamplerCube
                | CompilerType::SamplerRect
        )
    }
}

impl Display for CompilerType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CompilerType::FloatMatrix { rows, columns } => write!(f, "float{}x{}", rows, columns),
            CompilerType::HalfMatrix { rows, columns } => write!(f, "half{}x{}", rows, columns),
            CompilerType::Other(name) => write!(f, "{}", name),
            _ => write!(f, "{}", format!("{:?}", self).to_lowercase()),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParameterVariability {
    Uniform,
    Varying,
    Literal,
    Constant,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParameterDirection {
    In,
    Out,
    InOut,
}

/// Hardware resource a parameter is bound to
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParameterResource {
    Register,
    /// First constant of a register combiner stage. Both constants of one stage share the same
    /// resource index.
    CombinerStageConst0,
    CombinerStageConst1,
}

/// A node of the parameter tree of a compiled program
///
/// Structures list their fields in `members`, arrays hold their first element as single member.
#[derive(Clone, Debug, PartialEq)]
pub struct CompilerParameter {
    pub name: String,
    pub ty: CompilerType,
    pub variability: ParameterVariability,
    pub direction: ParameterDirection,
    pub referenced: bool,
    pub resource: ParameterResource,
    pub resource_index: usize,
    pub array_size: usize,
    pub members: Vec<CompilerParameter>,
}

impl CompilerParameter {
    /// A referenced input uniform
    pub fn uniform(name: impl Into<String>, ty: CompilerType) -> Self {
        Self {
            name: name.into(),
            ty,
            variability: ParameterVariability::Uniform,
            direction: ParameterDirection::In,
            referenced: true,
            resource: ParameterResource::Register,
            resource_index: 0,
            array_size: 1,
            members: vec![],
        }
    }

    pub fn structure(name: impl Into<String>, members: Vec<CompilerParameter>) -> Self {
        Self {
            members,
            ..Self::uniform(name, CompilerType::Struct)
        }
    }

    pub fn array(name: impl Into<String>, array_size: usize, element: CompilerParameter) -> Self {
        Self {
            array_size,
            members: vec![element],
            ..Self::uniform(name, CompilerType::Array)
        }
    }

    pub fn with_resource_index(mut self, resource_index: usize) -> Self {
        self.resource_index = resource_index;
        self
    }

    pub fn with_resource(mut self, resource: ParameterResource) -> Self {
        self.resource = resource;
        self
    }

    pub fn with_variability(mut self, variability: ParameterVariability) -> Self {
        self.variability = variability;
        self
    }

    pub fn with_direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn unreferenced(mut self) -> Self {
        self.referenced = false;
        self
    }

    /// First element of an array parameter
    pub fn element(&self) -> Option<&CompilerParameter> {
        match self.ty {
            CompilerType::Array => self.members.first(),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParameterScope {
    /// Parameters of the entry point and the program
    Program,
    /// Global (shared) parameters
    Global,
}

/// Result of a successful compilation. Only lives until its binary and parameters have been read.
pub trait CompiledProgram: Send {
    fn program_string(&self) -> &[u8];
    fn parameters(&self, scope: ParameterScope) -> &[CompilerParameter];
}

/// Plain owned compilation result
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompiledProgramData {
    pub program_string: Vec<u8>,
    pub program_parameters: Vec<CompilerParameter>,
    pub global_parameters: Vec<CompilerParameter>,
}

impl CompiledProgram for CompiledProgramData {
    fn program_string(&self) -> &[u8] {
        &self.program_string
    }

    fn parameters(&self, scope: ParameterScope) -> &[CompilerParameter] {
        match scope {
            ParameterScope::Program => &self.program_parameters,
            ParameterScope::Global => &self.global_parameters,
        }
    }
}

pub trait ShaderCompiler: Send + Sync {
    /// Short name of the shading language (e.g `cg`), used to namespace cached binaries
    fn language(&self) -> &str;

    /// Compile a program. On failure, returns the compiler diagnostics.
    fn compile_shader(
        &self,
        input: &ShaderCompilerInput,
    ) -> Result<Box<dyn CompiledProgram>, Vec<String>>;
}
