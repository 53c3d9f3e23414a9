use crate::microcode::MicrocodeError;
use ze_gfx::backend::DeviceError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no profile of program '{program}' is supported by the device ({})", .profiles.join(" "))]
    ProfileUnsupported {
        program: String,
        profiles: Vec<String>,
    },

    #[error("unable to compile program '{program}':\n{}", .diagnostics.join("\n"))]
    CompileError {
        program: String,
        diagnostics: Vec<String>,
    },

    #[error("badly formed #include directive in {file}: expected {expected}")]
    MalformedDirective { file: String, expected: &'static str },

    #[error("'{0}' includes itself")]
    RecursiveInclude(String),

    #[error("uniform '{parameter}' of program '{program}' has an unsupported type ({ty})")]
    ParameterClassificationUnknown {
        program: String,
        parameter: String,
        ty: String,
    },

    #[error("cannot open '{name}' in group '{group}': {source}")]
    Resource {
        name: String,
        group: String,
        source: ze_filesystem::Error,
    },

    #[error("invalid microcode: {0}")]
    Microcode(#[from] MicrocodeError),

    #[error("invalid shader system configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("invalid path: {0}")]
    Path(#[from] ze_filesystem::path::ParseError),

    #[error("filesystem error: {0}")]
    FileSystem(#[from] ze_filesystem::Error),

    #[error("unknown program '{0}'")]
    UnknownProgram(String),

    #[error("program '{0}' already exists")]
    DuplicateProgram(String),

    #[error("program '{0}' is not loaded")]
    NotLoaded(String),

    #[error("unknown constant '{0}'")]
    UnknownConstant(String),

    #[error("constant '{0}' already exists")]
    DuplicateConstant(String),

    #[error("constant '{name}' is not a {expected} constant")]
    ConstantTypeMismatch { name: String, expected: &'static str },

    #[error("device rejected program '{program}': {source}")]
    Device {
        program: String,
        source: DeviceError,
    },

    #[error("device rejected uniform buffer '{name}': {source}")]
    UniformBuffer {
        name: String,
        source: DeviceError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
