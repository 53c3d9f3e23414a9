use crate::program::{GpuProgram, ProgramSource};
use crate::Error;
use serde_derive::{Deserialize, Serialize};
use std::io::Read;
use std::str::FromStr;
use ze_gfx::GpuProgramType;

fn default_true() -> bool {
    true
}

fn default_group() -> String {
    "assets".to_string()
}

fn default_entry_point() -> String {
    "main".to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicrocodeCacheConfig {
    #[serde(default = "default_true")]
    pub use_cache: bool,
    #[serde(default)]
    pub save_to_cache: bool,
    /// Where the cache is loaded from and saved to
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for MicrocodeCacheConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            save_to_cache: false,
            path: None,
        }
    }
}

/// A program to create when the configuration is loaded
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramDeclaration {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: GpuProgramType,
    #[serde(default = "default_group")]
    pub group: String,
    /// Resource name inside `group`
    pub source: String,
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
    #[serde(default)]
    pub profiles: String,
    #[serde(default)]
    pub compile_arguments: String,
}

impl ProgramDeclaration {
    pub fn to_program(&self) -> GpuProgram {
        let mut program = GpuProgram::new(
            &self.name,
            &self.group,
            self.ty,
            ProgramSource::File(self.source.clone()),
        );
        self.apply(&mut program);
        program
    }

    /// Copy the compile options to `program`
    pub fn apply(&self, program: &mut GpuProgram) {
        program.set_parameter("entry_point", &self.entry_point);
        program.set_parameter("profiles", &self.profiles);
        program.set_parameter("compile_arguments", &self.compile_arguments);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderSystemConfig {
    #[serde(default)]
    pub microcode_cache: MicrocodeCacheConfig,
    #[serde(default)]
    pub programs: Vec<ProgramDeclaration>,
}

impl ShaderSystemConfig {
    pub fn from_read(reader: impl Read) -> Result<Self, Error> {
        Ok(serde_yaml::from_reader(reader)?)
    }
}

impl FromStr for ShaderSystemConfig {
    type Err = Error;

    fn from_str(str: &str) -> Result<Self, Self::Err> {
        Ok(serde_yaml::from_str(str)?)
    }
}
