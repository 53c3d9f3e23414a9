use crate::classifier::ParameterClassifier;
use crate::constants::{ConstantDefinitionMap, NamedConstants};
use crate::extractor::ParameterExtractor;
use crate::include::{IncludeResolver, ResourceLookup};
use crate::logical_map::LogicalMaps;
use crate::microcode::{decode_microcode, encode_microcode, microcode_cache_key, MicrocodeCache};
use crate::parameters::GpuProgramParameters;
use crate::Error;
use std::borrow::Cow;
use std::sync::Arc;
use ze_core::{ze_error, ze_info, ze_verbose, ze_warn};
use ze_gfx::backend::{Device, ProgramObject, ProgramObjectDesc};
use ze_gfx::GpuProgramType;
use ze_shader_compiler::{ShaderCompiler, ShaderCompilerInput};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProgramState {
    Unloaded,
    SelectingProfile,
    CacheHit,
    Compiling,
    Ready,
    Failed,
}

/// Where the source of a program comes from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgramSource {
    /// Resource name inside the program's group, read again on every load
    File(String),
    /// In-memory source, `origin` is the name used in `#line` markers
    Inline { origin: String, text: String },
}

impl ProgramSource {
    fn origin(&self) -> &str {
        match self {
            ProgramSource::File(name) => name,
            ProgramSource::Inline { origin, .. } => origin,
        }
    }
}

/// Collaborators needed to load a program
pub struct CompileContext<'a> {
    pub device: &'a dyn Device,
    pub compiler: &'a dyn ShaderCompiler,
    pub resources: &'a dyn ResourceLookup,
    pub microcode_cache: &'a MicrocodeCache,
}

const PROFILE_WITH_DCLS: &str = "vs_1_1";

/// A single-stage GPU program compiled from source
pub struct GpuProgram {
    name: String,
    group: String,
    ty: GpuProgramType,
    source: ProgramSource,
    entry_point: String,
    profiles: Vec<String>,
    compile_arguments: String,
    selected_profile: Option<String>,
    state: ProgramState,
    compile_error: bool,
    diagnostics: Vec<String>,
    program_string: Vec<u8>,
    parameters: ConstantDefinitionMap,
    logical_maps: Arc<LogicalMaps>,
    named_constants: Option<Arc<NamedConstants>>,
    program_object: Option<Arc<ProgramObject>>,
}

impl GpuProgram {
    pub fn new(name: &str, group: &str, ty: GpuProgramType, source: ProgramSource) -> Self {
        Self {
            name: name.to_string(),
            group: group.to_string(),
            ty,
            source,
            entry_point: "main".to_string(),
            profiles: vec![],
            compile_arguments: String::new(),
            selected_profile: None,
            state: ProgramState::Unloaded,
            compile_error: false,
            diagnostics: vec![],
            program_string: vec![],
            parameters: ConstantDefinitionMap::new(),
            logical_maps: Arc::new(LogicalMaps::new()),
            named_constants: None,
            program_object: None,
        }
    }

    /// Set a compile option by name. Returns false for unknown options.
    pub fn set_parameter(&mut self, name: &str, value: &str) -> bool {
        match name {
            "entry_point" => self.entry_point = value.to_string(),
            "profiles" => {
                self.profiles = value.split_whitespace().map(str::to_string).collect();
            }
            "compile_arguments" => self.compile_arguments = value.to_string(),
            _ => return false,
        }

        true
    }

    pub fn parameter(&self, name: &str) -> Option<String> {
        match name {
            "entry_point" => Some(self.entry_point.clone()),
            "profiles" => Some(self.profiles.join(" ")),
            "compile_arguments" => Some(self.compile_arguments.clone()),
            _ => None,
        }
    }

    /// First candidate profile supported by the device
    pub fn select_profile(&self, device: &dyn Device) -> Option<&str> {
        self.profiles
            .iter()
            .find(|profile| device.is_syntax_supported(profile))
            .map(String::as_str)
    }

    /// Compiler arguments for `profile`
    pub fn build_arguments(&self, profile: &str) -> Vec<String> {
        let mut arguments: Vec<String> = self
            .compile_arguments
            .split_whitespace()
            .map(str::to_string)
            .collect();

        if profile == PROFILE_WITH_DCLS && !arguments.iter().any(|argument| argument == "dcls") {
            arguments.push("-profileopts".to_string());
            arguments.push("dcls".to_string());
        }

        arguments
    }

    pub fn is_supported(&self, device: &dyn Device) -> bool {
        !self.compile_error && self.select_profile(device).is_some()
    }

    /// Load the program. Failures are logged and leave the program in the `Failed` state.
    pub fn load(&mut self, context: &CompileContext) -> Result<(), Error> {
        let result = self.load_internal(context);
        match &result {
            Ok(()) => self.state = ProgramState::Ready,
            Err(error) => {
                ze_error!("{}", error);
                self.state = ProgramState::Failed;
            }
        }
        result
    }

    fn load_internal(&mut self, context: &CompileContext) -> Result<(), Error> {
        self.clear_tables();
        self.compile_error = false;
        self.diagnostics.clear();

        self.state = ProgramState::SelectingProfile;
        let profile = self
            .select_profile(context.device)
            .map(str::to_string)
            .ok_or_else(|| Error::ProfileUnsupported {
                program: self.name.clone(),
                profiles: self.profiles.clone(),
            })?;
        self.selected_profile = Some(profile.clone());

        let cache_key = microcode_cache_key(context.compiler.language(), &self.name);
        if context.microcode_cache.use_cache() {
            if let Some(microcode) = context.microcode_cache.get(&cache_key) {
                self.state = ProgramState::CacheHit;
                match decode_microcode(&microcode) {
                    Ok((program_string, parameters)) => {
                        ze_verbose!("Loaded program {} from microcode cache", self.name);
                        let logical_maps = LogicalMaps::from_definitions(&parameters);
                        self.set_tables(program_string, parameters, logical_maps);
                        return Ok(());
                    }
                    Err(error) => ze_warn!(
                        "Discarding cached microcode of program {}: {}",
                        self.name,
                        error
                    ),
                }
            }
        }

        self.state = ProgramState::Compiling;
        let source = match &self.source {
            ProgramSource::File(name) => context
                .resources
                .open_resource(name, &self.group)
                .map_err(|source| Error::Resource {
                    name: name.clone(),
                    group: self.group.clone(),
                    source,
                })?,
            ProgramSource::Inline { text, .. } => text.clone(),
        };
        let source = IncludeResolver::new(context.resources, &self.group)
            .resolve(&source, self.source.origin())?;

        let arguments = self.build_arguments(&profile);
        let input = ShaderCompilerInput {
            name: &self.name,
            stage: self.ty,
            code: &source,
            profile: &profile,
            entry_point: &self.entry_point,
            arguments: &arguments,
        };
        let compiled = match context.compiler.compile_shader(&input) {
            Ok(compiled) => compiled,
            Err(diagnostics) => {
                self.compile_error = true;
                self.diagnostics = diagnostics.clone();
                return Err(Error::CompileError {
                    program: self.name.clone(),
                    diagnostics,
                });
            }
        };

        let extracted =
            ParameterExtractor::new(&self.name, ParameterClassifier::for_device(context.device))
                .extract(compiled.as_ref());
        let program_string = compiled.program_string().to_vec();
        drop(compiled);

        if context.microcode_cache.save_to_cache() {
            context.microcode_cache.insert(
                cache_key,
                encode_microcode(&program_string, &extracted.parameters),
            );
        }

        self.set_tables(program_string, extracted.parameters, extracted.logical_maps);
        Ok(())
    }

    fn set_tables(
        &mut self,
        program_string: Vec<u8>,
        parameters: ConstantDefinitionMap,
        logical_maps: LogicalMaps,
    ) {
        self.named_constants = Some(Arc::new(NamedConstants::new(
            &parameters,
            logical_maps.float.buffer_size(),
            logical_maps.double.buffer_size(),
            logical_maps.int.buffer_size(),
        )));
        self.program_string = program_string;
        self.parameters = parameters;
        self.logical_maps = Arc::new(logical_maps);
    }

    fn clear_tables(&mut self) {
        self.program_string.clear();
        self.parameters = ConstantDefinitionMap::new();
        self.logical_maps = Arc::new(LogicalMaps::new());
        self.named_constants = None;
        self.program_object = None;
        self.selected_profile = None;
    }

    pub fn unload(&mut self) {
        self.clear_tables();
        self.compile_error = false;
        self.diagnostics.clear();
        self.state = ProgramState::Unloaded;
    }

    pub fn reload(&mut self, context: &CompileContext) -> Result<(), Error> {
        self.unload();
        self.load(context)
    }

    /// Create the device program from the compiled binary
    pub fn create_program_object(
        &mut self,
        device: &dyn Device,
    ) -> Result<Arc<ProgramObject>, Error> {
        if self.state != ProgramState::Ready {
            return Err(Error::NotLoaded(self.name.clone()));
        }

        if let Some(program_object) = &self.program_object {
            return Ok(program_object.clone());
        }

        let syntax = self
            .selected_profile
            .clone()
            .ok_or_else(|| Error::NotLoaded(self.name.clone()))?;
        let code = match self.ty {
            GpuProgramType::Fragment => scalar_depth_output(&self.program_string),
            _ => Cow::Borrowed(self.program_string.as_slice()),
        };
        let program_object = device
            .create_program(
                &ProgramObjectDesc {
                    ty: self.ty,
                    syntax,
                },
                &code,
                &self.name,
            )
            .map_err(|source| Error::Device {
                program: self.name.clone(),
                source,
            })?;

        ze_info!("Created {} program {}", self.ty, self.name);
        let program_object = Arc::new(program_object);
        self.program_object = Some(program_object.clone());
        Ok(program_object)
    }

    /// Fresh parameter buffers laid out for this program
    pub fn create_parameters(&self) -> Result<GpuProgramParameters, Error> {
        self.named_constants
            .clone()
            .map(GpuProgramParameters::new)
            .ok_or_else(|| Error::NotLoaded(self.name.clone()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn ty(&self) -> GpuProgramType {
        self.ty
    }

    pub fn source(&self) -> &ProgramSource {
        &self.source
    }

    pub fn state(&self) -> ProgramState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ProgramState::Ready
    }

    pub fn has_compile_error(&self) -> bool {
        self.compile_error
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn selected_profile(&self) -> Option<&str> {
        self.selected_profile.as_deref()
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn profiles(&self) -> &[String] {
        &self.profiles
    }

    pub fn program_string(&self) -> &[u8] {
        &self.program_string
    }

    pub fn parameters(&self) -> &ConstantDefinitionMap {
        &self.parameters
    }

    pub fn logical_maps(&self) -> &Arc<LogicalMaps> {
        &self.logical_maps
    }

    pub fn named_constants(&self) -> Option<&Arc<NamedConstants>> {
        self.named_constants.as_ref()
    }

    pub fn program_object(&self) -> Option<&Arc<ProgramObject>> {
        self.program_object.as_ref()
    }
}

const DEPTH_COMPONENT: &[u8] = b"oDepth.z";

/// Rewrite writes to `oDepth.z` as writes to the scalar `oDepth`
fn scalar_depth_output(code: &[u8]) -> Cow<'_, [u8]> {
    let find = |code: &[u8]| {
        code.windows(DEPTH_COMPONENT.len())
            .position(|window| window == DEPTH_COMPONENT)
    };
    if find(code).is_none() {
        return Cow::Borrowed(code);
    }

    let mut patched = Vec::with_capacity(code.len());
    let mut rest = code;
    while let Some(position) = find(rest) {
        patched.extend_from_slice(&rest[..position]);
        patched.extend_from_slice(b"oDepth");
        rest = &rest[position + DEPTH_COMPONENT.len()..];
    }
    patched.extend_from_slice(rest);
    Cow::Owned(patched)
}
