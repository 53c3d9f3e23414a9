use crate::binder::UniformBinder;
use crate::config::{ProgramDeclaration, ShaderSystemConfig};
use crate::constants::NamedConstants;
use crate::microcode::MicrocodeCache;
use crate::parameters::GpuProgramParameters;
use crate::program::{CompileContext, GpuProgram, ProgramSource};
use fnv::FnvHashMap;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::sync::Arc;
use ze_core::thread::{clear_thread_name, set_thread_name};
use ze_core::{ze_error, ze_info, ze_warn};
use ze_filesystem::path::Path;
use ze_filesystem::FileSystem;
use ze_gfx::backend::Device;
use ze_gfx::GpuProgramType;
use ze_shader_compiler::ShaderCompiler;

pub use error::Error;

/// Owns every GPU program of a session along with the collaborators needed to build them
pub struct ShaderManager {
    device: Arc<dyn Device>,
    compiler: Arc<dyn ShaderCompiler>,
    filesystem: Arc<FileSystem>,
    microcode_cache: MicrocodeCache,
    programs: RwLock<FnvHashMap<String, Arc<Mutex<GpuProgram>>>>,
}

impl ShaderManager {
    pub fn new(
        device: Arc<dyn Device>,
        compiler: Arc<dyn ShaderCompiler>,
        filesystem: Arc<FileSystem>,
    ) -> Arc<Self> {
        Arc::new(Self {
            device,
            compiler,
            filesystem,
            microcode_cache: MicrocodeCache::default(),
            programs: Default::default(),
        })
    }

    fn compile_context(&self) -> CompileContext<'_> {
        CompileContext {
            device: self.device.as_ref(),
            compiler: self.compiler.as_ref(),
            resources: self.filesystem.as_ref(),
            microcode_cache: &self.microcode_cache,
        }
    }

    pub fn microcode_cache(&self) -> &MicrocodeCache {
        &self.microcode_cache
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Register a new unloaded program
    pub fn create_program(
        &self,
        name: &str,
        group: &str,
        ty: GpuProgramType,
        source: ProgramSource,
    ) -> Result<Arc<Mutex<GpuProgram>>, Error> {
        self.insert_program(GpuProgram::new(name, group, ty, source))
    }

    pub fn declare_program(
        &self,
        declaration: &ProgramDeclaration,
    ) -> Result<Arc<Mutex<GpuProgram>>, Error> {
        self.insert_program(declaration.to_program())
    }

    fn insert_program(&self, program: GpuProgram) -> Result<Arc<Mutex<GpuProgram>>, Error> {
        let mut programs = self.programs.write();
        if programs.contains_key(program.name()) {
            return Err(Error::DuplicateProgram(program.name().to_string()));
        }

        let name = program.name().to_string();
        let program = Arc::new(Mutex::new(program));
        programs.insert(name, program.clone());
        Ok(program)
    }

    /// Apply the cache options of a configuration file, load its cache and declare its programs
    pub fn load_config(&self, path: &Path) -> Result<ShaderSystemConfig, Error> {
        let config = ShaderSystemConfig::from_read(self.filesystem.read(path)?)?;

        self.microcode_cache
            .set_use_cache(config.microcode_cache.use_cache);
        self.microcode_cache
            .set_save_to_cache(config.microcode_cache.save_to_cache);

        if let Some(cache_path) = &config.microcode_cache.path {
            let cache_path = Path::parse(cache_path)?;
            if self.filesystem.exists(&cache_path) {
                self.load_microcode_cache(&cache_path)?;
            }
        }

        for declaration in &config.programs {
            self.declare_program(declaration)?;
        }

        ze_info!(
            "Loaded shader system configuration {} ({} programs)",
            path.as_str(),
            config.programs.len()
        );
        Ok(config)
    }

    pub fn program(&self, name: &str) -> Option<Arc<Mutex<GpuProgram>>> {
        self.programs.read().get(name).cloned()
    }

    pub fn remove_program(&self, name: &str) -> bool {
        self.programs.write().remove(name).is_some()
    }

    /// Sorted names of every registered program
    pub fn program_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.programs.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn expect_program(&self, name: &str) -> Result<Arc<Mutex<GpuProgram>>, Error> {
        self.program(name)
            .ok_or_else(|| Error::UnknownProgram(name.to_string()))
    }

    /// Compile (or fetch from the microcode cache) a program and create its device program
    pub fn load_program(&self, name: &str) -> Result<(), Error> {
        let program = self.expect_program(name)?;
        let mut program = program.lock();
        program.load(&self.compile_context())?;
        program.create_program_object(self.device.as_ref())?;
        ze_info!(
            "Loaded {} program {} ({})",
            program.ty(),
            name,
            program.selected_profile().unwrap_or_default()
        );
        Ok(())
    }

    pub fn reload_program(&self, name: &str) -> Result<(), Error> {
        let program = self.expect_program(name)?;
        program.lock().unload();
        self.load_program(name)
    }

    pub fn unload_program(&self, name: &str) -> Result<(), Error> {
        self.expect_program(name)?.lock().unload();
        Ok(())
    }

    /// Load every unloaded program in parallel. Returns the programs that failed.
    pub fn load_all(&self) -> Vec<(String, Error)> {
        let names: Vec<String> = self
            .program_names()
            .into_iter()
            .filter(|name| match self.program(name) {
                Some(program) => {
                    let ready = program.lock().is_ready();
                    !ready
                }
                None => false,
            })
            .collect();
        if names.is_empty() {
            return vec![];
        }

        let load = || {
            names
                .par_iter()
                .filter_map(|name| {
                    self.load_program(name)
                        .err()
                        .map(|error| (name.clone(), error))
                })
                .collect::<Vec<_>>()
        };
        let failures = match compile_thread_pool(names.len()) {
            Ok(pool) => pool.install(load),
            Err(error) => {
                ze_warn!(
                    "Cannot create shader compiler threads, using the global pool: {}",
                    error
                );
                load()
            }
        };
        if !failures.is_empty() {
            ze_error!(
                "{} of {} programs failed to load",
                failures.len(),
                names.len()
            );
        }
        failures
    }

    pub fn save_microcode_cache(&self, path: &Path) -> Result<(), Error> {
        let mut file = self.filesystem.write(path)?;
        self.microcode_cache.save(&mut file)?;
        ze_info!(
            "Saved {} microcode entries to {}",
            self.microcode_cache.len(),
            path.as_str()
        );
        Ok(())
    }

    pub fn load_microcode_cache(&self, path: &Path) -> Result<usize, Error> {
        let mut file = self.filesystem.read(path)?;
        let count = self.microcode_cache.load(&mut file)?;
        ze_info!("Loaded {} microcode entries from {}", count, path.as_str());
        Ok(count)
    }

    pub fn named_constants(&self, name: &str) -> Result<Arc<NamedConstants>, Error> {
        self.expect_program(name)?
            .lock()
            .named_constants()
            .cloned()
            .ok_or_else(|| Error::NotLoaded(name.to_string()))
    }

    pub fn create_parameters(&self, name: &str) -> Result<GpuProgramParameters, Error> {
        self.expect_program(name)?.lock().create_parameters()
    }

    pub fn is_supported(&self, name: &str) -> bool {
        match self.program(name) {
            Some(program) => {
                let supported = program.lock().is_supported(self.device.as_ref());
                supported
            }
            None => false,
        }
    }

    /// Attach the device program of a loaded program to `binder` for its stage
    pub fn attach_program(&self, binder: &mut UniformBinder, name: &str) -> Result<(), Error> {
        let program = self.expect_program(name)?;
        let mut program = program.lock();
        let constants = program
            .named_constants()
            .cloned()
            .ok_or_else(|| Error::NotLoaded(name.to_string()))?;
        let program_object = program.create_program_object(self.device.as_ref())?;
        binder.attach(program.ty(), program_object, constants);
        Ok(())
    }
}

/// Named workers for parallel program loads, at most one per program
fn compile_thread_pool(program_count: usize) -> Result<ThreadPool, ThreadPoolBuildError> {
    let thread_count = std::thread::available_parallelism()
        .map_or(1, |count| count.get())
        .min(program_count);
    ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .thread_name(|index| format!("Shader Compiler {}", index))
        .start_handler(|index| {
            set_thread_name(
                std::thread::current().id(),
                format!("Shader Compiler {}", index),
            )
        })
        .exit_handler(|_| clear_thread_name(std::thread::current().id()))
        .build()
}

pub mod binder;
pub mod classifier;
pub mod config;
pub mod constants;
pub mod error;
pub mod extractor;
pub mod include;
pub mod logical_map;
pub mod microcode;
pub mod parameters;
pub mod program;
pub mod shared_parameters;

#[cfg(test)]
mod test_utils;

#[cfg(test)]
mod tests;
