use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use ze_core::thread::current_thread_name;
use ze_gfx::GpuProgramType;
use ze_shader_compiler::{
    CompiledProgram, CompiledProgramData, CompilerParameter, ParameterScope, ShaderCompiler,
    ShaderCompilerInput,
};

#[derive(Clone, Debug)]
pub struct Invocation {
    pub name: String,
    pub stage: GpuProgramType,
    pub code: String,
    pub profile: String,
    pub entry_point: String,
    pub arguments: Vec<String>,
    /// Name of the thread the compiler ran on
    pub thread: Option<String>,
}

enum Script {
    Succeed(CompiledProgramData),
    Fail(Vec<String>),
}

/// Compiler answering with canned results per program name
#[derive(Default)]
pub struct ScriptedCompiler {
    scripts: HashMap<String, Script>,
    invocations: Mutex<Vec<Invocation>>,
    live_handles: Arc<AtomicUsize>,
}

impl ScriptedCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeed(mut self, name: &str, data: CompiledProgramData) -> Self {
        self.scripts.insert(name.to_string(), Script::Succeed(data));
        self
    }

    pub fn fail(mut self, name: &str, diagnostics: &[&str]) -> Self {
        self.scripts.insert(
            name.to_string(),
            Script::Fail(diagnostics.iter().map(|d| d.to_string()).collect()),
        );
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }

    /// Compiled handles not dropped yet
    pub fn live_handles(&self) -> usize {
        self.live_handles.load(Ordering::SeqCst)
    }
}

struct TrackedProgram {
    data: CompiledProgramData,
    live_handles: Arc<AtomicUsize>,
}

impl CompiledProgram for TrackedProgram {
    fn program_string(&self) -> &[u8] {
        self.data.program_string()
    }

    fn parameters(&self, scope: ParameterScope) -> &[CompilerParameter] {
        self.data.parameters(scope)
    }
}

impl Drop for TrackedProgram {
    fn drop(&mut self) {
        self.live_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ShaderCompiler for ScriptedCompiler {
    fn language(&self) -> &str {
        "cg"
    }

    fn compile_shader(
        &self,
        input: &ShaderCompilerInput,
    ) -> Result<Box<dyn CompiledProgram>, Vec<String>> {
        self.invocations.lock().push(Invocation {
            name: input.name.to_string(),
            stage: input.stage,
            code: input.code.to_string(),
            profile: input.profile.to_string(),
            entry_point: input.entry_point.to_string(),
            arguments: input.arguments.to_vec(),
            thread: current_thread_name().map(|name| name.to_string()),
        });

        match self.scripts.get(input.name) {
            Some(Script::Succeed(data)) => {
                self.live_handles.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(TrackedProgram {
                    data: data.clone(),
                    live_handles: self.live_handles.clone(),
                }))
            }
            Some(Script::Fail(diagnostics)) => Err(diagnostics.clone()),
            None => Err(vec![format!("no script for program {}", input.name)]),
        }
    }
}
