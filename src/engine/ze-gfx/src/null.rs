use crate::backend::*;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use ze_core::ze_verbose;

/// Backend that renders nothing. Its device accepts a configurable set of syntaxes and records
/// every uniform upload, which makes it suitable for headless runs and tests.
#[derive(Default)]
pub struct NullBackend;

impl Backend for NullBackend {
    fn create_device(&self) -> Result<Arc<dyn Device>, BackendError> {
        Ok(NullDevice::new(&[], true))
    }

    fn name(&self) -> &str {
        "Null"
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RecordedUniformValue {
    Float {
        components: u8,
        count: usize,
        data: Vec<f32>,
    },
    Double {
        components: u8,
        count: usize,
        data: Vec<f64>,
    },
    Int {
        components: u8,
        count: usize,
        data: Vec<i32>,
    },
    FloatMatrix {
        rows: u8,
        columns: u8,
        count: usize,
        transpose: bool,
        data: Vec<f32>,
    },
    DoubleMatrix {
        rows: u8,
        columns: u8,
        count: usize,
        transpose: bool,
        data: Vec<f64>,
    },
}

impl From<UniformValue<'_>> for RecordedUniformValue {
    fn from(value: UniformValue<'_>) -> Self {
        match value {
            UniformValue::Float {
                components,
                count,
                data,
            } => RecordedUniformValue::Float {
                components,
                count,
                data: data.to_vec(),
            },
            UniformValue::Double {
                components,
                count,
                data,
            } => RecordedUniformValue::Double {
                components,
                count,
                data: data.to_vec(),
            },
            UniformValue::Int {
                components,
                count,
                data,
            } => RecordedUniformValue::Int {
                components,
                count,
                data: data.to_vec(),
            },
            UniformValue::FloatMatrix {
                rows,
                columns,
                count,
                transpose,
                data,
            } => RecordedUniformValue::FloatMatrix {
                rows,
                columns,
                count,
                transpose,
                data: data.to_vec(),
            },
            UniformValue::DoubleMatrix {
                rows,
                columns,
                count,
                transpose,
                data,
            } => RecordedUniformValue::DoubleMatrix {
                rows,
                columns,
                count,
                transpose,
                data: data.to_vec(),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UniformUpload {
    pub program: u64,
    pub location: UniformLocation,
    pub value: RecordedUniformValue,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformBlockBinding {
    pub program: u64,
    pub block_index: u32,
    pub binding: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UniformBufferWrite {
    pub binding: u32,
    pub data: Vec<f32>,
}

struct NullProgram {
    id: u64,
}

struct NullUniformBuffer;

pub struct NullDevice {
    supported_syntaxes: Vec<String>,
    pads_constants: bool,
    next_program_id: AtomicU64,
    uniforms: Mutex<HashMap<u64, Vec<ActiveUniform>>>,
    uniform_blocks: Mutex<HashMap<u64, Vec<String>>>,
    codes: Mutex<HashMap<u64, Vec<u8>>>,
    uploads: Mutex<Vec<UniformUpload>>,
    block_bindings: Mutex<Vec<UniformBlockBinding>>,
    buffer_writes: Mutex<Vec<UniformBufferWrite>>,
}

impl NullDevice {
    /// An empty `supported_syntaxes` list accepts every syntax
    pub fn new(supported_syntaxes: &[&str], pads_constants: bool) -> Arc<Self> {
        Arc::new(Self {
            supported_syntaxes: supported_syntaxes.iter().map(|s| s.to_string()).collect(),
            pads_constants,
            next_program_id: AtomicU64::new(1),
            uniforms: Mutex::default(),
            uniform_blocks: Mutex::default(),
            codes: Mutex::default(),
            uploads: Mutex::default(),
            block_bindings: Mutex::default(),
            buffer_writes: Mutex::default(),
        })
    }

    pub fn program_id(program: &ProgramObject) -> Option<u64> {
        program
            .backend_data
            .downcast_ref::<NullProgram>()
            .map(|program| program.id)
    }

    /// Set the uniforms reported by `active_uniforms` for this program
    pub fn declare_uniforms(&self, program: &ProgramObject, uniforms: Vec<ActiveUniform>) {
        if let Some(id) = Self::program_id(program) {
            self.uniforms.lock().insert(id, uniforms);
        }
    }

    /// Set the uniform blocks of this program, a block index is its position in `blocks`
    pub fn declare_uniform_blocks(&self, program: &ProgramObject, blocks: Vec<String>) {
        if let Some(id) = Self::program_id(program) {
            self.uniform_blocks.lock().insert(id, blocks);
        }
    }

    /// Binary the program was created from
    pub fn program_code(&self, program: &ProgramObject) -> Option<Vec<u8>> {
        Self::program_id(program).and_then(|id| self.codes.lock().get(&id).cloned())
    }

    pub fn block_bindings(&self) -> Vec<UniformBlockBinding> {
        self.block_bindings.lock().clone()
    }

    pub fn buffer_writes(&self) -> Vec<UniformBufferWrite> {
        self.buffer_writes.lock().clone()
    }

    pub fn uploads(&self) -> Vec<UniformUpload> {
        self.uploads.lock().clone()
    }

    pub fn take_uploads(&self) -> Vec<UniformUpload> {
        std::mem::take(&mut *self.uploads.lock())
    }
}

impl Device for NullDevice {
    fn is_syntax_supported(&self, syntax: &str) -> bool {
        self.supported_syntaxes.is_empty() || self.supported_syntaxes.iter().any(|s| s == syntax)
    }

    fn pads_constants(&self) -> bool {
        self.pads_constants
    }

    fn create_program(
        &self,
        desc: &ProgramObjectDesc,
        code: &[u8],
        debug_name: &str,
    ) -> Result<ProgramObject, DeviceError> {
        if !self.is_syntax_supported(&desc.syntax) {
            return Err(DeviceError::UnsupportedSyntax(desc.syntax.clone()));
        }

        let id = self.next_program_id.fetch_add(1, Ordering::Relaxed);
        self.codes.lock().insert(id, code.to_vec());
        ze_verbose!("Created null program {} ({}) #{}", debug_name, desc.ty, id);
        Ok(ProgramObject::new(desc.clone(), Box::new(NullProgram { id })))
    }

    fn active_uniforms(&self, program: &ProgramObject) -> Vec<ActiveUniform> {
        Self::program_id(program)
            .and_then(|id| self.uniforms.lock().get(&id).cloned())
            .unwrap_or_default()
    }

    fn set_program_uniform(
        &self,
        program: &ProgramObject,
        location: UniformLocation,
        value: UniformValue,
    ) {
        if let Some(id) = Self::program_id(program) {
            self.uploads.lock().push(UniformUpload {
                program: id,
                location,
                value: value.into(),
            });
        }
    }

    fn uniform_block_index(&self, program: &ProgramObject, name: &str) -> Option<u32> {
        let id = Self::program_id(program)?;
        let blocks = self.uniform_blocks.lock();
        let index = blocks.get(&id)?.iter().position(|block| block == name)?;
        Some(index as u32)
    }

    fn create_uniform_buffer(
        &self,
        desc: &UniformBufferDesc,
        debug_name: &str,
    ) -> Result<UniformBuffer, DeviceError> {
        if desc.size_in_bytes == 0 {
            return Err(DeviceError::InvalidParameters);
        }

        ze_verbose!(
            "Created null uniform buffer {} ({} bytes, binding {})",
            debug_name,
            desc.size_in_bytes,
            desc.binding
        );
        Ok(UniformBuffer::new(desc.clone(), Box::new(NullUniformBuffer)))
    }

    fn bind_uniform_block(&self, program: &ProgramObject, block_index: u32, binding: u32) {
        if let Some(id) = Self::program_id(program) {
            self.block_bindings.lock().push(UniformBlockBinding {
                program: id,
                block_index,
                binding,
            });
        }
    }

    fn write_uniform_buffer(&self, buffer: &UniformBuffer, data: &[f32]) {
        let len = data.len().min(buffer.desc.size_in_bytes / std::mem::size_of::<f32>());
        self.buffer_writes.lock().push(UniformBufferWrite {
            binding: buffer.desc.binding,
            data: data[..len].to_vec(),
        });
    }
}
