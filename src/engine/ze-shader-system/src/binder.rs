use crate::constants::{ConstantDefinition, NamedConstants};
use crate::parameters::GpuProgramParameters;
use crate::Error;
use fnv::FnvHashMap;
use std::collections::hash_map::Entry;
use std::mem::size_of;
use std::sync::Arc;
use ze_core::{ze_error, ze_verbose};
use ze_gfx::backend::{
    Device, ProgramObject, UniformBuffer, UniformBufferDesc, UniformLocation, UniformValue,
};
use ze_gfx::{GpuParamVariability, GpuProgramType};

/// A constant of an attached program resolved to its device uniform location
#[derive(Clone)]
pub struct UniformReference {
    pub name: String,
    pub location: UniformLocation,
    pub stage: GpuProgramType,
    pub definition: ConstantDefinition,
    program: Arc<ProgramObject>,
}

struct AttachedProgram {
    stage: GpuProgramType,
    program: Arc<ProgramObject>,
    constants: Arc<NamedConstants>,
}

/// Pushes parameter values to the uniforms of a set of device programs, one per stage
#[derive(Default)]
pub struct UniformBinder {
    programs: Vec<AttachedProgram>,
    references: Option<Vec<UniformReference>>,
    uniform_buffers: FnvHashMap<String, UniformBuffer>,
}

impl UniformBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the program of `stage`, replacing any program previously attached to it
    pub fn attach(
        &mut self,
        stage: GpuProgramType,
        program: Arc<ProgramObject>,
        constants: Arc<NamedConstants>,
    ) {
        self.programs.retain(|attached| attached.stage != stage);
        self.programs.push(AttachedProgram {
            stage,
            program,
            constants,
        });
        self.references = None;
    }

    pub fn detach(&mut self, stage: GpuProgramType) -> bool {
        let count = self.programs.len();
        self.programs.retain(|attached| attached.stage != stage);
        let detached = self.programs.len() != count;
        if detached {
            self.references = None;
        }
        detached
    }

    pub fn is_attached(&self, stage: GpuProgramType) -> bool {
        self.programs.iter().any(|attached| attached.stage == stage)
    }

    /// Match the active uniforms of every attached program against its constants
    pub fn build_uniform_references(&mut self, device: &dyn Device) -> &[UniformReference] {
        let references = self
            .references
            .get_or_insert_with(|| Self::collect_references(&self.programs, device));
        references
    }

    fn collect_references(
        programs: &[AttachedProgram],
        device: &dyn Device,
    ) -> Vec<UniformReference> {
        let mut references = vec![];
        for attached in programs {
            for uniform in device.active_uniforms(&attached.program) {
                let name = uniform.name.strip_suffix("[0]").unwrap_or(&uniform.name);
                match attached.constants.get(name) {
                    Some(definition) => references.push(UniformReference {
                        name: name.to_string(),
                        location: uniform.location,
                        stage: attached.stage,
                        definition: *definition,
                        program: attached.program.clone(),
                    }),
                    None => ze_verbose!(
                        "Uniform {} of {} program has no matching constant",
                        name,
                        attached.stage
                    ),
                }
            }
        }
        references
    }

    /// Upload every constant of `stage` whose variability intersects `mask`
    pub fn update_uniforms(
        &mut self,
        device: &dyn Device,
        parameters: &GpuProgramParameters,
        mask: GpuParamVariability,
        stage: GpuProgramType,
    ) {
        for reference in self.build_uniform_references(device) {
            if reference.stage != stage {
                continue;
            }

            let variability = parameters
                .variability(&reference.name)
                .unwrap_or(reference.definition.variability);
            if !variability.intersects(mask) {
                continue;
            }

            match uniform_value(&reference.definition, parameters) {
                Some(value) => {
                    device.set_program_uniform(&reference.program, reference.location, value)
                }
                None => ze_error!(
                    "Cannot upload uniform {}: no value at physical index {}",
                    reference.name,
                    reference.definition.physical_index
                ),
            }
        }
    }

    /// Upload the pass iteration number as a single float. Returns false if no uniform holds it.
    pub fn update_pass_iteration_uniforms(
        &mut self,
        device: &dyn Device,
        parameters: &GpuProgramParameters,
    ) -> bool {
        let index = match parameters.pass_iteration_number_index() {
            Some(index) => index,
            None => return false,
        };

        let reference = self
            .build_uniform_references(device)
            .iter()
            .find(|reference| {
                reference.definition.is_float() && reference.definition.physical_index == index
            });

        match (reference, parameters.float_slice(index, 1)) {
            (Some(reference), Some(data)) => {
                device.set_program_uniform(
                    &reference.program,
                    reference.location,
                    UniformValue::Float {
                        components: 1,
                        count: 1,
                        data,
                    },
                );
                true
            }
            _ => false,
        }
    }

    /// Bind every shared parameter set of `parameters` to the uniform block of the same name in
    /// the attached programs and upload its values. Returns the number of blocks updated.
    pub fn update_uniform_blocks(
        &mut self,
        device: &dyn Device,
        parameters: &GpuProgramParameters,
    ) -> Result<usize, Error> {
        let mut updated = 0;
        for shared in parameters.shared_parameters() {
            let shared = shared.read();
            if shared.is_empty() {
                continue;
            }

            let blocks: Vec<(&Arc<ProgramObject>, u32)> = self
                .programs
                .iter()
                .filter_map(|attached| {
                    device
                        .uniform_block_index(&attached.program, shared.name())
                        .map(|block_index| (&attached.program, block_index))
                })
                .collect();
            if blocks.is_empty() {
                ze_verbose!("No attached program uses uniform block {}", shared.name());
                continue;
            }

            let buffer = Self::uniform_buffer(
                &mut self.uniform_buffers,
                device,
                shared.name(),
                shared.float_constants().len() * size_of::<f32>(),
            )?;
            for (program, block_index) in blocks {
                device.bind_uniform_block(program, block_index, buffer.desc.binding);
            }
            device.write_uniform_buffer(buffer, shared.float_constants());
            updated += 1;
        }

        Ok(updated)
    }

    /// Buffer of the block `name`, recreated on the same binding when it is too small
    fn uniform_buffer<'a>(
        buffers: &'a mut FnvHashMap<String, UniformBuffer>,
        device: &dyn Device,
        name: &str,
        size_in_bytes: usize,
    ) -> Result<&'a UniformBuffer, Error> {
        let next_binding = buffers.len() as u32;
        let create = |binding| {
            device
                .create_uniform_buffer(
                    &UniformBufferDesc {
                        size_in_bytes,
                        binding,
                    },
                    name,
                )
                .map_err(|source| Error::UniformBuffer {
                    name: name.to_string(),
                    source,
                })
        };

        Ok(match buffers.entry(name.to_string()) {
            Entry::Occupied(entry) if entry.get().desc.size_in_bytes >= size_in_bytes => {
                entry.into_mut()
            }
            Entry::Occupied(mut entry) => {
                let binding = entry.get().desc.binding;
                entry.insert(create(binding)?);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(create(next_binding)?),
        })
    }
}

/// Typed view of the current value of `definition`. Matrices are row-major.
pub fn uniform_value<'a>(
    definition: &ConstantDefinition,
    parameters: &'a GpuProgramParameters,
) -> Option<UniformValue<'a>> {
    let ty = definition.const_type;
    let index = definition.physical_index;
    let count = definition.array_size;

    if ty.is_sampler() {
        return Some(UniformValue::Int {
            components: 1,
            count: 1,
            data: parameters.int_slice(index, 1)?,
        });
    }

    if let Some((rows, columns)) = ty.matrix_dimensions() {
        return Some(if ty.is_double() {
            UniformValue::DoubleMatrix {
                rows,
                columns,
                count,
                transpose: true,
                data: parameters.double_slice(index, definition.size())?,
            }
        } else {
            UniformValue::FloatMatrix {
                rows,
                columns,
                count,
                transpose: true,
                data: parameters.float_slice(index, definition.size())?,
            }
        });
    }

    let components = ty.component_count()?;
    if ty.is_float() {
        Some(UniformValue::Float {
            components,
            count,
            data: parameters.float_slice(index, definition.size())?,
        })
    } else if ty.is_double() {
        Some(UniformValue::Double {
            components,
            count,
            data: parameters.double_slice(index, definition.size())?,
        })
    } else if ty.is_int() {
        Some(UniformValue::Int {
            components,
            count,
            data: parameters.int_slice(index, definition.size())?,
        })
    } else {
        None
    }
}
