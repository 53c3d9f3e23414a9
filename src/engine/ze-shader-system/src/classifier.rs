use crate::constants::GpuConstantType;
use ze_gfx::backend::Device;
use ze_shader_compiler::CompilerType;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub const_type: GpuConstantType,
    pub element_size: usize,
}

/// Turns compiler types into engine constant types
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ParameterClassifier {
    pad_to_multiples_of_4: bool,
}

impl ParameterClassifier {
    pub fn new(pad_to_multiples_of_4: bool) -> Self {
        Self {
            pad_to_multiples_of_4,
        }
    }

    pub fn for_device(device: &dyn Device) -> Self {
        Self::new(device.pads_constants())
    }

    pub fn classify(&self, ty: &CompilerType, register_combiner: bool) -> Classification {
        // Combiner constants are single float registers whatever their declared type
        if register_combiner {
            return Classification {
                const_type: GpuConstantType::Float1,
                element_size: 1,
            };
        }

        let const_type = match ty {
            CompilerType::Float
            | CompilerType::Float1
            | CompilerType::Half
            | CompilerType::Half1 => GpuConstantType::Float1,
            CompilerType::Float2 | CompilerType::Half2 => GpuConstantType::Float2,
            CompilerType::Float3 | CompilerType::Half3 => GpuConstantType::Float3,
            CompilerType::Float4 | CompilerType::Half4 => GpuConstantType::Float4,
            CompilerType::FloatMatrix { rows, columns }
            | CompilerType::HalfMatrix { rows, columns } => {
                GpuConstantType::float_matrix(*rows, *columns)
            }
            CompilerType::Int | CompilerType::Int1 => GpuConstantType::Int1,
            CompilerType::Int2 => GpuConstantType::Int2,
            CompilerType::Int3 => GpuConstantType::Int3,
            CompilerType::Int4 => GpuConstantType::Int4,
            _ => GpuConstantType::Unknown,
        };

        Classification {
            const_type,
            element_size: const_type.element_size(self.pad_to_multiples_of_4),
        }
    }
}
