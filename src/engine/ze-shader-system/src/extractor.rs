use crate::classifier::ParameterClassifier;
use crate::constants::{ConstantDefinition, ConstantDefinitionMap, GpuConstantType};
use crate::logical_map::LogicalMaps;
use crate::Error;
use ze_core::ze_warn;
use ze_shader_compiler::{
    CompiledProgram, CompilerParameter, CompilerType, ParameterDirection, ParameterResource,
    ParameterScope, ParameterVariability,
};

pub struct ExtractedParameters {
    pub parameters: ConstantDefinitionMap,
    pub logical_maps: LogicalMaps,
    /// Uniforms dropped because their type has no engine counterpart
    pub skipped: Vec<String>,
}

/// Walks the parameter tree of a compiled program and lays out its uniforms
pub struct ParameterExtractor<'a> {
    program_name: &'a str,
    classifier: ParameterClassifier,
    parameters: ConstantDefinitionMap,
    logical_maps: LogicalMaps,
    skipped: Vec<String>,
}

impl<'a> ParameterExtractor<'a> {
    pub fn new(program_name: &'a str, classifier: ParameterClassifier) -> Self {
        Self {
            program_name,
            classifier,
            parameters: ConstantDefinitionMap::new(),
            logical_maps: LogicalMaps::new(),
            skipped: vec![],
        }
    }

    /// Program scope first, then global scope
    pub fn extract(mut self, program: &dyn CompiledProgram) -> ExtractedParameters {
        for scope in [ParameterScope::Program, ParameterScope::Global] {
            for parameter in program.parameters(scope) {
                self.visit(parameter, 1);
            }
        }

        ExtractedParameters {
            parameters: self.parameters,
            logical_maps: self.logical_maps,
            skipped: self.skipped,
        }
    }

    fn visit(&mut self, parameter: &CompilerParameter, context_array_size: usize) {
        if parameter.variability != ParameterVariability::Uniform
            || parameter.ty.is_sampler()
            || parameter.direction == ParameterDirection::Out
            || !parameter.referenced
        {
            return;
        }

        match parameter.ty {
            CompilerType::Struct => {
                for member in &parameter.members {
                    self.visit(member, 1);
                }
            }
            CompilerType::Array => {
                if let Some(element) = parameter.element() {
                    self.visit(element, parameter.array_size.max(1));
                }
            }
            _ => self.add_leaf(parameter, context_array_size),
        }
    }

    fn add_leaf(&mut self, parameter: &CompilerParameter, array_size: usize) {
        let name = parameter
            .name
            .strip_suffix("[0]")
            .unwrap_or(&parameter.name);

        if self.parameters.contains(name) {
            return;
        }

        let register_combiner = matches!(
            parameter.resource,
            ParameterResource::CombinerStageConst0 | ParameterResource::CombinerStageConst1
        );

        let classification = self.classifier.classify(&parameter.ty, register_combiner);
        if classification.const_type == GpuConstantType::Unknown {
            ze_warn!(
                "{}",
                Error::ParameterClassificationUnknown {
                    program: self.program_name.to_string(),
                    parameter: name.to_string(),
                    ty: parameter.ty.to_string(),
                }
            );
            self.skipped.push(name.to_string());
            return;
        }

        let mut definition = ConstantDefinition {
            const_type: classification.const_type,
            logical_index: parameter.resource_index,
            element_size: classification.element_size,
            array_size,
            ..Default::default()
        };

        let map = self.logical_maps.for_definition(&definition);
        definition.physical_index = match parameter.resource {
            ParameterResource::CombinerStageConst0 | ParameterResource::CombinerStageConst1 => {
                let physical_index = parameter.resource_index * 2
                    + (parameter.resource == ParameterResource::CombinerStageConst1) as usize;
                map.insert_at(
                    definition.logical_index,
                    physical_index,
                    definition.size(),
                    definition.variability,
                );
                physical_index
            }
            ParameterResource::Register => map.allocate(
                definition.logical_index,
                definition.size(),
                definition.variability,
            ),
        };

        self.parameters.insert(name, definition);
    }
}
