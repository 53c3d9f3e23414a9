use crate::constants::{ConstantDefinition, ConstantDefinitionMap, GpuConstantType};
use crate::parameters::write_clamped;
use crate::Error;

/// A named set of float constants shared by several programs.
///
/// The set is uploaded to the uniform block of the same name. Constants are laid out in
/// declaration order, every vector and matrix row taking a full 4-component slot.
pub struct GpuSharedParameters {
    name: String,
    constants: ConstantDefinitionMap,
    float_constants: Vec<f32>,
}

impl GpuSharedParameters {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            constants: ConstantDefinitionMap::new(),
            float_constants: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a constant at the end of the block
    pub fn add_constant(
        &mut self,
        name: &str,
        const_type: GpuConstantType,
        array_size: usize,
    ) -> Result<(), Error> {
        if !const_type.is_float() {
            return Err(Error::ConstantTypeMismatch {
                name: name.to_string(),
                expected: "float",
            });
        }

        if self.constants.get(name).is_some() {
            return Err(Error::DuplicateConstant(name.to_string()));
        }

        let definition = ConstantDefinition {
            const_type,
            physical_index: self.float_constants.len(),
            logical_index: self.constants.len(),
            element_size: const_type.element_size(true),
            array_size: array_size.max(1),
            ..Default::default()
        };
        self.float_constants
            .resize(self.float_constants.len() + definition.size(), 0.0);
        self.constants.insert(name, definition);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ConstantDefinition> {
        self.constants.get(name)
    }

    pub fn constants(&self) -> &ConstantDefinitionMap {
        &self.constants
    }

    pub fn set_named_f32(&mut self, name: &str, values: &[f32]) -> Result<(), Error> {
        let definition = *self
            .constants
            .get(name)
            .ok_or_else(|| Error::UnknownConstant(name.to_string()))?;
        write_clamped(&mut self.float_constants, &definition, values);
        Ok(())
    }

    pub fn float_constants(&self) -> &[f32] {
        &self.float_constants
    }

    pub fn is_empty(&self) -> bool {
        self.float_constants.is_empty()
    }
}
