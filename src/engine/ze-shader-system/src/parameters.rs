use crate::constants::{ConstantDefinition, NamedConstants};
use crate::shared_parameters::GpuSharedParameters;
use crate::Error;
use fnv::FnvHashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use ze_gfx::{GpuParamVariability, GpuParamVariabilityFlagBits};

/// Live constant values of a program, laid out as described by its `NamedConstants`
pub struct GpuProgramParameters {
    constants: Arc<NamedConstants>,
    float_constants: Vec<f32>,
    double_constants: Vec<f64>,
    int_constants: Vec<i32>,
    variabilities: FnvHashMap<String, GpuParamVariability>,
    pass_iteration_index: Option<usize>,
    shared_parameters: Vec<Arc<RwLock<GpuSharedParameters>>>,
}

impl GpuProgramParameters {
    /// Buffers cover both the reported buffer sizes and every definition, aliased register
    /// combiner constants can sit past the end of the float buffer
    pub fn new(constants: Arc<NamedConstants>) -> Self {
        let mut float_size = constants.float_buffer_size;
        let mut double_size = constants.double_buffer_size;
        let mut int_size = constants.int_buffer_size;
        for (_, definition) in constants.map.iter() {
            if definition.physical_index == usize::MAX {
                continue;
            }

            let end = definition.physical_index.saturating_add(definition.size());
            if definition.is_float() {
                float_size = float_size.max(end);
            } else if definition.is_double() {
                double_size = double_size.max(end);
            } else if definition.is_int() || definition.is_sampler() {
                int_size = int_size.max(end);
            }
        }

        Self {
            float_constants: vec![0.0; float_size],
            double_constants: vec![0.0; double_size],
            int_constants: vec![0; int_size],
            constants,
            variabilities: FnvHashMap::default(),
            pass_iteration_index: None,
            shared_parameters: vec![],
        }
    }

    pub fn named_constants(&self) -> &Arc<NamedConstants> {
        &self.constants
    }

    fn definition(&self, name: &str) -> Result<&ConstantDefinition, Error> {
        self.constants
            .get(name)
            .ok_or_else(|| Error::UnknownConstant(name.to_string()))
    }

    /// Write float values starting at the first slot of `name`. Values past the end of the
    /// constant are ignored.
    pub fn set_named_f32(&mut self, name: &str, values: &[f32]) -> Result<(), Error> {
        let definition = *self.definition(name)?;
        if !definition.is_float() {
            return Err(Error::ConstantTypeMismatch {
                name: name.to_string(),
                expected: "float",
            });
        }

        write_clamped(&mut self.float_constants, &definition, values);
        Ok(())
    }

    pub fn set_named_f64(&mut self, name: &str, values: &[f64]) -> Result<(), Error> {
        let definition = *self.definition(name)?;
        if !definition.is_double() {
            return Err(Error::ConstantTypeMismatch {
                name: name.to_string(),
                expected: "double",
            });
        }

        write_clamped(&mut self.double_constants, &definition, values);
        Ok(())
    }

    /// Ints and samplers
    pub fn set_named_i32(&mut self, name: &str, values: &[i32]) -> Result<(), Error> {
        let definition = *self.definition(name)?;
        if !(definition.is_int() || definition.is_sampler()) {
            return Err(Error::ConstantTypeMismatch {
                name: name.to_string(),
                expected: "int",
            });
        }

        write_clamped(&mut self.int_constants, &definition, values);
        Ok(())
    }

    /// Write directly into the float buffer
    pub fn write_raw_f32(&mut self, physical_index: usize, values: &[f32]) {
        let end = physical_index
            .checked_add(values.len())
            .map_or(self.float_constants.len(), |end| end.min(self.float_constants.len()));
        if physical_index < end {
            self.float_constants[physical_index..end]
                .copy_from_slice(&values[..end - physical_index]);
        }
    }

    pub fn float_slice(&self, physical_index: usize, len: usize) -> Option<&[f32]> {
        self.float_constants
            .get(physical_index..physical_index.checked_add(len)?)
    }

    pub fn double_slice(&self, physical_index: usize, len: usize) -> Option<&[f64]> {
        self.double_constants
            .get(physical_index..physical_index.checked_add(len)?)
    }

    pub fn int_slice(&self, physical_index: usize, len: usize) -> Option<&[i32]> {
        self.int_constants
            .get(physical_index..physical_index.checked_add(len)?)
    }

    pub fn float_constants(&self) -> &[f32] {
        &self.float_constants
    }

    pub fn double_constants(&self) -> &[f64] {
        &self.double_constants
    }

    pub fn int_constants(&self) -> &[i32] {
        &self.int_constants
    }

    /// Override the variability of a constant for this parameter set
    pub fn set_variability(
        &mut self,
        name: &str,
        variability: GpuParamVariability,
    ) -> Result<(), Error> {
        self.definition(name)?;
        self.variabilities.insert(name.to_string(), variability);
        Ok(())
    }

    pub fn variability(&self, name: &str) -> Option<GpuParamVariability> {
        self.variabilities
            .get(name)
            .copied()
            .or_else(|| self.constants.get(name).map(|definition| definition.variability))
    }

    /// Make `name` hold the pass iteration number, starting at 0
    pub fn set_pass_iteration_constant(&mut self, name: &str) -> Result<(), Error> {
        let definition = *self.definition(name)?;
        if !definition.is_float() {
            return Err(Error::ConstantTypeMismatch {
                name: name.to_string(),
                expected: "float",
            });
        }

        self.pass_iteration_index = Some(definition.physical_index);
        self.variabilities.insert(
            name.to_string(),
            GpuParamVariabilityFlagBits::PassIterationNumber.into(),
        );
        self.write_raw_f32(definition.physical_index, &[0.0]);
        Ok(())
    }

    pub fn has_pass_iteration_number(&self) -> bool {
        self.pass_iteration_index.is_some()
    }

    /// Physical index of the pass iteration number in the float buffer
    pub fn pass_iteration_number_index(&self) -> Option<usize> {
        self.pass_iteration_index
    }

    /// Use `shared` for the uniform block of the same name, replacing a set with that name
    pub fn add_shared_parameters(&mut self, shared: Arc<RwLock<GpuSharedParameters>>) {
        let name = shared.read().name().to_string();
        self.remove_shared_parameters(&name);
        self.shared_parameters.push(shared);
    }

    pub fn remove_shared_parameters(&mut self, name: &str) -> bool {
        let count = self.shared_parameters.len();
        self.shared_parameters
            .retain(|shared| shared.read().name() != name);
        self.shared_parameters.len() != count
    }

    pub fn shared_parameters(&self) -> &[Arc<RwLock<GpuSharedParameters>>] {
        &self.shared_parameters
    }

    pub fn increment_pass_iteration_number(&mut self) {
        if let Some(value) = self
            .pass_iteration_index
            .and_then(|index| self.float_constants.get_mut(index))
        {
            *value += 1.0;
        }
    }
}

pub(crate) fn write_clamped<T: Copy>(
    buffer: &mut [T],
    definition: &ConstantDefinition,
    values: &[T],
) {
    let start = definition.physical_index;
    let len = values.len().min(definition.size());
    let end = start.saturating_add(len).min(buffer.len());
    if start < end {
        buffer[start..end].copy_from_slice(&values[..end - start]);
    }
}
