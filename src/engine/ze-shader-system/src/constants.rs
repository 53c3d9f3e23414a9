use fnv::FnvHashMap;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use ze_gfx::{GpuParamVariability, GpuParamVariabilityFlagBits};

/// Engine-side type of a program constant
///
/// Matrices are named `MatrixRxC` with R rows and C columns.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u32)]
pub enum GpuConstantType {
    Float1 = 1,
    Float2 = 2,
    Float3 = 3,
    Float4 = 4,
    Sampler1D = 5,
    Sampler2D = 6,
    Sampler3D = 7,
    SamplerCube = 8,
    SamplerRect = 9,
    Sampler1DShadow = 10,
    Sampler2DShadow = 11,
    Sampler2DArray = 12,
    Matrix2x2 = 13,
    Matrix2x3 = 14,
    Matrix2x4 = 15,
    Matrix3x2 = 16,
    Matrix3x3 = 17,
    Matrix3x4 = 18,
    Matrix4x2 = 19,
    Matrix4x3 = 20,
    Matrix4x4 = 21,
    Int1 = 22,
    Int2 = 23,
    Int3 = 24,
    Int4 = 25,
    Double1 = 27,
    Double2 = 28,
    Double3 = 29,
    Double4 = 30,
    MatrixDouble2x2 = 31,
    MatrixDouble2x3 = 32,
    MatrixDouble2x4 = 33,
    MatrixDouble3x2 = 34,
    MatrixDouble3x3 = 35,
    MatrixDouble3x4 = 36,
    MatrixDouble4x2 = 37,
    MatrixDouble4x3 = 38,
    MatrixDouble4x4 = 39,
    Unknown = 99,
}

impl GpuConstantType {
    pub fn from_tag(tag: u32) -> Option<Self> {
        Self::from_u32(tag)
    }

    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn float_matrix(rows: u8, columns: u8) -> Self {
        match (rows, columns) {
            (2, 2) => GpuConstantType::Matrix2x2,
            (2, 3) => GpuConstantType::Matrix2x3,
            (2, 4) => GpuConstantType::Matrix2x4,
            (3, 2) => GpuConstantType::Matrix3x2,
            (3, 3) => GpuConstantType::Matrix3x3,
            (3, 4) => GpuConstantType::Matrix3x4,
            (4, 2) => GpuConstantType::Matrix4x2,
            (4, 3) => GpuConstantType::Matrix4x3,
            (4, 4) => GpuConstantType::Matrix4x4,
            _ => GpuConstantType::Unknown,
        }
    }

    /// Float scalars, vectors and matrices
    pub fn is_float(self) -> bool {
        matches!(
            self,
            GpuConstantType::Float1
                | GpuConstantType::Float2
                | GpuConstantType::Float3
                | GpuConstantType::Float4
        ) || (self.matrix_dimensions().is_some() && !self.is_double())
    }

    pub fn is_double(self) -> bool {
        matches!(
            self,
            GpuConstantType::Double1
                | GpuConstantType::Double2
                | GpuConstantType::Double3
                | GpuConstantType::Double4
                | GpuConstantType::MatrixDouble2x2
                | GpuConstantType::MatrixDouble2x3
                | GpuConstantType::MatrixDouble2x4
                | GpuConstantType::MatrixDouble3x2
                | GpuConstantType::MatrixDouble3x3
                | GpuConstantType::MatrixDouble3x4
                | GpuConstantType::MatrixDouble4x2
                | GpuConstantType::MatrixDouble4x3
                | GpuConstantType::MatrixDouble4x4
        )
    }

    pub fn is_int(self) -> bool {
        matches!(
            self,
            GpuConstantType::Int1
                | GpuConstantType::Int2
                | GpuConstantType::Int3
                | GpuConstantType::Int4
        )
    }

    pub fn is_sampler(self) -> bool {
        matches!(
            self,
            GpuConstantType::Sampler1D
                | GpuConstantType::Sampler2D
                | GpuConstantType::Sampler3D
                | GpuConstantType::SamplerCube
                | GpuConstantType::SamplerRect
                | GpuConstantType::Sampler1DShadow
                | GpuConstantType::Sampler2DShadow
                | GpuConstantType::Sampler2DArray
        )
    }

    /// (rows, columns) of matrix types
    pub fn matrix_dimensions(self) -> Option<(u8, u8)> {
        match self {
            GpuConstantType::Matrix2x2 | GpuConstantType::MatrixDouble2x2 => Some((2, 2)),
            GpuConstantType::Matrix2x3 | GpuConstantType::MatrixDouble2x3 => Some((2, 3)),
            GpuConstantType::Matrix2x4 | GpuConstantType::MatrixDouble2x4 => Some((2, 4)),
            GpuConstantType::Matrix3x2 | GpuConstantType::MatrixDouble3x2 => Some((3, 2)),
            GpuConstantType::Matrix3x3 | GpuConstantType::MatrixDouble3x3 => Some((3, 3)),
            GpuConstantType::Matrix3x4 | GpuConstantType::MatrixDouble3x4 => Some((3, 4)),
            GpuConstantType::Matrix4x2 | GpuConstantType::MatrixDouble4x2 => Some((4, 2)),
            GpuConstantType::Matrix4x3 | GpuConstantType::MatrixDouble4x3 => Some((4, 3)),
            GpuConstantType::Matrix4x4 | GpuConstantType::MatrixDouble4x4 => Some((4, 4)),
            _ => None,
        }
    }

    /// Component count of scalars and vectors. Samplers count as one int.
    pub fn component_count(self) -> Option<u8> {
        match self {
            GpuConstantType::Float1 | GpuConstantType::Int1 | GpuConstantType::Double1 => Some(1),
            GpuConstantType::Float2 | GpuConstantType::Int2 | GpuConstantType::Double2 => Some(2),
            GpuConstantType::Float3 | GpuConstantType::Int3 | GpuConstantType::Double3 => Some(3),
            GpuConstantType::Float4 | GpuConstantType::Int4 | GpuConstantType::Double4 => Some(4),
            ty if ty.is_sampler() => Some(1),
            _ => None,
        }
    }

    /// Slots taken by one element of this type.
    ///
    /// With `pad_to_multiples_of_4` every vector takes a full 4-component register and every
    /// matrix row is padded to 4 components.
    pub fn element_size(self, pad_to_multiples_of_4: bool) -> usize {
        if let Some((rows, columns)) = self.matrix_dimensions() {
            return if pad_to_multiples_of_4 {
                rows as usize * 4
            } else {
                rows as usize * columns as usize
            };
        }

        if pad_to_multiples_of_4 {
            return 4;
        }

        match self.component_count() {
            Some(count) => count as usize,
            None => 4,
        }
    }
}

/// One constant exposed by a compiled program
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ConstantDefinition {
    pub const_type: GpuConstantType,
    /// Offset of the first slot in the float, double or int buffer
    pub physical_index: usize,
    /// Slot assigned by the compiler
    pub logical_index: usize,
    /// Slots per array element, padding included
    pub element_size: usize,
    pub array_size: usize,
    pub variability: GpuParamVariability,
}

impl Default for ConstantDefinition {
    fn default() -> Self {
        Self {
            const_type: GpuConstantType::Unknown,
            physical_index: usize::MAX,
            logical_index: 0,
            element_size: 0,
            array_size: 1,
            variability: GpuParamVariabilityFlagBits::Global.into(),
        }
    }
}

impl ConstantDefinition {
    pub fn is_float(&self) -> bool {
        self.const_type.is_float()
    }

    pub fn is_double(&self) -> bool {
        self.const_type.is_double()
    }

    pub fn is_int(&self) -> bool {
        self.const_type.is_int()
    }

    pub fn is_sampler(&self) -> bool {
        self.const_type.is_sampler()
    }

    /// Total slots used in the backing buffer
    pub fn size(&self) -> usize {
        self.element_size * self.array_size
    }
}

/// Constants of a program by name, iterated in insertion order
#[derive(Clone, Debug, Default)]
pub struct ConstantDefinitionMap {
    entries: Vec<(String, ConstantDefinition)>,
    indices: FnvHashMap<String, usize>,
}

impl PartialEq for ConstantDefinitionMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl ConstantDefinitionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new definition. The first definition of a name wins: returns false and leaves
    /// the map untouched if `name` is already present.
    pub fn insert(&mut self, name: impl Into<String>, definition: ConstantDefinition) -> bool {
        let name = name.into();
        if self.indices.contains_key(&name) {
            return false;
        }

        self.indices.insert(name.clone(), self.entries.len());
        self.entries.push((name, definition));
        true
    }

    pub fn get(&self, name: &str) -> Option<&ConstantDefinition> {
        self.indices
            .get(name)
            .map(|index| &self.entries[*index].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConstantDefinition)> {
        self.entries
            .iter()
            .map(|(name, definition)| (name.as_str(), definition))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Public constant table of a ready program
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NamedConstants {
    pub map: ConstantDefinitionMap,
    pub float_buffer_size: usize,
    pub double_buffer_size: usize,
    pub int_buffer_size: usize,
}

impl NamedConstants {
    /// Past this array size only the `name[0]` accessor is generated
    pub const MAX_GENERATED_ARRAY_ENTRIES: usize = 16;

    /// Build the table from the parameters of a program, adding `name[i]` accessors for arrays
    pub fn new(
        parameters: &ConstantDefinitionMap,
        float_buffer_size: usize,
        double_buffer_size: usize,
        int_buffer_size: usize,
    ) -> Self {
        let mut constants = Self {
            map: parameters.clone(),
            float_buffer_size,
            double_buffer_size,
            int_buffer_size,
        };

        for (name, definition) in parameters.iter() {
            if definition.array_size > 1 {
                constants.generate_array_entries(name, definition);
            }
        }

        constants
    }

    /// Accessor entries share the storage of their base definition and never grow the buffers
    pub fn generate_array_entries(&mut self, name: &str, base: &ConstantDefinition) {
        let mut element = ConstantDefinition {
            array_size: 1,
            ..*base
        };

        let count = if base.array_size <= Self::MAX_GENERATED_ARRAY_ENTRIES {
            base.array_size
        } else {
            1
        };

        for i in 0..count {
            self.map.insert(format!("{}[{}]", name, i), element);
            element.physical_index += element.element_size;
        }
    }

    pub fn get(&self, name: &str) -> Option<&ConstantDefinition> {
        self.map.get(name)
    }
}
