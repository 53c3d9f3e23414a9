use crate::constants::{ConstantDefinition, ConstantDefinitionMap};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use ze_gfx::GpuParamVariability;

/// Storage used by one logical slot
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LogicalIndexUse {
    pub physical_index: usize,
    pub current_size: usize,
    pub variability: GpuParamVariability,
}

#[derive(Default)]
struct LogicalMapInner {
    uses: BTreeMap<usize, Vec<LogicalIndexUse>>,
    buffer_size: usize,
}

/// Maps compiler-assigned logical slots to ranges of a flat constant buffer.
///
/// Entries are only ever appended. The buffer size is always the sum of the sizes of all entries.
/// Several entries can share one logical index when the hardware aliases them (register
/// combiner constants).
#[derive(Default)]
pub struct LogicalToPhysicalMap {
    inner: Mutex<LogicalMapInner>,
}

impl LogicalToPhysicalMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `size` slots at the end of the buffer and return their physical index
    pub fn allocate(
        &self,
        logical_index: usize,
        size: usize,
        variability: GpuParamVariability,
    ) -> usize {
        let mut inner = self.inner.lock();
        let physical_index = inner.buffer_size;
        inner.buffer_size += size;
        inner
            .uses
            .entry(logical_index)
            .or_default()
            .push(LogicalIndexUse {
                physical_index,
                current_size: size,
                variability,
            });
        physical_index
    }

    /// Record a use at a physical index chosen by the caller. The buffer still grows by `size`.
    pub fn insert_at(
        &self,
        logical_index: usize,
        physical_index: usize,
        size: usize,
        variability: GpuParamVariability,
    ) {
        let mut inner = self.inner.lock();
        inner.buffer_size += size;
        inner
            .uses
            .entry(logical_index)
            .or_default()
            .push(LogicalIndexUse {
                physical_index,
                current_size: size,
                variability,
            });
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.lock().buffer_size
    }

    /// First use recorded for `logical_index`
    pub fn get(&self, logical_index: usize) -> Option<LogicalIndexUse> {
        self.inner
            .lock()
            .uses
            .get(&logical_index)
            .and_then(|uses| uses.first().copied())
    }

    pub fn uses(&self, logical_index: usize) -> Vec<LogicalIndexUse> {
        self.inner
            .lock()
            .uses
            .get(&logical_index)
            .cloned()
            .unwrap_or_default()
    }

    /// Every use, ordered by logical index
    pub fn entries(&self) -> Vec<(usize, LogicalIndexUse)> {
        self.inner
            .lock()
            .uses
            .iter()
            .flat_map(|(logical_index, uses)| uses.iter().map(move |use_| (*logical_index, *use_)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().uses.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().uses.is_empty()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.uses.clear();
        inner.buffer_size = 0;
    }
}

/// The logical maps of a program, one per storage type
#[derive(Default)]
pub struct LogicalMaps {
    pub float: LogicalToPhysicalMap,
    pub double: LogicalToPhysicalMap,
    pub int: LogicalToPhysicalMap,
}

impl LogicalMaps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map holding the storage of `definition`. Samplers and other non-float types use the int map.
    pub fn for_definition(&self, definition: &ConstantDefinition) -> &LogicalToPhysicalMap {
        if definition.is_float() {
            &self.float
        } else if definition.is_double() {
            &self.double
        } else {
            &self.int
        }
    }

    /// Rebuild the maps of an already laid out set of definitions
    pub fn from_definitions(definitions: &ConstantDefinitionMap) -> Self {
        let maps = Self::default();
        for (_, definition) in definitions.iter() {
            maps.for_definition(definition).insert_at(
                definition.logical_index,
                definition.physical_index,
                definition.size(),
                definition.variability,
            );
        }
        maps
    }
}
