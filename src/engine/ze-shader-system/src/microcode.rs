//! Binary cache of compiled programs
//!
//! A microcode blob holds the program binary followed by its constant definitions:
//!
//! ```text
//! [usize binary length][binary]
//! [usize constant count]
//! constant count times: [usize name length][name][constant definition record]
//! ```
//!
//! Integers are native-endian, blobs are only meant to be read back on the machine that wrote them.

use crate::constants::{ConstantDefinition, ConstantDefinitionMap, GpuConstantType};
use crate::Error;
use enumflags2::BitFlags;
use fnv::FnvHashMap;
use parking_lot::RwLock;
use std::io::{Read, Write};
use std::mem::size_of;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use ze_core::ze_verbose;

/// `[u32 type][u32 variability][usize physical][usize logical][usize element size][usize array size]`
pub const CONSTANT_DEFINITION_RECORD_SIZE: usize = 2 * size_of::<u32>() + 4 * size_of::<usize>();

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum MicrocodeError {
    #[error("truncated data: {needed} bytes needed at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("name at offset {0} is not valid UTF-8")]
    InvalidName(usize),

    #[error("unknown constant type {0}")]
    UnknownConstantType(u32),

    #[error("unknown variability bits {0:#x}")]
    UnknownVariability(u32),

    #[error("constant '{0}' does not fit in a constant buffer")]
    InvalidLayout(String),
}

pub type Microcode = Arc<[u8]>;

/// Cache key of a program: the uppercase language name, an underscore and the program name
pub fn microcode_cache_key(language: &str, program_name: &str) -> String {
    format!("{}_{}", language.to_uppercase(), program_name)
}

pub fn encoded_len(program_string: &[u8], parameters: &ConstantDefinitionMap) -> usize {
    let names: usize = parameters.names().map(str::len).sum();
    size_of::<usize>() * 2
        + program_string.len()
        + parameters.len() * (size_of::<usize>() + CONSTANT_DEFINITION_RECORD_SIZE)
        + names
}

pub fn encode_microcode(program_string: &[u8], parameters: &ConstantDefinitionMap) -> Vec<u8> {
    let mut blob = Vec::with_capacity(encoded_len(program_string, parameters));
    blob.extend_from_slice(&program_string.len().to_ne_bytes());
    blob.extend_from_slice(program_string);
    blob.extend_from_slice(&parameters.len().to_ne_bytes());

    for (name, definition) in parameters.iter() {
        blob.extend_from_slice(&name.len().to_ne_bytes());
        blob.extend_from_slice(name.as_bytes());
        write_definition(&mut blob, definition);
    }

    blob
}

fn write_definition(blob: &mut Vec<u8>, definition: &ConstantDefinition) {
    blob.extend_from_slice(&definition.const_type.tag().to_ne_bytes());
    blob.extend_from_slice(&definition.variability.bits().to_ne_bytes());
    blob.extend_from_slice(&definition.physical_index.to_ne_bytes());
    blob.extend_from_slice(&definition.logical_index.to_ne_bytes());
    blob.extend_from_slice(&definition.element_size.to_ne_bytes());
    blob.extend_from_slice(&definition.array_size.to_ne_bytes());
}

pub fn decode_microcode(blob: &[u8]) -> Result<(Vec<u8>, ConstantDefinitionMap), MicrocodeError> {
    let mut reader = BlobReader::new(blob);

    let binary_len = reader.read_usize()?;
    let program_string = reader.take(binary_len)?.to_vec();

    let count = reader.read_usize()?;
    let mut parameters = ConstantDefinitionMap::new();
    for _ in 0..count {
        let name_len = reader.read_usize()?;
        let name_offset = reader.offset;
        let name = std::str::from_utf8(reader.take(name_len)?)
            .map_err(|_| MicrocodeError::InvalidName(name_offset))?
            .to_string();

        let tag = reader.read_u32()?;
        let const_type =
            GpuConstantType::from_tag(tag).ok_or(MicrocodeError::UnknownConstantType(tag))?;
        let bits = reader.read_u32()?;
        let variability =
            BitFlags::from_bits(bits).map_err(|_| MicrocodeError::UnknownVariability(bits))?;

        let definition = ConstantDefinition {
            const_type,
            variability,
            physical_index: reader.read_usize()?,
            logical_index: reader.read_usize()?,
            element_size: reader.read_usize()?,
            array_size: reader.read_usize()?,
        };
        if definition
            .element_size
            .checked_mul(definition.array_size)
            .and_then(|size| size.checked_add(definition.physical_index))
            .is_none()
        {
            return Err(MicrocodeError::InvalidLayout(name));
        }
        parameters.insert(name, definition);
    }

    validate_layout(&parameters)?;
    Ok((program_string, parameters))
}

/// Upper bound of general combiner stages exposed by register combiner hardware
pub const MAX_COMBINER_STAGES: usize = 8;

/// Every placed constant must fit in the buffer rebuilt from the definitions. Single float
/// combiner constants are the exception, they live at `2 * stage` or `2 * stage + 1`.
pub fn validate_layout(parameters: &ConstantDefinitionMap) -> Result<(), MicrocodeError> {
    let mut float_size = 0usize;
    let mut double_size = 0usize;
    let mut int_size = 0usize;
    for (name, definition) in parameters.iter() {
        let total = storage_size(definition, &mut float_size, &mut double_size, &mut int_size);
        *total = total
            .checked_add(definition.size())
            .ok_or_else(|| MicrocodeError::InvalidLayout(name.to_string()))?;
    }

    for (name, definition) in parameters.iter() {
        if definition.physical_index == usize::MAX || is_combiner_constant(definition) {
            continue;
        }

        let total = *storage_size(definition, &mut float_size, &mut double_size, &mut int_size);
        let fits = definition
            .physical_index
            .checked_add(definition.size())
            .map_or(false, |end| end <= total);
        if !fits {
            return Err(MicrocodeError::InvalidLayout(name.to_string()));
        }
    }

    Ok(())
}

fn storage_size<'a>(
    definition: &ConstantDefinition,
    float_size: &'a mut usize,
    double_size: &'a mut usize,
    int_size: &'a mut usize,
) -> &'a mut usize {
    if definition.is_float() {
        float_size
    } else if definition.is_double() {
        double_size
    } else {
        int_size
    }
}

fn is_combiner_constant(definition: &ConstantDefinition) -> bool {
    definition.const_type == GpuConstantType::Float1
        && definition.size() == 1
        && definition.logical_index < MAX_COMBINER_STAGES
        && definition.physical_index / 2 == definition.logical_index
}

struct BlobReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> BlobReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], MicrocodeError> {
        let available = self.data.len() - self.offset;
        if len > available {
            return Err(MicrocodeError::Truncated {
                offset: self.offset,
                needed: len,
                available,
            });
        }

        let bytes = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    fn read_usize(&mut self) -> Result<usize, MicrocodeError> {
        let mut bytes = [0; size_of::<usize>()];
        bytes.copy_from_slice(self.take(size_of::<usize>())?);
        Ok(usize::from_ne_bytes(bytes))
    }

    fn read_u32(&mut self) -> Result<u32, MicrocodeError> {
        let mut bytes = [0; size_of::<u32>()];
        bytes.copy_from_slice(self.take(size_of::<u32>())?);
        Ok(u32::from_ne_bytes(bytes))
    }

    fn read_u32_le(&mut self) -> Result<u32, MicrocodeError> {
        let mut bytes = [0; size_of::<u32>()];
        bytes.copy_from_slice(self.take(size_of::<u32>())?);
        Ok(u32::from_le_bytes(bytes))
    }
}

/// Compiled programs of the session, keyed by `microcode_cache_key`
pub struct MicrocodeCache {
    entries: RwLock<FnvHashMap<String, Microcode>>,
    use_cache: AtomicBool,
    save_to_cache: AtomicBool,
    dirty: AtomicBool,
}

impl Default for MicrocodeCache {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl MicrocodeCache {
    pub fn new(use_cache: bool, save_to_cache: bool) -> Self {
        Self {
            entries: RwLock::default(),
            use_cache: AtomicBool::new(use_cache),
            save_to_cache: AtomicBool::new(save_to_cache),
            dirty: AtomicBool::new(false),
        }
    }

    /// Whether programs look for their microcode before compiling
    pub fn use_cache(&self) -> bool {
        self.use_cache.load(Ordering::Relaxed)
    }

    pub fn set_use_cache(&self, use_cache: bool) {
        self.use_cache.store(use_cache, Ordering::Relaxed);
    }

    /// Whether freshly compiled programs store their microcode
    pub fn save_to_cache(&self) -> bool {
        self.save_to_cache.load(Ordering::Relaxed)
    }

    pub fn set_save_to_cache(&self, save_to_cache: bool) {
        self.save_to_cache.store(save_to_cache, Ordering::Relaxed);
    }

    /// True when entries were added since the cache was last saved or loaded
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    pub fn is_available(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<Microcode> {
        self.entries.read().get(key).cloned()
    }

    /// Stored blobs are never modified, a new blob for the same key replaces the entry
    pub fn insert(&self, key: impl Into<String>, microcode: Vec<u8>) {
        let key = key.into();
        ze_verbose!("Caching microcode {} ({} bytes)", key, microcode.len());
        self.entries.write().insert(key, Arc::from(microcode));
        self.dirty.store(true, Ordering::Relaxed);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
        self.dirty.store(false, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Write every entry, sorted by key:
    /// `[u32 count]` then per entry `[u32 key length][key][u32 blob length][blob]`, little-endian
    pub fn save(&self, writer: &mut dyn Write) -> Result<(), Error> {
        let entries = self.entries.read();
        let mut keys: Vec<&String> = entries.keys().collect();
        keys.sort();

        writer.write_all(&stream_len(keys.len(), "entry count")?.to_le_bytes())?;
        for key in keys {
            let microcode = &entries[key];
            writer.write_all(&stream_len(key.len(), key)?.to_le_bytes())?;
            writer.write_all(key.as_bytes())?;
            writer.write_all(&stream_len(microcode.len(), key)?.to_le_bytes())?;
            writer.write_all(microcode)?;
        }
        writer.flush()?;

        self.dirty.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// Merge entries from a stream written by `save`, returns the number of entries read
    pub fn load(&self, reader: &mut dyn Read) -> Result<usize, Error> {
        let mut data = vec![];
        reader.read_to_end(&mut data)?;

        let mut reader = BlobReader::new(&data);
        let count = reader.read_u32_le()? as usize;
        let mut loaded = Vec::with_capacity(count.min(data.len() / MIN_STREAM_ENTRY_SIZE));
        for _ in 0..count {
            let key_len = reader.read_u32_le()? as usize;
            let key_offset = reader.offset;
            let key = std::str::from_utf8(reader.take(key_len)?)
                .map_err(|_| MicrocodeError::InvalidName(key_offset))?
                .to_string();
            let blob_len = reader.read_u32_le()? as usize;
            let microcode: Microcode = Arc::from(reader.take(blob_len)?);
            loaded.push((key, microcode));
        }

        let mut entries = self.entries.write();
        entries.extend(loaded);
        self.dirty.store(false, Ordering::Relaxed);
        Ok(count)
    }
}

/// Key length and blob length
const MIN_STREAM_ENTRY_SIZE: usize = 2 * size_of::<u32>();

fn stream_len(len: usize, what: &str) -> Result<u32, Error> {
    u32::try_from(len).map_err(|_| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{} is too large for the microcode cache stream", what),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use ze_gfx::GpuParamVariabilityFlagBits;

    fn sample_map() -> ConstantDefinitionMap {
        let mut map = ConstantDefinitionMap::new();
        map.insert(
            "worldViewProj",
            ConstantDefinition {
                const_type: GpuConstantType::Matrix4x4,
                physical_index: 0,
                logical_index: 0,
                element_size: 16,
                array_size: 1,
                variability: GpuParamVariabilityFlagBits::PerObject.into(),
            },
        );
        map.insert(
            "lights",
            ConstantDefinition {
                const_type: GpuConstantType::Float4,
                physical_index: 16,
                logical_index: 4,
                element_size: 4,
                array_size: 8,
                variability: GpuParamVariabilityFlagBits::Lights
                    | GpuParamVariabilityFlagBits::Global,
            },
        );
        map.insert(
            "count",
            ConstantDefinition {
                const_type: GpuConstantType::Int1,
                physical_index: 0,
                logical_index: 12,
                element_size: 4,
                array_size: 1,
                ..Default::default()
            },
        );
        map
    }

    #[test]
    fn roundtrip() {
        let map = sample_map();
        let binary = b"!!ARBvp1.0\nEND\n".to_vec();
        let blob = encode_microcode(&binary, &map);
        assert_eq!(blob.len(), encoded_len(&binary, &map));

        let (decoded_binary, decoded_map) = decode_microcode(&blob).unwrap();
        assert_eq!(decoded_binary, binary);
        assert_eq!(decoded_map, map);
        assert_eq!(
            decoded_map.names().collect::<Vec<_>>(),
            vec!["worldViewProj", "lights", "count"]
        );
    }

    #[test]
    fn roundtrip_empty() {
        let blob = encode_microcode(&[], &ConstantDefinitionMap::new());
        assert_eq!(blob.len(), 2 * size_of::<usize>());
        let (binary, map) = decode_microcode(&blob).unwrap();
        assert!(binary.is_empty());
        assert!(map.is_empty());
    }

    #[test]
    fn roundtrip_unusual_names() {
        let mut map = ConstantDefinitionMap::new();
        map.insert("with\0nul", ConstantDefinition::default());
        map.insert("éclairage", ConstantDefinition::default());
        map.insert("", ConstantDefinition::default());

        let (_, decoded) = decode_microcode(&encode_microcode(&[0, 1, 2], &map)).unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn deterministic() {
        let map = sample_map();
        assert_eq!(encode_microcode(b"abc", &map), encode_microcode(b"abc", &map));
    }

    #[test]
    fn layout() {
        let mut map = ConstantDefinitionMap::new();
        map.insert(
            "c",
            ConstantDefinition {
                const_type: GpuConstantType::Float2,
                physical_index: 0,
                logical_index: 5,
                element_size: 4,
                array_size: 2,
                ..Default::default()
            },
        );
        let blob = encode_microcode(b"xy", &map);

        let word = size_of::<usize>();
        assert_eq!(&blob[..word], &2usize.to_ne_bytes());
        assert_eq!(&blob[word..word + 2], b"xy");
        assert_eq!(&blob[word + 2..2 * word + 2], &1usize.to_ne_bytes());
        assert_eq!(&blob[2 * word + 2..3 * word + 2], &1usize.to_ne_bytes());
        assert_eq!(blob[3 * word + 2], b'c');

        let record = &blob[3 * word + 3..];
        assert_eq!(record.len(), CONSTANT_DEFINITION_RECORD_SIZE);
        assert_eq!(&record[..4], &GpuConstantType::Float2.tag().to_ne_bytes());
        assert_eq!(&record[8..8 + word], &0usize.to_ne_bytes());
        assert_eq!(&record[8 + word..8 + 2 * word], &5usize.to_ne_bytes());
    }

    #[test]
    fn truncated_blobs_are_rejected() {
        let blob = encode_microcode(b"binary", &sample_map());
        for len in [0, 3, size_of::<usize>() + 2, blob.len() - 1] {
            assert!(matches!(
                decode_microcode(&blob[..len]),
                Err(MicrocodeError::Truncated { .. })
            ));
        }

        let mut huge = vec![];
        huge.extend_from_slice(&usize::MAX.to_ne_bytes());
        assert!(matches!(
            decode_microcode(&huge),
            Err(MicrocodeError::Truncated { .. })
        ));
    }

    #[test]
    fn unknown_type_tag() {
        let mut map = ConstantDefinitionMap::new();
        map.insert("c", ConstantDefinition::default());
        let mut blob = encode_microcode(&[], &map);
        let tag_offset = 3 * size_of::<usize>() + 1;
        blob[tag_offset..tag_offset + 4].copy_from_slice(&26u32.to_ne_bytes());
        assert_eq!(
            decode_microcode(&blob).err(),
            Some(MicrocodeError::UnknownConstantType(26))
        );
    }

    #[test]
    fn overflowing_layout() {
        let mut map = ConstantDefinitionMap::new();
        map.insert(
            "lights",
            ConstantDefinition {
                const_type: GpuConstantType::Float4,
                physical_index: 16,
                element_size: 4,
                array_size: usize::MAX / 2,
                ..Default::default()
            },
        );
        assert_eq!(
            decode_microcode(&encode_microcode(&[], &map)).err(),
            Some(MicrocodeError::InvalidLayout("lights".to_string()))
        );
    }

    fn single(name: &str, definition: ConstantDefinition) -> ConstantDefinitionMap {
        let mut map = ConstantDefinitionMap::new();
        map.insert(name, definition);
        map
    }

    #[test]
    fn constants_outside_the_buffer() {
        let stale = single(
            "ambient",
            ConstantDefinition {
                const_type: GpuConstantType::Float4,
                physical_index: usize::MAX / 8,
                element_size: 4,
                array_size: 1,
                ..Default::default()
            },
        );
        assert_eq!(
            decode_microcode(&encode_microcode(b"!!ARBfp1.0", &stale)).err(),
            Some(MicrocodeError::InvalidLayout("ambient".to_string()))
        );

        let mut shifted = sample_map();
        shifted.insert(
            "fogColor",
            ConstantDefinition {
                const_type: GpuConstantType::Float4,
                physical_index: 50,
                element_size: 4,
                array_size: 1,
                ..Default::default()
            },
        );
        assert_eq!(
            decode_microcode(&encode_microcode(&[], &shifted)).err(),
            Some(MicrocodeError::InvalidLayout("fogColor".to_string()))
        );
    }

    #[test]
    fn combiner_constants_outside_the_buffer() {
        let combiner = |logical_index, physical_index| {
            single(
                "const1",
                ConstantDefinition {
                    const_type: GpuConstantType::Float1,
                    physical_index,
                    logical_index,
                    element_size: 1,
                    array_size: 1,
                    ..Default::default()
                },
            )
        };

        for (logical_index, physical_index) in [(0, 1), (2, 5), (7, 14)] {
            let map = combiner(logical_index, physical_index);
            let (_, decoded) = decode_microcode(&encode_microcode(&[], &map)).unwrap();
            assert_eq!(decoded, map);
        }

        for (logical_index, physical_index) in [(2, 7), (usize::MAX / 4, usize::MAX / 2)] {
            assert_eq!(
                decode_microcode(&encode_microcode(&[], &combiner(logical_index, physical_index)))
                    .err(),
                Some(MicrocodeError::InvalidLayout("const1".to_string()))
            );
        }
    }

    #[test]
    fn cache_key() {
        assert_eq!(microcode_cache_key("cg", "Diffuse_VP"), "CG_Diffuse_VP");
    }

    #[test]
    fn cache_save_and_load() {
        let cache = MicrocodeCache::new(true, true);
        cache.insert("CG_b", vec![4, 5]);
        cache.insert("CG_a", vec![1, 2, 3]);
        assert!(cache.is_dirty());

        let mut stream = vec![];
        cache.save(&mut stream).unwrap();
        assert!(!cache.is_dirty());
        assert_eq!(&stream[..4], &2u32.to_le_bytes());
        assert_eq!(&stream[4..8], &4u32.to_le_bytes());
        assert_eq!(&stream[8..12], b"CG_a");

        let restored = MicrocodeCache::default();
        assert_eq!(restored.load(&mut stream.as_slice()).unwrap(), 2);
        assert_eq!(restored.get("CG_a").unwrap().as_ref(), &[1, 2, 3]);
        assert_eq!(restored.get("CG_b").unwrap().as_ref(), &[4, 5]);
        assert!(!restored.save_to_cache());
    }

    #[test]
    fn cache_load_truncated() {
        let cache = MicrocodeCache::default();
        let stream = [1u8, 0, 0, 0, 10, 0];
        assert!(matches!(
            cache.load(&mut stream.as_slice()),
            Err(Error::Microcode(MicrocodeError::Truncated { .. }))
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn cache_load_huge_entry_count() {
        let cache = MicrocodeCache::default();
        assert!(matches!(
            cache.load(&mut [0xffu8; 4].as_slice()),
            Err(Error::Microcode(MicrocodeError::Truncated { .. }))
        ));
        assert!(cache.is_empty());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn stream_lengths_fit_in_u32() {
        assert_eq!(stream_len(u32::MAX as usize, "blob").unwrap(), u32::MAX);
        match stream_len(u32::MAX as usize + 1, "blob") {
            Err(Error::Io(error)) => assert_eq!(error.kind(), std::io::ErrorKind::InvalidData),
            other => panic!("unexpected result {:?}", other.map_err(|e| e.to_string())),
        }
    }

    #[test]
    fn replacing_entries() {
        let cache = MicrocodeCache::default();
        cache.insert("CG_p", vec![1]);
        let old = cache.get("CG_p").unwrap();
        cache.insert("CG_p", vec![2]);
        assert_eq!(old.as_ref(), &[1]);
        assert_eq!(cache.get("CG_p").unwrap().as_ref(), &[2]);
        assert_eq!(cache.len(), 1);
        assert!(cache.remove("CG_p"));
        assert!(!cache.is_available("CG_p"));
    }
}
