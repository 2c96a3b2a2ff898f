//! Resource table (`resources.arsc`) decoding and value resolution.
//!
//! A table is TABLE → PACKAGE → (TYPE_SPEC | TYPE) → entries. Each TYPE
//! chunk carries one configuration's worth of entries for one resource
//! type; several TYPE chunks for the same type id coexist and the
//! resolver picks among them per requested configuration.

use std::collections::{BTreeMap, BTreeSet};

use bitflags::bitflags;
use log::{debug, warn};

use crate::types::{
    ComplexEntry, ResValue, ResourceId, Value, TYPE_INT_BOOLEAN, TYPE_INT_DEC, TYPE_INT_HEX,
    TYPE_NULL, TYPE_REFERENCE, TYPE_STRING,
};

use super::config::ResConfig;
use super::error::{DecodeResult, Error};
use super::string_pool::StringPool;
use super::{
    next_chunk, read_chunk_header, read_value, ChunkHeader, Reader, RES_STRING_POOL_TYPE,
    RES_TABLE_PACKAGE_TYPE, RES_TABLE_TYPE, RES_TABLE_TYPE_SPEC_TYPE, RES_TABLE_TYPE_TYPE,
};

/// Entry index value marking an absent (sparse) slot.
pub const NO_ENTRY: u32 = 0xFFFF_FFFF;

/* TYPE chunk flags. Sparse and 16-bit offset encodings are newer
   additions this reader does not accept. */
const TYPE_FLAG_SPARSE: u8 = 0x01;
const TYPE_FLAG_OFFSET16: u8 = 0x02;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryFlags: u16 {
        const COMPLEX = 0x0001;
        const PUBLIC = 0x0002;
        const WEAK = 0x0004;
        const COMPACT = 0x0008;
    }
}

/// One table entry: a key-string reference and its value.
#[derive(Debug, Clone, PartialEq)]
pub struct TableEntry {
    pub key: u32,
    pub flags: EntryFlags,
    pub value: EntryValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryValue {
    Simple(ResValue),
    Complex(ComplexEntry),
}

/// One TYPE chunk: entries of a single resource type under one config.
#[derive(Debug, Clone)]
pub struct TableType {
    pub type_id: u8,
    pub config: ResConfig,
    pub entries: Vec<Option<TableEntry>>,
}

/// A decoded PACKAGE chunk.
#[derive(Debug, Clone)]
pub struct TablePackage {
    pub id: u32,
    pub name: String,
    pub type_strings: StringPool,
    pub key_strings: StringPool,
    pub types: Vec<TableType>,
    /// Per-entry config-variance masks from TYPE_SPEC chunks, by type id.
    pub spec_flags: BTreeMap<u8, Vec<u32>>,
}

/// A decoded resource table with its global value-string pool.
#[derive(Debug, Clone)]
pub struct ResourceTable {
    global_pool: StringPool,
    packages: Vec<TablePackage>,
}

impl ResourceTable {
    /// Decodes a `resources.arsc` blob. The top-level chunk must be a
    /// TABLE.
    pub fn from_bytes(data: &[u8]) -> DecodeResult<ResourceTable> {
        let mut r = Reader::new(data);
        let (header, mut window) = next_chunk(&mut r)?.ok_or(Error::Malformed {
            offset: Some(0),
            detail: "empty input".to_string(),
        })?;
        if header.type_code != RES_TABLE_TYPE {
            return Err(Error::BadMagic {
                type_code: header.type_code,
            });
        }
        ResourceTable::read(&mut window, &header)
    }

    pub(crate) fn read(
        r: &mut Reader<'_>,
        header: &ChunkHeader,
    ) -> DecodeResult<ResourceTable> {
        r.seek(8)?;
        let package_count = r.read_u32()?;
        debug!("resource table declares {package_count} packages");

        r.seek(header.header_size as usize)?;
        let mut global_pool: Option<StringPool> = None;
        let mut packages = Vec::new();
        while let Some((child, mut window)) = next_chunk(r)? {
            match child.type_code {
                RES_STRING_POOL_TYPE if global_pool.is_none() => {
                    global_pool = Some(StringPool::read(&mut window, &child)?);
                }
                RES_TABLE_PACKAGE_TYPE => {
                    packages.push(TablePackage::read(&mut window, &child)?);
                }
                other => {
                    warn!("skipping unknown chunk type 0x{other:04X} in resource table");
                }
            }
        }
        Ok(ResourceTable {
            global_pool: global_pool.unwrap_or_else(StringPool::empty),
            packages,
        })
    }

    pub fn packages(&self) -> &[TablePackage] {
        &self.packages
    }

    pub fn package(&self, id: u8) -> Option<&TablePackage> {
        self.packages.iter().find(|p| p.id == id as u32)
    }

    /// The table-wide pool holding all string values.
    pub fn string_pool(&self) -> &StringPool {
        &self.global_pool
    }

    /// Resolves a resource id to a typed value under a configuration.
    /// References are chased through the table; a chain that re-enters
    /// an id fails with [`Error::Cycle`].
    pub fn get_resource(&self, id: ResourceId, config: &ResConfig) -> DecodeResult<Value> {
        let mut visited = BTreeSet::new();
        self.resolve(id, config, &mut visited)
    }

    fn resolve(
        &self,
        id: ResourceId,
        config: &ResConfig,
        visited: &mut BTreeSet<u32>,
    ) -> DecodeResult<Value> {
        if !visited.insert(id.as_u32()) {
            return Err(Error::Cycle { id });
        }
        let entry = self.entry(id, config)?;
        match &entry.value {
            EntryValue::Complex(map) => Ok(Value::Complex(map.clone())),
            EntryValue::Simple(v) => match v.data_type {
                TYPE_NULL => Ok(Value::Null),
                TYPE_STRING => self
                    .global_pool
                    .get(v.data)
                    .map(|s| Value::Str(s.to_string()))
                    .ok_or_else(|| Error::NotFound {
                        what: format!("string pool entry {} referenced by {id}", v.data),
                    }),
                TYPE_INT_BOOLEAN => Ok(Value::Bool(v.data != 0)),
                TYPE_INT_DEC | TYPE_INT_HEX => Ok(Value::Int(v.data)),
                TYPE_REFERENCE => self.resolve(ResourceId::new(v.data), config, visited),
                _ => Ok(Value::Raw(*v)),
            },
        }
    }

    fn entry(&self, id: ResourceId, config: &ResConfig) -> DecodeResult<&TableEntry> {
        let package = self.package(id.package()).ok_or_else(|| Error::NotFound {
            what: format!("package 0x{:02X} for {id}", id.package()),
        })?;
        let type_id = id.type_id();
        if type_id == 0 {
            return Err(Error::NotFound {
                what: format!("type id 0 in {id}"),
            });
        }
        let mut best: Option<&TableType> = None;
        for candidate in package.types.iter().filter(|t| t.type_id == type_id) {
            if !candidate.config.is_compatible(config) {
                continue;
            }
            // Later candidates win ties, keeping document order decisive.
            best = match best {
                Some(current) if current.config.is_better_than(&candidate.config, config) => {
                    Some(current)
                }
                _ => Some(candidate),
            };
        }
        let best = best.ok_or_else(|| Error::NotFound {
            what: format!("no config-compatible variant of type 0x{type_id:02X} for {id}"),
        })?;
        match best.entries.get(id.entry() as usize) {
            Some(Some(entry)) => Ok(entry),
            _ => Err(Error::NotFound {
                what: format!("entry {} of {id}", id.entry()),
            }),
        }
    }

    /// Renders an id as `@package:type/entry`, when all three names are
    /// known to the table.
    pub fn resource_name(&self, id: ResourceId) -> Option<String> {
        let package = self.package(id.package())?;
        if id.type_id() == 0 {
            return None;
        }
        let type_name = package.type_strings.get(id.type_id() as u32 - 1)?;
        let entry = package
            .types
            .iter()
            .filter(|t| t.type_id == id.type_id())
            .find_map(|t| t.entries.get(id.entry() as usize).and_then(Option::as_ref))?;
        let key = package.key_strings.get(entry.key)?;
        Some(format!("@{}:{}/{}", package.name, type_name, key))
    }

    /// Finds the id of a resource by name, searching every package when
    /// none is given. Returns the first match in document order.
    pub fn find_by_name(
        &self,
        package: Option<&str>,
        type_name: &str,
        entry_name: &str,
    ) -> Option<ResourceId> {
        for pkg in &self.packages {
            if let Some(wanted) = package {
                if pkg.name != wanted {
                    continue;
                }
            }
            let Some(type_pos) = pkg.type_strings.position(type_name) else {
                continue;
            };
            let type_id = type_pos as u8 + 1;
            for variant in pkg.types.iter().filter(|t| t.type_id == type_id) {
                for (slot, entry) in variant.entries.iter().enumerate() {
                    if let Some(entry) = entry {
                        if pkg.key_strings.get(entry.key) == Some(entry_name) {
                            return Some(ResourceId::from_parts(
                                pkg.id as u8,
                                type_id,
                                slot as u16,
                            ));
                        }
                    }
                }
            }
        }
        None
    }
}

impl TablePackage {
    pub(crate) fn read(r: &mut Reader<'_>, header: &ChunkHeader) -> DecodeResult<TablePackage> {
        r.seek(8)?;
        let id = r.read_u32()?;
        let name = read_package_name(r)?;
        let type_strings_offset = r.read_u32()? as usize;
        let _last_public_type = r.read_u32()?;
        let key_strings_offset = r.read_u32()? as usize;
        let _last_public_key = r.read_u32()?;

        let type_strings = read_pool_at(r, type_strings_offset)?;
        let key_strings = read_pool_at(r, key_strings_offset)?;
        debug!(
            "package 0x{id:02X} {name:?}: {} types, {} keys",
            type_strings.len(),
            key_strings.len()
        );

        let mut types = Vec::new();
        let mut spec_flags = BTreeMap::new();
        r.seek(header.header_size as usize)?;
        while let Some((child, mut window)) = next_chunk(r)? {
            match child.type_code {
                RES_TABLE_TYPE_TYPE => {
                    types.push(TableType::read(&mut window, &child)?);
                }
                RES_TABLE_TYPE_SPEC_TYPE => {
                    let (type_id, flags) = read_type_spec(&mut window, &child)?;
                    spec_flags.insert(type_id, flags);
                }
                // The type/key pools also live in this window; they were
                // decoded above through the header offsets.
                RES_STRING_POOL_TYPE => {}
                other => {
                    warn!("skipping unknown chunk type 0x{other:04X} in package {name:?}");
                }
            }
        }

        Ok(TablePackage {
            id,
            name,
            type_strings,
            key_strings,
            types,
            spec_flags,
        })
    }
}

impl TableType {
    pub(crate) fn read(r: &mut Reader<'_>, header: &ChunkHeader) -> DecodeResult<TableType> {
        r.seek(8)?;
        let abs = r.abs_position();
        let type_id = r.read_u8()?;
        let flags = r.read_u8()?;
        let _reserved = r.read_u16()?;
        let entry_count = r.read_u32()? as usize;
        let entries_start = r.read_u32()? as usize;
        let config = ResConfig::read(r)?;

        if type_id == 0 {
            return Err(Error::malformed(abs, "type chunk with id 0"));
        }
        if flags & (TYPE_FLAG_SPARSE | TYPE_FLAG_OFFSET16) != 0 {
            return Err(Error::malformed(
                abs,
                format!("unsupported type chunk flags 0x{flags:02X}"),
            ));
        }
        if entry_count > r.len() / 4 {
            return Err(Error::malformed(
                abs,
                format!("entry count {entry_count} exceeds chunk size"),
            ));
        }

        r.seek(header.header_size as usize)?;
        let mut indexes = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            indexes.push(r.read_u32()?);
        }

        let mut entries = Vec::with_capacity(entry_count);
        for index in indexes {
            if index == NO_ENTRY {
                entries.push(None);
                continue;
            }
            let at = entries_start.checked_add(index as usize).ok_or_else(|| {
                Error::malformed(abs, "entry offset overflow")
            })?;
            let mut cursor = r.clone();
            cursor.seek(at)?;
            entries.push(Some(read_entry(&mut cursor)?));
        }
        debug!(
            "type 0x{type_id:02X} [{config}]: {}/{} entries present",
            entries.iter().filter(|e| e.is_some()).count(),
            entry_count
        );

        Ok(TableType {
            type_id,
            config,
            entries,
        })
    }
}

fn read_entry(r: &mut Reader<'_>) -> DecodeResult<TableEntry> {
    let size_or_key = r.read_u16()?;
    let raw_flags = r.read_u16()?;
    let flags = EntryFlags::from_bits_truncate(raw_flags);

    if flags.contains(EntryFlags::COMPACT) {
        // Compact entries pack the key into the size slot and the data
        // type into the flag high byte.
        let data = r.read_u32()?;
        return Ok(TableEntry {
            key: size_or_key as u32,
            flags,
            value: EntryValue::Simple(ResValue {
                size: 8,
                res0: 0,
                data_type: (raw_flags >> 8) as u8,
                data,
            }),
        });
    }

    let key = r.read_u32()?;
    let value = if flags.contains(EntryFlags::COMPLEX) {
        let parent = r.read_u32()?;
        let count = r.read_u32()? as usize;
        if count > r.remaining() / 12 {
            return Err(Error::malformed(
                r.abs_position(),
                format!("complex entry item count {count} exceeds chunk size"),
            ));
        }
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            let name = ResourceId::new(r.read_u32()?);
            items.push((name, read_value(r)?));
        }
        EntryValue::Complex(ComplexEntry {
            parent: ResourceId::new(parent),
            items,
        })
    } else {
        EntryValue::Simple(read_value(r)?)
    };

    Ok(TableEntry { key, flags, value })
}

fn read_type_spec(r: &mut Reader<'_>, header: &ChunkHeader) -> DecodeResult<(u8, Vec<u32>)> {
    r.seek(8)?;
    let abs = r.abs_position();
    let type_id = r.read_u8()?;
    let _res0 = r.read_u8()?;
    let _types_count = r.read_u16()?;
    let entry_count = r.read_u32()? as usize;
    if entry_count > r.len() / 4 {
        return Err(Error::malformed(
            abs,
            format!("spec entry count {entry_count} exceeds chunk size"),
        ));
    }
    r.seek(header.header_size as usize)?;
    let mut flags = Vec::with_capacity(entry_count);
    for _ in 0..entry_count {
        flags.push(r.read_u32()?);
    }
    Ok((type_id, flags))
}

/// Decodes the fixed 128-unit, null-padded UTF-16LE package name.
fn read_package_name(r: &mut Reader<'_>) -> DecodeResult<String> {
    let abs = r.abs_position();
    let bytes = r.read_bytes(256)?;
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16(&units).map_err(|_| Error::BadEncoding {
        offset: abs,
        detail: "unpaired UTF-16 surrogate in package name".to_string(),
    })
}

/// Decodes the string pool located at a header-declared offset inside
/// the package window. Offset zero means the pool is inherited and
/// yields an empty pool.
fn read_pool_at(r: &Reader<'_>, offset: usize) -> DecodeResult<StringPool> {
    if offset == 0 {
        return Ok(StringPool::empty());
    }
    let mut cursor = r.clone();
    cursor.seek(offset)?;
    let header = read_chunk_header(&mut cursor)?;
    if header.type_code != RES_STRING_POOL_TYPE {
        return Err(Error::malformed(
            cursor.abs_position() - 8,
            format!("expected string pool at package offset, found 0x{:04X}", header.type_code),
        ));
    }
    let mut window = r.slice(offset, header.size as usize)?;
    StringPool::read(&mut window, &header)
}
