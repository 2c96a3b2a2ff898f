//! # binres
//!
//! A library for reading Android binary resource containers: compiled
//! binary XML (`AndroidManifest.xml`) and resource tables
//! (`resources.arsc`).
//!
use crate::res::error::Error;
use crate::res::{next_chunk, Reader, RES_TABLE_TYPE, RES_XML_TYPE};

pub mod res;
pub mod types;
pub mod values;
mod res_parse;
#[cfg(test)]
mod tests;

pub use res::config::ResConfig;
pub use res::error::{DecodeResult, Error as DecodeError};
pub use res::string_pool::{StringPool, StyleSpan, NIL_REF};
pub use res::table::{EntryValue, ResourceTable, TableEntry, TablePackage, TableType};
pub use res::xml::XmlFile;
pub use types::{ComplexEntry, ResValue, ResourceId, Value};

/// A decoded binary resource file of either flavor.
#[derive(Debug, Clone)]
pub enum ResourceFile {
    Xml(XmlFile),
    Table(ResourceTable),
}

impl ResourceFile {
    /// Decodes a binary resource blob, classifying it by its top-level
    /// chunk type. Any other top-level type fails with `BadMagic`.
    ///
    /// # Examples
    ///
    /// ```no_run
    ///  use binres::ResourceFile;
    ///
    ///  let data = std::fs::read("AndroidManifest.xml").unwrap();
    ///  match ResourceFile::from_bytes(&data).unwrap() {
    ///      ResourceFile::Xml(xml) => println!("{}", xml.document()),
    ///      ResourceFile::Table(table) => println!("{} packages", table.packages().len()),
    ///  }
    /// ```
    pub fn from_bytes(data: &[u8]) -> DecodeResult<ResourceFile> {
        let mut r = Reader::new(data);
        let (header, mut window) = next_chunk(&mut r)?.ok_or(Error::Malformed {
            offset: Some(0),
            detail: "empty input".to_string(),
        })?;
        match header.type_code {
            RES_XML_TYPE => Ok(ResourceFile::Xml(XmlFile::read(&mut window, &header)?)),
            RES_TABLE_TYPE => Ok(ResourceFile::Table(ResourceTable::read(
                &mut window,
                &header,
            )?)),
            other => Err(Error::BadMagic { type_code: other }),
        }
    }
}
