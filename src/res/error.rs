use std::fmt;

use crate::types::ResourceId;

/// Result alias for binary resource decoding.
pub type DecodeResult<T> = Result<T, Error>;

/// Errors surfaced while decoding binary resources or resolving values.
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// A chunk or field extends past the window that contains it.
    Truncated {
        offset: usize,
        chunk_type: Option<u16>,
    },
    /// The top-level chunk is neither a binary XML tree nor a resource table.
    BadMagic { type_code: u16 },
    /// Invalid UTF-8 payload or unpaired UTF-16 surrogate in a string pool.
    BadEncoding { offset: usize, detail: String },
    /// A resource id has no matching package, type, entry or config variant.
    NotFound { what: String },
    /// A resolved value's data type does not fit what the caller asked for.
    TypeMismatch {
        expected: &'static str,
        found: String,
    },
    /// A reference chain re-entered an id it already visited.
    Cycle { id: ResourceId },
    /// Structurally invalid data: bad header sizes, overflows, bad literals.
    Malformed {
        offset: Option<usize>,
        detail: String,
    },
}

impl Error {
    pub(crate) fn malformed(offset: usize, detail: impl Into<String>) -> Error {
        Error::Malformed {
            offset: Some(offset),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Truncated { offset, chunk_type } => {
                write!(f, "truncated data at offset 0x{offset:X}")?;
                if let Some(t) = chunk_type {
                    write!(f, " (chunk type 0x{t:04X})")?;
                }
                Ok(())
            }
            Error::BadMagic { type_code } => {
                write!(
                    f,
                    "top-level chunk type 0x{type_code:04X} is neither XML nor TABLE"
                )
            }
            Error::BadEncoding { offset, detail } => {
                write!(f, "bad string encoding at offset 0x{offset:X}: {detail}")
            }
            Error::NotFound { what } => write!(f, "resource not found: {what}"),
            Error::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {expected}, found {found}")
            }
            Error::Cycle { id } => write!(f, "reference cycle while resolving {id}"),
            Error::Malformed { offset, detail } => {
                write!(f, "malformed data")?;
                if let Some(o) = offset {
                    write!(f, " at offset 0x{o:X}")?;
                }
                write!(f, ": {detail}")
            }
        }
    }
}

impl std::error::Error for Error {}
