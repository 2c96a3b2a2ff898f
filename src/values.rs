//! Lazily-resolving attribute value wrappers.
//!
//! XML attributes hold either an immediate literal ("true", "17") or a
//! resource reference ("@0x7F050003"). A facade keeps the unresolved
//! text and, once a decoded table and configuration are injected,
//! resolves on access. Facades borrow the table, so they cannot outlive
//! the decoded file they were bound to.

use crate::res::config::ResConfig;
use crate::res::error::{DecodeResult, Error};
use crate::res::table::ResourceTable;
use crate::res_parse::{parse_reference, Reference};
use crate::types::{ResourceId, Value};

/// The capability the injection pass looks for: anything that can be
/// bound to a table and a configuration.
///
/// Aggregates produced by an XML unmarshaller implement this by
/// forwarding to their fields; the container impls below descend
/// vectors, options, boxes and arrays, so one call at the root binds
/// every facade in the tree. Injection is idempotent, and the most
/// recent injection wins.
pub trait Injectable<'a> {
    fn inject(&mut self, table: &'a ResourceTable, config: &'a ResConfig);
}

impl<'a, T: Injectable<'a>> Injectable<'a> for Vec<T> {
    fn inject(&mut self, table: &'a ResourceTable, config: &'a ResConfig) {
        for item in self {
            item.inject(table, config);
        }
    }
}

impl<'a, T: Injectable<'a>> Injectable<'a> for Option<T> {
    fn inject(&mut self, table: &'a ResourceTable, config: &'a ResConfig) {
        if let Some(item) = self {
            item.inject(table, config);
        }
    }
}

impl<'a, T: Injectable<'a>> Injectable<'a> for Box<T> {
    fn inject(&mut self, table: &'a ResourceTable, config: &'a ResConfig) {
        (**self).inject(table, config);
    }
}

impl<'a, T: Injectable<'a>, const N: usize> Injectable<'a> for [T; N] {
    fn inject(&mut self, table: &'a ResourceTable, config: &'a ResConfig) {
        for item in self {
            item.inject(table, config);
        }
    }
}

fn lookup<'a>(
    value: &str,
    reference: Reference,
    table: Option<&'a ResourceTable>,
    config: Option<&'a ResConfig>,
) -> DecodeResult<Value> {
    let table = table.ok_or_else(|| Error::NotFound {
        what: format!("no resource table bound for {value:?}"),
    })?;
    let id = match reference {
        Reference::Id(id) => id,
        Reference::Name(name) => table
            .find_by_name(name.package.as_deref(), &name.type_name, &name.entry)
            .ok_or_else(|| Error::NotFound {
                what: format!("no resource named {value:?}"),
            })?,
    };
    table.get_resource(id, config.unwrap_or(&ResConfig::DEFAULT))
}

/// A boolean attribute value: an immediate literal or a reference.
#[derive(Debug, Clone, Default)]
pub struct Bool<'a> {
    value: String,
    table: Option<&'a ResourceTable>,
    config: Option<&'a ResConfig>,
}

impl<'a> Bool<'a> {
    /// Wraps an attribute's textual value, unbound.
    pub fn from_value(value: impl Into<String>) -> Bool<'a> {
        Bool {
            value: value.into(),
            table: None,
            config: None,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_bool(&mut self, value: bool) {
        self.value = value.to_string();
    }

    pub fn set_res_id(&mut self, id: ResourceId) {
        self.value = id.to_string();
    }

    /// Resolves the value. Empty text is `false`; a reference is looked
    /// up through the bound table and must hold a boolean.
    pub fn get(&self) -> DecodeResult<bool> {
        if self.value.is_empty() {
            return Ok(false);
        }
        match parse_reference(&self.value) {
            Some(r) => match lookup(&self.value, r, self.table, self.config)? {
                Value::Bool(b) => Ok(b),
                other => Err(Error::TypeMismatch {
                    expected: "boolean",
                    found: other.kind().to_string(),
                }),
            },
            None => self.value.trim().parse::<bool>().map_err(|_| Error::Malformed {
                offset: None,
                detail: format!("invalid boolean literal {:?}", self.value),
            }),
        }
    }

    /// Like [`Bool::get`], but treats failure as a programming fault.
    pub fn must_get(&self) -> bool {
        match self.get() {
            Ok(v) => v,
            Err(e) => panic!("unresolvable boolean value: {e}"),
        }
    }
}

impl<'a> Injectable<'a> for Bool<'a> {
    fn inject(&mut self, table: &'a ResourceTable, config: &'a ResConfig) {
        self.table = Some(table);
        self.config = Some(config);
    }
}

/// A 32-bit integer attribute value: an immediate literal or a reference.
#[derive(Debug, Clone, Default)]
pub struct Int32<'a> {
    value: String,
    table: Option<&'a ResourceTable>,
    config: Option<&'a ResConfig>,
}

impl<'a> Int32<'a> {
    pub fn from_value(value: impl Into<String>) -> Int32<'a> {
        Int32 {
            value: value.into(),
            table: None,
            config: None,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_i32(&mut self, value: i32) {
        self.value = value.to_string();
    }

    pub fn set_res_id(&mut self, id: ResourceId) {
        self.value = id.to_string();
    }

    /// Resolves the value. Empty text is `0`.
    pub fn get(&self) -> DecodeResult<i32> {
        if self.value.is_empty() {
            return Ok(0);
        }
        match parse_reference(&self.value) {
            Some(r) => match lookup(&self.value, r, self.table, self.config)? {
                Value::Int(v) => Ok(v as i32),
                other => Err(Error::TypeMismatch {
                    expected: "integer",
                    found: other.kind().to_string(),
                }),
            },
            None => self.value.trim().parse::<i32>().map_err(|_| Error::Malformed {
                offset: None,
                detail: format!("invalid integer literal {:?}", self.value),
            }),
        }
    }

    /// Like [`Int32::get`], but treats failure as a programming fault.
    pub fn must_get(&self) -> i32 {
        match self.get() {
            Ok(v) => v,
            Err(e) => panic!("unresolvable integer value: {e}"),
        }
    }
}

impl<'a> Injectable<'a> for Int32<'a> {
    fn inject(&mut self, table: &'a ResourceTable, config: &'a ResConfig) {
        self.table = Some(table);
        self.config = Some(config);
    }
}

/// A string attribute value: immediate text or a reference.
#[derive(Debug, Clone, Default)]
pub struct Str<'a> {
    value: String,
    table: Option<&'a ResourceTable>,
    config: Option<&'a ResConfig>,
}

impl<'a> Str<'a> {
    pub fn from_value(value: impl Into<String>) -> Str<'a> {
        Str {
            value: value.into(),
            table: None,
            config: None,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_str(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    pub fn set_res_id(&mut self, id: ResourceId) {
        self.value = id.to_string();
    }

    /// Resolves the value. Non-reference text is returned as-is.
    pub fn get(&self) -> DecodeResult<String> {
        match parse_reference(&self.value) {
            Some(r) => match lookup(&self.value, r, self.table, self.config)? {
                Value::Str(s) => Ok(s),
                other => Err(Error::TypeMismatch {
                    expected: "string",
                    found: other.kind().to_string(),
                }),
            },
            None => Ok(self.value.clone()),
        }
    }

    /// Like [`Str::get`], but treats failure as a programming fault.
    pub fn must_get(&self) -> String {
        match self.get() {
            Ok(v) => v,
            Err(e) => panic!("unresolvable string value: {e}"),
        }
    }
}

impl<'a> Injectable<'a> for Str<'a> {
    fn inject(&mut self, table: &'a ResourceTable, config: &'a ResConfig) {
        self.table = Some(table);
        self.config = Some(config);
    }
}
