//! Binary XML tree decoding: translates the chunk event stream
//! (namespaces, elements, CDATA) back into a textual XML document.

use std::collections::BTreeMap;

use log::warn;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::types::{
    ResValue, TYPE_ATTRIBUTE, TYPE_DIMENSION, TYPE_FLOAT, TYPE_FRACTION, TYPE_INT_BOOLEAN,
    TYPE_INT_COLOR_ARGB4, TYPE_INT_COLOR_ARGB8, TYPE_INT_COLOR_RGB4, TYPE_INT_COLOR_RGB8,
    TYPE_INT_DEC, TYPE_INT_HEX, TYPE_NULL, TYPE_REFERENCE, TYPE_STRING,
};

use super::error::{DecodeResult, Error};
use super::string_pool::{StringPool, NIL_REF};
use super::{
    next_chunk, read_value, ChunkHeader, Reader, RES_STRING_POOL_TYPE, RES_XML_CDATA_TYPE,
    RES_XML_END_ELEMENT_TYPE, RES_XML_END_NAMESPACE_TYPE, RES_XML_LAST_CHUNK_TYPE,
    RES_XML_RESOURCE_MAP_TYPE, RES_XML_START_ELEMENT_TYPE, RES_XML_START_NAMESPACE_TYPE,
    RES_XML_TYPE,
};

/// A decoded binary XML document.
#[derive(Debug, Clone)]
pub struct XmlFile {
    document: String,
    string_pool: StringPool,
    resource_map: Vec<u32>,
}

impl XmlFile {
    /// Decodes a compiled `AndroidManifest.xml`-style blob. The
    /// top-level chunk must be an XML tree.
    pub fn from_bytes(data: &[u8]) -> DecodeResult<XmlFile> {
        let mut r = Reader::new(data);
        let (header, mut window) = next_chunk(&mut r)?.ok_or(Error::Malformed {
            offset: Some(0),
            detail: "empty input".to_string(),
        })?;
        if header.type_code != RES_XML_TYPE {
            return Err(Error::BadMagic {
                type_code: header.type_code,
            });
        }
        XmlFile::read(&mut window, &header)
    }

    /// The reconstructed textual document, UTF-8, with a declaration
    /// line and escaped values.
    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn string_pool(&self) -> &StringPool {
        &self.string_pool
    }

    /// Resource ids aligned index-for-index with the string pool.
    pub fn resource_map(&self) -> &[u32] {
        &self.resource_map
    }

    pub(crate) fn read(r: &mut Reader<'_>, header: &ChunkHeader) -> DecodeResult<XmlFile> {
        r.seek(header.header_size as usize)?;
        let mut pool: Option<StringPool> = None;
        let mut resource_map = Vec::new();
        let mut translator = Translator::new();

        while let Some((child, mut window)) = next_chunk(r)? {
            match child.type_code {
                RES_STRING_POOL_TYPE => {
                    pool = Some(StringPool::read(&mut window, &child)?);
                }
                RES_XML_RESOURCE_MAP_TYPE => {
                    resource_map = read_resource_map(&mut window, &child)?;
                }
                RES_XML_START_NAMESPACE_TYPE => {
                    let (prefix, uri) = read_namespace_ext(&mut window, &child)?;
                    translator.start_namespace(prefix, uri);
                }
                RES_XML_END_NAMESPACE_TYPE => {
                    let (_, uri) = read_namespace_ext(&mut window, &child)?;
                    translator.end_namespace(uri);
                }
                RES_XML_START_ELEMENT_TYPE => {
                    let pool = require_pool(&pool, &window)?;
                    let (ns, name, attrs) = read_start_element(&mut window, &child)?;
                    translator.start_element(pool, ns, name, &attrs)?;
                }
                RES_XML_END_ELEMENT_TYPE => {
                    let pool = require_pool(&pool, &window)?;
                    let (ns, name) = read_end_element(&mut window, &child)?;
                    translator.end_element(pool, ns, name)?;
                }
                RES_XML_CDATA_TYPE => {
                    let pool = require_pool(&pool, &window)?;
                    let (data_ref, value) = read_cdata(&mut window, &child)?;
                    translator.cdata(pool, data_ref, &value)?;
                }
                other => {
                    if other <= RES_XML_LAST_CHUNK_TYPE {
                        warn!("skipping unknown tree chunk type 0x{other:04X}");
                    } else {
                        warn!("skipping unknown chunk type 0x{other:04X} in XML document");
                    }
                }
            }
        }

        Ok(XmlFile {
            document: translator.finish()?,
            string_pool: pool.unwrap_or_else(StringPool::empty),
            resource_map,
        })
    }
}

fn require_pool<'p>(pool: &'p Option<StringPool>, window: &Reader<'_>) -> DecodeResult<&'p StringPool> {
    pool.as_ref().ok_or_else(|| {
        Error::malformed(window.abs_position(), "tree chunk before string pool")
    })
}

#[derive(Debug, Clone, Copy)]
struct XmlAttribute {
    ns: u32,
    name: u32,
    raw_value: u32,
    typed_value: ResValue,
}

/* Translator states: the declaration is emitted once on entry, and the
   element depth must return to zero before the document is done. */
enum State {
    Prologue,
    InTree,
    Done,
}

struct Translator {
    writer: Writer<Vec<u8>>,
    /// URI reference → prefix reference, for all namespaces in scope.
    active: BTreeMap<u32, u32>,
    /// Declarations awaiting the next start element, in document order.
    pending: Vec<(u32, u32)>,
    depth: usize,
    state: State,
}

impl Translator {
    fn new() -> Translator {
        Translator {
            writer: Writer::new(Vec::new()),
            active: BTreeMap::new(),
            pending: Vec::new(),
            depth: 0,
            state: State::Prologue,
        }
    }

    fn enter_tree(&mut self) -> DecodeResult<()> {
        if matches!(self.state, State::Prologue) {
            self.writer
                .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
                .map_err(writer_error)?;
            self.state = State::InTree;
        }
        Ok(())
    }

    fn start_namespace(&mut self, prefix: u32, uri: u32) {
        self.active.insert(uri, prefix);
        self.pending.push((prefix, uri));
    }

    fn end_namespace(&mut self, uri: u32) {
        self.active.remove(&uri);
    }

    fn start_element(
        &mut self,
        pool: &StringPool,
        ns: u32,
        name: u32,
        attrs: &[XmlAttribute],
    ) -> DecodeResult<()> {
        self.enter_tree()?;
        let qname = self.qualified_name(pool, ns, name)?;
        let mut start = BytesStart::new(qname);
        for (prefix_ref, uri_ref) in std::mem::take(&mut self.pending) {
            let prefix = pool.get(prefix_ref).unwrap_or("");
            let uri = pool.get(uri_ref).unwrap_or("");
            if prefix.is_empty() {
                start.push_attribute(("xmlns", uri));
            } else {
                start.push_attribute((format!("xmlns:{prefix}").as_str(), uri));
            }
        }
        for attr in attrs {
            let attr_name = self.qualified_name(pool, attr.ns, attr.name)?;
            let value = render_value(pool, attr.raw_value, &attr.typed_value)?;
            start.push_attribute((attr_name.as_str(), value.as_str()));
        }
        self.writer
            .write_event(Event::Start(start))
            .map_err(writer_error)?;
        self.depth += 1;
        Ok(())
    }

    fn end_element(&mut self, pool: &StringPool, ns: u32, name: u32) -> DecodeResult<()> {
        self.enter_tree()?;
        if self.depth == 0 {
            return Err(Error::Malformed {
                offset: None,
                detail: "end element without matching start".to_string(),
            });
        }
        let qname = self.qualified_name(pool, ns, name)?;
        self.writer
            .write_event(Event::End(BytesEnd::new(qname)))
            .map_err(writer_error)?;
        self.depth -= 1;
        Ok(())
    }

    fn cdata(&mut self, pool: &StringPool, data_ref: u32, value: &ResValue) -> DecodeResult<()> {
        self.enter_tree()?;
        let text = match pool.get(data_ref) {
            Some(text) if data_ref != NIL_REF => text.to_string(),
            _ => render_value(pool, NIL_REF, value)?,
        };
        self.writer
            .write_event(Event::Text(BytesText::new(&text)))
            .map_err(writer_error)?;
        Ok(())
    }

    fn finish(mut self) -> DecodeResult<String> {
        self.enter_tree()?;
        if self.depth != 0 {
            return Err(Error::Malformed {
                offset: None,
                detail: format!("{} elements left open at end of document", self.depth),
            });
        }
        self.state = State::Done;
        String::from_utf8(self.writer.into_inner()).map_err(|e| Error::Malformed {
            offset: None,
            detail: format!("emitted document is not UTF-8: {e}"),
        })
    }

    /// `prefix:name` when the namespace is set and registered, bare
    /// `name` otherwise.
    fn qualified_name(&self, pool: &StringPool, ns: u32, name: u32) -> DecodeResult<String> {
        let local = pool.get(name).ok_or_else(|| Error::Malformed {
            offset: None,
            detail: format!("name references invalid string index {name}"),
        })?;
        if ns == NIL_REF {
            return Ok(local.to_string());
        }
        match self.active.get(&ns).and_then(|&p| pool.get(p)) {
            Some(prefix) if !prefix.is_empty() => Ok(format!("{prefix}:{local}")),
            _ => Ok(local.to_string()),
        }
    }
}

fn writer_error<E: std::fmt::Display>(e: E) -> Error {
    Error::Malformed {
        offset: None,
        detail: format!("xml writer: {e}"),
    }
}

/// Renders an attribute's value: the raw string when present, otherwise
/// a textual form of the typed value.
fn render_value(pool: &StringPool, raw_value: u32, value: &ResValue) -> DecodeResult<String> {
    if raw_value != NIL_REF {
        return pool
            .get(raw_value)
            .map(str::to_string)
            .ok_or_else(|| Error::Malformed {
                offset: None,
                detail: format!("raw value references invalid string index {raw_value}"),
            });
    }
    let data = value.data;
    let text = match value.data_type {
        TYPE_NULL => String::new(),
        TYPE_REFERENCE => format!("@0x{data:08X}"),
        TYPE_ATTRIBUTE => format!("?0x{data:08X}"),
        TYPE_STRING => pool
            .get(data)
            .ok_or_else(|| Error::Malformed {
                offset: None,
                detail: format!("string value references invalid pool index {data}"),
            })?
            .to_string(),
        TYPE_FLOAT => f32::from_bits(data).to_string(),
        TYPE_DIMENSION => format!("{}{}", complex_to_float(data), dimension_suffix(data)),
        TYPE_FRACTION => format!("{}{}", complex_to_float(data) * 100.0, fraction_suffix(data)),
        TYPE_INT_DEC => data.to_string(),
        TYPE_INT_HEX => format!("0x{data:08X}"),
        TYPE_INT_BOOLEAN => {
            if data != 0 {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        TYPE_INT_COLOR_ARGB8 => format!("#{data:08X}"),
        TYPE_INT_COLOR_RGB8 => format!("#{:06X}", data & 0x00FF_FFFF),
        TYPE_INT_COLOR_ARGB4 => format!("#{:04X}", color_nibbles(data)),
        TYPE_INT_COLOR_RGB4 => format!("#{:03X}", color_nibbles(data) & 0xFFF),
        _ => format!("@0x{data:08X}"),
    };
    Ok(text)
}

/// Decodes the fixed-point "complex" encoding shared by dimensions and
/// fractions: a signed 24-bit mantissa shifted per the radix field.
fn complex_to_float(data: u32) -> f32 {
    let mantissa = (data & 0xFFFF_FF00) as i32 as f32;
    let radix = match (data >> 4) & 0x3 {
        0 => 1.0 / 256.0,
        1 => 1.0 / 32_768.0,
        2 => 1.0 / 8_388_608.0,
        _ => 1.0 / 2_147_483_648.0,
    };
    mantissa * radix
}

fn dimension_suffix(data: u32) -> &'static str {
    match data & 0xF {
        0 => "px",
        1 => "dip",
        2 => "sp",
        3 => "pt",
        4 => "in",
        5 => "mm",
        _ => "",
    }
}

fn fraction_suffix(data: u32) -> &'static str {
    match data & 0xF {
        0 => "%",
        1 => "%p",
        _ => "",
    }
}

/// One hex digit per channel, taken from the high nibble of each byte.
fn color_nibbles(data: u32) -> u32 {
    ((data >> 16) & 0xF000) | ((data >> 12) & 0x0F00) | ((data >> 8) & 0x00F0) | ((data >> 4) & 0x000F)
}

fn read_resource_map(r: &mut Reader<'_>, header: &ChunkHeader) -> DecodeResult<Vec<u32>> {
    r.seek(header.header_size as usize)?;
    let count = (header.size as usize - header.header_size as usize) / 4;
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        ids.push(r.read_u32()?);
    }
    Ok(ids)
}

fn read_namespace_ext(r: &mut Reader<'_>, header: &ChunkHeader) -> DecodeResult<(u32, u32)> {
    // Skip the node header's line number and comment.
    r.seek(header.header_size as usize)?;
    let prefix = r.read_u32()?;
    let uri = r.read_u32()?;
    Ok((prefix, uri))
}

fn read_start_element(
    r: &mut Reader<'_>,
    header: &ChunkHeader,
) -> DecodeResult<(u32, u32, Vec<XmlAttribute>)> {
    r.seek(header.header_size as usize)?;
    let abs = r.abs_position();
    let ns = r.read_u32()?;
    let name = r.read_u32()?;
    let attribute_start = r.read_u16()? as usize;
    let attribute_size = r.read_u16()? as usize;
    let attribute_count = r.read_u16()? as usize;
    let _id_index = r.read_u16()?;
    let _class_index = r.read_u16()?;
    let _style_index = r.read_u16()?;

    if attribute_count > 0 && attribute_size < 20 {
        return Err(Error::malformed(
            abs,
            format!("attribute record size {attribute_size} below minimum"),
        ));
    }
    if attribute_count > r.len() / 20 {
        return Err(Error::malformed(
            abs,
            format!("attribute count {attribute_count} exceeds chunk size"),
        ));
    }

    let mut attrs = Vec::with_capacity(attribute_count);
    for i in 0..attribute_count {
        r.seek(header.header_size as usize + attribute_start + i * attribute_size)?;
        let ns = r.read_u32()?;
        let name = r.read_u32()?;
        let raw_value = r.read_u32()?;
        let typed_value = read_value(r)?;
        attrs.push(XmlAttribute {
            ns,
            name,
            raw_value,
            typed_value,
        });
    }
    Ok((ns, name, attrs))
}

fn read_end_element(r: &mut Reader<'_>, header: &ChunkHeader) -> DecodeResult<(u32, u32)> {
    r.seek(header.header_size as usize)?;
    let ns = r.read_u32()?;
    let name = r.read_u32()?;
    Ok((ns, name))
}

fn read_cdata(r: &mut Reader<'_>, header: &ChunkHeader) -> DecodeResult<(u32, ResValue)> {
    r.seek(header.header_size as usize)?;
    let data_ref = r.read_u32()?;
    let value = read_value(r)?;
    Ok((data_ref, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures::{
        cdata_chunk, end_element_chunk, end_namespace_chunk, start_element_chunk,
        start_namespace_chunk, string_pool_chunk, xml_chunk, AttrFixture,
    };

    const ANDROID_URI: &str = "http://schemas.android.com/apk/res/android";

    #[test]
    fn minimal_manifest() {
        let pool = string_pool_chunk(&["android", ANDROID_URI, "manifest", "versionCode"]);
        let doc = xml_chunk(&[
            pool,
            start_namespace_chunk(0, 1),
            start_element_chunk(
                NIL_REF,
                2,
                &[AttrFixture {
                    ns: 1,
                    name: 3,
                    raw_value: NIL_REF,
                    data_type: TYPE_INT_DEC,
                    data: 1,
                }],
            ),
            end_element_chunk(NIL_REF, 2),
            end_namespace_chunk(0, 1),
        ]);
        let xml = XmlFile::from_bytes(&doc).unwrap();
        assert_eq!(
            xml.document(),
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <manifest xmlns:android=\"http://schemas.android.com/apk/res/android\" \
             android:versionCode=\"1\"></manifest>"
        );
    }

    #[test]
    fn attribute_values_are_escaped() {
        let pool = string_pool_chunk(&["root", "label", "a<b>&\"c'd"]);
        let doc = xml_chunk(&[
            pool,
            start_element_chunk(
                NIL_REF,
                0,
                &[AttrFixture {
                    ns: NIL_REF,
                    name: 1,
                    raw_value: 2,
                    data_type: TYPE_STRING,
                    data: 2,
                }],
            ),
            end_element_chunk(NIL_REF, 0),
        ]);
        let xml = XmlFile::from_bytes(&doc).unwrap();
        let document = xml.document();
        assert!(document.contains("label=\"a&lt;b&gt;&amp;&quot;c&apos;d\""));
        let body = document.trim_start_matches("<?xml version=\"1.0\" encoding=\"utf-8\"?>");
        assert!(!body.contains("a<b"));
    }

    #[test]
    fn cdata_is_emitted_escaped() {
        let pool = string_pool_chunk(&["root", "1 < 2 & 3"]);
        let doc = xml_chunk(&[
            pool,
            start_element_chunk(NIL_REF, 0, &[]),
            cdata_chunk(1),
            end_element_chunk(NIL_REF, 0),
        ]);
        let xml = XmlFile::from_bytes(&doc).unwrap();
        assert!(xml.document().contains("<root>1 &lt; 2 &amp; 3</root>"));
    }

    #[test]
    fn unbalanced_tree_is_malformed() {
        let pool = string_pool_chunk(&["root"]);
        let doc = xml_chunk(&[pool.clone(), start_element_chunk(NIL_REF, 0, &[])]);
        assert!(matches!(
            XmlFile::from_bytes(&doc),
            Err(Error::Malformed { .. })
        ));

        let doc = xml_chunk(&[pool, end_element_chunk(NIL_REF, 0)]);
        assert!(matches!(
            XmlFile::from_bytes(&doc),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn resource_map_is_exposed() {
        let pool = string_pool_chunk(&["versionCode", "root"]);
        let ids = [0x0101021Bu32, 0];
        let doc = xml_chunk(&[
            pool,
            crate::tests::fixtures::resource_map_chunk(&ids),
            start_element_chunk(NIL_REF, 1, &[]),
            end_element_chunk(NIL_REF, 1),
        ]);
        let xml = XmlFile::from_bytes(&doc).unwrap();
        assert_eq!(xml.resource_map(), &ids);
    }

    #[test]
    fn table_input_is_bad_magic() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0x0002u16.to_le_bytes());
        buf.extend_from_slice(&8u16.to_le_bytes());
        buf.extend_from_slice(&8u32.to_le_bytes());
        assert_eq!(
            XmlFile::from_bytes(&buf).unwrap_err(),
            Error::BadMagic { type_code: 0x0002 }
        );
    }

    #[test]
    fn typed_value_rendering() {
        let pool_chunk = string_pool_chunk(&["pooled"]);
        let mut r = Reader::new(&pool_chunk);
        let (header, mut window) = next_chunk(&mut r).unwrap().unwrap();
        let pool = StringPool::read(&mut window, &header).unwrap();

        let render = |data_type: u8, data: u32| {
            render_value(
                &pool,
                NIL_REF,
                &ResValue {
                    size: 8,
                    res0: 0,
                    data_type,
                    data,
                },
            )
            .unwrap()
        };

        assert_eq!(render(TYPE_NULL, 7), "");
        assert_eq!(render(TYPE_REFERENCE, 0x7F010000), "@0x7F010000");
        assert_eq!(render(TYPE_ATTRIBUTE, 0x0101021B), "?0x0101021B");
        assert_eq!(render(TYPE_STRING, 0), "pooled");
        assert_eq!(render(TYPE_INT_DEC, 4294967295), "4294967295");
        assert_eq!(render(TYPE_INT_HEX, 0xFF), "0x000000FF");
        assert_eq!(render(TYPE_INT_BOOLEAN, 0), "false");
        assert_eq!(render(TYPE_INT_BOOLEAN, 0xFFFFFFFF), "true");
        assert_eq!(render(TYPE_FLOAT, 1.5f32.to_bits()), "1.5");
        // 16dip: mantissa 16 << 8, radix 0, unit 1.
        assert_eq!(render(TYPE_DIMENSION, (16 << 8) | 1), "16dip");
        // 50%: 0.5 as 0p23 mantissa, radix 3, unit 0.
        assert_eq!(render(TYPE_FRACTION, 0x4000_0030), "50%");
        assert_eq!(render(TYPE_INT_COLOR_ARGB8, 0xFF00CC88), "#FF00CC88");
        assert_eq!(render(TYPE_INT_COLOR_RGB8, 0xFF00CC88), "#00CC88");
        assert_eq!(render(TYPE_INT_COLOR_ARGB4, 0xFF00CC88), "#F0C8");
        assert_eq!(render(TYPE_INT_COLOR_RGB4, 0xFF00CC88), "#0C8");
        // Unknown data types fall back to a reference-style rendering.
        assert_eq!(render(0x07, 0xAB), "@0x000000AB");
    }

    #[test]
    fn raw_value_wins_over_typed_value() {
        let pool_chunk = string_pool_chunk(&["rawtext"]);
        let mut r = Reader::new(&pool_chunk);
        let (header, mut window) = next_chunk(&mut r).unwrap().unwrap();
        let pool = StringPool::read(&mut window, &header).unwrap();
        let rendered = render_value(
            &pool,
            0,
            &ResValue {
                size: 8,
                res0: 0,
                data_type: TYPE_INT_DEC,
                data: 42,
            },
        )
        .unwrap();
        assert_eq!(rendered, "rawtext");
    }

    #[test]
    fn nested_namespaces_qualify_inner_elements() {
        let pool = string_pool_chunk(&["app", "http://example.com/apk/res-auto", "outer", "inner"]);
        let doc = xml_chunk(&[
            pool,
            start_element_chunk(NIL_REF, 2, &[]),
            start_namespace_chunk(0, 1),
            start_element_chunk(1, 3, &[]),
            end_element_chunk(1, 3),
            end_namespace_chunk(0, 1),
            end_element_chunk(NIL_REF, 2),
        ]);
        let xml = XmlFile::from_bytes(&doc).unwrap();
        assert!(xml
            .document()
            .contains("<app:inner xmlns:app=\"http://example.com/apk/res-auto\"></app:inner>"));
    }
}
