//! Little-endian writers for synthetic resource containers.
//!
//! Shared by the unit tests, the integration tests and the benchmark, so this file only uses
//! std.
#![allow(dead_code)]

pub const TYPE_NULL: u8 = 0x00;
pub const TYPE_REFERENCE: u8 = 0x01;
pub const TYPE_ATTRIBUTE: u8 = 0x02;
pub const TYPE_STRING: u8 = 0x03;
pub const TYPE_DIMENSION: u8 = 0x05;
pub const TYPE_INT_DEC: u8 = 0x10;
pub const TYPE_INT_BOOLEAN: u8 = 0x12;
pub const TYPE_INT_COLOR_ARGB8: u8 = 0x1c;

pub const NO_ENTRY: u32 = 0xffff_ffff;
const NO_STRING: u32 = 0xffff_ffff;

const STRING_POOL: u16 = 0x0001;
const TABLE: u16 = 0x0002;
const XML: u16 = 0x0003;
const XML_START_NAMESPACE: u16 = 0x0100;
const XML_END_NAMESPACE: u16 = 0x0101;
const XML_START_ELEMENT: u16 = 0x0102;
const XML_END_ELEMENT: u16 = 0x0103;
const XML_CDATA: u16 = 0x0104;
const XML_RESOURCE_MAP: u16 = 0x0180;
const PACKAGE: u16 = 0x0200;
const TYPE: u16 = 0x0201;
const TYPE_SPEC: u16 = 0x0202;

/// A chunk: `type headerSize size`, then `header_ext` (rest of the header), then `body`.
pub fn chunk(chunk_type: u16, header_ext: &[u8], body: &[u8]) -> Vec<u8> {
    let header_size = 8 + header_ext.len();
    let size = header_size + body.len();
    let mut out = Vec::with_capacity(size);
    out.extend_from_slice(&chunk_type.to_le_bytes());
    out.extend_from_slice(&(header_size as u16).to_le_bytes());
    out.extend_from_slice(&(size as u32).to_le_bytes());
    out.extend_from_slice(header_ext);
    out.extend_from_slice(body);
    out
}

/// `size(u16)=8 res0(u8) dataType(u8) data(u32)`
pub fn value_bytes(data_type: u8, data: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&8u16.to_le_bytes());
    out.push(0);
    out.push(data_type);
    out.extend_from_slice(&data.to_le_bytes());
    out
}

fn pad4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

fn u32s(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[derive(Debug, Clone)]
pub struct StringPoolBuilder {
    strings: Vec<String>,
    utf8: bool,
    styles: Vec<Vec<[u32; 3]>>,
}

impl StringPoolBuilder {
    pub fn utf16(strings: &[&str]) -> Self {
        StringPoolBuilder {
            strings: strings.iter().map(|s| s.to_string()).collect(),
            utf8: false,
            styles: Vec::new(),
        }
    }

    pub fn utf8(strings: &[&str]) -> Self {
        StringPoolBuilder {
            utf8: true,
            ..StringPoolBuilder::utf16(strings)
        }
    }

    /// Span runs `[name, first, last]` for the first `styles.len()` strings.
    pub fn with_styles(mut self, styles: Vec<Vec<[u32; 3]>>) -> Self {
        self.styles = styles;
        self
    }

    fn encode_string(&self, s: &str, out: &mut Vec<u8>) {
        if self.utf8 {
            let units = s.encode_utf16().count();
            push_length8(out, units);
            push_length8(out, s.len());
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        } else {
            let units: Vec<u16> = s.encode_utf16().collect();
            let len = units.len();
            if len > 0x7fff {
                out.extend_from_slice(&(0x8000 | (len >> 16) as u16).to_le_bytes());
                out.extend_from_slice(&((len & 0xffff) as u16).to_le_bytes());
            } else {
                out.extend_from_slice(&(len as u16).to_le_bytes());
            }
            for unit in units {
                out.extend_from_slice(&unit.to_le_bytes());
            }
            out.extend_from_slice(&0u16.to_le_bytes());
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let mut string_offsets = Vec::with_capacity(self.strings.len());
        let mut string_data = Vec::new();
        for s in &self.strings {
            string_offsets.push(string_data.len() as u32);
            self.encode_string(s, &mut string_data);
        }
        pad4(&mut string_data);

        let mut style_offsets = Vec::with_capacity(self.styles.len());
        let mut style_data = Vec::new();
        for run in &self.styles {
            style_offsets.push((style_data.len() * 4) as u32);
            for span in run {
                style_data.extend_from_slice(span);
            }
            style_data.push(NO_STRING);
        }
        if !self.styles.is_empty() {
            style_data.extend_from_slice(&[NO_STRING, NO_STRING]);
        }

        let header_size = 28u32;
        let strings_start = header_size + 4 * (self.strings.len() + self.styles.len()) as u32;
        let styles_start = if self.styles.is_empty() {
            0
        } else {
            strings_start + string_data.len() as u32
        };
        let flags: u32 = if self.utf8 { 1 << 8 } else { 0 };

        let mut header_ext = Vec::with_capacity(20);
        header_ext.extend_from_slice(&(self.strings.len() as u32).to_le_bytes());
        header_ext.extend_from_slice(&(self.styles.len() as u32).to_le_bytes());
        header_ext.extend_from_slice(&flags.to_le_bytes());
        header_ext.extend_from_slice(&strings_start.to_le_bytes());
        header_ext.extend_from_slice(&styles_start.to_le_bytes());

        let mut body = u32s(&string_offsets);
        body.extend(u32s(&style_offsets));
        body.extend(string_data);
        body.extend(u32s(&style_data));
        chunk(STRING_POOL, &header_ext, &body)
    }
}

fn push_length8(out: &mut Vec<u8>, len: usize) {
    if len > 0x7f {
        out.push(0x80 | (len >> 8) as u8);
        out.push((len & 0xff) as u8);
    } else {
        out.push(len as u8);
    }
}

/// A 36-byte configuration record with only language and density set.
pub fn config_bytes(density: u16, language: Option<&[u8; 2]>) -> Vec<u8> {
    let mut out = vec![0u8; 36];
    out[0..4].copy_from_slice(&36u32.to_le_bytes());
    if let Some(language) = language {
        out[8..10].copy_from_slice(language);
    }
    out[14..16].copy_from_slice(&density.to_le_bytes());
    out
}

#[derive(Debug, Clone)]
pub enum EntryDef {
    Simple {
        key: u32,
        data_type: u8,
        data: u32,
    },
    Complex {
        key: u32,
        parent: u32,
        items: Vec<(u32, u8, u32)>,
    },
}

impl EntryDef {
    pub fn simple(key: u32, data_type: u8, data: u32) -> Self {
        EntryDef::Simple {
            key,
            data_type,
            data,
        }
    }

    /// `items` are `(name, data type, data)`.
    pub fn complex(key: u32, parent: u32, items: Vec<(u32, u8, u32)>) -> Self {
        EntryDef::Complex { key, parent, items }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            EntryDef::Simple {
                key,
                data_type,
                data,
            } => {
                out.extend_from_slice(&8u16.to_le_bytes());
                out.extend_from_slice(&0u16.to_le_bytes());
                out.extend_from_slice(&key.to_le_bytes());
                out.extend(value_bytes(*data_type, *data));
            }
            EntryDef::Complex { key, parent, items } => {
                out.extend_from_slice(&16u16.to_le_bytes());
                out.extend_from_slice(&1u16.to_le_bytes());
                out.extend_from_slice(&key.to_le_bytes());
                out.extend_from_slice(&parent.to_le_bytes());
                out.extend_from_slice(&(items.len() as u32).to_le_bytes());
                for (name, data_type, data) in items {
                    out.extend_from_slice(&name.to_le_bytes());
                    out.extend(value_bytes(*data_type, *data));
                }
            }
        }
        out
    }
}

/// One configuration variant of a type. `None` entries are absent.
#[derive(Debug, Clone)]
pub struct TypeChunk {
    type_id: u8,
    config: Vec<u8>,
    entries: Vec<Option<EntryDef>>,
}

impl TypeChunk {
    pub fn new(type_id: u8, config: Vec<u8>, entries: Vec<Option<EntryDef>>) -> Self {
        TypeChunk {
            type_id,
            config,
            entries,
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let count = self.entries.len() as u32;
        let header_size = 8 + 12 + self.config.len() as u32;
        let entries_start = header_size + 4 * count;

        let mut offsets = Vec::with_capacity(self.entries.len());
        let mut data = Vec::new();
        for entry in &self.entries {
            match entry {
                Some(entry) => {
                    offsets.push(data.len() as u32);
                    data.extend(entry.encode());
                }
                None => offsets.push(NO_ENTRY),
            }
        }

        let mut header_ext = vec![self.type_id, 0, 0, 0];
        header_ext.extend_from_slice(&count.to_le_bytes());
        header_ext.extend_from_slice(&entries_start.to_le_bytes());
        header_ext.extend_from_slice(&self.config);

        let mut body = u32s(&offsets);
        body.extend(data);
        chunk(TYPE, &header_ext, &body)
    }
}

#[derive(Debug, Clone)]
pub struct PackageBuilder {
    id: u32,
    name: String,
    type_names: Vec<String>,
    key_names: Vec<String>,
    chunks: Vec<Vec<u8>>,
}

impl PackageBuilder {
    pub fn new(id: u32, name: &str) -> Self {
        PackageBuilder {
            id,
            name: name.to_string(),
            type_names: Vec::new(),
            key_names: Vec::new(),
            chunks: Vec::new(),
        }
    }

    pub fn type_names(mut self, names: &[&str]) -> Self {
        self.type_names = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn key_names(mut self, names: &[&str]) -> Self {
        self.key_names = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Append a type spec chunk for `type_id` with one flag word per entry.
    pub fn spec(mut self, type_id: u8, flags: &[u32]) -> Self {
        let mut header_ext = vec![type_id, 0, 0, 0];
        header_ext.extend_from_slice(&(flags.len() as u32).to_le_bytes());
        self.chunks.push(chunk(TYPE_SPEC, &header_ext, &u32s(flags)));
        self
    }

    /// Append a type chunk.
    pub fn types(mut self, ty: TypeChunk) -> Self {
        self.chunks.push(ty.build());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let type_names: Vec<&str> = self.type_names.iter().map(String::as_str).collect();
        let key_names: Vec<&str> = self.key_names.iter().map(String::as_str).collect();
        let type_pool = StringPoolBuilder::utf16(&type_names).build();
        let key_pool = StringPoolBuilder::utf16(&key_names).build();

        let header_size = 284u32;
        let mut header_ext = Vec::with_capacity(276);
        header_ext.extend_from_slice(&self.id.to_le_bytes());
        let mut name_units: Vec<u16> = self.name.encode_utf16().take(127).collect();
        name_units.resize(128, 0);
        for unit in name_units {
            header_ext.extend_from_slice(&unit.to_le_bytes());
        }
        header_ext.extend_from_slice(&header_size.to_le_bytes());
        header_ext.extend_from_slice(&(self.type_names.len() as u32).to_le_bytes());
        header_ext.extend_from_slice(&(header_size + type_pool.len() as u32).to_le_bytes());
        header_ext.extend_from_slice(&(self.key_names.len() as u32).to_le_bytes());

        let mut body = type_pool;
        body.extend(key_pool);
        for c in &self.chunks {
            body.extend_from_slice(c);
        }
        chunk(PACKAGE, &header_ext, &body)
    }
}

/// A table chunk holding the value pool and `packages`.
pub fn table(values: &StringPoolBuilder, packages: &[Vec<u8>]) -> Vec<u8> {
    let mut body = values.build();
    for package in packages {
        body.extend_from_slice(package);
    }
    chunk(TABLE, &(packages.len() as u32).to_le_bytes(), &body)
}

/// An attribute of [`XmlBuilder::start_element`].
#[derive(Debug, Clone)]
pub struct XmlAttr {
    ns: Option<String>,
    name: String,
    raw: Option<String>,
    data_type: u8,
    data: u32,
}

impl XmlAttr {
    /// A string attribute: raw value and typed STRING value both point at `value`.
    pub fn string(ns: Option<&str>, name: &str, value: &str) -> Self {
        XmlAttr {
            ns: ns.map(str::to_string),
            name: name.to_string(),
            raw: Some(value.to_string()),
            data_type: TYPE_STRING,
            data: 0,
        }
    }

    /// A typed attribute without raw text.
    pub fn typed(ns: Option<&str>, name: &str, data_type: u8, data: u32) -> Self {
        XmlAttr {
            ns: ns.map(str::to_string),
            name: name.to_string(),
            raw: None,
            data_type,
            data,
        }
    }
}

/// Writes a compiled XML document node by node.
#[derive(Debug, Clone, Default)]
pub struct XmlBuilder {
    strings: Vec<String>,
    res_ids: Vec<u32>,
    nodes: Vec<Vec<u8>>,
    line: u32,
    comment: Option<String>,
}

impl XmlBuilder {
    pub fn new() -> Self {
        XmlBuilder {
            line: 1,
            ..XmlBuilder::default()
        }
    }

    /// Map attribute name `name` to resource `id`. Must come before any other node.
    pub fn resource_attr(mut self, name: &str, id: u32) -> Self {
        assert_eq!(
            self.strings.len(),
            self.res_ids.len(),
            "resource attributes must be declared first"
        );
        self.strings.push(name.to_string());
        self.res_ids.push(id);
        self
    }

    /// Line number for the following nodes.
    pub fn line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    /// Comment attached to the next node.
    pub fn comment(mut self, text: &str) -> Self {
        self.comment = Some(text.to_string());
        self
    }

    fn intern(&mut self, s: &str) -> u32 {
        match self.strings.iter().position(|x| x == s) {
            Some(i) => i as u32,
            None => {
                self.strings.push(s.to_string());
                self.strings.len() as u32 - 1
            }
        }
    }

    fn intern_opt(&mut self, s: Option<&str>) -> u32 {
        s.map_or(NO_STRING, |s| self.intern(s))
    }

    fn node(&mut self, chunk_type: u16, ext: Vec<u8>) {
        let comment = self.comment.take();
        let comment = self.intern_opt(comment.as_deref());
        let mut header_ext = Vec::with_capacity(8);
        header_ext.extend_from_slice(&self.line.to_le_bytes());
        header_ext.extend_from_slice(&comment.to_le_bytes());
        self.nodes.push(chunk(chunk_type, &header_ext, &ext));
    }

    fn namespace(mut self, chunk_type: u16, prefix: &str, uri: &str) -> Self {
        let prefix = self.intern(prefix);
        let uri = self.intern(uri);
        self.node(chunk_type, u32s(&[prefix, uri]));
        self
    }

    pub fn start_namespace(self, prefix: &str, uri: &str) -> Self {
        self.namespace(XML_START_NAMESPACE, prefix, uri)
    }

    pub fn end_namespace(self, prefix: &str, uri: &str) -> Self {
        self.namespace(XML_END_NAMESPACE, prefix, uri)
    }

    pub fn start_element(mut self, ns: Option<&str>, name: &str, attrs: Vec<XmlAttr>) -> Self {
        let ns_ref = self.intern_opt(ns);
        let name_ref = self.intern(name);
        let (mut id_index, mut class_index, mut style_index) = (0u16, 0u16, 0u16);
        let mut records = Vec::new();
        for (i, attr) in attrs.iter().enumerate() {
            let attr_ns = self.intern_opt(attr.ns.as_deref());
            let attr_name = self.intern(&attr.name);
            let raw = self.intern_opt(attr.raw.as_deref());
            let data = if attr.raw.is_some() && attr.data_type == TYPE_STRING {
                raw
            } else {
                attr.data
            };
            if attr.ns.is_none() {
                match attr.name.as_str() {
                    "id" => id_index = i as u16 + 1,
                    "class" => class_index = i as u16 + 1,
                    "style" => style_index = i as u16 + 1,
                    _ => {}
                }
            }
            records.extend(u32s(&[attr_ns, attr_name, raw]));
            records.extend(value_bytes(attr.data_type, data));
        }

        let mut ext = u32s(&[ns_ref, name_ref]);
        for field in [20u16, 20, attrs.len() as u16, id_index, class_index, style_index] {
            ext.extend_from_slice(&field.to_le_bytes());
        }
        ext.extend(records);
        self.node(XML_START_ELEMENT, ext);
        self
    }

    pub fn end_element(mut self, ns: Option<&str>, name: &str) -> Self {
        let ns_ref = self.intern_opt(ns);
        let name_ref = self.intern(name);
        self.node(XML_END_ELEMENT, u32s(&[ns_ref, name_ref]));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        let data = self.intern(text);
        let mut ext = data.to_le_bytes().to_vec();
        ext.extend(value_bytes(TYPE_NULL, 0));
        self.node(XML_CDATA, ext);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let strings: Vec<&str> = self.strings.iter().map(String::as_str).collect();
        let mut body = StringPoolBuilder::utf16(&strings).build();
        if !self.res_ids.is_empty() {
            body.extend(chunk(XML_RESOURCE_MAP, &[], &u32s(&self.res_ids)));
        }
        for node in &self.nodes {
            body.extend_from_slice(node);
        }
        chunk(XML, &[], &body)
    }
}
