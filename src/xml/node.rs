use serde::Serialize;

use crate::chunk::{
    ChunkHeader, RES_XML_CDATA_TYPE, RES_XML_END_ELEMENT_TYPE, RES_XML_END_NAMESPACE_TYPE,
    RES_XML_START_ELEMENT_TYPE, RES_XML_START_NAMESPACE_TYPE,
};
use crate::err::{ResError, Result};
use crate::utils::ByteCursor;
use crate::value::ResValue;

/// String reference meaning "no string".
const NO_STRING: u32 = 0xffff_ffff;

/// `lineNumber(u32) comment(u32)` after the chunk header.
const NODE_HEADER_SIZE: usize = ChunkHeader::SIZE + 8;

const NAMESPACE_EXT_SIZE: usize = 8;
const ATTR_EXT_SIZE: usize = 20;
const END_ELEMENT_EXT_SIZE: usize = 8;
const CDATA_EXT_SIZE: usize = 4 + ResValue::SIZE;

/// Size of one attribute record.
pub(crate) const ATTRIBUTE_SIZE: usize = 12 + ResValue::SIZE;

pub(crate) fn string_ref(raw: u32) -> Option<u32> {
    (raw != NO_STRING).then_some(raw)
}

/// What [`BinaryXmlParser::next`](super::BinaryXmlParser::next) reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum XmlEvent {
    BadDocument,
    StartDocument,
    EndDocument,
    StartNamespace,
    EndNamespace,
    StartTag,
    EndTag,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    pub chunk: ChunkHeader,
    pub line_number: u32,
    pub comment: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceExt {
    pub prefix: Option<u32>,
    pub uri: Option<u32>,
}

/// Start-element extension. `offset` is the absolute position of the extension, which is what
/// `attribute_start` counts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrExt {
    pub offset: usize,
    pub ns: Option<u32>,
    pub name: u32,
    pub attribute_start: u16,
    pub attribute_size: u16,
    pub attribute_count: u16,
    /// 1-based attribute index, 0 when absent.
    pub id_index: u16,
    pub class_index: u16,
    pub style_index: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndElementExt {
    pub ns: Option<u32>,
    pub name: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CDataExt {
    pub data: u32,
    pub typed_data: ResValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlNode {
    StartNamespace { header: NodeHeader, ext: NamespaceExt },
    EndNamespace { header: NodeHeader, ext: NamespaceExt },
    StartElement { header: NodeHeader, ext: AttrExt },
    EndElement { header: NodeHeader, ext: EndElementExt },
    CData { header: NodeHeader, ext: CDataExt },
}

/// A decoded attribute record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct XmlAttribute {
    pub ns: Option<u32>,
    pub name: u32,
    pub raw_value: Option<u32>,
    pub typed_value: ResValue,
}

impl XmlAttribute {
    pub(crate) fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        Ok(XmlAttribute {
            ns: string_ref(cursor.u32_named("attribute namespace")?),
            name: cursor.u32_named("attribute name")?,
            raw_value: string_ref(cursor.u32_named("attribute raw value")?),
            typed_value: ResValue::read(cursor)?,
        })
    }
}

impl XmlNode {
    /// Decode the node in `chunk`.
    ///
    /// `Ok(None)` for a node type this decoder does not know. A chunk too small for its
    /// extension is an error.
    pub(crate) fn read(buf: &[u8], chunk: ChunkHeader) -> Result<Option<Self>> {
        let min_ext = match chunk.chunk_type {
            RES_XML_START_NAMESPACE_TYPE | RES_XML_END_NAMESPACE_TYPE => NAMESPACE_EXT_SIZE,
            RES_XML_START_ELEMENT_TYPE => ATTR_EXT_SIZE,
            RES_XML_END_ELEMENT_TYPE => END_ELEMENT_EXT_SIZE,
            RES_XML_CDATA_TYPE => CDATA_EXT_SIZE,
            _ => return Ok(None),
        };
        if (chunk.header_size as usize) < NODE_HEADER_SIZE {
            return Err(ResError::malformed(
                "xml node",
                chunk.offset,
                format!("header size {} is too small", chunk.header_size),
            ));
        }
        if chunk.body_len() < min_ext {
            return Err(ResError::malformed(
                "xml node",
                chunk.offset,
                format!(
                    "extension has {} bytes, needs {min_ext}",
                    chunk.body_len()
                ),
            ));
        }

        let buf = &buf[..chunk.end()];
        let mut cursor = ByteCursor::with_pos(buf, chunk.offset + ChunkHeader::SIZE)?;
        let header = NodeHeader {
            chunk,
            line_number: cursor.u32_named("node line number")?,
            comment: string_ref(cursor.u32_named("node comment")?),
        };

        cursor.set_pos(chunk.body_offset(), "node extension")?;
        let node = match chunk.chunk_type {
            RES_XML_START_NAMESPACE_TYPE | RES_XML_END_NAMESPACE_TYPE => {
                let ext = NamespaceExt {
                    prefix: string_ref(cursor.u32_named("namespace prefix")?),
                    uri: string_ref(cursor.u32_named("namespace uri")?),
                };
                if chunk.chunk_type == RES_XML_START_NAMESPACE_TYPE {
                    XmlNode::StartNamespace { header, ext }
                } else {
                    XmlNode::EndNamespace { header, ext }
                }
            }
            RES_XML_START_ELEMENT_TYPE => XmlNode::StartElement {
                header,
                ext: AttrExt {
                    offset: chunk.body_offset(),
                    ns: string_ref(cursor.u32_named("element namespace")?),
                    name: cursor.u32_named("element name")?,
                    attribute_start: cursor.u16_named("attribute start")?,
                    attribute_size: cursor.u16_named("attribute size")?,
                    attribute_count: cursor.u16_named("attribute count")?,
                    id_index: cursor.u16_named("id index")?,
                    class_index: cursor.u16_named("class index")?,
                    style_index: cursor.u16_named("style index")?,
                },
            },
            RES_XML_END_ELEMENT_TYPE => XmlNode::EndElement {
                header,
                ext: EndElementExt {
                    ns: string_ref(cursor.u32_named("element namespace")?),
                    name: cursor.u32_named("element name")?,
                },
            },
            _ => XmlNode::CData {
                header,
                ext: CDataExt {
                    data: cursor.u32_named("cdata")?,
                    typed_data: ResValue::read(&mut cursor)?,
                },
            },
        };
        Ok(Some(node))
    }

    pub fn header(&self) -> &NodeHeader {
        match self {
            XmlNode::StartNamespace { header, .. }
            | XmlNode::EndNamespace { header, .. }
            | XmlNode::StartElement { header, .. }
            | XmlNode::EndElement { header, .. }
            | XmlNode::CData { header, .. } => header,
        }
    }

    pub fn event(&self) -> XmlEvent {
        match self {
            XmlNode::StartNamespace { .. } => XmlEvent::StartNamespace,
            XmlNode::EndNamespace { .. } => XmlEvent::EndNamespace,
            XmlNode::StartElement { .. } => XmlEvent::StartTag,
            XmlNode::EndElement { .. } => XmlEvent::EndTag,
            XmlNode::CData { .. } => XmlEvent::Text,
        }
    }
}
