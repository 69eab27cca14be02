use log::{trace, warn};

use crate::chunk::ChunkHeader;
use crate::err::{ResError, Result};
use crate::string_pool::StringPool;
use crate::utils::ByteCursor;
use crate::value::{DataType, ResValue};
use crate::xml::node::{ATTRIBUTE_SIZE, AttrExt, XmlAttribute, XmlEvent, XmlNode};
use crate::xml::tree::BinaryXmlTree;

/// Pull parser over a [`BinaryXmlTree`].
///
/// Only the current node is kept; attributes are decoded from the buffer when asked for.
#[derive(Debug, Clone)]
pub struct BinaryXmlParser<'t> {
    tree: &'t BinaryXmlTree,
    event: XmlEvent,
    node: Option<XmlNode>,
}

impl<'t> BinaryXmlParser<'t> {
    pub fn new(tree: &'t BinaryXmlTree) -> Self {
        let mut parser = BinaryXmlParser {
            tree,
            event: XmlEvent::BadDocument,
            node: None,
        };
        parser.restart();
        parser
    }

    /// Rewind to the start of the document.
    pub fn restart(&mut self) {
        self.node = None;
        self.event = match self.tree.status() {
            Ok(()) => XmlEvent::StartDocument,
            Err(_) => XmlEvent::BadDocument,
        };
    }

    pub fn tree(&self) -> &'t BinaryXmlTree {
        self.tree
    }

    pub fn strings(&self) -> &'t StringPool {
        self.tree.strings()
    }

    pub fn event(&self) -> XmlEvent {
        self.event
    }

    /// Advance to the next node.
    ///
    /// Once [`XmlEvent::EndDocument`] or [`XmlEvent::BadDocument`] is reached it is returned
    /// for every further call.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> XmlEvent {
        match self.event {
            XmlEvent::StartDocument => {
                self.node = self.tree.root();
                self.event = self.node.map_or(XmlEvent::BadDocument, |n| n.event());
            }
            XmlEvent::EndDocument | XmlEvent::BadDocument => {}
            _ => self.event = self.next_node(),
        }
        self.event
    }

    fn next_node(&mut self) -> XmlEvent {
        let Some(current) = self.node else {
            return XmlEvent::BadDocument;
        };
        let buf = self.tree.data();
        let mut pos = current.header().chunk.end();
        loop {
            if pos >= self.tree.data_end() {
                self.node = None;
                return XmlEvent::EndDocument;
            }
            let chunk = match ChunkHeader::read(buf, pos) {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!("bad xml node at offset {pos}: {err}");
                    self.node = None;
                    return XmlEvent::BadDocument;
                }
            };
            match XmlNode::read(buf, chunk) {
                Ok(Some(node)) => {
                    self.node = Some(node);
                    return node.event();
                }
                Ok(None) => {
                    trace!(
                        "skipping node type 0x{:04x} at offset {pos}",
                        chunk.chunk_type
                    );
                    pos = chunk.end();
                }
                Err(err) => {
                    warn!("bad xml node at offset {pos}: {err}");
                    self.node = None;
                    return XmlEvent::BadDocument;
                }
            }
        }
    }

    fn string(&self, index: Option<u32>) -> Option<String> {
        self.strings().string_at(index? as usize)
    }

    pub fn line_number(&self) -> Option<u32> {
        self.node.map(|n| n.header().line_number)
    }

    pub fn comment_id(&self) -> Option<u32> {
        self.node.and_then(|n| n.header().comment)
    }

    pub fn comment(&self) -> Option<String> {
        self.string(self.comment_id())
    }

    /// String index of the current text node.
    pub fn text_id(&self) -> Option<u32> {
        match self.node? {
            XmlNode::CData { ext, .. } => super::node::string_ref(ext.data),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<String> {
        self.string(self.text_id())
    }

    /// Typed value attached to the current text node.
    pub fn text_value(&self) -> Option<ResValue> {
        match self.node? {
            XmlNode::CData { ext, .. } => Some(ext.typed_data),
            _ => None,
        }
    }

    pub fn namespace_prefix_id(&self) -> Option<u32> {
        match self.node? {
            XmlNode::StartNamespace { ext, .. } | XmlNode::EndNamespace { ext, .. } => ext.prefix,
            _ => None,
        }
    }

    pub fn namespace_prefix(&self) -> Option<String> {
        self.string(self.namespace_prefix_id())
    }

    pub fn namespace_uri_id(&self) -> Option<u32> {
        match self.node? {
            XmlNode::StartNamespace { ext, .. } | XmlNode::EndNamespace { ext, .. } => ext.uri,
            _ => None,
        }
    }

    pub fn namespace_uri(&self) -> Option<String> {
        self.string(self.namespace_uri_id())
    }

    pub fn element_namespace_id(&self) -> Option<u32> {
        match self.node? {
            XmlNode::StartElement { ext, .. } => ext.ns,
            XmlNode::EndElement { ext, .. } => ext.ns,
            _ => None,
        }
    }

    pub fn element_namespace(&self) -> Option<String> {
        self.string(self.element_namespace_id())
    }

    pub fn element_name_id(&self) -> Option<u32> {
        match self.node? {
            XmlNode::StartElement { ext, .. } => Some(ext.name),
            XmlNode::EndElement { ext, .. } => Some(ext.name),
            _ => None,
        }
    }

    pub fn element_name(&self) -> Option<String> {
        self.string(self.element_name_id())
    }

    fn element(&self) -> Option<&AttrExt> {
        match &self.node {
            Some(XmlNode::StartElement { ext, .. }) => Some(ext),
            _ => None,
        }
    }

    /// Attribute count of the current start tag, 0 elsewhere.
    pub fn attribute_count(&self) -> usize {
        self.element().map_or(0, |ext| ext.attribute_count as usize)
    }

    /// Decode attribute `index` of the current start tag.
    pub fn attribute(&self, index: usize) -> Option<XmlAttribute> {
        let ext = self.element()?;
        if index >= ext.attribute_count as usize {
            return None;
        }
        let stride = (ext.attribute_size as usize).max(ATTRIBUTE_SIZE);
        let at = ext
            .offset
            .checked_add(ext.attribute_start as usize)?
            .checked_add(stride.checked_mul(index)?)?;
        let node_end = self.node?.header().chunk.end();
        if at.checked_add(ATTRIBUTE_SIZE)? > node_end {
            warn!(
                "attribute {index} of element at offset {} runs past the node end {node_end}",
                ext.offset
            );
            return None;
        }
        let mut cursor = ByteCursor::with_pos(self.tree.data().get(..node_end)?, at).ok()?;
        match XmlAttribute::read(&mut cursor) {
            Ok(attr) => Some(attr),
            Err(err) => {
                warn!("attribute {index} of element at offset {}: {err}", ext.offset);
                None
            }
        }
    }

    pub fn attribute_namespace_id(&self, index: usize) -> Option<u32> {
        self.attribute(index)?.ns
    }

    pub fn attribute_namespace(&self, index: usize) -> Option<String> {
        self.string(self.attribute_namespace_id(index))
    }

    pub fn attribute_name_id(&self, index: usize) -> Option<u32> {
        self.attribute(index).map(|a| a.name)
    }

    pub fn attribute_name(&self, index: usize) -> Option<String> {
        self.string(self.attribute_name_id(index))
    }

    /// Attribute resource id of attribute `index`, taken from the document's resource map.
    pub fn attribute_name_res_id(&self, index: usize) -> Option<u32> {
        self.tree.resource_id(self.attribute_name_id(index)?)
    }

    pub fn attribute_value_string_id(&self, index: usize) -> Option<u32> {
        self.attribute(index)?.raw_value
    }

    /// The raw (source text) value of attribute `index`.
    pub fn attribute_string_value(&self, index: usize) -> Option<String> {
        self.string(self.attribute_value_string_id(index))
    }

    pub fn attribute_value(&self, index: usize) -> Option<ResValue> {
        self.attribute(index).map(|a| a.typed_value)
    }

    /// Data type of attribute `index`; NULL when there is no such attribute.
    pub fn attribute_data_type(&self, index: usize) -> DataType {
        self.attribute_value(index)
            .map_or(DataType::NULL, |v| v.data_type)
    }

    pub fn attribute_data(&self, index: usize) -> u32 {
        self.attribute_value(index).map_or(0, |v| v.data)
    }

    /// Index of the attribute `name` in namespace `ns` (`None` for no namespace).
    pub fn index_of_attribute(&self, ns: Option<&str>, name: &str) -> Result<usize> {
        let not_found = || ResError::NameNotFound {
            what: "attribute",
            name: match ns {
                Some(ns) => format!("{ns}:{name}"),
                None => name.to_string(),
            },
        };
        if self.element().is_none() {
            return Err(not_found());
        }
        for i in 0..self.attribute_count() {
            if self.attribute_name(i).as_deref() != Some(name) {
                continue;
            }
            if self.attribute_namespace(i).as_deref() == ns {
                return Ok(i);
            }
        }
        Err(not_found())
    }

    /// Index of the element's `id` attribute.
    pub fn index_of_id(&self) -> Result<usize> {
        self.special_index(|ext| ext.id_index, "id")
    }

    pub fn index_of_class(&self) -> Result<usize> {
        self.special_index(|ext| ext.class_index, "class")
    }

    pub fn index_of_style(&self) -> Result<usize> {
        self.special_index(|ext| ext.style_index, "style")
    }

    fn special_index(&self, pick: impl Fn(&AttrExt) -> u16, what: &'static str) -> Result<usize> {
        match self.element().map(pick) {
            Some(index) if index > 0 => Ok(index as usize - 1),
            _ => Err(ResError::NameNotFound {
                what: "attribute",
                name: what.to_string(),
            }),
        }
    }
}
