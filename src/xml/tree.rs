use std::sync::Arc;

use log::{debug, trace, warn};

use crate::chunk::{
    ChildChunks, ChunkHeader, RES_STRING_POOL_TYPE, RES_XML_RESOURCE_MAP_TYPE, RES_XML_TYPE,
};
use crate::err::{ResError, Result};
use crate::string_pool::StringPool;
use crate::utils::IndexedIntArray;
use crate::xml::node::XmlNode;
use crate::xml::parser::BinaryXmlParser;

/// A compiled XML document.
///
/// Holds the document's string pool, its attribute resource-id map and the first node. The
/// nodes themselves are decoded lazily by [`BinaryXmlParser`].
#[derive(Debug, Clone)]
pub struct BinaryXmlTree {
    data: Arc<[u8]>,
    data_end: usize,
    strings: StringPool,
    res_ids: IndexedIntArray,
    root: Option<XmlNode>,
    error: Option<ResError>,
}

impl Default for BinaryXmlTree {
    fn default() -> Self {
        BinaryXmlTree::new()
    }
}

impl BinaryXmlTree {
    pub fn new() -> Self {
        BinaryXmlTree {
            data: Arc::from(Vec::<u8>::new()),
            data_end: 0,
            strings: StringPool::new(),
            res_ids: IndexedIntArray::empty(),
            root: None,
            error: Some(ResError::NotInitialized { what: "xml tree" }),
        }
    }

    /// Decode a whole buffer as one document.
    pub fn parse(data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let data = data.into();
        let size = data.len();
        let mut tree = BinaryXmlTree::new();
        tree.set_to(data, 0, size)?;
        Ok(tree)
    }

    /// Load the document chunk at `offset` (at most `size` bytes).
    ///
    /// A failure is sticky; parsers created afterwards report [`XmlEvent::BadDocument`](super::XmlEvent::BadDocument).
    pub fn set_to(&mut self, data: impl Into<Arc<[u8]>>, offset: usize, size: usize) -> Result<()> {
        let data = data.into();
        self.uninit();
        match self.load(&data, offset, size) {
            Ok(()) => {
                self.data = data;
                self.error = None;
                Ok(())
            }
            Err(err) => {
                warn!("failed to load xml document at offset {offset}: {err}");
                self.uninit();
                self.error = Some(err.clone());
                Err(err)
            }
        }
    }

    fn load(&mut self, data: &Arc<[u8]>, offset: usize, size: usize) -> Result<()> {
        let limit = offset.saturating_add(size).min(data.len());
        let chunk = ChunkHeader::read(&data[..limit], offset)?;
        chunk.expect_type(RES_XML_TYPE)?;
        self.data_end = chunk.end();

        for child in ChildChunks::new(data, chunk.body_offset(), chunk.end()) {
            let child = child?;
            match child.chunk_type {
                RES_STRING_POOL_TYPE => {
                    self.strings
                        .set_to(data.clone(), child.offset, child.size as usize)?;
                }
                RES_XML_RESOURCE_MAP_TYPE => {
                    self.res_ids = IndexedIntArray::new(
                        data.clone(),
                        child.body_offset(),
                        child.body_len() / 4,
                        "xml resource map",
                    )?;
                    trace!("xml resource map with {} ids", self.res_ids.len());
                }
                _ if child.is_xml_node() => match XmlNode::read(data, child)? {
                    Some(node) => {
                        self.root = Some(node);
                        break;
                    }
                    None => trace!(
                        "skipping xml node type 0x{:04x} at offset {}",
                        child.chunk_type, child.offset
                    ),
                },
                other => warn!(
                    "skipping unknown chunk 0x{other:04x} at offset {} in xml document",
                    child.offset
                ),
            }
        }

        if self.root.is_none() {
            return Err(ResError::malformed(
                "xml document",
                offset,
                "no root element found",
            ));
        }
        self.strings.status()?;
        debug!(
            "xml document at offset {offset}: {} strings, {} resource ids",
            self.strings.count(),
            self.res_ids.len()
        );
        Ok(())
    }

    pub fn uninit(&mut self) {
        self.data = Arc::from(Vec::<u8>::new());
        self.data_end = 0;
        self.strings.uninit();
        self.res_ids = IndexedIntArray::empty();
        self.root = None;
        self.error = Some(ResError::NotInitialized { what: "xml tree" });
    }

    pub fn status(&self) -> Result<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    pub fn strings(&self) -> &StringPool {
        &self.strings
    }

    /// The resource-id map: attribute name string index -> attribute resource id.
    pub fn resource_ids(&self) -> &IndexedIntArray {
        &self.res_ids
    }

    /// Resource id mapped to string `index`, if the map covers it.
    pub fn resource_id(&self, index: u32) -> Option<u32> {
        self.res_ids.get(index as usize).filter(|&id| id != 0)
    }

    /// A fresh parser positioned before the first node.
    pub fn parser(&self) -> BinaryXmlParser<'_> {
        BinaryXmlParser::new(self)
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.data[..self.data_end]
    }

    pub(crate) fn data_end(&self) -> usize {
        self.data_end
    }

    pub(crate) fn root(&self) -> Option<XmlNode> {
        self.root
    }
}
