//! Compiled (binary) XML documents: the chunk tree and a pull parser over it.

mod node;
mod parser;
mod tree;

pub use self::node::{
    AttrExt, CDataExt, EndElementExt, NamespaceExt, NodeHeader, XmlAttribute, XmlEvent, XmlNode,
};
pub use self::parser::BinaryXmlParser;
pub use self::tree::BinaryXmlTree;
