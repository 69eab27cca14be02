//! Decoder for Android compiled resources.
//!
//! Covers the `resources.arsc` table container ([`ResTable`]), resource resolution with
//! reference chains, bags and themes ([`Theme`]), and the compiled binary XML format
//! ([`BinaryXmlTree`] / [`BinaryXmlParser`]). Every entry point takes an in-memory buffer.
#![forbid(unsafe_code)]

pub use crate::chunk::ChunkHeader;
pub use crate::config::ResTableConfig;
pub use crate::err::{ErrorKind, ResError, Result};
pub use crate::string_pool::{StringPool, StringPoolFlags, StyleSpan};
pub use crate::style::{AttributeValue, apply_style, retrieve_array, retrieve_attributes};
pub use crate::table::{
    Bag, BagEntry, Entry, EntryFlags, EntryMatch, MAX_REFERENCE_HOPS, MapItem, NO_ENTRY,
    ResTable, ResolvedReference, ResolvedValue, ResourceName, entry_index, make_id, package_id,
    type_index,
};
pub use crate::table_cache::SharedTableCache;
pub use crate::theme::{Theme, ThemeAttribute};
pub use crate::utils::{ByteCursor, Endian, IndexedIntArray};
pub use crate::value::{DataType, ResValue, complex_to_float};
pub use crate::xml::{BinaryXmlParser, BinaryXmlTree, XmlAttribute, XmlEvent};
pub use crate::xml_output::{RenderError, XmlRenderSettings, render_xml, render_xml_to_string};

pub mod chunk;
pub mod config;
pub mod err;
pub mod string_pool;
pub mod style;
pub mod table;
pub mod table_cache;
pub mod theme;
mod utils;
pub mod value;
pub mod xml;
pub mod xml_output;

#[cfg(test)]
mod tests;

pub(crate) type FastMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

#[cfg(test)]
use std::sync::Once;

#[cfg(test)]
static LOGGER_INIT: Once = Once::new();

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
#[cfg(test)]
pub fn ensure_env_logger_initialized() {
    use std::io::Write;

    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
            .is_test(true)
            .init();
    });
}
