//! Attribute retrieval for views: XML attributes cascaded with styles and the theme.

use std::sync::Arc;

use log::{debug, trace};
use serde::Serialize;

use crate::err::{ErrorKind, Result};
use crate::table::{Bag, ResTable, ResolvedReference};
use crate::theme::Theme;
use crate::value::{DataType, ResValue};
use crate::xml::BinaryXmlParser;

/// The value retrieved for one requested attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttributeValue {
    /// The requested attribute id (or array item name).
    pub attr: u32,
    pub value: ResValue,
    /// Cookie of the table the value came from; `None` for values taken from the XML document
    /// or when nothing was found.
    pub cookie: Option<u32>,
    /// Last resource id followed while resolving references.
    pub resource_id: Option<u32>,
    pub changing_configurations: u32,
    pub density: u16,
}

impl AttributeValue {
    fn from_resolved(table: &ResTable, attr: u32, resolved: ResolvedReference) -> Self {
        let mut value = resolved.value;
        // `@null` reads back as "no value".
        if value.data_type == DataType::REFERENCE && value.data == 0 {
            value = ResValue::null();
        }
        AttributeValue {
            attr,
            value,
            cookie: resolved.block.and_then(|b| table.table_cookie(b)),
            resource_id: resolved.last_ref,
            changing_configurations: resolved.type_spec_flags,
            density: resolved.config.density,
        }
    }

    fn missing(attr: u32) -> Self {
        AttributeValue {
            attr,
            value: ResValue::null(),
            cookie: None,
            resource_id: None,
            changing_configurations: 0,
            density: 0,
        }
    }
}

/// Value of the attribute with resource id `attr` on the parser's current start tag.
fn xml_attribute(parser: &BinaryXmlParser<'_>, attr: u32) -> Option<ResValue> {
    (0..parser.attribute_count())
        .find(|&i| parser.attribute_name_res_id(i) == Some(attr))
        .and_then(|i| parser.attribute_value(i))
}

fn bag_or_empty(table: &ResTable, id: u32, what: &str) -> Option<Arc<Bag>> {
    if id == 0 {
        return None;
    }
    match table.get_bag(id) {
        Ok(bag) => Some(bag),
        Err(err) => {
            debug!("{what} 0x{id:08x} unavailable: {err}");
            None
        }
    }
}

/// Resolve a value found in the XML document or a style bag, keeping it as is when the theme
/// or table cannot resolve it.
fn resolve_found(
    theme: &Theme<'_>,
    attr: u32,
    value: ResValue,
    block: Option<usize>,
    type_spec_flags: u32,
) -> AttributeValue {
    let resolved = theme
        .resolve_attribute_reference(value, block, type_spec_flags)
        .unwrap_or_else(|err| {
            trace!("attribute 0x{attr:08x} left unresolved: {err}");
            ResolvedReference {
                value,
                block,
                last_ref: None,
                type_spec_flags,
                config: Default::default(),
            }
        });
    AttributeValue::from_resolved(theme.table(), attr, resolved)
}

/// Retrieve `attrs` for a view.
///
/// For every requested attribute, in order, the first value found in (1) the current XML
/// element, (2) the bag named by the element's `style` attribute, (3) the default style bag
/// and (4) the theme wins. The default style comes from `def_style_attr` looked up in the
/// theme, falling back to `def_style_res`. Values are resolved through the theme and table.
///
/// Fails only when a theme value references an unmappable resource.
pub fn apply_style(
    theme: &Theme<'_>,
    parser: Option<&BinaryXmlParser<'_>>,
    def_style_attr: u32,
    def_style_res: u32,
    attrs: &[u32],
) -> Result<Vec<AttributeValue>> {
    let table = theme.table();

    let mut def_style = def_style_res;
    if def_style_attr != 0 {
        if let Ok(found) = theme.get_attribute(def_style_attr) {
            if found.value.data_type == DataType::REFERENCE {
                def_style = found.value.data;
            }
        }
    }

    let mut xml_style = 0;
    if let Some(parser) = parser {
        if let Some(mut value) = parser
            .index_of_style()
            .ok()
            .and_then(|i| parser.attribute_value(i))
        {
            if value.data_type == DataType::ATTRIBUTE {
                value = theme
                    .get_attribute(value.data)
                    .map_or(ResValue::null(), |found| found.value);
            }
            if value.data_type == DataType::REFERENCE {
                xml_style = value.data;
            }
        }
    }

    let def_bag = bag_or_empty(table, def_style, "default style");
    let style_bag = bag_or_empty(table, xml_style, "element style");

    let mut out = Vec::with_capacity(attrs.len());
    for &attr in attrs {
        if let Some(value) = parser.and_then(|p| xml_attribute(p, attr)) {
            if !value.is_null() {
                out.push(resolve_found(theme, attr, value, None, 0));
                continue;
            }
        }

        let from_bag = [&style_bag, &def_bag].into_iter().find_map(|bag| {
            let bag = bag.as_ref()?;
            bag.get(attr)
                .filter(|e| !e.value.is_null())
                .map(|e| (*e, bag.type_spec_flags))
        });
        if let Some((entry, flags)) = from_bag {
            out.push(resolve_found(theme, attr, entry.value, Some(entry.block), flags));
            continue;
        }

        match theme.get_attribute(attr) {
            Ok(found) => {
                let resolved = match table.resolve_reference_with_flags(
                    found.value,
                    Some(found.block),
                    found.type_spec_flags,
                ) {
                    Ok(resolved) => resolved,
                    Err(err) if err.kind() == ErrorKind::BadIndex => return Err(err),
                    Err(err) => {
                        trace!("theme value of 0x{attr:08x} left unresolved: {err}");
                        ResolvedReference {
                            value: found.value,
                            block: Some(found.block),
                            last_ref: None,
                            type_spec_flags: found.type_spec_flags,
                            config: Default::default(),
                        }
                    }
                };
                out.push(AttributeValue::from_resolved(table, attr, resolved));
            }
            Err(_) => out.push(AttributeValue::missing(attr)),
        }
    }
    Ok(out)
}

/// Retrieve `attrs` from the current XML element alone, resolving references through `table`.
pub fn retrieve_attributes(
    table: &ResTable,
    parser: &BinaryXmlParser<'_>,
    attrs: &[u32],
) -> Result<Vec<AttributeValue>> {
    let mut out = Vec::with_capacity(attrs.len());
    for &attr in attrs {
        let value = match xml_attribute(parser, attr) {
            Some(value) if !value.is_null() => value,
            _ => {
                out.push(AttributeValue::missing(attr));
                continue;
            }
        };
        let resolved = table.resolve_reference(value, None)?;
        out.push(AttributeValue::from_resolved(table, attr, resolved));
    }
    Ok(out)
}

/// Resolve every item of the array bag `id`.
pub fn retrieve_array(table: &ResTable, id: u32) -> Result<Vec<AttributeValue>> {
    let bag = table.get_bag(id)?;
    bag.iter()
        .map(|entry| {
            let resolved = table.resolve_reference_with_flags(
                entry.value,
                Some(entry.block),
                bag.type_spec_flags,
            )?;
            Ok(AttributeValue::from_resolved(table, entry.name, resolved))
        })
        .collect()
}
