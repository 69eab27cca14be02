//! Textual XML rendering of compiled documents, written with `quick-xml`.

use std::io::{self, Write};

use log::trace;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error;

use crate::err::ResError;
use crate::table::ResTable;
use crate::value::{DataType, ResValue};
use crate::xml::{BinaryXmlParser, BinaryXmlTree, XmlEvent};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to decode document")]
    Resource(#[from] ResError),

    #[error("malformed node after line {line}")]
    BadDocument { line: u32 },

    #[error("failed to write xml")]
    Xml(#[from] quick_xml::Error),

    #[error("failed to write output")]
    Io(#[from] io::Error),
}

/// Options for [`render_xml`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlRenderSettings {
    indent: bool,
    resolve_references: bool,
}

impl Default for XmlRenderSettings {
    fn default() -> Self {
        XmlRenderSettings {
            indent: true,
            resolve_references: true,
        }
    }
}

impl XmlRenderSettings {
    pub fn new() -> Self {
        XmlRenderSettings::default()
    }

    /// Pretty-print with two-space indentation.
    pub fn indent(mut self, pretty: bool) -> Self {
        self.indent = pretty;
        self
    }

    /// Render reference attributes as `@type/name` when a table is available.
    pub fn resolve_references(mut self, resolve: bool) -> Self {
        self.resolve_references = resolve;
        self
    }

    pub fn should_indent(&self) -> bool {
        self.indent
    }

    pub fn should_resolve_references(&self) -> bool {
        self.resolve_references
    }
}

/// In-scope namespace declarations, innermost last.
#[derive(Debug, Default)]
struct Namespaces {
    declared: Vec<(String, String)>,
    pending: Vec<(String, String)>,
}

impl Namespaces {
    fn prefix_of(&self, uri: &str) -> Option<&str> {
        self.declared
            .iter()
            .rev()
            .find(|(_, u)| u == uri)
            .map(|(p, _)| p.as_str())
    }

    fn qualify(&self, ns: Option<String>, name: String) -> String {
        match ns.as_deref().and_then(|uri| self.prefix_of(uri)) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}:{name}"),
            _ => name,
        }
    }
}

struct Renderer<'a, 't, W: Write> {
    writer: Writer<W>,
    parser: BinaryXmlParser<'t>,
    table: Option<&'a ResTable>,
    settings: &'a XmlRenderSettings,
    namespaces: Namespaces,
    /// Start tag not yet written, so an element without content can collapse to `<a/>`.
    open: Option<BytesStart<'static>>,
}

impl<W: Write> Renderer<'_, '_, W> {
    fn flush_open(&mut self) -> Result<(), RenderError> {
        if let Some(start) = self.open.take() {
            self.writer.write_event(Event::Start(start))?;
        }
        Ok(())
    }

    fn comment(&mut self) -> Result<(), RenderError> {
        if let Some(comment) = self.parser.comment() {
            self.flush_open()?;
            self.writer
                .write_event(Event::Comment(BytesText::new(&comment)))?;
        }
        Ok(())
    }

    fn attribute_text(&self, index: usize) -> String {
        if let Some(raw) = self.parser.attribute_string_value(index) {
            return raw;
        }
        let Some(value) = self.parser.attribute_value(index) else {
            return String::new();
        };
        if let Some(named) = self.reference_name(&value) {
            return named;
        }
        value
            .coerce_to_string(Some(self.parser.strings()))
            .unwrap_or_default()
    }

    fn reference_name(&self, value: &ResValue) -> Option<String> {
        if !self.settings.should_resolve_references() || value.data == 0 {
            return None;
        }
        let sigil = match value.data_type {
            DataType::REFERENCE => '@',
            DataType::ATTRIBUTE => '?',
            _ => return None,
        };
        let name = self.table?.resource_name(value.data).ok()?;
        Some(format!("{sigil}{}/{}", name.type_name, name.name))
    }

    fn start_tag(&mut self) -> Result<(), RenderError> {
        self.flush_open()?;
        self.comment()?;

        let name = self.namespaces.qualify(
            self.parser.element_namespace(),
            self.parser.element_name().unwrap_or_default(),
        );
        let mut start = BytesStart::new(name);
        for (prefix, uri) in self.namespaces.pending.drain(..) {
            let key = if prefix.is_empty() {
                "xmlns".to_string()
            } else {
                format!("xmlns:{prefix}")
            };
            start.push_attribute((key.as_str(), uri.as_str()));
        }
        for i in 0..self.parser.attribute_count() {
            let key = self.namespaces.qualify(
                self.parser.attribute_namespace(i),
                self.parser.attribute_name(i).unwrap_or_default(),
            );
            let value = self.attribute_text(i);
            start.push_attribute((key.as_str(), value.as_str()));
        }
        self.open = Some(start);
        Ok(())
    }

    fn end_tag(&mut self) -> Result<(), RenderError> {
        match self.open.take() {
            Some(start) => self.writer.write_event(Event::Empty(start))?,
            None => {
                let name = self.namespaces.qualify(
                    self.parser.element_namespace(),
                    self.parser.element_name().unwrap_or_default(),
                );
                self.writer.write_event(Event::End(BytesEnd::new(name)))?
            }
        }
        Ok(())
    }

    fn text(&mut self) -> Result<(), RenderError> {
        self.flush_open()?;
        let text = self.parser.text().unwrap_or_default();
        self.writer.write_event(Event::Text(BytesText::new(&text)))?;
        Ok(())
    }

    fn run(&mut self) -> Result<(), RenderError> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        let mut last_line = 0;
        loop {
            let event = self.parser.next();
            trace!("render event {event:?}");
            if let Some(line) = self.parser.line_number() {
                last_line = line;
            }
            match event {
                XmlEvent::StartNamespace => {
                    let decl = (
                        self.parser.namespace_prefix().unwrap_or_default(),
                        self.parser.namespace_uri().unwrap_or_default(),
                    );
                    self.namespaces.declared.push(decl.clone());
                    self.namespaces.pending.push(decl);
                }
                XmlEvent::EndNamespace => {
                    self.namespaces.declared.pop();
                }
                XmlEvent::StartTag => self.start_tag()?,
                XmlEvent::EndTag => self.end_tag()?,
                XmlEvent::Text => self.text()?,
                XmlEvent::EndDocument => return Ok(()),
                XmlEvent::BadDocument => return Err(RenderError::BadDocument { line: last_line }),
                XmlEvent::StartDocument => {}
            }
        }
    }
}

/// Write `tree` as textual XML to `writer` and hand the writer back.
///
/// With a `table`, reference attributes without source text render as `@type/name`.
pub fn render_xml<W: Write>(
    tree: &BinaryXmlTree,
    table: Option<&ResTable>,
    settings: &XmlRenderSettings,
    writer: W,
) -> Result<W, RenderError> {
    tree.status()?;
    let writer = if settings.should_indent() {
        Writer::new_with_indent(writer, b' ', 2)
    } else {
        Writer::new(writer)
    };
    let mut renderer = Renderer {
        writer,
        parser: tree.parser(),
        table,
        settings,
        namespaces: Namespaces::default(),
        open: None,
    };
    renderer.run()?;
    let mut inner = renderer.writer.into_inner();
    inner.flush()?;
    Ok(inner)
}

pub fn render_xml_to_string(
    tree: &BinaryXmlTree,
    table: Option<&ResTable>,
    settings: &XmlRenderSettings,
) -> Result<String, RenderError> {
    let buf = render_xml(tree, table, settings, Vec::new())?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
