
use arsc::{
    BinaryXmlTree, DataType, ErrorKind, XmlEvent, XmlRenderSettings, render_xml,
    render_xml_to_string,
};
use fixtures::builders::*;
use fixtures::ensure_env_logger_initialized;
use pretty_assertions::assert_eq;

const ANDROID_NS: &str = "http://schemas.android.com/apk/res/android";
const ATTR_ORIENTATION: u32 = 0x0101_00c4;

fn layout() -> Vec<u8> {
    XmlBuilder::new()
        .resource_attr("orientation", ATTR_ORIENTATION)
        .start_namespace("android", ANDROID_NS)
        .line(2)
        .start_element(
            None,
            "LinearLayout",
            vec![
                XmlAttr::typed(Some(ANDROID_NS), "orientation", TYPE_INT_DEC, 1),
                XmlAttr::string(None, "id", "root"),
            ],
        )
        .line(4)
        .start_element(None, "TextView", vec![XmlAttr::string(None, "class", "Label")])
        .text("Hello & welcome")
        .end_element(None, "TextView")
        .line(7)
        .start_element(None, "Space", vec![])
        .end_element(None, "Space")
        .line(9)
        .end_element(None, "LinearLayout")
        .end_namespace("android", ANDROID_NS)
        .build()
}

#[test]
fn test_tags_balance_and_lines_never_decrease() {
    ensure_env_logger_initialized();
    let tree = BinaryXmlTree::parse(layout()).unwrap();
    let mut parser = tree.parser();

    let mut depth = 0usize;
    let mut max_depth = 0usize;
    let mut last_line = 0;
    let mut events = Vec::new();
    loop {
        let event = parser.next();
        events.push(event);
        if let Some(line) = parser.line_number() {
            assert!(line >= last_line, "line went from {last_line} to {line}");
            last_line = line;
        }
        match event {
            XmlEvent::StartTag => {
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            XmlEvent::EndTag => depth -= 1,
            XmlEvent::EndDocument | XmlEvent::BadDocument => break,
            _ => {}
        }
    }

    assert_eq!(events.last(), Some(&XmlEvent::EndDocument));
    assert_eq!(depth, 0);
    assert_eq!(max_depth, 2);
    assert_eq!(
        events.iter().filter(|e| **e == XmlEvent::StartTag).count(),
        3
    );
    // Terminal events repeat.
    assert_eq!(parser.next(), XmlEvent::EndDocument);
}

#[test]
fn test_resource_ids_and_special_attributes() {
    let tree = BinaryXmlTree::parse(layout()).unwrap();
    let mut parser = tree.parser();
    while parser.next() != XmlEvent::StartTag {}

    assert_eq!(parser.element_name().as_deref(), Some("LinearLayout"));
    assert_eq!(parser.attribute_name_res_id(0), Some(ATTR_ORIENTATION));
    assert_eq!(parser.attribute_data_type(0), DataType::INT_DEC);
    assert_eq!(parser.attribute_data(0), 1);
    assert_eq!(parser.index_of_id().unwrap(), 1);
    assert_eq!(parser.attribute_string_value(1).as_deref(), Some("root"));
    assert_eq!(parser.index_of_class().unwrap_err().kind(), ErrorKind::NameNotFound);
    assert_eq!(parser.index_of_attribute(Some(ANDROID_NS), "orientation").unwrap(), 0);

    while parser.next() != XmlEvent::StartTag {}
    assert_eq!(parser.element_name().as_deref(), Some("TextView"));
    assert_eq!(parser.index_of_class().unwrap(), 0);
    assert_eq!(parser.next(), XmlEvent::Text);
    assert_eq!(parser.text().as_deref(), Some("Hello & welcome"));
}

#[test]
fn test_restart_replays_document() {
    let tree = BinaryXmlTree::parse(layout()).unwrap();
    let mut parser = tree.parser();
    let first: Vec<XmlEvent> = std::iter::from_fn(|| match parser.next() {
        XmlEvent::EndDocument => None,
        event => Some(event),
    })
    .collect();
    parser.restart();
    assert_eq!(parser.event(), XmlEvent::StartDocument);
    let second: Vec<XmlEvent> = std::iter::from_fn(|| match parser.next() {
        XmlEvent::EndDocument => None,
        event => Some(event),
    })
    .collect();
    assert_eq!(first, second);
}

#[test]
fn test_renders_layout_as_text() {
    let tree = BinaryXmlTree::parse(layout()).unwrap();
    let out = render_xml_to_string(&tree, None, &XmlRenderSettings::new().indent(false)).unwrap();
    assert_eq!(
        out,
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<LinearLayout xmlns:android="http://schemas.android.com/apk/res/android" android:orientation="1" id="root">"#,
            r#"<TextView class="Label">Hello &amp; welcome</TextView>"#,
            r#"<Space/>"#,
            r#"</LinearLayout>"#,
        )
    );

    let written = render_xml(&tree, None, &XmlRenderSettings::new(), Vec::new()).unwrap();
    assert!(String::from_utf8(written).unwrap().contains("\n  <TextView"));
}

#[test]
fn test_truncated_document_fails_to_load() {
    let mut doc = layout();
    doc.truncate(doc.len() - 6);
    let err = BinaryXmlTree::parse(doc).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadType);
}
