//! XML extraction: walks a document once and fills its [`PathCounters`].

use super::counters::{MappedDocument, PathCounters, ROOT_TOKEN};
use super::error::IndexError;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// An open element
struct Frame {
    name: String,
    signature: String,
    text: String,
}

/// Parse `xml` and build its counters
pub fn map_document(uri: &str, xml: &str) -> Result<MappedDocument, IndexError> {
    let mut reader = Reader::from_str(xml);
    // element string values keep their whitespace
    reader.trim_text(false);

    let mut counters = PathCounters::default();
    counters.count_path(ROOT_TOKEN);
    let mut stack: Vec<Frame> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let frame = open_element(&mut counters, &stack, &start)?;
                stack.push(frame);
            }
            Event::Empty(start) => {
                let frame = open_element(&mut counters, &stack, &start)?;
                close_element(&mut counters, &mut stack, frame);
            }
            Event::End(_) => {
                if let Some(frame) = stack.pop() {
                    close_element(&mut counters, &mut stack, frame);
                }
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                append_text(&mut counters, &mut stack, &text);
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data).into_owned();
                append_text(&mut counters, &mut stack, &text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(IndexError::UnclosedElement(open.name.clone()));
    }

    Ok(MappedDocument {
        uri: uri.to_string(),
        source: xml.to_string(),
        counters,
    })
}

fn open_element(
    counters: &mut PathCounters,
    stack: &[Frame],
    start: &BytesStart<'_>,
) -> Result<Frame, IndexError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let parent = stack.last().map_or(ROOT_TOKEN, |frame| frame.signature.as_str());
    let signature = format!("{parent} {name}");

    counters.count_path(&signature);
    counters.count_element(&name);

    for attr in start.attributes() {
        let attr = attr?;
        let attr_name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if attr_name == "xmlns" || attr_name.starts_with("xmlns:") {
            continue;
        }
        let value = attr.unescape_value()?.into_owned();
        let attr_signature = format!("{signature} @{attr_name}");

        counters.count_path(&attr_signature);
        counters.count_attribute(&attr_name);
        counters.path_values.push((attr_signature, value.clone()));
        counters.attribute_text.push((attr_name, value));
    }

    Ok(Frame {
        name,
        signature,
        text: String::new(),
    })
}

fn close_element(counters: &mut PathCounters, stack: &mut [Frame], frame: Frame) {
    if let Some(parent) = stack.last_mut() {
        parent.text.push_str(&frame.text);
    }
    counters.path_values.push((frame.signature, frame.text.clone()));
    counters.element_text.push((frame.name, frame.text));
}

fn append_text(counters: &mut PathCounters, stack: &mut [Frame], text: &str) {
    // text outside the root element is not part of any string value
    if let Some(frame) = stack.last_mut() {
        frame.text.push_str(text);
        counters.add_text(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_paths_and_names() {
        let doc = map_document(
            "a.xml",
            r#"<doc><sec n="1"><p>one</p><p>two</p></sec><sec/></doc>"#,
        )
        .unwrap();
        let c = &doc.counters;
        assert_eq!(c.paths["{}"], 1);
        assert_eq!(c.paths["{} doc sec"], 2);
        assert_eq!(c.paths["{} doc sec p"], 2);
        assert_eq!(c.paths["{} doc sec @n"], 1);
        assert_eq!(c.element_names["p"], 2);
        assert_eq!(c.attribute_names["n"], 1);
    }

    #[test]
    fn test_string_values() {
        let doc = map_document("a.xml", "<doc><t>Hello <b>big</b> world</t></doc>").unwrap();
        let c = &doc.counters;
        assert!(c.element_text.contains(&("t".to_string(), "Hello big world".to_string())));
        assert!(c.element_text.contains(&("doc".to_string(), "Hello big world".to_string())));
        assert!(c.path_values.contains(&("{} doc t b".to_string(), "big".to_string())));
        assert_eq!(c.text, "Hello  big  world");
    }

    #[test]
    fn test_entities_and_cdata() {
        let doc = map_document("a.xml", r#"<d a="x &amp; y">1 &lt; 2<![CDATA[<raw>]]></d>"#).unwrap();
        let c = &doc.counters;
        assert_eq!(c.attribute_text, vec![("a".to_string(), "x & y".to_string())]);
        assert_eq!(c.element_text, vec![("d".to_string(), "1 < 2<raw>".to_string())]);
    }

    #[test]
    fn test_malformed_xml() {
        assert!(map_document("bad.xml", "<a><b></a>").is_err());
        assert!(map_document("bad.xml", "<a>").is_err());
    }
}
