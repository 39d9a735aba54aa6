//! Flattens a geocoder's XML response into tag → element pairs.

use super::types::{FetchError, XmlElement, XmlResponse};
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;

struct OpenElement {
    element: XmlElement,
    has_child: bool,
}

/// Parse `raw` into an [`XmlResponse`].
///
/// Only the text before an element's first child is kept, matching how the
/// providers lay out their leaf values.
pub fn parse_response(raw: &str) -> Result<XmlResponse, FetchError> {
    let mut reader = Reader::from_str(raw);
    let decoder = reader.decoder();
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut data = BTreeMap::new();
    let mut seen_root = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| FetchError::Xml(format!("at byte {}: {}", reader.buffer_position(), e)))?;

        match event {
            Event::Start(start) => {
                seen_root = true;
                if let Some(parent) = stack.last_mut() {
                    parent.has_child = true;
                }
                stack.push(OpenElement {
                    element: open_element(&start, &reader)?,
                    has_child: false,
                });
            }
            Event::Empty(start) => {
                seen_root = true;
                if let Some(parent) = stack.last_mut() {
                    parent.has_child = true;
                }
                let element = open_element(&start, &reader)?;
                data.insert(element.tag.clone(), element);
            }
            Event::Text(text) => {
                let text = decoder
                    .decode(&*text)
                    .map_err(|e| FetchError::Xml(e.to_string()))?;
                push_text(&mut stack, &text);
            }
            Event::CData(cdata) => {
                let text = decoder
                    .decode(&*cdata)
                    .map_err(|e| FetchError::Xml(e.to_string()))?;
                push_text(&mut stack, &text);
            }
            Event::GeneralRef(reference) => {
                if let Some(ch) = reference
                    .resolve_char_ref()
                    .map_err(|e| FetchError::Xml(e.to_string()))?
                {
                    push_text(&mut stack, ch.encode_utf8(&mut [0; 4]));
                } else {
                    let name = decoder
                        .decode(&*reference)
                        .map_err(|e| FetchError::Xml(e.to_string()))?;
                    let resolved = resolve_predefined_entity(&name)
                        .ok_or_else(|| FetchError::Xml(format!("unknown entity &{};", name)))?;
                    push_text(&mut stack, resolved);
                }
            }
            Event::End(_) => {
                if let Some(OpenElement { mut element, .. }) = stack.pop() {
                    element.text = element.text.trim().to_string();
                    data.insert(element.tag.clone(), element);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(FetchError::Xml("document has no root element".into()));
    }
    if !stack.is_empty() {
        return Err(FetchError::Xml("unexpected end of document".into()));
    }

    Ok(XmlResponse {
        raw: raw.to_string(),
        data,
    })
}

fn open_element(start: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<XmlElement, FetchError> {
    let decoder = reader.decoder();
    let tag = decoder
        .decode(start.local_name().as_ref())
        .map_err(|e| FetchError::Xml(e.to_string()))?
        .trim()
        .to_lowercase();

    let mut attrs = BTreeMap::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| FetchError::Xml(e.to_string()))?;
        // Namespace declarations carry no data.
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let key = decoder
            .decode(attr.key.local_name().as_ref())
            .map_err(|e| FetchError::Xml(e.to_string()))?
            .into_owned();
        let value = attr
            .decode_and_unescape_value(decoder)
            .map_err(|e| FetchError::Xml(e.to_string()))?
            .into_owned();
        attrs.insert(key, value);
    }

    Ok(XmlElement {
        tag,
        text: String::new(),
        attrs,
    })
}

fn push_text(stack: &mut [OpenElement], text: &str) {
    if let Some(open) = stack.last_mut() {
        if !open.has_child {
            open.element.text.push_str(text);
        }
    }
}
