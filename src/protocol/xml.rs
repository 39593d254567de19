//! Text encoding and small tree helpers over [`xmltree::Element`].
//!
//! The server agrees on a fixed text encoding out of band (ISO-8859-1 for
//! every install seen so far), so requests and responses are transcoded here
//! rather than trusting whatever declaration a document carries.
use xmltree::{Element, EmitterConfig, XMLNode};

use super::FishbowlError;

/// Text encoding agreed with the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextEncoding {
    /// ISO-8859-1. Characters outside the range are sent as numeric
    /// character references.
    #[default]
    Latin1,
    Utf8,
}

impl TextEncoding {
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Latin1 => {
                let mut out = Vec::with_capacity(text.len());
                for c in text.chars() {
                    match u8::try_from(u32::from(c)) {
                        Ok(b) => out.push(b),
                        Err(_) => out.extend_from_slice(
                            format!("&#x{:X};", u32::from(c)).as_bytes(),
                        ),
                    }
                }
                out
            }
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<String, FishbowlError> {
        match self {
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| FishbowlError::Encoding(e.to_string())),
        }
    }

    /// Latin-1 encoding of a password, used before hashing. Unlike
    /// [`encode`](Self::encode) this refuses unrepresentable characters.
    pub fn encode_strict(&self, text: &str) -> Result<Vec<u8>, FishbowlError> {
        match self {
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c)).map_err(|_| {
                        FishbowlError::Encoding(format!("'{c}' is not representable in latin-1"))
                    })
                })
                .collect(),
        }
    }
}

/// Parse a decoded document, dropping any leading XML declaration. The text
/// has already been decoded, so an `encoding=` pseudo-attribute would only
/// mislead the parser.
pub fn parse_document(text: &str) -> Result<Element, FishbowlError> {
    let mut body = text.trim_start_matches('\u{feff}').trim_start();
    if body.starts_with("<?xml") {
        if let Some(end) = body.find("?>") {
            body = &body[end + 2..];
        }
    }
    Ok(Element::parse(body.as_bytes())?)
}

/// Serialize an element without a declaration or indentation.
pub fn write_document(element: &Element) -> Result<String, FishbowlError> {
    let mut out = Vec::new();
    let config = EmitterConfig::new()
        .write_document_declaration(false)
        .perform_indent(false);
    element
        .write_with_config(&mut out, config)
        .map_err(|e| FishbowlError::Encoding(e.to_string()))?;
    String::from_utf8(out).map_err(|e| FishbowlError::Encoding(e.to_string()))
}

/// Element children only; text, comments and processing instructions are
/// skipped.
pub fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(XMLNode::as_element)
}

pub fn first_child(element: &Element) -> Option<&Element> {
    child_elements(element).next()
}

/// Every element of the tree in document order, `element` included.
pub fn descendants(element: &Element) -> Vec<&Element> {
    let mut out = Vec::new();
    let mut stack = vec![element];
    while let Some(el) = stack.pop() {
        out.push(el);
        let children: Vec<&Element> = child_elements(el).collect();
        stack.extend(children.into_iter().rev());
    }
    out
}

/// Every descendant element (including `element`) named `name`.
pub fn find_all<'a>(element: &'a Element, name: &str) -> Vec<&'a Element> {
    descendants(element)
        .into_iter()
        .filter(|el| el.name == name)
        .collect()
}

pub fn text_of(element: &Element) -> Option<String> {
    element.get_text().map(|t| t.into_owned())
}

/// Placeholder returned where a response carried nothing usable.
pub fn empty() -> Element {
    Element::new("empty")
}
