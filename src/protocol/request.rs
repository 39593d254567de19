//! Outbound request documents.
//!
//! Every request is an `FbiXml` document with a `Ticket` (carrying the
//! session key once logged in) and an `FbiMsgsRq` container holding exactly
//! one operation element:
//!
//! ```xml
//! <FbiXml>
//!   <Ticket><Key>...</Key></Ticket>
//!   <FbiMsgsRq><LightPartListRq/></FbiMsgsRq>
//! </FbiXml>
//! ```
use xmltree::{Element, XMLNode};

use super::{FishbowlError, TextEncoding, xml};

pub const REQUEST_CONTAINER: &str = "FbiMsgsRq";
pub const RESPONSE_CONTAINER: &str = "FbiMsgsRs";

const IA_ID: &str = "22";
const IA_NAME: &str = "RustFishbowl";
const IA_DESCRIPTION: &str = "Connection for the Rust Fishbowl client";

/// Body of a simple named request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestValue {
    #[default]
    None,
    /// Text content of the operation element.
    Text(String),
    /// Child elements, in order.
    Fields(Vec<(String, String)>),
}

impl From<&str> for RequestValue {
    fn from(value: &str) -> Self {
        RequestValue::Text(value.to_string())
    }
}

impl From<String> for RequestValue {
    fn from(value: String) -> Self {
        RequestValue::Text(value)
    }
}

impl<K: Into<String>, V: Into<String>> From<Vec<(K, V)>> for RequestValue {
    fn from(fields: Vec<(K, V)>) -> Self {
        RequestValue::Fields(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    root: Element,
}

fn text_element(name: &str, text: impl Into<String>) -> Element {
    let mut el = Element::new(name);
    el.children.push(XMLNode::Text(text.into()));
    el
}

impl Request {
    fn envelope(key: Option<&str>, operation: Element) -> Self {
        let mut ticket = Element::new("Ticket");
        if let Some(key) = key {
            ticket.children.push(XMLNode::Element(text_element("Key", key)));
        }

        let mut container = Element::new(REQUEST_CONTAINER);
        container.children.push(XMLNode::Element(operation));

        let mut root = Element::new("FbiXml");
        root.children.push(XMLNode::Element(ticket));
        root.children.push(XMLNode::Element(container));
        Self { root }
    }

    fn keyed(key: Option<&str>, operation: Element) -> Result<Self, FishbowlError> {
        match key {
            Some(key) if !key.is_empty() => Ok(Self::envelope(Some(key), operation)),
            _ => Err(FishbowlError::InvalidRequest(format!(
                "{} requires a session key",
                operation.name
            ))),
        }
    }

    fn operation(name: &str, fields: &[(&str, String)]) -> Element {
        let mut el = Element::new(name);
        for (field, value) in fields {
            el.children
                .push(XMLNode::Element(text_element(field, value.clone())));
        }
        el
    }

    /// Login handshake. `password` is the already digested and encoded
    /// password, never the plaintext.
    pub fn login(username: &str, password: &str) -> Self {
        let operation = Self::operation(
            "LoginRq",
            &[
                ("IAID", IA_ID.to_string()),
                ("IAName", IA_NAME.to_string()),
                ("IADescription", IA_DESCRIPTION.to_string()),
                ("UserName", username.to_string()),
                ("UserPassword", password.to_string()),
            ],
        );
        Self::envelope(None, operation)
    }

    pub fn simple(
        name: &str,
        value: RequestValue,
        key: Option<&str>,
    ) -> Result<Self, FishbowlError> {
        let mut operation = Element::new(name);
        match value {
            RequestValue::None => {}
            RequestValue::Text(text) => operation.children.push(XMLNode::Text(text)),
            RequestValue::Fields(fields) => {
                for (field, value) in fields {
                    operation
                        .children
                        .push(XMLNode::Element(text_element(&field, value)));
                }
            }
        }
        Self::keyed(key, operation)
    }

    pub fn add_inventory(
        part_num: &str,
        quantity: f64,
        uom_id: u32,
        cost: f64,
        location_tag_num: &str,
        key: Option<&str>,
    ) -> Result<Self, FishbowlError> {
        let operation = Self::operation(
            "AddInventoryRq",
            &[
                ("PartNum", part_num.to_string()),
                ("Quantity", quantity.to_string()),
                ("UOMID", uom_id.to_string()),
                ("Cost", cost.to_string()),
                ("LocationTagNum", location_tag_num.to_string()),
                ("TagNum", "0".to_string()),
            ],
        );
        Self::keyed(key, operation)
    }

    pub fn cycle_count(
        part_num: &str,
        quantity: f64,
        location_id: u32,
        key: Option<&str>,
    ) -> Result<Self, FishbowlError> {
        let operation = Self::operation(
            "CycleCountRq",
            &[
                ("PartNum", part_num.to_string()),
                ("Quantity", quantity.to_string()),
                ("LocationID", location_id.to_string()),
            ],
        );
        Self::keyed(key, operation)
    }

    pub fn get_po_list(location_group: &str, key: Option<&str>) -> Result<Self, FishbowlError> {
        let operation = Self::operation(
            "GetPOListRq",
            &[("LocationGroup", location_group.to_string())],
        );
        Self::keyed(key, operation)
    }

    /// Name of the operation element.
    pub fn name(&self) -> &str {
        self.root
            .get_child(REQUEST_CONTAINER)
            .and_then(xml::first_child)
            .map_or("unknown", |el| el.name.as_str())
    }

    pub fn element(&self) -> &Element {
        &self.root
    }

    pub fn to_bytes(&self, encoding: TextEncoding) -> Result<Vec<u8>, FishbowlError> {
        Ok(encoding.encode(&xml::write_document(&self.root)?))
    }
}

/// Anything [`Session::send_message`](super::Session::send_message) accepts.
#[derive(Debug, Clone)]
pub enum Message {
    /// Already encoded request bytes.
    Raw(Vec<u8>),
    Request(Request),
}

impl Message {
    pub fn into_bytes(self, encoding: TextEncoding) -> Result<Vec<u8>, FishbowlError> {
        match self {
            Message::Raw(bytes) => Ok(bytes),
            Message::Request(request) => request.to_bytes(encoding),
        }
    }
}

impl From<Request> for Message {
    fn from(value: Request) -> Self {
        Message::Request(value)
    }
}

impl From<Vec<u8>> for Message {
    fn from(value: Vec<u8>) -> Self {
        Message::Raw(value)
    }
}

impl From<&[u8]> for Message {
    fn from(value: &[u8]) -> Self {
        Message::Raw(value.to_vec())
    }
}

/// Best-effort name of the operation inside an encoded request, for logs.
/// Never fails: anything unparseable is reported as `unknown`.
pub fn operation_name(bytes: &[u8], encoding: TextEncoding) -> String {
    encoding
        .decode(bytes)
        .and_then(|text| xml::parse_document(&text))
        .ok()
        .and_then(|root| {
            root.get_child(REQUEST_CONTAINER)
                .and_then(xml::first_child)
                .map(|el| el.name.clone())
        })
        .unwrap_or_else(|| "unknown".to_string())
}
