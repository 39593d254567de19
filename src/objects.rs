//! Domain objects backed by response XML.
//!
//! A [`LazyObject`] wraps either an element already taken from a response,
//! or a resolver that fetches the element on first use. Lists such as "all
//! customers" come back as names only, and fetching every record up front
//! would cost one round trip each, so records are fetched when a field is
//! first read.
//!
//! # Example
//! ```rust
//! use fishbowl::objects::LazyObject;
//! use fishbowl::protocol::xml;
//!
//! let mut part = LazyObject::pending("B201", || {
//!     xml::parse_document("<Part><Num>B201</Num><UOMID>1</UOMID></Part>")
//! });
//!
//! assert_eq!(part.get("UOMID").unwrap(), Some("1".to_string()));
//! assert_eq!(part.get("Missing").unwrap(), None);
//! ```
use std::{collections::BTreeMap, fmt};

use log::{debug, warn};
use xmltree::Element;

use crate::protocol::{FishbowlError, xml};

/// Fetches the backing element of a [`LazyObject`].
pub type Resolver = Box<dyn FnMut() -> Result<Element, FishbowlError> + Send>;

enum Backing {
    Resolved(Element),
    Pending(Resolver),
}

pub struct LazyObject {
    label: Option<String>,
    backing: Backing,
    related: BTreeMap<String, LazyObject>,
    related_lists: BTreeMap<String, Vec<LazyObject>>,
}

impl LazyObject {
    pub fn resolved(element: Element) -> Self {
        Self {
            label: None,
            backing: Backing::Resolved(element),
            related: BTreeMap::new(),
            related_lists: BTreeMap::new(),
        }
    }

    pub fn pending<F>(label: impl Into<String>, resolver: F) -> Self
    where
        F: FnMut() -> Result<Element, FishbowlError> + Send + 'static,
    {
        Self {
            label: Some(label.into()),
            backing: Backing::Pending(Box::new(resolver)),
            related: BTreeMap::new(),
            related_lists: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Identifying label, known without resolving.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.backing, Backing::Resolved(_))
    }

    /// Run the resolver if it has not succeeded yet. A failure is returned
    /// and not remembered, so the next call tries again.
    pub fn resolve(&mut self) -> Result<&Element, FishbowlError> {
        if let Backing::Pending(resolver) = &mut self.backing {
            debug!("resolving {}", self.label.as_deref().unwrap_or("object"));
            let element = resolver()?;
            self.backing = Backing::Resolved(element);
        }
        match &self.backing {
            Backing::Resolved(element) => Ok(element),
            Backing::Pending(_) => unreachable!("backing resolved above"),
        }
    }

    /// Text of the child element named `field`, falling back to an attribute
    /// of that name. `None` when neither exists.
    pub fn get(&mut self, field: &str) -> Result<Option<String>, FishbowlError> {
        let element = self.resolve()?;
        if let Some(child) = element.get_child(field) {
            return Ok(Some(xml::text_of(child).unwrap_or_default()));
        }
        Ok(element.attributes.get(field).cloned())
    }

    /// Whether the object holds nothing: no child elements and no
    /// attributes. An object whose resolver fails counts as empty.
    pub fn is_empty(&mut self) -> bool {
        match self.resolve() {
            Ok(element) => {
                xml::first_child(element).is_none() && element.attributes.is_empty()
            }
            Err(e) => {
                warn!(
                    "could not resolve {}: {e}",
                    self.label.as_deref().unwrap_or("object")
                );
                true
            }
        }
    }

    /// Attach a related object, such as a part's unit of measure.
    pub fn attach(&mut self, name: impl Into<String>, object: LazyObject) {
        self.related.insert(name.into(), object);
    }

    pub fn related(&self, name: &str) -> Option<&LazyObject> {
        self.related.get(name)
    }

    pub fn related_mut(&mut self, name: &str) -> Option<&mut LazyObject> {
        self.related.get_mut(name)
    }

    /// Attach a list of related objects, such as a customer's addresses.
    pub fn attach_list(&mut self, name: impl Into<String>, objects: Vec<LazyObject>) {
        self.related_lists.insert(name.into(), objects);
    }

    pub fn related_list(&self, name: &str) -> Option<&[LazyObject]> {
        self.related_lists.get(name).map(Vec::as_slice)
    }

    pub fn related_list_mut(&mut self, name: &str) -> Option<&mut Vec<LazyObject>> {
        self.related_lists.get_mut(name)
    }
}

impl fmt::Debug for LazyObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("LazyObject");
        s.field("label", &self.label);
        match &self.backing {
            Backing::Resolved(element) => s.field("element", &element.name),
            Backing::Pending(_) => s.field("element", &"<pending>"),
        };
        s.field("related", &self.related.keys().collect::<Vec<_>>())
            .field("related_lists", &self.related_lists.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl From<Element> for LazyObject {
    fn from(element: Element) -> Self {
        LazyObject::resolved(element)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    fn parse(text: &str) -> Element {
        xml::parse_document(text).unwrap()
    }

    fn counting(text: &'static str) -> (Arc<AtomicUsize>, LazyObject) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let object = LazyObject::pending("Acme", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(parse(text))
        });
        (calls, object)
    }

    #[test]
    fn resolver_runs_once() {
        let (calls, mut customer) =
            counting("<Customer><Name>Acme</Name><Status>Normal</Status></Customer>");

        assert!(!customer.is_resolved());
        assert_eq!(customer.label(), Some("Acme"));
        assert_eq!(customer.get("Name").unwrap(), Some("Acme".to_string()));
        assert_eq!(customer.get("Status").unwrap(), Some("Normal".to_string()));
        assert!(!customer.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failures_are_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut product = LazyObject::pending("B201", move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(FishbowlError::Timeout)
            } else {
                Ok(parse("<Product><Num>B201</Num></Product>"))
            }
        });

        assert!(matches!(product.get("Num"), Err(FishbowlError::Timeout)));
        assert!(!product.is_resolved());
        assert_eq!(product.get("Num").unwrap(), Some("B201".to_string()));
        assert_eq!(product.get("Num").unwrap(), Some("B201".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_fields_are_absent() {
        let mut uom = LazyObject::resolved(parse("<UOM code=\"ea\"><UOMID>1</UOMID></UOM>"));

        assert_eq!(uom.get("Name").unwrap(), None);
        assert_eq!(uom.get("code").unwrap(), Some("ea".to_string()));
        assert_eq!(uom.get("UOMID").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn empty_objects() {
        assert!(LazyObject::resolved(xml::empty()).is_empty());
        assert!(!LazyObject::resolved(parse("<Part id=\"1\"/>")).is_empty());

        let mut failing = LazyObject::pending("x", || Err(FishbowlError::NotConnected));
        assert!(failing.is_empty());
        assert!(!failing.is_resolved());
    }

    #[test]
    fn related_objects() {
        let mut part = LazyObject::resolved(parse("<Part><UOMID>1</UOMID></Part>"));
        part.attach("UOM", LazyObject::resolved(parse("<UOM><Name>Each</Name></UOM>")));

        let uom = part.related_mut("UOM").unwrap();
        assert_eq!(uom.get("Name").unwrap(), Some("Each".to_string()));
        assert!(part.related("Vendor").is_none());
    }

    #[test]
    fn related_lists() {
        let mut customer = LazyObject::resolved(parse("<Customer><Name>Acme</Name></Customer>"));
        customer.attach_list(
            "Addresses",
            vec![
                LazyObject::resolved(parse("<Address><City>Springfield</City></Address>")),
                LazyObject::resolved(parse("<Address><City>Shelbyville</City></Address>")),
            ],
        );

        assert_eq!(customer.related_list("Addresses").unwrap().len(), 2);
        let second = &mut customer.related_list_mut("Addresses").unwrap()[1];
        assert_eq!(second.get("City").unwrap(), Some("Shelbyville".to_string()));
        assert!(customer.related_list("Contacts").is_none());
        assert!(customer.related("Addresses").is_none());
    }
}
