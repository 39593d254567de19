//! High-level Fishbowl operations.
//!
//! [`Fishbowl`] shares one [`Session`] behind a mutex so that lazy objects
//! it hands out can fetch their records later through the same connection.
//! The lock is held for exactly one exchange at a time, which keeps the
//! one-request-in-flight rule even when objects are resolved from other
//! threads.
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use log::info;
use xmltree::{Element, XMLNode};

use crate::{
    objects::LazyObject,
    protocol::{
        FishbowlError, Message, Request, RequestValue, ResponseOptions, Session, SessionConfig,
        StatusCode, check_status, xml,
    },
};

/// One row of a query result, column name to value.
pub type Row = BTreeMap<String, String>;

pub type SharedSession = Arc<Mutex<Session>>;

fn lock(session: &SharedSession) -> Result<MutexGuard<'_, Session>, FishbowlError> {
    session.lock().map_err(|_| FishbowlError::SessionPoisoned)
}

/// Fetch one record through `session`, for use as a lazy resolver.
fn fetch(
    session: SharedSession,
    name: &'static str,
    value: RequestValue,
    response: &'static str,
) -> impl FnMut() -> Result<Element, FishbowlError> + Send + 'static {
    move || {
        lock(&session)?.send_request(name, value.clone(), &ResponseOptions::single(response))
    }
}

/// Validate every present `statusCode` on elements named `node`.
fn check_present_status(root: &Element, node: &str) -> Result<(), FishbowlError> {
    for element in xml::find_all(root, node) {
        if let Some(code) = element.attributes.get("statusCode") {
            check_status(Some(code.as_str()), StatusCode::SUCCESS, false)?;
        }
    }
    Ok(())
}

pub struct Fishbowl {
    session: SharedSession,
}

impl Default for Fishbowl {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Fishbowl {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::new(config))),
        }
    }

    /// Handle to the underlying session.
    pub fn session(&self) -> SharedSession {
        Arc::clone(&self.session)
    }

    pub fn connected(&self) -> bool {
        lock(&self.session).is_ok_and(|s| s.connected())
    }

    pub fn connect(&self, username: &str, password: &str) -> Result<(), FishbowlError> {
        lock(&self.session)?.connect(username, password)
    }

    pub fn connect_with(
        &self,
        username: &str,
        password: &str,
        config: SessionConfig,
    ) -> Result<(), FishbowlError> {
        lock(&self.session)?.connect_with(username, password, config)
    }

    pub fn close(&self, skip_errors: bool) -> Result<(), FishbowlError> {
        lock(&self.session)?.close(skip_errors)
    }

    pub fn send_message(&self, msg: impl Into<Message>) -> Result<Element, FishbowlError> {
        lock(&self.session)?.send_message(msg)
    }

    pub fn send_request(
        &self,
        name: &str,
        value: RequestValue,
        options: &ResponseOptions,
    ) -> Result<Element, FishbowlError> {
        lock(&self.session)?.send_request(name, value, options)
    }

    /// Build a keyed request and send it, checking the connection first so
    /// that an unconnected session fails before anything is built.
    fn send_keyed<F>(&self, build: F) -> Result<Element, FishbowlError>
    where
        F: FnOnce(Option<&str>) -> Result<Request, FishbowlError>,
    {
        let mut session = lock(&self.session)?;
        if !session.connected() {
            return Err(FishbowlError::NotConnected);
        }
        let request = build(session.key())?;
        session.send_message(request)
    }

    pub fn add_inventory(
        &self,
        part_num: &str,
        quantity: f64,
        uom_id: u32,
        cost: f64,
        location_tag_num: &str,
    ) -> Result<(), FishbowlError> {
        let response = self.send_keyed(|key| {
            Request::add_inventory(part_num, quantity, uom_id, cost, location_tag_num, key)
        })?;
        check_present_status(&response, "AddInventoryRs")?;
        info!("add_inv,{part_num},{quantity},{uom_id},{cost},{location_tag_num}");
        Ok(())
    }

    pub fn cycle_inventory(
        &self,
        part_num: &str,
        quantity: f64,
        location_id: u32,
    ) -> Result<(), FishbowlError> {
        let response =
            self.send_keyed(|key| Request::cycle_count(part_num, quantity, location_id, key))?;
        check_present_status(&response, "CycleCountRs")?;
        info!("cycle_inv,{part_num},{quantity},{location_id}");
        Ok(())
    }

    /// Raw purchase order list for a location group.
    pub fn get_po_list(&self, location_group: &str) -> Result<Element, FishbowlError> {
        self.send_keyed(|key| Request::get_po_list(location_group, key))
    }

    pub fn get_taxrates(&self) -> Result<Vec<LazyObject>, FishbowlError> {
        let response = self.send_request(
            "TaxRateGetRq",
            RequestValue::None,
            &ResponseOptions::list("TaxRateGetRs"),
        )?;
        Ok(xml::find_all(&response, "TaxRate")
            .into_iter()
            .map(|node| LazyObject::resolved(node.clone()))
            .collect())
    }

    /// Every customer, fetched one by one on first access.
    pub fn get_customers(&self) -> Result<Vec<LazyObject>, FishbowlError> {
        let response = self.send_request(
            "CustomerNameListRq",
            RequestValue::None,
            &ResponseOptions::default(),
        )?;
        let names = response
            .get_child("FbiMsgsRs")
            .map(|container| xml::find_all(container, "Name"))
            .unwrap_or_default();

        Ok(names
            .into_iter()
            .filter_map(xml::text_of)
            .map(|name| {
                let resolver = fetch(
                    self.session(),
                    "CustomerGetRq",
                    vec![("Name", name.as_str())].into(),
                    "CustomerGetRs",
                );
                LazyObject::pending(name, resolver)
            })
            .collect())
    }

    fn uom_elements(&self) -> Result<HashMap<String, Element>, FishbowlError> {
        let response =
            self.send_request("UOMRq", RequestValue::None, &ResponseOptions::list("UOMRs"))?;
        Ok(xml::find_all(&response, "UOM")
            .into_iter()
            .filter_map(|node| {
                let id = node.get_child("UOMID").and_then(xml::text_of)?;
                Some((id, node.clone()))
            })
            .collect())
    }

    /// Units of measure keyed by `UOMID`.
    pub fn get_uom_map(&self) -> Result<HashMap<String, LazyObject>, FishbowlError> {
        Ok(self
            .uom_elements()?
            .into_iter()
            .map(|(id, node)| (id, LazyObject::resolved(node)))
            .collect())
    }

    /// Light part list, optionally with each part's `UOM` attached.
    pub fn get_parts(&self, populate_uoms: bool) -> Result<Vec<LazyObject>, FishbowlError> {
        let response = self.send_request(
            "LightPartListRq",
            RequestValue::None,
            &ResponseOptions::list("LightPartListRs"),
        )?;
        let mut parts: Vec<LazyObject> = xml::find_all(&response, "LightPart")
            .into_iter()
            .map(|node| LazyObject::resolved(node.clone()))
            .collect();

        if populate_uoms {
            let uoms = self.uom_elements()?;
            for part in &mut parts {
                let Some(uom_id) = part.get("UOMID")?.filter(|id| !id.is_empty()) else {
                    continue;
                };
                if let Some(uom) = uoms.get(&uom_id) {
                    part.attach("UOM", LazyObject::resolved(uom.clone()));
                }
            }
        }
        Ok(parts)
    }

    /// Products matching each distinct part number.
    ///
    /// There is no product list request, so this walks the part list. Lazy
    /// products cost nothing up front but may turn out empty; eager products
    /// cost one round trip each and empty ones are dropped.
    pub fn get_products(&self, lazy: bool) -> Result<Vec<LazyObject>, FishbowlError> {
        let mut products = Vec::new();
        let mut seen = HashSet::new();

        for mut part in self.get_parts(false)? {
            let Some(number) = part.get("Num")?.filter(|n| !n.is_empty()) else {
                continue;
            };
            if !seen.insert(number.clone()) {
                continue;
            }

            let mut resolver = fetch(
                self.session(),
                "ProductGetRq",
                vec![("Number", number.as_str())].into(),
                "ProductGetRs",
            );
            if lazy {
                products.push(LazyObject::pending(number, resolver));
            } else {
                let node = resolver()?;
                if xml::first_child(&node).is_none() {
                    continue;
                }
                products.push(LazyObject::resolved(node).with_label(number));
            }
        }
        Ok(products)
    }

    /// Every product in one `SELECT * FROM PRODUCT` round trip, optionally
    /// with each product's `UOM` attached by its `UOMID` column.
    pub fn get_products_fast(
        &self,
        populate_uoms: bool,
    ) -> Result<Vec<LazyObject>, FishbowlError> {
        let uoms = if populate_uoms {
            self.uom_elements()?
        } else {
            HashMap::new()
        };

        let mut products = Vec::new();
        for row in self.send_query("SELECT * FROM PRODUCT")? {
            let Some(mut product) = row_object("Product", &row) else {
                continue;
            };
            if let Some(uom) = row.get("UOMID").and_then(|id| uoms.get(id.trim())) {
                product.attach("UOM", LazyObject::resolved(uom.clone()));
            }
            products.push(product);
        }
        Ok(products)
    }

    /// Every customer from `SELECT * FROM CUSTOMER`. With
    /// `populate_addresses`, each customer gets an `Addresses` list matched
    /// on `ACCOUNTID`, and each address its `Country` and `State`.
    pub fn get_customers_fast(
        &self,
        populate_addresses: bool,
    ) -> Result<Vec<LazyObject>, FishbowlError> {
        let mut addresses: HashMap<String, Vec<LazyObject>> = HashMap::new();
        if populate_addresses {
            let countries: HashMap<String, Element> = self
                .send_query("SELECT * FROM COUNTRYCONST")?
                .into_iter()
                .filter_map(|mut row| {
                    let id = row.get("ID")?.clone();
                    if let Some(abbreviation) = row.get("ABBREVIATION").cloned() {
                        row.insert("CODE".to_string(), abbreviation);
                    }
                    Some((id, row_element("Country", &row)))
                })
                .collect();
            let states: HashMap<String, Element> = self
                .send_query("SELECT * FROM STATECONST")?
                .into_iter()
                .filter_map(|row| Some((row.get("ID")?.clone(), row_element("State", &row))))
                .collect();

            for row in self.send_query("SELECT * FROM ADDRESS")? {
                let account = row.get("ACCOUNTID").cloned().unwrap_or_default();
                let list = addresses.entry(account).or_default();
                let Some(mut address) = row_object("Address", &row) else {
                    continue;
                };
                if let Some(country) = row.get("COUNTRYID").and_then(|id| countries.get(id)) {
                    address.attach("Country", LazyObject::resolved(country.clone()));
                }
                if let Some(state) = row.get("STATEID").and_then(|id| states.get(id)) {
                    address.attach("State", LazyObject::resolved(state.clone()));
                }
                list.push(address);
            }
        }

        let mut customers = Vec::new();
        for row in self.send_query("SELECT * FROM CUSTOMER")? {
            let Some(mut customer) = row_object("Customer", &row) else {
                continue;
            };
            if populate_addresses {
                let list = row
                    .get("ACCOUNTID")
                    .and_then(|account| addresses.remove(account))
                    .unwrap_or_default();
                customer.attach_list("Addresses", list);
            }
            customers.push(customer);
        }
        Ok(customers)
    }

    /// Run SQL on the server. Rows come back as CSV text, the first row
    /// being the header.
    pub fn send_query(&self, query: &str) -> Result<Vec<Row>, FishbowlError> {
        let response = self.send_request(
            "ExecuteQueryRq",
            vec![("Query", query)].into(),
            &ResponseOptions::list("ExecuteQueryRs"),
        )?;

        let mut csv_text = String::new();
        for row in xml::find_all(&response, "Row") {
            csv_text.push_str(&xml::text_of(row).unwrap_or_default());
            csv_text.push('\n');
        }
        parse_rows(&csv_text)
    }
}

fn parse_rows(text: &str) -> Result<Vec<Row>, FishbowlError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect(),
        );
    }
    Ok(rows)
}

/// Element named `name` with one child per non-empty column of `row`.
fn row_element(name: &str, row: &Row) -> Element {
    let mut element = Element::new(name);
    for (column, value) in row.iter().filter(|(_, value)| !value.is_empty()) {
        let mut field = Element::new(column);
        field.children.push(XMLNode::Text(value.clone()));
        element.children.push(XMLNode::Element(field));
    }
    element
}

/// A resolved object for `row`, or `None` when every column is blank.
fn row_object(name: &str, row: &Row) -> Option<LazyObject> {
    let mut object = LazyObject::resolved(row_element(name, row));
    if object.is_empty() {
        return None;
    }
    Some(object)
}
