//! Connection state machine.
//!
//! A [`Session`] owns at most one TCP connection and moves through
//! `Disconnected → Connecting → Authenticating → Connected`. Only one request
//! may be in flight: the protocol has no request identifiers, so every
//! exchange takes `&mut self` and blocks until the whole response has arrived
//! or the timeout fires.
use std::{net::TcpStream, time::Duration};

use base64::Engine;
use log::{debug, info, warn};
use md5::{Digest, Md5};
use xmltree::Element;

use super::{
    FishbowlError, Message, ProtocolTransport, Request, RequestValue, StatusCode, TextEncoding,
    check_status,
    request::{RESPONSE_CONTAINER, operation_name},
    transport::TransportError,
    xml,
};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 28192;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const LOGIN_STATUS_TAGS: [&str; 3] = ["loginRs", "LoginRs", RESPONSE_CONTAINER];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub encoding: TextEncoding,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            encoding: TextEncoding::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
}

/// How [`Session::send_request`] should treat the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseOptions {
    /// Operation response element under `FbiMsgsRs`. When unset the whole
    /// response root is returned unchecked.
    pub node: Option<String>,
    /// Unwrap to the first child of `node`.
    pub single: bool,
    /// Return an `<empty/>` placeholder instead of a status error.
    pub silence_errors: bool,
}

impl Default for ResponseOptions {
    fn default() -> Self {
        Self {
            node: None,
            single: true,
            silence_errors: false,
        }
    }
}

impl ResponseOptions {
    /// Expect `node` and unwrap to its single child.
    pub fn single(node: &str) -> Self {
        Self {
            node: Some(node.to_string()),
            ..Self::default()
        }
    }

    /// Expect `node` and return it whole.
    pub fn list(node: &str) -> Self {
        Self {
            node: Some(node.to_string()),
            single: false,
            silence_errors: false,
        }
    }

    pub fn silenced(mut self) -> Self {
        self.silence_errors = true;
        self
    }
}

/// Base64 MD5 digest of the password, the only form the server accepts.
pub fn hash_password(password: &str, encoding: TextEncoding) -> Result<String, FishbowlError> {
    let digest = Md5::digest(encoding.encode_strict(password)?);
    Ok(base64::engine::general_purpose::STANDARD.encode(digest))
}

pub struct Session {
    config: SessionConfig,
    state: SessionState,
    transport: Option<ProtocolTransport<TcpStream>>,
    key: Option<String>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Disconnected,
            transport: None,
            key: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    fn ensure_connected(&self) -> Result<(), FishbowlError> {
        if self.connected() {
            Ok(())
        } else {
            Err(FishbowlError::NotConnected)
        }
    }

    /// Replace the configuration, then [`connect`](Self::connect).
    pub fn connect_with(
        &mut self,
        username: &str,
        password: &str,
        config: SessionConfig,
    ) -> Result<(), FishbowlError> {
        if self.state != SessionState::Disconnected {
            self.close(true)?;
        }
        self.config = config;
        self.connect(username, password)
    }

    /// Open the connection and log in. Any failure leaves the session
    /// disconnected with its socket closed.
    pub fn connect(&mut self, username: &str, password: &str) -> Result<(), FishbowlError> {
        let password = hash_password(password, self.config.encoding)?;

        if self.state != SessionState::Disconnected {
            self.close(true)?;
        }

        self.state = SessionState::Connecting;
        let result = self.login(username, &password);
        if let Err(e) = &result {
            warn!("login failed: {e}");
            self.close(true)?;
        }
        result
    }

    fn login(&mut self, username: &str, password: &str) -> Result<(), FishbowlError> {
        let transport =
            ProtocolTransport::connect(&self.config.host, self.config.port, self.config.timeout)
                .map_err(|source| FishbowlError::Connection {
                    address: format!("{}:{}", self.config.host, self.config.port),
                    source,
                })?;
        self.transport = Some(transport);
        self.state = SessionState::Authenticating;
        self.key = None;

        let response = self.exchange(Request::login(username, password).into())?;

        let mut key = None;
        for element in xml::descendants(&response) {
            if element.name == "Key" {
                key = xml::text_of(element);
            }
            if LOGIN_STATUS_TAGS.contains(&element.name.as_str()) {
                if let Some(code) = element.attributes.get("statusCode") {
                    check_status(Some(code.as_str()), StatusCode::SUCCESS, false)?;
                }
            }
        }

        match key {
            Some(key) if !key.is_empty() => {
                self.key = Some(key);
                self.state = SessionState::Connected;
                info!("logged in as {username}");
                Ok(())
            }
            _ => Err(FishbowlError::MissingKey),
        }
    }

    /// Tear the connection down. State and key are cleared before the socket
    /// is closed, so a failed close never leaves the session looking
    /// connected.
    pub fn close(&mut self, skip_errors: bool) -> Result<(), FishbowlError> {
        let transport = self.transport.take();
        let was_open = self.state != SessionState::Disconnected || transport.is_some();
        self.state = SessionState::Disconnected;
        self.key = None;

        if !was_open {
            return if skip_errors {
                Ok(())
            } else {
                Err(FishbowlError::NotConnected)
            };
        }

        if let Some(transport) = transport {
            if let Err(e) = transport.close() {
                if !skip_errors {
                    return Err(TransportError::from(e).into());
                }
                warn!("ignoring error while closing connection: {e}");
            }
        }
        info!("connection closed");
        Ok(())
    }

    /// Send a request and return the parsed response root. Status codes are
    /// not checked here.
    pub fn send_message(&mut self, msg: impl Into<Message>) -> Result<Element, FishbowlError> {
        self.ensure_connected()?;
        self.exchange(msg.into())
    }

    fn exchange(&mut self, msg: Message) -> Result<Element, FishbowlError> {
        let encoding = self.config.encoding;
        let bytes = msg.into_bytes(encoding)?;

        info!("Sending message ({})", operation_name(&bytes, encoding));
        debug!("Sending message:\n{}", String::from_utf8_lossy(&bytes));

        let body = match self.round_trip(&bytes) {
            Ok(body) => body,
            Err(e) => {
                let err = match e {
                    (TransportError::Timeout { .. }, false) => FishbowlError::Timeout,
                    (TransportError::Timeout { .. }, true) => FishbowlError::TimeoutAfterLength,
                    (other, _) => other.into(),
                };
                self.close(true)?;
                return Err(err);
            }
        };

        let text = encoding.decode(&body)?;
        debug!("Response received:\n{text}");
        xml::parse_document(&text)
    }

    /// Write one frame and read one back. The flag reports whether the
    /// length prefix had arrived before a failure.
    fn round_trip(&mut self, bytes: &[u8]) -> Result<Vec<u8>, (TransportError, bool)> {
        let transport = self.transport.as_mut().ok_or((
            TransportError::Closed {
                received: 0,
                expected: 0,
            },
            false,
        ))?;

        transport.write_frame(bytes).map_err(|e| (e, false))?;
        let length = transport.read_prefix().map_err(|e| (e, false))?;
        transport
            .receive_exact(length as usize)
            .map_err(|e| (e, true))
    }

    /// Send a simple named request, optionally validating and unwrapping the
    /// operation's response element.
    pub fn send_request(
        &mut self,
        name: &str,
        value: RequestValue,
        options: &ResponseOptions,
    ) -> Result<Element, FishbowlError> {
        self.ensure_connected()?;
        let request = Request::simple(name, value, self.key.as_deref())?;
        let root = self.send_message(request)?;

        let Some(node) = options.node.as_deref() else {
            return Ok(root);
        };

        let found = root
            .get_child(RESPONSE_CONTAINER)
            .and_then(|container| container.get_child(node))
            .ok_or_else(|| FishbowlError::MissingNode(node.to_string()))?;

        let code = found.attributes.get("statusCode").map(String::as_str);
        if let Err(e) = check_status(code, StatusCode::SUCCESS, true) {
            if options.silence_errors {
                debug!("silenced {name} failure: {e}");
                return Ok(xml::empty());
            }
            return Err(e);
        }

        if options.single {
            return Ok(xml::first_child(found).cloned().unwrap_or_else(xml::empty));
        }
        Ok(found.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::protocol::testing::{FakeServer, Reply, login_ok, response};

    fn config_for(server: &FakeServer) -> SessionConfig {
        SessionConfig {
            host: "127.0.0.1".to_string(),
            port: server.port(),
            timeout: Duration::from_millis(500),
            encoding: TextEncoding::Latin1,
        }
    }

    fn connected(replies: Vec<Reply>) -> (FakeServer, Session) {
        let mut script = vec![Reply::Frame(login_ok("ABC123"))];
        script.extend(replies);
        let server = FakeServer::start(script);
        let mut session = Session::new(config_for(&server));
        session.connect("admin", "admin").unwrap();
        (server, session)
    }

    #[test]
    fn password_is_md5_base64() {
        assert_eq!(
            hash_password("admin", TextEncoding::Latin1).unwrap(),
            "ISMvKXpXpadDiUoOSoAfww=="
        );
    }

    #[test]
    fn login_stores_key() {
        let (server, session) = connected(vec![]);

        assert!(session.connected());
        assert_eq!(session.key(), Some("ABC123"));

        let login = server.requests().recv().unwrap();
        assert!(login.contains("<UserName>admin</UserName>"));
        assert!(login.contains("ISMvKXpXpadDiUoOSoAfww=="));
        assert!(!login.contains(">admin</UserPassword>"));
    }

    #[test]
    fn failed_login_closes_connection() {
        let server = FakeServer::start(vec![Reply::Frame(
            "<FbiXml><FbiMsgsRs statusCode=\"1001\"><LoginRs statusCode=\"1001\"/></FbiMsgsRs></FbiXml>"
                .to_string(),
        )]);
        let mut session = Session::new(config_for(&server));

        let err = session.connect("admin", "admin").unwrap_err();
        assert_eq!(err.status_code(), Some("1001"));
        assert!(!session.connected());
        assert_eq!(session.key(), None);
        assert!(server.wait_closed());
    }

    #[test]
    fn login_without_key_fails() {
        let server = FakeServer::start(vec![Reply::Frame(
            "<FbiXml><FbiMsgsRs statusCode=\"1000\"><LoginRs statusCode=\"1000\"/></FbiMsgsRs></FbiXml>"
                .to_string(),
        )]);
        let mut session = Session::new(config_for(&server));

        assert!(matches!(
            session.connect("admin", "admin"),
            Err(FishbowlError::MissingKey)
        ));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(server.wait_closed());
    }

    #[test]
    fn connection_refused_leaves_session_disconnected() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut session = Session::new(SessionConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..SessionConfig::default()
        });
        assert!(matches!(
            session.connect("admin", "admin"),
            Err(FishbowlError::Connection { .. })
        ));
        assert!(!session.connected());
    }

    #[test]
    fn protected_operations_need_a_connection() {
        let mut session = Session::new(SessionConfig::default());

        assert!(matches!(
            session.send_message(b"<FbiXml/>".to_vec()),
            Err(FishbowlError::NotConnected)
        ));
        assert!(matches!(
            session.send_request("UOMRq", RequestValue::None, &ResponseOptions::default()),
            Err(FishbowlError::NotConnected)
        ));
        assert!(matches!(session.close(false), Err(FishbowlError::NotConnected)));
        assert!(session.close(true).is_ok());
    }

    #[test]
    fn send_message_returns_root_without_status_check() {
        let (server, mut session) = connected(vec![Reply::Frame(response(
            "AddInventoryRs",
            "1001",
            "",
        ))]);

        let request = Request::simple("AddInventoryRq", RequestValue::None, session.key()).unwrap();
        let root = session.send_message(request).unwrap();
        assert_eq!(root.name, "FbiXml");
        assert!(session.connected());

        server.requests().recv().unwrap();
        let sent = server.requests().recv().unwrap();
        assert!(sent.contains("<Key>ABC123</Key>"));
    }

    #[test]
    fn light_part_list_returns_all_children() {
        let parts = "<LightPart><Num>A</Num></LightPart>\
                     <LightPart><Num>B</Num></LightPart>\
                     <LightPart><Num>C</Num></LightPart>";
        let (_server, mut session) = connected(vec![Reply::Frame(response(
            "LightPartListRs",
            "1000",
            parts,
        ))]);

        let node = session
            .send_request(
                "LightPartListRq",
                RequestValue::None,
                &ResponseOptions::list("LightPartListRs"),
            )
            .unwrap();

        assert_eq!(node.name, "LightPartListRs");
        let children: Vec<&Element> = xml::child_elements(&node).collect();
        assert_eq!(children.len(), 3);
        assert!(children.iter().all(|c| c.name == "LightPart"));
    }

    #[test]
    fn silenced_failure_returns_placeholder() {
        let (_server, mut session) = connected(vec![Reply::Frame(response(
            "LightPartListRs",
            "1001",
            "<LightPart/>",
        ))]);

        let node = session
            .send_request(
                "LightPartListRq",
                RequestValue::None,
                &ResponseOptions::list("LightPartListRs").silenced(),
            )
            .unwrap();
        assert_eq!(node.name, "empty");
        assert!(node.children.is_empty());
        assert!(session.connected());
    }

    #[test]
    fn missing_response_node_is_not_silenced() {
        let (_server, mut session) = connected(vec![Reply::Frame(
            "<FbiXml><FbiMsgsRs statusCode=\"1001\"/></FbiXml>".to_string(),
        )]);

        let err = session
            .send_request(
                "LightPartListRq",
                RequestValue::None,
                &ResponseOptions::list("LightPartListRs").silenced(),
            )
            .unwrap_err();
        assert!(matches!(err, FishbowlError::MissingNode(ref node) if node == "LightPartListRs"));
        assert!(session.connected());
    }

    #[test]
    fn unsilenced_failure_propagates_and_keeps_connection() {
        let (_server, mut session) = connected(vec![Reply::Frame(response(
            "CustomerGetRs",
            "3000",
            "",
        ))]);

        let err = session
            .send_request(
                "CustomerGetRq",
                vec![("Name", "Nobody")].into(),
                &ResponseOptions::single("CustomerGetRs"),
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "Customer not found.");
        assert!(session.connected());
    }

    #[test]
    fn single_unwraps_first_child_or_placeholder() {
        let (_server, mut session) = connected(vec![
            Reply::Frame(response(
                "CustomerGetRs",
                "1000",
                "<Customer><Name>Acme</Name></Customer>",
            )),
            Reply::Frame(
                "<FbiXml><FbiMsgsRs><CustomerGetRs/></FbiMsgsRs></FbiXml>".to_string(),
            ),
        ]);

        let options = ResponseOptions::single("CustomerGetRs");
        let customer = session
            .send_request("CustomerGetRq", RequestValue::None, &options)
            .unwrap();
        assert_eq!(customer.name, "Customer");

        let missing_status = session
            .send_request("CustomerGetRq", RequestValue::None, &options)
            .unwrap();
        assert_eq!(missing_status.name, "empty");
    }

    #[test]
    fn timeout_before_length() {
        let (server, mut session) = connected(vec![Reply::Stall]);

        let err = session.send_message(b"<FbiXml/>".to_vec()).unwrap_err();
        assert!(matches!(err, FishbowlError::Timeout));
        assert_eq!(err.to_string(), "Connection timeout");
        assert!(!session.connected());
        assert_eq!(session.key(), None);
        drop(server);
    }

    #[test]
    fn timeout_after_length() {
        let (_server, mut session) = connected(vec![Reply::Partial {
            length: 100,
            body: "<FbiXml>".to_string(),
        }]);

        let err = session.send_message(b"<FbiXml/>".to_vec()).unwrap_err();
        assert!(matches!(err, FishbowlError::TimeoutAfterLength));
        assert_eq!(err.to_string(), "Connection timeout (after length received)");
        assert!(!session.connected());
    }

    #[test]
    fn malformed_response_propagates() {
        let (_server, mut session) =
            connected(vec![Reply::Frame("<FbiXml><broken></FbiXml>".to_string())]);

        assert!(matches!(
            session.send_message(b"<FbiXml/>".to_vec()),
            Err(FishbowlError::Parse(_))
        ));
    }

    #[test]
    fn reconnect_closes_previous_connection() {
        let first = FakeServer::start(vec![Reply::Frame(login_ok("FIRST"))]);
        let second = FakeServer::start(vec![Reply::Frame(login_ok("SECOND"))]);

        let mut session = Session::new(config_for(&first));
        session.connect("admin", "admin").unwrap();
        session
            .connect_with("admin", "admin", config_for(&second))
            .unwrap();

        assert!(first.wait_closed());
        assert_eq!(session.key(), Some("SECOND"));
        assert_eq!(session.config().port, second.port());
    }

    #[test]
    fn close_resets_state() {
        let (server, mut session) = connected(vec![]);

        session.close(false).unwrap();
        assert!(!session.connected());
        assert_eq!(session.key(), None);
        assert!(server.wait_closed());
    }
}
