//! Client side of the Fishbowl server protocol.
//!
//! This module holds everything needed to talk to a Fishbowl inventory
//! server: the byte transport, message framing, the login handshake, request
//! documents and status-code interpretation.
//!
//! # Overview
//!
//! A [`Session`] opens a TCP connection, logs in with a username and an MD5
//! digest of the password, and keeps the session key the server hands back.
//! Every later request carries that key in its `Ticket` element. The
//! protocol is strictly one request in flight: there are no request
//! identifiers, so responses are matched to requests purely by order.
//!
//! # Key Components
//!
//! - [`ProtocolTransport`]: blocking send / exact-length receive over a stream.
//! - [`framing`]: the 4-byte length prefix.
//! - [`Session`]: connect, login, send, close.
//! - [`Request`]: outbound XML documents.
//! - [`check_status`]: the status-code registry.
//!
//! # Wire Format
//!
//! Both directions use the same framing:
//!
//! - A 4-byte unsigned big-endian length.
//! - Exactly that many bytes of XML text in the agreed encoding (latin-1 by
//!   default).
//!
//! Responses wrap one operation element in `FbiMsgsRs`; the operation
//! element carries an optional `statusCode` attribute where `1000` means
//! success.
mod error;
pub mod framing;
mod request;
mod session;
mod status;
mod transport;
pub mod xml;

#[cfg(test)]
pub(crate) mod testing;

pub use error::FishbowlError;
pub use request::{Message, Request, RequestValue, operation_name};
pub use session::{
    DEFAULT_HOST, DEFAULT_PORT, DEFAULT_TIMEOUT, ResponseOptions, Session, SessionConfig,
    SessionState, hash_password,
};
pub use status::{StatusCode, check_status, status_message};
pub use transport::{ProtocolTransport, TransportError};
pub use xml::TextEncoding;
