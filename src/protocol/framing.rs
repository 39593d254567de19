//! Length-prefix framing.
//!
//! Every message in either direction is a 4-byte big-endian length followed by
//! exactly that many payload bytes. There is no terminator, checksum or
//! version byte.
use bincode::config::{BigEndian, Configuration, Fixint};
use log::trace;

use super::transport::TransportError;

pub const PREFIX_LEN: usize = 4;

fn config() -> Configuration<BigEndian, Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

/// Prefix `payload` with its byte length.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    let length =
        u32::try_from(payload.len()).map_err(|_| TransportError::Oversized(payload.len()))?;
    let mut framed = bincode::encode_to_vec(length, config())?;
    debug_assert_eq!(framed.len(), PREFIX_LEN);
    framed.reserve(payload.len());
    framed.extend_from_slice(payload);
    trace!("framed {} payload bytes", length);
    Ok(framed)
}

pub fn decode_length(prefix: [u8; PREFIX_LEN]) -> Result<u32, TransportError> {
    let (length, _) = bincode::decode_from_slice::<u32, _>(&prefix, config())?;
    Ok(length)
}
