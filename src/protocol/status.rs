//! Server status codes.
//!
//! Every structured response may carry a `statusCode` attribute. Exactly one
//! code, [`StatusCode::SUCCESS`], is a non-error outcome.
use std::{borrow::Cow, fmt, str::FromStr};

use super::FishbowlError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusCode(pub u32);

impl StatusCode {
    pub const SUCCESS: StatusCode = StatusCode(1000);
    pub const UNKNOWN_MESSAGE: StatusCode = StatusCode(1001);

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }

    pub fn message(&self) -> Cow<'static, str> {
        match REGISTRY.binary_search_by_key(&self.0, |(code, _)| *code) {
            Ok(idx) => Cow::Borrowed(REGISTRY[idx].1),
            Err(_) => Cow::Owned(format!("Unknown status code {}", self.0)),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StatusCode {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(StatusCode)
    }
}

/// Sorted by code.
const REGISTRY: &[(u32, &str)] = &[
    (900, "Success! This API request is deprecated."),
    (1000, "Success!"),
    (1001, "Unknown message received."),
    (1002, "Connection to Fishbowl Server was lost."),
    (1003, "Some requests had errors."),
    (1004, "There was an error with the database."),
    (1009, "Fishbowl Server has been shut down."),
    (1010, "You have been logged off the server by an administrator."),
    (1012, "Unknown request function."),
    (1100, "Unknown login error occurred."),
    (
        1110,
        "A new integrated application has been added to Fishbowl Inventory. \
         Please contact the Fishbowl Inventory administrator to approve it.",
    ),
    (1111, "This integrated application registration key does not match."),
    (
        1112,
        "This integrated application has not been approved by the Fishbowl Inventory administrator.",
    ),
    (1120, "Invalid username or password."),
    (1130, "Invalid ticket passed to Fishbowl Inventory Server."),
    (1131, "Invalid key value."),
    (1140, "Initialization token is not correct type."),
    (1150, "Request was invalid."),
    (1160, "Response was invalid."),
    (1162, "The login limit has been reached for the server's key."),
    (1200, "Custom field is invalid."),
    (1500, "The import was not properly formed."),
    (1501, "That import type is not supported."),
    (1502, "File not found."),
    (1503, "That export type is not supported."),
    (1504, "Unable to write to file."),
    (1505, "The import data was of the wrong type."),
    (2000, "Was not able to find the part."),
    (2001, "The part was invalid."),
    (2100, "Was not able to find the product."),
    (2101, "The product was invalid."),
    (2200, "The yield failed."),
    (2201, "Commit failed."),
    (2202, "Add initial inventory failed."),
    (2203, "Can not adjust committed inventory."),
    (2300, "Was not able to find the tag number."),
    (2301, "The tag is invalid."),
    (2302, "The tag move failed."),
    (2303, "Was not able to save the tag number."),
    (2304, "Not enough available inventory in the tag."),
    (2305, "The tag number is a location."),
    (2400, "Invalid UOM."),
    (2401, "UOM not found."),
    (2402, "Integer UOM cannot have non-integer quantity."),
    (2500, "The tracking is not valid."),
    (2510, "Serial number is missing."),
    (2511, "Serial number is null."),
    (2512, "Serial number is duplicate."),
    (2513, "Serial number is not valid."),
    (2600, "Location not found."),
    (2601, "Invalid location."),
    (2602, "Location group not found."),
    (3000, "Customer not found."),
    (3001, "Customer is invalid."),
    (3100, "Vendor not found."),
    (3101, "Vendor is invalid."),
    (4000, "There was an error loading the PO."),
    (4001, "Unknown PO status."),
    (4002, "Unknown carrier."),
    (4003, "Unknown QuickBooks class."),
    (4004, "PO does not have a PO number."),
];

/// Human-readable message for a raw status attribute.
pub fn status_message(code: Option<&str>) -> Cow<'static, str> {
    match code {
        None => Cow::Borrowed("No status code"),
        Some(raw) => match raw.parse::<StatusCode>() {
            Ok(code) => code.message(),
            Err(_) => Cow::Owned(format!("Unrecognised status code '{raw}'")),
        },
    }
}

/// Check a raw `statusCode` attribute against `expected`.
///
/// A missing code fails unless `allow_missing` is set; any present code other
/// than `expected` fails. Returns the code's message on success.
pub fn check_status(
    code: Option<&str>,
    expected: StatusCode,
    allow_missing: bool,
) -> Result<Cow<'static, str>, FishbowlError> {
    let message = status_message(code);
    let matches = code
        .and_then(|raw| raw.parse::<StatusCode>().ok())
        .is_some_and(|parsed| parsed == expected);

    if !matches && (code.is_some() || !allow_missing) {
        return Err(FishbowlError::Status {
            code: code.map(str::to_string),
            message: message.into_owned(),
        });
    }
    Ok(message)
}
