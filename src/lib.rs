pub mod cli;
pub mod client;
pub mod objects;
pub mod protocol;

pub use cli::{Command, prompt};
pub use client::{Fishbowl, Row};
pub use objects::LazyObject;
pub use protocol::{FishbowlError, ResponseOptions, Session, SessionConfig};
