//! Sequencer addresses used for auto-subscription at startup.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A sequencer endpoint, either a concrete `client:port` pair or the
/// subscribers of one of our own ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Address {
    Port { client: i32, port: i32 },
    /// Traffic goes to (or comes from) whoever subscribes; no explicit connection is made.
    Subscribers,
}

impl Address {
    pub fn new(client: i32, port: i32) -> Self {
        Address::Port { client, port }
    }

    #[inline]
    pub fn is_subscribers(&self) -> bool {
        matches!(self, Address::Subscribers)
    }
}

impl FromStr for Address {
    type Err = Error;

    /// Accepts `client:port`, `client.port`, or any word starting with `s`/`S`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::InvalidAddress(s.to_string());

        match s.chars().next() {
            Some(c) if c.is_ascii_digit() => {
                let (client, port) = s.split_once([':', '.']).ok_or_else(invalid)?;
                let client = client.trim().parse().map_err(|_| invalid())?;
                let port = port.trim().parse().map_err(|_| invalid())?;
                Ok(Address::Port { client, port })
            }
            Some('s') | Some('S') => Ok(Address::Subscribers),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Port { client, port } => write!(f, "{}:{}", client, port),
            Address::Subscribers => f.write_str("subscribers"),
        }
    }
}
