// ABOUTME: Wire-level vocabulary for requests: the Method verb and the target Kind.
// ABOUTME: Both are closed enums that display and parse as upper-case words.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The semantic operation of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Pull,
    Push,
    Inspect,
    Exec,
    Run,
}

impl Method {
    pub const ALL: [Method; 5] = [
        Method::Pull,
        Method::Push,
        Method::Inspect,
        Method::Exec,
        Method::Run,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Pull => "PULL",
            Method::Push => "PUSH",
            Method::Inspect => "INSPECT",
            Method::Exec => "EXEC",
            Method::Run => "RUN",
        }
    }

    /// Whether requests with this method must carry a non-empty reference.
    pub fn requires_reference(&self) -> bool {
        matches!(self, Method::Pull | Method::Push)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownMethod(s.to_string()))
    }
}

/// The resource class a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Kind {
    Image,
    Container,
    Network,
    Pod,
}

impl Kind {
    pub const ALL: [Kind; 4] = [Kind::Image, Kind::Container, Kind::Network, Kind::Pod];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Image => "IMAGE",
            Kind::Container => "CONTAINER",
            Kind::Network => "NETWORK",
            Kind::Pod => "POD",
        }
    }

    /// Name of the connection service that handles this kind.
    pub fn service(&self) -> &'static str {
        match self {
            Kind::Image => "images",
            Kind::Container => "containers",
            Kind::Network => "networks",
            Kind::Pod => "pods",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Kind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownKind(s.to_string()))
    }
}
