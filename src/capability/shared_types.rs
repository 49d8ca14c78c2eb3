// ABOUTME: Types shared across capability traits.
// ABOUTME: CreateOptions for every Creator and Signal for Killer.

use std::collections::HashMap;
use std::fmt;

/// What to create. Backends read the fields that apply to their resource class
/// and ignore the rest (a network has no image).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Resource name. Backends generate one when absent.
    pub name: Option<String>,
    /// Image to run (containers).
    pub image: Option<String>,
    /// Network to attach to (containers).
    pub network: Option<String>,
    /// Namespace to join (containers).
    pub namespace: Option<String>,
    /// Command overriding the image default (containers).
    pub command: Vec<String>,
    /// Labels to apply.
    pub labels: HashMap<String, String>,
}

impl CreateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a container running `image`.
    pub fn image(image: impl Into<String>) -> Self {
        Self::new().with_image(image)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Signal delivered by `Killer::kill`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Hup,
    Int,
    Kill,
    Term,
    Usr1,
    Usr2,
    Other(i32),
}

impl Signal {
    /// POSIX signal number.
    pub fn number(&self) -> i32 {
        match self {
            Signal::Hup => 1,
            Signal::Int => 2,
            Signal::Kill => 9,
            Signal::Usr1 => 10,
            Signal::Usr2 => 12,
            Signal::Term => 15,
            Signal::Other(n) => *n,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Hup => f.write_str("SIGHUP"),
            Signal::Int => f.write_str("SIGINT"),
            Signal::Kill => f.write_str("SIGKILL"),
            Signal::Term => f.write_str("SIGTERM"),
            Signal::Usr1 => f.write_str("SIGUSR1"),
            Signal::Usr2 => f.write_str("SIGUSR2"),
            Signal::Other(n) => write!(f, "{n}"),
        }
    }
}
