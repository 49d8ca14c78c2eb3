// ABOUTME: Name → Driver registry, with one process-wide instance.
// ABOUTME: Registration misuse is a wiring bug and panics; lookups never do.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use snafu::{Snafu, ensure};
use tokio_util::sync::CancellationToken;

use super::{Conn, Driver, cancellable};
use crate::error::{Error, Result};

/// Why a driver could not be registered.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RegistrationError {
    #[snafu(display("driver name cannot be empty"))]
    EmptyName,

    #[snafu(display("register called with no driver for '{name}'"))]
    MissingDriver { name: String },

    #[snafu(display("register called twice for driver '{name}'"))]
    Duplicate { name: String },
}

/// A set of named drivers.
///
/// Populate it during start-up; there is no way to remove a driver.
#[derive(Default)]
pub struct Registry {
    drivers: RwLock<HashMap<String, Arc<dyn Driver>>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("drivers", &self.names())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `driver` under `name`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty or already registered.
    pub fn register(&self, name: &str, driver: Arc<dyn Driver>) {
        if let Err(e) = self.try_register(name, Some(driver)) {
            panic!("ocidrv: {e}");
        }
    }

    /// Checked registration for callers wiring optional backends.
    pub fn try_register(
        &self,
        name: &str,
        driver: Option<Arc<dyn Driver>>,
    ) -> std::result::Result<(), RegistrationError> {
        ensure!(!name.trim().is_empty(), EmptyNameSnafu);
        let driver = driver.ok_or_else(|| MissingDriverSnafu { name }.build())?;

        let mut drivers = self.drivers.write();
        ensure!(!drivers.contains_key(name), DuplicateSnafu { name });
        drivers.insert(name.to_string(), driver);

        tracing::debug!(driver = name, "driver registered");
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.drivers.read().contains_key(name)
    }

    /// Registered driver names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Look up `name` and open a connection to `uri` through it.
    pub async fn open(&self, cancel: &CancellationToken, name: &str, uri: &str) -> Result<Conn> {
        let driver = self
            .lookup(name)
            .ok_or_else(|| Error::UnregisteredDriver(name.to_string()))?;
        open_with(driver.as_ref(), name, cancel, uri).await
    }

    /// Call `close` on every registered driver. Drivers stay registered.
    ///
    /// Every driver is closed even if an earlier one fails; the first error is returned.
    pub async fn close_drivers(&self) -> Result<()> {
        let drivers: Vec<(String, Arc<dyn Driver>)> = self
            .drivers
            .read()
            .iter()
            .map(|(name, driver)| (name.clone(), driver.clone()))
            .collect();

        let mut first_error = None;
        for (name, driver) in drivers {
            if let Err(e) = driver.close().await {
                tracing::warn!(driver = %name, "driver close failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Open a connection through `driver`, racing the backend against `cancel`.
pub async fn open_with(
    driver: &dyn Driver,
    name: &str,
    cancel: &CancellationToken,
    uri: &str,
) -> Result<Conn> {
    tracing::debug!(driver = name, uri, "opening connection");
    let inner = cancellable(cancel, driver.open(cancel, uri)).await?;
    Ok(Conn::new(name, uri, inner))
}

static DRIVERS: LazyLock<Registry> = LazyLock::new(Registry::new);

/// The process-wide registry.
pub fn global() -> &'static Registry {
    &DRIVERS
}

/// Register a driver in the process-wide registry.
///
/// # Panics
///
/// Panics if `name` is empty or already registered.
pub fn register(name: &str, driver: Arc<dyn Driver>) {
    DRIVERS.register(name, driver);
}

pub fn try_register(
    name: &str,
    driver: Option<Arc<dyn Driver>>,
) -> std::result::Result<(), RegistrationError> {
    DRIVERS.try_register(name, driver)
}

pub fn lookup(name: &str) -> Option<Arc<dyn Driver>> {
    DRIVERS.lookup(name)
}

/// Names of every driver in the process-wide registry, sorted.
pub fn drivers() -> Vec<String> {
    DRIVERS.names()
}

/// Open a connection through a driver from the process-wide registry.
pub async fn open(cancel: &CancellationToken, name: &str, uri: &str) -> Result<Conn> {
    DRIVERS.open(cancel, name, uri).await
}
