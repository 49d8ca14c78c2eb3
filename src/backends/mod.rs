// ABOUTME: Bundled drivers and their registration in the process-wide registry.
// ABOUTME: memory is always available; docker and podman speak the Engine API.

pub mod docker;
pub mod memory;

use std::sync::{Arc, Once};

use crate::driver;

pub use docker::DockerDriver;
pub use memory::MemoryDriver;

static REGISTER: Once = Once::new();

/// Register the bundled drivers as `memory`, `docker` and `podman`.
///
/// Safe to call more than once; only the first call registers anything.
pub fn register_builtin() {
    REGISTER.call_once(|| {
        driver::register("memory", Arc::new(MemoryDriver::new()));
        driver::register("docker", Arc::new(DockerDriver::docker()));
        driver::register("podman", Arc::new(DockerDriver::podman()));
    });
}
