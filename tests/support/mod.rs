// ABOUTME: Test support utilities.
// ABOUTME: Provides tracing setup, a recording stub driver and memory-backed fixtures.

use std::sync::{Arc, Once};

use ocidrv::backends::MemoryDriver;
use ocidrv::driver::{Conn, registry};
use tokio_util::sync::CancellationToken;

// Each test binary only uses some of these modules, so allow dead_code.
#[allow(dead_code)]
pub mod stub;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("ocidrv=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A begun connection to a fresh memory engine.
#[allow(dead_code)]
pub async fn memory_conn() -> (Arc<MemoryDriver>, Conn) {
    init_tracing();
    let driver = Arc::new(MemoryDriver::new());
    let conn = open_begun(driver.clone(), "memory").await;
    (driver, conn)
}

/// Open and begin a connection through `driver` without touching the global registry.
#[allow(dead_code)]
pub async fn open_begun(driver: Arc<dyn ocidrv::Driver>, name: &str) -> Conn {
    let cancel = CancellationToken::new();
    let conn = registry::open_with(driver.as_ref(), name, &cancel, "")
        .await
        .unwrap();
    conn.begin(&cancel).await.unwrap();
    conn
}
