// ABOUTME: Integration tests for the connection lifecycle and capability handles.
// ABOUTME: Covers begin/prepare ordering, handle caching and invalidation on close.

mod support;

use ocidrv::capability::{Capability, Puller};
use ocidrv::driver::registry;
use ocidrv::error::{Error, ErrorKind};
use support::stub::{StubDriver, StubOptions};
use tokio_util::sync::CancellationToken;

async fn open_stub(options: StubOptions) -> (StubDriver, ocidrv::Conn) {
    support::init_tracing();
    let driver = StubDriver::new(options);
    let conn = registry::open_with(&driver, "stub", &CancellationToken::new(), "stub://")
        .await
        .expect("open should succeed");
    (driver, conn)
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn prepare_before_begin_fails() {
        let (_driver, conn) = open_stub(StubOptions::default()).await;
        let err = conn.prepare("images").unwrap_err();
        assert!(matches!(err, Error::NotBegun));
    }

    #[tokio::test]
    async fn begin_runs_once() {
        let (driver, conn) = open_stub(StubOptions::default()).await;
        let cancel = CancellationToken::new();

        conn.begin(&cancel).await.expect("begin should succeed");
        conn.begin(&cancel).await.expect("second begin is a no-op");

        assert!(conn.is_begun());
        assert_eq!(driver.recorder.count("begin"), 1);
    }

    #[tokio::test]
    async fn failed_begin_can_be_retried() {
        let (driver, conn) = open_stub(StubOptions {
            fail_begin: true,
            ..Default::default()
        })
        .await;
        let cancel = CancellationToken::new();

        let err = conn.begin(&cancel).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert!(!conn.is_begun());

        let _ = conn.begin(&cancel).await;
        assert_eq!(driver.recorder.count("begin"), 2);
    }

    #[tokio::test]
    async fn begin_with_cancelled_token_does_not_reach_backend() {
        let (driver, conn) = open_stub(StubOptions::default()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = conn.begin(&cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(driver.recorder.count("begin"), 0);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (driver, conn) = open_stub(StubOptions::default()).await;
        conn.begin(&CancellationToken::new()).await.unwrap();

        conn.close().await.expect("close should succeed");
        conn.close().await.expect("second close is a no-op");

        assert!(conn.is_closed());
        assert_eq!(driver.recorder.count("close"), 1);
    }

    #[tokio::test]
    async fn closed_connection_rejects_begin_and_prepare() {
        let (_driver, conn) = open_stub(StubOptions::default()).await;
        conn.close().await.unwrap();

        assert!(matches!(
            conn.begin(&CancellationToken::new()).await,
            Err(Error::ConnectionClosed)
        ));
        assert!(matches!(conn.prepare("images"), Err(Error::ConnectionClosed)));
    }
}

mod handles {
    use super::*;

    #[tokio::test]
    async fn prepare_caches_per_service() {
        let (driver, conn) = open_stub(StubOptions::default()).await;
        conn.begin(&CancellationToken::new()).await.unwrap();

        let first = conn.prepare("images").unwrap();
        let second = conn.prepare("images").unwrap();
        conn.prepare("containers").unwrap();

        assert_eq!(first.service(), "images");
        assert_eq!(second.service(), "images");
        assert_eq!(driver.recorder.count("prepare images"), 1);
        assert_eq!(driver.recorder.count("prepare containers"), 1);
    }

    #[tokio::test]
    async fn unknown_service_is_unsupported() {
        let (_driver, conn) = support::memory_conn().await;
        let err = conn.prepare("volumes").unwrap_err();
        assert!(matches!(err, Error::UnsupportedService(ref s) if s == "volumes"));
        assert!(err.is_unsupported());
    }

    #[tokio::test]
    async fn missing_capability_is_unsupported_operation() {
        let (_driver, conn) = open_stub(StubOptions {
            pull_only: true,
            ..Default::default()
        })
        .await;
        conn.begin(&CancellationToken::new()).await.unwrap();

        let handle = conn.prepare("containers").unwrap();
        assert!(handle.puller().is_ok());
        let err = handle.creator().err().unwrap();
        assert!(matches!(
            err,
            Error::UnsupportedOperation {
                capability: Capability::Create,
                ref service,
            } if service == "containers"
        ));
        assert_eq!(handle.capabilities(), vec![Capability::Pull]);
    }

    #[tokio::test]
    async fn handles_fail_after_close() {
        let (_driver, conn) = open_stub(StubOptions::default()).await;
        conn.begin(&CancellationToken::new()).await.unwrap();
        let handle = conn.prepare("images").unwrap();
        assert!(handle.supports(Capability::Pull));

        conn.close().await.unwrap();

        assert!(handle.is_closed());
        assert!(!handle.supports(Capability::Pull));
        assert!(handle.capabilities().is_empty());
        assert!(matches!(handle.puller().err(), Some(Error::ConnectionClosed)));
    }

    /// Test: A capability borrowed before close never reaches the backend afterwards.
    #[tokio::test]
    async fn borrowed_capability_fails_after_close() {
        let (driver, conn) = open_stub(StubOptions::default()).await;
        conn.begin(&CancellationToken::new()).await.unwrap();
        let handle = conn.prepare("images").unwrap();
        let puller = handle.puller().unwrap();

        conn.close().await.unwrap();

        let err = puller
            .pull(&CancellationToken::new(), "alpine:3")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert!(!driver.recorder.contains("pull"));
    }

    #[tokio::test]
    async fn close_interrupts_running_call() {
        let (driver, conn) = open_stub(StubOptions {
            pull_delay: std::time::Duration::from_secs(60),
            ..Default::default()
        })
        .await;
        conn.begin(&CancellationToken::new()).await.unwrap();
        let handle = conn.prepare("images").unwrap();

        let task = tokio::spawn(async move {
            let puller = handle.puller()?;
            puller.pull(&CancellationToken::new(), "alpine:3").await
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        conn.close().await.unwrap();

        let err = tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .expect("close should stop the pull")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert!(!driver.recorder.contains("pull"));
    }

    #[tokio::test]
    async fn handles_fail_after_drop() {
        let (_driver, conn) = open_stub(StubOptions::default()).await;
        conn.begin(&CancellationToken::new()).await.unwrap();
        let handle = conn.prepare("images").unwrap();

        drop(conn);

        assert!(handle.is_closed());
        assert!(matches!(handle.puller().err(), Some(Error::ConnectionClosed)));
    }

    /// Test: The memory backend offers every capability across its services.
    #[tokio::test]
    async fn memory_services_cover_every_capability() {
        let (_driver, conn) = support::memory_conn().await;

        let mut offered: Vec<Capability> = Vec::new();
        for service in ["images", "networks", "namespaces", "containers"] {
            let handle = conn.prepare(service).unwrap();
            offered.extend(handle.capabilities());
        }

        for capability in Capability::ALL {
            assert!(offered.contains(&capability), "nobody offers {capability}");
        }
        let images = conn.prepare("images").unwrap();
        assert!(!images.supports(Capability::Start));
    }

    #[tokio::test]
    async fn handle_is_shareable_across_tasks() {
        let (_driver, conn) = support::memory_conn().await;
        let handle = conn.prepare("images").unwrap();

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let handle = handle.clone();
                tokio::spawn(async move {
                    let reference = format!("app:{i}");
                    let puller = handle.puller()?;
                    puller.pull(&CancellationToken::new(), &reference).await
                })
            })
            .collect();

        for task in tasks {
            let id = task.await.unwrap().expect("pull should succeed");
            assert!(id.starts_with("sha256:"));
        }
        conn.close().await.unwrap();
    }
}
