// ABOUTME: Integration tests for operation chains.
// ABOUTME: Covers ordered execution, fail-fast commit, cancellation and id threading between steps.

mod support;

use async_trait::async_trait;
use ocidrv::backends::memory::ContainerStatus;
use ocidrv::capability::Inspector;
use ocidrv::chain::{ChainState, Step, StepContext};
use ocidrv::error::{Error, Result};
use support::stub::{Recorder, StubDriver, StubOptions};
use tokio_util::sync::CancellationToken;

/// A closure step that records `name` and succeeds.
macro_rules! recording_step {
    ($log:expr, $name:literal) => {{
        let log = $log.clone();
        move |_cancel: CancellationToken| {
            let log = log.clone();
            async move {
                log.record($name);
                Ok::<(), Error>(())
            }
        }
    }};
}

async fn stub_conn(options: StubOptions) -> (StubDriver, ocidrv::Conn) {
    let driver = StubDriver::new(options);
    let conn = support::open_begun(std::sync::Arc::new(driver.clone()), "stub").await;
    (driver, conn)
}

mod ordering {
    use super::*;

    #[tokio::test]
    async fn steps_run_in_order() {
        let (_driver, conn) = stub_conn(StubOptions::default()).await;
        let log = Recorder::default();

        let mut chain = conn.chain("nginx:latest");
        chain
            .step("a", recording_step!(log, "a"))
            .step("b", recording_step!(log, "b"))
            .step("c", recording_step!(log, "c"));
        assert_eq!(chain.step_names(), vec!["a", "b", "c"]);
        assert_eq!(chain.state(), ChainState::Building);

        chain.commit(&CancellationToken::new()).await.unwrap();

        assert_eq!(log.events(), vec!["a", "b", "c"]);
        assert_eq!(chain.state(), ChainState::Committed);
        assert_eq!(chain.completed(), 3);
    }

    /// Test: A failing step stops the chain and its error comes back unchanged.
    #[tokio::test]
    async fn first_failure_stops_the_chain() {
        let (_driver, conn) = stub_conn(StubOptions::default()).await;
        let log = Recorder::default();

        let mut chain = conn.chain("nginx:latest");
        chain
            .step("a", recording_step!(log, "a"))
            .step("b", |_| async { Err::<(), _>(Error::backend("b.run", "boom")) })
            .step("c", recording_step!(log, "c"));

        let err = chain.commit(&CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, Error::Backend { ref call, .. } if call == "b.run"));
        assert_eq!(err.to_string(), "b.run failed: boom");
        assert_eq!(log.events(), vec!["a"]);
        assert_eq!(chain.state(), ChainState::Failed { step: 1 });
        assert_eq!(chain.completed(), 1);
    }

    #[tokio::test]
    async fn failed_network_skips_container() {
        let (driver, conn) = stub_conn(StubOptions {
            failing_service: Some("networks"),
            ..Default::default()
        })
        .await;

        let mut chain = conn.chain("nginx:latest");
        chain.pull_image().new_network().new_container();
        let err = chain.commit(&CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, Error::Backend { ref call, .. } if call == "networks.create"));
        assert_eq!(chain.state(), ChainState::Failed { step: 1 });
        assert!(driver.recorder.contains("pull nginx:latest"));
        assert!(driver.recorder.contains("create networks failed"));
        assert!(!driver.recorder.contains("create containers"));

        let provisioned = chain.provisioned();
        assert_eq!(
            provisioned.image.as_ref().map(|i| i.as_str()),
            Some("nginx:latest")
        );
        assert!(provisioned.network.is_none());
        assert!(provisioned.container.is_none());
    }

    #[tokio::test]
    async fn empty_chain_commits() {
        let (_driver, conn) = stub_conn(StubOptions::default()).await;
        let mut chain = conn.chain("nginx:latest");
        assert!(chain.is_empty());

        chain.commit(&CancellationToken::new()).await.unwrap();
        assert_eq!(chain.state(), ChainState::Committed);
        assert!(chain.state().is_terminal());
    }
}

mod single_commit {
    use super::*;

    #[tokio::test]
    async fn second_commit_fails() {
        let (_driver, conn) = stub_conn(StubOptions::default()).await;
        let mut chain = conn.chain("nginx:latest");
        chain.pull_image();

        chain.commit(&CancellationToken::new()).await.unwrap();
        let err = chain.commit(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::ChainFinished));
    }

    #[tokio::test]
    async fn failed_chain_cannot_be_recommitted() {
        let (_driver, conn) = stub_conn(StubOptions::default()).await;
        let mut chain = conn.chain("nginx:latest");
        chain.start_container();

        assert!(chain.commit(&CancellationToken::new()).await.is_err());
        let err = chain.commit(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::ChainFinished));
    }

    #[tokio::test]
    async fn steps_appended_after_commit_are_ignored() {
        let (driver, conn) = stub_conn(StubOptions::default()).await;
        let mut chain = conn.chain("nginx:latest");
        chain.pull_image();
        chain.commit(&CancellationToken::new()).await.unwrap();

        chain.new_container().start_container();

        assert_eq!(chain.len(), 1);
        assert!(!driver.recorder.contains("create"));
    }
}

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn cancelled_token_runs_no_steps() {
        let (driver, conn) = stub_conn(StubOptions::default()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut chain = conn.chain("nginx:latest");
        chain.pull_image().new_container();
        let err = chain.commit(&cancel).await.unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(chain.state(), ChainState::Failed { step: 0 });
        assert_eq!(chain.completed(), 0);
        assert!(!driver.recorder.contains("pull"));
    }

    #[tokio::test]
    async fn cancel_between_steps_stops_the_chain() {
        let (driver, conn) = stub_conn(StubOptions::default()).await;
        let cancel = CancellationToken::new();

        let mut chain = conn.chain("nginx:latest");
        chain
            .step("cancel", |token: CancellationToken| async move {
                token.cancel();
                Ok::<(), Error>(())
            })
            .pull_image();
        let err = chain.commit(&cancel).await.unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(chain.state(), ChainState::Failed { step: 1 });
        assert_eq!(chain.completed(), 1);
        assert!(!driver.recorder.contains("pull"));
    }
}

mod provisioning {
    use super::*;

    #[tokio::test]
    async fn full_chain_provisions_everything() {
        let (driver, conn) = support::memory_conn().await;

        let mut chain = conn.chain("alpine:3");
        chain
            .pull_image()
            .new_network()
            .new_namespace()
            .new_container()
            .start_container()
            .exec("echo", ["ready"]);
        chain.commit(&CancellationToken::new()).await.unwrap();

        let provisioned = chain.provisioned().clone();
        let engine = driver.engine();
        let container = engine
            .container(provisioned.container.unwrap().as_str())
            .unwrap();
        assert_eq!(container.status, ContainerStatus::Running);
        assert_eq!(
            Some(container.image.as_str()),
            provisioned.image.as_ref().map(|i| i.as_str())
        );
        assert_eq!(
            container.network.as_deref(),
            provisioned.network.as_ref().map(|n| n.as_str())
        );
        assert_eq!(
            container.namespace.as_deref(),
            provisioned.namespace.as_ref().map(|n| n.as_str())
        );
    }

    #[tokio::test]
    async fn start_without_container_is_missing_prerequisite() {
        let (_driver, conn) = support::memory_conn().await;
        let mut chain = conn.chain("alpine:3");
        chain.start_container();

        let err = chain.commit(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::MissingPrerequisite { ref step, resource: "container" } if step == "start_container"
        ));
    }

    /// Test: A failed exec leaves the running container in place.
    #[tokio::test]
    async fn failed_exec_does_not_roll_back() {
        let (driver, conn) = support::memory_conn().await;
        let mut chain = conn.chain("alpine:3");
        chain
            .pull_image()
            .new_container()
            .start_container()
            .exec("false", Vec::<String>::new());

        let err = chain.commit(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::ExecFailed { code: 1, .. }));
        assert_eq!(chain.state(), ChainState::Failed { step: 3 });

        let id = chain.provisioned().container.clone().unwrap();
        assert!(driver.engine().is_running(id.as_str()).unwrap());
    }

    #[tokio::test]
    async fn new_container_falls_back_to_reference() {
        let (driver, conn) = support::memory_conn().await;
        let image = driver.engine().pull("alpine:3").unwrap();

        let mut chain = conn.chain("alpine:3");
        chain.new_container();
        chain.commit(&CancellationToken::new()).await.unwrap();

        let id = chain.provisioned().container.clone().unwrap();
        assert_eq!(driver.engine().container(id.as_str()).unwrap().image, image);
    }

    #[tokio::test]
    async fn closed_connection_fails_first_step() {
        let (_driver, conn) = support::memory_conn().await;
        conn.close().await.unwrap();

        let mut chain = conn.chain("alpine:3");
        chain.pull_image();
        let err = chain.commit(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert_eq!(chain.state(), ChainState::Failed { step: 0 });
    }

    struct ExpectContainer;

    #[async_trait]
    impl Step for ExpectContainer {
        fn name(&self) -> &str {
            "expect_container"
        }

        async fn run(&self, ctx: &mut StepContext<'_>) -> Result<()> {
            let id = ctx.provisioned.container.clone().ok_or(Error::MissingPrerequisite {
                step: self.name().to_string(),
                resource: "container",
            })?;
            let stat = ctx
                .handle("containers")?
                .inspector()?
                .stat(ctx.cancel, id.as_str())
                .await?;
            assert!(!stat.is_empty());
            Ok(())
        }
    }

    #[tokio::test]
    async fn custom_steps_see_earlier_ids() {
        let (_driver, conn) = support::memory_conn().await;
        let mut chain = conn.chain("alpine:3");
        chain.pull_image().new_container().then(ExpectContainer);

        chain.commit(&CancellationToken::new()).await.unwrap();
        assert_eq!(chain.step_names().last(), Some(&"expect_container"));
    }
}
