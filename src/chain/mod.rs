// ABOUTME: Operation chain: an ordered list of deferred provisioning steps.
// ABOUTME: commit runs them in order against one connection and stops at the first failure.

mod step;
mod steps;

use std::fmt;
use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::capability::CreateOptions;
use crate::driver::{Conn, cancellable};
use crate::error::{Error, Result};

pub use step::{FnStep, Provisioned, Step, StepContext};
pub use steps::{Exec, NewContainer, NewNamespace, NewNetwork, PullImage, StartContainer};

/// Where a chain is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// Steps may still be appended.
    Building,
    /// `commit` is running.
    Committing,
    /// Every step succeeded.
    Committed,
    /// The step at this index failed; later steps never ran.
    Failed { step: usize },
}

impl ChainState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChainState::Committed | ChainState::Failed { .. })
    }
}

/// A provisioning plan for one reference.
///
/// Nothing touches the backend until [`Chain::commit`]. A failed commit
/// leaves whatever earlier steps created in place; [`Chain::provisioned`]
/// tells the caller what that was.
///
/// ```ignore
/// let mut chain = conn.chain("nginx:latest");
/// chain.pull_image().new_network().new_container().start_container();
/// chain.commit(&cancel).await?;
/// ```
pub struct Chain<'c> {
    conn: &'c Conn,
    reference: String,
    steps: Vec<Box<dyn Step>>,
    state: ChainState,
    provisioned: Provisioned,
    completed: usize,
}

impl fmt::Debug for Chain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("reference", &self.reference)
            .field("steps", &self.step_names())
            .field("state", &self.state)
            .field("completed", &self.completed)
            .finish()
    }
}

impl<'c> Chain<'c> {
    pub fn new(conn: &'c Conn, reference: impl Into<String>) -> Self {
        Self {
            conn,
            reference: reference.into(),
            steps: Vec::new(),
            state: ChainState::Building,
            provisioned: Provisioned::default(),
            completed: 0,
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of steps that finished successfully.
    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn provisioned(&self) -> &Provisioned {
        &self.provisioned
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Append an arbitrary step.
    pub fn then(&mut self, step: impl Step + 'static) -> &mut Self {
        self.push(Box::new(step))
    }

    /// Append a closure step. It receives the token passed to `commit`.
    pub fn step<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.push(Box::new(FnStep::new(name, f)))
    }

    pub fn pull_image(&mut self) -> &mut Self {
        self.then(PullImage)
    }

    pub fn new_network(&mut self) -> &mut Self {
        self.new_network_with(CreateOptions::new())
    }

    pub fn new_network_with(&mut self, options: CreateOptions) -> &mut Self {
        self.then(NewNetwork { options })
    }

    pub fn new_namespace(&mut self) -> &mut Self {
        self.new_namespace_with(CreateOptions::new())
    }

    pub fn new_namespace_with(&mut self, options: CreateOptions) -> &mut Self {
        self.then(NewNamespace { options })
    }

    pub fn new_container(&mut self) -> &mut Self {
        self.new_container_with(CreateOptions::new())
    }

    pub fn new_container_with(&mut self, options: CreateOptions) -> &mut Self {
        self.then(NewContainer { options })
    }

    pub fn start_container(&mut self) -> &mut Self {
        self.then(StartContainer)
    }

    /// Run `cmd args...` in the chain's container.
    pub fn exec<I, S>(&mut self, cmd: impl Into<String>, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = vec![cmd.into()];
        argv.extend(args.into_iter().map(Into::into));
        self.then(Exec { argv })
    }

    fn push(&mut self, step: Box<dyn Step>) -> &mut Self {
        if self.state != ChainState::Building {
            tracing::warn!(
                step = step.name(),
                state = ?self.state,
                "ignoring step appended after commit"
            );
            return self;
        }
        self.steps.push(step);
        self
    }

    /// Run every step in order. The first error stops the chain and is
    /// returned unchanged.
    ///
    /// The token is checked before each step, so a cancelled commit never
    /// starts another one. A chain commits once; later calls fail with
    /// [`Error::ChainFinished`].
    pub async fn commit(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.state != ChainState::Building {
            return Err(Error::ChainFinished);
        }
        self.state = ChainState::Committing;

        let total = self.steps.len();
        tracing::info!(reference = %self.reference, steps = total, "committing chain");

        for (index, step) in self.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(step = step.name(), "chain cancelled before step");
                self.state = ChainState::Failed { step: index };
                return Err(Error::Cancelled);
            }

            tracing::info!(
                step = step.name(),
                "step {}/{}",
                index + 1,
                total
            );

            let mut ctx = StepContext {
                conn: self.conn,
                cancel,
                reference: &self.reference,
                provisioned: &mut self.provisioned,
            };
            if let Err(e) = cancellable(cancel, step.run(&mut ctx)).await {
                tracing::warn!(step = step.name(), "chain step failed: {}", e);
                self.state = ChainState::Failed { step: index };
                return Err(e);
            }
            self.completed += 1;
        }

        self.state = ChainState::Committed;
        Ok(())
    }
}
