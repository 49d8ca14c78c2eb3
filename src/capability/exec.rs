// ABOUTME: Exec capability: run a command inside a running container.
// ABOUTME: Returns the exit code together with captured stdout and stderr.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

#[async_trait]
pub trait Execer: Send + Sync {
    /// Run `argv` inside `id` and wait for it to finish.
    async fn exec(
        &self,
        cancel: &CancellationToken,
        id: &str,
        argv: &[String],
    ) -> Result<ExecOutput>;
}

/// Result of an exec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: Bytes,
    pub stderr: Bytes,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a non-zero exit into `Error::ExecFailed`.
    pub fn into_result(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::ExecFailed {
                code: self.exit_code,
                stderr: String::from_utf8_lossy(&self.stderr).trim_end().to_string(),
            })
        }
    }
}
