//! Per-transfer session driver.
//!
//! Couples the launch of the remote `scp` helper with the client-side
//! protocol handler: one session per transfer, a wall-clock timeout around
//! the handler, stdin closed exactly once when it finishes, and the remote
//! exit status harvested on every path.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio::time;
use tracing::*;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::types::TransferKind;
use super::wire::Wire;

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// One exec channel on an SSH connection, exclusively owned by a single
/// transfer. `start` issues the remote command; `send`/`recv` are the
/// process's stdin/stdout; `recv` returns `None` at EOF. Dropping the
/// session closes the channel.
#[allow(async_fn_in_trait)]
pub trait RemoteSession: Send {
    async fn start(&mut self, command: &str) -> Result<()>;
    async fn send(&mut self, data: &[u8]) -> Result<()>;
    async fn recv(&mut self) -> Result<Option<Bytes>>;
    async fn close_stdin(&mut self) -> Result<()>;
    async fn wait(&mut self) -> Result<Option<u32>>;
}

/// The client side of one SCP transfer over a [`RemoteSession`].
pub struct ScpSession<S> {
    pub(crate) wire: Wire<S>,
    pub(crate) timeout: Duration,
    pub(crate) tag: Uuid,
}

/// Protocol work to run once the remote `scp` has been started.
pub(crate) enum TransferOp<'a> {
    SendStream {
        mode: u32,
        length: u64,
        name: String,
        source: &'a mut (dyn AsyncRead + Unpin + Send),
    },
    SendDir {
        local_dir: &'a Path,
        mode: u32,
    },
    GetFile {
        local_path: &'a Path,
    },
    GetDir {
        local_dir: &'a Path,
    },
}

impl<S: RemoteSession> ScpSession<S> {
    pub fn new(remote: S) -> Self {
        Self {
            wire: Wire::new(remote),
            timeout: DEFAULT_TIMEOUT,
            tag: Uuid::new_v4(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Drive one transfer: start `scp <flag> <path>` on the remote, run the
    /// protocol handler under the timeout, close stdin, await the exit
    /// status. The handler's error wins over a non-zero exit.
    pub(crate) async fn transfer(
        &mut self,
        kind: TransferKind,
        remote_path: &str,
        op: TransferOp<'_>,
    ) -> Result<()> {
        let command = format!("scp {} {}", kind.flag(), remote_path);
        debug!(session=%self.tag, %command, "starting remote scp");
        self.wire.start(&command).await?;

        let outcome = match time::timeout(self.timeout, self.run_handler(op)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(session=%self.tag, %command, "transfer timed out");
                let _ = self.wire.close_stdin().await;
                return Err(Error::Timeout);
            }
        };

        // Closing stdin is what tells the remote scp to finish and exit.
        let _ = self.wire.close_stdin().await;

        let exit = self.wire.wait().await;
        outcome?;
        match exit? {
            Some(status) if status != 0 => {
                debug!(session=%self.tag, status, "remote scp exited with error");
                Err(Error::RemoteExit(status))
            }
            _ => Ok(()),
        }
    }

    async fn run_handler(&mut self, op: TransferOp<'_>) -> Result<()> {
        match op {
            TransferOp::SendStream {
                mode,
                length,
                name,
                source,
            } => self.send_one_file(mode, length, &name, source).await,
            TransferOp::SendDir { local_dir, mode } => {
                self.send_dir_tree(local_dir, mode).await
            }
            TransferOp::GetFile { local_path } => self.receive_one_file(local_path).await,
            TransferOp::GetDir { local_dir } => self.receive_dir_tree(local_dir).await,
        }
    }
}
