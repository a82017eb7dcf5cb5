//! Upload engine: byte buffers, single files, recursive directory trees.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncRead;
use tracing::*;

use crate::error::{Error, Result};
use crate::local_fs;

use super::parser;
use super::session::{RemoteSession, ScpSession, TransferOp};
use super::types::TransferKind;

impl<S: RemoteSession> ScpSession<S> {
    /// Create a file on the remote host from an in-memory buffer.
    /// An unset mode defaults to `0755`.
    pub async fn send_bytes(
        &mut self,
        content: &[u8],
        remote_path: &str,
        mode: Option<u32>,
    ) -> Result<()> {
        let remote_path = local_fs::clean_str(remote_path);
        let mode = mode.unwrap_or(0o755);
        let name = local_fs::base_name(&remote_path);
        let mut source: &[u8] = content;

        self.transfer(
            TransferKind::SendFile,
            &remote_path,
            TransferOp::SendStream {
                mode,
                length: content.len() as u64,
                name,
                source: &mut source,
            },
        )
        .await
    }

    /// Copy a local regular file to the remote host. An unset mode takes the
    /// local file's permission bits.
    pub async fn send_file(
        &mut self,
        local_path: impl AsRef<Path>,
        remote_path: &str,
        mode: Option<u32>,
    ) -> Result<()> {
        let local_path = local_fs::clean(local_path.as_ref());
        let remote_path = local_fs::clean_str(remote_path);

        let meta = tokio::fs::metadata(&local_path).await?;
        if meta.is_dir() {
            return Err(Error::NotRegular(local_path));
        }
        let mut file = File::open(&local_path).await?;

        let mode = mode.unwrap_or(meta.permissions().mode() & 0o777);
        let name = local_fs::base_name(&remote_path);

        self.transfer(
            TransferKind::SendFile,
            &remote_path,
            TransferOp::SendStream {
                mode,
                length: meta.len(),
                name,
                source: &mut file,
            },
        )
        .await
    }

    /// Copy a local directory tree to the remote host. The mode applies only
    /// to the top directory; every nested entry keeps its local permission
    /// bits. An unset mode takes the top directory's own bits.
    pub async fn send_dir(
        &mut self,
        local_dir: impl AsRef<Path>,
        remote_dir: &str,
        mode: Option<u32>,
    ) -> Result<()> {
        let local_dir = local_fs::clean(local_dir.as_ref());
        let remote_dir = local_fs::clean_str(remote_dir);

        let mode = match mode {
            Some(mode) => mode,
            None => tokio::fs::metadata(&local_dir).await?.permissions().mode() & 0o777,
        };

        self.transfer(
            TransferKind::SendDir,
            &remote_dir,
            TransferOp::SendDir {
                local_dir: &local_dir,
                mode,
            },
        )
        .await
    }

    /// Emit one file: `C` header, payload, sentinel, with a reply consumed
    /// after the header and after the payload.
    pub(crate) async fn send_one_file(
        &mut self,
        mode: u32,
        length: u64,
        name: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<()> {
        debug!(session=%self.tag, name, length, mode = format!("{mode:04o}"), "sending file");
        let header = parser::format_file(mode, length, name)?;
        self.wire.write_raw(header.as_bytes()).await?;
        self.wire.read_reply().await?;
        self.wire.stream_out(source, length).await
    }

    /// Walk a directory: `D` header, entries in natural order (files sent,
    /// subdirectories recursed, anything else skipped), then `E`.
    pub(crate) async fn send_dir_tree(&mut self, local_dir: &Path, mode: u32) -> Result<()> {
        let dir_name = local_fs::base_name(&local_dir.to_string_lossy());

        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(local_dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            entries.push(entry);
        }

        debug!(session=%self.tag, dir = %local_dir.display(), entries = entries.len(), "sending directory");
        let header = parser::format_start_dir(mode, &dir_name)?;
        self.wire.write_raw(header.as_bytes()).await?;
        self.wire.read_reply().await?;

        for entry in entries {
            let file_type = entry.file_type().await?;
            let name = entry.file_name().to_string_lossy().into_owned();

            if file_type.is_dir() {
                let sub_mode =
                    entry.metadata().await?.permissions().mode() & 0o777;
                Box::pin(self.send_dir_tree(&entry.path(), sub_mode)).await?;
            } else if file_type.is_file() {
                let meta = entry.metadata().await?;
                let mut file = File::open(entry.path()).await?;
                self.send_one_file(
                    meta.permissions().mode() & 0o777,
                    meta.len(),
                    &name,
                    &mut file,
                )
                .await?;
            }
            // Symlinks and special files are skipped.
        }

        self.wire.write_raw(parser::format_end_dir().as_bytes()).await?;
        self.wire.read_reply().await
    }
}
