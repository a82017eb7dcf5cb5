//! Download engine: single files and recursive directory assembly.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::*;

use crate::error::{Error, Result};
use crate::local_fs;

use super::parser;
use super::session::{RemoteSession, ScpSession, TransferOp};
use super::types::{ScpMessage, StatusLevel, TransferKind, STATUS_OK};

impl<S: RemoteSession> ScpSession<S> {
    /// Download a remote regular file.
    ///
    /// A missing local path has its parent directories created (`0755`); an
    /// existing local directory redirects the download to its parent under
    /// the remote file's name.
    pub async fn get_file(
        &mut self,
        remote_path: &str,
        local_path: impl AsRef<Path>,
    ) -> Result<()> {
        let remote_path = local_fs::clean_str(remote_path);
        let local_path = local_fs::clean(local_path.as_ref());

        let remote_name = local_fs::base_name(&remote_path);
        let local_folder = match local_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let local_path = match tokio::fs::metadata(&local_path).await {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                local_fs::ensure_dir_all(&local_folder, 0o755).await?;
                local_path
            }
            Err(e) => return Err(e.into()),
            Ok(meta) if meta.is_dir() => local_folder.join(&remote_name),
            Ok(_) => local_path,
        };

        self.transfer(
            TransferKind::GetFile,
            &remote_path,
            TransferOp::GetFile {
                local_path: &local_path,
            },
        )
        .await
    }

    /// Download a remote directory tree into `local_dir`.
    pub async fn get_dir(&mut self, remote_dir: &str, local_dir: impl AsRef<Path>) -> Result<()> {
        let remote_dir = local_fs::clean_str(remote_dir);
        let local_dir = local_fs::clean(local_dir.as_ref());

        self.transfer(
            TransferKind::GetDir,
            &remote_dir,
            TransferOp::GetDir {
                local_dir: &local_dir,
            },
        )
        .await
    }

    /// Cue the source, read one `C` header and stream the payload into the
    /// destination file.
    pub(crate) async fn receive_one_file(&mut self, local_path: &Path) -> Result<()> {
        self.wire.write_ok().await?;
        let line = self
            .wire
            .read_line()
            .await?
            .ok_or(Error::SessionClosed)?;

        match parser::parse_message(&line)? {
            ScpMessage::File { mode, length, name } => {
                debug!(session=%self.tag, name, length, file = %local_path.display(), "receiving file");
                let mut file = local_fs::create_entry(local_path, mode).await?;
                self.wire.write_ok().await?;
                self.wire.stream_in(&mut file, length).await?;
                file.sync_all().await?;
                Ok(())
            }
            ScpMessage::Status {
                level: StatusLevel::Warning | StatusLevel::Fatal,
                text,
            } => Err(Error::RemoteDiagnostic(text)),
            other => Err(Error::Protocol(format!(
                "expected a file header, got {other:?}"
            ))),
        }
    }

    /// Event loop for a recursive download, driven by the incoming stream:
    /// `D` pushes the cursor, `E` pops it, `C` lands a file at the cursor.
    /// A clean EOF ends the transfer.
    pub(crate) async fn receive_dir_tree(&mut self, local_dir: &Path) -> Result<()> {
        let mut cursor = local_dir.to_path_buf();

        loop {
            self.wire.write_ok().await?;
            let Some(line) = self.wire.read_line().await? else {
                return Ok(());
            };

            // An acknowledgement may ride in front of the control message.
            let frame = match line.first() {
                Some(&STATUS_OK) => &line[1..],
                _ => &line[..],
            };

            match parser::parse_message(frame)? {
                ScpMessage::StartDir { mode, name } => {
                    cursor.push(&name);
                    debug!(session=%self.tag, dir = %cursor.display(), "entering directory");
                    local_fs::ensure_dir(&cursor, mode).await?;
                }
                ScpMessage::File { mode, length, name } => {
                    let path = cursor.join(&name);
                    debug!(session=%self.tag, name, length, file = %path.display(), "receiving file");
                    let mut file = local_fs::create_entry(&path, mode).await?;
                    self.wire.write_ok().await?;
                    self.wire.stream_in(&mut file, length).await?;
                    file.sync_all().await?;
                }
                ScpMessage::EndDir => {
                    cursor.pop();
                    debug!(session=%self.tag, dir = %cursor.display(), "leaving directory");
                }
                ScpMessage::Status {
                    level: StatusLevel::Warning | StatusLevel::Fatal,
                    text,
                } => return Err(Error::RemoteDiagnostic(text)),
                other => {
                    return Err(Error::Protocol(format!(
                        "unexpected message in directory stream: {other:?}"
                    )))
                }
            }
        }
    }
}
