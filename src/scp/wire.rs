//! Buffered wire I/O over one session's stdio.
//!
//! Reads may consume past a message boundary into the next frame's prefix,
//! so everything goes through a single leftover buffer. Payloads are framed
//! by the declared length, not by the trailing `\x00` sentinel alone: a
//! payload chunk may end in `\n`, and the sentinel may ride along with the
//! next control message.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

use super::session::RemoteSession;
use super::types::{DATA_BUFFER_SIZE, SEND_BUFFER_SIZE, STATUS_FATAL, STATUS_OK, STATUS_WARNING};

pub(crate) struct Wire<S> {
    remote: S,
    leftover: Vec<u8>,
}

impl<S: RemoteSession> Wire<S> {
    pub(crate) fn new(remote: S) -> Self {
        Self {
            remote,
            leftover: Vec::new(),
        }
    }

    pub(crate) async fn start(&mut self, command: &str) -> Result<()> {
        self.remote.start(command).await
    }

    pub(crate) async fn close_stdin(&mut self) -> Result<()> {
        self.remote.close_stdin().await
    }

    pub(crate) async fn wait(&mut self) -> Result<Option<u32>> {
        self.remote.wait().await
    }

    pub(crate) async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.remote.send(data).await
    }

    /// Single `\x00`: acknowledgement, and the "send next frame" cue for a
    /// remote source.
    pub(crate) async fn write_ok(&mut self) -> Result<()> {
        self.remote.send(&[STATUS_OK]).await
    }

    /// Next non-empty chunk of at most `max` bytes, served from the
    /// leftover buffer first. `None` on EOF.
    async fn next_chunk(&mut self, max: usize) -> Result<Option<Vec<u8>>> {
        loop {
            if !self.leftover.is_empty() {
                let take = self.leftover.len().min(max);
                return Ok(Some(self.leftover.drain(..take).collect()));
            }
            match self.remote.recv().await? {
                Some(chunk) if chunk.is_empty() => continue,
                Some(chunk) if chunk.len() > max => {
                    self.leftover.extend_from_slice(&chunk[max..]);
                    return Ok(Some(chunk[..max].to_vec()));
                }
                Some(chunk) => return Ok(Some(chunk.to_vec())),
                None => return Ok(None),
            }
        }
    }

    /// Read one message up to and including `\n`. Returns `None` on a clean
    /// EOF; a partial line at EOF is returned as-is.
    pub(crate) async fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(pos) = self.leftover.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.leftover.drain(..=pos).collect();
                return Ok(Some(line));
            }
            match self.remote.recv().await? {
                Some(chunk) => self.leftover.extend_from_slice(&chunk),
                None => {
                    if self.leftover.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(std::mem::take(&mut self.leftover)));
                }
            }
        }
    }

    /// Read and classify one status reply.
    ///
    /// The remote may collapse an acknowledgement and an error into a single
    /// chunk (`\x00\x01scp: …: No such file or directory\n`), so an OK first
    /// byte is only conclusive when no error byte follows it.
    pub(crate) async fn read_reply(&mut self) -> Result<()> {
        let chunk = match self.next_chunk(DATA_BUFFER_SIZE).await? {
            Some(chunk) => chunk,
            None => return Err(Error::SessionClosed),
        };

        let first = chunk[0];
        if first == STATUS_OK {
            let second = chunk.get(1).copied().unwrap_or(STATUS_OK);
            if second != STATUS_WARNING && second != STATUS_FATAL {
                return Ok(());
            }
            if chunk.len() > 2 {
                return Err(Error::RemoteDiagnostic(
                    String::from_utf8_lossy(&chunk[2..]).into_owned(),
                ));
            }
            return Err(Error::RemoteDiagnostic("scp: unknown error".into()));
        }

        if first != STATUS_WARNING && first != STATUS_FATAL {
            return Err(Error::UnexpectedReply(first));
        }

        if chunk.len() > 1 {
            return Err(Error::RemoteDiagnostic(
                String::from_utf8_lossy(&chunk[1..]).into_owned(),
            ));
        }
        Err(Error::RemoteDiagnostic(if first == STATUS_WARNING {
            "scp: error".into()
        } else {
            "scp: fatal error".into()
        }))
    }

    /// Receive `declared_len` payload bytes into `dst`.
    ///
    /// Counts against the declared length; on the final chunk a terminal
    /// `\x00` is the sender's end-of-payload sentinel and is dropped. A
    /// sentinel that arrives with the next control message instead is left
    /// for the next read.
    pub(crate) async fn stream_in(
        &mut self,
        dst: &mut (impl AsyncWrite + Unpin),
        declared_len: u64,
    ) -> Result<()> {
        let mut count: u64 = 0;
        loop {
            let chunk = match self.next_chunk(DATA_BUFFER_SIZE).await? {
                Some(chunk) => chunk,
                None => return Err(Error::SessionClosed),
            };

            count += chunk.len() as u64;
            let mut take = chunk.len();
            let reached_end = count >= declared_len;
            if reached_end && chunk[take - 1] == STATUS_OK {
                take -= 1;
            }

            let written = dst.write(&chunk[..take]).await?;
            if written != take {
                return Err(Error::ShortWrite {
                    written,
                    read: take,
                });
            }

            if reached_end {
                return Ok(());
            }
        }
    }

    /// Send exactly `declared_len` payload bytes from `src`, then the
    /// end-of-payload sentinel, then await the remote's reply. A source that
    /// runs short ends the payload early and the reply surfaces the failure.
    pub(crate) async fn stream_out(
        &mut self,
        src: &mut (dyn AsyncRead + Unpin + Send),
        declared_len: u64,
    ) -> Result<()> {
        let mut buf = vec![0u8; SEND_BUFFER_SIZE];
        let mut remaining = declared_len;
        while remaining > 0 {
            let want = buf.len().min(remaining as usize);
            let n = src.read(&mut buf[..want]).await?;
            if n == 0 {
                break;
            }
            self.remote.send(&buf[..n]).await?;
            remaining -= n as u64;
        }
        self.remote.send(&[STATUS_OK]).await?;
        self.read_reply().await
    }
}
