//! SSH client facade: connection, command execution and the SCP entry
//! points. One session channel is consumed per transfer.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey};
use russh::{Channel, ChannelMsg};
use tracing::*;

use crate::config::{AuthMethod, Config, HostKeyPolicy};
use crate::error::{Error, Result};
use crate::logging;
use crate::scp::{RemoteSession, ScpSession};

/// An authenticated SSH connection.
///
/// Transfers and commands each open a fresh session channel on it; the
/// connection itself is reused across sequential calls.
pub struct Client {
    handle: Handle<ClientHandler>,
    timeout: Duration,
}

struct ClientHandler {
    host_key: HostKeyPolicy,
}

impl client::Handler for ClientHandler {
    type Error = Error;

    async fn check_server_key(&mut self, server_key: &PublicKey) -> Result<bool> {
        match &self.host_key {
            HostKeyPolicy::Fixed(expected) => Ok(expected == server_key),
            HostKeyPolicy::AcceptAny => Ok(true),
        }
    }
}

impl Client {
    /// Dial the configured host and authenticate.
    pub async fn connect(config: Config) -> Result<Self> {
        logging::init_from_env();

        let ssh_config = Arc::new(client::Config::default());
        let handler = ClientHandler {
            host_key: config.host_key.clone(),
        };

        info!(host = %config.host, port = config.port, user = %config.user, "connecting");
        let mut handle =
            client::connect(ssh_config, (config.host.as_str(), config.port), handler).await?;

        let authenticated = match &config.auth {
            AuthMethod::Password(password) => {
                handle
                    .authenticate_password(config.user.clone(), password.clone())
                    .await?
            }
            AuthMethod::Key(key) => {
                let hash = handle.best_supported_rsa_hash().await?.flatten();
                handle
                    .authenticate_publickey(
                        config.user.clone(),
                        PrivateKeyWithHashAlg::new(key.clone(), hash),
                    )
                    .await?
            }
            AuthMethod::Certificate { key, cert } => {
                handle
                    .authenticate_openssh_cert(config.user.clone(), key.clone(), cert.clone())
                    .await?
            }
        };
        if !authenticated.success() {
            return Err(Error::Transport(russh::Error::NotAuthenticated));
        }

        info!(host = %config.host, "connected");
        Ok(Self {
            handle,
            timeout: config.timeout,
        })
    }

    /// Run a shell command on the remote host and return its combined
    /// stdout and stderr. A non-zero exit status is an error.
    pub async fn exec_command(&self, command: &str) -> Result<Bytes> {
        logging::init_from_env();

        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut output = Vec::new();
        let mut status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => output.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, .. } => output.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status } => status = Some(exit_status),
                _ => {}
            }
        }

        match status {
            Some(0) | None => Ok(Bytes::from(output)),
            Some(status) => Err(Error::RemoteExit(status)),
        }
    }

    /// Create a file on the remote host from a byte buffer.
    pub async fn scp_bytes(
        &self,
        content: &[u8],
        remote_path: &str,
        mode: Option<u32>,
    ) -> Result<()> {
        logging::init_from_env();
        self.scp_session().await?.send_bytes(content, remote_path, mode).await
    }

    /// Upload a local file.
    pub async fn scp_file(
        &self,
        local_path: impl AsRef<Path>,
        remote_path: &str,
        mode: Option<u32>,
    ) -> Result<()> {
        logging::init_from_env();
        self.scp_session().await?.send_file(local_path, remote_path, mode).await
    }

    /// Upload a directory tree. The mode applies to the top directory only;
    /// nested entries keep their local permission bits.
    pub async fn scp_dir(
        &self,
        local_dir: impl AsRef<Path>,
        remote_dir: &str,
        mode: Option<u32>,
    ) -> Result<()> {
        logging::init_from_env();
        self.scp_session().await?.send_dir(local_dir, remote_dir, mode).await
    }

    /// Download a remote file.
    pub async fn scp_get_file(
        &self,
        remote_path: &str,
        local_path: impl AsRef<Path>,
    ) -> Result<()> {
        logging::init_from_env();
        self.scp_session().await?.get_file(remote_path, local_path).await
    }

    /// Download a remote directory tree.
    pub async fn scp_get_dir(
        &self,
        remote_dir: &str,
        local_dir: impl AsRef<Path>,
    ) -> Result<()> {
        logging::init_from_env();
        self.scp_session().await?.get_dir(remote_dir, local_dir).await
    }

    /// Close the connection.
    pub async fn disconnect(&self) -> Result<()> {
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await?;
        Ok(())
    }

    async fn scp_session(&self) -> Result<ScpSession<SshSession>> {
        let channel = self.handle.channel_open_session().await?;
        Ok(ScpSession::new(SshSession::new(channel)).with_timeout(self.timeout))
    }
}

/// A [`RemoteSession`] over one russh exec channel. Dropping it closes the
/// channel.
struct SshSession {
    channel: Channel<Msg>,
    exit_status: Option<u32>,
}

impl SshSession {
    fn new(channel: Channel<Msg>) -> Self {
        Self {
            channel,
            exit_status: None,
        }
    }
}

impl RemoteSession for SshSession {
    async fn start(&mut self, command: &str) -> Result<()> {
        self.channel.exec(false, command).await?;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.channel.data(data).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    return Ok(Some(Bytes::copy_from_slice(&data)))
                }
                Some(ChannelMsg::ExtendedData { data, .. }) => {
                    debug!("remote stderr: {}", String::from_utf8_lossy(&data).trim_end());
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    self.exit_status = Some(exit_status);
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => return Ok(None),
                Some(_) => {}
            }
        }
    }

    async fn close_stdin(&mut self) -> Result<()> {
        self.channel.eof().await?;
        Ok(())
    }

    async fn wait(&mut self) -> Result<Option<u32>> {
        while self.exit_status.is_none() {
            match self.channel.wait().await {
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    self.exit_status = Some(exit_status);
                }
                Some(_) => {}
                None => break,
            }
        }
        Ok(self.exit_status)
    }
}
