//! SSH command execution and SCP file transfer client.
//!
//! Connects to an SSH server, runs remote commands, and transfers byte
//! buffers, files and whole directory trees by driving the remote `scp`
//! helper over an exec channel with the legacy RCP wire protocol. Permission
//! bits travel with every entry.
//!
//! ```no_run
//! use sshcp::{Client, Config};
//!
//! # async fn example() -> sshcp::Result<()> {
//! let config = Config::with_password("deploy", "secret", "server.example.com", 22, false)?;
//! let client = Client::connect(config).await?;
//!
//! client.scp_bytes(b"hello", "/tmp/hello.txt", Some(0o644)).await?;
//! client.scp_get_file("/var/log/syslog", "./syslog").await?;
//! let uname = client.exec_command("uname -a").await?;
//! # let _ = uname;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod known_hosts;
mod local_fs;
mod logging;
pub mod scp;

pub use client::Client;
pub use config::Config;
pub use error::{Error, Result};
pub use scp::{RemoteSession, ScpSession, TransferKind};
