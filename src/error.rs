use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] russh::Error),

    #[error("key error: {0}")]
    Keys(#[from] russh::keys::Error),

    #[error("key format error: {0}")]
    KeyFormat(#[from] russh::keys::ssh_key::Error),

    #[error("transfer timed out")]
    Timeout,

    #[error("no host key found for {0}")]
    UnknownHostKey(String),

    #[error("{0}")]
    RemoteDiagnostic(String),

    #[error("unexpected reply type: {0:#04x}")]
    UnexpectedReply(u8),

    #[error("malformed control frame: {0}")]
    MalformedFrame(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("local i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{} is not a regular file", .0.display())]
    NotRegular(PathBuf),

    #[error("{} already exists but is not a directory", .0.display())]
    PathConflict(PathBuf),

    #[error("wrote {written} bytes but read {read}")]
    ShortWrite { written: usize, read: usize },

    #[error("remote process exited with status {0}")]
    RemoteExit(u32),

    #[error("session closed")]
    SessionClosed,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
