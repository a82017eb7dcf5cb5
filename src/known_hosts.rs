//! Host key lookup in the OpenSSH `known_hosts` file.
//!
//! Entries are matched by the hosts field: the bare hostname for the
//! standard port, the `[host]:port` form otherwise. The first matching line
//! wins; hashed entries simply never match and are skipped like any other
//! non-matching line.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use russh::keys::{parse_public_key_base64, PublicKey};
use tracing::debug;

use crate::error::{Error, Result};

fn default_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_default();
    Path::new(&home).join(".ssh").join("known_hosts")
}

/// Look up the host key for `host:port` in `$HOME/.ssh/known_hosts`.
pub(crate) fn lookup(host: &str, port: u16) -> Result<PublicKey> {
    lookup_in(&default_path(), host, port)
}

fn lookup_in(path: &Path, host: &str, port: u16) -> Result<PublicKey> {
    let file = std::fs::File::open(path)?;
    let pattern = host_pattern(host, port);

    for line in BufReader::new(file).lines() {
        let line = line?;
        let fields: Vec<&str> = line.split(' ').collect();
        if fields.len() != 3 {
            continue;
        }
        if !fields[0].contains(&pattern) {
            continue;
        }
        debug!(host, port, "matched known_hosts entry");
        return parse_public_key_base64(fields[2]).map_err(Error::Keys);
    }

    Err(Error::UnknownHostKey(format!("{host}:{port}")))
}

fn host_pattern(host: &str, port: u16) -> String {
    if port == 22 {
        host.to_string()
    } else {
        format!("[{host}]:{port}")
    }
}
