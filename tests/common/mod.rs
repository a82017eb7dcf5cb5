//! In-memory stand-in for the remote `scp` process.
//!
//! `sink` lands uploads in a local directory the way `scp -t`/`-rt` would;
//! `source` serves downloads from one like `scp -f`/`-rf`. Both run as a
//! spawned task talking to the session under test through mpsc pipes.

use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use sshcp::{RemoteSession, Result};
use tokio::sync::{mpsc, oneshot};

pub struct FakeRemote {
    command: Arc<Mutex<Option<String>>>,
    stdin_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    stdout_rx: mpsc::UnboundedReceiver<Bytes>,
    exit_rx: Option<oneshot::Receiver<u32>>,
    exit_status: Option<u32>,
}

impl FakeRemote {
    /// Shared cell that receives the `scp` command line passed to `start`.
    #[allow(dead_code)]
    pub fn command_probe(&self) -> Arc<Mutex<Option<String>>> {
        self.command.clone()
    }
}

impl RemoteSession for FakeRemote {
    async fn start(&mut self, command: &str) -> Result<()> {
        *self.command.lock().unwrap() = Some(command.to_string());
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if let Some(tx) = &self.stdin_tx {
            let _ = tx.send(data.to_vec());
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Bytes>> {
        Ok(self.stdout_rx.recv().await)
    }

    async fn close_stdin(&mut self) -> Result<()> {
        self.stdin_tx = None;
        Ok(())
    }

    async fn wait(&mut self) -> Result<Option<u32>> {
        if self.exit_status.is_none() {
            if let Some(rx) = self.exit_rx.take() {
                self.exit_status = rx.await.ok();
            }
        }
        Ok(self.exit_status)
    }
}

/// The remote task's end of the pipes, with a buffered line/byte reader.
pub struct Pipes {
    stdin_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    stdout_tx: mpsc::UnboundedSender<Bytes>,
    buffer: Vec<u8>,
}

impl Pipes {
    fn send(&mut self, data: &[u8]) {
        let _ = self.stdout_tx.send(Bytes::copy_from_slice(data));
    }

    fn send_ok(&mut self) {
        self.send(&[0]);
    }

    async fn read_line(&mut self) -> Option<String> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=pos).collect();
                return Some(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
            }
            match self.stdin_rx.recv().await {
                Some(chunk) => self.buffer.extend_from_slice(&chunk),
                None => return None,
            }
        }
    }

    async fn read_exact(&mut self, len: usize) -> Option<Vec<u8>> {
        while self.buffer.len() < len {
            match self.stdin_rx.recv().await {
                Some(chunk) => self.buffer.extend_from_slice(&chunk),
                None => return None,
            }
        }
        Some(self.buffer.drain(..len).collect())
    }

    async fn read_byte(&mut self) -> Option<u8> {
        self.read_exact(1).await.map(|bytes| bytes[0])
    }
}

fn spawn_remote<F, Fut>(behaviour: F) -> FakeRemote
where
    F: FnOnce(Pipes) -> Fut,
    Fut: Future<Output = u32> + Send + 'static,
{
    let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
    let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
    let (exit_tx, exit_rx) = oneshot::channel();

    let task = behaviour(Pipes {
        stdin_rx,
        stdout_tx,
        buffer: Vec::new(),
    });
    tokio::spawn(async move {
        let status = task.await;
        let _ = exit_tx.send(status);
    });

    FakeRemote {
        command: Arc::new(Mutex::new(None)),
        stdin_tx: Some(stdin_tx),
        stdout_rx,
        exit_rx: Some(exit_rx),
        exit_status: None,
    }
}

/// `scp -t`/`-rt` receiving into `target`.
pub fn sink(target: PathBuf) -> FakeRemote {
    spawn_remote(move |pipes| run_sink(pipes, target))
}

/// A sink that completes normally but reports the given exit status.
#[allow(dead_code)]
pub fn sink_with_exit(target: PathBuf, status: u32) -> FakeRemote {
    spawn_remote(move |pipes| async move {
        let _ = run_sink(pipes, target).await;
        status
    })
}

/// `scp -f`/`-rf` serving `path`.
pub fn source(path: PathBuf) -> FakeRemote {
    spawn_remote(move |pipes| run_source(pipes, path))
}

/// A remote that consumes input and never answers.
#[allow(dead_code)]
pub fn silent() -> FakeRemote {
    spawn_remote(|mut pipes| async move {
        while pipes.stdin_rx.recv().await.is_some() {}
        1
    })
}

fn parse_header(line: &str) -> (u32, usize, String) {
    let fields: Vec<&str> = line[1..].split(' ').collect();
    assert_eq!(fields.len(), 3, "malformed header: {line:?}");
    let mode = u32::from_str_radix(fields[0], 8).unwrap();
    let size = fields[1].parse().unwrap();
    (mode, size, fields[2].to_string())
}

async fn run_sink(mut pipes: Pipes, target: PathBuf) -> u32 {
    let parent_missing = target
        .parent()
        .map(|parent| !parent.as_os_str().is_empty() && !parent.is_dir())
        .unwrap_or(false);
    if parent_missing {
        // Ready byte and diagnostic collapsed into one chunk, the way a
        // real sink surfaces a bad target.
        let mut reply = vec![0u8, 1];
        reply.extend_from_slice(
            format!("scp: {}: No such file or directory\n", target.display()).as_bytes(),
        );
        pipes.send(&reply);
        while pipes.stdin_rx.recv().await.is_some() {}
        return 1;
    }

    pipes.send_ok();

    let mut cursor = target.clone();
    let mut depth = 0usize;
    loop {
        let Some(line) = pipes.read_line().await else {
            return 0;
        };
        match line.as_bytes().first() {
            Some(b'C') => {
                let (mode, size, name) = parse_header(&line);
                let dest = if depth > 0 || cursor.is_dir() {
                    cursor.join(&name)
                } else {
                    cursor.clone()
                };
                pipes.send_ok();
                let Some(data) = pipes.read_exact(size).await else {
                    return 1;
                };
                std::fs::write(&dest, &data).unwrap();
                std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(mode)).unwrap();
                let _ = pipes.read_byte().await; // payload sentinel
                pipes.send_ok();
            }
            Some(b'D') => {
                let (mode, _, name) = parse_header(&line);
                cursor.push(&name);
                depth += 1;
                if !cursor.exists() {
                    std::fs::create_dir(&cursor).unwrap();
                }
                std::fs::set_permissions(&cursor, std::fs::Permissions::from_mode(mode)).unwrap();
                pipes.send_ok();
            }
            Some(b'E') => {
                cursor.pop();
                depth = depth.saturating_sub(1);
                pipes.send_ok();
            }
            _ => return 1,
        }
    }
}

async fn run_source(mut pipes: Pipes, path: PathBuf) -> u32 {
    if pipes.read_byte().await != Some(0) {
        return 1;
    }
    if !path.exists() {
        let mut reply = vec![1u8];
        reply.extend_from_slice(
            format!("scp: {}: No such file or directory\n", path.display()).as_bytes(),
        );
        pipes.send(&reply);
        return 1;
    }

    let ok = if path.is_dir() {
        send_tree(&mut pipes, &path).await
    } else {
        send_one(&mut pipes, &path).await
    };
    if ok {
        0
    } else {
        1
    }
}

async fn send_one(pipes: &mut Pipes, path: &Path) -> bool {
    let meta = std::fs::metadata(path).unwrap();
    let mode = meta.permissions().mode() & 0o777;
    let name = path.file_name().unwrap().to_string_lossy();
    let data = std::fs::read(path).unwrap();

    pipes.send(format!("C{mode:04o} {} {name}\n", data.len()).as_bytes());
    if pipes.read_byte().await != Some(0) {
        return false;
    }

    // Two chunks, to exercise payload boundaries on the receiving side.
    let mid = data.len() / 2;
    if mid > 0 {
        pipes.send(&data[..mid]);
    }
    if !data[mid..].is_empty() {
        pipes.send(&data[mid..]);
    }
    pipes.send(&[0]);

    matches!(pipes.read_byte().await, Some(0) | None)
}

fn send_tree<'a>(
    pipes: &'a mut Pipes,
    path: &'a Path,
) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
    Box::pin(async move {
        let meta = std::fs::metadata(path).unwrap();
        let mode = meta.permissions().mode() & 0o777;
        let name = path.file_name().unwrap().to_string_lossy();

        pipes.send(format!("D{mode:04o} 0 {name}\n").as_bytes());
        if pipes.read_byte().await != Some(0) {
            return false;
        }

        let mut entries: Vec<_> = std::fs::read_dir(path)
            .unwrap()
            .map(|entry| entry.unwrap())
            .collect();
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let file_type = entry.file_type().unwrap();
            if file_type.is_dir() {
                if !send_tree(pipes, &entry.path()).await {
                    return false;
                }
            } else if file_type.is_file() && !send_one(pipes, &entry.path()).await {
                return false;
            }
        }

        pipes.send(b"E\n");
        matches!(pipes.read_byte().await, Some(0) | None)
    })
}
