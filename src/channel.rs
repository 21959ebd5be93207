//! # Channel Registry
//!
//! Named line sinks the node writes to: the console, files, subprocess
//! stdin, in-memory buffers and other nodes.
//!
//! Every write is one line and is flushed before [`Channels::write`]
//! returns, so by the time an ingestion call finishes, every line it caused
//! has been handed to the operating system (or to the downstream node).
//!
//! ## Cascading
//!
//! [`Target::Node`] makes another [`Mixer`] a sink: the line is decoded and
//! ingested there as if one of its inputs had delivered it. This is how
//! rereduce pipelines compose across the wire format without a network.
//! A node must not be wired, directly or through other nodes, into itself.

use crate::error::{MixerError, MixerResult};
use crate::mixer::Mixer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tracing::{info, warn};

/// How long a subprocess sink may take to exit after its stdin is closed
/// before it is killed.
pub const PROCESS_GRACE: Duration = Duration::from_millis(500);

/// How a file sink is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
  /// Keep existing content, write at the end.
  #[default]
  Append,
  /// Discard existing content.
  Truncate,
}

/// A shared in-memory line sink.
///
/// Clones share the same lines, so a test can keep one handle and give the
/// other to the registry.
#[derive(Debug, Clone, Default)]
pub struct MemoryBuffer {
  lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryBuffer {
  /// Creates an empty buffer.
  pub fn new() -> Self {
    Self::default()
  }

  /// Snapshot of the lines written so far.
  pub fn lines(&self) -> Vec<String> {
    self.guard().clone()
  }

  /// All lines, each terminated by `\n`.
  pub fn contents(&self) -> String {
    self.guard().iter().map(|l| format!("{}\n", l)).collect()
  }

  /// Number of lines written.
  pub fn len(&self) -> usize {
    self.guard().len()
  }

  /// Returns true if nothing was written.
  pub fn is_empty(&self) -> bool {
    self.guard().is_empty()
  }

  fn push(&self, line: &str) {
    self.guard().push(line.to_string());
  }

  // Pushing a String cannot panic midway, so a poisoned buffer is still
  // consistent.
  fn guard(&self) -> MutexGuard<'_, Vec<String>> {
    self.lines.lock().unwrap_or_else(|e| e.into_inner())
  }
}

/// Where an output channel writes.
pub enum Target {
  /// Process standard output. Never closed.
  Stdout,
  /// Process standard error. Never closed.
  Stderr,
  /// A file opened with `mode`.
  File {
    /// File path.
    path: PathBuf,
    /// Append or truncate.
    mode: OpenMode,
  },
  /// A subprocess spawned from `argv`; lines go to its stdin.
  Command(Vec<String>),
  /// An in-memory buffer.
  Memory(MemoryBuffer),
  /// Another node's ingestion entry point.
  Node(Mixer),
}

impl fmt::Debug for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Target::Stdout => f.write_str("Stdout"),
      Target::Stderr => f.write_str("Stderr"),
      Target::File { path, mode } => f
        .debug_struct("File")
        .field("path", path)
        .field("mode", mode)
        .finish(),
      Target::Command(argv) => f.debug_tuple("Command").field(argv).finish(),
      Target::Memory(_) => f.write_str("Memory"),
      Target::Node(node) => f.debug_tuple("Node").field(&node.name()).finish(),
    }
  }
}

enum Sink {
  Stdout,
  Stderr,
  File(File),
  Process {
    child: Child,
    stdin: Option<ChildStdin>,
  },
  Memory(MemoryBuffer),
  Node(Mixer),
}

impl Sink {
  async fn open(id: &str, target: Target) -> MixerResult<Self> {
    let open_err = |source: io::Error| MixerError::Open {
      id: id.to_string(),
      source,
    };
    Ok(match target {
      Target::Stdout => Sink::Stdout,
      Target::Stderr => Sink::Stderr,
      Target::File { path, mode } => {
        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
          OpenMode::Append => options.append(true),
          OpenMode::Truncate => options.write(true).truncate(true),
        };
        Sink::File(options.open(&path).await.map_err(open_err)?)
      }
      Target::Command(argv) => {
        let (program, args) = argv.split_first().ok_or_else(|| {
          open_err(io::Error::new(io::ErrorKind::InvalidInput, "empty command"))
        })?;
        let mut child = Command::new(program)
          .args(args)
          .stdin(Stdio::piped())
          .kill_on_drop(true)
          .spawn()
          .map_err(open_err)?;
        let stdin = child.stdin.take();
        Sink::Process { child, stdin }
      }
      Target::Memory(buffer) => Sink::Memory(buffer),
      Target::Node(node) => Sink::Node(node),
    })
  }

  async fn write_line(&mut self, line: &str) -> io::Result<()> {
    match self {
      Sink::Stdout => write_flushed(&mut tokio::io::stdout(), line).await,
      Sink::Stderr => write_flushed(&mut tokio::io::stderr(), line).await,
      Sink::File(file) => write_flushed(file, line).await,
      Sink::Process { stdin, .. } => {
        let stdin = stdin
          .as_mut()
          .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed"))?;
        write_flushed(stdin, line).await
      }
      Sink::Memory(buffer) => {
        buffer.push(line);
        Ok(())
      }
      // Node sinks are written outside the registry lock.
      Sink::Node(_) => Ok(()),
    }
  }

  async fn close(self, id: &str) -> io::Result<()> {
    match self {
      Sink::Stdout => tokio::io::stdout().flush().await,
      Sink::Stderr => tokio::io::stderr().flush().await,
      Sink::File(mut file) => file.flush().await,
      Sink::Process { mut child, stdin } => {
        // EOF first so a well-behaved consumer can drain and exit.
        drop(stdin);
        match tokio::time::timeout(PROCESS_GRACE, child.wait()).await {
          Ok(status) => status.map(|_| ()),
          Err(_) => {
            warn!(channel = %id, "process did not exit on EOF, killing it");
            child.kill().await
          }
        }
      }
      Sink::Memory(_) | Sink::Node(_) => Ok(()),
    }
  }
}

async fn write_flushed<W>(out: &mut W, line: &str) -> io::Result<()>
where
  W: AsyncWrite + Unpin,
{
  out.write_all(format!("{}\n", line).as_bytes()).await?;
  out.flush().await
}

/// Registry of open output channels, keyed by id.
///
/// Cheap to clone; clones share the same channels.
#[derive(Clone, Default)]
pub struct Channels {
  sinks: Arc<tokio::sync::Mutex<HashMap<String, Sink>>>,
}

impl Channels {
  /// Creates an empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// Opens `target` under `id`.
  pub async fn open(&self, id: impl Into<String>, target: Target) -> MixerResult<()> {
    let id = id.into();
    let mut sinks = self.sinks.lock().await;
    if sinks.contains_key(&id) {
      return Err(MixerError::DuplicateChannel(id));
    }
    info!(channel = %id, target = ?target, "opening channel");
    let sink = Sink::open(&id, target).await?;
    sinks.insert(id, sink);
    Ok(())
  }

  /// Writes one line to channel `id`.
  pub async fn write(&self, id: &str, line: &str) -> MixerResult<()> {
    let downstream = {
      let mut sinks = self.sinks.lock().await;
      let sink = sinks
        .get_mut(id)
        .ok_or_else(|| MixerError::UnknownChannel(id.to_string()))?;
      let node = match sink {
        Sink::Node(node) => Some(node.clone()),
        _ => None,
      };
      match node {
        Some(node) => node,
        None => {
          return sink.write_line(line).await.map_err(|source| MixerError::Write {
            id: id.to_string(),
            source,
          });
        }
      }
    };
    downstream
      .ingest_line(id, line)
      .await
      .map_err(|source| MixerError::Downstream {
        node: downstream.name().to_string(),
        source: Box::new(source),
      })
  }

  /// Returns true if `id` is open.
  pub async fn is_open(&self, id: &str) -> bool {
    self.sinks.lock().await.contains_key(id)
  }

  /// Ids of the open channels, sorted.
  pub async fn ids(&self) -> Vec<String> {
    let mut ids: Vec<String> = self.sinks.lock().await.keys().cloned().collect();
    ids.sort();
    ids
  }

  /// Closes every channel.
  ///
  /// Console channels are flushed but stay open. A subprocess gets EOF on
  /// its stdin and [`PROCESS_GRACE`] to exit before it is killed; either
  /// way it is reaped before this returns. Every channel is attempted; the
  /// first failure is returned after all have been processed.
  pub async fn close(&self) -> MixerResult<()> {
    let drained: Vec<(String, Sink)> = self.sinks.lock().await.drain().collect();
    let mut first_err = None;
    for (id, sink) in drained {
      match sink.close(&id).await {
        Ok(()) => info!(channel = %id, "closed channel"),
        Err(source) => {
          warn!(channel = %id, error = %source, "failed to close channel");
          first_err.get_or_insert(MixerError::Close { id, source });
        }
      }
    }
    first_err.map_or(Ok(()), Err)
  }
}

impl fmt::Debug for Channels {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut debug = f.debug_struct("Channels");
    if let Ok(sinks) = self.sinks.try_lock() {
      let mut ids: Vec<&String> = sinks.keys().collect();
      ids.sort();
      debug.field("ids", &ids);
    }
    debug.finish_non_exhaustive()
  }
}
