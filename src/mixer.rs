//! # Mixer Node
//!
//! A [`Mixer`] is one log-mixing node: it owns its filters, its bindings,
//! its output channels and the reader tasks of its inputs.
//!
//! ## Ingestion
//!
//! [`Mixer::log`] is the entry point. It merges the given partial records
//! (later keys win), stamps `__time` with the wall clock when it is absent
//! or not a number, and runs the result through every filter in
//! registration order; each record a filter emits is dispatched to the
//! bindings registered under that filter's name.
//!
//! [`Mixer::ingest_line`] is the same path for a line of wire text arriving
//! from a named input. The input's own bindings fire first, with the raw
//! decoded record, before windowing.
//!
//! ## Concurrency
//!
//! Each input gets one tokio task waiting on its next line. All ingestion,
//! from every input and every direct caller, goes through one async lock
//! around the filters and bindings. The lock is held across the channel
//! writes a record causes, so its windowing, dispatch and writes happen
//! atomically with respect to other records. Records from one input keep
//! their order; records from different inputs interleave in whatever order
//! their reads complete.
//!
//! Actions run while that lock is held. An action that leads back into the
//! same node (directly or through a chain of nodes) deadlocks.

use crate::channel::{Channels, Target};
use crate::codec::decode;
use crate::config::{InputConfig, MixerConfig};
use crate::dispatch::{Action, Condition, Router};
use crate::error::{MixerError, MixerResult};
use crate::record::{Record, TIME_KEY};
use crate::time::now_seconds;
use crate::window::Filter;
use futures::future::{BoxFuture, FutureExt, join_all};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing::{error, info, trace, warn};

/// Where an input reads lines from.
pub enum Source {
  /// Process standard input.
  Stdin,
  /// A file, read from the start.
  File(PathBuf),
  /// The stdout of a subprocess spawned from `argv`.
  Command(Vec<String>),
  /// Any async byte stream.
  Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl fmt::Debug for Source {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Source::Stdin => f.write_str("Stdin"),
      Source::File(path) => f.debug_tuple("File").field(path).finish(),
      Source::Command(argv) => f.debug_tuple("Command").field(argv).finish(),
      Source::Reader(_) => f.write_str("Reader(..)"),
    }
  }
}

#[derive(Default)]
struct Engine {
  filters: Vec<Filter>,
  emitted: Router,
  inbound: Router,
}

impl Engine {
  async fn run(&mut self, record: &Record) -> MixerResult<()> {
    for filter in self.filters.iter_mut() {
      if let Some(closed) = filter.ingest(record)? {
        self.emitted
          .dispatch(filter.name(), &closed, filter.buffer())
          .await?;
      }
    }
    Ok(())
  }
}

struct Reader {
  id: String,
  abort: AbortHandle,
  // Taken by whoever waits for the reader first.
  task: Option<JoinHandle<()>>,
  child: Option<Child>,
}

struct Inner {
  name: String,
  engine: Mutex<Engine>,
  channels: Channels,
  readers: StdMutex<Vec<Reader>>,
}

/// Handle to a log-mixing node. Clones refer to the same node.
#[derive(Clone)]
pub struct Mixer {
  inner: Arc<Inner>,
}

impl Mixer {
  /// Creates a node with no filters, bindings, channels or inputs.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      inner: Arc::new(Inner {
        name: name.into(),
        engine: Mutex::new(Engine::default()),
        channels: Channels::new(),
        readers: StdMutex::new(Vec::new()),
      }),
    }
  }

  /// Creates a node named after `config` and opens the outputs it declares.
  ///
  /// Inputs are not started: register filters and bindings first, then call
  /// [`start_inputs`](Self::start_inputs), so no early line is ingested by
  /// a half-configured node.
  pub async fn from_config(config: &MixerConfig) -> MixerResult<Self> {
    let mixer = Mixer::new(config.name.clone());
    for output in &config.outputs {
      mixer
        .output(output.id.clone(), output.target.clone().into())
        .await?;
    }
    Ok(mixer)
  }

  /// Starts a reader for each configured input, in order.
  pub async fn start_inputs(&self, inputs: &[InputConfig]) -> MixerResult<()> {
    for input in inputs {
      self.input(input.id.clone(), input.source.clone().into()).await?;
    }
    Ok(())
  }

  /// The node name.
  pub fn name(&self) -> &str {
    &self.inner.name
  }

  /// The node's output channels.
  pub fn channels(&self) -> &Channels {
    &self.inner.channels
  }

  /// Registers `filter`, replacing any filter with the same name.
  pub async fn filter(&self, filter: Filter) {
    let mut engine = self.inner.engine.lock().await;
    match engine.filters.iter_mut().find(|f| f.name() == filter.name()) {
      Some(existing) => {
        warn!(node = %self.name(), filter = %filter.name(), "replacing filter");
        *existing = filter;
      }
      None => engine.filters.push(filter),
    }
  }

  /// Binds `action` to the records emitted by the named filters.
  pub async fn bind<I, S>(&self, filters: I, condition: Condition, action: Action)
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self
      .inner
      .engine
      .lock()
      .await
      .emitted
      .bind(filters, condition, action);
  }

  /// Binds `action` to every raw record arriving on the named inputs,
  /// before windowing. The buffer passed to buffered callbacks is empty.
  pub async fn bind_input<I, S>(&self, inputs: I, condition: Condition, action: Action)
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self
      .inner
      .engine
      .lock()
      .await
      .inbound
      .bind(inputs, condition, action);
  }

  /// Opens an output channel.
  pub async fn output(&self, id: impl Into<String>, target: Target) -> MixerResult<()> {
    self.inner.channels.open(id, target).await
  }

  /// Writes one line to output channel `id`.
  pub async fn write(&self, id: &str, line: &str) -> MixerResult<()> {
    self.inner.channels.write(id, line).await
  }

  /// Ingests the merge of `parts`.
  pub async fn log<I>(&self, parts: I) -> MixerResult<()>
  where
    I: IntoIterator<Item = Record>,
  {
    let mut record = Record::new();
    for part in parts {
      record.merge(part);
    }
    stamp(&mut record);
    trace!(node = %self.name(), fields = record.len(), "ingesting record");
    self.process(None, record).await
  }

  /// Ingests one line of wire text that arrived on input `input`.
  pub async fn ingest_line(&self, input: &str, line: &str) -> MixerResult<()> {
    let mut record = decode(line);
    stamp(&mut record);
    trace!(node = %self.name(), input, fields = record.len(), "ingesting line");
    self.process(Some(input), record).await
  }

  // Boxed: dispatch can await another node's ingestion, which recurses
  // through here.
  fn process<'a>(
    &'a self,
    input: Option<&'a str>,
    record: Record,
  ) -> BoxFuture<'a, MixerResult<()>> {
    async move {
      let mut engine = self.inner.engine.lock().await;
      if let Some(input) = input {
        engine.inbound.dispatch(input, &record, &[]).await?;
      }
      engine.run(&record).await
    }
    .boxed()
  }

  /// Snapshot of a filter's buffer.
  pub async fn buffer(&self, filter: &str) -> Option<Vec<Record>> {
    self
      .inner
      .engine
      .lock()
      .await
      .filters
      .iter()
      .find(|f| f.name() == filter)
      .map(|f| f.buffer().to_vec())
  }

  /// Names of the registered filters, in registration order.
  pub async fn filter_names(&self) -> Vec<String> {
    self
      .inner
      .engine
      .lock()
      .await
      .filters
      .iter()
      .map(|f| f.name().to_string())
      .collect()
  }

  /// Starts a reader task feeding `source` into this node under input `id`.
  ///
  /// Each non-blank line is decoded and ingested. An ingestion error stops
  /// this reader only; the node and its other inputs keep running.
  pub async fn input(&self, id: impl Into<String>, source: Source) -> MixerResult<()> {
    let id = id.into();
    if self.readers()?.iter().any(|r| r.id == id) {
      return Err(MixerError::DuplicateChannel(id));
    }
    let open_err = |source: std::io::Error| MixerError::Open {
      id: id.clone(),
      source,
    };

    let (reader, child): (Box<dyn AsyncRead + Send + Unpin>, Option<Child>) = match source {
      Source::Stdin => (Box::new(tokio::io::stdin()), None),
      Source::File(path) => {
        let file = tokio::fs::File::open(&path).await.map_err(open_err)?;
        (Box::new(file), None)
      }
      Source::Command(argv) => {
        let (program, args) = argv.split_first().ok_or_else(|| {
          open_err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "empty command",
          ))
        })?;
        let mut child = Command::new(program)
          .args(args)
          .stdout(Stdio::piped())
          .kill_on_drop(true)
          .spawn()
          .map_err(open_err)?;
        let stdout = child.stdout.take().ok_or_else(|| {
          open_err(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "no stdout",
          ))
        })?;
        (Box::new(stdout), Some(child))
      }
      Source::Reader(reader) => (reader, None),
    };

    info!(node = %self.name(), input = %id, "starting reader");
    let node = self.clone();
    let task_id = id.clone();
    let task = tokio::spawn(async move { node.read_lines(task_id, reader).await });
    self.readers()?.push(Reader {
      id,
      abort: task.abort_handle(),
      task: Some(task),
      child,
    });
    Ok(())
  }

  /// Returns once every reader has reached end of stream or stopped on an
  /// error. Readers are not aborted.
  pub async fn drain_inputs(&self) -> MixerResult<()> {
    let tasks: Vec<JoinHandle<()>> = self
      .readers()?
      .iter_mut()
      .filter_map(|r| r.task.take())
      .collect();
    for result in join_all(tasks).await {
      if let Err(e) = result
        && !e.is_cancelled()
      {
        warn!(node = %self.name(), error = %e, "reader task failed");
      }
    }
    Ok(())
  }

  /// Stops every reader, kills input subprocesses, then closes all output
  /// channels.
  pub async fn close(&self) -> MixerResult<()> {
    let readers = std::mem::take(&mut *self.readers()?);
    let mut tasks = Vec::new();
    let mut children = Vec::new();
    for reader in readers {
      reader.abort.abort();
      tasks.extend(reader.task);
      children.extend(reader.child);
    }
    for result in join_all(tasks).await {
      if let Err(e) = result
        && !e.is_cancelled()
      {
        warn!(node = %self.name(), error = %e, "reader task failed");
      }
    }
    for mut child in children {
      if let Err(e) = child.kill().await {
        warn!(node = %self.name(), error = %e, "failed to kill input process");
      }
    }
    info!(node = %self.name(), "closing channels");
    self.inner.channels.close().await
  }

  async fn read_lines(self, id: String, reader: Box<dyn AsyncRead + Send + Unpin>) {
    let mut lines = LinesStream::new(BufReader::new(reader).lines());
    while let Some(line) = lines.next().await {
      let line = match line {
        Ok(line) => line,
        Err(e) => {
          error!(node = %self.name(), input = %id, error = %e, "read failed, stopping reader");
          return;
        }
      };
      if line.trim().is_empty() {
        continue;
      }
      if let Err(e) = self.ingest_line(&id, &line).await {
        error!(node = %self.name(), input = %id, error = %e, "ingestion failed, stopping reader");
        return;
      }
    }
    info!(node = %self.name(), input = %id, "input reached end of stream");
  }

  fn readers(&self) -> MixerResult<MutexGuard<'_, Vec<Reader>>> {
    self.inner.readers.lock().map_err(|_| MixerError::Poisoned)
  }
}

impl fmt::Debug for Mixer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Mixer")
      .field("name", &self.inner.name)
      .field("channels", &self.inner.channels)
      .finish_non_exhaustive()
  }
}

// A `__time` that is not a number counts as absent; it keeps its position.
fn stamp(record: &mut Record) {
  if record.time().is_none() {
    record.insert(TIME_KEY, now_seconds());
  }
}
