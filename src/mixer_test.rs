//! # Mixer Test Suite
//!
//! The ingestion entry point (merge, time stamping, filter fan-in), emission
//! routing to channels, input bindings, reader tasks and teardown.

use crate::channel::{MemoryBuffer, Target};
use crate::config::{InputSource, MixerConfig, OutputTarget};
use crate::dispatch::{Action, Condition};
use crate::error::MixerError;
use crate::matcher::Pattern;
use crate::mixer::{Mixer, Source};
use crate::record;
use crate::record::{TIME_KEY, Value};
use crate::reducers;
use crate::window::Filter;
use std::fs;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

async fn passthrough_to_memory(node: &Mixer) -> MemoryBuffer {
  let sink = MemoryBuffer::new();
  node
    .output("mem", Target::Memory(sink.clone()))
    .await
    .unwrap();
  node
    .filter(Filter::unbounded("all", reducers::passthrough()))
    .await;
  node
    .bind(
      ["all"],
      Condition::Always,
      Action::write_to(node.channels().clone(), "mem"),
    )
    .await;
  sink
}

fn reader(text: &str) -> Source {
  Source::Reader(Box::new(Cursor::new(text.as_bytes().to_vec())))
}

// ============================================================================
// Ingestion entry point
// ============================================================================

#[tokio::test]
async fn test_log_merges_parts_later_wins() {
  let node = Mixer::new("n");
  let sink = passthrough_to_memory(&node).await;
  node
    .log([
      record! { "a" => 1, "b" => "x", "__time" => 1.0 },
      record! { "b" => "y", "c" => true },
    ])
    .await
    .unwrap();
  assert_eq!(sink.lines(), vec!["a=1 b=y __time=1.000 c"]);
}

#[tokio::test]
async fn test_log_stamps_missing_time() {
  let node = Mixer::new("n");
  passthrough_to_memory(&node).await;
  node.log([record! { "a" => true }]).await.unwrap();

  let buffer = node.buffer("all").await.unwrap();
  let time = buffer[0].get(TIME_KEY).and_then(Value::as_f64).unwrap();
  assert!(time > 1_577_836_800.0);
}

#[tokio::test]
async fn test_log_keeps_given_time() {
  let node = Mixer::new("n");
  passthrough_to_memory(&node).await;
  node.log([record! { "__time" => 42.5 }]).await.unwrap();
  assert_eq!(node.buffer("all").await.unwrap()[0].time(), Some(42.5));
}

#[tokio::test]
async fn test_non_numeric_time_is_restamped() {
  let node = Mixer::new("n");
  node
    .filter(Filter::tumbling(
      "all",
      Duration::from_secs(60),
      reducers::count(Pattern::new()),
    ))
    .await;

  node.ingest_line("in", "a __time=abc b").await.unwrap();

  let buffer = node.buffer("all").await.unwrap();
  assert_eq!(buffer.len(), 1);
  assert!(buffer[0].time().is_some_and(|t| t > 1_577_836_800.0));
}

#[tokio::test]
async fn test_every_filter_sees_every_record() {
  let node = Mixer::new("n");
  node
    .filter(Filter::tumbling(
      "starts",
      Duration::from_secs(60),
      reducers::count(Pattern::new().eq("at", "start")),
    ))
    .await;
  node
    .filter(Filter::tumbling(
      "finishes",
      Duration::from_secs(60),
      reducers::count(Pattern::new().eq("at", "finish")),
    ))
    .await;

  for (at, t) in [("start", 0.0), ("finish", 1.0), ("finish", 2.0)] {
    node
      .log([record! { "at" => at, "__time" => t }])
      .await
      .unwrap();
  }
  let starts = node.buffer("starts").await.unwrap();
  let finishes = node.buffer("finishes").await.unwrap();
  assert_eq!(starts[0].get("num"), Some(&Value::Int(1)));
  assert_eq!(finishes[0].get("num"), Some(&Value::Int(2)));
  assert_eq!(node.filter_names().await, vec!["starts", "finishes"]);
}

#[tokio::test]
async fn test_filter_registration_replaces_same_name() {
  let node = Mixer::new("n");
  node
    .filter(Filter::unbounded("f", reducers::passthrough()))
    .await;
  node.log([record! { "__time" => 1.0 }]).await.unwrap();
  node
    .filter(Filter::unbounded("f", reducers::passthrough()))
    .await;
  assert!(node.buffer("f").await.unwrap().is_empty());
  assert_eq!(node.buffer("missing").await, None);
}

#[tokio::test]
async fn test_only_closed_windows_reach_channels() {
  let node = Mixer::new("n");
  let sink = MemoryBuffer::new();
  node
    .output("mem", Target::Memory(sink.clone()))
    .await
    .unwrap();
  node
    .filter(Filter::tumbling(
      "execs",
      Duration::from_secs(60),
      reducers::count(Pattern::new().eq("exec", true)),
    ))
    .await;
  node
    .bind(
      ["execs"],
      Condition::Always,
      Action::write_to(node.channels().clone(), "mem"),
    )
    .await;

  for t in [0.0, 10.0, 20.0] {
    node
      .log([record! { "exec" => true, "__time" => t }])
      .await
      .unwrap();
  }
  assert!(sink.is_empty());

  node
    .log([record! { "exec" => true, "__time" => 70.0 }])
    .await
    .unwrap();
  assert_eq!(sink.lines(), vec!["__filter=execs num=3 __time=0.000 __bin=0"]);
}

#[tokio::test]
async fn test_action_failure_reaches_caller() {
  let node = Mixer::new("n");
  node
    .filter(Filter::unbounded("all", reducers::passthrough()))
    .await;
  node
    .bind(
      ["all"],
      Condition::Always,
      Action::write_to(node.channels().clone(), "never-opened"),
    )
    .await;
  let err = node.log([record! { "x" => 1 }]).await.unwrap_err();
  assert!(matches!(err, MixerError::Action { .. }));
  assert!(err.to_string().contains("never-opened"));
}

#[tokio::test]
async fn test_reducer_overflow_leaves_node_usable() {
  let node = Mixer::new("n");
  let sink = passthrough_to_memory(&node).await;
  node
    .filter(Filter::tumbling(
      "totals",
      Duration::from_secs(60),
      reducers::sum("num", Pattern::new()),
    ))
    .await;

  node
    .log([record! { "num" => i64::MAX, "__time" => 1.0 }])
    .await
    .unwrap();
  let err = node
    .log([record! { "num" => 1, "__time" => 2.0 }])
    .await
    .unwrap_err();
  assert!(matches!(err, MixerError::Reduce { ref filter, .. } if filter == "totals"));

  node
    .log([record! { "after" => true, "__time" => 3.0 }])
    .await
    .unwrap();
  assert_eq!(sink.len(), 3);
}

#[tokio::test]
async fn test_forward_to_cascades_records() {
  let collector = Mixer::new("collector");
  collector
    .filter(Filter::unbounded("all", reducers::passthrough()))
    .await;
  let edge = Mixer::new("edge");
  edge
    .filter(Filter::unbounded("all", reducers::passthrough()))
    .await;
  edge
    .bind(["all"], Condition::Always, Action::forward_to(collector.clone()))
    .await;

  edge
    .log([record! { "hop" => 1, "__time" => 3.0 }])
    .await
    .unwrap();
  let received = collector.buffer("all").await.unwrap();
  assert_eq!(received, vec![record! { "hop" => 1, "__time" => 3.0 }]);
}

// ============================================================================
// Inputs
// ============================================================================

#[tokio::test]
async fn test_ingest_line_fires_input_bindings_first() {
  let node = Mixer::new("n");
  let order = Arc::new(Mutex::new(Vec::new()));
  node
    .filter(Filter::unbounded("all", reducers::passthrough()))
    .await;

  let seen = Arc::clone(&order);
  node
    .bind_input(
      ["tcp"],
      Condition::from(Pattern::new().eq("ping", true)),
      Action::new(move |_r| {
        seen.lock().unwrap().push("input");
        Ok(())
      }),
    )
    .await;
  let seen = Arc::clone(&order);
  node
    .bind(
      ["all"],
      Condition::Always,
      Action::new(move |_r| {
        seen.lock().unwrap().push("filter");
        Ok(())
      }),
    )
    .await;

  node.ingest_line("tcp", "ping").await.unwrap();
  node.ingest_line("tcp", "pong").await.unwrap();
  node.ingest_line("udp", "ping").await.unwrap();
  assert_eq!(*order.lock().unwrap(), vec!["input", "filter", "filter", "filter"]);
}

#[tokio::test]
async fn test_reader_feeds_lines_in_order() {
  let node = Mixer::new("n");
  let sink = passthrough_to_memory(&node).await;
  node
    .input("feed", reader("a=1 __time=1.000\n\nb=2 __time=2.000\nc=3 __time=3.000\n"))
    .await
    .unwrap();
  node.drain_inputs().await.unwrap();

  assert_eq!(
    sink.lines(),
    vec!["a=1 __time=1.000", "b=2 __time=2.000", "c=3 __time=3.000"]
  );
  node.close().await.unwrap();
}

#[tokio::test]
async fn test_failing_input_stops_only_itself() {
  let node = Mixer::new("n");
  let sink = passthrough_to_memory(&node).await;
  node
    .bind(
      ["all"],
      Condition::from(Pattern::new().eq("poison", true)),
      Action::new(|_r| Err("poisoned record".into())),
    )
    .await;

  node
    .input("bad", reader("poison __time=1.000\nafter __time=2.000\n"))
    .await
    .unwrap();
  node.drain_inputs().await.unwrap();
  node
    .input("good", reader("fine __time=3.000\n"))
    .await
    .unwrap();
  node.drain_inputs().await.unwrap();

  // The poisoned record reached the memory channel before its later binding
  // failed; the bad reader then stopped before "after".
  assert_eq!(sink.lines(), vec!["poison __time=1.000", "fine __time=3.000"]);
  node
    .log([record! { "direct" => true, "__time" => 4.0 }])
    .await
    .unwrap();
  assert_eq!(sink.len(), 3);
}

#[tokio::test]
async fn test_duplicate_input_is_rejected() {
  let node = Mixer::new("n");
  node.input("in", reader("")).await.unwrap();
  let err = node.input("in", reader("")).await.unwrap_err();
  assert!(matches!(err, MixerError::DuplicateChannel(_)));
  node.close().await.unwrap();
}

#[tokio::test]
async fn test_file_input() {
  let dir = tempdir().unwrap();
  let path = dir.path().join("in.log");
  fs::write(&path, "x __time=5.000\n").unwrap();

  let node = Mixer::new("n");
  let sink = passthrough_to_memory(&node).await;
  node.input("file", Source::File(path)).await.unwrap();
  node.drain_inputs().await.unwrap();
  assert_eq!(sink.lines(), vec!["x __time=5.000"]);
}

#[tokio::test]
async fn test_missing_input_file_fails_to_open() {
  let dir = tempdir().unwrap();
  let node = Mixer::new("n");
  let err = node
    .input("file", Source::File(dir.path().join("absent.log")))
    .await
    .unwrap_err();
  assert!(matches!(err, MixerError::Open { .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_input() {
  let node = Mixer::new("n");
  let sink = passthrough_to_memory(&node).await;
  node
    .input(
      "cmd",
      Source::Command(vec![
        "printf".to_string(),
        "test __time=1.000\\n".to_string(),
      ]),
    )
    .await
    .unwrap();
  node.drain_inputs().await.unwrap();
  assert_eq!(sink.lines(), vec!["test __time=1.000"]);
  node.close().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_close_stops_endless_input() {
  let node = Mixer::new("n");
  node
    .input(
      "forever",
      Source::Command(vec!["sleep".to_string(), "30".to_string()]),
    )
    .await
    .unwrap();
  tokio::time::timeout(Duration::from_secs(5), node.close())
    .await
    .expect("close should not wait for the input to finish")
    .unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_close_stops_output_process_ignoring_eof() {
  let node = Mixer::new("n");
  node
    .output(
      "stuck",
      Target::Command(vec!["sleep".to_string(), "30".to_string()]),
    )
    .await
    .unwrap();
  tokio::time::timeout(Duration::from_secs(5), node.close())
    .await
    .expect("close should kill an output process that ignores EOF")
    .unwrap();
}

// ============================================================================
// Configuration
// ============================================================================

#[tokio::test]
async fn test_from_config_wires_channels_and_inputs() {
  let dir = tempdir().unwrap();
  let input = dir.path().join("in.log");
  let output = dir.path().join("out.log");
  fs::write(&input, "a __time=1.000\nb __time=2.000\n").unwrap();

  let config = MixerConfig::default()
    .with_name("configured")
    .with_output(
      "out",
      OutputTarget::File {
        path: output.clone(),
        mode: Default::default(),
      },
    )
    .with_input("in", InputSource::File { path: input });

  let node = Mixer::from_config(&config).await.unwrap();
  node
    .filter(Filter::unbounded("all", reducers::passthrough()))
    .await;
  node
    .bind(
      ["all"],
      Condition::Always,
      Action::write_to(node.channels().clone(), "out"),
    )
    .await;
  node.start_inputs(&config.inputs).await.unwrap();
  node.drain_inputs().await.unwrap();
  node.close().await.unwrap();

  assert_eq!(node.name(), "configured");
  assert_eq!(
    fs::read_to_string(output).unwrap(),
    "a __time=1.000\nb __time=2.000\n"
  );
}
