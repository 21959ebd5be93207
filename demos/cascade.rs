//! Two edge nodes count `exec` events per second and cascade their closed
//! windows into a collector, which prints the merged counts to stdout.
//!
//! ```text
//! cargo run --example cascade
//! ```

use logmixer::channel::Target;
use logmixer::dispatch::{Action, Condition};
use logmixer::matcher::Pattern;
use logmixer::window::Filter;
use logmixer::{Mixer, MixerResult, record, reducers};
use std::time::Duration;

async fn edge(name: &str, collector: &Mixer) -> MixerResult<Mixer> {
  let node = Mixer::new(name);
  node
    .filter(Filter::tumbling(
      "execs",
      Duration::from_secs(1),
      reducers::count(Pattern::new().eq("exec", true)),
    ))
    .await;
  node
    .output("up", Target::Node(collector.clone()))
    .await?;
  node
    .bind(
      ["execs"],
      Condition::Always,
      Action::write_to(node.channels().clone(), "up"),
    )
    .await;
  Ok(node)
}

#[tokio::main]
async fn main() -> MixerResult<()> {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_writer(std::io::stderr)
    .init();

  let collector = Mixer::new("collector");
  collector.output("console", Target::Stdout).await?;
  collector
    .filter(Filter::tumbling(
      "execs",
      Duration::from_secs(1),
      reducers::sum("num", Pattern::new()),
    ))
    .await;
  collector
    .bind(
      ["execs"],
      Condition::Always,
      Action::write_to(collector.channels().clone(), "console"),
    )
    .await;

  let edges = [
    edge("edge-a", &collector).await?,
    edge("edge-b", &collector).await?,
  ];
  for second in 0..4 {
    for (i, node) in edges.iter().enumerate() {
      for n in 0..=i + second {
        let time = second as f64 + n as f64 / 100.0;
        node
          .log([record! { "exec" => true, "at" => "start", "__time" => time }])
          .await?;
      }
    }
  }

  for node in &edges {
    node.close().await?;
  }
  collector.close().await
}
