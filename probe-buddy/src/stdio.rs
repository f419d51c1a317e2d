use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use netdiag::helpers::stop::flatten;
use tokio::io;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::Engine;

/// Reads requests from stdin and runs each of them concurrently.
mod receive;
/// Writes the resulting events to stdout, one JSON document per line.
mod send;

#[derive(Args, Clone, Debug)]
#[group(id = "stdio")]
pub struct Params {
    /// How many events may queue up for stdout before progress events are dropped. Final
    /// results are never dropped.
    #[arg(long, default_value = "256", env = "EVENT_BUFFER")]
    pub event_buffer: usize,
}

/// Serves line-delimited JSON requests until stdin is closed or `stop_rx` is cancelled.
/// Requests already running are allowed to finish either way.
pub async fn run(engine: Arc<Engine>, params: Params, stop_rx: CancellationToken) -> Result<()> {
    // one slot is always held back for a terminal event
    let (event_tx, event_rx) = mpsc::channel(params.event_buffer.max(2));
    let sender = tokio::spawn(send::run(io::stdout(), event_rx));
    let received = receive::run(io::stdin(), engine, event_tx, stop_rx).await;
    let sent = flatten(sender).await;
    received.and(sent)
}
