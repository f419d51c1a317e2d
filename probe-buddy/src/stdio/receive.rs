use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, trace, warn};
use netdiag::log_by_permanence;
use probe_models::probe_request::ProbeRequestMessage;
use probe_models::probe_response::{StreamEvent, TaggedEvent};
use probe_models::ProbeKind;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::select;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinSet;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::engine::Engine;
use crate::sink::{ChannelSink, EventSink};

pub async fn run<R>(
    input: R,
    engine: Arc<Engine>,
    event_tx: Sender<TaggedEvent>,
    stop_rx: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = LinesStream::new(BufReader::new(input).lines());
    let mut in_flight = JoinSet::new();
    let res = loop {
        select! {
            biased; // Stop should take prio
            _ = stop_rx.cancelled() => {
                trace!("Cancellation signal received by request receiver.");
                break Ok(());
            }
            line = lines.next() => match line {
                Some(Ok(line)) => {
                    if let Some(msg) = parse_request(&line, &event_tx).await {
                        in_flight.spawn(serve(Arc::clone(&engine), msg, event_tx.clone()));
                    }
                }
                Some(Err(e)) => break Err(e).context("while reading requests"),
                None => {
                    debug!("Input closed, no more requests");
                    break Ok(());
                }
            }
        }
    };

    if !in_flight.is_empty() {
        info!("Waiting for {} requests in flight", in_flight.len());
    }
    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            warn!("Request task did not complete: {}", e);
        }
    }
    res
}

/// Blank lines are skipped, anything else that isn't a request is answered with an error event.
async fn parse_request(line: &str, event_tx: &Sender<TaggedEvent>) -> Option<ProbeRequestMessage> {
    if line.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!("Unable to parse request `{}`: {}", line, e);
            let event = TaggedEvent {
                id: None,
                event: StreamEvent::Error {
                    message: format!("invalid request: {}", e),
                },
            };
            if event_tx.send(event).await.is_err() {
                warn!("Event writer is gone, not reporting the invalid request");
            }
            None
        }
    }
}

async fn serve(engine: Arc<Engine>, msg: ProbeRequestMessage, event_tx: Sender<TaggedEvent>) {
    debug!("Serving {:?}", msg);
    let mut channel = match ChannelSink::reserve(msg.id.clone(), event_tx).await {
        Ok(channel) => channel,
        Err(e) => {
            warn!("Dropping request {:?}: {:#}", msg.id, e);
            return;
        }
    };
    let stream = msg.stream;
    let mut sink = move |event: StreamEvent| -> Result<()> {
        if stream || event.is_terminal() {
            channel.deliver(event)
        } else {
            Ok(())
        }
    };

    let bound = msg.bound();
    let res = match msg.kind {
        ProbeKind::Ping => engine
            .probe_ping_streaming(&msg.host, bound, &mut sink)
            .await
            .map(|_| ()),
        ProbeKind::Traceroute => engine
            .probe_traceroute_streaming(&msg.host, bound, &mut sink)
            .await
            .map(|_| ()),
    };
    if let Err(e) = res {
        log_by_permanence!(&e, "{} request {:?} for {} failed: {}", msg.kind, msg.id, msg.host, e);
    }
}
