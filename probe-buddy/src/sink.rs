use anyhow::{anyhow, bail, Context, Result};
use log::warn;
use probe_models::probe_response::{StreamEvent, TaggedEvent};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{OwnedPermit, Sender};

/// Receives the events of one probe run: progress events in parse order, then exactly one
/// terminal event. Errors are logged by the caller and otherwise ignored, the probe keeps going.
pub trait EventSink: Send {
    fn deliver(&mut self, event: StreamEvent) -> Result<()>;
}

impl<F> EventSink for F
where
    F: FnMut(StreamEvent) -> Result<()> + Send,
{
    fn deliver(&mut self, event: StreamEvent) -> Result<()> {
        self(event)
    }
}

/// For callers that only want the final result.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl EventSink for Discard {
    fn deliver(&mut self, _event: StreamEvent) -> Result<()> {
        Ok(())
    }
}

/// Forwards events into a bounded channel without ever waiting on it.
///
/// Progress events that don't fit are dropped. A slot for the terminal event is reserved up
/// front, so the consumer always learns how the probe ended.
#[derive(Debug)]
pub struct ChannelSink {
    id: Option<String>,
    tx: Sender<TaggedEvent>,
    terminal: Option<OwnedPermit<TaggedEvent>>,
}

impl ChannelSink {
    /// Waits until there is room for the terminal event.
    pub async fn reserve(id: Option<String>, tx: Sender<TaggedEvent>) -> Result<Self> {
        let terminal = tx
            .clone()
            .reserve_owned()
            .await
            .context("event channel closed before the probe started")?;
        Ok(Self {
            id,
            tx,
            terminal: Some(terminal),
        })
    }

    fn tag(&self, event: StreamEvent) -> TaggedEvent {
        TaggedEvent {
            id: self.id.clone(),
            event,
        }
    }
}

impl EventSink for ChannelSink {
    fn deliver(&mut self, event: StreamEvent) -> Result<()> {
        let tagged = self.tag(event);
        if tagged.event.is_terminal() {
            let Some(permit) = self.terminal.take() else {
                bail!("terminal event for {:?} was already delivered", self.id);
            };
            permit.send(tagged);
            return Ok(());
        }
        match self.tx.try_send(tagged) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(dropped)) => {
                warn!(
                    "Event channel full, dropping {} event for {:?}",
                    event_type(&dropped.event),
                    dropped.id
                );
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(anyhow!("event receiver is gone")),
        }
    }
}

fn event_type(event: &StreamEvent) -> &'static str {
    match event {
        StreamEvent::Sample { .. } => "sample",
        StreamEvent::Hop { .. } => "hop",
        StreamEvent::Completed { .. } => "completed",
        StreamEvent::Error { .. } => "error",
    }
}
