use anyhow::{Context, Result};
use log::{debug, trace};
use probe_models::probe_response::TaggedEvent;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::Receiver;

/// Runs until every sender is gone. Each event is flushed right away, consumers are usually
/// waiting on it.
pub async fn run<W>(mut output: W, mut event_rx: Receiver<TaggedEvent>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = event_rx.recv().await {
        let mut line = serde_json::to_vec(&event)
            .with_context(|| format!("during serialisation of {:?}", event))?;
        line.push(b'\n');
        trace!("Writing event for {:?}", event.id);
        output
            .write_all(&line)
            .await
            .with_context(|| "while writing event")?;
        output.flush().await.with_context(|| "while flushing events")?;
    }
    debug!("All event senders closed, writer stopping");
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use assertor::*;
    use probe_models::probe_response::StreamEvent;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn writes_one_json_document_per_line() -> Result<()> {
        // given
        let (tx, rx) = mpsc::channel(4);
        for id in ["a", "b"] {
            tx.send(TaggedEvent {
                id: Some(id.to_string()),
                event: StreamEvent::Error {
                    message: format!("failed {}", id),
                },
            })
            .await?;
        }
        drop(tx);
        let mut output = vec![];

        // when
        run(&mut output, rx).await?;

        // then
        let text = String::from_utf8(output)?;
        let lines: Vec<Value> = text
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_that!(lines).is_equal_to(vec![
            json!({"id": "a", "type": "error", "message": "failed a"}),
            json!({"id": "b", "type": "error", "message": "failed b"}),
        ]);
        Ok(())
    }
}
