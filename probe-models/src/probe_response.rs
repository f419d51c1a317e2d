use serde::{Deserialize, Serialize};

use crate::ping::{PingResult, PingSample};
use crate::trace::{HopRecord, TracerouteResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProbeResult {
    Ping(PingResult),
    Traceroute(TracerouteResult),
}

impl From<PingResult> for ProbeResult {
    fn from(value: PingResult) -> Self {
        Self::Ping(value)
    }
}

impl From<TracerouteResult> for ProbeResult {
    fn from(value: TracerouteResult) -> Self {
        Self::Traceroute(value)
    }
}

/// A final result plus how it was obtained. Serialises as the result's own fields with
/// `cached` (and `warning`, if any) added next to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion<T> {
    #[serde(flatten)]
    pub result: T,
    pub cached: bool,
    /// Set if the result is partial, e.g. because the process timed out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Everything a streaming consumer gets to see about one probe: any number of progress
/// events, followed by exactly one terminal event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Sample { data: PingSample },
    Hop { data: HopRecord },
    Completed { data: Completion<ProbeResult> },
    Error { message: String },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Completed { .. } | StreamEvent::Error { .. })
    }
}

/// A [StreamEvent] addressed to the request it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct TaggedEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub event: StreamEvent,
}
