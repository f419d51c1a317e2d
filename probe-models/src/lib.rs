use serde::{Deserialize, Serialize};
use strum::Display;

pub mod ping;
pub mod probe_request;
pub mod probe_response;
pub mod trace;

/// The kinds of probe the engine knows how to run. The string form doubles as the operation
/// part of cache fingerprints and as the `kind` of incoming request messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProbeKind {
    Ping,
    Traceroute,
}
