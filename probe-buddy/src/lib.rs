//! Runs the system's ping and traceroute binaries and turns their output into structured,
//! optionally streamed, results.

/// Folds parsed lines into final results.
pub mod assemble;
/// Short-lived memory of finished results.
pub mod cache;
pub mod engine;
pub mod error;
/// Reassembles lines from process output chunks.
pub mod lines;
pub mod parse;
/// Spawning the probe binaries, per platform.
pub mod probe_call;
pub mod sanitize;
pub mod sink;
/// Line-delimited JSON front end on stdin/stdout.
pub mod stdio;

#[cfg(test)]
mod test_utils;

pub use engine::{Engine, Probed};
pub use error::ProbeError;
