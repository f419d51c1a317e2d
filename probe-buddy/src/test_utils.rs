use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::cache;
use crate::engine::{self, Engine};
use crate::error::ProbeError;
use crate::probe_call::{ExitKind, Invocation, Platform, RunExit, Runner};

#[derive(Debug, Clone)]
enum Outcome {
    Exit { kind: ExitKind, stderr: String },
    SpawnFailure,
}

/// What a [ScriptedRunner] pretends the process did.
#[derive(Debug, Clone)]
pub struct Script {
    stdout: String,
    chunk_size: Option<usize>,
    delay_per_chunk: bool,
    outcome: Outcome,
}

impl Script {
    fn exit(stdout: &str, kind: ExitKind, stderr: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            chunk_size: None,
            delay_per_chunk: false,
            outcome: Outcome::Exit {
                kind,
                stderr: stderr.to_string(),
            },
        }
    }

    pub fn success(stdout: &str) -> Self {
        Self::exit(stdout, ExitKind::Success, "")
    }

    pub fn failure(stdout: &str, code: i32, stderr: &str) -> Self {
        Self::exit(stdout, ExitKind::Failed { code: Some(code) }, stderr)
    }

    pub fn timed_out(stdout: &str) -> Self {
        Self::exit(stdout, ExitKind::TimedOut, "")
    }

    pub fn spawn_failure() -> Self {
        Self {
            outcome: Outcome::SpawnFailure,
            ..Self::success("")
        }
    }

    /// Cuts stdout into chunks of this many bytes, regardless of line or character boundaries.
    pub fn in_chunks_of(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    pub fn with_delay_per_chunk(mut self) -> Self {
        self.delay_per_chunk = true;
        self
    }
}

/// Replays a [Script] instead of running anything, recording what it was asked to run.
#[derive(Debug, Clone)]
pub struct ScriptedRunner {
    script: Script,
    calls: Arc<Mutex<Vec<Invocation>>>,
}

impl ScriptedRunner {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: Arc::new(Mutex::new(vec![])),
        }
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls.lock().expect("not poisoned").clone()
    }
}

#[async_trait]
impl Runner for ScriptedRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        chunk_tx: UnboundedSender<Vec<u8>>,
    ) -> Result<RunExit, ProbeError> {
        self.calls.lock().expect("not poisoned").push(invocation.clone());
        let (kind, stderr) = match &self.script.outcome {
            Outcome::SpawnFailure => {
                return Err(ProbeError::SpawnFailed {
                    program: invocation.program.clone(),
                    source: io::Error::new(io::ErrorKind::NotFound, "scripted"),
                })
            }
            Outcome::Exit { kind, stderr } => (*kind, stderr.clone()),
        };
        let bytes = self.script.stdout.as_bytes();
        let size = self.script.chunk_size.unwrap_or(bytes.len().max(1));
        for chunk in bytes.chunks(size) {
            if chunk_tx.send(chunk.to_vec()).is_err() {
                break;
            }
            if self.script.delay_per_chunk {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        }
        Ok(RunExit { kind, stderr })
    }
}

pub fn gen_engine(runner: ScriptedRunner) -> Engine {
    let limits = engine::Params {
        ping_max_count: 4,
        traceroute_max_hops: 30,
        probe_timeout_ms: 1_000,
    };
    let cache = cache::Params {
        cache_ttl_secs: 100,
        cache_sweep_secs: 120,
    };
    let platform = Platform::unix("ping", "traceroute");
    Engine::new(limits, &cache, platform, Arc::new(runner)).expect("engine to build")
}
