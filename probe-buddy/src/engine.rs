use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use log::{debug, info, warn};
use probe_models::ping::PingResult;
use probe_models::probe_request::RawBound;
use probe_models::probe_response::{Completion, ProbeResult, StreamEvent};
use probe_models::trace::TracerouteResult;
use probe_models::ProbeKind;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::assemble::{Assembler, PingAssembler, TraceAssembler};
use crate::cache::{self, ResultCache};
use crate::error::ProbeError;
use crate::lines::LineAssembler;
use crate::parse::{LineParser, PingParser, TracerouteParser};
use crate::probe_call::{ExitKind, Invocation, Platform, RunExit, Runner};
use crate::sanitize::ProbeRequest;
use crate::sink::{Discard, EventSink};

#[derive(Args, Clone, Debug)]
#[group(id = "limits")]
pub struct Params {
    /// Upper bound (and default) for the number of echo requests per ping
    #[arg(long, default_value = "4", env = "PING_MAX_COUNT")]
    pub ping_max_count: u32,

    /// Upper bound (and default) for the number of hops per traceroute
    #[arg(long, default_value = "30", env = "TRACEROUTE_MAX_HOPS")]
    pub traceroute_max_hops: u32,

    /// Deadline for a ping process in milliseconds. Traceroute gets three times as long.
    #[arg(long, default_value = "30000", env = "PROBE_TIMEOUT_MS")]
    pub probe_timeout_ms: u64,
}

impl Params {
    fn max_for(&self, kind: ProbeKind) -> u32 {
        match kind {
            ProbeKind::Ping => self.ping_max_count,
            ProbeKind::Traceroute => self.traceroute_max_hops,
        }
    }

    fn base_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// A finished probe.
#[derive(Debug)]
pub struct Probed<T> {
    pub result: Arc<T>,
    pub cached: bool,
    /// Set if the result is only what could be read before the probe failed, e.g. timed out.
    /// Such results are not cached.
    pub incomplete: Option<ProbeError>,
}

/// Runs probes and keeps their results around for a while. Safe to share between any number of
/// concurrent requests, each one gets its own process and parser state.
#[derive(Debug)]
pub struct Engine {
    limits: Params,
    cache_ttl: Duration,
    platform: Platform,
    runner: Arc<dyn Runner>,
    ping_parser: PingParser,
    trace_parser: TracerouteParser,
    pings: Arc<ResultCache<PingResult>>,
    traces: Arc<ResultCache<TracerouteResult>>,
}

impl Engine {
    pub fn new(
        limits: Params,
        cache: &cache::Params,
        platform: Platform,
        runner: Arc<dyn Runner>,
    ) -> Result<Self> {
        Ok(Self {
            limits,
            cache_ttl: cache.ttl(),
            platform,
            runner,
            ping_parser: PingParser::new().context("compiling ping grammar")?,
            trace_parser: TracerouteParser::new().context("compiling traceroute grammar")?,
            pings: Arc::new(ResultCache::new("ping")),
            traces: Arc::new(ResultCache::new("traceroute")),
        })
    }

    /// Starts one sweeper per cache, running until `stop` is cancelled.
    pub fn spawn_sweepers(
        &self,
        period: Duration,
        stop: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(cache::run_sweeper(Arc::clone(&self.pings), period, stop.clone())),
            tokio::spawn(cache::run_sweeper(Arc::clone(&self.traces), period, stop.clone())),
        ]
    }

    pub async fn probe_ping(
        &self,
        host: &str,
        count: Option<&RawBound>,
    ) -> Result<Probed<PingResult>, ProbeError> {
        self.probe_ping_streaming(host, count, &mut Discard).await
    }

    /// Like [Engine::probe_ping], delivering each echo reply to `sink` as soon as it is read.
    pub async fn probe_ping_streaming(
        &self,
        host: &str,
        count: Option<&RawBound>,
        sink: &mut dyn EventSink,
    ) -> Result<Probed<PingResult>, ProbeError> {
        let req = match self.sanitize(ProbeKind::Ping, host, count) {
            Ok(req) => req,
            Err(e) => return Err(deliver_error(sink, e)),
        };
        let assembler = PingAssembler::new(&req.host);
        self.probe(&req, &self.pings, &self.ping_parser, assembler, sink)
            .await
    }

    pub async fn probe_traceroute(
        &self,
        host: &str,
        max_hops: Option<&RawBound>,
    ) -> Result<Probed<TracerouteResult>, ProbeError> {
        self.probe_traceroute_streaming(host, max_hops, &mut Discard)
            .await
    }

    /// Like [Engine::probe_traceroute], delivering each hop to `sink` as soon as it is read.
    pub async fn probe_traceroute_streaming(
        &self,
        host: &str,
        max_hops: Option<&RawBound>,
        sink: &mut dyn EventSink,
    ) -> Result<Probed<TracerouteResult>, ProbeError> {
        let req = match self.sanitize(ProbeKind::Traceroute, host, max_hops) {
            Ok(req) => req,
            Err(e) => return Err(deliver_error(sink, e)),
        };
        let assembler = TraceAssembler::new(&req.host);
        self.probe(&req, &self.traces, &self.trace_parser, assembler, sink)
            .await
    }

    fn sanitize(
        &self,
        kind: ProbeKind,
        host: &str,
        bound: Option<&RawBound>,
    ) -> Result<ProbeRequest, ProbeError> {
        ProbeRequest::new(kind, host, bound, self.limits.max_for(kind))
    }

    async fn probe<A>(
        &self,
        req: &ProbeRequest,
        cache: &ResultCache<A::Output>,
        parser: &dyn LineParser,
        assembler: A,
        sink: &mut dyn EventSink,
    ) -> Result<Probed<A::Output>, ProbeError>
    where
        A: Assembler,
        A::Output: Clone + Into<ProbeResult> + Send + Sync,
    {
        let key = req.fingerprint();
        if let Some(result) = cache.get(&key) {
            info!("{} to {} ({}) served from cache", req.kind, req.host, req.bound);
            deliver_completed(sink, &result, true, None);
            return Ok(Probed {
                result,
                cached: true,
                incomplete: None,
            });
        }

        let invocation = self.platform.invocation(req, self.limits.base_timeout());
        let (exit, output) = self.run_and_parse(&invocation, parser, assembler, sink).await;
        let RunOutput { result, saw_output } = output;

        let incomplete = match judge(exit, saw_output, &invocation.program, invocation.timeout) {
            Ok(incomplete) => incomplete,
            Err(e) => return Err(deliver_error(sink, e)),
        };

        let result = Arc::new(result);
        match &incomplete {
            None => cache.put(key, Arc::clone(&result), self.cache_ttl),
            Some(e) => warn!("Returning partial {} result for {}: {}", req.kind, req.host, e),
        }
        deliver_completed(sink, &result, false, incomplete.as_ref());
        Ok(Probed {
            result,
            cached: false,
            incomplete,
        })
    }

    /// Feeds stdout through line assembly and parsing while the process is still running, so
    /// that progress reaches the sink in the order it was printed.
    async fn run_and_parse<A: Assembler>(
        &self,
        invocation: &Invocation,
        parser: &dyn LineParser,
        mut assembler: A,
        sink: &mut dyn EventSink,
    ) -> (Result<RunExit, ProbeError>, RunOutput<A::Output>) {
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let run = self.runner.run(invocation, chunk_tx);
        let consume = async {
            let mut lines = LineAssembler::default();
            let mut saw_output = false;
            while let Some(chunk) = chunk_rx.recv().await {
                for line in lines.push(&chunk) {
                    saw_output |= feed_line(&line, parser, &mut assembler, sink);
                }
            }
            if let Some(line) = lines.finish() {
                saw_output |= feed_line(&line, parser, &mut assembler, sink);
            }
            saw_output
        };
        let (exit, saw_output) = tokio::join!(run, consume);
        let output = RunOutput {
            result: assembler.finish(),
            saw_output,
        };
        (exit, output)
    }
}

struct RunOutput<T> {
    result: T,
    /// Whether stdout had anything but blank lines, parsed or not.
    saw_output: bool,
}

/// Returns whether the line had any content.
fn feed_line<A: Assembler>(
    line: &str,
    parser: &dyn LineParser,
    assembler: &mut A,
    sink: &mut dyn EventSink,
) -> bool {
    if let Some(event) = parser
        .parse(line)
        .and_then(|fragment| assembler.accept(line, fragment))
    {
        deliver(sink, event);
    }
    !line.trim().is_empty()
}

/// Decides whether a run produced a result. `Ok(Some(_))` means a partial one.
fn judge(
    exit: Result<RunExit, ProbeError>,
    saw_output: bool,
    program: &str,
    timeout: Duration,
) -> Result<Option<ProbeError>, ProbeError> {
    let exit = match exit {
        Ok(exit) => exit,
        Err(e @ ProbeError::Io { .. }) if saw_output => return Ok(Some(e)),
        Err(e) => return Err(e),
    };
    match exit.kind {
        ExitKind::Success => Ok(None),
        ExitKind::Failed { code } if saw_output => {
            // e.g. traceroute not reaching its target, still a complete answer
            debug!("`{}` exited with {:?} after producing output", program, code);
            Ok(None)
        }
        ExitKind::Failed { code } => Err(ProbeError::ProcessFailed {
            program: program.to_string(),
            code,
            stderr: exit.stderr,
        }),
        ExitKind::TimedOut => {
            let err = ProbeError::Timeout {
                program: program.to_string(),
                after: timeout,
            };
            if saw_output {
                Ok(Some(err))
            } else {
                Err(err)
            }
        }
    }
}

fn deliver(sink: &mut dyn EventSink, event: StreamEvent) {
    if let Err(e) = sink.deliver(event) {
        warn!("Event sink failed, continuing without it: {:#}", e);
    }
}

fn deliver_completed<T>(
    sink: &mut dyn EventSink,
    result: &Arc<T>,
    cached: bool,
    incomplete: Option<&ProbeError>,
) where
    T: Clone + Into<ProbeResult>,
{
    let completion = Completion {
        result: T::clone(result).into(),
        cached,
        warning: incomplete.map(ToString::to_string),
    };
    deliver(sink, StreamEvent::Completed { data: completion });
}

/// Passes the error through after telling the sink about it.
fn deliver_error(sink: &mut dyn EventSink, err: ProbeError) -> ProbeError {
    deliver(
        sink,
        StreamEvent::Error {
            message: err.to_string(),
        },
    );
    err
}
