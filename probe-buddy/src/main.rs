use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::executor;
use log::warn;
use netdiag::helpers::stop::{self, flatten};
use netdiag::helpers::{bootstrap, logging};
use probe_models::probe_request::RawBound;
use probe_models::probe_response::StreamEvent;
use probe_models::ProbeKind;

use probe_buddy::probe_call::{self, Runner, SystemRunner};
use probe_buddy::{cache, engine, stdio, Engine};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[clap(flatten)]
    logging: logging::Params,

    #[clap(flatten)]
    limits: engine::Params,

    #[clap(flatten)]
    cache: cache::Params,

    #[clap(flatten)]
    binaries: probe_call::Params,

    /// Whether to pretty print JSON written by one-shot commands.
    #[arg(long, env = "PRETTY_PRINT", global = true)]
    pretty_print: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pings a host and prints the result as JSON.
    Ping {
        host: String,

        /// Number of echo requests, clamped to the configured maximum
        #[arg(short, long)]
        count: Option<String>,

        /// Also print every reply as it arrives
        #[arg(long)]
        stream: bool,
    },
    /// Traces the route to a host and prints the result as JSON.
    Trace {
        host: String,

        /// Maximum number of hops, clamped to the configured maximum
        #[arg(short, long)]
        max_hops: Option<String>,

        /// Also print every hop as it arrives
        #[arg(long)]
        stream: bool,
    },
    /// Serves requests given as JSON lines on stdin, writing events as JSON lines to stdout.
    ServeStdio {
        #[clap(flatten)]
        params: stdio::Params,
    },
}

fn main() -> Result<()> {
    bootstrap::run(|cli: &Cli| &cli.logging, do_run)
}

fn do_run(cli: Cli) -> Result<()> {
    let runner: Arc<dyn Runner> = Arc::new(SystemRunner);
    let platform = cli.binaries.to_platform();
    let sweep_period = cli.cache.sweep_period();
    let engine = Arc::new(Engine::new(cli.limits, &cli.cache, platform, runner)?);

    match cli.command {
        Command::Ping { host, count, stream } => {
            one_shot(engine, ProbeKind::Ping, host, count, stream, cli.pretty_print)
        }
        Command::Trace {
            host,
            max_hops,
            stream,
        } => one_shot(engine, ProbeKind::Traceroute, host, max_hops, stream, cli.pretty_print),
        Command::ServeStdio { params } => serve(engine, params, sweep_period),
    }
}

fn one_shot(
    engine: Arc<Engine>,
    kind: ProbeKind,
    host: String,
    bound: Option<String>,
    stream: bool,
    pretty_print: bool,
) -> Result<()> {
    let handle = tokio::spawn(async move {
        // given as text so that it is sanitised like any other request
        let bound = bound.map(RawBound::Text);
        let mut sink = move |event: StreamEvent| -> Result<()> {
            if stream || event.is_terminal() {
                print_event(&event, pretty_print)
            } else {
                Ok(())
            }
        };
        let res = match kind {
            ProbeKind::Ping => engine
                .probe_ping_streaming(&host, bound.as_ref(), &mut sink)
                .await
                .map(|_| ()),
            ProbeKind::Traceroute => engine
                .probe_traceroute_streaming(&host, bound.as_ref(), &mut sink)
                .await
                .map(|_| ()),
        };
        res.with_context(|| format!("{} to {} failed", kind, host))
    });
    executor::block_on(flatten(handle))
}

fn print_event(event: &StreamEvent, pretty_print: bool) -> Result<()> {
    let text = if pretty_print {
        serde_json::to_string_pretty(event)
    } else {
        serde_json::to_string(event)
    }
    .with_context(|| format!("during serialisation of {:?}", event))?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", text).context("while writing to stdout")?;
    stdout.flush().context("while flushing stdout")
}

fn serve(engine: Arc<Engine>, params: stdio::Params, sweep_period: Duration) -> Result<()> {
    let sig_handler = stop::new();
    let stop_rx = sig_handler.subscribe_stop();
    tokio::spawn(sig_handler.wait_for_signal());

    let sweepers = engine.spawn_sweepers(sweep_period, &stop_rx);
    let server = tokio::spawn(stdio::run(engine, params, stop_rx.clone()));

    executor::block_on(async {
        let res = flatten(server).await;
        // input may have closed without a signal, release everyone else too
        stop_rx.cancel();
        for sweeper in sweepers {
            if let Err(e) = sweeper.await {
                warn!("Cache sweeper did not stop cleanly: {}", e);
            }
        }
        res
    })
}
