use anyhow::{anyhow, Result};
use log::info;
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct SignalHandler {
    tok: CancellationToken,
}

pub fn new() -> SignalHandler {
    SignalHandler {
        tok: CancellationToken::new(),
    }
}

impl SignalHandler {
    pub fn subscribe_stop(&self) -> CancellationToken {
        self.tok.clone()
    }

    pub async fn wait_for_signal(self) {
        let (mut sigterm, mut sigint, mut sighup) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
            signal(SignalKind::hangup()),
        ) {
            (Ok(term), Ok(int), Ok(hup)) => (term, int, hup),
            _ => {
                log::error!("Unable to register signal handlers, stopping right away.");
                self.tok.cancel();
                return;
            }
        };

        select! {
            _ = sigterm.recv() => info!("Terminated; stopping..."),
            _ = sigint.recv() => info!("Interrupted; stopping..."),
            _ = sighup.recv() => info!("Hangup received; stopping..."), // used by tmux apparently
            _ = self.tok.cancelled() => {}, // stopped from the inside, e.g. stdin closed
        }
        self.tok.cancel();
    }
}

pub async fn flatten(handle: JoinHandle<Result<()>>) -> Result<()> {
    match handle.await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(err)) => Err(err),
        Err(err) => Err(anyhow!(err)),
    }
}
