/// Common entrypoint for the binaries: panic hook, `.env`, logging, Tokio runtime.
pub mod bootstrap;
pub mod logging;
/// Shutdown on SIGTERM/SIGINT/SIGHUP and task-join helpers.
pub mod stop;
