use std::future::Future;
use std::time::Duration;

use crony_scheduler::CronScheduler;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancel the returned token on the first SIGTERM or SIGINT.
pub fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
        }
        trigger.cancel();
    });

    Ok(token)
}

/// Stop `scheduler` and wait for `tasks` under one `grace` deadline.
///
/// Triggers stop firing before `tasks` is first polled. Returns whether the
/// running executions finished, and the output of `tasks` if it completed
/// in time.
pub async fn drain<F: Future>(
    scheduler: &CronScheduler,
    grace: Duration,
    tasks: F,
) -> (bool, Option<F::Output>) {
    let (finished, drained) = tokio::join!(
        scheduler.shutdown(grace),
        tokio::time::timeout(grace, tasks)
    );
    (finished, drained.ok())
}
