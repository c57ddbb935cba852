use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use crate::scheduler::Scheduler;

/// Shut the scheduler down on SIGTERM or SIGINT.
///
/// Returns a `CancellationToken` cancelled right after `Scheduler::shutdown`
/// has run, so drain loops and pump drivers can stop too. A running job is
/// left to finish on its own.
pub fn install_shutdown_handler(scheduler: Scheduler) -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Failed to install signal handlers");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down scheduler");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, shutting down scheduler");
            }
        }

        scheduler.shutdown().await;
        token_clone.cancel();
    });

    token
}
