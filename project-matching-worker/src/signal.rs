use project_matching_optimizer::solver::CancelFlag;
use tracing::warn;

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Cancels `cancel` on Ctrl-C or SIGTERM. The solve notices at its next checkpoint.
pub fn cancel_on_shutdown(cancel: CancelFlag) {
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => {
                warn!("shutdown requested, cancelling the running job");
                cancel.cancel();
            }
            Err(error) => warn!(%error, "could not listen for shutdown signals"),
        }
    });
}
