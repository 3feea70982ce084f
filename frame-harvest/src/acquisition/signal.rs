//! Operator stop signal.

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancel `token` on Ctrl-C, SIGTERM or an Enter keypress.
///
/// Closed stdin (daemonised runs) is not a stop request.
pub fn spawn_stop_listener(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = interrupt() => info!("Received Ctrl-C, stopping"),
            _ = terminate() => info!("Received SIGTERM, stopping"),
            _ = enter_pressed() => info!("Enter pressed, stopping"),
        }
        token.cancel();
    })
}

async fn interrupt() {
    wait_for_signal(tokio::signal::ctrl_c(), "Ctrl-C").await;
}

/// Resolves once `signal` is delivered. Parks forever when the handler cannot
/// be installed.
async fn wait_for_signal<F>(signal: F, name: &'static str)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!(signal = name, error = %e, "Failed to install signal handler");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut signal) => {
            signal.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

// Stdin is read on a detached thread: a blocking read inside the runtime
// would hold up runtime shutdown until the next line arrives.
async fn enter_pressed() {
    let (tx, rx) = oneshot::channel();
    let spawned = std::thread::Builder::new()
        .name("stop-on-enter".to_string())
        .spawn(move || {
            let mut line = String::new();
            if matches!(std::io::stdin().read_line(&mut line), Ok(n) if n > 0) {
                let _ = tx.send(());
            }
        });

    if let Err(e) = spawned {
        warn!(error = %e, "Failed to start stdin listener");
        std::future::pending::<()>().await;
    }
    if rx.await.is_err() {
        std::future::pending::<()>().await;
    }
}
