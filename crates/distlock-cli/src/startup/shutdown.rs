//! Shutdown signal handling
//!
//! Ctrl+C or SIGTERM cancels the lock wait. A command that is already running
//! under the lock receives the terminal's signal itself and is awaited.

use distlock_core::CancellationToken;
use tracing::{info, warn};

/// Token cancelled on the first Ctrl+C or SIGTERM.
pub fn cancel_on_shutdown() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, cancelling"),
            _ = terminate => info!("Received SIGTERM, cancelling"),
            _ = trigger.cancelled() => return,
        }

        trigger.cancel();
    });

    cancel
}
