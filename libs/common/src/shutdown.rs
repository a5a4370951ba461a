//! Graceful shutdown
//!
//! Signal handling shared by canhub binaries.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Resolve once Ctrl+C (or SIGTERM on Unix) is received
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let term_signal = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!("SIGTERM handler unavailable ({}), only Ctrl+C stops the process", e);
                None
            },
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                match term_signal {
                    Some(mut sig) => { sig.recv().await; },
                    None => std::future::pending::<()>().await,
                }
            } => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Cancel `token` on the first shutdown signal
///
/// Returns immediately; the signal is awaited on a background task that also
/// exits when the token is cancelled by someone else.
pub fn cancel_on_shutdown(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_shutdown() => {
                info!("Shutdown signal received");
                token.cancel();
            },
            _ = token.cancelled() => {},
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_watcher_exits_with_token() {
        let token = CancellationToken::new();
        cancel_on_shutdown(token.clone());
        token.cancel();
        // the watcher must not keep the token alive or re-cancel it
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(token.is_cancelled());
    }
}
