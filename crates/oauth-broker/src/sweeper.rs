//! Periodic expiry sweep
//!
//! Spawns a background task that purges expired codes and tokens from the
//! server's stores. Read paths already treat expired entries as absent, so
//! the sweep only bounds memory. It goes through the same store methods (and
//! therefore the same locks) as request handlers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::server::AuthorizationServer;

/// Entries removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub codes: usize,
    pub tokens: usize,
}

/// Spawn the sweep task.
///
/// Runs every `interval` until `shutdown` changes or its sender is dropped.
/// Returns a `JoinHandle` so the caller can wait for the task to finish.
pub fn spawn_sweep_task(
    server: Arc<AuthorizationServer>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick, nothing can have expired yet
        ticker.tick().await;

        info!(interval_secs = interval.as_secs(), "expiry sweeper started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sweep(&server).await;
                }
                _ = shutdown.changed() => {
                    info!("expiry sweeper stopping");
                    break;
                }
            }
        }
    })
}

/// Run one sweep over both stores.
pub async fn sweep(server: &AuthorizationServer) -> SweepReport {
    let report = SweepReport {
        codes: server.codes().purge_expired().await,
        tokens: server.tokens().purge_expired().await,
    };

    metrics::counter!("oauth_sweep_removed_total", "kind" => "code")
        .increment(report.codes as u64);
    metrics::counter!("oauth_sweep_removed_total", "kind" => "token")
        .increment(report.tokens as u64);

    if report.codes > 0 || report.tokens > 0 {
        info!(
            codes = report.codes,
            tokens = report.tokens,
            "expired entries swept"
        );
    } else {
        debug!("sweep found nothing expired");
    }
    report
}
