//! Background overdue sweep

use std::time::Duration;

use tokio::{sync::watch, task::JoinHandle};

use crate::services::ledger::LedgerService;

/// Run `sweep_overdue` every `every`, starting immediately, until `shutdown` flips to true.
pub fn spawn(ledger: LedgerService, every: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!("Overdue sweeper started (every {:?})", every);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match ledger.sweep_overdue().await {
                        Ok(0) => tracing::debug!("Overdue sweep: nothing to do"),
                        Ok(moved) => tracing::info!(moved, "Overdue sweep completed"),
                        Err(e) => tracing::warn!(error = %e, "Overdue sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Overdue sweeper stopped");
    })
}
