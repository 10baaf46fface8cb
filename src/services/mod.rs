//! Business logic services

pub mod ledger;
pub mod loans;
pub mod sweeper;

use std::sync::Arc;

use crate::{config::LedgerConfig, repository::Store};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub ledger: ledger::LedgerService,
    pub loans: loans::LoansService,
}

impl Services {
    /// Create all services over the given store
    pub fn new(store: Arc<dyn Store>, config: &LedgerConfig) -> Self {
        let ledger = ledger::LedgerService::new(store.clone(), config);
        Self {
            loans: loans::LoansService::new(store, ledger.clone(), config),
            ledger,
        }
    }
}
