//! In-memory store.
//!
//! Intended for tests and local development. A transaction holds the whole store
//! exclusively until it is dropped, so every transaction is serializable.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Store, StoreTx};
use crate::{
    error::{AppError, AppResult},
    models::loan::{BorrowCount, Loan, LoanFilter, LoanStatus, NewLoan},
};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    items: BTreeMap<i64, i32>,
    loans: BTreeMap<i64, Loan>,
    last_loan_id: i64,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `(item_id, stock)` pairs
    pub fn with_items(items: impl IntoIterator<Item = (i64, i32)>) -> Self {
        let state = MemoryState {
            items: items.into_iter().collect(),
            ..MemoryState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Create or overwrite an item, standing in for catalog management
    pub async fn put_item(&self, item_id: i64, stock: i32) {
        self.state.lock().await.items.insert(item_id, stock);
    }

    pub async fn remove_item(&self, item_id: i64) {
        self.state.lock().await.items.remove(&item_id);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(Box::new(MemoryTx {
            guard: Some(guard),
            snapshot: Some(snapshot),
        }))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn stock(&self, item_id: i64) -> AppResult<i32> {
        self.state
            .lock()
            .await
            .items
            .get(&item_id)
            .copied()
            .ok_or(AppError::ItemNotFound(item_id))
    }

    async fn get_loan(&self, loan_id: i64) -> AppResult<Loan> {
        self.state
            .lock()
            .await
            .loans
            .get(&loan_id)
            .cloned()
            .ok_or(AppError::LoanNotFound(loan_id))
    }

    async fn list_loans(
        &self,
        filter: &LoanFilter,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Loan>> {
        let now = Utc::now();
        let state = self.state.lock().await;
        Ok(state
            .loans
            .values()
            .rev()
            .filter(|loan| filter.matches(loan, now))
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_loans(&self, filter: &LoanFilter) -> AppResult<i64> {
        let now = Utc::now();
        let state = self.state.lock().await;
        Ok(state
            .loans
            .values()
            .filter(|loan| filter.matches(loan, now))
            .count() as i64)
    }

    async fn most_borrowed(&self, limit: i64) -> AppResult<Vec<BorrowCount>> {
        let state = self.state.lock().await;
        let mut counts: BTreeMap<i64, i64> = BTreeMap::new();
        for loan in state.loans.values() {
            *counts.entry(loan.item_id).or_default() += 1;
        }

        let mut ranked: Vec<BorrowCount> = counts
            .into_iter()
            .map(|(item_id, borrow_count)| BorrowCount {
                item_id,
                borrow_count,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.borrow_count
                .cmp(&a.borrow_count)
                .then(a.item_id.cmp(&b.item_id))
        });
        ranked.truncate(limit.max(0) as usize);
        Ok(ranked)
    }
}

pub struct MemoryTx {
    /// Exclusive hold on the store; released by `commit` or on drop
    guard: Option<OwnedMutexGuard<MemoryState>>,
    /// State at `begin`, restored on drop unless committed
    snapshot: Option<MemoryState>,
}

impl MemoryTx {
    fn state(&mut self) -> AppResult<&mut MemoryState> {
        self.guard
            .as_deref_mut()
            .ok_or_else(|| AppError::Internal("transaction already committed".to_string()))
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let (Some(guard), Some(snapshot)) = (self.guard.as_mut(), self.snapshot.take()) {
            **guard = snapshot;
        }
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_stock(&mut self, item_id: i64) -> AppResult<Option<i32>> {
        Ok(self.state()?.items.get(&item_id).copied())
    }

    async fn decrement_stock(&mut self, item_id: i64) -> AppResult<i32> {
        let stock = self
            .state()?
            .items
            .get_mut(&item_id)
            .ok_or(AppError::ItemNotFound(item_id))?;
        if *stock <= 0 {
            return Err(AppError::OutOfStock(item_id));
        }
        *stock -= 1;
        Ok(*stock)
    }

    async fn increment_stock(&mut self, item_id: i64) -> AppResult<Option<i32>> {
        Ok(self.state()?.items.get_mut(&item_id).map(|stock| {
            *stock += 1;
            *stock
        }))
    }

    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan> {
        let state = self.state()?;
        state.last_loan_id += 1;
        let created = Loan {
            id: state.last_loan_id,
            item_id: loan.item_id,
            borrower_id: loan.borrower_id,
            status: loan.status,
            borrowed_at: loan.borrowed_at,
            due_at: loan.due_at,
            returned_at: None,
        };
        state.loans.insert(created.id, created.clone());
        Ok(created)
    }

    async fn lock_loan(&mut self, loan_id: i64) -> AppResult<Option<Loan>> {
        Ok(self.state()?.loans.get(&loan_id).cloned())
    }

    async fn update_status(
        &mut self,
        loan_id: i64,
        status: LoanStatus,
        returned_at: Option<DateTime<Utc>>,
    ) -> AppResult<Loan> {
        let loan = self
            .state()?
            .loans
            .get_mut(&loan_id)
            .ok_or(AppError::LoanNotFound(loan_id))?;
        loan.status = status;
        loan.returned_at = returned_at;
        Ok(loan.clone())
    }

    async fn bulk_transition(
        &mut self,
        from: LoanStatus,
        to: LoanStatus,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut moved = 0;
        for loan in self.state()?.loans.values_mut() {
            if loan.status == from && loan.returned_at.is_none() && loan.due_at < cutoff {
                loan.status = to;
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn commit(&mut self) -> AppResult<()> {
        if self.guard.take().is_none() {
            return Err(AppError::Internal("transaction already committed".to_string()));
        }
        self.snapshot = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_loan(item_id: i64) -> NewLoan {
        let now = Utc::now();
        NewLoan {
            item_id,
            borrower_id: 1,
            status: LoanStatus::Active,
            borrowed_at: now,
            due_at: now + Duration::days(7),
        }
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = MemoryStore::with_items([(1, 2)]);
        {
            let mut tx = store.begin().await.unwrap();
            tx.decrement_stock(1).await.unwrap();
            tx.insert_loan(&new_loan(1)).await.unwrap();
        }
        assert_eq!(store.stock(1).await.unwrap(), 2);
        assert_eq!(store.count_loans(&LoanFilter::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn committed_transaction_persists() {
        let store = MemoryStore::with_items([(1, 2)]);
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.decrement_stock(1).await.unwrap(), 1);
        let loan = tx.insert_loan(&new_loan(1)).await.unwrap();
        tx.commit().await.unwrap();
        assert!(tx.commit().await.is_err());
        drop(tx);

        assert_eq!(store.stock(1).await.unwrap(), 1);
        assert_eq!(store.get_loan(loan.id).await.unwrap(), loan);
    }

    #[tokio::test]
    async fn commit_releases_the_store() {
        let store = MemoryStore::with_items([(1, 2)]);
        let mut first = store.begin().await.unwrap();
        first.decrement_stock(1).await.unwrap();
        first.commit().await.unwrap();

        let mut second = tokio::time::timeout(std::time::Duration::from_secs(1), store.begin())
            .await
            .expect("begin blocked by a committed transaction")
            .unwrap();
        assert_eq!(second.decrement_stock(1).await.unwrap(), 0);
        second.commit().await.unwrap();

        assert!(first.decrement_stock(1).await.is_err());
        drop(first);
        drop(second);
        assert_eq!(store.stock(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn decrement_distinguishes_missing_and_empty_items() {
        let store = MemoryStore::with_items([(1, 0)]);
        let mut tx = store.begin().await.unwrap();
        assert!(matches!(tx.decrement_stock(1).await, Err(AppError::OutOfStock(1))));
        assert!(matches!(tx.decrement_stock(2).await, Err(AppError::ItemNotFound(2))));
        assert_eq!(tx.increment_stock(2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_paged() {
        let store = MemoryStore::with_items([(1, 10)]);
        let mut tx = store.begin().await.unwrap();
        for _ in 0..5 {
            tx.insert_loan(&new_loan(1)).await.unwrap();
        }
        tx.commit().await.unwrap();
        drop(tx);

        let page = store.list_loans(&LoanFilter::default(), 2, 1).await.unwrap();
        let ids: Vec<i64> = page.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![4, 3]);
    }
}
