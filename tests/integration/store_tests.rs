//! Ledger and query layer over PostgreSQL.
//!
//! These tests truncate `items` and `loans`, so they only run against the database named
//! by `LEDGER_TEST_DATABASE_URL`. Run with: cargo test --test store_tests -- --ignored

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration, Utc};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

use lending_ledger::{
    config::LedgerConfig,
    models::{BorrowCount, LoanFilter, LoanStatus, NewLoan},
    repository::{Repository, Store, StoreTx},
    services::Services,
    AppError,
};

// Tests share one database and reset it, so they run one at a time.
static DB_LOCK: Mutex<()> = Mutex::new(());

struct TestDb {
    pool: Pool<Postgres>,
    services: Services,
    store: Arc<dyn Store>,
    _lock: MutexGuard<'static, ()>,
}

async fn setup() -> TestDb {
    let lock = DB_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let url = std::env::var("LEDGER_TEST_DATABASE_URL")
        .expect("LEDGER_TEST_DATABASE_URL must point to a disposable database");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    sqlx::query("TRUNCATE loans, items RESTART IDENTITY")
        .execute(&pool)
        .await
        .expect("Failed to reset tables");

    let store: Arc<dyn Store> = Arc::new(Repository::new(pool.clone()));
    TestDb {
        services: Services::new(store.clone(), &LedgerConfig::default()),
        store,
        pool,
        _lock: lock,
    }
}

async fn create_item(pool: &Pool<Postgres>, stock: i32) -> i64 {
    sqlx::query_scalar("INSERT INTO items (stock) VALUES ($1) RETURNING id")
        .bind(stock)
        .fetch_one(pool)
        .await
        .expect("Failed to create item")
}

async fn insert_loans(store: &Arc<dyn Store>, item_id: i64, count: i64, due_in: Duration) {
    let now = Utc::now();
    let mut tx = store.begin().await.unwrap();
    for borrower_id in 0..count {
        tx.insert_loan(&NewLoan {
            item_id,
            borrower_id,
            status: LoanStatus::Active,
            borrowed_at: now - Duration::days(10),
            due_at: now + due_in,
        })
        .await
        .unwrap();
    }
    tx.commit().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn concurrent_borrows_are_serialized_by_row_lock() {
    let db = setup().await;
    let item_id = create_item(&db.pool, 3).await;
    let due = Utc::now() + Duration::days(7);

    let handles: Vec<_> = (0..10)
        .map(|borrower_id| {
            let ledger = db.services.ledger.clone();
            tokio::spawn(async move { ledger.open_loan(item_id, borrower_id, due).await })
        })
        .collect();

    let mut granted = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => granted += 1,
            Err(AppError::OutOfStock(id)) => {
                assert_eq!(id, item_id);
                refused += 1;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(granted, 3);
    assert_eq!(refused, 7);
    assert_eq!(db.services.ledger.stock(item_id).await.unwrap(), 0);

    let open = LoanFilter {
        item_id: Some(item_id),
        ..LoanFilter::default()
    };
    assert_eq!(db.services.loans.count(&open).await.unwrap(), 3);
}

#[tokio::test]
#[ignore]
async fn decrement_distinguishes_missing_and_empty_items() {
    let db = setup().await;
    let empty = create_item(&db.pool, 0).await;

    let mut tx = db.store.begin().await.unwrap();
    assert!(matches!(
        tx.decrement_stock(empty).await,
        Err(AppError::OutOfStock(id)) if id == empty
    ));
    assert!(matches!(
        tx.decrement_stock(empty + 1000).await,
        Err(AppError::ItemNotFound(_))
    ));
    assert_eq!(tx.lock_stock(empty + 1000).await.unwrap(), None);
    drop(tx);

    assert!(matches!(
        db.services
            .ledger
            .open_loan(empty, 1, Utc::now() + Duration::days(1))
            .await,
        Err(AppError::OutOfStock(_))
    ));
    assert_eq!(db.services.ledger.stock(empty).await.unwrap(), 0);
}

#[tokio::test]
#[ignore]
async fn most_borrowed_ranks_by_count_then_item_id() {
    let db = setup().await;
    let first = create_item(&db.pool, 10).await;
    let second = create_item(&db.pool, 10).await;
    let third = create_item(&db.pool, 10).await;

    insert_loans(&db.store, third, 3, Duration::days(7)).await;
    insert_loans(&db.store, second, 5, Duration::days(7)).await;
    insert_loans(&db.store, first, 3, Duration::days(7)).await;

    let ranked = db.services.loans.most_borrowed(2).await.unwrap();
    assert_eq!(
        ranked,
        vec![
            BorrowCount { item_id: second, borrow_count: 5 },
            BorrowCount { item_id: first, borrow_count: 3 },
        ]
    );
    assert_eq!(db.services.loans.most_borrowed(0).await.unwrap().len(), 3);
}

#[tokio::test]
#[ignore]
async fn overdue_lifecycle_and_filters() {
    let db = setup().await;
    let item_id = create_item(&db.pool, 0).await;
    insert_loans(&db.store, item_id, 1, Duration::hours(-1)).await;
    insert_loans(&db.store, item_id, 1, Duration::days(3)).await;

    let overdue = db
        .services
        .loans
        .search(&LoanFilter::overdue(), None, None)
        .await
        .unwrap();
    assert_eq!(overdue.total, 1);
    assert_eq!(overdue.items[0].status, LoanStatus::Overdue);
    assert_eq!(db.services.ledger.sweep_overdue().await.unwrap(), 0);

    let late = overdue.items[0].id;
    let returned = db.services.ledger.close_loan(late).await.unwrap();
    assert_eq!(returned.status, LoanStatus::Returned);
    assert!(returned.returned_at.is_some());
    assert_eq!(db.services.ledger.stock(item_id).await.unwrap(), 1);

    assert!(matches!(
        db.services.ledger.close_loan(late).await,
        Err(AppError::AlreadyReturned(_))
    ));
    assert_eq!(db.services.ledger.stock(item_id).await.unwrap(), 1);
    assert_eq!(db.services.loans.count(&LoanFilter::overdue()).await.unwrap(), 0);

    let active = LoanFilter {
        status: Some(LoanStatus::Active),
        from: Some(Utc::now() - Duration::days(11)),
        to: Some(Utc::now()),
        ..LoanFilter::default()
    };
    assert_eq!(db.services.loans.count(&active).await.unwrap(), 1);
}
