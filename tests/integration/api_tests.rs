//! API integration tests against a running server

use reqwest::Client;
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8080/api/v1";
const BORROWER_HEADER: &str = "X-Borrower-Id";

/// Item id expected to exist with some stock on the target server
fn seeded_item_id() -> i64 {
    std::env::var("LEDGER_TEST_ITEM_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1)
}

fn tomorrow() -> String {
    (chrono::Utc::now() + chrono::Duration::days(1)).to_rfc3339()
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_readiness() {
    let client = Client::new();

    let response = client
        .get(format!("{}/ready", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
}

#[tokio::test]
#[ignore]
async fn test_borrow_and_return() {
    let client = Client::new();
    let item_id = seeded_item_id();

    let before: Value = client
        .get(format!("{}/items/{}/stock", BASE_URL, item_id))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");
    let stock = before["stock"].as_i64().expect("No stock in response");

    let response = client
        .post(format!("{}/loans", BASE_URL))
        .header(BORROWER_HEADER, "4242")
        .json(&json!({ "item_id": item_id, "due_at": tomorrow() }))
        .send()
        .await
        .expect("Failed to send request");

    if stock == 0 {
        assert_eq!(response.status(), 409);
        return;
    }
    assert_eq!(response.status(), 201);

    let loan: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(loan["status"], "active");
    assert_eq!(loan["borrower_id"], 4242);
    assert_eq!(loan["is_overdue"], false);
    let loan_id = loan["id"].as_i64().expect("No loan id");

    let response = client
        .post(format!("{}/loans/{}/return", BASE_URL, loan_id))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let returned: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(returned["status"], "returned");
    assert!(returned["returned_at"].is_string());

    let response = client
        .post(format!("{}/loans/{}/return", BASE_URL, loan_id))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 409);
}

#[tokio::test]
#[ignore]
async fn test_borrow_with_past_due_date() {
    let client = Client::new();

    let response = client
        .post(format!("{}/loans", BASE_URL))
        .header(BORROWER_HEADER, "4242")
        .json(&json!({ "item_id": seeded_item_id(), "due_at": "2000-01-01T00:00:00Z" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 400);
}

#[tokio::test]
#[ignore]
async fn test_borrow_without_identity() {
    let client = Client::new();

    let response = client
        .post(format!("{}/loans", BASE_URL))
        .json(&json!({ "item_id": seeded_item_id(), "due_at": tomorrow() }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_unknown_loan() {
    let client = Client::new();

    let response = client
        .get(format!("{}/loans/{}", BASE_URL, i64::MAX))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], 20);
}

#[tokio::test]
#[ignore]
async fn test_list_overdue_and_sweep() {
    let client = Client::new();

    let response = client
        .post(format!("{}/loans/sweep", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["transitioned"].is_u64());

    let response = client
        .get(format!("{}/loans/overdue?per_page=5", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["per_page"], 5);
    for loan in body["items"].as_array().expect("No items in response") {
        assert_eq!(loan["status"], "overdue");
        assert_eq!(loan["is_overdue"], true);
    }
}

#[tokio::test]
#[ignore]
async fn test_most_borrowed() {
    let client = Client::new();

    let response = client
        .get(format!("{}/items/most-borrowed?limit=3", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body.as_array().expect("Expected an array").len() <= 3);
}
