use actix_web::{http::StatusCode, test::TestRequest, web};
use mockall::predicate::eq;
use p2p_engine::{
    db_types::{PayoutState, TransactionId, TransactionStatus},
    events::EventProducers,
    PaymentRailError,
    SettlementApi,
};
use serde_json::{json, Value};

use super::{
    helpers::{send_request, transaction},
    mocks::{MockExchange, MockRail},
};
use crate::routes::{
    CancelTransactionRoute,
    TransactionByIdRoute,
    TransactionsRoute,
    UpdateTransactionByQueryRoute,
    UpdateTransactionRoute,
};

const TX_ID: &str = "TX_1717232400000_654321";

fn configure(db: MockExchange, rail: MockRail) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        let api = SettlementApi::new(db, rail, EventProducers::default())
            .with_expiry_window(chrono::Duration::seconds(900));
        cfg.service(TransactionByIdRoute::<MockExchange, MockRail>::new())
            .service(TransactionsRoute::<MockExchange, MockRail>::new())
            .service(UpdateTransactionRoute::<MockExchange, MockRail>::new())
            .service(UpdateTransactionByQueryRoute::<MockExchange, MockRail>::new())
            .service(CancelTransactionRoute::<MockExchange, MockRail>::new())
            .app_data(web::Data::new(api));
    }
}

#[actix_web::test]
async fn fetch_transaction_by_path_and_query() {
    let _ = env_logger::try_init().ok();
    for uri in [format!("/transactions/{TX_ID}"), format!("/transactions?transactionId={TX_ID}")] {
        let mut db = MockExchange::new();
        db.expect_fetch_transaction()
            .with(eq(TransactionId::from(TX_ID)))
            .times(1)
            .returning(|_| Ok(Some(transaction(TransactionStatus::Pending, 10))));
        let (status, body) = send_request(TestRequest::get().uri(&uri), configure(db, MockRail::new())).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        let tx: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(tx["transaction_id"], TX_ID);
        assert_eq!(tx["status"], "pending");
    }
}

#[actix_web::test]
async fn transactions_for_a_user() {
    let _ = env_logger::try_init().ok();
    let mut db = MockExchange::new();
    db.expect_fetch_transactions_for_user()
        .withf(|user_id| user_id == "TBuyer")
        .times(1)
        .returning(|_| Ok(vec![transaction(TransactionStatus::Completed, 600), transaction(TransactionStatus::Canceled, 9000)]));
    let req = TestRequest::get().uri("/transactions?user_id=TBuyer");
    let (status, body) = send_request(req, configure(db, MockRail::new())).await;
    assert_eq!(status, StatusCode::OK);
    let txs: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(txs.len(), 2);
}

#[actix_web::test]
async fn transaction_query_needs_an_id_or_user() {
    let _ = env_logger::try_init().ok();
    let req = TestRequest::get().uri("/transactions");
    let (status, body) = send_request(req, configure(MockExchange::new(), MockRail::new())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("transactionId"), "{body}");
}

#[actix_web::test]
async fn buyer_confirmation() {
    let _ = env_logger::try_init().ok();
    let mut db = MockExchange::new();
    db.expect_fetch_transaction().returning(|_| Ok(Some(transaction(TransactionStatus::Pending, 10))));
    db.expect_record_buyer_confirmation()
        .times(1)
        .returning(|_, _| Ok(Some(transaction(TransactionStatus::Matching, 10))));
    let req =
        TestRequest::patch().uri(&format!("/transactions/{TX_ID}")).set_json(json!({"buyer_payment_confirmed": true}));
    let (status, body) = send_request(req, configure(db, MockRail::new())).await;
    assert_eq!(status, StatusCode::OK);
    let tx: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(tx["status"], "matching");
    assert_eq!(tx["buyer_payment_confirmed"], true);
}

#[actix_web::test]
async fn late_buyer_confirmation_is_rejected() {
    let _ = env_logger::try_init().ok();
    let mut db = MockExchange::new();
    db.expect_fetch_transaction().returning(|_| Ok(Some(transaction(TransactionStatus::Pending, 901))));
    db.expect_record_buyer_confirmation().never();
    let req =
        TestRequest::patch().uri(&format!("/transactions/{TX_ID}")).set_json(json!({"buyer_payment_confirmed": true}));
    let (status, body) = send_request(req, configure(db, MockRail::new())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, format!(r#"{{"error":"The window for transaction {TX_ID} has elapsed"}}"#));
}

#[actix_web::test]
async fn seller_cannot_confirm_first() {
    let _ = env_logger::try_init().ok();
    let mut db = MockExchange::new();
    db.expect_fetch_transaction().returning(|_| Ok(Some(transaction(TransactionStatus::Pending, 10))));
    let req = TestRequest::patch()
        .uri(&format!("/transactions?transactionId={TX_ID}"))
        .set_json(json!({"seller_payment_confirmed": true}));
    let (status, body) = send_request(req, configure(db, MockRail::new())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("This step is out of order"), "{body}");
}

#[actix_web::test]
async fn payout_timeouts_leave_the_transaction_as_it_was() {
    let _ = env_logger::try_init().ok();
    let mut db = MockExchange::new();
    db.expect_fetch_transaction().returning(|_| Ok(Some(transaction(TransactionStatus::Matching, 10))));
    db.expect_claim_payout().times(1).returning(|_, _| {
        let mut tx = transaction(TransactionStatus::Matching, 10);
        tx.payout_state = PayoutState::InFlight;
        Ok(Some(tx))
    });
    db.expect_release_payout_claim().times(1).returning(|_| Ok(()));
    db.expect_complete_transaction().never();
    let mut rail = MockRail::new();
    rail.expect_transfer().times(1).returning(|_| Err(PaymentRailError::NetworkTimeout));
    let req =
        TestRequest::patch().uri(&format!("/transactions/{TX_ID}")).set_json(json!({"seller_payment_confirmed": true}));
    let (status, body) = send_request(req, configure(db, rail)).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body, r#"{"error":"The payout could not be made. The payout did not complete in time"}"#);
}

#[actix_web::test]
async fn transactions_cannot_be_completed_directly() {
    let _ = env_logger::try_init().ok();
    let req = TestRequest::patch().uri(&format!("/transactions/{TX_ID}")).set_json(json!({"status": "completed"}));
    let (status, _) = send_request(req, configure(MockExchange::new(), MockRail::new())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn cancel_inside_the_window() {
    let _ = env_logger::try_init().ok();
    let mut db = MockExchange::new();
    db.expect_fetch_transaction().returning(|_| Ok(Some(transaction(TransactionStatus::Pending, 60))));
    db.expect_annul_transaction()
        .withf(|_, from| from.contains(&TransactionStatus::Pending))
        .times(1)
        .returning(|_, _| Ok(Some(transaction(TransactionStatus::Canceled, 60))));
    let req = TestRequest::patch().uri(&format!("/transactions/{TX_ID}")).set_json(json!({"status": "canceled"}));
    let (status, body) = send_request(req, configure(db, MockRail::new())).await;
    assert_eq!(status, StatusCode::OK);
    let tx: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(tx["status"], "canceled");
}

#[actix_web::test]
async fn cancel_after_the_window() {
    let _ = env_logger::try_init().ok();
    let mut db = MockExchange::new();
    db.expect_fetch_transaction().returning(|_| Ok(Some(transaction(TransactionStatus::Pending, 901))));
    db.expect_annul_transaction().never();
    let req = TestRequest::delete().uri(&format!("/transactions?transactionId={TX_ID}"));
    let (status, body) = send_request(req, configure(db, MockRail::new())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, format!(r#"{{"error":"The window for transaction {TX_ID} has elapsed"}}"#));
}
