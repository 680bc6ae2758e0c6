use actix_web::{http::StatusCode, test::TestRequest, web};
use p2p_engine::{
    db_types::{BuyOrder, SellOrder, SellOrderStatus, TransactionStatus},
    events::EventProducers,
    traits::{ExchangeError, MatchedOrder},
    MatchingApi,
};
use serde_json::{json, Value};

use super::{
    helpers::{send_request, sell_order, tokens, transaction},
    mocks::MockExchange,
};
use crate::routes::{CreateOrderRoute, CreateTransactionRoute, ListOrdersRoute, ModifyOrderRoute, OrderByIdRoute};

fn configure(db: MockExchange) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        let api = MatchingApi::new(db, EventProducers::default());
        cfg.service(CreateOrderRoute::<MockExchange>::new())
            .service(ListOrdersRoute::<MockExchange>::new())
            .service(OrderByIdRoute::<MockExchange>::new())
            .service(ModifyOrderRoute::<MockExchange>::new())
            .service(CreateTransactionRoute::<MockExchange>::new())
            .app_data(web::Data::new(api));
    }
}

fn buy_order() -> BuyOrder {
    let tx = transaction(TransactionStatus::Pending, 10);
    BuyOrder {
        id: 1,
        order_id: tx.buy_order_id,
        sell_order_id: tx.sell_order_id,
        buyer_id: tx.buyer_id,
        amount: tx.amount,
        price: tx.total_price,
        rate: tx.price,
        payment_country: "TH".to_string(),
        status: TransactionStatus::Pending,
        created_at: tx.created_at,
        updated_at: tx.updated_at,
    }
}

#[actix_web::test]
async fn create_sell_order() {
    let _ = env_logger::try_init().ok();
    let mut db = MockExchange::new();
    db.expect_insert_sell_order()
        .withf(|o| o.country_codes == vec!["TH".to_string()] && o.rates.contains_key("TH"))
        .times(1)
        .returning(|_| Ok(sell_order()));
    let body = json!({
        "type": "sell",
        "seller_id": "TSeller",
        "amount": 100_000_000,
        "currency": "USDT",
        "chain": "tron",
        "country_codes": ["th"],
        "rates": {"th": 3500},
        "num_buyers": 2,
        "min_buy_amount": 1_000_000
    });
    let req = TestRequest::post().uri("/orders").set_json(body);
    let (status, body) = send_request(req, configure(db)).await;
    assert_eq!(status, StatusCode::CREATED);
    let order: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(order["order_id"], "SELL_1717232400000_123456");
    assert_eq!(order["status"], "active");
}

#[actix_web::test]
async fn sell_order_without_a_rate_for_every_country() {
    let _ = env_logger::try_init().ok();
    // No expectations: the order must be rejected before it reaches the database
    let db = MockExchange::new();
    let body = json!({
        "type": "sell",
        "seller_id": "TSeller",
        "amount": 100_000_000,
        "currency": "USDT",
        "chain": "tron",
        "country_codes": ["TH", "VN"],
        "rates": {"TH": 3500},
        "num_buyers": 2,
        "min_buy_amount": 1_000_000
    });
    let req = TestRequest::post().uri("/orders").set_json(body);
    let (status, body) = send_request(req, configure(db)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.starts_with(r#"{"error":"Invalid rate mapping."#), "{body}");
}

#[actix_web::test]
async fn buy_orders_are_matched() {
    let _ = env_logger::try_init().ok();
    let mut db = MockExchange::new();
    db.expect_insert_match().times(1).returning(|fill| {
        assert_eq!(fill.amount, tokens(30));
        assert_eq!(fill.buyer_id, "TBuyer");
        Ok(MatchedOrder {
            sell_order: sell_order(),
            buy_order: buy_order(),
            transaction: transaction(TransactionStatus::Pending, 0),
        })
    });
    db.expect_search_sell_orders().returning(|_| Ok(vec![sell_order()]));
    let body = json!({
        "sell_order_id": "SELL_1717232400000_123456",
        "buyer_id": "TBuyer",
        "amount": 30_000_000,
        "payment_country": "TH"
    });
    let req = TestRequest::post().uri("/transactions").set_json(body);
    let (status, body) = send_request(req, configure(db)).await;
    assert_eq!(status, StatusCode::CREATED);
    let result: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(result["transaction"]["status"], "pending");
    assert_eq!(result["order"]["order_id"], "BUY_1717232400000_111111");
    // The matched seller is the only seller in the market, so there is exactly one notification
    assert_eq!(result["notifications"].as_array().map(|n| n.len()), Some(1));
    assert_eq!(result["notifications"][0]["kind"], "new_buyer");
}

#[actix_web::test]
async fn oversized_buy_orders_are_refused() {
    let _ = env_logger::try_init().ok();
    let mut db = MockExchange::new();
    db.expect_insert_match()
        .times(1)
        .returning(|_| Err(ExchangeError::CapacityExceeded("Only 100 is available".into())));
    let body = json!({
        "type": "buy",
        "sell_order_id": "SELL_1717232400000_123456",
        "buyer_id": "TBuyer",
        "amount": 300_000_000,
        "payment_country": "TH"
    });
    let req = TestRequest::post().uri("/orders").set_json(body);
    let (status, body) = send_request(req, configure(db)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body, r#"{"error":"Cannot match the order. Only 100 is available"}"#);
}

#[actix_web::test]
async fn fetch_unknown_order() {
    let _ = env_logger::try_init().ok();
    let mut db = MockExchange::new();
    db.expect_fetch_sell_order().returning(|_| Ok(None));
    db.expect_fetch_buy_order().returning(|_| Ok(None));
    let req = TestRequest::get().uri("/orders/SELL_0_000000");
    let (status, body) = send_request(req, configure(db)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"The requested order SELL_0_000000 does not exist"}"#);
}

#[actix_web::test]
async fn fetch_buy_order_by_id() {
    let _ = env_logger::try_init().ok();
    let mut db = MockExchange::new();
    db.expect_fetch_sell_order().returning(|_| Ok(None));
    db.expect_fetch_buy_order().returning(|_| Ok(Some(buy_order())));
    let req = TestRequest::get().uri("/orders/BUY_1717232400000_111111");
    let (status, body) = send_request(req, configure(db)).await;
    assert_eq!(status, StatusCode::OK);
    let result: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(result["type"], "buy");
    assert_eq!(result["order"]["buyer_id"], "TBuyer");
}

#[actix_web::test]
async fn buy_orders_cannot_be_modified() {
    let _ = env_logger::try_init().ok();
    let mut db = MockExchange::new();
    db.expect_fetch_buy_order().returning(|_| Ok(Some(buy_order())));
    let req = TestRequest::patch().uri("/orders/BUY_1717232400000_111111").set_json(json!({"status": "completed"}));
    let (status, _) = send_request(req, configure(db)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn derived_fields_are_never_written() {
    let _ = env_logger::try_init().ok();
    let mut db = MockExchange::new();
    db.expect_fetch_buy_order().returning(|_| Ok(None));
    db.expect_modify_sell_order()
        .withf(|_, update| update.new_status == Some(SellOrderStatus::Completed) && update.new_min_buy_amount.is_none())
        .times(1)
        .returning(|_, _| Ok(SellOrder { status: SellOrderStatus::Completed, version: 2, ..sell_order() }));
    let body = json!({"status": "completed", "remaining_balance": 0, "remaining_buyers": 0});
    let req = TestRequest::patch().uri("/orders/SELL_1717232400000_123456").set_json(body);
    let (status, body) = send_request(req, configure(db)).await;
    assert_eq!(status, StatusCode::OK);
    let order: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(order["remaining_balance"], 100_000_000);
    assert_eq!(order["status"], "completed");
}

#[actix_web::test]
async fn list_orders_with_a_bad_status() {
    let _ = env_logger::try_init().ok();
    let db = MockExchange::new();
    let req = TestRequest::get().uri("/orders?type=buy&status=active");
    let (status, _) = send_request(req, configure(db)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn list_sell_orders_for_a_market() {
    let _ = env_logger::try_init().ok();
    let mut db = MockExchange::new();
    db.expect_search_sell_orders()
        .withf(|q| {
            q.currency.as_deref() == Some("USDT") &&
                q.chain.as_deref() == Some("tron") &&
                q.seller_id.as_deref() == Some("TSeller")
        })
        .times(1)
        .returning(|_| Ok(vec![sell_order()]));
    let req = TestRequest::get().uri("/orders?type=sell&currency=USDT&chain=tron&user_id=TSeller");
    let (status, body) = send_request(req, configure(db)).await;
    assert_eq!(status, StatusCode::OK);
    let orders: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(orders.len(), 1);
}
