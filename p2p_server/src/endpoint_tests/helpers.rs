use std::collections::BTreeMap;

use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web::ServiceConfig, App};
use chrono::{Duration, TimeZone, Utc};
use log::debug;
use p2p_common::{FiatAmount, TokenAmount};
use p2p_engine::db_types::{
    CommissionFees,
    OrderId,
    PayoutState,
    ReferralTransactions,
    SellOrder,
    SellOrderStatus,
    Transaction,
    TransactionId,
    TransactionStatus,
    User,
};

pub async fn send_request<F>(req: TestRequest, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request");
    let res = test::call_service(&service, req.to_request()).await;
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    (status, body)
}

pub fn tokens(n: i64) -> TokenAmount {
    TokenAmount::from_tokens(n)
}

pub fn sell_order() -> SellOrder {
    let t = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
    SellOrder {
        id: 1,
        order_id: OrderId::from("SELL_1717232400000_123456"),
        seller_id: "TSeller".to_string(),
        amount: tokens(100),
        currency: "USDT".to_string(),
        chain: "tron".to_string(),
        country_codes: vec!["TH".to_string()],
        rates: BTreeMap::from([("TH".to_string(), FiatAmount::from_units(35))]),
        num_buyers: 2,
        min_buy_amount: tokens(1),
        sub_orders: vec![],
        remaining_balance: tokens(100),
        remaining_buyers: 2,
        status: SellOrderStatus::Active,
        version: 1,
        created_at: t,
        updated_at: t,
    }
}

/// A transaction created `age_secs` ago against [`sell_order`].
pub fn transaction(status: TransactionStatus, age_secs: i64) -> Transaction {
    let t = Utc::now() - Duration::seconds(age_secs);
    Transaction {
        id: 1,
        transaction_id: TransactionId::from("TX_1717232400000_654321"),
        buy_order_id: OrderId::from("BUY_1717232400000_111111"),
        sell_order_id: sell_order().order_id,
        buyer_id: "TBuyer".to_string(),
        seller_id: "TSeller".to_string(),
        amount: tokens(30),
        price: FiatAmount::from_units(35),
        total_price: FiatAmount::from_units(1050),
        currency: "USDT".to_string(),
        chain: "tron".to_string(),
        buyer_payment_confirmed: status != TransactionStatus::Pending,
        seller_payment_confirmed: status == TransactionStatus::Completed,
        status,
        fees: CommissionFees::default(),
        payout_state: PayoutState::Idle,
        payout_reference: None,
        created_at: t,
        updated_at: t,
    }
}

pub fn user(wallet: &str, code: &str) -> User {
    let t = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
    User {
        id: 1,
        wallet_address: wallet.to_string(),
        referral_code: code.to_string(),
        parent_ref: None,
        referral_earnings: TokenAmount::default(),
        referral_transactions: ReferralTransactions::default(),
        created_at: t,
        updated_at: t,
    }
}
