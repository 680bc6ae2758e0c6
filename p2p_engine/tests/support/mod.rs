#![allow(dead_code)]

use log::*;
use p2p_common::{FiatAmount, TokenAmount};
use p2p_engine::{
    db_types::{NewSellOrder, SellOrder},
    events::EventProducers,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    ExchangeDatabase,
    MatchingApi,
    SettlementApi,
    SimulatedPaymentRail,
    SqliteDatabase,
    UsersApi,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub const PLATFORM_BALANCE: i64 = 1_000;

pub struct Exchange {
    pub db: SqliteDatabase,
    pub rail: SimulatedPaymentRail,
    pub matching: MatchingApi<SqliteDatabase>,
    pub settlement: SettlementApi<SqliteDatabase, SimulatedPaymentRail>,
    pub users: UsersApi<SqliteDatabase>,
}

pub async fn setup() -> Exchange {
    setup_with(EventProducers::default()).await
}

pub async fn setup_with(producers: EventProducers) -> Exchange {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let rail = SimulatedPaymentRail::new("USDT", TokenAmount::from_tokens(PLATFORM_BALANCE));
    Exchange {
        matching: MatchingApi::new(db.clone(), producers.clone()),
        settlement: SettlementApi::new(db.clone(), rail.clone(), producers),
        users: UsersApi::new(db.clone()),
        rail,
        db,
    }
}

pub async fn tear_down(mut exchange: Exchange) {
    let url = exchange.db.url().to_string();
    if let Err(e) = exchange.db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    if let Err(e) = Sqlite::drop_database(&url).await {
        warn!("🚀️ Could not remove {url}: {e}");
    }
}

/// A USDT sell order on Tron, priced at 35 THB per token, open to any amount of at least one token.
pub fn thai_sell_order(seller: &str, tokens: i64, num_buyers: i64) -> NewSellOrder {
    NewSellOrder::new(seller, TokenAmount::from_tokens(tokens), "USDT", "tron")
        .with_rate("th", FiatAmount::from_units(35))
        .with_num_buyers(num_buyers)
        .with_min_buy_amount(TokenAmount::from_tokens(1))
}

pub async fn create_sell_order(exchange: &Exchange, seller: &str, tokens: i64, num_buyers: i64) -> SellOrder {
    exchange.matching.create_sell_order(thai_sell_order(seller, tokens, num_buyers)).await.expect("Error creating sell order")
}

pub fn tokens(n: i64) -> TokenAmount {
    TokenAmount::from_tokens(n)
}
