use std::collections::HashMap;

use cucumber::World;
use log::*;
use p2p_common::TokenAmount;
use p2p_engine::{
    db_types::{OrderId, TransactionId},
    events::EventProducers,
    test_utils::prepare_env::{create_database, random_db_path, run_migrations},
    ExchangeError,
    MatchingApi,
    SettlementApi,
    SimulatedPaymentRail,
    SqliteDatabase,
    UsersApi,
};

#[derive(Default, Debug, World)]
pub struct ExchangeWorld {
    pub system: Option<ExchangeSystem>,
    /// Sell orders, by the alias used in the scenario
    pub orders: HashMap<String, OrderId>,
    /// Transactions, by the alias used in the scenario
    pub trades: HashMap<String, TransactionId>,
    pub last_error: Option<ExchangeError>,
}

#[derive(Debug)]
pub struct ExchangeSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub rail: SimulatedPaymentRail,
    pub matching: MatchingApi<SqliteDatabase>,
    pub settlement: SettlementApi<SqliteDatabase, SimulatedPaymentRail>,
    pub users: UsersApi<SqliteDatabase>,
}

impl ExchangeWorld {
    pub fn system(&self) -> &ExchangeSystem {
        self.system.as_ref().expect("Exchange not initialised")
    }

    pub fn order(&self, alias: &str) -> OrderId {
        self.orders.get(alias).cloned().unwrap_or_else(|| panic!("Unknown order {alias}"))
    }

    pub fn trade(&self, alias: &str) -> TransactionId {
        self.trades.get(alias).cloned().unwrap_or_else(|| panic!("Unknown trade {alias}"))
    }
}

impl ExchangeSystem {
    pub async fn new(expiry_window: chrono::Duration, settlement_window: chrono::Duration) -> Self {
        let url = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        let rail = SimulatedPaymentRail::new("USDT", TokenAmount::from_tokens(1_000_000));
        let producers = EventProducers::default();
        Self {
            db_path: url,
            matching: MatchingApi::new(db.clone(), producers.clone()),
            settlement: SettlementApi::new(db.clone(), rail.clone(), producers)
                .with_expiry_window(expiry_window)
                .with_settlement_window(settlement_window),
            users: UsersApi::new(db.clone()),
            rail,
            db,
        }
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
