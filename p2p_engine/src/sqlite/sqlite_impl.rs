//! `SqliteDatabase` is a concrete implementation of an exchange engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module. Every state transition runs in a single SQLite transaction: the transaction status change comes first,
//! then the sell order's fill list, then its cached counters.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{migrate, SqlitePool};

use super::db::{
    buy_orders::{self, BuyOrderTerms},
    db_url,
    new_pool,
    referrals,
    sell_orders,
    transactions::{self, NewTransaction},
    users,
};
use crate::{
    db_types::{
        BuyOrder,
        CommissionCredit,
        NewMatch,
        NewSellOrder,
        NewUser,
        OrderId,
        SellOrder,
        SellOrderStatus,
        SubOrder,
        Transaction,
        TransactionId,
        TransactionStatus,
        User,
    },
    order_objects::{BuyOrderQueryFilter, ModifySellOrderRequest, SellOrderQueryFilter},
    traits::{ExchangeDatabase, ExchangeError, MatchedOrder, ReconcileResult, UserManagement},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl ExchangeDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_sell_order(&self, order: NewSellOrder) -> Result<SellOrder, ExchangeError> {
        let mut conn = self.pool.acquire().await?;
        let order = sell_orders::insert_sell_order(order, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_sell_order(&self, order_id: &OrderId) -> Result<Option<SellOrder>, ExchangeError> {
        let mut conn = self.pool.acquire().await?;
        let order = sell_orders::fetch_sell_order(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_buy_order(&self, order_id: &OrderId) -> Result<Option<BuyOrder>, ExchangeError> {
        let mut conn = self.pool.acquire().await?;
        let order = buy_orders::fetch_buy_order(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn search_sell_orders(&self, query: SellOrderQueryFilter) -> Result<Vec<SellOrder>, ExchangeError> {
        let mut conn = self.pool.acquire().await?;
        let orders = sell_orders::search_sell_orders(query, &mut conn).await?;
        Ok(orders)
    }

    async fn search_buy_orders(&self, query: BuyOrderQueryFilter) -> Result<Vec<BuyOrder>, ExchangeError> {
        let mut conn = self.pool.acquire().await?;
        let orders = buy_orders::search_buy_orders(query, &mut conn).await?;
        Ok(orders)
    }

    async fn insert_match(&self, fill: NewMatch) -> Result<MatchedOrder, ExchangeError> {
        let mut tx = self.pool.begin().await?;
        if sell_orders::lock_sell_order(&fill.sell_order_id, &mut tx).await?.is_none() {
            return Err(ExchangeError::OrderNotFound(fill.sell_order_id.clone()));
        }
        let sell_order = sell_orders::fetch_sell_order(&fill.sell_order_id, &mut tx)
            .await?
            .ok_or_else(|| ExchangeError::OrderNotFound(fill.sell_order_id.clone()))?;
        if sell_order.seller_id == fill.buyer_id {
            return Err(ExchangeError::InvalidOrder(format!(
                "{} cannot buy from their own sell order {}",
                fill.buyer_id, sell_order.order_id
            )));
        }
        let rate = sell_order.rate_for(&fill.payment_country).ok_or_else(|| {
            ExchangeError::InvalidRateMapping(format!(
                "Sell order {} has no price for {}",
                sell_order.order_id, fill.payment_country
            ))
        })?;
        let unconfirmed = transactions::fetch_transactions_for_sell_order(
            &sell_order.order_id,
            Some(TransactionStatus::Pending),
            &mut tx,
        )
        .await?;
        sell_order.check_capacity(fill.amount, &unconfirmed)?;
        let total_price = fill.amount.total_at(rate);
        let terms = BuyOrderTerms {
            order_id: OrderId::new_buy(),
            sell_order_id: sell_order.order_id.clone(),
            buyer_id: fill.buyer_id.clone(),
            amount: fill.amount,
            price: total_price,
            rate,
            payment_country: fill.payment_country.to_ascii_uppercase(),
            created_at: fill.created_at,
        };
        let buy_order = buy_orders::insert_buy_order(terms, &mut tx).await?;
        let new_tx = NewTransaction {
            transaction_id: TransactionId::new_random(),
            buy_order_id: buy_order.order_id.clone(),
            sell_order_id: sell_order.order_id.clone(),
            buyer_id: fill.buyer_id,
            seller_id: sell_order.seller_id.clone(),
            amount: fill.amount,
            price: rate,
            total_price,
            currency: sell_order.currency.clone(),
            chain: sell_order.chain.clone(),
            fees: fill.fees,
            created_at: fill.created_at,
        };
        let transaction = transactions::insert_transaction(new_tx, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Matched {} on sell order {} (v{}) as {} / {}",
            transaction.amount, sell_order.order_id, sell_order.version, buy_order.order_id, transaction.transaction_id
        );
        Ok(MatchedOrder { sell_order, buy_order, transaction })
    }

    async fn fetch_transaction(&self, tx_id: &TransactionId) -> Result<Option<Transaction>, ExchangeError> {
        let mut conn = self.pool.acquire().await?;
        let tx = transactions::fetch_transaction(tx_id, &mut conn).await?;
        Ok(tx)
    }

    async fn fetch_transactions_for_user(&self, user_id: &str) -> Result<Vec<Transaction>, ExchangeError> {
        let mut conn = self.pool.acquire().await?;
        let txs = transactions::fetch_transactions_for_user(user_id, &mut conn).await?;
        Ok(txs)
    }

    async fn record_buyer_confirmation(
        &self,
        tx_id: &TransactionId,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<Transaction>, ExchangeError> {
        let mut tx = self.pool.begin().await?;
        let Some(transaction) = transactions::mark_buyer_confirmed(tx_id, cutoff, &mut tx).await? else {
            return Ok(None);
        };
        buy_orders::update_buy_order_status(&transaction.buy_order_id, TransactionStatus::Matching, &mut tx).await?;
        let fill = SubOrder::for_transaction(&transaction, TransactionStatus::Matching, Utc::now());
        sell_orders::upsert_sub_order(&fill, &mut tx).await?;
        sell_orders::recompute_sell_order(&transaction.sell_order_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Buyer confirmation recorded for {tx_id}. Fill added to {}", transaction.sell_order_id);
        Ok(Some(transaction))
    }

    async fn claim_payout(
        &self,
        tx_id: &TransactionId,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<Transaction>, ExchangeError> {
        let mut conn = self.pool.acquire().await?;
        let claimed = transactions::claim_payout(tx_id, cutoff, &mut conn).await?;
        Ok(claimed)
    }

    async fn release_payout_claim(&self, tx_id: &TransactionId) -> Result<(), ExchangeError> {
        let mut conn = self.pool.acquire().await?;
        if !transactions::release_payout_claim(tx_id, &mut conn).await? {
            warn!("🗃️ Tried to release the payout claim on {tx_id}, but there was no claim to release");
        }
        Ok(())
    }

    async fn complete_transaction(
        &self,
        tx_id: &TransactionId,
        payout_reference: &str,
    ) -> Result<Option<Transaction>, ExchangeError> {
        let mut tx = self.pool.begin().await?;
        let Some(transaction) = transactions::mark_completed(tx_id, payout_reference, &mut tx).await? else {
            return Ok(None);
        };
        buy_orders::update_buy_order_status(&transaction.buy_order_id, TransactionStatus::Completed, &mut tx).await?;
        set_fill_status(&transaction, TransactionStatus::Completed, &mut tx).await?;
        let sell_order = sell_orders::recompute_sell_order(&transaction.sell_order_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Transaction {tx_id} completed. Sell order {} is {}", sell_order.order_id, sell_order.status);
        Ok(Some(transaction))
    }

    async fn annul_transaction(
        &self,
        tx_id: &TransactionId,
        from: &[TransactionStatus],
    ) -> Result<Option<Transaction>, ExchangeError> {
        let mut tx = self.pool.begin().await?;
        let Some(transaction) = transactions::mark_canceled(tx_id, from, &mut tx).await? else {
            return Ok(None);
        };
        buy_orders::update_buy_order_status(&transaction.buy_order_id, TransactionStatus::Canceled, &mut tx).await?;
        if transaction.is_tracked() {
            set_fill_status(&transaction, TransactionStatus::Canceled, &mut tx).await?;
        }
        let sell_order = sell_orders::recompute_sell_order(&transaction.sell_order_id, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Transaction {tx_id} canceled. Sell order {} has {} left for {} buyers",
            sell_order.order_id, sell_order.remaining_balance, sell_order.remaining_buyers
        );
        Ok(Some(transaction))
    }

    async fn fetch_stale_transactions(
        &self,
        pending_cutoff: DateTime<Utc>,
        matching_cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, ExchangeError> {
        let mut conn = self.pool.acquire().await?;
        let txs = transactions::fetch_stale_transactions(pending_cutoff, matching_cutoff, &mut conn).await?;
        Ok(txs)
    }

    async fn reconcile_sell_order(&self, order_id: &OrderId) -> Result<ReconcileResult, ExchangeError> {
        let mut tx = self.pool.begin().await?;
        if sell_orders::lock_sell_order(order_id, &mut tx).await?.is_none() {
            return Err(ExchangeError::OrderNotFound(order_id.clone()));
        }
        let order = sell_orders::fetch_sell_order(order_id, &mut tx)
            .await?
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.clone()))?;
        let txs = transactions::fetch_transactions_for_sell_order(order_id, None, &mut tx).await?;
        let now = Utc::now();
        let mut repaired = 0;
        for t in txs.iter().filter(|t| t.is_tracked()) {
            let existing = order.sub_orders.iter().find(|f| f.id == t.transaction_id);
            if existing.map(|f| f.status == t.status).unwrap_or(false) {
                continue;
            }
            let mut fill = SubOrder::for_transaction(t, t.status, now);
            fill.created_at = existing.map(|f| f.created_at).unwrap_or(t.updated_at);
            sell_orders::upsert_sub_order(&fill, &mut tx).await?;
            info!("🗃️ Reconciled fill {} on sell order {order_id} to {}", fill.id, fill.status);
            repaired += 1;
        }
        let sell_order = sell_orders::recompute_sell_order(order_id, &mut tx).await?;
        tx.commit().await?;
        Ok(ReconcileResult { sell_order, repaired })
    }

    async fn fetch_divergent_sell_orders(&self) -> Result<Vec<OrderId>, ExchangeError> {
        let mut conn = self.pool.acquire().await?;
        let ids = sell_orders::fetch_divergent_sell_orders(&mut conn).await?;
        Ok(ids)
    }

    async fn modify_sell_order(
        &self,
        order_id: &OrderId,
        update: ModifySellOrderRequest,
    ) -> Result<SellOrder, ExchangeError> {
        let mut tx = self.pool.begin().await?;
        let mut order = sell_orders::fetch_sell_order(order_id, &mut tx)
            .await?
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.clone()))?;
        if let Some(expected) = update.expected_version {
            if expected != order.version {
                return Err(ExchangeError::ConcurrentModification(format!(
                    "Sell order {order_id} is at version {}, not {expected}",
                    order.version
                )));
            }
        }
        order.version = sell_orders::claim_version(order_id, order.version, &mut tx).await?;
        if let Some(min) = update.new_min_buy_amount {
            if !min.is_positive() || min > order.amount {
                return Err(ExchangeError::InvalidOrder(format!(
                    "The minimum buy amount {min} must be positive and no more than {}",
                    order.amount
                )));
            }
            order.min_buy_amount = min;
        }
        match update.new_status {
            Some(SellOrderStatus::Completed) if order.has_live_fills() => {
                return Err(ExchangeError::ForbiddenUpdate(format!(
                    "Sell order {order_id} cannot be closed while fills are in progress"
                )));
            },
            Some(SellOrderStatus::Completed) => order.status = SellOrderStatus::Completed,
            Some(status) if order.status == SellOrderStatus::Completed => {
                return Err(ExchangeError::ForbiddenUpdate(format!(
                    "Sell order {order_id} is closed and cannot be set to {status}"
                )));
            },
            Some(status) if status != order.derive_status() => {
                return Err(ExchangeError::ForbiddenUpdate(format!(
                    "The status of sell order {order_id} follows its fills and cannot be set to {status}"
                )));
            },
            _ => {},
        }
        order.recalculate();
        let order = sell_orders::save_sell_order(&order, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Sell order {order_id} updated. Status: {}. Min buy: {}", order.status, order.min_buy_amount);
        Ok(order)
    }

    async fn delete_sell_order(&self, order_id: &OrderId) -> Result<SellOrder, ExchangeError> {
        let mut tx = self.pool.begin().await?;
        let order = sell_orders::fetch_sell_order(order_id, &mut tx)
            .await?
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.clone()))?;
        let txs = transactions::fetch_transactions_for_sell_order(order_id, None, &mut tx).await?;
        if order.has_live_fills() || txs.iter().any(|t| !t.is_terminal()) {
            return Err(ExchangeError::OrderInUse(order_id.clone()));
        }
        sell_orders::delete_sell_order(order_id, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Sell order {order_id} deleted");
        Ok(order)
    }

    async fn delete_buy_order(&self, order_id: &OrderId) -> Result<BuyOrder, ExchangeError> {
        let mut tx = self.pool.begin().await?;
        let order = buy_orders::fetch_buy_order(order_id, &mut tx)
            .await?
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.clone()))?;
        let transaction = transactions::fetch_transaction_for_buy_order(order_id, &mut tx).await?;
        if transaction.map(|t| !t.is_terminal()).unwrap_or(false) {
            return Err(ExchangeError::OrderInUse(order_id.clone()));
        }
        buy_orders::delete_buy_order(order_id, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Buy order {order_id} deleted");
        Ok(order)
    }

    async fn credit_commission(&self, credit: CommissionCredit) -> Result<bool, ExchangeError> {
        let mut tx = self.pool.begin().await?;
        if !referrals::record_credit(&credit, &mut tx).await? {
            trace!("🗃️🤝️ The {} referrer on {} has already been credited", credit.side, credit.transaction_id);
            return Ok(false);
        }
        referrals::add_referral_earnings(&credit, &mut tx).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn close(&mut self) -> Result<(), ExchangeError> {
        self.pool.close().await;
        Ok(())
    }
}

impl UserManagement for SqliteDatabase {
    async fn register_user(&self, user: NewUser) -> Result<User, ExchangeError> {
        let mut tx = self.pool.begin().await?;
        if let Some(parent) = &user.parent_ref {
            let referrer = users::fetch_user_by_referral_code(parent, &mut tx)
                .await?
                .ok_or_else(|| ExchangeError::InvalidReferral(format!("Referral code {parent} does not exist")))?;
            if referrer.wallet_address == user.wallet_address {
                return Err(ExchangeError::InvalidReferral("A user cannot refer themselves".into()));
            }
        }
        let user = users::insert_user(user, &mut tx).await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn fetch_user_by_wallet(&self, wallet_address: &str) -> Result<Option<User>, ExchangeError> {
        let mut conn = self.pool.acquire().await?;
        let user = users::fetch_user_by_wallet(wallet_address, &mut conn).await?;
        Ok(user)
    }

    async fn fetch_user_by_referral_code(&self, referral_code: &str) -> Result<Option<User>, ExchangeError> {
        let mut conn = self.pool.acquire().await?;
        let user = users::fetch_user_by_referral_code(referral_code, &mut conn).await?;
        Ok(user)
    }
}

/// Moves the transaction's fill entry to `status`, recreating the entry if it has gone missing.
async fn set_fill_status(
    transaction: &Transaction,
    status: TransactionStatus,
    conn: &mut sqlx::SqliteConnection,
) -> Result<(), ExchangeError> {
    if !sell_orders::update_sub_order_status(&transaction.transaction_id, status, &mut *conn).await? {
        warn!("🗃️ Fill entry for {} was missing. Recreating it as {status}", transaction.transaction_id);
        let fill = SubOrder::for_transaction(transaction, status, Utc::now());
        sell_orders::upsert_sub_order(&fill, conn).await?;
    }
    Ok(())
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
