use chrono::{DateTime, Utc};
use log::{debug, trace};
use p2p_common::{FiatAmount, TokenAmount};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{BuyOrder, OrderId, TransactionStatus},
    order_objects::BuyOrderQueryFilter,
    traits::ExchangeError,
};

/// The terms of a buy order, as fixed at match time.
#[derive(Debug, Clone)]
pub struct BuyOrderTerms {
    pub order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer_id: String,
    pub amount: TokenAmount,
    pub price: FiatAmount,
    pub rate: FiatAmount,
    pub payment_country: String,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_buy_order(terms: BuyOrderTerms, conn: &mut SqliteConnection) -> Result<BuyOrder, ExchangeError> {
    let order_id = terms.order_id.clone();
    let order: BuyOrder = sqlx::query_as(
        r#"
            INSERT INTO buy_orders (
                order_id,
                sell_order_id,
                buyer_id,
                amount,
                price,
                rate,
                payment_country,
                status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $8)
            RETURNING *;
        "#,
    )
    .bind(terms.order_id.as_str())
    .bind(terms.sell_order_id.as_str())
    .bind(terms.buyer_id)
    .bind(terms.amount.value())
    .bind(terms.price.value())
    .bind(terms.rate.value())
    .bind(terms.payment_country)
    .bind(terms.created_at)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            ExchangeError::ConcurrentModification(format!("Buy order id {order_id} was generated twice"))
        },
        e => ExchangeError::from(e),
    })?;
    debug!("🗃️ Buy order {} inserted against sell order {}", order.order_id, order.sell_order_id);
    Ok(order)
}

pub async fn fetch_buy_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<BuyOrder>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM buy_orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await
}

/// Fetches buy orders according to the criteria in the `BuyOrderQueryFilter`, oldest first.
pub async fn search_buy_orders(
    query: BuyOrderQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<BuyOrder>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM buy_orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(buyer_id) = query.buyer_id {
        where_clause.push("buyer_id = ");
        where_clause.push_bind_unseparated(buyer_id);
    }
    if let Some(sell_order_id) = query.sell_order_id {
        where_clause.push("sell_order_id = ");
        where_clause.push_bind_unseparated(sell_order_id.0);
    }
    if let Some(statuses) = query.status.filter(|s| !s.is_empty()) {
        where_clause.push("status IN (");
        for (i, status) in statuses.iter().enumerate() {
            if i > 0 {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(status.to_string());
        }
        where_clause.push_unseparated(")");
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC");
    trace!("🗃️ Executing query: {}", builder.sql());
    builder.build_query_as().fetch_all(conn).await
}

/// A buy order's status follows its transaction, so this is only called alongside a transaction status change.
pub async fn update_buy_order_status(
    order_id: &OrderId,
    status: TransactionStatus,
    conn: &mut SqliteConnection,
) -> Result<(), ExchangeError> {
    let result = sqlx::query("UPDATE buy_orders SET status = $1, updated_at = $2 WHERE order_id = $3")
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(order_id.as_str())
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ExchangeError::OrderNotFound(order_id.clone()));
    }
    trace!("🗃️ Buy order {order_id} is now {status}");
    Ok(())
}

pub async fn delete_buy_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM buy_orders WHERE order_id = $1").bind(order_id.as_str()).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}
