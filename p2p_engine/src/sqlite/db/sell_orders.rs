use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::{debug, trace};
use p2p_common::{FiatAmount, TokenAmount};
use sqlx::{types::Json, FromRow, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewSellOrder, OrderId, SellOrder, SellOrderStatus, SubOrder, TransactionId, TransactionStatus},
    order_objects::SellOrderQueryFilter,
    traits::ExchangeError,
};

#[derive(Debug, Clone, FromRow)]
struct SellOrderRow {
    id: i64,
    order_id: OrderId,
    seller_id: String,
    amount: TokenAmount,
    currency: String,
    chain: String,
    country_codes: Json<Vec<String>>,
    rates: Json<BTreeMap<String, FiatAmount>>,
    num_buyers: i64,
    min_buy_amount: TokenAmount,
    remaining_balance: TokenAmount,
    remaining_buyers: i64,
    status: SellOrderStatus,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SellOrderRow {
    fn with_fills(self, sub_orders: Vec<SubOrder>) -> SellOrder {
        SellOrder {
            id: self.id,
            order_id: self.order_id,
            seller_id: self.seller_id,
            amount: self.amount,
            currency: self.currency,
            chain: self.chain,
            country_codes: self.country_codes.0,
            rates: self.rates.0,
            num_buyers: self.num_buyers,
            min_buy_amount: self.min_buy_amount,
            sub_orders,
            remaining_balance: self.remaining_balance,
            remaining_buyers: self.remaining_buyers,
            status: self.status,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Inserts a new sell order. The caller is expected to have validated and normalised the order.
pub async fn insert_sell_order(order: NewSellOrder, conn: &mut SqliteConnection) -> Result<SellOrder, ExchangeError> {
    let order_id = OrderId::new_sell();
    let now = Utc::now();
    let row: SellOrderRow = sqlx::query_as(
        r#"
            INSERT INTO sell_orders (
                order_id,
                seller_id,
                amount,
                currency,
                chain,
                country_codes,
                rates,
                num_buyers,
                min_buy_amount,
                remaining_balance,
                remaining_buyers,
                status,
                version,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'active', 0, $12, $12)
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(order.seller_id)
    .bind(order.amount.value())
    .bind(order.currency)
    .bind(order.chain)
    .bind(Json(order.country_codes))
    .bind(Json(order.rates))
    .bind(order.num_buyers)
    .bind(order.min_buy_amount.value())
    .bind(order.amount.value())
    .bind(order.num_buyers)
    .bind(now)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            ExchangeError::ConcurrentModification(format!("Sell order id {order_id} was generated twice"))
        },
        e => ExchangeError::from(e),
    })?;
    debug!("🗃️ Sell order {} inserted with id {}", row.order_id, row.id);
    Ok(row.with_fills(Vec::new()))
}

/// Fetches the sell order along with its fill list, ordered by creation time.
pub async fn fetch_sell_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<SellOrder>, sqlx::Error> {
    let row: Option<SellOrderRow> = sqlx::query_as("SELECT * FROM sell_orders WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => {
            let fills = fetch_sub_orders(order_id, conn).await?;
            Ok(Some(row.with_fills(fills)))
        },
        None => Ok(None),
    }
}

pub async fn fetch_sub_orders(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Vec<SubOrder>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM sub_orders WHERE sell_order_id = $1 ORDER BY created_at, rowid")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await
}

/// Fetches sell orders according to the criteria in the `SellOrderQueryFilter`.
///
/// Results are ordered by `created_at` in ascending order.
pub async fn search_sell_orders(
    query: SellOrderQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<SellOrder>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM sell_orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(seller_id) = query.seller_id {
        where_clause.push("seller_id = ");
        where_clause.push_bind_unseparated(seller_id);
    }
    if let Some(currency) = query.currency {
        where_clause.push("currency = ");
        where_clause.push_bind_unseparated(currency);
    }
    if let Some(chain) = query.chain {
        where_clause.push("chain = ");
        where_clause.push_bind_unseparated(chain);
    }
    if let Some(code) = query.country_code {
        where_clause.push("EXISTS (SELECT 1 FROM json_each(country_codes) WHERE value = ");
        where_clause.push_bind_unseparated(code);
        where_clause.push_unseparated(")");
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
    let rows: Vec<SellOrderRow> = builder.build_query_as().fetch_all(&mut *conn).await?;
    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        let fills = fetch_sub_orders(&row.order_id, &mut *conn).await?;
        orders.push(row.with_fills(fills));
    }
    Ok(orders)
}

/// Takes ownership of the sell order for the current database transaction by bumping its version.
///
/// The update only applies if the version is still `expected_version`. Any other writer that read the same version
/// will then fail its own claim and must start over.
pub async fn claim_version(
    order_id: &OrderId,
    expected_version: i64,
    conn: &mut SqliteConnection,
) -> Result<i64, ExchangeError> {
    let version: Option<i64> = sqlx::query_scalar(
        "UPDATE sell_orders SET version = version + 1 WHERE order_id = $1 AND version = $2 RETURNING version",
    )
    .bind(order_id.as_str())
    .bind(expected_version)
    .fetch_optional(conn)
    .await?;
    version.ok_or_else(|| {
        ExchangeError::ConcurrentModification(format!(
            "Sell order {order_id} is no longer at version {expected_version}"
        ))
    })
}

/// Bumps the version unconditionally and returns the new one, or `None` if the order does not exist.
///
/// Run as the first statement of a database transaction, this takes the write lock up front, so the order cannot
/// change under the caller between this call and the commit.
pub async fn lock_sell_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar("UPDATE sell_orders SET version = version + 1 WHERE order_id = $1 RETURNING version")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await
}

/// Inserts the fill entry, or updates the status of the entry that is already there.
pub async fn upsert_sub_order(fill: &SubOrder, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO sub_orders (id, sell_order_id, buyer_id, amount, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at
        "#,
    )
    .bind(fill.id.as_str())
    .bind(fill.sell_order_id.as_str())
    .bind(&fill.buyer_id)
    .bind(fill.amount.value())
    .bind(fill.status.to_string())
    .bind(fill.created_at)
    .bind(fill.updated_at)
    .execute(conn)
    .await?;
    trace!("🗃️ Fill {} on sell order {} is now {}", fill.id, fill.sell_order_id, fill.status);
    Ok(())
}

/// Sets the status of an existing fill entry. Returns `false` if there is no entry for the transaction.
pub async fn update_sub_order_status(
    id: &TransactionId,
    status: TransactionStatus,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE sub_orders SET status = $1, updated_at = $2 WHERE id = $3")
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(id.as_str())
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Writes the mutable fields of the sell order: status, minimum buy amount and the cached counters.
///
/// The caller must hold the version claim for the order (see [`claim_version`]). The version is not changed here.
pub async fn save_sell_order(order: &SellOrder, conn: &mut SqliteConnection) -> Result<SellOrder, ExchangeError> {
    let row: Option<SellOrderRow> = sqlx::query_as(
        r#"
            UPDATE sell_orders SET
                status = $1,
                min_buy_amount = $2,
                remaining_balance = $3,
                remaining_buyers = $4,
                updated_at = $5
            WHERE order_id = $6
            RETURNING *;
        "#,
    )
    .bind(order.status.to_string())
    .bind(order.min_buy_amount.value())
    .bind(order.remaining_balance.value())
    .bind(order.remaining_buyers)
    .bind(Utc::now())
    .bind(order.order_id.as_str())
    .fetch_optional(conn)
    .await?;
    let row = row.ok_or_else(|| ExchangeError::OrderNotFound(order.order_id.clone()))?;
    Ok(row.with_fills(order.sub_orders.clone()))
}

/// Re-derives the cached counters and the status of the sell order from its fill list, and saves them.
///
/// This is the single place where `remaining_balance`, `remaining_buyers` and `status` are written after creation.
pub async fn recompute_sell_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<SellOrder, ExchangeError> {
    let mut order =
        fetch_sell_order(order_id, &mut *conn).await?.ok_or_else(|| ExchangeError::OrderNotFound(order_id.clone()))?;
    order.version = claim_version(order_id, order.version, &mut *conn).await?;
    let old_status = order.status;
    order.recalculate();
    let order = save_sell_order(&order, conn).await?;
    trace!(
        "🗃️ Sell order {order_id} recomputed: {} left, {} buyer slots, {old_status} -> {}",
        order.remaining_balance,
        order.remaining_buyers,
        order.status
    );
    Ok(order)
}

/// Deletes the sell order. Its fill entries are removed by the cascade.
pub async fn delete_sell_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sell_orders WHERE order_id = $1").bind(order_id.as_str()).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Lists sell orders whose fill list or cached counters disagree with their transactions.
///
/// A sell order diverges when
/// * a buyer-confirmed transaction has no fill entry, or
/// * a fill entry's status differs from its transaction's, or
/// * the cached counters do not match the fill list.
pub async fn fetch_divergent_sell_orders(conn: &mut SqliteConnection) -> Result<Vec<OrderId>, sqlx::Error> {
    let ids: Vec<OrderId> = sqlx::query_scalar(
        r#"
            SELECT DISTINCT t.sell_order_id FROM transactions t
                JOIN sell_orders s ON s.order_id = t.sell_order_id
                LEFT JOIN sub_orders f ON f.id = t.transaction_id
            WHERE (f.id IS NULL AND t.buyer_payment_confirmed) OR (f.id IS NOT NULL AND f.status <> t.status)
            UNION
            SELECT s.order_id FROM sell_orders s
            WHERE s.remaining_balance <> s.amount - COALESCE(
                    (SELECT SUM(f.amount) FROM sub_orders f WHERE f.sell_order_id = s.order_id AND f.status <> 'canceled'),
                    0)
               OR s.remaining_buyers <> s.num_buyers - (
                    SELECT COUNT(*) FROM sub_orders f WHERE f.sell_order_id = s.order_id AND f.status <> 'canceled')
        "#,
    )
    .fetch_all(conn)
    .await?;
    Ok(ids)
}
