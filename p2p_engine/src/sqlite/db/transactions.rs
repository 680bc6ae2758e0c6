use chrono::{DateTime, Utc};
use log::{debug, trace};
use p2p_common::{FiatAmount, TokenAmount};
use sqlx::{FromRow, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{CommissionFees, OrderId, PayoutState, Transaction, TransactionId, TransactionStatus},
    traits::ExchangeError,
};

#[derive(Debug, Clone, FromRow)]
struct TransactionRow {
    id: i64,
    transaction_id: TransactionId,
    buy_order_id: OrderId,
    sell_order_id: OrderId,
    buyer_id: String,
    seller_id: String,
    amount: TokenAmount,
    price: FiatAmount,
    total_price: FiatAmount,
    currency: String,
    chain: String,
    buyer_payment_confirmed: bool,
    seller_payment_confirmed: bool,
    status: TransactionStatus,
    buyer_referrer_commission: TokenAmount,
    seller_referrer_commission: TokenAmount,
    payout_state: PayoutState,
    payout_reference: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        Self {
            id: row.id,
            transaction_id: row.transaction_id,
            buy_order_id: row.buy_order_id,
            sell_order_id: row.sell_order_id,
            buyer_id: row.buyer_id,
            seller_id: row.seller_id,
            amount: row.amount,
            price: row.price,
            total_price: row.total_price,
            currency: row.currency,
            chain: row.chain,
            buyer_payment_confirmed: row.buyer_payment_confirmed,
            seller_payment_confirmed: row.seller_payment_confirmed,
            status: row.status,
            fees: CommissionFees {
                buyer_referrer_commission: row.buyer_referrer_commission,
                seller_referrer_commission: row.seller_referrer_commission,
            },
            payout_state: row.payout_state,
            payout_reference: row.payout_reference,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// The fields of a new transaction that the caller decides. Everything else starts at its default.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub transaction_id: TransactionId,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer_id: String,
    pub seller_id: String,
    pub amount: TokenAmount,
    pub price: FiatAmount,
    pub total_price: FiatAmount,
    pub currency: String,
    pub chain: String,
    pub fees: CommissionFees,
    pub created_at: DateTime<Utc>,
}

/// Inserts a new `pending` transaction.
pub async fn insert_transaction(tx: NewTransaction, conn: &mut SqliteConnection) -> Result<Transaction, ExchangeError> {
    let txid = tx.transaction_id.clone();
    let row: TransactionRow = sqlx::query_as(
        r#"
            INSERT INTO transactions (
                transaction_id,
                buy_order_id,
                sell_order_id,
                buyer_id,
                seller_id,
                amount,
                price,
                total_price,
                currency,
                chain,
                buyer_referrer_commission,
                seller_referrer_commission,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            RETURNING *;
        "#,
    )
    .bind(tx.transaction_id.as_str())
    .bind(tx.buy_order_id.as_str())
    .bind(tx.sell_order_id.as_str())
    .bind(tx.buyer_id)
    .bind(tx.seller_id)
    .bind(tx.amount.value())
    .bind(tx.price.value())
    .bind(tx.total_price.value())
    .bind(tx.currency)
    .bind(tx.chain)
    .bind(tx.fees.buyer_referrer_commission.value())
    .bind(tx.fees.seller_referrer_commission.value())
    .bind(tx.created_at)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            ExchangeError::ConcurrentModification(format!("Transaction id {txid} was generated twice"))
        },
        e => ExchangeError::from(e),
    })?;
    debug!("🗃️ Transaction {} for {} created on sell order {}", row.transaction_id, row.amount, row.sell_order_id);
    Ok(row.into())
}

pub async fn fetch_transaction(
    tx_id: &TransactionId,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let row: Option<TransactionRow> = sqlx::query_as("SELECT * FROM transactions WHERE transaction_id = $1")
        .bind(tx_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(row.map(Transaction::from))
}

pub async fn fetch_transaction_for_buy_order(
    buy_order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let row: Option<TransactionRow> = sqlx::query_as("SELECT * FROM transactions WHERE buy_order_id = $1")
        .bind(buy_order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(row.map(Transaction::from))
}

/// Fetches the transactions against a sell order, optionally only those with the given status, oldest first.
pub async fn fetch_transactions_for_sell_order(
    sell_order_id: &OrderId,
    status: Option<TransactionStatus>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM transactions WHERE sell_order_id = ");
    builder.push_bind(sell_order_id.as_str());
    if let Some(status) = status {
        builder.push(" AND status = ");
        builder.push_bind(status.to_string());
    }
    builder.push(" ORDER BY created_at ASC");
    let rows: Vec<TransactionRow> = builder.build_query_as().fetch_all(conn).await?;
    Ok(rows.into_iter().map(Transaction::from).collect())
}

/// Fetches every transaction in which the user is the buyer or the seller, newest first.
pub async fn fetch_transactions_for_user(
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let rows: Vec<TransactionRow> =
        sqlx::query_as("SELECT * FROM transactions WHERE buyer_id = $1 OR seller_id = $1 ORDER BY created_at DESC")
            .bind(user_id)
            .fetch_all(conn)
            .await?;
    Ok(rows.into_iter().map(Transaction::from).collect())
}

/// Fetches the transactions that have outlived their window, oldest first.
///
/// `pending` transactions are stale once they were created before `pending_cutoff`. Buyer-confirmed `matching`
/// transactions with no payout in flight are stale once they were created before `matching_cutoff`.
pub async fn fetch_stale_transactions(
    pending_cutoff: DateTime<Utc>,
    matching_cutoff: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let rows: Vec<TransactionRow> = sqlx::query_as(
        r#"
            SELECT * FROM transactions
            WHERE (status = 'pending' AND created_at <= $1)
               OR (status = 'matching' AND payout_state = 'idle' AND created_at <= $2)
            ORDER BY created_at ASC
        "#,
    )
    .bind(pending_cutoff)
    .bind(matching_cutoff)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(Transaction::from).collect())
}

/// Marks the buyer's payment as confirmed. Only applies to `pending` transactions created after `cutoff`.
pub async fn mark_buyer_confirmed(
    tx_id: &TransactionId,
    cutoff: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let row: Option<TransactionRow> = sqlx::query_as(
        r#"
            UPDATE transactions SET buyer_payment_confirmed = TRUE, status = 'matching', updated_at = $1
            WHERE transaction_id = $2 AND status = 'pending' AND created_at > $3
            RETURNING *;
        "#,
    )
    .bind(Utc::now())
    .bind(tx_id.as_str())
    .bind(cutoff)
    .fetch_optional(conn)
    .await?;
    trace!("🗃️ Buyer confirmation on {tx_id} applied: {}", row.is_some());
    Ok(row.map(Transaction::from))
}

/// Moves `payout_state` from `idle` to `in_flight` on a `matching`, buyer-confirmed transaction that was created
/// after `cutoff`.
pub async fn claim_payout(
    tx_id: &TransactionId,
    cutoff: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let row: Option<TransactionRow> = sqlx::query_as(
        r#"
            UPDATE transactions SET payout_state = 'in_flight', updated_at = $1
            WHERE transaction_id = $2
              AND status = 'matching'
              AND buyer_payment_confirmed
              AND payout_state = 'idle'
              AND created_at > $3
            RETURNING *;
        "#,
    )
    .bind(Utc::now())
    .bind(tx_id.as_str())
    .bind(cutoff)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(Transaction::from))
}

/// Hands an in-flight payout claim back. Returns `false` if there was no claim to release.
pub async fn release_payout_claim(tx_id: &TransactionId, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE transactions SET payout_state = 'idle', updated_at = $1 WHERE transaction_id = $2 AND payout_state = \
         'in_flight'",
    )
    .bind(Utc::now())
    .bind(tx_id.as_str())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Records the seller's confirmation and the payout reference, and completes the transaction.
/// Only applies to `matching` transactions that hold an in-flight payout claim.
pub async fn mark_completed(
    tx_id: &TransactionId,
    payout_reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let row: Option<TransactionRow> = sqlx::query_as(
        r#"
            UPDATE transactions SET
                seller_payment_confirmed = TRUE,
                status = 'completed',
                payout_state = 'released',
                payout_reference = $1,
                updated_at = $2
            WHERE transaction_id = $3 AND status = 'matching' AND payout_state = 'in_flight'
            RETURNING *;
        "#,
    )
    .bind(payout_reference)
    .bind(Utc::now())
    .bind(tx_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(row.map(Transaction::from))
}

/// Cancels the transaction if its status is one of `from` and no payout is in flight.
pub async fn mark_canceled(
    tx_id: &TransactionId,
    from: &[TransactionStatus],
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    if from.is_empty() {
        return Ok(None);
    }
    let mut builder = QueryBuilder::new("UPDATE transactions SET status = 'canceled', updated_at = ");
    builder.push_bind(Utc::now());
    builder.push(" WHERE transaction_id = ");
    builder.push_bind(tx_id.as_str());
    builder.push(" AND payout_state = 'idle' AND status IN (");
    let mut statuses = builder.separated(", ");
    for status in from {
        statuses.push_bind(status.to_string());
    }
    statuses.push_unseparated(") RETURNING *");
    let row: Option<TransactionRow> = builder.build_query_as().fetch_optional(conn).await?;
    Ok(row.map(Transaction::from))
}
