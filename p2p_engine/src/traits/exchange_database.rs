use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{
        BuyOrder,
        CommissionCredit,
        NewMatch,
        NewSellOrder,
        OrderId,
        SellOrder,
        Transaction,
        TransactionId,
        TransactionStatus,
    },
    order_objects::{BuyOrderQueryFilter, ModifySellOrderRequest, SellOrderQueryFilter},
    traits::{
        data_objects::{MatchedOrder, ReconcileResult},
        PaymentRailError,
        UserManagement,
    },
};

/// This trait defines the highest level of behaviour for backends supporting the exchange engine.
///
/// Every method that changes a transaction's status also brings the fill list and the cached counters of the parent
/// sell order up to date, in the same atomic database transaction. Status changes are conditional on the current
/// status, so a transition that lost a race is reported rather than applied twice.
#[allow(async_fn_in_trait)]
pub trait ExchangeDatabase: Clone + UserManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new, validated sell order. The order starts `active`, with all of its capacity available.
    async fn insert_sell_order(&self, order: NewSellOrder) -> Result<SellOrder, ExchangeError>;

    /// Fetches the sell order, including its fill list.
    async fn fetch_sell_order(&self, order_id: &OrderId) -> Result<Option<SellOrder>, ExchangeError>;

    async fn fetch_buy_order(&self, order_id: &OrderId) -> Result<Option<BuyOrder>, ExchangeError>;

    async fn search_sell_orders(&self, query: SellOrderQueryFilter) -> Result<Vec<SellOrder>, ExchangeError>;

    async fn search_buy_orders(&self, query: BuyOrderQueryFilter) -> Result<Vec<BuyOrder>, ExchangeError>;

    /// Creates the buy order and its `pending` transaction against a sell order, in one atomic step.
    ///
    /// The sell order's capacity is checked against its fills *and* against the pending transactions that have not
    /// been confirmed by their buyers yet. The sell order `version` is bumped, so concurrent matches against the same
    /// order are serialised; the loser receives [`ExchangeError::ConcurrentModification`].
    ///
    /// No fill entry is added to the sell order. That happens when the buyer confirms payment.
    async fn insert_match(&self, fill: NewMatch) -> Result<MatchedOrder, ExchangeError>;

    async fn fetch_transaction(&self, tx_id: &TransactionId) -> Result<Option<Transaction>, ExchangeError>;

    /// Fetches every transaction in which the user is either the buyer or the seller, newest first.
    async fn fetch_transactions_for_user(&self, user_id: &str) -> Result<Vec<Transaction>, ExchangeError>;

    /// Records the buyer's payment confirmation on a `pending` transaction that was created after `cutoff`.
    ///
    /// The transaction and its buy order move to `matching`, and a `matching` fill entry is added to the sell order.
    /// Returns `None` if the transaction was not `pending`, or had expired, when the update ran.
    async fn record_buyer_confirmation(
        &self,
        tx_id: &TransactionId,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<Transaction>, ExchangeError>;

    /// Claims the payout for a buyer-confirmed transaction that was created after `cutoff`, moving `payout_state`
    /// from `idle` to `in_flight`.
    ///
    /// Returns `None` if the transaction is not `matching`, has expired, or if the payout has already been claimed.
    async fn claim_payout(
        &self,
        tx_id: &TransactionId,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<Transaction>, ExchangeError>;

    /// Hands a claimed payout back, after the payment rail failed to make the transfer.
    async fn release_payout_claim(&self, tx_id: &TransactionId) -> Result<(), ExchangeError>;

    /// Records the seller's confirmation once the payout has been accepted, and completes the transaction.
    ///
    /// The transaction, buy order and fill entry move to `completed` and the sell order status is re-derived.
    /// Returns `None` if the transaction did not hold an in-flight payout claim.
    async fn complete_transaction(
        &self,
        tx_id: &TransactionId,
        payout_reference: &str,
    ) -> Result<Option<Transaction>, ExchangeError>;

    /// Cancels a transaction whose status is one of `from` and that has no payout in flight.
    ///
    /// The buy order and fill entry (if there is one) are cancelled too, and the sell order's capacity is restored by
    /// recomputing its counters from the fill list. Returns `None` if nothing was changed.
    async fn annul_transaction(
        &self,
        tx_id: &TransactionId,
        from: &[TransactionStatus],
    ) -> Result<Option<Transaction>, ExchangeError>;

    /// Fetches the transactions the reaper should expire: `pending` transactions created at or before
    /// `pending_cutoff`, and `matching` transactions with no payout in flight created at or before `matching_cutoff`.
    async fn fetch_stale_transactions(
        &self,
        pending_cutoff: DateTime<Utc>,
        matching_cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, ExchangeError>;

    /// Brings a sell order's fill list in line with its transactions, and recomputes its counters and status.
    async fn reconcile_sell_order(&self, order_id: &OrderId) -> Result<ReconcileResult, ExchangeError>;

    /// Lists the sell orders whose fill list disagrees with their transactions.
    async fn fetch_divergent_sell_orders(&self) -> Result<Vec<OrderId>, ExchangeError>;

    /// Applies an operator update to a sell order. See [`ModifySellOrderRequest`] for what may be changed.
    async fn modify_sell_order(
        &self,
        order_id: &OrderId,
        update: ModifySellOrderRequest,
    ) -> Result<SellOrder, ExchangeError>;

    /// Deletes a sell order that has no live fills and no pending transactions.
    async fn delete_sell_order(&self, order_id: &OrderId) -> Result<SellOrder, ExchangeError>;

    /// Deletes a buy order whose transaction is terminal.
    async fn delete_buy_order(&self, order_id: &OrderId) -> Result<BuyOrder, ExchangeError>;

    /// Credits a referrer for one side of a completed transaction.
    ///
    /// Each (transaction, side) pair is credited at most once. Returns `false` if it had already been credited.
    async fn credit_commission(&self, credit: CommissionCredit) -> Result<bool, ExchangeError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), ExchangeError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested transaction {0} does not exist")]
    TransactionNotFound(TransactionId),
    #[error("The requested user {0} does not exist")]
    UserNotFound(String),
    #[error("Cannot match the order. {0}")]
    CapacityExceeded(String),
    #[error("Invalid rate mapping. {0}")]
    InvalidRateMapping(String),
    #[error("Invalid order. {0}")]
    InvalidOrder(String),
    #[error("This step is out of order. {0}")]
    OutOfOrder(String),
    #[error("The window for transaction {0} has elapsed")]
    ExpiryWindowElapsed(TransactionId),
    #[error("The payout could not be made. {0}")]
    PaymentRailFailure(#[from] PaymentRailError),
    #[error("The record was modified concurrently. {0}")]
    ConcurrentModification(String),
    #[error("The requested change is forbidden. {0}")]
    ForbiddenUpdate(String),
    #[error("Order {0} still has fills in progress")]
    OrderInUse(OrderId),
    #[error("A user with this {0} already exists")]
    UserAlreadyExists(String),
    #[error("Invalid referral. {0}")]
    InvalidReferral(String),
}

/// SQLite result codes that mean another connection holds the write lock, or that our snapshot went stale.
const SQLITE_CONTENTION_CODES: [&str; 4] = ["5", "6", "261", "517"];

impl From<sqlx::Error> for ExchangeError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(err) if err.code().is_some_and(|c| SQLITE_CONTENTION_CODES.contains(&c.as_ref())) => {
                ExchangeError::ConcurrentModification(err.message().to_string())
            },
            _ => ExchangeError::DatabaseError(e.to_string()),
        }
    }
}
