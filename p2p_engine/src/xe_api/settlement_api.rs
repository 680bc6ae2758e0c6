use std::{fmt::Debug, time::Duration};

use chrono::Utc;
use log::*;

use crate::{
    commissions::distribute_commissions,
    db_types::{OrderId, PayoutState, Role, Transaction, TransactionId, TransactionStatus},
    events::{AnnulReason, EventProducers, TransactionAnnulledEvent, TransactionSettledEvent},
    helpers::retry_on_conflict,
    traits::{
        ExchangeDatabase,
        ExchangeError,
        ExpiryResult,
        PaymentRail,
        PaymentRailError,
        PayoutRequest,
        ReconcileResult,
    },
};

/// The default expiry window, in seconds. Buyers must confirm payment, and either party may cancel, inside it.
pub const DEFAULT_EXPIRY_WINDOW: i64 = 900;
/// The default settlement window, in seconds. Sellers must confirm a buyer-confirmed transaction inside it.
pub const DEFAULT_SETTLEMENT_WINDOW: i64 = 3600;
/// The default time allowed for a payout to complete
pub const DEFAULT_PAYOUT_TIMEOUT: Duration = Duration::from_secs(20);

/// `SettlementApi` drives transactions from `pending` to one of the terminal states.
///
/// Buyers confirm that they have sent the fiat payment; sellers confirm receipt, which releases the escrowed tokens
/// to the buyer over the [`PaymentRail`]. Both windows are measured from the transaction's creation. Transactions
/// that the buyer has not confirmed within the expiry window, or that the seller has not confirmed within the
/// settlement window, are cancelled by [`SettlementApi::expire_stale_transactions`]. A late confirmation is rejected
/// with [`ExchangeError::ExpiryWindowElapsed`] whether or not a sweep has run yet.
pub struct SettlementApi<B, R> {
    db: B,
    rail: R,
    expiry_window: chrono::Duration,
    settlement_window: chrono::Duration,
    payout_timeout: Duration,
    producers: EventProducers,
}

impl<B, R> Debug for SettlementApi<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SettlementApi (windows: {}s/{}s, payout timeout: {:?})",
            self.expiry_window.num_seconds(),
            self.settlement_window().num_seconds(),
            self.payout_timeout
        )
    }
}

impl<B, R> SettlementApi<B, R> {
    pub fn new(db: B, rail: R, producers: EventProducers) -> Self {
        Self {
            db,
            rail,
            expiry_window: chrono::Duration::seconds(DEFAULT_EXPIRY_WINDOW),
            settlement_window: chrono::Duration::seconds(DEFAULT_SETTLEMENT_WINDOW),
            payout_timeout: DEFAULT_PAYOUT_TIMEOUT,
            producers,
        }
    }

    pub fn with_expiry_window(mut self, window: chrono::Duration) -> Self {
        self.expiry_window = window;
        self
    }

    pub fn with_settlement_window(mut self, window: chrono::Duration) -> Self {
        self.settlement_window = window;
        self
    }

    pub fn with_payout_timeout(mut self, timeout: Duration) -> Self {
        self.payout_timeout = timeout;
        self
    }

    pub fn expiry_window(&self) -> chrono::Duration {
        self.expiry_window
    }

    /// The settlement window is never shorter than the expiry window.
    pub fn settlement_window(&self) -> chrono::Duration {
        self.settlement_window.max(self.expiry_window)
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, R> SettlementApi<B, R>
where
    B: ExchangeDatabase,
    R: PaymentRail,
{
    pub async fn fetch_transaction(&self, tx_id: &TransactionId) -> Result<Transaction, ExchangeError> {
        self.db.fetch_transaction(tx_id).await?.ok_or_else(|| ExchangeError::TransactionNotFound(tx_id.clone()))
    }

    /// All the transactions in which the user is either the buyer or the seller, newest first.
    pub async fn transactions_for_user(&self, user_id: &str) -> Result<Vec<Transaction>, ExchangeError> {
        self.db.fetch_transactions_for_user(user_id).await
    }

    /// Records a payment confirmation from one party to the transaction.
    ///
    /// Confirming a role that has already confirmed, or confirming on a terminal transaction, is a no-op that returns
    /// the transaction as it stands.
    pub async fn confirm_payment(&self, tx_id: &TransactionId, role: Role) -> Result<Transaction, ExchangeError> {
        let tx = self.fetch_transaction(tx_id).await?;
        if tx.is_terminal() {
            debug!("🔄️ Ignoring {role} confirmation on {tx_id}. It is already {}", tx.status);
            return Ok(tx);
        }
        match role {
            Role::Buyer => self.confirm_buyer_payment(tx).await,
            Role::Seller => self.confirm_seller_payment(tx).await,
        }
    }

    async fn confirm_buyer_payment(&self, tx: Transaction) -> Result<Transaction, ExchangeError> {
        let tx_id = &tx.transaction_id;
        if tx.buyer_payment_confirmed {
            debug!("🔄️ The buyer on {tx_id} has already confirmed payment");
            return Ok(tx);
        }
        let now = Utc::now();
        if tx.window_elapsed(now, self.expiry_window) {
            return Err(ExchangeError::ExpiryWindowElapsed(tx_id.clone()));
        }
        let cutoff = now - self.expiry_window;
        match retry_on_conflict("buyer confirmation", || self.db.record_buyer_confirmation(tx_id, cutoff)).await? {
            Some(updated) => {
                info!("🔄️ The buyer on {tx_id} has confirmed payment of {}", updated.total_price);
                Ok(updated)
            },
            None => {
                debug!("🔄️ {tx_id} changed before the buyer confirmation could be recorded");
                let current = self.fetch_transaction(tx_id).await?;
                if !current.is_terminal() && !current.buyer_payment_confirmed {
                    return Err(ExchangeError::ExpiryWindowElapsed(tx_id.clone()));
                }
                Ok(current)
            },
        }
    }

    async fn confirm_seller_payment(&self, tx: Transaction) -> Result<Transaction, ExchangeError> {
        let tx_id = &tx.transaction_id;
        if tx.seller_payment_confirmed {
            debug!("🔄️ The seller on {tx_id} has already confirmed payment");
            return Ok(tx);
        }
        if !tx.buyer_payment_confirmed {
            return Err(ExchangeError::OutOfOrder(format!(
                "The seller cannot confirm {tx_id} before the buyer has confirmed payment"
            )));
        }
        let now = Utc::now();
        let window = self.settlement_window();
        if tx.window_elapsed(now, window) {
            return Err(ExchangeError::ExpiryWindowElapsed(tx_id.clone()));
        }
        let Some(claimed) = self.db.claim_payout(tx_id, now - window).await? else {
            let current = self.fetch_transaction(tx_id).await?;
            if current.is_terminal() {
                return Ok(current);
            }
            if current.payout_state == PayoutState::Idle {
                return Err(ExchangeError::ExpiryWindowElapsed(tx_id.clone()));
            }
            return Err(ExchangeError::ConcurrentModification(format!(
                "The payout for {tx_id} is already being processed"
            )));
        };
        let request = PayoutRequest {
            transaction_id: claimed.transaction_id.clone(),
            recipient: claimed.buyer_id.clone(),
            amount: claimed.amount,
            currency: claimed.currency.clone(),
            chain: claimed.chain.clone(),
        };
        debug!("💸️ Releasing {} {} to {} for {tx_id}", request.amount, request.currency, request.recipient);
        let outcome = match tokio::time::timeout(self.payout_timeout, self.rail.transfer(request)).await {
            Ok(result) => result,
            Err(_) => Err(PaymentRailError::NetworkTimeout),
        };
        let receipt = match outcome {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!("💸️ Payout for {tx_id} failed. {e}");
                if let Err(release_err) = self.db.release_payout_claim(tx_id).await {
                    error!("💸️ Could not release the payout claim on {tx_id}. {release_err}");
                }
                return Err(ExchangeError::PaymentRailFailure(e));
            },
        };
        info!("💸️ Payout {} for {tx_id} accepted", receipt.reference);
        let completed = retry_on_conflict("settlement", || self.db.complete_transaction(tx_id, &receipt.reference))
            .await
            .map_err(|e| {
                error!("💸️ Payout {} for {tx_id} was made, but the transaction could not be completed. {e}", receipt.reference);
                e
            })?
            .ok_or_else(|| {
                error!("💸️ Payout {} for {tx_id} was made, but its claim had been lost", receipt.reference);
                ExchangeError::ConcurrentModification(format!("The payout claim on {tx_id} was lost"))
            })?;
        info!("🔄️ Transaction {tx_id} completed. {} {} released to {}", completed.amount, completed.currency, completed.buyer_id);
        let credits = distribute_commissions(&self.db, &completed).await;
        trace!("🔄️🤝️ {} referral credits applied for {tx_id}", credits.len());
        self.call_transaction_settled_hook(&completed).await;
        Ok(completed)
    }

    /// Cancels a transaction at the request of one of its parties.
    ///
    /// Cancellation is only possible while the expiry window is open and no payout is in progress. Cancelling a
    /// terminal transaction is a no-op.
    pub async fn cancel_transaction(&self, tx_id: &TransactionId) -> Result<Transaction, ExchangeError> {
        let tx = self.fetch_transaction(tx_id).await?;
        if tx.is_terminal() {
            debug!("🔄️ Ignoring cancellation of {tx_id}. It is already {}", tx.status);
            return Ok(tx);
        }
        if tx.window_elapsed(Utc::now(), self.expiry_window) {
            return Err(ExchangeError::ExpiryWindowElapsed(tx_id.clone()));
        }
        if tx.payout_state != PayoutState::Idle {
            return Err(ExchangeError::ConcurrentModification(format!(
                "{tx_id} cannot be cancelled while its payout is in progress"
            )));
        }
        let from = [TransactionStatus::Pending, TransactionStatus::Matching];
        match retry_on_conflict("cancel", || self.db.annul_transaction(tx_id, &from)).await? {
            Some(canceled) => {
                info!("🔄️ Transaction {tx_id} cancelled. {} returned to sell order {}", canceled.amount, canceled.sell_order_id);
                self.call_transaction_annulled_hook(&canceled, AnnulReason::Cancelled).await;
                Ok(canceled)
            },
            None => {
                let current = self.fetch_transaction(tx_id).await?;
                if current.is_terminal() {
                    Ok(current)
                } else {
                    Err(ExchangeError::ConcurrentModification(format!("{tx_id} changed while it was being cancelled")))
                }
            },
        }
    }

    /// Cancels every `pending` transaction that has outlived the expiry window, and every buyer-confirmed transaction
    /// with no payout in flight that has outlived the settlement window. Then reconciles any sell orders whose fills
    /// have drifted from their transactions.
    ///
    /// Individual failures are logged and counted, but do not stop the sweep. Sweeps may overlap with each other and
    /// with user actions; each transaction is annulled at most once.
    pub async fn expire_stale_transactions(&self) -> Result<ExpiryResult, ExchangeError> {
        let now = Utc::now();
        let stale = self.db.fetch_stale_transactions(now - self.expiry_window, now - self.settlement_window()).await?;
        let mut result = ExpiryResult::default();
        for tx in stale {
            let tx_id = &tx.transaction_id;
            let from = [tx.status];
            match retry_on_conflict("expire", || self.db.annul_transaction(tx_id, &from)).await {
                Ok(Some(expired)) => {
                    info!("🕰️ Transaction {tx_id} expired after {}s", expired.age(Utc::now()).num_seconds());
                    self.call_transaction_annulled_hook(&expired, AnnulReason::Expired).await;
                    result.expired.push(expired);
                },
                Ok(None) => trace!("🕰️ {tx_id} was confirmed or cancelled before it could expire"),
                Err(e) => {
                    warn!("🕰️ Could not expire {tx_id}. {e}");
                    result.failures += 1;
                },
            }
        }
        let divergent = match self.db.fetch_divergent_sell_orders().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("🕰️ Could not look for sell orders that need reconciling. {e}");
                result.failures += 1;
                Vec::new()
            },
        };
        for order_id in divergent {
            match retry_on_conflict("reconcile", || self.db.reconcile_sell_order(&order_id)).await {
                Ok(r) => {
                    info!("🕰️ Sell order {order_id} reconciled. {} fills repaired", r.repaired);
                    result.reconciled.push(order_id);
                },
                Err(e) => {
                    warn!("🕰️ Could not reconcile sell order {order_id}. {e}");
                    result.failures += 1;
                },
            }
        }
        Ok(result)
    }

    /// Rebuilds a sell order's fill list from its transactions and recomputes its counters.
    pub async fn reconcile_sell_order(&self, order_id: &OrderId) -> Result<ReconcileResult, ExchangeError> {
        let result = retry_on_conflict("reconcile", || self.db.reconcile_sell_order(order_id)).await?;
        info!(
            "🔄️ Sell order {order_id} reconciled. {} fills repaired. {} left for {} buyers",
            result.repaired, result.sell_order.remaining_balance, result.sell_order.remaining_buyers
        );
        Ok(result)
    }

    async fn call_transaction_settled_hook(&self, tx: &Transaction) {
        for emitter in &self.producers.transaction_settled_producer {
            debug!("🔄️📬️ Notifying transaction settled hook subscribers");
            emitter.publish_event(TransactionSettledEvent::new(tx.clone())).await;
        }
    }

    async fn call_transaction_annulled_hook(&self, tx: &Transaction, reason: AnnulReason) {
        for emitter in &self.producers.transaction_annulled_producer {
            debug!("🔄️📬️ Notifying transaction annulled hook subscribers");
            emitter.publish_event(TransactionAnnulledEvent::new(tx.clone(), reason)).await;
        }
    }
}
