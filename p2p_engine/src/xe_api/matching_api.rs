use std::{collections::BTreeSet, fmt::Debug};

use chrono::Utc;
use log::*;

use crate::{
    commissions::CommissionPolicy,
    db_types::{
        BuyOrder,
        NewMatch,
        NewSellOrder,
        NotificationKind,
        OrderId,
        SellOrder,
        SellerNotification,
    },
    events::{BuyOrderMatchedEvent, EventProducers, SellerNotificationEvent},
    helpers::retry_on_conflict,
    order_objects::{
        AnyOrder,
        BuyOrderQueryFilter,
        MatchRequest,
        MatchResult,
        ModifySellOrderRequest,
        SellOrderQueryFilter,
    },
    traits::{ExchangeDatabase, ExchangeError, MatchedOrder},
};

/// `MatchingApi` manages the order book: sell orders, and the buy orders that fill them.
pub struct MatchingApi<B> {
    db: B,
    policy: CommissionPolicy,
    producers: EventProducers,
}

impl<B> Debug for MatchingApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MatchingApi ({:?})", self.policy)
    }
}

impl<B> MatchingApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, policy: CommissionPolicy::default(), producers }
    }

    pub fn with_commission_policy(mut self, policy: CommissionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> MatchingApi<B>
where B: ExchangeDatabase
{
    /// Validates and stores a new sell order. Country codes are normalised to upper case.
    pub async fn create_sell_order(&self, order: NewSellOrder) -> Result<SellOrder, ExchangeError> {
        let order = order.normalized();
        order.validate()?;
        let order = self.db.insert_sell_order(order).await?;
        info!(
            "🔄️📈️ Sell order {} created: {} {} on {} for up to {} buyers",
            order.order_id, order.amount, order.currency, order.chain, order.num_buyers
        );
        Ok(order)
    }

    /// Matches a buyer against a sell order.
    ///
    /// The buy order and its `pending` transaction are created in one step. Referral fees are fixed now, using the
    /// current commission policy. Once the match is committed, sellers in the same market are notified: the matched
    /// seller directly, and every other seller with an open order in the same currency and chain by broadcast.
    pub async fn match_buy(&self, request: MatchRequest) -> Result<MatchResult, ExchangeError> {
        if !request.amount.is_positive() {
            return Err(ExchangeError::CapacityExceeded(format!("{} is not a valid buy amount", request.amount)));
        }
        if request.buyer_id.trim().is_empty() {
            return Err(ExchangeError::InvalidOrder("A buyer id is required".into()));
        }
        let fees = self.policy.fees_for(request.amount);
        let matched = retry_on_conflict("match", || {
            let fill = NewMatch {
                sell_order_id: request.sell_order_id.clone(),
                buyer_id: request.buyer_id.clone(),
                amount: request.amount,
                payment_country: request.payment_country.clone(),
                fees,
                created_at: Utc::now(),
            };
            self.db.insert_match(fill)
        })
        .await?;
        info!(
            "🔄️🤝️ {} matched {} on sell order {}. Transaction {} is pending",
            matched.buy_order.buyer_id, matched.transaction.amount, matched.sell_order.order_id, matched.transaction.transaction_id
        );
        let notifications = self.notify_sellers(&matched).await;
        self.call_buy_order_matched_hook(&matched).await;
        self.call_seller_notification_hook(&notifications).await;
        let MatchedOrder { buy_order, transaction, .. } = matched;
        Ok(MatchResult { order: buy_order, transaction, notifications })
    }

    async fn notify_sellers(&self, matched: &MatchedOrder) -> Vec<SellerNotification> {
        let sell_order = &matched.sell_order;
        let targeted = SellerNotification {
            seller_id: sell_order.seller_id.clone(),
            sell_order_id: sell_order.order_id.clone(),
            buy_order_id: matched.buy_order.order_id.clone(),
            transaction_id: matched.transaction.transaction_id.clone(),
            kind: NotificationKind::NewBuyer,
            message: format!(
                "A buyer wants {} {} from your order {}",
                matched.transaction.amount, sell_order.currency, sell_order.order_id
            ),
        };
        let mut notifications = vec![targeted];
        let query = SellOrderQueryFilter::default()
            .with_currency(sell_order.currency.as_str())
            .with_chain(sell_order.chain.as_str())
            .open_only();
        let market = match self.db.search_sell_orders(query).await {
            Ok(orders) => orders,
            Err(e) => {
                warn!("🔄️📣️ Could not fetch the {} / {} market to notify sellers: {e}", sell_order.currency, sell_order.chain);
                return notifications;
            },
        };
        let mut notified = BTreeSet::from([sell_order.seller_id.clone()]);
        for order in market {
            if !notified.insert(order.seller_id.clone()) {
                continue;
            }
            notifications.push(SellerNotification {
                seller_id: order.seller_id,
                sell_order_id: order.order_id,
                buy_order_id: matched.buy_order.order_id.clone(),
                transaction_id: matched.transaction.transaction_id.clone(),
                kind: NotificationKind::MarketActivity,
                message: format!("A buyer matched {} {} on {}", matched.transaction.amount, sell_order.currency, sell_order.chain),
            });
        }
        debug!("🔄️📣️ {} sellers notified of match {}", notifications.len(), matched.transaction.transaction_id);
        notifications
    }

    async fn call_buy_order_matched_hook(&self, matched: &MatchedOrder) {
        for emitter in &self.producers.buy_order_matched_producer {
            debug!("🔄️📬️ Notifying buy order matched hook subscribers");
            let event = BuyOrderMatchedEvent::new(matched.buy_order.clone(), matched.transaction.clone());
            emitter.publish_event(event).await;
        }
    }

    async fn call_seller_notification_hook(&self, notifications: &[SellerNotification]) {
        for emitter in &self.producers.seller_notification_producer {
            for notification in notifications {
                let event = SellerNotificationEvent { notification: notification.clone() };
                emitter.publish_event(event).await;
            }
        }
    }

    pub async fn fetch_sell_order(&self, order_id: &OrderId) -> Result<SellOrder, ExchangeError> {
        self.db.fetch_sell_order(order_id).await?.ok_or_else(|| ExchangeError::OrderNotFound(order_id.clone()))
    }

    pub async fn fetch_buy_order(&self, order_id: &OrderId) -> Result<BuyOrder, ExchangeError> {
        self.db.fetch_buy_order(order_id).await?.ok_or_else(|| ExchangeError::OrderNotFound(order_id.clone()))
    }

    /// Looks the id up among both sell orders and buy orders.
    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<AnyOrder, ExchangeError> {
        if let Some(order) = self.db.fetch_sell_order(order_id).await? {
            return Ok(AnyOrder::Sell(order));
        }
        match self.db.fetch_buy_order(order_id).await? {
            Some(order) => Ok(AnyOrder::Buy(order)),
            None => Err(ExchangeError::OrderNotFound(order_id.clone())),
        }
    }

    pub async fn search_sell_orders(&self, query: SellOrderQueryFilter) -> Result<Vec<SellOrder>, ExchangeError> {
        trace!("🔄️🔍️ Searching sell orders. {query}");
        self.db.search_sell_orders(query).await
    }

    pub async fn search_buy_orders(&self, query: BuyOrderQueryFilter) -> Result<Vec<BuyOrder>, ExchangeError> {
        trace!("🔄️🔍️ Searching buy orders. {query}");
        self.db.search_buy_orders(query).await
    }

    /// Applies an operator update to an order.
    ///
    /// Buy orders cannot be modified; their status follows their transaction. An update with no changes simply
    /// recomputes the sell order's counters from its fills. Updates without an `expected_version` are retried if they
    /// lose a race with a concurrent fill.
    pub async fn modify_order(
        &self,
        order_id: &OrderId,
        update: ModifySellOrderRequest,
    ) -> Result<SellOrder, ExchangeError> {
        if self.db.fetch_buy_order(order_id).await?.is_some() {
            return Err(ExchangeError::ForbiddenUpdate(format!(
                "Buy order {order_id} follows its transaction and cannot be modified"
            )));
        }
        let order = if update.expected_version.is_some() {
            self.db.modify_sell_order(order_id, update).await?
        } else {
            retry_on_conflict("modify", || self.db.modify_sell_order(order_id, update.clone())).await?
        };
        info!("🔄️✏️ Sell order {order_id} modified. Status: {}, version {}", order.status, order.version);
        Ok(order)
    }

    /// Deletes an order that has nothing in progress.
    pub async fn delete_order(&self, order_id: &OrderId) -> Result<AnyOrder, ExchangeError> {
        let deleted = match self.db.fetch_sell_order(order_id).await? {
            Some(_) => AnyOrder::Sell(self.db.delete_sell_order(order_id).await?),
            None => AnyOrder::Buy(self.db.delete_buy_order(order_id).await?),
        };
        info!("🔄️🗑️ Order {order_id} deleted");
        Ok(deleted)
    }
}
