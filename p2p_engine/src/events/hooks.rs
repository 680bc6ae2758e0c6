use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    BuyOrderMatchedEvent,
    EventHandler,
    EventProducer,
    Handler,
    SellerNotificationEvent,
    TransactionAnnulledEvent,
    TransactionSettledEvent,
};

type BoxedFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The publishing side of the registered hooks. Cloned into every API instance that emits events.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub buy_order_matched_producer: Vec<EventProducer<BuyOrderMatchedEvent>>,
    pub transaction_settled_producer: Vec<EventProducer<TransactionSettledEvent>>,
    pub transaction_annulled_producer: Vec<EventProducer<TransactionAnnulledEvent>>,
    pub seller_notification_producer: Vec<EventProducer<SellerNotificationEvent>>,
}

pub struct EventHandlers {
    pub on_buy_order_matched: Option<EventHandler<BuyOrderMatchedEvent>>,
    pub on_transaction_settled: Option<EventHandler<TransactionSettledEvent>>,
    pub on_transaction_annulled: Option<EventHandler<TransactionAnnulledEvent>>,
    pub on_seller_notification: Option<EventHandler<SellerNotificationEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_buy_order_matched: hooks
                .on_buy_order_matched
                .map(|f| EventHandler::new("BuyOrderMatched", buffer_size, f)),
            on_transaction_settled: hooks
                .on_transaction_settled
                .map(|f| EventHandler::new("TransactionSettled", buffer_size, f)),
            on_transaction_annulled: hooks
                .on_transaction_annulled
                .map(|f| EventHandler::new("TransactionAnnulled", buffer_size, f)),
            on_seller_notification: hooks
                .on_seller_notification
                .map(|f| EventHandler::new("SellerNotification", buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_buy_order_matched {
            result.buy_order_matched_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_transaction_settled {
            result.transaction_settled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_transaction_annulled {
            result.transaction_annulled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_seller_notification {
            result.seller_notification_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_buy_order_matched {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_transaction_settled {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_transaction_annulled {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_seller_notification {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_buy_order_matched: Option<Handler<BuyOrderMatchedEvent>>,
    pub on_transaction_settled: Option<Handler<TransactionSettledEvent>>,
    pub on_transaction_annulled: Option<Handler<TransactionAnnulledEvent>>,
    pub on_seller_notification: Option<Handler<SellerNotificationEvent>>,
}

impl EventHooks {
    pub fn on_buy_order_matched<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(BuyOrderMatchedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_buy_order_matched = Some(Arc::new(f));
        self
    }

    pub fn on_transaction_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TransactionSettledEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_transaction_settled = Some(Arc::new(f));
        self
    }

    pub fn on_transaction_annulled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TransactionAnnulledEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_transaction_annulled = Some(Arc::new(f));
        self
    }

    pub fn on_seller_notification<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SellerNotificationEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_seller_notification = Some(Arc::new(f));
        self
    }
}
