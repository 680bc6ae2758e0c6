use chrono::{DateTime, Utc};
use mockall::mock;
use p2p_engine::{
    db_types::{
        BuyOrder,
        CommissionCredit,
        NewMatch,
        NewSellOrder,
        NewUser,
        OrderId,
        SellOrder,
        Transaction,
        TransactionId,
        TransactionStatus,
        User,
    },
    order_objects::{BuyOrderQueryFilter, ModifySellOrderRequest, SellOrderQueryFilter},
    traits::{ExchangeDatabase, ExchangeError, MatchedOrder, ReconcileResult, UserManagement},
    PaymentRail,
    PaymentRailError,
    PayoutReceipt,
    PayoutRequest,
};

mock! {
    pub Exchange {}
    impl ExchangeDatabase for Exchange {
        fn url(&self) -> &str;
        async fn insert_sell_order(&self, order: NewSellOrder) -> Result<SellOrder, ExchangeError>;
        async fn fetch_sell_order(&self, order_id: &OrderId) -> Result<Option<SellOrder>, ExchangeError>;
        async fn fetch_buy_order(&self, order_id: &OrderId) -> Result<Option<BuyOrder>, ExchangeError>;
        async fn search_sell_orders(&self, query: SellOrderQueryFilter) -> Result<Vec<SellOrder>, ExchangeError>;
        async fn search_buy_orders(&self, query: BuyOrderQueryFilter) -> Result<Vec<BuyOrder>, ExchangeError>;
        async fn insert_match(&self, fill: NewMatch) -> Result<MatchedOrder, ExchangeError>;
        async fn fetch_transaction(&self, tx_id: &TransactionId) -> Result<Option<Transaction>, ExchangeError>;
        async fn fetch_transactions_for_user(&self, user_id: &str) -> Result<Vec<Transaction>, ExchangeError>;
        async fn record_buyer_confirmation(&self, tx_id: &TransactionId, cutoff: DateTime<Utc>) -> Result<Option<Transaction>, ExchangeError>;
        async fn claim_payout(&self, tx_id: &TransactionId, cutoff: DateTime<Utc>) -> Result<Option<Transaction>, ExchangeError>;
        async fn release_payout_claim(&self, tx_id: &TransactionId) -> Result<(), ExchangeError>;
        async fn complete_transaction(&self, tx_id: &TransactionId, payout_reference: &str) -> Result<Option<Transaction>, ExchangeError>;
        async fn annul_transaction(&self, tx_id: &TransactionId, from: &[TransactionStatus]) -> Result<Option<Transaction>, ExchangeError>;
        async fn fetch_stale_transactions(&self, pending_cutoff: DateTime<Utc>, matching_cutoff: DateTime<Utc>) -> Result<Vec<Transaction>, ExchangeError>;
        async fn reconcile_sell_order(&self, order_id: &OrderId) -> Result<ReconcileResult, ExchangeError>;
        async fn fetch_divergent_sell_orders(&self) -> Result<Vec<OrderId>, ExchangeError>;
        async fn modify_sell_order(&self, order_id: &OrderId, update: ModifySellOrderRequest) -> Result<SellOrder, ExchangeError>;
        async fn delete_sell_order(&self, order_id: &OrderId) -> Result<SellOrder, ExchangeError>;
        async fn delete_buy_order(&self, order_id: &OrderId) -> Result<BuyOrder, ExchangeError>;
        async fn credit_commission(&self, credit: CommissionCredit) -> Result<bool, ExchangeError>;
    }
    impl UserManagement for Exchange {
        async fn register_user(&self, user: NewUser) -> Result<User, ExchangeError>;
        async fn fetch_user_by_wallet(&self, wallet_address: &str) -> Result<Option<User>, ExchangeError>;
        async fn fetch_user_by_referral_code(&self, referral_code: &str) -> Result<Option<User>, ExchangeError>;
    }
    impl Clone for Exchange {
        fn clone(&self) -> Self;
    }
}

mock! {
    pub Rail {}
    impl PaymentRail for Rail {
        async fn transfer(&self, request: PayoutRequest) -> Result<PayoutReceipt, PaymentRailError>;
    }
    impl Clone for Rail {
        fn clone(&self) -> Self;
    }
}
