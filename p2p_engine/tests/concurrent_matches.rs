use futures_util::future::join_all;
use log::*;
use p2p_engine::{
    db_types::{Role, TransactionStatus},
    order_objects::{BuyOrderQueryFilter, MatchRequest},
    ExchangeError,
};

mod support;

use support::{create_sell_order, setup, tear_down, tokens};

const NUM_BUYERS: usize = 8;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_matches_never_oversell() {
    let exchange = setup().await;
    let order = create_sell_order(&exchange, "TSeller", 100, 10).await;

    // Eight buyers want 30 tokens each out of 100. Only three can have them.
    let attempts = (0..NUM_BUYERS).map(|i| {
        let request = MatchRequest::new(order.order_id.clone(), &format!("TBuyer{i}"), tokens(30), "TH");
        exchange.matching.match_buy(request)
    });
    let results = join_all(attempts).await;
    let mut matched = Vec::new();
    for result in results {
        match result {
            Ok(m) => matched.push(m),
            Err(ExchangeError::CapacityExceeded(msg)) => debug!("🚀️ Rejected: {msg}"),
            Err(e) => panic!("Unexpected error: {e}"),
        }
    }
    assert_eq!(matched.len(), 3);

    let buy_orders = exchange
        .matching
        .search_buy_orders(BuyOrderQueryFilter::default().with_sell_order_id(order.order_id.clone()))
        .await
        .unwrap();
    assert_eq!(buy_orders.len(), 3);

    // Confirmations and cancellations racing each other still leave consistent counters
    let confirmations = matched.iter().take(2).map(|m| exchange.settlement.confirm_payment(&m.transaction.transaction_id, Role::Buyer));
    let cancellation = exchange.settlement.cancel_transaction(&matched[2].transaction.transaction_id);
    let (confirmed, canceled) = tokio::join!(join_all(confirmations), cancellation);
    for c in confirmed {
        assert_eq!(c.expect("confirmation").status, TransactionStatus::Matching);
    }
    assert_eq!(canceled.expect("cancellation").status, TransactionStatus::Canceled);

    let order = exchange.matching.fetch_sell_order(&order.order_id).await.unwrap();
    assert_eq!(order.sub_orders.len(), 2);
    assert_eq!(order.remaining_balance, tokens(40));
    assert_eq!(order.remaining_buyers, 8);
    tear_down(exchange).await;
}
