use std::time::Duration;

use log::*;
use p2p_engine::{db_types::Transaction, events::EventProducers, SettlementApi, SimulatedPaymentRail, SqliteDatabase};
use tokio::task::JoinHandle;

/// Starts the expiry reaper. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every `interval`, buyer-unconfirmed transactions older than `expiry_window` and seller-unconfirmed transactions
/// older than `settlement_window` are cancelled, and their capacity is returned to the sell order. Sell orders whose
/// fills have drifted from their transactions are reconciled in the same sweep.
pub fn start_expiry_worker(
    db: SqliteDatabase,
    rail: SimulatedPaymentRail,
    producers: EventProducers,
    windows: (chrono::Duration, chrono::Duration),
    interval: Duration,
) -> JoinHandle<()> {
    let (expiry_window, settlement_window) = windows;
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        let api = SettlementApi::new(db, rail, producers)
            .with_expiry_window(expiry_window)
            .with_settlement_window(settlement_window);
        info!("🕰️ Expiry reaper started. Sweeping every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running expiry sweep");
            match api.expire_stale_transactions().await {
                Ok(result) if result.is_empty() => trace!("🕰️ Nothing to expire"),
                Ok(result) => {
                    info!(
                        "🕰️ {} transactions expired, {} sell orders reconciled",
                        result.expired_count(),
                        result.reconciled_count()
                    );
                    debug!("🕰️ Expired transactions: {}", transaction_list(&result.expired));
                    if result.failures > 0 {
                        warn!("🕰️ {} items could not be processed. They will be retried on the next sweep", result.failures);
                    }
                },
                Err(e) => {
                    error!("🕰️ Error running the expiry sweep: {e}");
                },
            }
        }
    })
}

fn transaction_list(txs: &[Transaction]) -> String {
    txs.iter()
        .map(|tx| format!("[{}] buyer: {} sell order: {}", tx.transaction_id, tx.buyer_id, tx.sell_order_id))
        .collect::<Vec<String>>()
        .join(", ")
}
