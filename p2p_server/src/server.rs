use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use futures::future::ready;
use log::*;
use p2p_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    MatchingApi,
    SettlementApi,
    SimulatedPaymentRail,
    SqliteDatabase,
    UsersApi,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    routes::{
        health,
        CancelTransactionRoute,
        CreateOrderRoute,
        CreateTransactionRoute,
        DeleteOrderRoute,
        ListOrdersRoute,
        ModifyOrderRoute,
        OrderByIdRoute,
        ReconcileRoute,
        RegisterUserRoute,
        TransactionByIdRoute,
        TransactionsRoute,
        UpdateTransactionByQueryRoute,
        UpdateTransactionRoute,
        UserByReferralCodeRoute,
        UserByWalletRoute,
    },
};

const EVENT_BUFFER_SIZE: usize = 128;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let rail = SimulatedPaymentRail::new(&config.payout_token, config.simulated_rail_balance);
    info!("💸️ Simulated payment rail ready with {} {}", rail.balance(), rail.token());
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, logging_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    if config.reaper_enabled {
        let _handle = start_expiry_worker(
            db.clone(),
            rail.clone(),
            producers.clone(),
            (config.expiry_window, config.settlement_window),
            config.reaper_interval,
        );
    } else {
        warn!("🕰️ The expiry reaper is disabled. Unconfirmed transactions will not expire.");
    }
    let srv = create_server_instance(config, db, rail, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    rail: SimulatedPaymentRail,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let matching_api =
            MatchingApi::new(db.clone(), producers.clone()).with_commission_policy(config.commission_policy);
        let settlement_api = SettlementApi::new(db.clone(), rail.clone(), producers.clone())
            .with_expiry_window(config.expiry_window)
            .with_settlement_window(config.settlement_window)
            .with_payout_timeout(config.payout_timeout);
        let users_api = UsersApi::new(db.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("p2p::access_log"))
            .app_data(web::Data::new(matching_api))
            .app_data(web::Data::new(settlement_api))
            .app_data(web::Data::new(users_api))
            .service(health)
            .service(CreateOrderRoute::<SqliteDatabase>::new())
            .service(ListOrdersRoute::<SqliteDatabase>::new())
            .service(OrderByIdRoute::<SqliteDatabase>::new())
            .service(ModifyOrderRoute::<SqliteDatabase>::new())
            .service(DeleteOrderRoute::<SqliteDatabase>::new())
            .service(CreateTransactionRoute::<SqliteDatabase>::new())
            .service(TransactionByIdRoute::<SqliteDatabase, SimulatedPaymentRail>::new())
            .service(TransactionsRoute::<SqliteDatabase, SimulatedPaymentRail>::new())
            .service(UpdateTransactionRoute::<SqliteDatabase, SimulatedPaymentRail>::new())
            .service(UpdateTransactionByQueryRoute::<SqliteDatabase, SimulatedPaymentRail>::new())
            .service(CancelTransactionRoute::<SqliteDatabase, SimulatedPaymentRail>::new())
            .service(RegisterUserRoute::<SqliteDatabase>::new())
            .service(UserByWalletRoute::<SqliteDatabase>::new())
            .service(UserByReferralCodeRoute::<SqliteDatabase>::new())
            .service(ReconcileRoute::<SqliteDatabase, SimulatedPaymentRail>::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

/// Event hooks that write every lifecycle event to the log. Seller notifications are delivered through this
/// channel.
pub fn logging_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_buy_order_matched(|ev| {
            info!(
                "📬️ {} matched {} from {} as {}",
                ev.buy_order.buyer_id, ev.buy_order.amount, ev.buy_order.sell_order_id, ev.transaction.transaction_id
            );
            Box::pin(ready(()))
        })
        .on_transaction_settled(|ev| {
            info!(
                "📬️ Transaction {} settled. Payout reference: {}",
                ev.transaction.transaction_id,
                ev.transaction.payout_reference.as_deref().unwrap_or("none")
            );
            Box::pin(ready(()))
        })
        .on_transaction_annulled(|ev| {
            info!("📬️ Transaction {} was annulled ({})", ev.transaction.transaction_id, ev.reason);
            Box::pin(ready(()))
        })
        .on_seller_notification(|ev| {
            let n = ev.notification;
            info!("📬️ Notify {}: {:?} on {} (buy order {})", n.seller_id, n.kind, n.sell_order_id, n.buy_order_id);
            Box::pin(ready(()))
        });
    hooks
}
