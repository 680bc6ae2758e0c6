//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests:
//! ```nocompile
//!     fn my_handler() -> impl Responder {
//!         std::thread::sleep(Duration::from_secs(5)); // <-- Bad practice! Will cause the current worker thread to
//! hang!
//!     }
//! ```
//! For this reason, any long, non-cpu-bound operation (e.g. I/O, database operations, payouts) should be expressed
//! as futures or asynchronous functions. Async handlers get executed concurrently by worker threads and thus don’t
//! block execution:
//!
//! ```nocompile
//!     async fn my_handler() -> impl Responder {
//!         tokio::time::sleep(Duration::from_secs(5)).await; // <-- Ok. Worker thread will handle other requests here
//!     }
//! ```
use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use p2p_engine::{
    db_types::{NewUser, Role, TransactionId},
    order_objects::MatchRequest,
    traits::{ExchangeDatabase, PaymentRail, UserManagement},
    MatchingApi,
    SettlementApi,
    UsersApi,
};

use crate::{
    data_objects::{
        order_id_from_path,
        ModifyOrderParams,
        NewOrderRequest,
        OrderListParams,
        OrderSide,
        TransactionQuery,
        TransactionUpdate,
        UserQuery,
    },
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(create_order => Post "/orders" impl ExchangeDatabase);
/// Creates an order.
///
/// The `type` field of the body selects what happens:
/// * `sell` creates a new sell order. Returns the order, with `201 Created`.
/// * `buy` matches a buyer against an existing sell order. Returns `{order, transaction, notifications}`, with
///   `201 Created`. The new transaction is `pending` until the buyer confirms payment.
pub async fn create_order<B: ExchangeDatabase>(
    body: web::Json<NewOrderRequest>,
    api: web::Data<MatchingApi<B>>,
) -> Result<HttpResponse, ServerError> {
    match body.into_inner() {
        NewOrderRequest::Sell(order) => {
            debug!("💻️ New sell order request from {}", order.seller_id);
            let order = api.create_sell_order(order).await.map_err(|e| {
                debug!("💻️ Could not create sell order. {e}");
                e
            })?;
            Ok(HttpResponse::Created().json(order))
        },
        NewOrderRequest::Buy(request) => match_buyer(request, &api).await,
    }
}

route!(list_orders => Get "/orders" impl ExchangeDatabase);
/// Lists orders of one side. `type` is `sell` (the default) or `buy`. For sell orders, `user_id` is the seller and
/// `currency`, `chain` and `status` filter the results. For buy orders, `user_id` is the buyer and `status` is a
/// transaction status.
pub async fn list_orders<B: ExchangeDatabase>(
    query: web::Query<OrderListParams>,
    api: web::Data<MatchingApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let params = query.into_inner();
    trace!("💻️ Order list request: {params:?}");
    match params.side {
        OrderSide::Sell => {
            let orders = api.search_sell_orders(params.sell_filter()?).await?;
            Ok(HttpResponse::Ok().json(orders))
        },
        OrderSide::Buy => {
            let orders = api.search_buy_orders(params.buy_filter()?).await?;
            Ok(HttpResponse::Ok().json(orders))
        },
    }
}

route!(order_by_id => Get "/orders/{id}" impl ExchangeDatabase);
/// Fetches an order by id, whichever side it is on. The result is tagged with `type`.
pub async fn order_by_id<B: ExchangeDatabase>(
    path: web::Path<String>,
    api: web::Data<MatchingApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = order_id_from_path(path.into_inner())?;
    trace!("💻️ Fetching order {order_id}");
    let order = api.fetch_order(&order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(modify_order => Patch "/orders/{id}" impl ExchangeDatabase);
/// Applies a partial update to a sell order.
///
/// ## Parameters
/// * `status` - The new status. Closing an order (`completed`) is only allowed when no fill is in progress.
/// * `min_buy_amount` - The new minimum fill size.
/// * `version` - Optional. If given, the update is refused when the order has changed since that version.
///
/// `remaining_balance`, `remaining_buyers` and `sub_orders` are never written. The counters are recomputed from the
/// fills instead. Buy orders cannot be modified.
pub async fn modify_order<B: ExchangeDatabase>(
    path: web::Path<String>,
    body: web::Json<ModifyOrderParams>,
    api: web::Data<MatchingApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = order_id_from_path(path.into_inner())?;
    let params = body.into_inner();
    if params.has_derived_fields() {
        debug!("💻️ Ignoring derived fields in the update for {order_id}. They will be recomputed.");
    }
    let order = api.modify_order(&order_id, params.into()).await.map_err(|e| {
        debug!("💻️ Could not modify order {order_id}. {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(order))
}

route!(delete_order => Delete "/orders/{id}" impl ExchangeDatabase);
pub async fn delete_order<B: ExchangeDatabase>(
    path: web::Path<String>,
    api: web::Data<MatchingApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = order_id_from_path(path.into_inner())?;
    info!("💻️ Delete request for order {order_id}");
    let order = api.delete_order(&order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Transactions  ----------------------------------------------
route!(create_transaction => Post "/transactions" impl ExchangeDatabase);
/// Matches a buyer against a sell order. This is the same operation as `POST /orders` with `type: buy`.
pub async fn create_transaction<B: ExchangeDatabase>(
    body: web::Json<MatchRequest>,
    api: web::Data<MatchingApi<B>>,
) -> Result<HttpResponse, ServerError> {
    match_buyer(body.into_inner(), &api).await
}

async fn match_buyer<B: ExchangeDatabase>(
    request: MatchRequest,
    api: &MatchingApi<B>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ {} wants {} from {}", request.buyer_id, request.amount, request.sell_order_id);
    let result = api.match_buy(request).await.map_err(|e| {
        debug!("💻️ Could not match buyer. {e}");
        e
    })?;
    Ok(HttpResponse::Created().json(result))
}

route!(transaction_by_id => Get "/transactions/{id}" impl ExchangeDatabase, PaymentRail);
pub async fn transaction_by_id<B: ExchangeDatabase, R: PaymentRail>(
    path: web::Path<String>,
    api: web::Data<SettlementApi<B, R>>,
) -> Result<HttpResponse, ServerError> {
    let tx_id = TransactionId::from(path.into_inner());
    let tx = api.fetch_transaction(&tx_id).await?;
    Ok(HttpResponse::Ok().json(tx))
}

route!(transactions => Get "/transactions" impl ExchangeDatabase, PaymentRail);
/// Fetches a single transaction (`?transactionId=`) or every transaction a user is party to (`?user_id=`).
pub async fn transactions<B: ExchangeDatabase, R: PaymentRail>(
    query: web::Query<TransactionQuery>,
    api: web::Data<SettlementApi<B, R>>,
) -> Result<HttpResponse, ServerError> {
    match query.into_inner() {
        TransactionQuery { transaction_id: Some(tx_id), .. } => {
            let tx = api.fetch_transaction(&tx_id).await?;
            Ok(HttpResponse::Ok().json(tx))
        },
        TransactionQuery { user_id: Some(user_id), .. } => {
            let txs = api.transactions_for_user(&user_id).await?;
            Ok(HttpResponse::Ok().json(txs))
        },
        _ => Err(ServerError::InvalidQuery("Either transactionId or user_id is required".into())),
    }
}

route!(update_transaction => Patch "/transactions/{id}" impl ExchangeDatabase, PaymentRail);
pub async fn update_transaction<B: ExchangeDatabase, R: PaymentRail>(
    path: web::Path<String>,
    body: web::Json<TransactionUpdate>,
    api: web::Data<SettlementApi<B, R>>,
) -> Result<HttpResponse, ServerError> {
    let tx_id = TransactionId::from(path.into_inner());
    apply_transaction_update(tx_id, body.into_inner(), &api).await
}

route!(update_transaction_by_query => Patch "/transactions" impl ExchangeDatabase, PaymentRail);
pub async fn update_transaction_by_query<B: ExchangeDatabase, R: PaymentRail>(
    query: web::Query<TransactionQuery>,
    body: web::Json<TransactionUpdate>,
    api: web::Data<SettlementApi<B, R>>,
) -> Result<HttpResponse, ServerError> {
    let tx_id = query
        .into_inner()
        .transaction_id
        .ok_or_else(|| ServerError::InvalidQuery("transactionId is required".into()))?;
    apply_transaction_update(tx_id, body.into_inner(), &api).await
}

/// Confirmation or cancellation of a transaction.
///
/// * `buyer_payment_confirmed: true` records the buyer's fiat payment. The fill starts counting against the sell
///   order.
/// * `seller_payment_confirmed: true` releases the escrowed tokens to the buyer and completes the transaction. The
///   buyer must have confirmed first. If the payout fails, the transaction is left as it was.
/// * `status: canceled` cancels the transaction. This is only possible inside the expiry window.
///
/// Repeating a confirmation has no effect.
async fn apply_transaction_update<B: ExchangeDatabase, R: PaymentRail>(
    tx_id: TransactionId,
    update: TransactionUpdate,
    api: &SettlementApi<B, R>,
) -> Result<HttpResponse, ServerError> {
    if update.is_empty() {
        return Err(ServerError::InvalidRequestBody("The update does not change anything".into()));
    }
    if let Some(status) = update.status.filter(|_| !update.is_cancellation()) {
        return Err(ServerError::InvalidRequestBody(format!(
            "Transactions cannot be moved to {status} directly. Confirm payment instead."
        )));
    }
    if update.is_cancellation() {
        info!("💻️ Cancellation request for {tx_id}");
        let tx = api.cancel_transaction(&tx_id).await.map_err(|e| {
            debug!("💻️ Could not cancel {tx_id}. {e}");
            e
        })?;
        return Ok(HttpResponse::Ok().json(tx));
    }
    let confirmations = [(update.buyer_payment_confirmed, Role::Buyer), (update.seller_payment_confirmed, Role::Seller)];
    let mut tx = None;
    for (confirmed, role) in confirmations {
        if confirmed {
            info!("💻️ {role} confirmation for {tx_id}");
            tx = Some(api.confirm_payment(&tx_id, role).await.map_err(|e| {
                debug!("💻️ Could not record the {role} confirmation for {tx_id}. {e}");
                e
            })?);
        }
    }
    match tx {
        Some(tx) => Ok(HttpResponse::Ok().json(tx)),
        None => Err(ServerError::Unspecified(format!("No confirmation was applied to {tx_id}"))),
    }
}

route!(cancel_transaction => Delete "/transactions" impl ExchangeDatabase, PaymentRail);
pub async fn cancel_transaction<B: ExchangeDatabase, R: PaymentRail>(
    query: web::Query<TransactionQuery>,
    api: web::Data<SettlementApi<B, R>>,
) -> Result<HttpResponse, ServerError> {
    let tx_id = query
        .into_inner()
        .transaction_id
        .ok_or_else(|| ServerError::InvalidQuery("transactionId is required".into()))?;
    info!("💻️ Cancellation request for {tx_id}");
    let tx = api.cancel_transaction(&tx_id).await?;
    Ok(HttpResponse::Ok().json(tx))
}

//----------------------------------------------   Users  ----------------------------------------------------
route!(register_user => Post "/users" impl UserManagement);
/// Registers a user. If `parent_ref` is given, it must be the referral code of an existing user, who will earn a
/// commission on every trade the new user completes.
pub async fn register_user<B: UserManagement>(
    body: web::Json<NewUser>,
    api: web::Data<UsersApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let user = api.register(body.into_inner()).await.map_err(|e| {
        debug!("💻️ Could not register user. {e}");
        e
    })?;
    Ok(HttpResponse::Created().json(user))
}

route!(user_by_wallet => Get "/users/{wallet_address}" impl UserManagement);
pub async fn user_by_wallet<B: UserManagement>(
    path: web::Path<String>,
    api: web::Data<UsersApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let user = api.user_by_wallet(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

route!(user_by_referral_code => Get "/users" impl UserManagement);
pub async fn user_by_referral_code<B: UserManagement>(
    query: web::Query<UserQuery>,
    api: web::Data<UsersApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let code = query
        .into_inner()
        .referral_code
        .ok_or_else(|| ServerError::InvalidQuery("referral_code is required".into()))?;
    let user = api.user_by_referral_code(&code).await?;
    Ok(HttpResponse::Ok().json(user))
}

//----------------------------------------------   Maintenance  ----------------------------------------------
route!(reconcile => Post "/reconcile/{sell_order_id}" impl ExchangeDatabase, PaymentRail);
/// Brings a sell order's fills in line with its transactions and recomputes its counters.
pub async fn reconcile<B: ExchangeDatabase, R: PaymentRail>(
    path: web::Path<String>,
    api: web::Data<SettlementApi<B, R>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = order_id_from_path(path.into_inner())?;
    info!("💻️ Reconciliation request for {order_id}");
    let result = api.reconcile_sell_order(&order_id).await?;
    Ok(HttpResponse::Ok().json(result))
}
