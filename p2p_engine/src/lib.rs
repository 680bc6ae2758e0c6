//! P2P Exchange Engine
//!
//! The exchange engine lets sellers escrow crypto tokens and sell them to buyers who pay in fiat, off-platform.
//! This library contains the core logic for the exchange: the order book, the settlement state machine, expiry of
//! unconfirmed transactions and referral commissions.
//!
//! The library is divided into two main sections:
//! 1. Storage ([`mod@sqlite`] and [`mod@traits`]). SQLite is the supported backend. You should never need to access
//!    the database directly. Instead, use the public API. The exception is the data types used in the database,
//!    which are defined in the [`mod@db_types`] module and are public.
//! 2. The exchange public API ([`mod@xe_api`]). [`MatchingApi`] manages sell orders and matches buyers against them,
//!    [`SettlementApi`] drives transactions to completion or cancellation and [`UsersApi`] manages users and their
//!    referrers.
//!
//! The engine also emits events that can be subscribed to, e.g. when a buyer is matched or a transaction settles.
//! See [`mod@events`].
pub mod commissions;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod simulated_rail;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;
mod xe_api;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use commissions::CommissionPolicy;
pub use simulated_rail::SimulatedPaymentRail;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    ExchangeDatabase,
    ExchangeError,
    ExpiryResult,
    MatchedOrder,
    PaymentRail,
    PaymentRailError,
    PayoutReceipt,
    PayoutRequest,
    ReconcileResult,
    UserManagement,
};
pub use xe_api::{
    matching_api::MatchingApi,
    order_objects,
    settlement_api::{SettlementApi, DEFAULT_EXPIRY_WINDOW, DEFAULT_PAYOUT_TIMEOUT, DEFAULT_SETTLEMENT_WINDOW},
    users_api::UsersApi,
};
