//! # P2P exchange engine public API
//!
//! The `xe_api` module exposes the programmatic API for the exchange. Each API is generic over the backend traits it
//! needs, so the server, the tests and the expiry worker can each pick the pieces they use.
//!
//! * [`matching_api`] manages sell orders and matches buyers against them.
//! * [`settlement_api`] handles payment confirmations, payouts, cancellation and expiry.
//! * [`users_api`] registers users and links referrers.
//!
//! # API usage
//!
//! ```rust,ignore
//! use p2p_engine::{events::EventProducers, MatchingApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/p2p.db", 5).await?;
//! let api = MatchingApi::new(db, EventProducers::default());
//! let orders = api.search_sell_orders(SellOrderQueryFilter::default().open_only()).await?;
//! ```

pub mod matching_api;
pub mod order_objects;
pub mod settlement_api;
pub mod users_api;
