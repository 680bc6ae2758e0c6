//! # Backend contracts for the exchange engine.
//!
//! The engine is storage-agnostic. The APIs in [`crate::xe_api`] are generic over a backend that implements the
//! traits in this module.
//!
//! * [`ExchangeDatabase`] is the highest level of behaviour: the order store, the transaction ledger, and the atomic
//!   state transitions that keep the two consistent.
//! * [`UserManagement`] registers users and resolves referral links.
//! * [`PaymentRail`] releases escrowed tokens to a buyer. This is the one external, blocking collaborator of the
//!   settlement flow.
mod data_objects;
mod exchange_database;
mod payment_rail;
mod user_management;

pub use data_objects::{ExpiryResult, MatchedOrder, ReconcileResult};
pub use exchange_database::{ExchangeDatabase, ExchangeError};
pub use payment_rail::{PaymentRail, PaymentRailError, PayoutReceipt, PayoutRequest};
pub use user_management::UserManagement;
