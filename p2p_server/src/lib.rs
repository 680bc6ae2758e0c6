//! # P2P exchange server
//! This crate hosts the HTTP server for the P2P exchange. It is responsible for:
//! * Accepting sell orders, and matching buyers against them.
//! * Recording payment confirmations from buyers and sellers, and releasing escrowed tokens on settlement.
//! * Running the expiry reaper, which cancels matches that the buyer never confirmed.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/orders`, `/orders/{id}`: Create, list, fetch, update and delete orders. Buy orders are created by matching.
//! * `/transactions`, `/transactions/{id}`: Match, fetch, confirm and cancel transactions.
//! * `/users`, `/users/{wallet_address}`: Register and look up users and their referral earnings.
//! * `/reconcile/{sell_order_id}`: Repair a sell order's fills and counters.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod expiry_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
