use p2p_common::TokenAmount;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::TransactionId;

/// An instruction to release `amount` of the escrowed `currency` on `chain` to the buyer's wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub transaction_id: TransactionId,
    pub recipient: String,
    pub amount: TokenAmount,
    pub currency: String,
    pub chain: String,
}

/// Proof that the rail accepted a transfer. The reference is stored on the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutReceipt {
    pub reference: String,
    pub amount: TokenAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentRailError {
    #[error("The platform wallet cannot cover a payout of {requested}. Available: {available}")]
    InsufficientPlatformBalance { requested: TokenAmount, available: TokenAmount },
    #[error("The payout token is misconfigured: {0}")]
    MisconfiguredToken(String),
    #[error("The payout did not complete in time")]
    NetworkTimeout,
    #[error("The payout was rejected: {0}")]
    Rejected(String),
}

/// Executes on-chain transfers of escrowed tokens from the platform wallet.
///
/// A transfer either succeeds and returns a receipt, or fails without moving any funds.
#[allow(async_fn_in_trait)]
pub trait PaymentRail: Clone {
    async fn transfer(&self, request: PayoutRequest) -> Result<PayoutReceipt, PaymentRailError>;
}
