use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::db_types::{BuyOrder, SellerNotification, Transaction};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyOrderMatchedEvent {
    pub buy_order: BuyOrder,
    pub transaction: Transaction,
}

impl BuyOrderMatchedEvent {
    pub fn new(buy_order: BuyOrder, transaction: Transaction) -> Self {
        Self { buy_order, transaction }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSettledEvent {
    pub transaction: Transaction,
}

impl TransactionSettledEvent {
    pub fn new(transaction: Transaction) -> Self {
        Self { transaction }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnulReason {
    /// The buyer did not confirm payment within the expiry window
    Expired,
    /// A party cancelled the transaction
    Cancelled,
}

impl Display for AnnulReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnnulReason::Expired => write!(f, "expired"),
            AnnulReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAnnulledEvent {
    pub transaction: Transaction,
    pub reason: AnnulReason,
}

impl TransactionAnnulledEvent {
    pub fn new(transaction: Transaction, reason: AnnulReason) -> Self {
        Self { transaction, reason }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerNotificationEvent {
    pub notification: SellerNotification,
}
