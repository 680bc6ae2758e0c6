use serde::{Deserialize, Serialize};

use crate::db_types::{BuyOrder, OrderId, SellOrder, Transaction};

/// The records written by a successful match. `sell_order` is the state of the sell order after the match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedOrder {
    pub sell_order: SellOrder,
    pub buy_order: BuyOrder,
    pub transaction: Transaction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileResult {
    pub sell_order: SellOrder,
    /// The number of fill entries that were added or corrected
    pub repaired: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpiryResult {
    pub expired: Vec<Transaction>,
    pub reconciled: Vec<OrderId>,
    pub failures: usize,
}

impl ExpiryResult {
    pub fn expired_count(&self) -> usize {
        self.expired.len()
    }

    pub fn reconciled_count(&self) -> usize {
        self.reconciled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.reconciled.is_empty() && self.failures == 0
    }
}
