use std::sync::{Arc, Mutex};

use log::*;
use p2p_common::TokenAmount;

use crate::{
    helpers::new_prefixed_id,
    traits::{PaymentRail, PaymentRailError, PayoutReceipt, PayoutRequest},
};

/// An in-process payment rail that pays out of a fixed platform balance.
///
/// It is the rail the server uses when no chain integration is configured, and it behaves like a real one as far as
/// the settlement flow can tell: transfers in the wrong token are refused, and a transfer that the balance can't
/// cover fails without side effects.
#[derive(Debug, Clone)]
pub struct SimulatedPaymentRail {
    token: String,
    balance: Arc<Mutex<TokenAmount>>,
}

impl SimulatedPaymentRail {
    pub fn new(token: &str, balance: TokenAmount) -> Self {
        Self { token: token.to_string(), balance: Arc::new(Mutex::new(balance)) }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// The current platform balance, or zero if the balance lock has been poisoned.
    pub fn balance(&self) -> TokenAmount {
        self.balance.lock().map(|b| *b).unwrap_or_default()
    }
}

impl PaymentRail for SimulatedPaymentRail {
    async fn transfer(&self, request: PayoutRequest) -> Result<PayoutReceipt, PaymentRailError> {
        if !request.currency.eq_ignore_ascii_case(&self.token) {
            return Err(PaymentRailError::MisconfiguredToken(format!(
                "this rail pays out {}, but {} was requested",
                self.token, request.currency
            )));
        }
        if !request.amount.is_positive() {
            return Err(PaymentRailError::Rejected(format!("{} is not a valid payout amount", request.amount)));
        }
        let mut balance =
            self.balance.lock().map_err(|_| PaymentRailError::Rejected("the platform balance is unavailable".into()))?;
        if *balance < request.amount {
            return Err(PaymentRailError::InsufficientPlatformBalance {
                requested: request.amount,
                available: *balance,
            });
        }
        *balance -= request.amount;
        let reference = new_prefixed_id("PAYOUT");
        info!(
            "💸️ Simulated payout {reference}: {} {} to {} on {} for {}",
            request.amount, self.token, request.recipient, request.chain, request.transaction_id
        );
        Ok(PayoutReceipt { reference, amount: request.amount })
    }
}
