//! Referral commissions.
//!
//! Fees are fixed when a transaction is created, using the [`CommissionPolicy`] in force at the time. When the
//! transaction completes, [`distribute_commissions`] credits the referrer of each party. Crediting is best-effort:
//! failures are logged and otherwise ignored, and a (transaction, side) pair is never credited twice.
use log::*;
use p2p_common::TokenAmount;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{CommissionCredit, CommissionFees, Role, Transaction},
    traits::ExchangeDatabase,
};

/// 0.8% of the amount goes to the buyer's referrer
pub const DEFAULT_BUYER_COMMISSION_BPS: u32 = 80;
/// 0.1% of the amount goes to the seller's referrer
pub const DEFAULT_SELLER_COMMISSION_BPS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionPolicy {
    pub buyer_referrer_bps: u32,
    pub seller_referrer_bps: u32,
}

impl Default for CommissionPolicy {
    fn default() -> Self {
        Self { buyer_referrer_bps: DEFAULT_BUYER_COMMISSION_BPS, seller_referrer_bps: DEFAULT_SELLER_COMMISSION_BPS }
    }
}

impl CommissionPolicy {
    pub fn new(buyer_referrer_bps: u32, seller_referrer_bps: u32) -> Self {
        Self { buyer_referrer_bps, seller_referrer_bps }
    }

    /// The commissions owed on a fill of `amount`, rounded down to the smallest token unit.
    pub fn fees_for(&self, amount: TokenAmount) -> CommissionFees {
        CommissionFees {
            buyer_referrer_commission: amount.basis_points(self.buyer_referrer_bps),
            seller_referrer_commission: amount.basis_points(self.seller_referrer_bps),
        }
    }
}

/// Credits the referrers of both parties to a completed transaction. Returns the credits that were applied by this
/// call. Sides without a referrer, or that were already credited, are skipped.
pub async fn distribute_commissions<B: ExchangeDatabase>(db: &B, tx: &Transaction) -> Vec<CommissionCredit> {
    let sides = [
        (Role::Buyer, tx.buyer_id.as_str(), tx.fees.buyer_referrer_commission),
        (Role::Seller, tx.seller_id.as_str(), tx.fees.seller_referrer_commission),
    ];
    let mut credited = Vec::with_capacity(2);
    for (side, wallet, amount) in sides {
        let referrer_code = match db.fetch_user_by_wallet(wallet).await {
            Ok(Some(user)) => match user.parent_ref {
                Some(code) => code,
                None => {
                    trace!("🤝️ The {side} on {} was not referred by anyone", tx.transaction_id);
                    continue;
                },
            },
            Ok(None) => {
                debug!("🤝️ The {side} {wallet} on {} is not a registered user", tx.transaction_id);
                continue;
            },
            Err(e) => {
                error!("🤝️ Could not look up the {side} {wallet} on {}: {e}", tx.transaction_id);
                continue;
            },
        };
        let credit = CommissionCredit {
            transaction_id: tx.transaction_id.clone(),
            side,
            referrer_code,
            volume: tx.amount,
            amount,
        };
        match db.credit_commission(credit.clone()).await {
            Ok(true) => {
                info!("🤝️ {} credited to {} for the {side} side of {}", amount, credit.referrer_code, tx.transaction_id);
                credited.push(credit);
            },
            Ok(false) => debug!("🤝️ The {side} side of {} was already credited", tx.transaction_id),
            Err(e) => error!("🤝️ Could not credit {} for the {side} side of {}: {e}", credit.referrer_code, tx.transaction_id),
        }
    }
    credited
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_fees() {
        let fees = CommissionPolicy::default().fees_for(TokenAmount::from_tokens(250));
        assert_eq!(fees.buyer_referrer_commission, TokenAmount::from(2_000_000));
        assert_eq!(fees.seller_referrer_commission, TokenAmount::from(250_000));
    }

    #[test]
    fn configured_fees_round_down() {
        let policy = CommissionPolicy::new(125, 0);
        let fees = policy.fees_for(TokenAmount::from(1_000_001));
        assert_eq!(fees.buyer_referrer_commission, TokenAmount::from(12_500));
        assert_eq!(fees.seller_referrer_commission, TokenAmount::from(0));
    }
}
