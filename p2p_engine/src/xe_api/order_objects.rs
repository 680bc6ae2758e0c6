use std::fmt::Display;

use chrono::{DateTime, Utc};
use p2p_common::TokenAmount;
use serde::{Deserialize, Serialize};

use crate::db_types::{
    BuyOrder,
    OrderId,
    SellOrder,
    SellOrderStatus,
    SellerNotification,
    Transaction,
    TransactionStatus,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SellOrderQueryFilter {
    pub seller_id: Option<String>,
    pub currency: Option<String>,
    pub chain: Option<String>,
    pub country_code: Option<String>,
    pub status: Option<Vec<SellOrderStatus>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl SellOrderQueryFilter {
    pub fn with_seller_id<S: Into<String>>(mut self, seller_id: S) -> Self {
        self.seller_id = Some(seller_id.into());
        self
    }

    pub fn with_currency<S: Into<String>>(mut self, currency: S) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_chain<S: Into<String>>(mut self, chain: S) -> Self {
        self.chain = Some(chain.into());
        self
    }

    pub fn with_country_code(mut self, code: &str) -> Self {
        self.country_code = Some(code.to_ascii_uppercase());
        self
    }

    pub fn with_status(mut self, status: SellOrderStatus) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    /// Restricts the search to orders that still accept fills.
    pub fn open_only(self) -> Self {
        self.with_status(SellOrderStatus::Active).with_status(SellOrderStatus::Matching)
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.seller_id.is_none() &&
            self.currency.is_none() &&
            self.chain.is_none() &&
            self.country_code.is_none() &&
            self.status.as_ref().map(|s| s.is_empty()).unwrap_or(true) &&
            self.since.is_none() &&
            self.until.is_none()
    }
}

impl Display for SellOrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No filters.");
        }
        if let Some(seller_id) = &self.seller_id {
            write!(f, "seller_id: {seller_id}. ")?;
        }
        if let Some(currency) = &self.currency {
            write!(f, "currency: {currency}. ")?;
        }
        if let Some(chain) = &self.chain {
            write!(f, "chain: {chain}. ")?;
        }
        if let Some(code) = &self.country_code {
            write!(f, "country: {code}. ")?;
        }
        if let Some(statuses) = &self.status {
            let statuses = statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "statuses: [{statuses}]. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until {until}. ")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuyOrderQueryFilter {
    pub buyer_id: Option<String>,
    pub sell_order_id: Option<OrderId>,
    pub status: Option<Vec<TransactionStatus>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl BuyOrderQueryFilter {
    pub fn with_buyer_id<S: Into<String>>(mut self, buyer_id: S) -> Self {
        self.buyer_id = Some(buyer_id.into());
        self
    }

    pub fn with_sell_order_id(mut self, sell_order_id: OrderId) -> Self {
        self.sell_order_id = Some(sell_order_id);
        self
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.buyer_id.is_none() &&
            self.sell_order_id.is_none() &&
            self.status.as_ref().map(|s| s.is_empty()).unwrap_or(true) &&
            self.since.is_none() &&
            self.until.is_none()
    }
}

impl Display for BuyOrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No filters.");
        }
        if let Some(buyer_id) = &self.buyer_id {
            write!(f, "buyer_id: {buyer_id}. ")?;
        }
        if let Some(sell_order_id) = &self.sell_order_id {
            write!(f, "sell_order_id: {sell_order_id}. ")?;
        }
        if let Some(statuses) = &self.status {
            let statuses = statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "statuses: [{statuses}]. ")?;
        }
        Ok(())
    }
}

/// An operator update to a sell order.
///
/// Only the status and the minimum buy amount can be set. The fill list and the remaining capacity are always
/// re-derived on write, so there are no fields for them. If `expected_version` is given, the update only applies
/// to that version of the order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModifySellOrderRequest {
    pub new_status: Option<SellOrderStatus>,
    pub new_min_buy_amount: Option<TokenAmount>,
    pub expected_version: Option<i64>,
}

impl ModifySellOrderRequest {
    pub fn with_new_status(mut self, status: SellOrderStatus) -> Self {
        self.new_status = Some(status);
        self
    }

    pub fn with_new_min_buy_amount(mut self, amount: TokenAmount) -> Self {
        self.new_min_buy_amount = Some(amount);
        self
    }

    pub fn with_expected_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// True if the request changes nothing, and so only asks for the order to be recomputed.
    pub fn is_empty(&self) -> bool {
        self.new_status.is_none() && self.new_min_buy_amount.is_none()
    }
}

/// A buyer's request to take part of a sell order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRequest {
    pub sell_order_id: OrderId,
    pub buyer_id: String,
    pub amount: TokenAmount,
    pub payment_country: String,
}

impl MatchRequest {
    pub fn new(sell_order_id: OrderId, buyer_id: &str, amount: TokenAmount, payment_country: &str) -> Self {
        Self { sell_order_id, buyer_id: buyer_id.to_string(), amount, payment_country: payment_country.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub order: BuyOrder,
    pub transaction: Transaction,
    pub notifications: Vec<SellerNotification>,
}

/// The result of looking an order up by id, when the caller doesn't know which side it is on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "order", rename_all = "lowercase")]
pub enum AnyOrder {
    Sell(SellOrder),
    Buy(BuyOrder),
}

impl AnyOrder {
    pub fn order_id(&self) -> &OrderId {
        match self {
            AnyOrder::Sell(o) => &o.order_id,
            AnyOrder::Buy(o) => &o.order_id,
        }
    }
}
