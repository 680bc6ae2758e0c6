use std::str::FromStr;

use p2p_common::TokenAmount;
use p2p_engine::{
    db_types::{NewSellOrder, OrderId, SellOrderStatus, TransactionId, TransactionStatus},
    order_objects::{BuyOrderQueryFilter, MatchRequest, ModifySellOrderRequest, SellOrderQueryFilter},
};
use serde::{Deserialize, Serialize};

use crate::errors::ServerError;

/// The body of `POST /orders`. The `type` field selects the side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NewOrderRequest {
    Sell(NewSellOrder),
    Buy(MatchRequest),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    #[default]
    Sell,
    Buy,
}

/// Query parameters for `GET /orders`. `status` is interpreted according to `type`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderListParams {
    #[serde(rename = "type", default)]
    pub side: OrderSide,
    pub currency: Option<String>,
    pub chain: Option<String>,
    pub status: Option<String>,
    pub user_id: Option<String>,
}

impl OrderListParams {
    pub fn sell_filter(&self) -> Result<SellOrderQueryFilter, ServerError> {
        let mut filter = SellOrderQueryFilter::default();
        if let Some(seller) = &self.user_id {
            filter = filter.with_seller_id(seller);
        }
        if let Some(currency) = &self.currency {
            filter = filter.with_currency(currency);
        }
        if let Some(chain) = &self.chain {
            filter = filter.with_chain(chain);
        }
        if let Some(status) = &self.status {
            let status = SellOrderStatus::from_str(status).map_err(|e| ServerError::InvalidQuery(e.to_string()))?;
            filter = filter.with_status(status);
        }
        Ok(filter)
    }

    /// Buy orders have no currency or chain of their own, so those filters do not apply.
    pub fn buy_filter(&self) -> Result<BuyOrderQueryFilter, ServerError> {
        let mut filter = BuyOrderQueryFilter::default();
        if let Some(buyer) = &self.user_id {
            filter = filter.with_buyer_id(buyer);
        }
        if let Some(status) = &self.status {
            let status = TransactionStatus::from_str(status).map_err(|e| ServerError::InvalidQuery(e.to_string()))?;
            filter = filter.with_status(status);
        }
        Ok(filter)
    }
}

/// The body of `PATCH /orders/{id}`.
///
/// The counters and the fill list are always re-derived on write. If they are present in the body they are accepted
/// and ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModifyOrderParams {
    pub status: Option<SellOrderStatus>,
    pub min_buy_amount: Option<TokenAmount>,
    pub version: Option<i64>,
    pub remaining_balance: Option<serde_json::Value>,
    pub remaining_buyers: Option<serde_json::Value>,
    pub sub_orders: Option<serde_json::Value>,
}

impl ModifyOrderParams {
    pub fn has_derived_fields(&self) -> bool {
        self.remaining_balance.is_some() || self.remaining_buyers.is_some() || self.sub_orders.is_some()
    }
}

impl From<ModifyOrderParams> for ModifySellOrderRequest {
    fn from(params: ModifyOrderParams) -> Self {
        let mut update = ModifySellOrderRequest::default();
        if let Some(status) = params.status {
            update = update.with_new_status(status);
        }
        if let Some(amount) = params.min_buy_amount {
            update = update.with_new_min_buy_amount(amount);
        }
        if let Some(version) = params.version {
            update = update.with_expected_version(version);
        }
        update
    }
}

/// Transaction lookups and updates can name the transaction in the query string rather than the path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQuery {
    pub transaction_id: Option<TransactionId>,
    #[serde(rename = "user_id")]
    pub user_id: Option<String>,
}

/// The body of `PATCH /transactions`.
///
/// Confirmation flags can only be set, never cleared. A buyer and a seller confirmation in the same request are
/// applied in that order. `status: canceled` cancels the transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionUpdate {
    #[serde(default)]
    pub buyer_payment_confirmed: bool,
    #[serde(default)]
    pub seller_payment_confirmed: bool,
    pub status: Option<TransactionStatus>,
}

impl TransactionUpdate {
    pub fn is_cancellation(&self) -> bool {
        matches!(self.status, Some(TransactionStatus::Canceled))
    }

    pub fn is_empty(&self) -> bool {
        !self.buyer_payment_confirmed && !self.seller_payment_confirmed && self.status.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserQuery {
    pub referral_code: Option<String>,
}

/// Extracts the order id from a request path, rejecting blank ids.
pub fn order_id_from_path(id: String) -> Result<OrderId, ServerError> {
    if id.trim().is_empty() {
        return Err(ServerError::InvalidRequestPath("An order id is required".into()));
    }
    Ok(OrderId::from(id))
}
