//! Data types persisted by the exchange engine.
//!
//! Amounts are carried as [`TokenAmount`] (the escrowed token) and prices as [`FiatAmount`] (fiat per whole token).
//! The [`SellOrder`] is the aggregate root of the order store: its `sub_orders` are the fills made against it, and
//! `remaining_balance` / `remaining_buyers` are cached values that are always re-derived from the fill list.
use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use log::error;
use p2p_common::{FiatAmount, TokenAmount};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

use crate::{helpers::new_prefixed_id, traits::ExchangeError};

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub const BUY_PREFIX: &'static str = "BUY";
    pub const SELL_PREFIX: &'static str = "SELL";

    pub fn new_sell() -> Self {
        Self(new_prefixed_id(Self::SELL_PREFIX))
    }

    pub fn new_buy() -> Self {
        Self(new_prefixed_id(Self::BUY_PREFIX))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_buy(&self) -> bool {
        self.0.starts_with(Self::BUY_PREFIX)
    }
}

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------     TransactionId     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl TransactionId {
    pub const PREFIX: &'static str = "TX";

    pub fn new_random() -> Self {
        Self(new_prefixed_id(Self::PREFIX))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TransactionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TransactionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

//--------------------------------------    SellOrderStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SellOrderStatus {
    /// The order is open and no fill is currently in progress.
    Active,
    /// At least one fill is in progress.
    Matching,
    /// The order is closed. No further fills are accepted.
    Completed,
}

impl Display for SellOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SellOrderStatus::Active => write!(f, "active"),
            SellOrderStatus::Matching => write!(f, "matching"),
            SellOrderStatus::Completed => write!(f, "completed"),
        }
    }
}

impl FromStr for SellOrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "matching" => Ok(Self::Matching),
            "completed" => Ok(Self::Completed),
            s => Err(ConversionError(format!("Invalid sell order status: {s}"))),
        }
    }
}

//--------------------------------------   TransactionStatus   ---------------------------------------------------------
/// The settlement status of a fill. Transactions, their buy orders and their sub-order entries share this status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Created by a match. Neither party has confirmed.
    Pending,
    /// The buyer has confirmed payment; waiting on the seller.
    Matching,
    /// Both parties confirmed and the tokens were released.
    Completed,
    /// Cancelled by a party or expired.
    Canceled,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Canceled)
    }
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Matching => write!(f, "matching"),
            TransactionStatus::Completed => write!(f, "completed"),
            TransactionStatus::Canceled => write!(f, "canceled"),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "matching" => Ok(Self::Matching),
            "completed" => Ok(Self::Completed),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            s => Err(ConversionError(format!("Invalid transaction status: {s}"))),
        }
    }
}

impl From<String> for TransactionStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid transaction status: {value}. But this conversion cannot fail. Defaulting to pending");
            TransactionStatus::Pending
        })
    }
}

//--------------------------------------      PayoutState      ---------------------------------------------------------
/// Tracks the release of escrowed tokens to the buyer so that a payout is never submitted twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayoutState {
    Idle,
    InFlight,
    Released,
}

impl Display for PayoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayoutState::Idle => write!(f, "idle"),
            PayoutState::InFlight => write!(f, "in_flight"),
            PayoutState::Released => write!(f, "released"),
        }
    }
}

//--------------------------------------          Role         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Buyer => write!(f, "buyer"),
            Role::Seller => write!(f, "seller"),
        }
    }
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buyer" | "buy" => Ok(Self::Buyer),
            "seller" | "sell" => Ok(Self::Seller),
            s => Err(ConversionError(format!("Invalid role: {s}"))),
        }
    }
}

//--------------------------------------        SubOrder       ---------------------------------------------------------
/// One buyer's fill against a sell order. The `id` is the id of the transaction that backs the fill.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SubOrder {
    pub id: TransactionId,
    pub sell_order_id: OrderId,
    pub buyer_id: String,
    pub amount: TokenAmount,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubOrder {
    pub fn for_transaction(tx: &Transaction, status: TransactionStatus, now: DateTime<Utc>) -> Self {
        Self {
            id: tx.transaction_id.clone(),
            sell_order_id: tx.sell_order_id.clone(),
            buyer_id: tx.buyer_id.clone(),
            amount: tx.amount,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn counts_against_capacity(&self) -> bool {
        self.status != TransactionStatus::Canceled
    }
}

/// The capacity left on a sell order, derived from its fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillAggregates {
    pub remaining_balance: TokenAmount,
    pub remaining_buyers: i64,
}

impl FillAggregates {
    /// Derives the remaining capacity from scratch. Cancelled fills release their amount and their buyer slot.
    pub fn from_fills(amount: TokenAmount, num_buyers: i64, fills: &[SubOrder]) -> Self {
        let live = fills.iter().filter(|s| s.counts_against_capacity());
        let (filled, count) = live.fold((TokenAmount::default(), 0i64), |(sum, n), s| (sum + s.amount, n + 1));
        Self { remaining_balance: amount - filled, remaining_buyers: num_buyers - count }
    }
}

//--------------------------------------       SellOrder       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellOrder {
    pub id: i64,
    pub order_id: OrderId,
    pub seller_id: String,
    pub amount: TokenAmount,
    pub currency: String,
    pub chain: String,
    pub country_codes: Vec<String>,
    pub rates: BTreeMap<String, FiatAmount>,
    pub num_buyers: i64,
    pub min_buy_amount: TokenAmount,
    pub sub_orders: Vec<SubOrder>,
    pub remaining_balance: TokenAmount,
    pub remaining_buyers: i64,
    pub status: SellOrderStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SellOrder {
    pub fn rate_for(&self, country_code: &str) -> Option<FiatAmount> {
        self.rates.get(&country_code.to_ascii_uppercase()).copied()
    }

    pub fn has_live_fills(&self) -> bool {
        self.sub_orders.iter().any(|s| !s.status.is_terminal())
    }

    pub fn aggregates(&self) -> FillAggregates {
        FillAggregates::from_fills(self.amount, self.num_buyers, &self.sub_orders)
    }

    /// The status the order should have given its current fills.
    ///
    /// * Closed orders stay closed.
    /// * Any fill in progress makes the order `Matching`.
    /// * Once nothing is in progress, the order is `Completed` if at least one fill settled and there is no
    ///   sellable capacity left, and `Active` otherwise.
    pub fn derive_status(&self) -> SellOrderStatus {
        if self.status == SellOrderStatus::Completed {
            return SellOrderStatus::Completed;
        }
        if self.has_live_fills() {
            return SellOrderStatus::Matching;
        }
        let settled = self.sub_orders.iter().any(|s| s.status == TransactionStatus::Completed);
        let agg = self.aggregates();
        let exhausted = agg.remaining_buyers <= 0 || agg.remaining_balance < self.min_buy_amount;
        if settled && exhausted {
            SellOrderStatus::Completed
        } else {
            SellOrderStatus::Active
        }
    }

    /// Re-derives the cached counters and the status from the fill list.
    pub fn recalculate(&mut self) {
        let agg = self.aggregates();
        self.remaining_balance = agg.remaining_balance;
        self.remaining_buyers = agg.remaining_buyers;
        self.status = self.derive_status();
    }

    /// Inserts the fill, or replaces the entry with the same id.
    pub fn upsert_fill(&mut self, fill: SubOrder) {
        match self.sub_orders.iter_mut().find(|s| s.id == fill.id) {
            Some(existing) => {
                existing.status = fill.status;
                existing.updated_at = fill.updated_at;
            },
            None => self.sub_orders.push(fill),
        }
    }

    /// Checks that a new fill of `amount` fits, after setting aside capacity held by `in_flight` transactions
    /// that are not tracked as fills yet.
    pub fn check_capacity(&self, amount: TokenAmount, in_flight: &[Transaction]) -> Result<(), ExchangeError> {
        if self.status == SellOrderStatus::Completed {
            return Err(ExchangeError::CapacityExceeded(format!("Sell order {} is closed", self.order_id)));
        }
        if amount < self.min_buy_amount {
            return Err(ExchangeError::CapacityExceeded(format!(
                "{amount} is below the minimum buy amount of {} for sell order {}",
                self.min_buy_amount, self.order_id
            )));
        }
        let untracked = in_flight.iter().filter(|t| t.status == TransactionStatus::Pending);
        let (held, holders) = untracked.fold((TokenAmount::default(), 0i64), |(sum, n), t| (sum + t.amount, n + 1));
        let agg = self.aggregates();
        let available = agg.remaining_balance - held;
        let free_slots = agg.remaining_buyers - holders;
        if free_slots <= 0 {
            return Err(ExchangeError::CapacityExceeded(format!(
                "Sell order {} has no buyer slots left ({} of {} in use)",
                self.order_id,
                self.num_buyers - free_slots,
                self.num_buyers
            )));
        }
        if amount > available {
            return Err(ExchangeError::CapacityExceeded(format!(
                "{amount} exceeds the {available} available on sell order {}",
                self.order_id
            )));
        }
        Ok(())
    }
}

//--------------------------------------      NewSellOrder     ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSellOrder {
    pub seller_id: String,
    pub amount: TokenAmount,
    pub currency: String,
    pub chain: String,
    pub country_codes: Vec<String>,
    pub rates: BTreeMap<String, FiatAmount>,
    pub num_buyers: i64,
    pub min_buy_amount: TokenAmount,
}

impl NewSellOrder {
    pub fn new(seller_id: &str, amount: TokenAmount, currency: &str, chain: &str) -> Self {
        Self {
            seller_id: seller_id.to_string(),
            amount,
            currency: currency.to_string(),
            chain: chain.to_string(),
            country_codes: Vec::new(),
            rates: BTreeMap::new(),
            num_buyers: 1,
            min_buy_amount: amount,
        }
    }

    pub fn with_rate(mut self, country_code: &str, price: FiatAmount) -> Self {
        let code = country_code.to_ascii_uppercase();
        if !self.country_codes.contains(&code) {
            self.country_codes.push(code.clone());
        }
        self.rates.insert(code, price);
        self
    }

    pub fn with_num_buyers(mut self, num_buyers: i64) -> Self {
        self.num_buyers = num_buyers;
        self
    }

    pub fn with_min_buy_amount(mut self, min_buy_amount: TokenAmount) -> Self {
        self.min_buy_amount = min_buy_amount;
        self
    }

    /// Upper-cases the country codes and rate keys so that lookups are case-insensitive.
    pub fn normalized(mut self) -> Self {
        self.country_codes = self.country_codes.iter().map(|c| c.trim().to_ascii_uppercase()).collect();
        self.rates = self.rates.into_iter().map(|(k, v)| (k.trim().to_ascii_uppercase(), v)).collect();
        self
    }

    /// Checks the terms of the order. Every listed country must have a positive price.
    pub fn validate(&self) -> Result<(), ExchangeError> {
        if self.seller_id.trim().is_empty() {
            return Err(ExchangeError::InvalidOrder("A seller id is required".into()));
        }
        if self.currency.trim().is_empty() || self.chain.trim().is_empty() {
            return Err(ExchangeError::InvalidOrder("Both currency and chain are required".into()));
        }
        if !self.amount.is_positive() {
            return Err(ExchangeError::InvalidOrder(format!("The amount must be positive, not {}", self.amount)));
        }
        if self.num_buyers < 1 {
            return Err(ExchangeError::InvalidOrder("At least one buyer must be allowed".into()));
        }
        if !self.min_buy_amount.is_positive() || self.min_buy_amount > self.amount {
            return Err(ExchangeError::InvalidOrder(format!(
                "The minimum buy amount {} must be positive and no more than {}",
                self.min_buy_amount, self.amount
            )));
        }
        if self.country_codes.is_empty() {
            return Err(ExchangeError::InvalidOrder("At least one country code is required".into()));
        }
        for code in &self.country_codes {
            match self.rates.get(code) {
                Some(rate) if rate.is_positive() => {},
                Some(rate) => {
                    return Err(ExchangeError::InvalidRateMapping(format!("The rate for {code} must be positive, not {rate}")))
                },
                None => return Err(ExchangeError::InvalidRateMapping(format!("No rate was given for {code}"))),
            }
        }
        Ok(())
    }
}

//--------------------------------------        BuyOrder       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct BuyOrder {
    pub id: i64,
    pub order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer_id: String,
    pub amount: TokenAmount,
    /// The total fiat price of the fill
    pub price: FiatAmount,
    /// The effective rate (fiat per token) for the buyer's payment country
    pub rate: FiatAmount,
    pub payment_country: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------     CommissionFees    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionFees {
    pub buyer_referrer_commission: TokenAmount,
    pub seller_referrer_commission: TokenAmount,
}

//--------------------------------------      Transaction      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub transaction_id: TransactionId,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer_id: String,
    pub seller_id: String,
    pub amount: TokenAmount,
    pub price: FiatAmount,
    pub total_price: FiatAmount,
    pub currency: String,
    pub chain: String,
    pub buyer_payment_confirmed: bool,
    pub seller_payment_confirmed: bool,
    pub status: TransactionStatus,
    pub fees: CommissionFees,
    pub payout_state: PayoutState,
    pub payout_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// A transaction is tracked on its sell order once the buyer has confirmed payment.
    pub fn is_tracked(&self) -> bool {
        self.buyer_payment_confirmed
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// True if `window`, measured from creation, has elapsed at `now`.
    pub fn window_elapsed(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.age(now) >= window
    }
}

//--------------------------------------        NewMatch       ---------------------------------------------------------
/// Everything needed to create the buy order and transaction for one fill, in a single atomic step.
#[derive(Debug, Clone)]
pub struct NewMatch {
    pub sell_order_id: OrderId,
    pub buyer_id: String,
    pub amount: TokenAmount,
    pub payment_country: String,
    pub fees: CommissionFees,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------        User           ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralStats {
    pub count: i64,
    pub volume: TokenAmount,
    pub earnings: TokenAmount,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralTransactions {
    pub buy: ReferralStats,
    pub sell: ReferralStats,
}

impl ReferralTransactions {
    pub fn for_side(&self, side: Role) -> &ReferralStats {
        match side {
            Role::Buyer => &self.buy,
            Role::Seller => &self.sell,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub wallet_address: String,
    pub referral_code: String,
    pub parent_ref: Option<String>,
    pub referral_earnings: TokenAmount,
    pub referral_transactions: ReferralTransactions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub wallet_address: String,
    pub referral_code: String,
    #[serde(default)]
    pub parent_ref: Option<String>,
}

impl NewUser {
    pub fn new(wallet_address: &str, referral_code: &str) -> Self {
        Self { wallet_address: wallet_address.to_string(), referral_code: referral_code.to_string(), parent_ref: None }
    }

    pub fn with_parent_ref(mut self, parent_ref: &str) -> Self {
        self.parent_ref = Some(parent_ref.to_string());
        self
    }
}

//--------------------------------------    CommissionCredit   ---------------------------------------------------------
/// A single referral payout: the referrer of one side of a settled transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionCredit {
    pub transaction_id: TransactionId,
    pub side: Role,
    pub referrer_code: String,
    pub volume: TokenAmount,
    pub amount: TokenAmount,
}

//--------------------------------------      Notification     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A buyer matched against this seller's own order.
    NewBuyer,
    /// A buyer matched elsewhere in a market (currency + chain) this seller also trades in.
    MarketActivity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerNotification {
    pub seller_id: String,
    pub sell_order_id: OrderId,
    pub buy_order_id: OrderId,
    pub transaction_id: TransactionId,
    pub kind: NotificationKind,
    pub message: String,
}
