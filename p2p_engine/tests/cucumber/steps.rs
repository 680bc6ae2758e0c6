use std::{str::FromStr, time::Duration};

use cucumber::{given, then, when};
use p2p_common::{FiatAmount, TokenAmount};
use p2p_engine::{
    db_types::{NewSellOrder, NewUser, Role, SellOrderStatus, TransactionStatus},
    order_objects::MatchRequest,
};

use crate::cucumber::ExchangeWorld;

#[given(expr = "user '{word}' with referral code '{word}' is registered")]
async fn register_user(world: &mut ExchangeWorld, wallet: String, code: String) {
    world.system().users.register(NewUser::new(&wallet, &code)).await.expect("Error registering user");
}

#[given(expr = "user '{word}' with referral code '{word}' is registered, referred by '{word}'")]
async fn register_referred_user(world: &mut ExchangeWorld, wallet: String, code: String, parent: String) {
    let user = NewUser::new(&wallet, &code).with_parent_ref(&parent);
    world.system().users.register(user).await.expect("Error registering user");
}

//             'TSeller' offers 100 USDT on tron at 35 THB for up to 2 buyers as order 'S1'
#[given(expr = "'{word}' offers {int} USDT on {word} at {int} THB for up to {int} buyers as order '{word}'")]
async fn offer(world: &mut ExchangeWorld, seller: String, amount: i64, chain: String, rate: i64, buyers: i64, alias: String) {
    let order = NewSellOrder::new(&seller, TokenAmount::from_tokens(amount), "USDT", &chain)
        .with_rate("TH", FiatAmount::from_units(rate))
        .with_num_buyers(buyers)
        .with_min_buy_amount(TokenAmount::from_tokens(1));
    let order = world.system().matching.create_sell_order(order).await.expect("Error creating sell order");
    world.orders.insert(alias, order.order_id);
}

#[when(expr = "'{word}' buys {int} USDT from order '{word}' as trade '{word}'")]
async fn buy(world: &mut ExchangeWorld, buyer: String, amount: i64, order: String, alias: String) {
    let request = MatchRequest::new(world.order(&order), &buyer, TokenAmount::from_tokens(amount), "TH");
    let result = world.system().matching.match_buy(request).await.expect("Error matching buyer");
    world.trades.insert(alias, result.transaction.transaction_id);
}

#[when(expr = "'{word}' tries to buy {int} USDT from order '{word}'")]
async fn try_buy(world: &mut ExchangeWorld, buyer: String, amount: i64, order: String) {
    let request = MatchRequest::new(world.order(&order), &buyer, TokenAmount::from_tokens(amount), "TH");
    world.last_error = world.system().matching.match_buy(request).await.err();
}

#[when(expr = "the {word} confirms payment for trade '{word}'")]
async fn confirm(world: &mut ExchangeWorld, role: String, trade: String) {
    let role = Role::from_str(&role).expect("Not a valid role");
    let tx_id = world.trade(&trade);
    world.last_error = world.system().settlement.confirm_payment(&tx_id, role).await.err();
}

#[when(expr = "trade '{word}' is cancelled")]
async fn cancel(world: &mut ExchangeWorld, trade: String) {
    let tx_id = world.trade(&trade);
    world.last_error = world.system().settlement.cancel_transaction(&tx_id).await.err();
}

#[when(expr = "I pause for {int}ms")]
async fn pause(_world: &mut ExchangeWorld, ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[when("the expiry reaper runs")]
async fn run_reaper(world: &mut ExchangeWorld) {
    let result = world.system().settlement.expire_stale_transactions().await.expect("Error running the reaper");
    assert_eq!(result.failures, 0, "The reaper reported failures");
}

#[then(expr = "trade '{word}' is {word}")]
async fn check_trade_status(world: &mut ExchangeWorld, trade: String, status: String) {
    let expected = TransactionStatus::from_str(&status).expect("Not a valid transaction status");
    let tx = world.system().settlement.fetch_transaction(&world.trade(&trade)).await.expect("Error fetching trade");
    assert_eq!(tx.status, expected);
}

#[then(expr = "order '{word}' is {word}")]
async fn check_order_status(world: &mut ExchangeWorld, order: String, status: String) {
    let expected = SellOrderStatus::from_str(&status).expect("Not a valid sell order status");
    let order = world.system().matching.fetch_sell_order(&world.order(&order)).await.expect("Error fetching order");
    assert_eq!(order.status, expected);
}

#[then(expr = "order '{word}' has {int} USDT left for {int} buyers")]
async fn check_capacity(world: &mut ExchangeWorld, order: String, amount: i64, buyers: i64) {
    let order = world.system().matching.fetch_sell_order(&world.order(&order)).await.expect("Error fetching order");
    assert_eq!(order.remaining_balance, TokenAmount::from_tokens(amount), "Remaining balance is incorrect");
    assert_eq!(order.remaining_buyers, buyers, "Remaining buyers is incorrect");
}

#[then(expr = "the last request failed with {word}")]
async fn check_last_error(world: &mut ExchangeWorld, kind: String) {
    let err = world.last_error.take().expect("The last request succeeded");
    assert!(format!("{err:?}").starts_with(&kind), "Expected {kind}, got {err:?}");
}

#[then("the last request succeeded")]
async fn check_no_error(world: &mut ExchangeWorld) {
    if let Some(err) = world.last_error.take() {
        panic!("The last request failed: {err}");
    }
}

#[then(expr = "user '{word}' has earned {word} USDT from {int} {word} referrals")]
async fn check_referral_earnings(world: &mut ExchangeWorld, wallet: String, earned: String, count: i64, side: String) {
    let side = Role::from_str(&side).expect("Not a valid side");
    let user = world.system().users.user_by_wallet(&wallet).await.expect("Error fetching user");
    assert_eq!(user.referral_earnings.to_string(), earned, "Referral earnings are incorrect");
    assert_eq!(user.referral_transactions.for_side(side).count, count, "Referral count is incorrect");
}

#[then(expr = "the platform wallet holds {int} USDT")]
async fn check_platform_balance(world: &mut ExchangeWorld, amount: i64) {
    assert_eq!(world.system().rail.balance(), TokenAmount::from_tokens(amount));
}
