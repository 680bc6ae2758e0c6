use cucumber::given;
use p2p_engine::{DEFAULT_EXPIRY_WINDOW, DEFAULT_SETTLEMENT_WINDOW};

use crate::cucumber::{ExchangeSystem, ExchangeWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut ExchangeWorld) {
    let system = ExchangeSystem::new(
        chrono::Duration::seconds(DEFAULT_EXPIRY_WINDOW),
        chrono::Duration::seconds(DEFAULT_SETTLEMENT_WINDOW),
    )
    .await;
    world.system = Some(system);
}

#[given(expr = "a fresh install with an expiry window of {int}ms")]
async fn fresh_database_with_window(world: &mut ExchangeWorld, window_ms: i64) {
    let system = ExchangeSystem::new(
        chrono::Duration::milliseconds(window_ms),
        chrono::Duration::seconds(DEFAULT_SETTLEMENT_WINDOW),
    )
    .await;
    world.system = Some(system);
}

#[given(expr = "a fresh install with an expiry window of {int}ms and a settlement window of {int}ms")]
async fn fresh_database_with_windows(world: &mut ExchangeWorld, window_ms: i64, settlement_ms: i64) {
    let system =
        ExchangeSystem::new(chrono::Duration::milliseconds(window_ms), chrono::Duration::milliseconds(settlement_ms))
            .await;
    world.system = Some(system);
}
