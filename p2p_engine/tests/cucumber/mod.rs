mod exchange_world;
mod setups;
mod steps;

pub use exchange_world::{ExchangeSystem, ExchangeWorld};
