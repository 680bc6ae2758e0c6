use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::*;
use p2p_common::{helpers::parse_boolean_flag, TokenAmount};
use p2p_engine::{
    commissions::{DEFAULT_BUYER_COMMISSION_BPS, DEFAULT_SELLER_COMMISSION_BPS},
    CommissionPolicy,
    DEFAULT_EXPIRY_WINDOW,
    DEFAULT_PAYOUT_TIMEOUT,
    DEFAULT_SETTLEMENT_WINDOW,
};

const DEFAULT_P2P_HOST: &str = "127.0.0.1";
const DEFAULT_P2P_PORT: u16 = 8370;
const DEFAULT_REAPER_INTERVAL: u64 = 30;
const DEFAULT_SIMULATED_RAIL_BALANCE: i64 = 1_000_000;
const DEFAULT_PAYOUT_TOKEN: &str = "USDT";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// How long a buyer-unconfirmed transaction may stay pending. Users can cancel inside this window; the reaper
    /// cancels the transaction once it has passed.
    pub expiry_window: chrono::Duration,
    /// How long, from the match, the seller has to confirm a buyer-confirmed transaction.
    pub settlement_window: chrono::Duration,
    /// How often the expiry reaper sweeps for stale transactions.
    pub reaper_interval: Duration,
    /// If false, the expiry reaper is not started. Stale transactions then stay pending until an operator sweeps.
    pub reaper_enabled: bool,
    /// The longest a single payout may take before it is reported as a network timeout.
    pub payout_timeout: Duration,
    pub commission_policy: CommissionPolicy,
    /// The opening balance of the simulated platform wallet.
    pub simulated_rail_balance: TokenAmount,
    /// The token the platform wallet pays out in.
    pub payout_token: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_P2P_HOST.to_string(),
            port: DEFAULT_P2P_PORT,
            database_url: String::default(),
            expiry_window: chrono::Duration::seconds(DEFAULT_EXPIRY_WINDOW),
            settlement_window: chrono::Duration::seconds(DEFAULT_SETTLEMENT_WINDOW),
            reaper_interval: Duration::from_secs(DEFAULT_REAPER_INTERVAL),
            reaper_enabled: true,
            payout_timeout: DEFAULT_PAYOUT_TIMEOUT,
            commission_policy: CommissionPolicy::default(),
            simulated_rail_balance: TokenAmount::from_tokens(DEFAULT_SIMULATED_RAIL_BALANCE),
            payout_token: DEFAULT_PAYOUT_TOKEN.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("P2P_HOST").ok().unwrap_or_else(|| DEFAULT_P2P_HOST.into());
        let port = env::var("P2P_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for P2P_PORT. {e} Using the default, {DEFAULT_P2P_PORT}, instead."
                    );
                    DEFAULT_P2P_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_P2P_PORT);
        let database_url = env::var("P2P_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ P2P_DATABASE_URL is not set. Please set it to the URL for the exchange database.");
            String::default()
        });
        let expiry_window = chrono::Duration::seconds(env_or_default("P2P_EXPIRY_WINDOW", DEFAULT_EXPIRY_WINDOW));
        let mut settlement_window =
            chrono::Duration::seconds(env_or_default("P2P_SETTLEMENT_WINDOW", DEFAULT_SETTLEMENT_WINDOW));
        if settlement_window < expiry_window {
            warn!(
                "🪛️ P2P_SETTLEMENT_WINDOW ({}s) is shorter than P2P_EXPIRY_WINDOW. Using {}s instead.",
                settlement_window.num_seconds(),
                expiry_window.num_seconds()
            );
            settlement_window = expiry_window;
        }
        let reaper_interval = Duration::from_secs(env_or_default("P2P_REAPER_INTERVAL", DEFAULT_REAPER_INTERVAL));
        let reaper_enabled = parse_boolean_flag(env::var("P2P_REAPER_ENABLED").ok(), true);
        let payout_timeout =
            Duration::from_secs(env_or_default("P2P_PAYOUT_TIMEOUT", DEFAULT_PAYOUT_TIMEOUT.as_secs()));
        let commission_policy = CommissionPolicy::new(
            env_or_default("P2P_BUYER_COMMISSION_BPS", DEFAULT_BUYER_COMMISSION_BPS),
            env_or_default("P2P_SELLER_COMMISSION_BPS", DEFAULT_SELLER_COMMISSION_BPS),
        );
        let simulated_rail_balance =
            TokenAmount::from_tokens(env_or_default("P2P_SIMULATED_RAIL_BALANCE", DEFAULT_SIMULATED_RAIL_BALANCE));
        let payout_token = env::var("P2P_PAYOUT_TOKEN")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PAYOUT_TOKEN.to_string());
        Self {
            host,
            port,
            database_url,
            expiry_window,
            settlement_window,
            reaper_interval,
            reaper_enabled,
            payout_timeout,
            commission_policy,
            simulated_rail_balance,
            payout_token,
        }
    }
}

/// Reads and parses an environment variable, falling back to `default` if it is missing or invalid.
fn env_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    env::var(name)
        .map_err(|_| info!("🪛️ {name} is not set. Using the default value of {default}."))
        .and_then(|s| {
            s.trim()
                .parse::<T>()
                .map_err(|e| warn!("🪛️ Invalid configuration value for {name}: {s}. {e}. Using {default} instead."))
        })
        .unwrap_or(default)
}
