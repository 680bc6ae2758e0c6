use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    const DISPLAY_ENVS: [&str; 13] = [
        "RUST_LOG",
        "P2P_HOST",
        "P2P_PORT",
        "P2P_DATABASE_URL",
        "P2P_EXPIRY_WINDOW",
        "P2P_SETTLEMENT_WINDOW",
        "P2P_REAPER_INTERVAL",
        "P2P_REAPER_ENABLED",
        "P2P_PAYOUT_TIMEOUT",
        "P2P_BUYER_COMMISSION_BPS",
        "P2P_SELLER_COMMISSION_BPS",
        "P2P_SIMULATED_RAIL_BALANCE",
        "P2P_PAYOUT_TOKEN",
    ];

    println!("Current environment values:");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
