//! automix - beat-synchronous remix of two songs and a drum track
//!
//! ## Commands
//!
//! - `automix mix <FIRST> <SECOND>`: align, mix, export and play a remix
//! - `automix tracks`: numbered song listing with tags
//! - `automix recipes`: numbered recipe listing
//!
//! Set `RUST_LOG=debug` to see per-beat alignment corrections.

mod cli;
mod playback;
mod presenter;

use clap::Parser;

fn main() -> anyhow::Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = cli::Cli::parse();
    log::info!("automix starting up");
    cli::run(cli)
}
