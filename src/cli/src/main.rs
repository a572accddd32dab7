//! Kiln CLI entry point.

use clap::Parser;

use kiln_cli::commands::{dispatch, Cli};
use kiln_cli::logging;
use kiln_core::KilnConfig;

fn main() {
    let config = match KilnConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&config.log);

    let cli = Cli::parse();

    if let Err(e) = dispatch(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
