// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Huddle - burst-coalescing dispatch scheduler for chat assistants.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::{Parser, Subcommand};

mod serve;

/// Huddle - burst-coalescing dispatch scheduler for chat assistants.
#[derive(Parser, Debug)]
#[command(name = "huddle", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the scheduler: gateway, watchdog, and periodic sweeps.
    Serve,
    /// Print the resolved configuration and exit.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match huddle_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            huddle_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run(config).await {
                eprintln!("huddle: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Config) => {
            // Secrets stay out of the dump.
            let mut shown = config.clone();
            shown.gateway.bearer_token = shown.gateway.bearer_token.map(|_| "***".to_string());
            match serde_json::to_string_pretty(&shown) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("huddle: failed to render config: {e}");
                    std::process::exit(1);
                }
            }
        }
        None => {
            println!("huddle: use --help for available commands");
        }
    }
}
