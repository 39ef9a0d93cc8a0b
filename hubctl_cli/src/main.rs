#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod cli;
mod commands;
mod error_fmt;
mod logging;

use clap::Parser;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = run(&cli) {
        tracing::error!(error = %err, "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn run(cli: &Cli) -> eyre::Result<()> {
    match &cli.cmd {
        Commands::Encode { kind } => {
            logging::init(&cli.log_level, cli.json, &hubctl_config::Logging::default())?;
            commands::encode_cmd(kind, cli.json)
        }
        Commands::Decode {
            hex,
            mode,
            outbound,
        } => {
            logging::init(&cli.log_level, cli.json, &hubctl_config::Logging::default())?;
            if *outbound {
                commands::decode_outbound_cmd(hex, cli.json)
            } else {
                commands::decode_cmd(hex, *mode, cli.json)
            }
        }
        Commands::Simulate(args) => {
            let cfg = commands::load_config(&cli.config)?;
            logging::init(&cli.log_level, cli.json, &cfg.logging)?;
            let stats = commands::simulate(args, &cfg, cli.json)?;
            tracing::info!(?stats, "simulation stopped");
            Ok(())
        }
        Commands::SelfCheck => {
            let cfg = commands::load_config(&cli.config)?;
            logging::init(&cli.log_level, cli.json, &cfg.logging)?;
            commands::self_check(&cli.config, &cfg, cli.json)
        }
    }
}
