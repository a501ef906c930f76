// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point for sending cohort operator commands.
// Author: Lukas Bower
#![warn(missing_docs)]

//! Operator command tool for a running cohort coordinator.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use cohort::config::Config;
use cohort::connect_and_send_command;
use cohort_codec::CmdStatus;
use env_logger::Env;
use log::LevelFilter;

/// Operator commands understood by the coordinator.
#[derive(Copy, Clone, Debug, ValueEnum)]
enum Operation {
    /// Report computation status.
    Status,
    /// Request an immediate checkpoint.
    Checkpoint,
    /// Query or set the checkpoint interval.
    Interval,
    /// Terminate the coordinator and its computation.
    Kill,
    /// Ask the coordinator to quit.
    Quit,
}

impl Operation {
    fn command_char(self) -> char {
        match self {
            Operation::Status => 's',
            Operation::Checkpoint => 'c',
            Operation::Interval => 'i',
            Operation::Kill => 'k',
            Operation::Quit => 'q',
        }
    }
}

/// Cohort operator command-line arguments.
#[derive(Debug, Parser)]
#[command(author = "Lukas Bower", version, about = "cohort coordinator control", long_about = None)]
struct Cli {
    /// Operation to send to the coordinator.
    #[arg(value_enum)]
    operation: Operation,

    /// Coordinator hostname or IP address.
    #[arg(long)]
    host: Option<String>,

    /// Coordinator TCP port.
    #[arg(long)]
    port: Option<u16>,

    /// Checkpoint interval in seconds, used with the interval operation.
    #[arg(long)]
    interval: Option<u32>,

    /// Enable verbose protocol logging.
    #[arg(short = 'v', long, default_value_t = false)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::from_env().context("failed to read cohort configuration")?;
    if cli.host.is_some() {
        config.host = cli.host.clone();
    }
    if cli.port.is_some() {
        config.port = cli.port;
    }
    if let Some(interval) = cli.interval {
        // Flag override beats whatever the environment seeded.
        config.set_ckpt_interval(interval);
    }

    let reply = connect_and_send_command(&mut config, cli.operation.command_char())
        .context("operator command failed")?;

    match reply.status {
        CmdStatus::NoError => {
            if matches!(cli.operation, Operation::Status) {
                println!(
                    "peers: {} running: {}",
                    reply.num_peers,
                    if reply.is_running { "yes" } else { "no" }
                );
            } else {
                println!("ok");
            }
            Ok(())
        }
        status => bail!("coordinator reported: {status}"),
    }
}
