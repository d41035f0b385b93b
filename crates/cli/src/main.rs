/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Administrative command-line surface for the mailbox store: the
//! four operations named in the external-interfaces section of the
//! design — `ipurge`, `mbexamine`, `arbitron`, `dav_reconstruct`.

mod arbitron;
mod dav_reconstruct;
mod ipurge;
mod mbexamine;
mod open;

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use common::MailboxStoreConfig;

#[derive(Parser)]
#[command(name = "a3mailer-cli", about = "A3Mailer mailbox store administrative CLI")]
struct Cli {
    /// Path to the mailbox store's TOML configuration file.
    #[arg(short, long, default_value = "/etc/a3mailer/mailbox.toml")]
    config: PathBuf,

    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Ipurge(ipurge::Args),
    Mbexamine(mbexamine::Args),
    Arbitron(arbitron::Args),
    DavReconstruct(dav_reconstruct::Args),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose { "debug" } else { "info" })
        .init();

    let config = match MailboxStoreConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("a3mailer-cli: {err}");
            return ExitCode::from(trc::sysexits::exit_code_for(&err) as u8);
        }
    };

    let registry = match open::open_registry(config) {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!("a3mailer-cli: {err}");
            return ExitCode::from(trc::sysexits::exit_code_for(&err) as u8);
        }
    };

    let result = match cli.command {
        Commands::Ipurge(args) => ipurge::run(&registry, args),
        Commands::Mbexamine(args) => mbexamine::run(&registry, args),
        Commands::Arbitron(args) => arbitron::run(&registry, args),
        Commands::DavReconstruct(args) => dav_reconstruct::run(&registry, args),
    };

    match result {
        Ok(()) => ExitCode::from(trc::sysexits::EX_OK as u8),
        Err(err) => {
            eprintln!("a3mailer-cli: {err}");
            ExitCode::from(trc::sysexits::exit_code_for(&err) as u8)
        }
    }
}
