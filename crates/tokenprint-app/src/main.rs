// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// tokenprint: receipt printer connectivity for token/queue systems.
//
// Entry point. Initialises logging and the backend services, then runs one
// operator command.  Discovery and print results are written to stdout as
// JSON; logs go to stderr.

mod services;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

use tokenprint_core::error::Result;
use tokenprint_core::human_errors::humanize_error;
use tokenprint_core::types::{BatchStatus, ConnectionState, PrinterId, TransportType};

use services::app_services::AppServices;

/// tokenprint - discover, configure, and print to receipt printers
#[derive(Parser, Debug)]
#[command(name = "tokenprint")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan every transport for printers
    Discover {
        /// Only scan USB, serial, and Bluetooth (no network sweep)
        #[arg(long)]
        quick: bool,
    },

    /// Manage saved printers
    Printers {
        #[command(subcommand)]
        action: PrinterAction,
    },

    /// Print the test page
    Test {
        /// Printer id (defaults to the default printer)
        #[arg(long)]
        printer: Option<PrinterId>,
    },

    /// Try to bring a printer up and report whether it connected
    Status {
        /// Printer id
        id: PrinterId,
    },

    /// Print one receipt per token number
    Print {
        #[arg(required = true)]
        tokens: Vec<u32>,
    },

    /// Print a token receipt again
    Reprint { token: u32 },

    /// Show the active configuration and where it lives
    Config,
}

#[derive(Subcommand, Debug)]
enum PrinterAction {
    /// List saved printers, default first
    List,

    /// Save a printer, either explicitly or from a discovery candidate
    Add {
        /// Discovery candidate id (e.g. network_192_168_1_50_9100_5ff97d28)
        #[arg(long, conflicts_with_all = ["transport", "connection"])]
        discovered: Option<String>,

        /// Display name
        #[arg(long)]
        name: Option<String>,

        /// usb, network, wifi, serial, or bluetooth
        #[arg(long = "type", requires = "connection")]
        transport: Option<TransportType>,

        /// host:port, device path, Bluetooth address, or USB selector
        #[arg(long, requires = "transport")]
        connection: Option<String>,

        /// Make this the default printer
        #[arg(long)]
        default: bool,
    },

    /// Delete a saved printer
    Remove { id: PrinterId },

    /// Make a saved printer the default
    Default { id: PrinterId },
}

#[derive(Serialize)]
struct StatusReport {
    printer_id: PrinterId,
    state: ConnectionState,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let svc = match AppServices::init() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "printer database unavailable; using in-memory fallback");
            AppServices::fallback()
        }
    };

    let outcome = run(&svc, cli.command).await;
    svc.disconnect().await;

    match outcome {
        Ok(code) => code,
        Err(e) => {
            let human = humanize_error(&e);
            eprintln!("Error: {}", human.message);
            eprintln!("  ({})", human.technical_detail);
            ExitCode::FAILURE
        }
    }
}

async fn run(svc: &AppServices, command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Discover { quick } => {
            let found = svc.discover(quick).await;
            print_json(&found)?;
        }

        Commands::Printers { action } => match action {
            PrinterAction::List => print_json(&svc.printers()?)?,
            PrinterAction::Add {
                discovered: Some(candidate),
                name,
                default,
                ..
            } => {
                let printer = svc
                    .add_discovered(&candidate, name.as_deref(), default)
                    .await?;
                print_json(&printer)?;
            }
            PrinterAction::Add {
                discovered: None,
                name,
                transport,
                connection,
                default,
            } => {
                let (Some(transport), Some(connection)) = (transport, connection) else {
                    eprintln!("Either --discovered or both --type and --connection are required");
                    return Ok(ExitCode::from(2));
                };
                let name = name.unwrap_or_else(|| format!("{transport} printer"));
                let printer = svc.add_printer(&name, transport, &connection, default)?;
                print_json(&printer)?;
            }
            PrinterAction::Remove { id } => svc.remove_printer(&id)?,
            PrinterAction::Default { id } => svc.set_default_printer(&id)?,
        },

        Commands::Test { printer } => {
            let printer = svc.test_printer(printer).await?;
            println!("Test page sent to {}", printer.name);
        }

        Commands::Status { id } => {
            let state = svc.printer_status(id).await;
            print_json(&StatusReport {
                printer_id: id,
                state,
            })?;
            if state != ConnectionState::Connected {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Print { tokens } => {
            let summary = svc.print_tokens(&tokens).await;
            print_json(&summary)?;
            if summary.status != BatchStatus::Success {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Reprint { token } => {
            let result = svc.reprint_token(token).await;
            print_json(&result)?;
            if !result.success {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Config => {
            eprintln!("Data directory: {}", svc.data_dir().display());
            print_json(svc.config())?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
