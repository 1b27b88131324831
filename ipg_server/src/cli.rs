//! The server binary doubles as an admin tool for the history directory.
//!
//! Exit codes: `0` success, `1` a bulk operation finished with per-record failures, `2` configuration (or usage)
//! error, `3` anything fatal.
use std::{env, env::VarError, process::ExitCode};

use clap::{Parser, Subcommand};
use ipg_engine::{db_types::DayStamp, events::EventProducers, CancelSignal};
use log::*;
use serde::Serialize;

use crate::{
    config::ServerConfig,
    server::{build_service, run_server, LiveService},
};

#[derive(Parser, Debug)]
#[command(version, about = "Invoice payment gateway: PayPal orders for ingested invoices")]
pub struct Arguments {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server (the default)
    #[clap(name = "serve")]
    Serve,
    /// Refresh every open record of one history partition against PayPal
    #[clap(name = "refresh")]
    Refresh {
        /// The partition day, as YYYYMMDD
        day: String,
    },
    /// Refresh every history partition against PayPal
    #[clap(name = "refresh-all")]
    RefreshAll,
    /// Cancel every open PayPal order and delete the whole history
    #[clap(name = "delete-all")]
    DeleteAll {
        /// Required. Confirms that the history should really be deleted.
        #[arg(long)]
        yes: bool,
    },
    /// Print the (non-secret) configuration environment
    #[clap(name = "env")]
    Env,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success = 0,
    PartialFailure = 1,
    ConfigError = 2,
    Fatal = 3,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status as u8)
    }
}

pub async fn run_command(args: Arguments) -> ExitStatus {
    let command = args.command.unwrap_or(Command::Serve);
    if let Command::Env = command {
        display_envs();
        return ExitStatus::Success;
    }
    if let Command::DeleteAll { yes: false } = command {
        eprintln!("Refusing to delete the history without --yes");
        return ExitStatus::ConfigError;
    }
    let config = match ServerConfig::try_from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("🪛️ {e}");
            eprintln!("{e}");
            return ExitStatus::ConfigError;
        },
    };
    if let Command::Serve = command {
        info!("🚀️ Starting server on {}:{}", config.host, config.port);
        return match run_server(config).await {
            Ok(()) => {
                println!("Bye!");
                ExitStatus::Success
            },
            Err(e) => {
                eprintln!("{e}");
                ExitStatus::Fatal
            },
        };
    }
    let service = match build_service(&config, EventProducers::default()) {
        Ok((service, _)) => service,
        Err(e) => {
            eprintln!("{e}");
            return ExitStatus::Fatal;
        },
    };
    let cancel = cancel_on_ctrl_c();
    run_admin_command(command, &service, &cancel).await
}

async fn run_admin_command(command: Command, service: &LiveService, cancel: &CancelSignal) -> ExitStatus {
    match command {
        Command::Refresh { day } => {
            let day = match day.parse::<DayStamp>() {
                Ok(d) => d,
                Err(e) => {
                    eprintln!("{e}");
                    return ExitStatus::ConfigError;
                },
            };
            match service.refresh_history(&day, cancel).await {
                Ok(report) => report_and_exit(&report, report.is_clean()),
                Err(e) => fatal(e),
            }
        },
        Command::RefreshAll => match service.refresh_all(cancel).await {
            Ok(report) => report_and_exit(&report, report.is_clean()),
            Err(e) => fatal(e),
        },
        Command::DeleteAll { .. } => match service.delete_all_with_cancel(cancel).await {
            Ok(report) => report_and_exit(&report, report.is_clean()),
            Err(e) => fatal(e),
        },
        Command::Serve | Command::Env => ExitStatus::Success,
    }
}

// Bulk operations stop between records on Ctrl-C; calls already sent to PayPal are allowed to finish.
fn cancel_on_ctrl_c() -> CancelSignal {
    let cancel = CancelSignal::new();
    let signal = cancel.clone();
    actix_web::rt::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑️ Interrupted. Finishing the current record and stopping.");
            signal.cancel();
        }
    });
    cancel
}

fn report_and_exit<T: Serialize>(report: &T, clean: bool) -> ExitStatus {
    match serde_json::to_string_pretty(report) {
        Ok(s) => println!("{s}"),
        Err(e) => warn!("Could not print the report. {e}"),
    }
    if clean {
        ExitStatus::Success
    } else {
        ExitStatus::PartialFailure
    }
}

fn fatal<E: std::fmt::Display>(e: E) -> ExitStatus {
    error!("{e}");
    eprintln!("{e}");
    ExitStatus::Fatal
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 14] = [
        "RUST_LOG",
        "PAYPAL_MODE",
        "PAYPAL_API_BASE",
        "PAYPAL_WEBHOOK_ID",
        "PAYPAL_RATE_LIMIT_PER_SEC",
        "RESULTS_DIR",
        "RECONCILER_CONCURRENCY",
        "RECONCILER_INTERVAL_SECS",
        "REQUEST_TIMEOUT_MS",
        "IPG_HOST",
        "IPG_PORT",
        "IPG_PUBLIC_URL",
        "IPG_WEBHOOK_SIGNATURE_CHECKS",
        "PAYPAL_CLIENT_ID",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
