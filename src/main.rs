//! airquality-exporter binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use airquality_exporter::api::{self, AppState};
use airquality_exporter::cli;
use airquality_exporter::config::Config;
use airquality_exporter::{logging, PmGauges, Sds011, SessionManager};
use tracing::{error, info};

/// Exit status for fatal runtime errors.
const EXIT_FATAL: u8 = 1;

/// Exit status for command-line usage errors.
const EXIT_USAGE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Try 'airquality-exporter --help' for more information.");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    logging::init(config.log_filter());
    info!("Starting, version {}", env!("CARGO_PKG_VERSION"));

    let server_config = match config.to_server_config() {
        Ok(server_config) => server_config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let session_config = match config.to_session_config() {
        Ok(session_config) => session_config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let gauges = match PmGauges::new() {
        Ok(gauges) => Arc::new(gauges),
        Err(e) => {
            error!("Cannot register metrics: {}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    // Sensor startup failures end the whole process, even while the
    // server keeps running on this task.
    let manager = SessionManager::new(session_config, Sds011::open);
    tokio::spawn({
        let gauges = Arc::clone(&gauges);
        async move {
            match manager.run(gauges).await {
                Ok(never) => match never {},
                Err(e) => {
                    error!("{}", e);
                    std::process::exit(i32::from(EXIT_FATAL));
                }
            }
        }
    });

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, shutting down");
        }
    };

    match api::serve(server_config, AppState::new(gauges), shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("HTTP server failed: {}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}
