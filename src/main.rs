use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use cableclub::cli::Cli;
use cableclub::config::ConfigFile;
use cableclub::logging::init_logging;
use cableclub::server::Server;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ConfigFile::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.log_level);
    info!("---------------");
    info!("starting cable club server");

    let shutdown = Arc::new(AtomicBool::new(false));
    let core_shutdown = shutdown.clone();
    let core_config = config.clone();

    let core_thread = match std::thread::Builder::new()
        .name("cableclub-core".to_string())
        .spawn(move || run_core(core_config, core_shutdown))
    {
        Ok(handle) => handle,
        Err(err) => {
            error!("failed to start core event loop thread: {err}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    let gift_result = runtime.block_on(run_gift_service(config, shutdown.clone()));

    shutdown.store(true, Ordering::Relaxed);
    if let Err(err) = core_thread.join() {
        error!("core event loop thread panicked: {err:?}");
        return ExitCode::FAILURE;
    }

    match gift_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("gift service error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Drive the single-threaded core event loop (C7) to completion on its own OS thread,
/// independent of the async runtime that drives the gift service (§5).
fn run_core(config: ConfigFile, shutdown: Arc<AtomicBool>) {
    let mut server = match Server::new(config) {
        Ok(server) => server,
        Err(err) => {
            error!("failed to start core server: {err}");
            shutdown.store(true, Ordering::Relaxed);
            return;
        }
    };
    if let Err(err) = server.run(shutdown.clone()) {
        error!("core event loop exited with error: {err}");
        shutdown.store(true, Ordering::Relaxed);
    }
}

async fn run_gift_service(
    config: ConfigFile,
    shutdown: Arc<AtomicBool>,
) -> Result<(), cableclub::error::CableClubError> {
    let handle = cableclub::web::build_and_serve(config).await?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
        result = handle => {
            if let Ok(Err(err)) = result {
                error!("gift service stopped unexpectedly: {err}");
            }
        }
    }
    shutdown.store(true, Ordering::Relaxed);
    Ok(())
}
