//! Runtime manager - Entry Point
//!
//! Manages integration project containers on Docker or Kubernetes.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use runtime_manager::app::options::AppOptions;
use runtime_manager::app::run::run;
use runtime_manager::logs::{init_logging, LogOptions};
use runtime_manager::storage::layout::StorageLayout;
use runtime_manager::storage::settings::Settings;
use runtime_manager::utils::version_info;

use tracing::{error, info};

fn main() {
    // Parse command line arguments
    let mut cli_args: HashMap<String, String> = HashMap::new();
    for arg in env::args().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            cli_args.insert(key.trim_start_matches('-').to_string(), value.to_string());
        } else if arg.starts_with("--") {
            cli_args.insert(arg.trim_start_matches('-').to_string(), "true".to_string());
        }
    }

    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(version) => println!("{}", version),
            Err(e) => eprintln!("Unable to print version: {}", e),
        }
        return;
    }

    let layout = match cli_args.get("base-dir") {
        Some(base_dir) => StorageLayout::new(base_dir),
        None => StorageLayout::default(),
    };
    let settings_path = cli_args
        .get("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| layout.settings_file().path().to_path_buf());

    // Settings are read before any runtime exists
    let settings = match Settings::load(&settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {}", e);
            std::process::exit(1);
        }
    };

    let log_options = LogOptions {
        log_level: settings.log_level,
        json_format: settings.log_json,
        log_dir: settings.log_dir.as_ref().map(PathBuf::from),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    // Log streaming gets its own pool so copy loops cannot starve dispatch
    let log_runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.log_worker_threads.max(1))
        .thread_name("log-stream")
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to build the log runtime: {}", e);
            std::process::exit(1);
        }
    };
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.worker_threads.max(1))
        .thread_name("runtime-manager")
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to build the main runtime: {}", e);
            std::process::exit(1);
        }
    };

    let options = AppOptions::from_settings(&settings, &layout);
    info!("Running runtime manager with options: {:?}", options);

    let result = runtime.block_on(run(
        options,
        log_runtime.handle().clone(),
        await_shutdown_signal(),
    ));

    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    log_runtime.shutdown_timeout(std::time::Duration::from_secs(5));

    if let Err(e) = result {
        error!("Failed to run the runtime manager: {e}");
        std::process::exit(1);
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Unable to install signal handlers, waiting for Ctrl+C only");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
