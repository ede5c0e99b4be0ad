//! Deadman Server: headless daemon for vault liveness monitoring
//!
//! Keeps the ledger on disk, reports vaults nearing expiry and applies
//! batches of commands.
//!
//! # Usage
//!
//! ```bash
//! deadman-server --config /path/to/deadman-server.toml
//! deadman-server --check                  # Run one check cycle and exit
//! deadman-server --validate               # Validate config and exit
//! deadman-server --apply commands.json    # Execute commands and exit
//! ```

mod config;
mod daemon;

use anyhow::{Context, Result};
use deadman_vault::SystemClock;
use std::path::PathBuf;
use std::sync::Arc;

fn main() -> Result<()> {
    // Parse CLI args (minimal, no clap dependency needed)
    let args: Vec<String> = std::env::args().collect();

    let mut config_path = PathBuf::from("/config/deadman-server.toml");
    let mut one_shot = false;
    let mut validate_only = false;
    let mut apply_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                if i < args.len() {
                    config_path = PathBuf::from(&args[i]);
                } else {
                    anyhow::bail!("--config requires a path argument");
                }
            }
            "--check" | "--once" => {
                one_shot = true;
            }
            "--validate" => {
                validate_only = true;
            }
            "--apply" => {
                i += 1;
                if i < args.len() {
                    apply_path = Some(PathBuf::from(&args[i]));
                } else {
                    anyhow::bail!("--apply requires a path argument");
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--version" | "-V" => {
                println!("deadman-server {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            other => {
                anyhow::bail!("Unknown argument: {}", other);
            }
        }
        i += 1;
    }

    // Load config
    let mut server_config = config::ServerConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Apply env overrides
    server_config
        .apply_env_overrides()
        .context("Invalid environment override")?;

    // Validate
    server_config
        .validate()
        .context("Configuration validation failed")?;

    // Init logger
    std::env::set_var("RUST_LOG", &server_config.server.log_level);
    env_logger::init();

    if validate_only {
        println!("✅ Configuration is valid.");
        println!("  Data dir:       {}", server_config.server.data_dir.display());
        println!(
            "  Check interval: {} secs",
            server_config.server.check_interval_secs
        );
        println!("  Registry admin: {}", server_config.registry.admin);
        println!(
            "  Withdraw:       {:?}",
            server_config.vault.withdraw_policy
        );
        println!(
            "  Heartbeat:      ping at {}, critical at {}",
            server_config.heartbeat.ping_threshold, server_config.heartbeat.critical_threshold
        );
        return Ok(());
    }

    if let Some(path) = apply_path {
        log::info!("Applying commands from {}…", path.display());
        let reports = daemon::apply_commands(&server_config, Arc::new(SystemClock), &path)?;
        for report in &reports {
            println!("{}", serde_json::to_string(report)?);
        }
        let failed = reports.iter().filter(|r| !r.is_ok()).count();
        log::info!(
            "Applied {} commands ({} rejected).",
            reports.len(),
            failed
        );
        return Ok(());
    }

    if one_shot {
        log::info!("Running single check cycle…");
        daemon::run_check_cycle(&server_config, Arc::new(SystemClock))?;
        log::info!("Done.");
        return Ok(());
    }

    // Build tokio runtime
    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;

    // Install Ctrl-C handler for graceful shutdown
    let shutdown = rt.block_on(async {
        tokio::select! {
            result = daemon::run(server_config) => result,
            _ = tokio::signal::ctrl_c() => {
                log::info!("Received shutdown signal. Exiting…");
                Ok(())
            }
        }
    });

    if let Err(e) = shutdown {
        log::error!("Server error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn print_help() {
    println!(
        r#"Deadman Server: headless vault liveness monitoring daemon

USAGE:
    deadman-server [OPTIONS]

OPTIONS:
    -c, --config <PATH>   Config file path (default: /config/deadman-server.toml)
    --check, --once       Run a single check cycle and exit
    --validate            Validate config file and exit
    --apply <PATH>        Execute a JSON array of commands against the ledger and exit
    -h, --help            Show this help message
    -V, --version         Show version

ENVIRONMENT VARIABLES (override config file):
    DEADMAN_DATA_DIR          Data directory path
    DEADMAN_CHECK_INTERVAL    Check interval in seconds
    DEADMAN_LOG_LEVEL         Log level (error/warn/info/debug/trace)
    DEADMAN_REGISTRY_ADMIN    Registry admin address (0x…, fresh ledgers only)
    DEADMAN_WITHDRAW_POLICY   allow_when_expired | block_when_expired

EXAMPLES:
    # Run as daemon with config file
    deadman-server --config /path/to/config.toml

    # Single check (useful for cron jobs)
    deadman-server --config config.toml --check

    # Create a vault
    echo '[{{"caller":"0x…","op":{{"create_vault":{{"beneficiary":"0x…","timeout_secs":2592000}}}}}}]' > cmds.json
    deadman-server --config config.toml --apply cmds.json
"#
    );
}
