//! prefork-launcher
//!
//! Boots the built-in status application behind a pre-forked worker fleet.
//!
//! ```text
//! prefork-launcher [--config <file>] [--check-config]
//! ```
//!
//! Exit codes: 0 clean stop, 1 runtime failure, 2 configuration error,
//! 3 application load failure, 4 crash loop.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use prefork_launcher::config::ProcessEnv;
use prefork_launcher::lifecycle::startup;
use prefork_launcher::{Shutdown, StatusApp};

#[derive(Debug, Parser)]
#[command(name = "prefork-launcher", version, about = "Pre-fork process launcher")]
struct Cli {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Validate the configuration, print the resolved topology and exit
    #[arg(long)]
    check_config: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match startup::bootstrap(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("prefork-launcher: {}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    let resolved = match startup::resolve_topology(&config, &ProcessEnv) {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::from(e.exit_code());
        }
    };

    if cli.check_config {
        println!("{}", resolved);
        return ExitCode::SUCCESS;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("master")
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build master runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(startup::run(resolved, StatusApp::load, Shutdown::new())) {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Launcher stopped with an error");
            ExitCode::from(e.exit_code())
        }
    }
}
