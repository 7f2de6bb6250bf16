//! Example provider plugin
//!
//! Meant to be launched by a plugin host, which passes the plugin contract
//! through the environment. Run by hand it refuses to start.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::error;

use tfplugin::config::{OsEnv, SecurityMode, ServeConfig};
use tfplugin::error::EXIT_FAILURE;
use tfplugin::plugin::serve;
use tfplugin::provider::ExampleProvider;
use tfplugin::telemetry::{init_logging, TelemetryConfig};

/// Example provider for the tfplugin5 protocol
#[derive(Parser, Debug)]
#[command(name = "example-provider", version, about, long_about = None)]
struct Args {
    /// Path the host launched us as (hosts repeat it as the first argument)
    #[arg(hide = true)]
    launched_as: Option<String>,

    /// Listener security policy
    #[arg(long, env = "TFPLUGIN_SECURITY", value_enum, default_value_t = SecurityMode::Auto)]
    security: SecurityMode,

    /// Milliseconds in-flight calls get after shutdown is requested
    #[arg(long, env = "TFPLUGIN_GRACE_MS", default_value = "200")]
    grace_ms: u64,

    /// RPCs served concurrently per connection
    #[arg(long, env = "TFPLUGIN_MAX_CONCURRENT_RPCS", default_value = "10")]
    max_concurrent_rpcs: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        return ExitCode::from(EXIT_FAILURE);
    }

    if let Err(e) = init_logging(TelemetryConfig::default()) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(EXIT_FAILURE);
    }

    let args = Args::parse();
    let config = ServeConfig {
        security: args.security,
        grace_period: Duration::from_millis(args.grace_ms),
        max_concurrent_rpcs: args.max_concurrent_rpcs,
        ..ServeConfig::from_env(&OsEnv)
    };

    match serve(ExampleProvider::new(), config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "example provider failed");
            eprintln!("{}", e);
            ExitCode::from(tfplugin::Error::from(e).exit_code())
        }
    }
}
