//! tfplugin - inspect provider plugins from the command line

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use tfplugin::config::LaunchConfig;
use tfplugin::diagnostics::Diagnostic;
use tfplugin::error::{EXIT_BOOTSTRAP, EXIT_FAILURE};
use tfplugin::handshake::HandshakeLine;
use tfplugin::plugin::PluginClient;
use tfplugin::proto;
use tfplugin::schema::ProviderSchema;
use tfplugin::telemetry::{init_logging, TelemetryConfig};
use tfplugin::DEFAULT_PROTOCOL_VERSION;

/// tfplugin - host side tooling for tfplugin5 provider plugins
#[derive(Parser, Debug)]
#[command(name = "tfplugin", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch a plugin, print its schema as JSON and stop it
    ///
    /// The plugin is started exactly as a host would start it: magic cookie
    /// and protocol version in the environment, and in secure mode a fresh
    /// client certificate the plugin must pin.
    Inspect(InspectArgs),
}

/// Inspect arguments
#[derive(Parser, Debug)]
struct InspectArgs {
    /// Plugin executable
    plugin: PathBuf,

    /// Require mutual TLS
    #[arg(long, env = "TFPLUGIN_SECURE")]
    secure: bool,

    /// Protocol version to request
    #[arg(long, default_value_t = DEFAULT_PROTOCOL_VERSION)]
    protocol_version: u32,

    /// Extra environment variable for the plugin (KEY=VALUE, repeatable)
    #[arg(long = "env", value_parser = parse_env_pair)]
    env: Vec<(String, String)>,

    /// Seconds to wait for the plugin to start
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// Seconds the plugin gets to exit after Stop
    #[arg(long, default_value = "5")]
    grace_secs: u64,
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", raw))
}

#[derive(Serialize)]
struct HandshakeReport<'a> {
    core_protocol_version: u32,
    app_protocol_version: u32,
    network: &'static str,
    address: &'a str,
    protocol: &'static str,
    tls: bool,
}

impl<'a> From<&'a HandshakeLine> for HandshakeReport<'a> {
    fn from(line: &'a HandshakeLine) -> Self {
        Self {
            core_protocol_version: line.core_protocol_version,
            app_protocol_version: line.app_protocol_version,
            network: line.network_type.as_str(),
            address: &line.network_address,
            protocol: line.rpc_type.as_str(),
            tls: line.server_cert_b64.is_some(),
        }
    }
}

#[derive(Serialize)]
struct InspectReport<'a> {
    handshake: HandshakeReport<'a>,
    schema: ProviderSchema,
    diagnostics: Vec<Diagnostic>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Install crypto provider - aws-lc-rs, same as the explicit TLS configs
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        return ExitCode::from(EXIT_FAILURE);
    }

    if let Err(e) = init_logging(TelemetryConfig::default()) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(EXIT_FAILURE);
    }

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Inspect(args) => run_inspect(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "inspect failed");
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(err) = err.downcast_ref::<tfplugin::Error>() {
        err.exit_code()
    } else if err.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
        EXIT_BOOTSTRAP
    } else {
        EXIT_FAILURE
    }
}

/// Launch the plugin, fetch its schema and stop it
async fn run_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let mut config = LaunchConfig::new(&args.plugin)
        .secure(args.secure)
        .protocol_version(args.protocol_version);
    for (key, value) in args.env {
        config = config.env(key, value);
    }

    let client = tokio::time::timeout(
        Duration::from_secs(args.timeout_secs),
        PluginClient::launch(config),
    )
    .await
    .with_context(|| format!("timed out waiting for {} to start", args.plugin.display()))?
    .map_err(tfplugin::Error::from)?;

    info!(endpoint = %client.handshake().endpoint(), "plugin connected");

    let response = client
        .provider()
        .get_schema(proto::get_provider_schema::Request {})
        .await
        .map_err(tfplugin::Error::from)?
        .into_inner();
    let diagnostics: Vec<Diagnostic> = response
        .diagnostics
        .iter()
        .cloned()
        .map(Diagnostic::from)
        .collect();
    let schema = ProviderSchema::try_from(response).map_err(tfplugin::Error::from)?;

    let report = InspectReport {
        handshake: client.handshake().into(),
        schema,
        diagnostics,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    let status = client
        .shutdown(Duration::from_secs(args.grace_secs))
        .await
        .map_err(tfplugin::Error::from)?;
    info!(%status, "plugin exited");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_pairs_split_on_the_first_equals() {
        assert_eq!(
            parse_env_pair("TF_LOG=debug=1").unwrap(),
            ("TF_LOG".to_string(), "debug=1".to_string())
        );
        assert!(parse_env_pair("novalue").is_err());
        assert!(parse_env_pair("=x").is_err());
    }

    #[test]
    fn cli_parses_inspect() {
        let cli = Cli::try_parse_from(["tfplugin", "inspect", "./provider", "--secure"]).unwrap();
        let Commands::Inspect(args) = cli.command;
        assert!(args.secure);
        assert_eq!(args.protocol_version, 5);
        assert_eq!(args.plugin, PathBuf::from("./provider"));
    }

    #[test]
    fn exit_code_follows_the_crate_error() {
        let err = anyhow::Error::from(tfplugin::Error::from(
            tfplugin::plugin::LaunchError::EmptyHandshake,
        ));
        assert_eq!(exit_code(&err), EXIT_BOOTSTRAP);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), EXIT_FAILURE);
    }
}
