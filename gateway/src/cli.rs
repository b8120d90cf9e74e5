//! Gateway CLI
//!
//! - `mfe-gateway serve` - run the HTTP service
//! - `mfe-gateway query` - execute one query and print the response

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mfe_engine::{QueryRequest, QueryResponse};
use mfe_gateway::{GatewayConfig, GatewayServer, build_engine};
use serde_json::{Map, Value};

/// Query gateway over the MFE registry, build lists and build metadata
#[derive(Debug, Parser)]
#[command(name = "mfe-gateway", version)]
pub struct GatewayCli {
    #[command(subcommand)]
    pub command: GatewaySubcommand,
}

impl GatewayCli {
    pub async fn run(self) -> anyhow::Result<i32> {
        match self.command {
            GatewaySubcommand::Serve(args) => run_serve(args).await,
            GatewaySubcommand::Query(args) => run_query(args).await,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum GatewaySubcommand {
    /// Serve `POST /graphql` and `GET /healthz`
    Serve(ServeArgs),

    /// Execute one query document and print the JSON response
    ///
    /// Exits with status 1 when the response carries errors.
    Query(QueryArgs),
}

#[derive(Debug, Parser)]
pub struct ServeArgs {
    /// Config file (default: $MFE_GATEWAY_CONFIG or ~/.config/mfe-gateway/gateway.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override `listen_addr`
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,
}

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// Config file (default: $MFE_GATEWAY_CONFIG or ~/.config/mfe-gateway/gateway.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override `registry_url`
    #[arg(long, value_name = "URL")]
    pub registry_url: Option<String>,

    /// Query variable, repeatable
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_variable)]
    pub vars: Vec<(String, String)>,

    /// Operation to run when the document defines several
    #[arg(long, value_name = "NAME")]
    pub operation: Option<String>,

    /// Query document, or `-` to read it from stdin
    #[arg(value_name = "QUERY")]
    pub query: String,
}

fn parse_variable(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got `{raw}`")),
    }
}

fn load_config(
    path: Option<&PathBuf>,
    apply: impl FnOnce(&mut GatewayConfig),
) -> anyhow::Result<GatewayConfig> {
    let mut config = GatewayConfig::load(path.map(PathBuf::as_path))?;
    apply(&mut config);
    config.validate()?;
    Ok(config)
}

async fn run_serve(args: ServeArgs) -> anyhow::Result<i32> {
    let config = load_config(args.config.as_ref(), |config| {
        if let Some(listen) = args.listen {
            config.listen_addr = listen;
        }
    })?;
    let engine = build_engine(&config)?;
    let server = GatewayServer::bind(&config.listen_addr, engine, config.request_timeout())?;

    tracing::info!(
        addr = %server
            .local_addr()
            .map_or_else(|| config.listen_addr.clone(), |addr| addr.to_string()),
        registry = %config.registry_url,
        "mfe-gateway listening"
    );

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("signal received, shutting down");
        shutdown.shutdown();
    });

    let runtime = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || server.run(&runtime))
        .await
        .context("accept loop panicked")?;
    Ok(0)
}

async fn run_query(args: QueryArgs) -> anyhow::Result<i32> {
    let config = load_config(args.config.as_ref(), |config| {
        if let Some(url) = args.registry_url {
            config.registry_url = url;
        }
    })?;
    let engine = build_engine(&config)?;

    let query = if args.query == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read query from stdin")?;
        buf
    } else {
        args.query
    };

    let variables: Map<String, Value> = args
        .vars
        .into_iter()
        .map(|(name, value)| (name, Value::String(value)))
        .collect();
    let request = QueryRequest {
        query,
        variables,
        operation_name: args.operation,
    };

    let result = tokio::time::timeout(config.request_timeout(), engine.execute(&request))
        .await
        .with_context(|| {
            format!("query did not finish within {}s", config.request_timeout_secs)
        })?;
    let response = QueryResponse::from_result(result);

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(if response.has_errors() { 1 } else { 0 })
}
