//! Mintgate CLI entry point

mod cli;

use crate::cli::{Cli, Commands};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use mintgate::auth::{
    attenuate, bearer_token, parse_timestamp, Caveat, Decision, Macaroon, TokenService,
    UnknownCaveatPolicy,
};
use mintgate::config::GateConfig;
use mintgate::storage::{FileStore, RootKeyStore};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> Result<ExitCode> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout carries only tokens and decisions
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = GateConfig::from_env().context("Invalid configuration")?;
    if let Some(store) = cli.store {
        config.store_path = store;
    }
    if let Some(location) = cli.location {
        config.location = location;
    }

    match cli.command {
        Commands::Issue { expires_at, ttl, methods } => issue(&config, expires_at, ttl, methods),
        Commands::Attenuate { token, caveats } => narrow(&token, caveats),
        Commands::Authorize { token, operation, at, strict } => {
            authorize(&config, &token, &operation, at, strict)
        }
        Commands::Inspect { token } => inspect(&token),
        Commands::Status => status(&config),
    }
}

fn open_service(config: &GateConfig) -> Result<TokenService> {
    let store = FileStore::new(config.store_config())
        .with_context(|| format!("Failed to open store: {}", config.store_path.display()))?;

    Ok(TokenService::new(Arc::new(store), config.issuer_config()))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    parse_timestamp(s).with_context(|| format!("Invalid timestamp: {}", s))
}

fn issue(
    config: &GateConfig,
    expires_at: Option<String>,
    ttl: Option<i64>,
    methods: Option<String>,
) -> Result<ExitCode> {
    let expires_at = match (expires_at, ttl) {
        (Some(at), _) => Some(parse_time(&at)?),
        (None, Some(secs)) if secs < 0 => bail!("--ttl must not be negative"),
        (None, Some(secs)) => Some(Utc::now() + Duration::seconds(secs)),
        (None, None) => None,
    };

    let service = open_service(config)?;
    let token = service
        .issue_token(expires_at, methods.as_deref())
        .context("Failed to issue token")?;

    println!("{}", token);
    Ok(ExitCode::SUCCESS)
}

fn narrow(token: &str, caveats: Vec<String>) -> Result<ExitCode> {
    let token = bearer_token(token).context("Empty token")?;
    let narrowed = attenuate(token, caveats.into_iter().map(Caveat::from_raw))
        .context("Invalid token")?;

    println!("{}", narrowed);
    Ok(ExitCode::SUCCESS)
}

fn authorize(
    config: &GateConfig,
    token: &str,
    operation: &str,
    at: Option<String>,
    strict: bool,
) -> Result<ExitCode> {
    let token = bearer_token(token).context("Empty token")?;
    let now = match at {
        Some(at) => parse_time(&at)?,
        None => Utc::now(),
    };

    let mut service = open_service(config)?;
    if strict {
        service = service.unknown_caveats(UnknownCaveatPolicy::Deny);
    }

    match service.authorize(token, operation, now)? {
        Decision::Allowed => {
            println!("allowed");
            Ok(ExitCode::SUCCESS)
        }
        Decision::Denied(denial) => {
            info!(reason = %denial, "Authorization denied");
            println!("denied: {}", denial.public_message());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn inspect(token: &str) -> Result<ExitCode> {
    let token = bearer_token(token).context("Empty token")?;
    let macaroon = Macaroon::deserialize(token).context("Invalid token")?;

    println!("{}", serde_json::to_string_pretty(&macaroon.inspect())?);
    Ok(ExitCode::SUCCESS)
}

fn status(config: &GateConfig) -> Result<ExitCode> {
    let store = FileStore::new(config.store_config())
        .with_context(|| format!("Failed to open store: {}", config.store_path.display()))?;

    println!("Mintgate Status");
    println!("===============");
    println!("Store: {}", store.path().display());
    println!("Root keys: {}", store.len());
    println!("Location: {}", config.location);

    Ok(ExitCode::SUCCESS)
}
