//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mintgate")]
#[command(about = "Issue and check attenuable capability tokens", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Root key store file
    #[arg(long, env = "MINTGATE_STORE", global = true)]
    pub store: Option<PathBuf>,

    /// Location written into issued tokens
    #[arg(long, env = "MINTGATE_LOCATION", global = true)]
    pub location: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mint a new token
    ///
    /// Examples:
    ///   mintgate issue
    ///   mintgate issue --ttl 30 --methods create,solve
    ///   mintgate issue --expires-at 2030-01-01T00:00:00Z
    Issue {
        /// Absolute expiry (RFC 3339 or naive ISO-8601 UTC)
        #[arg(long, conflicts_with = "ttl")]
        expires_at: Option<String>,

        /// Expiry relative to now, in seconds
        #[arg(long)]
        ttl: Option<i64>,

        /// Comma-separated operations the token may perform
        #[arg(long)]
        methods: Option<String>,
    },

    /// Append caveats to a token (no store access needed)
    ///
    /// Examples:
    ///   mintgate attenuate <TOKEN> valid_methods=create
    Attenuate {
        /// Token to narrow
        token: String,

        /// Caveats as key=value, applied in order
        #[arg(required = true, value_parser = parse_caveat)]
        caveats: Vec<String>,
    },

    /// Check whether a token may perform an operation
    Authorize {
        /// Token, with or without a `Bearer ` prefix
        token: String,

        /// Operation being requested
        #[arg(short, long)]
        operation: String,

        /// Evaluate at this time instead of now
        #[arg(long)]
        at: Option<String>,

        /// Deny tokens carrying caveats no predicate understands
        #[arg(long)]
        strict: bool,
    },

    /// Print the decoded fields of a token
    Inspect {
        token: String,
    },

    /// Show store location and key count
    Status,
}

fn parse_caveat(s: &str) -> Result<String, String> {
    match s.split_once('=') {
        Some((key, _)) if !key.is_empty() => Ok(s.to_string()),
        _ => Err(format!("Invalid caveat: {}. Must be key=value", s)),
    }
}
