//! # permissions-check
//!
//! Evaluate a permission tree from the command line against permission types
//! declared as CEL expressions in a JSON config file.
//!
//! ```text
//! permissions-check --config permissions.json \
//!     --tree '{"role": ["editor", "writer"]}' \
//!     --context '{"user": {"id": 1, "roles": ["writer"]}}'
//! Access granted: true
//! ```
//!
//! `RUST_LOG` sets the log level (default: info).

use anyhow::{Context as _, Result};
use clap::Parser;
use cretoai_permissions::{AccessChecker, PermissionsConfig};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "permissions-check")]
#[command(about = "Evaluate a logical permission tree")]
#[command(version)]
#[command(after_help = r#"ARGUMENTS:
    JSON values are given inline or as @path to read them from a file.

CONFIG FILE:
    {
      "types":  { "role": "permission in user.roles" },
      "bypass": "user.superuser == true"
    }

EXAMPLES:
    permissions-check -c perms.json -t '{"role": "admin"}' -x '{"user": {"roles": []}}'
    permissions-check -c perms.json -t @tree.json -x @ctx.json --no-bypass
    permissions-check -c perms.json --list-keys
"#)]
struct Cli {
    /// Permissions config file (types and bypass as CEL expressions)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Permission tree as JSON, or @file
    #[arg(short, long, required_unless_present = "list_keys")]
    tree: Option<String>,

    /// Context object as JSON, or @file
    #[arg(short = 'x', long, default_value = "{}")]
    context: String,

    /// Never consult the bypass expression
    #[arg(long)]
    no_bypass: bool,

    /// Print every key a tree may contain and exit
    #[arg(long)]
    list_keys: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => PermissionsConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PermissionsConfig::default(),
    };
    let checker = AccessChecker::from_config(&config)?;
    info!(
        "permissions-check v{} ready with {} types",
        cretoai_permissions::VERSION,
        config.types.len()
    );

    if cli.list_keys {
        for key in checker.get_valid_permission_keys() {
            println!("{}", key);
        }
        return Ok(());
    }

    let tree = match &cli.tree {
        Some(raw) => read_json(raw).context("reading --tree")?,
        None => anyhow::bail!("--tree is required"),
    };
    let context = read_json(&cli.context).context("reading --context")?;

    let access = checker.check_access(&tree, &context, !cli.no_bypass)?;
    println!("Access granted: {}", access);
    Ok(())
}

fn read_json(arg: &str) -> Result<Value> {
    let raw = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?,
        None => arg.to_string(),
    };
    Ok(serde_json::from_str(&raw)?)
}
