//! # cloudvar
//!
//! Command-line client for cloud variables: read, write, dump, and watch the
//! variables of one project.

#![deny(unsafe_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use cloudvar_core::{CloudSession, CloudValue, RecorderState, display_name};
use cloudvar_settings::loader::parse_project_id;
use cloudvar_settings::{CloudSettings, load_settings, load_settings_from_path};
use tracing::warn;

/// Read and write cloud variables.
#[derive(Parser, Debug)]
#[command(name = "cloudvar", about = "Read and write cloud variables")]
struct Cli {
    /// Settings file (defaults to `~/.cloudvar/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Project id.
    #[arg(long)]
    project: Option<String>,

    /// Username sent in the handshake.
    #[arg(long)]
    user: Option<String>,

    /// Cloud server URL.
    #[arg(long)]
    endpoint: Option<String>,

    /// `Origin` header for the upgrade request.
    #[arg(long)]
    origin: Option<String>,

    /// Cookie as `NAME=VALUE` (repeatable).
    #[arg(long = "cookie", value_parser = parse_key_value)]
    cookies: Vec<(String, String)>,

    /// Extra header as `NAME=VALUE` (repeatable).
    #[arg(long = "header", value_parser = parse_key_value)]
    headers: Vec<(String, String)>,

    /// Log level when `RUST_LOG` is unset.
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Print the current value of a variable.
    Get {
        /// Variable name, with or without the cloud marker.
        name: String,
    },
    /// Set a variable. Numeric input is sent as a number.
    Set {
        /// Variable name, with or without the cloud marker.
        name: String,
        /// New value.
        value: String,
    },
    /// Print every variable as a JSON object.
    Dump,
    /// Print variables as they change, until interrupted.
    Watch {
        /// How often to check that the server is still connected.
        #[arg(long, default_value_t = 1_000)]
        interval_ms: u64,
    },
}

impl Cli {
    /// Settings file and env vars, overridden by command-line flags.
    fn settings(&self) -> Result<CloudSettings> {
        let mut settings = match &self.config {
            Some(path) => {
                if !path.exists() {
                    bail!("settings file not found: {}", path.display());
                }
                load_settings_from_path(path)
            }
            None => load_settings(),
        }
        .context("failed to load settings")?;

        if let Some(project) = &self.project {
            settings.project_id = Some(parse_project_id(project));
        }
        if let Some(user) = &self.user {
            settings.username = Some(user.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            settings.session.endpoint.clone_from(endpoint);
        }
        if let Some(origin) = &self.origin {
            settings.session.origin = Some(origin.clone());
        }
        settings.session.cookies.extend(self.cookies.iter().cloned());
        settings.session.headers.extend(self.headers.iter().cloned());
        Ok(settings)
    }
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {raw:?}"))?;
    if key.is_empty() {
        return Err(format!("empty name in {raw:?}"));
    }
    Ok((key.to_owned(), value.to_owned()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cloudvar_core::logging::init_subscriber(&cli.log_level);

    let settings = cli.settings()?;
    let (project_id, username) = settings
        .identity()
        .context("pass --project and --user, or set them in the settings file")?;

    let mut session = CloudSession::new(project_id, username, settings.session);
    session
        .connect()
        .await
        .with_context(|| format!("failed to connect to {}", session.config().endpoint))?;

    let outcome = run(&mut session, cli.command).await;
    session.close().await;
    outcome
}

async fn run(session: &mut CloudSession, command: Command) -> Result<()> {
    match command {
        Command::Get { name } => {
            match session.get_variable(&name).await? {
                Some(value) => println!("{value}"),
                None => println!("null"),
            }
        }
        Command::Set { name, value } => {
            session
                .set_variable(&name, CloudValue::from_input(&value))
                .await
                .with_context(|| format!("failed to set {name}"))?;
        }
        Command::Dump => {
            let variables = session.variables().await?;
            println!("{}", render_dump(&variables)?);
        }
        Command::Watch { interval_ms } => {
            watch(session, Duration::from_millis(interval_ms)).await?;
        }
    }
    Ok(())
}

fn render_dump(variables: &HashMap<String, CloudValue>) -> Result<String> {
    let sorted: BTreeMap<&str, &CloudValue> = variables
        .iter()
        .map(|(name, value)| (display_name(name), value))
        .collect();
    Ok(serde_json::to_string_pretty(&sorted)?)
}

/// Entries of `current` that differ from `seen`, in name order.
fn changed_since(
    seen: &HashMap<String, CloudValue>,
    current: &HashMap<String, CloudValue>,
) -> Vec<(String, CloudValue)> {
    let mut changed: Vec<(String, CloudValue)> = current
        .iter()
        .filter(|(name, value)| seen.get(*name) != Some(*value))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    changed.sort_by(|a, b| a.0.cmp(&b.0));
    changed
}

async fn watch(session: &CloudSession, interval: Duration) -> Result<()> {
    let recorder = session
        .recorder()
        .context("session has no recorder attached")?;
    let mut revisions = recorder.subscribe();
    let mut seen = HashMap::new();

    loop {
        let current = recorder.get_all_variables();
        for (name, value) in changed_since(&seen, &current) {
            println!("{} = {value}", display_name(&name));
        }
        seen = current;

        tokio::select! {
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            () = tokio::time::sleep(interval) => {
                if recorder.state() == RecorderState::Idle {
                    warn!("cloud server closed the connection");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}
