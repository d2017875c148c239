//! `warden`: operate the security engine over a flat-file store.
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use warden_backend::{config::Config, storage::FlatFileStorage, AppState};
use warden_common::{LoginResponse, RefreshResponse, SettingUpdate};

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(about = "Warden - password policy, lockout and session administration")]
struct Args {
    /// Configuration file
    #[arg(long, env = "WARDEN_CONFIG", default_value = "warden.toml")]
    config: PathBuf,

    /// Overrides `data_dir` from the configuration
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show or change security settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
    /// Provision or unlock accounts
    Account {
        #[command(subcommand)]
        command: AccountCommand,
    },
    Login {
        #[arg(long)]
        identifier: String,
        #[arg(long)]
        secret: String,
    },
    Refresh {
        #[arg(long)]
        token: String,
    },
    Logout {
        #[arg(long)]
        token: String,
    },
    ChangePassword {
        #[arg(long)]
        token: String,
        /// Not needed right after a first login
        #[arg(long)]
        current: Option<String>,
        #[arg(long)]
        new: String,
    },
    /// Resolve a token to its account
    Whoami {
        #[arg(long)]
        token: String,
    },
    /// Delete expired sessions
    Sweep {
        /// Keep sweeping every `sweep_interval_secs` until interrupted
        #[arg(long)]
        watch: bool,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    Show {
        #[arg(long)]
        key: Option<String>,
    },
    /// Apply `key=value` pairs as one all-or-nothing batch
    Set {
        /// Recorded as the updater
        #[arg(long)]
        by: String,
        #[arg(required = true, value_parser = parse_pair)]
        entries: Vec<SettingUpdate>,
    },
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    Create {
        #[arg(long)]
        identifier: String,
        #[arg(long)]
        secret: String,
    },
    Unlock {
        #[arg(long)]
        identifier: String,
    },
}

fn parse_pair(raw: &str) -> Result<SettingUpdate, String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
    Ok(SettingUpdate::new(key.trim(), value.trim()))
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let json = config.log_json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load_from(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    init_tracing(&config);

    let storage = FlatFileStorage::new(&config.data_dir)
        .with_context(|| format!("opening store at {}", config.data_dir.display()))?;
    let state = AppState::new(storage, &config).await?;

    match args.command {
        Command::Settings { command } => match command {
            SettingsCommand::Show { key: Some(key) } => {
                print_json(&state.settings.get_by_key(&key)?)?;
            },
            SettingsCommand::Show { key: None } => print_json(&state.gateway.settings())?,
            SettingsCommand::Set { by, entries } => {
                print_json(&state.gateway.update_settings(&entries, &by).await?)?;
            },
        },
        Command::Account { command } => match command {
            AccountCommand::Create { identifier, secret } => {
                let account = state.gateway.provision_account(&identifier, &secret).await?;
                println!("Account created");
                println!("  ID: {}", account.id);
                println!("  Identifier: {}", account.identifier);
                println!(
                    "  Password change on first login: {}",
                    account.require_password_change
                );
            },
            AccountCommand::Unlock { identifier } => {
                let account = state.gateway.unlock_account(&identifier).await?;
                println!("Account {} unlocked", account.identifier);
            },
        },
        Command::Login { identifier, secret } => {
            let outcome = state.gateway.login(&identifier, &secret).await?;
            print_json(&LoginResponse::from(outcome))?;
        },
        Command::Refresh { token } => {
            let session = state.gateway.refresh(&token).await?;
            print_json(&RefreshResponse::from(session))?;
        },
        Command::Logout { token } => {
            state.gateway.logout(&token).await?;
            println!("Logged out");
        },
        Command::ChangePassword {
            token,
            current,
            new,
        } => {
            state
                .gateway
                .change_password(&token, current.as_deref(), &new)
                .await?;
            println!("Password changed");
        },
        Command::Whoami { token } => {
            let context = state.gateway.authenticate(&token).await?;
            println!("{} ({})", context.identifier, context.account_id);
            println!("  Session expires at: {}", context.session_expires_at);
        },
        Command::Sweep { watch: false } => {
            let removed = state.sessions.sweep_expired(state.clock.now()).await?;
            println!("Removed {removed} expired session(s)");
        },
        Command::Sweep { watch: true } => {
            let sweeper = state.spawn_sweeper(&config);
            info!(
                interval_secs = config.sweep_interval_secs,
                "session sweeper running, press Ctrl-C to stop"
            );
            tokio::signal::ctrl_c()
                .await
                .map_err(|e| anyhow!("waiting for Ctrl-C: {e}"))?;
            sweeper.shutdown().await;
        },
    }

    Ok(())
}
