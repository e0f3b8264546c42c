//! Taskboard CLI - session management for the taskboard API.
//!
//! Signs in, signs out and reports whether the stored session is still
//! good, using the same session cache the web client relies on.

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use taskboard_core::api::RegisterRequest;
use taskboard_core::{AuthProvider, Config};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Directory for an additional log file, when set
const LOG_DIR_ENV: &str = "TASKBOARD_LOG_DIR";

const LOG_FILE_NAME: &str = "taskboard.log";

#[derive(Parser)]
#[command(name = "taskboard", version, about = "Manage your taskboard session")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report whether the stored session is still valid
    Status {
        /// Ignore the cached verdict and ask again
        #[arg(long)]
        refresh: bool,
    },
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Create an account and sign in
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
}

/// Initialize the tracing subscriber for logging.
/// The returned guard must live until exit so buffered file logs are flushed.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing();

    // Environment overrides apply to this run only, never to the saved file
    let mut saved = Config::load()?;
    let config = saved.clone().with_env_overrides();
    debug!(api = config.api_base_url(), "Configuration loaded");
    let provider = AuthProvider::from_config(&config)?;

    match cli.command {
        Command::Status { refresh } => status(&provider, refresh).await?,
        Command::Login { email } => login(&provider, &mut saved, email).await?,
        Command::Register { name, email } => register(&provider, &mut saved, name, email).await?,
        Command::Logout => {
            let redirect = provider.logout();
            println!("Signed out (next: {})", redirect);
        }
        Command::Whoami => whoami(&provider).await,
    }

    // Let any background verification land in the session cache before exit
    provider.settle().await;
    Ok(())
}

async fn status(provider: &AuthProvider, refresh: bool) -> Result<()> {
    let status = if refresh {
        provider.refresh().await
    } else {
        provider.check().await
    };
    info!(state = ?status.state, authenticated = status.authenticated, "Session checked");

    if status.authenticated {
        println!("Signed in ({:?})", status.state);
    } else {
        println!("Not signed in ({:?})", status.state);
    }
    Ok(())
}

async fn whoami(provider: &AuthProvider) {
    if !provider.check().await.authenticated {
        println!("Not signed in");
        return;
    }
    match provider.identity() {
        Some(user) if user.role.is_empty() => println!("{} <{}>", user.display_name(), user.email),
        Some(user) => println!("{} <{}> [{}]", user.display_name(), user.email, user.role),
        None => println!("Signed in (profile not loaded yet)"),
    }
}

async fn login(provider: &AuthProvider, config: &mut Config, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;

    let outcome = provider.login(&email, &password).await?;
    println!("Signed in as {} (next: {})", outcome.user.display_name(), outcome.redirect_to);

    remember_email(config, email);
    Ok(())
}

async fn register(provider: &AuthProvider, config: &mut Config, name: String, email: String) -> Result<()> {
    let password = rpassword::prompt_password("Choose a password: ").context("Failed to read password")?;
    let confirm = rpassword::prompt_password("Repeat password: ").context("Failed to read password")?;
    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }

    let request = RegisterRequest {
        name,
        email: email.clone(),
        password,
    };
    let outcome = provider.register(&request).await?;
    println!("Account created for {} (next: {})", outcome.user.display_name(), outcome.redirect_to);

    remember_email(config, email);
    Ok(())
}

fn remember_email(config: &mut Config, email: String) {
    config.last_email = Some(email);
    if let Err(e) = config.save() {
        debug!(error = %e, "Failed to save config");
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input).context("Failed to read input")?;
    let input = input.trim().to_string();
    if input.is_empty() {
        anyhow::bail!("No input given");
    }
    Ok(input)
}
