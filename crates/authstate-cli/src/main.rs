//! authstate - command-line driver for the session store.
//!
//! Runs the store operations (validate, send, logout) against a real
//! backend using the persisted session, so a token stored by one run is
//! picked up by the next.

use std::io;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use authstate_core::{
    Config, FileStorage, KeyringStorage, Method, SendOutcome, SessionStorage, StorageBackend,
    Store,
};

#[derive(Parser)]
#[command(name = "authstate", version, about = "Inspect and drive a persisted API session")]
struct Cli {
    /// Backend base URL (overrides config and AUTHSTATE_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Where the session token and user are persisted
    #[arg(long, global = true, value_enum)]
    storage: Option<StorageArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum StorageArg {
    File,
    Keyring,
}

impl From<StorageArg> for StorageBackend {
    fn from(arg: StorageArg) -> Self {
        match arg {
            StorageArg::File => StorageBackend::File,
            StorageArg::Keyring => StorageBackend::Keyring,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Show whether a session is stored and for whom
    Status,
    /// Store a bearer token and validate it
    Login {
        /// Token to store; prompted for when omitted
        #[arg(long)]
        token: Option<String>,
    },
    /// Validate the stored session with the backend
    Check,
    /// Send an authenticated request
    Send {
        /// GET, POST, PUT or DELETE
        method: String,
        /// Path relative to the base URL, or an absolute URL
        url: String,
        /// JSON request body (POST and PUT only)
        #[arg(long)]
        data: Option<String>,
    },
    /// Log out on the server and clear the stored session
    Logout,
    /// Print the effective configuration
    Config,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn open_storage(config: &Config) -> Result<Box<dyn SessionStorage>> {
    Ok(match config.storage {
        StorageBackend::File => Box::new(FileStorage::new(Config::storage_dir()?)),
        StorageBackend::Keyring => Box::new(KeyringStorage::new()),
    })
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Text printed for a request outcome: the pretty body, or the bare status code.
fn render_outcome(outcome: &SendOutcome) -> Result<String> {
    Ok(match outcome {
        SendOutcome::Body(body) => serde_json::to_string_pretty(body)?,
        SendOutcome::Status(status) => status.to_string(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(storage) = cli.storage {
        config.storage = storage.into();
    }

    let mut store = Store::open(&config, open_storage(&config)?)?;
    info!(base_url = %config.base_url, "Session store ready");

    match cli.command {
        Command::Status => {
            if store.is_authenticated() {
                println!("Authenticated");
            } else {
                println!("Not authenticated");
            }
            if let Some(user) = store.user() {
                print_json(user)?;
            }
        }
        Command::Login { token } => {
            let token = match token {
                Some(token) => token,
                None => rpassword::prompt_password("Token: ")?,
            };
            let token = token.trim();
            if token.is_empty() {
                bail!("Token is required");
            }
            store.set_item("token", token);
            match store.check_auth().await {
                Some(user) => {
                    store.set_item("user", serde_json::to_value(&user)?);
                    println!("Login successful");
                    print_json(&user)?;
                }
                None => bail!("Token was rejected by {}", config.base_url),
            }
        }
        Command::Check => match store.check_auth().await {
            Some(user) => {
                store.set_item("user", serde_json::to_value(&user)?);
                println!("Session valid");
            }
            None => println!("Session invalid, logged out"),
        },
        Command::Send { method, url, data } => {
            let method: Method = method.parse()?;
            let body = data
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .context("--data is not valid JSON")?;
            let outcome = store.send(&url, method, body).await?;
            if let Some(status) = outcome.status() {
                info!(method = %method, url = %url, status = status, "Request returned non-success status");
            }
            println!("{}", render_outcome(&outcome)?);
        }
        Command::Logout => {
            if store.logout().await {
                println!("Logged out");
            } else {
                println!("Logged out locally (server logout failed)");
            }
        }
        Command::Config => print_json(&config)?,
    }

    Ok(())
}
