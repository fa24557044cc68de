//! Facts Client
//!
//! Fetches fun facts from the dougsellers.dev API using guest credentials
//! from the site's identity pool. No stored keys: every run federates a
//! fresh guest identity.
//!
//! # Usage
//! ```bash
//! # Random fact
//! facts-client fact
//!
//! # Specific fact
//! facts-client fact --id 42
//!
//! # Show the guest identity this run was issued
//! facts-client auth
//!
//! # Theme preference
//! facts-client theme toggle
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use facts_client::config::{
    DEFAULT_FACTS_HOST, DEFAULT_IDENTITY_POOL_ID, DEFAULT_REGION, DEFAULT_SIGNING_SERVICE,
};
use facts_client::{
    AuthState, CredentialProvider, FactResult, FactsClient, FactsConfig, FactsSession, Theme,
    ThemeStore,
};

// ============================================================
// CLI Definition
// ============================================================

#[derive(Parser)]
#[command(name = "facts-client")]
#[command(about = "Fun facts from the dougsellers.dev API", long_about = None)]
#[command(version)]
struct Cli {
    /// AWS region of the identity pool and facts API
    #[arg(long, env = "AWS_REGION", default_value = DEFAULT_REGION)]
    region: String,

    /// Identity pool that vends guest credentials
    #[arg(long, env = "FACTS_IDENTITY_POOL_ID", default_value = DEFAULT_IDENTITY_POOL_ID)]
    identity_pool_id: String,

    /// Facts API host
    #[arg(long = "host", env = "FACTS_API_HOST", default_value = DEFAULT_FACTS_HOST)]
    facts_host: String,

    /// Service name in the signing scope
    #[arg(long, env = "FACTS_SIGNING_SERVICE", default_value = DEFAULT_SIGNING_SERVICE)]
    service: String,

    /// Override the identity federation endpoint
    #[arg(long, env = "FACTS_FEDERATION_ENDPOINT")]
    federation_endpoint: Option<String>,

    /// Override the facts API base URL
    #[arg(long, env = "FACTS_BASE_URL")]
    base_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire guest credentials and show the identity
    Auth,

    /// Fetch a fact
    Fact {
        /// Fact ID (omit for a random fact)
        #[arg(long)]
        id: Option<String>,
    },

    /// Show or change the saved theme
    Theme {
        /// Settings file (default: ~/.config/facts-client/settings.json)
        #[arg(long)]
        settings: Option<PathBuf>,

        #[command(subcommand)]
        action: Option<ThemeAction>,
    },
}

#[derive(Subcommand)]
enum ThemeAction {
    /// Print the current theme
    Show,

    /// Switch between light and dark
    Toggle,

    /// Set the theme explicitly
    Set {
        /// light or dark
        theme: String,
    },
}

impl Cli {
    fn config(&self) -> FactsConfig {
        FactsConfig {
            region: self.region.clone(),
            identity_pool_id: self.identity_pool_id.clone(),
            facts_host: self.facts_host.clone(),
            service: self.service.clone(),
            federation_endpoint: self.federation_endpoint.clone(),
            facts_base_url: self.base_url.clone(),
        }
    }
}

// ============================================================
// Main Entry Point
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging (stderr, so stdout stays pipeable)
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    let config = cli.config();

    match cli.command {
        Commands::Auth => {
            config.validate()?;
            info!("🔐 Requesting guest credentials (pool: {})", config.identity_pool_id);

            let provider = CredentialProvider::cognito(&config)?;
            let credentials = provider
                .acquire()
                .await
                .context("Failed to acquire guest credentials")?;

            println!("Identity:   {}", credentials.identity_id);
            println!("Access key: {}", credentials.access_key_id);
            match credentials.expiration {
                Some(expires) => println!("Expires:    {}", expires.to_rfc3339()),
                None => println!("Expires:    unknown"),
            }
        }

        Commands::Fact { id } => {
            config.validate()?;

            let session = FactsSession::new(
                CredentialProvider::cognito(&config)?,
                FactsClient::from_config(&config)?,
            );

            info!("🔐 Authenticating with identity pool...");
            if let AuthState::Failed(err) = session.initialize().await {
                bail!("Authentication failed: {}", err);
            }
            info!("✅ Guest credentials ready");

            match id.as_deref() {
                Some(id) => info!("📖 Fetching fact {}", id.trim()),
                None => info!("🎲 Fetching a random fact"),
            }

            match session.request_fact(id.as_deref()).await {
                FactResult::Success(fact) => {
                    println!("{}", serde_json::to_string_pretty(&fact)?);
                }
                FactResult::Error(message) => bail!(message),
                other => bail!("Fact lookup ended unresolved: {:?}", other),
            }
        }

        Commands::Theme { settings, action } => {
            let path = settings.unwrap_or_else(ThemeStore::default_path);
            let mut store = ThemeStore::init(path);

            match action.unwrap_or(ThemeAction::Show) {
                ThemeAction::Show => println!("{}", store.current()),
                ThemeAction::Toggle => {
                    let theme = store.toggle()?;
                    println!("{}", theme);
                    info!("🎨 Theme saved to {}", store.path().display());
                }
                ThemeAction::Set { theme } => {
                    let theme: Theme = theme.parse()?;
                    store.set(theme)?;
                    println!("{}", theme);
                    info!("🎨 Theme saved to {}", store.path().display());
                }
            }
        }
    }

    Ok(())
}
