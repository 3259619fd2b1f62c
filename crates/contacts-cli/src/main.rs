//! Contacts admin CLI
//!
//! Usage:
//!   contacts-admin set-role --email <email> --role <user|moderator|admin>
//!   contacts-admin confirm --email <email>
//!
//! Reads the same configuration as the server (`CONTACTS_CONFIG` file and
//! environment) and talks to PostgreSQL directly.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use contacts_core::{AppConfig, PgStore, Role, UserRepository};

#[derive(Parser)]
#[command(name = "contacts-admin")]
#[command(about = "Operator tasks for the contacts API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assign a role to an account
    SetRole {
        /// Account email
        #[arg(long)]
        email: String,
        /// New role
        #[arg(long)]
        role: Role,
    },
    /// Mark an account's email as confirmed
    Confirm {
        /// Account email
        #[arg(long)]
        email: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contacts_cli=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config()?;

    let Some(url) = config.database.url.as_deref() else {
        bail!("DATABASE_URL must be set");
    };
    let store = PgStore::new(url, config.database.max_connections)
        .await
        .context("Failed to connect to PostgreSQL")?;

    match cli.command {
        Commands::SetRole { email, role } => {
            let user = store.set_role(&email, role).await?;
            tracing::info!(email = %user.email, role = %user.role, "Role updated");
            println!(
                "{} is now {} (cached sessions pick this up within {}s)",
                user.email, user.role, config.cache.ttl_secs
            );
        }
        Commands::Confirm { email } => {
            if store.find_by_email(&email).await?.is_none() {
                bail!("No account for {email}");
            }
            store.confirm_email(&email).await?;
            tracing::info!(email = %email, "Email confirmed");
            println!("{email} confirmed");
        }
    }

    Ok(())
}

fn load_config() -> anyhow::Result<AppConfig> {
    let config = match std::env::var("CONTACTS_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}
