//! Comply: operator entry point.
//!
//! Loads configuration, initialises JSON logging, connects to SurrealDB
//! and runs one operator command.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comply_auth::{AccessContextResolver, AuthService, InboundCredentials, LoginInput};
use comply_core::models::invite::NewInvite;
use comply_core::models::role::Role;
use comply_db::DbManager;
use comply_db::repository::SurrealUserRepository;
use comply_db::service::{InviteService, UserService};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::config::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "comply")]
#[command(about = "Compliance access core operator tool")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "COMPLY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending schema migrations.
    Migrate,
    /// Create the first platform administrator.
    BootstrapAdmin {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "Platform Administrator")]
        display_name: String,
        #[arg(long, env = "COMPLY_BOOTSTRAP_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in and print a session token.
    IssueToken {
        #[arg(long)]
        email: String,
        #[arg(long, env = "COMPLY_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Issue invites on behalf of the holder of a session token. Prints
    /// one `email<TAB>secret` line per invite.
    IssueInvites {
        #[arg(long, env = "COMPLY_TOKEN", hide_env_values = true)]
        token: String,
        #[arg(long)]
        role: Role,
        #[arg(long)]
        institution: Option<Uuid>,
        #[arg(required = true)]
        emails: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::load(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .json()
        .init();

    info!(environment = %config.auth.environment, "Starting comply");

    let manager = DbManager::connect(&config.database)
        .await
        .context("failed to connect to SurrealDB")?;
    let db = manager.client().clone();
    comply_db::run_migrations(&db)
        .await
        .context("failed to apply migrations")?;

    match cli.command {
        Command::Migrate => {
            info!(version = comply_db::latest_version(), "Schema is up to date");
        }
        Command::BootstrapAdmin {
            email,
            display_name,
            password,
        } => {
            let user = UserService::with_pepper(db, config.auth.pepper.clone())
                .bootstrap_platform_admin(&email, &display_name, &password)
                .await?;
            println!("{}", user.id);
        }
        Command::IssueToken { email, password } => {
            let out = AuthService::new(SurrealUserRepository::new(db), config.auth.clone())
                .login(LoginInput { email, password })
                .await?;
            println!("{}", out.access_token);
        }
        Command::IssueInvites {
            token,
            role,
            institution,
            emails,
        } => {
            let resolver = AccessContextResolver::new(
                SurrealUserRepository::new(db.clone()),
                config.auth.clone(),
            );
            let ctx = resolver.resolve(&InboundCredentials::bearer(token)).await?;
            let requests = emails
                .into_iter()
                .map(|email| NewInvite {
                    email,
                    role,
                    institution_id: institution,
                })
                .collect();
            let issued = InviteService::new(db, config.invites.clone())
                .with_pepper(config.auth.pepper.clone())
                .create_bulk(&ctx, requests)
                .await?;
            for item in issued {
                println!("{}\t{}", item.invite.email, item.raw_token);
            }
        }
    }

    Ok(())
}
