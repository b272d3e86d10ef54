use std::time::Duration;

use axum::http::Method;
use clap::{Parser, Subcommand};
use miette::Result;
use rolegate::authz::bootstrap;
use rolegate::authz::identity::TokenIdentity;
use rolegate::authz::types::{Action, Resource, UserId};
use rolegate::authz::PolicyStore;
use rolegate::errors::AppError;
use rolegate::settings::Settings;
use rolegate::web::{self, AppState};
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "rolegate", version, about = "Role-based access control engine")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Migrate, seed the default policy and serve HTTP (default)
    Serve,
    /// Migrate and seed the default policy, then exit
    Seed,
    /// Print the authorization decision for a request
    Check {
        user: String,
        method: String,
        path: String,
    },
    /// Mint a bearer token for local testing
    Token {
        user: String,
        /// Token lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = Settings::load(&cli.config)?;
    tracing::debug!(?settings, "Loaded configuration");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let db = init_db(&settings).await?;
            if settings.authz.seed_default_policy {
                seed(&settings, &db).await?;
            }
            web::serve(AppState::new(settings, db)).await?;
        }
        Command::Seed => {
            let db = init_db(&settings).await?;
            seed(&settings, &db).await?;
        }
        Command::Check { user, method, path } => {
            let user = UserId::parse(user).map_err(AppError::BadRequest)?;
            let method = Method::from_bytes(method.to_uppercase().as_bytes())
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            let resource = Resource::from_request_path(&path);

            let db = init_db(&settings).await?;
            let state = AppState::new(settings, db);
            let allowed = match Action::from_method(&method) {
                Some(action) => state
                    .enforcer
                    .enforce(&user, &resource, action)
                    .await
                    .map_err(AppError::from)?,
                None => false,
            };
            println!(
                "{} {} {} -> {}",
                user,
                method,
                resource,
                if allowed { "allow" } else { "deny" }
            );
        }
        Command::Token { user, ttl } => {
            let user = UserId::parse(user).map_err(AppError::BadRequest)?;
            let identity = TokenIdentity::new(
                settings.identity.token_secret.clone(),
                settings.identity.cookie_name.clone(),
            );
            let token = identity
                .issue(&user, Duration::from_secs(ttl))
                .map_err(AppError::from)?;
            println!("{token}");
        }
    }
    Ok(())
}

async fn init_db(settings: &Settings) -> Result<DatabaseConnection, AppError> {
    let db = Database::connect(&settings.database.url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

async fn seed(settings: &Settings, db: &DatabaseConnection) -> Result<(), AppError> {
    let store = PolicyStore::new(db.clone(), settings.authz.store_timeout());
    bootstrap::seed_from_file(&store, &settings.authz.policy_file).await?;
    Ok(())
}
