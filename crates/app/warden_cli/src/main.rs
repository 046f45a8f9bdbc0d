// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use std::collections::BTreeSet;

use clap::Parser;
use cli::{Cli, Commands, DatabaseArgs, RolesCommand};
use rand::Rng;
use rand::distr::Alphanumeric;
use sqlx::postgres::PgPoolOptions;
use warden_core::config::Environment;
use warden_core::{AuthConfig, AuthEngine, Stores};

mod cli;
mod logging;

fn main() -> Result<()> {
    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init()?;

    let args = Cli::parse();

    match args.command {
        Commands::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        }
        Commands::CheckConfig => check_config()?,
        Commands::Secret { length } => {
            if length == 0 {
                return Err(Error::Custom("secret length must be positive".into()));
            }
            println!("{}", secret(length));
        }
        Commands::Roles { db, command } => runtime()?.block_on(roles(db, command))?,
        Commands::Grant {
            db,
            credential_id,
            permissions,
            replace,
        } => runtime()?.block_on(grant(db, credential_id, permissions, replace))?,
    }

    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Runtime::new()?)
}

fn check_config() -> Result<()> {
    let config = AuthConfig::from_env()?;
    if config.environment == Environment::Development {
        log::warn!("development mode: unset secrets fall back to insecure built-in values");
    }
    log::info!("environment: {:?}", config.environment);
    log::info!("issuer: {}, audience: {}", config.issuer, config.audience);
    log::info!(
        "access ttl: {}, refresh ttl: {}",
        humantime::format_duration(config.access_ttl),
        humantime::format_duration(config.refresh_ttl)
    );
    log::info!(
        "bcrypt cost: {}, session policy: {:?}",
        config.bcrypt_cost,
        config.session_policy
    );
    println!("configuration OK");
    Ok(())
}

fn secret(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

async fn engine(db: &DatabaseArgs) -> Result<AuthEngine> {
    let config = AuthConfig::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(config.store_timeout)
        .connect(&db.database_url)
        .await?;
    warden_core::migrate::migrate(&pool).await?;
    Ok(AuthEngine::new(config, Stores::postgres(pool))?)
}

async fn roles(db: DatabaseArgs, command: RolesCommand) -> Result<()> {
    let engine = engine(&db).await?;
    let roles = match command {
        RolesCommand::Seed => {
            let roles = engine.roles().seed_defaults().await?;
            log::info!("{} default roles provisioned", roles.len());
            roles
        }
        RolesCommand::List => engine.roles().list().await?,
    };
    for role in roles {
        let permissions: Vec<&str> = role.permissions.iter().map(String::as_str).collect();
        println!(
            "{}\t{}\t{}\t{}",
            role.id,
            role.level,
            role.name,
            permissions.join(",")
        );
    }
    Ok(())
}

async fn grant(
    db: DatabaseArgs,
    credential_id: uuid::Uuid,
    permissions: Vec<String>,
    replace: bool,
) -> Result<()> {
    let engine = engine(&db).await?;
    let mut next: BTreeSet<String> = if replace {
        BTreeSet::new()
    } else {
        engine.credential(credential_id).await?.permissions
    };
    next.extend(permissions);
    let credential = engine.update_permissions(credential_id, next).await?;
    log::info!(
        "{} now holds {} permission override(s)",
        credential.email,
        credential.permissions.len()
    );
    for permission in &credential.permissions {
        println!("{permission}");
    }
    Ok(())
}
