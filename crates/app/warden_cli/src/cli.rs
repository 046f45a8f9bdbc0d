use clap::{Parser, Subcommand};
use uuid::Uuid;

pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost:5432/warden";

#[derive(Parser, Debug)]
#[command(name = "warden", version, about = "Warden operator CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the CLI version
    Version,

    /// Load the auth configuration from the environment and report problems
    CheckConfig,

    /// Print a random secret suitable for JWT_SECRET / JWT_REFRESH_SECRET
    Secret {
        /// Number of alphanumeric characters
        #[arg(long, default_value_t = 64)]
        length: usize,
    },

    /// Role administration
    Roles {
        #[command(flatten)]
        db: DatabaseArgs,

        #[command(subcommand)]
        command: RolesCommand,
    },

    /// Add permission overrides to a credential
    Grant {
        #[command(flatten)]
        db: DatabaseArgs,

        /// Credential ID
        credential_id: Uuid,

        /// Permissions to add (e.g. write:reports)
        #[arg(required = true)]
        permissions: Vec<String>,

        /// Replace the credential's overrides instead of adding to them
        #[arg(long, default_value_t = false)]
        replace: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum RolesCommand {
    /// Provision the default roles (idempotent)
    Seed,

    /// List every role
    List,
}

#[derive(clap::Args, Debug)]
pub struct DatabaseArgs {
    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    pub database_url: String,
}
