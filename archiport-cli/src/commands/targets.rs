//! Targets command - manage stored cloud storage targets.

use clap::{Args, Subcommand, ValueEnum};

use archiport::cloud::{
    AuthMode, CloudTargetConfig, CloudUploadEngine, S3Target, WebdavTarget,
};

use super::open_vault;
use crate::error::CliError;

/// Authentication mode selection for CLI arguments.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum AuthChoice {
    /// HTTP Basic authentication
    #[default]
    Basic,
    /// Bearer token (pass the token as --password)
    Bearer,
}

impl From<AuthChoice> for AuthMode {
    fn from(choice: AuthChoice) -> Self {
        match choice {
            AuthChoice::Basic => AuthMode::Basic,
            AuthChoice::Bearer => AuthMode::Bearer,
        }
    }
}

/// Arguments for storing a WebDAV target.
#[derive(Args)]
pub struct AddWebdavArgs {
    /// Name to store the target under
    pub name: String,

    /// WebDAV base URL
    #[arg(long)]
    pub url: String,

    /// Username
    #[arg(long, default_value = "")]
    pub username: String,

    /// Password (or bearer token with --auth bearer)
    #[arg(long, env = "ARCHIPORT_WEBDAV_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Authentication mode
    #[arg(long, value_enum, default_value_t)]
    pub auth: AuthChoice,

    /// Remote directory to place archives in
    #[arg(long, default_value = "")]
    pub remote_directory: String,

    /// Human-readable label
    #[arg(long, default_value = "")]
    pub display_name: String,
}

/// Arguments for storing an S3-compatible target.
#[derive(Args)]
pub struct AddS3Args {
    /// Name to store the target under
    pub name: String,

    /// Endpoint URL (AWS, MinIO, ...)
    #[arg(long)]
    pub endpoint: String,

    /// Signing region
    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Access key id
    #[arg(long)]
    pub access_key: String,

    /// Secret access key
    #[arg(long, env = "ARCHIPORT_S3_SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,

    /// Bucket name
    #[arg(long)]
    pub bucket: String,

    /// Key prefix under the bucket
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Human-readable label
    #[arg(long, default_value = "")]
    pub display_name: String,
}

/// Subcommands for target management.
#[derive(Subcommand)]
pub enum TargetsCommand {
    /// List stored targets
    List,
    /// Store a WebDAV target
    AddWebdav(AddWebdavArgs),
    /// Store an S3-compatible target
    AddS3(AddS3Args),
    /// Remove a stored target
    Remove {
        /// Name of the target to remove
        name: String,
    },
    /// Probe a stored target for reachability and permissions
    Test {
        /// Name of the target to probe
        name: String,
    },
}

/// Run a targets subcommand.
pub fn run(command: TargetsCommand) -> Result<(), CliError> {
    let vault = open_vault()?;

    match command {
        TargetsCommand::List => {
            let summaries = vault.list();
            if summaries.is_empty() {
                println!("No cloud targets stored.");
                return Ok(());
            }
            for summary in summaries {
                let updated = summary
                    .updated_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<20} {:<8} {:<32} updated {}",
                    summary.name, summary.kind, summary.display_name, updated
                );
            }
            Ok(())
        }

        TargetsCommand::AddWebdav(args) => {
            let config = CloudTargetConfig::Webdav(WebdavTarget {
                display_name: args.display_name,
                url: args.url,
                username: args.username,
                password: args.password,
                auth_type: args.auth.into(),
                remote_directory: args.remote_directory,
                created_at: None,
                updated_at: None,
            });
            vault.save(&args.name, config)?;
            println!("Stored WebDAV target '{}'.", args.name);
            Ok(())
        }

        TargetsCommand::AddS3(args) => {
            let config = CloudTargetConfig::S3(S3Target {
                display_name: args.display_name,
                endpoint_url: args.endpoint,
                region: args.region,
                access_key: args.access_key,
                secret_key: args.secret_key,
                bucket: args.bucket,
                remote_prefix: args.prefix,
                created_at: None,
                updated_at: None,
            });
            vault.save(&args.name, config)?;
            println!("Stored S3 target '{}'.", args.name);
            Ok(())
        }

        TargetsCommand::Remove { name } => {
            if vault.delete(&name)? {
                println!("Removed target '{}'.", name);
                Ok(())
            } else {
                Err(CliError::Config(format!("no cloud target named '{}'", name)))
            }
        }

        TargetsCommand::Test { name } => {
            let config = vault
                .load(&name)
                .ok_or_else(|| CliError::Config(format!("no cloud target named '{}'", name)))?;
            match CloudUploadEngine::new().test_connection(&config) {
                Ok(()) => {
                    println!("Connection to '{}' succeeded.", config.display_name());
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}
