//! CLI subcommands.

pub mod export;
pub mod targets;

use std::path::PathBuf;

use archiport::vault::CredentialVault;

use crate::error::CliError;

/// Open the user-level credential vault.
pub fn open_vault() -> Result<CredentialVault, CliError> {
    let dir = vault_dir()?;
    CredentialVault::open(dir).map_err(CliError::from)
}

fn vault_dir() -> Result<PathBuf, CliError> {
    dirs::config_dir()
        .map(|base| base.join("archiport").join("cloud_targets"))
        .ok_or_else(|| {
            CliError::Config("could not determine a configuration directory".to_string())
        })
}
