//! CLI error type.

use archiport::api::ApiError;
use archiport::cloud::CloudError;
use archiport::vault::VaultError;

/// Errors surfaced to the terminal with a non-zero exit code.
#[derive(Debug)]
pub enum CliError {
    /// Bad or missing configuration / arguments.
    Config(String),
    /// The photo server API failed.
    Api(ApiError),
    /// The credential vault failed.
    Vault(VaultError),
    /// A cloud target operation failed.
    Cloud(CloudError),
    /// The export finished with failures.
    ExportFailed(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "{}", msg),
            CliError::Api(e) => write!(f, "{}", e),
            CliError::Vault(e) => write!(f, "{}", e),
            CliError::Cloud(e) => write!(f, "{}", e),
            CliError::ExportFailed(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Api(e) => Some(e),
            CliError::Vault(e) => Some(e),
            CliError::Cloud(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ApiError> for CliError {
    fn from(e: ApiError) -> Self {
        CliError::Api(e)
    }
}

impl From<VaultError> for CliError {
    fn from(e: VaultError) -> Self {
        CliError::Vault(e)
    }
}

impl From<CloudError> for CliError {
    fn from(e: CloudError) -> Self {
        CliError::Cloud(e)
    }
}
