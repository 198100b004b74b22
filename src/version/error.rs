use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Rate limited: retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Package not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The registry answered but could not serve the request right now (5xx).
    #[error("registry contention: {0}")]
    Contention(String),

    /// The `npm` command exited unsuccessfully; carries its stderr.
    #[error("{0}")]
    Command(String),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{package} version could not be determined")]
    ScriptsVersionUndetermined { package: String },

    #[error("{package} version could not be determined")]
    ScaffoldVersionUndetermined { package: String },

    #[error("{package} version could not be determined")]
    CompanionVersionUndetermined { package: String },

    #[error("{package}@{version} was never published")]
    UnknownVersion { package: String, version: String },

    #[error("Invalid instant: {0}")]
    InvalidInstant(String),
}
