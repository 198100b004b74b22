//! npm registry HTTP API implementation

use std::collections::HashMap;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::version::error::RegistryError;
use crate::version::registry::Registry;
use crate::version::types::{DependencyManifest, TimeIndex};

/// Packument fields used for version history
#[derive(Debug, Deserialize)]
struct NpmPackageResponse {
    #[serde(default)]
    versions: HashMap<String, serde_json::Value>,
    #[serde(default)]
    time: HashMap<String, serde_json::Value>,
}

/// Manifest of a single published version
#[derive(Debug, Deserialize)]
struct NpmVersionResponse {
    dependencies: Option<DependencyManifest>,
}

/// Registry implementation for the npm registry HTTP API
pub struct NpmRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl NpmRegistry {
    pub fn new(base_url: &str) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("scaffold-versions/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Encode package name for URL (handles scoped packages)
    fn encode_package_name(package_name: &str) -> String {
        if package_name.starts_with('@') {
            // Scoped package: @scope/name -> @scope%2Fname
            package_name.replace('/', "%2F")
        } else {
            package_name.to_string()
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        package_name: &str,
    ) -> Result<T, RegistryError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(package_name.to_string()));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(RegistryError::RateLimited { retry_after_secs });
        }

        if status.is_server_error() {
            warn!("npm registry returned status {}: {}", status, url);
            return Err(RegistryError::Contention(format!("{} from {}", status, url)));
        }

        if !status.is_success() {
            warn!("npm registry returned status {}: {}", status, url);
            return Err(RegistryError::InvalidResponse(format!(
                "Unexpected status: {}",
                status
            )));
        }

        response.json().await.map_err(|e| {
            warn!("Failed to parse npm registry response: {}", e);
            RegistryError::InvalidResponse(e.to_string())
        })
    }
}

#[async_trait::async_trait]
impl Registry for NpmRegistry {
    async fn fetch_versions(&self, package_name: &str) -> Result<Vec<String>, RegistryError> {
        let path = Self::encode_package_name(package_name);
        let package_info: NpmPackageResponse = self.get_json(&path, package_name).await?;

        Ok(package_info.versions.into_keys().collect())
    }

    async fn fetch_times(&self, package_name: &str) -> Result<TimeIndex, RegistryError> {
        let path = Self::encode_package_name(package_name);
        let package_info: NpmPackageResponse = self.get_json(&path, package_name).await?;

        let times = package_info
            .time
            .into_iter()
            .filter_map(|(version, time)| time.as_str().map(|t| (version, t.to_string())));

        Ok(TimeIndex::from_raw(times))
    }

    async fn fetch_dependencies(
        &self,
        package_name: &str,
        version: &str,
    ) -> Result<Option<DependencyManifest>, RegistryError> {
        let path = format!("{}/{}", Self::encode_package_name(package_name), version);
        let manifest: NpmVersionResponse = self.get_json(&path, package_name).await?;

        Ok(manifest.dependencies.filter(|deps| !deps.is_empty()))
    }
}
