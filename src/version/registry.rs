//! Registry trait for querying package metadata

#[cfg(test)]
use mockall::automock;

use crate::version::error::RegistryError;
use crate::version::types::{DependencyManifest, TimeIndex};

/// Trait for querying published package metadata from a registry
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Registry: Send + Sync {
    /// Fetches every published version of a package, in no particular order
    async fn fetch_versions(&self, package_name: &str) -> Result<Vec<String>, RegistryError>;

    /// Fetches the publish time of every version of a package
    ///
    /// The returned index never contains the `created`/`modified` entries.
    async fn fetch_times(&self, package_name: &str) -> Result<TimeIndex, RegistryError>;

    /// Fetches the `dependencies` declared by one published version
    ///
    /// # Returns
    /// * `Ok(Some(manifest))` - The declared dependencies
    /// * `Ok(None)` - The version declares no dependencies
    /// * `Err(RegistryError)` - If the query fails
    async fn fetch_dependencies(
        &self,
        package_name: &str,
        version: &str,
    ) -> Result<Option<DependencyManifest>, RegistryError>;
}
