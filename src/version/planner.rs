//! Version-pair planning
//!
//! Works out which scaffold and scripts package versions generated a
//! project, so the same generation can be replayed for the start and the
//! end of an update.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use indexmap::IndexMap;
use tracing::info;

use crate::config::{PackagesConfig, ResolverConfig};
use crate::version::crawler::{CrawlRequest, Crawler};
use crate::version::error::ResolveError;
use crate::version::registry::Registry;
use crate::version::retry::{RetryPolicy, retry};
use crate::version::semver::min_satisfying;
use crate::version::timeline::version_as_of;
use crate::version::types::{DependencyManifest, ProjectType, TimeIndex, UpdatePlan, VersionPair};

/// What is known about one side of an update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanRequest {
    pub project_type: ProjectType,
    /// The project's `dependencies` merged with its `devDependencies`
    pub dependencies: DependencyManifest,
    /// Use this scaffold version instead of deriving it from publish times
    pub scaffold_version: Option<String>,
}

impl PlanRequest {
    /// Build a request from a parsed `package.json`.
    ///
    /// `devDependencies` entries win over `dependencies` entries of the same name.
    pub fn from_package_json(manifest: &serde_json::Value, project_type: ProjectType) -> Self {
        let mut dependencies = DependencyManifest::new();
        for field in ["dependencies", "devDependencies"] {
            let Some(entries) = manifest.get(field).and_then(|v| v.as_object()) else {
                continue;
            };
            for (name, range) in entries {
                if let Some(range) = range.as_str() {
                    dependencies.insert(name.clone(), range.to_string());
                }
            }
        }

        Self {
            project_type,
            dependencies,
            scaffold_version: None,
        }
    }

    /// A normal project declaring exactly `scripts_version` of `scripts_package`
    pub fn for_scripts_version(scripts_package: &str, scripts_version: &str) -> Self {
        Self {
            project_type: ProjectType::Normal,
            dependencies: DependencyManifest::from([(
                scripts_package.to_string(),
                scripts_version.to_string(),
            )]),
            scaffold_version: None,
        }
    }
}

pub struct VersionPlanner {
    registry: Arc<dyn Registry>,
    packages: PackagesConfig,
    policy: RetryPolicy,
    crawler: Crawler,
}

impl VersionPlanner {
    pub fn new(registry: Arc<dyn Registry>, config: &ResolverConfig) -> Self {
        let policy = RetryPolicy::from_config(&config.crawl);
        let crawler = Crawler::new(registry.clone(), policy.clone(), config.crawl.concurrency);

        Self {
            registry,
            packages: config.packages.clone(),
            policy,
            crawler,
        }
    }

    pub fn packages(&self) -> &PackagesConfig {
        &self.packages
    }

    /// Resolve the scaffold/scripts pair that generated the described project.
    ///
    /// Ejected projects no longer name a scripts version, so it is recovered by
    /// crawling scripts versions for the one that shipped the project's
    /// utilities version. The scaffold version is the one current when that
    /// scripts version was published.
    pub async fn plan_version_pair(
        &self,
        request: &PlanRequest,
    ) -> Result<VersionPair, ResolveError> {
        let scaffold = self.packages.scaffold.as_str();
        let scripts = self.packages.scripts.as_str();

        let (scaffold_times, scripts_times) =
            tokio::try_join!(self.fetch_times(scaffold), self.fetch_times(scripts))?;
        let scripts_versions = scripts_times.versions();

        let scripts_version = match request.project_type {
            ProjectType::Ejected => self.crawl_scripts_version(request, &scripts_versions).await?,
            ProjectType::Normal => request
                .dependencies
                .get(scripts)
                .and_then(|range| min_satisfying(&scripts_versions, range)),
        }
        .ok_or_else(|| ResolveError::ScriptsVersionUndetermined {
            package: scripts.to_string(),
        })?;

        let scaffold_version = match &request.scaffold_version {
            Some(pinned) if scaffold_times.contains(pinned) => pinned.clone(),
            Some(pinned) => {
                return Err(ResolveError::UnknownVersion {
                    package: scaffold.to_string(),
                    version: pinned.clone(),
                });
            }
            None => scripts_times
                .published_at(&scripts_version)
                .and_then(|published| version_as_of(&scaffold_times, published))
                .ok_or_else(|| ResolveError::ScaffoldVersionUndetermined {
                    package: scaffold.to_string(),
                })?,
        };

        info!(
            "Planned {}@{} with {}@{} ({} project)",
            scaffold, scaffold_version, scripts, scripts_version, request.project_type
        );

        Ok(VersionPair {
            scaffold_version,
            scripts_version,
        })
    }

    /// Plan both sides of an update concurrently
    pub async fn plan_update(
        &self,
        start: &PlanRequest,
        end: &PlanRequest,
    ) -> Result<UpdatePlan, ResolveError> {
        let (start, end) =
            tokio::try_join!(self.plan_version_pair(start), self.plan_version_pair(end))?;
        Ok(UpdatePlan { start, end })
    }

    /// The version of `package` that was current at `instant`
    pub async fn version_as_of(
        &self,
        package: &str,
        instant: DateTime<Utc>,
    ) -> Result<Option<String>, ResolveError> {
        let times = self.fetch_times(package).await?;
        Ok(version_as_of(&times, instant))
    }

    /// Caret ranges of each companion package as of `instant`, as written into
    /// a regenerated project's manifest
    pub async fn companion_versions(
        &self,
        instant: DateTime<Utc>,
    ) -> Result<IndexMap<String, String>, ResolveError> {
        let lookups = self.packages.companions.iter().map(|package| async move {
            let version = self.version_as_of(package, instant).await?.ok_or_else(|| {
                ResolveError::CompanionVersionUndetermined {
                    package: package.clone(),
                }
            })?;
            Ok::<_, ResolveError>((package.clone(), format!("^{version}")))
        });

        Ok(try_join_all(lookups).await?.into_iter().collect())
    }

    async fn crawl_scripts_version(
        &self,
        request: &PlanRequest,
        scripts_versions: &[String],
    ) -> Result<Option<String>, ResolveError> {
        let utilities = self.packages.utilities.as_str();
        let Some(declared) = request.dependencies.get(utilities) else {
            info!("Ejected project does not declare {}", utilities);
            return Ok(None);
        };

        let label = format!("{} versions", utilities);
        let utilities_versions =
            retry(&self.policy, &label, || self.registry.fetch_versions(utilities)).await?;

        self.crawler
            .resolve_parent_version(CrawlRequest {
                parent_package: &self.packages.scripts,
                child_package: utilities,
                parent_versions: scripts_versions,
                child_versions: &utilities_versions,
                target_child_version: declared,
            })
            .await
    }

    async fn fetch_times(&self, package: &str) -> Result<TimeIndex, ResolveError> {
        let label = format!("{} publish times", package);
        Ok(retry(&self.policy, &label, || self.registry.fetch_times(package)).await?)
    }
}
