//! Registry test utilities

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use scaffold_versions::config::{CrawlConfig, ResolverConfig};
use scaffold_versions::version::error::RegistryError;
use scaffold_versions::version::registry::Registry;
use scaffold_versions::version::types::{DependencyManifest, TimeIndex};

/// In-memory registry holding publish times and per-version dependencies
#[derive(Default)]
pub struct InMemoryRegistry {
    times: HashMap<String, Vec<(String, String)>>,
    dependencies: HashMap<(String, String), DependencyManifest>,
    delays: HashMap<(String, String), Duration>,
    /// Failures to return for a package before answering normally
    failures: HashMap<String, (u32, String)>,
    failed: HashMap<String, AtomicU32>,
    pub dependency_queries: Mutex<Vec<String>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `package@version` at `time`
    pub fn publish(mut self, package: &str, version: &str, time: &str) -> Self {
        self.times
            .entry(package.to_string())
            .or_default()
            .push((version.to_string(), time.to_string()));
        self
    }

    /// Record `time` entries such as `created` that are not versions
    pub fn with_time_entry(self, package: &str, key: &str, time: &str) -> Self {
        self.publish(package, key, time)
    }

    pub fn with_dependency(
        mut self,
        package: &str,
        version: &str,
        dependency: &str,
        range: &str,
    ) -> Self {
        self.dependencies
            .entry((package.to_string(), version.to_string()))
            .or_default()
            .insert(dependency.to_string(), range.to_string());
        self
    }

    /// Delay answers to dependency queries for `package@version`
    pub fn with_delay(mut self, package: &str, version: &str, delay_ms: u64) -> Self {
        self.delays.insert(
            (package.to_string(), version.to_string()),
            Duration::from_millis(delay_ms),
        );
        self
    }

    /// Fail the first `count` queries touching `package` with `message`
    pub fn failing(mut self, package: &str, count: u32, message: &str) -> Self {
        self.failures
            .insert(package.to_string(), (count, message.to_string()));
        self.failed.insert(package.to_string(), AtomicU32::new(0));
        self
    }

    fn check_failure(&self, package: &str) -> Result<(), RegistryError> {
        let (Some((count, message)), Some(failed)) =
            (self.failures.get(package), self.failed.get(package))
        else {
            return Ok(());
        };
        if failed.fetch_add(1, Ordering::SeqCst) < *count {
            return Err(RegistryError::Command(message.clone()));
        }
        Ok(())
    }

    pub fn queries_checked(&self, package: &str) -> u32 {
        self.failed
            .get(package)
            .map(|f| f.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn fetch_versions(&self, package_name: &str) -> Result<Vec<String>, RegistryError> {
        Ok(self.fetch_times(package_name).await?.versions())
    }

    async fn fetch_times(&self, package_name: &str) -> Result<TimeIndex, RegistryError> {
        self.check_failure(package_name)?;
        match self.times.get(package_name) {
            Some(entries) => Ok(TimeIndex::from_raw(entries.iter().cloned())),
            None => Err(RegistryError::NotFound(package_name.to_string())),
        }
    }

    async fn fetch_dependencies(
        &self,
        package_name: &str,
        version: &str,
    ) -> Result<Option<DependencyManifest>, RegistryError> {
        self.dependency_queries
            .lock()
            .unwrap()
            .push(format!("{package_name}@{version}"));
        self.check_failure(package_name)?;

        let key = (package_name.to_string(), version.to_string());
        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        Ok(self.dependencies.get(&key).cloned())
    }
}

/// Default configuration without retry back-off
pub fn test_config(concurrency: usize) -> ResolverConfig {
    ResolverConfig {
        crawl: CrawlConfig {
            concurrency,
            retry_delay_ms: 0,
            ..CrawlConfig::default()
        },
        ..ResolverConfig::default()
    }
}
