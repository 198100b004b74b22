//! Parent-version crawl
//!
//! Walks a parent package's versions newest first, reading what each one
//! declares for a child package, and returns the newest parent whose
//! declaration lines up with a target child version.

use std::sync::Arc;

use tracing::{debug, info};

use crate::version::error::ResolveError;
use crate::version::registry::Registry;
use crate::version::retry::{RetryPolicy, Ticket, first_match, retry};
use crate::version::semver::{is_prerelease, lte, min_satisfying, sort_descending};

/// Inputs of one crawl
#[derive(Debug, Clone, Copy)]
pub struct CrawlRequest<'a> {
    pub parent_package: &'a str,
    pub child_package: &'a str,
    /// Every published parent version
    pub parent_versions: &'a [String],
    /// Every published child version
    pub child_versions: &'a [String],
    /// Child version or range the parent must line up with
    pub target_child_version: &'a str,
}

pub struct Crawler {
    registry: Arc<dyn Registry>,
    policy: RetryPolicy,
    concurrency: usize,
}

impl Crawler {
    pub fn new(registry: Arc<dyn Registry>, policy: RetryPolicy, concurrency: usize) -> Self {
        Self {
            registry,
            policy,
            concurrency,
        }
    }

    /// Fetch both version lists and crawl `parent` for `child@target`
    pub async fn resolve_for_packages(
        &self,
        parent: &str,
        child: &str,
        target: &str,
    ) -> Result<Option<String>, ResolveError> {
        let parent_label = format!("{parent} versions");
        let child_label = format!("{child} versions");
        let (parent_versions, child_versions) = tokio::try_join!(
            retry(&self.policy, &parent_label, || self.registry.fetch_versions(parent)),
            retry(&self.policy, &child_label, || self.registry.fetch_versions(child))
        )?;

        self.resolve_parent_version(CrawlRequest {
            parent_package: parent,
            child_package: child,
            parent_versions: &parent_versions,
            child_versions: &child_versions,
            target_child_version: target,
        })
        .await
    }

    /// Find the newest parent version whose declared child dependency matches
    /// the target.
    ///
    /// A parent matches when it declares the target string verbatim, or when
    /// its declared (non pre-release) range has a floor at or below the
    /// target's floor. Returns `Ok(None)` when no parent matches.
    pub async fn resolve_parent_version(
        &self,
        request: CrawlRequest<'_>,
    ) -> Result<Option<String>, ResolveError> {
        let min_target = min_satisfying(request.child_versions, request.target_child_version);
        let candidates = sort_descending(request.parent_versions);

        info!(
            "Crawling {} versions of {} for {}@{} (floor {:?})",
            candidates.len(),
            request.parent_package,
            request.child_package,
            request.target_child_version,
            min_target
        );

        let min_target = min_target.as_deref();
        let resolved = first_match(candidates, self.concurrency, |parent_version, ticket| {
            self.check_candidate(request, min_target, parent_version, ticket)
        })
        .await?;

        match &resolved {
            Some(version) => info!("Resolved {}@{}", request.parent_package, version),
            None => info!(
                "No {} version depends on {}@{}",
                request.parent_package, request.child_package, request.target_child_version
            ),
        }

        Ok(resolved)
    }

    async fn check_candidate(
        &self,
        request: CrawlRequest<'_>,
        min_target: Option<&str>,
        parent_version: String,
        ticket: Ticket,
    ) -> Result<Option<String>, ResolveError> {
        if ticket.is_superseded() {
            return Ok(None);
        }

        let label = format!("{}@{} dependencies", request.parent_package, parent_version);
        let dependencies = retry(&self.policy, &label, || {
            self.registry
                .fetch_dependencies(request.parent_package, &parent_version)
        })
        .await?;

        if ticket.is_superseded() {
            return Ok(None);
        }

        // some versions are published without the dependency at all
        let Some(declared) = dependencies
            .as_ref()
            .and_then(|deps| deps.get(request.child_package))
        else {
            debug!(
                "{}@{} does not depend on {}",
                request.parent_package, parent_version, request.child_package
            );
            return Ok(None);
        };

        let matched = declares_compatible_child(
            declared,
            request.target_child_version,
            request.child_versions,
            min_target,
        );
        debug!(
            "{}@{} declares {}@{}: {}",
            request.parent_package,
            parent_version,
            request.child_package,
            declared,
            if matched { "match" } else { "no match" }
        );

        Ok(matched.then_some(parent_version))
    }
}

/// Match rule for one candidate's declared child version
fn declares_compatible_child(
    declared: &str,
    target: &str,
    child_versions: &[String],
    min_target: Option<&str>,
) -> bool {
    // literal pin, compared as text
    if declared == target {
        return true;
    }

    if is_prerelease(declared) {
        return false;
    }

    match (min_satisfying(child_versions, declared), min_target) {
        (Some(min_declared), Some(min_target)) => lte(&min_declared, min_target),
        _ => false,
    }
}
