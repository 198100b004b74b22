//! Version resolution engine
//!
//! This module correlates published versions of coupled npm packages: which
//! parent version first shipped a given child version, and which version of
//! a package was current at a point in time.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Registry   │────▶│    Retry    │────▶│   Crawler   │
//! │  (query)    │     │ (run/retry) │     │ (parent ver)│
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                                       │
//!        ▼                                       ▼
//! ┌─────────────┐                         ┌─────────────┐
//! │  Timeline   │────────────────────────▶│   Planner   │
//! │  (as of)    │                         │(version pair│
//! └─────────────┘                         └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`registry`]: Registry trait for querying package metadata
//! - [`registries`]: npm HTTP and `npm info` implementations
//! - [`retry`]: Classified retries and bounded first-match execution
//! - [`crawler`]: Parent-version crawl
//! - [`timeline`]: Version current at an instant
//! - [`planner`]: Scaffold/scripts version pairs for both sides of an update
//! - [`range`]: npm range grammar
//! - [`semver`]: Shared semver utilities
//! - [`error`]: Error types for registry and resolution failures
//! - [`types`]: Common types like `TimeIndex` and `VersionPair`

pub mod crawler;
pub mod error;
pub mod planner;
pub mod range;
pub mod registries;
pub mod registry;
pub mod retry;
pub mod semver;
pub mod timeline;
pub mod types;
