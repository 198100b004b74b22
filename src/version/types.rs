//! Common types shared by the resolution engine

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::version::timeline::parse_instant;

/// Keys of the npm `time` object that describe the package, not a version
pub const NON_VERSION_TIME_KEYS: [&str; 2] = ["created", "modified"];

/// Declared dependency name to version range, as published by one package version
pub type DependencyManifest = IndexMap<String, String>;

/// Publish instant of every version of one package
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeIndex {
    times: HashMap<String, DateTime<Utc>>,
}

impl TimeIndex {
    /// Builds an index from raw registry `time` entries.
    ///
    /// The `created` and `modified` entries are dropped, as are entries whose
    /// timestamp cannot be parsed.
    pub fn from_raw<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let times = entries
            .into_iter()
            .map(|(version, time)| (version.into(), time))
            .filter(|(version, _)| !NON_VERSION_TIME_KEYS.contains(&version.as_str()))
            .filter_map(|(version, time)| match parse_instant(time.as_ref()) {
                Ok(instant) => Some((version, instant)),
                Err(_) => {
                    debug!("Skipping {} with unparseable publish time", version);
                    None
                }
            })
            .collect();

        Self { times }
    }

    pub fn published_at(&self, version: &str) -> Option<DateTime<Utc>> {
        self.times.get(version).copied()
    }

    pub fn contains(&self, version: &str) -> bool {
        self.times.contains_key(version)
    }

    /// All versions in the index, in no particular order
    pub fn versions(&self) -> Vec<String> {
        self.times.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, DateTime<Utc>)> {
        self.times.iter().map(|(v, t)| (v.as_str(), *t))
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Whether the project still depends on the scripts package or was ejected from it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    #[default]
    Normal,
    Ejected,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::Normal => "normal",
            ProjectType::Ejected => "ejected",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(ProjectType::Normal),
            "ejected" => Ok(ProjectType::Ejected),
            other => Err(format!("unknown project type: {other}")),
        }
    }
}

/// Scaffold and scripts package versions that generate a project at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionPair {
    pub scaffold_version: String,
    pub scripts_version: String,
}

/// Version pairs for both sides of an update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdatePlan {
    pub start: VersionPair,
    pub end: VersionPair,
}
