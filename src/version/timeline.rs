//! Time-indexed version lookup

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::version::error::ResolveError;
use crate::version::semver::max_satisfying;
use crate::version::types::TimeIndex;

/// Parse an instant given as RFC 3339, a naive date-time, or a bare date.
///
/// Naive inputs are taken as UTC; a bare date means its midnight.
pub fn parse_instant(input: &str) -> Result<DateTime<Utc>, ResolveError> {
    let input = input.trim();

    if let Ok(instant) = DateTime::parse_from_rfc3339(input) {
        return Ok(instant.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ResolveError::InvalidInstant(input.to_string()))
}

/// The highest version published strictly before `instant`.
///
/// Versions are compared by semver, not by publish order, and pre-releases
/// never count as current.
pub fn version_as_of(index: &TimeIndex, instant: DateTime<Utc>) -> Option<String> {
    let published = index
        .iter()
        .filter(|(_, time)| *time < instant)
        .map(|(version, _)| version);

    max_satisfying(published, "*")
}
