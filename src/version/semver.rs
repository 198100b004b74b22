//! Shared semver utilities over published version strings

use semver::Version;

use crate::version::range::NpmRange;

/// Parse a published version string, accepting a leading `v` or `=`.
pub fn parse_version(version: &str) -> Option<Version> {
    let version = version.trim();
    let version = version
        .strip_prefix('=')
        .or_else(|| version.strip_prefix('v'))
        .unwrap_or(version);
    Version::parse(version).ok()
}

/// Whether `version` is a valid version carrying a pre-release tag.
///
/// Ranges and unparseable strings are not pre-releases.
pub fn is_prerelease(version: &str) -> bool {
    parse_version(version).is_some_and(|v| !v.pre.is_empty())
}

/// Lowest version in `versions` satisfying `range`: the floor of the range
pub fn min_satisfying(versions: &[String], range: &str) -> Option<String> {
    let range = NpmRange::parse(range)?;
    versions
        .iter()
        .filter_map(|v| parse_version(v).map(|parsed| (v, parsed)))
        .filter(|(_, parsed)| range.satisfies(parsed))
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(original, _)| original.clone())
}

/// Highest version in `versions` satisfying `range`
pub fn max_satisfying<'a, I>(versions: I, range: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let range = NpmRange::parse(range)?;
    versions
        .into_iter()
        .filter_map(|v| parse_version(v).map(|parsed| (v, parsed)))
        .filter(|(_, parsed)| range.satisfies(parsed))
        .max_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(original, _)| original.to_string())
}

/// A new view of `versions` ordered newest first. Unparseable entries are dropped.
pub fn sort_descending(versions: &[String]) -> Vec<String> {
    let mut parsed: Vec<(&String, Version)> = versions
        .iter()
        .filter_map(|v| parse_version(v).map(|p| (v, p)))
        .collect();
    parsed.sort_by(|(_, a), (_, b)| b.cmp(a));
    parsed.into_iter().map(|(v, _)| v.clone()).collect()
}

/// Semver `a <= b`; `false` when either side does not parse.
pub fn lte(a: &str, b: &str) -> bool {
    match (parse_version(a), parse_version(b)) {
        (Some(a), Some(b)) => a <= b,
        _ => false,
    }
}
