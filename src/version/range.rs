//! npm version range grammar
//!
//! Supports the range forms found in published `dependencies` maps:
//! - `1.2.3`, `=1.2.3`, `v1.2.3` - exact match
//! - `^1.2.3` - compatible with version (>=1.2.3 <2.0.0)
//! - `~1.2.3` - approximately equivalent (>=1.2.3 <1.3.0)
//! - `>=1.2.3`, `>1.2.3`, `<=1.2.3`, `<1.2.3` - comparison operators
//! - `1.2.x`, `1.x`, `1.2`, `1`, `*`, `""` - wildcards
//! - `1.0.0 - 2.0.0` - hyphen ranges
//! - `>=1.0.0 <2.0.0` - AND, `^1.0.0 || ^2.0.0` - OR
//!
//! Pre-release versions only satisfy a comparator set when one of its
//! comparators names a pre-release of the same `major.minor.patch`.

use semver::Version;

/// A parsed npm range specification
#[derive(Debug, Clone)]
pub struct NpmRange {
    /// Alternatives joined by `||`; each is an AND of comparators
    sets: Vec<Vec<Comparator>>,
}

impl NpmRange {
    /// Parse a range specification, returning `None` for anything that is
    /// not a version range (tags such as `latest`, git or file specifiers).
    pub fn parse(spec: &str) -> Option<Self> {
        let sets: Option<Vec<Vec<Comparator>>> =
            spec.split("||").map(|part| parse_and_set(part.trim())).collect();
        sets.map(|sets| Self { sets })
    }

    pub fn satisfies(&self, version: &Version) -> bool {
        self.sets.iter().any(|set| set_satisfies(set, version))
    }
}

fn set_satisfies(set: &[Comparator], version: &Version) -> bool {
    if !set.iter().all(|c| c.satisfies(version)) {
        return false;
    }

    if version.pre.is_empty() {
        return true;
    }

    set.iter().any(|c| {
        c.base().is_some_and(|base| {
            !base.pre.is_empty()
                && base.major == version.major
                && base.minor == version.minor
                && base.patch == version.patch
        })
    })
}

/// Parse a spec that may be AND (space-separated), a hyphen range, or a single comparator
fn parse_and_set(spec: &str) -> Option<Vec<Comparator>> {
    if spec.is_empty() {
        return Some(vec![Comparator::Any]);
    }

    if let Some(hyphen) = Comparator::parse_hyphen(spec) {
        return Some(vec![hyphen]);
    }

    split_and_parts(spec)
        .iter()
        .map(|part| Comparator::parse(part))
        .collect()
}

/// Split into AND parts, re-attaching operators separated from their
/// version by whitespace (`>= 1.0.0`)
fn split_and_parts(spec: &str) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut pending_operator: Option<&str> = None;

    for token in spec.split_whitespace() {
        if matches!(token, ">=" | ">" | "<=" | "<" | "=" | "^" | "~") {
            pending_operator = Some(token);
            continue;
        }
        match pending_operator.take() {
            Some(op) => parts.push(format!("{op}{token}")),
            None => parts.push(token.to_string()),
        }
    }

    parts
}

/// A version that may omit its minor or patch component
struct Partial {
    major: u64,
    minor: Option<u64>,
    patch: Option<u64>,
    full: Option<Version>,
}

impl Partial {
    fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let input = input.strip_prefix('v').unwrap_or(input);

        if let Ok(full) = Version::parse(input) {
            return Some(Self {
                major: full.major,
                minor: Some(full.minor),
                patch: Some(full.patch),
                full: Some(full),
            });
        }

        let is_wild = |s: &str| s == "x" || s == "X" || s == "*";
        let mut parts = input.split('.');
        let major = parts.next()?.parse::<u64>().ok()?;
        let minor = match parts.next() {
            None => None,
            Some(s) if is_wild(s) => None,
            Some(s) => Some(s.parse::<u64>().ok()?),
        };
        let patch = match parts.next() {
            None => None,
            Some(s) if is_wild(s) => None,
            Some(s) => Some(s.parse::<u64>().ok()?),
        };
        if parts.next().is_some() || (minor.is_none() && patch.is_some()) {
            return None;
        }

        Some(Self {
            major,
            minor,
            patch,
            full: None,
        })
    }

    /// Lowest version the partial covers
    fn floor(&self) -> Version {
        self.full.clone().unwrap_or_else(|| {
            Version::new(self.major, self.minor.unwrap_or(0), self.patch.unwrap_or(0))
        })
    }
}

/// A single npm comparator
#[derive(Debug, Clone)]
enum Comparator {
    /// Exact version match
    Exact(Version),
    /// Caret range: ^1.2.3 means >=1.2.3 <2.0.0 (or special cases for 0.x)
    Caret(Version),
    /// Tilde range: ~1.2.3 means >=1.2.3 <1.3.0
    Tilde(Version),
    Gte(Version),
    Gt(Version),
    Lte(Version),
    Lt(Version),
    /// Any version: * matches all versions
    Any,
    /// Wildcard major: 1.x means >=1.0.0 <2.0.0
    WildcardMajor(u64),
    /// Wildcard minor: 1.2.x means >=1.2.0 <1.3.0
    WildcardMinor(u64, u64),
    /// Hyphen range: 1.0.0 - 2.0.0 means >=1.0.0 <=2.0.0
    Hyphen { from: Version, to: Version },
}

impl Comparator {
    fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();

        if let Some(rest) = spec.strip_prefix(">=") {
            Partial::parse(rest).map(|p| Comparator::Gte(p.floor()))
        } else if let Some(rest) = spec.strip_prefix('>') {
            // >1 means >=2.0.0, >1.2 means >=1.3.0
            Partial::parse(rest).and_then(|p| match (p.minor, p.patch) {
                (None, _) => Some(Comparator::Gte(Version::new(p.major.checked_add(1)?, 0, 0))),
                (Some(minor), None) => Some(Comparator::Gte(Version::new(
                    p.major,
                    minor.checked_add(1)?,
                    0,
                ))),
                _ => Some(Comparator::Gt(p.floor())),
            })
        } else if let Some(rest) = spec.strip_prefix("<=") {
            Partial::parse(rest).and_then(|p| match (p.minor, p.patch) {
                (None, _) => Some(Comparator::Lt(Version::new(p.major.checked_add(1)?, 0, 0))),
                (Some(minor), None) => Some(Comparator::Lt(Version::new(
                    p.major,
                    minor.checked_add(1)?,
                    0,
                ))),
                _ => Some(Comparator::Lte(p.floor())),
            })
        } else if let Some(rest) = spec.strip_prefix('<') {
            Partial::parse(rest).map(|p| Comparator::Lt(p.floor()))
        } else if let Some(rest) = spec.strip_prefix('^') {
            Partial::parse(rest).map(|p| match (p.major, p.minor, p.patch) {
                // ^0 covers the whole 0 major, ^0.0 the whole 0.0 minor
                (0, None, _) => Comparator::WildcardMajor(0),
                (0, Some(0), None) => Comparator::WildcardMinor(0, 0),
                _ => Comparator::Caret(p.floor()),
            })
        } else if let Some(rest) = spec.strip_prefix('~') {
            let rest = rest.strip_prefix('>').unwrap_or(rest);
            Partial::parse(rest).map(|p| match p.minor {
                None => Comparator::WildcardMajor(p.major),
                Some(_) => Comparator::Tilde(p.floor()),
            })
        } else if spec == "*" || spec.eq_ignore_ascii_case("x") {
            Some(Comparator::Any)
        } else {
            let spec = spec.strip_prefix('=').unwrap_or(spec);
            Partial::parse(spec).map(|p| match (p.minor, p.patch) {
                (None, _) => Comparator::WildcardMajor(p.major),
                (Some(minor), None) => Comparator::WildcardMinor(p.major, minor),
                _ => Comparator::Exact(p.floor()),
            })
        }
    }

    /// Parse hyphen range like "1.0.0 - 2.0.0"
    fn parse_hyphen(spec: &str) -> Option<Self> {
        let (from, to) = spec.split_once(" - ")?;
        let from = Partial::parse(from)?.floor();
        let to = Partial::parse(to)?;
        let to = match (to.minor, to.patch) {
            (None, _) => Version::new(to.major, u64::MAX, u64::MAX),
            (Some(minor), None) => Version::new(to.major, minor, u64::MAX),
            _ => to.floor(),
        };

        Some(Comparator::Hyphen { from, to })
    }

    fn satisfies(&self, version: &Version) -> bool {
        match self {
            Comparator::Exact(v) => version == v,
            Comparator::Caret(v) => {
                if version < v {
                    return false;
                }
                // ^1.2.3 -> >=1.2.3 <2.0.0
                // ^0.2.3 -> >=0.2.3 <0.3.0
                // ^0.0.3 -> >=0.0.3 <0.0.4
                if v.major == 0 {
                    if v.minor == 0 {
                        version.major == 0 && version.minor == 0 && version.patch == v.patch
                    } else {
                        version.major == 0 && version.minor == v.minor
                    }
                } else {
                    version.major == v.major
                }
            }
            Comparator::Tilde(v) => {
                version >= v && version.major == v.major && version.minor == v.minor
            }
            Comparator::Gte(v) => version >= v,
            Comparator::Gt(v) => version > v,
            Comparator::Lte(v) => version <= v,
            Comparator::Lt(v) => version < v,
            Comparator::Any => true,
            Comparator::WildcardMajor(major) => version.major == *major,
            Comparator::WildcardMinor(major, minor) => {
                version.major == *major && version.minor == *minor
            }
            Comparator::Hyphen { from, to } => version >= from && version <= to,
        }
    }

    /// The version a comparator is anchored on, used for pre-release admission
    fn base(&self) -> Option<&Version> {
        match self {
            Comparator::Exact(v)
            | Comparator::Caret(v)
            | Comparator::Tilde(v)
            | Comparator::Gte(v)
            | Comparator::Gt(v)
            | Comparator::Lte(v)
            | Comparator::Lt(v) => Some(v),
            Comparator::Hyphen { from, .. } => Some(from),
            Comparator::Any | Comparator::WildcardMajor(_) | Comparator::WildcardMinor(..) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn satisfies(spec: &str, version: &str) -> bool {
        NpmRange::parse(spec)
            .unwrap()
            .satisfies(&Version::parse(version).unwrap())
    }

    #[rstest]
    #[case("1.0.0", "1.0.0", true)]
    #[case("1.0.0", "1.0.1", false)]
    #[case("=1.0.0", "1.0.0", true)]
    #[case("v1.0.0", "1.0.0", true)]
    fn exact(#[case] spec: &str, #[case] version: &str, #[case] expected: bool) {
        assert_eq!(satisfies(spec, version), expected);
    }

    #[rstest]
    #[case("^1.2.3", "1.2.3", true)]
    #[case("^1.2.3", "1.9.9", true)]
    #[case("^1.2.3", "1.2.2", false)]
    #[case("^1.2.3", "2.0.0", false)]
    #[case("^0.2.3", "0.2.9", true)]
    #[case("^0.2.3", "0.3.0", false)]
    #[case("^0.0.3", "0.0.3", true)]
    #[case("^0.0.3", "0.0.4", false)]
    #[case("^0.14", "0.14.5", true)]
    #[case("^0.14", "0.15.0", false)]
    #[case("^0.0", "0.0.5", true)]
    #[case("^0.0", "0.1.0", false)]
    #[case("^0.0.x", "0.0.9", true)]
    fn caret(#[case] spec: &str, #[case] version: &str, #[case] expected: bool) {
        assert_eq!(satisfies(spec, version), expected);
    }

    #[rstest]
    #[case("~1.2.3", "1.2.9", true)]
    #[case("~1.2.3", "1.3.0", false)]
    #[case("~1.2.3", "1.2.2", false)]
    #[case("~1", "1.9.0", true)]
    #[case("~1", "2.0.0", false)]
    fn tilde(#[case] spec: &str, #[case] version: &str, #[case] expected: bool) {
        assert_eq!(satisfies(spec, version), expected);
    }

    #[rstest]
    #[case(">=1.0.0", "1.0.0", true)]
    #[case(">= 1.0.0", "1.0.0", true)]
    #[case(">1.0.0", "1.0.0", false)]
    #[case(">1", "1.9.9", false)]
    #[case(">1", "2.0.0", true)]
    #[case("<=1.2", "1.2.9", true)]
    #[case("<=1.2", "1.3.0", false)]
    #[case("<1.0.0", "0.9.9", true)]
    #[case(">=1.0.0 <2.0.0", "1.5.0", true)]
    #[case(">=1.0.0 <2.0.0", "2.0.0", false)]
    fn comparators(#[case] spec: &str, #[case] version: &str, #[case] expected: bool) {
        assert_eq!(satisfies(spec, version), expected);
    }

    #[rstest]
    #[case("*", "3.1.4", true)]
    #[case("", "3.1.4", true)]
    #[case("1.x", "1.9.9", true)]
    #[case("1.x", "2.0.0", false)]
    #[case("1", "1.4.0", true)]
    #[case("1.2", "1.2.7", true)]
    #[case("1.2", "1.3.0", false)]
    #[case("1.2.X", "1.2.5", true)]
    fn wildcards(#[case] spec: &str, #[case] version: &str, #[case] expected: bool) {
        assert_eq!(satisfies(spec, version), expected);
    }

    #[rstest]
    #[case("1.0.0 - 2.0.0", "2.0.0", true)]
    #[case("1.0.0 - 2.0.0", "2.0.1", false)]
    #[case("1.0.0 - 2", "2.9.0", true)]
    #[case("^1.0.0 || ^2.0.0", "2.5.0", true)]
    #[case("^1.0.0 || ^2.0.0", "3.0.0", false)]
    fn hyphen_and_or(#[case] spec: &str, #[case] version: &str, #[case] expected: bool) {
        assert_eq!(satisfies(spec, version), expected);
    }

    #[rstest]
    #[case("^1.0.0", "1.1.0-alpha.1", false)]
    #[case("*", "2.0.0-next.3", false)]
    #[case("^1.1.0-alpha.0", "1.1.0-alpha.1", true)]
    #[case("^1.1.0-alpha.0", "1.2.0-alpha.1", false)]
    #[case("1.0.0-beta.2", "1.0.0-beta.2", true)]
    fn prerelease_admission(#[case] spec: &str, #[case] version: &str, #[case] expected: bool) {
        assert_eq!(satisfies(spec, version), expected);
    }

    #[rstest]
    #[case("latest")]
    #[case("github:facebook/react")]
    #[case("file:../local")]
    #[case("1.2.3.4")]
    #[case(">18446744073709551615")]
    #[case("<=1.18446744073709551615")]
    fn rejects_non_ranges(#[case] spec: &str) {
        assert!(NpmRange::parse(spec).is_none());
    }
}
