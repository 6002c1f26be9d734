//! Semantic version parsing, ordering and range matching for profile versions.
//!
//! Pre-release tags are compared as opaque strings, so `alpha.10` sorts before
//! `alpha.2`. Downstream cache keys depend on this ordering.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

static SEMVER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(\d+)\.(\d+)(?:-([0-9A-Za-z.\-]+))?(?:\+([0-9A-Za-z.\-]+))?$")
        .expect("semver pattern is valid")
});

/// A parsed `major.minor.patch[-prerelease][+build]` version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
    pub build: Option<String>,
    /// The string this version was parsed from.
    pub raw: String,
}

impl SemanticVersion {
    pub fn parse(input: &str) -> Option<Self> {
        let captures = SEMVER_PATTERN.captures(input)?;
        Some(Self {
            major: captures[1].parse().ok()?,
            minor: captures[2].parse().ok()?,
            patch: captures[3].parse().ok()?,
            prerelease: captures.get(4).map(|m| m.as_str().to_string()),
            build: captures.get(5).map(|m| m.as_str().to_string()),
            raw: input.to_string(),
        })
    }

    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(prerelease) = &self.prerelease {
            write!(f, "-{prerelease}")?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

impl PartialEq for SemanticVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemanticVersion {}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

/// Parse a version string. Anything that is not full `major.minor.patch` yields `None`.
pub fn parse_version(input: &str) -> Option<SemanticVersion> {
    SemanticVersion::parse(input)
}

/// Compare two parsed versions. Build metadata never participates.
pub fn compare_versions(a: &SemanticVersion, b: &SemanticVersion) -> Ordering {
    a.cmp(b)
}

/// Sort version strings newest first, silently dropping unparsable entries.
pub fn sort_versions_descending<S: AsRef<str>>(versions: &[S]) -> Vec<String> {
    let mut parsed: Vec<SemanticVersion> = versions
        .iter()
        .filter_map(|v| parse_version(v.as_ref()))
        .collect();
    parsed.sort_by(|a, b| compare_versions(b, a));
    parsed.into_iter().map(|v| v.raw).collect()
}

/// Newest version of the set.
///
/// Without `include_prerelease`, pre-releases are ignored unless they are all
/// there is, in which case every version is considered.
pub fn get_latest_version<S: AsRef<str>>(versions: &[S], include_prerelease: bool) -> Option<String> {
    let parsed: Vec<SemanticVersion> = versions
        .iter()
        .filter_map(|v| parse_version(v.as_ref()))
        .collect();

    let stable: Vec<&SemanticVersion> = parsed.iter().filter(|v| !v.is_prerelease()).collect();
    let pool: Vec<&SemanticVersion> = if include_prerelease || stable.is_empty() {
        parsed.iter().collect()
    } else {
        stable
    };

    pool.into_iter().max().map(|v| v.raw.clone())
}

/// Whether `version` falls inside `range`.
///
/// Supported forms: `latest`, `*`, exact, `^x.y.z`, `~x.y.z`, `>`, `>=`, `<`,
/// `<=`, `=`, and wildcards such as `1.2.*`.
pub fn satisfies_range(version: &str, range: &str) -> bool {
    let range = range.trim();
    if range.is_empty() || range == "latest" || range == "*" {
        return true;
    }

    let Some(candidate) = parse_version(version) else {
        return version == range;
    };

    if let Some(base) = range.strip_prefix('^') {
        return parse_version(base.trim())
            .is_some_and(|base| candidate.major == base.major && candidate >= base);
    }

    if let Some(base) = range.strip_prefix('~') {
        return parse_version(base.trim()).is_some_and(|base| {
            candidate.major == base.major && candidate.minor == base.minor && candidate >= base
        });
    }

    if let Some((operator, bound)) = split_comparator(range) {
        return parse_version(bound.trim()).is_some_and(|bound| {
            let ordering = compare_versions(&candidate, &bound);
            match operator {
                ">=" => ordering != Ordering::Less,
                "<=" => ordering != Ordering::Greater,
                ">" => ordering == Ordering::Greater,
                "<" => ordering == Ordering::Less,
                _ => ordering == Ordering::Equal,
            }
        });
    }

    if range.contains('*') || range.split('.').any(|s| s.eq_ignore_ascii_case("x")) {
        return matches_wildcard(&candidate, range);
    }

    parse_version(range).is_some_and(|exact| candidate == exact)
}

fn split_comparator(range: &str) -> Option<(&'static str, &str)> {
    // Two-character operators must be tried first.
    [">=", "<=", ">", "<", "="]
        .into_iter()
        .find_map(|operator| range.strip_prefix(operator).map(|rest| (operator, rest)))
}

fn matches_wildcard(candidate: &SemanticVersion, range: &str) -> bool {
    let parts = [candidate.major, candidate.minor, candidate.patch];
    for (index, segment) in range.split('.').enumerate() {
        if segment == "*" || segment.eq_ignore_ascii_case("x") {
            return true;
        }
        let Some(actual) = parts.get(index) else {
            return true;
        };
        match segment.parse::<u64>() {
            Ok(expected) if expected == *actual => continue,
            _ => return false,
        }
    }
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    Exact,
    Range,
    Latest,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionResolution {
    pub version: String,
    /// Candidates that satisfied the request, newest first.
    pub matches: Vec<String>,
    pub strategy: ResolutionStrategy,
    pub exact_match: bool,
}

/// Pick the best version from `available` for the requested specifier.
pub fn resolve_version<S: AsRef<str>>(
    requested: Option<&str>,
    available: &[S],
    prefer_stable: bool,
) -> VersionResolution {
    let requested = requested.map(str::trim).filter(|r| !r.is_empty());

    if available.is_empty() {
        return VersionResolution {
            version: requested.unwrap_or("latest").to_string(),
            matches: Vec::new(),
            strategy: ResolutionStrategy::Fallback,
            exact_match: false,
        };
    }

    let latest_of = |pool: &[String]| {
        get_latest_version(pool, !prefer_stable).or_else(|| pool.first().cloned())
    };
    let all: Vec<String> = available.iter().map(|v| v.as_ref().to_string()).collect();

    let requested = match requested {
        None | Some("latest") | Some("*") => {
            return VersionResolution {
                version: latest_of(all.as_slice()).unwrap_or_default(),
                matches: sort_versions_descending(&all),
                strategy: ResolutionStrategy::Latest,
                exact_match: false,
            };
        }
        Some(requested) => requested,
    };

    if all.iter().any(|v| v == requested) {
        return VersionResolution {
            version: requested.to_string(),
            matches: vec![requested.to_string()],
            strategy: ResolutionStrategy::Exact,
            exact_match: true,
        };
    }

    let matches: Vec<String> = all
        .iter()
        .filter(|v| satisfies_range(v, requested))
        .cloned()
        .collect();

    if matches.is_empty() {
        return VersionResolution {
            version: latest_of(all.as_slice()).unwrap_or_default(),
            matches: Vec::new(),
            strategy: ResolutionStrategy::Fallback,
            exact_match: false,
        };
    }

    VersionResolution {
        version: latest_of(matches.as_slice()).unwrap_or_default(),
        matches: sort_versions_descending(&matches),
        strategy: ResolutionStrategy::Range,
        exact_match: false,
    }
}

/// Whether a specifier names a single concrete version rather than a range.
pub fn is_concrete_version(spec: &str) -> bool {
    parse_version(spec.trim()).is_some()
}
