use url::Url;

/// Split `url|version` into its parts.
pub fn split_canonical(input: &str) -> (String, Option<String>) {
    let input = input.trim();
    match input.split_once('|') {
        Some((url, version)) if !version.trim().is_empty() => {
            (url.trim().to_string(), Some(version.trim().to_string()))
        }
        Some((url, _)) => (url.trim().to_string(), None),
        None => (input.to_string(), None),
    }
}

/// Normalize a canonical URL for use as a lookup key.
///
/// Drops any `|version` suffix, fragment and trailing slash, and lowercases
/// scheme and host. Path case is preserved.
pub fn normalize_canonical_url(input: &str) -> String {
    let (url, _) = split_canonical(input);
    let url = url.split('#').next().unwrap_or_default();

    let normalized = match Url::parse(url) {
        Ok(parsed) if parsed.has_host() => parsed.to_string(),
        _ => url.to_string(),
    };

    normalized.trim_end_matches('/').to_string()
}

/// Last path segment of a canonical URL, usually the profile's id or name.
pub fn canonical_name(url: &str) -> Option<String> {
    let normalized = normalize_canonical_url(url);
    normalized
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
        .map(str::to_string)
}
