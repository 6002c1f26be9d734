use octofhir_profile_resolver::{
    ResolutionStrategy, compare_versions, get_latest_version, parse_version, resolve_version,
    satisfies_range,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::cmp::Ordering;

fn version_string() -> impl Strategy<Value = String> {
    (
        0u64..50,
        0u64..50,
        0u64..50,
        proptest::option::of("(alpha|beta|rc)(\\.[0-9]{1,2})?"),
    )
        .prop_map(|(major, minor, patch, prerelease)| match prerelease {
            Some(tag) => format!("{major}.{minor}.{patch}-{tag}"),
            None => format!("{major}.{minor}.{patch}"),
        })
}

proptest! {
    #[test]
    fn parsed_versions_keep_their_raw_text(raw in version_string()) {
        let parsed = parse_version(&raw).unwrap();
        prop_assert_eq!(&parsed.raw, &raw);
        prop_assert_eq!(parsed.to_string(), raw);
    }

    #[test]
    fn comparison_is_antisymmetric(a in version_string(), b in version_string()) {
        let (a, b) = (parse_version(&a).unwrap(), parse_version(&b).unwrap());
        prop_assert_eq!(compare_versions(&a, &b), compare_versions(&b, &a).reverse());
        prop_assert_eq!(compare_versions(&a, &a), Ordering::Equal);
    }

    #[test]
    fn comparison_is_transitive(a in version_string(), b in version_string(), c in version_string()) {
        let mut sorted = [
            parse_version(&a).unwrap(),
            parse_version(&b).unwrap(),
            parse_version(&c).unwrap(),
        ];
        sorted.sort_by(compare_versions);
        let [low, mid, high] = &sorted;
        prop_assert_ne!(compare_versions(low, mid), Ordering::Greater);
        prop_assert_ne!(compare_versions(mid, high), Ordering::Greater);
        prop_assert_ne!(compare_versions(low, high), Ordering::Greater);
        if compare_versions(low, mid) == Ordering::Less || compare_versions(mid, high) == Ordering::Less {
            prop_assert_eq!(compare_versions(low, high), Ordering::Less);
        }
    }

    #[test]
    fn build_metadata_never_affects_order(raw in version_string(), build in "[a-z0-9]{1,8}") {
        let plain = parse_version(&raw).unwrap();
        let with_build = parse_version(&format!("{raw}+{build}")).unwrap();
        prop_assert_eq!(compare_versions(&plain, &with_build), Ordering::Equal);
    }

    #[test]
    fn caret_range_stays_within_major(raw in version_string(), base in version_string()) {
        let (version, floor) = (parse_version(&raw).unwrap(), parse_version(&base).unwrap());
        if satisfies_range(&raw, &format!("^{base}")) {
            prop_assert_eq!(version.major, floor.major);
            prop_assert!(version >= floor);
        }
    }

    #[test]
    fn resolved_version_comes_from_the_pool(pool in proptest::collection::vec(version_string(), 1..12)) {
        let resolution = resolve_version(None, &pool, true);
        prop_assert_eq!(resolution.strategy, ResolutionStrategy::Latest);
        prop_assert!(pool.contains(&resolution.version));
    }
}

#[test]
fn test_range_examples() {
    assert!(satisfies_range("1.5.0", "^1.2.0"));
    assert!(!satisfies_range("2.0.0", "^1.2.0"));
    assert!(satisfies_range("1.2.9", "~1.2.0"));
    assert!(!satisfies_range("1.3.0", "~1.2.0"));
    assert!(satisfies_range("4.0.1", "4.0.x"));
    assert!(satisfies_range("3.1.0", ">=3.0.0"));
    assert!(satisfies_range("anything", "latest"));
}

#[test]
fn test_prerelease_sorts_below_release() {
    let beta = parse_version("2.0.0-beta").unwrap();
    let release = parse_version("2.0.0").unwrap();
    assert_eq!(compare_versions(&beta, &release), Ordering::Less);
}

#[test]
fn test_latest_prefers_stable() {
    let versions = ["1.0.0", "2.0.0-beta", "1.5.0"];
    assert_eq!(resolve_version(None, &versions, true).version, "1.5.0");
    assert_eq!(get_latest_version(&versions, true).as_deref(), Some("2.0.0-beta"));
    assert_eq!(get_latest_version(&["3.0.0-rc.1"], false).as_deref(), Some("3.0.0-rc.1"));
}

#[test]
fn test_unmatched_range_falls_back_to_latest() {
    let resolution = resolve_version(Some("^9.0.0"), &["1.0.0", "1.1.0"], true);
    assert_eq!(resolution.strategy, ResolutionStrategy::Fallback);
    assert_eq!(resolution.version, "1.1.0");
    assert!(resolution.matches.is_empty());
}
