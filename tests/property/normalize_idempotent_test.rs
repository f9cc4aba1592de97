//! Property-based tests for the default URL preprocessor.
//!
//! Normalizing an already normalized URL must not change it, and the result
//! never carries a query string or fragment.

use mark_as_read::services::url_preprocessor::{UrlPreprocessor, UrlPreprocessorTrait, UrlTransform};
use proptest::prelude::*;

fn arb_url() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just("http"), Just("https")],
        "[a-z]{1,8}\\.(test|example|org)",
        prop::collection::vec("[a-zA-Z0-9_-]{1,6}", 0..4),
        prop::option::of("[a-z]{1,4}=[a-z0-9]{0,4}(&[a-z]{1,4}=[a-z0-9]{0,4}){0,2}"),
        prop::option::of("[a-zA-Z0-9-]{0,8}"),
    )
        .prop_map(|(scheme, host, segments, query, fragment)| {
            let mut url = format!("{}://{}/{}", scheme, host, segments.join("/"));
            if let Some(query) = query {
                url.push('?');
                url.push_str(&query);
            }
            if let Some(fragment) = fragment {
                url.push('#');
                url.push_str(&fragment);
            }
            url
        })
}

fn transform() -> UrlTransform {
    UrlPreprocessor::default()
        .default_transform()
        .expect("default preprocessor compiles")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_default_transform_is_idempotent(url in arb_url()) {
        let transform = transform();
        let once = transform.apply(&url).unwrap();
        let twice = transform.apply(&once).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_default_transform_drops_query_and_fragment(url in arb_url()) {
        let normalized = transform().apply(&url).unwrap();
        prop_assert!(!normalized.contains('?'), "{}", normalized);
        prop_assert!(!normalized.contains('#'), "{}", normalized);
        prop_assert!(url.starts_with(&normalized), "{} -> {}", url, normalized);
    }

    /// Strings that are not URLs pass through untouched.
    #[test]
    fn prop_non_urls_pass_through(text in "[a-z ]{0,20}") {
        let normalized = transform().apply(&text).unwrap();
        prop_assert_eq!(normalized, text);
    }
}
