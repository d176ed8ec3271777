//! Property-Based Tests for the GitLab client
//!
//! - **Cursor resolution**: whatever the header, `next_page` never panics and
//!   only ever returns the URL of a well-formed `rel="next"` entry
//! - **Base URL normalization**: normalizing twice equals normalizing once

use proptest::prelude::*;

use super::endpoint::normalize_base_url;
use super::pagination::next_page;

fn arb_rel() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("prev".to_string()),
        Just("next".to_string()),
        Just("first".to_string()),
        Just("last".to_string()),
    ]
}

fn arb_url() -> impl Strategy<Value = String> {
    "https://git\\.example\\.com/api/v4/groups\\?page=[0-9]{1,3}"
}

proptest! {
    #[test]
    fn prop_next_page_never_panics(header in ".*") {
        let _ = next_page(&header);
    }

    #[test]
    fn prop_next_page_finds_first_next(
        entries in prop::collection::vec((arb_url(), arb_rel()), 0..6)
    ) {
        let header = entries
            .iter()
            .map(|(url, rel)| format!("<{}>; rel=\"{}\"", url, rel))
            .collect::<Vec<_>>()
            .join(", ");

        let expected = entries
            .iter()
            .find(|(_, rel)| rel == "next")
            .map(|(url, _)| url.clone())
            .unwrap_or_default();

        prop_assert_eq!(next_page(&header), expected);
    }

    #[test]
    fn prop_normalize_idempotent(
        host in "[a-z]{1,10}\\.example\\.com",
        suffix in prop_oneof![Just(""), Just("/"), Just("/api/v4"), Just("/api/v4/"), Just("//")]
    ) {
        let once = normalize_base_url(&format!("https://{}{}", host, suffix));
        prop_assert_eq!(normalize_base_url(&once), once.clone());
        prop_assert_eq!(once, format!("https://{}/api/v4", host));
    }
}
