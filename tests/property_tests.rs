/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs
use proptest::prelude::*;
use recruiter_client::config::validate_api_url;
use recruiter_client::leads::{validate_query_text, MAX_QUERY_CHARS};
use recruiter_client::models::{validate_period, ExportFormat, Lead, LeadFilter, QueryStatus};
use recruiter_client::session_store::ValidatedEntry;

fn lead_with_score(score: f64) -> Lead {
    serde_json::from_value(serde_json::json!({
        "company": "Acme",
        "score": score,
        "confidence": 0.5
    }))
    .unwrap()
}

// Property: Query text validation should never panic
proptest! {
    #[test]
    fn query_validation_never_panics(text in "\\PC*") {
        let _ = validate_query_text(&text);
    }

    #[test]
    fn whitespace_only_queries_rejected(text in "[ \\t\\n\\r]{0,40}") {
        prop_assert!(validate_query_text(&text).is_err());
    }

    #[test]
    fn accepted_queries_are_trimmed_and_bounded(text in "\\PC{0,600}") {
        if let Ok(accepted) = validate_query_text(&text) {
            prop_assert_eq!(accepted, accepted.trim());
            prop_assert!(!accepted.is_empty());
            prop_assert!(accepted.chars().count() <= MAX_QUERY_CHARS);
        }
    }
}

// Property: Status decoding never fails on unknown values
proptest! {
    #[test]
    fn any_status_string_decodes(raw in "[a-z_]{0,20}") {
        let status: QueryStatus = serde_json::from_value(serde_json::Value::String(raw.clone())).unwrap();
        if !matches!(raw.as_str(), "pending" | "processing" | "completed" | "failed") {
            prop_assert_eq!(status, QueryStatus::Unknown);
            prop_assert!(!status.is_terminal());
        }
    }
}

// Property: Usage periods
proptest! {
    #[test]
    fn period_validation_never_panics(period in "\\PC*") {
        let _ = validate_period(&period);
    }

    #[test]
    fn day_periods_roundtrip(days in 1u32..=3650) {
        prop_assert_eq!(validate_period(&format!("{}d", days)), Some(days));
    }
}

// Property: Display clamps
proptest! {
    #[test]
    fn display_score_always_in_range(score in proptest::num::f64::ANY) {
        let shown = lead_with_score(if score.is_finite() { score } else { 0.0 }).display_score();
        prop_assert!((0.0..=100.0).contains(&shown));
    }

    #[test]
    fn min_score_filter_matches_displayed_score(score in -50.0f64..150.0, floor in 0.0f64..100.0) {
        let lead = lead_with_score(score);
        let filter = LeadFilter { min_score: Some(floor), ..LeadFilter::default() };
        prop_assert_eq!(filter.accepts(&lead), lead.display_score() >= floor);
    }
}

// Property: Persisted session entries detect tampering
proptest! {
    #[test]
    fn untouched_entries_validate(data in "\\PC{0,200}") {
        let serialized = ValidatedEntry::new(data.clone()).serialize().unwrap();
        prop_assert_eq!(ValidatedEntry::deserialize_and_validate(&serialized), Some(data));
    }

    #[test]
    fn tampered_entries_rejected(data in "[a-z]{1,50}", replacement in "[A-Z]{1,50}") {
        let mut entry = ValidatedEntry::new(data);
        entry.data = replacement;
        let serialized = serde_json::to_string(&entry).unwrap();
        prop_assert_eq!(ValidatedEntry::deserialize_and_validate(&serialized), None);
    }

    #[test]
    fn garbage_never_validates(raw in "\\PC*") {
        let _ = ValidatedEntry::deserialize_and_validate(&raw);
    }
}

// Property: Config inputs
proptest! {
    #[test]
    fn api_url_validation_never_panics(raw in "\\PC*") {
        let _ = validate_api_url(raw);
    }

    #[test]
    fn accepted_api_urls_have_no_trailing_slash(host in "[a-z]{1,12}", slashes in 0usize..4) {
        let raw = format!("https://{}.example{}", host, "/".repeat(slashes));
        let url = validate_api_url(raw).unwrap();
        prop_assert!(!url.ends_with('/'));
    }

    #[test]
    fn export_format_parse_is_case_insensitive(upper in proptest::bool::ANY, json in proptest::bool::ANY) {
        let name = if json { "json" } else { "csv" };
        let raw = if upper { name.to_uppercase() } else { name.to_string() };
        let format: ExportFormat = raw.parse().unwrap();
        prop_assert_eq!(format.as_str(), name);
    }
}
