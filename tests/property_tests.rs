//! Property-based tests for neurodata-db
//!
//! - Test ordering and monotonicity invariants
//! - Test set semantics of epoch tags
//! - Run with ProptestConfig::with_cases(100)
//! - Must complete in <30 seconds for pre-commit hook

use std::collections::BTreeSet;

use chrono::{Duration, TimeZone, Utc};
use neurodata_db::container::{create_identifier, Container, ModificationLog, FORMAT_VERSION};
use neurodata_db::entity::Placement;
use neurodata_db::epoch::EpochRegistry;
use neurodata_db::metadata::keys;
use neurodata_db::store::{join_path, split_path};
use proptest::prelude::*;
use tempfile::TempDir;

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

/// Path segment: non-empty, no separator, never "." or ".."
fn arb_segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,11}"
}

/// Finite, ordered epoch bounds
fn arb_bounds() -> impl Strategy<Value = (f64, f64)> {
    (-1.0e6f64..1.0e6, 1.0e-3f64..1.0e4).prop_map(|(start, len)| (start, start + len))
}

/// Per-epoch tag sets drawn from a small vocabulary so they overlap
fn arb_tag_sets() -> impl Strategy<Value = Vec<BTreeSet<String>>> {
    proptest::collection::vec(
        proptest::collection::btree_set("[a-e]", 0..5),
        1..8,
    )
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Identifiers are deterministic and carry the format version
    #[test]
    fn prop_identifier_deterministic(description in ".{0,40}") {
        let id = create_identifier(&description);
        prop_assert_eq!(&id, &create_identifier(&description));
        prop_assert!(id.starts_with(FORMAT_VERSION));
        let slug = &id[FORMAT_VERSION.len() + 2..];
        prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
    }

    /// Any finite start < stop is accepted, the reversed interval never is
    #[test]
    fn prop_epoch_bounds((start, stop) in arb_bounds()) {
        let mut registry = EpochRegistry::new();
        prop_assert!(registry.create_epoch("reversed", stop, start).is_err());
        prop_assert!(registry.create_epoch("empty", start, start).is_err());
        prop_assert!(registry.create_epoch("ok", start, stop).is_ok());
    }

    /// Aggregate tags are exactly the union of the per-epoch sets
    #[test]
    fn prop_aggregate_is_union(tag_sets in arb_tag_sets()) {
        let mut registry = EpochRegistry::new();
        let mut union = BTreeSet::new();
        for (i, tags) in tag_sets.iter().enumerate() {
            let start = f64::from(u32::try_from(i).unwrap());
            let id = registry.create_epoch(&format!("epoch-{i}"), start, start + 1.0).unwrap();
            for tag in tags {
                // adding twice is a no-op
                registry.add_tag(id, tag).unwrap();
                registry.add_tag(id, tag).unwrap();
                union.insert(tag.clone());
            }
            prop_assert_eq!(registry.get(id).unwrap().tags(), tags);
        }
        prop_assert_eq!(registry.aggregate_tags(), union);
    }

    /// The modification log never decreases, whatever the clock does
    #[test]
    fn prop_log_monotonic(offsets in proptest::collection::vec(-3600i64..3600, 1..20)) {
        let base = Utc.with_ymd_and_hms(2015, 7, 4, 3, 14, 16).unwrap();
        let mut log = ModificationLog::new();
        for offset in &offsets {
            log.append(base + Duration::seconds(*offset));
        }
        prop_assert_eq!(log.len(), offsets.len());
        prop_assert!(log.entries().windows(2).all(|w| w[0] <= w[1]));
    }

    /// Annotations are stored in time order and stay paired with their text
    #[test]
    fn prop_annotations_sorted(times in proptest::collection::vec(0.0f64..1.0e4, 1..30)) {
        let dir = TempDir::new().unwrap();
        let mut container = Container::builder(dir.path().join("p.nwb.json"))
            .description("annotation ordering")
            .create()
            .unwrap();
        let id = container
            .create_timeseries("AnnotationSeries", "annot", Placement::Acquisition)
            .unwrap();
        for time in &times {
            container.add_annotation(id, &format!("{time}"), *time).unwrap();
        }
        container.finalize(id).unwrap();

        let stored = container
            .store()
            .read_path("acquisition/timeseries/annot/timestamps")
            .unwrap()
            .into_value()
            .unwrap()
            .to_floats()
            .unwrap();
        let texts = container
            .store()
            .read_path("acquisition/timeseries/annot/data")
            .unwrap()
            .into_value()
            .unwrap();
        prop_assert!(stored.windows(2).all(|w| w[0] <= w[1]));
        prop_assert_eq!(stored.len(), times.len());
        for (text, time) in texts.as_text_list().unwrap().iter().zip(&stored) {
            prop_assert_eq!(text, &format!("{time}"));
        }
        container.close().unwrap();
    }

    /// Distinct parameters never collide; the field name is shared
    #[test]
    fn prop_metadata_params_distinct(a in arb_segment(), b in arb_segment()) {
        prop_assume!(a != b);
        let (node_a, field_a) = keys::extra_shank_location(&a).resolve().unwrap();
        let (node_b, field_b) = keys::extra_shank_location(&b).resolve().unwrap();
        prop_assert_ne!(node_a, node_b);
        prop_assert_eq!(field_a, field_b);
    }

    /// Joining valid segments and splitting again is lossless
    #[test]
    fn prop_path_join_split(segments in proptest::collection::vec(arb_segment(), 1..6)) {
        let path = segments.iter().fold(String::new(), |acc, s| join_path(&acc, s));
        let split: Vec<String> = split_path(&path).unwrap().into_iter().map(String::from).collect();
        prop_assert_eq!(split, segments);
    }
}

