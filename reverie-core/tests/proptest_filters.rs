//! Property-based tests for the vector index.
//!
//! Uses `proptest` to verify the filter-pushdown invariants under random
//! entry populations: AND-composed exact matches never leak other values,
//! turn ranges are inclusive, and dimension validation never partially
//! writes.

use proptest::prelude::*;

use reverie_core::index::{DimensionPolicy, SearchFilters, VectorIndex};
use reverie_core::types::{
    Embedding, MemoryCategory, MemoryEntry, MemoryMetadata, MemoryRole,
};

const DIMS: usize = 8;

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_category() -> impl Strategy<Value = MemoryCategory> {
    prop_oneof![
        Just(MemoryCategory::Narration),
        Just(MemoryCategory::Event),
        Just(MemoryCategory::Description),
        Just(MemoryCategory::Concept),
    ]
}

fn arb_entry() -> impl Strategy<Value = MemoryEntry> {
    (
        arb_category(),
        any::<bool>(),
        prop::option::of("[A-Za-z]{1,12}"),
        1..50u64,
        prop::collection::vec(-1.0..1.0f32, DIMS),
    )
        .prop_map(|(category, important, npc, turn, vector)| {
            let mut metadata = MemoryMetadata::with_category(category);
            metadata.important_fact = important;
            metadata.npc = npc;
            MemoryEntry::new(
                MemoryRole::Narrator,
                format!("entry at turn {turn}"),
                turn,
                metadata,
                Embedding(vector),
            )
        })
}

fn populated_index(entries: &[MemoryEntry]) -> VectorIndex {
    let index = VectorIndex::open_in_memory("prop", DimensionPolicy::Discard).expect("open");
    for entry in entries {
        index.append(entry).expect("append");
    }
    index
}

// ---------------------------------------------------------------------------
// Property: category filter never leaks another category
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn category_filter_never_leaks(
        entries in prop::collection::vec(arb_entry(), 1..20),
        wanted in arb_category(),
    ) {
        let index = populated_index(&entries);
        let results = index
            .search(
                &Embedding(vec![0.3; DIMS]),
                entries.len(),
                &SearchFilters::none().with_category(wanted),
            )
            .expect("search");

        for result in &results {
            prop_assert_eq!(result.entry.metadata.category, wanted);
        }
        let expected = entries.iter().filter(|e| e.metadata.category == wanted).count();
        prop_assert_eq!(results.len(), expected);
    }
}

// ---------------------------------------------------------------------------
// Property: turn range is inclusive and complete
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn turn_range_inclusive_and_complete(
        entries in prop::collection::vec(arb_entry(), 1..20),
        bounds in (1..50u64, 1..50u64),
    ) {
        let (a, b) = bounds;
        let (min, max) = (a.min(b), a.max(b));

        let index = populated_index(&entries);
        let results = index
            .search(
                &Embedding(vec![0.3; DIMS]),
                entries.len(),
                &SearchFilters::none().with_turn_range(Some(min), Some(max)),
            )
            .expect("search");

        for result in &results {
            prop_assert!(result.entry.turn >= min && result.entry.turn <= max);
        }
        let expected = entries.iter().filter(|e| e.turn >= min && e.turn <= max).count();
        prop_assert_eq!(results.len(), expected);
    }
}

// ---------------------------------------------------------------------------
// Property: AND composition equals intersection of single filters
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn and_composition_is_intersection(
        entries in prop::collection::vec(arb_entry(), 1..20),
        wanted in arb_category(),
        important in any::<bool>(),
    ) {
        let index = populated_index(&entries);
        let combined = SearchFilters::none()
            .with_category(wanted)
            .with_important_fact(important);
        let results = index
            .search(&Embedding(vec![0.3; DIMS]), entries.len(), &combined)
            .expect("search");

        let expected = entries
            .iter()
            .filter(|e| e.metadata.category == wanted && e.metadata.important_fact == important)
            .count();
        prop_assert_eq!(results.len(), expected);
    }
}

// ---------------------------------------------------------------------------
// Property: mismatched dimensions never change the row count
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn mismatched_dimensions_never_persist(
        entries in prop::collection::vec(arb_entry(), 1..10),
        bad_dims in (1..20usize).prop_filter("must differ from D", |d| *d != DIMS),
    ) {
        let index = populated_index(&entries);
        let before = index.len().expect("len");

        let bad = MemoryEntry::new(
            MemoryRole::System,
            "malformed",
            1,
            MemoryMetadata::narration(),
            Embedding(vec![0.1; bad_dims]),
        );
        let outcome = index.append(&bad).expect("append");

        prop_assert!(!outcome.is_stored());
        prop_assert_eq!(index.len().expect("len"), before);
    }
}

// ---------------------------------------------------------------------------
// Property: search results are sorted nearest-first
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn results_sorted_by_ascending_distance(
        entries in prop::collection::vec(arb_entry(), 2..20),
        query in prop::collection::vec(-1.0..1.0f32, DIMS),
    ) {
        let index = populated_index(&entries);
        let results = index
            .search(&Embedding(query), entries.len(), &SearchFilters::none())
            .expect("search");

        for window in results.windows(2) {
            prop_assert!(window[0].distance <= window[1].distance + 1e-6);
        }
    }
}
