//! The spatially filtered stream of one dataset's item deltas.

use std::cell::RefCell;
use std::vec;

use lode_diff::Delta;
use lode_types::ItemKey;

use crate::conflicts::SpatialFilterConflicts;
use crate::error::SdkResult;
use crate::fetcher::DeltaFetcher;
use crate::kinds::{matches_delta_value, FilterPair};

/// How far the pass decision for one delta has got.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MatchState {
    Undecided,
    Passed,
    /// Conflicts are being recorded, so both sides are tested regardless.
    NeedsBothForStats,
}

impl MatchState {
    fn initial(recording: bool, delta: &Delta) -> Self {
        if recording {
            MatchState::NeedsBothForStats
        } else if delta.is_working_copy_edit() {
            MatchState::Passed
        } else {
            MatchState::Undecided
        }
    }

    fn should_evaluate(self) -> bool {
        self != MatchState::Passed
    }

    fn after_match(self) -> Self {
        match self {
            MatchState::NeedsBothForStats => MatchState::NeedsBothForStats,
            _ => MatchState::Passed,
        }
    }
}

/// Result of testing one delta against a filter pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FilterOutcome {
    pub passed: bool,
    /// `Some` only when both sides were tested.
    pub matches: Option<(bool, bool)>,
}

/// Test `delta` against `filters`, evaluating each side at most once and
/// stopping as soon as the outcome is known unless `recording`.
pub(crate) fn evaluate(filters: &FilterPair, delta: &Delta, recording: bool) -> SdkResult<FilterOutcome> {
    let (old_filter, new_filter) = filters;
    let mut state = MatchState::initial(recording, delta);
    let mut passed = delta.is_working_copy_edit();

    let old_match = if state.should_evaluate() {
        let matched = matches_delta_value(old_filter, delta.old())?;
        if matched {
            state = state.after_match();
            passed = true;
        }
        Some(matched)
    } else {
        None
    };
    let new_match = if state.should_evaluate() {
        let matched = matches_delta_value(new_filter, delta.new_value())?;
        passed |= matched;
        Some(matched)
    } else {
        None
    };

    Ok(FilterOutcome {
        passed,
        matches: old_match.zip(new_match),
    })
}

enum Phase {
    Streaming,
    Draining(vec::IntoIter<(ItemKey, Delta)>),
    Done,
}

/// Lazily yields the deltas of one dataset that pass the spatial filter and
/// are ready to output.
///
/// Deltas whose blobs must be fetched first are yielded after all the
/// others, in the order they were met. The first error ends the stream.
pub struct FilteredDeltas<'w> {
    ds_path: String,
    item_type: &'static str,
    items: vec::IntoIter<(ItemKey, Delta)>,
    filters: Option<FilterPair>,
    fetcher: DeltaFetcher,
    conflicts: Option<&'w RefCell<SpatialFilterConflicts>>,
    phase: Phase,
}

impl<'w> FilteredDeltas<'w> {
    /// `filters` of `None` passes every delta. When `conflicts` is given,
    /// every delta is tested against both filters and the outcome recorded.
    pub fn new(
        ds_path: impl Into<String>,
        item_type: &'static str,
        items: Vec<(ItemKey, Delta)>,
        filters: Option<FilterPair>,
        fetcher: DeltaFetcher,
        conflicts: Option<&'w RefCell<SpatialFilterConflicts>>,
    ) -> Self {
        let filters = filters.filter(|(old, new)| !(old.is_match_all() && new.is_match_all()));
        Self {
            ds_path: ds_path.into(),
            item_type,
            items: items.into_iter(),
            filters,
            fetcher,
            conflicts,
            phase: Phase::Streaming,
        }
    }

    /// The dataset these deltas belong to.
    pub fn ds_path(&self) -> &str {
        &self.ds_path
    }

    fn passes(&self, key: &ItemKey, delta: &Delta) -> SdkResult<bool> {
        let Some(filters) = &self.filters else {
            return Ok(true);
        };
        let outcome = evaluate(filters, delta, self.conflicts.is_some())?;
        if let (Some(conflicts), Some((old_matched, new_matched))) = (self.conflicts, outcome.matches) {
            conflicts.borrow_mut().record_stat(
                &self.ds_path,
                self.item_type,
                key,
                delta,
                old_matched,
                new_matched,
            );
        }
        Ok(outcome.passed)
    }

    fn next_streamed(&mut self) -> SdkResult<Option<(ItemKey, Delta)>> {
        while let Some((key, delta)) = self.items.next() {
            if !self.passes(&key, &delta)? {
                continue;
            }
            if self.fetcher.ensure_ready_or_start_fetch(&key, &delta)? {
                return Ok(Some((key, delta)));
            }
        }
        Ok(None)
    }
}

impl Iterator for FilteredDeltas<'_> {
    type Item = SdkResult<(ItemKey, Delta)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.phase {
                Phase::Streaming => match self.next_streamed() {
                    Ok(Some(pair)) => return Some(Ok(pair)),
                    Ok(None) => match self.fetcher.finish_fetching() {
                        Ok(fetched) => self.phase = Phase::Draining(fetched.into_iter()),
                        Err(e) => {
                            self.phase = Phase::Done;
                            return Some(Err(e));
                        }
                    },
                    Err(e) => {
                        self.phase = Phase::Done;
                        return Some(Err(e));
                    }
                },
                Phase::Draining(fetched) => match fetched.next() {
                    Some(pair) => return Some(Ok(pair)),
                    None => self.phase = Phase::Done,
                },
                Phase::Done => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{PromissoryFetcher, StrictFetcher};
    use crate::sink::MessageSink;
    use lode_diff::{DeltaFlags, DeltaValue};
    use lode_spatial::{ResolvedSpatialFilter, SpatialFilter};
    use lode_store::{FetchOptions, InMemoryObjectStore, ObjectSource, ObjectStore, StoreSource};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn feature(fid: i64, x: f64) -> Value {
        json!({"fid": fid, "geom": format!("POINT({x} {x})")})
    }

    fn inline(fid: i64, x: f64) -> DeltaValue {
        DeltaValue::inline(ItemKey::Int(fid), feature(fid, x))
    }

    /// A filter around the unit square, resolved for an untransformed table.
    fn unit_square() -> FilterPair {
        let filter = SpatialFilter::from_wkt("POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))", None).unwrap();
        let resolved = filter
            .transform_for_table_schema_and_crs(Some("geom"), None, "parcels")
            .unwrap();
        (resolved.clone(), resolved)
    }

    fn strict() -> DeltaFetcher {
        DeltaFetcher::Strict(StrictFetcher::new("parcels", "table"))
    }

    fn collect(stream: FilteredDeltas<'_>) -> Vec<ItemKey> {
        stream.map(|r| r.unwrap().0).collect()
    }

    #[test]
    fn match_all_filters_yield_everything_in_order() {
        let items = vec![
            (ItemKey::Int(1), Delta::insert(inline(1, 5.0))),
            (ItemKey::Int(2), Delta::delete(inline(2, 0.5))),
            (ItemKey::Int(3), Delta::update(inline(3, 9.0), inline(3, 8.0))),
        ];
        let expected: Vec<ItemKey> = items.iter().map(|(k, _)| k.clone()).collect();
        let pair = (ResolvedSpatialFilter::match_all(), ResolvedSpatialFilter::match_all());
        let stream = FilteredDeltas::new("parcels", "feature", items.clone(), Some(pair), strict(), None);
        assert_eq!(collect(stream), expected);

        let unfiltered = FilteredDeltas::new("parcels", "feature", items, None, strict(), None);
        assert_eq!(collect(unfiltered), expected);
    }

    #[test]
    fn either_side_inside_the_filter_passes() {
        let items = vec![
            (ItemKey::Int(1), Delta::insert(inline(1, 0.5))),
            (ItemKey::Int(2), Delta::insert(inline(2, 5.0))),
            (ItemKey::Int(3), Delta::update(inline(3, 0.5), inline(3, 5.0))),
            (ItemKey::Int(4), Delta::update(inline(4, 5.0), inline(4, 0.5))),
            (ItemKey::Int(5), Delta::delete(inline(5, 5.0))),
        ];
        let stream = FilteredDeltas::new("parcels", "feature", items, Some(unit_square()), strict(), None);
        assert_eq!(collect(stream), vec![ItemKey::Int(1), ItemKey::Int(3), ItemKey::Int(4)]);
    }

    #[test]
    fn working_copy_edits_bypass_the_filter() {
        let edit = Delta::update(inline(8, 5.0), inline(8, 6.0)).with_flags(DeltaFlags::WORKING_COPY_EDIT);
        let items = vec![(ItemKey::Int(8), edit)];
        let stream = FilteredDeltas::new("parcels", "feature", items, Some(unit_square()), strict(), None);
        assert_eq!(collect(stream), vec![ItemKey::Int(8)]);
    }

    #[test]
    fn recording_tests_both_sides_and_flags_conflicts() {
        // 42 existed outside the filter; the working copy moved it inside.
        let conflict = Delta::update(inline(42, 5.0), inline(42, 0.5)).with_flags(DeltaFlags::WORKING_COPY_EDIT);
        let inside = Delta::update(inline(1, 0.2), inline(1, 0.3)).with_flags(DeltaFlags::WORKING_COPY_EDIT);
        let items = vec![(ItemKey::Int(1), inside), (ItemKey::Int(42), conflict)];
        let conflicts = RefCell::new(SpatialFilterConflicts::new());

        let stream = FilteredDeltas::new(
            "parcels",
            "feature",
            items,
            Some(unit_square()),
            strict(),
            Some(&conflicts),
        );
        assert_eq!(collect(stream), vec![ItemKey::Int(1), ItemKey::Int(42)]);

        let conflicts = conflicts.into_inner();
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts.get("parcels", "feature").unwrap().contains(&ItemKey::Int(42)));
    }

    #[test]
    fn short_circuits_once_old_side_matches() {
        let pair = unit_square();
        let delta = Delta::update(inline(1, 0.5), inline(1, 5.0));
        assert_eq!(
            evaluate(&pair, &delta, false).unwrap(),
            FilterOutcome { passed: true, matches: None }
        );
        assert_eq!(
            evaluate(&pair, &delta, true).unwrap(),
            FilterOutcome { passed: true, matches: Some((true, false)) }
        );
    }

    #[test]
    fn fetched_deltas_come_last() {
        let local = Arc::new(InMemoryObjectStore::new());
        let remote = Arc::new(InMemoryObjectStore::new());
        let mut items = Vec::new();
        for (fid, promised) in [(1, true), (2, false), (3, false)] {
            let content = feature(fid, 0.5);
            let id = local.write_json_blob(&content).unwrap();
            remote.write_json_blob(&content).unwrap();
            if promised {
                local.evict_to_promised(&id);
            }
            let value = DeltaValue::stored(ItemKey::Int(fid), id, local.clone());
            items.push((ItemKey::Int(fid), Delta::insert(value)));
        }
        let source: Arc<dyn ObjectSource> = Arc::new(StoreSource::new(remote));
        let sink = MessageSink::captured();
        let fetcher = DeltaFetcher::Promissory(PromissoryFetcher::new(
            "parcels",
            local,
            Some(source),
            FetchOptions::default(),
            sink.clone(),
        ));

        let stream = FilteredDeltas::new("parcels", "feature", items, None, fetcher, None);
        assert_eq!(collect(stream), vec![ItemKey::Int(2), ItemKey::Int(3), ItemKey::Int(1)]);
        assert_eq!(sink.lines().len(), 1);
    }

    #[test]
    fn stream_ends_after_an_error() {
        let local = Arc::new(InMemoryObjectStore::new());
        let id = local.write_json_blob(&feature(1, 0.5)).unwrap();
        local.evict_to_promised(&id);
        let items = vec![
            (ItemKey::Int(1), Delta::insert(DeltaValue::stored(ItemKey::Int(1), id, local.clone()))),
            (ItemKey::Int(2), Delta::insert(inline(2, 0.5))),
        ];
        let mut stream = FilteredDeltas::new("parcels", "feature", items, None, strict(), None);
        assert!(stream.next().unwrap().is_err());
        assert!(stream.next().is_none());
    }
}
