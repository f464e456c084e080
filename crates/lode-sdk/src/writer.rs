//! Drives a diff from a commit spec to a renderer.
//!
//! [`DiffWriter`] resolves the commit spec once, then walks every candidate
//! dataset: it computes the dataset diff, hands it to a [`DiffOutput`], and
//! lets the output pull spatially filtered deltas through
//! [`DiffWriter::filtered_dataset_deltas`]. Conflicts between working-copy
//! inserts and items outside the spatial filter are collected along the way
//! and reported once the run is complete.

use std::cell::{Cell, Ref, RefCell};

use lode_dataset::{Dataset, Datasets, RepoStructure};
use lode_diff::{DatasetDiff, RepoDiff, RepoKeyFilter, WorkingCopy};
use lode_spatial::{CoordinateTransform, Crs, ResolvedSpatialFilter};
use lode_store::CommitObject;
use tracing::{debug, info, warn};

use crate::commit_spec::parse_diff_commit_spec;
use crate::conflicts::{ConflictLimits, SpatialFilterConflicts};
use crate::error::{SdkError, SdkResult};
use crate::fetcher::{DeltaFetcher, PromissoryFetcher, StrictFetcher};
use crate::filtered::{evaluate, FilteredDeltas};
use crate::kinds::{kind_for, DatasetKind, FetchPolicy, FilterPair};
use crate::repository::Repository;
use crate::sink::MessageSink;

/// A diff renderer.
///
/// The writer calls `write_header` first (when asked to), then
/// `write_ds_diff` once per changed dataset in path order, then `finish`.
pub trait DiffOutput {
    fn write_header(&mut self, _writer: &DiffWriter<'_>) -> SdkResult<()> {
        Ok(())
    }

    /// Render one dataset. Renderers that show item deltas must pull them
    /// from [`DiffWriter::filtered_dataset_deltas`] so that key and spatial
    /// filters apply.
    fn write_ds_diff(&mut self, writer: &DiffWriter<'_>, ds_path: &str, ds_diff: &DatasetDiff) -> SdkResult<()>;

    /// Whether `write_ds_diff` streams item deltas. When it does not, the
    /// writer tests the deltas against the spatial filter itself so that
    /// conflicts are still found.
    fn wants_deltas(&self) -> bool {
        true
    }

    /// Called once after the last dataset.
    fn finish(&mut self, _writer: &DiffWriter<'_>, _has_changes: bool) -> SdkResult<()> {
        Ok(())
    }
}

/// One diff run: a resolved commit spec, key filters and output options.
///
/// Build with [`DiffWriter::new`] and the `with_*` methods, then call
/// [`DiffWriter::write_diff`] once.
pub struct DiffWriter<'r> {
    repo: &'r Repository,
    commit_spec: String,
    base: RepoStructure,
    target: RepoStructure,
    include_wc: bool,
    base_datasets: Datasets,
    target_datasets: Datasets,
    key_filter: RepoKeyFilter,
    target_crs: Option<Crs>,
    sink: MessageSink,
    include_target_commit: bool,
    track_conflicts: bool,
    limits: ConflictLimits,
    conflicts: RefCell<SpatialFilterConflicts>,
    has_changes: Cell<Option<bool>>,
}

impl<'r> DiffWriter<'r> {
    /// Resolve `commit_spec` against `repo` and parse `user_key_filters`
    /// (`ds`, `ds:KEY`, `ds:type:KEY`, `ds:meta:NAME`).
    pub fn new<S: AsRef<str>>(repo: &'r Repository, commit_spec: &str, user_key_filters: &[S]) -> SdkResult<Self> {
        let (base, target, include_wc) = parse_diff_commit_spec(repo, commit_spec)?;
        let key_filter = RepoKeyFilter::build_from_user_patterns(user_key_filters)?;
        let base_datasets = base.datasets()?;
        let target_datasets = target.datasets()?;
        let track_conflicts =
            !repo.spatial_filter().is_match_all() && base.id() == target.id() && include_wc;
        debug!(
            commit_spec,
            base = ?base,
            target = ?target,
            include_wc,
            track_conflicts,
            "diff resolved"
        );
        Ok(Self {
            repo,
            commit_spec: commit_spec.to_string(),
            base,
            target,
            include_wc,
            base_datasets,
            target_datasets,
            key_filter,
            target_crs: None,
            sink: MessageSink::default(),
            include_target_commit: false,
            track_conflicts,
            limits: ConflictLimits::from(&repo.config().diff),
            conflicts: RefCell::new(SpatialFilterConflicts::new()),
            has_changes: Cell::new(None),
        })
    }

    /// Reproject output geometries of table datasets into `crs`.
    pub fn with_target_crs(mut self, crs: Crs) -> Self {
        self.target_crs = Some(crs);
        self
    }

    /// Send fetch notices and conflict warnings to `sink` instead of stderr.
    pub fn with_message_sink(mut self, sink: MessageSink) -> Self {
        self.sink = sink;
        self
    }

    /// Have the output write the target commit before the diff.
    pub fn include_target_commit_as_header(mut self) -> Self {
        self.include_target_commit = true;
        self
    }

    pub fn repo(&self) -> &'r Repository {
        self.repo
    }

    /// The commit spec as given.
    pub fn commit_spec(&self) -> &str {
        &self.commit_spec
    }

    pub fn base(&self) -> &RepoStructure {
        &self.base
    }

    pub fn target(&self) -> &RepoStructure {
        &self.target
    }

    /// Whether working-copy edits are composed onto the target.
    pub fn include_wc(&self) -> bool {
        self.include_wc
    }

    pub fn target_crs(&self) -> Option<&Crs> {
        self.target_crs.as_ref()
    }

    pub fn sink(&self) -> &MessageSink {
        &self.sink
    }

    /// The commit shown as the header, if the target is a commit.
    pub fn target_commit(&self) -> SdkResult<Option<CommitObject>> {
        Ok(self.target.read_commit()?)
    }

    fn working_copy(&self) -> Option<&dyn WorkingCopy> {
        if self.include_wc {
            Some(self.repo.working_copy())
        } else {
            None
        }
    }

    /// The dataset at `ds_path` as it was in the base, or failing that as it
    /// is in the target.
    pub fn old_or_new_dataset(&self, ds_path: &str) -> Option<&Dataset> {
        self.base_datasets
            .get(ds_path)
            .or_else(|| self.target_datasets.get(ds_path))
    }

    fn kind_of(&self, ds_path: &str) -> Option<(&Dataset, &'static dyn DatasetKind)> {
        self.old_or_new_dataset(ds_path)
            .map(|ds| (ds, kind_for(ds.dataset_type())))
    }

    /// Write the whole diff to `output`. Returns whether anything changed,
    /// ignoring the spatial filter.
    pub fn write_diff(&self, output: &mut dyn DiffOutput) -> SdkResult<bool> {
        if self.include_target_commit {
            output.write_header(self)?;
        }
        let mut has_changes = false;
        let paths = self
            .key_filter
            .candidate_paths(self.base_datasets.paths(), self.target_datasets.paths());
        for ds_path in paths {
            let ds_diff = self.get_dataset_diff(&ds_path)?;
            if ds_diff.is_empty() {
                continue;
            }
            has_changes = true;
            if !output.wants_deltas() {
                self.record_spatial_filter_stats_for_dataset(&ds_path, &ds_diff)?;
            }
            output.write_ds_diff(self, &ds_path, &ds_diff)?;
        }
        self.has_changes.set(Some(has_changes));
        output.finish(self, has_changes)?;
        self.report_conflicts();
        Ok(has_changes)
    }

    /// The diff of every candidate dataset, without the spatial filter.
    pub fn get_repo_diff(&self) -> SdkResult<RepoDiff> {
        Ok(lode_diff::get_repo_diff(
            &self.base_datasets,
            &self.target_datasets,
            self.working_copy(),
            &self.key_filter,
        )?)
    }

    /// The diff of one dataset, without the spatial filter.
    pub fn get_dataset_diff(&self, ds_path: &str) -> SdkResult<DatasetDiff> {
        Ok(lode_diff::get_dataset_diff(
            ds_path,
            &self.base_datasets,
            &self.target_datasets,
            self.working_copy(),
            &self.key_filter.dataset(ds_path),
        )?)
    }

    /// The item deltas of `ds_diff` that pass the spatial filter, ready to
    /// output.
    pub fn filtered_dataset_deltas(&self, ds_path: &str, ds_diff: &DatasetDiff) -> SdkResult<FilteredDeltas<'_>> {
        let Some((ds, kind)) = self.kind_of(ds_path) else {
            return Ok(FilteredDeltas::new(
                ds_path,
                "feature",
                Vec::new(),
                None,
                DeltaFetcher::Strict(StrictFetcher::new(ds_path, "table")),
                None,
            ));
        };
        let items = ds_diff
            .item_diff(kind.item_type())
            .map(|d| d.sorted_items())
            .unwrap_or_default();
        let filters = if self.repo.spatial_filter().is_match_all() {
            None
        } else {
            Some(self.get_spatial_filters(ds_path, ds_diff)?)
        };
        let fetcher = match kind.fetch_policy() {
            FetchPolicy::Promissory => DeltaFetcher::Promissory(PromissoryFetcher::new(
                ds_path,
                self.repo.store().clone(),
                self.repo.remote().cloned(),
                self.repo.fetch_options(),
                self.sink.clone(),
            )),
            FetchPolicy::Strict => {
                DeltaFetcher::Strict(StrictFetcher::new(ds_path, ds.dataset_type().as_str()))
            }
        };
        let conflicts = self.track_conflicts.then_some(&self.conflicts);
        Ok(FilteredDeltas::new(ds_path, kind.item_type(), items, filters, fetcher, conflicts))
    }

    /// Transforms from the dataset's old and new CRS into the target CRS.
    /// Both are `None` without a target CRS or for datasets that cannot be
    /// reprojected.
    pub fn get_geometry_transforms(
        &self,
        ds_path: &str,
        ds_diff: &DatasetDiff,
    ) -> SdkResult<(Option<CoordinateTransform>, Option<CoordinateTransform>)> {
        let Some(target_crs) = &self.target_crs else {
            return Ok((None, None));
        };
        match self.kind_of(ds_path) {
            Some((_, kind)) if kind.supports_reprojection() => {}
            _ => return Ok((None, None)),
        }
        let (old_crs, new_crs) = self.get_old_and_new_crs(ds_path, ds_diff, "reprojection")?;
        let transform = |crs: Option<Crs>| -> SdkResult<Option<CoordinateTransform>> {
            crs.map(|crs| {
                CoordinateTransform::new(&crs, target_crs).map_err(|e| {
                    SdkError::Crs(format!("Can't reproject dataset {ds_path:?} into target CRS: {e}"))
                })
            })
            .transpose()
        };
        Ok((transform(old_crs)?, transform(new_crs)?))
    }

    /// The dataset's CRS before and after `ds_diff`. `context` names what
    /// the CRS is needed for, for error messages.
    pub fn get_old_and_new_crs(
        &self,
        ds_path: &str,
        ds_diff: &DatasetDiff,
        context: &str,
    ) -> SdkResult<(Option<Crs>, Option<Crs>)> {
        match self.kind_of(ds_path) {
            Some((ds, kind)) => kind.old_and_new_crs(ds, ds_diff, context),
            None => Ok((None, None)),
        }
    }

    /// The repository's spatial filter resolved for the dataset before and
    /// after `ds_diff`.
    pub fn get_spatial_filters(&self, ds_path: &str, ds_diff: &DatasetDiff) -> SdkResult<FilterPair> {
        let filter = self.repo.spatial_filter();
        match self.kind_of(ds_path) {
            Some((ds, kind)) if !filter.is_match_all() => kind.spatial_filters(filter, ds, ds_diff),
            _ => Ok((ResolvedSpatialFilter::match_all(), ResolvedSpatialFilter::match_all())),
        }
    }

    /// Test every item delta of `ds_diff` against the spatial filter and
    /// record conflicts, without fetching or outputting anything.
    pub fn record_spatial_filter_stats_for_dataset(&self, ds_path: &str, ds_diff: &DatasetDiff) -> SdkResult<()> {
        if !self.track_conflicts {
            return Ok(());
        }
        let Some((_, kind)) = self.kind_of(ds_path) else {
            return Ok(());
        };
        let Some(items) = ds_diff.item_diff(kind.item_type()) else {
            return Ok(());
        };
        let filters = self.get_spatial_filters(ds_path, ds_diff)?;
        if filters.0.is_match_all() && filters.1.is_match_all() {
            return Ok(());
        }
        let mut conflicts = self.conflicts.borrow_mut();
        for (key, delta) in items.iter() {
            let outcome = evaluate(&filters, delta, true)?;
            if let Some((old_matched, new_matched)) = outcome.matches {
                conflicts.record_stat(ds_path, kind.item_type(), key, delta, old_matched, new_matched);
            }
        }
        Ok(())
    }

    /// Write the conflict warning, if any conflicts were found.
    pub fn report_conflicts(&self) {
        let conflicts = self.conflicts.borrow();
        if conflicts.is_empty() {
            return;
        }
        warn!(count = conflicts.len(), "working copy conflicts with items outside the spatial filter");
        for line in conflicts.render_warnings(self.limits) {
            self.sink.line(&line);
        }
    }

    pub fn conflicts(&self) -> Ref<'_, SpatialFilterConflicts> {
        self.conflicts.borrow()
    }

    /// Whether the last [`DiffWriter::write_diff`] found changes.
    pub fn has_changes(&self) -> SdkResult<bool> {
        self.has_changes.get().ok_or(SdkError::NotRun)
    }

    /// Process exit status for `--exit-code`: 1 when changes were found.
    pub fn exit_code(&self) -> SdkResult<i32> {
        let code = i32::from(self.has_changes()?);
        info!(code, "diff exit code");
        Ok(code)
    }
}
