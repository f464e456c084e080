use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use lode_dag::CommitGraph;
use lode_dataset::{empty_tree_id, RepoStructure};
use lode_diff::InMemoryWorkingCopy;
use lode_refs::{FileRefStore, Head, InMemoryRefStore, Ref, RefStore};
use lode_spatial::SpatialFilter;
use lode_store::{
    CommitObject, FetchOptions, FsObjectStore, InMemoryObjectStore, ObjectSource, ObjectStore,
    StoreSource,
};
use lode_types::ObjectId;
use tracing::debug;

use crate::commit_spec;
use crate::config::LodeConfig;
use crate::error::{SdkError, SdkResult};

/// Name of the repository metadata directory.
pub const LODE_DIR: &str = ".lode";
/// Branch HEAD names in a new repository.
pub const DEFAULT_BRANCH: &str = "main";

const REFS_FILE: &str = "refs.json";
const CONFIG_FILE: &str = "config.toml";
const WORKING_COPY_FILE: &str = "working-copy.json";
const MERGE_STATE_FILE: &str = "MERGE_STATE";

/// Whether a merge is in progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepoState {
    Normal,
    /// The working copy is based on the pending merge result rather than
    /// `HEAD`.
    Merging,
}

/// A Lode repository: objects, refs, working copy and the settings that
/// shape diffs.
pub struct Repository {
    lode_dir: Option<PathBuf>,
    store: Arc<dyn ObjectStore>,
    refs: Box<dyn RefStore>,
    working_copy: InMemoryWorkingCopy,
    merged_tree: Option<ObjectId>,
    spatial_filter: SpatialFilter,
    remote: Option<Arc<dyn ObjectSource>>,
    config: LodeConfig,
}

impl Repository {
    /// A fresh repository held entirely in memory.
    pub fn in_memory() -> SdkResult<Self> {
        Self::with_store(Arc::new(InMemoryObjectStore::new()))
    }

    /// A fresh in-memory repository over an existing object store.
    pub fn with_store(store: Arc<dyn ObjectStore>) -> SdkResult<Self> {
        let refs = InMemoryRefStore::new();
        refs.set_head(DEFAULT_BRANCH)?;
        Ok(Self {
            lode_dir: None,
            store,
            refs: Box::new(refs),
            working_copy: InMemoryWorkingCopy::new(empty_tree_id()),
            merged_tree: None,
            spatial_filter: SpatialFilter::match_all(),
            remote: None,
            config: LodeConfig::default(),
        })
    }

    /// Create a repository in `dir`, then open it.
    pub fn init(dir: impl AsRef<Path>) -> SdkResult<Self> {
        let dir = dir.as_ref();
        let lode_dir = dir.join(LODE_DIR);
        if lode_dir.exists() {
            return Err(SdkError::InvalidOperation(format!(
                "A lode repository already exists at {}",
                dir.display()
            )));
        }
        std::fs::create_dir_all(&lode_dir)?;
        FsObjectStore::open(&lode_dir)?;
        FileRefStore::open(lode_dir.join(REFS_FILE))?.set_head(DEFAULT_BRANCH)?;
        LodeConfig::default().save(&lode_dir.join(CONFIG_FILE))?;
        InMemoryWorkingCopy::new(empty_tree_id()).save(&lode_dir.join(WORKING_COPY_FILE))?;
        debug!(path = %dir.display(), "initialized repository");
        Self::open(dir)
    }

    /// Open the repository in `dir`.
    pub fn open(dir: impl AsRef<Path>) -> SdkResult<Self> {
        let dir = dir.as_ref();
        let lode_dir = dir.join(LODE_DIR);
        if !lode_dir.is_dir() {
            return Err(SdkError::NotInitialized(dir.display().to_string()));
        }
        let config = LodeConfig::load(&lode_dir.join(CONFIG_FILE))?;
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::open(&lode_dir)?);
        let refs = FileRefStore::open(lode_dir.join(REFS_FILE))?;
        let working_copy = InMemoryWorkingCopy::load(&lode_dir.join(WORKING_COPY_FILE))?;
        let merged_tree = read_merge_state(&lode_dir.join(MERGE_STATE_FILE))?;
        let spatial_filter = config.spatial_filter.build()?;
        let remote = match &config.remote.path {
            Some(path) => Some(open_remote(&config.remote.name, path)?),
            None => None,
        };
        debug!(
            path = %dir.display(),
            spatial_filter = !spatial_filter.is_match_all(),
            remote = remote.is_some(),
            "opened repository"
        );
        Ok(Self {
            lode_dir: Some(lode_dir),
            store,
            refs: Box::new(refs),
            working_copy,
            merged_tree,
            spatial_filter,
            remote,
            config,
        })
    }

    // ---- Accessors ----

    /// The `.lode` directory, for repositories on disk.
    pub fn lode_dir(&self) -> Option<&Path> {
        self.lode_dir.as_deref()
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn refs(&self) -> &dyn RefStore {
        self.refs.as_ref()
    }

    pub fn config(&self) -> &LodeConfig {
        &self.config
    }

    pub fn fetch_options(&self) -> FetchOptions {
        self.config.fetch.options()
    }

    pub fn spatial_filter(&self) -> &SpatialFilter {
        &self.spatial_filter
    }

    pub fn set_spatial_filter(&mut self, filter: SpatialFilter) {
        self.spatial_filter = filter;
    }

    /// Where promised blobs are fetched from, if anywhere.
    pub fn remote(&self) -> Option<&Arc<dyn ObjectSource>> {
        self.remote.as_ref()
    }

    pub fn set_remote(&mut self, remote: Option<Arc<dyn ObjectSource>>) {
        self.remote = remote;
    }

    // ---- Working copy ----

    pub fn working_copy(&self) -> &InMemoryWorkingCopy {
        &self.working_copy
    }

    pub fn working_copy_mut(&mut self) -> &mut InMemoryWorkingCopy {
        &mut self.working_copy
    }

    /// Persist working copy edits. A no-op for in-memory repositories.
    pub fn save_working_copy(&self) -> SdkResult<()> {
        if let Some(dir) = &self.lode_dir {
            self.working_copy.save(&dir.join(WORKING_COPY_FILE))?;
        }
        Ok(())
    }

    // ---- Merge state ----

    pub fn state(&self) -> RepoState {
        if self.merged_tree.is_some() {
            RepoState::Merging
        } else {
            RepoState::Normal
        }
    }

    /// The pending merge result, while merging.
    pub fn merged_tree(&self) -> Option<ObjectId> {
        self.merged_tree
    }

    /// Enter the merging state with `tree` as the pending result. The
    /// working copy moves onto that tree.
    pub fn begin_merge(&mut self, tree: ObjectId) -> SdkResult<()> {
        if let Some(dir) = &self.lode_dir {
            std::fs::write(dir.join(MERGE_STATE_FILE), format!("{}\n", tree.to_hex()))?;
        }
        self.merged_tree = Some(tree);
        self.working_copy.reset(tree);
        self.save_working_copy()
    }

    /// Leave the merging state, moving the working copy back onto `HEAD`.
    pub fn abort_merge(&mut self) -> SdkResult<()> {
        if let Some(dir) = &self.lode_dir {
            let path = dir.join(MERGE_STATE_FILE);
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        self.merged_tree = None;
        let tree = self.structure("HEAD")?.tree();
        self.working_copy.reset(tree);
        self.save_working_copy()
    }

    // ---- History ----

    /// The commit `HEAD` resolves to, or `None` on an unborn branch.
    pub fn head_commit(&self) -> SdkResult<Option<ObjectId>> {
        Ok(self.refs.head_commit()?)
    }

    /// The branch `HEAD` names, or `None` when detached.
    pub fn current_branch(&self) -> SdkResult<Option<String>> {
        Ok(match self.refs.head()? {
            Some(Head::Symbolic(branch)) => Some(branch),
            _ => None,
        })
    }

    /// The snapshot a revision names. See [`commit_spec::resolve_revision`].
    pub fn structure(&self, revision: &str) -> SdkResult<RepoStructure> {
        commit_spec::resolve_revision(self, revision)
    }

    /// History graph covering every commit reachable from `tips`.
    pub fn commit_graph(&self, tips: &[ObjectId]) -> SdkResult<CommitGraph> {
        let mut graph = CommitGraph::new();
        for tip in tips {
            graph.load_from_store(self.store.as_ref(), *tip)?;
        }
        Ok(graph)
    }

    pub fn merge_base(&self, a: &ObjectId, b: &ObjectId) -> SdkResult<Option<ObjectId>> {
        Ok(self.commit_graph(&[*a, *b])?.merge_base(a, b)?)
    }

    /// Commit `tree` on top of `HEAD`, advance the current branch (or the
    /// detached `HEAD`), and move the working copy onto `tree`.
    pub fn commit_tree(&mut self, tree: ObjectId, message: &str, author: &str) -> SdkResult<ObjectId> {
        let parents: Vec<ObjectId> = self.head_commit()?.into_iter().collect();
        let commit = CommitObject {
            tree,
            parents,
            message: message.to_string(),
            author: author.to_string(),
            timestamp_ms: now_ms(),
        };
        let id = self.store.write_commit(&commit)?;
        match self.refs.head()? {
            Some(Head::Detached(_)) => self.refs.set_head_detached(id)?,
            Some(Head::Symbolic(branch)) => {
                self.refs.write_ref(&format!("refs/heads/{branch}"), &Ref::branch(branch, id))?
            }
            None => {
                self.refs.set_head(DEFAULT_BRANCH)?;
                self.refs.write_ref(
                    &format!("refs/heads/{DEFAULT_BRANCH}"),
                    &Ref::branch(DEFAULT_BRANCH, id),
                )?;
            }
        }
        self.working_copy.reset(tree);
        self.save_working_copy()?;
        debug!(commit = %id.short_hex(), tree = %tree.short_hex(), "committed");
        Ok(id)
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("lode_dir", &self.lode_dir)
            .field("state", &self.state())
            .field("spatial_filter", &!self.spatial_filter.is_match_all())
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

fn read_merge_state(path: &Path) -> SdkResult<Option<ObjectId>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    ObjectId::from_hex(text.trim())
        .map(Some)
        .map_err(|e| SdkError::InvalidOperation(format!("corrupt {MERGE_STATE_FILE}: {e}")))
}

fn open_remote(name: &str, path: &Path) -> SdkResult<Arc<dyn ObjectSource>> {
    let lode_dir = path.join(LODE_DIR);
    if !lode_dir.is_dir() {
        return Err(SdkError::Config(format!(
            "remote {name} at {} is not a lode repository",
            path.display()
        )));
    }
    let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::open(&lode_dir)?);
    Ok(Arc::new(StoreSource::new(store)))
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
