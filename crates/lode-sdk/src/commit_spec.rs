//! Revision names and diff ranges.
//!
//! ```text
//! A        A against the working copy (HEAD when empty)
//! A...B    A against B
//! A..B     merge base of A and B against B
//! ```
//!
//! A revision is `HEAD`, `MERGED_TREE` while merging, a ref, branch, tag or
//! remote branch name, a full object id or a unique id prefix, optionally
//! followed by any sequence of `^`, `^N` and `~N`.

use lode_dataset::RepoStructure;
use lode_diff::WorkingCopy;
use lode_store::ObjectKind;
use lode_types::ObjectId;
use tracing::debug;

use crate::error::{SdkError, SdkResult};
use crate::repository::{RepoState, Repository};

/// Name of the pending merge result while a merge is in progress.
pub const MERGED_TREE: &str = "MERGED_TREE";

const MIN_PREFIX_LEN: usize = 4;

/// The two snapshots a diff runs between, and whether working copy edits
/// extend the target.
pub fn parse_diff_commit_spec(
    repo: &Repository,
    commit_spec: &str,
) -> SdkResult<(RepoStructure, RepoStructure, bool)> {
    let commit_spec = if commit_spec.is_empty() { "HEAD" } else { commit_spec };

    if let Some((left, operator, right)) = split_range(commit_spec)? {
        let base = repo.structure(or_head(left))?;
        let target = repo.structure(or_head(right))?;
        let base = if operator == ".." {
            common_ancestor(repo, &base, &target)?
        } else {
            base
        };
        debug!(commit_spec, base = ?base, target = ?target, "resolved range");
        return Ok((base, target, false));
    }

    let base = repo.structure(commit_spec)?;
    let target = match repo.state() {
        RepoState::Merging => repo.structure(MERGED_TREE)?,
        RepoState::Normal => repo.structure("HEAD")?,
    };
    let wc = repo.working_copy();
    if !wc.exists() {
        return Err(SdkError::Usage(
            "Cannot generate working copy diff: no working copy".into(),
        ));
    }
    if !wc.matches_tree(&target.tree()) {
        let actual = wc.tree_id().map(|t| t.short_hex()).unwrap_or_default();
        return Err(SdkError::Usage(format!(
            "Working copy tree {actual} does not match {}",
            target.tree().short_hex()
        )));
    }
    debug!(commit_spec, base = ?base, target = ?target, "resolved working copy diff");
    Ok((base, target, true))
}

fn or_head(rev: &str) -> &str {
    if rev.is_empty() {
        "HEAD"
    } else {
        rev
    }
}

/// Split `A..B` or `A...B`. `None` for a single revision.
fn split_range(spec: &str) -> SdkResult<Option<(&str, &str, &str)>> {
    let Some(start) = spec.find("..") else {
        return Ok(None);
    };
    let operator = if spec[start..].starts_with("...") { "..." } else { ".." };
    let left = &spec[..start];
    let right = &spec[start + operator.len()..];
    if right.contains("..") {
        return Err(SdkError::Usage(format!("Invalid commit range: {spec}")));
    }
    Ok(Some((left, operator, right)))
}

fn common_ancestor(
    repo: &Repository,
    a: &RepoStructure,
    b: &RepoStructure,
) -> SdkResult<RepoStructure> {
    let mut commits = Vec::with_capacity(2);
    for rs in [a, b] {
        match rs.commit() {
            Some(commit) => commits.push(commit),
            None => {
                return Err(SdkError::Usage(format!(
                    "The .. operator works on commits, not trees - {} is a tree. (Perhaps try the ... operator)",
                    rs.id()
                )))
            }
        }
    }
    match repo.merge_base(&commits[0], &commits[1])? {
        Some(ancestor) => Ok(RepoStructure::from_commit(repo.store().clone(), ancestor)?),
        None => Err(SdkError::InvalidOperation(
            "The .. operator tries to find the common ancestor, but no common ancestor was found. Perhaps try the ... operator."
                .into(),
        )),
    }
}

/// What a bare revision name points at.
enum Resolved {
    Commit(ObjectId),
    Tree(ObjectId),
    /// `HEAD` on a branch with no commits.
    Unborn,
}

/// Resolve one revision to a snapshot.
pub fn resolve_revision(repo: &Repository, revision: &str) -> SdkResult<RepoStructure> {
    let (name, suffix) = match revision.find(['^', '~']) {
        Some(i) => revision.split_at(i),
        None => (revision, ""),
    };
    if name.is_empty() {
        return Err(unknown(revision));
    }
    let steps = parse_suffix(revision, suffix)?;
    let store = repo.store().clone();

    let mut commit = match resolve_name(repo, name)? {
        Resolved::Unborn if steps.is_empty() => return Ok(RepoStructure::empty(store)),
        Resolved::Tree(tree) if steps.is_empty() => return Ok(RepoStructure::from_tree(store, tree)),
        Resolved::Commit(id) => id,
        Resolved::Unborn | Resolved::Tree(_) => {
            return Err(SdkError::Usage(format!("{name} has no parent commits")))
        }
    };
    for step in steps {
        let parents = store.read_commit(&commit)?.parents;
        commit = match step {
            Step::Parent(0) => commit,
            Step::Parent(n) => *parents.get(n - 1).ok_or_else(|| no_parent(revision))?,
            Step::Ancestor(n) => {
                let mut current = commit;
                for _ in 0..n {
                    current = *store
                        .read_commit(&current)?
                        .parents
                        .first()
                        .ok_or_else(|| no_parent(revision))?;
                }
                current
            }
        };
    }
    Ok(RepoStructure::from_commit(store, commit)?)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    /// `^N`: the N-th parent (`^0` is the commit itself).
    Parent(usize),
    /// `~N`: N generations back along first parents.
    Ancestor(usize),
}

fn parse_suffix(revision: &str, suffix: &str) -> SdkResult<Vec<Step>> {
    let mut steps = Vec::new();
    let mut chars = suffix.chars().peekable();
    while let Some(op) = chars.next() {
        let mut digits = String::new();
        while let Some(d) = chars.next_if(char::is_ascii_digit) {
            digits.push(d);
        }
        let n = if digits.is_empty() {
            1
        } else {
            digits.parse().map_err(|_| unknown(revision))?
        };
        steps.push(match op {
            '^' => Step::Parent(n),
            '~' => Step::Ancestor(n),
            _ => return Err(unknown(revision)),
        });
    }
    Ok(steps)
}

fn resolve_name(repo: &Repository, name: &str) -> SdkResult<Resolved> {
    if name == "HEAD" {
        return Ok(match repo.head_commit()? {
            Some(id) => Resolved::Commit(id),
            None => Resolved::Unborn,
        });
    }
    if name == MERGED_TREE {
        return match repo.merged_tree() {
            Some(tree) => Ok(Resolved::Tree(tree)),
            None => Err(SdkError::Usage(format!("{MERGED_TREE}: no merge is in progress"))),
        };
    }
    if let Some(id) = repo.refs().resolve_short_name(name)? {
        return Ok(Resolved::Commit(id));
    }
    if !name.chars().all(|c| c.is_ascii_hexdigit()) || name.len() < MIN_PREFIX_LEN {
        return Err(unknown(name));
    }
    let candidates: Vec<ObjectId> = match ObjectId::from_hex(name) {
        Ok(id) => vec![id],
        Err(_) => repo.store().ids_with_prefix(&name.to_ascii_lowercase())?,
    };
    let mut found = Vec::new();
    for id in candidates {
        match repo.store().read(&id)?.map(|obj| obj.kind) {
            Some(ObjectKind::Commit) => found.push(Resolved::Commit(id)),
            Some(ObjectKind::Tree) => found.push(Resolved::Tree(id)),
            _ => {}
        }
    }
    match found.len() {
        0 => Err(unknown(name)),
        1 => Ok(found.remove(0)),
        n => Err(SdkError::Usage(format!("Ambiguous revision {name}: {n} objects match"))),
    }
}

fn unknown(revision: &str) -> SdkError {
    SdkError::Usage(format!("Unknown revision: {revision}"))
}

fn no_parent(revision: &str) -> SdkError {
    SdkError::Usage(format!("Unknown revision: {revision} (no such parent)"))
}
