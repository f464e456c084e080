use std::collections::{HashMap, HashSet, VecDeque};

use lode_store::ObjectStore;
use lode_types::ObjectId;
use tracing::debug;

use crate::error::{DagError, DagResult};
use crate::node::CommitNode;

/// In-memory index of commit parentage.
///
/// Nodes are append-only: a commit can only be added once all of its parents
/// are present, so the graph is always closed under the parent relation.
#[derive(Clone, Debug, Default)]
pub struct CommitGraph {
    nodes: HashMap<ObjectId, CommitNode>,
    children: HashMap<ObjectId, Vec<ObjectId>>,
}

impl CommitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    /// Add a commit. All of its parents must already be present.
    pub fn add_node(&mut self, node: CommitNode) -> DagResult<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(DagError::DuplicateNode(node.id));
        }
        for parent in &node.parents {
            if !self.nodes.contains_key(parent) {
                return Err(DagError::DanglingParent {
                    node: node.id,
                    parent: *parent,
                });
            }
        }
        for parent in &node.parents {
            self.children.entry(*parent).or_default().push(node.id);
        }
        debug!(commit = %node.id.short_hex(), parents = node.parents.len(), "added commit node");
        self.nodes.insert(node.id, node);
        Ok(())
    }

    /// Load `tip` and all of its history from the object store.
    ///
    /// Commits already in the graph are not re-read.
    pub fn load_from_store(&mut self, store: &dyn ObjectStore, tip: ObjectId) -> DagResult<()> {
        // Depth-first walk that emits commits parents-first.
        let mut stack = vec![(tip, false)];
        let mut pending: HashMap<ObjectId, CommitNode> = HashMap::new();
        while let Some((id, expanded)) = stack.pop() {
            if self.nodes.contains_key(&id) {
                continue;
            }
            if expanded {
                if let Some(node) = pending.remove(&id) {
                    self.add_node(node)?;
                }
                continue;
            }
            if pending.contains_key(&id) {
                continue;
            }
            let commit = store.read_commit(&id)?;
            let node = CommitNode::from_commit(id, &commit);
            stack.push((id, true));
            for parent in node.parents.iter().rev() {
                if !self.nodes.contains_key(parent) {
                    stack.push((*parent, false));
                }
            }
            pending.insert(id, node);
        }
        Ok(())
    }

    pub fn get_node(&self, id: &ObjectId) -> Option<&CommitNode> {
        self.nodes.get(id)
    }

    fn require(&self, id: &ObjectId) -> DagResult<&CommitNode> {
        self.nodes.get(id).ok_or(DagError::NodeNotFound(*id))
    }

    // ---------------------------------------------------------------
    // Ancestry
    // ---------------------------------------------------------------

    /// `id` and every commit reachable from it through parents.
    pub fn ancestors_inclusive(&self, id: &ObjectId) -> DagResult<HashSet<ObjectId>> {
        self.require(id)?;
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(*id);
        queue.push_back(*id);
        while let Some(current) = queue.pop_front() {
            if let Some(node) = self.nodes.get(&current) {
                for parent in &node.parents {
                    if visited.insert(*parent) {
                        queue.push_back(*parent);
                    }
                }
            }
        }
        Ok(visited)
    }

    /// Returns `true` if `ancestor` is reachable from `descendant` (or equal).
    pub fn is_ancestor(&self, ancestor: &ObjectId, descendant: &ObjectId) -> DagResult<bool> {
        self.require(ancestor)?;
        Ok(self.ancestors_inclusive(descendant)?.contains(ancestor))
    }

    /// All best common ancestors of `a` and `b`: common ancestors that are
    /// not themselves ancestors of another common ancestor. Sorted by id.
    pub fn merge_bases(&self, a: &ObjectId, b: &ObjectId) -> DagResult<Vec<ObjectId>> {
        let ancestors_a = self.ancestors_inclusive(a)?;
        let ancestors_b = self.ancestors_inclusive(b)?;
        let common: HashSet<ObjectId> = ancestors_a.intersection(&ancestors_b).copied().collect();

        let mut dominated = HashSet::new();
        for id in &common {
            if let Some(node) = self.nodes.get(id) {
                for parent in &node.parents {
                    for ancestor in self.ancestors_inclusive(parent)? {
                        dominated.insert(ancestor);
                    }
                }
            }
        }
        let mut bases: Vec<ObjectId> = common.difference(&dominated).copied().collect();
        bases.sort();
        Ok(bases)
    }

    /// A single merge base of `a` and `b`, or `None` if their histories are
    /// unrelated.
    ///
    /// When there are several best common ancestors the most recent one is
    /// chosen, with ties broken by id so the answer is deterministic.
    pub fn merge_base(&self, a: &ObjectId, b: &ObjectId) -> DagResult<Option<ObjectId>> {
        let bases = self.merge_bases(a, b)?;
        Ok(bases
            .into_iter()
            .filter_map(|id| self.nodes.get(&id))
            .max_by(|x, y| {
                x.timestamp_ms
                    .cmp(&y.timestamp_ms)
                    .then_with(|| y.id.cmp(&x.id))
            })
            .map(|node| node.id))
    }

    /// Direct children of a commit.
    pub fn children(&self, id: &ObjectId) -> &[ObjectId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_store::{CommitObject, InMemoryObjectStore};

    fn oid(byte: u8) -> ObjectId {
        ObjectId::from_hash([byte; 32])
    }

    fn node(id: u8, parents: &[u8], ts: u64) -> CommitNode {
        CommitNode {
            id: oid(id),
            tree: ObjectId::null(),
            parents: parents.iter().map(|p| oid(*p)).collect(),
            timestamp_ms: ts,
        }
    }

    ///   1 - 2 - 3      (main)
    ///        \
    ///         4 - 5    (feature)
    fn forked() -> CommitGraph {
        let mut g = CommitGraph::new();
        g.add_node(node(1, &[], 1)).unwrap();
        g.add_node(node(2, &[1], 2)).unwrap();
        g.add_node(node(3, &[2], 3)).unwrap();
        g.add_node(node(4, &[2], 4)).unwrap();
        g.add_node(node(5, &[4], 5)).unwrap();
        g
    }

    #[test]
    fn dangling_parent_is_rejected() {
        let mut g = CommitGraph::new();
        let err = g.add_node(node(2, &[1], 0)).unwrap_err();
        assert!(matches!(err, DagError::DanglingParent { .. }));
    }

    #[test]
    fn duplicate_node_is_rejected() {
        let mut g = CommitGraph::new();
        g.add_node(node(1, &[], 0)).unwrap();
        assert!(matches!(g.add_node(node(1, &[], 0)), Err(DagError::DuplicateNode(_))));
    }

    #[test]
    fn ancestry() {
        let g = forked();
        assert!(g.is_ancestor(&oid(1), &oid(5)).unwrap());
        assert!(g.is_ancestor(&oid(5), &oid(5)).unwrap());
        assert!(!g.is_ancestor(&oid(3), &oid(5)).unwrap());
        assert_eq!(g.children(&oid(2)).len(), 2);
    }

    #[test]
    fn merge_base_of_fork() {
        let g = forked();
        assert_eq!(g.merge_base(&oid(3), &oid(5)).unwrap(), Some(oid(2)));
        assert_eq!(g.merge_base(&oid(2), &oid(5)).unwrap(), Some(oid(2)));
        assert_eq!(g.merge_base(&oid(5), &oid(5)).unwrap(), Some(oid(5)));
    }

    #[test]
    fn unrelated_histories_have_no_merge_base() {
        let mut g = forked();
        g.add_node(node(9, &[], 9)).unwrap();
        assert_eq!(g.merge_base(&oid(9), &oid(3)).unwrap(), None);
    }

    #[test]
    fn criss_cross_has_two_bases() {
        // 1 -> 2, 1 -> 3, 4 = merge(2,3), 5 = merge(3,2)
        let mut g = CommitGraph::new();
        g.add_node(node(1, &[], 1)).unwrap();
        g.add_node(node(2, &[1], 2)).unwrap();
        g.add_node(node(3, &[1], 3)).unwrap();
        g.add_node(node(4, &[2, 3], 4)).unwrap();
        g.add_node(node(5, &[3, 2], 5)).unwrap();
        assert_eq!(g.merge_bases(&oid(4), &oid(5)).unwrap(), vec![oid(2), oid(3)]);
        assert_eq!(g.merge_base(&oid(4), &oid(5)).unwrap(), Some(oid(3)));
    }

    #[test]
    fn unknown_commit_is_an_error() {
        let g = forked();
        assert!(matches!(g.merge_base(&oid(42), &oid(1)), Err(DagError::NodeNotFound(_))));
    }

    #[test]
    fn load_history_from_store() {
        let store = InMemoryObjectStore::new();
        let tree = ObjectId::from_bytes(b"tree");
        let root = store
            .write_commit(&CommitObject {
                tree,
                parents: vec![],
                message: "root".into(),
                author: "t".into(),
                timestamp_ms: 1,
            })
            .unwrap();
        let left = store
            .write_commit(&CommitObject {
                tree,
                parents: vec![root],
                message: "left".into(),
                author: "t".into(),
                timestamp_ms: 2,
            })
            .unwrap();
        let right = store
            .write_commit(&CommitObject {
                tree,
                parents: vec![root],
                message: "right".into(),
                author: "t".into(),
                timestamp_ms: 3,
            })
            .unwrap();
        let merge = store
            .write_commit(&CommitObject {
                tree,
                parents: vec![left, right],
                message: "merge".into(),
                author: "t".into(),
                timestamp_ms: 4,
            })
            .unwrap();

        let mut g = CommitGraph::new();
        g.load_from_store(&store, merge).unwrap();
        assert_eq!(g.len(), 4);
        assert!(g.get_node(&merge).unwrap().is_merge());
        assert_eq!(g.merge_base(&left, &right).unwrap(), Some(root));

        // Reloading is a no-op.
        g.load_from_store(&store, left).unwrap();
        assert_eq!(g.len(), 4);
    }
}
