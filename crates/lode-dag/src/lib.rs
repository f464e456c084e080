//! Commit graph for Lode history.
//!
//! Tracks parent relationships between commits and answers the ancestry
//! questions revision ranges need: is one commit an ancestor of another, and
//! what is the merge base of two commits.

pub mod error;
pub mod graph;
pub mod node;

pub use error::{DagError, DagResult};
pub use graph::CommitGraph;
pub use node::CommitNode;
