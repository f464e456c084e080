//! Content hashing for Lode.
//!
//! Every object id in a Lode repository is a domain-separated BLAKE3 hash, so
//! a blob and a tree with identical bytes never share an id.

pub mod hasher;

pub use hasher::ContentHasher;
