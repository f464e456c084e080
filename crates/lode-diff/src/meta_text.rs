//! Line diffs of text meta items such as CRS definitions.

use similar::{ChangeTag, TextDiff};

/// A single line in a meta item diff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffLine {
    Context(String),
    Added(String),
    Removed(String),
}

/// A contiguous group of changed lines with surrounding context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hunk {
    /// 1-based first line in the old text.
    pub old_start: usize,
    /// 1-based first line in the new text.
    pub new_start: usize,
    pub lines: Vec<DiffLine>,
}

/// Line diff of two versions of a text meta item, with `context` unchanged
/// lines around each change. An absent side diffs as empty text.
pub fn diff_meta_text(old: Option<&str>, new: Option<&str>, context: usize) -> Vec<Hunk> {
    let old = old.unwrap_or_default();
    let new = new.unwrap_or_default();
    if old == new {
        return Vec::new();
    }
    let diff = TextDiff::from_lines(old, new);
    diff.grouped_ops(context)
        .iter()
        .filter_map(|group| {
            let first = group.first()?;
            let lines = group
                .iter()
                .flat_map(|op| diff.iter_changes(op))
                .map(|change| {
                    let text = change.value().trim_end_matches(['\n', '\r']).to_string();
                    match change.tag() {
                        ChangeTag::Equal => DiffLine::Context(text),
                        ChangeTag::Delete => DiffLine::Removed(text),
                        ChangeTag::Insert => DiffLine::Added(text),
                    }
                })
                .collect();
            Some(Hunk {
                old_start: first.old_range().start + 1,
                new_start: first.new_range().start + 1,
                lines,
            })
        })
        .collect()
}
