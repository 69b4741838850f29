//! Master TOC merge.
//!
//! Combines the per-group trees of a build into one flat master tree:
//! conceptual (flat) trees first, then reference (rooted) trees, optionally
//! nested under a single titled root-namespace entry.

use tracing::{debug, info, instrument};

use helpforge_shared::{Result, TopicEntry};

use crate::toc::{TocLayout, TocTree};

/// Id of the entry reference content is nested under.
pub const ROOT_NAMESPACE_ID: &str = "root-namespace";

/// Merge `trees` into a new master tree named `name`.
///
/// Excluded trees are skipped. Trees keep their relative order within the
/// conceptual and reference partitions. When `root_title` is given, every
/// reference root entry becomes a child of one entry with that title.
#[instrument(skip_all, fields(master = tracing::field::Empty, trees = trees.len()))]
pub fn merge_master(
    name: impl Into<String>,
    trees: &[&TocTree],
    root_title: Option<&str>,
) -> Result<TocTree> {
    let mut master = TocTree::new(name, TocLayout::Flat);
    tracing::Span::current().record("master", master.name());

    let (reference, conceptual): (Vec<&TocTree>, Vec<&TocTree>) = trees
        .iter()
        .copied()
        .filter(|t| {
            if t.is_excluded() {
                debug!(tree = %t.name(), "skipping excluded tree");
            }
            !t.is_excluded()
        })
        .partition(|t| t.is_rooted());

    for tree in &conceptual {
        master.add_tree(tree)?;
    }

    match root_title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => {
            let children = reference
                .iter()
                .flat_map(|t| t.entries().iter().cloned())
                .collect();
            let container = TopicEntry::new(ROOT_NAMESPACE_ID, title, "").with_children(children)?;
            master.add(container)?;
        }
        None => {
            for tree in &reference {
                master.add_tree(tree)?;
            }
        }
    }

    info!(
        conceptual = conceptual.len(),
        reference = reference.len(),
        topics = master.topic_count(),
        "merged master TOC"
    );
    Ok(master)
}
