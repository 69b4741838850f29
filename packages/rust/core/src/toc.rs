//! TOC (Table of Contents) tree.
//!
//! A [`TocTree`] is the ordered, named hierarchy of [`TopicEntry`] nodes for
//! one build group. It owns its entries exclusively, validates every mutation
//! against the sibling-name and layout invariants, and persists itself as a
//! JSON record through an explicit load/save/unload lifecycle.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use helpforge_shared::{
    CURRENT_SCHEMA_VERSION, ContentGroup, GroupKind, HelpForgeError, Result, TopicEntry,
    check_sibling, validate_siblings,
};

use crate::object::BuildObject;

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Shape constraint on a tree's root level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TocLayout {
    /// Resolves to at most one top-level entry (API reference style).
    Rooted,
    /// A forest of top-level entries (conceptual style).
    #[default]
    Flat,
}

impl TocLayout {
    /// Layout a group of `kind` builds by default.
    pub fn for_group(kind: GroupKind) -> Self {
        match kind {
            GroupKind::Reference => Self::Rooted,
            GroupKind::Conceptual | GroupKind::Generic => Self::Flat,
        }
    }

    pub fn is_rooted(self) -> bool {
        self == Self::Rooted
    }

    /// Check that a root level of `count` entries fits this layout.
    fn check(self, tree: &str, count: usize) -> Result<()> {
        if self.is_rooted() && count > 1 {
            return Err(HelpForgeError::invalid_state(format!(
                "rooted tree '{tree}' would have {count} root entries"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Persisted record
// ---------------------------------------------------------------------------

/// On-disk form of a tree (`*.toc.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocRecord {
    pub schema_version: u32,
    pub name: String,
    #[serde(default)]
    pub rooted: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub excluded: bool,
    #[serde(default)]
    pub entries: Vec<TopicEntry>,
}

// ---------------------------------------------------------------------------
// TocTree
// ---------------------------------------------------------------------------

/// Ordered, persistable hierarchy of topics for one build group.
///
/// Entries are identified at their level by `(id, name)`; names are unique
/// among siblings at every depth.
#[derive(Debug, Clone, Default)]
pub struct TocTree {
    name: String,
    backing: Option<PathBuf>,
    layout: TocLayout,
    excluded: bool,
    loaded: bool,
    entries: Vec<TopicEntry>,
}

impl PartialEq for TocTree {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.entries == other.entries
    }
}

impl TocTree {
    pub fn new(name: impl Into<String>, layout: TocLayout) -> Self {
        Self {
            name: name.into(),
            layout,
            ..Self::default()
        }
    }

    /// Empty tree for `group`: named by the group id, shaped by its kind and
    /// backed by its TOC file, if any.
    pub fn for_group(group: &ContentGroup) -> Self {
        Self {
            name: group.id.clone(),
            backing: group.toc_file.clone(),
            layout: TocLayout::for_group(group.kind),
            excluded: group.excluded,
            ..Self::default()
        }
    }

    /// Open and load the record at `path`, adopting its name.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let mut tree = Self {
            backing: Some(path.into()),
            ..Self::default()
        };
        tree.load()?;
        Ok(tree)
    }

    pub fn with_backing(mut self, path: impl Into<PathBuf>) -> Self {
        self.backing = Some(path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backing(&self) -> Option<&Path> {
        self.backing.as_deref()
    }

    pub fn set_backing(&mut self, path: Option<PathBuf>) {
        self.backing = path;
    }

    pub fn layout(&self) -> TocLayout {
        self.layout
    }

    pub fn is_rooted(&self) -> bool {
        self.layout.is_rooted()
    }

    /// Excluded trees are skipped when merging into a master TOC.
    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    pub fn set_excluded(&mut self, excluded: bool) {
        self.excluded = excluded;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// True when the tree has no name, no backing record, or no entries.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() || self.backing.is_none() || self.entries.is_empty()
    }

    /// Number of root-level entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[TopicEntry] {
        &self.entries
    }

    /// Number of nodes at every depth.
    pub fn topic_count(&self) -> usize {
        self.entries.iter().map(TopicEntry::topic_count).sum()
    }

    // -- Queries ------------------------------------------------------------

    /// Root-level position of `entry`, matched by id and name.
    pub fn index_of(&self, entry: &TopicEntry) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.id == entry.id && e.name == entry.name)
    }

    /// Root-level position of the entry named `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    pub fn get(&self, index: usize) -> Result<&TopicEntry> {
        self.entries.get(index).ok_or(HelpForgeError::IndexOutOfRange {
            index,
            count: self.entries.len(),
        })
    }

    /// Direct child lookup by name.
    pub fn get_named(&self, name: &str) -> Option<&TopicEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Look up `name` among the root entries, or anywhere in the tree when
    /// `recursive` is set (pre-order: parent before children, siblings in
    /// stored order).
    pub fn find(&self, name: &str, recursive: bool) -> Option<&TopicEntry> {
        if !recursive {
            return self.get_named(name);
        }
        for entry in &self.entries {
            if entry.name == name {
                return Some(entry);
            }
            if let Some(found) = entry.find_descendant(name) {
                return Some(found);
            }
        }
        None
    }

    // -- Mutation -------------------------------------------------------------

    pub fn add(&mut self, entry: TopicEntry) -> Result<()> {
        entry.validate()?;
        check_sibling(&self.entries, &entry)?;
        self.layout.check(&self.name, self.entries.len() + 1)?;

        debug!(tree = %self.name, entry = %entry.name, "added entry");
        self.entries.push(entry);
        Ok(())
    }

    /// Append `entries` in order. The whole range is validated first, so a
    /// failure leaves the tree untouched.
    pub fn add_range(&mut self, entries: Vec<TopicEntry>) -> Result<()> {
        self.check_incoming(&entries, None)?;
        self.layout
            .check(&self.name, self.entries.len() + entries.len())?;

        debug!(tree = %self.name, count = entries.len(), "added entries");
        self.entries.extend(entries);
        Ok(())
    }

    /// Merge another tree's root entries onto the end of this one.
    pub fn add_tree(&mut self, other: &TocTree) -> Result<()> {
        self.add_range(other.entries.clone())
    }

    pub fn insert(&mut self, index: usize, entry: TopicEntry) -> Result<()> {
        self.check_insert_index(index)?;
        entry.validate()?;
        check_sibling(&self.entries, &entry)?;
        self.layout.check(&self.name, self.entries.len() + 1)?;

        debug!(tree = %self.name, entry = %entry.name, index, "inserted entry");
        self.entries.insert(index, entry);
        Ok(())
    }

    pub fn insert_range(&mut self, index: usize, entries: Vec<TopicEntry>) -> Result<()> {
        self.check_insert_index(index)?;
        self.check_incoming(&entries, None)?;
        self.layout
            .check(&self.name, self.entries.len() + entries.len())?;

        debug!(tree = %self.name, count = entries.len(), index, "inserted entries");
        self.entries.splice(index..index, entries);
        Ok(())
    }

    /// Merge another tree's root entries in at `index`.
    pub fn insert_tree(&mut self, index: usize, other: &TocTree) -> Result<()> {
        self.insert_range(index, other.entries.clone())
    }

    /// Put `new` exactly where `old` is. Returns the detached `old` subtree.
    pub fn replace(&mut self, old: &TopicEntry, new: TopicEntry) -> Result<TopicEntry> {
        self.replace_range(old, vec![new])
    }

    /// Splice `entries` into `old`'s position: the first replacement takes
    /// `old`'s index and the rest follow in order.
    pub fn replace_range(&mut self, old: &TopicEntry, entries: Vec<TopicEntry>) -> Result<TopicEntry> {
        let index = self
            .index_of(old)
            .ok_or_else(|| HelpForgeError::not_found(&old.name))?;
        if entries.is_empty() {
            return Err(HelpForgeError::null_argument("replacement entries"));
        }
        self.check_incoming(&entries, Some(index))?;
        self.layout
            .check(&self.name, self.entries.len() - 1 + entries.len())?;

        debug!(
            tree = %self.name,
            entry = %old.name,
            index,
            count = entries.len(),
            "replaced entry"
        );
        let removed = self.entries.splice(index..=index, entries).next();
        removed.ok_or_else(|| HelpForgeError::not_found(&old.name))
    }

    /// Replace `old` with another tree's root entries.
    pub fn replace_with_tree(&mut self, old: &TopicEntry, other: &TocTree) -> Result<TopicEntry> {
        self.replace_range(old, other.entries.clone())
    }

    /// Detach and return the entry at `index` with its subtree.
    pub fn remove_at(&mut self, index: usize) -> Result<TopicEntry> {
        if index >= self.entries.len() {
            return Err(HelpForgeError::IndexOutOfRange {
                index,
                count: self.entries.len(),
            });
        }
        let removed = self.entries.remove(index);
        debug!(tree = %self.name, entry = %removed.name, index, "removed entry");
        Ok(removed)
    }

    /// Detach and return `entry`; fails with `NotFound` when it is not a
    /// current root-level member.
    pub fn remove(&mut self, entry: &TopicEntry) -> Result<TopicEntry> {
        let index = self
            .index_of(entry)
            .ok_or_else(|| HelpForgeError::not_found(&entry.name))?;
        self.remove_at(index)
    }

    /// Drop every root-level entry and its subtree.
    pub fn clear(&mut self) {
        debug!(tree = %self.name, count = self.entries.len(), "cleared entries");
        self.entries.clear();
    }

    /// Flag the first node named `name` (at any depth) as excluded or not.
    pub fn exclude_entry(&mut self, name: &str, excluded: bool) -> Result<()> {
        let found = self
            .entries
            .iter_mut()
            .any(|e| e.set_excluded_named(name, excluded));
        if !found {
            return Err(HelpForgeError::not_found(name));
        }
        debug!(tree = %self.name, entry = name, excluded, "changed exclusion");
        Ok(())
    }

    /// Deep copy of the root entries with excluded nodes left out.
    pub fn included_entries(&self) -> Vec<TopicEntry> {
        self.entries
            .iter()
            .filter_map(TopicEntry::without_excluded)
            .collect()
    }

    // -- Persistence ----------------------------------------------------------

    /// Snapshot of the tree in its persisted form.
    pub fn record(&self) -> TocRecord {
        TocRecord {
            schema_version: CURRENT_SCHEMA_VERSION,
            name: self.name.clone(),
            rooted: self.is_rooted(),
            excluded: self.excluded,
            entries: self.entries.clone(),
        }
    }

    /// Read the backing record into memory. A no-op when already loaded.
    #[instrument(skip(self), fields(tree = %self.name))]
    pub fn load(&mut self) -> Result<()> {
        if self.loaded {
            debug!("already loaded");
            return Ok(());
        }
        let path = self
            .backing
            .clone()
            .ok_or_else(|| HelpForgeError::invalid_state(format!("tree '{}' has no backing record", self.name)))?;

        let content = std::fs::read_to_string(&path).map_err(|e| HelpForgeError::io(&path, e))?;
        let record: TocRecord = serde_json::from_str(&content)
            .map_err(|e| HelpForgeError::corrupt(&path, format!("invalid TOC record: {e}")))?;

        if record.schema_version != CURRENT_SCHEMA_VERSION {
            return Err(HelpForgeError::corrupt(
                &path,
                format!(
                    "unsupported schema_version: {} (expected {})",
                    record.schema_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }
        validate_siblings(&record.entries)
            .map_err(|e| HelpForgeError::corrupt(&path, e.to_string()))?;

        let layout = if record.rooted {
            TocLayout::Rooted
        } else {
            TocLayout::Flat
        };
        layout
            .check(&record.name, record.entries.len())
            .map_err(|e| HelpForgeError::corrupt(&path, e.to_string()))?;

        if self.name.is_empty() {
            self.name = record.name;
        } else if self.name != record.name {
            warn!(record = %record.name, "record name differs from tree name");
        }
        self.layout = layout;
        self.excluded = record.excluded;
        self.entries = record.entries;
        self.loaded = true;

        info!(path = %path.display(), topics = self.topic_count(), "TOC loaded");
        Ok(())
    }

    /// Write the current entries to the backing record, atomically.
    #[instrument(skip(self), fields(tree = %self.name))]
    pub fn save(&self) -> Result<()> {
        let path = self
            .backing
            .as_deref()
            .ok_or_else(|| HelpForgeError::invalid_state(format!("tree '{}' has no backing record", self.name)))?;
        if self.name.is_empty() {
            return Err(HelpForgeError::null_argument("tree name"));
        }

        let json = serde_json::to_string_pretty(&self.record())
            .map_err(|e| HelpForgeError::Serialization(e.to_string()))?;
        write_atomic(path, json.as_bytes())?;

        info!(path = %path.display(), topics = self.topic_count(), "TOC saved");
        Ok(())
    }

    /// Discard the in-memory entries without persisting them.
    pub fn unload(&mut self) {
        debug!(tree = %self.name, "TOC unloaded");
        self.entries.clear();
        self.loaded = false;
    }

    /// Indented text rendering, one node per line; excluded nodes are marked.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}{}", self.name, if self.is_rooted() { " (rooted)" } else { "" });
        for entry in &self.entries {
            outline_entry(&mut out, entry, 1);
        }
        out
    }

    // -- Helpers --------------------------------------------------------------

    fn check_insert_index(&self, index: usize) -> Result<()> {
        if index > self.entries.len() {
            return Err(HelpForgeError::IndexOutOfRange {
                index,
                count: self.entries.len(),
            });
        }
        Ok(())
    }

    /// Validate a range against the current siblings (ignoring the one at
    /// `replacing`) and against itself.
    fn check_incoming(&self, incoming: &[TopicEntry], replacing: Option<usize>) -> Result<()> {
        validate_siblings(incoming)?;
        for entry in incoming {
            let clash = self
                .entries
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != replacing)
                .map(|(_, e)| e)
                .find(|e| e.name == entry.name || (!entry.id.is_empty() && e.id == entry.id));
            if let Some(existing) = clash {
                if existing.name == entry.name {
                    return Err(HelpForgeError::duplicate_name(&entry.name));
                }
                return Err(HelpForgeError::invalid_argument(format!(
                    "duplicate entry id '{}'",
                    entry.id
                )));
            }
        }
        Ok(())
    }
}

impl BuildObject for TocTree {
    fn key(&self) -> &str {
        &self.name
    }

    fn is_empty(&self) -> bool {
        TocTree::is_empty(self)
    }
}

fn outline_entry(out: &mut String, entry: &TopicEntry, depth: usize) {
    let marker = if entry.excluded { " [excluded]" } else { "" };
    let _ = writeln!(out, "{}{}{marker}", "  ".repeat(depth), entry.name);
    for child in entry.children() {
        outline_entry(out, child, depth + 1);
    }
}

/// Write to a hidden temp file beside `path`, then rename over it.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        std::fs::create_dir_all(dir).map_err(|e| HelpForgeError::io(dir, e))?;
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| HelpForgeError::invalid_argument(format!("not a file path: {}", path.display())))?
        .to_string_lossy();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, bytes).map_err(|e| HelpForgeError::io(&temp, e))?;
    if let Err(e) = std::fs::rename(&temp, path) {
        let _ = std::fs::remove_file(&temp);
        return Err(HelpForgeError::io(path, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
