//! Session-wide registry of group TOCs.
//!
//! Holds every group's [`TocTree`] in build order, keyed by tree name. Names
//! are unique within a session; topic lookups span all registered trees.

use tracing::{debug, info, instrument, warn};

use helpforge_shared::{HelpForgeError, Result, TopicEntry};

use crate::merge::merge_master;
use crate::toc::TocTree;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TocRegistry {
    trees: Vec<TocTree>,
}

impl TocRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tree`. Fails with `NullArgument` for an unnamed tree and
    /// `DuplicateName` when a tree of that name is already registered.
    pub fn add(&mut self, tree: TocTree) -> Result<()> {
        if tree.name().is_empty() {
            return Err(HelpForgeError::null_argument("tree name"));
        }
        if self.contains(tree.name()) {
            return Err(HelpForgeError::duplicate_name(tree.name()));
        }
        debug!(tree = %tree.name(), "registered TOC");
        self.trees.push(tree);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.trees.iter().position(|t| t.name() == name)
    }

    pub fn get(&self, name: &str) -> Option<&TocTree> {
        self.trees.iter().find(|t| t.name() == name)
    }

    /// Mutable access to a registered tree. Tree names cannot change through
    /// `TocTree`'s API, so the registry's keys stay valid.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut TocTree> {
        self.trees.iter_mut().find(|t| t.name() == name)
    }

    /// Registered trees, in registration order.
    pub fn trees(&self) -> &[TocTree] {
        &self.trees
    }

    pub fn remove(&mut self, name: &str) -> Option<TocTree> {
        let index = self.index_of(name)?;
        Some(self.trees.remove(index))
    }

    pub fn clear(&mut self) {
        self.trees.clear();
    }

    // -- Lookup ---------------------------------------------------------------

    /// First topic named `name` and the tree that owns it. Root-level
    /// entries of every tree are checked before any deeper node.
    pub fn find_topic(&self, name: &str) -> Option<(&TocTree, &TopicEntry)> {
        if name.is_empty() {
            return None;
        }
        self.trees
            .iter()
            .find_map(|t| t.get_named(name).map(|e| (t, e)))
            .or_else(|| {
                self.trees
                    .iter()
                    .find_map(|t| t.find(name, true).map(|e| (t, e)))
            })
    }

    /// Tree containing a topic named `name` at any depth.
    pub fn group_of(&self, name: &str) -> Option<&TocTree> {
        self.trees.iter().find(|t| t.find(name, true).is_some())
    }

    // -- Persistence ----------------------------------------------------------

    /// Load every tree that has a backing record. Already loaded trees are
    /// left as they are.
    #[instrument(skip_all, fields(trees = self.trees.len()))]
    pub fn load_all(&mut self) -> Result<()> {
        for tree in &mut self.trees {
            if tree.backing().is_none() {
                warn!(tree = %tree.name(), "no TOC record to load");
                continue;
            }
            tree.load()?;
        }
        info!(topics = self.topic_count(), "loaded group TOCs");
        Ok(())
    }

    /// Save every tree that has a backing record.
    #[instrument(skip_all, fields(trees = self.trees.len()))]
    pub fn save_all(&self) -> Result<()> {
        let mut saved = 0;
        for tree in self.trees.iter().filter(|t| t.backing().is_some()) {
            tree.save()?;
            saved += 1;
        }
        debug!(saved, "saved group TOCs");
        Ok(())
    }

    pub fn unload_all(&mut self) {
        for tree in &mut self.trees {
            tree.unload();
        }
    }

    pub fn topic_count(&self) -> usize {
        self.trees.iter().map(TocTree::topic_count).sum()
    }

    /// Merge every non-excluded tree into a master tree named `name`.
    pub fn merge(&self, name: impl Into<String>, root_title: Option<&str>) -> Result<TocTree> {
        let refs: Vec<&TocTree> = self.trees.iter().collect();
        merge_master(name, &refs, root_title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::toc::TocLayout;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hf-registry-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn guide() -> TocTree {
        let mut tree = TocTree::new("guide", TocLayout::Flat);
        tree.add(
            TopicEntry::new("start", "Start", "")
                .with_children(vec![TopicEntry::new("install", "Install", "")])
                .unwrap(),
        )
        .unwrap();
        tree
    }

    fn api() -> TocTree {
        let mut tree = TocTree::new("api", TocLayout::Rooted);
        tree.add(
            TopicEntry::new("ns", "Sample", "")
                .with_children(vec![TopicEntry::new("install-api", "Install", "")])
                .unwrap(),
        )
        .unwrap();
        tree
    }

    #[test]
    fn names_are_unique() {
        let mut registry = TocRegistry::new();
        registry.add(guide()).unwrap();
        assert!(matches!(
            registry.add(TocTree::new("guide", TocLayout::Rooted)),
            Err(HelpForgeError::DuplicateName { .. })
        ));
        assert!(matches!(
            registry.add(TocTree::new("", TocLayout::Flat)),
            Err(HelpForgeError::NullArgument { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_by_name_and_position() {
        let mut registry = TocRegistry::new();
        registry.add(guide()).unwrap();
        registry.add(api()).unwrap();

        assert_eq!(registry.index_of("api"), Some(1));
        assert!(registry.get("missing").is_none());
        registry.get_mut("api").unwrap().set_excluded(true);
        assert!(registry.get("api").unwrap().is_excluded());

        let removed = registry.remove("guide").unwrap();
        assert_eq!(removed.name(), "guide");
        assert_eq!(registry.index_of("api"), Some(0));
        assert!(registry.remove("guide").is_none());
    }

    #[test]
    fn find_topic_prefers_root_entries() {
        let mut registry = TocRegistry::new();
        registry.add(guide()).unwrap();
        registry.add(api()).unwrap();

        let (tree, entry) = registry.find_topic("Sample").unwrap();
        assert_eq!(tree.name(), "api");
        assert_eq!(entry.id, "ns");

        // Same name nested in both trees: first tree in order wins.
        let (tree, entry) = registry.find_topic("Install").unwrap();
        assert_eq!(tree.name(), "guide");
        assert_eq!(entry.id, "install");

        assert!(registry.find_topic("Nowhere").is_none());
        assert!(registry.find_topic("").is_none());
    }

    #[test]
    fn group_of_finds_owner() {
        let mut registry = TocRegistry::new();
        registry.add(guide()).unwrap();
        registry.add(api()).unwrap();
        assert_eq!(registry.group_of("Sample").unwrap().name(), "api");
        assert_eq!(registry.group_of("Start").unwrap().name(), "guide");
        assert!(registry.group_of("Nowhere").is_none());
    }

    #[test]
    fn save_all_then_load_all() {
        let tmp = temp_dir();
        let mut registry = TocRegistry::new();
        registry.add(guide().with_backing(tmp.join("guide.json"))).unwrap();
        registry.add(api().with_backing(tmp.join("api.json"))).unwrap();
        registry.add(TocTree::new("memory", TocLayout::Flat)).unwrap();
        registry.save_all().unwrap();
        assert!(!tmp.join("memory.json").exists());

        let mut reloaded = TocRegistry::new();
        reloaded.add(TocTree::new("guide", TocLayout::Flat).with_backing(tmp.join("guide.json"))).unwrap();
        reloaded.add(TocTree::new("api", TocLayout::Flat).with_backing(tmp.join("api.json"))).unwrap();
        reloaded.add(TocTree::new("memory", TocLayout::Flat)).unwrap();
        reloaded.load_all().unwrap();

        assert_eq!(reloaded.get("guide"), registry.get("guide"));
        assert!(reloaded.get("api").unwrap().is_rooted());
        assert!(!reloaded.get("memory").unwrap().is_loaded());
        assert_eq!(reloaded.topic_count(), 4);

        reloaded.unload_all();
        assert_eq!(reloaded.topic_count(), 0);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn load_all_reports_missing_record() {
        let tmp = temp_dir();
        let mut registry = TocRegistry::new();
        registry
            .add(TocTree::new("gone", TocLayout::Flat).with_backing(tmp.join("gone.json")))
            .unwrap();
        assert!(matches!(registry.load_all(), Err(HelpForgeError::IoFailure { .. })));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn merge_uses_registration_order() {
        let mut registry = TocRegistry::new();
        registry.add(api()).unwrap();
        registry.add(guide()).unwrap();
        let master = registry.merge("master", Some("API")).unwrap();
        let names: Vec<&str> = master.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Start", "API"]);
    }
}
