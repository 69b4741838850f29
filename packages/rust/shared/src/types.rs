//! Core domain types for helpforge builds.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::{HelpForgeError, Result};

/// Current schema version for persisted TOC records and assembler artifacts.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// TopicEntry
// ---------------------------------------------------------------------------

/// A single addressable node in a table of contents.
///
/// Children are exclusively owned and only reachable mutably through the
/// validated methods below, so sibling names stay unique at every level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicEntry {
    /// Identifier, unique among siblings.
    pub id: String,
    /// Display name, unique among direct siblings.
    pub name: String,
    /// Opaque locator of the rendered content (path or key into the sources).
    #[serde(default)]
    pub target: String,
    /// Excluded nodes stay in the structure but are omitted from output.
    #[serde(default, skip_serializing_if = "is_false")]
    pub excluded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<TopicEntry>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl TopicEntry {
    /// Create a leaf entry with an explicit id.
    pub fn new(id: impl Into<String>, name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            target: target.into(),
            excluded: false,
            children: Vec::new(),
        }
    }

    /// Create a leaf entry whose id is generated once, here.
    pub fn generated(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(Uuid::now_v7().to_string(), name, target)
    }

    /// Builder form of [`push_child`](Self::push_child) for a whole list.
    pub fn with_children(mut self, children: Vec<TopicEntry>) -> Result<Self> {
        for child in children {
            self.push_child(child)?;
        }
        Ok(self)
    }

    pub fn excluded(mut self, excluded: bool) -> Self {
        self.excluded = excluded;
        self
    }

    /// Append a child, rejecting sibling name collisions.
    pub fn push_child(&mut self, child: TopicEntry) -> Result<()> {
        child.validate()?;
        check_sibling(&self.children, &child)?;
        self.children.push(child);
        Ok(())
    }

    pub fn children(&self) -> &[TopicEntry] {
        &self.children
    }

    /// Direct child lookup by name.
    pub fn child(&self, name: &str) -> Option<&TopicEntry> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Pre-order search of this node's descendants (not the node itself).
    pub fn find_descendant(&self, name: &str) -> Option<&TopicEntry> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(name) {
                return Some(found);
            }
        }
        None
    }

    /// Set the exclusion flag on this node or the first descendant named
    /// `name` (pre-order). Returns whether a node was found.
    pub fn set_excluded_named(&mut self, name: &str, excluded: bool) -> bool {
        if self.name == name {
            self.excluded = excluded;
            return true;
        }
        self.children
            .iter_mut()
            .any(|c| c.set_excluded_named(name, excluded))
    }

    /// Deep copy with every excluded node (and its subtree) removed.
    /// Returns `None` when this node itself is excluded.
    pub fn without_excluded(&self) -> Option<TopicEntry> {
        if self.excluded {
            return None;
        }
        Some(TopicEntry {
            id: self.id.clone(),
            name: self.name.clone(),
            target: self.target.clone(),
            excluded: false,
            children: self
                .children
                .iter()
                .filter_map(TopicEntry::without_excluded)
                .collect(),
        })
    }

    /// Number of nodes in this subtree, including this one.
    pub fn topic_count(&self) -> usize {
        1 + self.children.iter().map(TopicEntry::topic_count).sum::<usize>()
    }

    /// Check this subtree: non-empty names, unique sibling names and ids.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(HelpForgeError::null_argument("entry name"));
        }
        validate_siblings(&self.children)
    }
}

/// Reject `candidate` if a sibling in `siblings` already uses its name or id.
pub fn check_sibling(siblings: &[TopicEntry], candidate: &TopicEntry) -> Result<()> {
    if candidate.name.is_empty() {
        return Err(HelpForgeError::null_argument("entry name"));
    }
    if siblings.iter().any(|s| s.name == candidate.name) {
        return Err(HelpForgeError::duplicate_name(&candidate.name));
    }
    if !candidate.id.is_empty() && siblings.iter().any(|s| s.id == candidate.id) {
        return Err(HelpForgeError::invalid_argument(format!(
            "duplicate entry id '{}'",
            candidate.id
        )));
    }
    Ok(())
}

/// Validate a sibling list and every subtree below it.
pub fn validate_siblings(entries: &[TopicEntry]) -> Result<()> {
    let mut names = HashSet::with_capacity(entries.len());
    let mut ids = HashSet::with_capacity(entries.len());
    for entry in entries {
        entry.validate()?;
        if !names.insert(entry.name.as_str()) {
            return Err(HelpForgeError::duplicate_name(&entry.name));
        }
        if !entry.id.is_empty() && !ids.insert(entry.id.as_str()) {
            return Err(HelpForgeError::invalid_argument(format!(
                "duplicate entry id '{}'",
                entry.id
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ContentGroup
// ---------------------------------------------------------------------------

/// The engine kind that builds a group's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    /// API reference material; its TOC resolves to a single root.
    Reference,
    /// Conceptual topics; a flat forest of top-level entries.
    Conceptual,
    /// Any other content; derives no group properties.
    Generic,
}

impl std::fmt::Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reference => write!(f, "reference"),
            Self::Conceptual => write!(f, "conceptual"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

/// A partition of documentation content, supplied by the build project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentGroup {
    pub id: String,
    pub name: String,
    pub kind: GroupKind,
    /// Excluded groups are built but left out of the merged TOC.
    #[serde(default)]
    pub excluded: bool,
    /// Location of the group's persisted TOC record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toc_file: Option<PathBuf>,
}

impl ContentGroup {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: GroupKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            excluded: false,
            toc_file: None,
        }
    }

    pub fn with_toc_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.toc_file = Some(path.into());
        self
    }
}

// ---------------------------------------------------------------------------
// BuildFormat
// ---------------------------------------------------------------------------

/// Output format family, each consumed by a different help compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    /// Single-page web help; nothing to compile.
    Web,
    /// HTML Help 1.x (`.chm`).
    Chm,
    /// HTML Help 2.x (`.hxs`).
    Hxs,
    /// Help Viewer 1.x (`.mshc`).
    Mshc,
    /// User-defined format, identified by its name.
    Custom,
}

impl FormatKind {
    fn default_folder(self) -> &'static str {
        match self {
            Self::Web => "html",
            Self::Chm => "htmlhelp1",
            Self::Hxs => "htmlhelp2",
            Self::Mshc => "mshc",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Web => write!(f, "web"),
            Self::Chm => write!(f, "chm"),
            Self::Hxs => write!(f, "hxs"),
            Self::Mshc => write!(f, "mshc"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// How links to other topics are emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    None,
    #[default]
    Local,
    Index,
    Online,
}

/// Browser target for external links.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkTarget {
    #[default]
    Blank,
    #[serde(rename = "self")]
    SameFrame,
    Parent,
    Top,
}

/// Help Viewer data written for the `mshc` format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpViewerOptions {
    #[serde(default = "default_true")]
    pub self_branded: bool,
    #[serde(default = "default_topic_version")]
    pub topic_version: u32,
    #[serde(default = "default_viewer_toc_file")]
    pub toc_file: String,
    #[serde(default)]
    pub toc_parent: String,
    #[serde(default = "default_topic_version")]
    pub toc_parent_version: u32,
}

impl Default for HelpViewerOptions {
    fn default() -> Self {
        Self {
            self_branded: true,
            topic_version: default_topic_version(),
            toc_file: default_viewer_toc_file(),
            toc_parent: String::new(),
            toc_parent_version: default_topic_version(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_topic_version() -> u32 {
    100
}
fn default_viewer_toc_file() -> String {
    "toc.json".into()
}
fn default_output_extension() -> String {
    ".htm".into()
}

/// One `[[formats]]` entry: a target output format and its compiler options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildFormat {
    pub kind: FormatKind,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Folder under the output directory; defaults per kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_folder: Option<String>,
    #[serde(default = "default_output_extension")]
    pub output_extension: String,
    #[serde(default)]
    pub indent: bool,
    #[serde(default = "default_true")]
    pub omit_xml_declaration: bool,
    #[serde(default)]
    pub add_xhtml_namespace: bool,
    #[serde(default)]
    pub link_type: LinkType,
    #[serde(default = "default_external_link_type")]
    pub external_link_type: LinkType,
    #[serde(default)]
    pub external_link_target: LinkTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_base_url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_viewer: Option<HelpViewerOptions>,
}

fn default_external_link_type() -> LinkType {
    LinkType::Online
}

impl BuildFormat {
    pub fn new(kind: FormatKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            enabled: true,
            output_folder: None,
            output_extension: default_output_extension(),
            indent: false,
            omit_xml_declaration: true,
            add_xhtml_namespace: false,
            link_type: LinkType::default(),
            external_link_type: default_external_link_type(),
            external_link_target: LinkTarget::default(),
            link_base_url: None,
            help_viewer: (kind == FormatKind::Mshc).then(HelpViewerOptions::default),
        }
    }

    /// Folder the compiled topics are saved into.
    pub fn format_folder(&self) -> &str {
        self.output_folder
            .as_deref()
            .unwrap_or_else(|| self.kind.default_folder())
    }

    /// Whether an external compiler runs over the assembled output.
    pub fn is_compilable(&self) -> bool {
        matches!(self.kind, FormatKind::Chm | FormatKind::Hxs | FormatKind::Mshc)
    }

    /// Check the format name; custom formats need a plain identifier.
    pub fn validate(&self) -> Result<()> {
        static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"^[A-Za-z][A-Za-z0-9_.-]*$").expect("valid regex")
        });

        if self.name.trim().is_empty() {
            return Err(HelpForgeError::null_argument("format name"));
        }
        if self.kind == FormatKind::Custom && !NAME_RE.is_match(&self.name) {
            return Err(HelpForgeError::invalid_argument(format!(
                "custom format name '{}' must start with a letter and contain only letters, digits, '.', '_' or '-'",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str) -> TopicEntry {
        TopicEntry::new(format!("id-{name}"), name, format!("topics/{name}.md"))
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = TopicEntry::generated("A", "a.md");
        let b = TopicEntry::generated("A", "a.md");
        assert_ne!(a.id, b.id);
        assert!(!a.id.is_empty());
    }

    #[test]
    fn push_child_rejects_duplicate_names() {
        let mut parent = leaf("Root");
        parent.push_child(leaf("A")).unwrap();
        let mut dup = leaf("A");
        dup.id = "other".into();
        let err = parent.push_child(dup).unwrap_err();
        assert!(matches!(err, HelpForgeError::DuplicateName { ref name } if name == "A"));
        assert_eq!(parent.children().len(), 1);
    }

    #[test]
    fn push_child_rejects_empty_name() {
        let mut parent = leaf("Root");
        let err = parent.push_child(TopicEntry::new("x", "", "")).unwrap_err();
        assert!(matches!(err, HelpForgeError::NullArgument { .. }));
    }

    #[test]
    fn find_descendant_is_preorder() {
        let root = leaf("Root")
            .with_children(vec![
                leaf("A")
                    .with_children(vec![TopicEntry::new("inner", "Target", "")])
                    .unwrap(),
                leaf("Target"),
            ])
            .unwrap();

        // The node under A is visited before its parent's later sibling.
        let found = root.find_descendant("Target").unwrap();
        assert_eq!(found.id, "inner");
        assert_eq!(root.child("Target").unwrap().id, "id-Target");
        assert!(root.find_descendant("Missing").is_none());
    }

    #[test]
    fn without_excluded_prunes_subtrees() {
        let mut root = leaf("Root")
            .with_children(vec![
                leaf("Keep"),
                leaf("Drop").with_children(vec![leaf("Inner")]).unwrap(),
            ])
            .unwrap();
        assert!(root.set_excluded_named("Drop", true));
        assert!(!root.set_excluded_named("Nope", true));

        let pruned = root.without_excluded().unwrap();
        assert_eq!(pruned.topic_count(), 2);
        assert_eq!(root.topic_count(), 4);

        root.excluded = true;
        assert!(root.without_excluded().is_none());
    }

    #[test]
    fn topic_entry_serialization_skips_defaults() {
        let entry = leaf("A");
        let json = serde_json::to_string(&entry).expect("serialize");
        assert!(!json.contains("excluded"));
        assert!(!json.contains("children"));

        let parsed: TopicEntry = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, entry);
    }

    #[test]
    fn validate_siblings_detects_nested_duplicates() {
        let json = r#"{"id":"r","name":"R","children":[
            {"id":"a","name":"A"},{"id":"b","name":"A"}]}"#;
        let entry: TopicEntry = serde_json::from_str(json).expect("deserialize");
        assert!(matches!(
            entry.validate(),
            Err(HelpForgeError::DuplicateName { .. })
        ));
    }

    #[test]
    fn format_defaults_per_kind() {
        let web = BuildFormat::new(FormatKind::Web, "WebHelp");
        assert_eq!(web.format_folder(), "html");
        assert!(!web.is_compilable());
        assert!(web.help_viewer.is_none());

        let mshc = BuildFormat::new(FormatKind::Mshc, "HelpViewer");
        assert!(mshc.is_compilable());
        assert_eq!(mshc.help_viewer.as_ref().unwrap().topic_version, 100);
    }

    #[test]
    fn custom_format_name_validation() {
        assert!(BuildFormat::new(FormatKind::Custom, "epub-3").validate().is_ok());
        assert!(BuildFormat::new(FormatKind::Custom, "3pub").validate().is_err());
        assert!(matches!(
            BuildFormat::new(FormatKind::Web, "  ").validate(),
            Err(HelpForgeError::NullArgument { .. })
        ));
    }

    #[test]
    fn toc_fixture_validates() {
        let fixture = std::fs::read_to_string("../../../fixtures/json/toc.fixture.json")
            .expect("read fixture");
        let value: serde_json::Value = serde_json::from_str(&fixture).expect("parse fixture");
        let entries: Vec<TopicEntry> =
            serde_json::from_value(value["entries"].clone()).expect("deserialize entries");
        assert_eq!(entries.len(), 3);
        assert!(validate_siblings(&entries).is_ok());
        assert_eq!(entries[0].children().len(), 2);
    }
}
