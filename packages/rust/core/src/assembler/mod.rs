//! Format assemblers.
//!
//! An assembler binds one output format, the build settings and one finished
//! group, then writes the JSON artifact an external help compiler consumes:
//! the ordered list of processing components for that format plus the
//! group's TOC with excluded topics left out.

mod conceptual;
mod reference;

use std::collections::BTreeMap;
use std::io;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use helpforge_shared::{
    BuildFormat, BuildSettings, CURRENT_SCHEMA_VERSION, ContentGroup, FormatKind, GroupKind,
    HelpForgeError, Result, TopicEntry,
};

use crate::context::GroupContext;
use crate::toc::{TocTree, write_atomic};

pub use conceptual::ConceptualFormatAssembler;
pub use reference::ReferenceFormatAssembler;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Snapshot of a group whose TOC is complete.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedGroup {
    pub group: ContentGroup,
    pub toc: TocTree,
    pub properties: BTreeMap<String, String>,
}

impl FinishedGroup {
    pub fn new(context: &GroupContext, toc: TocTree) -> Self {
        Self {
            group: context.group().clone(),
            toc,
            properties: context
                .properties()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Group property, or `""` when unset.
    pub fn property(&self, key: &str) -> &str {
        self.properties.get(key).map(String::as_str).unwrap_or("")
    }
}

/// The three references an assembler works from. Bound together or not at
/// all.
#[derive(Debug, Clone, Default)]
pub struct AssemblerBinding {
    format: Option<Arc<BuildFormat>>,
    settings: Option<Arc<BuildSettings>>,
    group: Option<Arc<FinishedGroup>>,
}

impl AssemblerBinding {
    fn bound(&self) -> Option<(&BuildFormat, &BuildSettings, &FinishedGroup)> {
        Some((
            self.format.as_deref()?,
            self.settings.as_deref()?,
            self.group.as_deref()?,
        ))
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// One processing step of the help compiler's pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssemblerComponent {
    pub name: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub config: Value,
}

impl AssemblerComponent {
    pub fn new(name: impl Into<String>, config: Value) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupSection {
    pub id: String,
    pub name: String,
    pub kind: GroupKind,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TocSection {
    pub name: String,
    pub rooted: bool,
    pub entries: Vec<TopicEntry>,
}

/// The artifact written for one (format, group) pair.
#[derive(Debug, Clone, Serialize)]
pub struct AssemblerDocument {
    pub schema_version: u32,
    pub assembler: String,
    pub format: BuildFormat,
    pub output_folder: String,
    pub group: GroupSection,
    pub components: Vec<AssemblerComponent>,
    pub toc: TocSection,
}

/// Metadata for a single written artifact file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactMeta {
    pub filename: String,
    pub sha256: String,
    pub size_bytes: usize,
}

// ---------------------------------------------------------------------------
// FormatAssembler
// ---------------------------------------------------------------------------

/// Turns a finished group into a format-specific assembler artifact.
///
/// Implementations supply their binding storage and component list; the
/// lifecycle and writing are shared. An instance can be reused across groups
/// by uninitializing between them. Not reentrant.
pub trait FormatAssembler: Send {
    /// Short name recorded in the artifact.
    fn name(&self) -> &'static str;

    fn binding(&self) -> &AssemblerBinding;

    fn binding_mut(&mut self) -> &mut AssemblerBinding;

    /// Ordered processing components for the bound format.
    fn components(
        &self,
        format: &BuildFormat,
        settings: &BuildSettings,
        group: &FinishedGroup,
    ) -> Vec<AssemblerComponent>;

    /// Bind all three references. Does nothing when already initialized.
    fn initialize(
        &mut self,
        format: Arc<BuildFormat>,
        settings: Arc<BuildSettings>,
        group: Arc<FinishedGroup>,
    ) {
        if self.is_initialized() {
            debug!(assembler = self.name(), "assembler already initialized");
            return;
        }
        debug!(
            assembler = self.name(),
            format = %format.name,
            group = %group.group.id,
            "assembler initialized"
        );
        *self.binding_mut() = AssemblerBinding {
            format: Some(format),
            settings: Some(settings),
            group: Some(group),
        };
    }

    fn is_initialized(&self) -> bool {
        self.binding().bound().is_some()
    }

    /// Clear all three bindings.
    fn uninitialize(&mut self) {
        *self.binding_mut() = AssemblerBinding::default();
    }

    /// Build the artifact from the current bindings.
    fn document(&self) -> Result<AssemblerDocument> {
        let (format, settings, group) = self
            .binding()
            .bound()
            .ok_or_else(|| HelpForgeError::invalid_state(format!("{} assembler is not initialized", self.name())))?;

        Ok(AssemblerDocument {
            schema_version: CURRENT_SCHEMA_VERSION,
            assembler: self.name().to_string(),
            format: format.clone(),
            output_folder: format.format_folder().to_string(),
            group: GroupSection {
                id: group.group.id.clone(),
                name: group.group.name.clone(),
                kind: group.group.kind,
                properties: group.properties.clone(),
            },
            components: self.components(format, settings, group),
            toc: TocSection {
                name: group.toc.name().to_string(),
                rooted: group.toc.is_rooted(),
                entries: group.toc.included_entries(),
            },
        })
    }

    /// Serialize the artifact to `sink` as pretty JSON.
    fn write_assembler(&self, sink: &mut dyn io::Write) -> Result<()> {
        let bytes = render(&self.document()?)?;
        sink.write_all(&bytes)
            .map_err(|e| HelpForgeError::io("<assembler output>", e))
    }

    /// Write the artifact to `path` atomically and describe what was written.
    #[instrument(skip_all, fields(assembler = self.name(), path = %path.display()))]
    fn write_assembler_file(&self, path: &Path) -> Result<ArtifactMeta> {
        let bytes = render(&self.document()?)?;
        write_atomic(path, &bytes)?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let meta = ArtifactMeta {
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            sha256: format!("{:x}", hasher.finalize()),
            size_bytes: bytes.len(),
        };

        info!(size = meta.size_bytes, "wrote assembler artifact");
        Ok(meta)
    }
}

/// Assembler used for groups of `kind`.
pub fn assembler_for(kind: GroupKind) -> Box<dyn FormatAssembler> {
    match kind {
        GroupKind::Reference => Box::new(ReferenceFormatAssembler::default()),
        GroupKind::Conceptual | GroupKind::Generic => Box::new(ConceptualFormatAssembler::default()),
    }
}

fn render(document: &AssemblerDocument) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(document)
        .map_err(|e| HelpForgeError::Serialization(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

// ---------------------------------------------------------------------------
// Scope guard
// ---------------------------------------------------------------------------

/// Keeps an assembler initialized for as long as the guard lives.
pub struct AssemblerScope<'a, A: FormatAssembler + ?Sized> {
    assembler: &'a mut A,
}

impl<'a, A: FormatAssembler + ?Sized> AssemblerScope<'a, A> {
    pub fn bind(
        assembler: &'a mut A,
        format: Arc<BuildFormat>,
        settings: Arc<BuildSettings>,
        group: Arc<FinishedGroup>,
    ) -> Self {
        assembler.initialize(format, settings, group);
        Self { assembler }
    }
}

impl<A: FormatAssembler + ?Sized> Deref for AssemblerScope<'_, A> {
    type Target = A;

    fn deref(&self) -> &A {
        self.assembler
    }
}

impl<A: FormatAssembler + ?Sized> DerefMut for AssemblerScope<'_, A> {
    fn deref_mut(&mut self) -> &mut A {
        self.assembler
    }
}

impl<A: FormatAssembler + ?Sized> Drop for AssemblerScope<'_, A> {
    fn drop(&mut self) {
        self.assembler.uninitialize();
    }
}

// ---------------------------------------------------------------------------
// Components shared by both assemblers
// ---------------------------------------------------------------------------

/// Shared content files in resolution order, followed by the group's own.
fn shared_content(settings: &BuildSettings, group: &FinishedGroup) -> AssemblerComponent {
    let mut files = settings.shared_contents.clone();
    let own = group.property(crate::context::SHARED_CONTENT_FILE);
    if !own.is_empty() {
        files.push(own.to_string());
    }
    AssemblerComponent::new(
        "SharedContent",
        json!({
            "locale": settings.locale,
            "files": files,
            "contents_dir": settings.contents_dir,
        }),
    )
}

/// Help-viewer packaging data; only the `Mshc` format has any.
fn help_viewer(format: &BuildFormat, settings: &BuildSettings) -> Option<AssemblerComponent> {
    if format.kind != FormatKind::Mshc {
        return None;
    }
    let options = format.help_viewer.clone().unwrap_or_default();
    Some(AssemblerComponent::new(
        "HelpViewer",
        json!({
            "locale": settings.locale,
            "help_name": settings.help_name,
            "help_title": settings.help_title,
            "self_branded": options.self_branded,
            "topic_version": options.topic_version,
            "toc_file": options.toc_file,
            "toc_parent": options.toc_parent,
            "toc_parent_version": options.toc_parent_version,
        }),
    ))
}

fn save_output(format: &BuildFormat) -> AssemblerComponent {
    AssemblerComponent::new(
        "SaveOutput",
        json!({
            "folder": format.format_folder(),
            "extension": format.output_extension,
            "indent": format.indent,
            "omit_xml_declaration": format.omit_xml_declaration,
            "add_xhtml_namespace": format.add_xhtml_namespace,
        }),
    )
}

/// Settings for links that leave the help file.
fn external_links(format: &BuildFormat) -> Value {
    json!({
        "link_type": format.external_link_type,
        "link_target": format.external_link_target,
        "base_url": format.link_base_url.as_ref().map(|u| u.as_str()),
    })
}
