//! Per-group build state.
//!
//! A [`GroupContext`] carries the string properties and cached values one
//! content group accumulates while it is being built, plus the session it is
//! bound to for the duration of its active build phase.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

use helpforge_shared::{ContentGroup, GroupKind, HelpForgeError, Result};

use crate::object::BuildObject;

/// Property key holding the index token the group was created with.
pub const GROUP_INDEX: &str = "$GroupIndex";
/// Property key of the group's TOC file name.
pub const TOC_FILE: &str = "$TocFile";
/// Property key of the group's shared content file name.
pub const SHARED_CONTENT_FILE: &str = "$SharedContentFile";
/// Property key of the reflection data file (reference groups).
pub const REFLECTION_FILE: &str = "$ReflectionFile";
/// Property keys of the topic working directories (conceptual groups).
pub const DDUE_XML_DIR: &str = "$DdueXmlDir";
pub const DDUE_HTML_DIR: &str = "$DdueHtmlDir";
pub const DDUE_MEDIA: &str = "$DdueMedia";

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One run of the build, shared read-only by every group context.
#[derive(Debug, Clone)]
pub struct BuildSession {
    pub id: Uuid,
    pub working_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    properties: HashMap<String, String>,
}

impl BuildSession {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::now_v7(),
            working_dir: working_dir.into(),
            started_at: Utc::now(),
            properties: HashMap::new(),
        }
    }

    /// Builder-style session-wide property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Session-wide property, or `""` when unset.
    pub fn property(&self, key: &str) -> &str {
        self.properties.get(key).map(String::as_str).unwrap_or("")
    }
}

/// Hook run once per group, after its context is initialized and before its
/// TOC is populated.
pub trait BuildConfiguration: Send + Sync {
    fn name(&self) -> &str;

    fn configure(
        &self,
        session: &BuildSession,
        context: &mut GroupContext,
        group: &ContentGroup,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Property derivation
// ---------------------------------------------------------------------------

/// Kind-specific derivation of context properties from an index token.
pub trait PropertyDerivation: Send + Sync {
    fn derive(&self, token: &str) -> Vec<(&'static str, String)>;
}

struct ReferenceProperties;
struct ConceptualProperties;
struct GenericProperties;

impl PropertyDerivation for ReferenceProperties {
    fn derive(&self, token: &str) -> Vec<(&'static str, String)> {
        vec![
            (GROUP_INDEX, token.to_string()),
            (TOC_FILE, format!("ApiToc{token}.json")),
            (SHARED_CONTENT_FILE, format!("ApiSharedContent{token}.json")),
            (REFLECTION_FILE, format!("Reflection{token}.json")),
        ]
    }
}

impl PropertyDerivation for ConceptualProperties {
    fn derive(&self, token: &str) -> Vec<(&'static str, String)> {
        vec![
            (GROUP_INDEX, token.to_string()),
            (TOC_FILE, format!("TopicsToc{token}.json")),
            (SHARED_CONTENT_FILE, format!("TopicsSharedContent{token}.json")),
            (DDUE_XML_DIR, format!("DdueXml{token}")),
            (DDUE_HTML_DIR, format!("DdueHtml{token}")),
            (DDUE_MEDIA, format!("DdueMedia{token}")),
        ]
    }
}

impl PropertyDerivation for GenericProperties {
    fn derive(&self, _token: &str) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// Derivation used by groups of `kind`.
pub fn derivation_for(kind: GroupKind) -> &'static dyn PropertyDerivation {
    match kind {
        GroupKind::Reference => &ReferenceProperties,
        GroupKind::Conceptual => &ConceptualProperties,
        GroupKind::Generic => &GenericProperties,
    }
}

// ---------------------------------------------------------------------------
// GroupContext
// ---------------------------------------------------------------------------

/// Mutable build-time state of one content group.
///
/// Missing keys read as empty (`""` for properties, `None` for values); they
/// never fail. Clones copy both stores but never the session binding or the
/// resolved-path cache, so a clone always starts uninitialized.
#[derive(Debug)]
pub struct GroupContext {
    context_id: String,
    group: Arc<ContentGroup>,
    session: Option<Arc<BuildSession>>,
    properties: HashMap<String, String>,
    objects: HashMap<String, Value>,
    /// Paths from [`GroupContext::resolved_path`], valid for the current
    /// session binding and property values only.
    resolved: HashMap<String, PathBuf>,
    initialized: bool,
}

impl GroupContext {
    /// Context identified by the group's own id.
    pub fn new(group: Arc<ContentGroup>) -> Self {
        Self {
            context_id: group.id.clone(),
            group,
            session: None,
            properties: HashMap::new(),
            objects: HashMap::new(),
            resolved: HashMap::new(),
            initialized: false,
        }
    }

    /// Context with an explicit id; an empty id falls back to the group's.
    pub fn with_id(group: Arc<ContentGroup>, context_id: impl Into<String>) -> Self {
        let context_id = context_id.into();
        let mut context = Self::new(group);
        if !context_id.is_empty() {
            context.context_id = context_id;
        }
        context
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn group(&self) -> &ContentGroup {
        &self.group
    }

    pub fn session(&self) -> Option<&BuildSession> {
        self.session.as_deref()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Bind to `session`. A second call keeps the first binding.
    #[instrument(skip_all, fields(context = %self.context_id, session = %session.id))]
    pub fn initialize(&mut self, session: Arc<BuildSession>) {
        if self.initialized {
            debug!("context already initialized");
            return;
        }
        self.session = Some(session);
        self.initialized = true;
        debug!("context initialized");
    }

    /// Drop the session binding. Safe to call repeatedly.
    pub fn uninitialize(&mut self) {
        if self.initialized {
            debug!(context = %self.context_id, "context uninitialized");
        }
        self.session = None;
        self.resolved.clear();
        self.initialized = false;
    }

    // -- Properties -----------------------------------------------------------

    pub fn property(&self, key: &str) -> &str {
        self.properties.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(HelpForgeError::invalid_argument("property key must not be empty"));
        }
        self.resolved.remove(&key);
        self.properties.insert(key, value.into());
        Ok(())
    }

    /// Remove a property, returning its previous value.
    pub fn remove_property(&mut self, key: &str) -> Option<String> {
        self.resolved.remove(key);
        self.properties.remove(key)
    }

    /// All properties, sorted by key.
    pub fn properties(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<_> = self
            .properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    // -- Objects --------------------------------------------------------------

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.objects.get(key)
    }

    pub fn set_value(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(HelpForgeError::invalid_argument("object key must not be empty"));
        }
        self.objects.insert(key, value);
        Ok(())
    }

    /// Derive the kind-specific properties for index token `token`.
    /// An empty token derives nothing.
    pub fn create_properties(&mut self, token: &str) {
        if token.is_empty() {
            return;
        }
        let derived = derivation_for(self.group.kind).derive(token);
        debug!(
            context = %self.context_id,
            kind = %self.group.kind,
            count = derived.len(),
            "derived group properties"
        );
        for (key, value) in derived {
            self.resolved.remove(key);
            self.properties.insert(key.to_string(), value);
        }
    }

    /// Path of the file or directory named by property `key`, under the
    /// session's working directory. The result is cached until the property
    /// changes or the context is uninitialized.
    pub fn resolved_path(&mut self, key: &str) -> Result<PathBuf> {
        if let Some(cached) = self.resolved.get(key) {
            return Ok(cached.clone());
        }

        let session = self.session.as_ref().ok_or_else(|| {
            HelpForgeError::invalid_state(format!("context '{}' is not initialized", self.context_id))
        })?;
        let relative = self.property(key);
        if relative.is_empty() {
            return Err(HelpForgeError::not_found(key));
        }

        let path = session.working_dir.join(relative);
        self.resolved.insert(key.to_string(), path.clone());
        Ok(path)
    }
}

impl Clone for GroupContext {
    fn clone(&self) -> Self {
        Self {
            context_id: self.context_id.clone(),
            group: Arc::clone(&self.group),
            session: None,
            properties: self.properties.clone(),
            objects: self.objects.clone(),
            resolved: HashMap::new(),
            initialized: false,
        }
    }
}

impl PartialEq for GroupContext {
    fn eq(&self, other: &Self) -> bool {
        self.context_id == other.context_id
            && self.group == other.group
            && self.properties == other.properties
            && self.objects == other.objects
    }
}

impl BuildObject for GroupContext {
    fn key(&self) -> &str {
        &self.context_id
    }

    fn is_empty(&self) -> bool {
        self.context_id.is_empty()
    }
}
