//! End-to-end `build` pipeline: groups → contexts → TOCs → master TOC →
//! assembler artifacts → help compiler.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use helpforge_shared::{AppConfig, ContentGroup, GroupKind, HelpForgeError, Result};

use crate::assembler::{ArtifactMeta, AssemblerScope, FinishedGroup, FormatAssembler, assembler_for};
use crate::context::{BuildConfiguration, BuildSession, GroupContext, TOC_FILE};
use crate::registry::TocRegistry;
use crate::toc::TocTree;

/// Context property holding the path of the artifact handed to the tool.
pub const ASSEMBLER_FILE: &str = "$AssemblerFile";
/// Context property holding the name of the format being built.
pub const FORMAT_NAME: &str = "$FormatName";

/// File name of the merged master TOC in the output directory.
pub const MASTER_TOC_FILE: &str = "toc.json";

/// External help compiler invoked once per written artifact.
pub trait BuildTool: Send + Sync {
    fn name(&self) -> &str;

    /// Compile the artifact named by the context's `$AssemblerFile`
    /// property. Returns `false` on failure.
    fn run(&self, context: &GroupContext) -> bool;
}

/// Tool that accepts every artifact without doing anything.
pub struct NoopTool;

impl BuildTool for NoopTool {
    fn name(&self) -> &str {
        "none"
    }

    fn run(&self, _context: &GroupContext) -> bool {
        true
    }
}

/// One artifact written during a build.
#[derive(Debug, Clone, Serialize)]
pub struct BuiltArtifact {
    pub format: String,
    pub group: String,
    pub path: PathBuf,
    pub meta: ArtifactMeta,
    pub compiled: bool,
}

/// Result of [`build_help`].
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub master_toc: PathBuf,
    pub topic_count: usize,
    pub artifacts: Vec<BuiltArtifact>,
    #[serde(skip)]
    pub elapsed: std::time::Duration,
}

impl BuildReport {
    /// Whether the tool accepted every artifact.
    pub fn succeeded(&self) -> bool {
        self.artifacts.iter().all(|a| a.compiled)
    }
}

/// Progress callback for reporting build status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a group's TOC has been loaded.
    fn group_loaded(&self, group: &str, current: usize, total: usize);
    /// Called when an artifact has been written and compiled.
    fn artifact_built(&self, artifact: &BuiltArtifact, current: usize, total: usize);
    /// Called when the build completes.
    fn done(&self, report: &BuildReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn group_loaded(&self, _group: &str, _current: usize, _total: usize) {}
    fn artifact_built(&self, _artifact: &BuiltArtifact, _current: usize, _total: usize) {}
    fn done(&self, _report: &BuildReport) {}
}

/// Run the full build for every configured group and enabled format.
///
/// 1. Session and group contexts
/// 2. Load group TOCs
/// 3. Merge and save the master TOC
/// 4. Assemble artifacts and hand them to `tool`
/// 5. Release contexts and trees
#[instrument(skip_all, fields(help = %config.settings.help_name, groups = config.groups.len()))]
pub async fn build_help(
    config: &AppConfig,
    configurations: &[Box<dyn BuildConfiguration>],
    tool: &dyn BuildTool,
    progress: &dyn ProgressReporter,
) -> Result<BuildReport> {
    let start = Instant::now();
    config.validate()?;
    if config.groups.is_empty() {
        return Err(HelpForgeError::invalid_state("no content groups configured"));
    }
    let settings = Arc::new(config.settings.clone());

    // --- Phase 1: Session / contexts ---
    progress.phase("Initializing groups");
    std::fs::create_dir_all(&settings.working_dir)
        .map_err(|e| HelpForgeError::io(&settings.working_dir, e))?;
    let session = Arc::new(
        BuildSession::new(&settings.working_dir)
            .with_property("$HelpName", &settings.help_name)
            .with_property("$HelpTitle", &settings.help_title)
            .with_property("$Locale", &settings.locale),
    );
    info!(session = %session.id, "starting build");

    let groups: Vec<Arc<ContentGroup>> = config.groups.iter().cloned().map(Arc::new).collect();
    let mut contexts = Vec::with_capacity(groups.len());
    for (index, group) in groups.iter().enumerate() {
        let mut context = GroupContext::new(Arc::clone(group));
        context.initialize(Arc::clone(&session));
        context.create_properties(&(index + 1).to_string());
        for configuration in configurations {
            debug!(group = %group.id, configuration = configuration.name(), "configuring group");
            configuration.configure(&session, &mut context, group)?;
        }
        contexts.push(context);
    }

    // --- Phase 2: Load TOCs ---
    progress.phase("Loading tables of contents");
    let mut registry = load_registry(&groups, progress).await?;

    // --- Phase 3: Master TOC ---
    progress.phase("Merging tables of contents");
    for context in &mut contexts {
        let target = if context.property(TOC_FILE).is_empty() {
            None
        } else {
            Some(context.resolved_path(TOC_FILE)?)
        };
        if let Some(tree) = registry.get_mut(context.context_id()) {
            tree.set_backing(target);
        }
    }
    registry.save_all()?;

    let root_title = settings
        .is_root_namespace_rooted()
        .then_some(settings.root_namespace_title.as_str());
    let master = registry
        .merge(&settings.help_name, root_title)?
        .with_backing(settings.output_dir.join(MASTER_TOC_FILE));
    master.save()?;
    let topic_count = master.topic_count();

    // --- Phase 4: Assemble ---
    progress.phase("Assembling output");
    let formats: Vec<_> = config.enabled_formats().cloned().map(Arc::new).collect();
    let finished: Vec<Arc<FinishedGroup>> = contexts
        .iter()
        .zip(registry.trees())
        .map(|(context, tree)| Arc::new(FinishedGroup::new(context, tree.clone())))
        .collect();

    let total = formats.len() * contexts.len();
    let mut assemblers: HashMap<GroupKind, Box<dyn FormatAssembler>> = HashMap::new();
    let mut artifacts = Vec::with_capacity(total);

    for format in &formats {
        for (context, group) in contexts.iter_mut().zip(&finished) {
            let path = settings
                .output_dir
                .join(format.format_folder())
                .join(format!("{}.assembler.json", context.context_id()));

            let assembler = assemblers
                .entry(group.group.kind)
                .or_insert_with(|| assembler_for(group.group.kind));
            let meta = {
                let scope = AssemblerScope::bind(
                    assembler.as_mut(),
                    Arc::clone(format),
                    Arc::clone(&settings),
                    Arc::clone(group),
                );
                scope.write_assembler_file(&path)?
            };

            context.set_property(ASSEMBLER_FILE, path.to_string_lossy())?;
            context.set_property(FORMAT_NAME, &format.name)?;
            let compiled = tool.run(context);
            if !compiled {
                warn!(tool = tool.name(), format = %format.name, group = %context.context_id(), "help compiler failed");
            }

            let artifact = BuiltArtifact {
                format: format.name.clone(),
                group: context.context_id().to_string(),
                path,
                meta,
                compiled,
            };
            progress.artifact_built(&artifact, artifacts.len() + 1, total);
            artifacts.push(artifact);
        }
    }

    // --- Phase 5: Release ---
    for context in &mut contexts {
        context.uninitialize();
    }
    registry.unload_all();

    let report = BuildReport {
        session_id: session.id,
        started_at: session.started_at,
        finished_at: Utc::now(),
        master_toc: settings.output_dir.join(MASTER_TOC_FILE),
        topic_count,
        artifacts,
        elapsed: start.elapsed(),
    };

    info!(
        artifacts = report.artifacts.len(),
        topics = report.topic_count,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "build complete"
    );
    progress.done(&report);
    Ok(report)
}

/// Register one tree per group and load them on the blocking pool. Groups
/// without a TOC file keep an empty tree; group ids must be unique.
async fn load_registry(groups: &[Arc<ContentGroup>], progress: &dyn ProgressReporter) -> Result<TocRegistry> {
    let mut registry = TocRegistry::new();
    for group in groups {
        registry.add(TocTree::for_group(group))?;
    }

    let mut registry = tokio::task::spawn_blocking(move || -> Result<TocRegistry> {
        registry.load_all()?;
        Ok(registry)
    })
    .await
    .map_err(|e| HelpForgeError::invalid_state(format!("TOC load task failed: {e}")))??;

    let total = groups.len();
    for (index, group) in groups.iter().enumerate() {
        if let Some(tree) = registry.get_mut(&group.id) {
            if group.excluded {
                tree.set_excluded(true);
            }
        }
        progress.group_loaded(&group.id, index + 1, total);
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use helpforge_shared::{BuildFormat, FormatKind, TopicEntry};

    use crate::toc::TocLayout;

    struct RecordingTool {
        calls: Mutex<Vec<String>>,
        result: bool,
    }

    impl RecordingTool {
        fn new(result: bool) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                result,
            }
        }
    }

    impl BuildTool for RecordingTool {
        fn name(&self) -> &str {
            "recording"
        }

        fn run(&self, context: &GroupContext) -> bool {
            self.calls
                .lock()
                .unwrap()
                .push(context.property(ASSEMBLER_FILE).to_string());
            self.result
        }
    }

    struct Stamp;

    impl BuildConfiguration for Stamp {
        fn name(&self) -> &str {
            "stamp"
        }

        fn configure(&self, session: &BuildSession, context: &mut GroupContext, group: &ContentGroup) -> Result<()> {
            context.set_property("$Stamp", format!("{}:{}", session.property("$Locale"), group.id))
        }
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hf-pipeline-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn project(tmp: &std::path::Path) -> AppConfig {
        let mut guide = TocTree::new("guide", TocLayout::Flat).with_backing(tmp.join("guide.toc.json"));
        guide.add(TopicEntry::new("intro", "Intro", "intro.md")).unwrap();
        guide.add(TopicEntry::new("draft", "Draft", "draft.md").excluded(true)).unwrap();
        guide.save().unwrap();

        let mut api = TocTree::new("api", TocLayout::Rooted).with_backing(tmp.join("api.toc.json"));
        api.add(
            TopicEntry::new("ns", "Sample", "N:Sample")
                .with_children(vec![TopicEntry::new("t", "Widget", "T:Sample.Widget")])
                .unwrap(),
        )
        .unwrap();
        api.save().unwrap();

        let mut config = AppConfig::default();
        config.settings.working_dir = tmp.join("work");
        config.settings.output_dir = tmp.join("out");
        config.settings.root_namespace_container = true;
        config.settings.root_namespace_title = "Sample API".into();
        config.formats.push(BuildFormat::new(FormatKind::Mshc, "HelpViewer"));
        config.groups = vec![
            ContentGroup::new("api", "API", GroupKind::Reference).with_toc_file(tmp.join("api.toc.json")),
            ContentGroup::new("guide", "Guide", GroupKind::Conceptual).with_toc_file(tmp.join("guide.toc.json")),
        ];
        config
    }

    #[tokio::test]
    async fn builds_every_format_and_group() {
        let tmp = temp_dir();
        let config = project(&tmp);
        let tool = RecordingTool::new(true);
        let configurations: Vec<Box<dyn BuildConfiguration>> = vec![Box::new(Stamp)];

        let report = build_help(&config, &configurations, &tool, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.artifacts.len(), 4);
        assert!(report.succeeded());
        assert_eq!(tool.calls.lock().unwrap().len(), 4);
        assert!(tmp.join("out/html/api.assembler.json").exists());
        assert!(tmp.join("out/mshc/guide.assembler.json").exists());
        assert!(tmp.join("work/ApiToc1.json").exists());
        assert!(tmp.join("work/TopicsToc2.json").exists());

        let master = TocTree::from_file(&report.master_toc).unwrap();
        let names: Vec<&str> = master.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Intro", "Draft", "Sample API"]);
        assert!(master.find("Widget", true).is_some());
        assert_eq!(report.topic_count, 5);

        let artifact = std::fs::read_to_string(tmp.join("out/html/guide.assembler.json")).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&artifact).unwrap();
        assert_eq!(doc["group"]["properties"]["$Stamp"], "en-US:guide");
        assert_eq!(doc["toc"]["entries"].as_array().unwrap().len(), 1);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn working_copies_leave_sources_untouched() {
        let tmp = temp_dir();
        let mut config = project(&tmp);
        config.groups.push(ContentGroup::new("notes", "Notes", GroupKind::Conceptual));
        let source = std::fs::read_to_string(tmp.join("guide.toc.json")).unwrap();

        let report = build_help(&config, &[], &NoopTool, &SilentProgress).await.unwrap();
        assert_eq!(report.artifacts.len(), 6);

        assert_eq!(std::fs::read_to_string(tmp.join("guide.toc.json")).unwrap(), source);
        let copy = TocTree::from_file(tmp.join("work/TopicsToc2.json")).unwrap();
        assert_eq!(copy.name(), "guide");
        assert_eq!(copy.topic_count(), 2);
        // Group without a TOC file still gets an empty working copy.
        let empty = TocTree::from_file(tmp.join("work/TopicsToc3.json")).unwrap();
        assert_eq!(empty.name(), "notes");
        assert!(empty.is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn tool_failure_is_reported() {
        let tmp = temp_dir();
        let config = project(&tmp);
        let report = build_help(&config, &[], &RecordingTool::new(false), &SilentProgress)
            .await
            .unwrap();
        assert!(!report.succeeded());
        assert!(report.artifacts.iter().all(|a| !a.compiled));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn missing_toc_fails_build() {
        let tmp = temp_dir();
        let mut config = project(&tmp);
        config.groups[1].toc_file = Some(tmp.join("missing.toc.json"));
        let err = build_help(&config, &[], &NoopTool, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, HelpForgeError::IoFailure { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn requires_groups() {
        let err = build_help(&AppConfig::default(), &[], &NoopTool, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, HelpForgeError::InvalidState { .. }));
    }
}
