//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use helpforge_core::pipeline::{BuildReport, BuiltArtifact, ProgressReporter};
use helpforge_core::{
    AssemblerScope, BuildTool, FinishedGroup, GroupContext, NoopTool, TocRegistry, TocTree,
    assembler_for, build_help, find_by_key,
};
use helpforge_shared::{
    AppConfig, ContentGroup, GroupKind, init_config, load_config, load_config_from,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// helpforge: compile documentation tables of contents into help output.
#[derive(Parser)]
#[command(
    name = "helpforge",
    version,
    about = "Build tables of contents and help-compiler assemblers from documentation groups.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Group kind as accepted on the command line.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum KindArg {
    Reference,
    Conceptual,
    Generic,
}

impl From<KindArg> for GroupKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Reference => GroupKind::Reference,
            KindArg::Conceptual => GroupKind::Conceptual,
            KindArg::Generic => GroupKind::Generic,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Inspect and combine TOC records.
    Toc {
        #[command(subcommand)]
        action: TocAction,
    },

    /// Write the assembler artifact for one TOC and one format.
    Assemble {
        /// TOC record of the group.
        toc: PathBuf,

        /// Kind of the group the TOC belongs to.
        #[arg(long, value_enum, default_value = "conceptual")]
        kind: KindArg,

        /// Name of a configured format.
        #[arg(short, long)]
        format: String,

        /// Project config (defaults to the user config).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output file (defaults to stdout).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Build every group of a project for every enabled format.
    Build {
        /// Project config file.
        #[arg(default_value = "helpforge.toml")]
        config: PathBuf,

        /// Help compiler to run on each artifact (receives its path).
        #[arg(long)]
        tool: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// TOC subcommands.
#[derive(Subcommand)]
pub(crate) enum TocAction {
    /// Print a TOC as an indented outline.
    Show {
        file: PathBuf,

        /// Print the raw record as JSON instead.
        #[arg(long)]
        json: bool,
    },
    /// Look up a topic by name.
    Find {
        file: PathBuf,
        name: String,

        /// Only search root-level entries.
        #[arg(long)]
        shallow: bool,
    },
    /// Merge TOC records into one master TOC.
    Merge {
        /// TOC records, in order.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output record.
        #[arg(short, long)]
        out: PathBuf,

        /// Name of the merged tree.
        #[arg(long, default_value = "Master")]
        name: String,

        /// Nest reference TOCs under one entry with this title.
        #[arg(long)]
        root_title: Option<String>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = format!("helpforge={level},helpforge_core={level},helpforge_shared={level}");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Toc { action } => match action {
            TocAction::Show { file, json } => cmd_toc_show(&file, json),
            TocAction::Find {
                file,
                name,
                shallow,
            } => cmd_toc_find(&file, &name, !shallow),
            TocAction::Merge {
                files,
                out,
                name,
                root_title,
            } => cmd_toc_merge(&files, &out, &name, root_title.as_deref()),
        },
        Command::Assemble {
            toc,
            kind,
            format,
            config,
            out,
        } => cmd_assemble(&toc, kind.into(), &format, config.as_deref(), out.as_deref()),
        Command::Build { config, tool } => cmd_build(&config, tool).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// TOC commands
// ---------------------------------------------------------------------------

fn cmd_toc_show(file: &Path, json: bool) -> Result<()> {
    let tree = TocTree::from_file(file)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tree.record())?);
    } else {
        print!("{}", tree.outline());
        println!();
        println!("  Topics: {}", tree.topic_count());
    }
    Ok(())
}

fn cmd_toc_find(file: &Path, name: &str, recursive: bool) -> Result<()> {
    let tree = TocTree::from_file(file)?;
    let entry = tree
        .find(name, recursive)
        .ok_or_else(|| eyre!("no topic named '{name}' in {}", file.display()))?;
    println!("{}", serde_json::to_string_pretty(entry)?);
    Ok(())
}

fn cmd_toc_merge(files: &[PathBuf], out: &Path, name: &str, root_title: Option<&str>) -> Result<()> {
    let mut registry = TocRegistry::new();
    for file in files {
        registry.add(TocTree::from_file(file)?)?;
    }

    let master = registry.merge(name, root_title)?.with_backing(out);
    master.save()?;

    info!(inputs = files.len(), out = %out.display(), "merged TOC records");
    println!(
        "Merged {} TOCs ({} topics) into {}",
        files.len(),
        master.topic_count(),
        out.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Assemble
// ---------------------------------------------------------------------------

fn cmd_assemble(
    toc: &Path,
    kind: GroupKind,
    format_name: &str,
    config_path: Option<&Path>,
    out: Option<&Path>,
) -> Result<()> {
    let config = match config_path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let format = find_by_key(&config.formats, format_name)
        .ok_or_else(|| eyre!("no format named '{format_name}' is configured"))?
        .clone();

    let tree = TocTree::from_file(toc)?;
    let group = Arc::new(ContentGroup::new(tree.name(), tree.name(), kind));
    let mut context = GroupContext::new(group);
    context.create_properties("1");
    let finished = Arc::new(FinishedGroup::new(&context, tree));

    let mut assembler = assembler_for(kind);
    let scope = AssemblerScope::bind(
        assembler.as_mut(),
        Arc::new(format),
        Arc::new(config.settings.clone()),
        finished,
    );

    match out {
        Some(path) => {
            let meta = scope.write_assembler_file(path)?;
            println!("Wrote {} ({} bytes, sha256 {})", path.display(), meta.size_bytes, meta.sha256);
        }
        None => {
            let stdout = std::io::stdout();
            scope.write_assembler(&mut stdout.lock())?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

async fn cmd_build(config_path: &Path, tool: Option<String>) -> Result<()> {
    let mut config = load_config_from(config_path)?;
    let base = config_path.parent().unwrap_or(Path::new(""));
    resolve_project_paths(&mut config, base);

    let tool: Box<dyn BuildTool> = match tool {
        Some(program) => Box::new(CommandTool { program }),
        None => Box::new(NoopTool),
    };

    info!(
        config = %config_path.display(),
        groups = config.groups.len(),
        tool = tool.name(),
        "building help"
    );

    let reporter = CliProgress::new();
    let report = build_help(&config, &[], tool.as_ref(), &reporter).await?;

    println!();
    println!("  Help build complete!");
    println!("  Session:   {}", report.session_id);
    println!("  Topics:    {}", report.topic_count);
    println!("  Artifacts: {}", report.artifacts.len());
    println!("  TOC:       {}", report.master_toc.display());
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
    println!();

    if !report.succeeded() {
        let failed: Vec<String> = report
            .artifacts
            .iter()
            .filter(|a| !a.compiled)
            .map(|a| format!("{}/{}", a.format, a.group))
            .collect();
        return Err(eyre!("help compiler failed for: {}", failed.join(", ")));
    }
    Ok(())
}

/// Make relative project paths relative to the config file's directory.
fn resolve_project_paths(config: &mut AppConfig, base: &Path) {
    let resolve = |path: &mut PathBuf| {
        if path.is_relative() {
            *path = base.join(&*path);
        }
    };
    resolve(&mut config.settings.working_dir);
    resolve(&mut config.settings.output_dir);
    if let Some(dir) = config.settings.contents_dir.as_mut() {
        resolve(dir);
    }
    for group in &mut config.groups {
        if let Some(toc) = group.toc_file.as_mut() {
            resolve(toc);
        }
    }
}

/// Runs an external program with the artifact path as its only argument.
struct CommandTool {
    program: String,
}

impl BuildTool for CommandTool {
    fn name(&self) -> &str {
        &self.program
    }

    fn run(&self, context: &GroupContext) -> bool {
        let artifact = context.property(helpforge_core::pipeline::ASSEMBLER_FILE);
        let status = std::process::Command::new(&self.program)
            .arg(artifact)
            .env("HELPFORGE_GROUP", context.context_id())
            .env("HELPFORGE_FORMAT", context.property(helpforge_core::pipeline::FORMAT_NAME))
            .status();

        match status {
            Ok(status) => status.success(),
            Err(e) => {
                tracing::error!(program = %self.program, error = %e, "failed to start help compiler");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using indicatif spinners/bars.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn group_loaded(&self, group: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Loaded TOC [{current}/{total}] {group}"));
    }

    fn artifact_built(&self, artifact: &BuiltArtifact, current: usize, total: usize) {
        self.spinner.set_message(format!(
            "Assembled [{current}/{total}] {}/{}",
            artifact.format, artifact.group
        ));
    }

    fn done(&self, _report: &BuildReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_toc_merge() {
        let cli = Cli::try_parse_from([
            "helpforge",
            "toc",
            "merge",
            "a.json",
            "b.json",
            "--out",
            "master.json",
            "--root-title",
            "API",
        ])
        .unwrap();
        match cli.command {
            Command::Toc {
                action: TocAction::Merge { files, root_title, name, .. },
            } => {
                assert_eq!(files.len(), 2);
                assert_eq!(root_title.as_deref(), Some("API"));
                assert_eq!(name, "Master");
            }
            _ => panic!("expected toc merge"),
        }
    }

    #[test]
    fn merge_requires_inputs() {
        assert!(Cli::try_parse_from(["helpforge", "toc", "merge", "--out", "m.json"]).is_err());
    }

    #[test]
    fn project_paths_follow_config_dir() {
        let mut config = AppConfig::default();
        config.groups.push(
            ContentGroup::new("g", "G", GroupKind::Conceptual).with_toc_file("toc/g.json"),
        );
        config.settings.output_dir = PathBuf::from("/abs/out");

        resolve_project_paths(&mut config, Path::new("project"));
        assert_eq!(config.settings.working_dir, Path::new("project/var/work"));
        assert_eq!(config.settings.output_dir, Path::new("/abs/out"));
        assert_eq!(config.groups[0].toc_file.as_deref(), Some(Path::new("project/toc/g.json")));
    }
}
