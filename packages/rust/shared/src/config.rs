//! Build configuration for helpforge.
//!
//! A project is described by a `helpforge.toml` file: compiler-facing
//! `[settings]`, the `[[formats]]` to emit and the content `[[groups]]`.
//! The user-level default lives at `~/.helpforge/helpforge.toml`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HelpForgeError, Result};
use crate::types::{BuildFormat, ContentGroup, FormatKind};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "helpforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".helpforge";

// ---------------------------------------------------------------------------
// Config structs (matching helpforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level project config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: BuildSettings,

    /// Output formats, emitted in declaration order.
    #[serde(default = "default_formats")]
    pub formats: Vec<BuildFormat>,

    /// Content groups, built in declaration order.
    #[serde(default)]
    pub groups: Vec<ContentGroup>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            settings: BuildSettings::default(),
            formats: default_formats(),
            groups: Vec::new(),
        }
    }
}

fn default_formats() -> Vec<BuildFormat> {
    vec![BuildFormat::new(FormatKind::Web, "WebHelp")]
}

/// `[settings]` section: what the external help compiler needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSettings {
    /// Base name of the compiled help file.
    #[serde(default = "default_help_name")]
    pub help_name: String,

    /// Title shown by help viewers.
    #[serde(default = "default_help_title")]
    pub help_title: String,

    /// Content locale, e.g. `en-US`.
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Scratch directory for intermediate build files.
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Directory that receives the assembled artifacts and master TOC.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Wrap all reference topics under one root namespace entry.
    #[serde(default)]
    pub root_namespace_container: bool,

    /// Title of the root namespace entry.
    #[serde(default)]
    pub root_namespace_title: String,

    /// Style-supplied shared content files, in resolution order.
    #[serde(default = "default_shared_contents")]
    pub shared_contents: Vec<String>,

    /// Directory of user overrides for the shared content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents_dir: Option<PathBuf>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            help_name: default_help_name(),
            help_title: default_help_title(),
            locale: default_locale(),
            working_dir: default_working_dir(),
            output_dir: default_output_dir(),
            root_namespace_container: false,
            root_namespace_title: String::new(),
            shared_contents: default_shared_contents(),
            contents_dir: None,
        }
    }
}

impl BuildSettings {
    /// Whether reference topics are nested under a titled root entry.
    pub fn is_root_namespace_rooted(&self) -> bool {
        self.root_namespace_container && !self.root_namespace_title.trim().is_empty()
    }
}

fn default_help_name() -> String {
    "Documentation".into()
}
fn default_help_title() -> String {
    "Documentation".into()
}
fn default_locale() -> String {
    "en-US".into()
}
fn default_working_dir() -> PathBuf {
    PathBuf::from("var/work")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("var/help")
}
fn default_shared_contents() -> Vec<String> {
    vec![
        "shared_content.json".into(),
        "reference_content.json".into(),
        "syntax_content.json".into(),
    ]
}

impl AppConfig {
    /// Check formats and groups for problems a build would trip over later.
    pub fn validate(&self) -> Result<()> {
        if self.settings.locale.trim().is_empty() {
            return Err(HelpForgeError::config("settings.locale must not be empty"));
        }

        let mut format_names = HashSet::new();
        for format in &self.formats {
            format
                .validate()
                .map_err(|e| HelpForgeError::config(format!("format '{}': {e}", format.name)))?;
            if !format_names.insert(format.name.as_str()) {
                return Err(HelpForgeError::config(format!(
                    "duplicate format name '{}'",
                    format.name
                )));
            }
        }

        let mut group_ids = HashSet::new();
        for group in &self.groups {
            if group.id.trim().is_empty() {
                return Err(HelpForgeError::config(format!(
                    "group '{}' has an empty id",
                    group.name
                )));
            }
            if !group_ids.insert(group.id.as_str()) {
                return Err(HelpForgeError::config(format!(
                    "duplicate group id '{}'",
                    group.id
                )));
            }
        }

        Ok(())
    }

    /// Formats that are switched on.
    pub fn enabled_formats(&self) -> impl Iterator<Item = &BuildFormat> {
        self.formats.iter().filter(|f| f.enabled)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.helpforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| HelpForgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.helpforge/helpforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the user config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load and validate a project config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HelpForgeError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        HelpForgeError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;

    tracing::debug!(
        ?path,
        formats = config.formats.len(),
        groups = config.groups.len(),
        "loaded project config"
    );
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HelpForgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| HelpForgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HelpForgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
