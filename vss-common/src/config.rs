//! Configuration loading and root folder resolution
//!
//! Resolution order for every setting that can come from more than one place:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing or unreadable TOML file is never fatal: it is logged and the
//! compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Primary root folder override
pub const ROOT_FOLDER_ENV: &str = "VSS_ROOT_FOLDER";
/// Alternative root folder override
pub const ROOT_ENV: &str = "VSS_ROOT";
/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "vss.db";

/// Defaults compiled into the binary for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/vss (or /var/lib/vss for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("vss"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/vss"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("vss"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/vss"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("vss"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\vss"))
    } else {
        PathBuf::from("./vss_data")
    }
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing env-filter directive, e.g. `info` or `vss_ingest=debug`
    pub level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: None,
        }
    }
}

/// `[database]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Total time a write may spend retrying on lock contention
    pub max_lock_wait_ms: u64,
    /// SQLite busy_timeout applied to every connection
    pub busy_timeout_ms: u64,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_lock_wait_ms: 5000,
            busy_timeout_ms: 250,
            max_connections: 8,
        }
    }
}

/// `[ingest]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    /// Genome build the feed is reported on
    pub genome_build: String,
    /// Concurrent store lookups while merging feed records
    pub lookup_concurrency: usize,
    /// Concurrent operations inside one bulk write
    pub write_concurrency: usize,
    /// Users delivered to concurrently
    pub delivery_concurrency: usize,
    /// Log outgoing notifications instead of sending them
    pub dry_run: bool,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            genome_build: "b37".to_string(),
            lookup_concurrency: 8,
            write_concurrency: 4,
            delivery_concurrency: 4,
            dry_run: false,
        }
    }
}

/// `[mailer]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailerConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub from_email: String,
    pub from_name: String,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.sendgrid.com/v3/mail/send".to_string(),
            api_key: None,
            from_email: "notifications@variantfacts.com".to_string(),
            from_name: "Variant Facts".to_string(),
        }
    }
}

/// Contents of `<module>.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    /// Public site URL used in links
    pub base_url: Option<String>,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub ingest: IngestSection,
    pub mailer: MailerConfig,
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Read a config file
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Load the module's config file, falling back to defaults.
    ///
    /// Never fails: a missing file is normal on first start, and a broken
    /// file is reported and ignored.
    pub fn load(module_name: &str) -> Self {
        match find_config_file(module_name) {
            Some(path) => match Self::from_path(&path) {
                Ok(config) => {
                    debug!("Loaded config file: {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Ignoring config file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            None => {
                debug!("No config file for {}, using defaults", module_name);
                Self::default()
            }
        }
    }
}

/// Candidate config file locations for a module, most specific first
pub fn config_file_candidates(module_name: &str) -> Vec<PathBuf> {
    let file_name = format!("{}.toml", module_name);
    let mut candidates = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("vss").join(&file_name));
    }
    if cfg!(unix) {
        candidates.push(PathBuf::from("/etc/vss").join(&file_name));
    }
    candidates
}

fn find_config_file(module_name: &str) -> Option<PathBuf> {
    config_file_candidates(module_name)
        .into_iter()
        .find(|p| p.exists())
}

/// Resolves the root folder holding the database
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            toml_root: None,
        }
    }

    /// Command-line override (priority 1)
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Root folder from an already-loaded TOML config (priority 3)
    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        for var in [ROOT_FOLDER_ENV, ROOT_ENV] {
            if let Ok(path) = std::env::var(var) {
                if !path.trim().is_empty() {
                    return PathBuf::from(path);
                }
            }
        }

        if let Some(path) = &self.toml_root {
            return path.clone();
        }

        debug!(
            module = %self.module_name,
            "No root folder configured, using compiled default"
        );
        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and locates the database inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            tracing::info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }
}
