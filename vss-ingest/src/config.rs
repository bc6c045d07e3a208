//! Configuration resolution for vss-ingest
//!
//! Builds one [`IngestConfig`] at start-up. Priority for every setting:
//! command line → environment → TOML file → compiled default.

use std::path::PathBuf;
use tracing::{info, warn};
use vss_common::config::{
    DatabaseConfig, MailerConfig, RootFolderInitializer, RootFolderResolver, TomlConfig,
};

/// Config file stem: `vss-ingest.toml`
pub const MODULE_NAME: &str = "vss-ingest";
/// Mail provider API key override
pub const SENDGRID_API_KEY_ENV: &str = "VSS_SENDGRID_API_KEY";
/// Public site URL override
pub const BASE_URL_ENV: &str = "VSS_BASE_URL";
pub const DEFAULT_BASE_URL: &str = "https://variantfacts.com";

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root_folder: Option<PathBuf>,
    pub base_url: Option<String>,
    pub genome_build: Option<String>,
    pub dry_run: bool,
}

/// Fully resolved settings for one invocation
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub root_folder: PathBuf,
    pub database_path: PathBuf,
    pub database: DatabaseConfig,
    pub base_url: String,
    pub genome_build: String,
    pub lookup_concurrency: usize,
    pub write_concurrency: usize,
    pub delivery_concurrency: usize,
    pub dry_run: bool,
    pub mailer: MailerConfig,
}

impl IngestConfig {
    pub fn resolve(toml: &TomlConfig, cli: CliOverrides) -> Self {
        let root_folder = RootFolderResolver::new(MODULE_NAME)
            .with_cli_arg(cli.root_folder)
            .with_toml(toml)
            .resolve();
        let database_path = RootFolderInitializer::new(root_folder.clone()).database_path();

        let mut mailer = toml.mailer.clone();
        mailer.api_key = resolve_sendgrid_api_key(toml);

        Self {
            root_folder,
            database_path,
            database: toml.database.clone(),
            base_url: resolve_base_url(cli.base_url, toml),
            genome_build: cli
                .genome_build
                .filter(|b| !b.trim().is_empty())
                .unwrap_or_else(|| toml.ingest.genome_build.clone()),
            lookup_concurrency: toml.ingest.lookup_concurrency.max(1),
            write_concurrency: toml.ingest.write_concurrency.max(1),
            delivery_concurrency: toml.ingest.delivery_concurrency.max(1),
            dry_run: cli.dry_run || toml.ingest.dry_run,
            mailer,
        }
    }
}

/// Non-empty, non-whitespace
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Mail API key from the environment or TOML; `None` disables email
pub fn resolve_sendgrid_api_key(toml: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(SENDGRID_API_KEY_ENV)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = toml.mailer.api_key.clone().filter(|k| is_valid_key(k));

    match (env_key, toml_key) {
        (Some(key), Some(_)) => {
            warn!("Mail API key found in environment and TOML. Using environment (highest priority).");
            Some(key)
        }
        (Some(key), None) => {
            info!("Mail API key loaded from environment variable");
            Some(key)
        }
        (None, Some(key)) => {
            info!("Mail API key loaded from TOML config");
            Some(key)
        }
        (None, None) => None,
    }
}

fn resolve_base_url(cli: Option<String>, toml: &TomlConfig) -> String {
    cli.filter(|u| is_valid_key(u))
        .or_else(|| std::env::var(BASE_URL_ENV).ok().filter(|u| is_valid_key(u)))
        .or_else(|| toml.base_url.clone().filter(|u| is_valid_key(u)))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
        .trim_end_matches('/')
        .to_string()
}
