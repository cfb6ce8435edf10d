//! TOML configuration parsing and validation.
//!
//! Every section except `[db]` and `[slab]` is optional and falls back to
//! defaults. [`load_config`] rejects out-of-range values up front so the
//! commands never have to.
//!
//! ```toml
//! [db]
//! path = "./data/slab.db"
//!
//! [slab]
//! base_url = "https://myteam.slab.com"
//! token_file = "./token"
//!
//! [sync]
//! concurrency = 20
//!
//! [embedding]
//! provider = "ollama"
//! url = "http://localhost:11434"
//! model = "nomic-embed-text"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use slab_search_core::models::EmbeddingSlot;
use slab_search_core::sync::{SyncOptions, DEFAULT_CONCURRENCY};

/// Environment variable consulted for the Slab API token.
pub const TOKEN_ENV: &str = "SLAB_TOKEN";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub slab: SlabConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlabConfig {
    /// Web origin used for document URLs, markdown export, and (by
    /// default) the GraphQL endpoint.
    pub base_url: String,
    /// Overrides `{base_url}/graphql`.
    #[serde(default)]
    pub graphql_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    #[serde(default = "default_slab_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_slab_timeout_secs() -> u64 {
    60
}

impl SlabConfig {
    pub fn graphql_endpoint(&self) -> String {
        match &self.graphql_url {
            Some(url) => url.clone(),
            None => format!("{}/graphql", self.base_url.trim_end_matches('/')),
        }
    }

    /// Resolve the bearer token: explicit config, then `SLAB_TOKEN`, then
    /// `token_file`.
    pub fn resolve_token(&self) -> Result<String> {
        if let Some(token) = self.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            return Ok(token.to_string());
        }
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            let token = token.trim();
            if !token.is_empty() {
                return Ok(token.to_string());
            }
        }
        if let Some(path) = &self.token_file {
            let token = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read token file: {}", path.display()))?;
            let token = token.trim();
            if !token.is_empty() {
                return Ok(token.to_string());
            }
        }
        anyhow::bail!(
            "No Slab token configured. Set slab.token, the {} environment variable, or slab.token_file.",
            TOKEN_ENV
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub max_documents: Option<usize>,
    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_documents: None,
            progress_interval_secs: 5,
        }
    }
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}
fn default_progress_interval_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    /// Slot written by `sync` and `embed`, and read by searches.
    #[serde(default)]
    pub slot: EmbeddingSlot,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            url: None,
            model: None,
            timeout_secs: 180,
            slot: EmbeddingSlot::Primary,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_timeout_secs() -> u64 {
    180
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            lexical_weight: default_lexical_weight(),
            final_limit: default_final_limit(),
        }
    }
}

fn default_lexical_weight() -> f64 {
    0.7
}
fn default_final_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:6893".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Sync-engine options derived from `[sync]` and `[embedding]`.
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            concurrency: self.sync.concurrency,
            max_documents: self.sync.max_documents,
            progress_interval: Duration::from_secs(self.sync.progress_interval_secs),
            embedding_slot: self.embedding.slot,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.sync.concurrency == 0 {
        anyhow::bail!("sync.concurrency must be > 0");
    }
    if config.sync.progress_interval_secs == 0 {
        anyhow::bail!("sync.progress_interval_secs must be > 0");
    }

    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.lexical_weight) {
        anyhow::bail!("retrieval.lexical_weight must be in [0.0, 1.0]");
    }

    if config.slab.base_url.trim().is_empty() {
        anyhow::bail!("slab.base_url must not be empty");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "ollama" | "lmstudio" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, or lmstudio.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.model.is_none() {
        anyhow::bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }
    if config.embedding.timeout_secs == 0 {
        anyhow::bail!("embedding.timeout_secs must be > 0");
    }

    match config.logging.format.as_str() {
        "pretty" | "json" => {}
        other => anyhow::bail!(
            "Unknown logging format: '{}'. Must be pretty or json.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/slab.db"

[slab]
base_url = "https://slab.example.test"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.sync.concurrency, 20);
        assert_eq!(config.sync.progress_interval_secs, 5);
        assert_eq!(config.embedding.provider, "disabled");
        assert_eq!(config.embedding.timeout_secs, 180);
        assert_eq!(config.embedding.slot, EmbeddingSlot::Primary);
        assert!((config.retrieval.lexical_weight - 0.7).abs() < 1e-9);
        assert_eq!(config.retrieval.final_limit, 10);
        assert_eq!(config.server.bind, "127.0.0.1:6893");
        assert_eq!(
            config.slab.graphql_endpoint(),
            "https://slab.example.test/graphql"
        );
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn rejects_bad_values() {
        let cases = [
            ("[sync]\nconcurrency = 0", "sync.concurrency"),
            ("[retrieval]\nlexical_weight = 1.5", "lexical_weight"),
            ("[retrieval]\nfinal_limit = 0", "final_limit"),
            ("[embedding]\nprovider = \"openai\"", "Unknown embedding provider"),
            ("[embedding]\nprovider = \"ollama\"", "embedding.model"),
            ("[logging]\nformat = \"xml\"", "logging format"),
        ];
        for (extra, needle) in cases {
            let text = format!("{}\n{}\n", MINIMAL, extra);
            let err = parse_config(&text).unwrap_err();
            assert!(
                format!("{:#}", err).contains(needle),
                "expected '{}' in: {:#}",
                needle,
                err
            );
        }
    }

    #[test]
    fn explicit_token_wins() {
        let mut config = parse_config(MINIMAL).unwrap();
        config.slab.token = Some("  abc123 \n".to_string());
        assert_eq!(config.slab.resolve_token().unwrap(), "abc123");
    }

    #[test]
    fn token_file_is_read_and_trimmed() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "from-file\n").unwrap();

        let mut config = parse_config(MINIMAL).unwrap();
        config.slab.token = Some("from-config".to_string());
        config.slab.token_file = Some(path);
        // An explicit token shadows the file.
        assert_eq!(config.slab.resolve_token().unwrap(), "from-config");
    }

    #[test]
    fn example_config_parses() {
        let text = include_str!("../../../config/slab-search.example.toml");
        let config = parse_config(text).unwrap();
        assert_eq!(config.db.path, PathBuf::from("./data/slab.db"));
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn sync_options_follow_config() {
        let text = format!(
            "{}\n[sync]\nconcurrency = 3\nmax_documents = 50\n[embedding]\nslot = \"alternate\"\n",
            MINIMAL
        );
        let options = parse_config(&text).unwrap().sync_options();
        assert_eq!(options.concurrency, 3);
        assert_eq!(options.max_documents, Some(50));
        assert_eq!(options.embedding_slot, EmbeddingSlot::Alternate);
        assert_eq!(options.progress_interval, Duration::from_secs(5));
    }
}
