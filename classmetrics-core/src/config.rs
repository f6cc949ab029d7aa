//! Configuration file support for classmetrics
//!
//! Loads run configuration from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.classmetricsrc.json` in the working directory
//! 3. `classmetrics.config.json` in the working directory
//!
//! All fields are optional. CLI flags take precedence over config file values.

use crate::store::{JournalMode, SqliteStoreConfig};
use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_DATABASE: &str = "metrics.db";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// classmetrics configuration loaded from a JSON config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassmetricsConfig {
    /// Output SQLite database (default: metrics.db)
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Delete the database before ingesting (default: true)
    #[serde(default)]
    pub overwrite: Option<bool>,

    /// SQLite busy timeout in milliseconds (default: 5000)
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,

    /// SQLite journal mode (default: delete)
    #[serde(default)]
    pub journal_mode: Option<JournalMode>,

    /// Glob patterns over `package/SourceFile.java` to include (default: all)
    #[serde(default)]
    pub include: Vec<String>,

    /// Glob patterns over `package/SourceFile.java` to skip
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Resolved configuration with compiled glob patterns
#[derive(Debug)]
pub struct ResolvedConfig {
    pub database: PathBuf,
    pub overwrite: bool,
    pub busy_timeout_ms: u64,
    pub journal_mode: JournalMode,
    /// Compiled include patterns (None means include all)
    pub include: Option<GlobSet>,
    pub exclude: GlobSet,
    /// Path the config was loaded from (None if defaults)
    pub config_path: Option<PathBuf>,
}

impl ClassmetricsConfig {
    /// Validate the configuration for logical errors
    pub fn validate(&self) -> Result<()> {
        if let Some(timeout) = self.busy_timeout_ms {
            if timeout == 0 {
                anyhow::bail!("busy_timeout_ms must be positive (got {})", timeout);
            }
        }

        if let Some(ref database) = self.database {
            if database.as_os_str().is_empty() {
                anyhow::bail!("database must not be empty");
            }
        }

        for pattern in &self.include {
            Glob::new(pattern).with_context(|| format!("invalid include pattern: {}", pattern))?;
        }
        for pattern in &self.exclude {
            Glob::new(pattern).with_context(|| format!("invalid exclude pattern: {}", pattern))?;
        }

        Ok(())
    }

    /// Resolve config into compiled form ready for use
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.validate()?;

        let include = if self.include.is_empty() {
            None
        } else {
            Some(build_globset(&self.include)?)
        };
        let exclude = build_globset(&self.exclude)?;

        Ok(ResolvedConfig {
            database: self
                .database
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            overwrite: self.overwrite.unwrap_or(true),
            busy_timeout_ms: self.busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
            journal_mode: self.journal_mode.unwrap_or_default(),
            include,
            exclude,
            config_path: None,
        })
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

impl ResolvedConfig {
    /// Check if a class's `package/source_file` path passes include/exclude
    pub fn should_include(&self, source_path: &str) -> bool {
        if self.exclude.is_match(source_path) {
            return false;
        }

        if let Some(ref include) = self.include {
            return include.is_match(source_path);
        }

        true
    }

    /// Store settings for the configured database
    pub fn sqlite_config(&self) -> SqliteStoreConfig {
        SqliteStoreConfig {
            path: self.database.clone(),
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: Some(self.journal_mode),
        }
    }

    /// Build a ResolvedConfig with all defaults (no config file)
    pub fn defaults() -> Result<Self> {
        ClassmetricsConfig::default().resolve()
    }
}

/// Discover and load a config file from a directory
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(root: &Path) -> Result<Option<(ClassmetricsConfig, PathBuf)>> {
    for name in [".classmetricsrc.json", "classmetrics.config.json"] {
        let path = root.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }
    Ok(None)
}

/// Load config from an explicit file path
pub fn load_config_file(path: &Path) -> Result<ClassmetricsConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: ClassmetricsConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load and resolve config
///
/// If `config_path` is provided, loads from that file.
/// Otherwise, discovers config in `root`. Falls back to defaults.
pub fn load_and_resolve(root: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = if let Some(path) = config_path {
        let config = load_config_file(path)?;
        (config, Some(path.to_path_buf()))
    } else {
        match discover_config(root)? {
            Some((config, path)) => (config, Some(path)),
            None => (ClassmetricsConfig::default(), None),
        }
    };

    let mut resolved = config.resolve()?;
    resolved.config_path = source_path;
    Ok(resolved)
}
