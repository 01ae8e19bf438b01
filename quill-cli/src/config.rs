use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use quill_core::config::DEFAULT_EXPIRY;
use quill_core::{CachePolicy, CompilerConfig, NestingMode, RawTags};
use serde::Deserialize;

/// Name of the configuration file picked up from the working directory.
pub const DEFAULT_CONFIG: &str = "quill.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Always compile; rewrite only when the output changed.
    Content,
    /// Reuse artifacts older than the expiry window without compiling.
    Freshness,
}

#[derive(Debug, Deserialize)]
pub struct TagsConfig {
    pub open: String,
    pub close: String,
}

/// Contents of `quill.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Directory templates are resolved against.
    #[serde(default)]
    pub views: Option<PathBuf>,

    /// Directory compiled artifacts are written to.
    #[serde(default)]
    pub cache: Option<PathBuf>,

    /// Template file extension, including the leading dot.
    #[serde(default)]
    pub extension: Option<String>,

    #[serde(default)]
    pub policy: Option<Policy>,

    /// Freshness window in seconds.
    #[serde(default)]
    pub expiry_secs: Option<u64>,

    /// Check block ordering, not only marker counts.
    #[serde(default)]
    pub strict: bool,

    #[serde(default)]
    pub tags: Option<TagsConfig>,

    /// Variables shared with every compiled view.
    #[serde(default)]
    pub shared: BTreeMap<String, String>,
}

impl FileConfig {
    /// Read `path`. Relative directories in the file are resolved against
    /// the file's own directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config: FileConfig = toml::from_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        config.views = config.views.map(|dir| base.join(dir));
        config.cache = config.cache.map(|dir| base.join(dir));
        Ok(config)
    }

    /// `explicit` if given, otherwise `quill.toml` in the working directory
    /// when it exists, otherwise an empty configuration.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => FileConfig::load(path),
            None if Path::new(DEFAULT_CONFIG).is_file() => FileConfig::load(Path::new(DEFAULT_CONFIG)),
            None => Ok(FileConfig::default()),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub views: Option<PathBuf>,
    pub cache: Option<PathBuf>,
    pub policy: Option<Policy>,
    pub strict: bool,
}

pub fn compiler_config(file: &FileConfig, overrides: &Overrides) -> CompilerConfig {
    let views = overrides
        .views
        .clone()
        .or_else(|| file.views.clone())
        .unwrap_or_else(|| PathBuf::from("views"));
    let cache = overrides
        .cache
        .clone()
        .or_else(|| file.cache.clone())
        .unwrap_or_else(|| PathBuf::from("cache"));

    let mut config = CompilerConfig::new(views, cache);
    if let Some(extension) = &file.extension {
        config = config.with_extension(extension.clone());
    }

    let expiry = file.expiry_secs.map_or(DEFAULT_EXPIRY, Duration::from_secs);
    config = match overrides.policy.or(file.policy) {
        Some(Policy::Freshness) => config.with_cache_policy(CachePolicy::Freshness { expiry }),
        Some(Policy::Content) | None => config.with_cache_policy(CachePolicy::ContentHash),
    };

    if overrides.strict || file.strict {
        config = config.with_nesting(NestingMode::Structural);
    }
    if let Some(tags) = &file.tags {
        config = config.with_tags(RawTags::new(tags.open.clone(), tags.close.clone()));
    }
    config
}
