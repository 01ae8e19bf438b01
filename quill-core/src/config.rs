use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::nesting::NestingMode;

/// Default extension of template sources, appended to logical names.
pub const DEFAULT_EXTENSION: &str = ".quill.php";

/// Freshness window of [`CachePolicy::Freshness`].
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(3600);

/// Raw-code escape markers of the target language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTags {
    pub open: String,
    pub close: String,
}

impl RawTags {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        RawTags {
            open: open.into(),
            close: close.into(),
        }
    }

    /// Wrap a code fragment in the raw-code markers.
    pub fn wrap(&self, code: &str) -> String {
        format!("{} {} {}", self.open, code, self.close)
    }
}

impl Default for RawTags {
    fn default() -> Self {
        RawTags::new("<?php", "?>")
    }
}

/// When compiled artifacts are rewritten. Either way an artifact lives at
/// the hash of its source path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Always compile; rewrite only when the compiled text's hash differs
    /// from the artifact's.
    #[default]
    ContentHash,
    /// Reuse the artifact without compiling when it, the source and every
    /// layout are all older than `expiry`; otherwise compile and rewrite.
    Freshness { expiry: Duration },
}

impl CachePolicy {
    pub fn freshness() -> Self {
        CachePolicy::Freshness {
            expiry: DEFAULT_EXPIRY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Base path that `@extend` and external `@component` targets are
    /// resolved against.
    pub views_root: PathBuf,
    pub cache_root: PathBuf,
    pub extension: String,
    pub cache_policy: CachePolicy,
    pub nesting: NestingMode,
    pub tags: RawTags,
}

impl CompilerConfig {
    pub fn new(views_root: impl Into<PathBuf>, cache_root: impl Into<PathBuf>) -> Self {
        CompilerConfig {
            views_root: views_root.into(),
            cache_root: cache_root.into(),
            extension: DEFAULT_EXTENSION.to_string(),
            cache_policy: CachePolicy::default(),
            nesting: NestingMode::default(),
            tags: RawTags::default(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn with_nesting(mut self, mode: NestingMode) -> Self {
        self.nesting = mode;
        self
    }

    pub fn with_tags(mut self, tags: RawTags) -> Self {
        self.tags = tags;
        self
    }

    /// Path of the template a logical target such as `layouts/base` names.
    pub fn template_path(&self, target: &str) -> PathBuf {
        self.views_root.join(format!("{target}{}", self.extension))
    }

    /// Logical name of a template path under `views_root`, if it is one.
    pub fn logical_name(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.views_root).ok()?;
        let relative = relative.to_string_lossy().replace('\\', "/");
        relative
            .strip_suffix(self.extension.as_str())
            .map(str::to_string)
    }
}
