//! Compiled artifact persistence.
//!
//! Every source has exactly one artifact, at `cache_root/<hash>` where the
//! hash is a 128-bit FNV-1a of the source path (and the shared variables,
//! when there are any), rendered as hex. The view layer can therefore find
//! an artifact from the source path alone. When it is rewritten depends on
//! the [`CachePolicy`]:
//!
//! * `ContentHash`: rewritten only when the hash of the freshly compiled
//!   text differs from the hash of the artifact on disk.
//! * `Freshness`: reused without compiling when the artifact, the source
//!   and every layout it extends are all older than the expiry window;
//!   otherwise compiled and rewritten.
//!
//! Writes go through [`FileStream::put_content`], which replaces the file
//! atomically.

use std::iter;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use const_fnv1a_hash::fnv1a_hash_str_128;
use tracing::info;

use crate::config::CachePolicy;
use crate::context::RenderContext;
use crate::error::CoreError;
use crate::fs::FileStream;

/// Outcome of a cache write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub path: PathBuf,
    /// Whether the artifact was (re)written by this call.
    pub written: bool,
}

pub struct CacheWriter<'a, F: FileStream> {
    files: &'a F,
    root: &'a Path,
    policy: CachePolicy,
}

impl<'a, F: FileStream> CacheWriter<'a, F> {
    pub fn new(files: &'a F, root: &'a Path, policy: CachePolicy) -> Self {
        CacheWriter {
            files,
            root,
            policy,
        }
    }

    /// Artifact path of `source`.
    pub fn cache_path(&self, source: &Path, context: &RenderContext) -> PathBuf {
        self.root.join(path_key(source, context))
    }

    /// The artifact of `source`, if the `Freshness` policy allows reusing
    /// it as is. `dependencies` are the documents it was compiled from.
    /// Always `None` under `ContentHash`, which has to compile to compare.
    pub fn fresh_artifact(
        &self,
        source: &Path,
        dependencies: &[PathBuf],
        context: &RenderContext,
        now: SystemTime,
    ) -> Result<Option<PathBuf>, CoreError> {
        let CachePolicy::Freshness { expiry } = self.policy else {
            return Ok(None);
        };
        let path = self.cache_path(source, context);
        if !self.files.is_file(&path) {
            return Ok(None);
        }
        for checked in iter::once(&path).chain(dependencies) {
            if !self.older_than(checked, expiry, now)? {
                return Ok(None);
            }
        }
        Ok(Some(path))
    }

    /// Persist `compiled` unless the policy says the existing artifact can
    /// stay.
    pub fn write_if_stale(
        &self,
        source: &Path,
        dependencies: &[PathBuf],
        compiled: &str,
        context: &RenderContext,
        now: SystemTime,
    ) -> Result<CacheEntry, CoreError> {
        let path = self.cache_path(source, context);
        let current = match self.policy {
            CachePolicy::ContentHash if self.files.is_file(&path) => {
                content_hash(&self.files.get_content(&path)?) == content_hash(compiled)
            }
            CachePolicy::ContentHash => false,
            CachePolicy::Freshness { .. } => self.fresh_artifact(source, dependencies, context, now)?.is_some(),
        };

        if current {
            info!(source = %source.display(), cache = %path.display(), "artifact is current");
            return Ok(CacheEntry {
                path,
                written: false,
            });
        }

        let parts = self.files.paths(&path);
        if !self.files.exists(&parts.dirname) {
            self.files.create_dir(&parts.dirname)?;
        }
        self.files.put_content(&path, compiled)?;
        info!(source = %source.display(), cache = %path.display(), "artifact written");
        Ok(CacheEntry {
            path,
            written: true,
        })
    }

    fn older_than(&self, path: &Path, expiry: Duration, now: SystemTime) -> Result<bool, CoreError> {
        let modified = self.files.modified(path)?;
        // A modification time in the future counts as recent.
        Ok(now
            .duration_since(modified)
            .is_ok_and(|age| age > expiry))
    }
}

/// Artifact name of a source path (and shared variables, when there are
/// any).
pub fn path_key(source: &Path, context: &RenderContext) -> String {
    let mut material = source.to_string_lossy().into_owned();
    if !context.is_empty() {
        material.push('\0');
        material.push_str(&context.fingerprint());
    }
    hex(fnv1a_hash_str_128(&material))
}

pub fn content_hash(text: &str) -> String {
    hex(fnv1a_hash_str_128(text))
}

fn hex(hash: u128) -> String {
    format!("{hash:032x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFileStream;
    use std::fs;
    use tempfile::tempdir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn input(dir: &Path, name: &str, source: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, source).expect("write input");
        path
    }

    fn mtime(path: &Path) -> SystemTime {
        fs::metadata(path).and_then(|m| m.modified()).expect("mtime")
    }

    #[test]
    fn path_keys_depend_only_on_path_and_context() {
        let context = RenderContext::new();
        let a = path_key(Path::new("views/home.quill.php"), &context);
        assert_eq!(a, path_key(Path::new("views/home.quill.php"), &context));
        assert_ne!(a, path_key(Path::new("views/about.quill.php"), &context));
        assert_eq!(a.len(), 32);

        let mut shared = RenderContext::new();
        shared.share("user", "ann").expect("share");
        assert_ne!(a, path_key(Path::new("views/home.quill.php"), &shared));
    }

    #[test]
    fn content_hash_policy_keeps_identical_output() {
        let dir = tempdir().expect("tempdir");
        let cache_root = dir.path().join("cache");
        let files = LocalFileStream;
        let writer = CacheWriter::new(&files, &cache_root, CachePolicy::ContentHash);
        let source = input(dir.path(), "home", "@{{ $a }}");
        let deps = [source.clone()];
        let context = RenderContext::new();
        let now = SystemTime::now();

        let first = writer
            .write_if_stale(&source, &deps, "<?php echo $a; ?>", &context, now)
            .expect("write");
        assert!(first.written);
        assert_eq!(first.path, writer.cache_path(&source, &context));
        let stamp = mtime(&first.path);

        let second = writer
            .write_if_stale(&source, &deps, "<?php echo $a; ?>", &context, now + Duration::from_secs(10))
            .expect("write");
        assert!(!second.written);
        assert_eq!(second.path, first.path);
        assert_eq!(mtime(&second.path), stamp);
    }

    #[test]
    fn content_hash_policy_overwrites_in_place() {
        let dir = tempdir().expect("tempdir");
        let cache_root = dir.path().join("cache");
        let files = LocalFileStream;
        let writer = CacheWriter::new(&files, &cache_root, CachePolicy::ContentHash);
        let source = input(dir.path(), "home", "x");
        let context = RenderContext::new();

        for version in ["one", "two", "three"] {
            let entry = writer
                .write_if_stale(&source, &[source.clone()], version, &context, SystemTime::now())
                .expect("write");
            assert!(entry.written);
            assert_eq!(fs::read_to_string(&entry.path).expect("read"), version);
        }
        assert_eq!(fs::read_dir(&cache_root).expect("cache dir").count(), 1);
    }

    #[test]
    fn content_hash_policy_never_reuses_without_compiling() {
        let dir = tempdir().expect("tempdir");
        let cache_root = dir.path().join("cache");
        let files = LocalFileStream;
        let writer = CacheWriter::new(&files, &cache_root, CachePolicy::ContentHash);
        let source = input(dir.path(), "home", "x");
        let context = RenderContext::new();
        writer
            .write_if_stale(&source, &[], "x", &context, SystemTime::now())
            .expect("write");

        let later = SystemTime::now() + HOUR * 2;
        assert_eq!(writer.fresh_artifact(&source, &[], &context, later).expect("check"), None);
    }

    #[test]
    fn freshness_policy_rewrites_inside_the_window() {
        let dir = tempdir().expect("tempdir");
        let cache_root = dir.path().join("cache");
        let files = LocalFileStream;
        let writer = CacheWriter::new(&files, &cache_root, CachePolicy::freshness());
        let source = input(dir.path(), "home", "x");
        let deps = [source.clone()];
        let context = RenderContext::new();
        let now = SystemTime::now();

        let first = writer
            .write_if_stale(&source, &deps, "x", &context, now)
            .expect("write");
        assert!(first.written);
        assert_eq!(first.path, cache_root.join(path_key(&source, &context)));

        let again = writer
            .write_if_stale(&source, &deps, "x", &context, now + Duration::from_secs(10))
            .expect("write");
        assert!(again.written);
    }

    #[test]
    fn freshness_policy_skips_when_everything_is_old() {
        let dir = tempdir().expect("tempdir");
        let cache_root = dir.path().join("cache");
        let files = LocalFileStream;
        let writer = CacheWriter::new(&files, &cache_root, CachePolicy::Freshness { expiry: HOUR });
        let deps = [input(dir.path(), "home", "x"), input(dir.path(), "base", "y")];
        let context = RenderContext::new();

        writer
            .write_if_stale(&deps[0], &deps, "x", &context, SystemTime::now())
            .expect("write");
        let later = SystemTime::now() + HOUR + Duration::from_secs(60);
        assert!(
            writer
                .fresh_artifact(&deps[0], &deps, &context, later)
                .expect("check")
                .is_some()
        );
        let entry = writer
            .write_if_stale(&deps[0], &deps, "changed", &context, later)
            .expect("write");
        assert!(!entry.written);
        assert_eq!(fs::read_to_string(&entry.path).expect("read"), "x");
    }

    #[test]
    fn freshness_policy_notices_a_recent_dependency() {
        let dir = tempdir().expect("tempdir");
        let cache_root = dir.path().join("cache");
        let files = LocalFileStream;
        let writer = CacheWriter::new(&files, &cache_root, CachePolicy::Freshness { expiry: HOUR });
        let source = input(dir.path(), "home", "x");
        let context = RenderContext::new();
        writer
            .write_if_stale(&source, &[source.clone()], "x", &context, SystemTime::now())
            .expect("write");

        let later = SystemTime::now() + HOUR * 2;
        let layout = input(dir.path(), "base", "y");
        let backdated = fs::File::options().write(true).open(&layout).expect("open");
        backdated.set_modified(later).expect("set mtime");
        assert_eq!(
            writer
                .fresh_artifact(&source, &[source.clone(), layout], &context, later)
                .expect("check"),
            None
        );
    }
}
