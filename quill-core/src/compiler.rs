//! Compiler facade.
//!
//! [`Compiler`] runs the fixed pipeline over one source document:
//!
//!   extend -> sections -> layout substitution -> components
//!     -> interpolation -> blocks -> cache write
//!
//! The working buffer is owned by a single call; nothing survives between
//! calls except the artifacts on disk. The cache is written only after
//! every stage succeeded. Under [`CachePolicy::Freshness`] a fresh artifact
//! is returned as is and the pipeline does not run at all.
//!
//! [`CachePolicy::Freshness`]: crate::config::CachePolicy::Freshness

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::blocks;
use crate::cache::CacheWriter;
use crate::component::resolve_components;
use crate::config::{CompilerConfig, RawTags};
use crate::context::RenderContext;
use crate::document::{Document, Loader, SectionMap};
use crate::error::CoreError;
use crate::extract::{self, ExtractionRecord};
use crate::fs::{FileStream, LocalFileStream};
use crate::interpolation;
use crate::layout::{chain_paths, extend_target, resolve_layout, resolve_standalone};
use crate::nesting::{self, NestingMode};
use crate::syntax::ConstructKind;

/// Buffer-level operations of the compiler.
pub trait Translate {
    fn extract(&self, source: &str, kind: ConstructKind) -> Result<Option<ExtractionRecord>, CoreError>;

    fn validate_nesting(&self, source: &str, kind: ConstructKind) -> Result<(), CoreError>;

    fn resolve_interpolation(&self, source: &str) -> Result<String, CoreError>;

    fn resolve_blocks(&self, source: &str) -> Result<String, CoreError>;
}

/// Stateless buffer translator configured with the target's raw-code
/// markers and the nesting mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translator {
    pub tags: RawTags,
    pub nesting: NestingMode,
}

impl Translator {
    pub fn new(tags: RawTags, nesting: NestingMode) -> Self {
        Translator { tags, nesting }
    }
}

impl Translate for Translator {
    fn extract(&self, source: &str, kind: ConstructKind) -> Result<Option<ExtractionRecord>, CoreError> {
        extract::extract(source, kind)
    }

    fn validate_nesting(&self, source: &str, kind: ConstructKind) -> Result<(), CoreError> {
        nesting::validate_kind(source, kind, self.nesting)
    }

    fn resolve_interpolation(&self, source: &str) -> Result<String, CoreError> {
        interpolation::resolve_interpolation(source, &self.tags)
    }

    fn resolve_blocks(&self, source: &str) -> Result<String, CoreError> {
        blocks::resolve_blocks(source, &self.tags, self.nesting)
    }
}

/// Result of compiling one template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTemplate {
    pub source: PathBuf,
    pub cache_path: PathBuf,
    pub text: String,
    /// Whether the artifact was written by this compile.
    pub written: bool,
    /// Every document read, the source first.
    pub dependencies: Vec<PathBuf>,
}

pub struct Compiler<F: FileStream = LocalFileStream> {
    config: CompilerConfig,
    files: F,
    translator: Translator,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Compiler::with_files(config, LocalFileStream)
    }
}

impl<F: FileStream> Compiler<F> {
    pub fn with_files(config: CompilerConfig, files: F) -> Self {
        let translator = Translator::new(config.tags.clone(), config.nesting);
        Compiler {
            config,
            files,
            translator,
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    /// Compile the template at `path` and persist the artifact.
    pub fn compile(&self, path: impl AsRef<Path>) -> Result<CompiledTemplate, CoreError> {
        self.compile_with(path, &RenderContext::default())
    }

    pub fn compile_with(
        &self,
        path: impl AsRef<Path>,
        context: &RenderContext,
    ) -> Result<CompiledTemplate, CoreError> {
        self.compile_at(path.as_ref(), context, SystemTime::now())
    }

    /// Compile a template by logical name, e.g. `pages/home`.
    pub fn compile_view(&self, name: &str, context: &RenderContext) -> Result<CompiledTemplate, CoreError> {
        let path = self.config.template_path(name);
        self.compile_at(&path, context, SystemTime::now())
    }

    /// Compile with an explicit clock for the freshness check.
    pub fn compile_at(
        &self,
        path: &Path,
        context: &RenderContext,
        now: SystemTime,
    ) -> Result<CompiledTemplate, CoreError> {
        let writer = CacheWriter::new(&self.files, &self.config.cache_root, self.config.cache_policy);
        if let Some(reused) = self.reuse_fresh(&writer, path, context, now)? {
            return Ok(reused);
        }

        let mut loader = Loader::new(&self.files, &self.config);
        let document = loader.load_path(path)?;
        let text = self.translate(&mut loader, &document, context)?;
        let dependencies: Vec<PathBuf> = loader.into_loaded().into_iter().map(|input| input.path).collect();

        let entry = writer.write_if_stale(&document.path, &dependencies, &text, context, now)?;
        Ok(CompiledTemplate {
            source: document.path,
            cache_path: entry.path,
            text,
            written: entry.written,
            dependencies,
        })
    }

    /// Return the cached artifact without running the pipeline when the
    /// policy allows it. Only the `@extend` chain is read to find out.
    fn reuse_fresh(
        &self,
        writer: &CacheWriter<'_, F>,
        path: &Path,
        context: &RenderContext,
        now: SystemTime,
    ) -> Result<Option<CompiledTemplate>, CoreError> {
        if writer.fresh_artifact(path, &[], context, now)?.is_none() {
            return Ok(None);
        }

        let mut loader = Loader::new(&self.files, &self.config);
        let document = loader.load_path(path)?;
        let chain = chain_paths(&mut loader, &document)?;
        let Some(cache_path) = writer.fresh_artifact(&document.path, &chain, context, now)? else {
            return Ok(None);
        };

        debug!(template = %document.path.display(), cache = %cache_path.display(), "stage: reuse");
        let text = self.files.get_content(&cache_path)?;
        Ok(Some(CompiledTemplate {
            source: document.path,
            cache_path,
            text,
            written: false,
            dependencies: chain,
        }))
    }

    /// Compile template text that is not on disk. Layouts and external
    /// components still resolve against the views root. Nothing is cached.
    pub fn compile_source(
        &self,
        path: impl Into<PathBuf>,
        source: impl Into<String>,
        context: &RenderContext,
    ) -> Result<String, CoreError> {
        let document = Document {
            path: path.into(),
            source: source.into(),
        };
        let mut loader = Loader::new(&self.files, &self.config);
        self.translate(&mut loader, &document, context)
    }

    fn translate(
        &self,
        loader: &mut Loader<'_, F>,
        document: &Document,
        context: &RenderContext,
    ) -> Result<String, CoreError> {
        let path = document.path.display();

        let flattened = match extend_target(document)? {
            Some(target) => {
                debug!(template = %path, layout = %target, "stage: layout");
                resolve_layout(loader, document)?
            }
            None => {
                debug!(template = %path, "stage: standalone");
                resolve_standalone(document, self.config.nesting)?
            }
        };

        // Internal components only see what this document defines itself.
        let own = SectionMap::collect(document, self.config.nesting)?;
        debug!(template = %path, sections = own.len(), "stage: components");
        let buffer = resolve_components(loader, &document.path, &flattened.buffer, &own)?;

        debug!(template = %path, "stage: interpolation");
        let buffer = self.resolve_interpolation(&buffer)?;

        debug!(template = %path, "stage: blocks");
        let buffer = self.resolve_blocks(&buffer)?;

        if context.is_empty() {
            Ok(buffer)
        } else {
            Ok(context.prelude(&self.config.tags) + &buffer)
        }
    }
}

impl<F: FileStream> Translate for Compiler<F> {
    fn extract(&self, source: &str, kind: ConstructKind) -> Result<Option<ExtractionRecord>, CoreError> {
        self.translator.extract(source, kind)
    }

    fn validate_nesting(&self, source: &str, kind: ConstructKind) -> Result<(), CoreError> {
        self.translator.validate_nesting(source, kind)
    }

    fn resolve_interpolation(&self, source: &str) -> Result<String, CoreError> {
        self.translator.resolve_interpolation(source)
    }

    fn resolve_blocks(&self, source: &str) -> Result<String, CoreError> {
        self.translator.resolve_blocks(source)
    }
}
