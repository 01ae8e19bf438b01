//! Template documents and their section maps.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::config::CompilerConfig;
use crate::error::CoreError;
use crate::extract::extract;
use crate::fs::FileStream;
use crate::nesting::{self, NestingMode};
use crate::substitute::Substitution;
use crate::syntax::ConstructKind;

/// A template source read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    pub source: String,
}

/// Loads documents through the file seam and remembers every document a
/// compilation read, so the cache can account for all of them.
pub struct Loader<'a, F: FileStream> {
    files: &'a F,
    config: &'a CompilerConfig,
    loaded: Vec<Document>,
}

impl<'a, F: FileStream> Loader<'a, F> {
    pub fn new(files: &'a F, config: &'a CompilerConfig) -> Self {
        Loader {
            files,
            config,
            loaded: Vec::new(),
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        self.config
    }

    pub fn files(&self) -> &F {
        self.files
    }

    /// Read the document at `path`.
    pub fn load_path(&mut self, path: &Path) -> Result<Document, CoreError> {
        if let Some(known) = self.loaded.iter().find(|doc| doc.path == path) {
            return Ok(known.clone());
        }
        let source = self.files.get_content(path)?;
        trace!(path = %path.display(), bytes = source.len(), "loaded template");
        let document = Document {
            path: path.to_path_buf(),
            source,
        };
        self.loaded.push(document.clone());
        Ok(document)
    }

    /// Read the document a logical target (`@extend` / `@component`
    /// argument) names, failing with `LayoutNotFound` if it does not exist.
    pub fn load_target(&mut self, target: &str) -> Result<Document, CoreError> {
        let path = self.config.template_path(target);
        if !self.files.is_file(&path) {
            return Err(CoreError::LayoutNotFound(path));
        }
        self.load_path(&path)
    }

    /// Every document read so far, in load order.
    pub fn loaded(&self) -> &[Document] {
        &self.loaded
    }

    pub fn into_loaded(self) -> Vec<Document> {
        self.loaded
    }
}

/// Section name to normalized body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionMap {
    sections: BTreeMap<String, String>,
}

impl SectionMap {
    /// Collect the `@section('name') ... @stop` bodies of one document.
    ///
    /// Section names must be unique within a document.
    pub fn collect(document: &Document, mode: NestingMode) -> Result<Self, CoreError> {
        nesting::validate_kind(&document.source, ConstructKind::Section, mode)?;
        let mut map = SectionMap::default();
        let Some(record) = extract(&document.source, ConstructKind::Section)? else {
            return Ok(map);
        };
        for occurrence in record.iter() {
            let body = occurrence.body.unwrap_or_default().to_string();
            if map.sections.insert(occurrence.content.to_string(), body).is_some() {
                return Err(CoreError::DuplicateSection {
                    name: occurrence.content.to_string(),
                    document: document.path.clone(),
                });
            }
        }
        Ok(map)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.sections.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Add the sections of an ancestor document. Sections already present
    /// (defined closer to the child) win.
    pub fn inherit(&mut self, ancestor: SectionMap) {
        for (name, body) in ancestor.sections {
            self.sections.entry(name).or_insert(body);
        }
    }
}

/// Remove every `@section ... @stop` definition from `source`.
pub fn strip_sections(source: &str) -> Result<String, CoreError> {
    let Some(record) = extract(source, ConstructKind::Section)? else {
        return Ok(source.to_string());
    };
    let mut substitution = Substitution::new();
    substitution.replace_all(&record.spans, record.spans.iter().map(|_| String::new()));
    Ok(substitution.apply(source))
}
