//! Layout inheritance: `@extend`, `@section ... @stop` and `@yield`.
//!
//! A child document names one parent layout. The parent may itself extend
//! another layout; the chain is followed up to a root layout that extends
//! nothing. Section maps merge along the way with the definition closest to
//! the child winning, and the root layout's yields are then filled from the
//! merged map. Yields inside inserted section bodies are filled too, which
//! is how a middle layout passes a child's section through to the root.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::document::{Document, Loader, SectionMap, strip_sections};
use crate::error::CoreError;
use crate::extract::extract;
use crate::fs::FileStream;
use crate::nesting::NestingMode;
use crate::substitute::Substitution;
use crate::syntax::ConstructKind;

/// A document with its layout chain resolved into a single buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flattened {
    pub buffer: String,
    /// Sections of the whole chain, child definitions first. Only yields
    /// are filled from this map.
    pub sections: SectionMap,
    /// Documents of the chain, child first, root layout last.
    pub chain: Vec<PathBuf>,
}

/// The documents a child inherits from, and their merged sections.
#[derive(Debug, Clone)]
pub struct LayoutChain {
    pub sections: SectionMap,
    pub root: Document,
    pub documents: Vec<PathBuf>,
}

/// Target of the document's single `@extend`, if it has one.
pub fn extend_target(document: &Document) -> Result<Option<String>, CoreError> {
    match extract(&document.source, ConstructKind::Extend)? {
        None => Ok(None),
        Some(record) if record.len() > 1 => Err(CoreError::DuplicateExtend {
            path: document.path.clone(),
            count: record.len(),
        }),
        Some(mut record) => Ok(record.content.pop()),
    }
}

/// Follow `@extend` from `document` to its root layout.
///
/// A document that does not extend anything is its own root.
pub fn walk_chain<F: FileStream>(
    loader: &mut Loader<'_, F>,
    document: &Document,
) -> Result<LayoutChain, CoreError> {
    let mode = loader.config().nesting;
    let mut sections = SectionMap::collect(document, mode)?;
    let mut documents = vec![document.path.clone()];
    let mut current = document.clone();

    while let Some(target) = extend_target(&current)? {
        let parent = loader.load_target(&target)?;
        if documents.contains(&parent.path) {
            documents.push(parent.path);
            return Err(CoreError::LayoutCycle(documents));
        }
        trace!(child = %current.path.display(), layout = %parent.path.display(), "extends");
        documents.push(parent.path.clone());
        sections.inherit(SectionMap::collect(&parent, mode)?);
        current = parent;
    }

    Ok(LayoutChain {
        sections,
        root: current,
        documents,
    })
}

/// Paths of `document` and every layout it extends, child first.
///
/// Only the `@extend` markers are read; sections are not validated.
pub fn chain_paths<F: FileStream>(
    loader: &mut Loader<'_, F>,
    document: &Document,
) -> Result<Vec<PathBuf>, CoreError> {
    let mut paths = vec![document.path.clone()];
    let mut current = document.clone();
    while let Some(target) = extend_target(&current)? {
        let parent = loader.load_target(&target)?;
        if paths.contains(&parent.path) {
            paths.push(parent.path);
            return Err(CoreError::LayoutCycle(paths));
        }
        paths.push(parent.path.clone());
        current = parent;
    }
    Ok(paths)
}

/// Flatten a child document into its layout.
///
/// The document must contain exactly one `@extend`; every `@yield` of the
/// root layout must be filled by some section of the chain.
pub fn resolve_layout<F: FileStream>(
    loader: &mut Loader<'_, F>,
    document: &Document,
) -> Result<Flattened, CoreError> {
    if extend_target(document)?.is_none() {
        return Err(CoreError::MissingLayout(document.path.clone()));
    }
    let chain = walk_chain(loader, document)?;
    debug!(
        document = %document.path.display(),
        depth = chain.documents.len() - 1,
        sections = chain.sections.len(),
        "resolving layout"
    );

    let root = strip_sections(&chain.root.source)?;
    let buffer = fill_yields(&root, &chain.sections, true)?;
    Ok(Flattened {
        buffer,
        sections: chain.sections,
        chain: chain.documents,
    })
}

/// Prepare a document that extends nothing.
///
/// Its section definitions are reusable bodies rather than output, so they
/// are removed from the buffer. Yields it fills itself are substituted and
/// the rest compile to nothing.
pub fn resolve_standalone(document: &Document, mode: NestingMode) -> Result<Flattened, CoreError> {
    let sections = SectionMap::collect(document, mode)?;
    let stripped = strip_sections(&document.source)?;
    let buffer = fill_yields(&stripped, &sections, false)?;
    Ok(Flattened {
        buffer,
        sections,
        chain: vec![document.path.clone()],
    })
}

/// Replace every `@yield('name')` in `source` with the body of section
/// `name`, re-indented to the column the yield line starts at.
///
/// With `strict`, a yield without a section is a `GeneratorNotFound`
/// error; otherwise it is removed.
pub fn fill_yields(source: &str, sections: &SectionMap, strict: bool) -> Result<String, CoreError> {
    expand(source, sections, strict, &mut Vec::new())
}

fn expand(
    source: &str,
    sections: &SectionMap,
    strict: bool,
    filling: &mut Vec<String>,
) -> Result<String, CoreError> {
    let Some(record) = extract(source, ConstructKind::Yield)? else {
        return Ok(source.to_string());
    };

    let mut substitution = Substitution::new();
    for (name, indices) in record.index_by_content() {
        // A section cannot fill a yield inside its own body.
        let body = match sections.get(name) {
            Some(body) if !filling.iter().any(|open| open == name) => body,
            _ if strict => return Err(CoreError::GeneratorNotFound(name.to_string())),
            _ => {
                trace!(name, "dropping unfilled yield");
                for index in indices {
                    substitution.replace(record.spans[index].clone(), "");
                }
                continue;
            }
        };

        filling.push(name.to_string());
        let body = expand(body, sections, strict, filling)?;
        filling.pop();

        for index in indices {
            let span = record.spans[index].clone();
            let indent = line_indent(source, span.start);
            substitution.replace(span, reindent(&body, indent));
        }
    }
    Ok(substitution.apply(source))
}

/// Leading whitespace of the line containing byte `at`.
fn line_indent(source: &str, at: usize) -> &str {
    let line_start = source[..at].rfind('\n').map_or(0, |newline| newline + 1);
    let line = &source[line_start..at];
    let width = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..width]
}

/// Prefix every line after the first with `indent`; the first line lands
/// where the yield marker was, after the existing indentation.
fn reindent(body: &str, indent: &str) -> String {
    if indent.is_empty() {
        return body.to_string();
    }
    let mut lines = body.lines();
    let mut output = lines.next().unwrap_or_default().to_string();
    for line in lines {
        output.push('\n');
        if !line.is_empty() {
            output.push_str(indent);
            output.push_str(line);
        }
    }
    output
}
