//! `@component` resolution.
//!
//! `@component('name')` reuses a section defined in the document being
//! compiled. Sections its layouts define are not visible. A
//! `@component('path|name')` reuses a section defined in another template.
//! That template's layout chain is still resolved, so a broken chain is
//! reported, but only the sections it defines itself can be referenced.
//! Component bodies may reference further components, which resolve in the
//! scope of the document the body came from.

use std::path::Path;

use tracing::{debug, trace};

use crate::document::{Loader, SectionMap};
use crate::error::CoreError;
use crate::extract::extract;
use crate::fs::FileStream;
use crate::layout::walk_chain;
use crate::substitute::Substitution;
use crate::syntax::ConstructKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentRef<'a> {
    Internal { name: &'a str },
    External { template: &'a str, name: &'a str },
}

impl<'a> ComponentRef<'a> {
    pub fn parse(reference: &'a str) -> Self {
        match reference.split_once('|') {
            Some((template, name)) => ComponentRef::External {
                template: template.trim(),
                name: name.trim(),
            },
            None => ComponentRef::Internal {
                name: reference.trim(),
            },
        }
    }
}

/// Replace every `@component` in `source` with the section body it names.
///
/// `document` is the template `source` came from and `sections` the
/// sections that document defines itself.
pub fn resolve_components<F: FileStream>(
    loader: &mut Loader<'_, F>,
    document: &Path,
    source: &str,
    sections: &SectionMap,
) -> Result<String, CoreError> {
    resolve_in_scope(loader, document, source, sections, &mut Vec::new())
}

fn resolve_in_scope<F: FileStream>(
    loader: &mut Loader<'_, F>,
    document: &Path,
    source: &str,
    sections: &SectionMap,
    expanding: &mut Vec<String>,
) -> Result<String, CoreError> {
    let Some(record) = extract(source, ConstructKind::Component)? else {
        return Ok(source.to_string());
    };
    if expanding.is_empty() {
        debug!(document = %document.display(), components = record.len(), "resolving components");
    }

    let mut resolved = Vec::with_capacity(record.len());
    for reference in &record.content {
        let body = match ComponentRef::parse(reference) {
            ComponentRef::Internal { name } => {
                let body = sections.get(name).ok_or_else(|| CoreError::UndefinedSection {
                    name: name.to_string(),
                    document: document.to_path_buf(),
                })?;
                let key = format!("{}|{name}", document.display());
                enter(expanding, key)?;
                let body = resolve_in_scope(loader, document, body, sections, expanding)?;
                expanding.pop();
                body
            }
            ComponentRef::External { template, name } => {
                let other = loader.load_target(template)?;
                walk_chain(loader, &other)?;
                let own = SectionMap::collect(&other, loader.config().nesting)?;
                let body = own.get(name).ok_or_else(|| CoreError::UndefinedSection {
                    name: name.to_string(),
                    document: other.path.clone(),
                })?;
                let key = format!("{}|{name}", other.path.display());
                enter(expanding, key)?;
                let body = resolve_in_scope(loader, &other.path, body, &own, expanding)?;
                expanding.pop();
                body
            }
        };
        trace!(reference = %reference, "component resolved");
        resolved.push(body);
    }

    let mut substitution = Substitution::new();
    substitution.replace_all(&record.spans, resolved);
    Ok(substitution.apply(source))
}

fn enter(expanding: &mut Vec<String>, key: String) -> Result<(), CoreError> {
    if expanding.contains(&key) {
        let mut cycle = expanding.clone();
        cycle.push(key);
        return Err(CoreError::ComponentCycle(cycle));
    }
    expanding.push(key);
    Ok(())
}
