//! `@if` / `@loop` / `@foreach` resolution.
//!
//! Each block's header becomes a native control-flow header and its
//! terminator the matching `end*;` statement, both wrapped in raw-code
//! markers. Only headers, branch markers and terminators are rewritten;
//! the body text between them is left to the other stages.

use tracing::{debug, trace};

use crate::config::RawTags;
use crate::error::CoreError;
use crate::extract::{ExtractionRecord, expression_clause, extract};
use crate::nesting::{self, NestingMode};
use crate::substitute::Substitution;
use crate::syntax::{BLOCK_KINDS, ConstructKind, ELSE_IF_TOKEN, ELSE_TOKEN, find_token};

/// Resolve every block construct in `source`, kind by kind.
pub fn resolve_blocks(source: &str, tags: &RawTags, mode: NestingMode) -> Result<String, CoreError> {
    if mode == NestingMode::Structural {
        for kind in BLOCK_KINDS {
            nesting::validate_kind(source, kind, NestingMode::Textual)?;
        }
        nesting::validate_structure(source, &BLOCK_KINDS)?;
    }
    let mut buffer = source.to_string();
    for kind in BLOCK_KINDS {
        buffer = resolve_kind(&buffer, kind, tags, mode)?;
    }
    Ok(buffer)
}

/// Resolve all blocks of one kind.
pub fn resolve_kind(
    source: &str,
    kind: ConstructKind,
    tags: &RawTags,
    mode: NestingMode,
) -> Result<String, CoreError> {
    let record = extract(source, kind)?;
    nesting::validate_kind(source, kind, mode)?;
    let Some(record) = record else {
        return Ok(source.to_string());
    };
    debug!(construct = %kind, blocks = record.len(), "resolving blocks");

    let mut substitution = Substitution::new();
    for occurrence in record.iter() {
        let header = control_header(kind, occurrence.content)?;
        trace!(construct = %kind, depth = occurrence.depth, %header, "block header");
        substitution.replace(occurrence.header.clone(), tags.wrap(&header));
        if let Some(terminator) = occurrence.terminator {
            substitution.replace(terminator.clone(), tags.wrap(terminator_code(kind)));
        }
    }
    if kind == ConstructKind::If {
        queue_branches(source, &record, tags, &mut substitution)?;
    }
    Ok(substitution.apply(source))
}

/// Native header for a block's condition clause.
pub fn control_header(kind: ConstructKind, clause: &str) -> Result<String, CoreError> {
    match kind {
        ConstructKind::If => Ok(format!("if ({clause}):")),
        ConstructKind::Loop => {
            if clause.matches(';').count() != 2 {
                return Err(CoreError::MalformedClause {
                    kind,
                    clause: clause.to_string(),
                    message: "expected `init; condition; step`".to_string(),
                });
            }
            Ok(format!("for ({clause}):"))
        }
        ConstructKind::Foreach => {
            let (iterable, binding) = split_as(clause).ok_or_else(|| CoreError::MalformedClause {
                kind,
                clause: clause.to_string(),
                message: "expected `iterable as [key =>] value`".to_string(),
            })?;
            if iterable.is_empty() || binding.is_empty() {
                return Err(CoreError::MalformedClause {
                    kind,
                    clause: clause.to_string(),
                    message: "iterable and value must not be empty".to_string(),
                });
            }
            Ok(format!("foreach ({clause}):"))
        }
        other => Err(CoreError::MalformedClause {
            kind: other,
            clause: clause.to_string(),
            message: "not a block construct".to_string(),
        }),
    }
}

pub fn terminator_code(kind: ConstructKind) -> &'static str {
    match kind {
        ConstructKind::Loop => "endfor;",
        ConstructKind::Foreach => "endforeach;",
        _ => "endif;",
    }
}

/// Rewrite `@elseif(cond)` and `@else` markers that sit inside a resolved
/// `@if` body. Markers outside every `@if` are left as text.
fn queue_branches(
    source: &str,
    record: &ExtractionRecord,
    tags: &RawTags,
    substitution: &mut Substitution,
) -> Result<(), CoreError> {
    let inside_if = |at: usize| {
        record
            .iter()
            .any(|occurrence| occurrence.header.end <= at && occurrence.span.end > at)
    };

    let mut cursor = 0;
    while let Some(at) = find_token(source, ELSE_IF_TOKEN, cursor) {
        let after = at + ELSE_IF_TOKEN.len();
        cursor = after;
        if !inside_if(at) {
            continue;
        }
        if let Some((condition, end)) = expression_clause(source, ConstructKind::If, at, after)? {
            substitution.replace(at..end, tags.wrap(&format!("elseif ({condition}):")));
            cursor = end;
        }
    }

    cursor = 0;
    while let Some(at) = find_token(source, ELSE_TOKEN, cursor) {
        cursor = at + ELSE_TOKEN.len();
        if inside_if(at) {
            substitution.replace(at..cursor, tags.wrap("else:"));
        }
    }
    Ok(())
}

/// Split `iterable as binding` on the first top-level ` as `.
fn split_as(clause: &str) -> Option<(&str, &str)> {
    let lower = clause.to_ascii_lowercase();
    let at = lower.find(" as ")?;
    Some((clause[..at].trim(), clause[at + 4..].trim()))
}
