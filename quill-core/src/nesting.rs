//! Open/close marker validation.
//!
//! The default check is textual: it counts opening and closing markers of
//! one construct kind across the raw buffer and requires the counts to be
//! equal. It does not look at order, so `@endif @if(x)` passes. Templates
//! that depend on that leniency keep compiling; [`NestingMode::Structural`]
//! is available for callers that want ordering checked as well.

use tracing::trace;

use crate::error::CoreError;
use crate::syntax::{ConstructKind, ELSE_IF_TOKEN, ELSE_TOKEN, find_token};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NestingMode {
    /// Equal marker counts per construct kind.
    #[default]
    Textual,
    /// Equal counts, and every terminator closes the innermost open block.
    Structural,
}

/// Require equal counts of `open` and `close` in `source`.
///
/// A construct whose opening marker never occurs is simply absent and
/// always validates.
pub fn validate(source: &str, open: &str, close: &str, kind: ConstructKind) -> Result<(), CoreError> {
    let opened = positions(source, open).len();
    if opened == 0 {
        return Ok(());
    }
    let closed = positions(source, close).len();
    trace!(construct = %kind, opened, closed, "nesting counts");
    if opened != closed {
        return Err(CoreError::UnbalancedNesting {
            kind,
            opened,
            closed,
        });
    }
    Ok(())
}

/// Validate one construct kind according to `mode`.
pub fn validate_kind(source: &str, kind: ConstructKind, mode: NestingMode) -> Result<(), CoreError> {
    let Some(close) = kind.close_token() else {
        return Ok(());
    };
    validate(source, kind.open_token(), close, kind)?;
    if mode == NestingMode::Structural {
        validate_structure(source, &[kind])?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Marker {
    Open(ConstructKind),
    Close(ConstructKind),
    Branch(&'static str),
}

/// Walk the markers of `kinds` in source order and check that they form a
/// properly nested tree. Branch markers (`@else`, `@elseif`) must sit
/// directly inside an `@if`.
pub fn validate_structure(source: &str, kinds: &[ConstructKind]) -> Result<(), CoreError> {
    let mut markers: Vec<(usize, Marker)> = Vec::new();
    for &kind in kinds {
        let Some(close) = kind.close_token() else {
            continue;
        };
        markers.extend(positions(source, kind.open_token()).into_iter().map(|at| (at, Marker::Open(kind))));
        markers.extend(positions(source, close).into_iter().map(|at| (at, Marker::Close(kind))));
        if kind == ConstructKind::If {
            for token in [ELSE_IF_TOKEN, ELSE_TOKEN] {
                markers.extend(positions(source, token).into_iter().map(|at| (at, Marker::Branch(token))));
            }
        }
    }
    markers.sort_by_key(|(at, _)| *at);

    let mut stack: Vec<(usize, ConstructKind)> = Vec::new();
    for (position, marker) in markers {
        match marker {
            Marker::Open(kind) => stack.push((position, kind)),
            Marker::Close(kind) => match stack.pop() {
                Some((_, open)) if open == kind => {}
                Some((opened_at, open)) => {
                    return Err(CoreError::MisorderedNesting {
                        kind,
                        position,
                        message: format!("closes {open} opened at byte {opened_at}"),
                    });
                }
                None => {
                    return Err(CoreError::MisorderedNesting {
                        kind,
                        position,
                        message: "terminator without an open block".to_string(),
                    });
                }
            },
            Marker::Branch(token) => {
                if !matches!(stack.last(), Some((_, ConstructKind::If))) {
                    return Err(CoreError::MisorderedNesting {
                        kind: ConstructKind::If,
                        position,
                        message: format!("{token} outside of an @if block"),
                    });
                }
            }
        }
    }

    if let Some((position, kind)) = stack.pop() {
        return Err(CoreError::MisorderedNesting {
            kind,
            position,
            message: "block is never closed".to_string(),
        });
    }
    Ok(())
}

fn positions(source: &str, token: &str) -> Vec<usize> {
    let mut found = Vec::new();
    let mut cursor = 0;
    while let Some(at) = find_token(source, token, cursor) {
        found.push(at);
        cursor = at + token.len();
    }
    found
}
