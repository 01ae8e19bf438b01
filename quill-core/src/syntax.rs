//! Directive vocabulary of the template DSL.
//!
//! Every construct the compiler understands is described here once:
//! its opening marker, the shape of its parameter clause, and the
//! closing marker that terminates its body (if it has one). The
//! extractor, the nesting validator and the resolvers all read the
//! markers from this table rather than hard-coding strings.

use core::fmt;

/// Kind of a DSL construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstructKind {
    Extend,
    Section,
    Yield,
    Component,
    Interpolation,
    If,
    Loop,
    Foreach,
}

/// Shape of the parameter clause that follows an opening marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    /// `('name')`: a single quoted argument.
    Quoted,
    /// `(expr)`: a balanced parenthesized expression.
    Expression,
    /// `{{ expr }}`: the payload runs up to the closing braces.
    Curly,
}

/// Block constructs compiled to native control flow, in resolution order.
pub const BLOCK_KINDS: [ConstructKind; 3] =
    [ConstructKind::If, ConstructKind::Loop, ConstructKind::Foreach];

/// Branch markers that may appear inside an `@if` body.
pub const ELSE_IF_TOKEN: &str = "@elseif";
pub const ELSE_TOKEN: &str = "@else";

impl ConstructKind {
    pub fn open_token(self) -> &'static str {
        match self {
            ConstructKind::Extend => "@extend",
            ConstructKind::Section => "@section",
            ConstructKind::Yield => "@yield",
            ConstructKind::Component => "@component",
            ConstructKind::Interpolation => "@{{",
            ConstructKind::If => "@if",
            ConstructKind::Loop => "@loop",
            ConstructKind::Foreach => "@foreach",
        }
    }

    /// Marker closing the construct: the body terminator for block
    /// constructs, the closing braces for interpolation.
    pub fn close_token(self) -> Option<&'static str> {
        match self {
            ConstructKind::Section => Some("@stop"),
            ConstructKind::Interpolation => Some("}}"),
            ConstructKind::If => Some("@endif"),
            ConstructKind::Loop => Some("@endloop"),
            ConstructKind::Foreach => Some("@endforeach"),
            ConstructKind::Extend | ConstructKind::Yield | ConstructKind::Component => None,
        }
    }

    pub fn clause(self) -> Clause {
        match self {
            ConstructKind::Extend
            | ConstructKind::Section
            | ConstructKind::Yield
            | ConstructKind::Component => Clause::Quoted,
            ConstructKind::Interpolation => Clause::Curly,
            ConstructKind::If | ConstructKind::Loop | ConstructKind::Foreach => Clause::Expression,
        }
    }

    /// Whether the construct owns a body that ends at its close token.
    pub fn has_body(self) -> bool {
        matches!(
            self,
            ConstructKind::Section | ConstructKind::If | ConstructKind::Loop | ConstructKind::Foreach
        )
    }

    pub fn is_block(self) -> bool {
        BLOCK_KINDS.contains(&self)
    }
}

impl fmt::Display for ConstructKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.open_token())
    }
}

/// Find the next occurrence of a directive token at or after `from`.
///
/// Word-like tokens (`@if`, `@endif`, ...) only match when the next
/// character cannot continue an identifier, so `@if` never matches
/// inside `@iffy` and `@else` never matches the head of `@elseif`.
pub fn find_token(source: &str, token: &str, from: usize) -> Option<usize> {
    let mut cursor = from;
    while cursor <= source.len() {
        let found = cursor + source.get(cursor..)?.find(token)?;
        let after = found + token.len();
        if !ends_with_ident(token) || !source[after..].starts_with(is_ident_continue) {
            return Some(found);
        }
        cursor = after;
    }
    None
}

/// Count every occurrence of a directive token in `source`.
pub fn count_token(source: &str, token: &str) -> usize {
    let mut count = 0;
    let mut cursor = 0;
    while let Some(found) = find_token(source, token, cursor) {
        count += 1;
        cursor = found + token.len();
    }
    count
}

pub fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

pub fn is_ident_continue(ch: char) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}

fn ends_with_ident(token: &str) -> bool {
    token.chars().last().is_some_and(is_ident_continue)
}
