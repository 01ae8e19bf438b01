//! `@{{ expr }}` resolution.
//!
//! Each interpolation payload is split into an expression and an optional
//! trailing `| filter`, the expression is classified (assignment, variable
//! read, function call, language construct or literal text), and the pair
//! selects the emitted code:
//!
//! | filter | assignment | variable / call | construct | literal |
//! |---|---|---|---|---|
//! | none | `$x = v;` | `echo e;` | text | text |
//! | `upper` `lower` `entities` | `$x = f(v);` | `echo f(e);` | `echo f(e);` | filtered at compile time |
//! | `dump` | error | `var_dump(e);` | `var_dump(e);` | text |
//! | raw (`.`) | `$x = v;` | `e;` | `e;` | text |

use tracing::trace;

use crate::config::RawTags;
use crate::error::CoreError;
use crate::extract::extract;
use crate::substitute::Substitution;
use crate::syntax::{ConstructKind, is_ident_continue, is_ident_start};

/// Language constructs that look like calls or keywords but are not
/// plain function calls.
const RESERVED_WORDS: &[&str] = &[
    "array", "clone", "empty", "eval", "fn", "function", "include", "include_once", "isset",
    "list", "match", "new", "print", "require", "require_once", "static", "unset",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Upper,
    Lower,
    Entities,
    Dump,
    Raw,
}

impl Filter {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "upper" => Some(Filter::Upper),
            "lower" => Some(Filter::Lower),
            "entities" => Some(Filter::Entities),
            "dump" => Some(Filter::Dump),
            "." => Some(Filter::Raw),
            _ => None,
        }
    }

    /// Runtime function applying a text filter.
    fn function(self) -> Option<&'static str> {
        match self {
            Filter::Upper => Some("strtoupper"),
            Filter::Lower => Some("strtolower"),
            Filter::Entities => Some("htmlentities"),
            Filter::Dump | Filter::Raw => None,
        }
    }

    /// Apply a text filter to literal text at compile time.
    fn apply_literal(self, text: &str) -> String {
        match self {
            Filter::Upper => text.to_uppercase(),
            Filter::Lower => text.to_lowercase(),
            Filter::Entities => escape_entities(text),
            Filter::Dump | Filter::Raw => text.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expression<'a> {
    Assignment { target: &'a str, value: &'a str },
    Variable(&'a str),
    Call(&'a str),
    Construct(&'a str),
    Literal(&'a str),
}

impl<'a> Expression<'a> {
    pub fn classify(expr: &'a str) -> Self {
        let expr = expr.trim();
        if let Some(head_end) = variable_head_end(expr) {
            if let Some((eq, after)) = assignment_operator(expr, head_end) {
                return Expression::Assignment {
                    target: expr[..eq].trim_end(),
                    value: expr[after..].trim(),
                };
            }
            return Expression::Variable(expr);
        }

        let word_end = expr
            .char_indices()
            .find(|&(_, ch)| !(is_ident_continue(ch) || ch == '\\' || ch == ':'))
            .map(|(at, _)| at)
            .unwrap_or(expr.len());
        let word = &expr[..word_end];
        if word.starts_with(is_ident_start) || word.starts_with('\\') {
            let keyword = word.to_ascii_lowercase();
            if RESERVED_WORDS.contains(&keyword.as_str()) {
                return Expression::Construct(expr);
            }
            if expr[word_end..].trim_start().starts_with('(') && expr.ends_with(')') {
                return Expression::Call(expr);
            }
        }
        Expression::Literal(expr)
    }
}

/// Split a payload into its expression and an optional trailing filter.
///
/// A leading `.` selects raw output as well. `||` is an operator, never a
/// filter separator, and an unknown name after `|` leaves the payload
/// untouched.
pub fn split_filter(payload: &str) -> (&str, Option<Filter>) {
    let payload = payload.trim();
    if let Some(pipe) = payload.rfind('|') {
        let bytes = payload.as_bytes();
        let doubled = (pipe > 0 && bytes[pipe - 1] == b'|') || bytes.get(pipe + 1) == Some(&b'|');
        if !doubled {
            if let Some(filter) = Filter::from_name(payload[pipe + 1..].trim()) {
                return (payload[..pipe].trim(), Some(filter));
            }
        }
    }
    if let Some(rest) = payload.strip_prefix('.') {
        if !rest.starts_with(|ch: char| ch.is_ascii_digit()) {
            return (rest.trim(), Some(Filter::Raw));
        }
    }
    (payload, None)
}

/// Compile a single interpolation payload.
pub fn resolve_expression(payload: &str, tags: &RawTags) -> Result<String, CoreError> {
    let (expr, filter) = split_filter(payload);
    let expr = expr.trim_end_matches(';').trim_end();
    let class = Expression::classify(expr);
    trace!(expr, ?filter, ?class, "interpolation");

    let resolved = match (filter, class) {
        (None, Expression::Assignment { .. }) => tags.wrap(&format!("{expr};")),
        (None, Expression::Variable(e) | Expression::Call(e)) => tags.wrap(&format!("echo {e};")),
        (None, Expression::Construct(text) | Expression::Literal(text)) => text.to_string(),

        (Some(Filter::Dump), Expression::Assignment { .. }) => {
            return Err(CoreError::InvalidDumpTarget(expr.to_string()));
        }
        (Some(Filter::Dump), Expression::Literal(text)) => text.to_string(),
        (Some(Filter::Dump), _) => tags.wrap(&format!("var_dump({expr});")),

        (Some(Filter::Raw), Expression::Literal(text)) => text.to_string(),
        (Some(Filter::Raw), _) => tags.wrap(&format!("{expr};")),

        (Some(filter), Expression::Assignment { target, value }) => {
            let function = filter.function().unwrap_or_default();
            tags.wrap(&format!("{target} = {function}({value});"))
        }
        (Some(filter), Expression::Literal(text)) => filter.apply_literal(unquote(text)),
        (Some(filter), _) => {
            let function = filter.function().unwrap_or_default();
            tags.wrap(&format!("echo {function}({expr});"))
        }
    };
    Ok(resolved)
}

/// Replace every interpolation in `source` with its compiled form.
pub fn resolve_interpolation(source: &str, tags: &RawTags) -> Result<String, CoreError> {
    let Some(record) = extract(source, ConstructKind::Interpolation)? else {
        return Ok(source.to_string());
    };
    let resolved = record
        .content
        .iter()
        .map(|payload| resolve_expression(payload, tags))
        .collect::<Result<Vec<_>, _>>()?;

    let mut substitution = Substitution::new();
    substitution.replace_all(&record.spans, resolved);
    Ok(substitution.apply(source))
}

/// End offset of a leading `$name` plus any `->prop`, `::prop` or
/// `[index]` accessors.
fn variable_head_end(expr: &str) -> Option<usize> {
    let rest = expr.strip_prefix('$')?;
    if !rest.starts_with(is_ident_start) {
        return None;
    }
    let bytes = expr.as_bytes();
    let mut index = 1 + ident_len(rest);
    loop {
        if expr[index..].starts_with("->") || expr[index..].starts_with("::") {
            let after = index + 2;
            let len = ident_len(&expr[after..]);
            if len == 0 {
                break;
            }
            index = after + len;
        } else if bytes.get(index) == Some(&b'[') {
            let mut depth = 0usize;
            let mut end = None;
            for (offset, ch) in expr[index..].char_indices() {
                match ch {
                    '[' => depth += 1,
                    ']' => {
                        depth -= 1;
                        if depth == 0 {
                            end = Some(index + offset + 1);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            match end {
                Some(end) => index = end,
                None => break,
            }
        } else {
            break;
        }
    }
    Some(index)
}

/// Position of a plain `=` right after the variable head, and the offset
/// just past it. `==`, `===` and `=>` are not assignments.
fn assignment_operator(expr: &str, head_end: usize) -> Option<(usize, usize)> {
    let rest = &expr[head_end..];
    let eq = head_end + (rest.len() - rest.trim_start().len());
    let bytes = expr.as_bytes();
    if bytes.get(eq) != Some(&b'=') {
        return None;
    }
    match bytes.get(eq + 1) {
        Some(b'=') | Some(b'>') => None,
        _ => Some((eq, eq + 1)),
    }
}

fn ident_len(text: &str) -> usize {
    text.char_indices()
        .find(|&(_, ch)| !is_ident_continue(ch))
        .map(|(at, _)| at)
        .unwrap_or(text.len())
}

fn unquote(text: &str) -> &str {
    for quote in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

fn escape_entities(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(payload: &str) -> String {
        resolve_expression(payload, &RawTags::default()).expect("resolve")
    }

    #[test]
    fn classifies_expressions() {
        assert_eq!(
            Expression::classify("$x = $a + 1"),
            Expression::Assignment {
                target: "$x",
                value: "$a + 1"
            }
        );
        assert_eq!(
            Expression::classify("$user->name['first'] = 'Bo'"),
            Expression::Assignment {
                target: "$user->name['first']",
                value: "'Bo'"
            }
        );
        assert_eq!(Expression::classify("$a == $b"), Expression::Variable("$a == $b"));
        assert_eq!(Expression::classify("$user->name"), Expression::Variable("$user->name"));
        assert_eq!(Expression::classify("date('Y')"), Expression::Call("date('Y')"));
        assert_eq!(Expression::classify("isset($x)"), Expression::Construct("isset($x)"));
        assert_eq!(Expression::classify("hello world"), Expression::Literal("hello world"));
        assert_eq!(Expression::classify("'quoted'"), Expression::Literal("'quoted'"));
    }

    #[test]
    fn splits_filters() {
        assert_eq!(split_filter(" $name | upper "), ("$name", Some(Filter::Upper)));
        assert_eq!(split_filter("$a || $b"), ("$a || $b", None));
        assert_eq!(split_filter("$a | FLAG"), ("$a | FLAG", None));
        assert_eq!(split_filter(".$html"), ("$html", Some(Filter::Raw)));
        assert_eq!(split_filter("$html | ."), ("$html", Some(Filter::Raw)));
        assert_eq!(split_filter(".5"), (".5", None));
    }

    #[test]
    fn default_output_echoes_reads_and_calls() {
        assert_eq!(compile("$name"), "<?php echo $name; ?>");
        assert_eq!(compile("date('Y')"), "<?php echo date('Y'); ?>");
        assert_eq!(compile("$count = 3"), "<?php $count = 3; ?>");
        assert_eq!(compile("just text"), "just text");
        assert_eq!(compile("isset($x)"), "isset($x)");
    }

    #[test]
    fn text_filters_wrap_runtime_values() {
        assert_eq!(compile("$name | upper"), "<?php echo strtoupper($name); ?>");
        assert_eq!(compile("$name | lower"), "<?php echo strtolower($name); ?>");
        assert_eq!(compile("$bio | entities"), "<?php echo htmlentities($bio); ?>");
        assert_eq!(compile("$t = $name | upper"), "<?php $t = strtoupper($name); ?>");
    }

    #[test]
    fn text_filters_fold_literals_at_compile_time() {
        assert_eq!(compile("'bob' | upper"), "BOB");
        assert_eq!(compile("LOUD | lower"), "loud");
        assert_eq!(compile("<b> & co | entities"), "&lt;b&gt; &amp; co");
    }

    #[test]
    fn dump_rejects_assignments() {
        assert_eq!(compile("$user | dump"), "<?php var_dump($user); ?>");
        let err = resolve_expression("$user = load() | dump", &RawTags::default()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidDumpTarget(expr) if expr == "$user = load()"));
    }

    #[test]
    fn dump_leaves_literal_text_alone() {
        assert_eq!(compile("hello world | dump"), "hello world");
        assert_eq!(compile("count($items) | dump"), "<?php var_dump(count($items)); ?>");
    }

    #[test]
    fn raw_marker_emits_code_verbatim() {
        assert_eq!(compile(".$html"), "<?php $html; ?>");
        assert_eq!(compile(".render('nav')"), "<?php render('nav'); ?>");
        assert_eq!(compile(".unset($tmp)"), "<?php unset($tmp); ?>");
        assert_eq!(compile(".plain words"), "plain words");
    }

    #[test]
    fn resolves_every_interpolation_in_a_buffer() {
        let source = "<h1>@{{ $title }}</h1><p>@{{ $name | upper }}</p>";
        let compiled = resolve_interpolation(source, &RawTags::default()).expect("resolve");
        assert_eq!(
            compiled,
            "<h1><?php echo $title; ?></h1><p><?php echo strtoupper($name); ?></p>"
        );
    }

    #[test]
    fn custom_tags_are_honored() {
        let tags = RawTags::new("{%", "%}");
        assert_eq!(resolve_expression("$a", &tags).expect("resolve"), "{% echo $a; %}");
    }
}
