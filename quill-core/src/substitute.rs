//! Span replacement shared by every resolver.
//!
//! Resolvers never edit the working buffer directly. They queue
//! `(span, replacement)` pairs taken from an extraction record of the
//! current buffer and apply them in one pass, producing the next buffer.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub span: Range<usize>,
    pub replacement: String,
}

#[derive(Debug, Default)]
pub struct Substitution {
    edits: Vec<Edit>,
}

impl Substitution {
    pub fn new() -> Self {
        Substitution { edits: Vec::new() }
    }

    pub fn replace(&mut self, span: Range<usize>, replacement: impl Into<String>) -> &mut Self {
        self.edits.push(Edit {
            span,
            replacement: replacement.into(),
        });
        self
    }

    /// Queue index-aligned replacements: `spans[i]` becomes `resolved[i]`.
    pub fn replace_all<I>(&mut self, spans: &[Range<usize>], resolved: I) -> &mut Self
    where
        I: IntoIterator<Item = String>,
    {
        let resolved: Vec<String> = resolved.into_iter().collect();
        debug_assert_eq!(spans.len(), resolved.len(), "substitution pairs out of alignment");
        for (span, replacement) in spans.iter().zip(resolved) {
            self.replace(span.clone(), replacement);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Apply every queued edit to `source`.
    ///
    /// Edits are applied in source order. An edit whose span starts inside
    /// an earlier edit's span is dropped: the enclosing replacement already
    /// covers that text.
    pub fn apply(mut self, source: &str) -> String {
        self.edits
            .sort_by(|a, b| a.span.start.cmp(&b.span.start).then(b.span.end.cmp(&a.span.end)));

        let mut output = String::with_capacity(source.len());
        let mut cursor = 0;
        for edit in self.edits {
            if edit.span.start < cursor {
                continue;
            }
            output.push_str(&source[cursor..edit.span.start]);
            output.push_str(&edit.replacement);
            cursor = edit.span.end;
        }
        output.push_str(&source[cursor..]);
        output
    }
}
