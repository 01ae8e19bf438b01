//! Construct extraction.
//!
//! The extractor walks the working buffer looking for one construct kind
//! at a time and produces an [`ExtractionRecord`]: the flat, index-aligned
//! list of every occurrence together with its payload, body and
//! terminator. Block constructs of the same kind may nest; the scanner
//! pairs each opening marker with its nearest unmatched terminator and
//! emits occurrences in pre-order, so an outer block always precedes the
//! blocks it contains. `depths` records how deep each occurrence sits, which
//! is enough to rebuild the tree from the linearization.

use std::collections::BTreeMap;
use std::ops::Range;

use tracing::trace;

use crate::error::CoreError;
use crate::syntax::{Clause, ConstructKind, find_token};

/// Every occurrence of one construct kind in a buffer.
///
/// All vectors are index-aligned: entry `i` of each describes the same
/// occurrence. Entries are only ever appended through [`Self::push`], which
/// keeps the alignment intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRecord {
    pub kind: ConstructKind,
    pub open_delimiter: String,
    pub close_delimiter: String,
    /// Full matched text: header, body and terminator.
    pub matches: Vec<String>,
    /// Inner payload of the parameter clause (name, condition, expression).
    pub content: Vec<String>,
    /// Normalized body text, for constructs that have one.
    pub body: Option<Vec<String>>,
    /// Terminator token text, for constructs that have one.
    pub terminator: Option<Vec<String>>,
    /// Byte range of each full match in the scanned buffer.
    pub spans: Vec<Range<usize>>,
    /// Byte range of the opening marker plus its parameter clause.
    pub header_spans: Vec<Range<usize>>,
    /// Byte range of the terminator token (empty for bodyless constructs).
    pub terminator_spans: Vec<Range<usize>>,
    /// Same-kind nesting depth of each occurrence, zero at top level.
    pub depths: Vec<usize>,
}

/// Borrowed view of a single occurrence inside a record.
#[derive(Debug, Clone, Copy)]
pub struct Occurrence<'a> {
    pub index: usize,
    pub matched: &'a str,
    pub content: &'a str,
    pub body: Option<&'a str>,
    pub span: &'a Range<usize>,
    pub header: &'a Range<usize>,
    pub terminator: Option<&'a Range<usize>>,
    pub depth: usize,
}

impl ExtractionRecord {
    fn new(kind: ConstructKind) -> Self {
        let (open_delimiter, close_delimiter) = match kind.clause() {
            Clause::Curly => (kind.open_token().to_string(), "}}".to_string()),
            Clause::Quoted | Clause::Expression => {
                (format!("{}(", kind.open_token()), ")".to_string())
            }
        };
        let with_body = kind.has_body();
        ExtractionRecord {
            kind,
            open_delimiter,
            close_delimiter,
            matches: Vec::new(),
            content: Vec::new(),
            body: with_body.then(Vec::new),
            terminator: with_body.then(Vec::new),
            spans: Vec::new(),
            header_spans: Vec::new(),
            terminator_spans: Vec::new(),
            depths: Vec::new(),
        }
    }

    fn push(&mut self, source: &str, found: Found) {
        self.matches.push(source[found.span.clone()].to_string());
        self.content.push(found.content);
        if let (Some(bodies), Some(body)) = (self.body.as_mut(), found.body) {
            bodies.push(normalize_body(&source[body]));
        }
        if let (Some(terminators), Some(range)) =
            (self.terminator.as_mut(), found.terminator.clone())
        {
            terminators.push(source[range].to_string());
        }
        self.spans.push(found.span);
        self.header_spans.push(found.header);
        self.terminator_spans.push(found.terminator.unwrap_or(0..0));
        self.depths.push(found.depth);
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Occurrence<'_>> {
        let matched = self.matches.get(index)?;
        Some(Occurrence {
            index,
            matched,
            content: &self.content[index],
            body: self.body.as_ref().map(|bodies| bodies[index].as_str()),
            span: &self.spans[index],
            header: &self.header_spans[index],
            terminator: self
                .terminator
                .as_ref()
                .map(|_| &self.terminator_spans[index]),
            depth: self.depths[index],
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Occurrence<'_>> + '_ {
        (0..self.len()).filter_map(|index| self.get(index))
    }

    /// Group occurrence indices by their payload, e.g. yields by target name.
    pub fn index_by_content(&self) -> BTreeMap<&str, Vec<usize>> {
        let mut keyed: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (index, content) in self.content.iter().enumerate() {
            keyed.entry(content.as_str()).or_default().push(index);
        }
        keyed
    }
}

struct Found {
    span: Range<usize>,
    header: Range<usize>,
    content: String,
    body: Option<Range<usize>>,
    terminator: Option<Range<usize>>,
    depth: usize,
}

struct ParsedClause {
    content: String,
    end: usize,
}

/// Extract every occurrence of `kind` from `source`.
///
/// Returns `Ok(None)` when the construct does not occur at all. A marker
/// that is not followed by a well-formed clause (for instance an `@if`
/// in prose) is skipped, as is a block whose terminator never appears;
/// the nesting validator is responsible for reporting the latter.
pub fn extract(source: &str, kind: ConstructKind) -> Result<Option<ExtractionRecord>, CoreError> {
    let mut scanner = Scanner {
        source,
        kind,
        record: ExtractionRecord::new(kind),
        open_ends: Vec::new(),
    };
    scanner.run()?;
    trace!(construct = %kind, count = scanner.record.len(), "extracted");
    if scanner.record.is_empty() {
        Ok(None)
    } else {
        Ok(Some(scanner.record))
    }
}

struct Scanner<'src> {
    source: &'src str,
    kind: ConstructKind,
    record: ExtractionRecord,
    /// End offsets of the enclosing occurrences, innermost last.
    open_ends: Vec<usize>,
}

impl<'src> Scanner<'src> {
    fn run(&mut self) -> Result<(), CoreError> {
        let open = self.kind.open_token();
        let mut cursor = 0;

        while let Some(start) = find_token(self.source, open, cursor) {
            let after_open = start + open.len();
            let Some(clause) = self.parse_clause(start, after_open)? else {
                cursor = after_open;
                continue;
            };

            if !self.kind.has_body() {
                self.record_found(Found {
                    span: start..clause.end,
                    header: start..clause.end,
                    content: clause.content,
                    body: None,
                    terminator: None,
                    depth: 0,
                });
                cursor = clause.end;
                continue;
            }

            match self.matching_close(clause.end) {
                Some(terminator) => {
                    self.record_found(Found {
                        span: start..terminator.end,
                        header: start..clause.end,
                        content: clause.content,
                        body: Some(clause.end..terminator.start),
                        terminator: Some(terminator),
                        depth: 0,
                    });
                }
                None => trace!(construct = %self.kind, position = start, "no terminator"),
            }
            // Rescan from the end of the header so nested blocks are found.
            cursor = clause.end;
        }

        Ok(())
    }

    fn record_found(&mut self, mut found: Found) {
        while self
            .open_ends
            .last()
            .is_some_and(|&end| end <= found.span.start)
        {
            self.open_ends.pop();
        }
        found.depth = self.open_ends.len();
        if self.kind.has_body() {
            self.open_ends.push(found.span.end);
        }
        self.record.push(self.source, found);
    }

    fn parse_clause(&self, start: usize, after_open: usize) -> Result<Option<ParsedClause>, CoreError> {
        match self.kind.clause() {
            Clause::Curly => {
                let close = find_token(self.source, "}}", after_open).ok_or(
                    CoreError::UnterminatedConstruct {
                        kind: self.kind,
                        position: start,
                    },
                )?;
                Ok(Some(ParsedClause {
                    content: self.source[after_open..close].trim().to_string(),
                    end: close + 2,
                }))
            }
            Clause::Quoted => Ok(self.parse_quoted(after_open)),
            Clause::Expression => {
                Ok(expression_clause(self.source, self.kind, start, after_open)?
                    .map(|(content, end)| ParsedClause { content, end }))
            }
        }
    }

    /// `('name')` with optional whitespace around the quoted argument.
    fn parse_quoted(&self, after_open: usize) -> Option<ParsedClause> {
        let bytes = self.source.as_bytes();
        let mut index = skip_spaces(bytes, after_open);
        if bytes.get(index) != Some(&b'(') {
            return None;
        }
        index = skip_spaces(bytes, index + 1);
        let quote = *bytes.get(index)?;
        if quote != b'\'' && quote != b'"' {
            return None;
        }
        let value_start = index + 1;
        let value_len = self.source[value_start..].find(quote as char)?;
        let value_end = value_start + value_len;
        index = skip_spaces(bytes, value_end + 1);
        if bytes.get(index) != Some(&b')') {
            return None;
        }
        Some(ParsedClause {
            content: self.source[value_start..value_end].to_string(),
            end: index + 1,
        })
    }

    /// Locate the terminator pairing with an opening marker whose header
    /// ends at `from`, skipping over nested same-kind blocks.
    fn matching_close(&self, from: usize) -> Option<Range<usize>> {
        let open = self.kind.open_token();
        let close = self.kind.close_token()?;
        let mut depth = 0usize;
        let mut cursor = from;
        loop {
            let next_close = find_token(self.source, close, cursor)?;
            match find_token(self.source, open, cursor) {
                Some(next_open) if next_open < next_close => {
                    depth += 1;
                    cursor = next_open + open.len();
                }
                _ if depth == 0 => return Some(next_close..next_close + close.len()),
                _ => {
                    depth -= 1;
                    cursor = next_close + close.len();
                }
            }
        }
    }
}

/// Parse an `(expr)` clause starting at `after_open`, where `expr` may
/// itself contain parentheses and quoted strings. Returns the trimmed
/// expression and the offset just past the closing parenthesis, or `None`
/// when no clause follows the marker at `start`.
pub(crate) fn expression_clause(
    source: &str,
    kind: ConstructKind,
    start: usize,
    after_open: usize,
) -> Result<Option<(String, usize)>, CoreError> {
    let bytes = source.as_bytes();
    let open_paren = skip_spaces(bytes, after_open);
    if bytes.get(open_paren) != Some(&b'(') {
        return Ok(None);
    }

    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut index = open_paren;
    while let Some(&ch) = bytes.get(index) {
        match quote {
            Some(q) => {
                if ch == b'\\' {
                    index += 1;
                } else if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                b'\'' | b'"' => quote = Some(ch),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        let content = source[open_paren + 1..index].trim().to_string();
                        return Ok(Some((content, index + 1)));
                    }
                }
                _ => {}
            },
        }
        index += 1;
    }

    Err(CoreError::UnterminatedConstruct {
        kind,
        position: start,
    })
}

fn skip_spaces(bytes: &[u8], mut index: usize) -> usize {
    while bytes.get(index).is_some_and(|ch| ch.is_ascii_whitespace()) {
        index += 1;
    }
    index
}

/// Normalize a construct body so that equal bodies compare equal
/// regardless of how they were indented in the source.
///
/// Tabs are stripped, the line break right after the opening marker and
/// the whitespace before the terminator are dropped, and the common
/// leading indentation of the remaining lines is removed.
pub fn normalize_body(raw: &str) -> String {
    let without_tabs = raw.replace('\t', "");
    let trimmed = without_tabs
        .strip_prefix("\r\n")
        .or_else(|| without_tabs.strip_prefix('\n'))
        .unwrap_or(&without_tabs);
    let trimmed = trimmed.trim_end();

    let indent = trimmed
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches(' ').len())
        .min()
        .unwrap_or(0);

    trimmed
        .lines()
        .map(|line| line.get(indent..).unwrap_or_else(|| line.trim_start_matches(' ')))
        .collect::<Vec<_>>()
        .join("\n")
}
