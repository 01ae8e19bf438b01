use std::path::PathBuf;

use thiserror::Error;

use crate::syntax::ConstructKind;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("template I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing layout extender in {0}")]
    MissingLayout(PathBuf),
    #[error("only one extend allowed, found {count} in {path}")]
    DuplicateExtend { path: PathBuf, count: usize },
    #[error("layout not found: {0}")]
    LayoutNotFound(PathBuf),
    #[error("layout cycle detected: {}", display_chain(.0))]
    LayoutCycle(Vec<PathBuf>),
    #[error("component cycle detected: {}", .0.join(" -> "))]
    ComponentCycle(Vec<String>),
    #[error("unbalanced {kind} nesting: {opened} opened, {closed} closed")]
    UnbalancedNesting {
        kind: ConstructKind,
        opened: usize,
        closed: usize,
    },
    #[error("misordered {kind} nesting at byte {position}: {message}")]
    MisorderedNesting {
        kind: ConstructKind,
        position: usize,
        message: String,
    },
    #[error("undefined section '{name}' referenced from {document}")]
    UndefinedSection { name: String, document: PathBuf },
    #[error("section '{name}' is defined more than once in {document}")]
    DuplicateSection { name: String, document: PathBuf },
    #[error("generator not found: no section for @yield('{0}')")]
    GeneratorNotFound(String),
    #[error("cannot dump an assignment expression: {0}")]
    InvalidDumpTarget(String),
    #[error("malformed {kind} clause '{clause}': {message}")]
    MalformedClause {
        kind: ConstructKind,
        clause: String,
        message: String,
    },
    #[error("invalid shared variable name '{0}'")]
    InvalidVariable(String),
    #[error("unterminated {kind} at byte {position}")]
    UnterminatedConstruct { kind: ConstructKind, position: usize },
}

fn display_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_the_chain() {
        let err = CoreError::LayoutCycle(vec![
            PathBuf::from("a.quill.php"),
            PathBuf::from("b.quill.php"),
            PathBuf::from("a.quill.php"),
        ]);
        assert_eq!(
            err.to_string(),
            "layout cycle detected: a.quill.php -> b.quill.php -> a.quill.php"
        );
    }

    #[test]
    fn nesting_message_names_the_construct() {
        let err = CoreError::UnbalancedNesting {
            kind: ConstructKind::If,
            opened: 1,
            closed: 2,
        };
        assert_eq!(err.to_string(), "unbalanced @if nesting: 1 opened, 2 closed");
    }
}
