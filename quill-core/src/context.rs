//! Per-compilation render context.
//!
//! Variables shared with every view are carried explicitly in a
//! [`RenderContext`] value and handed to each compile call. The compiler
//! emits them as a prelude of assignments at the head of the artifact, so
//! two contexts never leak into each other and never share an artifact.

use std::collections::BTreeMap;

use crate::config::RawTags;
use crate::error::CoreError;
use crate::syntax::{is_ident_continue, is_ident_start};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderContext {
    shared: BTreeMap<String, String>,
}

impl RenderContext {
    pub fn new() -> Self {
        RenderContext::default()
    }

    /// Share a string variable with the compiled view. The name may be
    /// given with or without its leading `$`.
    pub fn share(&mut self, name: &str, value: impl Into<String>) -> Result<&mut Self, CoreError> {
        let bare = name.strip_prefix('$').unwrap_or(name);
        let valid = bare.starts_with(is_ident_start) && bare.chars().all(is_ident_continue);
        if !valid {
            return Err(CoreError::InvalidVariable(name.to_string()));
        }
        self.shared.insert(bare.to_string(), value.into());
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let bare = name.strip_prefix('$').unwrap_or(name);
        self.shared.get(bare).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// Assignment statements binding every shared variable, one per line.
    pub fn prelude(&self, tags: &RawTags) -> String {
        self.shared
            .iter()
            .map(|(name, value)| format!("{}\n", tags.wrap(&format!("${name} = {};", quote(value)))))
            .collect()
    }

    /// Stable textual identity of the shared variables.
    pub fn fingerprint(&self) -> String {
        self.shared
            .iter()
            .map(|(name, value)| format!("{name}={value}\0"))
            .collect()
    }
}

/// Single-quoted string literal of the target language.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_binds_shared_variables_in_name_order() {
        let mut context = RenderContext::new();
        context
            .share("$title", "Home")
            .expect("share")
            .share("name", "bob")
            .expect("share");
        assert_eq!(
            context.prelude(&RawTags::default()),
            "<?php $name = 'bob'; ?>\n<?php $title = 'Home'; ?>\n"
        );
        assert_eq!(context.get("$name"), Some("bob"));
    }

    #[test]
    fn values_are_escaped() {
        let mut context = RenderContext::new();
        context.share("quote", r"it's a \ path").expect("share");
        assert_eq!(
            context.prelude(&RawTags::default()),
            "<?php $quote = 'it\\'s a \\\\ path'; ?>\n"
        );
    }

    #[test]
    fn rejects_invalid_names() {
        let mut context = RenderContext::new();
        assert!(matches!(
            context.share("not a name", "x").unwrap_err(),
            CoreError::InvalidVariable(_)
        ));
        assert!(matches!(context.share("$1st", "x").unwrap_err(), CoreError::InvalidVariable(_)));
        assert!(context.is_empty());
    }

    #[test]
    fn contexts_are_independent() {
        let mut first = RenderContext::new();
        first.share("user", "ann").expect("share");
        let second = RenderContext::new();
        assert_ne!(first.fingerprint(), second.fingerprint());
        assert_eq!(second.get("user"), None);
    }
}
