//! Core of the quill view template compiler.
//!
//! Templates are compiled into plain target-language code in a fixed
//! pipeline:
//!
//!   source .quill.php
//!     -> layout     (@extend / @section / @yield)
//!     -> component  (@component)
//!     -> interpolation (@{{ expr | filter }})
//!     -> blocks     (@if / @loop / @foreach)
//!     -> cache      (artifact on disk)
//!
//! Higher-level tools (CLI, view renderers) should depend on this crate
//! rather than reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling and configuration
// ---------------------------------------------------------------------

pub mod error;
pub mod config;
pub mod context;

// ---------------------------------------------------------------------
// Scanning: construct syntax, extraction, validation, substitution
// ---------------------------------------------------------------------

pub mod syntax;
pub mod extract;
pub mod nesting;
pub mod substitute;

// ---------------------------------------------------------------------
// Resolvers
// ---------------------------------------------------------------------

pub mod document;
pub mod layout;
pub mod component;
pub mod interpolation;
pub mod blocks;

// ---------------------------------------------------------------------
// Persistence and compiler orchestration
// ---------------------------------------------------------------------

pub mod fs;
pub mod cache;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use cache::CacheEntry;
pub use compiler::{CompiledTemplate, Compiler, Translate, Translator};
pub use config::{CachePolicy, CompilerConfig, RawTags};
pub use context::RenderContext;
pub use error::CoreError;
pub use fs::{FileStream, LocalFileStream};
pub use nesting::NestingMode;
pub use syntax::ConstructKind;
