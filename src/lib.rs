//! An embeddable compiler front end for C-Script, a small statically-typed
//! scripting language with references, slices, generics over typedefs,
//! tagged enums and function pointers.
//!
//! The host hands [`compile`] a source buffer and a code buffer, optionally
//! a diagnostic sink and a resolver for `extern fn` names, and gets back an
//! error count, the bytes written and a table of top-level symbols. All
//! state lives in one compiler value per call; nothing is global, so
//! compiling from several threads just means calling [`compile`] from
//! several threads.

pub mod compiler;
pub mod diagnostics;
pub mod eval;
pub mod lexer;
pub mod scope;
pub mod source;
pub mod types;

pub use compiler::{compile, CompileOptions, CompileOutput, Symbol, SymbolKind};
pub use diagnostics::{Code, Diagnostic, DiagnosticSink, Severity};
