#![cfg_attr(docsrs, feature(doc_cfg))]

//! # cfront-core
//!
//! A C89 front end: text layer, lexer, preprocessor, and recursive-descent
//! parser, producing a typed AST with resolved scopes.
//!
//! The pipeline, bottom to top:
//!
//! - [`cursor`] — trigraph replacement and line-splice folding over raw bytes
//! - [`file`] — chunked file storage and the [`file::FileLoader`] I/O boundary
//! - [`location`] — [`location::Location`]/[`location::Span`] source positions
//! - [`token`] — [`token::TokenKind`]/[`token::Token`], the lexer's output vocabulary
//! - [`lexer`] — raw token recognition over a [`cursor::TextCursor`]
//! - [`macros`] — macro definitions and expansion bookkeeping
//! - [`conditional`] — the `#if`/`#ifdef` conditional-compilation stack
//! - [`include`] — the `#include` stack and `#pragma once` set
//! - [`preprocessor`] — directive dispatch, tying the above into one token stream
//! - [`types`]/[`ast`] — the arena-indexed type graph and expression/statement trees
//! - [`scope`] — the scoped symbol tables the parser resolves names against
//! - [`parser`] — the recursive-descent parser itself
//! - [`error`] — the diagnostic sink and error taxonomy threaded through every stage
//! - [`session`] — ties a file store, interner, and diagnostics to one compile
//!
//! # Example
//!
//! ```
//! use cfront_core::session::Session;
//!
//! let mut session = Session::new();
//! let tu = session.compile_str("example.c", "int square(int x) { return x * x; }");
//! assert!(!session.diags.has_errors());
//! assert_eq!(tu.items.len(), 1);
//! ```

pub mod ast;
pub mod conditional;
pub mod cursor;
pub mod error;
pub mod file;
pub mod include;
pub mod lexer;
pub mod location;
pub mod macros;
pub mod parser;
pub mod preprocessor;
pub mod scope;
pub mod session;
pub mod token;
pub mod types;

pub use ast::TranslationUnit;
pub use error::{CoreError, Diagnostics, LexError, ParseError, PreprocessError, Severity};
pub use file::{FileId, FileLoader, FileStore, StdFileLoader};
pub use location::{Location, Span};
pub use parser::Parser;
pub use preprocessor::Preprocessor;
pub use session::Session;
pub use token::{Token, TokenKind};
pub use types::{Builtin, Type, TypeArena, TypeId, TypeQualified};
