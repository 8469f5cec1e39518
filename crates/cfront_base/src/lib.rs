#![cfg_attr(docsrs, feature(doc_cfg))]

//! # cfront-base
//!
//! Pure structural atoms for the cfront compiler front end.
//!
//! This crate provides the foundational types used throughout cfront:
//!
//! - [`Interner`]/[`Symbol`] — String interning for O(1) identifier equality
//!
//! # Design Principles
//!
//! This crate has **no knowledge of C syntax or file I/O**. It provides only
//! generic, reusable infrastructure that `cfront-core` builds upon. Types
//! that recurse on themselves (the C type graph, the AST) are *not* modeled
//! here as arena references — `cfront-core` addresses those by `Copy` index
//! instead, since a pointer-based recursive graph would need self-referential
//! lifetimes that bump allocation alone cannot express safely. See
//! `cfront-core`'s `types`/`ast` modules.
//!
//! # Example
//!
//! ```
//! use cfront_base::Interner;
//!
//! let mut interner = Interner::new();
//!
//! let hello = interner.intern("hello");
//! assert_eq!(interner.resolve(hello), "hello");
//! ```

pub mod intern;

pub use intern::{Interner, Symbol, SymbolEq};
