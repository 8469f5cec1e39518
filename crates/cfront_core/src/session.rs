//! Wires a [`FileStore`], [`Interner`], and [`Diagnostics`] to a
//! [`Preprocessor`]/[`Parser`] pair for one compilation (§6).
//!
//! `Session` is the one long-lived owner of compilation state; `Preprocessor`
//! and `Parser` are created fresh per translation unit and borrow from it,
//! the same shape `cfront-cli` needs to print diagnostics after parsing runs.

use std::path::PathBuf;

use cfront_base::Interner;

use crate::ast::TranslationUnit;
use crate::error::{CoreError, Diagnostics};
use crate::file::{FileId, FileStore, StdFileLoader};
use crate::parser::Parser;
use crate::preprocessor::Preprocessor;

/// Owns the file store, string interner, and diagnostic sink for one
/// compilation. A fresh `Session` per translation unit keeps symbol tables
/// and file ids from leaking between unrelated compiles.
pub struct Session {
    pub store: FileStore,
    pub interner: Interner,
    pub diags: Diagnostics,
    search_path: Vec<PathBuf>,
}

impl Session {
    pub fn new() -> Self {
        Session {
            store: FileStore::new(),
            interner: Interner::new(),
            diags: Diagnostics::new(),
            search_path: Vec::new(),
        }
    }

    pub fn with_search_path(search_path: Vec<PathBuf>) -> Self {
        Session {
            search_path,
            ..Self::new()
        }
    }

    /// Compiles already-in-memory source text under a synthetic file name,
    /// used by tests and by the CLI's `-` (stdin) mode.
    pub fn compile_str(&mut self, name: impl Into<PathBuf>, source: &str) -> TranslationUnit {
        let file_id = self.store.add_str(name, source);
        self.compile_file_id(file_id)
    }

    /// Loads `path` from disk and compiles it.
    pub fn compile_file(&mut self, path: impl Into<PathBuf>) -> Result<TranslationUnit, CoreError> {
        let path = path.into();
        let bytes = std::fs::read(&path).map_err(|source| CoreError::Io {
            path: path.clone(),
            source,
        })?;
        let contents = crate::file::FileContents::from_bytes(&bytes);
        let file_id = self.store.add(path, contents);
        Ok(self.compile_file_id(file_id))
    }

    fn compile_file_id(&mut self, file_id: FileId) -> TranslationUnit {
        let mut pp = Preprocessor::new(file_id, self.search_path.clone(), Box::new(StdFileLoader));
        let parser = Parser::new(&mut pp, &mut self.store, &mut self.interner, &mut self.diags);
        parser.parse_translation_unit()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_str_runs_end_to_end() {
        let mut session = Session::new();
        let tu = session.compile_str("test.c", "int x = 1 + 2;");
        assert!(!session.diags.has_errors());
        assert_eq!(tu.items.len(), 1);
    }

    #[test]
    fn macro_expansion_feeds_the_parser() {
        let mut session = Session::new();
        let tu = session.compile_str("test.c", "#define N 10\nint x = N;");
        assert!(!session.diags.has_errors());
        assert_eq!(tu.items.len(), 1);
    }

    #[test]
    fn compile_file_reports_io_error_for_missing_path() {
        let mut session = Session::new();
        let result = session.compile_file("/nonexistent/path/does-not-exist.c");
        assert!(result.is_err());
    }
}
