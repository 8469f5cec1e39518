//! File storage: owns loaded source text and assigns stable numeric file ids.
//!
//! `FileContents` chunks a file's bytes into fixed-size blocks rather than one
//! contiguous buffer, mirroring how a streaming file-loader would hand back
//! content without requiring a single allocation sized to the whole file.
//! Nothing above this module cares about the chunking: `get`/`len` present a
//! flat, random-access byte space.

use std::path::{Path, PathBuf};

/// Bytes per chunk. Arbitrary; large enough that most small translation units
/// fit in a single block, small enough to bound a single allocation.
pub const BLOCK_SIZE: usize = 8 * 1024;

/// Stable, dense identifier for a loaded file. Indexes into `FileStore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

impl FileId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Immutable, chunked byte storage for one file's contents.
///
/// Random-access reads go through [`FileContents::get`]; out-of-range reads
/// return `None` rather than panicking, since the text layer probes one byte
/// past the cursor position to detect EOF and look ahead for trigraphs.
#[derive(Debug)]
pub struct FileContents {
    blocks: Vec<Box<[u8]>>,
    len: usize,
}

impl FileContents {
    /// Chunks `bytes` into `BLOCK_SIZE` blocks.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut blocks = Vec::with_capacity(bytes.len() / BLOCK_SIZE + 1);
        let mut offset = 0;
        while offset < bytes.len() {
            let end = (offset + BLOCK_SIZE).min(bytes.len());
            blocks.push(bytes[offset..end].to_vec().into_boxed_slice());
            offset = end;
        }
        FileContents {
            blocks,
            len: bytes.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads the byte at `index`, or `None` if `index >= len()`.
    pub fn get(&self, index: usize) -> Option<u8> {
        if index >= self.len {
            return None;
        }
        let block = index / BLOCK_SIZE;
        let offset = index % BLOCK_SIZE;
        Some(self.blocks[block][offset])
    }
}

/// Byte-level file I/O, consumed but not implemented by this crate (§6): the
/// initial translation unit is handed to [`FileStore::add`] directly by the
/// caller, but a `#include` discovered mid-preprocessing needs to load a new
/// file on demand, so the preprocessor is given one of these instead of
/// calling `std::fs::read` itself.
pub trait FileLoader {
    fn load(&self, path: &Path) -> std::io::Result<Vec<u8>>;
}

/// The obvious concrete loader, used by `cfront-cli` and by any test that
/// wants real `#include` resolution against the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileLoader;

impl FileLoader for StdFileLoader {
    fn load(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// A loaded file plus the path it was resolved from, used for `#include`
/// directory-relative resolution and diagnostic rendering.
#[derive(Debug)]
pub struct LoadedFile {
    pub path: PathBuf,
    pub contents: FileContents,
}

/// Owns every file loaded during a compilation, assigning each a stable
/// [`FileId`] and resolving `#include` search paths against it.
///
/// `FileStore` does not perform file I/O itself: callers register contents
/// via [`FileStore::add`] (the file-loader collaborator lives outside this
/// crate, keeping file I/O off the compilation core). This lets tests
/// register in-memory sources without touching the filesystem.
#[derive(Debug, Default)]
pub struct FileStore {
    files: Vec<LoadedFile>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers already-loaded contents under `path`, returning its `FileId`.
    pub fn add(&mut self, path: impl Into<PathBuf>, contents: FileContents) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(LoadedFile {
            path: path.into(),
            contents,
        });
        id
    }

    /// Convenience for tests and the `"..."` in-memory compile entry point.
    pub fn add_str(&mut self, path: impl Into<PathBuf>, source: &str) -> FileId {
        self.add(path, FileContents::from_bytes(source.as_bytes()))
    }

    pub fn contents(&self, id: FileId) -> &FileContents {
        &self.files[id.index()].contents
    }

    pub fn path(&self, id: FileId) -> &Path {
        &self.files[id.index()].path
    }

    /// Resolves an `#include` target against the including file's directory
    /// (for `"quoted"` includes) and the configured search path, in order.
    ///
    /// Returns the resolved path if any candidate exists on disk; the caller
    /// is responsible for loading it into a new `FileContents` and calling
    /// [`FileStore::add`].
    pub fn resolve_include(
        &self,
        including: Option<FileId>,
        target: &str,
        quoted: bool,
        search_path: &[PathBuf],
    ) -> Option<PathBuf> {
        if quoted {
            if let Some(including) = including {
                if let Some(dir) = self.path(including).parent() {
                    let candidate = dir.join(target);
                    if candidate.exists() {
                        return Some(candidate);
                    }
                }
            }
        }
        for dir in search_path {
            let candidate = dir.join(target);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_reports_correct_length() {
        let fc = FileContents::from_bytes(b"hello world");
        assert_eq!(fc.len(), 11);
    }

    #[test]
    fn get_returns_bytes_in_range() {
        let fc = FileContents::from_bytes(b"abc");
        assert_eq!(fc.get(0), Some(b'a'));
        assert_eq!(fc.get(2), Some(b'c'));
        assert_eq!(fc.get(3), None);
    }

    #[test]
    fn spans_multiple_blocks() {
        let source: Vec<u8> = (0..BLOCK_SIZE * 2 + 37).map(|i| (i % 251) as u8).collect();
        let fc = FileContents::from_bytes(&source);
        assert_eq!(fc.len(), source.len());
        for i in (0..source.len()).step_by(137) {
            assert_eq!(fc.get(i), Some(source[i]));
        }
        assert_eq!(fc.get(source.len()), None);
    }

    #[test]
    fn file_store_assigns_dense_ids() {
        let mut store = FileStore::new();
        let a = store.add_str("a.c", "int a;");
        let b = store.add_str("b.c", "int b;");
        assert_eq!(a, FileId(0));
        assert_eq!(b, FileId(1));
        assert_eq!(store.contents(a).len(), 6);
    }
}
