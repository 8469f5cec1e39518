//! Source location tracking.
//!
//! A [`Location`] is a point in one file: a byte offset plus the post-splice
//! logical line/column it maps to. A [`Span`] is a half-open `[start, end)`
//! range within a single file. Every token, expression, and diagnostic in
//! cfront carries a `Span`.

use crate::file::FileId;

/// A point in a single source file.
///
/// `line` and `column` are zero-based internally (rendered one-based for
/// diagnostics) and reflect *logical* position: they already account for
/// trigraph replacement and line-splicing, so they match what a programmer
/// reading the un-spliced source would call "line N" of their file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub file_id: FileId,
    pub byte_index: usize,
    pub line: usize,
    pub column: usize,
}

impl Default for FileId {
    fn default() -> Self {
        FileId(0)
    }
}

impl Location {
    pub fn start_of(file_id: FileId) -> Self {
        Location {
            file_id,
            byte_index: 0,
            line: 0,
            column: 0,
        }
    }
}

/// A contiguous, half-open source range within a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Location,
    pub end: Location,
}

impl Span {
    pub fn new(start: Location, end: Location) -> Self {
        debug_assert_eq!(start.file_id, end.file_id);
        Span { start, end }
    }

    /// A zero-width span at `loc`, used for EOF tokens and synthetic nodes.
    pub fn point(loc: Location) -> Self {
        Span {
            start: loc,
            end: loc,
        }
    }

    /// Combines two spans in the same file into one covering both.
    ///
    /// Used when a compound AST node's span should cover its children, e.g.
    /// a binary expression's span is `left.span.merge(right.span)`.
    pub fn merge(self, other: Span) -> Span {
        debug_assert_eq!(self.start.file_id, other.start.file_id);
        let start = if self.start.byte_index <= other.start.byte_index {
            self.start
        } else {
            other.start
        };
        let end = if self.end.byte_index >= other.end.byte_index {
            self.end
        } else {
            other.end
        };
        Span { start, end }
    }

    pub fn file_id(&self) -> FileId {
        self.start.file_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(byte_index: usize, line: usize, column: usize) -> Location {
        Location {
            file_id: FileId(0),
            byte_index,
            line,
            column,
        }
    }

    #[test]
    fn span_new_stores_start_and_end() {
        let span = Span::new(loc(0, 0, 0), loc(5, 0, 5));
        assert_eq!(span.start.byte_index, 0);
        assert_eq!(span.end.byte_index, 5);
    }

    #[test]
    fn span_merge_takes_widest_range() {
        let a = Span::new(loc(5, 0, 5), loc(10, 0, 10));
        let b = Span::new(loc(8, 0, 8), loc(15, 0, 15));
        let merged = a.merge(b);
        assert_eq!(merged.start.byte_index, 5);
        assert_eq!(merged.end.byte_index, 15);
    }

    #[test]
    fn span_point_has_zero_width() {
        let span = Span::point(loc(3, 0, 3));
        assert_eq!(span.start, span.end);
    }
}
