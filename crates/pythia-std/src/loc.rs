//! Source locations, spans, and the new-line table used to convert between
//! byte offsets and line/column positions.

use core::fmt;
use std::cmp::Ordering;

use ecow::EcoString;
use serde::{Deserialize, Serialize};

/// A byte-offset span inside a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSpan {
    /// The byte offset where the span starts.
    pub start: usize,
    /// The number of bytes covered by the span.
    pub length: usize,
}

impl IndexSpan {
    /// Creates a span from its start and (exclusive) end offsets.
    pub fn from_bounds(start: usize, end: usize) -> Self {
        debug_assert!(end >= start);
        Self {
            start,
            length: end - start,
        }
    }

    /// The exclusive end offset of the span.
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    /// Whether the given offset falls inside the span.
    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end()
    }

    /// The smallest span covering both `self` and `other`.
    pub fn union(&self, other: &IndexSpan) -> IndexSpan {
        let start = self.start.min(other.start);
        let end = self.end().max(other.end());
        IndexSpan::from_bounds(start, end)
    }
}

/// A position represented as a 1-based line and column pair.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SourceLocation {
    /// The line number, starting at 1.
    pub line: u32,
    /// The column number, starting at 1.
    pub col: u32,
}

impl SourceLocation {
    /// Creates a new location.
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self { line: 1, col: 1 }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A line/column range inside a document.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SourceSpan {
    /// The start position.
    pub start: SourceLocation,
    /// The end position (exclusive).
    pub end: SourceLocation,
}

impl SourceSpan {
    /// Creates a new span.
    pub const fn new(start: SourceLocation, end: SourceLocation) -> Self {
        Self { start, end }
    }

    /// Whether the given position falls inside the span.
    pub fn contains(&self, loc: SourceLocation) -> bool {
        loc >= self.start && loc < self.end
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// The kind of line terminator ending a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewLineKind {
    /// A bare `\n`.
    LineFeed,
    /// A bare `\r`.
    CarriageReturn,
    /// A `\r\n` pair.
    CarriageReturnLineFeed,
}

/// A single recorded line terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewLine {
    /// The byte offset just past the terminator.
    pub end_index: usize,
    /// The kind of terminator.
    pub kind: NewLineKind,
}

/// The sorted table of line terminators of a document.
///
/// Built in a single pass over the text; lookups are `O(log n)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewLineLocations {
    lines: Vec<NewLine>,
}

impl NewLineLocations {
    /// Scans `text` and records every line terminator.
    pub fn from_text(text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut lines = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\n' => {
                    lines.push(NewLine {
                        end_index: i + 1,
                        kind: NewLineKind::LineFeed,
                    });
                    i += 1;
                }
                b'\r' => {
                    if bytes.get(i + 1) == Some(&b'\n') {
                        lines.push(NewLine {
                            end_index: i + 2,
                            kind: NewLineKind::CarriageReturnLineFeed,
                        });
                        i += 2;
                    } else {
                        lines.push(NewLine {
                            end_index: i + 1,
                            kind: NewLineKind::CarriageReturn,
                        });
                        i += 1;
                    }
                }
                _ => i += 1,
            }
        }
        Self { lines }
    }

    /// The recorded terminators, sorted by offset.
    pub fn lines(&self) -> &[NewLine] {
        &self.lines
    }

    /// The byte offset at which the 1-based `line` starts.
    pub fn line_start(&self, line: u32) -> usize {
        if line <= 1 {
            return 0;
        }
        self.lines
            .get(line as usize - 2)
            .map(|nl| nl.end_index)
            .unwrap_or_else(|| self.lines.last().map_or(0, |nl| nl.end_index))
    }

    /// Converts a byte offset to a 1-based line/column position.
    pub fn index_to_location(&self, index: usize) -> SourceLocation {
        let line = self.lines.partition_point(|nl| nl.end_index <= index);
        let start = if line == 0 {
            0
        } else {
            self.lines[line - 1].end_index
        };
        SourceLocation {
            line: line as u32 + 1,
            col: (index - start) as u32 + 1,
        }
    }

    /// Converts a 1-based line/column position to a byte offset.
    pub fn location_to_index(&self, loc: SourceLocation) -> usize {
        self.line_start(loc.line) + loc.col.saturating_sub(1) as usize
    }

    /// Converts a byte span to a line/column span.
    pub fn span_of(&self, span: IndexSpan) -> SourceSpan {
        SourceSpan {
            start: self.index_to_location(span.start),
            end: self.index_to_location(span.end()),
        }
    }
}

/// Identifies a region of a module's source text.
///
/// Equality is deliberately coarse: two locations are equal when they start on
/// the same line of the same file. Use [`LocationInfo::full_compare`] when a
/// total precise ordering is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationInfo {
    /// The path of the file the location is in.
    pub file_path: EcoString,
    /// The uri of the document, if it is known.
    pub uri: Option<EcoString>,
    /// The line/column span.
    pub span: SourceSpan,
    /// The byte span.
    pub index_span: IndexSpan,
}

impl LocationInfo {
    /// The sentinel location at `(1, 1)` with an empty path.
    pub const EMPTY: LocationInfo = LocationInfo {
        file_path: EcoString::new(),
        uri: None,
        span: SourceSpan::new(SourceLocation::new(1, 1), SourceLocation::new(1, 1)),
        index_span: IndexSpan {
            start: 0,
            length: 0,
        },
    };

    /// Creates a location inside `file_path` from a byte span and the file's
    /// new-line table.
    pub fn from_span(file_path: EcoString, span: IndexSpan, lines: &NewLineLocations) -> Self {
        Self {
            file_path,
            uri: None,
            span: lines.span_of(span),
            index_span: span,
        }
    }

    /// Whether this is the empty sentinel.
    pub fn is_empty(&self) -> bool {
        self.file_path.is_empty() && self.span == Self::EMPTY.span
    }

    /// Compares every field, yielding a total precise order.
    pub fn full_compare(&self, other: &LocationInfo) -> Ordering {
        self.file_path
            .cmp(&other.file_path)
            .then_with(|| self.span.cmp(&other.span))
            .then_with(|| {
                (self.index_span.start, self.index_span.length)
                    .cmp(&(other.index_span.start, other.index_span.length))
            })
    }
}

impl PartialEq for LocationInfo {
    fn eq(&self, other: &Self) -> bool {
        self.span.start.line == other.span.start.line && self.file_path == other.file_path
    }
}

impl Eq for LocationInfo {}

impl fmt::Display for LocationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_path, self.span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newline_table_lf() {
        let t = NewLineLocations::from_text("ab\ncd\n");
        assert_eq!(t.lines().len(), 2);
        assert_eq!(t.index_to_location(0), SourceLocation::new(1, 1));
        assert_eq!(t.index_to_location(2), SourceLocation::new(1, 3));
        assert_eq!(t.index_to_location(3), SourceLocation::new(2, 1));
        assert_eq!(t.index_to_location(5), SourceLocation::new(2, 3));
        assert_eq!(t.location_to_index(SourceLocation::new(2, 2)), 4);
    }

    #[test]
    fn test_newline_table_crlf() {
        let t = NewLineLocations::from_text("ab\r\ncd");
        assert_eq!(t.lines().len(), 1);
        assert_eq!(t.lines()[0].kind, NewLineKind::CarriageReturnLineFeed);
        assert_eq!(t.index_to_location(4), SourceLocation::new(2, 1));
        assert_eq!(t.location_to_index(SourceLocation::new(2, 1)), 4);
    }

    #[test]
    fn test_newline_table_roundtrip() {
        let text = "x = 1\ny = 2\r\nz = 3\rdone";
        let t = NewLineLocations::from_text(text);
        for idx in 0..text.len() {
            let loc = t.index_to_location(idx);
            assert_eq!(t.location_to_index(loc), idx, "offset {idx}");
        }
    }

    #[test]
    fn test_location_info_equality() {
        let t = NewLineLocations::from_text("ab\ncd\n");
        let a = LocationInfo::from_span("m.py".into(), IndexSpan::from_bounds(0, 1), &t);
        let b = LocationInfo::from_span("m.py".into(), IndexSpan::from_bounds(1, 2), &t);
        let c = LocationInfo::from_span("m.py".into(), IndexSpan::from_bounds(3, 4), &t);
        // same start line, same file: coarse-equal
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.full_compare(&b), Ordering::Less);
    }

    #[test]
    fn test_empty_sentinel() {
        assert!(LocationInfo::EMPTY.is_empty());
        assert_eq!(LocationInfo::EMPTY.span.start, SourceLocation::new(1, 1));
    }

    #[test]
    fn test_index_span_union() {
        let a = IndexSpan::from_bounds(2, 5);
        let b = IndexSpan::from_bounds(4, 9);
        assert_eq!(a.union(&b), IndexSpan::from_bounds(2, 9));
        assert!(a.contains(4));
        assert!(!a.contains(5));
    }
}
