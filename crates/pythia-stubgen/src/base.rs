//! The cursor-based output builder shared by every rewrite pass.
//!
//! A pass walks the parse tree of its input in source order and edits by
//! copying unchanged text up to a span, appending replacement text, and
//! advancing the cursor past the span. Text never moves backwards: spans
//! must be visited in non-decreasing start order.

use rustpython_parser::text_size::TextRange;

pub(crate) struct Rewriter<'a> {
    source: &'a str,
    out: String,
    cursor: usize,
}

impl<'a> Rewriter<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            source,
            out: String::with_capacity(source.len()),
            cursor: 0,
        }
    }

    /// Copies the original text up to `index`.
    pub(crate) fn copy_to(&mut self, index: usize) {
        let index = index.clamp(self.cursor, self.source.len());
        self.out.push_str(&self.source[self.cursor..index]);
        self.cursor = index;
    }

    /// Advances past original text without copying it.
    pub(crate) fn skip_to(&mut self, index: usize) {
        self.cursor = index.clamp(self.cursor, self.source.len());
    }

    /// Appends replacement text.
    pub(crate) fn append(&mut self, text: &str) {
        self.out.push_str(text);
    }

    /// Replaces a span with new text.
    pub(crate) fn replace_range(&mut self, range: TextRange, text: &str) {
        self.copy_to(range.start().to_usize());
        self.append(text);
        self.skip_to(range.end().to_usize());
    }

    /// Removes a node, extending through the trailing newline so the removal
    /// leaves no blank line behind.
    pub(crate) fn remove_node(&mut self, range: TextRange) {
        self.copy_to(range.start().to_usize());
        self.skip_to(self.extend_past_newline(range.end().to_usize()));
    }

    /// The end of the line terminator following `index`, when only blanks
    /// separate them.
    pub(crate) fn extend_past_newline(&self, index: usize) -> usize {
        let bytes = self.source.as_bytes();
        let mut end = index;
        while bytes.get(end).is_some_and(|b| *b == b' ' || *b == b'\t') {
            end += 1;
        }
        if bytes.get(end) == Some(&b'\r') {
            end += 1;
        }
        if bytes.get(end) == Some(&b'\n') {
            end += 1;
        }
        end
    }

    /// The source being rewritten.
    pub(crate) fn source(&self) -> &'a str {
        self.source
    }

    /// Copies the remaining text and yields the result.
    pub(crate) fn finish(mut self) -> String {
        self.copy_to(self.source.len());
        self.out
    }
}

/// One deferred edit, applied in source order.
pub(crate) enum Edit {
    /// Inserts text at an offset.
    Insert { at: usize, text: String },
    /// Replaces a span with new text.
    Replace { range: TextRange, text: String },
    /// Removes a node, through its trailing newline.
    Remove { range: TextRange },
    /// Removes a raw byte span the caller has already extended.
    Delete { start: usize, end: usize },
}

impl Edit {
    fn sort_key(&self) -> (usize, u8) {
        match self {
            Edit::Insert { at, .. } => (*at, 0),
            Edit::Replace { range, .. } => (range.start().to_usize(), 1),
            Edit::Remove { range } => (range.start().to_usize(), 1),
            Edit::Delete { start, .. } => (*start, 1),
        }
    }
}

/// Applies a batch of edits gathered out of order.
pub(crate) fn apply_edits(source: &str, mut edits: Vec<Edit>) -> String {
    if edits.is_empty() {
        return source.to_owned();
    }
    edits.sort_by_key(Edit::sort_key);
    let mut rewriter = Rewriter::new(source);
    for edit in edits {
        match edit {
            Edit::Insert { at, text } => {
                rewriter.copy_to(at);
                rewriter.append(&text);
            }
            Edit::Replace { range, text } => rewriter.replace_range(range, &text),
            Edit::Remove { range } => rewriter.remove_node(range),
            Edit::Delete { start, end } => {
                rewriter.copy_to(start);
                rewriter.skip_to(end);
            }
        }
    }
    rewriter.finish()
}

/// The offset at which the line containing `offset` starts.
pub(crate) fn line_start(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())]
        .rfind('\n')
        .map_or(0, |pos| pos + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustpython_parser::text_size::{TextRange, TextSize};

    fn range(start: u32, end: u32) -> TextRange {
        TextRange::new(TextSize::new(start), TextSize::new(end))
    }

    #[test]
    fn test_replace_and_finish() {
        let mut rewriter = Rewriter::new("a = 1\nb = 2\n");
        rewriter.replace_range(range(4, 5), "10");
        assert_eq!(rewriter.finish(), "a = 10\nb = 2\n");
    }

    #[test]
    fn test_remove_node_swallows_newline() {
        let mut rewriter = Rewriter::new("keep = 1\ndrop = 2\nalso = 3\n");
        rewriter.remove_node(range(9, 17));
        assert_eq!(rewriter.finish(), "keep = 1\nalso = 3\n");
    }

    #[test]
    fn test_unchanged_without_edits() {
        let rewriter = Rewriter::new("x = 1\n");
        assert_eq!(rewriter.finish(), "x = 1\n");
    }
}
