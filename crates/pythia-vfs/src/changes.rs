//! The change-set wire format consumed from the outer LSP layer.

use pythia_std::loc::{SourceLocation, SourceSpan};
use serde::{Deserialize, Serialize};

/// A line/column range as delivered on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRange {
    /// The 1-based line the change starts on.
    pub start_line: u32,
    /// The 1-based column the change starts at.
    pub start_col: u32,
    /// The 1-based line the change ends on.
    pub end_line: u32,
    /// The 1-based column the change ends at (exclusive).
    pub end_col: u32,
}

impl ChangeRange {
    /// The equivalent [`SourceSpan`].
    pub fn to_span(self) -> SourceSpan {
        SourceSpan::new(
            SourceLocation::new(self.start_line, self.start_col),
            SourceLocation::new(self.end_line, self.end_col),
        )
    }
}

impl From<SourceSpan> for ChangeRange {
    fn from(span: SourceSpan) -> Self {
        Self {
            start_line: span.start.line,
            start_col: span.start.col,
            end_line: span.end.line,
            end_col: span.end.col,
        }
    }
}

/// One edit inside a change set: either a ranged replacement or a whole
/// buffer reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChange {
    /// The replaced range; absent for whole-buffer changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ChangeRange>,
    /// The inserted text.
    pub text: String,
    /// Whether the change replaces the entire buffer.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub whole_buffer: bool,
}

impl DocumentChange {
    /// A ranged replacement.
    pub fn replace(range: impl Into<ChangeRange>, text: impl Into<String>) -> Self {
        Self {
            range: Some(range.into()),
            text: text.into(),
            whole_buffer: false,
        }
    }

    /// A whole-buffer reset.
    pub fn whole(text: impl Into<String>) -> Self {
        Self {
            range: None,
            text: text.into(),
            whole_buffer: true,
        }
    }
}

/// An ordered set of edits moving a document between two versions.
///
/// Changes inside a set must be delivered with non-increasing start offsets;
/// the buffer enforces this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChangeSet {
    /// The version the edits apply to.
    pub from_version: u32,
    /// The version the buffer is at after the edits.
    pub to_version: u32,
    /// The edits, in delivery order.
    pub changes: Vec<DocumentChange>,
}

impl DocumentChangeSet {
    /// Creates a change set.
    pub fn new(from_version: u32, to_version: u32, changes: Vec<DocumentChange>) -> Self {
        Self {
            from_version,
            to_version,
            changes,
        }
    }

    /// A whole-buffer reset as a change set.
    pub fn whole(from_version: u32, to_version: u32, text: impl Into<String>) -> Self {
        Self::new(from_version, to_version, vec![DocumentChange::whole(text)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_round_trip() {
        let json = r#"{
            "from_version": 0,
            "to_version": 1,
            "changes": [
                { "range": { "start_line": 1, "start_col": 5, "end_line": 1, "end_col": 6 }, "text": "2" },
                { "text": "x = 1\n", "whole_buffer": true }
            ]
        }"#;
        let set: DocumentChangeSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.from_version, 0);
        assert_eq!(set.to_version, 1);
        assert_eq!(set.changes.len(), 2);
        assert!(!set.changes[0].whole_buffer);
        assert_eq!(set.changes[0].range.unwrap().start_col, 5);
        assert!(set.changes[1].whole_buffer);

        let back = serde_json::to_string(&set).unwrap();
        let reparsed: DocumentChangeSet = serde_json::from_str(&back).unwrap();
        assert_eq!(reparsed.changes[0].text, "2");
    }
}
