//! The versioned in-memory text of one document.
//!
//! Edits arrive as [`DocumentChangeSet`]s chained by version. Within one set
//! the edits are applied in reverse order of start offset, so spans resolved
//! against the set's initial new-line table stay valid: a later edit can
//! never shift the offsets an earlier-offset edit still needs.

use core::fmt;

use parking_lot::Mutex;
use pythia_std::loc::NewLineLocations;

use crate::changes::DocumentChangeSet;

/// The outcome of a successfully handled change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The set was older than the buffer (or empty) and was dropped.
    Stale,
    /// The set was applied; the buffer is now at this version.
    AtVersion(u32),
}

/// A caller contract violation while applying a change set.
///
/// A failed update leaves the buffer contents unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// The set starts past the buffer's version; intermediate sets are
    /// missing.
    MissingPriorVersions {
        /// The version the set applies to.
        from: u32,
        /// The version the buffer is at.
        current: u32,
    },
    /// The set does not move the version.
    IllegalVersionMove {
        /// The version the set applies to.
        from: u32,
        /// The version the set claims to produce.
        to: u32,
    },
    /// A change starts after the previous change in the same set.
    ChangesNotInReverseOrder {
        /// The start offset of the previous change.
        prev_start: usize,
        /// The offending start offset.
        start: usize,
    },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::MissingPriorVersions { from, current } => write!(
                f,
                "change set starts at version {from} but the buffer is at {current}"
            ),
            BufferError::IllegalVersionMove { from, to } => {
                write!(f, "change set does not move the version ({from} -> {to})")
            }
            BufferError::ChangesNotInReverseOrder { prev_start, start } => write!(
                f,
                "changes must be in reverse order: offset {start} follows {prev_start}"
            ),
        }
    }
}

impl std::error::Error for BufferError {}

#[derive(Debug, Default)]
struct BufferInner {
    version: u32,
    text: String,
    lines: NewLineLocations,
}

/// The versioned text buffer of one document.
///
/// The buffer owns its mutex; no table or document lock is held while buffer
/// operations run.
#[derive(Debug, Default)]
pub struct DocumentBuffer {
    inner: Mutex<BufferInner>,
}

impl DocumentBuffer {
    /// Creates a buffer at the given version.
    pub fn new(version: u32, text: impl Into<String>) -> Self {
        let text = text.into();
        let lines = NewLineLocations::from_text(&text);
        Self {
            inner: Mutex::new(BufferInner {
                version,
                text,
                lines,
            }),
        }
    }

    /// Replaces the contents entirely and sets the version.
    pub fn reset(&self, version: u32, text: impl Into<String>) {
        let text = text.into();
        let lines = NewLineLocations::from_text(&text);
        let mut inner = self.inner.lock();
        inner.version = version;
        inner.text = text;
        inner.lines = lines;
    }

    /// The current version.
    pub fn version(&self) -> u32 {
        self.inner.lock().version
    }

    /// A snapshot of the current version and text.
    pub fn snapshot(&self) -> (u32, String) {
        let inner = self.inner.lock();
        (inner.version, inner.text.clone())
    }

    /// A snapshot of the current new-line table.
    pub fn lines(&self) -> NewLineLocations {
        self.inner.lock().lines.clone()
    }

    /// Applies a change set.
    ///
    /// Sets older than the buffer are silently dropped ([`Applied::Stale`]),
    /// as are sets without changes. A successful update leaves the buffer at
    /// exactly `to_version`; a failed one leaves the contents unchanged.
    pub fn update(&self, set: &DocumentChangeSet) -> Result<Applied, BufferError> {
        let mut inner = self.inner.lock();

        if set.from_version < inner.version {
            log::debug!(
                "dropping change set {} -> {}: buffer already at {}",
                set.from_version,
                set.to_version,
                inner.version
            );
            return Ok(Applied::Stale);
        }
        if set.from_version > inner.version {
            return Err(BufferError::MissingPriorVersions {
                from: set.from_version,
                current: inner.version,
            });
        }
        if set.from_version == set.to_version {
            return Err(BufferError::IllegalVersionMove {
                from: set.from_version,
                to: set.to_version,
            });
        }
        if set.changes.is_empty() {
            return Ok(Applied::Stale);
        }

        // Stage the edits on a working copy so a failed set has no effect.
        let mut text = inner.text.clone();
        // The table the incoming spans were computed against. It is only
        // refreshed on a whole-buffer change; the reverse-order invariant
        // keeps it valid for every following ranged edit.
        let mut lines = inner.lines.clone();
        let mut last_start = usize::MAX;

        for change in &set.changes {
            if change.whole_buffer || change.range.is_none() {
                text = change.text.clone();
                lines = NewLineLocations::from_text(&text);
                last_start = usize::MAX;
                continue;
            }

            let span = change.range.expect("checked above").to_span();
            let start = lines.location_to_index(span.start);
            let end = lines.location_to_index(span.end).max(start);
            if start > last_start {
                return Err(BufferError::ChangesNotInReverseOrder {
                    prev_start: last_start,
                    start,
                });
            }
            last_start = start;

            let end = end.min(text.len());
            let start = start.min(end);
            text.replace_range(start..end, &change.text);
        }

        inner.lines = NewLineLocations::from_text(&text);
        inner.text = text;
        inner.version = set.to_version;
        Ok(Applied::AtVersion(set.to_version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::{ChangeRange, DocumentChange};

    fn range(sl: u32, sc: u32, el: u32, ec: u32) -> ChangeRange {
        ChangeRange {
            start_line: sl,
            start_col: sc,
            end_line: el,
            end_col: ec,
        }
    }

    #[test]
    fn test_single_replace() {
        let buffer = DocumentBuffer::new(0, "x = 1\n");
        let set = DocumentChangeSet::new(
            0,
            1,
            vec![DocumentChange::replace(range(1, 5, 1, 6), "2")],
        );
        assert_eq!(buffer.update(&set).unwrap(), Applied::AtVersion(1));
        assert_eq!(buffer.snapshot(), (1, "x = 2\n".to_owned()));
    }

    #[test]
    fn test_reverse_order_edits() {
        let buffer = DocumentBuffer::new(0, "abc\n");
        let set = DocumentChangeSet::new(
            0,
            1,
            vec![
                DocumentChange::replace(range(1, 3, 1, 4), "Z"),
                DocumentChange::replace(range(1, 1, 1, 2), "A"),
            ],
        );
        assert_eq!(buffer.update(&set).unwrap(), Applied::AtVersion(1));
        assert_eq!(buffer.snapshot().1, "AbZ\n");
    }

    #[test]
    fn test_forward_order_fails_and_preserves_text() {
        let buffer = DocumentBuffer::new(0, "abc\n");
        let set = DocumentChangeSet::new(
            0,
            1,
            vec![
                DocumentChange::replace(range(1, 1, 1, 2), "A"),
                DocumentChange::replace(range(1, 3, 1, 4), "Z"),
            ],
        );
        assert_eq!(
            buffer.update(&set).unwrap_err(),
            BufferError::ChangesNotInReverseOrder {
                prev_start: 0,
                start: 2
            }
        );
        assert_eq!(buffer.snapshot(), (0, "abc\n".to_owned()));
    }

    #[test]
    fn test_old_set_dropped_silently() {
        let buffer = DocumentBuffer::new(3, "text");
        let set = DocumentChangeSet::whole(1, 2, "other");
        assert_eq!(buffer.update(&set).unwrap(), Applied::Stale);
        assert_eq!(buffer.snapshot(), (3, "text".to_owned()));
    }

    #[test]
    fn test_future_set_fails() {
        let buffer = DocumentBuffer::new(1, "text");
        let set = DocumentChangeSet::whole(3, 4, "other");
        assert_eq!(
            buffer.update(&set).unwrap_err(),
            BufferError::MissingPriorVersions { from: 3, current: 1 }
        );
    }

    #[test]
    fn test_same_version_move_fails() {
        let buffer = DocumentBuffer::new(1, "text");
        let set = DocumentChangeSet::whole(1, 1, "other");
        assert_eq!(
            buffer.update(&set).unwrap_err(),
            BufferError::IllegalVersionMove { from: 1, to: 1 }
        );
    }

    #[test]
    fn test_empty_set_changes_nothing() {
        let buffer = DocumentBuffer::new(0, "keep");
        let set = DocumentChangeSet::new(0, 1, vec![]);
        assert_eq!(buffer.update(&set).unwrap(), Applied::Stale);
        assert_eq!(buffer.snapshot(), (0, "keep".to_owned()));
    }

    #[test]
    fn test_whole_buffer_resets_order_tracking() {
        let buffer = DocumentBuffer::new(0, "abc\n");
        // an early-offset edit, then a whole-buffer reset, then an edit at a
        // later offset: legal because the reset clears the order tracking
        let set = DocumentChangeSet::new(
            0,
            1,
            vec![
                DocumentChange::replace(range(1, 1, 1, 2), "A"),
                DocumentChange::whole("0123456789\n"),
                DocumentChange::replace(range(1, 9, 1, 10), "X"),
            ],
        );
        assert_eq!(buffer.update(&set).unwrap(), Applied::AtVersion(1));
        assert_eq!(buffer.snapshot().1, "01234567X9\n");
    }

    #[test]
    fn test_chained_sets_equal_independent_application() {
        let buffer = DocumentBuffer::new(0, "one two three\n");
        let first = DocumentChangeSet::new(
            0,
            1,
            vec![DocumentChange::replace(range(1, 5, 1, 8), "2")],
        );
        let second = DocumentChangeSet::new(
            1,
            2,
            vec![DocumentChange::replace(range(1, 1, 1, 4), "1")],
        );
        buffer.update(&first).unwrap();
        buffer.update(&second).unwrap();
        let chained = buffer.snapshot().1;

        let fresh = DocumentBuffer::new(1, "one 2 three\n");
        fresh.update(&second).unwrap();
        assert_eq!(fresh.snapshot().1, chained);
        assert_eq!(chained, "1 2 three\n");
    }

    #[test]
    fn test_multiline_replace() {
        let buffer = DocumentBuffer::new(0, "def f():\n    pass\n");
        let set = DocumentChangeSet::new(
            0,
            1,
            vec![DocumentChange::replace(range(2, 5, 2, 9), "return 1")],
        );
        buffer.update(&set).unwrap();
        assert_eq!(buffer.snapshot().1, "def f():\n    return 1\n");
    }
}
