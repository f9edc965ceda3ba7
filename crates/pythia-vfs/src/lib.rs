//! The running document table and its documents: versioned in-memory text
//! with incremental edits, cancellable background re-parsing, and the
//! open/close/refcount lifecycle of live modules.

pub mod buffer;
pub use buffer::*;

pub mod changes;
pub use changes::*;

pub mod document;
pub use document::*;

pub mod events;
pub use events::*;

pub mod table;
pub use table::*;

pub mod uri;
pub use uri::*;

pub use lsp_types::Url;
