//! Fire-and-forget events published by the table and its documents.

use std::sync::Arc;

use lsp_types::Url;
use parking_lot::RwLock;
use pythia_std::ImmutPath;

/// A lifecycle or content event.
#[derive(Debug, Clone)]
pub enum DocumentEvent {
    /// A document was opened in the editor.
    Opened {
        /// The document uri.
        uri: Url,
    },
    /// A document was closed in the editor.
    Closed {
        /// The document uri.
        uri: Url,
    },
    /// A document's lock count reached zero and it left the table.
    Removed {
        /// The document uri.
        uri: Url,
        /// The backing file, so path indexes can forget it.
        file_path: Option<ImmutPath>,
    },
    /// A re-parse completed and was published.
    NewAst {
        /// The document uri.
        uri: Url,
        /// The buffer version the AST was parsed from.
        version: u32,
    },
    /// A new analysis was published.
    NewAnalysis {
        /// The document uri.
        uri: Url,
        /// The analysis version that was published.
        version: u32,
    },
}

type EventSink = Arc<dyn Fn(&DocumentEvent) + Send + Sync>;

/// Dispatches events to registered sinks.
///
/// Dispatch happens outside any table or document mutex; sinks must not
/// assume any lock is held.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    sinks: Arc<RwLock<Vec<EventSink>>>,
}

impl EventDispatcher {
    /// Creates a dispatcher with no sinks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sink.
    pub fn subscribe(&self, sink: impl Fn(&DocumentEvent) + Send + Sync + 'static) {
        self.sinks.write().push(Arc::new(sink));
    }

    /// Delivers an event to every sink.
    pub fn dispatch(&self, event: &DocumentEvent) {
        let sinks = self.sinks.read().clone();
        for sink in sinks {
            sink(event);
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("sinks", &self.sinks.read().len())
            .finish()
    }
}
