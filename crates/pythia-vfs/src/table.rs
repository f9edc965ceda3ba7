//! The Running Document Table: the process-wide registry of live modules.
//!
//! The table exclusively owns every document. Entries are reference counted;
//! a document exists in the table iff its lock count is at least one, and
//! reaching zero disposes it. All map mutations happen under one mutex;
//! events are dispatched outside it.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use ecow::EcoString;
use futures::future::BoxFuture;
use lsp_types::Url;
use parking_lot::Mutex;
use pythia_std::hash::FxHashMap;

use crate::document::{
    AnalysisHandler, Document, DocumentCreationOptions, DocumentError, DocumentHost, ModuleType,
};
use crate::events::DocumentEvent;
use crate::uri::uri_from_path;

/// Obtains the content of compiled modules (by scraping) on demand.
pub trait ContentSource: Send + Sync {
    /// Produces the text of the named module. Failures yield empty content.
    fn fetch(&self, module_name: &str, file_path: Option<&Path>) -> BoxFuture<'static, String>;
}

/// Lets the path resolver index files the table discovers.
pub trait PathRegistrar: Send + Sync {
    /// Registers a newly discovered file, yielding its dotted name.
    fn try_add_module_path(&self, path: &Path) -> Option<EcoString>;

    /// Forgets a file that left the table.
    fn remove_module_path(&self, path: &Path);
}

struct DocumentEntry {
    doc: Arc<Document>,
    lock_count: u32,
}

#[derive(Default)]
struct TableInner {
    by_uri: FxHashMap<Url, DocumentEntry>,
    by_name: FxHashMap<EcoString, Url>,
}

/// The Running Document Table.
pub struct DocumentTable {
    inner: Mutex<TableInner>,
    host: Arc<DocumentHost>,
    content: OnceLock<Arc<dyn ContentSource>>,
    registrar: OnceLock<Arc<dyn PathRegistrar>>,
}

impl Default for DocumentTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner::default()),
            host: Arc::new(DocumentHost::new()),
            content: OnceLock::new(),
            registrar: OnceLock::new(),
        }
    }

    /// The state shared with every document (events, analysis handler).
    pub fn host(&self) -> &Arc<DocumentHost> {
        &self.host
    }

    /// Installs the analysis handler invoked after successful parses.
    pub fn set_analysis_handler(&self, handler: Arc<dyn AnalysisHandler>) {
        self.host.set_analysis_handler(handler);
    }

    /// Installs the content source for compiled modules.
    pub fn set_content_source(&self, source: Arc<dyn ContentSource>) {
        let _ = self.content.set(source);
    }

    /// Installs the path registrar.
    pub fn set_path_registrar(&self, registrar: Arc<dyn PathRegistrar>) {
        let _ = self.registrar.set(registrar);
    }

    /// Opens a document in the editor, creating it when absent.
    ///
    /// Re-opening a closed document with new content resets its buffer.
    /// Opening increments the lock count and emits [`DocumentEvent::Opened`].
    pub fn open_document(
        &self,
        uri: Url,
        content: Option<String>,
        file_path: Option<pythia_std::ImmutPath>,
    ) -> Result<Arc<Document>, DocumentError> {
        let existing = {
            let mut inner = self.inner.lock();
            inner.by_uri.get_mut(&uri).map(|entry| {
                entry.lock_count += 1;
                entry.doc.clone()
            })
        };
        let doc = match existing {
            Some(doc) => {
                if !doc.is_open() {
                    if let Some(content) = content {
                        doc.reset(0, content);
                    }
                }
                doc.set_open(true);
                doc
            }
            None => {
                let doc = Document::new(
                    DocumentCreationOptions {
                        uri: Some(uri.clone()),
                        file_path,
                        module_name: None,
                        module_type: ModuleType::User,
                        content,
                        version: 0,
                        parse_immediately: true,
                        analyze: true,
                    },
                    self.host.clone(),
                )?;
                if let (Some(registrar), Some(path)) =
                    (self.registrar.get(), doc.file_path().cloned())
                {
                    if let Some(name) = registrar.try_add_module_path(&path) {
                        doc.set_module_name(name);
                    }
                }
                let doc = self.insert_or_reuse(doc);
                doc.set_open(true);
                doc
            }
        };
        self.host
            .events
            .dispatch(&DocumentEvent::Opened { uri: doc.uri().clone() });
        Ok(doc)
    }

    /// Adds a module discovered through imports, creating it when absent.
    ///
    /// Creation dispatches on the module type: compiled modules obtain their
    /// content through the installed [`ContentSource`]; user and library
    /// modules are registered with the [`PathRegistrar`] so the resolver
    /// indexes them. Adding increments the lock count.
    pub fn add_module(
        &self,
        mut options: DocumentCreationOptions,
    ) -> Result<Arc<Document>, DocumentError> {
        if let Some(doc) = self.lookup_and_lock(&options) {
            return Ok(doc);
        }

        match options.module_type {
            ModuleType::Compiled | ModuleType::CompiledBuiltin => {
                // content arrives later, from the scraper
                let parse_after_fetch = options.parse_immediately;
                options.parse_immediately = false;
                options.content = Some(String::new());
                let doc = Document::new(options, self.host.clone())?;
                let doc = self.insert_or_reuse(doc);
                if parse_after_fetch {
                    self.fetch_content(doc.clone());
                }
                Ok(doc)
            }
            ModuleType::User | ModuleType::Library => {
                // file reads stay outside the table mutex
                if options.content.is_none() {
                    options.content = options
                        .file_path
                        .as_deref()
                        .and_then(|path| std::fs::read_to_string(path).ok())
                        .or(Some(String::new()));
                }
                let doc = Document::new(options, self.host.clone())?;
                if let (Some(registrar), Some(path)) =
                    (self.registrar.get(), doc.file_path().cloned())
                {
                    match registrar.try_add_module_path(&path) {
                        Some(name) if doc.module_name().is_none() => doc.set_module_name(name),
                        _ => {}
                    }
                }
                Ok(self.insert_or_reuse(doc))
            }
            other => Err(DocumentError::UnsupportedModuleType(other)),
        }
    }

    fn lookup_and_lock(&self, options: &DocumentCreationOptions) -> Option<Arc<Document>> {
        let mut inner = self.inner.lock();
        if let Some(uri) = &options.uri {
            if let Some(entry) = inner.by_uri.get_mut(uri) {
                entry.lock_count += 1;
                return Some(entry.doc.clone());
            }
        }
        if let Some(name) = &options.module_name {
            if let Some(uri) = inner.by_name.get(name).cloned() {
                if let Some(entry) = inner.by_uri.get_mut(&uri) {
                    entry.lock_count += 1;
                    return Some(entry.doc.clone());
                }
            }
        }
        None
    }

    /// Inserts a freshly created document, unless another caller raced it in;
    /// the loser is disposed and the winner gets the extra lock.
    fn insert_or_reuse(&self, doc: Arc<Document>) -> Arc<Document> {
        let existing = {
            let mut inner = self.inner.lock();
            match inner.by_uri.get_mut(doc.uri()) {
                Some(entry) => {
                    entry.lock_count += 1;
                    Some(entry.doc.clone())
                }
                None => {
                    self.insert_locked(&mut inner, doc.clone());
                    None
                }
            }
        };
        match existing {
            Some(existing) => {
                doc.dispose();
                existing
            }
            None => doc,
        }
    }

    fn insert_locked(&self, inner: &mut TableInner, doc: Arc<Document>) {
        if let Some(name) = doc.module_name() {
            inner.by_name.insert(name, doc.uri().clone());
        }
        inner.by_uri.insert(
            doc.uri().clone(),
            DocumentEntry { doc, lock_count: 1 },
        );
    }

    fn spawn_fetch(
        &self,
        doc: Arc<Document>,
        source: Arc<dyn ContentSource>,
    ) {
        tokio::spawn(async move {
            let name = doc.module_name().unwrap_or_default();
            let content = source
                .fetch(&name, doc.file_path().map(|p| p.as_ref() as &Path))
                .await;
            if doc.disposal_token().is_cancelled() {
                return;
            }
            doc.reset(0, content);
        });
    }

    fn fetch_content(&self, doc: Arc<Document>) {
        match self.content.get() {
            Some(source) => self.spawn_fetch(doc, source.clone()),
            // without a scraper the module stays empty but parseable
            None => doc.schedule_parse(),
        }
    }

    /// Closes an open document and drops one lock.
    pub fn close_document(&self, uri: &Url) {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            let Some(entry) = inner.by_uri.get_mut(uri) else {
                return;
            };
            if entry.doc.is_open() {
                entry.doc.set_open(false);
                events.push(DocumentEvent::Closed { uri: uri.clone() });
            }
            entry.lock_count = entry.lock_count.saturating_sub(1);
            if entry.lock_count == 0 {
                if let Some(event) = self.remove_locked(&mut inner, uri) {
                    events.push(event);
                }
            }
        }
        for event in events {
            self.host.events.dispatch(&event);
        }
    }

    fn remove_locked(&self, inner: &mut TableInner, uri: &Url) -> Option<DocumentEvent> {
        let entry = inner.by_uri.remove(uri)?;
        if let Some(name) = entry.doc.module_name() {
            inner.by_name.remove(&name);
        }
        entry.doc.dispose();
        let file_path = entry.doc.file_path().cloned();
        if let (Some(registrar), Some(path)) = (self.registrar.get(), &file_path) {
            registrar.remove_module_path(path);
        }
        log::debug!("document {uri} removed from the table");
        Some(DocumentEvent::Removed {
            uri: uri.clone(),
            file_path,
        })
    }

    /// Takes one more lock on a document. Returns the new count, `-1` when
    /// the document is absent.
    pub fn lock_document(&self, uri: &Url) -> i64 {
        let mut inner = self.inner.lock();
        match inner.by_uri.get_mut(uri) {
            Some(entry) => {
                entry.lock_count += 1;
                entry.lock_count as i64
            }
            None => -1,
        }
    }

    /// Releases one lock on a document. Reaching zero removes and disposes
    /// it. Returns the new count, `-1` when the document is absent.
    pub fn unlock_document(&self, uri: &Url) -> i64 {
        let mut event = None;
        let count = {
            let mut inner = self.inner.lock();
            match inner.by_uri.get_mut(uri) {
                Some(entry) => {
                    entry.lock_count = entry.lock_count.saturating_sub(1);
                    let count = entry.lock_count;
                    if count == 0 {
                        event = self.remove_locked(&mut inner, uri);
                    }
                    count as i64
                }
                None => -1,
            }
        };
        if let Some(event) = event {
            self.host.events.dispatch(&event);
        }
        count
    }

    /// Looks up a document by uri.
    pub fn get_document(&self, uri: &Url) -> Option<Arc<Document>> {
        self.inner.lock().by_uri.get(uri).map(|entry| entry.doc.clone())
    }

    /// Looks up a document by dotted module name.
    pub fn get_document_by_name(&self, name: &str) -> Option<Arc<Document>> {
        let inner = self.inner.lock();
        let uri = inner.by_name.get(name)?;
        inner.by_uri.get(uri).map(|entry| entry.doc.clone())
    }

    /// Registers a document's module name after creation, so name lookups
    /// find it.
    pub fn index_module_name(&self, doc: &Arc<Document>, name: EcoString) {
        doc.set_module_name(name.clone());
        self.inner.lock().by_name.insert(name, doc.uri().clone());
    }

    /// A snapshot of every live document.
    pub fn documents(&self) -> Vec<Arc<Document>> {
        self.inner
            .lock()
            .by_uri
            .values()
            .map(|entry| entry.doc.clone())
            .collect()
    }

    /// The current lock count of a document, `-1` when absent.
    pub fn lock_count(&self, uri: &Url) -> i64 {
        self.inner
            .lock()
            .by_uri
            .get(uri)
            .map_or(-1, |entry| entry.lock_count as i64)
    }

    /// Convenience: the uri a file path maps to.
    pub fn uri_for_path(path: &Path) -> Option<Url> {
        uri_from_path(path).ok()
    }
}

impl std::fmt::Debug for DocumentTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("DocumentTable")
            .field("documents", &inner.by_uri.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    fn table() -> DocumentTable {
        DocumentTable::new()
    }

    #[tokio::test]
    async fn test_open_close_removes_document() {
        let table = table();
        let uri = Url::parse("file:///w/f.py").unwrap();

        let removed = Arc::new(PlMutex::new(false));
        let seen = removed.clone();
        table.host().events.subscribe(move |event| {
            if matches!(event, DocumentEvent::Removed { .. }) {
                *seen.lock() = true;
            }
        });

        table
            .open_document(uri.clone(), Some("x = 1\n".into()), None)
            .unwrap();
        assert_eq!(table.lock_count(&uri), 1);

        table.close_document(&uri);
        assert!(table.get_document(&uri).is_none());
        assert!(*removed.lock());
    }

    #[tokio::test]
    async fn test_refcount_across_open_and_add() {
        let table = table();
        let uri = Url::parse("file:///w/f.py").unwrap();

        table
            .open_document(uri.clone(), Some("x = 1\n".into()), None)
            .unwrap();
        // an importer adds the same uri
        table
            .add_module(DocumentCreationOptions {
                uri: Some(uri.clone()),
                file_path: None,
                module_name: Some("f".into()),
                module_type: ModuleType::Library,
                content: None,
                version: 0,
                parse_immediately: false,
                analyze: false,
            })
            .unwrap();
        assert_eq!(table.lock_count(&uri), 2);

        // closing the editor's handle keeps the importer's lock alive
        table.close_document(&uri);
        assert_eq!(table.lock_count(&uri), 1);
        assert!(table.get_document(&uri).is_some());

        // the importer's unlock removes the document
        assert_eq!(table.unlock_document(&uri), 0);
        assert!(table.get_document(&uri).is_none());
    }

    #[tokio::test]
    async fn test_add_module_unsupported_type() {
        let table = table();
        let err = table
            .add_module(DocumentCreationOptions {
                uri: Some(Url::parse("file:///w/p").unwrap()),
                file_path: None,
                module_name: None,
                module_type: ModuleType::Package,
                content: None,
                version: 0,
                parse_immediately: false,
                analyze: false,
            })
            .unwrap_err();
        assert_eq!(err, DocumentError::UnsupportedModuleType(ModuleType::Package));
    }

    #[tokio::test]
    async fn test_lookup_by_name() {
        let table = table();
        let uri = Url::parse("file:///w/pkg/mod.py").unwrap();
        table
            .add_module(DocumentCreationOptions {
                uri: Some(uri.clone()),
                file_path: None,
                module_name: Some("pkg.mod".into()),
                module_type: ModuleType::Library,
                content: Some(String::new()),
                version: 0,
                parse_immediately: false,
                analyze: false,
            })
            .unwrap();
        let doc = table.get_document_by_name("pkg.mod").unwrap();
        assert_eq!(doc.uri(), &uri);
    }
}
