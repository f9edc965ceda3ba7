//! One live module: its buffer, its latest AST and diagnostics, and the
//! cancellable background re-parse that keeps them current.
//!
//! The document holds two mutex domains: the parse lock guards text/AST
//! coherence (the buffer and the pending parse task), the analysis lock
//! guards the analysis version gate. They are only ever taken in the order
//! parse lock, then analysis lock. Parsing itself runs outside both.

use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use ecow::{EcoString, EcoVec};
use lsp_types::Url;
use parking_lot::{Mutex, RwLock};
use pythia_analysis::diag::{Diagnostic, DiagnosticSeverity, codes};
use pythia_analysis::scope::ModuleAnalysis;
use pythia_std::hash::FxHashSet;
use pythia_std::loc::{IndexSpan, NewLineLocations};
use pythia_std::{ImmutPath, ImmutStr};
use rustpython_ast as ast;
use rustpython_parser::Parse;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::buffer::{Applied, BufferError, DocumentBuffer};
use crate::changes::DocumentChangeSet;
use crate::events::{DocumentEvent, EventDispatcher};
use crate::uri::uri_from_path;

/// How a module entered the process and how its content is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ModuleType {
    /// A module open in (or belonging to) the user's workspace.
    User,
    /// A module resolved from a library search path.
    Library,
    /// A `.pyi` stub module.
    Stub,
    /// A compiled extension module, scraped for content.
    Compiled,
    /// A compiled module built into the interpreter.
    CompiledBuiltin,
    /// The `builtins` module itself.
    Builtins,
    /// A package directory (`__init__`).
    Package,
}

/// A caller contract violation while creating a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentError {
    /// Neither a file path nor a uri was supplied.
    MissingIdentity,
    /// The table cannot create documents of this module type.
    UnsupportedModuleType(ModuleType),
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentError::MissingIdentity => {
                write!(f, "a document needs a file path or a uri")
            }
            DocumentError::UnsupportedModuleType(ty) => {
                write!(f, "cannot create a document of module type {ty}")
            }
        }
    }
}

impl std::error::Error for DocumentError {}

/// The signal raised when a wait was abandoned by cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canceled;

impl fmt::Display for Canceled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation canceled")
    }
}

impl std::error::Error for Canceled {}

/// The published result of one parse.
#[derive(Debug)]
pub struct ParsedModule {
    /// The buffer version the parse ran against.
    pub version: u32,
    /// The module body; `None` when the text did not parse.
    pub ast: Option<Arc<ast::ModModule>>,
    /// Parse diagnostics; empty on success.
    pub diagnostics: EcoVec<Diagnostic>,
    /// The new-line table of the parsed text.
    pub lines: NewLineLocations,
    /// The parsed text itself.
    pub text: ImmutStr,
}

/// Receives documents whose successful parse should be followed by analysis.
pub trait AnalysisHandler: Send + Sync {
    /// Schedules (re-)analysis of the document.
    fn schedule(&self, doc: Arc<Document>);
}

/// State shared between the table and every document it owns.
#[derive(Default)]
pub struct DocumentHost {
    /// The event dispatcher for table and document events.
    pub events: EventDispatcher,
    analysis: OnceLock<Arc<dyn AnalysisHandler>>,
}

impl DocumentHost {
    /// Creates a host with no analysis handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the analysis handler. Later installs are ignored.
    pub fn set_analysis_handler(&self, handler: Arc<dyn AnalysisHandler>) {
        let _ = self.analysis.set(handler);
    }

    /// The installed analysis handler, if any.
    pub fn analysis_handler(&self) -> Option<Arc<dyn AnalysisHandler>> {
        self.analysis.get().cloned()
    }
}

impl fmt::Debug for DocumentHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentHost")
            .field("has_analysis_handler", &self.analysis.get().is_some())
            .finish()
    }
}

/// Options for creating a document.
#[derive(Debug, Clone)]
pub struct DocumentCreationOptions {
    /// The uri; derived from the file path when absent.
    pub uri: Option<Url>,
    /// The backing file, when there is one.
    pub file_path: Option<ImmutPath>,
    /// The dotted module name, when already known.
    pub module_name: Option<EcoString>,
    /// The kind of module.
    pub module_type: ModuleType,
    /// The initial buffer content.
    pub content: Option<String>,
    /// The initial buffer version.
    pub version: u32,
    /// Whether to start a parse right away.
    pub parse_immediately: bool,
    /// Whether successful parses should be followed by analysis.
    pub analyze: bool,
}

impl DocumentCreationOptions {
    /// Options for a user document with the given content.
    pub fn user(uri: Url, content: impl Into<String>) -> Self {
        Self {
            uri: Some(uri),
            file_path: None,
            module_name: None,
            module_type: ModuleType::User,
            content: Some(content.into()),
            version: 0,
            parse_immediately: true,
            analyze: true,
        }
    }
}

struct ParseCtl {
    cancel: Option<CancellationToken>,
}

struct AnalysisCtl {
    expected_version: u32,
}

/// A live module in the running document table.
pub struct Document {
    uri: Url,
    file_path: Option<ImmutPath>,
    module_name: RwLock<Option<EcoString>>,
    module_type: ModuleType,
    analyze: bool,
    is_open: AtomicBool,
    buffer: DocumentBuffer,
    parse: Mutex<ParseCtl>,
    parsed_tx: watch::Sender<Option<Arc<ParsedModule>>>,
    analysis_ctl: Mutex<AnalysisCtl>,
    analysis_tx: watch::Sender<Option<Arc<ModuleAnalysis>>>,
    dependents: Mutex<FxHashSet<EcoString>>,
    stub: OnceLock<Arc<Document>>,
    dispose: CancellationToken,
    host: Arc<DocumentHost>,
}

impl Document {
    /// Creates a document. Fails when the options identify nothing.
    pub fn new(
        options: DocumentCreationOptions,
        host: Arc<DocumentHost>,
    ) -> Result<Arc<Self>, DocumentError> {
        let uri = match (options.uri, &options.file_path) {
            (Some(uri), _) => uri,
            (None, Some(path)) => {
                uri_from_path(path).map_err(|_| DocumentError::MissingIdentity)?
            }
            (None, None) => return Err(DocumentError::MissingIdentity),
        };

        let doc = Arc::new(Self {
            uri,
            file_path: options.file_path,
            module_name: RwLock::new(options.module_name),
            module_type: options.module_type,
            analyze: options.analyze,
            is_open: AtomicBool::new(false),
            buffer: DocumentBuffer::new(options.version, options.content.unwrap_or_default()),
            parse: Mutex::new(ParseCtl { cancel: None }),
            parsed_tx: watch::channel(None).0,
            analysis_ctl: Mutex::new(AnalysisCtl {
                expected_version: 0,
            }),
            analysis_tx: watch::channel(None).0,
            dependents: Mutex::new(FxHashSet::default()),
            stub: OnceLock::new(),
            dispose: CancellationToken::new(),
            host,
        });

        if options.parse_immediately {
            doc.schedule_parse();
        }
        Ok(doc)
    }

    /// The document uri.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// The backing file, when there is one.
    pub fn file_path(&self) -> Option<&ImmutPath> {
        self.file_path.as_ref()
    }

    /// The kind of module.
    pub fn module_type(&self) -> ModuleType {
        self.module_type
    }

    /// The dotted module name, when known.
    pub fn module_name(&self) -> Option<EcoString> {
        self.module_name.read().clone()
    }

    /// Assigns the dotted module name.
    pub fn set_module_name(&self, name: EcoString) {
        *self.module_name.write() = Some(name);
    }

    /// Whether the document is open in the editor.
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Acquire)
    }

    pub(crate) fn set_open(&self, open: bool) {
        self.is_open.store(open, Ordering::Release);
    }

    /// The current buffer version.
    pub fn version(&self) -> u32 {
        self.buffer.version()
    }

    /// A snapshot of the current buffer text.
    pub fn text(&self) -> String {
        self.buffer.snapshot().1
    }

    /// The token canceled when the document is disposed.
    pub fn disposal_token(&self) -> &CancellationToken {
        &self.dispose
    }

    /// Applies a change set and, when it moved the buffer, schedules a
    /// re-parse without waiting for it.
    pub fn update(self: &Arc<Self>, set: &DocumentChangeSet) -> Result<Applied, BufferError> {
        let mut ctl = self.parse.lock();
        let applied = self.buffer.update(set)?;
        if let Applied::AtVersion(version) = applied {
            log::debug!("{} updated to v{version}", self.uri);
            self.schedule_parse_locked(&mut ctl);
        }
        Ok(applied)
    }

    /// Replaces the buffer entirely and schedules a re-parse.
    pub fn reset(self: &Arc<Self>, version: u32, text: impl Into<String>) {
        let mut ctl = self.parse.lock();
        self.buffer.reset(version, text);
        self.schedule_parse_locked(&mut ctl);
    }

    /// Schedules a re-parse of the current buffer, canceling any in-flight
    /// parse of this document.
    pub fn schedule_parse(self: &Arc<Self>) {
        let mut ctl = self.parse.lock();
        self.schedule_parse_locked(&mut ctl);
    }

    fn schedule_parse_locked(self: &Arc<Self>, ctl: &mut ParseCtl) {
        if let Some(prev) = ctl.cancel.take() {
            prev.cancel();
        }
        let token = self.dispose.child_token();
        ctl.cancel = Some(token.clone());

        let (version, text) = self.buffer.snapshot();
        let doc = self.clone();
        tokio::spawn(async move {
            let parsed = parse_module(&text, version, doc.uri.as_str());
            if token.is_cancelled() {
                return;
            }
            let publish = {
                let _parse = doc.parse.lock();
                // a newer edit slipped in between snapshot and completion
                doc.buffer.version() == version && !token.is_cancelled()
            };
            if !publish {
                return;
            }
            let has_ast = parsed.ast.is_some();
            doc.parsed_tx.send_replace(Some(Arc::new(parsed)));
            doc.host.events.dispatch(&DocumentEvent::NewAst {
                uri: doc.uri.clone(),
                version,
            });
            if has_ast && doc.analyze {
                if let Some(handler) = doc.host.analysis_handler() {
                    handler.schedule(doc.clone());
                }
            }
        });
    }

    /// The latest published parse, if any.
    pub fn parsed(&self) -> Option<Arc<ParsedModule>> {
        self.parsed_tx.borrow().clone()
    }

    /// The latest published AST, if any.
    pub fn ast(&self) -> Option<Arc<ast::ModModule>> {
        self.parsed().and_then(|parsed| parsed.ast.clone())
    }

    /// The latest parse diagnostics.
    pub fn diagnostics(&self) -> EcoVec<Diagnostic> {
        self.parsed()
            .map(|parsed| parsed.diagnostics.clone())
            .unwrap_or_default()
    }

    /// Awaits the AST, retrying across canceled parse generations until an
    /// AST is available or the caller's token fires.
    pub async fn get_ast(&self, token: &CancellationToken) -> Result<Arc<ast::ModModule>, Canceled> {
        let mut rx = self.parsed_tx.subscribe();
        loop {
            if let Some(parsed) = rx.borrow_and_update().clone() {
                if let Some(module) = &parsed.ast {
                    return Ok(module.clone());
                }
            }
            tokio::select! {
                _ = token.cancelled() => return Err(Canceled),
                _ = self.dispose.cancelled() => return Err(Canceled),
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(Canceled);
                    }
                }
            }
        }
    }

    /// Bumps the expected analysis version, invalidating in-flight results.
    pub fn notify_analysis_pending(&self) -> u32 {
        let mut ctl = self.analysis_ctl.lock();
        ctl.expected_version += 1;
        ctl.expected_version
    }

    /// The version an arriving analysis must carry to be published.
    pub fn expected_analysis_version(&self) -> u32 {
        self.analysis_ctl.lock().expected_version
    }

    /// Publishes an analysis, unless it is stale.
    ///
    /// Returns whether the analysis was published. Stale completions leave
    /// the published analysis unchanged.
    pub fn notify_analysis_complete(&self, version: u32, analysis: Arc<ModuleAnalysis>) -> bool {
        {
            let ctl = self.analysis_ctl.lock();
            if ctl.expected_version != version {
                log::debug!(
                    "{}: dropping stale analysis v{version} (expected v{})",
                    self.uri,
                    ctl.expected_version
                );
                return false;
            }
            self.analysis_tx.send_replace(Some(analysis));
        }
        self.host.events.dispatch(&DocumentEvent::NewAnalysis {
            uri: self.uri.clone(),
            version,
        });
        true
    }

    /// The latest published analysis, if any.
    pub fn analysis(&self) -> Option<Arc<ModuleAnalysis>> {
        self.analysis_tx.borrow().clone()
    }

    /// Awaits a published analysis, returning the currently published value
    /// when the timeout expires. Never fails.
    pub async fn get_analysis(&self, timeout: Duration) -> Option<Arc<ModuleAnalysis>> {
        let mut rx = self.analysis_tx.subscribe();
        let _ = tokio::time::timeout(timeout, async {
            loop {
                if rx.borrow_and_update().is_some() {
                    break;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
        self.analysis()
    }

    /// Attaches the stub module that provides this module's types.
    ///
    /// The stub either lives in its own `.pyi` file or is the module itself.
    /// Later attachments are ignored; the reference is final.
    pub fn attach_stub(&self, stub: Arc<Document>) {
        debug_assert!(
            stub.file_path()
                .is_none_or(|p| pythia_std::path::is_python_stub(p))
                || stub.uri() == self.uri()
        );
        let _ = self.stub.set(stub);
    }

    /// The attached stub module, if any.
    pub fn stub(&self) -> Option<&Arc<Document>> {
        self.stub.get()
    }

    /// Records a module whose analysis references this one.
    pub fn add_dependent(&self, module_name: EcoString) {
        self.dependents.lock().insert(module_name);
    }

    /// The modules whose analyses reference this one.
    pub fn dependents(&self) -> Vec<EcoString> {
        self.dependents.lock().iter().cloned().collect()
    }

    /// Cancels pending work. Called when the document leaves the table.
    pub fn dispose(&self) {
        self.dispose.cancel();
        if let Some(pending) = self.parse.lock().cancel.take() {
            pending.cancel();
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("uri", &self.uri.as_str())
            .field("module_type", &self.module_type)
            .field("version", &self.version())
            .field("is_open", &self.is_open())
            .finish()
    }
}

fn parse_module(text: &str, version: u32, source_path: &str) -> ParsedModule {
    let lines = NewLineLocations::from_text(text);
    match ast::Suite::parse(text, source_path) {
        Ok(body) => ParsedModule {
            version,
            ast: Some(Arc::new(ast::ModModule {
                body,
                type_ignores: vec![],
                range: Default::default(),
            })),
            diagnostics: EcoVec::new(),
            lines,
            text: text.into(),
        },
        Err(err) => {
            let offset = err.offset.to_usize().min(text.len());
            let end = text[offset..]
                .chars()
                .next()
                .map_or(offset, |c| offset + c.len_utf8());
            let index_span = IndexSpan::from_bounds(offset, end);
            let diag = Diagnostic::new(
                err.to_string(),
                lines.span_of(index_span),
                index_span,
                codes::PARSE_ERROR,
                DiagnosticSeverity::Error,
            );
            let mut diagnostics = EcoVec::new();
            diagnostics.push(diag);
            ParsedModule {
                version,
                ast: None,
                diagnostics,
                lines,
                text: text.into(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::{ChangeRange, DocumentChange};

    fn open_doc(content: &str) -> Arc<Document> {
        let uri = Url::parse("file:///w/a.py").unwrap();
        Document::new(
            DocumentCreationOptions::user(uri, content),
            Arc::new(DocumentHost::new()),
        )
        .unwrap()
    }

    async fn wait_ast(doc: &Arc<Document>) -> Arc<ast::ModModule> {
        let token = CancellationToken::new();
        doc.get_ast(&token).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_parses() {
        let doc = open_doc("x = 1\n");
        let module = wait_ast(&doc).await;
        assert_eq!(module.body.len(), 1);
        assert!(doc.diagnostics().is_empty());
    }

    #[tokio::test]
    async fn test_update_reparses_and_fires_new_ast() {
        let doc = open_doc("x = 1\n");
        wait_ast(&doc).await;

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        doc.host.events.subscribe(move |event| {
            if let DocumentEvent::NewAst { version, .. } = event {
                sink.lock().push(*version);
            }
        });

        let set = DocumentChangeSet::new(
            0,
            1,
            vec![DocumentChange::replace(
                ChangeRange {
                    start_line: 1,
                    start_col: 5,
                    end_line: 1,
                    end_col: 6,
                },
                "2",
            )],
        );
        doc.update(&set).unwrap();
        assert_eq!(doc.version(), 1);
        assert_eq!(doc.text(), "x = 2\n");

        // the re-parse for v1 publishes exactly once
        loop {
            if doc.parsed().is_some_and(|p| p.version == 1) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(events.lock().as_slice(), &[1]);
    }

    #[tokio::test]
    async fn test_parse_error_becomes_diagnostic() {
        let doc = open_doc("def f(:\n");
        // wait for the parse to publish (no AST will appear)
        loop {
            if doc.parsed().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let diags = doc.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "parse-error");
        assert_eq!(diags[0].severity, DiagnosticSeverity::Error);
        assert!(doc.ast().is_none());
    }

    #[tokio::test]
    async fn test_stale_analysis_discarded() {
        let doc = open_doc("x = 1\n");
        let v1 = doc.notify_analysis_pending();
        let v2 = doc.notify_analysis_pending();
        assert_eq!((v1, v2), (1, 2));

        let stale = Arc::new(ModuleAnalysis::empty("a", "a.py"));
        assert!(!doc.notify_analysis_complete(v1, stale));
        assert!(doc.analysis().is_none());

        let fresh = Arc::new(ModuleAnalysis::empty("a", "a.py"));
        assert!(doc.notify_analysis_complete(v2, fresh));
        assert!(doc.analysis().is_some());
    }

    #[tokio::test]
    async fn test_get_analysis_times_out_to_current() {
        let doc = open_doc("x = 1\n");
        let got = doc.get_analysis(Duration::from_millis(10)).await;
        assert!(got.is_none());

        let version = doc.notify_analysis_pending();
        doc.notify_analysis_complete(version, Arc::new(ModuleAnalysis::empty("a", "a.py")));
        let got = doc.get_analysis(Duration::from_millis(10)).await;
        assert!(got.is_some());
    }

    #[tokio::test]
    async fn test_get_ast_cancellation() {
        let doc = open_doc("def f(:\n"); // never yields an AST
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(doc.get_ast(&token).await.unwrap_err(), Canceled);
    }
}
