//! The module resolvers: Main (user and library code, with typeshed as the
//! stub fallback) and Typeshed (stub-only).
//!
//! Each dotted name resolves through a lazily initialised module reference.
//! The first caller wins the creation right; a re-entrant request arriving
//! while creation is in flight (a cyclic import) observes `None` instead of
//! blocking, which is what keeps cyclic imports deadlock-free.

use std::sync::Arc;

use ecow::EcoString;
use parking_lot::RwLock;
use pythia_std::hash::FxDashMap;
use pythia_std::{CreationRef, CreationState, ImmutPath};
use pythia_vfs::{
    Document, DocumentCreationOptions, DocumentHost, DocumentTable, ModuleType, synthetic_uri,
    uri_from_path,
};

use crate::args::ResolverArgs;
use crate::interp::{InterpreterInfo, PythonLanguageVersion, query_interpreter};
use crate::path_res::{ModuleImport, PathResolver};
use crate::scrape::Scraper;
use crate::typeshed::{StubLocator, typeshed_search_paths};

/// The lazily initialised reference associating a dotted name with its
/// module. `None` records a name that did not resolve.
pub type ModuleRef = CreationRef<Option<Arc<Document>>>;

/// Resolves stub-only modules from typeshed and the bundled stubs.
pub struct TypeshedResolver {
    host: Arc<DocumentHost>,
    locator: StubLocator,
    modules: FxDashMap<EcoString, Arc<ModuleRef>>,
}

impl TypeshedResolver {
    /// Creates a typeshed resolver with no search paths yet.
    pub fn new(host: Arc<DocumentHost>) -> Self {
        Self {
            host,
            locator: StubLocator::default(),
            modules: FxDashMap::default(),
        }
    }

    /// Points the resolver at a typeshed root for the given version.
    pub fn set_typeshed_root(&self, root: Option<&std::path::Path>, version: PythonLanguageVersion) {
        let paths = match root {
            Some(root) => typeshed_search_paths(root, version),
            None => Vec::new(),
        };
        self.locator.set_search_paths(paths);
        self.modules.clear();
    }

    /// The stub file a dotted name resolves to, if any.
    pub fn find_stub_path(&self, name: &str) -> Option<ImmutPath> {
        self.locator.find_stub(name)
    }

    /// Gets or creates the stub module for a dotted name.
    ///
    /// Stub documents live outside the running document table; they are
    /// reachable only through the module they are attached to.
    pub fn get_or_create_module(&self, name: &str) -> Option<Arc<Document>> {
        let cell = self
            .modules
            .entry(name.into())
            .or_insert_with(|| Arc::new(ModuleRef::default()))
            .clone();
        match cell.try_begin() {
            CreationState::Ready(module) => module.clone(),
            CreationState::Creating => None,
            CreationState::Created(guard) => {
                let created = self.create_stub_module(name);
                guard.complete(created).clone()
            }
        }
    }

    fn create_stub_module(&self, name: &str) -> Option<Arc<Document>> {
        let path = self.find_stub_path(name)?;
        create_stub_document(&self.host, name, path)
    }
}

fn create_stub_document(
    host: &Arc<DocumentHost>,
    name: &str,
    path: ImmutPath,
) -> Option<Arc<Document>> {
    let content = std::fs::read_to_string(&path).unwrap_or_default();
    Document::new(
        DocumentCreationOptions {
            uri: None,
            file_path: Some(path),
            module_name: Some(name.into()),
            module_type: ModuleType::Stub,
            content: Some(content),
            version: 0,
            parse_immediately: true,
            analyze: false,
        },
        host.clone(),
    )
    .ok()
}

/// The main module resolver.
pub struct MainModuleResolver {
    table: Arc<DocumentTable>,
    paths: Arc<PathResolver>,
    typeshed: Arc<TypeshedResolver>,
    modules: FxDashMap<EcoString, Arc<ModuleRef>>,
    specialized: FxDashMap<EcoString, Arc<Document>>,
    interpreter: RwLock<Option<ImmutPath>>,
    typeshed_root: RwLock<Option<ImmutPath>>,
    language_version: RwLock<PythonLanguageVersion>,
}

impl MainModuleResolver {
    /// Creates a resolver over the given table.
    ///
    /// The resolver installs itself as the table's path registrar.
    pub fn new(table: Arc<DocumentTable>, paths: Arc<PathResolver>) -> Arc<Self> {
        let typeshed = Arc::new(TypeshedResolver::new(table.host().clone()));
        table.set_path_registrar(paths.clone());
        Arc::new(Self {
            table,
            paths,
            typeshed,
            modules: FxDashMap::default(),
            specialized: FxDashMap::default(),
            interpreter: RwLock::new(None),
            typeshed_root: RwLock::new(None),
            language_version: RwLock::new(PythonLanguageVersion::default()),
        })
    }

    /// The table the resolver creates modules in.
    pub fn table(&self) -> &Arc<DocumentTable> {
        &self.table
    }

    /// The path resolver.
    pub fn paths(&self) -> &Arc<PathResolver> {
        &self.paths
    }

    /// The typeshed resolver.
    pub fn typeshed(&self) -> &Arc<TypeshedResolver> {
        &self.typeshed
    }

    /// Applies the configured arguments: roots, stubs, interpreter probe,
    /// and the scraper for compiled modules.
    pub async fn configure(&self, args: &ResolverArgs) {
        *self.interpreter.write() = args.interpreter.interpreter.as_deref().map(Into::into);
        *self.typeshed_root.write() = args.typeshed.as_deref().map(Into::into);

        self.paths
            .set_bundled_stubs(args.stubs.as_deref().map(Into::into));

        let mut added = self.paths.set_root(args.root.as_deref().map(Into::into));
        added.extend(
            self.paths
                .set_user_search_paths(args.search_paths.iter().map(|p| p.as_path().into()).collect()),
        );
        self.index_roots(&added);

        let info = match self.interpreter.read().clone() {
            Some(interpreter) => query_interpreter(&interpreter).await,
            None => InterpreterInfo::default(),
        };

        let version = args
            .interpreter
            .language_version
            .as_deref()
            .and_then(|v| v.parse().ok())
            .or(info.version)
            .unwrap_or_default();
        *self.language_version.write() = version;

        let scraper = Scraper::new(
            self.interpreter.read().clone(),
            args.scrape_script.as_deref().map(Into::into),
            info.lib_path.clone(),
        );
        self.table.set_content_source(Arc::new(scraper));

        self.apply_interpreter_info(info, version);
    }

    fn apply_interpreter_info(&self, info: InterpreterInfo, version: PythonLanguageVersion) {
        self.paths.set_require_init_py(version.require_init_py());
        self.typeshed
            .set_typeshed_root(self.typeshed_root.read().as_deref(), version);

        let added = self.paths.set_interpreter_search_paths(info.search_paths);
        self.paths.set_builtin_module_names(info.builtin_names);
        self.index_roots(&added);
    }

    fn index_roots(&self, roots: &[ImmutPath]) {
        for root in roots {
            for file in PathResolver::enumerate_module_files(root) {
                let _ = self.paths.try_add_module_path(&file);
            }
        }
        if !roots.is_empty() {
            log::info!(
                "indexed {} roots, {} module files known",
                roots.len(),
                self.paths.registered_len()
            );
        }
    }

    /// Registers a synthetic module under a dotted name, overriding
    /// resolution for it.
    pub fn specialize_module(&self, name: &str, ctor: impl FnOnce() -> Arc<Document>) {
        self.specialized.entry(name.into()).or_insert_with(ctor);
    }

    /// The specialized module registered under a name, if any.
    pub fn get_specialized_module(&self, name: &str) -> Option<Arc<Document>> {
        self.specialized.get(name).map(|entry| entry.value().clone())
    }

    /// Gets or creates the module for a dotted name.
    ///
    /// Returns `None` when the name does not resolve, and also — without
    /// blocking — when the module is currently being created by another
    /// caller (a cyclic import).
    pub async fn get_or_create_module(&self, name: &str) -> Option<Arc<Document>> {
        if let Some(specialized) = self.get_specialized_module(name) {
            return Some(specialized);
        }
        let cell = self
            .modules
            .entry(name.into())
            .or_insert_with(|| Arc::new(ModuleRef::default()))
            .clone();
        match cell.try_begin() {
            CreationState::Ready(module) => module.clone(),
            CreationState::Creating => None,
            CreationState::Created(guard) => {
                let created = self.create_module(name).await;
                guard.complete(created).clone()
            }
        }
    }

    async fn create_module(&self, name: &str) -> Option<Arc<Document>> {
        let snapshot = self.paths.snapshot();
        let import = snapshot.get_module_import_from_name(name)?;

        // an already-tracked document only needs another lock
        if let Some(path) = &import.module_path {
            if let Ok(uri) = uri_from_path(path) {
                if let Some(doc) = self.table.get_document(&uri) {
                    self.table.lock_document(&uri);
                    return Some(doc);
                }
            }
        }

        // prefer a sibling stub; fall back to typeshed
        let stub_path = snapshot
            .get_possible_module_stub_paths(name)
            .into_iter()
            .find(|candidate| candidate.is_file())
            .map(|candidate| ImmutPath::from(candidate.as_path()))
            .or_else(|| self.typeshed.find_stub_path(name));

        let doc = self.instantiate(name, &import).await?;

        match stub_path {
            // the stub is the module itself
            Some(stub) if Some(&stub) == import.module_path.as_ref() => {
                doc.attach_stub(doc.clone());
            }
            Some(stub) => {
                if let Some(stub_doc) = create_stub_document(self.table.host(), name, stub) {
                    doc.attach_stub(stub_doc);
                    // an analysis may already be running without the stub
                    if let Some(handler) = self.table.host().analysis_handler() {
                        handler.schedule(doc.clone());
                    }
                }
            }
            None => {}
        }
        Some(doc)
    }

    async fn instantiate(&self, name: &str, import: &ModuleImport) -> Option<Arc<Document>> {
        let module_type = if import.is_builtin {
            ModuleType::CompiledBuiltin
        } else if import.is_compiled {
            ModuleType::Compiled
        } else if import.is_library {
            ModuleType::Library
        } else {
            ModuleType::User
        };

        let uri = match &import.module_path {
            Some(path) => uri_from_path(path).ok()?,
            None => synthetic_uri(name).ok()?,
        };

        self.table
            .add_module(DocumentCreationOptions {
                uri: Some(uri),
                file_path: import.module_path.clone(),
                module_name: Some(import.full_name.clone()),
                module_type,
                content: None,
                version: 0,
                parse_immediately: true,
                analyze: true,
            })
            .ok()
    }

    /// Tears down the module cache, re-queries the interpreter, and
    /// re-indexes every root. Every tracked module is unlocked in the table.
    pub async fn reload(&self) {
        let tracked: Vec<Arc<ModuleRef>> = self
            .modules
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.modules.clear();
        for cell in tracked {
            if let Some(Some(doc)) = cell.get() {
                self.table.unlock_document(doc.uri());
            }
        }

        let info = match self.interpreter.read().clone() {
            Some(interpreter) => query_interpreter(&interpreter).await,
            None => InterpreterInfo::default(),
        };
        let version = info.version.unwrap_or(*self.language_version.read());
        *self.language_version.write() = version;
        self.apply_interpreter_info(info, version);
        log::info!("module resolver reloaded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn workspace(files: &[(&str, &str)]) -> (TempDir, Arc<MainModuleResolver>) {
        let dir = TempDir::new().unwrap();
        for (rel, content) in files {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let table = Arc::new(DocumentTable::new());
        let paths = Arc::new(PathResolver::new());
        paths.set_root(Some(dir.path().into()));
        let resolver = MainModuleResolver::new(table, paths);
        (dir, resolver)
    }

    #[tokio::test]
    async fn test_create_module_from_workspace() {
        let (_dir, resolver) = workspace(&[("m.py", "x = 1\n")]);
        let doc = resolver.get_or_create_module("m").await.unwrap();
        assert_eq!(doc.module_type(), ModuleType::User);
        assert_eq!(doc.module_name().unwrap(), "m");
        // resolving again reuses the tracked document
        let again = resolver.get_or_create_module("m").await.unwrap();
        assert!(Arc::ptr_eq(&doc, &again));
    }

    #[tokio::test]
    async fn test_unresolvable_module_is_none() {
        let (_dir, resolver) = workspace(&[]);
        assert!(resolver.get_or_create_module("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_sibling_stub_attached() {
        let (dir, resolver) = workspace(&[
            ("pkg/__init__.py", ""),
            ("pkg/mod.py", "def f():\n    return 1\n"),
            ("pkg/mod.pyi", "def f() -> int: ...\n"),
        ]);
        let doc = resolver.get_or_create_module("pkg.mod").await.unwrap();
        let stub = doc.stub().expect("sibling stub must attach");
        assert_eq!(
            stub.file_path().unwrap().as_ref(),
            dir.path().join("pkg/mod.pyi")
        );
        assert_eq!(stub.module_type(), ModuleType::Stub);
    }

    #[tokio::test]
    async fn test_stub_only_module_is_its_own_stub() {
        let (_dir, resolver) = workspace(&[("typed.pyi", "x: int\n")]);
        let doc = resolver.get_or_create_module("typed").await.unwrap();
        let stub = doc.stub().expect("stub-only module is its own stub");
        assert!(Arc::ptr_eq(&doc, stub));
    }

    #[tokio::test]
    async fn test_specialized_module_wins() {
        let (_dir, resolver) = workspace(&[("m.py", "")]);
        let host = resolver.table().host().clone();
        resolver.specialize_module("m", || {
            Document::new(
                DocumentCreationOptions {
                    uri: Some(synthetic_uri("m-specialized").unwrap()),
                    file_path: None,
                    module_name: Some("m".into()),
                    module_type: ModuleType::Builtins,
                    content: Some(String::new()),
                    version: 0,
                    parse_immediately: false,
                    analyze: false,
                },
                host.clone(),
            )
            .unwrap()
        });
        let doc = resolver.get_or_create_module("m").await.unwrap();
        assert_eq!(doc.module_type(), ModuleType::Builtins);
    }

    #[tokio::test]
    async fn test_reload_unlocks_tracked_modules() {
        let (_dir, resolver) = workspace(&[("m.py", "x = 1\n")]);
        let doc = resolver.get_or_create_module("m").await.unwrap();
        let uri = doc.uri().clone();
        assert!(resolver.table().get_document(&uri).is_some());

        resolver.reload().await;
        // the only lock was the resolver's; the document left the table
        assert!(resolver.table().get_document(&uri).is_none());
    }
}
