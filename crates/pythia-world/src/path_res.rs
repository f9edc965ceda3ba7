//! Maps dotted module names to files across the resolver's root groups.
//!
//! Roots come in three ordered groups: the interpreter's search paths, the
//! user-configured search paths (deduplicated against the interpreter's),
//! and the workspace root. Configuration lives in an immutable snapshot that
//! is republished on every mutation; the path→name registry of discovered
//! module files is a lock-free concurrent map shared across snapshots.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ecow::EcoString;
use parking_lot::RwLock;
use pythia_std::ImmutPath;
use pythia_std::hash::{FxDashMap, FxHashSet};
use pythia_std::path::{is_python_compiled, is_python_source, is_python_stub};
use pythia_vfs::PathRegistrar;
use walkdir::WalkDir;

/// The resolution of one dotted module name.
#[derive(Debug, Clone)]
pub struct ModuleImport {
    /// The dotted name that was resolved.
    pub full_name: EcoString,
    /// The resolved file; `None` for interpreter-builtin modules.
    pub module_path: Option<ImmutPath>,
    /// The root the file was found under.
    pub root_path: Option<ImmutPath>,
    /// Whether the module is compiled into the interpreter.
    pub is_builtin: bool,
    /// Whether the module is a compiled extension (`.pyd`/`.so`).
    pub is_compiled: bool,
    /// Whether the module was found outside the workspace root.
    pub is_library: bool,
}

/// The immutable configuration of the path resolver at one point in time.
#[derive(Debug, Default)]
pub struct PathResolverSnapshot {
    root: Option<ImmutPath>,
    interpreter_paths: Vec<ImmutPath>,
    user_paths: Vec<ImmutPath>,
    bundled_stubs: Option<ImmutPath>,
    builtin_names: FxHashSet<EcoString>,
    require_init_py: bool,
}

impl PathResolverSnapshot {
    /// Every root, in precedence order: interpreter paths, user paths,
    /// workspace root.
    pub fn roots(&self) -> impl Iterator<Item = &ImmutPath> {
        self.interpreter_paths
            .iter()
            .chain(self.user_paths.iter())
            .chain(self.root.iter())
    }

    /// The workspace root, when configured.
    pub fn workspace_root(&self) -> Option<&ImmutPath> {
        self.root.as_ref()
    }

    /// Whether a directory is importable as a package.
    pub fn is_package_dir(&self, dir: &Path) -> bool {
        if !dir.is_dir() {
            return false;
        }
        if !self.require_init_py {
            return true;
        }
        dir.join("__init__.py").is_file() || dir.join("__init__.pyi").is_file()
    }

    /// Resolves a dotted name to a file across the roots.
    pub fn get_module_import_from_name(&self, name: &str) -> Option<ModuleImport> {
        if self.builtin_names.contains(name) {
            return Some(ModuleImport {
                full_name: name.into(),
                module_path: None,
                root_path: None,
                is_builtin: true,
                is_compiled: true,
                is_library: true,
            });
        }

        let parts: Vec<&str> = name.split('.').collect();
        if parts.iter().any(|part| part.is_empty()) {
            return None;
        }

        for root in self.roots() {
            if let Some((path, root)) = self.resolve_in_root(root, &parts) {
                let is_library = self
                    .root
                    .as_ref()
                    .is_none_or(|workspace| *workspace != root);
                let is_compiled = is_python_compiled(&path);
                return Some(ModuleImport {
                    full_name: name.into(),
                    module_path: Some(path.into()),
                    root_path: Some(root),
                    is_builtin: false,
                    is_compiled,
                    is_library,
                });
            }
        }
        None
    }

    fn resolve_in_root(&self, root: &ImmutPath, parts: &[&str]) -> Option<(PathBuf, ImmutPath)> {
        let (stem, prefix) = parts.split_last()?;
        let mut dir = root.to_path_buf();
        for part in prefix {
            dir.push(part);
            if !self.is_package_dir(&dir) {
                return None;
            }
        }

        let package_init = dir.join(stem).join("__init__.py");
        if self.is_package_dir(&dir.join(stem)) && package_init.is_file() {
            return Some((package_init, root.clone()));
        }
        for ext in ["py", "pyi", "pyd", "so"] {
            let candidate = dir.join(format!("{stem}.{ext}"));
            if candidate.is_file() {
                return Some((candidate, root.clone()));
            }
        }
        let package_init_stub = dir.join(stem).join("__init__.pyi");
        if package_init_stub.is_file() {
            return Some((package_init_stub, root.clone()));
        }
        None
    }

    /// Candidate `.pyi` locations for a module: next to the module under
    /// each root, and in the bundled stubs tree.
    pub fn get_possible_module_stub_paths(&self, name: &str) -> Vec<PathBuf> {
        let parts: Vec<&str> = name.split('.').collect();
        let mut candidates = Vec::new();

        let rel: PathBuf = parts.iter().collect();
        for root in self.roots() {
            candidates.push(root.join(&rel).with_extension("pyi"));
            candidates.push(root.join(&rel).join("__init__.pyi"));
        }
        if let Some(stubs) = &self.bundled_stubs {
            candidates.push(stubs.join(&rel).with_extension("pyi"));
            candidates.push(stubs.join(&rel).join("__init__.pyi"));
        }
        candidates
    }

    /// Computes the dotted name a module file would import as, by walking
    /// back up to the root that contains it.
    pub fn module_name_for_path(&self, path: &Path) -> Option<EcoString> {
        for root in self.roots() {
            let Ok(rel) = path.strip_prefix(root.as_ref()) else {
                continue;
            };
            let mut parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let file = parts.pop()?;
            let stem = file.split_once('.').map(|(s, _)| s).unwrap_or(&file);
            if stem != "__init__" {
                parts.push(stem.to_owned());
            }
            if parts.is_empty() {
                return None;
            }
            return Some(parts.join(".").into());
        }
        None
    }
}

/// The mutable face of the path resolver.
#[derive(Debug, Default)]
pub struct PathResolver {
    snapshot: RwLock<Arc<PathResolverSnapshot>>,
    /// Registered module files, path → dotted name.
    modules: FxDashMap<ImmutPath, EcoString>,
}

impl PathResolver {
    /// Creates a resolver with no roots.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current immutable snapshot.
    pub fn snapshot(&self) -> Arc<PathResolverSnapshot> {
        self.snapshot.read().clone()
    }

    fn mutate(&self, f: impl FnOnce(&mut PathResolverSnapshot)) {
        let mut guard = self.snapshot.write();
        let mut next = PathResolverSnapshot {
            root: guard.root.clone(),
            interpreter_paths: guard.interpreter_paths.clone(),
            user_paths: guard.user_paths.clone(),
            bundled_stubs: guard.bundled_stubs.clone(),
            builtin_names: guard.builtin_names.clone(),
            require_init_py: guard.require_init_py,
        };
        f(&mut next);
        *guard = Arc::new(next);
    }

    /// Sets the workspace root. Returns the newly added roots.
    pub fn set_root(&self, root: Option<ImmutPath>) -> Vec<ImmutPath> {
        let added: Vec<ImmutPath> = root
            .iter()
            .filter(|r| self.snapshot().root.as_ref() != Some(*r))
            .cloned()
            .collect();
        self.mutate(|snapshot| snapshot.root = root);
        added
    }

    /// Replaces the interpreter search paths. Returns the newly added roots.
    pub fn set_interpreter_search_paths(&self, paths: Vec<ImmutPath>) -> Vec<ImmutPath> {
        let prev = self.snapshot();
        let added = paths
            .iter()
            .filter(|p| !prev.interpreter_paths.contains(p))
            .cloned()
            .collect();
        self.mutate(|snapshot| snapshot.interpreter_paths = paths);
        added
    }

    /// Replaces the user search paths, deduplicated against the
    /// interpreter's. Returns the newly added roots.
    pub fn set_user_search_paths(&self, paths: Vec<ImmutPath>) -> Vec<ImmutPath> {
        let prev = self.snapshot();
        let paths: Vec<ImmutPath> = paths
            .into_iter()
            .filter(|p| !prev.interpreter_paths.contains(p))
            .collect();
        let added = paths
            .iter()
            .filter(|p| !prev.user_paths.contains(p))
            .cloned()
            .collect();
        self.mutate(|snapshot| snapshot.user_paths = paths);
        added
    }

    /// Sets the bundled stubs folder.
    pub fn set_bundled_stubs(&self, stubs: Option<ImmutPath>) {
        self.mutate(|snapshot| snapshot.bundled_stubs = stubs);
    }

    /// Sets the interpreter-builtin module names.
    pub fn set_builtin_module_names(&self, names: impl IntoIterator<Item = EcoString>) {
        self.mutate(|snapshot| snapshot.builtin_names = names.into_iter().collect());
    }

    /// Sets whether packages require an `__init__.py`.
    pub fn set_require_init_py(&self, require: bool) {
        self.mutate(|snapshot| snapshot.require_init_py = require);
    }

    /// Registers a newly discovered file under its computed dotted name.
    pub fn try_add_module_path(&self, path: &Path) -> Option<EcoString> {
        let name = self.snapshot().module_name_for_path(path)?;
        self.modules.insert(path.into(), name.clone());
        Some(name)
    }

    /// Forgets a registered file.
    pub fn remove_module_path(&self, path: &Path) {
        self.modules.remove(path);
    }

    /// The registered name of a file, if any.
    pub fn registered_name(&self, path: &Path) -> Option<EcoString> {
        self.modules.get(path).map(|entry| entry.value().clone())
    }

    /// The number of registered module files.
    pub fn registered_len(&self) -> usize {
        self.modules.len()
    }

    /// Walks a root and yields every module file under it.
    pub fn enumerate_module_files(root: &Path) -> Vec<PathBuf> {
        WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                is_python_source(path) || is_python_stub(path) || is_python_compiled(path)
            })
            .collect()
    }
}

impl PathRegistrar for PathResolver {
    fn try_add_module_path(&self, path: &Path) -> Option<EcoString> {
        PathResolver::try_add_module_path(self, path)
    }

    fn remove_module_path(&self, path: &Path) {
        PathResolver::remove_module_path(self, path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn resolver_with_root(root: &Path) -> PathResolver {
        let resolver = PathResolver::new();
        resolver.set_root(Some(root.into()));
        resolver
    }

    #[test]
    fn test_resolve_top_level_module() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.py"), "x = 1\n");

        let resolver = resolver_with_root(dir.path());
        let import = resolver
            .snapshot()
            .get_module_import_from_name("a")
            .unwrap();
        assert_eq!(import.full_name, "a");
        assert!(!import.is_library);
        assert!(!import.is_compiled);
        assert_eq!(
            import.module_path.unwrap().as_ref(),
            dir.path().join("a.py")
        );
    }

    #[test]
    fn test_resolve_package_module() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("pkg/__init__.py"), "");
        touch(&dir.path().join("pkg/mod.py"), "y = 2\n");

        let resolver = resolver_with_root(dir.path());
        let snapshot = resolver.snapshot();

        let import = snapshot.get_module_import_from_name("pkg.mod").unwrap();
        assert_eq!(
            import.module_path.unwrap().as_ref(),
            dir.path().join("pkg/mod.py")
        );

        // the package itself resolves to its __init__
        let import = snapshot.get_module_import_from_name("pkg").unwrap();
        assert_eq!(
            import.module_path.unwrap().as_ref(),
            dir.path().join("pkg/__init__.py")
        );
    }

    #[test]
    fn test_require_init_py_policy() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("ns/mod.py"), "");

        let resolver = resolver_with_root(dir.path());
        // implicit namespace packages allowed by default
        assert!(
            resolver
                .snapshot()
                .get_module_import_from_name("ns.mod")
                .is_some()
        );

        resolver.set_require_init_py(true);
        assert!(
            resolver
                .snapshot()
                .get_module_import_from_name("ns.mod")
                .is_none()
        );
    }

    #[test]
    fn test_interpreter_paths_take_precedence() {
        let workspace = TempDir::new().unwrap();
        let site = TempDir::new().unwrap();
        touch(&workspace.path().join("dup.py"), "workspace");
        touch(&site.path().join("dup.py"), "site");

        let resolver = resolver_with_root(workspace.path());
        resolver.set_interpreter_search_paths(vec![site.path().into()]);

        let import = resolver
            .snapshot()
            .get_module_import_from_name("dup")
            .unwrap();
        assert!(import.is_library);
        assert_eq!(
            import.module_path.unwrap().as_ref(),
            site.path().join("dup.py")
        );
    }

    #[test]
    fn test_builtin_module_has_no_path() {
        let resolver = PathResolver::new();
        resolver.set_builtin_module_names(["sys".into()]);
        let import = resolver
            .snapshot()
            .get_module_import_from_name("sys")
            .unwrap();
        assert!(import.is_builtin);
        assert!(import.module_path.is_none());
    }

    #[test]
    fn test_module_name_round_trip() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("pkg/__init__.py"), "");
        touch(&dir.path().join("pkg/sub/__init__.py"), "");
        touch(&dir.path().join("pkg/sub/leaf.py"), "");

        let resolver = resolver_with_root(dir.path());
        let snapshot = resolver.snapshot();
        assert_eq!(
            snapshot
                .module_name_for_path(&dir.path().join("pkg/sub/leaf.py"))
                .unwrap(),
            "pkg.sub.leaf"
        );
        assert_eq!(
            snapshot
                .module_name_for_path(&dir.path().join("pkg/__init__.py"))
                .unwrap(),
            "pkg"
        );
    }

    #[test]
    fn test_registry_add_and_remove() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("m.py"), "");

        let resolver = resolver_with_root(dir.path());
        let path = dir.path().join("m.py");
        assert_eq!(resolver.try_add_module_path(&path).unwrap(), "m");
        assert_eq!(resolver.registered_name(&path).unwrap(), "m");

        resolver.remove_module_path(&path);
        assert!(resolver.registered_name(&path).is_none());
    }

    #[test]
    fn test_user_paths_deduped_against_interpreter() {
        let shared = TempDir::new().unwrap();
        let own = TempDir::new().unwrap();

        let resolver = PathResolver::new();
        resolver.set_interpreter_search_paths(vec![shared.path().into()]);
        let added = resolver.set_user_search_paths(vec![shared.path().into(), own.path().into()]);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].as_ref(), own.path());
    }

    #[test]
    fn test_enumerate_module_files() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.py"), "");
        touch(&dir.path().join("pkg/b.pyi"), "");
        touch(&dir.path().join("pkg/skip.txt"), "");

        let mut files = PathResolver::enumerate_module_files(dir.path());
        files.sort();
        assert_eq!(
            files,
            vec![dir.path().join("a.py"), dir.path().join("pkg/b.pyi")]
        );
    }
}
