//! Typeshed stub layout: versioned stdlib and third-party stub directories.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use pythia_std::ImmutPath;

use crate::interp::PythonLanguageVersion;

/// Computes the stub search paths inside a typeshed root, in probe order:
/// `stdlib/<major>`, `stdlib/2and3`, `stdlib/<major>.<minor>` for each minor
/// up to the interpreter version, and the same under `third_party/`.
pub fn typeshed_search_paths(
    typeshed_root: &Path,
    version: PythonLanguageVersion,
) -> Vec<ImmutPath> {
    let mut paths = Vec::new();
    for base in ["stdlib", "third_party"] {
        let base = typeshed_root.join(base);
        let mut candidates = vec![
            base.join(version.major.to_string()),
            base.join("2and3"),
        ];
        for minor in 0..=version.minor {
            candidates.push(base.join(format!("{}.{minor}", version.major)));
        }
        for candidate in candidates {
            if candidate.is_dir() {
                paths.push(candidate.as_path().into());
            }
        }
    }
    paths
}

/// Locates `.pyi` stubs across an ordered set of stub roots.
#[derive(Debug, Default)]
pub struct StubLocator {
    search_paths: RwLock<Vec<ImmutPath>>,
}

impl StubLocator {
    /// Creates a locator over the given roots.
    pub fn new(search_paths: Vec<ImmutPath>) -> Self {
        Self {
            search_paths: RwLock::new(search_paths),
        }
    }

    /// Replaces the roots.
    pub fn set_search_paths(&self, search_paths: Vec<ImmutPath>) {
        *self.search_paths.write() = search_paths;
    }

    /// The current roots.
    pub fn search_paths(&self) -> Vec<ImmutPath> {
        self.search_paths.read().clone()
    }

    /// Finds the stub file for a dotted module name.
    pub fn find_stub(&self, name: &str) -> Option<ImmutPath> {
        let rel: PathBuf = name.split('.').collect();
        for root in self.search_paths.read().iter() {
            let module_stub = root.join(&rel).with_extension("pyi");
            if module_stub.is_file() {
                return Some(module_stub.as_path().into());
            }
            let package_stub = root.join(&rel).join("__init__.pyi");
            if package_stub.is_file() {
                return Some(package_stub.as_path().into());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_search_path_layout() {
        let dir = TempDir::new().unwrap();
        for sub in ["stdlib/3", "stdlib/2and3", "stdlib/3.7", "third_party/3"] {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
        }

        let paths = typeshed_search_paths(dir.path(), PythonLanguageVersion::new(3, 8));
        let rels: Vec<_> = paths
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(rels, vec!["stdlib/3", "stdlib/2and3", "stdlib/3.7", "third_party/3"]);
    }

    #[test]
    fn test_find_stub() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("stdlib/3");
        fs::create_dir_all(root.join("os")).unwrap();
        fs::write(root.join("sys.pyi"), "").unwrap();
        fs::write(root.join("os/__init__.pyi"), "").unwrap();

        let locator = StubLocator::new(vec![root.as_path().into()]);
        assert!(
            locator
                .find_stub("sys")
                .unwrap()
                .ends_with("sys.pyi")
        );
        assert!(
            locator
                .find_stub("os")
                .unwrap()
                .ends_with("os/__init__.pyi")
        );
        assert!(locator.find_stub("missing").is_none());
    }
}
