//! Path utilities.

use std::borrow::Cow;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

pub use path_clean::PathClean;

/// Get the path cleaned as a unix-style string.
pub fn unix_slash(root: &Path) -> String {
    let mut res = String::with_capacity(root.as_os_str().len());
    let mut sep_before = false;
    for comp in root.components() {
        match comp {
            Component::Prefix(p) => {
                res.push_str(&p.as_os_str().to_string_lossy());
                sep_before = false;
            }
            Component::RootDir => {
                res.push('/');
                sep_before = false;
            }
            Component::CurDir => {
                sep_before = false;
            }
            Component::ParentDir => {
                if sep_before {
                    res.push('/');
                }
                res.push_str("..");
                sep_before = true;
            }
            Component::Normal(p) => {
                if sep_before {
                    res.push('/');
                }
                res.push_str(&p.to_string_lossy());
                sep_before = true;
            }
        }
    }

    if res.is_empty() {
        res.push('.');
    }

    res
}

/// Get the path cleaned as a platform-style string.
pub use path_clean::clean;

/// Construct a relative path from a provided base directory path to the
/// provided path.
pub fn diff(fr: &Path, to: &Path) -> Option<PathBuf> {
    // pathdiff does not clean `..`/`.` segments itself.
    fn clean_for_diff(p: &Path) -> Cow<'_, Path> {
        if p.components()
            .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
        {
            Cow::Owned(p.clean())
        } else {
            Cow::Borrowed(p)
        }
    }

    pathdiff::diff_paths(clean_for_diff(fr).as_ref(), clean_for_diff(to).as_ref())
}

/// Whether the path names a Python source file (`.py`).
pub fn is_python_source(path: &Path) -> bool {
    path.extension() == Some(OsStr::new("py"))
}

/// Whether the path names a Python stub file (`.pyi`).
pub fn is_python_stub(path: &Path) -> bool {
    path.extension() == Some(OsStr::new("pyi"))
}

/// Whether the path names a compiled extension module (`.pyd`/`.so`).
pub fn is_python_compiled(path: &Path) -> bool {
    matches!(
        path.extension().and_then(OsStr::to_str),
        Some("pyd") | Some("so")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_slash() {
        assert_eq!(unix_slash(Path::new("/a/b/c")), "/a/b/c");
        assert_eq!(unix_slash(Path::new("/a/b/c/")), "/a/b/c");
        assert_eq!(unix_slash(Path::new("a/./b")), "a/b");
        assert_eq!(unix_slash(Path::new("a/../b")), "a/../b");
        assert_eq!(unix_slash(Path::new("")), ".");
    }

    #[test]
    fn test_python_extensions() {
        assert!(is_python_source(Path::new("/w/mod.py")));
        assert!(!is_python_source(Path::new("/w/mod.pyi")));
        assert!(is_python_stub(Path::new("/w/mod.pyi")));
        assert!(is_python_compiled(Path::new("/w/mod.so")));
        assert!(is_python_compiled(Path::new("C:/w/mod.pyd")));
        assert!(!is_python_compiled(Path::new("/w/mod.py")));
    }
}
