//! The one-shot interpreter probe: language version, search paths, builtin
//! module names, and the standard library location.

use core::fmt;
use std::path::Path;
use std::str::FromStr;

use ecow::EcoString;
use pythia_std::error::prelude::*;
use pythia_std::{Error, ImmutPath};
use serde::Deserialize;

/// A Python language version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PythonLanguageVersion {
    /// The major version.
    pub major: u8,
    /// The minor version.
    pub minor: u8,
}

impl PythonLanguageVersion {
    /// Creates a version.
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Whether packages need an `__init__.py` to be recognised.
    ///
    /// Implicit namespace packages exist since 3.3.
    pub fn require_init_py(&self) -> bool {
        *self < Self::new(3, 3)
    }
}

impl Default for PythonLanguageVersion {
    fn default() -> Self {
        Self::new(3, 11)
    }
}

impl fmt::Display for PythonLanguageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for PythonLanguageVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (major, minor) = s.split_once('.').context("version must be `major.minor`")?;
        Ok(Self {
            major: major.parse().context_ut("invalid major version")?,
            minor: minor.parse().context_ut("invalid minor version")?,
        })
    }
}

/// What the interpreter probe reports.
#[derive(Debug, Clone, Default)]
pub struct InterpreterInfo {
    /// The interpreter's language version.
    pub version: Option<PythonLanguageVersion>,
    /// The entries of `sys.path`, in order, empty entries removed.
    pub search_paths: Vec<ImmutPath>,
    /// The names of modules compiled into the interpreter.
    pub builtin_names: Vec<EcoString>,
    /// The standard library directory, used as the scraper's working
    /// directory.
    pub lib_path: Option<ImmutPath>,
}

#[derive(Deserialize)]
struct ProbeOutput {
    version: (u8, u8),
    paths: Vec<String>,
    builtins: Vec<String>,
    stdlib: Option<String>,
}

const PROBE_SCRIPT: &str = "import sys, json, sysconfig; print(json.dumps({\
 'version': [sys.version_info[0], sys.version_info[1]],\
 'paths': [p for p in sys.path if p],\
 'builtins': list(sys.builtin_module_names),\
 'stdlib': sysconfig.get_paths().get('stdlib')}))";

/// Queries the configured interpreter once.
///
/// A failed launch or unparsable output degrades to an empty
/// [`InterpreterInfo`]; resolution then runs on workspace and user paths
/// alone.
pub async fn query_interpreter(interpreter: &Path) -> InterpreterInfo {
    let output = tokio::process::Command::new(interpreter)
        .arg("-E")
        .arg("-c")
        .arg(PROBE_SCRIPT)
        .output()
        .await;

    let output = match output {
        Ok(output) if output.status.success() => output.stdout,
        Ok(output) => {
            log::warn!(
                "interpreter probe failed with status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
            return InterpreterInfo::default();
        }
        Err(err) => {
            log::warn!("interpreter {} could not be launched: {err}", interpreter.display());
            return InterpreterInfo::default();
        }
    };

    match serde_json::from_slice::<ProbeOutput>(&output) {
        Ok(probe) => InterpreterInfo {
            version: Some(PythonLanguageVersion::new(probe.version.0, probe.version.1)),
            search_paths: probe
                .paths
                .iter()
                .map(|p| Path::new(p).into())
                .collect(),
            builtin_names: probe.builtins.iter().map(|n| n.as_str().into()).collect(),
            lib_path: probe.stdlib.as_deref().map(|p| Path::new(p).into()),
        },
        Err(err) => {
            log::warn!("unparsable interpreter probe output: {err}");
            InterpreterInfo::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parsing_and_order() {
        let version: PythonLanguageVersion = "3.11".parse().unwrap();
        assert_eq!(version, PythonLanguageVersion::new(3, 11));
        assert!("x.y".parse::<PythonLanguageVersion>().is_err());
        assert!(PythonLanguageVersion::new(2, 7) < PythonLanguageVersion::new(3, 3));
        // 3.10 sorts above 3.3 despite the shorter minor digit count
        assert!(PythonLanguageVersion::new(3, 10) > PythonLanguageVersion::new(3, 3));
    }

    #[test]
    fn test_require_init_py() {
        assert!(PythonLanguageVersion::new(2, 7).require_init_py());
        assert!(PythonLanguageVersion::new(3, 2).require_init_py());
        assert!(!PythonLanguageVersion::new(3, 3).require_init_py());
        assert!(!PythonLanguageVersion::new(3, 11).require_init_py());
    }

    #[tokio::test]
    async fn test_missing_interpreter_degrades_to_empty() {
        let info = query_interpreter(Path::new("/no/such/python")).await;
        assert!(info.version.is_none());
        assert!(info.search_paths.is_empty());
    }
}
