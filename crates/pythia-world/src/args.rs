//! Shared arguments to create a resolver environment.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use serde::{Deserialize, Serialize};

const ENV_PATH_SEP: char = if cfg!(windows) { ';' } else { ':' };

/// The interpreter arguments, specifying which Python environment answers
/// search-path and version queries.
#[derive(Debug, Clone, Default, Parser, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterpreterArgs {
    /// Path to the Python interpreter executable.
    #[clap(long = "python", env = "PYTHIA_PYTHON", value_name = "EXE")]
    pub interpreter: Option<PathBuf>,

    /// Override the language version (e.g. `3.11`) instead of asking the
    /// interpreter.
    #[clap(long = "python-version", value_name = "X.Y")]
    pub language_version: Option<String>,
}

/// Common arguments to create the resolver environment.
#[derive(Debug, Clone, Default, Parser)]
pub struct ResolverArgs {
    /// Configure the workspace root.
    #[clap(long = "root", value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Add additional module search paths, on top of the interpreter's.
    ///
    /// If multiple paths are specified, they are separated by the system's
    /// path separator (`:` on Unix-like systems and `;` on Windows).
    #[clap(
        long = "search-path",
        value_name = "DIR",
        action = ArgAction::Append,
        env = "PYTHIA_SEARCH_PATHS",
        value_delimiter = ENV_PATH_SEP
    )]
    pub search_paths: Vec<PathBuf>,

    /// Specify a custom typeshed root.
    #[clap(long = "typeshed-path", env = "PYTHIA_TYPESHED", value_name = "DIR")]
    pub typeshed: Option<PathBuf>,

    /// Specify the bundled stubs folder shipped with the installation.
    #[clap(long = "stubs-path", value_name = "DIR")]
    pub stubs: Option<PathBuf>,

    /// Specify the helper script used to scrape compiled modules.
    #[clap(long = "scrape-script", value_name = "FILE")]
    pub scrape_script: Option<PathBuf>,

    /// Specify the interpreter related arguments.
    #[clap(flatten)]
    pub interpreter: InterpreterArgs,
}
