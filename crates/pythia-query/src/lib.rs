//! The analysis pipeline: a single top-down walk over a freshly parsed
//! module that populates scopes, resolves imports, infers member types, and
//! publishes a versioned, immutable analysis.

pub mod driver;
pub use driver::*;

pub mod pipeline;
pub use pipeline::*;

mod walk;

use std::sync::Arc;

use pythia_vfs::DocumentTable;
use pythia_world::{MainModuleResolver, PathResolver, ResolverArgs};

/// The wired-together analysis core: table, resolvers, and driver.
pub struct AnalysisCore {
    table: Arc<DocumentTable>,
    paths: Arc<PathResolver>,
    resolver: Arc<MainModuleResolver>,
    driver: Arc<AnalysisDriver>,
}

impl Default for AnalysisCore {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisCore {
    /// Creates a core with an empty table and unconfigured roots.
    pub fn new() -> Self {
        let table = Arc::new(DocumentTable::new());
        let paths = Arc::new(PathResolver::new());
        let resolver = MainModuleResolver::new(table.clone(), paths.clone());
        let driver = AnalysisDriver::install(table.clone(), resolver.clone());
        Self {
            table,
            paths,
            resolver,
            driver,
        }
    }

    /// Applies resolver configuration (roots, interpreter, typeshed).
    pub async fn configure(&self, args: &ResolverArgs) {
        self.resolver.configure(args).await;
    }

    /// The running document table.
    pub fn table(&self) -> &Arc<DocumentTable> {
        &self.table
    }

    /// The path resolver.
    pub fn paths(&self) -> &Arc<PathResolver> {
        &self.paths
    }

    /// The module resolver.
    pub fn resolver(&self) -> &Arc<MainModuleResolver> {
        &self.resolver
    }

    /// The analysis driver.
    pub fn driver(&self) -> &Arc<AnalysisDriver> {
        &self.driver
    }
}
