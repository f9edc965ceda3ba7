//! Scheduling of analysis passes: version gating, dependent re-queueing,
//! and reference scrubbing when modules leave the table.

use std::sync::Arc;

use ecow::EcoString;
use pythia_analysis::scope::ModuleAnalysis;
use pythia_std::path::unix_slash;
use pythia_vfs::{AnalysisHandler, Document, DocumentEvent, DocumentTable};
use pythia_world::MainModuleResolver;

use crate::pipeline::AnalysisPipeline;

struct DriverInner {
    table: Arc<DocumentTable>,
    pipeline: AnalysisPipeline,
}

/// Drives the analysis pipeline for every document in a table.
pub struct AnalysisDriver {
    inner: Arc<DriverInner>,
}

impl AnalysisDriver {
    /// Creates the driver and installs it as the table's analysis handler.
    ///
    /// The driver also watches for removed documents and scrubs their
    /// references out of every remaining analysis.
    pub fn install(table: Arc<DocumentTable>, resolver: Arc<MainModuleResolver>) -> Arc<Self> {
        let driver = Arc::new(Self {
            inner: Arc::new(DriverInner {
                table: table.clone(),
                pipeline: AnalysisPipeline::new(resolver),
            }),
        });
        table.set_analysis_handler(driver.clone());

        let weak_table = Arc::downgrade(&table);
        table.host().events.subscribe(move |event| {
            let DocumentEvent::Removed {
                file_path: Some(path),
                ..
            } = event
            else {
                return;
            };
            let Some(table) = weak_table.upgrade() else {
                return;
            };
            let path = unix_slash(path);
            for doc in table.documents() {
                if let Some(analysis) = doc.analysis() {
                    analysis.remove_references_from(&path);
                }
            }
        });

        driver
    }

    /// Analyzes a document now, from outside the parse flow.
    pub fn request_analysis(&self, doc: Arc<Document>) {
        spawn_analysis(self.inner.clone(), doc);
    }
}

impl AnalysisHandler for AnalysisDriver {
    fn schedule(&self, doc: Arc<Document>) {
        spawn_analysis(self.inner.clone(), doc);
    }
}

fn spawn_analysis(inner: Arc<DriverInner>, doc: Arc<Document>) {
    let version = doc.notify_analysis_pending();
    let token = doc.disposal_token().child_token();
    tokio::spawn(async move {
        let previous = doc.analysis();
        let analysis = match inner.pipeline.analyze(&doc, version, &token).await {
            Ok(analysis) => analysis,
            // canceled work leaves no observable state change
            Err(_) => return,
        };

        let surface_changed = previous
            .as_ref()
            .is_none_or(|previous| public_surface(previous) != public_surface(&analysis));

        if !doc.notify_analysis_complete(version, analysis) {
            return;
        }
        log::debug!(
            "analysis v{version} published for {}",
            doc.module_name().unwrap_or_default()
        );

        // a changed public surface re-queues everyone who imported us
        if surface_changed {
            for name in doc.dependents() {
                if let Some(dependent) = inner.table.get_document_by_name(&name) {
                    if !Arc::ptr_eq(&dependent, &doc) {
                        spawn_analysis(inner.clone(), dependent);
                    }
                }
            }
        }
    });
}

/// The comparable public surface of an analysis: every public name with the
/// name of its type.
fn public_surface(analysis: &ModuleAnalysis) -> Vec<(EcoString, EcoString)> {
    let mut surface: Vec<(EcoString, EcoString)> = analysis
        .public_names()
        .into_iter()
        .filter_map(|name| {
            let variable = analysis.get(&name)?;
            Some((name, variable.value().ty().name()))
        })
        .collect();
    surface.sort();
    surface
}
