//! End-to-end scenarios over the assembled analysis core.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pythia_analysis::diag::codes;
use pythia_analysis::scope::ModuleAnalysis;
use pythia_analysis::ty::Ty;
use pythia_query::AnalysisCore;
use pythia_vfs::{
    ChangeRange, Document, DocumentChange, DocumentChangeSet, DocumentEvent, uri_from_path,
};
use tempfile::TempDir;

fn write_files(dir: &TempDir, files: &[(&str, &str)]) {
    for (rel, content) in files {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

fn core_with_root(root: &Path) -> AnalysisCore {
    let _ = env_logger::builder().is_test(true).try_init();
    let core = AnalysisCore::new();
    core.paths().set_root(Some(root.into()));
    core
}

/// Polls until the document publishes an analysis satisfying `pred`.
async fn wait_analysis(
    doc: &Arc<Document>,
    pred: impl Fn(&ModuleAnalysis) -> bool,
) -> Arc<ModuleAnalysis> {
    for _ in 0..400 {
        if let Some(analysis) = doc.analysis() {
            if pred(&analysis) {
                return analysis;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("analysis did not converge: {:?}", doc.analysis());
}

fn type_name_of(analysis: &ModuleAnalysis, name: &str) -> String {
    analysis
        .get(name)
        .map(|variable| variable.value().ty().name().to_string())
        .unwrap_or_default()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_open_and_edit() {
    let dir = TempDir::new().unwrap();
    let core = core_with_root(dir.path());
    let uri = uri_from_path(&dir.path().join("a.py")).unwrap();

    let new_asts = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = new_asts.clone();
    core.table().host().events.subscribe(move |event| {
        if let DocumentEvent::NewAst { version, .. } = event {
            sink.lock().push(*version);
        }
    });

    let doc = core
        .table()
        .open_document(uri, Some("x = 1\n".into()), None)
        .unwrap();

    let analysis = wait_analysis(&doc, |analysis| analysis.get("x").is_some()).await;
    assert_eq!(type_name_of(&analysis, "x"), "int");

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

    let analysis = wait_analysis(&doc, |analysis| analysis.version > 1).await;
    assert_eq!(type_name_of(&analysis, "x"), "int");

    // the v1 re-parse published exactly one NewAst
    let published = new_asts.lock().clone();
    assert_eq!(published.iter().filter(|v| **v == 1).count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_unresolved_import_diagnostic() {
    let dir = TempDir::new().unwrap();
    write_files(&dir, &[("a.py", "import no_such_module\n")]);
    let core = core_with_root(dir.path());

    let doc = core
        .resolver()
        .get_or_create_module("a")
        .await
        .expect("a.py resolves");
    let analysis = wait_analysis(&doc, |analysis| !analysis.diagnostics.is_empty()).await;

    let diag = &analysis.diagnostics[0];
    assert_eq!(diag.code, codes::UNRESOLVED_IMPORT);
    assert_eq!(
        diag.severity,
        pythia_analysis::diag::DiagnosticSeverity::Warning
    );
    // the span covers the module identifier
    assert_eq!(diag.span.start.line, 1);
    assert_eq!(diag.span.start.col, 8);
    assert_eq!(diag.span.end.col, 22);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_stub_attachment_priority() {
    let dir = TempDir::new().unwrap();
    write_files(
        &dir,
        &[
            ("pkg/__init__.py", ""),
            ("pkg/mod.py", "x = 1\n\ndef f(a):\n    return 1\n"),
            ("pkg/mod.pyi", "x: str\n\ndef f(a: int) -> str: ...\n"),
        ],
    );
    let core = core_with_root(dir.path());

    let doc = core
        .resolver()
        .get_or_create_module("pkg.mod")
        .await
        .expect("pkg.mod resolves");
    assert!(doc.stub().is_some());

    let analysis = wait_analysis(&doc, |analysis| analysis.primary_module.is_some()).await;

    // stub wins for member types
    assert_eq!(type_name_of(&analysis, "x"), "str");
    let f = analysis.get("f").unwrap().value();
    let Ty::Function(f) = f.ty() else {
        panic!("f must be a function");
    };
    assert!(f.flags().is_stub);
    let ret = f.overloads()[0].return_value().unwrap();
    assert_eq!(ret.ty().name(), "str");

    // while the implementation module remains reachable
    assert!(analysis.primary_module.as_deref().unwrap().ends_with("pkg/mod.py"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_close_refcount() {
    let dir = TempDir::new().unwrap();
    write_files(&dir, &[("f.py", "x = 1\n")]);
    let core = core_with_root(dir.path());

    let path = dir.path().join("f.py");
    let uri = uri_from_path(&path).unwrap();

    let removed = Arc::new(parking_lot::Mutex::new(false));
    let sink = removed.clone();
    core.table().host().events.subscribe(move |event| {
        if matches!(event, DocumentEvent::Removed { .. }) {
            *sink.lock() = true;
        }
    });

    // the editor opens the file, then an importer adds it
    core.table()
        .open_document(uri.clone(), Some("x = 1\n".into()), Some(path.as_path().into()))
        .unwrap();
    let _importer_view = core.resolver().get_or_create_module("f").await.unwrap();
    assert_eq!(core.table().lock_count(&uri), 2);
    assert!(core.paths().registered_name(&path).is_some());

    // the editor close leaves the importer's lock in place
    core.table().close_document(&uri);
    assert_eq!(core.table().lock_count(&uri), 1);
    assert!(!*removed.lock());

    // the importer's close removes the document and forgets the path
    core.table().close_document(&uri);
    assert!(core.table().get_document(&uri).is_none());
    assert!(*removed.lock());
    assert!(core.paths().registered_name(&path).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_import_binds_module_members() {
    let dir = TempDir::new().unwrap();
    write_files(
        &dir,
        &[
            ("lib.py", "class Thing:\n    pass\n\nVALUE = 1\n"),
            ("app.py", "from lib import Thing, VALUE\n\nthing = Thing()\n"),
        ],
    );
    let core = core_with_root(dir.path());

    let app = core.resolver().get_or_create_module("app").await.unwrap();
    let analysis = wait_analysis(&app, |analysis| {
        // converges once lib's analysis flowed into app's bindings
        type_name_of(analysis, "VALUE") == "int"
    })
    .await;

    assert_eq!(type_name_of(&analysis, "Thing"), "Thing");
    assert_eq!(type_name_of(&analysis, "thing"), "Thing");
    assert!(analysis.dependencies.contains("lib"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_isinstance_narrowing() {
    let dir = TempDir::new().unwrap();
    write_files(
        &dir,
        &[(
            "n.py",
            "def source():\n    return 1\n\nx = source()\nif isinstance(x, str):\n    y = x\nz = x\n",
        )],
    );
    let core = core_with_root(dir.path());

    let doc = core.resolver().get_or_create_module("n").await.unwrap();
    let analysis = wait_analysis(&doc, |analysis| analysis.get("z").is_some()).await;

    // inside the suite x is narrowed to str, outside it stays int
    assert_eq!(type_name_of(&analysis, "y"), "str");
    assert_eq!(type_name_of(&analysis, "z"), "int");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_dependent_requeued_on_change() {
    let dir = TempDir::new().unwrap();
    write_files(
        &dir,
        &[
            ("dep.py", "VALUE = 1\n"),
            ("use.py", "from dep import VALUE\n\ncopy = VALUE\n"),
        ],
    );
    let core = core_with_root(dir.path());

    let user = core.resolver().get_or_create_module("use").await.unwrap();
    wait_analysis(&user, |analysis| type_name_of(analysis, "copy") == "int").await;

    // editing the dependency re-queues the dependent
    let dep = core.table().get_document_by_name("dep").unwrap();
    dep.update(&DocumentChangeSet::whole(0, 1, "VALUE = 'text'\n"))
        .unwrap();

    wait_analysis(&user, |analysis| type_name_of(analysis, "copy") == "str").await;
}
