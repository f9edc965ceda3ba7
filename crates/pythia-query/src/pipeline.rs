//! One analysis pass: import resolution, the module walk, and stub merging.

use std::sync::Arc;

use ecow::EcoString;
use pythia_analysis::scope::ModuleAnalysis;
use pythia_analysis::ty::Ty;
use pythia_std::hash::FxHashSet;
use pythia_std::path::unix_slash;
use pythia_vfs::{Canceled, Document, ParsedModule};
use pythia_world::MainModuleResolver;
use rustpython_ast as ast;
use tokio_util::sync::CancellationToken;

use crate::walk::{ImportMap, ModuleWalker};

/// Canonicalizes a possibly relative import target against the importing
/// module's dotted name.
pub(crate) fn resolve_relative(
    current: &str,
    level: u32,
    target: Option<&str>,
) -> Option<EcoString> {
    if level == 0 {
        return target.map(EcoString::from);
    }
    let parts: Vec<&str> = current.split('.').collect();
    if (level as usize) > parts.len() {
        return None;
    }
    let mut base: Vec<&str> = parts[..parts.len() - level as usize].to_vec();
    if let Some(target) = target {
        base.extend(target.split('.'));
    }
    if base.is_empty() {
        return None;
    }
    Some(base.join(".").into())
}

/// Runs analysis passes against frozen AST snapshots.
pub struct AnalysisPipeline {
    resolver: Arc<MainModuleResolver>,
}

impl AnalysisPipeline {
    /// Creates a pipeline over the given module resolver.
    pub fn new(resolver: Arc<MainModuleResolver>) -> Self {
        Self { resolver }
    }

    /// Analyzes one document at one analysis version.
    ///
    /// Cancellation leaves no observable state change; the caller decides
    /// whether the produced analysis is still current before publishing.
    pub async fn analyze(
        &self,
        doc: &Arc<Document>,
        version: u32,
        token: &CancellationToken,
    ) -> Result<Arc<ModuleAnalysis>, Canceled> {
        let parsed = wait_parsed(doc, token).await?;
        let module_name = module_name_of(doc);
        let file_path = file_path_of(doc);

        let imports = self
            .resolve_imports(&module_name, &parsed, token)
            .await?;

        let module = parsed.ast.as_ref().expect("wait_parsed yields an AST");
        let walker = ModuleWalker::new(
            module_name.clone(),
            file_path.clone(),
            &parsed.text,
            &parsed.lines,
            &imports,
            doc.module_type() == pythia_vfs::ModuleType::Stub,
        );
        let mut analysis = walker.walk_module(&module.body, version);

        if let Some(stub) = doc.stub() {
            if !Arc::ptr_eq(stub, doc) {
                self.merge_stub(&mut analysis, stub, &module_name, token)
                    .await?;
                analysis.primary_module = Some(file_path);
            }
        }

        if token.is_cancelled() {
            return Err(Canceled);
        }
        Ok(Arc::new(analysis))
    }

    /// Resolves every import target the module mentions, loading dependency
    /// modules through the resolver.
    async fn resolve_imports(
        &self,
        module_name: &EcoString,
        parsed: &ParsedModule,
        token: &CancellationToken,
    ) -> Result<ImportMap, Canceled> {
        let module = parsed.ast.as_ref().expect("checked by the caller");
        let mut targets = FxHashSet::default();
        collect_import_targets(&module.body, module_name, &mut targets);

        let mut imports = ImportMap::default();
        for target in targets {
            if token.is_cancelled() {
                return Err(Canceled);
            }
            let resolved = self.resolver.get_or_create_module(&target).await;
            if let Some(dep_doc) = &resolved {
                // registered before the walk reads the dependency's analysis,
                // so a publication racing this pass still re-queues us
                dep_doc.add_dependent(module_name.clone());
            }
            imports.insert(target, resolved);
        }
        Ok(imports)
    }

    /// Overrides matched members with the stub's and adds stub-only members.
    async fn merge_stub(
        &self,
        analysis: &mut ModuleAnalysis,
        stub: &Arc<Document>,
        module_name: &EcoString,
        token: &CancellationToken,
    ) -> Result<(), Canceled> {
        let parsed = wait_parsed(stub, token).await?;
        let stub_imports = self
            .resolve_imports(module_name, &parsed, token)
            .await?;
        let module = parsed.ast.as_ref().expect("wait_parsed yields an AST");

        let walker = ModuleWalker::new(
            module_name.clone(),
            file_path_of(stub),
            &parsed.text,
            &parsed.lines,
            &stub_imports,
            true,
        );
        let stub_analysis = walker.walk_module(&module.body, analysis.version);

        let mut additions = Vec::new();
        for (name, stub_var) in stub_analysis.global_scope.iter() {
            match analysis.global_scope.get(name) {
                Some(own_var) => {
                    let own_value = own_var.value();
                    let stub_value = stub_var.value();
                    match (own_value.ty(), stub_value.ty()) {
                        (Ty::Function(own_func), Ty::Function(stub_func)) => {
                            own_func.set_overloads(stub_func.overloads());
                            own_func.update_flags(|flags| flags.is_stub = true);
                        }
                        (Ty::Class(own_class), Ty::Class(stub_class)) => {
                            for (member_name, member) in stub_class.own_members() {
                                own_class.add_member(member_name, member);
                            }
                        }
                        _ => own_var.assign(stub_value.clone()),
                    }
                }
                None => additions.push(stub_var.clone()),
            }
        }
        for variable in additions {
            analysis.global_scope.bind(variable);
        }
        Ok(())
    }
}

async fn wait_parsed(
    doc: &Arc<Document>,
    token: &CancellationToken,
) -> Result<Arc<ParsedModule>, Canceled> {
    loop {
        let _ = doc.get_ast(token).await?;
        if let Some(parsed) = doc.parsed() {
            if parsed.ast.is_some() {
                return Ok(parsed);
            }
        }
    }
}

fn module_name_of(doc: &Arc<Document>) -> EcoString {
    if let Some(name) = doc.module_name() {
        return name;
    }
    doc.file_path()
        .and_then(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .map(EcoString::from)
        .unwrap_or_else(|| doc.uri().as_str().into())
}

fn file_path_of(doc: &Arc<Document>) -> EcoString {
    match doc.file_path() {
        Some(path) => unix_slash(path).into(),
        None => doc.uri().path().into(),
    }
}

/// Collects the canonical dotted names a suite imports, searching nested
/// blocks but not function or class bodies.
fn collect_import_targets(
    body: &[ast::Stmt],
    module_name: &str,
    targets: &mut FxHashSet<EcoString>,
) {
    for stmt in body {
        match stmt {
            ast::Stmt::Import(import) => {
                for alias in &import.names {
                    targets.insert(alias.name.as_str().into());
                    // `import a.b` also binds `a`
                    if alias.asname.is_none() {
                        if let Some(root) = alias.name.as_str().split('.').next() {
                            targets.insert(root.into());
                        }
                    }
                }
            }
            ast::Stmt::ImportFrom(import) => {
                let level = import.level.map_or(0, |l| l.to_u32());
                if let Some(target) = resolve_relative(
                    module_name,
                    level,
                    import.module.as_ref().map(|m| m.as_str()),
                ) {
                    targets.insert(target);
                }
            }
            ast::Stmt::If(if_stmt) => {
                collect_import_targets(&if_stmt.body, module_name, targets);
                collect_import_targets(&if_stmt.orelse, module_name, targets);
            }
            ast::Stmt::While(while_stmt) => {
                collect_import_targets(&while_stmt.body, module_name, targets);
                collect_import_targets(&while_stmt.orelse, module_name, targets);
            }
            ast::Stmt::For(for_stmt) => {
                collect_import_targets(&for_stmt.body, module_name, targets);
                collect_import_targets(&for_stmt.orelse, module_name, targets);
            }
            ast::Stmt::With(with_stmt) => {
                collect_import_targets(&with_stmt.body, module_name, targets);
            }
            ast::Stmt::Try(try_stmt) => {
                collect_import_targets(&try_stmt.body, module_name, targets);
                for handler in &try_stmt.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    collect_import_targets(&handler.body, module_name, targets);
                }
                collect_import_targets(&try_stmt.orelse, module_name, targets);
                collect_import_targets(&try_stmt.finalbody, module_name, targets);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative() {
        assert_eq!(
            resolve_relative("pkg.mod", 0, Some("os.path")).unwrap(),
            "os.path"
        );
        assert_eq!(
            resolve_relative("pkg.mod", 1, Some("sibling")).unwrap(),
            "pkg.sibling"
        );
        assert_eq!(resolve_relative("pkg.sub.mod", 2, None).unwrap(), "pkg");
        assert!(resolve_relative("mod", 2, Some("x")).is_none());
    }
}
