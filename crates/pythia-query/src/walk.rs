//! The statement walker that turns one module AST into scope bindings,
//! typed members, and diagnostics.

use std::sync::Arc;

use ecow::{EcoString, EcoVec};
use pythia_analysis::diag::{Diagnostic, DiagnosticSeverity, codes};
use pythia_analysis::scope::{ModuleAnalysis, Scope, Variable, VariableSource};
use pythia_analysis::ty::{
    CallArgs, ClassTy, CollectionKind, CollectionTy, FunctionOverload, FunctionTy, Instance,
    Member, NamedTupleTy, Parameter, ParameterKind, PropertyTy, Ty, TypeVarTy, Variance,
    builtin_class, builtin_instance, builtin_literal,
};
use pythia_std::hash::{FxHashMap, FxHashSet};
use pythia_std::loc::{IndexSpan, LocationInfo, NewLineLocations};
use pythia_vfs::Document;
use rustpython_ast::{self as ast, Ranged};
use rustpython_parser::text_size::TextRange;

/// The modules a walk can see, keyed by canonical dotted name. `None` records
/// an import that did not resolve (or is mid-creation in a cycle).
pub(crate) type ImportMap = FxHashMap<EcoString, Option<Arc<Document>>>;

pub(crate) struct ModuleWalker<'a> {
    module_name: EcoString,
    file_path: EcoString,
    text: &'a str,
    lines: &'a NewLineLocations,
    imports: &'a ImportMap,
    /// Every name assigned anywhere at module level, for use-before-def.
    assigned_names: FxHashSet<EcoString>,
    /// scopes[0] is the module's global scope; further frames narrow it.
    scopes: Vec<Scope>,
    all: Option<Vec<EcoString>>,
    module_doc: Option<EcoString>,
    dependencies: FxHashSet<EcoString>,
    diagnostics: EcoVec<Diagnostic>,
    is_stub: bool,
}

impl<'a> ModuleWalker<'a> {
    pub(crate) fn new(
        module_name: EcoString,
        file_path: EcoString,
        text: &'a str,
        lines: &'a NewLineLocations,
        imports: &'a ImportMap,
        is_stub: bool,
    ) -> Self {
        Self {
            module_name,
            file_path,
            text,
            lines,
            imports,
            assigned_names: FxHashSet::default(),
            scopes: vec![Scope::new()],
            all: None,
            module_doc: None,
            dependencies: FxHashSet::default(),
            diagnostics: EcoVec::new(),
            is_stub,
        }
    }

    /// Runs the walk and assembles the analysis.
    pub(crate) fn walk_module(mut self, body: &[ast::Stmt], version: u32) -> ModuleAnalysis {
        self.module_doc = docstring_of(body);
        self.collect_assigned_names(body);
        self.collect_definitions(body);
        for stmt in body {
            self.walk_stmt(stmt);
        }

        let mut analysis = ModuleAnalysis::empty(self.module_name, self.file_path);
        analysis.version = version;
        analysis.global_scope = self.scopes.swap_remove(0);
        analysis.all = self.all;
        analysis.doc = self.module_doc;
        analysis.dependencies = self.dependencies;
        analysis.diagnostics = self.diagnostics;
        analysis
    }

    fn loc(&self, range: TextRange) -> LocationInfo {
        let span = IndexSpan::from_bounds(range.start().to_usize(), range.end().to_usize());
        LocationInfo::from_span(self.file_path.clone(), span, self.lines)
    }

    fn diag(&mut self, message: impl Into<EcoString>, range: TextRange, code: &'static str) {
        let severity = match code {
            codes::NOT_CALLABLE => DiagnosticSeverity::Error,
            _ => DiagnosticSeverity::Warning,
        };
        let span = IndexSpan::from_bounds(range.start().to_usize(), range.end().to_usize());
        self.diagnostics.push(Diagnostic::new(
            message,
            self.lines.span_of(span),
            span,
            code,
            severity,
        ));
    }

    fn bind(&mut self, name: &str, member: Member, source: VariableSource, range: TextRange) {
        let location = self.loc(range);
        let variable = Arc::new(Variable::new(name, member, source, location));
        self.scopes
            .last_mut()
            .expect("a walker always has a scope")
            .bind(variable);
    }

    fn lookup(&self, name: &str) -> Option<Member> {
        for scope in self.scopes.iter().rev() {
            if let Some(variable) = scope.get(name) {
                return Some(variable.value());
            }
        }
        None
    }

    /// Pre-scan: every name that is assigned somewhere at module level.
    fn collect_assigned_names(&mut self, body: &[ast::Stmt]) {
        for stmt in body {
            match stmt {
                ast::Stmt::Assign(assign) => {
                    for target in &assign.targets {
                        if let ast::Expr::Name(name) = target {
                            self.assigned_names.insert(name.id.as_str().into());
                        }
                    }
                }
                ast::Stmt::AnnAssign(assign) => {
                    if let ast::Expr::Name(name) = assign.target.as_ref() {
                        self.assigned_names.insert(name.id.as_str().into());
                    }
                }
                _ => {}
            }
        }
    }

    /// The overview pass: class and function definitions enter the global
    /// scope up front so forward references resolve.
    fn collect_definitions(&mut self, body: &[ast::Stmt]) {
        for stmt in body {
            match stmt {
                ast::Stmt::FunctionDef(def) => {
                    self.declare_function(def.name.as_str(), def.range());
                }
                ast::Stmt::AsyncFunctionDef(def) => {
                    self.declare_function(def.name.as_str(), def.range());
                }
                ast::Stmt::ClassDef(class) => {
                    let ty = Arc::new(ClassTy::new(
                        class.name.as_str(),
                        self.module_name.clone(),
                        self.loc(class.range()),
                    ));
                    self.bind(
                        class.name.as_str(),
                        Member::Ty(Ty::Class(ty)),
                        VariableSource::Declaration,
                        class.range(),
                    );
                }
                _ => {}
            }
        }
    }

    fn declare_function(&mut self, name: &str, range: TextRange) {
        if self.lookup(name).is_some() {
            // repeated defs (overload groups) share one function object
            return;
        }
        let func = Arc::new(FunctionTy::new(
            name,
            self.module_name.clone(),
            self.loc(range),
        ));
        if self.is_stub {
            func.update_flags(|flags| flags.is_stub = true);
        }
        self.bind(
            name,
            Member::Ty(Ty::Function(func)),
            VariableSource::Declaration,
            range,
        );
    }

    fn walk_stmt(&mut self, stmt: &ast::Stmt) {
        match stmt {
            ast::Stmt::FunctionDef(def) => self.process_function(
                def.name.as_str(),
                &def.args,
                &def.body,
                &def.decorator_list,
                def.returns.as_deref(),
                def.range(),
                None,
            ),
            ast::Stmt::AsyncFunctionDef(def) => self.process_function(
                def.name.as_str(),
                &def.args,
                &def.body,
                &def.decorator_list,
                def.returns.as_deref(),
                def.range(),
                None,
            ),
            ast::Stmt::ClassDef(class) => self.process_class(class),
            ast::Stmt::Import(import) => self.process_import(import),
            ast::Stmt::ImportFrom(import) => self.process_import_from(import),
            ast::Stmt::Assign(assign) => self.process_assign(assign),
            ast::Stmt::AnnAssign(assign) => self.process_ann_assign(assign),
            ast::Stmt::AugAssign(assign) => {
                // the bound type is unchanged; evaluate for diagnostics only
                let _ = self.eval_expr(&assign.value);
            }
            ast::Stmt::If(if_stmt) => {
                match self.narrowing_of(&if_stmt.test) {
                    Some((name, ty, range)) => {
                        // shadow the tested name for the contained suite only
                        let saved = self.current_binding(&name);
                        self.bind(
                            &name,
                            Member::Instance(Instance::detached(ty)),
                            VariableSource::Declaration,
                            range,
                        );
                        for stmt in &if_stmt.body {
                            self.walk_stmt(stmt);
                        }
                        self.restore_binding(&name, saved);
                    }
                    None => {
                        let _ = self.eval_expr(&if_stmt.test);
                        for stmt in &if_stmt.body {
                            self.walk_stmt(stmt);
                        }
                    }
                }
                for stmt in &if_stmt.orelse {
                    self.walk_stmt(stmt);
                }
            }
            ast::Stmt::While(while_stmt) => {
                let _ = self.eval_expr(&while_stmt.test);
                for stmt in &while_stmt.body {
                    self.walk_stmt(stmt);
                }
                for stmt in &while_stmt.orelse {
                    self.walk_stmt(stmt);
                }
            }
            ast::Stmt::For(for_stmt) => {
                self.process_for(&for_stmt.target, &for_stmt.iter);
                for stmt in &for_stmt.body {
                    self.walk_stmt(stmt);
                }
                for stmt in &for_stmt.orelse {
                    self.walk_stmt(stmt);
                }
            }
            ast::Stmt::AsyncFor(for_stmt) => {
                self.process_for(&for_stmt.target, &for_stmt.iter);
                for stmt in &for_stmt.body {
                    self.walk_stmt(stmt);
                }
                for stmt in &for_stmt.orelse {
                    self.walk_stmt(stmt);
                }
            }
            ast::Stmt::With(with_stmt) => {
                self.process_with(&with_stmt.items);
                for stmt in &with_stmt.body {
                    self.walk_stmt(stmt);
                }
            }
            ast::Stmt::AsyncWith(with_stmt) => {
                self.process_with(&with_stmt.items);
                for stmt in &with_stmt.body {
                    self.walk_stmt(stmt);
                }
            }
            ast::Stmt::Try(try_stmt) => {
                for stmt in &try_stmt.body {
                    self.walk_stmt(stmt);
                }
                for handler in &try_stmt.handlers {
                    self.process_handler(handler);
                }
                for stmt in &try_stmt.orelse {
                    self.walk_stmt(stmt);
                }
                for stmt in &try_stmt.finalbody {
                    self.walk_stmt(stmt);
                }
            }
            ast::Stmt::Assert(assert_stmt) => {
                // assert isinstance(x, T) narrows x for the rest of the suite
                if let Some((name, ty, range)) = self.narrowing_of(&assert_stmt.test) {
                    self.bind(
                        &name,
                        Member::Instance(Instance::detached(ty)),
                        VariableSource::Declaration,
                        range,
                    );
                } else {
                    let _ = self.eval_expr(&assert_stmt.test);
                }
            }
            ast::Stmt::Expr(expr_stmt) => {
                let _ = self.eval_expr(&expr_stmt.value);
            }
            ast::Stmt::Return(_) => {
                // only meaningful inside a function body
            }
            _ => {}
        }
    }

    fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    fn current_binding(&self, name: &str) -> Option<Arc<Variable>> {
        self.scopes
            .last()
            .and_then(|scope| scope.get(name))
            .cloned()
    }

    fn restore_binding(&mut self, name: &str, saved: Option<Arc<Variable>>) {
        let scope = self.scopes.last_mut().expect("a walker always has a scope");
        match saved {
            Some(variable) => scope.bind(variable),
            None => {
                scope.remove(name);
            }
        }
    }

    /// Recognises `isinstance(name, Type)`.
    fn narrowing_of(&mut self, test: &ast::Expr) -> Option<(EcoString, Ty, TextRange)> {
        let ast::Expr::Call(call) = test else {
            return None;
        };
        let ast::Expr::Name(func) = call.func.as_ref() else {
            return None;
        };
        if func.id.as_str() != "isinstance" || call.args.len() != 2 {
            return None;
        }
        let ast::Expr::Name(target) = &call.args[0] else {
            return None;
        };
        let asserted = self.eval_expr(&call.args[1]);
        match asserted.ty() {
            Ty::Unknown => None,
            ty => Some((target.id.as_str().into(), ty.clone(), target.range())),
        }
    }

    fn process_for(&mut self, target: &ast::Expr, iter: &ast::Expr) {
        let iterated = self.eval_expr(iter);
        let element = match iterated.ty().get_member("__iter__") {
            Some(member) => match member.ty() {
                Ty::Collection(iter_ty) => iter_ty
                    .content_types
                    .read()
                    .first()
                    .cloned()
                    .unwrap_or_default(),
                _ => Ty::Unknown,
            },
            None => Ty::Unknown,
        };
        if let ast::Expr::Name(name) = target {
            self.bind(
                name.id.as_str(),
                Member::Instance(Instance::detached(element)),
                VariableSource::Declaration,
                name.range(),
            );
        }
    }

    fn process_with(&mut self, items: &[ast::WithItem]) {
        for item in items {
            let context = self.eval_expr(&item.context_expr);
            if let Some(ast::Expr::Name(name)) = item.optional_vars.as_deref() {
                // `__enter__` decides the bound value where it is known
                let entered = match context.ty().call(None, "__enter__", &CallArgs::none()) {
                    Ok(member) if !member.is_unknown() => member,
                    _ => context.clone(),
                };
                self.bind(
                    name.id.as_str(),
                    entered,
                    VariableSource::Declaration,
                    name.range(),
                );
            }
        }
    }

    fn process_handler(&mut self, handler: &ast::ExceptHandler) {
        let ast::ExceptHandler::ExceptHandler(handler) = handler;
        if let (Some(type_), Some(name)) = (&handler.type_, &handler.name) {
            let ty = self.eval_expr(type_).ty().clone();
            self.bind(
                name.as_str(),
                Member::Instance(Instance::detached(ty)),
                VariableSource::Declaration,
                handler.range(),
            );
        }
        for stmt in &handler.body {
            self.walk_stmt(stmt);
        }
    }

    fn process_import(&mut self, import: &ast::StmtImport) {
        for alias in &import.names {
            let full_name: EcoString = alias.name.as_str().into();
            if !matches!(self.imports.get(&full_name), Some(Some(_))) {
                self.unresolved_import(&full_name, alias.range());
                continue;
            }
            self.dependencies.insert(full_name.clone());
            let binding = match &alias.asname {
                Some(asname) => asname.as_str(),
                // `import a.b` binds `a`
                None => full_name.split('.').next().unwrap_or(&full_name),
            };
            let bound_module: EcoString = match &alias.asname {
                Some(_) => full_name.clone(),
                None => binding.into(),
            };
            self.bind(
                binding,
                Member::Ty(Ty::Module(bound_module)),
                VariableSource::Import,
                alias.range(),
            );
        }
    }

    fn unresolved_import(&mut self, name: &str, range: TextRange) {
        self.diag(
            ecow::eco_format!("unable to resolve import '{name}'"),
            range,
            codes::UNRESOLVED_IMPORT,
        );
    }

    fn process_import_from(&mut self, import: &ast::StmtImportFrom) {
        let level = import.level.map_or(0, |l| l.to_u32());
        let target = super::pipeline::resolve_relative(
            &self.module_name,
            level,
            import.module.as_ref().map(|m| m.as_str()),
        );
        let Some(target) = target else {
            self.unresolved_import(
                import.module.as_ref().map(|m| m.as_str()).unwrap_or("."),
                import.range(),
            );
            return;
        };

        let Some(Some(doc)) = self.imports.get(&target) else {
            self.unresolved_import(&target, import.range());
            return;
        };
        self.dependencies.insert(target.clone());
        let analysis = doc.analysis();

        for alias in &import.names {
            if alias.name.as_str() == "*" {
                let Some(analysis) = &analysis else { continue };
                for name in analysis.public_names() {
                    if let Some(variable) = analysis.get(&name) {
                        self.bind(
                            &name,
                            variable.value(),
                            VariableSource::Import,
                            alias.range(),
                        );
                    }
                }
                continue;
            }

            let binding = alias
                .asname
                .as_ref()
                .map(|asname| asname.as_str())
                .unwrap_or(alias.name.as_str());
            let member = analysis
                .as_ref()
                .and_then(|analysis| analysis.get(alias.name.as_str()))
                .map(|variable| variable.value())
                .unwrap_or_else(Member::unknown);
            self.bind(binding, member, VariableSource::Import, alias.range());
        }
    }

    fn process_assign(&mut self, assign: &ast::StmtAssign) {
        // `__all__ = [...]`
        if let [ast::Expr::Name(target)] = assign.targets.as_slice() {
            if target.id.as_str() == "__all__" {
                if let Some(names) = string_list_of(&assign.value) {
                    self.all = Some(names);
                }
                return;
            }
            // TypeVar and namedtuple factory calls create types, not values
            if let Some(member) = self.factory_call_of(target.id.as_str(), &assign.value) {
                self.bind(
                    target.id.as_str(),
                    member,
                    VariableSource::Declaration,
                    target.range(),
                );
                return;
            }
        }

        let value = self.eval_expr(&assign.value);
        for target in &assign.targets {
            match target {
                ast::Expr::Name(name) => self.bind(
                    name.id.as_str(),
                    value.clone(),
                    VariableSource::Declaration,
                    name.range(),
                ),
                ast::Expr::Tuple(tuple) => {
                    for element in &tuple.elts {
                        if let ast::Expr::Name(name) = element {
                            self.bind(
                                name.id.as_str(),
                                Member::unknown(),
                                VariableSource::Declaration,
                                name.range(),
                            );
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn process_ann_assign(&mut self, assign: &ast::StmtAnnAssign) {
        // the annotation binds the type even without a value
        let annotated = self.eval_annotation(&assign.annotation);
        if let Some(value) = &assign.value {
            let _ = self.eval_expr(value);
        }
        if let ast::Expr::Name(name) = assign.target.as_ref() {
            self.bind(
                name.id.as_str(),
                Member::Instance(Instance::detached(annotated)),
                VariableSource::Declaration,
                name.range(),
            );
        }
    }

    /// Recognises `TypeVar(...)`, `namedtuple(...)`, and `NamedTuple(...)`
    /// factory calls in an assignment.
    fn factory_call_of(&mut self, target: &str, value: &ast::Expr) -> Option<Member> {
        let ast::Expr::Call(call) = value else {
            return None;
        };
        let callee = last_name_segment(&call.func)?;
        match callee {
            "TypeVar" => {
                let mut tv = TypeVarTy::new(
                    target.into(),
                    self.module_name.clone(),
                    self.loc(call.range()),
                );
                for constraint in call.args.iter().skip(1) {
                    let ty = self.eval_expr(constraint).ty().clone();
                    tv.constraints.push(ty);
                }
                for keyword in &call.keywords {
                    match keyword.arg.as_ref().map(|a| a.as_str()) {
                        Some("bound") => {
                            tv.bound = Some(self.eval_expr(&keyword.value).ty().clone());
                        }
                        Some("covariant") if is_true_literal(&keyword.value) => {
                            tv.variance = Variance::Covariant;
                        }
                        Some("contravariant") if is_true_literal(&keyword.value) => {
                            tv.variance = Variance::Contravariant;
                        }
                        _ => {}
                    }
                }
                Some(Member::Ty(Ty::TypeVar(Arc::new(tv))))
            }
            "namedtuple" | "NamedTuple" => {
                let nt = NamedTupleTy::new(
                    target.into(),
                    self.module_name.clone(),
                    self.loc(call.range()),
                );
                if let Some(fields) = call.args.get(1) {
                    let mut collected = Vec::new();
                    match fields {
                        ast::Expr::List(list) => {
                            for element in &list.elts {
                                match element {
                                    ast::Expr::Constant(constant) => {
                                        if let ast::Constant::Str(name) = &constant.value {
                                            collected.push((
                                                EcoString::from(name.as_str()),
                                                Ty::Unknown,
                                            ));
                                        }
                                    }
                                    ast::Expr::Tuple(pair) => {
                                        if let Some(ast::Expr::Constant(constant)) =
                                            pair.elts.first()
                                        {
                                            if let ast::Constant::Str(name) = &constant.value {
                                                let ty = pair
                                                    .elts
                                                    .get(1)
                                                    .map(|ty| self.eval_annotation(ty))
                                                    .unwrap_or_default();
                                                collected.push((
                                                    EcoString::from(name.as_str()),
                                                    ty,
                                                ));
                                            }
                                        }
                                    }
                                    _ => {}
                                }
                            }
                        }
                        ast::Expr::Constant(constant) => {
                            if let ast::Constant::Str(field_names) = &constant.value {
                                for name in
                                    field_names.split([' ', ',']).filter(|s| !s.is_empty())
                                {
                                    collected.push((EcoString::from(name), Ty::Unknown));
                                }
                            }
                        }
                        _ => {}
                    }
                    *nt.fields.write() = collected;
                }
                Some(Member::Ty(Ty::NamedTuple(Arc::new(nt))))
            }
            _ => None,
        }
    }

    fn process_class(&mut self, class: &ast::StmtClassDef) {
        let binding = self.lookup(class.name.as_str());
        let class_ty = match binding.as_ref().map(Member::ty) {
            Some(Ty::Class(existing)) => existing.clone(),
            _ => {
                let ty = Arc::new(ClassTy::new(
                    class.name.as_str(),
                    self.module_name.clone(),
                    self.loc(class.range()),
                ));
                self.bind(
                    class.name.as_str(),
                    Member::Ty(Ty::Class(ty.clone())),
                    VariableSource::Declaration,
                    class.range(),
                );
                ty
            }
        };

        if let Some(doc) = docstring_of(&class.body) {
            class_ty.set_doc(doc);
        }

        let mut bases = Vec::new();
        let mut generic_params = Vec::new();
        for base in &class.bases {
            // `Generic[T, ...]` contributes type parameters, not a base
            if let ast::Expr::Subscript(subscript) = base {
                if last_name_segment(&subscript.value) == Some("Generic") {
                    for param in subscript_elements(&subscript.slice) {
                        if let Some(Member::Ty(Ty::TypeVar(tv))) =
                            param.and_then(|name| self.lookup(name))
                        {
                            generic_params.push(tv.clone());
                        }
                    }
                    continue;
                }
            }
            if matches!(last_name_segment(base), Some("ABC")) {
                class_ty.set_abstract();
                continue;
            }
            let base_ty = self.eval_expr(base).ty().clone();
            if !base_ty.is_unknown() {
                bases.push(base_ty);
            }
        }
        if !generic_params.is_empty() {
            class_ty.set_generic_params(generic_params);
        }

        // the class body binds members, not scope variables
        for stmt in &class.body {
            match stmt {
                ast::Stmt::FunctionDef(def) => self.process_function(
                    def.name.as_str(),
                    &def.args,
                    &def.body,
                    &def.decorator_list,
                    def.returns.as_deref(),
                    def.range(),
                    Some(&class_ty),
                ),
                ast::Stmt::AsyncFunctionDef(def) => self.process_function(
                    def.name.as_str(),
                    &def.args,
                    &def.body,
                    &def.decorator_list,
                    def.returns.as_deref(),
                    def.range(),
                    Some(&class_ty),
                ),
                ast::Stmt::Assign(assign) => {
                    let value = self.eval_expr(&assign.value);
                    for target in &assign.targets {
                        if let ast::Expr::Name(name) = target {
                            class_ty.add_member(name.id.as_str(), value.clone());
                        }
                    }
                }
                ast::Stmt::AnnAssign(assign) => {
                    let annotated = self.eval_annotation(&assign.annotation);
                    if let ast::Expr::Name(name) = assign.target.as_ref() {
                        class_ty.add_member(
                            name.id.as_str(),
                            Member::Instance(Instance::detached(annotated)),
                        );
                    }
                }
                _ => {}
            }
        }

        class_ty.set_bases(bases);
    }

    #[allow(clippy::too_many_arguments)]
    fn process_function(
        &mut self,
        name: &str,
        args: &ast::Arguments,
        body: &[ast::Stmt],
        decorators: &[ast::Expr],
        returns: Option<&ast::Expr>,
        range: TextRange,
        class: Option<&Arc<ClassTy>>,
    ) {
        let decorator_names: Vec<&str> = decorators
            .iter()
            .filter_map(last_name_segment)
            .collect();

        // `@property` turns the def into an attribute of its class
        if decorator_names.contains(&"property") {
            let prop = Arc::new(PropertyTy::new(
                name,
                self.module_name.clone(),
                self.loc(range),
            ));
            if let Some(doc) = docstring_of(body) {
                prop.set_doc(doc);
            }
            if let Some(value) = self.return_member_of(body, args, returns) {
                prop.set_getter(value);
            }
            let member = Member::Ty(Ty::Property(prop));
            match class {
                Some(class_ty) => class_ty.add_member(name, member),
                None => self.bind(name, member, VariableSource::Declaration, range),
            }
            return;
        }

        let func = self.function_object(name, range, class);
        func.update_flags(|flags| {
            flags.is_static |= decorator_names.contains(&"staticmethod");
            flags.is_class_method |= decorator_names.contains(&"classmethod");
            flags.is_stub |= self.is_stub;
        });
        if decorator_names.contains(&"abstractmethod") {
            if let Some(class_ty) = class {
                class_ty.set_abstract();
            }
        }

        let parameters = self.parameters_of(args);
        let overload = Arc::new(FunctionOverload::with_doc(parameters, docstring_of(body)));
        if let Some(value) = self.return_member_of(body, args, returns) {
            overload.set_return_value(value);
        }

        let is_overload_decl = decorator_names.contains(&"overload");
        if is_overload_decl {
            func.update_flags(|flags| flags.is_overload = true);
        }
        if is_overload_decl || func.flags().is_overload || func.overloads().is_empty() {
            func.add_overload(overload);
        } else {
            // a plain redefinition replaces the previous signature
            func.set_overloads([overload]);
        }
    }

    fn function_object(
        &mut self,
        name: &str,
        range: TextRange,
        class: Option<&Arc<ClassTy>>,
    ) -> Arc<FunctionTy> {
        match class {
            Some(class_ty) => {
                if let Some(member) = class_ty.get_member(name) {
                    if let Ty::Function(func) = member.ty() {
                        if func.declaring_module == self.module_name {
                            return func.clone();
                        }
                    }
                }
                let func = Arc::new(FunctionTy::new(
                    name,
                    self.module_name.clone(),
                    self.loc(range),
                ));
                class_ty.add_member(name, Member::Ty(Ty::Function(func.clone())));
                func
            }
            None => {
                if let Some(Member::Ty(Ty::Function(func))) = self.lookup(name) {
                    return func.clone();
                }
                let func = Arc::new(FunctionTy::new(
                    name,
                    self.module_name.clone(),
                    self.loc(range),
                ));
                self.bind(
                    name,
                    Member::Ty(Ty::Function(func.clone())),
                    VariableSource::Declaration,
                    range,
                );
                func
            }
        }
    }

    fn parameters_of(&mut self, args: &ast::Arguments) -> Vec<Parameter> {
        let mut parameters = Vec::new();
        for arg in args.posonlyargs.iter().chain(args.args.iter()) {
            parameters.push(self.parameter_of(arg, ParameterKind::Positional));
        }
        if let Some(vararg) = &args.vararg {
            parameters.push(Parameter {
                name: vararg.arg.as_str().into(),
                ty: vararg
                    .annotation
                    .as_deref()
                    .map(|annotation| self.eval_annotation(annotation)),
                default_value: None,
                default_value_ty: None,
                kind: ParameterKind::VarPositional,
            });
        }
        for arg in &args.kwonlyargs {
            parameters.push(self.parameter_of(arg, ParameterKind::KeywordOnly));
        }
        if let Some(kwarg) = &args.kwarg {
            parameters.push(Parameter {
                name: kwarg.arg.as_str().into(),
                ty: kwarg
                    .annotation
                    .as_deref()
                    .map(|annotation| self.eval_annotation(annotation)),
                default_value: None,
                default_value_ty: None,
                kind: ParameterKind::VarKeyword,
            });
        }
        parameters
    }

    fn parameter_of(&mut self, arg: &ast::ArgWithDefault, kind: ParameterKind) -> Parameter {
        let default_value = arg
            .default
            .as_deref()
            .map(|default| self.source_of(default.range()));
        let default_value_ty = arg
            .default
            .as_deref()
            .map(|default| self.eval_expr(default).ty().clone());
        Parameter {
            name: arg.def.arg.as_str().into(),
            ty: arg
                .def
                .annotation
                .as_deref()
                .map(|annotation| self.eval_annotation(annotation)),
            default_value,
            default_value_ty,
            kind,
        }
    }

    fn source_of(&self, range: TextRange) -> EcoString {
        let start = range.start().to_usize().min(self.text.len());
        let end = range.end().to_usize().min(self.text.len());
        self.text[start..end].into()
    }

    /// The static return value: the annotation when present, else the first
    /// `return` with a value, evaluated with parameters in scope.
    fn return_member_of(
        &mut self,
        body: &[ast::Stmt],
        args: &ast::Arguments,
        returns: Option<&ast::Expr>,
    ) -> Option<Member> {
        if let Some(annotation) = returns {
            let ty = self.eval_annotation(annotation);
            if !ty.is_unknown() {
                return Some(Member::Instance(Instance::detached(ty)));
            }
        }

        let return_expr = find_return_expr(body)?;

        // parameters participate in the return expression's evaluation
        self.scopes.push(Scope::new());
        for arg in args.posonlyargs.iter().chain(args.args.iter()) {
            let ty = arg
                .def
                .annotation
                .as_deref()
                .map(|annotation| self.eval_annotation(annotation))
                .unwrap_or_default();
            self.bind(
                arg.def.arg.as_str(),
                Member::Instance(Instance::detached(ty)),
                VariableSource::Declaration,
                arg.range(),
            );
        }
        let member = self.eval_expr(return_expr);
        self.pop_scope();
        (!member.is_unknown()).then_some(member)
    }

    /// Evaluates a type annotation to the annotated type.
    fn eval_annotation(&mut self, annotation: &ast::Expr) -> Ty {
        match annotation {
            ast::Expr::Name(name) => self.type_of_name(name.id.as_str()),
            ast::Expr::Attribute(attr) => {
                let member = self.eval_expr(annotation);
                match member.ty() {
                    Ty::Unknown => self.type_of_name(attr.attr.as_str()),
                    ty => ty.clone(),
                }
            }
            ast::Expr::Subscript(subscript) => {
                // `list[int]`, `List[int]`: a concrete collection when known
                let Some(container) = last_name_segment(&subscript.value) else {
                    return Ty::Unknown;
                };
                let elements: Vec<Ty> = subscript_elements(&subscript.slice)
                    .into_iter()
                    .flatten()
                    .map(|name| self.type_of_name(name))
                    .collect();
                match container.to_ascii_lowercase().as_str() {
                    "list" => Ty::Collection(Arc::new(CollectionTy::new(
                        CollectionKind::List,
                        elements,
                    ))),
                    "set" => Ty::Collection(Arc::new(CollectionTy::new(
                        CollectionKind::Set,
                        elements,
                    ))),
                    "tuple" => Ty::Collection(Arc::new(CollectionTy::new(
                        CollectionKind::Tuple,
                        elements,
                    ))),
                    "dict" => {
                        let mut elements = elements.into_iter();
                        let key = elements.next();
                        let value = elements.next();
                        Ty::Collection(Arc::new(CollectionTy::dict(key, value)))
                    }
                    "sequence" => Ty::Collection(Arc::new(CollectionTy::new(
                        CollectionKind::Sequence,
                        elements,
                    ))),
                    "optional" => elements.into_iter().next().unwrap_or_default(),
                    _ => self.type_of_name(container),
                }
            }
            ast::Expr::Constant(constant) => {
                // a string annotation is a forward reference
                if let ast::Constant::Str(name) = &constant.value {
                    self.type_of_name(name.trim())
                } else {
                    Ty::Unknown
                }
            }
            _ => Ty::Unknown,
        }
    }

    fn type_of_name(&mut self, name: &str) -> Ty {
        if name == "None" {
            return builtin_class("NoneType").map(Ty::Class).unwrap_or_default();
        }
        if let Some(member) = self.lookup(name) {
            match member.ty() {
                Ty::Unknown => {}
                ty => return ty.clone(),
            }
        }
        builtin_class(name).map(Ty::Class).unwrap_or_default()
    }

    /// Evaluates an expression to the member it denotes.
    fn eval_expr(&mut self, expr: &ast::Expr) -> Member {
        match expr {
            ast::Expr::Constant(constant) => self.constant_member(constant),
            ast::Expr::Name(name) => self.eval_name(name),
            ast::Expr::Attribute(attr) => {
                let value = self.eval_expr(&attr.value);
                self.member_of(&value, attr.attr.as_str())
            }
            ast::Expr::Call(call) => self.eval_call(call),
            ast::Expr::Subscript(subscript) => {
                let value = self.eval_expr(&subscript.value);
                let args = CallArgs::positional(vec![self.eval_expr(&subscript.slice)]);
                let instance = Instance::detached(value.ty().clone());
                value.ty().index(&instance, &args)
            }
            ast::Expr::List(list) => {
                let elements = self.eval_elements(&list.elts);
                self.collection_member(CollectionKind::List, elements, list.range())
            }
            ast::Expr::Set(set) => {
                let elements = self.eval_elements(&set.elts);
                self.collection_member(CollectionKind::Set, elements, set.range())
            }
            ast::Expr::Tuple(tuple) => {
                let elements = self.eval_elements(&tuple.elts);
                self.collection_member(CollectionKind::Tuple, elements, tuple.range())
            }
            ast::Expr::Dict(dict) => {
                let keys: Vec<Ty> = dict
                    .keys
                    .iter()
                    .flatten()
                    .map(|key| self.eval_expr(key).ty().clone())
                    .collect();
                let values: Vec<Ty> = dict
                    .values
                    .iter()
                    .map(|value| self.eval_expr(value).ty().clone())
                    .collect();
                Member::Instance(Instance::new(
                    Ty::Collection(Arc::new(CollectionTy::dict(keys, values))),
                    self.loc(dict.range()),
                ))
            }
            ast::Expr::BinOp(binop) => {
                let left = self.eval_expr(&binop.left);
                let _ = self.eval_expr(&binop.right);
                left
            }
            ast::Expr::BoolOp(_) | ast::Expr::Compare(_) => {
                builtin_instance("bool", LocationInfo::EMPTY)
            }
            ast::Expr::UnaryOp(unary) => self.eval_expr(&unary.operand),
            ast::Expr::JoinedStr(joined) => {
                builtin_instance("str", self.loc(joined.range()))
            }
            ast::Expr::IfExp(if_exp) => {
                let _ = self.eval_expr(&if_exp.test);
                let body = self.eval_expr(&if_exp.body);
                let _ = self.eval_expr(&if_exp.orelse);
                body
            }
            ast::Expr::Await(await_expr) => self.eval_expr(&await_expr.value),
            _ => Member::unknown(),
        }
    }

    fn eval_elements(&mut self, elements: &[ast::Expr]) -> Vec<Ty> {
        elements
            .iter()
            .map(|element| self.eval_expr(element).ty().clone())
            .collect()
    }

    fn collection_member(
        &mut self,
        kind: CollectionKind,
        elements: Vec<Ty>,
        range: TextRange,
    ) -> Member {
        Member::Instance(Instance::new(
            Ty::Collection(Arc::new(CollectionTy::new(kind, elements))),
            self.loc(range),
        ))
    }

    fn constant_member(&mut self, constant: &ast::ExprConstant) -> Member {
        let location = self.loc(constant.range());
        match &constant.value {
            ast::Constant::Int(value) => {
                builtin_literal("int", location, ecow::eco_format!("{value}"))
            }
            ast::Constant::Float(value) => {
                builtin_literal("float", location, ecow::eco_format!("{value}"))
            }
            ast::Constant::Complex { .. } => builtin_instance("complex", location),
            ast::Constant::Bool(value) => {
                builtin_literal("bool", location, if *value { "True" } else { "False" })
            }
            ast::Constant::Str(_) => builtin_instance("str", location),
            ast::Constant::Bytes(_) => builtin_instance("bytes", location),
            ast::Constant::None => builtin_instance("NoneType", location),
            _ => Member::unknown(),
        }
    }

    fn eval_name(&mut self, name: &ast::ExprName) -> Member {
        let id = name.id.as_str();
        if let Some(member) = self.lookup(id) {
            return member;
        }
        if let Some(class) = builtin_class(id) {
            return Member::Ty(Ty::Class(class));
        }
        if self.assigned_names.contains(id) {
            self.diag(
                ecow::eco_format!("'{id}' is used before it is defined"),
                name.range(),
                codes::USE_BEFORE_DEF,
            );
        }
        Member::unknown()
    }

    fn member_of(&mut self, value: &Member, attr: &str) -> Member {
        match value.ty() {
            Ty::Module(module_name) => {
                let analysis = self
                    .imports
                    .get(module_name)
                    .and_then(|doc| doc.as_ref())
                    .and_then(|doc| doc.analysis());
                match analysis.and_then(|analysis| analysis.get(attr).map(|v| v.value())) {
                    Some(member) => member,
                    None => Member::unknown(),
                }
            }
            ty => ty.get_member(attr).unwrap_or_else(Member::unknown),
        }
    }

    fn eval_call(&mut self, call: &ast::ExprCall) -> Member {
        let callee = self.eval_expr(&call.func);
        let args = self.call_args_of(call);

        match callee {
            Member::Ty(Ty::Class(class)) => Member::Instance(Instance::new(
                class.create_instance(&args).ty,
                self.loc(call.range()),
            )),
            Member::Ty(Ty::Collection(collection)) => {
                Member::Instance(collection.create_instance(&args))
            }
            Member::Ty(Ty::Function(func)) => func.invoke(None, &args),
            Member::Ty(Ty::NamedTuple(nt)) => {
                Member::Instance(Instance::new(Ty::NamedTuple(nt), self.loc(call.range())))
            }
            Member::Ty(Ty::Module(_)) | Member::Instance(_) => {
                let ty = callee.ty();
                if ty.is_unknown() {
                    return Member::unknown();
                }
                // calling an instance goes through `__call__`
                if let Some(member) = ty.get_member("__call__") {
                    if let Ty::Function(func) = member.ty() {
                        return func.invoke(None, &args);
                    }
                }
                self.diag(
                    ecow::eco_format!("'{}' is not callable", ty.name()),
                    call.func.range(),
                    codes::NOT_CALLABLE,
                );
                Member::unknown()
            }
            _ => Member::unknown(),
        }
    }

    fn call_args_of(&mut self, call: &ast::ExprCall) -> CallArgs {
        let args: Vec<Member> = call
            .args
            .iter()
            .map(|arg| self.eval_expr(arg))
            .collect();
        let list_values = match call.args.first() {
            Some(ast::Expr::List(list)) => list
                .elts
                .iter()
                .map(|element| self.eval_expr(element))
                .collect(),
            Some(ast::Expr::Tuple(tuple)) => tuple
                .elts
                .iter()
                .map(|element| self.eval_expr(element))
                .collect(),
            _ => Vec::new(),
        };
        CallArgs { args, list_values }
    }
}

/// The docstring of a suite, when its first statement is a string literal.
pub(crate) fn docstring_of(body: &[ast::Stmt]) -> Option<EcoString> {
    let ast::Stmt::Expr(expr) = body.first()? else {
        return None;
    };
    let ast::Expr::Constant(constant) = expr.value.as_ref() else {
        return None;
    };
    match &constant.value {
        ast::Constant::Str(doc) => Some(doc.as_str().into()),
        _ => None,
    }
}

/// The last dotted segment of a name or attribute expression.
fn last_name_segment(expr: &ast::Expr) -> Option<&str> {
    match expr {
        ast::Expr::Name(name) => Some(name.id.as_str()),
        ast::Expr::Attribute(attr) => Some(attr.attr.as_str()),
        _ => None,
    }
}

/// The element names of a subscript slice (`X[a]` or `X[a, b]`).
fn subscript_elements(slice: &ast::Expr) -> Vec<Option<&str>> {
    match slice {
        ast::Expr::Tuple(tuple) => tuple.elts.iter().map(last_name_segment).collect(),
        other => vec![last_name_segment(other)],
    }
}

fn is_true_literal(expr: &ast::Expr) -> bool {
    matches!(
        expr,
        ast::Expr::Constant(constant)
            if matches!(constant.value, ast::Constant::Bool(true))
    )
}

/// The first `return <expr>` in a suite, searching nested blocks.
fn find_return_expr(body: &[ast::Stmt]) -> Option<&ast::Expr> {
    for stmt in body {
        match stmt {
            ast::Stmt::Return(ret) => {
                if let Some(value) = &ret.value {
                    return Some(value);
                }
            }
            ast::Stmt::If(if_stmt) => {
                if let Some(found) =
                    find_return_expr(&if_stmt.body).or_else(|| find_return_expr(&if_stmt.orelse))
                {
                    return Some(found);
                }
            }
            ast::Stmt::Try(try_stmt) => {
                if let Some(found) = find_return_expr(&try_stmt.body) {
                    return Some(found);
                }
            }
            ast::Stmt::With(with_stmt) => {
                if let Some(found) = find_return_expr(&with_stmt.body) {
                    return Some(found);
                }
            }
            _ => {}
        }
    }
    None
}

/// The list of string literals in a list or tuple expression.
fn string_list_of(expr: &ast::Expr) -> Option<Vec<EcoString>> {
    let elements = match expr {
        ast::Expr::List(list) => &list.elts,
        ast::Expr::Tuple(tuple) => &tuple.elts,
        _ => return None,
    };
    let mut names = Vec::new();
    for element in elements {
        let ast::Expr::Constant(constant) = element else {
            return None;
        };
        let ast::Constant::Str(name) = &constant.value else {
            return None;
        };
        names.push(EcoString::from(name.as_str()));
    }
    Some(names)
}
