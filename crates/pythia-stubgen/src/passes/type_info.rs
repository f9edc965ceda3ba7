//! Annotates function signatures from the analyzed member model.
//!
//! A function with exactly one overload gets parameter and return
//! annotations from it; a function with several gets the overload whose
//! parameter count matches the declared signature.

use std::sync::Arc;

use pythia_analysis::scope::ModuleAnalysis;
use pythia_analysis::ty::{FunctionOverload, FunctionTy, Ty};
use rustpython_ast::{self as ast, Ranged};

use crate::base::{Edit, apply_edits};
use crate::passes::{RewritePass, StubContext, parse_suite};

pub(crate) struct TypeInfoPass;

/// The annotation text for a type, when it has a printable name.
fn annotation_of(ty: &Ty) -> Option<String> {
    match ty {
        Ty::Unknown | Ty::Module(_) | Ty::Function(_) | Ty::Property(_) => None,
        Ty::Class(class) => Some(class.name.to_string()),
        Ty::Collection(coll) => Some(coll.name().to_string()),
        Ty::NamedTuple(nt) => Some(nt.name.to_string()),
        Ty::TypeVar(tv) => Some(tv.name.to_string()),
    }
}

fn select_overload(
    func: &FunctionTy,
    declared_arity: usize,
) -> Option<Arc<FunctionOverload>> {
    let overloads = func.overloads();
    match overloads.as_slice() {
        [] => None,
        [only] => Some(only.clone()),
        several => several
            .iter()
            .find(|overload| overload.parameters.len() == declared_arity)
            .cloned(),
    }
}

fn annotate_function(
    source: &str,
    name: &str,
    args: &ast::Arguments,
    body: &[ast::Stmt],
    returns: Option<&ast::Expr>,
    func: &FunctionTy,
    edits: &mut Vec<Edit>,
) {
    let declared: Vec<&ast::ArgWithDefault> =
        args.posonlyargs.iter().chain(args.args.iter()).collect();
    let Some(overload) = select_overload(func, declared.len()) else {
        log::debug!("no overload of {name} matches arity {}", declared.len());
        return;
    };

    for (index, arg) in declared.iter().enumerate() {
        if arg.def.annotation.is_some() {
            continue;
        }
        // match by name, falling back to position
        let param = overload
            .parameters
            .iter()
            .find(|param| param.name == arg.def.arg.as_str())
            .or_else(|| overload.parameters.get(index));
        let Some(annotation) = param
            .and_then(|param| param.ty.as_ref())
            .and_then(annotation_of)
        else {
            continue;
        };
        edits.push(Edit::Insert {
            at: arg.def.range().end().to_usize(),
            text: format!(": {annotation}"),
        });
    }

    if returns.is_none() {
        let annotation = overload
            .return_value()
            .and_then(|member| annotation_of(member.ty()));
        if let Some(annotation) = annotation {
            if let Some(colon) = header_colon(source, args, body) {
                edits.push(Edit::Insert {
                    at: colon,
                    text: format!(" -> {annotation}"),
                });
            }
        }
    }
}

/// The offset of the `:` closing a `def` header.
fn header_colon(source: &str, args: &ast::Arguments, body: &[ast::Stmt]) -> Option<usize> {
    let from = args
        .args
        .last()
        .map(|arg| arg.range().end().to_usize())
        .or_else(|| args.posonlyargs.last().map(|arg| arg.range().end().to_usize()))
        .unwrap_or_else(|| args.range().start().to_usize());
    let until = body.first()?.range().start().to_usize().min(source.len());
    let from = from.min(until);
    let header = &source[from..until];
    header.rfind(':').map(|pos| from + pos)
}

impl RewritePass for TypeInfoPass {
    fn name(&self) -> &'static str {
        "append-type-info"
    }

    fn run(&self, source: &str, ctx: &StubContext) -> String {
        let Some(analysis) = ctx.analysis else {
            return source.to_owned();
        };
        let Some(body) = parse_suite(source) else {
            return source.to_owned();
        };

        let mut edits = Vec::new();
        annotate_suite(source, &body, analysis, None, &mut edits);
        apply_edits(source, edits)
    }
}

fn function_of(
    analysis: &ModuleAnalysis,
    class_name: Option<&str>,
    name: &str,
) -> Option<Arc<FunctionTy>> {
    match class_name {
        Some(class_name) => {
            let class = analysis.get(class_name)?.value();
            let Ty::Class(class) = class.ty() else {
                return None;
            };
            match class.get_member(name)?.ty() {
                Ty::Function(func) => Some(func.clone()),
                _ => None,
            }
        }
        None => match analysis.get(name)?.value().ty() {
            Ty::Function(func) => Some(func.clone()),
            _ => None,
        },
    }
}

fn annotate_suite(
    source: &str,
    body: &[ast::Stmt],
    analysis: &ModuleAnalysis,
    class_name: Option<&str>,
    edits: &mut Vec<Edit>,
) {
    for stmt in body {
        match stmt {
            ast::Stmt::FunctionDef(def) => {
                if let Some(func) = function_of(analysis, class_name, def.name.as_str()) {
                    annotate_function(
                        source,
                        def.name.as_str(),
                        &def.args,
                        &def.body,
                        def.returns.as_deref(),
                        &func,
                        edits,
                    );
                }
            }
            ast::Stmt::AsyncFunctionDef(def) => {
                if let Some(func) = function_of(analysis, class_name, def.name.as_str()) {
                    annotate_function(
                        source,
                        def.name.as_str(),
                        &def.args,
                        &def.body,
                        def.returns.as_deref(),
                        &func,
                        edits,
                    );
                }
            }
            ast::Stmt::ClassDef(class) if class_name.is_none() => {
                annotate_suite(
                    source,
                    &class.body,
                    analysis,
                    Some(class.name.as_str()),
                    edits,
                );
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    use pythia_analysis::scope::{Variable, VariableSource};
    use pythia_analysis::ty::{Instance, Member, Parameter, builtin_class};
    use pythia_std::loc::LocationInfo;

    fn analysis_with(name: &str, overloads: Vec<Vec<&str>>, ret: Option<&str>) -> ModuleAnalysis {
        let mut analysis = ModuleAnalysis::empty("m", "m.py");
        let func = StdArc::new(FunctionTy::new(name, "m", LocationInfo::EMPTY));
        for params in overloads {
            let overload = StdArc::new(FunctionOverload::new(
                params
                    .iter()
                    .map(|p| Parameter {
                        name: (*p).into(),
                        ty: Some(Ty::Class(builtin_class("int").unwrap())),
                        default_value: None,
                        default_value_ty: None,
                        kind: Default::default(),
                    })
                    .collect(),
            ));
            if let Some(ret) = ret {
                overload.set_return_value(Member::Instance(Instance::detached(Ty::Class(
                    builtin_class(ret).unwrap(),
                ))));
            }
            func.add_overload(overload);
        }
        analysis.global_scope.bind(StdArc::new(Variable::new(
            name,
            Member::Ty(Ty::Function(func)),
            VariableSource::Declaration,
            LocationInfo::EMPTY,
        )));
        analysis
    }

    fn run(source: &str, analysis: &ModuleAnalysis) -> String {
        TypeInfoPass.run(
            source,
            &StubContext {
                analysis: Some(analysis),
            },
        )
    }

    #[test]
    fn test_single_overload_annotates() {
        let analysis = analysis_with("f", vec![vec!["a"]], Some("str"));
        let out = run("def f(a):\n    ...\n", &analysis);
        assert_eq!(out, "def f(a: int) -> str:\n    ...\n");
    }

    #[test]
    fn test_multiple_overloads_select_by_arity() {
        let analysis = analysis_with("f", vec![vec!["a"], vec!["a", "b"]], None);
        let out = run("def f(a, b):\n    ...\n", &analysis);
        assert_eq!(out, "def f(a: int, b: int):\n    ...\n");
    }

    #[test]
    fn test_annotated_signature_untouched() {
        let analysis = analysis_with("f", vec![vec!["a"]], Some("str"));
        let source = "def f(a: int) -> str:\n    ...\n";
        assert_eq!(run(source, &analysis), source);
    }
}
