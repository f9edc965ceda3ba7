//! Serializable shapes of an analyzed module, with a two-phase
//! (declare/finalize) reconstruction protocol.
//!
//! Type references are serialized as qualified names (`module.Member`).
//! Reconstruction first declares every member of a module so that later
//! qualified-name lookups succeed, then finalizes bases, overloads, and
//! return values; unresolvable names degrade to [`Ty::Unknown`].

use std::cell::RefCell;
use std::sync::Arc;

use ecow::EcoString;
use pythia_std::hash::{FxHashMap, FxHashSet};
use pythia_std::loc::{IndexSpan, LocationInfo};
use serde::{Deserialize, Serialize};

use crate::scope::{ModuleAnalysis, Variable, VariableSource};
use crate::ty::{
    ClassTy, FunctionOverload, FunctionTy, Instance, Member, NamedTupleTy, Parameter,
    ParameterKind, PropertyTy, Ty, TypeVarTy, builtin_class,
};

/// The qualified name of a type, used as its serialized reference.
pub fn qualified_name(ty: &Ty) -> Option<String> {
    let module = ty.declaring_module()?;
    Some(format!("{module}.{}", ty.name()))
}

/// A serializable byte span.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpanModel {
    /// The byte offset where the span starts.
    pub start: usize,
    /// The number of bytes covered.
    pub length: usize,
}

impl From<IndexSpan> for IndexSpanModel {
    fn from(span: IndexSpan) -> Self {
        Self {
            start: span.start,
            length: span.length,
        }
    }
}

impl From<IndexSpanModel> for IndexSpan {
    fn from(model: IndexSpanModel) -> Self {
        IndexSpan {
            start: model.start,
            length: model.length,
        }
    }
}

/// A serializable parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterModel {
    /// The declared name.
    pub name: String,
    /// The binding kind.
    pub kind: ParameterKind,
    /// The qualified name of the annotated type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    /// The string form of the default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

/// A serializable overload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverloadModel {
    /// The parameters, in order.
    pub parameters: Vec<ParameterModel>,
    /// The qualified name of the static return type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_ty: Option<String>,
    /// The documentation string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

/// A serializable function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionModel {
    /// The declared name.
    pub name: String,
    /// The overloads, in declaration order.
    pub overloads: Vec<OverloadModel>,
    /// Declared with `@staticmethod`.
    #[serde(default)]
    pub is_static: bool,
    /// Declared with `@classmethod`.
    #[serde(default)]
    pub is_class_method: bool,
    /// Declared in a stub file.
    #[serde(default)]
    pub is_stub: bool,
    /// The byte span of the declaration.
    pub span: IndexSpanModel,
}

/// A serializable property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyModel {
    /// The declared name.
    pub name: String,
    /// The qualified name of the getter's type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_ty: Option<String>,
    /// The byte span of the declaration.
    pub span: IndexSpanModel,
}

/// A serializable variable binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableModel {
    /// The bound name.
    pub name: String,
    /// The qualified name of the bound value's type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    /// Where the binding came from.
    pub source: VariableSource,
    /// The byte span of the binding.
    pub span: IndexSpanModel,
}

/// A serializable type variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeVarModel {
    /// The declared name.
    pub name: String,
    /// The qualified names of the constraint types.
    #[serde(default)]
    pub constraints: Vec<String>,
    /// The qualified name of the bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound: Option<String>,
}

/// A serializable named tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedTupleModel {
    /// The declared name.
    pub name: String,
    /// The ordered `(name, qualified type name)` field pairs.
    pub fields: Vec<(String, String)>,
    /// The byte span of the declaration.
    pub span: IndexSpanModel,
}

/// A serializable class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassModel {
    /// The declared name.
    pub name: String,
    /// The documentation string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    /// The qualified names of the bases, in declaration order.
    #[serde(default)]
    pub bases: Vec<String>,
    /// The names of the generic parameters.
    #[serde(default)]
    pub generic_params: Vec<String>,
    /// The methods.
    #[serde(default)]
    pub methods: Vec<FunctionModel>,
    /// The properties.
    #[serde(default)]
    pub properties: Vec<PropertyModel>,
    /// The non-callable members.
    #[serde(default)]
    pub fields: Vec<VariableModel>,
    /// The byte span of the declaration.
    pub span: IndexSpanModel,
}

/// The serializable shape of one analyzed module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleModel {
    /// The dotted module name.
    pub name: String,
    /// The path of the analyzed file.
    pub file_path: String,
    /// The module docstring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    /// The `__all__` export list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all: Option<Vec<String>>,
    /// The classes declared at module level.
    #[serde(default)]
    pub classes: Vec<ClassModel>,
    /// The functions declared at module level.
    #[serde(default)]
    pub functions: Vec<FunctionModel>,
    /// The named tuples declared at module level.
    #[serde(default)]
    pub named_tuples: Vec<NamedTupleModel>,
    /// The type variables declared at module level.
    #[serde(default)]
    pub type_vars: Vec<TypeVarModel>,
    /// Every other module-level binding.
    #[serde(default)]
    pub variables: Vec<VariableModel>,
}

fn function_model(func: &FunctionTy) -> FunctionModel {
    let flags = func.flags();
    FunctionModel {
        name: func.name.to_string(),
        overloads: func
            .overloads()
            .iter()
            .map(|overload| OverloadModel {
                parameters: overload
                    .parameters
                    .iter()
                    .map(|param| ParameterModel {
                        name: param.name.to_string(),
                        kind: param.kind,
                        ty: param.ty.as_ref().and_then(qualified_name),
                        default_value: param.default_value.as_ref().map(|v| v.to_string()),
                    })
                    .collect(),
                return_ty: overload
                    .return_value()
                    .as_ref()
                    .and_then(|member| qualified_name(member.ty())),
                doc: overload.doc.as_ref().map(|d| d.to_string()),
            })
            .collect(),
        is_static: flags.is_static,
        is_class_method: flags.is_class_method,
        is_stub: flags.is_stub,
        span: func.location.index_span.into(),
    }
}

fn variable_model(variable: &Variable) -> VariableModel {
    VariableModel {
        name: variable.name.to_string(),
        ty: qualified_name(variable.value().ty()),
        source: variable.source,
        span: variable.location.index_span.into(),
    }
}

impl ModuleModel {
    /// Captures the serializable shape of an analysis.
    pub fn from_analysis(analysis: &ModuleAnalysis) -> Self {
        let mut model = ModuleModel {
            name: analysis.module_name.to_string(),
            file_path: analysis.file_path.to_string(),
            doc: analysis.doc.as_ref().map(|d| d.to_string()),
            all: analysis
                .all
                .as_ref()
                .map(|all| all.iter().map(|n| n.to_string()).collect()),
            classes: Vec::new(),
            functions: Vec::new(),
            named_tuples: Vec::new(),
            type_vars: Vec::new(),
            variables: Vec::new(),
        };

        for (_, variable) in analysis.global_scope.iter() {
            match variable.value().ty() {
                Ty::Class(class) if class.declaring_module == analysis.module_name => {
                    model.classes.push(class_model(class));
                }
                Ty::Function(func) if func.declaring_module == analysis.module_name => {
                    model.functions.push(function_model(func));
                }
                Ty::NamedTuple(nt) if nt.declaring_module == analysis.module_name => {
                    model.named_tuples.push(NamedTupleModel {
                        name: nt.name.to_string(),
                        fields: nt
                            .fields
                            .read()
                            .iter()
                            .map(|(name, ty)| {
                                (
                                    name.to_string(),
                                    qualified_name(ty).unwrap_or_default(),
                                )
                            })
                            .collect(),
                        span: nt.location.index_span.into(),
                    });
                }
                Ty::TypeVar(tv) => {
                    model.type_vars.push(TypeVarModel {
                        name: tv.name.to_string(),
                        constraints: tv.constraints.iter().filter_map(qualified_name).collect(),
                        bound: tv.bound.as_ref().and_then(qualified_name),
                    });
                }
                _ => model.variables.push(variable_model(variable)),
            }
        }

        model
    }

    /// Phase one: creates the skeletal members of the module and records
    /// them so that qualified-name lookups succeed before finalization.
    pub fn declare(self) -> DeclaredModule {
        let mut classes = FxHashMap::default();
        let mut functions = FxHashMap::default();
        let mut named_tuples = FxHashMap::default();
        let mut type_vars = FxHashMap::default();

        for class in &self.classes {
            classes.insert(
                EcoString::from(class.name.as_str()),
                Arc::new(ClassTy::new(
                    class.name.as_str(),
                    self.name.as_str(),
                    LocationInfo::EMPTY,
                )),
            );
        }
        for func in &self.functions {
            functions.insert(
                EcoString::from(func.name.as_str()),
                Arc::new(FunctionTy::new(
                    func.name.as_str(),
                    self.name.as_str(),
                    LocationInfo::EMPTY,
                )),
            );
        }
        for nt in &self.named_tuples {
            named_tuples.insert(
                EcoString::from(nt.name.as_str()),
                Arc::new(NamedTupleTy::new(
                    nt.name.as_str().into(),
                    self.name.as_str().into(),
                    LocationInfo::EMPTY,
                )),
            );
        }
        for tv in &self.type_vars {
            type_vars.insert(
                EcoString::from(tv.name.as_str()),
                Arc::new(TypeVarTy::new(
                    tv.name.as_str().into(),
                    self.name.as_str().into(),
                    LocationInfo::EMPTY,
                )),
            );
        }

        DeclaredModule {
            model: self,
            classes,
            functions,
            named_tuples,
            type_vars,
            finalizing: RefCell::new(FxHashSet::default()),
        }
    }
}

fn class_model(class: &ClassTy) -> ClassModel {
    let mut methods = Vec::new();
    let mut properties = Vec::new();
    let mut fields = Vec::new();
    for (name, member) in class.own_members() {
        match member.ty() {
            Ty::Function(func) => methods.push(function_model(func)),
            Ty::Property(prop) => properties.push(PropertyModel {
                name: prop.name.to_string(),
                return_ty: prop
                    .getter()
                    .as_ref()
                    .and_then(|member| qualified_name(member.ty())),
                span: prop.location.index_span.into(),
            }),
            ty => fields.push(VariableModel {
                name: name.to_string(),
                ty: qualified_name(ty),
                source: VariableSource::Declaration,
                span: IndexSpanModel::default(),
            }),
        }
    }

    ClassModel {
        name: class.name.to_string(),
        doc: class.doc().as_ref().map(|d| d.to_string()),
        bases: class.bases().iter().filter_map(qualified_name).collect(),
        generic_params: class
            .generic_params()
            .iter()
            .map(|tv| tv.name.to_string())
            .collect(),
        methods,
        properties,
        fields,
        span: class.location.index_span.into(),
    }
}

/// Resolves qualified names across already-restored modules.
pub trait ModuleFactory {
    /// Resolves `module.Member` to a member, or `None` when absent.
    fn resolve_qualified_name(&self, qname: &str) -> Option<Member>;
}

/// A factory with no modules; every lookup falls back to builtins or
/// [`Ty::Unknown`].
#[derive(Debug, Default)]
pub struct EmptyModuleFactory;

impl ModuleFactory for EmptyModuleFactory {
    fn resolve_qualified_name(&self, _qname: &str) -> Option<Member> {
        None
    }
}

/// Phase-one output: skeletal members, ready to be finalized.
pub struct DeclaredModule {
    model: ModuleModel,
    classes: FxHashMap<EcoString, Arc<ClassTy>>,
    functions: FxHashMap<EcoString, Arc<FunctionTy>>,
    named_tuples: FxHashMap<EcoString, Arc<NamedTupleTy>>,
    type_vars: FxHashMap<EcoString, Arc<TypeVarTy>>,
    finalizing: RefCell<FxHashSet<EcoString>>,
}

impl DeclaredModule {
    /// The dotted name of the module being restored.
    pub fn name(&self) -> &str {
        &self.model.name
    }

    /// Resolves a qualified name, preferring the module's own declarations.
    ///
    /// Absent names degrade to [`Ty::Unknown`].
    pub fn construct_type(&self, qname: &str, factory: &dyn ModuleFactory) -> Ty {
        let (module, member) = match qname.rsplit_once('.') {
            Some(split) => split,
            None => return Ty::Unknown,
        };
        if module == self.model.name {
            if let Some(class) = self.classes.get(member) {
                return Ty::Class(class.clone());
            }
            if let Some(func) = self.functions.get(member) {
                return Ty::Function(func.clone());
            }
            if let Some(nt) = self.named_tuples.get(member) {
                return Ty::NamedTuple(nt.clone());
            }
            if let Some(tv) = self.type_vars.get(member) {
                return Ty::TypeVar(tv.clone());
            }
            return Ty::Unknown;
        }
        if module == "builtins" {
            if let Some(class) = builtin_class(member) {
                return Ty::Class(class);
            }
        }
        factory
            .resolve_qualified_name(qname)
            .map(|found| found.ty().clone())
            .unwrap_or_default()
    }

    /// Phase two: fills bases, members, overloads, and return values, then
    /// assembles the restored analysis.
    ///
    /// Finalization of one member may recursively resolve others; the
    /// per-member guard makes re-entrant finalization a no-op.
    pub fn finalize(&self, factory: &dyn ModuleFactory) -> Arc<ModuleAnalysis> {
        let mut analysis = ModuleAnalysis::empty(
            EcoString::from(self.model.name.as_str()),
            EcoString::from(self.model.file_path.as_str()),
        );
        analysis.doc = self.model.doc.as_ref().map(|d| d.as_str().into());
        analysis.all = self
            .model
            .all
            .as_ref()
            .map(|all| all.iter().map(|n| EcoString::from(n.as_str())).collect());

        for class_model in &self.model.classes {
            self.finalize_class(class_model, factory);
            let class = &self.classes[class_model.name.as_str()];
            analysis.global_scope.bind(Arc::new(Variable::new(
                class_model.name.as_str(),
                Member::Ty(Ty::Class(class.clone())),
                VariableSource::Declaration,
                LocationInfo::EMPTY,
            )));
        }
        for func_model in &self.model.functions {
            let func = &self.functions[func_model.name.as_str()];
            self.finalize_function(func, func_model, factory);
            analysis.global_scope.bind(Arc::new(Variable::new(
                func_model.name.as_str(),
                Member::Ty(Ty::Function(func.clone())),
                VariableSource::Declaration,
                LocationInfo::EMPTY,
            )));
        }
        for nt_model in &self.model.named_tuples {
            let nt = &self.named_tuples[nt_model.name.as_str()];
            *nt.fields.write() = nt_model
                .fields
                .iter()
                .map(|(name, qname)| {
                    (
                        EcoString::from(name.as_str()),
                        self.construct_type(qname, factory),
                    )
                })
                .collect();
            analysis.global_scope.bind(Arc::new(Variable::new(
                nt_model.name.as_str(),
                Member::Ty(Ty::NamedTuple(nt.clone())),
                VariableSource::Declaration,
                LocationInfo::EMPTY,
            )));
        }
        for tv_model in &self.model.type_vars {
            let tv = &self.type_vars[tv_model.name.as_str()];
            analysis.global_scope.bind(Arc::new(Variable::new(
                tv_model.name.as_str(),
                Member::Ty(Ty::TypeVar(tv.clone())),
                VariableSource::Generic,
                LocationInfo::EMPTY,
            )));
        }
        for var_model in &self.model.variables {
            let ty = var_model
                .ty
                .as_deref()
                .map(|qname| self.construct_type(qname, factory))
                .unwrap_or_default();
            analysis.global_scope.bind(Arc::new(Variable::new(
                var_model.name.as_str(),
                Member::Instance(Instance::detached(ty)),
                var_model.source,
                LocationInfo::EMPTY,
            )));
        }

        Arc::new(analysis)
    }

    fn finalize_class(&self, model: &ClassModel, factory: &dyn ModuleFactory) {
        let key = EcoString::from(model.name.as_str());
        if !self.finalizing.borrow_mut().insert(key.clone()) {
            return;
        }

        let class = &self.classes[model.name.as_str()];
        if let Some(doc) = &model.doc {
            class.set_doc(doc.as_str());
        }
        class.set_bases(
            model
                .bases
                .iter()
                .map(|qname| self.construct_type(qname, factory))
                .collect::<Vec<_>>(),
        );
        class.set_generic_params(model.generic_params.iter().map(|name| {
            self.type_vars.get(name.as_str()).cloned().unwrap_or_else(|| {
                Arc::new(TypeVarTy::new(
                    name.as_str().into(),
                    self.model.name.as_str().into(),
                    LocationInfo::EMPTY,
                ))
            })
        }));
        for method_model in &model.methods {
            let func = Arc::new(FunctionTy::new(
                method_model.name.as_str(),
                self.model.name.as_str(),
                LocationInfo::EMPTY,
            ));
            self.finalize_function(&func, method_model, factory);
            class.add_member(method_model.name.as_str(), Member::Ty(Ty::Function(func)));
        }
        for prop_model in &model.properties {
            let prop = Arc::new(PropertyTy::new(
                prop_model.name.as_str(),
                self.model.name.as_str(),
                LocationInfo::EMPTY,
            ));
            if let Some(qname) = &prop_model.return_ty {
                prop.set_getter(Member::Instance(Instance::detached(
                    self.construct_type(qname, factory),
                )));
            }
            class.add_member(prop_model.name.as_str(), Member::Ty(Ty::Property(prop)));
        }
        for field_model in &model.fields {
            let ty = field_model
                .ty
                .as_deref()
                .map(|qname| self.construct_type(qname, factory))
                .unwrap_or_default();
            class.add_member(
                field_model.name.as_str(),
                Member::Instance(Instance::detached(ty)),
            );
        }

        self.finalizing.borrow_mut().remove(&key);
    }

    fn finalize_function(
        &self,
        func: &Arc<FunctionTy>,
        model: &FunctionModel,
        factory: &dyn ModuleFactory,
    ) {
        func.update_flags(|flags| {
            flags.is_static = model.is_static;
            flags.is_class_method = model.is_class_method;
            flags.is_stub = model.is_stub;
        });
        func.set_overloads(model.overloads.iter().map(|overload_model| {
            let parameters = overload_model
                .parameters
                .iter()
                .map(|param| Parameter {
                    name: param.name.as_str().into(),
                    ty: param
                        .ty
                        .as_deref()
                        .map(|qname| self.construct_type(qname, factory)),
                    default_value: param.default_value.as_deref().map(EcoString::from),
                    default_value_ty: None,
                    kind: param.kind,
                })
                .collect();
            let overload = Arc::new(FunctionOverload::with_doc(
                parameters,
                overload_model.doc.as_deref().map(EcoString::from),
            ));
            if let Some(qname) = &overload_model.return_ty {
                overload.set_return_value(Member::Instance(Instance::detached(
                    self.construct_type(qname, factory),
                )));
            }
            overload
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::builtin_instance;

    fn sample_analysis() -> ModuleAnalysis {
        let mut analysis = ModuleAnalysis::empty("sample", "sample.py");

        let base = Arc::new(ClassTy::new("Base", "sample", LocationInfo::EMPTY));
        base.set_bases(vec![Ty::Class(builtin_class("object").unwrap())]);
        let derived = Arc::new(ClassTy::new("Derived", "sample", LocationInfo::EMPTY));
        derived.set_bases(vec![Ty::Class(base.clone())]);

        let func = Arc::new(FunctionTy::new("make", "sample", LocationInfo::EMPTY));
        let one = Arc::new(FunctionOverload::new(vec![Parameter::positional("a")]));
        one.set_return_value(Member::Instance(Instance::detached(Ty::Class(
            base.clone(),
        ))));
        func.add_overload(one);
        func.add_overload(Arc::new(FunctionOverload::new(vec![
            Parameter::positional("a"),
            Parameter::positional("b"),
        ])));

        for (name, member) in [
            ("Base", Member::Ty(Ty::Class(base))),
            ("Derived", Member::Ty(Ty::Class(derived))),
            ("make", Member::Ty(Ty::Function(func))),
            ("count", builtin_instance("int", LocationInfo::EMPTY)),
        ] {
            analysis.global_scope.bind(Arc::new(Variable::new(
                name,
                member,
                VariableSource::Declaration,
                LocationInfo::EMPTY,
            )));
        }
        analysis
    }

    #[test]
    fn test_persist_then_restore_round_trip() {
        let analysis = sample_analysis();
        let model = ModuleModel::from_analysis(&analysis);

        // through the serialized form, as the cache would do
        let json = serde_json::to_string(&model).unwrap();
        let model: ModuleModel = serde_json::from_str(&json).unwrap();

        let restored = model.declare().finalize(&EmptyModuleFactory);

        let mut expected = analysis.public_names();
        let mut actual = restored.public_names();
        expected.sort();
        actual.sort();
        assert_eq!(expected, actual);

        // class bases by qualified name
        let derived = restored.get("Derived").unwrap().value();
        let Ty::Class(derived) = derived.ty() else {
            panic!("Derived must restore as a class");
        };
        let bases: Vec<_> = derived.bases().iter().filter_map(qualified_name).collect();
        assert_eq!(bases, vec!["sample.Base"]);

        // overload arities and static return qualified names
        let make = restored.get("make").unwrap().value();
        let Ty::Function(make) = make.ty() else {
            panic!("make must restore as a function");
        };
        let arities: Vec<_> = make
            .overloads()
            .iter()
            .map(|o| o.parameters.len())
            .collect();
        assert_eq!(arities, vec![1, 2]);
        let ret = make.overloads()[0].return_value().unwrap();
        assert_eq!(qualified_name(ret.ty()).as_deref(), Some("sample.Base"));

        // plain variable restores with its builtin type
        let count = restored.get("count").unwrap().value();
        assert_eq!(qualified_name(count.ty()).as_deref(), Some("builtins.int"));
    }

    #[test]
    fn test_unresolvable_reference_degrades_to_unknown() {
        let model = ModuleModel {
            name: "m".into(),
            file_path: "m.py".into(),
            doc: None,
            all: None,
            classes: vec![],
            functions: vec![],
            named_tuples: vec![],
            type_vars: vec![],
            variables: vec![VariableModel {
                name: "x".into(),
                ty: Some("gone.Type".into()),
                source: VariableSource::Declaration,
                span: IndexSpanModel::default(),
            }],
        };
        let restored = model.declare().finalize(&EmptyModuleFactory);
        assert!(restored.get("x").unwrap().value().is_unknown());
    }
}
