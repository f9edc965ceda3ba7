//! Functions, overloads, parameters, and properties.

use std::sync::Arc;

use ecow::{EcoString, EcoVec};
use parking_lot::RwLock;
use pythia_std::loc::LocationInfo;
use serde::{Deserialize, Serialize};

use super::def::{CallArgs, Instance, LocatedMember, Member, Ty, TypeId, next_type_id};

/// The binding kind of a parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// A regular positional-or-keyword parameter.
    #[default]
    Positional,
    /// A keyword-only parameter (after `*`).
    KeywordOnly,
    /// A `*args` parameter.
    VarPositional,
    /// A `**kwargs` parameter.
    VarKeyword,
}

/// A declared parameter of one overload.
#[derive(Debug, Clone, Default)]
pub struct Parameter {
    /// The declared name.
    pub name: EcoString,
    /// The annotated type, when present.
    pub ty: Option<Ty>,
    /// The string form of the default value, when present.
    pub default_value: Option<EcoString>,
    /// The type of the default value, when it could be determined.
    pub default_value_ty: Option<Ty>,
    /// The binding kind.
    pub kind: ParameterKind,
}

impl Parameter {
    /// Creates a positional parameter with no annotation.
    pub fn positional(name: impl Into<EcoString>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// One declared signature of a function.
#[derive(Debug)]
pub struct FunctionOverload {
    /// The declared parameters, in order.
    pub parameters: Vec<Parameter>,
    /// The documentation string, when present.
    pub doc: Option<EcoString>,
    return_value: RwLock<Option<Member>>,
}

impl FunctionOverload {
    /// Creates an overload with the given parameters.
    pub fn new(parameters: Vec<Parameter>) -> Self {
        Self {
            parameters,
            doc: None,
            return_value: RwLock::new(None),
        }
    }

    /// Creates an overload with parameters and documentation.
    pub fn with_doc(parameters: Vec<Parameter>, doc: Option<EcoString>) -> Self {
        Self {
            parameters,
            doc,
            return_value: RwLock::new(None),
        }
    }

    /// The statically determined return value, when known.
    pub fn return_value(&self) -> Option<Member> {
        self.return_value.read().clone()
    }

    /// Records the statically determined return value.
    pub fn set_return_value(&self, value: Member) {
        *self.return_value.write() = Some(value);
    }

    /// The number of parameters a call can address positionally.
    pub fn positional_arity(&self) -> usize {
        self.parameters
            .iter()
            .filter(|p| matches!(p.kind, ParameterKind::Positional))
            .count()
    }
}

/// Behaviour flags of a function.
#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionFlags {
    /// Declared with `@staticmethod`.
    pub is_static: bool,
    /// Declared with `@classmethod`.
    pub is_class_method: bool,
    /// Declared in a stub file.
    pub is_stub: bool,
    /// Declared with `@overload`.
    pub is_overload: bool,
    /// Replaced by a specialized implementation.
    pub is_specialized: bool,
}

/// A function (or method) with one or more overloads.
pub struct FunctionTy {
    /// The declared name.
    pub name: EcoString,
    /// The dotted name of the declaring module.
    pub declaring_module: EcoString,
    /// The process-unique id.
    pub type_id: TypeId,
    /// Whether the function comes from the builtins module.
    pub is_builtin: bool,
    /// Where the function was declared.
    pub location: LocationInfo,
    flags: RwLock<FunctionFlags>,
    overloads: RwLock<EcoVec<Arc<FunctionOverload>>>,
    doc: RwLock<Option<EcoString>>,
    references: RwLock<Vec<LocationInfo>>,
}

impl FunctionTy {
    /// Creates a function with no overloads.
    pub fn new(
        name: impl Into<EcoString>,
        declaring_module: impl Into<EcoString>,
        location: LocationInfo,
    ) -> Self {
        Self {
            name: name.into(),
            declaring_module: declaring_module.into(),
            type_id: next_type_id(),
            is_builtin: false,
            location,
            flags: RwLock::new(FunctionFlags::default()),
            overloads: RwLock::new(EcoVec::new()),
            doc: RwLock::new(None),
            references: RwLock::new(Vec::new()),
        }
    }

    /// The recorded documentation string, falling back to the first
    /// overload's documentation.
    pub fn doc(&self) -> Option<EcoString> {
        self.doc
            .read()
            .clone()
            .or_else(|| self.overloads.read().first().and_then(|o| o.doc.clone()))
    }

    /// Records the documentation string.
    pub fn set_doc(&self, doc: impl Into<EcoString>) {
        *self.doc.write() = Some(doc.into());
    }

    /// The current behaviour flags.
    pub fn flags(&self) -> FunctionFlags {
        *self.flags.read()
    }

    /// Updates the behaviour flags.
    pub fn update_flags(&self, f: impl FnOnce(&mut FunctionFlags)) {
        f(&mut self.flags.write());
    }

    /// The overloads, in declaration order.
    pub fn overloads(&self) -> EcoVec<Arc<FunctionOverload>> {
        self.overloads.read().clone()
    }

    /// Appends an overload.
    pub fn add_overload(&self, overload: Arc<FunctionOverload>) {
        self.overloads.write().push(overload);
    }

    /// Replaces all overloads.
    pub fn set_overloads(&self, overloads: impl IntoIterator<Item = Arc<FunctionOverload>>) {
        *self.overloads.write() = overloads.into_iter().collect();
    }

    /// Selects the overload for a call with the given positional arity.
    ///
    /// The first overload whose parameter count matches wins; when none
    /// matches, the first declared overload is used.
    pub fn select_overload(&self, arity: usize) -> Option<Arc<FunctionOverload>> {
        let overloads = self.overloads.read();
        overloads
            .iter()
            .find(|o| o.parameters.len() == arity)
            .or_else(|| overloads.first())
            .cloned()
    }

    /// Invokes the function, yielding its statically known return value.
    pub fn invoke(&self, _instance: Option<&Instance>, args: &CallArgs) -> Member {
        match self.select_overload(args.args.len()) {
            Some(overload) => overload.return_value().unwrap_or_else(Member::unknown),
            None => Member::unknown(),
        }
    }
}

// A recorded return value may reference the function itself, so the derived
// Debug would recurse.
impl std::fmt::Debug for FunctionTy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTy")
            .field("name", &self.name)
            .field("declaring_module", &self.declaring_module)
            .field("type_id", &self.type_id)
            .field("overloads", &self.overloads.read().len())
            .finish()
    }
}

impl LocatedMember for FunctionTy {
    fn location(&self) -> &LocationInfo {
        &self.location
    }

    fn add_reference(&self, location: LocationInfo) {
        self.references.write().push(location);
    }

    fn references(&self) -> Vec<LocationInfo> {
        self.references.read().clone()
    }

    fn remove_references(&self, file_path: &str) {
        self.references
            .write()
            .retain(|loc| loc.file_path != file_path);
    }
}

/// A property: a getter exposed as an attribute.
#[derive(Debug)]
pub struct PropertyTy {
    /// The declared name.
    pub name: EcoString,
    /// The dotted name of the declaring module.
    pub declaring_module: EcoString,
    /// The process-unique id.
    pub type_id: TypeId,
    /// Where the property was declared.
    pub location: LocationInfo,
    getter: RwLock<Option<Member>>,
    doc: RwLock<Option<EcoString>>,
    references: RwLock<Vec<LocationInfo>>,
}

impl PropertyTy {
    /// Creates a property with no recorded getter value.
    pub fn new(
        name: impl Into<EcoString>,
        declaring_module: impl Into<EcoString>,
        location: LocationInfo,
    ) -> Self {
        Self {
            name: name.into(),
            declaring_module: declaring_module.into(),
            type_id: next_type_id(),
            location,
            getter: RwLock::new(None),
            doc: RwLock::new(None),
            references: RwLock::new(Vec::new()),
        }
    }

    /// The value produced by reading the property, when known.
    pub fn getter(&self) -> Option<Member> {
        self.getter.read().clone()
    }

    /// Records the value produced by reading the property.
    pub fn set_getter(&self, value: Member) {
        *self.getter.write() = Some(value);
    }

    /// The recorded documentation string.
    pub fn doc(&self) -> Option<EcoString> {
        self.doc.read().clone()
    }

    /// Records the documentation string.
    pub fn set_doc(&self, doc: impl Into<EcoString>) {
        *self.doc.write() = Some(doc.into());
    }
}

impl LocatedMember for PropertyTy {
    fn location(&self) -> &LocationInfo {
        &self.location
    }

    fn add_reference(&self, location: LocationInfo) {
        self.references.write().push(location);
    }

    fn references(&self) -> Vec<LocationInfo> {
        self.references.read().clone()
    }

    fn remove_references(&self, file_path: &str) {
        self.references
            .write()
            .retain(|loc| loc.file_path != file_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overload_with_params(n: usize) -> Arc<FunctionOverload> {
        let params = (0..n)
            .map(|i| Parameter::positional(format!("p{i}")))
            .collect();
        Arc::new(FunctionOverload::new(params))
    }

    #[test]
    fn test_overload_selection_by_arity() {
        let func = FunctionTy::new("f", "m", LocationInfo::EMPTY);
        func.add_overload(overload_with_params(1));
        func.add_overload(overload_with_params(2));

        assert_eq!(func.select_overload(2).unwrap().parameters.len(), 2);
        assert_eq!(func.select_overload(1).unwrap().parameters.len(), 1);
        // no match: first declared wins
        assert_eq!(func.select_overload(7).unwrap().parameters.len(), 1);
    }

    #[test]
    fn test_invoke_returns_static_value() {
        let func = FunctionTy::new("f", "m", LocationInfo::EMPTY);
        let overload = overload_with_params(0);
        overload.set_return_value(Member::Ty(Ty::Unknown));
        func.add_overload(overload);

        assert!(func.invoke(None, &CallArgs::none()).is_unknown());
    }
}
