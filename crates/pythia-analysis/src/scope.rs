//! Scopes, variables, and the published per-module analysis.

use core::fmt;
use std::sync::Arc;

use ecow::{EcoString, EcoVec};
use parking_lot::RwLock;
use pythia_std::hash::{FxHashSet, FxIndexMap};
use pythia_std::loc::LocationInfo;
use serde::{Deserialize, Serialize};

use crate::diag::Diagnostic;
use crate::ty::{LocatedMember, Member, Ty};

/// Where a variable binding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableSource {
    /// Bound by an assignment or definition in the module.
    Declaration,
    /// Bound by an import statement.
    Import,
    /// Provided by the builtins module.
    Builtin,
    /// Introduced by a generic parameter.
    Generic,
}

/// A named binding in a scope.
#[derive(Debug)]
pub struct Variable {
    /// The bound name.
    pub name: EcoString,
    /// Where the binding came from.
    pub source: VariableSource,
    /// Where the binding was introduced.
    pub location: LocationInfo,
    value: RwLock<Member>,
    references: RwLock<Vec<LocationInfo>>,
}

impl Variable {
    /// Creates a variable bound to `value`.
    pub fn new(
        name: impl Into<EcoString>,
        value: Member,
        source: VariableSource,
        location: LocationInfo,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            location,
            value: RwLock::new(value),
            references: RwLock::new(Vec::new()),
        }
    }

    /// The current bound value.
    pub fn value(&self) -> Member {
        self.value.read().clone()
    }

    /// Rebinds the variable.
    pub fn assign(&self, value: Member) {
        *self.value.write() = value;
    }
}

impl LocatedMember for Variable {
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

/// A name → variable table, preserving declaration order.
#[derive(Debug, Default)]
pub struct Scope {
    variables: FxIndexMap<EcoString, Arc<Variable>>,
}

impl Scope {
    /// Creates an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds (or rebinds) a name.
    pub fn bind(&mut self, variable: Arc<Variable>) {
        self.variables.insert(variable.name.clone(), variable);
    }

    /// Looks up a name.
    pub fn get(&self, name: &str) -> Option<&Arc<Variable>> {
        self.variables.get(name)
    }

    /// Unbinds a name, preserving the order of the remaining bindings.
    pub fn remove(&mut self, name: &str) -> Option<Arc<Variable>> {
        self.variables.shift_remove(name)
    }

    /// Whether the scope binds the name.
    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// The bindings, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&EcoString, &Arc<Variable>)> {
        self.variables.iter()
    }

    /// The number of bindings.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether the scope is empty.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// The published, immutable analysis of one module version.
///
/// Once released, an analysis is never mutated; subsequent edits build a new
/// analysis and replace the published value atomically. The only interior
/// mutability is the append-only reference lists of the members it holds.
#[derive(Debug)]
pub struct ModuleAnalysis {
    /// The dotted module name.
    pub module_name: EcoString,
    /// The path of the analyzed file.
    pub file_path: EcoString,
    /// The document version the analysis was computed against.
    pub version: u32,
    /// The module-level bindings.
    pub global_scope: Scope,
    /// The `__all__` export list, when declared.
    pub all: Option<Vec<EcoString>>,
    /// The module docstring, when present.
    pub doc: Option<EcoString>,
    /// The dotted names of the modules this analysis depends on.
    pub dependencies: FxHashSet<EcoString>,
    /// The diagnostics produced by the analysis walk.
    pub diagnostics: EcoVec<Diagnostic>,
    /// When the analysis was produced from a stub, the dotted name of the
    /// implementation module it covers.
    pub primary_module: Option<EcoString>,
}

impl ModuleAnalysis {
    /// An empty analysis for a module that has not been walked yet.
    pub fn empty(module_name: impl Into<EcoString>, file_path: impl Into<EcoString>) -> Self {
        Self {
            module_name: module_name.into(),
            file_path: file_path.into(),
            version: 0,
            global_scope: Scope::new(),
            all: None,
            doc: None,
            dependencies: FxHashSet::default(),
            diagnostics: EcoVec::new(),
            primary_module: None,
        }
    }

    /// The publicly visible binding names, honoring `__all__` when declared.
    pub fn public_names(&self) -> Vec<EcoString> {
        match &self.all {
            Some(all) => all.clone(),
            None => self
                .global_scope
                .iter()
                .filter(|(name, _)| !name.starts_with('_'))
                .map(|(name, _)| name.clone())
                .collect(),
        }
    }

    /// Looks up a module-level binding.
    pub fn get(&self, name: &str) -> Option<&Arc<Variable>> {
        self.global_scope.get(name)
    }

    /// Scrubs every reference recorded from the given file, across all
    /// members of the module.
    pub fn remove_references_from(&self, file_path: &str) {
        for (_, variable) in self.global_scope.iter() {
            variable.remove_references(file_path);
            match variable.value().ty() {
                Ty::Class(class) => {
                    class.remove_references(file_path);
                    for (_, member) in class.own_members() {
                        if let Ty::Function(func) = member.ty() {
                            func.remove_references(file_path);
                        }
                    }
                }
                Ty::Function(func) => func.remove_references(file_path),
                Ty::NamedTuple(nt) => nt.remove_references(file_path),
                _ => {}
            }
        }
    }
}

impl fmt::Display for ModuleAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "analysis of {} v{} ({} globals)",
            self.module_name,
            self.version,
            self.global_scope.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::builtin_instance;

    #[test]
    fn test_scope_preserves_declaration_order() {
        let mut scope = Scope::new();
        for name in ["b", "a", "c"] {
            scope.bind(Arc::new(Variable::new(
                name,
                builtin_instance("int", LocationInfo::EMPTY),
                VariableSource::Declaration,
                LocationInfo::EMPTY,
            )));
        }
        let names: Vec<_> = scope.iter().map(|(n, _)| n.as_str().to_owned()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_public_names_respect_all() {
        let mut analysis = ModuleAnalysis::empty("m", "m.py");
        for name in ["visible", "_hidden", "exported"] {
            analysis.global_scope.bind(Arc::new(Variable::new(
                name,
                Member::unknown(),
                VariableSource::Declaration,
                LocationInfo::EMPTY,
            )));
        }
        assert_eq!(analysis.public_names(), vec!["visible", "exported"]);

        analysis.all = Some(vec!["_hidden".into()]);
        assert_eq!(analysis.public_names(), vec!["_hidden"]);
    }
}
