//! Classes: bases, MRO, generic parameters, and member tables.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ecow::{EcoString, EcoVec};
use parking_lot::RwLock;
use pythia_std::hash::FxHashMap;
use pythia_std::loc::LocationInfo;

use super::def::{
    CallArgs, Instance, LocatedMember, Member, Ty, TypeId, TypeVarTy, next_type_id,
};
use super::mro::linearize;

/// A class in the semantic model.
pub struct ClassTy {
    /// The declared name.
    pub name: EcoString,
    /// The dotted name of the declaring module.
    pub declaring_module: EcoString,
    /// The process-unique id.
    pub type_id: TypeId,
    /// Whether the class comes from the builtins module.
    pub is_builtin: bool,
    /// Where the class was declared.
    pub location: LocationInfo,
    doc: RwLock<Option<EcoString>>,
    is_abstract: AtomicBool,
    bases: RwLock<EcoVec<Ty>>,
    /// Synthetic named-tuple bases, kept out of the MRO.
    named_tuple_bases: RwLock<EcoVec<Ty>>,
    mro: RwLock<EcoVec<Ty>>,
    members: RwLock<FxHashMap<EcoString, Member>>,
    generic_params: RwLock<EcoVec<Arc<TypeVarTy>>>,
    generic_bindings: RwLock<FxHashMap<EcoString, Ty>>,
    references: RwLock<Vec<LocationInfo>>,
}

impl ClassTy {
    /// Creates a class with no bases and no members.
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
            doc: RwLock::new(None),
            is_abstract: AtomicBool::new(false),
            bases: RwLock::new(EcoVec::new()),
            named_tuple_bases: RwLock::new(EcoVec::new()),
            mro: RwLock::new(EcoVec::new()),
            members: RwLock::new(FxHashMap::default()),
            generic_params: RwLock::new(EcoVec::new()),
            generic_bindings: RwLock::new(FxHashMap::default()),
            references: RwLock::new(Vec::new()),
        }
    }

    /// Creates a builtin class.
    pub fn builtin(name: impl Into<EcoString>) -> Self {
        let mut class = Self::new(name, "builtins", LocationInfo::EMPTY);
        class.is_builtin = true;
        class
    }

    /// The recorded documentation string.
    pub fn doc(&self) -> Option<EcoString> {
        self.doc.read().clone()
    }

    /// Records the documentation string.
    pub fn set_doc(&self, doc: impl Into<EcoString>) {
        *self.doc.write() = Some(doc.into());
    }

    /// Whether the class was marked abstract.
    pub fn is_abstract(&self) -> bool {
        self.is_abstract.load(Ordering::Relaxed)
    }

    /// Marks the class abstract.
    pub fn set_abstract(&self) {
        self.is_abstract.store(true, Ordering::Relaxed);
    }

    /// The declared bases, in declaration order.
    pub fn bases(&self) -> EcoVec<Ty> {
        self.bases.read().clone()
    }

    /// The synthetic named-tuple bases, recorded separately from the MRO.
    pub fn named_tuple_bases(&self) -> EcoVec<Ty> {
        self.named_tuple_bases.read().clone()
    }

    /// Sets the bases and recomputes the MRO.
    ///
    /// Named-tuple bases are recorded separately and excluded from the
    /// linearization.
    pub fn set_bases(self: &Arc<Self>, bases: impl IntoIterator<Item = Ty>) {
        let (named_tuple, regular): (EcoVec<Ty>, EcoVec<Ty>) = {
            let mut named_tuple = EcoVec::new();
            let mut regular = EcoVec::new();
            for base in bases {
                match base {
                    Ty::NamedTuple(_) => named_tuple.push(base),
                    _ => regular.push(base),
                }
            }
            (named_tuple, regular)
        };
        *self.bases.write() = regular;
        *self.named_tuple_bases.write() = named_tuple;
        let mro = linearize(self);
        *self.mro.write() = mro;
    }

    /// The C3 linearization of the class, starting with the class itself.
    ///
    /// Empty until [`ClassTy::set_bases`] has run.
    pub fn mro(&self) -> EcoVec<Ty> {
        self.mro.read().clone()
    }

    /// Adds or replaces an own member.
    pub fn add_member(&self, name: impl Into<EcoString>, member: Member) {
        self.members.write().insert(name.into(), member);
    }

    /// The own members, unordered.
    pub fn own_members(&self) -> Vec<(EcoString, Member)> {
        self.members
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Looks up a member along the MRO: own members first, then each base in
    /// linearization order, then the named-tuple bases.
    pub fn get_member(&self, name: &str) -> Option<Member> {
        if let Some(member) = self.members.read().get(name) {
            return Some(member.clone());
        }
        for base in self.mro.read().iter().skip(1) {
            if let Some(member) = base.get_member(name) {
                return Some(member);
            }
        }
        for base in self.named_tuple_bases.read().iter() {
            if let Some(member) = base.get_member(name) {
                return Some(member);
            }
        }
        None
    }

    /// The declared generic parameters, from `Generic[...]` bases.
    pub fn generic_params(&self) -> EcoVec<Arc<TypeVarTy>> {
        self.generic_params.read().clone()
    }

    /// Records the generic parameters.
    pub fn set_generic_params(&self, params: impl IntoIterator<Item = Arc<TypeVarTy>>) {
        *self.generic_params.write() = params.into_iter().collect();
    }

    /// The generic bindings captured at instantiation.
    pub fn generic_binding(&self, name: &str) -> Option<Ty> {
        self.generic_bindings.read().get(name).cloned()
    }

    /// Binds a generic parameter name to a concrete type.
    pub fn bind_generic(&self, name: impl Into<EcoString>, ty: Ty) {
        self.generic_bindings.write().insert(name.into(), ty);
    }

    /// Constructs an instance. Generic parameters bind from the constructor
    /// arguments, positionally.
    pub fn create_instance(self: &Arc<Self>, args: &CallArgs) -> Instance {
        let params = self.generic_params.read();
        if !params.is_empty() {
            for (param, arg) in params.iter().zip(args.args.iter()) {
                self.generic_bindings
                    .write()
                    .insert(param.name.clone(), arg.ty().clone());
            }
        }
        drop(params);
        Instance::detached(Ty::Class(self.clone()))
    }

    /// Evaluates a subscript on an instance through `__getitem__`.
    pub fn index(&self, _instance: &Instance, args: &CallArgs) -> Member {
        match self.get_member("__getitem__") {
            Some(member) => match member.ty() {
                Ty::Function(func) => func.invoke(None, args),
                _ => Member::unknown(),
            },
            None => Member::unknown(),
        }
    }
}

// The MRO of a class contains the class itself, so the derived Debug would
// recurse forever.
impl std::fmt::Debug for ClassTy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassTy")
            .field("name", &self.name)
            .field("declaring_module", &self.declaring_module)
            .field("type_id", &self.type_id)
            .field("members", &self.members.read().len())
            .finish()
    }
}

impl LocatedMember for ClassTy {
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
