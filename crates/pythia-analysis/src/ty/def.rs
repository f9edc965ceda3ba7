//! The `Ty` contract: one enum over shared variant payloads, with the
//! capability surface (members, instantiation, calls, indexing) dispatched
//! per variant.

use core::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ecow::EcoString;
use pythia_std::loc::LocationInfo;

use super::class::ClassTy;
use super::collection::CollectionTy;
use super::func::{FunctionTy, PropertyTy};

/// A process-unique identifier of a type.
pub type TypeId = u64;

static NEXT_TYPE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a fresh [`TypeId`].
pub fn next_type_id() -> TypeId {
    NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed)
}

/// A type in the semantic model.
///
/// Cheap to clone; all variant payloads are shared. A `Ty` never owns the
/// module that declared it: back references are dotted module names resolved
/// through the document table.
#[derive(Debug, Clone, Default)]
pub enum Ty {
    /// A type that could not be determined.
    #[default]
    Unknown,
    /// A reference to a module, by dotted name.
    Module(EcoString),
    /// A class.
    Class(Arc<ClassTy>),
    /// A function, possibly with several overloads.
    Function(Arc<FunctionTy>),
    /// A property.
    Property(Arc<PropertyTy>),
    /// A concrete collection (list, set, tuple, dict, iterator, ...).
    Collection(Arc<CollectionTy>),
    /// A named tuple.
    NamedTuple(Arc<NamedTupleTy>),
    /// A type variable introduced by `TypeVar(...)`.
    TypeVar(Arc<TypeVarTy>),
}

/// A value bound to a name: either a type object itself or an instance of a
/// type.
#[derive(Debug, Clone)]
pub enum Member {
    /// The type object (e.g. the class `int`).
    Ty(Ty),
    /// An instance of a type (e.g. the value `1`).
    Instance(Instance),
}

impl Member {
    /// The type carried by the member.
    pub fn ty(&self) -> &Ty {
        match self {
            Member::Ty(ty) => ty,
            Member::Instance(inst) => &inst.ty,
        }
    }

    /// A member of unknown type.
    pub fn unknown() -> Member {
        Member::Ty(Ty::Unknown)
    }

    /// Whether the member's type is unknown.
    pub fn is_unknown(&self) -> bool {
        self.ty().is_unknown()
    }
}

/// An instance of a type at a location.
#[derive(Debug, Clone)]
pub struct Instance {
    /// The instantiated type.
    pub ty: Ty,
    /// Where the instance was created.
    pub location: LocationInfo,
    /// The static string form of the value, when it is a literal.
    pub repr: Option<EcoString>,
}

impl Instance {
    /// Creates an instance of `ty` at `location`.
    pub fn new(ty: Ty, location: LocationInfo) -> Self {
        Self {
            ty,
            location,
            repr: None,
        }
    }

    /// Creates a detached instance of `ty`.
    pub fn detached(ty: Ty) -> Self {
        Self {
            ty,
            location: LocationInfo::EMPTY,
            repr: None,
        }
    }

    /// Creates an instance of `ty` carrying the literal text it came from.
    pub fn literal(ty: Ty, location: LocationInfo, repr: impl Into<EcoString>) -> Self {
        Self {
            ty,
            location,
            repr: Some(repr.into()),
        }
    }
}

/// The evaluated arguments of a call or subscript.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    /// The positional argument values, in order.
    pub args: Vec<Member>,
    /// When the single argument is a literal sequence, the values of its
    /// elements.
    pub list_values: Vec<Member>,
}

impl CallArgs {
    /// No arguments.
    pub fn none() -> Self {
        Self::default()
    }

    /// Positional arguments only.
    pub fn positional(args: Vec<Member>) -> Self {
        Self {
            args,
            list_values: Vec::new(),
        }
    }
}

/// The failure modes of [`Ty::call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallError {
    /// The member exists but is not callable.
    NotCallable,
    /// No member with the requested name exists.
    NotFound,
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::NotCallable => write!(f, "member is not callable"),
            CallError::NotFound => write!(f, "member not found"),
        }
    }
}

/// A named tuple: a class-like record with ordered fields.
#[derive(Debug)]
pub struct NamedTupleTy {
    /// The declared name.
    pub name: EcoString,
    /// The dotted name of the declaring module.
    pub declaring_module: EcoString,
    /// The process-unique id.
    pub type_id: TypeId,
    /// The ordered `(name, type)` field pairs.
    pub fields: parking_lot::RwLock<Vec<(EcoString, Ty)>>,
    /// Where the named tuple was declared.
    pub location: LocationInfo,
    references: parking_lot::RwLock<Vec<LocationInfo>>,
}

impl NamedTupleTy {
    /// Creates an empty named tuple type.
    pub fn new(name: EcoString, declaring_module: EcoString, location: LocationInfo) -> Self {
        Self {
            name,
            declaring_module,
            type_id: next_type_id(),
            fields: parking_lot::RwLock::new(Vec::new()),
            location,
            references: parking_lot::RwLock::new(Vec::new()),
        }
    }

    /// The field with the given name.
    pub fn field(&self, name: &str) -> Option<Ty> {
        self.fields
            .read()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ty)| ty.clone())
    }

    /// The field at the given position.
    pub fn field_at(&self, index: usize) -> Option<Ty> {
        self.fields.read().get(index).map(|(_, ty)| ty.clone())
    }
}

/// The declared variance of a type variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Variance {
    /// Neither covariant nor contravariant.
    #[default]
    Invariant,
    /// Declared with `covariant=True`.
    Covariant,
    /// Declared with `contravariant=True`.
    Contravariant,
}

/// A type variable.
#[derive(Debug)]
pub struct TypeVarTy {
    /// The declared name.
    pub name: EcoString,
    /// The dotted name of the declaring module.
    pub declaring_module: EcoString,
    /// The process-unique id.
    pub type_id: TypeId,
    /// The constraint types, if any.
    pub constraints: Vec<Ty>,
    /// The declared bound, if any.
    pub bound: Option<Ty>,
    /// The declared variance.
    pub variance: Variance,
    /// Where the type variable was declared.
    pub location: LocationInfo,
}

impl TypeVarTy {
    /// Creates an unconstrained, invariant type variable.
    pub fn new(name: EcoString, declaring_module: EcoString, location: LocationInfo) -> Self {
        Self {
            name,
            declaring_module,
            type_id: next_type_id(),
            constraints: Vec::new(),
            bound: None,
            variance: Variance::Invariant,
            location,
        }
    }
}

/// A member carrying a location and a reference list.
///
/// Reference lists are append-only; readers may observe an in-flight append
/// but never a torn write.
pub trait LocatedMember {
    /// Where the member was declared.
    fn location(&self) -> &LocationInfo;

    /// Records a use of the member.
    fn add_reference(&self, location: LocationInfo);

    /// Snapshots the recorded uses.
    fn references(&self) -> Vec<LocationInfo>;

    /// Forgets every use recorded from the given file.
    fn remove_references(&self, file_path: &str);
}

impl LocatedMember for NamedTupleTy {
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

impl Ty {
    /// The display name of the type.
    pub fn name(&self) -> EcoString {
        match self {
            Ty::Unknown => "Unknown".into(),
            Ty::Module(name) => name.clone(),
            Ty::Class(class) => class.name.clone(),
            Ty::Function(func) => func.name.clone(),
            Ty::Property(prop) => prop.name.clone(),
            Ty::Collection(coll) => coll.name(),
            Ty::NamedTuple(nt) => nt.name.clone(),
            Ty::TypeVar(tv) => tv.name.clone(),
        }
    }

    /// The dotted name of the module declaring the type, when known.
    pub fn declaring_module(&self) -> Option<EcoString> {
        match self {
            Ty::Unknown => None,
            Ty::Module(name) => Some(name.clone()),
            Ty::Class(class) => Some(class.declaring_module.clone()),
            Ty::Function(func) => Some(func.declaring_module.clone()),
            Ty::Property(prop) => Some(prop.declaring_module.clone()),
            Ty::Collection(_) => Some("builtins".into()),
            Ty::NamedTuple(nt) => Some(nt.declaring_module.clone()),
            Ty::TypeVar(tv) => Some(tv.declaring_module.clone()),
        }
    }

    /// The process-unique id, when the variant carries one.
    pub fn type_id(&self) -> Option<TypeId> {
        match self {
            Ty::Unknown | Ty::Module(_) => None,
            Ty::Class(class) => Some(class.type_id),
            Ty::Function(func) => Some(func.type_id),
            Ty::Property(prop) => Some(prop.type_id),
            Ty::Collection(coll) => Some(coll.type_id),
            Ty::NamedTuple(nt) => Some(nt.type_id),
            Ty::TypeVar(tv) => Some(tv.type_id),
        }
    }

    /// The documentation string, when one was recorded.
    pub fn doc(&self) -> Option<EcoString> {
        match self {
            Ty::Class(class) => class.doc(),
            Ty::Function(func) => func.doc(),
            Ty::Property(prop) => prop.doc(),
            _ => None,
        }
    }

    /// Whether the type comes from the builtins module.
    pub fn is_builtin(&self) -> bool {
        match self {
            Ty::Class(class) => class.is_builtin,
            Ty::Function(func) => func.is_builtin,
            Ty::Collection(_) => true,
            _ => false,
        }
    }

    /// Whether the type is an abstract class.
    pub fn is_abstract(&self) -> bool {
        match self {
            Ty::Class(class) => class.is_abstract(),
            _ => false,
        }
    }

    /// Whether the type is [`Ty::Unknown`].
    pub fn is_unknown(&self) -> bool {
        matches!(self, Ty::Unknown)
    }

    /// Looks up a member by name.
    ///
    /// On classes the lookup is MRO-aware. On collections, `__iter__`
    /// returns the iterator type directly rather than a bound method.
    pub fn get_member(&self, name: &str) -> Option<Member> {
        match self {
            Ty::Class(class) => class.get_member(name),
            Ty::Collection(coll) => coll.get_member(name),
            Ty::NamedTuple(nt) => nt.field(name).map(|ty| {
                Member::Instance(Instance::detached(ty))
            }),
            Ty::Property(prop) => match name {
                "fget" => prop.getter(),
                _ => None,
            },
            _ => None,
        }
    }

    /// Constructs an instance of the type.
    pub fn create_instance(&self, args: &CallArgs) -> Instance {
        match self {
            Ty::Class(class) => class.create_instance(args),
            Ty::Collection(coll) => coll.create_instance(args),
            Ty::NamedTuple(_) => Instance::detached(self.clone()),
            _ => Instance::detached(self.clone()),
        }
    }

    /// Calls the named member of the type.
    pub fn call(
        &self,
        instance: Option<&Instance>,
        member_name: &str,
        args: &CallArgs,
    ) -> Result<Member, CallError> {
        let member = self.get_member(member_name).ok_or(CallError::NotFound)?;
        match member.ty() {
            Ty::Function(func) => Ok(func.invoke(instance, args)),
            Ty::Property(prop) => Ok(prop.getter().unwrap_or_else(Member::unknown)),
            Ty::Class(class) => Ok(Member::Instance(class.create_instance(args))),
            Ty::Unknown => Ok(Member::unknown()),
            _ => Err(CallError::NotCallable),
        }
    }

    /// Evaluates a subscript on an instance of the type.
    pub fn index(&self, instance: &Instance, args: &CallArgs) -> Member {
        match self {
            Ty::Collection(coll) => coll.index(args),
            Ty::NamedTuple(nt) => match index_argument(args) {
                Some(idx) => {
                    let len = nt.fields.read().len();
                    resolve_index(idx, len)
                        .and_then(|i| nt.field_at(i))
                        .map(|ty| Member::Instance(Instance::detached(ty)))
                        .unwrap_or_else(Member::unknown)
                }
                None => Member::unknown(),
            },
            Ty::Class(class) => class.index(instance, args),
            _ => Member::unknown(),
        }
    }
}

/// The literal integer value of a one-argument subscript, when known.
pub(crate) fn index_argument(args: &CallArgs) -> Option<i64> {
    match args.args.first() {
        Some(Member::Instance(inst)) => {
            inst.repr.as_deref().and_then(|repr| repr.parse::<i64>().ok())
        }
        _ => None,
    }
}

/// Maps a possibly negative index onto `0..len`.
pub(crate) fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let resolved = if index < 0 { len + index } else { index };
    (0..len).contains(&resolved).then_some(resolved as usize)
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
