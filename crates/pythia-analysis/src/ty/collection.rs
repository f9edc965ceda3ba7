//! Concrete collection types and their iterator/indexing behaviour.

use std::sync::Arc;

use ecow::{EcoString, EcoVec};
use parking_lot::RwLock;

use super::def::{
    CallArgs, Instance, Member, Ty, TypeId, index_argument, next_type_id, resolve_index,
};

/// The concrete kind of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum CollectionKind {
    /// A `list` literal or constructor result.
    List,
    /// A `set`.
    Set,
    /// A `frozenset`.
    FrozenSet,
    /// A `tuple`.
    Tuple,
    /// A `dict`.
    Dict,
    /// An iterator over some content type.
    Iterator,
    /// A generic indexable sequence.
    Sequence,
}

impl CollectionKind {
    /// The Python-visible type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            CollectionKind::List => "list",
            CollectionKind::Set => "set",
            CollectionKind::FrozenSet => "frozenset",
            CollectionKind::Tuple => "tuple",
            CollectionKind::Dict => "dict",
            CollectionKind::Iterator => "iterator",
            CollectionKind::Sequence => "sequence",
        }
    }

    /// Whether instances can be mutated in place.
    pub fn is_mutable(&self) -> bool {
        matches!(
            self,
            CollectionKind::List | CollectionKind::Set | CollectionKind::Dict
        )
    }

    /// Whether instances support integer subscripts.
    pub fn is_indexable(&self) -> bool {
        matches!(
            self,
            CollectionKind::List | CollectionKind::Tuple | CollectionKind::Sequence
        )
    }
}

/// A concrete collection type, carrying the content types observed at its
/// creation site.
#[derive(Debug)]
pub struct CollectionTy {
    /// The concrete kind.
    pub kind: CollectionKind,
    /// The process-unique id.
    pub type_id: TypeId,
    /// The element types, in creation order. For dicts these are the value
    /// types.
    pub content_types: RwLock<EcoVec<Ty>>,
    /// The key types of a dict; empty otherwise.
    pub key_types: RwLock<EcoVec<Ty>>,
}

impl CollectionTy {
    /// Creates a collection of the given kind with the given content types.
    pub fn new(kind: CollectionKind, content_types: impl IntoIterator<Item = Ty>) -> Self {
        Self {
            kind,
            type_id: next_type_id(),
            content_types: RwLock::new(content_types.into_iter().collect()),
            key_types: RwLock::new(EcoVec::new()),
        }
    }

    /// Creates a dict with the given key and value types.
    pub fn dict(
        key_types: impl IntoIterator<Item = Ty>,
        value_types: impl IntoIterator<Item = Ty>,
    ) -> Self {
        Self {
            kind: CollectionKind::Dict,
            type_id: next_type_id(),
            content_types: RwLock::new(value_types.into_iter().collect()),
            key_types: RwLock::new(key_types.into_iter().collect()),
        }
    }

    /// The Python-visible type name.
    pub fn name(&self) -> EcoString {
        self.kind.type_name().into()
    }

    /// Whether instances can be mutated in place.
    pub fn is_mutable(&self) -> bool {
        self.kind.is_mutable()
    }

    /// The iterator type over the collection's contents.
    pub fn iterator(&self) -> Arc<CollectionTy> {
        Arc::new(CollectionTy::new(
            CollectionKind::Iterator,
            self.content_types.read().iter().cloned(),
        ))
    }

    /// Member lookup. `__iter__` yields the iterator type directly.
    pub fn get_member(&self, name: &str) -> Option<Member> {
        match name {
            "__iter__" => Some(Member::Ty(Ty::Collection(self.iterator()))),
            _ => None,
        }
    }

    /// Constructs an instance.
    ///
    /// When the first argument is itself a collection its contents are
    /// copied; otherwise the literal sequence values become the contents.
    pub fn create_instance(self: &Arc<Self>, args: &CallArgs) -> Instance {
        let contents: EcoVec<Ty> = match args.args.first().map(Member::ty) {
            Some(Ty::Collection(source)) => source.content_types.read().clone(),
            _ => args
                .list_values
                .iter()
                .map(|member| member.ty().clone())
                .collect(),
        };
        if contents.is_empty() {
            return Instance::detached(Ty::Collection(self.clone()));
        }
        Instance::detached(Ty::Collection(Arc::new(CollectionTy::new(
            self.kind, contents,
        ))))
    }

    /// Evaluates an integer subscript.
    ///
    /// Negative indices count from the end; an out-of-range or non-literal
    /// index yields [`Ty::Unknown`].
    pub fn index(&self, args: &CallArgs) -> Member {
        if self.kind == CollectionKind::Dict {
            // dict subscripts yield the (first) value type
            return self
                .content_types
                .read()
                .first()
                .map(|ty| Member::Instance(Instance::detached(ty.clone())))
                .unwrap_or_else(Member::unknown);
        }
        if !self.kind.is_indexable() {
            return Member::unknown();
        }
        let contents = self.content_types.read();
        match index_argument(args).and_then(|idx| resolve_index(idx, contents.len())) {
            Some(i) => Member::Instance(Instance::detached(contents[i].clone())),
            None => Member::unknown(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::builtin::builtin_class;

    fn int_ty() -> Ty {
        Ty::Class(builtin_class("int").unwrap())
    }

    fn str_ty() -> Ty {
        Ty::Class(builtin_class("str").unwrap())
    }

    fn literal_int(value: i64) -> Member {
        Member::Instance(Instance::literal(
            int_ty(),
            pythia_std::loc::LocationInfo::EMPTY,
            value.to_string(),
        ))
    }

    #[test]
    fn test_sequence_indexing() {
        let tuple = CollectionTy::new(CollectionKind::Tuple, vec![int_ty(), str_ty()]);

        let at = |idx: i64| tuple.index(&CallArgs::positional(vec![literal_int(idx)]));
        assert_eq!(at(0).ty().name(), "int");
        assert_eq!(at(1).ty().name(), "str");
        // negative indexing counts from the end
        assert_eq!(at(-1).ty().name(), "str");
        assert_eq!(at(-2).ty().name(), "int");
        // out of range yields Unknown
        assert!(at(2).is_unknown());
        assert!(at(-3).is_unknown());
    }

    #[test]
    fn test_iter_returns_iterator_type() {
        let list = CollectionTy::new(CollectionKind::List, vec![int_ty()]);
        let iter = list.get_member("__iter__").unwrap();
        match iter.ty() {
            Ty::Collection(coll) => {
                assert_eq!(coll.kind, CollectionKind::Iterator);
                assert_eq!(coll.content_types.read().len(), 1);
            }
            other => panic!("expected iterator type, got {other:?}"),
        }
    }

    #[test]
    fn test_create_instance_from_collection_argument() {
        let list = Arc::new(CollectionTy::new(CollectionKind::List, vec![int_ty()]));
        let set = Arc::new(CollectionTy::new(CollectionKind::Set, Vec::<Ty>::new()));

        let copied = set.create_instance(&CallArgs::positional(vec![Member::Ty(
            Ty::Collection(list.clone()),
        )]));
        match &copied.ty {
            Ty::Collection(coll) => {
                assert_eq!(coll.kind, CollectionKind::Set);
                assert_eq!(coll.content_types.read().len(), 1);
            }
            other => panic!("expected collection, got {other:?}"),
        }
    }
}
