//! The registry of builtin types used before (or without) an analyzed
//! `builtins` module.

use std::sync::{Arc, LazyLock};

use pythia_std::hash::FxHashMap;
use pythia_std::loc::LocationInfo;

use super::class::ClassTy;
use super::def::{Instance, Member, Ty};

const BUILTIN_CLASS_NAMES: &[&str] = &[
    "object",
    "type",
    "int",
    "float",
    "complex",
    "bool",
    "str",
    "bytes",
    "bytearray",
    "NoneType",
    "BaseException",
    "Exception",
];

static BUILTIN_CLASSES: LazyLock<FxHashMap<&'static str, Arc<ClassTy>>> = LazyLock::new(|| {
    let object = Arc::new(ClassTy::builtin("object"));
    object.set_bases(Vec::<Ty>::new());

    let mut map = FxHashMap::default();
    map.insert("object", object.clone());
    for name in BUILTIN_CLASS_NAMES.iter().skip(1) {
        let class = Arc::new(ClassTy::builtin(*name));
        class.set_bases(vec![Ty::Class(object.clone())]);
        map.insert(*name, class);
    }
    // bool subclasses int
    if let (Some(bool_class), Some(int_class)) = (map.get("bool"), map.get("int")) {
        bool_class.set_bases(vec![Ty::Class(int_class.clone())]);
    }
    map
});

/// The builtin class with the given name, when it exists.
pub fn builtin_class(name: &str) -> Option<Arc<ClassTy>> {
    BUILTIN_CLASSES.get(name).cloned()
}

/// An instance of the builtin class with the given name, or an unknown
/// member when the name is not a builtin.
pub fn builtin_instance(name: &str, location: LocationInfo) -> Member {
    match builtin_class(name) {
        Some(class) => Member::Instance(Instance::new(Ty::Class(class), location)),
        None => Member::unknown(),
    }
}

/// An instance of a builtin class carrying the literal text it came from.
pub fn builtin_literal(
    name: &str,
    location: LocationInfo,
    repr: impl Into<ecow::EcoString>,
) -> Member {
    match builtin_class(name) {
        Some(class) => Member::Instance(Instance::literal(Ty::Class(class), location, repr)),
        None => Member::unknown(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let int_class = builtin_class("int").unwrap();
        assert!(int_class.is_builtin);
        assert_eq!(int_class.declaring_module, "builtins");
        assert!(builtin_class("no_such_builtin").is_none());
    }

    #[test]
    fn test_bool_mro_goes_through_int() {
        let bool_class = builtin_class("bool").unwrap();
        let names: Vec<_> = bool_class
            .mro()
            .iter()
            .map(|ty| ty.name().to_string())
            .collect();
        assert_eq!(names, vec!["bool", "int", "object"]);
    }
}
