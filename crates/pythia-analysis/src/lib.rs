//! The typed semantic model of analyzed Python modules: diagnostics, types,
//! members, scopes, and the serializable persistence shapes.

pub mod diag;
pub use diag::*;

pub mod ty;
pub use ty::*;

pub mod scope;
pub use scope::*;

pub mod model;
