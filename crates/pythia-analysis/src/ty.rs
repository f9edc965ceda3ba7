//! The polymorphic type contract and its variants.

pub mod builtin;
pub mod class;
pub mod collection;
pub mod def;
pub mod func;
pub mod mro;

pub use builtin::*;
pub use class::*;
pub use collection::*;
pub use def::*;
pub use func::*;
pub use mro::*;
