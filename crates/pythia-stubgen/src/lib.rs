//! Generation of `.pyi` stubs from scraped module text.
//!
//! The generator is an ordered pipeline of single-pass rewriters. Each pass
//! re-parses the current text and emits a new text; composing whole-text
//! passes trades speed for the simplicity of keeping every pass independent.
//! Running the full pipeline twice yields byte-identical output.

mod base;
mod passes;

use pythia_analysis::scope::ModuleAnalysis;

pub use passes::StubContext;
use passes::{
    CleanupEmptyBodiesPass, CleanupImportsPass, ConvertDocCommentPass, OrganizeMembersPass,
    RemovePrivatePass, RewritePass, TypeInfoPass,
};

/// Runs the full stub pipeline over scraped module text.
pub fn generate_stub(source: &str, analysis: Option<&ModuleAnalysis>) -> String {
    let ctx = StubContext { analysis };
    let passes: [&dyn RewritePass; 6] = [
        &CleanupImportsPass,
        &RemovePrivatePass,
        &ConvertDocCommentPass,
        &CleanupEmptyBodiesPass,
        &OrganizeMembersPass,
        &TypeInfoPass,
    ];

    let mut text = source.to_owned();
    for pass in passes {
        let next = pass.run(&text, &ctx);
        if next != text {
            log::trace!("stub pass {} rewrote the module", pass.name());
        }
        text = next;
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use pythia_analysis::scope::{Scope, Variable, VariableSource};
    use pythia_analysis::ty::{
        FunctionOverload, FunctionTy, Instance, Member, Parameter, Ty, builtin_class,
    };
    use pythia_std::loc::LocationInfo;

    const SCRAPED: &str = "\
import collections as _collections\n\
OrderedDict = _collections.OrderedDict\n\
__doc__ = 'A scraped module.'\n\
_private = 1\n\
VALUE = 2\n\
def make(a):\n\
    pass\n\
EXTRA = 3\n";

    fn analysis_with_make() -> ModuleAnalysis {
        let mut analysis = ModuleAnalysis::empty("scraped", "scraped.py");
        let func = Arc::new(FunctionTy::new("make", "scraped", LocationInfo::EMPTY));
        let overload = Arc::new(FunctionOverload::new(vec![Parameter {
            name: "a".into(),
            ty: Some(Ty::Class(builtin_class("int").unwrap())),
            default_value: None,
            default_value_ty: None,
            kind: Default::default(),
        }]));
        overload.set_return_value(Member::Instance(Instance::detached(Ty::Class(
            builtin_class("str").unwrap(),
        ))));
        func.add_overload(overload);

        let mut scope = Scope::new();
        scope.bind(Arc::new(Variable::new(
            "make",
            Member::Ty(Ty::Function(func)),
            VariableSource::Declaration,
            LocationInfo::EMPTY,
        )));
        analysis.global_scope = scope;
        analysis
    }

    #[test]
    fn test_full_pipeline() {
        let analysis = analysis_with_make();
        let stub = generate_stub(SCRAPED, Some(&analysis));

        // the module docstring moved to the top
        assert!(stub.starts_with("\"\"\"A scraped module.\"\"\"\n"));
        // the aliased import collapsed into a from-import
        assert!(stub.contains("from collections import OrderedDict as OrderedDict"));
        assert!(!stub.contains("_collections.OrderedDict"));
        // private assignments dropped, public ones kept
        assert!(!stub.contains("_private"));
        assert!(stub.contains("VALUE = 2"));
        // the empty body collapsed and the signature was annotated
        assert!(stub.contains("def make(a: int) -> str:"));
        assert!(stub.contains("..."));
        // the trailing assignment moved above the def
        let extra = stub.find("EXTRA = 3").unwrap();
        let def = stub.find("def make").unwrap();
        assert!(extra < def);
    }

    #[test]
    fn test_pipeline_idempotence() {
        let analysis = analysis_with_make();
        let once = generate_stub(SCRAPED, Some(&analysis));
        let twice = generate_stub(&once, Some(&analysis));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unparsable_input_unchanged() {
        let broken = "def make(:\n";
        assert_eq!(generate_stub(broken, None), broken);
    }
}
