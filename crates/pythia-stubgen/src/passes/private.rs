//! Drops private top-level functions and assignments.
//!
//! A name is private iff it starts with `_`, is not listed in `__all__`, and
//! is not a well-known public dunder. A handful of object internals are
//! removed even though they are dunders.

use rustpython_ast::{self as ast, Ranged};

use crate::base::{Edit, apply_edits};
use crate::passes::{RewritePass, StubContext, all_of, parse_suite};

const ALWAYS_REMOVE: &[&str] = &[
    "__class__",
    "__bases__",
    "__dict__",
    "__weakref__",
    "__module__",
];

const WELL_KNOWN_PUBLIC: &[&str] = &["__doc__", "__all__", "__version__", "__name__"];

fn is_private(name: &str, all: &[String]) -> bool {
    if ALWAYS_REMOVE.contains(&name) {
        return true;
    }
    if !name.starts_with('_') {
        return false;
    }
    if all.iter().any(|public| public == name) {
        return false;
    }
    !WELL_KNOWN_PUBLIC.contains(&name)
}

pub(crate) struct RemovePrivatePass;

impl RewritePass for RemovePrivatePass {
    fn name(&self) -> &'static str {
        "remove-private-members"
    }

    fn run(&self, source: &str, _ctx: &StubContext) -> String {
        let Some(body) = parse_suite(source) else {
            return source.to_owned();
        };
        let all = all_of(&body);

        let mut edits = Vec::new();
        for stmt in &body {
            match stmt {
                ast::Stmt::FunctionDef(def) if is_private(def.name.as_str(), &all) => {
                    edits.push(Edit::Remove { range: def.range() });
                }
                ast::Stmt::AsyncFunctionDef(def) if is_private(def.name.as_str(), &all) => {
                    edits.push(Edit::Remove { range: def.range() });
                }
                ast::Stmt::Assign(assign) => {
                    let [ast::Expr::Name(target)] = assign.targets.as_slice() else {
                        continue;
                    };
                    if is_private(target.id.as_str(), &all) {
                        edits.push(Edit::Remove {
                            range: assign.range(),
                        });
                    }
                }
                ast::Stmt::AnnAssign(assign) => {
                    let ast::Expr::Name(target) = assign.target.as_ref() else {
                        continue;
                    };
                    if is_private(target.id.as_str(), &all) {
                        edits.push(Edit::Remove {
                            range: assign.range(),
                        });
                    }
                }
                _ => {}
            }
        }

        apply_edits(source, edits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> String {
        RemovePrivatePass.run(source, &StubContext { analysis: None })
    }

    #[test]
    fn test_private_function_and_assignment_removed() {
        let out = run("def _helper():\n    pass\n\ndef public():\n    pass\n\n_state = 1\n");
        assert!(!out.contains("_helper"));
        assert!(!out.contains("_state"));
        assert!(out.contains("def public"));
    }

    #[test]
    fn test_all_overrides_privacy() {
        let out = run("__all__ = ['_exported']\n_exported = 1\n_hidden = 2\n");
        assert!(out.contains("_exported = 1"));
        assert!(!out.contains("_hidden"));
    }

    #[test]
    fn test_doc_kept_and_internals_removed() {
        let out = run("__doc__ = 'docs'\n__class__ = object\n__bases__ = ()\n");
        assert!(out.contains("__doc__"));
        assert!(!out.contains("__class__"));
        assert!(!out.contains("__bases__"));
    }
}
