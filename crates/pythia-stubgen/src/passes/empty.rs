//! Replaces `pass`-only bodies inside functions and classes with `...`.

use rustpython_ast::{self as ast, Ranged};
use rustpython_parser::text_size::TextRange;

use crate::base::{Edit, apply_edits};
use crate::passes::{RewritePass, StubContext, parse_suite};

pub(crate) struct CleanupEmptyBodiesPass;

fn collect_empty_bodies(body: &[ast::Stmt], edits: &mut Vec<TextRange>) {
    for stmt in body {
        let inner = match stmt {
            ast::Stmt::FunctionDef(def) => &def.body,
            ast::Stmt::AsyncFunctionDef(def) => &def.body,
            ast::Stmt::ClassDef(class) => &class.body,
            _ => continue,
        };
        if let [ast::Stmt::Pass(only)] = inner.as_slice() {
            edits.push(only.range());
        } else {
            collect_empty_bodies(inner, edits);
        }
    }
}

impl RewritePass for CleanupEmptyBodiesPass {
    fn name(&self) -> &'static str {
        "cleanup-empty-statements"
    }

    fn run(&self, source: &str, _ctx: &StubContext) -> String {
        let Some(body) = parse_suite(source) else {
            return source.to_owned();
        };
        let mut ranges = Vec::new();
        collect_empty_bodies(&body, &mut ranges);
        apply_edits(
            source,
            ranges
                .into_iter()
                .map(|range| Edit::Replace {
                    range,
                    text: "...".to_owned(),
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> String {
        CleanupEmptyBodiesPass.run(source, &StubContext { analysis: None })
    }

    #[test]
    fn test_pass_bodies_collapse() {
        let out = run("def f():\n    pass\n\nclass C:\n    def m(self):\n        pass\n");
        assert_eq!(out, "def f():\n    ...\n\nclass C:\n    def m(self):\n        ...\n");
    }

    #[test]
    fn test_meaningful_pass_untouched() {
        let source = "def f():\n    if x:\n        pass\n    return 1\n";
        assert_eq!(run(source), source);
    }
}
