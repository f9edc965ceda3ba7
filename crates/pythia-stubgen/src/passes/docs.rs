//! Normalises string-literal expression statements into docstring form and
//! moves a `__doc__` assignment to the top as the module docstring.

use rustpython_ast::{self as ast, Ranged};
use rustpython_parser::text_size::TextRange;

use crate::base::{Edit, apply_edits};
use crate::passes::{RewritePass, StubContext, parse_suite};

pub(crate) struct ConvertDocCommentPass;

/// The docstring form of a string literal, when it can be rendered safely.
fn doc_text(content: &str) -> Option<String> {
    if content.contains("\"\"\"") || content.ends_with('"') || content.contains('\\') {
        return None;
    }
    Some(format!("\"\"\"{content}\"\"\""))
}

fn collect_string_statements(body: &[ast::Stmt], edits: &mut Vec<(TextRange, String)>) {
    for stmt in body {
        match stmt {
            ast::Stmt::Expr(expr) => {
                let ast::Expr::Constant(constant) = expr.value.as_ref() else {
                    continue;
                };
                let ast::Constant::Str(content) = &constant.value else {
                    continue;
                };
                if let Some(text) = doc_text(content) {
                    edits.push((expr.range(), text));
                }
            }
            ast::Stmt::FunctionDef(def) => collect_string_statements(&def.body, edits),
            ast::Stmt::AsyncFunctionDef(def) => collect_string_statements(&def.body, edits),
            ast::Stmt::ClassDef(class) => collect_string_statements(&class.body, edits),
            _ => {}
        }
    }
}

impl RewritePass for ConvertDocCommentPass {
    fn name(&self) -> &'static str {
        "convert-doc-comments"
    }

    fn run(&self, source: &str, _ctx: &StubContext) -> String {
        let Some(body) = parse_suite(source) else {
            return source.to_owned();
        };

        let mut edits = Vec::new();

        // a `__doc__ = '...'` assignment becomes the module docstring
        for stmt in &body {
            let ast::Stmt::Assign(assign) = stmt else {
                continue;
            };
            let [ast::Expr::Name(target)] = assign.targets.as_slice() else {
                continue;
            };
            if target.id.as_str() != "__doc__" {
                continue;
            }
            let ast::Expr::Constant(constant) = assign.value.as_ref() else {
                continue;
            };
            let ast::Constant::Str(content) = &constant.value else {
                continue;
            };
            if let Some(text) = doc_text(content) {
                edits.push(Edit::Insert {
                    at: 0,
                    text: format!("{text}\n"),
                });
                edits.push(Edit::Remove {
                    range: assign.range(),
                });
            }
        }

        let mut rewrites = Vec::new();
        collect_string_statements(&body, &mut rewrites);
        for (range, text) in rewrites {
            let original = &source[range.start().to_usize()..range.end().to_usize()];
            if original != text {
                edits.push(Edit::Replace { range, text });
            }
        }

        apply_edits(source, edits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> String {
        ConvertDocCommentPass.run(source, &StubContext { analysis: None })
    }

    #[test]
    fn test_doc_assignment_moves_to_top() {
        let out = run("x = 1\n__doc__ = 'module docs'\n");
        assert_eq!(out, "\"\"\"module docs\"\"\"\nx = 1\n");
    }

    #[test]
    fn test_string_statement_becomes_docstring() {
        let out = run("def f():\n    'does things'\n    return 1\n");
        assert_eq!(out, "def f():\n    \"\"\"does things\"\"\"\n    return 1\n");
    }

    #[test]
    fn test_idempotent_on_existing_docstring() {
        let source = "\"\"\"module docs\"\"\"\nx = 1\n";
        assert_eq!(run(source), source);
    }
}
