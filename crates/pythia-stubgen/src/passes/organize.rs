//! Moves assignments and calls that trail behind `def`/`class` statements up
//! to the container's opening statements, preserving indentation.

use rustpython_ast::{self as ast, Ranged};

use crate::base::{Edit, apply_edits, line_start};
use crate::passes::{RewritePass, StubContext, parse_suite};

pub(crate) struct OrganizeMembersPass;

fn is_definition(stmt: &ast::Stmt) -> bool {
    matches!(
        stmt,
        ast::Stmt::FunctionDef(_) | ast::Stmt::AsyncFunctionDef(_) | ast::Stmt::ClassDef(_)
    )
}

/// The start of a definition, including its decorators.
fn definition_start(stmt: &ast::Stmt) -> usize {
    let decorators = match stmt {
        ast::Stmt::FunctionDef(def) => &def.decorator_list,
        ast::Stmt::AsyncFunctionDef(def) => &def.decorator_list,
        ast::Stmt::ClassDef(class) => &class.decorator_list,
        _ => return stmt.range().start().to_usize(),
    };
    decorators
        .first()
        .map(|decorator| decorator.range().start().to_usize())
        .unwrap_or_else(|| stmt.range().start().to_usize())
        .min(stmt.range().start().to_usize())
}

fn is_movable(stmt: &ast::Stmt) -> bool {
    match stmt {
        ast::Stmt::Assign(_) | ast::Stmt::AnnAssign(_) | ast::Stmt::AugAssign(_) => true,
        ast::Stmt::Expr(expr) => matches!(expr.value.as_ref(), ast::Expr::Call(_)),
        _ => false,
    }
}

fn organize_container(source: &str, body: &[ast::Stmt], edits: &mut Vec<Edit>) {
    // recurse into classes first; their edits lie inside untouched spans
    for stmt in body {
        if let ast::Stmt::ClassDef(class) = stmt {
            organize_container(source, &class.body, edits);
        }
    }

    let Some(first_def) = body.iter().find(|stmt| is_definition(stmt)) else {
        return;
    };
    let anchor = definition_start(first_def);
    let insert_at = line_start(source, anchor);

    let mut moved = String::new();
    for stmt in body {
        if stmt.range().start().to_usize() <= anchor || !is_movable(stmt) {
            continue;
        }
        // the whole line moves, indentation included
        let start = line_start(source, stmt.range().start().to_usize());
        let mut end = stmt.range().end().to_usize();
        let bytes = source.as_bytes();
        if bytes.get(end) == Some(&b'\r') {
            end += 1;
        }
        if bytes.get(end) == Some(&b'\n') {
            end += 1;
        }
        let text = &source[start..end];
        moved.push_str(text);
        if !text.ends_with('\n') {
            moved.push('\n');
        }
        edits.push(Edit::Delete { start, end });
    }

    if !moved.is_empty() {
        edits.push(Edit::Insert {
            at: insert_at,
            text: moved,
        });
    }
}

impl RewritePass for OrganizeMembersPass {
    fn name(&self) -> &'static str {
        "organize-members"
    }

    fn run(&self, source: &str, _ctx: &StubContext) -> String {
        let Some(body) = parse_suite(source) else {
            return source.to_owned();
        };
        let mut edits = Vec::new();
        organize_container(source, &body, &mut edits);
        apply_edits(source, edits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> String {
        OrganizeMembersPass.run(source, &StubContext { analysis: None })
    }

    #[test]
    fn test_trailing_assignment_moves_up() {
        let out = run("A = 1\ndef f():\n    return 1\nB = 2\n");
        assert_eq!(out, "A = 1\nB = 2\ndef f():\n    return 1\n");
    }

    #[test]
    fn test_class_body_organized_with_indentation() {
        let out = run("class C:\n    def m(self):\n        return 1\n    field = 1\n");
        assert_eq!(
            out,
            "class C:\n    field = 1\n    def m(self):\n        return 1\n"
        );
    }

    #[test]
    fn test_already_organized_is_stable() {
        let source = "A = 1\nB = 2\ndef f():\n    return 1\n";
        assert_eq!(run(source), source);
    }
}
