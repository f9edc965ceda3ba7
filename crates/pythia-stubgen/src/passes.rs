//! The rewrite passes, applied in pipeline order.

mod docs;
mod empty;
mod imports;
mod organize;
mod private;
mod type_info;

pub(crate) use docs::ConvertDocCommentPass;
pub(crate) use empty::CleanupEmptyBodiesPass;
pub(crate) use imports::CleanupImportsPass;
pub(crate) use organize::OrganizeMembersPass;
pub(crate) use private::RemovePrivatePass;
pub(crate) use type_info::TypeInfoPass;

use pythia_analysis::scope::ModuleAnalysis;
use rustpython_ast::{self as ast};
use rustpython_parser::Parse;

/// What a pass can see besides the text.
pub struct StubContext<'a> {
    /// The analyzed member model of the module, when available.
    pub analysis: Option<&'a ModuleAnalysis>,
}

/// One text-to-text rewrite pass.
pub(crate) trait RewritePass {
    /// The pass name, for tracing.
    fn name(&self) -> &'static str;

    /// Rewrites the text. A pass that finds nothing to do (or cannot parse
    /// the text) returns its input unchanged.
    fn run(&self, source: &str, ctx: &StubContext) -> String;
}

/// Parses the current text; a failed parse disables the pass.
pub(crate) fn parse_suite(source: &str) -> Option<Vec<ast::Stmt>> {
    ast::Suite::parse(source, "<stub>").ok()
}

/// Reads the `__all__` string list from a suite.
pub(crate) fn all_of(body: &[ast::Stmt]) -> Vec<String> {
    for stmt in body {
        let ast::Stmt::Assign(assign) = stmt else {
            continue;
        };
        let [ast::Expr::Name(target)] = assign.targets.as_slice() else {
            continue;
        };
        if target.id.as_str() != "__all__" {
            continue;
        }
        let elements = match assign.value.as_ref() {
            ast::Expr::List(list) => &list.elts,
            ast::Expr::Tuple(tuple) => &tuple.elts,
            _ => continue,
        };
        return elements
            .iter()
            .filter_map(|element| match element {
                ast::Expr::Constant(constant) => match &constant.value {
                    ast::Constant::Str(name) => Some(name.clone()),
                    _ => None,
                },
                _ => None,
            })
            .collect();
    }
    Vec::new()
}

/// Counts standalone occurrences of an identifier in the text.
pub(crate) fn count_identifier(source: &str, ident: &str) -> usize {
    let bytes = source.as_bytes();
    let mut count = 0;
    let mut from = 0;
    while let Some(pos) = source[from..].find(ident) {
        let start = from + pos;
        let end = start + ident.len();
        let before_ok = start == 0 || !is_ident_byte(bytes[start - 1]);
        let after_ok = end >= bytes.len() || !is_ident_byte(bytes[end]);
        if before_ok && after_ok {
            count += 1;
        }
        from = start + 1;
    }
    count
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
