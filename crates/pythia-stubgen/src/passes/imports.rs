//! Collapses `import x as y` plus later `z = y.z` patterns into
//! `from x import z as z`, keeping aliases that are used elsewhere.

use ecow::EcoString;
use pythia_std::hash::FxHashMap;
use rustpython_ast::{self as ast, Ranged};
use rustpython_parser::text_size::TextRange;

use crate::base::{Edit, apply_edits};
use crate::passes::{RewritePass, StubContext, count_identifier, parse_suite};

pub(crate) struct CleanupImportsPass;

struct AliasedImport {
    module: EcoString,
    stmt_range: TextRange,
    /// `(exported name, assignment range)` pairs collapsed into the import.
    collapsed: Vec<(EcoString, TextRange)>,
}

impl RewritePass for CleanupImportsPass {
    fn name(&self) -> &'static str {
        "cleanup-imports"
    }

    fn run(&self, source: &str, _ctx: &StubContext) -> String {
        let Some(body) = parse_suite(source) else {
            return source.to_owned();
        };

        // aliased single-name imports, by alias
        let mut aliased: FxHashMap<EcoString, AliasedImport> = FxHashMap::default();
        for stmt in &body {
            let ast::Stmt::Import(import) = stmt else {
                continue;
            };
            let [alias] = import.names.as_slice() else {
                continue;
            };
            let Some(asname) = &alias.asname else {
                continue;
            };
            aliased.insert(
                asname.as_str().into(),
                AliasedImport {
                    module: alias.name.as_str().into(),
                    stmt_range: import.range(),
                    collapsed: Vec::new(),
                },
            );
        }
        if aliased.is_empty() {
            return source.to_owned();
        }

        // `z = y.z` assignments re-exporting through an alias
        for stmt in &body {
            let ast::Stmt::Assign(assign) = stmt else {
                continue;
            };
            let [ast::Expr::Name(target)] = assign.targets.as_slice() else {
                continue;
            };
            let ast::Expr::Attribute(attr) = assign.value.as_ref() else {
                continue;
            };
            let ast::Expr::Name(base) = attr.value.as_ref() else {
                continue;
            };
            if attr.attr.as_str() != target.id.as_str() {
                continue;
            }
            if let Some(import) = aliased.get_mut(base.id.as_str()) {
                import
                    .collapsed
                    .push((target.id.as_str().into(), assign.range()));
            }
        }

        let mut edits = Vec::new();
        for (alias, import) in &aliased {
            if import.collapsed.is_empty() {
                continue;
            }
            let names = import
                .collapsed
                .iter()
                .map(|(name, _)| format!("{name} as {name}"))
                .collect::<Vec<_>>()
                .join(", ");
            let from_line = format!("from {} import {}", import.module, names);

            // one use per collapsed assignment plus the import itself
            let used_elsewhere =
                count_identifier(source, alias) > 1 + import.collapsed.len();
            let replacement = if used_elsewhere {
                let original = &source[import.stmt_range.start().to_usize()
                    ..import.stmt_range.end().to_usize()];
                format!("{original}\n{from_line}")
            } else {
                from_line
            };
            edits.push(Edit::Replace {
                range: import.stmt_range,
                text: replacement,
            });
            for (_, assign_range) in &import.collapsed {
                edits.push(Edit::Remove {
                    range: *assign_range,
                });
            }
        }

        apply_edits(source, edits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> String {
        CleanupImportsPass.run(source, &StubContext { analysis: None })
    }

    #[test]
    fn test_collapse_reexport() {
        let out = run("import collections as _c\nOrderedDict = _c.OrderedDict\nx = 1\n");
        assert_eq!(
            out,
            "from collections import OrderedDict as OrderedDict\nx = 1\n"
        );
    }

    #[test]
    fn test_alias_used_elsewhere_is_kept() {
        let out = run("import os as _os\nsep = _os.sep\npath = _os.path.join\n");
        assert!(out.contains("import os as _os\n"));
        assert!(out.contains("from os import sep as sep"));
        assert!(!out.contains("sep = _os.sep"));
    }

    #[test]
    fn test_plain_imports_untouched() {
        let source = "import sys\nfrom os import path\n";
        assert_eq!(run(source), source);
    }
}
