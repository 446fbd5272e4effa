//! Static resolution of free names.
//!
//! Before a program is executed into a namespace, every name it reads must be
//! bound somewhere it can see: a local of an enclosing function, a module-level
//! binding of the program itself, or a name the caller already knows about
//! (namespace bindings and builtins). Programs that use `from m import *`
//! cannot be checked at module level and are only checked inside functions for
//! names that are neither local nor module-level.

use crate::ast::{Expr, Program, Stmt, StmtKind};
use crate::walk::{walk_expr, walk_stmt, Visitor};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedName {
    pub name: String,
    pub line: usize,
}

/// Names read by `program` that resolve nowhere, first occurrence of each, in
/// source order.
pub fn unresolved_names(program: &Program, known: &dyn Fn(&str) -> bool) -> Vec<UnresolvedName> {
    let has_wildcard = program.body.iter().any(|stmt| {
        matches!(
            stmt.kind,
            StmtKind::FromImport { wildcard: true, .. }
        )
    });
    if has_wildcard {
        return Vec::new();
    }

    let mut checker = ScopeChecker {
        scopes: vec![bindings_of(&program.body)],
        known,
        unresolved: Vec::new(),
        reported: HashSet::new(),
    };
    for stmt in &program.body {
        checker.visit_stmt(stmt);
    }
    checker.unresolved.sort_by_key(|u| u.line);
    checker.unresolved
}

/// Names bound directly in `body`, not counting bindings inside nested
/// function bodies.
pub fn bindings_of(body: &[Stmt]) -> HashSet<String> {
    let mut names = HashSet::new();
    collect_bindings(body, &mut names);
    names
}

fn collect_bindings(body: &[Stmt], names: &mut HashSet<String>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Import { module, alias } => {
                let bound = alias
                    .clone()
                    .unwrap_or_else(|| module.split('.').next().unwrap_or(module).to_string());
                names.insert(bound);
            }
            StmtKind::FromImport { names: items, .. } => {
                for item in items {
                    names.insert(item.local_name().to_string());
                }
            }
            StmtKind::Def(def) => {
                names.insert(def.name.clone());
            }
            StmtKind::Assign { target, .. } if target.indices.is_empty() => {
                names.insert(target.name.clone());
            }
            StmtKind::For { targets, body, .. } => {
                names.extend(targets.iter().cloned());
                collect_bindings(body, names);
            }
            StmtKind::While { body, .. } => collect_bindings(body, names),
            StmtKind::If { branches, orelse } => {
                for (_, branch) in branches {
                    collect_bindings(branch, names);
                }
                collect_bindings(orelse, names);
            }
            _ => {}
        }
    }
}

struct ScopeChecker<'a> {
    scopes: Vec<HashSet<String>>,
    known: &'a dyn Fn(&str) -> bool,
    unresolved: Vec<UnresolvedName>,
    reported: HashSet<String>,
}

impl ScopeChecker<'_> {
    fn check(&mut self, name: &str, line: usize) {
        if self.scopes.iter().any(|scope| scope.contains(name)) || (self.known)(name) {
            return;
        }
        if self.reported.insert(name.to_string()) {
            self.unresolved.push(UnresolvedName {
                name: name.to_string(),
                line,
            });
        }
    }
}

impl Visitor for ScopeChecker<'_> {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Def(def) => {
                for param in &def.params {
                    if let Some(default) = &param.default {
                        self.visit_expr(default, def.line);
                    }
                }
                let mut locals = bindings_of(&def.body);
                locals.extend(def.param_names().map(str::to_string));
                self.scopes.push(locals);
                for inner in &def.body {
                    self.visit_stmt(inner);
                }
                self.scopes.pop();
            }
            StmtKind::AugAssign { target, .. } => {
                self.check(&target.name, stmt.line);
                walk_stmt(self, stmt);
            }
            StmtKind::Assign { target, .. } if !target.indices.is_empty() => {
                self.check(&target.name, stmt.line);
                walk_stmt(self, stmt);
            }
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &Expr, line: usize) {
        match expr {
            Expr::Name(name) => self.check(name, line),
            _ => walk_expr(self, expr, line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    fn unresolved(source: &str) -> Vec<String> {
        let program = parse(source).expect("parse");
        let known = |name: &str| matches!(name, "len" | "json");
        unresolved_names(&program, &known)
            .into_iter()
            .map(|u| u.name)
            .collect()
    }

    #[test]
    fn test_module_level_bindings_are_visible_inside_functions() {
        assert!(unresolved("def f() { return g() }\ndef g() { return LIMIT }\nLIMIT = 3").is_empty());
    }

    #[test]
    fn test_unknown_names_are_reported_once() {
        assert_eq!(
            unresolved("def f(x) { return helper(x) + helper(1) + missing }"),
            vec!["helper".to_string(), "missing".to_string()]
        );
    }

    #[test]
    fn test_nested_function_sees_enclosing_locals() {
        assert!(unresolved("def outer(a) {\n  b = 2\n  def inner() { return a + b }\n  return inner()\n}").is_empty());
    }

    #[test]
    fn test_augmented_assignment_reads_its_target() {
        assert_eq!(unresolved("def f() { total += 1 }"), vec!["total".to_string()]);
        assert!(unresolved("def f() { total = 0\n total += len([1]) }").is_empty());
    }

    #[test]
    fn test_wildcard_import_disables_module_check() {
        assert!(unresolved("from json import *\ndef f() { return dumps(1) }").is_empty());
    }
}
