//! Read-only traversal over a parsed program.
//!
//! Implementors override the `visit_*` hooks they care about and call the
//! matching `walk_*` function to keep descending. Expressions are visited with
//! the source line of the nearest enclosing call or statement.

use crate::ast::{Expr, Program, Stmt, StmtKind};

pub trait Visitor {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr, line: usize) {
        walk_expr(self, expr, line);
    }
}

pub fn walk_program<V: Visitor + ?Sized>(visitor: &mut V, program: &Program) {
    for stmt in &program.body {
        visitor.visit_stmt(stmt);
    }
}

pub fn walk_stmt<V: Visitor + ?Sized>(visitor: &mut V, stmt: &Stmt) {
    let line = stmt.line;
    match &stmt.kind {
        StmtKind::Import { .. }
        | StmtKind::FromImport { .. }
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Pass => {}
        StmtKind::Def(def) => {
            for param in &def.params {
                if let Some(default) = &param.default {
                    visitor.visit_expr(default, def.line);
                }
            }
            for inner in &def.body {
                visitor.visit_stmt(inner);
            }
        }
        StmtKind::Return(value) => {
            if let Some(value) = value {
                visitor.visit_expr(value, line);
            }
        }
        StmtKind::If { branches, orelse } => {
            for (condition, body) in branches {
                visitor.visit_expr(condition, line);
                for inner in body {
                    visitor.visit_stmt(inner);
                }
            }
            for inner in orelse {
                visitor.visit_stmt(inner);
            }
        }
        StmtKind::For { iter, body, .. } => {
            visitor.visit_expr(iter, line);
            for inner in body {
                visitor.visit_stmt(inner);
            }
        }
        StmtKind::While { condition, body } => {
            visitor.visit_expr(condition, line);
            for inner in body {
                visitor.visit_stmt(inner);
            }
        }
        StmtKind::Assign { target, value } | StmtKind::AugAssign { target, value, .. } => {
            for index in &target.indices {
                visitor.visit_expr(index, line);
            }
            visitor.visit_expr(value, line);
        }
        StmtKind::Expr(expr) => visitor.visit_expr(expr, line),
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(visitor: &mut V, expr: &Expr, line: usize) {
    match expr {
        Expr::Literal(_) | Expr::Name(_) => {}
        Expr::List(items) => {
            for item in items {
                visitor.visit_expr(item, line);
            }
        }
        Expr::Dict(entries) => {
            for (key, value) in entries {
                visitor.visit_expr(key, line);
                visitor.visit_expr(value, line);
            }
        }
        Expr::Attribute { value, .. } => visitor.visit_expr(value, line),
        Expr::Index { value, index } => {
            visitor.visit_expr(value, line);
            visitor.visit_expr(index, line);
        }
        Expr::Call {
            func,
            args,
            kwargs,
            line: call_line,
        } => {
            visitor.visit_expr(func, *call_line);
            for arg in args {
                visitor.visit_expr(arg, *call_line);
            }
            for (_, value) in kwargs {
                visitor.visit_expr(value, *call_line);
            }
        }
        Expr::Unary { operand, .. } => visitor.visit_expr(operand, line),
        Expr::Binary { left, right, .. } => {
            visitor.visit_expr(left, line);
            visitor.visit_expr(right, line);
        }
        Expr::Compare { left, ops } => {
            visitor.visit_expr(left, line);
            for (_, right) in ops {
                visitor.visit_expr(right, line);
            }
        }
        Expr::BoolOp { values, .. } => {
            for value in values {
                visitor.visit_expr(value, line);
            }
        }
    }
}
