use super::errors::ParseError;
use super::expressions::{build_expr, line_of};
use super::Rule;
use crate::ast::{BinaryOp, FunctionDef, ImportName, Param, Program, Stmt, StmtKind, Target};
use pest::iterators::Pair;
use std::collections::HashSet;
use std::sync::Arc;

pub(super) fn build_program(pair: Pair<Rule>) -> Result<Program, ParseError> {
    let body = pair
        .into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(build_stmt)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Program { body })
}

fn build_block(pair: Pair<Rule>) -> Result<Vec<Stmt>, ParseError> {
    pair.into_inner().map(build_stmt).collect()
}

fn next_pair<'a>(
    inner: &mut pest::iterators::Pairs<'a, Rule>,
    parent: &Pair<'a, Rule>,
    what: &str,
) -> Result<Pair<'a, Rule>, ParseError> {
    inner
        .next()
        .ok_or_else(|| ParseError::at(parent, format!("missing {}", what)))
}

fn build_stmt(pair: Pair<Rule>) -> Result<Stmt, ParseError> {
    let line = line_of(&pair);
    let span_pair = pair.clone();
    let mut inner = pair.clone().into_inner();
    let kind = match pair.as_rule() {
        Rule::expr_stmt => StmtKind::Expr(build_expr(next_pair(&mut inner, &span_pair, "expression")?)?),
        Rule::assign_stmt => {
            let target = build_target(next_pair(&mut inner, &span_pair, "assignment target")?)?;
            let value = build_expr(next_pair(&mut inner, &span_pair, "assigned value")?)?;
            StmtKind::Assign { target, value }
        }
        Rule::aug_assign_stmt => {
            let target = build_target(next_pair(&mut inner, &span_pair, "assignment target")?)?;
            let op_pair = next_pair(&mut inner, &span_pair, "operator")?;
            let op = match op_pair.as_str() {
                "+=" => BinaryOp::Add,
                "-=" => BinaryOp::Sub,
                "*=" => BinaryOp::Mul,
                other => {
                    return Err(ParseError::at(
                        &op_pair,
                        format!("unknown augmented assignment '{}'", other),
                    ))
                }
            };
            let value = build_expr(next_pair(&mut inner, &span_pair, "assigned value")?)?;
            StmtKind::AugAssign { target, op, value }
        }
        Rule::import_stmt => {
            let module = next_pair(&mut inner, &span_pair, "module name")?
                .as_str()
                .to_string();
            let alias = inner.next().map(|p| p.as_str().to_string());
            StmtKind::Import { module, alias }
        }
        Rule::from_stmt => {
            let module = next_pair(&mut inner, &span_pair, "module name")?
                .as_str()
                .to_string();
            let mut names = Vec::new();
            let mut wildcard = false;
            for item in inner {
                match item.as_rule() {
                    Rule::star => wildcard = true,
                    Rule::import_item => names.push(build_import_item(item)?),
                    other => {
                        return Err(ParseError::at(
                            &item,
                            format!("unexpected {:?} in import", other),
                        ))
                    }
                }
            }
            StmtKind::FromImport {
                module,
                names,
                wildcard,
            }
        }
        Rule::def_stmt => StmtKind::Def(Arc::new(build_def(pair, line)?)),
        Rule::return_stmt => StmtKind::Return(inner.next().map(build_expr).transpose()?),
        Rule::if_stmt => build_if(pair)?,
        Rule::for_stmt => {
            let targets = next_pair(&mut inner, &span_pair, "loop target")?
                .into_inner()
                .map(|p| p.as_str().to_string())
                .collect();
            let iter = build_expr(next_pair(&mut inner, &span_pair, "iterable")?)?;
            let body = build_block(next_pair(&mut inner, &span_pair, "loop body")?)?;
            StmtKind::For {
                targets,
                iter,
                body,
            }
        }
        Rule::while_stmt => {
            let condition = build_expr(next_pair(&mut inner, &span_pair, "condition")?)?;
            let body = build_block(next_pair(&mut inner, &span_pair, "loop body")?)?;
            StmtKind::While { condition, body }
        }
        Rule::break_stmt => StmtKind::Break,
        Rule::continue_stmt => StmtKind::Continue,
        Rule::pass_stmt => StmtKind::Pass,
        other => {
            return Err(ParseError::at(
                &span_pair,
                format!("unexpected {:?} where a statement was expected", other),
            ))
        }
    };
    Ok(Stmt { kind, line })
}

fn build_target(pair: Pair<Rule>) -> Result<Target, ParseError> {
    let span_pair = pair.clone();
    let mut inner = pair.into_inner();
    let name = next_pair(&mut inner, &span_pair, "target name")?
        .as_str()
        .to_string();
    let indices = inner.map(build_expr).collect::<Result<Vec<_>, _>>()?;
    Ok(Target { name, indices })
}

fn build_import_item(pair: Pair<Rule>) -> Result<ImportName, ParseError> {
    let span_pair = pair.clone();
    let mut inner = pair.into_inner();
    let name = next_pair(&mut inner, &span_pair, "imported name")?
        .as_str()
        .to_string();
    let alias = inner.next().map(|p| p.as_str().to_string());
    Ok(ImportName { name, alias })
}

fn build_def(pair: Pair<Rule>, line: usize) -> Result<FunctionDef, ParseError> {
    let span_pair = pair.clone();
    let mut inner = pair.into_inner();
    let name = next_pair(&mut inner, &span_pair, "function name")?
        .as_str()
        .to_string();

    let mut params = Vec::new();
    let mut seen = HashSet::new();
    let mut body = Vec::new();
    for part in inner {
        match part.as_rule() {
            Rule::param => {
                let param_span = part.clone();
                let mut param_inner = part.into_inner();
                let param_name = next_pair(&mut param_inner, &param_span, "parameter name")?
                    .as_str()
                    .to_string();
                let default = param_inner.next().map(build_expr).transpose()?;
                if !seen.insert(param_name.clone()) {
                    return Err(ParseError::at(
                        &param_span,
                        format!("duplicate parameter '{}' in function '{}'", param_name, name),
                    ));
                }
                let follows_default = params.iter().any(|p: &Param| p.default.is_some());
                if default.is_none() && follows_default {
                    return Err(ParseError::at(
                        &param_span,
                        "non-default parameter follows default parameter",
                    ));
                }
                params.push(Param {
                    name: param_name,
                    default,
                });
            }
            Rule::block => body = build_block(part)?,
            other => {
                return Err(ParseError::at(
                    &part,
                    format!("unexpected {:?} in function definition", other),
                ))
            }
        }
    }

    Ok(FunctionDef {
        name,
        params,
        body,
        line,
    })
}

fn build_if(pair: Pair<Rule>) -> Result<StmtKind, ParseError> {
    let span_pair = pair.clone();
    let mut inner = pair.into_inner();
    let condition = build_expr(next_pair(&mut inner, &span_pair, "condition")?)?;
    let body = build_block(next_pair(&mut inner, &span_pair, "if body")?)?;

    let mut branches = vec![(condition, body)];
    let mut orelse = Vec::new();
    for clause in inner {
        let clause_span = clause.clone();
        match clause.as_rule() {
            Rule::elif_clause => {
                let mut parts = clause.into_inner();
                let condition = build_expr(next_pair(&mut parts, &clause_span, "condition")?)?;
                let body = build_block(next_pair(&mut parts, &clause_span, "elif body")?)?;
                branches.push((condition, body));
            }
            Rule::else_clause => {
                let mut parts = clause.into_inner();
                orelse = build_block(next_pair(&mut parts, &clause_span, "else body")?)?;
            }
            other => {
                return Err(ParseError::at(
                    &clause_span,
                    format!("unexpected {:?} in if statement", other),
                ))
            }
        }
    }
    Ok(StmtKind::If { branches, orelse })
}
