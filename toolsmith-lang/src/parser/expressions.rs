use super::errors::ParseError;
use super::Rule;
use crate::ast::{BinaryOp, BoolOp, CompareOp, Expr, Literal, UnaryOp};
use pest::iterators::Pair;

pub(super) fn line_of(pair: &Pair<Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

pub(super) fn build_expr(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    match pair.as_rule() {
        Rule::or_expr => build_bool_chain(pair, BoolOp::Or),
        Rule::and_expr => build_bool_chain(pair, BoolOp::And),
        Rule::not_expr => build_not(pair),
        Rule::comparison => build_comparison(pair),
        Rule::arith | Rule::term => build_binary_chain(pair),
        Rule::unary => build_unary(pair),
        Rule::postfix => build_postfix(pair),
        Rule::identifier => Ok(Expr::Name(pair.as_str().to_string())),
        Rule::list => Ok(Expr::List(
            pair.into_inner()
                .map(build_expr)
                .collect::<Result<Vec<_>, _>>()?,
        )),
        Rule::dict => build_dict(pair),
        Rule::integer | Rule::float | Rule::string | Rule::boolean | Rule::none => {
            Ok(Expr::Literal(build_literal(pair)?))
        }
        other => Err(ParseError::at(
            &pair,
            format!("unexpected {:?} in expression", other),
        )),
    }
}

/// `a or b or c` folds into one `BoolOp` so short-circuiting sees all operands.
fn build_bool_chain(pair: Pair<Rule>, op: BoolOp) -> Result<Expr, ParseError> {
    let mut values = pair
        .into_inner()
        .filter(|p| !matches!(p.as_rule(), Rule::or_op | Rule::and_op))
        .map(build_expr)
        .collect::<Result<Vec<_>, _>>()?;
    if values.len() == 1 {
        if let Some(only) = values.pop() {
            return Ok(only);
        }
    }
    Ok(Expr::BoolOp { op, values })
}

fn build_not(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    let span_pair = pair.clone();
    let mut inner = pair.into_inner();
    let first = inner
        .next()
        .ok_or_else(|| ParseError::at(&span_pair, "empty expression"))?;
    if first.as_rule() == Rule::not_op {
        let operand = inner
            .next()
            .ok_or_else(|| ParseError::at(&span_pair, "missing operand for 'not'"))?;
        return Ok(Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(build_expr(operand)?),
        });
    }
    build_expr(first)
}

fn build_comparison(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    let span_pair = pair.clone();
    let mut inner = pair.into_inner();
    let left = build_expr(
        inner
            .next()
            .ok_or_else(|| ParseError::at(&span_pair, "empty comparison"))?,
    )?;

    let mut ops = Vec::new();
    while let Some(op_pair) = inner.next() {
        let op = match op_pair.as_str() {
            "==" => CompareOp::Eq,
            "!=" => CompareOp::NotEq,
            "<" => CompareOp::Lt,
            "<=" => CompareOp::LtE,
            ">" => CompareOp::Gt,
            ">=" => CompareOp::GtE,
            "in" => CompareOp::In,
            s if s.starts_with("not") => CompareOp::NotIn,
            other => {
                return Err(ParseError::at(
                    &op_pair,
                    format!("unknown comparison operator '{}'", other),
                ))
            }
        };
        let right = inner
            .next()
            .ok_or_else(|| ParseError::at(&op_pair, "missing right operand"))?;
        ops.push((op, build_expr(right)?));
    }

    if ops.is_empty() {
        Ok(left)
    } else {
        Ok(Expr::Compare {
            left: Box::new(left),
            ops,
        })
    }
}

/// Left-associative fold over `operand (op operand)*`.
fn build_binary_chain(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    let span_pair = pair.clone();
    let mut inner = pair.into_inner();
    let mut left = build_expr(
        inner
            .next()
            .ok_or_else(|| ParseError::at(&span_pair, "empty expression"))?,
    )?;
    while let Some(op_pair) = inner.next() {
        let op = match op_pair.as_str() {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "//" => BinaryOp::FloorDiv,
            "%" => BinaryOp::Mod,
            other => {
                return Err(ParseError::at(
                    &op_pair,
                    format!("unknown operator '{}'", other),
                ))
            }
        };
        let right = inner
            .next()
            .ok_or_else(|| ParseError::at(&op_pair, "missing right operand"))?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(build_expr(right)?),
        };
    }
    Ok(left)
}

fn build_unary(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    let span_pair = pair.clone();
    let mut inner = pair.into_inner();
    let first = inner
        .next()
        .ok_or_else(|| ParseError::at(&span_pair, "empty expression"))?;
    if first.as_rule() == Rule::neg_op {
        let operand = inner
            .next()
            .ok_or_else(|| ParseError::at(&span_pair, "missing operand for '-'"))?;
        return Ok(Expr::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(build_expr(operand)?),
        });
    }
    build_expr(first)
}

fn build_postfix(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    let line = line_of(&pair);
    let span_pair = pair.clone();
    let mut inner = pair.into_inner();
    let mut expr = build_expr(
        inner
            .next()
            .ok_or_else(|| ParseError::at(&span_pair, "empty expression"))?,
    )?;

    for suffix in inner {
        expr = match suffix.as_rule() {
            Rule::attribute => {
                let attr = suffix
                    .into_inner()
                    .next()
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_default();
                Expr::Attribute {
                    value: Box::new(expr),
                    attr,
                }
            }
            Rule::index => {
                let suffix_span = suffix.clone();
                let index = suffix
                    .into_inner()
                    .next()
                    .ok_or_else(|| ParseError::at(&suffix_span, "empty index"))?;
                Expr::Index {
                    value: Box::new(expr),
                    index: Box::new(build_expr(index)?),
                }
            }
            Rule::call => {
                let (args, kwargs) = build_arguments(suffix)?;
                Expr::Call {
                    func: Box::new(expr),
                    args,
                    kwargs,
                    line,
                }
            }
            other => {
                return Err(ParseError::at(
                    &suffix,
                    format!("unexpected {:?} after expression", other),
                ))
            }
        };
    }
    Ok(expr)
}

#[allow(clippy::type_complexity)]
fn build_arguments(pair: Pair<Rule>) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ParseError> {
    let mut args = Vec::new();
    let mut kwargs: Vec<(String, Expr)> = Vec::new();
    for arg in pair.into_inner() {
        if arg.as_rule() == Rule::keyword_argument {
            let arg_span = arg.clone();
            let mut parts = arg.into_inner();
            let name = parts
                .next()
                .map(|p| p.as_str().to_string())
                .ok_or_else(|| ParseError::at(&arg_span, "missing keyword name"))?;
            if kwargs.iter().any(|(existing, _)| existing == &name) {
                return Err(ParseError::at(
                    &arg_span,
                    format!("keyword argument repeated: '{}'", name),
                ));
            }
            let value = parts
                .next()
                .ok_or_else(|| ParseError::at(&arg_span, "missing keyword value"))?;
            kwargs.push((name, build_expr(value)?));
        } else {
            if !kwargs.is_empty() {
                return Err(ParseError::at(
                    &arg,
                    "positional argument follows keyword argument",
                ));
            }
            args.push(build_expr(arg)?);
        }
    }
    Ok((args, kwargs))
}

fn build_dict(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    let mut entries = Vec::new();
    for entry in pair.into_inner() {
        let entry_span = entry.clone();
        let mut parts = entry.into_inner();
        let key = parts
            .next()
            .ok_or_else(|| ParseError::at(&entry_span, "missing dict key"))?;
        let value = parts
            .next()
            .ok_or_else(|| ParseError::at(&entry_span, "missing dict value"))?;
        entries.push((build_expr(key)?, build_expr(value)?));
    }
    Ok(Expr::Dict(entries))
}

fn build_literal(pair: Pair<Rule>) -> Result<Literal, ParseError> {
    match pair.as_rule() {
        Rule::integer => pair
            .as_str()
            .parse::<i64>()
            .map(Literal::Int)
            .map_err(|_| ParseError::at(&pair, "integer literal is too large")),
        Rule::float => pair
            .as_str()
            .parse::<f64>()
            .map(Literal::Float)
            .map_err(|e| ParseError::at(&pair, format!("invalid float literal: {}", e))),
        Rule::string => {
            let content = pair
                .clone()
                .into_inner()
                .next()
                .map(|p| p.as_str())
                .unwrap_or("");
            Ok(Literal::Str(unescape(content)))
        }
        Rule::boolean => Ok(Literal::Bool(pair.as_str() == "True")),
        Rule::none => Ok(Literal::None),
        other => Err(ParseError::at(
            &pair,
            format!("unexpected {:?} where a literal was expected", other),
        )),
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::unescape;

    #[test]
    fn test_unescape_known_sequences() {
        assert_eq!(unescape(r#"a\nb\t\"c\""#), "a\nb\t\"c\"");
        assert_eq!(unescape(r"\d+"), "\\d+");
    }
}
