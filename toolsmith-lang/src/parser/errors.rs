use super::Rule;
use pest::error::{Error as PestError, LineColLocation};
use pest::iterators::Pair;
use thiserror::Error;

/// A syntax error with the 1-based position it was detected at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub(super) fn at(pair: &Pair<Rule>, message: impl Into<String>) -> Self {
        let (line, column) = pair.as_span().start_pos().line_col();
        ParseError {
            line,
            column,
            message: message.into(),
        }
    }
}

impl From<PestError<Rule>> for ParseError {
    fn from(err: PestError<Rule>) -> Self {
        let (line, column) = match &err.line_col {
            LineColLocation::Pos(pos) => *pos,
            LineColLocation::Span(start, _) => *start,
        };
        let err = err.renamed_rules(describe_rule);
        ParseError {
            line,
            column,
            message: err.variant.message().into_owned(),
        }
    }
}

/// Human names for the rules that show up in "expected ..." messages.
fn describe_rule(rule: &Rule) -> String {
    match rule {
        Rule::EOI => "end of input".to_string(),
        Rule::identifier => "a name".to_string(),
        Rule::dotted_name => "a module name".to_string(),
        Rule::block => "'{'".to_string(),
        Rule::or_expr
        | Rule::and_expr
        | Rule::not_expr
        | Rule::comparison
        | Rule::arith
        | Rule::term
        | Rule::unary
        | Rule::postfix => "an expression".to_string(),
        Rule::comp_op => "a comparison operator".to_string(),
        Rule::add_op | Rule::mul_op | Rule::or_op | Rule::and_op => "an operator".to_string(),
        Rule::aug_op => "'+=', '-=' or '*='".to_string(),
        Rule::call => "'('".to_string(),
        Rule::index => "'['".to_string(),
        Rule::attribute => "'.'".to_string(),
        Rule::elif_clause => "'elif'".to_string(),
        Rule::else_clause => "'else'".to_string(),
        other => format!("{:?}", other),
    }
}
