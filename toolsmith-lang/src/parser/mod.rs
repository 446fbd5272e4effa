//! Source text to [`Program`].
//!
//! Parsing happens in two passes: pest recognises the grammar in
//! `toolscript.pest`, then the builders in [`statements`] and
//! [`expressions`] fold the pair tree into the AST.

use crate::ast::Program;
use pest::Parser;

pub mod errors;
mod expressions;
mod statements;

pub use errors::ParseError;

#[derive(pest_derive::Parser)]
#[grammar = "toolscript.pest"]
pub struct ToolscriptParser;

/// Parse a complete toolscript source file.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let mut pairs = ToolscriptParser::parse(Rule::program, source)?;
    match pairs.next() {
        Some(program) => statements::build_program(program),
        None => Ok(Program { body: Vec::new() }),
    }
}
