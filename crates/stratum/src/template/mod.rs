//! template strings
//!
//! A template string is literal text with embedded blocks:
//! - `${expression}` is evaluated, `${expression}?` may be missing
//! - `$${...}` is an escaped block and is never evaluated
//! - `${if expression}...${else}...${endif}` selects text based on truthiness
//!
//! Parsing is done with [pest] (see `grammar.pest`), operator precedence with a [pest::pratt_parser::PrattParser].
pub mod ast;
mod parser;

pub use ast::{Expr, ParsedTemplate, TemplatePart};
pub use parser::{parse_expression, parse_template};

/// Whether a string contains anything that needs parsing
pub fn is_template(text: &str) -> bool {
    text.contains("${")
}
