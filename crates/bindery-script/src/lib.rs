//! Binding model and parser for the dynamic-script language used in
//! `{{ ... }}` bindings.

pub mod ast;
mod binding;
mod error;
mod lexer;
mod parser;
mod token;

pub use binding::{Binding, Segment, split_segments};
pub use error::ParseError;
pub use lexer::Lexer;
pub use parser::{MAX_NESTING, Parser, parse_expression, parse_program, parse_script, parse_script_at};
pub use token::{Keyword, Punct, TemplateHole, Token, TokenKind};
