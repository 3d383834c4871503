//! Query micro-syntax: `bookmark: *.ext term`

mod parser;

pub use parser::{ParsedQuery, parse_query};
