pub mod error;
mod structural;
pub mod token;

pub use error::ParseError;

use crate::Config;

/// Parser entry point.
pub struct Parser {
    source: String,
    file_id: usize,
}

impl Parser {
    pub fn new(source: String, file_id: usize) -> Self {
        Parser { source, file_id }
    }

    /// Parse a whole script into a Config. Errors are collected for every
    /// malformed block rather than stopping at the first one.
    pub fn parse(&self) -> Result<Config, Vec<ParseError>> {
        structural::parse_statements(&self.source, self.file_id)
    }
}
