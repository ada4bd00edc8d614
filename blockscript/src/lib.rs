pub mod block;
pub mod keyword;
pub mod parser;
pub mod writer;

use std::ops::Range;

use crate::block::Block;

pub use crate::parser::{ParseError, Parser};

/// One block of a config and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub block: Block,
    /// Byte range of the block's text, continuation lines included.
    pub span: Range<usize>,
    /// `##` comment lines written above the block.
    pub comments: Vec<String>,
}

/// A parsed script: an ordered sequence of blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub statements: Vec<Statement>,
    /// `##` comment lines after the last block.
    pub trailing_comments: Vec<String>,
    /// The source file ID (for error reporting with codespan-reporting).
    pub source_id: usize,
}

impl Config {
    /// Build a config from blocks that did not come from source text.
    pub fn from_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        Config {
            statements: blocks
                .into_iter()
                .map(|block| Statement {
                    block,
                    span: 0..0,
                    comments: Vec::new(),
                })
                .collect(),
            trailing_comments: Vec::new(),
            source_id: 0,
        }
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.statements.iter().map(|s| &s.block)
    }

    /// Canonical script text, one block per line (plus continuation lines
    /// when `indent` is set). Comments are written back above their blocks.
    pub fn to_script(&self, indent: bool) -> String {
        let mut out = String::new();
        for statement in &self.statements {
            for comment in &statement.comments {
                out.push_str(comment);
                out.push('\n');
            }
            out.push_str(&statement.block.serialize(indent));
            out.push('\n');
        }
        for comment in &self.trailing_comments {
            out.push_str(comment);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_script_reparses_to_same_blocks() {
        let source = "#greet FUNCTION Constant \"hi\" -> VAR \"G\"\n!UTILITY List \"L\" Create\n";
        let config = Parser::new(source.to_string(), 0).parse().unwrap();
        let text = config.to_script(true);
        assert_eq!(text, source);

        let again = Parser::new(text, 0).parse().unwrap();
        assert_eq!(
            again.blocks().collect::<Vec<_>>(),
            config.blocks().collect::<Vec<_>>()
        );
    }

    #[test]
    fn to_script_keeps_comments() {
        let source = "## keep me\nFUNCTION Constant \"a\"\n## and me\n";
        let config = Parser::new(source.to_string(), 0).parse().unwrap();
        assert_eq!(config.to_script(false), source);
    }
}
