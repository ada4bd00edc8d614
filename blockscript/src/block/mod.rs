pub mod function;
pub mod utility;

use crate::parser::error::ParseError;
use crate::parser::token::TokenStream;
use crate::writer::BlockWriter;

pub use function::{AesParams, Function, FunctionBlock, FunctionKind, KdfSalt, RsaParams};
pub use utility::{FileAction, FileOp, ListAction, ListOp, UtilityBlock, UtilityGroup, UtilityOp, VarAction, VarOp};

/// Where a block stores its result: `-> VAR "name"` or `-> CAP "name"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBinding {
    pub name: String,
    /// Marks the variable as a reportable task result.
    pub capture: bool,
}

impl OutputBinding {
    pub fn var(name: impl Into<String>) -> Self {
        OutputBinding { name: name.into(), capture: false }
    }

    pub fn cap(name: impl Into<String>) -> Self {
        OutputBinding { name: name.into(), capture: true }
    }
}

/// The kind-specific part of a block: what follows the block keyword.
pub trait BlockBody: Sized {
    /// Keyword introducing the block, also used as its default label.
    const KEYWORD: &'static str;

    fn parse_body(tokens: &mut TokenStream) -> Result<Self, ParseError>;

    fn write_body(&self, writer: &mut BlockWriter);
}

/// One executable, (de)serializable unit of a config.
///
/// Blocks are built once when a config is loaded and are never mutated by
/// execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Display name, defaults to the block keyword.
    pub label: String,
    /// Disabled blocks are skipped by the executor.
    pub disabled: bool,
    pub kind: BlockKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Function(FunctionBlock),
    Utility(UtilityBlock),
}

impl BlockKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            BlockKind::Function(_) => FunctionBlock::KEYWORD,
            BlockKind::Utility(_) => UtilityBlock::KEYWORD,
        }
    }
}

impl From<FunctionBlock> for Block {
    fn from(body: FunctionBlock) -> Self {
        Block::new(BlockKind::Function(body))
    }
}

impl From<UtilityBlock> for Block {
    fn from(body: UtilityBlock) -> Self {
        Block::new(BlockKind::Utility(body))
    }
}

impl Block {
    /// A block with the default label and enabled.
    pub fn new(kind: BlockKind) -> Self {
        Block {
            label: kind.keyword().to_string(),
            disabled: false,
            kind,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Parse a single block from its script text.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        Block::parse_at(text, 0, 0)
    }

    /// Parse a block whose text starts at `offset` bytes into source `file_id`.
    pub fn parse_at(text: &str, offset: usize, file_id: usize) -> Result<Self, ParseError> {
        let leading = text.len() - text.trim_start().len();
        let (disabled, body_start) = match text[leading..].strip_prefix('!') {
            Some(_) => (true, leading + 1),
            None => (false, leading),
        };

        let mut tokens = TokenStream::from_text(&text[body_start..], offset + body_start, file_id)?;
        let label = tokens.label();

        let keyword_span = tokens.peek_span();
        let keyword = tokens.expect_parameter("block keyword")?;
        let kind = if keyword.eq_ignore_ascii_case(FunctionBlock::KEYWORD) {
            BlockKind::Function(FunctionBlock::parse_body(&mut tokens)?)
        } else if keyword.eq_ignore_ascii_case(UtilityBlock::KEYWORD) {
            BlockKind::Utility(UtilityBlock::parse_body(&mut tokens)?)
        } else {
            return Err(ParseError::error(
                format!("unknown block kind '{}'", keyword),
                keyword_span,
                file_id,
            )
            .with_note(format!(
                "expected {} or {}",
                FunctionBlock::KEYWORD,
                UtilityBlock::KEYWORD
            )));
        };
        tokens.expect_end()?;

        let label = label.unwrap_or_else(|| kind.keyword().to_string());
        Ok(Block { label, disabled, kind })
    }

    /// Canonical script text for this block.
    pub fn serialize(&self, indent: bool) -> String {
        let mut writer = BlockWriter::new(indent, self.disabled);
        writer.label(&self.label, self.kind.keyword());
        writer.token(self.kind.keyword());
        match &self.kind {
            BlockKind::Function(body) => body.write_body(&mut writer),
            BlockKind::Utility(body) => body.write_body(&mut writer),
        }
        writer.finish()
    }

    /// The output binding of whichever kind this is.
    pub fn output(&self) -> Option<&OutputBinding> {
        match &self.kind {
            BlockKind::Function(body) => body.output.as_ref(),
            BlockKind::Utility(body) => body.output.as_ref(),
        }
    }
}

/// Parse the optional `-> VAR|CAP "name"` clause that ends every block.
pub(crate) fn parse_output(tokens: &mut TokenStream) -> Result<Option<OutputBinding>, ParseError> {
    if !tokens.arrow() {
        return Ok(None);
    }

    let span = tokens.peek_span();
    let capture = match tokens.expect_parameter("variable type") {
        Ok(word) if word.eq_ignore_ascii_case("VAR") => false,
        Ok(word) if word.eq_ignore_ascii_case("CAP") => true,
        _ => {
            return Err(ParseError::error("invalid or missing variable type", span, tokens.file_id())
                .with_note("expected VAR or CAP after ->"));
        }
    };

    let name = tokens.expect_literal("variable name").map_err(|e| {
        ParseError::error("variable name not specified", e.span, e.file_id)
    })?;

    Ok(Some(OutputBinding { name, capture }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_defaults_to_keyword() {
        let block = Block::parse(r#"FUNCTION Constant "x""#).unwrap();
        assert_eq!(block.label, "FUNCTION");
        assert!(!block.disabled);
    }

    #[test]
    fn disabled_and_label_prefix() {
        let block = Block::parse(r#"!#step UTILITY List "L" Create"#).unwrap();
        assert!(block.disabled);
        assert_eq!(block.label, "step");
        assert_eq!(block.serialize(true), r#"!#step UTILITY List "L" Create"#);
    }

    #[test]
    fn unknown_block_kind() {
        let err = Block::parse("REQUEST GET").unwrap_err();
        assert!(err.message.contains("unknown block kind"));
        assert_eq!(err.span, 0..7);
    }

    #[test]
    fn output_clause_errors() {
        let err = Block::parse(r#"FUNCTION Constant "a" -> FOO "x""#).unwrap_err();
        assert_eq!(err.message, "invalid or missing variable type");

        let err = Block::parse(r#"FUNCTION Constant "a" -> CAP"#).unwrap_err();
        assert_eq!(err.message, "variable name not specified");
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        let err = Block::parse(r#"FUNCTION Constant "a" -> VAR "x" extra"#).unwrap_err();
        assert!(err.message.contains("unexpected"));
    }

    #[test]
    fn capture_binding() {
        let block = Block::parse(r#"FUNCTION Constant "a" -> CAP "x""#).unwrap();
        assert_eq!(block.output(), Some(&OutputBinding::cap("x")));
    }
}
