use crate::{Config, Statement};
use crate::block::Block;
use crate::parser::error::ParseError;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Split script source into blocks and parse each one.
///
/// A block starts on a line with no leading whitespace. Indented lines
/// continue the previous block, `##` lines are comments, blank lines are
/// ignored. Comments are kept on the block that follows them (or on the
/// block they interrupt); comments after the last block are kept on the
/// config.
pub fn parse_statements(source: &str, file_id: usize) -> Result<Config, Vec<ParseError>> {
    let mut state = ParseState::new(file_id);
    let mut offset = 0;

    for line in source.split_inclusive('\n') {
        state.line(line, offset);
        offset += line.len();
    }

    state.finalize()
}

// ---------------------------------------------------------------------------
// Parse state
// ---------------------------------------------------------------------------

struct PendingBlock {
    start: usize,
    /// Source text from `start`, with comment lines blanked out so that byte
    /// offsets still line up with the original source.
    text: String,
    comments: Vec<String>,
}

struct ParseState {
    file_id: usize,
    pending: Option<PendingBlock>,
    /// Comment lines not yet attached to a block.
    comments: Vec<String>,
    statements: Vec<Statement>,
    errors: Vec<ParseError>,
}

impl ParseState {
    fn new(file_id: usize) -> Self {
        ParseState {
            file_id,
            pending: None,
            comments: Vec::new(),
            statements: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn line(&mut self, line: &str, offset: usize) {
        let content = line.trim_end_matches(['\r', '\n']);

        if content.trim_start().starts_with("##") {
            self.comments.push(content.trim().to_string());
            if let Some(pending) = &mut self.pending {
                pending.text.push_str(&" ".repeat(content.len()));
                pending.text.push_str(&line[content.len()..]);
            }
            return;
        }

        if content.trim().is_empty() {
            if let Some(pending) = &mut self.pending {
                pending.text.push_str(line);
            }
            return;
        }

        if content.starts_with(char::is_whitespace) {
            match &mut self.pending {
                Some(pending) => {
                    pending.comments.append(&mut self.comments);
                    pending.text.push_str(line);
                }
                None => {
                    let indent = content.len() - content.trim_start().len();
                    self.errors.push(
                        ParseError::error(
                            "continuation line without a block to continue",
                            offset + indent..offset + content.len(),
                            self.file_id,
                        )
                        .with_note("blocks must start at the beginning of a line"),
                    );
                }
            }
            return;
        }

        self.flush();
        self.pending = Some(PendingBlock {
            start: offset,
            text: line.to_string(),
            comments: std::mem::take(&mut self.comments),
        });
    }

    fn flush(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };

        match Block::parse_at(&pending.text, pending.start, self.file_id) {
            Ok(block) => {
                let end = pending.start + pending.text.trim_end().len();
                self.statements.push(Statement {
                    block,
                    span: pending.start..end,
                    comments: pending.comments,
                });
            }
            Err(err) => self.errors.push(err),
        }
    }

    fn finalize(mut self) -> Result<Config, Vec<ParseError>> {
        self.flush();
        if self.errors.is_empty() {
            Ok(Config {
                statements: self.statements,
                trailing_comments: self.comments,
                source_id: self.file_id,
            })
        } else {
            Err(self.errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_continuation_lines() {
        let source = "FUNCTION Translate\n  KEY \"a\" VALUE \"b\"\n  \"a\" -> VAR \"x\"\nFUNCTION Constant \"c\"\n";
        let statements = parse_statements(source, 0).unwrap().statements;
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].span, 0..55);
        assert_eq!(statements[1].span.start, 56);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let source = "## header\n\nFUNCTION Constant \"a\"\n## between\n  -> VAR \"x\"\n";
        let statements = parse_statements(source, 0).unwrap().statements;
        assert_eq!(statements.len(), 1);
        assert!(statements[0].block.output().is_some());
    }

    #[test]
    fn comments_are_attached_to_blocks() {
        let source = "## header\nFUNCTION Constant \"a\"\n  ## inside\n  -> VAR \"x\"\n## before b\nFUNCTION Constant \"b\"\n## tail\n";
        let config = parse_statements(source, 0).unwrap();
        assert_eq!(config.statements[0].comments, vec!["## header", "## inside"]);
        assert_eq!(config.statements[1].comments, vec!["## before b"]);
        assert_eq!(config.trailing_comments, vec!["## tail"]);
    }

    #[test]
    fn collects_errors_from_every_line() {
        let source = "FUNCTION Nope\nFUNCTION Constant \"ok\"\nUTILITY List\n";
        let errors = parse_statements(source, 3).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].span, 9..13);
        assert!(errors.iter().all(|e| e.file_id == 3));
    }

    #[test]
    fn orphan_continuation_line() {
        let errors = parse_statements("  FUNCTION Constant", 0).unwrap_err();
        assert!(errors[0].message.contains("continuation"));
        assert_eq!(errors[0].span, 2..19);
    }

    #[test]
    fn crlf_line_endings() {
        let statements = parse_statements("FUNCTION Constant \"a\"\r\nFUNCTION Constant \"b\"\r\n", 0)
            .unwrap()
            .statements;
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1].span, 23..44);
    }
}
