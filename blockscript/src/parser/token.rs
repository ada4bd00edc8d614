use std::ops::Range;

use crate::keyword::Keyword;
use crate::parser::error::ParseError;

// ---------------------------------------------------------------------------
// Token types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `#name` or `#"quoted name"`, only recognized as the first token of a block.
    Label(String),
    /// Double-quoted string with `\"`, `\\`, `\n` and `\r` escapes resolved.
    Literal(String),
    /// Unquoted bare word: keywords, enum names, `VAR` / `CAP`.
    Parameter(String),
    /// `Name=True` / `Name=False`.
    Boolean { name: String, value: bool },
    Integer(i64),
    /// `->`
    Arrow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Label,
    Literal,
    Parameter,
    Boolean,
    Integer,
    Arrow,
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::Label(_) => TokenKind::Label,
            Token::Literal(_) => TokenKind::Literal,
            Token::Parameter(_) => TokenKind::Parameter,
            Token::Boolean { .. } => TokenKind::Boolean,
            Token::Integer(_) => TokenKind::Integer,
            Token::Arrow => TokenKind::Arrow,
        }
    }
}

/// A token together with the byte range it was scanned from.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Range<usize>,
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

/// Scan block text into tokens, left to right.
///
/// Newlines are plain whitespace here: continuation lines written by the
/// serializer tokenize exactly like the single-line form. Spans are shifted by
/// `base_offset` so they point into the enclosing source.
pub fn tokenize(text: &str, base_offset: usize, file_id: usize) -> Result<Vec<SpannedToken>, ParseError> {
    let mut tokens = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let start = i;

        if c == b'"' {
            let (value, end) = scan_literal(text, i).ok_or_else(|| {
                ParseError::error(
                    "unterminated string literal",
                    base_offset + start..base_offset + text.len(),
                    file_id,
                )
            })?;
            i = end;
            tokens.push(SpannedToken {
                token: Token::Literal(value),
                span: base_offset + start..base_offset + i,
            });
            continue;
        }

        if c == b'#' && tokens.is_empty() {
            i += 1;
            let name = if bytes.get(i) == Some(&b'"') {
                let (value, end) = scan_literal(text, i).ok_or_else(|| {
                    ParseError::error(
                        "unterminated label",
                        base_offset + start..base_offset + text.len(),
                        file_id,
                    )
                })?;
                i = end;
                value
            } else {
                let end = scan_word(bytes, i);
                let name = text[i..end].to_string();
                i = end;
                name
            };
            tokens.push(SpannedToken {
                token: Token::Label(name),
                span: base_offset + start..base_offset + i,
            });
            continue;
        }

        let end = scan_word(bytes, i);
        let word = &text[i..end];
        i = end;
        tokens.push(SpannedToken {
            token: classify_word(word),
            span: base_offset + start..base_offset + i,
        });
    }

    Ok(tokens)
}

/// Scan a quoted literal starting at the opening quote. Returns the unescaped
/// value and the index just past the closing quote.
fn scan_literal(text: &str, open: usize) -> Option<(String, usize)> {
    let mut value = String::new();
    let mut chars = text[open + 1..].char_indices();

    while let Some((offset, c)) = chars.next() {
        match c {
            '"' => return Some((value, open + 1 + offset + 1)),
            '\\' => match chars.next() {
                Some((_, '"')) => value.push('"'),
                Some((_, '\\')) => value.push('\\'),
                Some((_, 'n')) => value.push('\n'),
                Some((_, 'r')) => value.push('\r'),
                // Unknown escapes are kept verbatim.
                Some((_, other)) => {
                    value.push('\\');
                    value.push(other);
                }
                None => return None,
            },
            other => value.push(other),
        }
    }

    None
}

fn scan_word(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && !bytes[end].is_ascii_whitespace() {
        end += 1;
    }
    end
}

fn classify_word(word: &str) -> Token {
    if word == "->" {
        return Token::Arrow;
    }

    let digits = word.strip_prefix('-').unwrap_or(word);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = word.parse::<i64>() {
            return Token::Integer(n);
        }
    }

    if let Some((name, value)) = word.split_once('=') {
        let is_name = !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
        if is_name {
            if value.eq_ignore_ascii_case("true") {
                return Token::Boolean { name: name.to_string(), value: true };
            }
            if value.eq_ignore_ascii_case("false") {
                return Token::Boolean { name: name.to_string(), value: false };
            }
        }
    }

    Token::Parameter(word.to_string())
}

// ---------------------------------------------------------------------------
// Token stream
// ---------------------------------------------------------------------------

/// Cursor over the tokens of one block.
///
/// Optional clauses are handled with one token of lookahead: callers peek the
/// next kind and only consume when it matches the clause.
pub struct TokenStream {
    tokens: Vec<SpannedToken>,
    pos: usize,
    /// Byte offset of the end of the block text, used for errors at end of input.
    end: usize,
    file_id: usize,
}

impl TokenStream {
    pub fn new(tokens: Vec<SpannedToken>, end: usize, file_id: usize) -> Self {
        TokenStream { tokens, pos: 0, end, file_id }
    }

    pub fn from_text(text: &str, base_offset: usize, file_id: usize) -> Result<Self, ParseError> {
        let tokens = tokenize(text, base_offset, file_id)?;
        Ok(TokenStream::new(tokens, base_offset + text.len(), file_id))
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    pub fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(Token::kind)
    }

    /// Span of the next token, or an empty span at the end of the block.
    pub fn peek_span(&self) -> Range<usize> {
        self.tokens
            .get(self.pos)
            .map(|t| t.span.clone())
            .unwrap_or(self.end..self.end)
    }

    pub fn advance(&mut self) -> Option<SpannedToken> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn file_id(&self) -> usize {
        self.file_id
    }

    pub fn error(&self, msg: impl Into<String>) -> ParseError {
        ParseError::error(msg, self.peek_span(), self.file_id)
    }

    fn expected(&self, what: &str) -> ParseError {
        ParseError::expected(what, self.peek_span(), self.file_id)
    }

    /// Consume a leading label, if any.
    pub fn label(&mut self) -> Option<String> {
        match self.peek() {
            Some(Token::Label(_)) => match self.advance().map(|t| t.token) {
                Some(Token::Label(name)) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn expect_literal(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Literal(_)) => match self.advance().map(|t| t.token) {
                Some(Token::Literal(value)) => Ok(value),
                _ => Err(self.expected(what)),
            },
            _ => Err(self.expected(what)),
        }
    }

    /// Consume a literal only when one is next.
    pub fn optional_literal(&mut self) -> Option<String> {
        match self.peek_kind() {
            Some(TokenKind::Literal) => self.expect_literal("literal").ok(),
            _ => None,
        }
    }

    pub fn expect_parameter(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Parameter(_)) => match self.advance().map(|t| t.token) {
                Some(Token::Parameter(word)) => Ok(word),
                _ => Err(self.expected(what)),
            },
            _ => Err(self.expected(what)),
        }
    }

    pub fn expect_integer(&mut self, what: &str) -> Result<i64, ParseError> {
        match self.peek() {
            Some(Token::Integer(n)) => {
                let n = *n;
                self.pos += 1;
                Ok(n)
            }
            _ => Err(self.expected(what)),
        }
    }

    /// An integer that has to fit a non-negative 32-bit field.
    pub fn expect_count(&mut self, what: &str) -> Result<u32, ParseError> {
        let span = self.peek_span();
        let n = self.expect_integer(what)?;
        u32::try_from(n).map_err(|_| {
            ParseError::error(format!("{} must be a non-negative integer", what), span, self.file_id)
        })
    }

    /// Consume a specific bare keyword such as `KEY` or `FUNCTION`.
    pub fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        match self.peek() {
            Some(Token::Parameter(word)) if word.eq_ignore_ascii_case(keyword) => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.expected(keyword)),
        }
    }

    /// Consume a bare word naming a variant of `K`.
    pub fn expect_enum<K: Keyword>(&mut self, what: &str) -> Result<K, ParseError> {
        let span = self.peek_span();
        let word = self.expect_parameter(what)?;
        K::from_name(&word).ok_or_else(|| {
            let options: Vec<&str> = K::ALL.iter().map(|k| k.name()).collect();
            ParseError::error(format!("unknown {} '{}'", what, word), span, self.file_id)
                .with_note(format!("expected one of: {}", options.join(", ")))
        })
    }

    /// Consume every `Name=Bool` flag that follows, assigning it to the matching slot.
    /// A flag name that is not in `flags` is an error.
    pub fn read_flags(&mut self, flags: &mut [(&str, &mut bool)]) -> Result<(), ParseError> {
        while self.peek_kind() == Some(TokenKind::Boolean) {
            let span = self.peek_span();
            let Some(SpannedToken { token: Token::Boolean { name, value }, .. }) = self.advance() else {
                break;
            };
            match flags.iter_mut().find(|(flag, _)| flag.eq_ignore_ascii_case(&name)) {
                Some((_, slot)) => **slot = value,
                None => {
                    let known: Vec<&str> = flags.iter().map(|(flag, _)| *flag).collect();
                    let mut err = ParseError::error(format!("unknown flag '{}'", name), span, self.file_id);
                    if !known.is_empty() {
                        err = err.with_note(format!("accepted flags: {}", known.join(", ")));
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Consume `->` when it is next.
    pub fn arrow(&mut self) -> bool {
        if self.peek_kind() == Some(TokenKind::Arrow) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Fail if anything is left after the block's last clause.
    pub fn expect_end(&self) -> Result<(), ParseError> {
        match self.peek_kind() {
            None => Ok(()),
            Some(kind) => Err(self.error(format!("unexpected {:?} token after end of block", kind))),
        }
    }
}
