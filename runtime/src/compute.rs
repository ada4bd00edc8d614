//! Arithmetic expression evaluator behind the Compute function.

use crate::error::RuntimeError;

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
    Not,
    True,
    False,
}

fn tokenize(text: &str) -> Result<Vec<Token>, RuntimeError> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => {
                i += 1;
            }

            '0'..='9' | '.' => {
                let start = i;
                while i < len && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent: 1e5, 2.5E-3
                if i < len && matches!(chars[i], 'e' | 'E') {
                    let mut j = i + 1;
                    if j < len && matches!(chars[j], '+' | '-') {
                        j += 1;
                    }
                    if j < len && chars[j].is_ascii_digit() {
                        while j < len && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let num_str: String = chars[start..i].iter().collect();
                let n = num_str
                    .parse::<f64>()
                    .map_err(|_| RuntimeError::InvalidExpression(format!("invalid number '{}'", num_str)))?;
                tokens.push(Token::Number(n));
            }

            'a'..='z' | 'A'..='Z' => {
                let start = i;
                while i < len && chars[i].is_ascii_alphabetic() {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => {
                        return Err(RuntimeError::InvalidExpression(format!("unknown word '{}'", word)));
                    }
                };
                tokens.push(token);
            }

            // Two-character operators
            '<' if next == Some('=') => {
                tokens.push(Token::LtEq);
                i += 2;
            }
            '<' if next == Some('>') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '>' if next == Some('=') => {
                tokens.push(Token::GtEq);
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }

            _ => {
                let token = match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '=' => Token::Eq,
                    '<' => Token::Lt,
                    '>' => Token::Gt,
                    '!' => Token::Not,
                    other => {
                        return Err(RuntimeError::InvalidExpression(format!("unexpected character '{}'", other)));
                    }
                };
                tokens.push(token);
                i += 1;
            }
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Number(f64),
    Bool(bool),
}

impl Value {
    fn number(self) -> Result<f64, RuntimeError> {
        match self {
            Value::Number(n) => Ok(n),
            Value::Bool(_) => Err(RuntimeError::InvalidExpression("expected a number, got a boolean".into())),
        }
    }

    fn boolean(self) -> Result<bool, RuntimeError> {
        match self {
            Value::Bool(b) => Ok(b),
            Value::Number(_) => Err(RuntimeError::InvalidExpression("expected a boolean, got a number".into())),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) if *n == 0.0 => f.write_str("0"),
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pratt evaluator
// ---------------------------------------------------------------------------

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

/// Deepest nesting of parentheses and prefix operators accepted.
const MAX_DEPTH: usize = 256;

// Binding powers (precedence). Higher = tighter binding.
const BP_OR: u8 = 4; // OR ||
const BP_AND: u8 = 6; // AND &&
const BP_EQUALITY: u8 = 8; // = == <> !=
const BP_COMPARISON: u8 = 10; // < > <= >=
const BP_ADDITIVE: u8 = 12; // + -
const BP_MULTIPLICATIVE: u8 = 14; // * / %
const BP_UNARY: u8 = 16; // NOT -

impl ExprParser {
    fn new(tokens: Vec<Token>) -> Self {
        ExprParser { tokens, pos: 0, depth: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn error(&self, msg: impl Into<String>) -> RuntimeError {
        RuntimeError::InvalidExpression(msg.into())
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Value, RuntimeError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(format!("expression nested deeper than {} levels", MAX_DEPTH)));
        }
        self.depth += 1;
        let result = self.parse_operators(min_bp);
        self.depth -= 1;
        result
    }

    fn parse_operators(&mut self, min_bp: u8) -> Result<Value, RuntimeError> {
        let mut left = self.parse_prefix()?;

        loop {
            let Some(op) = self.peek().cloned() else { break };
            let Some((l_bp, r_bp)) = infix_bp(&op) else { break };
            if l_bp < min_bp {
                break;
            }
            self.advance();
            let right = self.parse_expr(r_bp)?;
            left = apply(&op, left, right)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Value, RuntimeError> {
        let token = self.advance().ok_or_else(|| self.error("unexpected end of expression"))?;

        match token {
            Token::Number(n) => Ok(Value::Number(n)),
            Token::True => Ok(Value::Bool(true)),
            Token::False => Ok(Value::Bool(false)),
            Token::Minus => Ok(Value::Number(-self.parse_expr(BP_UNARY)?.number()?)),
            Token::Plus => Ok(Value::Number(self.parse_expr(BP_UNARY)?.number()?)),
            Token::Not => Ok(Value::Bool(!self.parse_expr(BP_UNARY)?.boolean()?)),
            Token::LParen => {
                let inner = self.parse_expr(0)?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.error("expected ')'")),
                }
            }
            other => Err(self.error(format!("unexpected {:?}", other))),
        }
    }
}

/// Infix binding powers: returns (left_bp, right_bp) or None if not infix.
fn infix_bp(token: &Token) -> Option<(u8, u8)> {
    match token {
        Token::Or => Some((BP_OR, BP_OR + 1)),
        Token::And => Some((BP_AND, BP_AND + 1)),
        Token::Eq | Token::NotEq => Some((BP_EQUALITY, BP_EQUALITY + 1)),
        Token::Lt | Token::Gt | Token::LtEq | Token::GtEq => Some((BP_COMPARISON, BP_COMPARISON + 1)),
        Token::Plus | Token::Minus => Some((BP_ADDITIVE, BP_ADDITIVE + 1)),
        Token::Star | Token::Slash | Token::Percent => Some((BP_MULTIPLICATIVE, BP_MULTIPLICATIVE + 1)),
        _ => None,
    }
}

fn apply(op: &Token, left: Value, right: Value) -> Result<Value, RuntimeError> {
    let value = match op {
        Token::Or => Value::Bool(left.boolean()? || right.boolean()?),
        Token::And => Value::Bool(left.boolean()? && right.boolean()?),
        Token::Eq => Value::Bool(left == right),
        Token::NotEq => Value::Bool(left != right),
        Token::Lt => Value::Bool(left.number()? < right.number()?),
        Token::Gt => Value::Bool(left.number()? > right.number()?),
        Token::LtEq => Value::Bool(left.number()? <= right.number()?),
        Token::GtEq => Value::Bool(left.number()? >= right.number()?),
        Token::Plus => Value::Number(left.number()? + right.number()?),
        Token::Minus => Value::Number(left.number()? - right.number()?),
        Token::Star => Value::Number(left.number()? * right.number()?),
        Token::Slash | Token::Percent => {
            let (l, r) = (left.number()?, right.number()?);
            if r == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Value::Number(if *op == Token::Slash { l / r } else { l % r })
        }
        other => return Err(RuntimeError::InvalidExpression(format!("unexpected infix operator {:?}", other))),
    };
    Ok(value)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Evaluate an expression. A decimal comma is read as a decimal point.
pub fn evaluate(expression: &str) -> Result<Value, RuntimeError> {
    let normalized = expression.replace(',', ".");
    let tokens = tokenize(&normalized)?;
    if tokens.is_empty() {
        return Err(RuntimeError::InvalidExpression("empty expression".into()));
    }
    let mut parser = ExprParser::new(tokens);
    let value = parser.parse_expr(0)?;
    if !parser.at_end() {
        return Err(parser.error(format!("unexpected {:?} after expression", parser.peek())));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str) -> String {
        evaluate(text).unwrap().to_string()
    }

    #[test]
    fn precedence_and_grouping() {
        assert_eq!(eval("1 + 2 * 3"), "7");
        assert_eq!(eval("(1 + 2) * 3"), "9");
        assert_eq!(eval("10 - 4 - 3"), "3");
        assert_eq!(eval("-2 * -3"), "6");
        assert_eq!(eval("7 % 4"), "3");
    }

    #[test]
    fn decimals_and_decimal_comma() {
        assert_eq!(eval("5 / 2"), "2.5");
        assert_eq!(eval("1,5 + 1"), "2.5");
        assert_eq!(eval("0.1 * 0"), "0");
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(eval("3 > 2"), "True");
        assert_eq!(eval("2 = 3"), "False");
        assert_eq!(eval("1 <> 2 AND NOT (2 >= 3)"), "True");
        assert_eq!(eval("false || 1 <= 1"), "True");
    }

    #[test]
    fn errors() {
        assert!(matches!(evaluate("1 / 0"), Err(RuntimeError::DivisionByZero)));
        assert!(matches!(evaluate("1 +"), Err(RuntimeError::InvalidExpression(_))));
        assert!(matches!(evaluate("(1 + 2"), Err(RuntimeError::InvalidExpression(_))));
        assert!(matches!(evaluate("abc"), Err(RuntimeError::InvalidExpression(_))));
        assert!(matches!(evaluate("1 2"), Err(RuntimeError::InvalidExpression(_))));
        assert!(matches!(evaluate(""), Err(RuntimeError::InvalidExpression(_))));
        assert!(matches!(evaluate("true + 1"), Err(RuntimeError::InvalidExpression(_))));
    }

    #[test]
    fn deep_nesting_is_rejected_not_overflowed() {
        let unary = format!("{}1", "-".repeat(200_000));
        assert!(matches!(evaluate(&unary), Err(RuntimeError::InvalidExpression(m)) if m.contains("nested")));

        let parens = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(matches!(evaluate(&parens), Err(RuntimeError::InvalidExpression(_))));

        assert_eq!(eval(&format!("{}1{}", "(".repeat(100), ")".repeat(100))), "1");
        assert_eq!(eval(&format!("{}1", "-".repeat(100))), "1");
    }
}
