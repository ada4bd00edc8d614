use std::fmt::Display;

use crate::block::OutputBinding;

/// Builds the canonical text of one block.
///
/// Optional clauses are only written when they differ from their declared
/// default, so serialized scripts stay close to what a person would type.
/// `indent` controls whether multi-entry fields go on indented continuation
/// lines; the parser accepts both layouts.
pub struct BlockWriter {
    lines: Vec<Vec<String>>,
    indent: bool,
    disabled: bool,
}

const INDENT: &str = "  ";

impl BlockWriter {
    pub fn new(indent: bool, disabled: bool) -> Self {
        BlockWriter {
            lines: vec![Vec::new()],
            indent,
            disabled,
        }
    }

    fn push(&mut self, part: String) -> &mut Self {
        if let Some(line) = self.lines.last_mut() {
            line.push(part);
        }
        self
    }

    /// Write `#label` unless it equals the kind's default label.
    ///
    /// A label starting with `#` is quoted, otherwise the line would read
    /// back as a `##` comment.
    pub fn label(&mut self, label: &str, default: &str) -> &mut Self {
        if label == default {
            return self;
        }
        let bare = !label.is_empty()
            && !label.starts_with('#')
            && !label.contains(|c: char| c.is_whitespace() || c == '"');
        if bare {
            self.push(format!("#{}", label))
        } else {
            self.push(format!("#{}", quote(label)))
        }
    }

    pub fn token(&mut self, token: impl Display) -> &mut Self {
        self.push(token.to_string())
    }

    pub fn literal(&mut self, value: &str) -> &mut Self {
        self.push(quote(value))
    }

    /// Write a literal unless it equals `default`. Only valid for clauses the
    /// parser treats as optional.
    pub fn literal_unless(&mut self, value: &str, default: &str) -> &mut Self {
        if value == default {
            return self;
        }
        self.literal(value)
    }

    pub fn integer(&mut self, value: impl Into<i64>) -> &mut Self {
        self.push(value.into().to_string())
    }

    /// Write `Name=True|False` unless the value equals `default`.
    pub fn flag(&mut self, name: &str, value: bool, default: bool) -> &mut Self {
        if value == default {
            return self;
        }
        self.push(format!("{}={}", name, if value { "True" } else { "False" }))
    }

    pub fn arrow(&mut self) -> &mut Self {
        self.push("->".to_string())
    }

    /// Write `-> VAR|CAP "name"` when an output binding is present.
    pub fn output(&mut self, output: Option<&OutputBinding>) -> &mut Self {
        if let Some(binding) = output {
            self.arrow()
                .token(if binding.capture { "CAP" } else { "VAR" })
                .literal(&binding.name);
        }
        self
    }

    /// Start a continuation line. Cosmetic only: no-op when not indenting.
    pub fn indent(&mut self) -> &mut Self {
        if self.indent {
            self.lines.push(Vec::new());
        }
        self
    }

    pub fn finish(&self) -> String {
        let mut out = String::new();
        if self.disabled {
            out.push('!');
        }
        let lines: Vec<String> = self
            .lines
            .iter()
            .filter(|line| !line.is_empty())
            .map(|line| line.join(" "))
            .collect();
        out.push_str(&lines.join(&format!("\n{}", INDENT)));
        out
    }
}

/// Quote and escape a string as a script literal.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_elided() {
        let mut w = BlockWriter::new(false, false);
        w.label("FUNCTION", "FUNCTION")
            .token("FUNCTION")
            .token("Replace")
            .literal("a")
            .literal("b")
            .flag("UseRegex", false, false)
            .literal_unless("", "")
            .output(None);
        assert_eq!(w.finish(), r#"FUNCTION Replace "a" "b""#);
    }

    #[test]
    fn non_default_values_are_written() {
        let mut w = BlockWriter::new(false, true);
        w.label("my step", "UTILITY")
            .token("UTILITY")
            .flag("Ascending", false, true)
            .output(Some(&OutputBinding { name: "x".into(), capture: true }));
        assert_eq!(w.finish(), r#"!#"my step" UTILITY Ascending=False -> CAP "x""#);
    }

    #[test]
    fn indent_starts_continuation_lines() {
        let mut w = BlockWriter::new(true, false);
        w.token("A").indent().token("B").indent();
        assert_eq!(w.finish(), "A\n  B");

        let mut flat = BlockWriter::new(false, false);
        flat.token("A").indent().token("B").indent();
        assert_eq!(flat.finish(), "A B");
    }

    #[test]
    fn quote_escapes_backslash_and_quote() {
        assert_eq!(quote(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[test]
    fn quote_escapes_line_breaks() {
        assert_eq!(quote("a\r\nb"), r#""a\r\nb""#);
    }

    #[test]
    fn hash_label_is_quoted() {
        let mut w = BlockWriter::new(false, false);
        w.label("#step", "FUNCTION").token("FUNCTION");
        assert_eq!(w.finish(), r##"#"#step" FUNCTION"##);
    }
}
