use blockscript::keyword::Comparer;
use regex::Regex;

use crate::error::RuntimeError;

/// `left <comparer> right`, both sides already substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition<'a> {
    pub left: &'a str,
    pub comparer: Comparer,
    pub right: &'a str,
}

impl<'a> Condition<'a> {
    pub fn new(left: &'a str, comparer: Comparer, right: &'a str) -> Self {
        Condition { left, comparer, right }
    }

    /// Numeric comparers fail on input that is not a number.
    pub fn verify(&self) -> Result<bool, RuntimeError> {
        let (left, right) = (self.left, self.right);
        let holds = match self.comparer {
            Comparer::LessThan => number(left)? < number(right)?,
            Comparer::LessThanOrEqual => number(left)? <= number(right)?,
            Comparer::GreaterThan => number(left)? > number(right)?,
            Comparer::GreaterThanOrEqual => number(left)? >= number(right)?,
            Comparer::EqualTo => left == right,
            Comparer::NotEqualTo => left != right,
            Comparer::Contains => left.contains(right),
            Comparer::DoesNotContain => !left.contains(right),
            Comparer::Exists => !left.is_empty(),
            Comparer::DoesNotExist => left.is_empty(),
            Comparer::MatchesRegex => Regex::new(right)?.is_match(left),
            Comparer::DoesNotMatchRegex => !Regex::new(right)?.is_match(left),
        };
        Ok(holds)
    }
}

/// Parse a culture-invariant decimal.
pub fn number(text: &str) -> Result<f64, RuntimeError> {
    let trimmed = text.trim();
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| RuntimeError::InvalidNumber(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(left: &str, comparer: Comparer, right: &str) -> bool {
        Condition::new(left, comparer, right).verify().unwrap()
    }

    #[test]
    fn numeric_comparisons() {
        assert!(check("2", Comparer::LessThan, "10"));
        assert!(check(" 3.5 ", Comparer::GreaterThanOrEqual, "3.5"));
        assert!(!check("-1", Comparer::GreaterThan, "0"));
    }

    #[test]
    fn numeric_comparison_on_text_is_an_error() {
        let err = Condition::new("abc", Comparer::LessThan, "1").verify().unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidNumber(s) if s == "abc"));
    }

    #[test]
    fn string_comparisons() {
        assert!(check("abc", Comparer::EqualTo, "abc"));
        assert!(check("abc", Comparer::Contains, "b"));
        assert!(check("abc", Comparer::DoesNotContain, "z"));
        assert!(check("x", Comparer::Exists, ""));
        assert!(check("", Comparer::DoesNotExist, "ignored"));
    }

    #[test]
    fn regex_comparisons() {
        assert!(check("1234", Comparer::MatchesRegex, r"^\d+$"));
        assert!(check("12a", Comparer::DoesNotMatchRegex, r"^\d+$"));
        assert!(matches!(
            Condition::new("x", Comparer::MatchesRegex, "(").verify(),
            Err(RuntimeError::Regex(_))
        ));
    }
}
