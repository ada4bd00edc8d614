//! String operations behind the text-processing functions.

use indexmap::IndexMap;
use rand::Rng;

use crate::error::RuntimeError;

// ---------------------------------------------------------------------------
// Translate
// ---------------------------------------------------------------------------

/// Replace dictionary keys with their values, longest key first. Keys of the
/// same length keep dictionary order.
pub fn translate(input: &str, dictionary: &IndexMap<String, String>, stop_after_first_match: bool) -> String {
    let mut entries: Vec<(&String, &String)> = dictionary.iter().filter(|(k, _)| !k.is_empty()).collect();
    entries.sort_by_key(|(k, _)| std::cmp::Reverse(k.chars().count()));

    let mut output = input.to_string();
    for (key, value) in entries {
        if output.contains(key.as_str()) {
            output = output.replace(key.as_str(), value);
            if stop_after_first_match {
                break;
            }
        }
    }
    output
}

// ---------------------------------------------------------------------------
// RandomString
// ---------------------------------------------------------------------------

const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const SYMBOLS: &str = "\\!\"£$%&/()=?^'{}[]@#,;.:-_*+";

/// Mask tokens in replacement priority order, with the pool each draws from.
fn mask_pools() -> [(&'static str, String); 8] {
    [
        ("?l", LOWERCASE.to_string()),
        ("?u", UPPERCASE.to_string()),
        ("?d", DIGITS.to_string()),
        ("?s", SYMBOLS.to_string()),
        ("?h", format!("{}abcdef", DIGITS)),
        ("?a", format!("{}{}{}{}", LOWERCASE, UPPERCASE, DIGITS, SYMBOLS)),
        ("?m", format!("{}{}", UPPERCASE, DIGITS)),
        ("?i", format!("{}{}{}", LOWERCASE, UPPERCASE, DIGITS)),
    ]
}

/// Expand every mask token, one occurrence at a time, until none is left.
///
/// A drawn symbol can itself complete a new token (`?` from the symbol pool
/// followed by a literal `l`), so scanning restarts after each replacement.
pub fn random_string<R: Rng + ?Sized>(template: &str, rng: &mut R) -> String {
    let pools: Vec<(&str, Vec<char>)> = mask_pools()
        .into_iter()
        .map(|(token, pool)| (token, pool.chars().collect()))
        .collect();

    let mut output = template.to_string();
    while let Some((token, pool)) = pools.iter().find(|(token, _)| output.contains(token)) {
        let Some(at) = output.find(token) else { break };
        let pick = pool[rng.gen_range(0..pool.len())];
        output.replace_range(at..at + token.len(), pick.encode_utf8(&mut [0; 4]));
    }
    output
}

/// Whether any mask token is left in `text`.
pub fn has_mask_token(text: &str) -> bool {
    mask_pools().iter().any(|(token, _)| text.contains(token))
}

// ---------------------------------------------------------------------------
// Escapes and entities
// ---------------------------------------------------------------------------

/// Resolve backslash escapes: `\n \r \t \\ \" \' \0 \uXXXX`. Anything else
/// after a backslash is kept as is.
pub fn unescape(input: &str) -> Result<String, RuntimeError> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('u') => {
                let hex: String = (0..4).filter_map(|_| chars.next()).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 4)
                    .ok_or_else(|| RuntimeError::Encoding(format!("invalid unicode escape '\\u{}'", hex)))?;
                let decoded = char::from_u32(code)
                    .ok_or_else(|| RuntimeError::Encoding(format!("invalid code point U+{:04X}", code)))?;
                out.push(decoded);
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Ok(out)
}

pub fn html_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '©',
        "reg" => '®',
        "euro" => '€',
        "pound" => '£',
        _ => return None,
    };
    Some(c)
}

/// Decode named and numeric (`&#39;`, `&#x27;`) entities. Unknown entities
/// are left untouched.
pub fn html_decode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after.find(';').and_then(|semi| {
            let entity = &after[..semi];
            let c = if let Some(num) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                u32::from_str_radix(num, 16).ok().and_then(char::from_u32)
            } else if let Some(num) = entity.strip_prefix('#') {
                num.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(entity)
            };
            c.map(|c| (c, semi))
        });
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// Counting and slicing
// ---------------------------------------------------------------------------

/// Non-overlapping occurrences of `needle`.
pub fn count_occurrences(input: &str, needle: &str) -> Result<usize, RuntimeError> {
    if needle.is_empty() {
        return Err(RuntimeError::custom("CountOccurrences needs a non-empty string to find"));
    }
    Ok(input.matches(needle).count())
}

pub fn parse_int(text: &str) -> Result<i64, RuntimeError> {
    text.trim()
        .parse()
        .map_err(|_| RuntimeError::InvalidNumber(text.to_string()))
}

pub fn char_at(input: &str, index: i64) -> Result<String, RuntimeError> {
    let len = input.chars().count();
    usize::try_from(index)
        .ok()
        .and_then(|i| input.chars().nth(i))
        .map(String::from)
        .ok_or(RuntimeError::IndexOutOfRange { index, len })
}

pub fn substring(input: &str, index: i64, length: i64) -> Result<String, RuntimeError> {
    let len = input.chars().count();
    let start = usize::try_from(index).map_err(|_| RuntimeError::IndexOutOfRange { index, len })?;
    let count = usize::try_from(length).map_err(|_| RuntimeError::IndexOutOfRange { index: length, len })?;
    if start > len || count > len - start {
        return Err(RuntimeError::IndexOutOfRange {
            index: index.saturating_add(length),
            len,
        });
    }
    Ok(input.chars().skip(start).take(count).collect())
}

/// Decimal with `$` and `,` group separators tolerated.
pub fn parse_decimal(text: &str) -> Result<f64, RuntimeError> {
    let cleaned: String = text.trim().chars().filter(|c| !matches!(c, '$' | ',')).collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| RuntimeError::InvalidNumber(text.to_string()))
}

/// Format a whole or fractional number without a trailing `.0`.
pub fn format_number(n: f64) -> String {
    if n == 0.0 { "0".to_string() } else { format!("{}", n) }
}

/// Split into pieces of at most `size` chars.
pub fn chunks(input: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars.chunks(size.max(1)).map(|c| c.iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn dict(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn translate_prefers_longer_keys() {
        let forward = dict(&[("ab", "X"), ("a", "Y")]);
        let reversed = dict(&[("a", "Y"), ("ab", "X")]);
        assert_eq!(translate("ab", &forward, true), "X");
        assert_eq!(translate("ab", &reversed, true), "X");
    }

    #[test]
    fn translate_applies_all_keys_when_not_stopping() {
        let d = dict(&[("ab", "X"), ("c", "Z")]);
        assert_eq!(translate("abc", &d, true), "Xc");
        assert_eq!(translate("abc", &d, false), "XZ");
        assert_eq!(translate("none", &d, false), "none");
    }

    #[test]
    fn random_string_leaves_no_mask_token() {
        let mut rng = StdRng::seed_from_u64(7);
        for template in ["?l?u?d?s?h?a?m?i", "?s?s?s?s?s?s?s?s?l", "x?dy?d", "??ll", "plain"] {
            for _ in 0..50 {
                let out = random_string(template, &mut rng);
                assert!(!has_mask_token(&out), "{:?} -> {:?}", template, out);
            }
        }
    }

    #[test]
    fn random_string_draws_from_the_right_pool() {
        let mut rng = StdRng::seed_from_u64(1);
        let out = random_string("?d?d?d-?u", &mut rng);
        let (digits, upper) = out.split_once('-').unwrap();
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
        assert!(upper.chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn unescape_sequences() {
        assert_eq!(unescape(r#"a\nb\t\"c\" \u0041\\"#).unwrap(), "a\nb\t\"c\" A\\");
        assert_eq!(unescape(r"keep \q").unwrap(), r"keep \q");
        assert!(unescape(r"\u00").is_err());
    }

    #[test]
    fn html_entities() {
        assert_eq!(html_encode(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
        assert_eq!(html_decode("&lt;p&gt; &#65;&#x42; &amp;amp; &bogus; &"), "<p> AB &amp; &bogus; &");
    }

    #[test]
    fn counting_and_slicing() {
        assert_eq!(count_occurrences("aaaa", "aa").unwrap(), 2);
        assert!(count_occurrences("a", "").is_err());
        assert_eq!(char_at("héllo", 1).unwrap(), "é");
        assert!(matches!(char_at("abc", 3), Err(RuntimeError::IndexOutOfRange { .. })));
        assert!(char_at("abc", -1).is_err());
        assert_eq!(substring("héllo", 1, 3).unwrap(), "éll");
        assert_eq!(substring("abc", 3, 0).unwrap(), "");
        assert!(substring("abc", 2, 2).is_err());
    }

    #[test]
    fn substring_with_huge_length_is_out_of_range() {
        assert!(matches!(
            substring("abc", 1, i64::MAX),
            Err(RuntimeError::IndexOutOfRange { index: i64::MAX, len: 3 })
        ));
        assert!(substring("abc", i64::MAX, i64::MAX).is_err());
    }

    #[test]
    fn decimals() {
        assert_eq!(parse_decimal("$1,234.5").unwrap(), 1234.5);
        assert!(parse_decimal("abc").is_err());
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.25), "2.25");
    }

    #[test]
    fn chunking() {
        assert_eq!(chunks("abcde", 2), vec!["ab", "cd", "e"]);
        assert_eq!(chunks("", 2), vec![""]);
    }
}
