//! Placeholder expansion for templates.
//!
//! `<NAME>` is replaced by the value of variable `NAME`. A selector suffix
//! picks part of a collection:
//!
//! | Placeholder | Meaning |
//! |---|---|
//! | `<L[2]>`, `<L[-1]>` | list element, negative counts from the end |
//! | `<M(key)>` | map value for `key` |
//! | `<M{value}>` | map key whose value is `value` |
//! | `<L[*]>`, `<M(*)>`, `<M{*}>` | fan-out markers: every element, value or key |
//!
//! Names that do not resolve are left verbatim.

use std::ops::Range;

use crate::variables::{CVar, CVarValue, VariableSource};

/// The three fan-out markers, as written in templates.
pub const FAN_OUT_MARKERS: [&str; 3] = ["[*]", "(*)", "{*}"];

/// Whether a template asks for list treatment of at least one reference.
pub fn has_fan_out_marker(template: &str) -> bool {
    FAN_OUT_MARKERS.iter().any(|m| template.contains(m))
}

// ---------------------------------------------------------------------------
// Placeholder parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selector<'a> {
    Whole,
    /// `[..]`
    Index(&'a str),
    /// `(..)`
    Key(&'a str),
    /// `{..}`
    Value(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placeholder<'a> {
    name: &'a str,
    selector: Selector<'a>,
}

impl<'a> Placeholder<'a> {
    fn parse(inner: &'a str) -> Self {
        let split = |open: char, close: char| -> Option<(&'a str, &'a str)> {
            let body = inner.strip_suffix(close)?;
            let at = body.find(open)?;
            Some((&body[..at], &body[at + open.len_utf8()..]))
        };

        if let Some((name, arg)) = split('[', ']') {
            return Placeholder { name, selector: Selector::Index(arg) };
        }
        if let Some((name, arg)) = split('(', ')') {
            return Placeholder { name, selector: Selector::Key(arg) };
        }
        if let Some((name, arg)) = split('{', '}') {
            return Placeholder { name, selector: Selector::Value(arg) };
        }
        Placeholder { name: inner, selector: Selector::Whole }
    }

    fn is_fan_out(&self) -> bool {
        matches!(
            self.selector,
            Selector::Index("*") | Selector::Key("*") | Selector::Value("*")
        )
    }

    /// The single string this placeholder stands for.
    fn scalar(&self, var: &CVar) -> Option<String> {
        match (self.selector, &var.value) {
            (Selector::Whole, value) => Some(value.render()),
            (Selector::Index("*"), CVarValue::Single(value)) => Some(value.clone()),
            (Selector::Index("*"), CVarValue::List(items)) => Some(items.first().cloned().unwrap_or_default()),
            (Selector::Index(index), CVarValue::List(items)) => {
                let index: i64 = index.trim().parse().ok()?;
                normalize_index(index, items.len()).map(|i| items[i].clone())
            }
            (Selector::Key("*"), CVarValue::Map(entries)) => Some(entries.values().next().cloned().unwrap_or_default()),
            (Selector::Key(key), CVarValue::Map(entries)) => entries.get(key).cloned(),
            (Selector::Value("*"), CVarValue::Map(entries)) => Some(entries.keys().next().cloned().unwrap_or_default()),
            (Selector::Value(wanted), CVarValue::Map(entries)) => {
                entries.iter().find(|(_, v)| v.as_str() == wanted).map(|(k, _)| k.clone())
            }
            _ => None,
        }
    }

    /// Every string a fan-out placeholder stands for.
    fn fan_out(&self, var: &CVar) -> Option<Vec<String>> {
        match (self.selector, &var.value) {
            (Selector::Index(_), CVarValue::Single(value)) => Some(vec![value.clone()]),
            (Selector::Index(_), CVarValue::List(items)) => Some(items.clone()),
            (Selector::Key(_), CVarValue::Map(entries)) => Some(entries.values().cloned().collect()),
            (Selector::Value(_), CVarValue::Map(entries)) => Some(entries.keys().cloned().collect()),
            _ => None,
        }
    }
}

/// In-range position for a possibly negative index.
fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

/// Byte ranges of every `<...>` in `template` with no `<` or `>` inside.
fn find_placeholders(template: &str) -> Vec<Range<usize>> {
    let mut found = Vec::new();
    let bytes = template.as_bytes();
    let mut start = None;

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'<' => start = Some(i),
            b'>' => {
                if let Some(open) = start.take() {
                    found.push(open..i + 1);
                }
            }
            _ => {}
        }
    }
    found
}

/// Replace each placeholder for which `pick` returns a value.
fn expand_once<S, F>(template: &str, vars: &S, mut pick: F) -> String
where
    S: VariableSource + ?Sized,
    F: FnMut(&Placeholder<'_>, &CVar) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for range in find_placeholders(template) {
        let placeholder = Placeholder::parse(&template[range.start + 1..range.end - 1]);
        let replacement = vars
            .lookup(placeholder.name)
            .and_then(|var| pick(&placeholder, &*var));
        if let Some(value) = replacement {
            out.push_str(&template[last..range.start]);
            out.push_str(&value);
            last = range.end;
        }
    }
    out.push_str(&template[last..]);
    out
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Scalar substitution: always produces one string.
///
/// Expansion repeats until the text stops changing, so a placeholder can be
/// built out of another one (`<L[<I>]>`). `max_passes` bounds self-referential
/// values.
pub fn substitute<S: VariableSource + ?Sized>(template: &str, vars: &S, max_passes: usize) -> String {
    expand_until_stable(template, vars, max_passes, false)
}

/// Fan-out substitution: one string per index of the longest referenced list.
///
/// Only references carrying a fan-out marker take part. A shorter list
/// reuses its last element and an empty one contributes the empty string.
/// Without any resolvable marker the result has exactly one element.
pub fn substitute_all<S: VariableSource + ?Sized>(template: &str, vars: &S, max_passes: usize) -> Vec<String> {
    let expanded = expand_until_stable(template, vars, max_passes, true);

    let mut columns: Vec<(Range<usize>, Vec<String>)> = Vec::new();
    for range in find_placeholders(&expanded) {
        let placeholder = Placeholder::parse(&expanded[range.start + 1..range.end - 1]);
        if !placeholder.is_fan_out() {
            continue;
        }
        if let Some(values) = vars.lookup(placeholder.name).and_then(|var| placeholder.fan_out(&*var)) {
            columns.push((range, values));
        }
    }

    if columns.is_empty() {
        return vec![expanded];
    }

    let count = columns.iter().map(|(_, values)| values.len()).max().unwrap_or(0).max(1);
    (0..count)
        .map(|i| {
            let mut out = String::with_capacity(expanded.len());
            let mut last = 0;
            for (range, values) in &columns {
                out.push_str(&expanded[last..range.start]);
                if let Some(value) = values.get(i).or_else(|| values.last()) {
                    out.push_str(value);
                }
                last = range.end;
            }
            out.push_str(&expanded[last..]);
            out
        })
        .collect()
}

fn expand_until_stable<S: VariableSource + ?Sized>(
    template: &str,
    vars: &S,
    max_passes: usize,
    keep_fan_out: bool,
) -> String {
    let mut current = template.to_string();
    for _ in 0..max_passes.max(1) {
        let next = expand_once(&current, vars, |placeholder, var| {
            if keep_fan_out && placeholder.is_fan_out() {
                None
            } else {
                placeholder.scalar(var)
            }
        });
        if next == current {
            break;
        }
        current = next;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::VariableList;
    use indexmap::IndexMap;

    fn vars() -> VariableList {
        let mut vars = VariableList::new();
        vars.set(CVar::single("NAME", "world"));
        vars.set(CVar::single("I", "1"));
        vars.set(CVar::list("L", vec!["a".into(), "b".into(), "c".into()]));
        vars.set(CVar::list("SHORT", vec!["x".into()]));
        vars.set(CVar::list("EMPTY", vec![]));
        let mut map = IndexMap::new();
        map.insert("k1".to_string(), "v1".to_string());
        map.insert("k2".to_string(), "v2".to_string());
        vars.set(CVar::map("M", map));
        vars
    }

    #[test]
    fn scalar_forms() {
        let vars = vars();
        assert_eq!(substitute("hello <NAME>", &vars, 16), "hello world");
        assert_eq!(substitute("<L>", &vars, 16), "[a, b, c]");
        assert_eq!(substitute("<L[0]><L[-1]>", &vars, 16), "ac");
        assert_eq!(substitute("<M>", &vars, 16), "{(k1, v1), (k2, v2)}");
        assert_eq!(substitute("<M(k2)>|<M{v1}>", &vars, 16), "v2|k1");
    }

    #[test]
    fn unresolved_placeholders_are_left_verbatim() {
        let vars = vars();
        assert_eq!(substitute("<NOPE> <L[9]> <M(zz)> <NAME[0]>", &vars, 16), "<NOPE> <L[9]> <M(zz)> <NAME[0]>");
        assert_eq!(substitute("a < b > c", &vars, 16), "a < b > c");
    }

    #[test]
    fn nested_placeholders_resolve_inside_out() {
        let vars = vars();
        assert_eq!(substitute("<L[<I>]>", &vars, 16), "b");
    }

    #[test]
    fn self_reference_stops_at_pass_limit() {
        let mut vars = VariableList::new();
        vars.set(CVar::single("X", "<X>!"));
        assert_eq!(substitute("<X>", &vars, 3), "<X>!!!");
    }

    #[test]
    fn scalar_mode_uses_first_element_for_markers() {
        let vars = vars();
        assert_eq!(substitute("<L[*]>/<M(*)>/<M{*}>", &vars, 16), "a/v1/k1");
    }

    #[test]
    fn fan_out_count_is_longest_list() {
        let vars = vars();
        assert_eq!(substitute_all("<L[*]>-<SHORT[*]>", &vars, 16), vec!["a-x", "b-x", "c-x"]);
        assert_eq!(substitute_all("<NAME>", &vars, 16), vec!["world"]);
    }

    #[test]
    fn fan_out_over_map_values_and_keys() {
        let vars = vars();
        assert_eq!(substitute_all("<M{*}>=<M(*)>", &vars, 16), vec!["k1=v1", "k2=v2"]);
    }

    #[test]
    fn fan_out_on_single_and_empty() {
        let vars = vars();
        assert_eq!(substitute_all("<NAME[*]>", &vars, 16), vec!["world"]);
        assert_eq!(substitute_all("[<EMPTY[*]>]", &vars, 16), vec!["[]"]);
        assert_eq!(substitute_all("<NOPE[*]>", &vars, 16), vec!["<NOPE[*]>"]);
    }

    #[test]
    fn marker_detection() {
        assert!(has_fan_out_marker("<A[*]>"));
        assert!(has_fan_out_marker("<A{*}>"));
        assert!(!has_fan_out_marker("<A[0]>"));
    }
}
