//! Lexical helpers over T-SQL expressions.
//!
//! This is not a parser. It only understands single-quoted string literals,
//! bracket-quoted identifiers and call sites (`name(`), which is enough for
//! rule-driven textual rewrites.

use crate::identifier::resolve_identifier;
use std::ops::Range;

/// A function call site found in an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CallSite {
    /// Lower-cased function name without schema.
    pub name: String,
    /// Whether the name was schema-qualified (`dbo.fn(`).
    pub qualified: bool,
}

/// Byte ranges of single-quoted string literals, quotes included.
pub(crate) fn literal_spans(expr: &str) -> Vec<Range<usize>> {
    let bytes = expr.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\'' {
            i += 1;
            continue;
        }
        let start = i;
        i += 1;
        loop {
            if i >= bytes.len() {
                spans.push(start..bytes.len());
                break;
            }
            if bytes[i] == b'\'' {
                // '' is an escaped quote inside the literal
                if bytes.get(i + 1) == Some(&b'\'') {
                    i += 2;
                    continue;
                }
                i += 1;
                spans.push(start..i);
                break;
            }
            i += 1;
        }
    }
    spans
}

fn in_spans(pos: usize, spans: &[Range<usize>]) -> bool {
    spans.iter().any(|s| s.contains(&pos))
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'@' | b'#' | b'$') || b >= 0x80
}

/// Case-insensitive occurrences of `pattern` outside string literals that
/// sit on identifier boundaries.
pub(crate) fn find_pattern(expr: &str, pattern: &str, spans: &[Range<usize>]) -> Vec<Range<usize>> {
    if pattern.is_empty() {
        return Vec::new();
    }
    let haystack = expr.to_ascii_lowercase();
    let needle = pattern.to_ascii_lowercase();
    let bytes = expr.as_bytes();
    let pat = needle.as_bytes();

    let starts_ident = is_ident_byte(pat[0]);
    let ends_ident = is_ident_byte(pat[pat.len() - 1]);

    haystack
        .match_indices(needle.as_str())
        .filter(|(idx, _)| !in_spans(*idx, spans))
        .filter(|(idx, _)| {
            if !starts_ident || *idx == 0 {
                return true;
            }
            let before = bytes[*idx - 1];
            !is_ident_byte(before) && before != b'.'
        })
        .filter(|(idx, m)| {
            let end = idx + m.len();
            !ends_ident || end >= bytes.len() || !is_ident_byte(bytes[end])
        })
        .map(|(idx, m)| idx..idx + m.len())
        .collect()
}

/// Every call site outside string literals, in order of appearance.
pub(crate) fn call_sites(expr: &str) -> Vec<CallSite> {
    let spans = literal_spans(expr);
    let bytes = expr.as_bytes();
    let mut calls = Vec::new();
    let mut i = 0;
    let mut after_dot = false;

    while i < bytes.len() {
        if in_spans(i, &spans) {
            i += 1;
            after_dot = false;
            continue;
        }

        let (name, next) = if bytes[i] == b'[' {
            match read_bracketed(expr, i) {
                Some((name, next)) => (name, next),
                None => break,
            }
        } else if is_ident_byte(bytes[i]) && !bytes[i].is_ascii_digit() {
            let start = i;
            let mut end = i;
            while end < bytes.len() && is_ident_byte(bytes[end]) {
                end += 1;
            }
            (expr[start..end].to_string(), end)
        } else {
            after_dot = bytes[i] == b'.';
            i += 1;
            continue;
        };

        let mut j = next;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if j < bytes.len() && bytes[j] == b'(' && !name.starts_with('@') {
            calls.push(CallSite {
                name: name.to_lowercase(),
                qualified: after_dot,
            });
        }
        after_dot = false;
        i = next;
    }

    calls
}

/// Read a `[bracketed]` identifier starting at `start`; `]]` is an escaped bracket.
fn read_bracketed(expr: &str, start: usize) -> Option<(String, usize)> {
    let bytes = expr.as_bytes();
    let mut name = String::new();
    let mut i = start + 1;
    let mut chunk_start = i;
    while i < bytes.len() {
        if bytes[i] == b']' {
            name.push_str(&expr[chunk_start..i]);
            if bytes.get(i + 1) == Some(&b']') {
                name.push(']');
                i += 2;
                chunk_start = i;
                continue;
            }
            return Some((name, i + 1));
        }
        i += 1;
    }
    None
}

/// Rewrite `[identifier]` to its target-dialect spelling outside string literals.
pub(crate) fn rewrite_bracket_identifiers(expr: &str) -> String {
    let spans = literal_spans(expr);
    let bytes = expr.as_bytes();
    let mut out = String::with_capacity(expr.len());
    let mut i = 0;
    let mut copied = 0;

    while i < bytes.len() {
        if bytes[i] == b'[' && !in_spans(i, &spans) {
            if let Some((name, next)) = read_bracketed(expr, i) {
                out.push_str(&expr[copied..i]);
                out.push_str(&resolve_identifier(&name));
                i = next;
                copied = next;
                continue;
            }
        }
        i += 1;
    }
    out.push_str(&expr[copied..]);
    out
}

/// The expression with every string literal collapsed to `''`.
pub(crate) fn mask_literals(expr: &str) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut last = 0;
    for span in literal_spans(expr) {
        out.push_str(&expr[last..span.start]);
        out.push_str("''");
        last = span.end;
    }
    out.push_str(&expr[last..]);
    out
}

/// Whether parentheses outside string literals balance.
pub(crate) fn parentheses_balanced(expr: &str) -> bool {
    let spans = literal_spans(expr);
    let mut depth: i64 = 0;
    for (i, b) in expr.bytes().enumerate() {
        if in_spans(i, &spans) {
            continue;
        }
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_spans_with_escaped_quote() {
        let expr = "name = 'O''Brien' and x = 'a'";
        let spans = literal_spans(expr);
        assert_eq!(spans.len(), 2);
        assert_eq!(&expr[spans[0].clone()], "'O''Brien'");
        assert_eq!(&expr[spans[1].clone()], "'a'");
    }

    #[test]
    fn test_find_pattern_respects_boundaries() {
        let expr = "datalength(x) + len(y) + dbo.len(z)";
        let hits = find_pattern(expr, "len(", &literal_spans(expr));
        assert_eq!(hits.len(), 1);
        assert_eq!(&expr[hits[0].clone()], "len(");
    }

    #[test]
    fn test_find_pattern_is_case_insensitive_and_skips_literals() {
        let expr = "GETDATE() > 'getdate()'";
        let hits = find_pattern(expr, "getdate()", &literal_spans(expr));
        assert_eq!(hits, vec![0..9]);
    }

    #[test]
    fn test_call_sites() {
        let calls = call_sites("isnull([qty], 0) * dbo.fn_rate(x) + [dbo].[scale] (y) - 'len(z)'");
        let names: Vec<_> = calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["isnull", "fn_rate", "scale"]);
        assert!(!calls[0].qualified);
        assert!(calls[1].qualified);
        assert!(calls[2].qualified);
    }

    #[test]
    fn test_keyword_parentheses_are_reported_as_calls() {
        // filtering keywords is the caller's job
        let calls = call_sites("x IN (1, 2)");
        assert_eq!(calls[0].name, "in");
    }

    #[test]
    fn test_rewrite_bracket_identifiers() {
        assert_eq!(
            rewrite_bracket_identifiers("[AccountNum] + [qty] LIKE '[a-z]%'"),
            "\"AccountNum\" + qty LIKE '[a-z]%'"
        );
        assert_eq!(rewrite_bracket_identifiers("[a]]b]"), "\"a]b\"");
    }

    #[test]
    fn test_mask_literals() {
        assert_eq!(mask_literals("a <> ';' AND b = 'x--y'"), "a <> '' AND b = ''");
        assert_eq!(mask_literals("note = 'it''s'"), "note = ''");
        assert_eq!(mask_literals("plain + 1"), "plain + 1");
    }

    #[test]
    fn test_parentheses_balanced() {
        assert!(parentheses_balanced("coalesce((x), 0)"));
        assert!(parentheses_balanced("x = ')'"));
        assert!(!parentheses_balanced("coalesce(x, 0"));
        assert!(!parentheses_balanced(")("));
    }
}
