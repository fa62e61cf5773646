//! Repair of malformed client filter expressions.
//!
//! Some game clients emit filters where two conditions are glued together
//! without a connective (`numplayers > 0gametype like '%gpm_cq%'`) or where
//! an unescaped quote sits inside a string literal (`hostname like 'flyin'
//! high'`). Normalization runs four passes in order: bracket escaping,
//! missing-connective repair, quote de-nesting and whitespace collapse.
//!
//! Each repair pass is best-effort. A pass that fails is logged and
//! skipped, leaving the expression as the previous pass produced it; a
//! broken filter must never take the request down with it.

use log::warn;
use shared::FILTERABLE_ATTRIBUTES;

/// Connective inserted by the missing-connective repair pass.
const INSERTED_CONNECTIVE: &str = " && ";

/// Normalizes a raw filter expression into a well-formed predicate string.
pub fn normalize_filter(raw: &str) -> String {
    let mut filter = escape_brackets(raw);

    filter = match repair_connectives(&filter) {
        Ok(repaired) => repaired,
        Err(e) => {
            warn!("Connective repair failed on {:?}: {}", filter, e);
            filter
        }
    };

    filter = match repair_quotes(&filter) {
        Ok(repaired) => repaired,
        Err(e) => {
            warn!("Quote repair failed on {:?}: {}", filter, e);
            filter
        }
    };

    collapse_whitespace(&filter)
}

/// Pass A: escapes literal `[` as `[[]` so the evaluator does not read it
/// as the start of a wildcard character class. Brackets that are already
/// escaped are left alone, keeping the pass idempotent.
fn escape_brackets(filter: &str) -> String {
    let chars: Vec<char> = filter.chars().collect();
    let mut out = String::with_capacity(filter.len());

    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '[' {
            out.push_str("[[]");
            if chars.get(i + 1) == Some(&'[') && chars.get(i + 2) == Some(&']') {
                i += 3;
            } else {
                i += 1;
            }
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }

    out
}

/// Pass B: inserts ` && ` in front of any filterable attribute name that is
/// not already preceded by a connective, a comparison operator or a
/// grouping parenthesis.
///
/// The expression is rescanned as it mutates, so insertions shift later
/// occurrences correctly.
fn repair_connectives(filter: &str) -> Result<String, String> {
    let mut expr: Vec<char> = filter.chars().collect();

    // An insertion per attribute occurrence is the most this pass can do;
    // growth beyond that means the scan went wrong.
    let growth_cap = expr.len() * (INSERTED_CONNECTIVE.len() + 1) + INSERTED_CONNECTIVE.len();

    for name in FILTERABLE_ATTRIBUTES {
        let pattern: Vec<char> = name.chars().collect();
        let mut from = 0;

        while let Some(at) = find_from(&expr, &pattern, from) {
            if at > 0 && !preceded_by_connective(&expr, at) {
                if expr.len() > growth_cap {
                    return Err("expression grew past the insertion cap".to_string());
                }
                let insert: Vec<char> = INSERTED_CONNECTIVE.chars().collect();
                expr.splice(at..at, insert);
                from = at + INSERTED_CONNECTIVE.len() + pattern.len();
            } else {
                from = at + pattern.len();
            }
        }
    }

    Ok(expr.into_iter().collect())
}

/// Finds the next occurrence of `pattern` in `haystack` at or after `from`.
fn find_from(haystack: &[char], pattern: &[char], from: usize) -> Option<usize> {
    if pattern.is_empty() || haystack.len() < pattern.len() {
        return None;
    }
    (from..=haystack.len() - pattern.len()).find(|&i| &haystack[i..i + pattern.len()] == pattern)
}

/// Checks whether the text just before `at` (ignoring whitespace) already
/// ends in a logical connective, a comparison operator or a parenthesis.
fn preceded_by_connective(expr: &[char], at: usize) -> bool {
    let mut end = at;
    while end > 0 && expr[end - 1].is_whitespace() {
        end -= 1;
    }
    if end == 0 {
        return false;
    }

    // Single-character endings cover (, ), =, <, > and with them the tails
    // of ==, !=, <>, <= and >=.
    if matches!(expr[end - 1], '(' | ')' | '=' | '<' | '>') {
        return true;
    }

    if end >= 2 {
        let pair: String = expr[end - 2..end].iter().collect();
        if pair == "&&" || pair == "||" {
            return true;
        }
    }

    // Word tokens need a boundary so e.g. a value ending in "grand" does
    // not pass as "and". "like" also covers the tail of "not like".
    for word in ["and", "or", "like"] {
        let len = word.len();
        if end < len {
            continue;
        }
        let tail: String = expr[end - len..end].iter().collect();
        if !tail.eq_ignore_ascii_case(word) {
            continue;
        }
        let bounded = end == len || {
            let before = expr[end - len - 1];
            !before.is_alphanumeric() && before != '_'
        };
        if bounded {
            return true;
        }
    }

    false
}

/// Pass C: rewrites quote characters nested inside string literals to the
/// `_` wildcard so the literal spans to its true delimiter.
///
/// A literal starts at the first quote after a comparison operator. While
/// inside one, a quote only closes it when the next non-whitespace content
/// is a logical connective or the end of input; any other quote is part of
/// the text and becomes a single-character wildcard.
fn repair_quotes(filter: &str) -> Result<String, String> {
    let mut chars: Vec<char> = filter.chars().collect();
    let mut inside_literal = false;

    let mut i = 0;
    let mut steps = 0;
    while i < chars.len() {
        steps += 1;
        if steps > chars.len() * 2 + 2 {
            return Err("scan stopped advancing".to_string());
        }

        if !inside_literal {
            if let Some(op_len) = comparison_at(&chars, i) {
                i += op_len;
                while i < chars.len() && chars[i].is_whitespace() {
                    i += 1;
                }
                if i < chars.len() && (chars[i] == '\'' || chars[i] == '"') {
                    inside_literal = true;
                    i += 1;
                }
            } else {
                i += 1;
            }
        } else if chars[i] == '\'' || chars[i] == '"' {
            let mut next = i + 1;
            while next < chars.len() && chars[next].is_whitespace() {
                next += 1;
            }
            if next >= chars.len() {
                // End of input closes the literal implicitly.
                inside_literal = false;
                i = next;
            } else if let Some(conn_len) = logical_at(&chars, next) {
                inside_literal = false;
                i = next + conn_len;
            } else {
                chars[i] = '_';
                i += 1;
            }
        } else {
            i += 1;
        }
    }

    Ok(chars.into_iter().collect())
}

/// Matches a comparison operator at `i`, longest first, returning its
/// length. Word operators require boundaries on both sides.
fn comparison_at(chars: &[char], i: usize) -> Option<usize> {
    if word_at(chars, i, "not") {
        let mut j = i + 3;
        while j < chars.len() && chars[j].is_whitespace() {
            j += 1;
        }
        if word_at(chars, j, "like") {
            return Some(j + 4 - i);
        }
    }
    if word_at(chars, i, "like") {
        return Some(4);
    }

    for symbol in ["==", "!=", "<>", "<=", ">="] {
        if symbol_at(chars, i, symbol) {
            return Some(2);
        }
    }
    for symbol in ["=", "<", ">"] {
        if symbol_at(chars, i, symbol) {
            return Some(1);
        }
    }

    None
}

/// Matches a logical connective at `i`, returning its length.
fn logical_at(chars: &[char], i: usize) -> Option<usize> {
    if symbol_at(chars, i, "&&") || symbol_at(chars, i, "||") {
        return Some(2);
    }
    if word_at(chars, i, "and") {
        return Some(3);
    }
    if word_at(chars, i, "or") {
        return Some(2);
    }
    None
}

fn symbol_at(chars: &[char], i: usize, symbol: &str) -> bool {
    let pattern: Vec<char> = symbol.chars().collect();
    chars.len() >= i + pattern.len() && chars[i..i + pattern.len()] == pattern[..]
}

fn word_at(chars: &[char], i: usize, word: &str) -> bool {
    let len = word.len();
    if chars.len() < i + len {
        return false;
    }
    let segment: String = chars[i..i + len].iter().collect();
    if !segment.eq_ignore_ascii_case(word) {
        return false;
    }

    let left_ok = i == 0 || {
        let c = chars[i - 1];
        !c.is_alphanumeric() && c != '_'
    };
    let right_ok = i + len == chars.len() || {
        let c = chars[i + len];
        !c.is_alphanumeric() && c != '_'
    };
    left_ok && right_ok
}

/// Pass D: collapses whitespace runs to single spaces and trims the ends.
fn collapse_whitespace(filter: &str) -> String {
    filter.split_whitespace().collect::<Vec<_>>().join(" ")
}
