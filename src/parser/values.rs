// VALUES-clause parsing: split the body of a multi-row INSERT into records,
// split records into fields, and decode field literals. We intentionally
// keep parsing simple (no full SQL grammar); dumps only ever contain the
// VALUES (...), (...) shape with string/NULL literals.

use crate::parser::FieldValue;

// Split the VALUES body into one substring per top-level parenthesized
// record, in source order. Parentheses nested inside a record (e.g. inside
// JSON embedded in a string literal) are kept as content via depth tracking.
//
// The scan is depth-only, not quote-aware: an unbalanced ')' inside a string
// literal will truncate the containing record and shift the rest of the
// scan. Dumps produced by the exporters we target never contain one, and a
// trailing record left open by truncated input is dropped rather than
// reported, so damage stays local.
pub fn split_records(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;

    for (i, c) in text.char_indices() {
        match c {
            '(' if depth == 0 => {
                depth = 1;
                start = i + 1;
            }
            '(' => depth += 1,
            ')' if depth > 1 => depth -= 1,
            ')' if depth == 1 => {
                spans.push(&text[start..i]);
                depth = 0;
            }
            // Separators between records and any stray character at depth 0.
            _ => {}
        }
    }

    spans
}

// Split one record interior into decoded fields. Two-state scan: a comma is
// a field boundary only outside a string literal, and a doubled quote inside
// a literal is the SQL escape for one quote character, consumed with one
// character of lookahead so it never toggles the quote state.
//
// Raw tokens keep their surrounding quotes; decode_field strips them. A
// trailing comma yields a final empty field rather than being dropped.
pub fn tokenize_fields(record_text: &str) -> Vec<FieldValue> {
    let mut fields = Vec::new();
    let mut buf = String::new();
    let mut in_quote = false;
    let mut saw_separator = false;
    let mut chars = record_text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quote {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    // Escaped quote, not a boundary. Keep both characters so
                    // decode_field can collapse them.
                    chars.next();
                    buf.push_str("''");
                } else {
                    buf.push(c);
                    in_quote = false;
                }
            } else {
                buf.push(c);
            }
        } else if c == '\'' {
            buf.push(c);
            in_quote = true;
        } else if c == ',' {
            fields.push(decode_field(&buf));
            buf.clear();
            saw_separator = true;
        } else {
            buf.push(c);
        }
    }

    if !buf.trim().is_empty() || saw_separator {
        fields.push(decode_field(&buf));
    }

    fields
}

// Decode one raw field token. NULL (exact) is the absent value; a quoted
// token loses exactly one outer quote pair and has every interior '' pair
// collapsed to a single quote; anything else (bare numbers, timestamps)
// passes through trimmed for the caller to interpret.
pub fn decode_field(raw: &str) -> FieldValue {
    let token = raw.trim();
    if token == "NULL" {
        return FieldValue::Null;
    }
    if token.len() >= 2 && token.starts_with('\'') && token.ends_with('\'') {
        let interior = &token[1..token.len() - 1];
        return FieldValue::Text(interior.replace("''", "'"));
    }
    FieldValue::Text(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(fields: &[FieldValue]) -> Vec<Option<&str>> {
        fields.iter().map(|f| f.as_text()).collect()
    }

    #[test]
    fn test_split_top_level_groups() {
        let spans = split_records("('a', 'b'), ('c'), ('d', 'e')");
        assert_eq!(spans, vec!["'a', 'b'", "'c'", "'d', 'e'"]);
    }

    #[test]
    fn test_split_keeps_nested_parens_as_content() {
        let spans = split_records("('json (a, (b))', 'x'), ('y')");
        assert_eq!(spans, vec!["'json (a, (b))', 'x'", "'y'"]);
    }

    #[test]
    fn test_split_drops_unclosed_trailing_record() {
        // Truncated dump: the last record never closes and is discarded.
        let spans = split_records("('a', 'b'), ('c', 'd'");
        assert_eq!(spans, vec!["'a', 'b'"]);
    }

    #[test]
    fn test_splitter_is_quote_blind() {
        // Known limitation: the splitter does not track quote state, so an
        // unbalanced ')' inside a string literal closes the record early.
        // This pins the documented behavior; do not "fix" silently.
        let spans = split_records("('a :) b', 'x'), ('y')");
        assert_eq!(spans, vec!["'a :", "'y'"]);
    }

    #[test]
    fn test_tokenize_simple_values() {
        let fields = tokenize_fields("'a', 'b', NULL, '123'");
        assert_eq!(
            fields,
            vec![
                FieldValue::Text("a".into()),
                FieldValue::Text("b".into()),
                FieldValue::Null,
                FieldValue::Text("123".into()),
            ]
        );
    }

    #[test]
    fn test_tokenize_preserves_comma_in_string() {
        // The comma sits inside a literal, so it is content, not a boundary.
        let fields = tokenize_fields("'hello, world', 'x'");
        assert_eq!(texts(&fields), vec![Some("hello, world"), Some("x")]);
    }

    #[test]
    fn test_tokenize_splits_comma_without_space() {
        // Unlike a trailing-space heuristic, a bare comma outside quotes
        // still separates fields.
        let fields = tokenize_fields("NULL,'a',1");
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0], FieldValue::Null);
        assert_eq!(fields[1].as_text(), Some("a"));
        assert_eq!(fields[2].as_text(), Some("1"));
    }

    #[test]
    fn test_tokenize_trims_surrounding_whitespace() {
        let fields = tokenize_fields("  'a'  , 'b'");
        assert_eq!(texts(&fields), vec![Some("a"), Some("b")]);
    }

    #[test]
    fn test_tokenize_trailing_comma_yields_empty_field() {
        let fields = tokenize_fields("'a',");
        assert_eq!(texts(&fields), vec![Some("a"), Some("")]);
    }

    #[test]
    fn test_decode_doubled_quote_collapses_once() {
        assert_eq!(
            decode_field("'it''s here'"),
            FieldValue::Text("it's here".into())
        );
        // Four quotes inside a literal are two escapes, two quotes out.
        assert_eq!(
            decode_field("'a''''b'"),
            FieldValue::Text("a''b".into())
        );
    }

    #[test]
    fn test_decode_null_is_case_sensitive() {
        assert_eq!(decode_field("NULL"), FieldValue::Null);
        assert_eq!(decode_field("null"), FieldValue::Text("null".into()));
    }

    #[test]
    fn test_decode_empty_string_literal() {
        assert_eq!(decode_field("''"), FieldValue::Text(String::new()));
    }

    #[test]
    fn test_decode_bare_literal_passes_through() {
        assert_eq!(
            decode_field(" 2025-01-15 08:30:00+00 "),
            FieldValue::Text("2025-01-15 08:30:00+00".into())
        );
        assert_eq!(decode_field("42"), FieldValue::Text("42".into()));
    }

    #[test]
    fn test_escaped_quote_does_not_toggle_state() {
        // The '' escape must not flip the quote state, or the comma after
        // it would be swallowed into the first field.
        let fields = tokenize_fields("'it''s, still one', 'two'");
        assert_eq!(
            texts(&fields),
            vec![Some("it's, still one"), Some("two")]
        );
    }
}
