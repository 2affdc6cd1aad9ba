use std::mem::take;

/// Minimal CSV reader: quoted fields, doubled-quote escapes, CRLF.
/// Blank lines are skipped.
pub fn parse_rows(text: &str, sep: char) -> Vec<Vec<String>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            c if c == sep && !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(take(&mut field));
                if row.len() == 1 && row[0].is_empty() {
                    row.clear();
                } else {
                    rows.push(take(&mut row));
                }
            }
            _ => field.push(ch),
        }
    }

    // last line without a newline
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}

/// Index of the header named `name` (exact match).
pub fn column(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_rows() {
        let rows = parse_rows("a,b\n1,2\n", ',');
        assert_eq!(rows, vec![vec!["a", "b"], vec!["1", "2"]]);
    }

    #[test]
    fn quoted_separator_and_escape() {
        let rows = parse_rows("\"Foo, Bar\",\"say \"\"hi\"\"\"\n", ',');
        assert_eq!(rows, vec![vec!["Foo, Bar", "say \"hi\""]]);
    }

    #[test]
    fn crlf_and_blank_lines() {
        let rows = parse_rows("a,b\r\n\r\n1,2\r\n", ',');
        assert_eq!(rows, vec![vec!["a", "b"], vec!["1", "2"]]);
    }

    #[test]
    fn no_trailing_newline() {
        let rows = parse_rows("a,b\n1,", ',');
        assert_eq!(rows, vec![vec!["a", "b"], vec!["1", ""]]);
    }

    #[test]
    fn byte_order_mark_is_dropped() {
        let rows = parse_rows("\u{feff}city,lat\n", ',');
        assert_eq!(column(&rows[0], "city"), Some(0));
    }

    #[test]
    fn column_lookup() {
        let headers = vec!["city".to_string(), "state_id".to_string()];
        assert_eq!(column(&headers, "state_id"), Some(1));
        assert_eq!(column(&headers, "lat"), None);
    }
}
