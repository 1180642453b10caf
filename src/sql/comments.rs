//! SQL comment stripping.

/// Remove `--` line comments and `/* ... */` block comments
///
/// Comment markers inside single-quoted literals or double-quoted identifiers
/// are left alone. A block comment becomes a single space so that stripping
/// never fuses the surrounding tokens; an unterminated block comment runs to
/// the end of the text. The newline ending a line comment is kept.
pub fn strip_comments(sql: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match (c, next) {
            ('\'', _) | ('"', _) => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            ('-', Some('-')) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            ('/', Some('*')) => {
                let mut j = i + 2;
                while j + 1 < chars.len() && !(chars[j] == '*' && chars[j + 1] == '/') {
                    j += 1;
                }
                i = if j + 1 < chars.len() { j + 2 } else { chars.len() };
                out.push(' ');
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Split on semicolons that are outside quoted text
///
/// Expects comment-free input.
pub fn split_statements(sql: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (idx, c) in sql.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == ';' => {
                parts.push(&sql[start..idx]);
                start = idx + 1;
            }
            None => {}
        }
    }
    parts.push(&sql[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_comment_removed_newline_kept() {
        assert_eq!(strip_comments("SELECT 1 -- hi\nFROM t"), "SELECT 1 \nFROM t");
    }

    #[test]
    fn test_block_comment_becomes_space() {
        assert_eq!(strip_comments("SELECT/*x*/1"), "SELECT 1");
        assert_eq!(strip_comments("SELECT 1 /* open"), "SELECT 1  ");
    }

    #[test]
    fn test_markers_inside_literals_survive() {
        let sql = "SELECT '--not a comment' AS a, \"/*col*/\" FROM t";
        assert_eq!(strip_comments(sql), sql);
    }

    #[test]
    fn test_slash_star_slash_is_not_closed() {
        assert_eq!(strip_comments("a /*/ b */ c"), "a   c");
    }

    #[test]
    fn test_strip_is_idempotent_on_tricky_input() {
        for sql in ["-/**/-x", "'a'--b\n'c'", "/*/*/*/", "x'--", "--\n--"] {
            let once = strip_comments(sql);
            assert_eq!(strip_comments(&once), once, "input {sql:?}");
        }
    }

    #[test]
    fn test_split_respects_quotes() {
        assert_eq!(
            split_statements("SELECT 'a;b' FROM t; DROP TABLE t;"),
            vec!["SELECT 'a;b' FROM t", " DROP TABLE t", ""]
        );
    }
}
