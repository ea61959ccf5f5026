/// Shortens `input` to at most `limit` characters, marking the cut with `…`.
pub fn truncate_chars(input: &str, limit: usize) -> String {
    if input.chars().count() <= limit {
        return input.to_string();
    }
    let mut out: String = input.chars().take(limit.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Inline code span that survives backticks in user input.
pub fn code_span(input: &str) -> String {
    format!("`{}`", input.replace('`', "ˋ"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("kurz", 10), "kurz");
        assert_eq!(truncate_chars("abcdef", 4), "abc…");
        // Multi-byte characters are never split.
        assert_eq!(truncate_chars("äöüäöü", 3), "äö…");
    }

    #[test]
    fn test_code_span() {
        assert_eq!(code_span(r"(\w+): (.+)"), r"`(\w+): (.+)`");
        assert_eq!(code_span("a`b"), "`aˋb`");
    }
}
