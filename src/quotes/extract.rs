use super::patterns::RuleSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedQuote {
    pub quote: String,
    pub author: String,
}

/// Extracts a quote and its author from `text`.
///
/// Rules are tried in priority order and the first rule with any match wins.
/// Within that rule the last match in the text is used; everything before it
/// is kept as context in front of the quote, which is then re-wrapped in
/// quotation marks on its own line. Returns `None` when nothing matched or
/// the winning match left the quote or the author empty.
pub fn extract_quote(text: &str, rules: &RuleSet) -> Option<ExtractedQuote> {
    for rule in rules.iter() {
        let Some(caps) = rule.regex().captures_iter(text).last() else {
            continue;
        };
        let whole = caps.get(0)?;
        let (quote, author) = rule.mapping().apply(&caps);
        let (quote, author) = (quote.trim(), author.trim());
        if quote.is_empty() || author.is_empty() {
            return None;
        }

        let preceding = text[..whole.start()].trim();
        let quote = if !preceding.is_empty() {
            format!("{}\n\"{}\"", preceding, quote)
        } else if rule.is_quoted() {
            format!("\"{}\"", quote)
        } else {
            quote.to_string()
        };

        return Some(ExtractedQuote {
            quote,
            author: author.to_string(),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quotes::patterns::ExtractionRule;
    use std::sync::Arc;

    fn extract(text: &str) -> Option<(String, String)> {
        extract_quote(text, &RuleSet::builtin()).map(|q| (q.quote, q.author))
    }

    fn pair(quote: &str, author: &str) -> Option<(String, String)> {
        Some((quote.to_string(), author.to_string()))
    }

    #[test]
    fn test_quoted_dash() {
        assert_eq!(
            extract(r#""Ihr habt mommy issues" - Ich"#),
            pair(r#""Ihr habt mommy issues""#, "Ich")
        );
        assert_eq!(
            extract("„Kaffee ist Gemüse“ – Lena"),
            pair(r#""Kaffee ist Gemüse""#, "Lena")
        );
    }

    #[test]
    fn test_label_colon() {
        assert_eq!(
            extract("Jonathan: das ist die lösung"),
            pair("das ist die lösung", "Jonathan")
        );
        assert_eq!(
            extract(r#"Mia: "I never said that""#),
            pair("I never said that", "Mia")
        );
        // URLs are not attributions.
        assert_eq!(extract("see https://example.com"), None);
    }

    #[test]
    fn test_quoted_trailing() {
        assert_eq!(
            extract(r#""I am the captain now" Max"#),
            pair(r#""I am the captain now""#, "Max")
        );
    }

    #[test]
    fn test_nested_quotation_marks() {
        assert_eq!(
            extract(r#""He said "hi" loudly" Bob"#),
            pair(r#""He said "hi" loudly""#, "Bob")
        );
        assert_eq!(
            extract(r#""Sie meinte „nein“ dazu" - Lena"#),
            pair(r#""Sie meinte „nein“ dazu""#, "Lena")
        );
    }

    #[test]
    fn test_label_splits_at_last_colon() {
        assert_eq!(extract("A: B: c"), pair("c", "A: B"));
    }

    #[test]
    fn test_last_segment_wins_and_keeps_context() {
        let text = "\"Ich würd sagen up your ass\" - Nina, okay, crazy statement\n\
                    \"dann würd ich sagen gerne\" - Jonathan nein danke";
        let (quote, author) = extract(text).unwrap();
        assert_eq!(author, "Jonathan nein danke");
        assert_eq!(
            quote,
            "\"Ich würd sagen up your ass\" - Nina, okay, crazy statement\n\"dann würd ich sagen gerne\""
        );

        let (quote, author) = extract("\"first\" Anna\n\"second\" Ben").unwrap();
        assert_eq!(author, "Ben");
        assert_eq!(quote, "\"first\" Anna\n\"second\"");
    }

    #[test]
    fn test_same_line_segments() {
        let (quote, author) = extract(r#""a" - Bob "c" - Dan"#).unwrap();
        assert_eq!(author, "Dan");
        assert_eq!(quote, "\"a\" - Bob\n\"c\"");
    }

    #[test]
    fn test_no_match() {
        assert_eq!(extract("just chatting about lunch"), None);
        assert_eq!(extract(""), None);
        assert_eq!(extract("\"unattributed\""), None);
    }

    #[test]
    fn test_custom_rule_priority_and_reverse() {
        let rule = Arc::new(ExtractionRule::custom(r"(\w+) once said (.+)", true).unwrap());
        let rules = RuleSet::with_custom(rule);
        let result = extract_quote("Kim once said nothing is free", &rules).unwrap();
        assert_eq!(result.author, "Kim");
        assert_eq!(result.quote, "nothing is free");

        // Falls through to the builtins when the custom rule misses.
        let result = extract_quote("Kim: hello", &rules).unwrap();
        assert_eq!(result.author, "Kim");

        // Not leaked into other extractions.
        assert_eq!(extract("Kim once said nothing is free"), None);
    }

    #[test]
    fn test_custom_rule_empty_group_is_a_miss() {
        let rule = Arc::new(ExtractionRule::custom(r"<(.*)>\s*(\w*)", false).unwrap());
        let rules = RuleSet::with_custom(rule);
        assert_eq!(extract_quote("<hello>", &rules), None);
    }

    #[test]
    fn test_deterministic() {
        let text = "Leo: \"Ich bin müde\"\n\"noch was\" - Leo";
        let first = extract(text);
        for _ in 0..10 {
            assert_eq!(extract(text), first);
        }
    }
}
