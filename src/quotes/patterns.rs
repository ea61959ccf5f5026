//! Extraction rules.
//!
//! A rule pairs a regex with a mapping from its capture groups to a
//! `(quote, author)` pair. The built-in rules are compiled once and never
//! mutated; a guild's custom rule is layered on top per call through
//! [`RuleSet`].

use crate::error::QuoteError;
use regex::{Captures, Regex};
use std::sync::{Arc, LazyLock};

/// Which capture group holds the quote and which the author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMapping {
    /// Group 1 is the quote, group 2 the author.
    QuoteFirst,
    /// Group 1 is the author, group 2 the quote.
    AuthorFirst,
}

impl GroupMapping {
    pub fn from_reversed(reversed: bool) -> Self {
        if reversed {
            GroupMapping::AuthorFirst
        } else {
            GroupMapping::QuoteFirst
        }
    }

    /// Returns `(quote, author)`; missing groups come back empty.
    pub fn apply<'t>(&self, caps: &Captures<'t>) -> (&'t str, &'t str) {
        let group = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or("");
        match self {
            GroupMapping::QuoteFirst => (group(1), group(2)),
            GroupMapping::AuthorFirst => (group(2), group(1)),
        }
    }
}

#[derive(Debug)]
pub struct ExtractionRule {
    name: String,
    regex: Regex,
    mapping: GroupMapping,
    /// The quote group sits between quotation marks in the source text, so the
    /// extracted quote gets them back.
    quoted: bool,
}

impl ExtractionRule {
    fn builtin(name: &str, pattern: &str, mapping: GroupMapping, quoted: bool) -> Self {
        Self {
            name: name.to_string(),
            regex: Regex::new(pattern).expect("built-in rule pattern must compile"),
            mapping,
            quoted,
        }
    }

    /// Compiles a guild supplied pattern. It must have at least two capture
    /// groups, one for the quote and one for the author.
    pub fn custom(pattern: &str, reversed: bool) -> Result<Self, QuoteError> {
        let regex =
            Regex::new(pattern).map_err(|e| QuoteError::InvalidPattern(e.to_string()))?;
        // captures_len counts the implicit whole-match group
        if regex.captures_len() < 3 {
            return Err(QuoteError::InvalidPattern(
                "the pattern needs two capture groups: quote and author".to_string(),
            ));
        }
        Ok(Self {
            name: "custom".to_string(),
            regex,
            mapping: GroupMapping::from_reversed(reversed),
            quoted: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn mapping(&self) -> GroupMapping {
        self.mapping
    }

    pub fn is_quoted(&self) -> bool {
        self.quoted
    }
}

// Straight, curly and German low quotation marks all open or close a quote.
// Quote text may itself contain quotation marks; the author may not.
const OPEN: &str = r#"["“„]"#;
const CLOSE: &str = r#"["”“]"#;
const INNER: &str = r#"[^"“”„\n]"#;

static BUILTIN_RULES: LazyLock<Vec<ExtractionRule>> = LazyLock::new(|| {
    vec![
        // "<quote>" <author>, the author running to the end of the line
        ExtractionRule::builtin(
            "quoted-trailing",
            &format!(r#"(?mR){OPEN}([^\n]+){CLOSE}[ \t]+([^\s"“”„\-–—]{INNER}*?)[ \t]*$"#),
            GroupMapping::QuoteFirst,
            true,
        ),
        // <author>: <quote>, split at the last colon
        ExtractionRule::builtin(
            "label-colon",
            r#"(?mR)^([^"\n]+):[ \t]+["“„]?(.+?)["”“]?[ \t]*$"#,
            GroupMapping::AuthorFirst,
            false,
        ),
        // "<quote>" - <author>
        ExtractionRule::builtin(
            "quoted-dash",
            &format!(r#"{OPEN}([^\n]+?){CLOSE}[ \t]*[-–—][ \t]*({INNER}+)"#),
            GroupMapping::QuoteFirst,
            true,
        ),
    ]
});

pub fn builtin_rules() -> &'static [ExtractionRule] {
    &BUILTIN_RULES
}

/// The effective rules for one extraction: an optional custom rule followed by
/// the built-ins. Cheap to clone and never shared mutably between guilds.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    custom: Option<Arc<ExtractionRule>>,
}

impl RuleSet {
    pub fn builtin() -> Self {
        Self { custom: None }
    }

    pub fn with_custom(custom: Arc<ExtractionRule>) -> Self {
        Self {
            custom: Some(custom),
        }
    }

    pub fn custom(&self) -> Option<&ExtractionRule> {
        self.custom.as_deref()
    }

    /// Rules in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &ExtractionRule> {
        self.custom.as_deref().into_iter().chain(builtin_rules().iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_order() {
        let names: Vec<_> = builtin_rules().iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["quoted-trailing", "label-colon", "quoted-dash"]);
    }

    #[test]
    fn test_custom_rule_goes_first() {
        let custom = Arc::new(ExtractionRule::custom(r"(.+) said (.+)", true).unwrap());
        let rules = RuleSet::with_custom(custom);
        let names: Vec<_> = rules.iter().map(|r| r.name()).collect();
        assert_eq!(names[0], "custom");
        assert_eq!(names.len(), builtin_rules().len() + 1);

        // Builtins are untouched by the custom rule.
        assert_eq!(RuleSet::builtin().iter().count(), builtin_rules().len());
    }

    #[test]
    fn test_custom_rule_validation() {
        assert!(matches!(
            ExtractionRule::custom("(unclosed", false),
            Err(QuoteError::InvalidPattern(_))
        ));
        assert!(matches!(
            ExtractionRule::custom("(only one)", false),
            Err(QuoteError::InvalidPattern(_))
        ));
        assert!(ExtractionRule::custom("(a)-(b)", false).is_ok());
    }

    #[test]
    fn test_group_mapping() {
        let re = Regex::new(r"(\w+)=(\w+)").unwrap();
        let caps = re.captures("left=right").unwrap();
        assert_eq!(GroupMapping::QuoteFirst.apply(&caps), ("left", "right"));
        assert_eq!(GroupMapping::AuthorFirst.apply(&caps), ("right", "left"));

        let re = Regex::new(r"(\w+)=(\d+)?").unwrap();
        let caps = re.captures("left=").unwrap();
        assert_eq!(GroupMapping::QuoteFirst.apply(&caps), ("left", ""));
    }
}
