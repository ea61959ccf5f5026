use crate::db::GuildConfig;
use crate::error::QuoteError;
use crate::quotes::patterns::{ExtractionRule, RuleSet};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Compiled custom rules keyed by `(pattern, reversed)`.
///
/// Guilds sharing a pattern share the compiled rule; nothing here ever feeds
/// back into the built-in rule list.
#[derive(Clone)]
pub struct RuleCache {
    cache: Arc<Mutex<LruCache<(String, bool), Arc<ExtractionRule>>>>,
}

impl RuleCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn get_or_compile(
        &self,
        pattern: &str,
        reversed: bool,
    ) -> Result<Arc<ExtractionRule>, QuoteError> {
        let key = (pattern.to_string(), reversed);
        if let Some(rule) = self.cache.lock().unwrap().get(&key) {
            return Ok(rule.clone());
        }

        // Compile outside the lock; a racing insert of the same key is harmless.
        let rule = Arc::new(ExtractionRule::custom(pattern, reversed)?);
        self.cache.lock().unwrap().put(key, rule.clone());
        Ok(rule)
    }

    /// Effective rules for a guild. A stored pattern that no longer compiles
    /// falls back to the built-ins.
    pub fn rules_for(&self, config: &GuildConfig) -> RuleSet {
        let Some(pattern) = config.custom_pattern.as_deref() else {
            return RuleSet::builtin();
        };
        match self.get_or_compile(pattern, config.custom_pattern_reversed) {
            Ok(rule) => RuleSet::with_custom(rule),
            Err(e) => {
                warn!(
                    "Ignoring custom pattern for guild {}: {}",
                    config.guild_id, e
                );
                RuleSet::builtin()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_reuses_compiled_rules() {
        let cache = RuleCache::new(2);

        let a = cache.get_or_compile(r"(.+) by (.+)", false).unwrap();
        let b = cache.get_or_compile(r"(.+) by (.+)", false).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        // The reversed flag is part of the key.
        let c = cache.get_or_compile(r"(.+) by (.+)", true).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);

        // Stays within capacity.
        cache.get_or_compile(r"(.+) von (.+)", false).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalid_patterns_are_not_cached() {
        let cache = RuleCache::new(4);
        assert!(cache.get_or_compile("(broken", false).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_rules_for_guild() {
        let cache = RuleCache::new(4);
        let mut config = GuildConfig::new(1);
        assert!(cache.rules_for(&config).custom().is_none());

        config.custom_pattern = Some(r"(.+) ~ (.+)".to_string());
        assert!(cache.rules_for(&config).custom().is_some());

        config.custom_pattern = Some("(broken".to_string());
        assert!(cache.rules_for(&config).custom().is_none());
    }
}
