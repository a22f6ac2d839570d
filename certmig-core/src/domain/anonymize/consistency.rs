// certmig-core/src/domain/anonymize/consistency.rs

use std::collections::BTreeMap;
use std::sync::Mutex;

/// Persistent `(rule_name, original_value) -> anonymized_value` mapping.
///
/// The map is the only mutable state shared across anonymization
/// workers; a single mutex guards it (map access is rare relative to
/// row transforms). Keys are `rule:original`; null originals never
/// reach the map because every strategy short-circuits on null input.
#[derive(Debug, Default)]
pub struct ConsistencyMap {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    mappings: BTreeMap<String, String>,
    token_counters: BTreeMap<String, u64>,
}

const TOKEN_PREFIX: &str = "TOKEN_";

impl ConsistencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a persisted map. Token counters are rebuilt from the
    /// highest `TOKEN_########` per rule so the counter stays strictly
    /// increasing across runs.
    pub fn from_mappings(mappings: BTreeMap<String, String>) -> Self {
        let mut token_counters: BTreeMap<String, u64> = BTreeMap::new();

        for (key, value) in &mappings {
            let Some((rule, _)) = key.split_once(':') else {
                continue;
            };
            if let Some(num) = value
                .strip_prefix(TOKEN_PREFIX)
                .and_then(|n| n.parse::<u64>().ok())
            {
                let counter = token_counters.entry(rule.to_string()).or_insert(0);
                *counter = (*counter).max(num);
            }
        }

        Self {
            inner: Mutex::new(Inner {
                mappings,
                token_counters,
            }),
        }
    }

    /// Snapshot for persistence.
    pub fn to_mappings(&self) -> BTreeMap<String, String> {
        match self.inner.lock() {
            Ok(inner) => inner.mappings.clone(),
            Err(poisoned) => poisoned.into_inner().mappings.clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(inner) => inner.mappings.len(),
            Err(poisoned) => poisoned.into_inner().mappings.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, rule: &str, original: &str) -> Option<String> {
        let key = Self::key(rule, original);
        match self.inner.lock() {
            Ok(inner) => inner.mappings.get(&key).cloned(),
            Err(poisoned) => poisoned.into_inner().mappings.get(&key).cloned(),
        }
    }

    /// Deterministic read-before-write: returns the stored mapping when
    /// present, otherwise stores and returns `generate()`'s value. The
    /// whole step happens under one lock so two workers seeing the same
    /// original always agree.
    pub fn resolve_with(
        &self,
        rule: &str,
        original: &str,
        generate: impl FnOnce() -> String,
    ) -> String {
        let key = Self::key(rule, original);
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(existing) = inner.mappings.get(&key) {
            return existing.clone();
        }
        let value = generate();
        inner.mappings.insert(key, value.clone());
        value
    }

    /// Token lookup: stored mapping when present, else the next
    /// `TOKEN_########` from this rule's counter.
    pub fn token_for(&self, rule: &str, original: &str) -> String {
        let key = Self::key(rule, original);
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(existing) = inner.mappings.get(&key) {
            return existing.clone();
        }
        let counter = inner.token_counters.entry(rule.to_string()).or_insert(0);
        *counter += 1;
        let token = format!("{}{:08}", TOKEN_PREFIX, *counter);
        inner.mappings.insert(key, token.clone());
        token
    }

    fn key(rule: &str, original: &str) -> String {
        format!("{}:{}", rule, original)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_stable() {
        let map = ConsistencyMap::new();
        let first = map.resolve_with("email_rule", "a@x.com", || "gen-1".into());
        let second = map.resolve_with("email_rule", "a@x.com", || "gen-2".into());
        assert_eq!(first, "gen-1");
        assert_eq!(second, "gen-1");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_token_counter_per_rule() {
        let map = ConsistencyMap::new();
        assert_eq!(map.token_for("ssn", "111"), "TOKEN_00000001");
        assert_eq!(map.token_for("ssn", "222"), "TOKEN_00000002");
        assert_eq!(map.token_for("ssn", "111"), "TOKEN_00000001");
        // Independent counter for another rule
        assert_eq!(map.token_for("license", "abc"), "TOKEN_00000001");
    }

    #[test]
    fn test_counters_rebuilt_from_persisted_map() {
        let mut mappings = BTreeMap::new();
        mappings.insert("ssn:111".to_string(), "TOKEN_00000001".to_string());
        mappings.insert("ssn:222".to_string(), "TOKEN_00000007".to_string());
        mappings.insert("email_rule:a@x.com".to_string(), "zoe@anon.example.org".to_string());

        let map = ConsistencyMap::from_mappings(mappings);

        // Existing keys resolve to the persisted value
        assert_eq!(map.token_for("ssn", "222"), "TOKEN_00000007");
        // New keys continue strictly after the highest persisted token
        assert_eq!(map.token_for("ssn", "333"), "TOKEN_00000008");
        assert_eq!(map.get("email_rule", "a@x.com").as_deref(), Some("zoe@anon.example.org"));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let map = ConsistencyMap::new();
        map.token_for("r", "x");
        map.resolve_with("s", "y", || "v".into());

        let restored = ConsistencyMap::from_mappings(map.to_mappings());
        assert_eq!(restored.get("r", "x").as_deref(), Some("TOKEN_00000001"));
        assert_eq!(restored.get("s", "y").as_deref(), Some("v"));
    }
}
