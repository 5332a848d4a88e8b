//! Secret values injected into a run.
//!
//! Secrets come from a secrets provider and are never logged, serialized
//! into execution records, or echoed through error messages. `Debug` only
//! reveals how many entries exist.

use std::collections::HashMap;
use std::fmt;

/// Marker substituted for secret values by [`Secrets::redact`].
pub const REDACTED: &str = "[REDACTED]";

/// A map of secret name to secret value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secrets(HashMap<String, String>);

impl Secrets {
    /// Creates an empty secret map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a secret.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts or replaces a secret.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Returns the secret with the given name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Returns the number of secrets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no secrets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over secret names and values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replaces every occurrence of a secret value in `text` with a marker.
    ///
    /// Longer values are replaced first so a secret that contains another
    /// one is masked whole.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        let mut values: Vec<&str> = self
            .0
            .values()
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .collect();
        values.sort_by_key(|v| std::cmp::Reverse(v.len()));

        values
            .into_iter()
            .fold(text.to_string(), |acc, value| acc.replace(value, REDACTED))
    }

    /// Returns true if `text` contains any secret value.
    #[must_use]
    pub fn leaks_into(&self, text: &str) -> bool {
        self.0.values().any(|v| !v.is_empty() && text.contains(v.as_str()))
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secrets({} redacted)", self.0.len())
    }
}

impl FromIterator<(String, String)> for Secrets {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_redacted() {
        let secrets = Secrets::new().with("API_KEY", "hunter2");
        let debug = format!("{secrets:?}");
        assert_eq!(debug, "Secrets(1 redacted)");
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn lookup_by_name() {
        let secrets = Secrets::new().with("TOKEN", "abc");
        assert_eq!(secrets.get("TOKEN"), Some("abc"));
        assert_eq!(secrets.get("OTHER"), None);
        assert_eq!(secrets.len(), 1);
    }

    #[test]
    fn redact_masks_values() {
        let secrets = Secrets::new()
            .with("TOKEN", "abc")
            .with("LONG", "abcdef")
            .with("EMPTY", "");
        assert_eq!(
            secrets.redact("key=abcdef&t=abc"),
            "key=[REDACTED]&t=[REDACTED]"
        );
        assert!(secrets.leaks_into("xxabcxx"));
        assert!(!secrets.leaks_into("nothing here"));
        assert_eq!(secrets.redact("plain"), "plain");
    }

    #[test]
    fn collects_from_pairs() {
        let secrets: Secrets = vec![("A".to_string(), "1".to_string())]
            .into_iter()
            .collect();
        assert!(!secrets.is_empty());
    }
}
