use crate::classify::{Message, Role};
use indexmap::IndexMap;
use serde::Serialize;

/// Per-category occurrence counts over a fixed, ordered category set.
///
/// Every configured category is present from construction (at zero) and the
/// key set never changes afterwards, so iteration order is always the
/// configured order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CategoryTally {
    counts: IndexMap<String, u64>,
}

impl CategoryTally {
    /// A zeroed tally. Duplicate names collapse onto their first position.
    pub fn new<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut counts = IndexMap::new();
        for name in categories {
            counts.entry(name.into()).or_insert(0);
        }
        Self { counts }
    }

    /// A zeroed tally with the same category set as `self`.
    pub fn empty_like(&self) -> Self {
        Self::new(self.counts.keys().cloned())
    }

    #[cfg(test)]
    pub fn get(&self, category: &str) -> Option<u64> {
        self.counts.get(category).copied()
    }

    /// `(name, count)` pairs in configured order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Count quoted category markers in a piece of raw text.
    ///
    /// A marker is the category name wrapped in double quotes, either bare
    /// (`"Billing"`) or JSON-escaped (`\"Billing\"`). The quotes are part of
    /// the pattern, so `"BillingIssue"` never counts towards `Billing`. The
    /// two forms can't overlap: an escaped marker always has a backslash
    /// before its closing quote.
    pub fn scan_text(&mut self, text: &str) {
        for (name, count) in self.counts.iter_mut() {
            let plain = format!("\"{name}\"");
            let escaped = format!("\\\"{name}\\\"");
            *count += (text.matches(plain.as_str()).count()
                + text.matches(escaped.as_str()).count()) as u64;
        }
    }

    /// Scan the DEBUG messages of a transcript. Other roles are ignored.
    pub fn scan_messages(&mut self, messages: &[Message]) {
        for message in messages.iter().filter(|m| m.role == Role::Debug) {
            self.scan_text(&message.content);
        }
    }

    /// Element-wise sum of another tally into this one. Categories that
    /// `other` has but `self` doesn't are ignored.
    pub fn merge(&mut self, other: &CategoryTally) {
        for (name, n) in other.iter() {
            if let Some(count) = self.counts.get_mut(name) {
                *count += n;
            }
        }
    }
}
