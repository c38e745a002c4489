//! Topic matcher capability.
//!
//! Patterns are split into words on a configurable separator. Within a
//! pattern, `wildcard_one` matches exactly one word and `wildcard_some`
//! matches zero or more words. Matchers run in de-duplicated mode: adding the
//! same pattern/value pair twice records it once.

mod options;
mod trie;

use std::collections::HashSet;
use std::hash::Hash;

use crate::error::Result;

pub use options::MatcherOptions;
pub use trie::TopicTrie;

/// Wildcard matcher contract consumed by the policy engine.
///
/// Any matcher honouring these semantics is substitutable for [`TopicTrie`].
pub trait TopicMatcher<V: Eq + Hash + Clone> {
    /// Tokenizer settings this matcher was built with.
    fn options(&self) -> &MatcherOptions;

    /// Split `topic` into words, enforcing word and wildcard-some limits.
    fn validate<'a>(&self, topic: &'a str) -> Result<Vec<&'a str>>;

    /// Associate `value` with `pattern`.
    fn add(&mut self, pattern: &str, value: V) -> Result<()>;

    /// Drop the association; returns whether it existed.
    fn remove(&mut self, pattern: &str, value: &V) -> bool;

    /// Every value whose pattern matches `topic`.
    fn matches(&self, topic: &str) -> HashSet<V>;

    /// Whether `value` is associated with any pattern matching `topic`.
    fn test(&self, topic: &str, value: &V) -> bool;

    fn clear(&mut self);

    fn is_empty(&self) -> bool;
}
