use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::error::{MqGuardError, Result};

use super::{MatcherOptions, TopicMatcher};

#[derive(Debug, Clone)]
struct Node<V> {
    children: HashMap<String, Node<V>>,
    values: HashSet<V>,
}

impl<V> Default for Node<V> {
    fn default() -> Self {
        Self {
            children: HashMap::new(),
            values: HashSet::new(),
        }
    }
}

impl<V> Node<V> {
    fn is_empty(&self) -> bool {
        self.children.is_empty() && self.values.is_empty()
    }
}

/// Trie-based wildcard matcher (de-duplicated mode).
#[derive(Debug, Clone)]
pub struct TopicTrie<V> {
    options: MatcherOptions,
    root: Node<V>,
}

impl<V: Eq + Hash + Clone> TopicTrie<V> {
    pub fn new(options: MatcherOptions) -> Self {
        Self {
            options,
            root: Node::default(),
        }
    }

    /// Depth-first walk over every node reachable by `words[i..]`.
    /// `visit` returns true to stop early; the walk reports whether it stopped.
    fn walk(
        &self,
        node: &Node<V>,
        words: &[&str],
        i: usize,
        visit: &mut dyn FnMut(&HashSet<V>) -> bool,
    ) -> bool {
        if let Some(some) = node.children.get(&self.options.wildcard_some) {
            for j in i..=words.len() {
                if self.walk(some, words, j, visit) {
                    return true;
                }
            }
        }

        let Some(word) = words.get(i) else {
            return !node.values.is_empty() && visit(&node.values);
        };

        if let Some(child) = node.children.get(*word) {
            if self.walk(child, words, i + 1, visit) {
                return true;
            }
        }
        if *word != self.options.wildcard_one {
            if let Some(one) = node.children.get(&self.options.wildcard_one) {
                if self.walk(one, words, i + 1, visit) {
                    return true;
                }
            }
        }
        false
    }

    fn split<'a>(&self, topic: &'a str) -> Vec<&'a str> {
        topic.split(self.options.separator.as_str()).collect()
    }
}

/// Remove `value` below `node` along `words`; returns whether it was present.
fn remove_path<V: Eq + Hash>(node: &mut Node<V>, words: &[&str], value: &V) -> bool {
    let Some((first, rest)) = words.split_first() else {
        return node.values.remove(value);
    };
    let Some(child) = node.children.get_mut(*first) else {
        return false;
    };
    let removed = remove_path(child, rest, value);
    if removed && child.is_empty() {
        node.children.remove(*first);
    }
    removed
}

impl<V: Eq + Hash + Clone> TopicMatcher<V> for TopicTrie<V> {
    fn options(&self) -> &MatcherOptions {
        &self.options
    }

    fn validate<'a>(&self, topic: &'a str) -> Result<Vec<&'a str>> {
        let words = self.split(topic);
        if words.len() > self.options.max_words {
            return Err(MqGuardError::InvalidTopic("too many words".into()));
        }
        let somes = words
            .iter()
            .filter(|w| **w == self.options.wildcard_some)
            .count();
        if somes > self.options.max_wildcard_somes {
            return Err(MqGuardError::InvalidTopic(
                "too many wildcard somes".into(),
            ));
        }
        Ok(words)
    }

    fn add(&mut self, pattern: &str, value: V) -> Result<()> {
        let words = self.validate(pattern)?;
        let mut node = &mut self.root;
        for w in words {
            node = node.children.entry(w.to_string()).or_default();
        }
        node.values.insert(value);
        Ok(())
    }

    fn remove(&mut self, pattern: &str, value: &V) -> bool {
        let words = self.split(pattern);
        remove_path(&mut self.root, &words, value)
    }

    fn matches(&self, topic: &str) -> HashSet<V> {
        let words = self.split(topic);
        let mut out = HashSet::new();
        self.walk(&self.root, &words, 0, &mut |values| {
            out.extend(values.iter().cloned());
            false
        });
        out
    }

    fn test(&self, topic: &str, value: &V) -> bool {
        let words = self.split(topic);
        self.walk(&self.root, &words, 0, &mut |values| values.contains(value))
    }

    fn clear(&mut self) {
        self.root = Node::default();
    }

    fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}
