//! Allow/disallow pattern compilation and evaluation.
//!
//! `disallow` always wins. An absent `allow` list permits every topic; a
//! present but empty one permits none.

use mqguard_core::{MatcherOptions, Result, TopicMatcher, TopicTrie};

/// Compiled allow/disallow matchers for one operation kind.
#[derive(Debug, Clone)]
pub struct PatternSet {
    allow: Option<TopicTrie<()>>,
    disallow: Option<TopicTrie<()>>,
}

impl PatternSet {
    /// Permit-all set.
    pub fn open() -> Self {
        Self {
            allow: None,
            disallow: None,
        }
    }

    pub fn compile(
        options: &MatcherOptions,
        allow: Option<&[String]>,
        disallow: Option<&[String]>,
    ) -> Result<Self> {
        Ok(Self {
            allow: allow.map(|p| compile_matcher(options, p)).transpose()?,
            disallow: disallow.map(|p| compile_matcher(options, p)).transpose()?,
        })
    }

    pub fn decide(&self, topic: &str) -> bool {
        if let Some(disallow) = &self.disallow {
            if disallow.test(topic, &()) {
                return false;
            }
        }
        if let Some(allow) = &self.allow {
            if !allow.test(topic, &()) {
                return false;
            }
        }
        true
    }
}

impl Default for PatternSet {
    fn default() -> Self {
        Self::open()
    }
}

fn compile_matcher(options: &MatcherOptions, raw: &[String]) -> Result<TopicTrie<()>> {
    let mut m = TopicTrie::new(options.clone());
    for pattern in raw {
        m.add(pattern, ())?;
    }
    Ok(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn set(allow: Option<&[&str]>, disallow: Option<&[&str]>) -> PatternSet {
        let allow = allow.map(strings);
        let disallow = disallow.map(strings);
        PatternSet::compile(
            &MatcherOptions::default(),
            allow.as_deref(),
            disallow.as_deref(),
        )
        .unwrap()
    }

    #[test]
    fn open_set_allows_everything() {
        let s = PatternSet::open();
        for t in ["foo", "foo.bar", "#", ""] {
            assert!(s.decide(t));
        }
    }

    #[test]
    fn empty_allow_denies_everything() {
        let s = set(Some(&[]), None);
        for t in ["foo", "foo.bar", "test"] {
            assert!(!s.decide(t));
        }
    }

    #[test]
    fn disallow_beats_allow() {
        let s = set(Some(&["foo.bar.#"]), Some(&["foo.bar.reserved"]));
        assert!(s.decide("foo.bar"));
        assert!(s.decide("foo.bar.baz"));
        assert!(!s.decide("foo.bar.reserved"));
        assert!(!s.decide("test"));
    }

    #[test]
    fn disallow_only() {
        let s = set(None, Some(&["secret.#"]));
        assert!(!s.decide("secret.key"));
        assert!(s.decide("public.key"));
    }
}
