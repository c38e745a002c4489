use serde::Deserialize;

use crate::error::{MqGuardError, Result};

/// Tokenizer settings shared by every matcher that must agree on topic shape.
///
/// Two matchers only produce consistent answers when these are identical, so
/// the engine compares them on attach.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatcherOptions {
    #[serde(default = "default_separator")]
    pub separator: String,

    #[serde(default = "default_wildcard_one")]
    pub wildcard_one: String,

    #[serde(default = "default_wildcard_some")]
    pub wildcard_some: String,

    #[serde(default = "default_max_words")]
    pub max_words: usize,

    #[serde(default = "default_max_wildcard_somes")]
    pub max_wildcard_somes: usize,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            wildcard_one: default_wildcard_one(),
            wildcard_some: default_wildcard_some(),
            max_words: default_max_words(),
            max_wildcard_somes: default_max_wildcard_somes(),
        }
    }
}

impl MatcherOptions {
    pub fn validate(&self) -> Result<()> {
        let tokens = [
            ("separator", &self.separator),
            ("wildcard_one", &self.wildcard_one),
            ("wildcard_some", &self.wildcard_some),
        ];
        for (name, value) in tokens {
            if value.is_empty() {
                return Err(MqGuardError::BadConfig(format!(
                    "matcher.{name} must not be empty"
                )));
            }
        }
        if self.wildcard_one == self.wildcard_some
            || self.separator == self.wildcard_one
            || self.separator == self.wildcard_some
        {
            return Err(MqGuardError::BadConfig(
                "matcher separator and wildcard tokens must be distinct".into(),
            ));
        }
        if self.max_words == 0 {
            return Err(MqGuardError::BadConfig(
                "matcher.max_words must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_separator() -> String {
    ".".into()
}
fn default_wildcard_one() -> String {
    "*".into()
}
fn default_wildcard_some() -> String {
    "#".into()
}
fn default_max_words() -> usize {
    100
}
fn default_max_wildcard_somes() -> usize {
    3
}
