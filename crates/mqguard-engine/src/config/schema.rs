use serde::Deserialize;

use mqguard_core::error::{MqGuardError, Result};
use mqguard_core::{MatcherOptions, TopicMatcher, TopicTrie};

/// On-disk policy document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardConfig {
    pub version: u32,

    #[serde(default)]
    pub policy: PolicyConfig,
}

impl GuardConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MqGuardError::BadConfig(format!(
                "unsupported config version {}",
                self.version
            )));
        }
        self.policy.validate()
    }
}

/// Rules applied by one policy engine; replaces the active rules on reset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    #[serde(default)]
    pub publish: PublishPolicy,

    #[serde(default)]
    pub subscribe: SubscribePolicy,

    /// Topics whose delivery (not subscription) is vetoed.
    #[serde(default)]
    pub block: Vec<String>,

    #[serde(default)]
    pub max_topic_length: Option<usize>,

    #[serde(default)]
    pub matcher: MatcherOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishPolicy {
    #[serde(default)]
    pub allow: Option<Vec<String>>,
    #[serde(default)]
    pub disallow: Option<Vec<String>>,
    #[serde(default)]
    pub max_data_length: Option<usize>,
    #[serde(default)]
    pub max_publications: Option<usize>,
    #[serde(default)]
    pub disallow_single: bool,
    #[serde(default)]
    pub disallow_multi: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscribePolicy {
    #[serde(default)]
    pub allow: Option<Vec<String>>,
    #[serde(default)]
    pub disallow: Option<Vec<String>>,
    #[serde(default)]
    pub max_subscriptions: Option<usize>,
}

impl PolicyConfig {
    pub fn validate(&self) -> Result<()> {
        self.matcher.validate()?;

        let limits = [
            ("max_topic_length", self.max_topic_length),
            ("publish.max_data_length", self.publish.max_data_length),
            ("publish.max_publications", self.publish.max_publications),
            ("subscribe.max_subscriptions", self.subscribe.max_subscriptions),
        ];
        for (name, value) in limits {
            if value == Some(0) {
                return Err(MqGuardError::BadConfig(format!("{name} must be at least 1")));
            }
        }

        // Same tokenizer as the engine will use; reports the offending list.
        let probe: TopicTrie<()> = TopicTrie::new(self.matcher.clone());
        let lists = [
            ("publish.allow", self.publish.allow.as_deref()),
            ("publish.disallow", self.publish.disallow.as_deref()),
            ("subscribe.allow", self.subscribe.allow.as_deref()),
            ("subscribe.disallow", self.subscribe.disallow.as_deref()),
            ("block", Some(self.block.as_slice())),
        ];
        for (name, patterns) in lists {
            for p in patterns.unwrap_or_default() {
                probe.validate(p).map_err(|e| {
                    MqGuardError::BadConfig(format!("{name} pattern {p:?}: {e}"))
                })?;
            }
        }
        Ok(())
    }
}
