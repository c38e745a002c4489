//! Fan-out time message blocking.

use std::collections::HashSet;
use std::sync::Arc;

use crate::broker::{DeliveryFilter, HandlerId};

use super::registry::BlockRegistry;

/// Key under which the block filter is registered on a broker's filter chain.
pub const BLOCK_FILTER_KEY: &str = "mqguard.block";

/// Drops recipients whose attached engine blocks the message topic.
///
/// Recipients with no attached engine always pass.
pub struct BlockFilter {
    registry: Arc<BlockRegistry>,
}

impl BlockFilter {
    pub fn new(registry: Arc<BlockRegistry>) -> Self {
        Self { registry }
    }
}

impl DeliveryFilter for BlockFilter {
    fn filter(&self, topic: &str, recipients: Vec<HandlerId>) -> Vec<HandlerId> {
        // The registry trie is shared by every engine, so one lookup per
        // message serves all recipients.
        let mut blocked: Option<HashSet<HandlerId>> = None;
        let mut out = Vec::with_capacity(recipients.len());

        for handler in recipients {
            let Some(engine) = self.registry.engine_for(handler) else {
                out.push(handler);
                continue;
            };
            let set = blocked.get_or_insert_with(|| self.registry.blocked_for(topic));
            if set.contains(&handler) {
                engine.message_blocked(topic, handler);
            } else {
                out.push(handler);
            }
        }
        out
    }
}
