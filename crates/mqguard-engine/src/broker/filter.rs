use std::sync::Arc;

use dashmap::DashMap;

use super::HandlerId;

/// Predicate stage in the broker's fan-out pipeline.
///
/// Runs synchronously once per message for the set of candidate recipients
/// and returns the recipients that may receive it.
pub trait DeliveryFilter: Send + Sync {
    fn filter(&self, topic: &str, recipients: Vec<HandlerId>) -> Vec<HandlerId>;
}

/// Broker-wide registry of delivery filters, keyed so that registration is
/// idempotent across every engine and connection of one broker.
#[derive(Default)]
pub struct FilterChain {
    filters: DashMap<&'static str, Arc<dyn DeliveryFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self {
            filters: DashMap::new(),
        }
    }

    /// Register `filter` under `key` unless one is already present.
    /// Returns true if this call installed it.
    pub fn register(&self, key: &'static str, filter: Arc<dyn DeliveryFilter>) -> bool {
        let mut inserted = false;
        self.filters.entry(key).or_insert_with(|| {
            inserted = true;
            filter
        });
        inserted
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.filters.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run every registered filter over `recipients`.
    pub fn apply(&self, topic: &str, mut recipients: Vec<HandlerId>) -> Vec<HandlerId> {
        // Snapshot so a filter may touch the chain without deadlocking a shard.
        let filters: Vec<Arc<dyn DeliveryFilter>> =
            self.filters.iter().map(|e| e.value().clone()).collect();
        for f in filters {
            if recipients.is_empty() {
                break;
            }
            recipients = f.filter(topic, recipients);
        }
        recipients
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DropOdd;

    impl DeliveryFilter for DropOdd {
        fn filter(&self, _topic: &str, recipients: Vec<HandlerId>) -> Vec<HandlerId> {
            recipients.into_iter().filter(|h| h.0 % 2 == 0).collect()
        }
    }

    #[test]
    fn register_is_idempotent_per_key() {
        let chain = FilterChain::new();
        assert!(chain.register("odd", Arc::new(DropOdd)));
        assert!(!chain.register("odd", Arc::new(DropOdd)));
        assert_eq!(chain.len(), 1);

        let out = chain.apply("t", vec![HandlerId(1), HandlerId(2), HandlerId(4)]);
        assert_eq!(out, vec![HandlerId(2), HandlerId(4)]);
    }
}
