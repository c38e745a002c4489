//! Shared block registry.
//!
//! One registry serves every policy engine attached to connections of the same
//! broker. It maps block patterns to the handlers that currently have the block
//! active, and records which engine each handler is bound to so the delivery
//! filter can find it.
//!
//! Writers (attach, detach, reset) take the matcher write lock; the delivery
//! path only reads.

use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use mqguard_core::{MatcherOptions, MqGuardError, Result, TopicMatcher, TopicTrie};

use crate::broker::HandlerId;

use super::engine::EngineShared;

pub struct BlockRegistry {
    options: MatcherOptions,
    blocked: RwLock<TopicTrie<HandlerId>>,
    bindings: DashMap<HandlerId, Weak<EngineShared>>,
}

impl BlockRegistry {
    pub fn new(options: MatcherOptions) -> Self {
        Self {
            blocked: RwLock::new(TopicTrie::new(options.clone())),
            options,
            bindings: DashMap::new(),
        }
    }

    pub fn shared(options: MatcherOptions) -> Arc<Self> {
        Arc::new(Self::new(options))
    }

    pub fn options(&self) -> &MatcherOptions {
        &self.options
    }

    fn read(&self) -> RwLockReadGuard<'_, TopicTrie<HandlerId>> {
        self.blocked.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, TopicTrie<HandlerId>> {
        self.blocked.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_bound(&self, handler: HandlerId) -> bool {
        self.bindings.contains_key(&handler)
    }

    pub(crate) fn bind(&self, handler: HandlerId, engine: Weak<EngineShared>) -> Result<()> {
        match self.bindings.entry(handler) {
            Entry::Occupied(_) => Err(MqGuardError::AlreadyAttached),
            Entry::Vacant(v) => {
                v.insert(engine);
                Ok(())
            }
        }
    }

    /// Drop the binding only if it still points at `engine`.
    pub(crate) fn unbind(&self, handler: HandlerId, engine: &Arc<EngineShared>) -> bool {
        self.bindings
            .remove_if(&handler, |_, bound| {
                bound.upgrade().is_some_and(|b| Arc::ptr_eq(&b, engine))
                    || bound.strong_count() == 0
            })
            .is_some()
    }

    pub(crate) fn engine_for(&self, handler: HandlerId) -> Option<Arc<EngineShared>> {
        self.bindings.get(&handler).and_then(|w| w.upgrade())
    }

    /// Activate `patterns` for `handler`. All-or-nothing.
    pub fn add_patterns(&self, handler: HandlerId, patterns: &[String]) -> Result<()> {
        let mut m = self.write();
        for p in patterns {
            m.validate(p)?;
        }
        for p in patterns {
            m.add(p, handler)?;
        }
        Ok(())
    }

    pub fn remove_patterns(&self, handler: HandlerId, patterns: &[String]) {
        let mut m = self.write();
        for p in patterns {
            m.remove(p, &handler);
        }
    }

    /// Swap `old` for `new` on every handler under one write lock.
    pub fn replace_patterns(
        &self,
        handlers: &[HandlerId],
        old: &[String],
        new: &[String],
    ) -> Result<()> {
        let mut m = self.write();
        for p in new {
            m.validate(p)?;
        }
        for h in handlers {
            for p in old {
                m.remove(p, h);
            }
        }
        for h in handlers {
            for p in new {
                m.add(p, *h)?;
            }
        }
        Ok(())
    }

    /// Handlers for which delivery of `topic` is blocked.
    pub fn blocked_for(&self, topic: &str) -> HashSet<HandlerId> {
        self.read().matches(topic)
    }

    pub fn is_blocked(&self, topic: &str, handler: HandlerId) -> bool {
        self.read().test(topic, &handler)
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
