//! In-memory broker implementing the collaborator contracts.
//!
//! Small enough to reason about in tests, complete enough to exercise every
//! hook: a per-connection subscription table, a broker-wide subscription trie,
//! the delivery filter chain, and an mpsc inbox per connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::{DashMap, DashSet};
use futures_util::{stream, StreamExt};
use tokio::sync::mpsc;

use mqguard_core::{MatcherOptions, MqGuardError, Result, TopicMatcher, TopicTrie};

use crate::dispatch::{
    dispatch_publish, dispatch_subscribe, dispatch_unsubscribe, Interceptor, InterceptorChain,
    PublishRequest, SubscribeRequest, UnsubscribeRequest,
};
use crate::policy::BlockRegistry;

use super::{Broker, Connection, DataStream, FilterChain, HandlerId, PublishOptions, RequestHooks};

/// Per-connection inbox depth; deliveries beyond it are dropped.
pub const INBOX_CAPACITY: usize = 256;

/// One message handed to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub payload: Bytes,
    pub single: bool,
}

pub struct MemoryBroker {
    options: MatcherOptions,
    filters: FilterChain,
    blocks: Arc<BlockRegistry>,
    subscriptions: RwLock<TopicTrie<HandlerId>>,
    connections: DashMap<HandlerId, Weak<MemoryConnection>>,
    seq: AtomicU64,
}

impl MemoryBroker {
    pub fn new(options: MatcherOptions) -> Arc<Self> {
        Arc::new(Self {
            subscriptions: RwLock::new(TopicTrie::new(options.clone())),
            blocks: BlockRegistry::shared(options.clone()),
            options,
            filters: FilterChain::new(),
            connections: DashMap::new(),
            seq: AtomicU64::new(1),
        })
    }

    pub fn options(&self) -> &MatcherOptions {
        &self.options
    }

    /// Open a connection and return it with its delivery inbox.
    pub fn connect(self: &Arc<Self>) -> (Arc<MemoryConnection>, mpsc::Receiver<Delivery>) {
        let id = HandlerId(self.seq.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let conn = Arc::new(MemoryConnection {
            id,
            broker: Arc::clone(self),
            subs: DashSet::new(),
            hooks: RwLock::new(None),
            interceptors: InterceptorChain::new(),
            warnings: Mutex::new(Vec::new()),
            tx,
        });
        self.connections.insert(id, Arc::downgrade(&conn));
        tracing::debug!(handler = %id, "connection opened");
        (conn, rx)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn add_subscription(&self, topic: &str, handler: HandlerId) -> Result<()> {
        self.subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .add(topic, handler)
    }

    fn remove_subscription(&self, topic: &str, handler: HandlerId) {
        self.subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(topic, &handler);
    }

    /// Route `payload` to every subscriber the filter chain lets through.
    /// Returns the number of connections it was handed to.
    pub fn fanout(&self, topic: &str, payload: Bytes, single: bool) -> usize {
        let mut candidates: Vec<HandlerId> = self
            .subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .matches(topic)
            .into_iter()
            .collect();
        candidates.sort();

        let mut recipients = self.filters.apply(topic, candidates);
        if single {
            recipients.truncate(1);
        }

        let mut delivered = 0;
        for handler in recipients {
            let Some(conn) = self.connections.get(&handler).and_then(|w| w.upgrade()) else {
                continue;
            };
            let msg = Delivery {
                topic: topic.to_string(),
                payload: payload.clone(),
                single,
            };
            match conn.tx.try_send(msg) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::debug!(%handler, %topic, "inbox full or closed; delivery dropped"),
            }
        }
        delivered
    }
}

impl Broker for MemoryBroker {
    fn filters(&self) -> &FilterChain {
        &self.filters
    }

    fn block_registry(&self) -> Arc<BlockRegistry> {
        Arc::clone(&self.blocks)
    }
}

pub struct MemoryConnection {
    id: HandlerId,
    broker: Arc<MemoryBroker>,
    subs: DashSet<String>,
    hooks: RwLock<Option<Arc<dyn RequestHooks>>>,
    interceptors: InterceptorChain,
    warnings: Mutex<Vec<MqGuardError>>,
    tx: mpsc::Sender<Delivery>,
}

impl MemoryConnection {
    fn hooks(&self) -> Option<Arc<dyn RequestHooks>> {
        self.hooks.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Add a connection-level override.
    pub fn register_interceptor(&self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.register(interceptor);
    }

    /// Warnings raised so far, oldest first.
    pub fn warnings(&self) -> Vec<String> {
        self.warnings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|e| e.to_string())
            .collect()
    }

    /// Client subscribe request.
    pub async fn subscribe(self: &Arc<Self>, topic: &str) -> Result<()> {
        let conn: Arc<dyn Connection> = self.clone();
        match self.hooks() {
            Some(h) => h.pre_subscribe(conn, topic.to_string()).await,
            None => {
                let req = SubscribeRequest { topic: topic.to_string() };
                dispatch_subscribe(&conn.interceptors(), &conn, req).await
            }
        }
    }

    /// Client unsubscribe request.
    pub async fn unsubscribe(self: &Arc<Self>, topic: &str) -> Result<()> {
        let conn: Arc<dyn Connection> = self.clone();
        match self.hooks() {
            Some(h) => h.pre_unsubscribe(conn, topic.to_string()).await,
            None => {
                let req = UnsubscribeRequest { topic: topic.to_string() };
                dispatch_unsubscribe(&conn.interceptors(), &conn, req).await
            }
        }
    }

    /// Client publish request carrying a streamed payload.
    pub async fn publish(
        self: &Arc<Self>,
        topic: &str,
        data: DataStream,
        options: PublishOptions,
    ) -> Result<()> {
        let conn: Arc<dyn Connection> = self.clone();
        match self.hooks() {
            Some(h) => h.pre_publish(conn, topic.to_string(), data, options).await,
            None => {
                let req = PublishRequest {
                    topic: topic.to_string(),
                    data,
                    options,
                };
                dispatch_publish(&conn.interceptors(), &conn, req).await
            }
        }
    }

    /// Publish a payload given as discrete chunks.
    pub async fn publish_chunks(
        self: &Arc<Self>,
        topic: &str,
        chunks: Vec<Bytes>,
        options: PublishOptions,
    ) -> Result<()> {
        let data = stream::iter(chunks.into_iter().map(Ok)).boxed();
        self.publish(topic, data, options).await
    }

    /// Drop every subscription and unregister from the broker.
    pub fn close(&self) {
        for topic in self.subs.iter() {
            self.broker.remove_subscription(topic.key(), self.id);
        }
        self.subs.clear();
        self.broker.connections.remove(&self.id);
        tracing::debug!(handler = %self.id, "connection closed");
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn handler_id(&self) -> HandlerId {
        self.id
    }

    fn matcher_options(&self) -> &MatcherOptions {
        &self.broker.options
    }

    fn broker(&self) -> Arc<dyn Broker> {
        self.broker.clone()
    }

    fn subscription_count(&self) -> usize {
        self.subs.len()
    }

    fn is_subscribed(&self, topic: &str) -> bool {
        self.subs.contains(topic)
    }

    fn warn(&self, err: &MqGuardError) {
        self.warnings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(err.clone());
    }

    fn has_hooks(&self) -> bool {
        self.hooks().is_some()
    }

    fn set_hooks(&self, hooks: Option<Arc<dyn RequestHooks>>) {
        *self.hooks.write().unwrap_or_else(|e| e.into_inner()) = hooks;
    }

    fn interceptors(&self) -> Vec<Arc<dyn Interceptor>> {
        self.interceptors.snapshot()
    }

    async fn default_subscribe(&self, topic: &str) -> Result<()> {
        self.broker.add_subscription(topic, self.id)?;
        self.subs.insert(topic.to_string());
        Ok(())
    }

    async fn default_unsubscribe(&self, topic: &str) -> Result<()> {
        self.broker.remove_subscription(topic, self.id);
        self.subs.remove(topic);
        Ok(())
    }

    async fn default_publish(
        &self,
        topic: &str,
        mut data: DataStream,
        options: PublishOptions,
    ) -> Result<()> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = data.next().await {
            buf.extend_from_slice(&chunk?);
        }
        let delivered = self.broker.fanout(topic, buf.freeze(), options.single);
        tracing::debug!(handler = %self.id, %topic, delivered, "published");
        Ok(())
    }
}
