use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::broadcast;

use mqguard_core::{MatcherOptions, MqGuardError, Result, TopicMatcher, TopicTrie};

use crate::broker::{Connection, DataStream, HandlerId, PublishOptions, RequestHooks};
use crate::config::PolicyConfig;
use crate::dispatch::{
    dispatch_publish, dispatch_subscribe, dispatch_unsubscribe, Interceptor, InterceptorChain,
    PublishRequest, SubscribeRequest, UnsubscribeRequest,
};
use crate::obs::PolicyMetrics;

use super::delivery::{BlockFilter, BLOCK_FILTER_KEY};
use super::limiter::LengthLimited;
use super::pattern_set::PatternSet;
use super::quota::QuotaState;
use super::registry::BlockRegistry;

/// Receivers that fall this far behind start losing events.
pub const EVENT_CAPACITY: usize = 256;

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Request kind, used in messages, logs and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Subscribe,
    Unsubscribe,
    Publish,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Subscribe => "subscribe",
            Operation::Unsubscribe => "unsubscribe",
            Operation::Publish => "publish",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable outcome emitted whenever the engine vetoes something.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyEvent {
    SubscribeBlocked { topic: String, handler: HandlerId },
    UnsubscribeBlocked { topic: String, handler: HandlerId },
    PublishBlocked { topic: String, handler: HandlerId },
    MessageBlocked { topic: String, handler: HandlerId },
}

impl PolicyEvent {
    fn blocked(op: Operation, topic: &str, handler: HandlerId) -> Self {
        let topic = topic.to_string();
        match op {
            Operation::Subscribe => PolicyEvent::SubscribeBlocked { topic, handler },
            Operation::Unsubscribe => PolicyEvent::UnsubscribeBlocked { topic, handler },
            Operation::Publish => PolicyEvent::PublishBlocked { topic, handler },
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            PolicyEvent::SubscribeBlocked { topic, .. }
            | PolicyEvent::UnsubscribeBlocked { topic, .. }
            | PolicyEvent::PublishBlocked { topic, .. }
            | PolicyEvent::MessageBlocked { topic, .. } => topic,
        }
    }

    pub fn handler(&self) -> HandlerId {
        match self {
            PolicyEvent::SubscribeBlocked { handler, .. }
            | PolicyEvent::UnsubscribeBlocked { handler, .. }
            | PolicyEvent::PublishBlocked { handler, .. }
            | PolicyEvent::MessageBlocked { handler, .. } => *handler,
        }
    }
}

/// Compiled, immutable snapshot of one `PolicyConfig`.
struct Rules {
    tokenizer: TopicTrie<()>,
    subscribe: PatternSet,
    publish: PatternSet,
    block: Vec<String>,
    max_topic_length: Option<usize>,
    max_subscriptions: Option<usize>,
    max_data_length: Option<usize>,
    max_publications: Option<usize>,
    disallow_single: bool,
    disallow_multi: bool,
}

impl Rules {
    fn compile(cfg: &PolicyConfig) -> Result<Self> {
        cfg.validate()?;
        let options = &cfg.matcher;
        Ok(Self {
            tokenizer: TopicTrie::new(options.clone()),
            subscribe: PatternSet::compile(
                options,
                cfg.subscribe.allow.as_deref(),
                cfg.subscribe.disallow.as_deref(),
            )?,
            publish: PatternSet::compile(
                options,
                cfg.publish.allow.as_deref(),
                cfg.publish.disallow.as_deref(),
            )?,
            block: cfg.block.clone(),
            max_topic_length: cfg.max_topic_length,
            max_subscriptions: cfg.subscribe.max_subscriptions,
            max_data_length: cfg.publish.max_data_length,
            max_publications: cfg.publish.max_publications,
            disallow_single: cfg.publish.disallow_single,
            disallow_multi: cfg.publish.disallow_multi,
        })
    }

    fn options(&self) -> &MatcherOptions {
        self.tokenizer.options()
    }

    /// Length and tokenizer checks shared by every operation.
    fn check_topic(&self, op: Operation, topic: &str) -> Result<()> {
        if let Some(max) = self.max_topic_length {
            if topic.len() > max {
                return Err(MqGuardError::InvalidTopic(format!(
                    "{op} topic longer than {max}"
                )));
            }
        }
        self.tokenizer
            .validate(topic)
            .map_err(|e| MqGuardError::InvalidTopic(format!("{op} topic invalid: {e}")))?;
        Ok(())
    }

    fn check_publish(&self, topic: &str, options: PublishOptions) -> Result<()> {
        if !self.publish.decide(topic) {
            return Err(MqGuardError::Blocked(format!(
                "blocked publish to topic: {topic}"
            )));
        }
        if self.disallow_single && options.single {
            return Err(MqGuardError::Blocked(format!(
                "blocked publish (single) to topic: {topic}"
            )));
        }
        if self.disallow_multi && !options.single {
            return Err(MqGuardError::Blocked(format!(
                "blocked publish (multi) to topic: {topic}"
            )));
        }
        Ok(())
    }
}

/// State shared between the engine handle, the hooks it installs on
/// connections and the registry's delivery-time bindings.
pub(crate) struct EngineShared {
    id: u64,
    registry: Arc<BlockRegistry>,
    rules: RwLock<Arc<Rules>>,
    attached: Mutex<HashMap<HandlerId, Arc<QuotaState>>>,
    interceptors: InterceptorChain,
    events: broadcast::Sender<PolicyEvent>,
    metrics: Arc<PolicyMetrics>,
}

impl EngineShared {
    fn rules(&self) -> Arc<Rules> {
        Arc::clone(&self.rules.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn attached(&self) -> MutexGuard<'_, HashMap<HandlerId, Arc<QuotaState>>> {
        self.attached.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: PolicyEvent) {
        // No receivers is not an error.
        let _ = self.events.send(event);
    }

    /// Report a rejection on every channel and hand it back to the caller.
    fn reject(
        &self,
        conn: &Arc<dyn Connection>,
        op: Operation,
        topic: &str,
        err: MqGuardError,
    ) -> Result<()> {
        let handler = conn.handler_id();
        let outcome = match &err {
            MqGuardError::InvalidTopic(_) => "invalid",
            MqGuardError::DataLimit(_) => "overflow",
            _ => "blocked",
        };
        tracing::info!(engine = self.id, %op, %topic, %handler, error = %err, "request rejected");
        self.metrics
            .decisions
            .inc(&[("op", op.as_str()), ("outcome", outcome)]);
        conn.warn(&err);
        self.emit(PolicyEvent::blocked(op, topic, handler));
        Err(err)
    }

    fn admitted(&self, op: Operation, topic: &str, handler: HandlerId) {
        tracing::debug!(engine = self.id, %op, %topic, %handler, "request admitted");
        self.metrics
            .decisions
            .inc(&[("op", op.as_str()), ("outcome", "admitted")]);
    }

    pub(crate) fn message_blocked(&self, topic: &str, handler: HandlerId) {
        tracing::info!(engine = self.id, %topic, %handler, "message blocked");
        self.metrics.messages_blocked.inc(&[]);
        self.emit(PolicyEvent::MessageBlocked {
            topic: topic.to_string(),
            handler,
        });
    }

    /// Engine-level interceptors first, then the connection's own.
    fn layers(&self, conn: &Arc<dyn Connection>) -> Vec<Arc<dyn Interceptor>> {
        let mut layers = self.interceptors.snapshot();
        layers.extend(conn.interceptors());
        layers
    }
}

/// Hooks installed on one attached connection.
struct AttachedHooks {
    engine: Arc<EngineShared>,
    quota: Arc<QuotaState>,
}

#[async_trait]
impl RequestHooks for AttachedHooks {
    async fn pre_subscribe(&self, conn: Arc<dyn Connection>, topic: String) -> Result<()> {
        let op = Operation::Subscribe;
        let rules = self.engine.rules();

        if let Err(e) = rules.check_topic(op, &topic) {
            return self.engine.reject(&conn, op, &topic, e);
        }
        if !rules.subscribe.decide(&topic) {
            let e = MqGuardError::Blocked(format!("blocked subscribe to topic: {topic}"));
            return self.engine.reject(&conn, op, &topic, e);
        }
        if let Some(max) = rules.max_subscriptions {
            if conn.subscription_count() >= max && !conn.is_subscribed(&topic) {
                let e = MqGuardError::Blocked(format!(
                    "subscription limit {max} already reached: {topic}"
                ));
                return self.engine.reject(&conn, op, &topic, e);
            }
        }

        self.engine.admitted(op, &topic, conn.handler_id());
        let layers = self.engine.layers(&conn);
        dispatch_subscribe(&layers, &conn, SubscribeRequest { topic }).await
    }

    async fn pre_unsubscribe(&self, conn: Arc<dyn Connection>, topic: String) -> Result<()> {
        let op = Operation::Unsubscribe;
        let rules = self.engine.rules();

        if let Err(e) = rules.check_topic(op, &topic) {
            return self.engine.reject(&conn, op, &topic, e);
        }

        self.engine.admitted(op, &topic, conn.handler_id());
        let layers = self.engine.layers(&conn);
        dispatch_unsubscribe(&layers, &conn, UnsubscribeRequest { topic }).await
    }

    async fn pre_publish(
        &self,
        conn: Arc<dyn Connection>,
        topic: String,
        data: DataStream,
        options: PublishOptions,
    ) -> Result<()> {
        let op = Operation::Publish;
        let rules = self.engine.rules();

        if let Err(e) = rules
            .check_topic(op, &topic)
            .and_then(|_| rules.check_publish(&topic, options))
        {
            return self.engine.reject(&conn, op, &topic, e);
        }

        let Some(ticket) = self.quota.try_admit(rules.max_publications) else {
            let max = rules.max_publications.unwrap_or_default();
            let e = MqGuardError::Blocked(format!(
                "publication limit {max} already reached: {topic}"
            ));
            return self.engine.reject(&conn, op, &topic, e);
        };

        let data = match rules.max_data_length {
            Some(limit) => LengthLimited::new(data, limit, topic.as_str())
                .with_ticket(ticket.clone())
                .boxed(),
            None => data,
        };

        self.engine.admitted(op, &topic, conn.handler_id());
        let layers = self.engine.layers(&conn);
        let req = PublishRequest {
            topic: topic.clone(),
            data,
            options,
        };
        let result = ticket.complete(dispatch_publish(&layers, &conn, req).await);

        if let Err(MqGuardError::DataLimit(msg)) = &result {
            let e = MqGuardError::DataLimit(msg.clone());
            return self.engine.reject(&conn, op, &topic, e);
        }
        result
    }
}

/// Topic access-control policy attachable to live connections.
///
/// One engine may serve many connections, each connection at most one engine.
/// Callers must `detach` every connection before dropping the engine.
pub struct PolicyEngine {
    shared: Arc<EngineShared>,
}

impl PolicyEngine {
    pub fn new(config: &PolicyConfig, registry: Arc<BlockRegistry>) -> Result<Self> {
        Self::with_metrics(config, registry, Arc::new(PolicyMetrics::new()))
    }

    pub fn with_metrics(
        config: &PolicyConfig,
        registry: Arc<BlockRegistry>,
        metrics: Arc<PolicyMetrics>,
    ) -> Result<Self> {
        let rules = Rules::compile(config)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            shared: Arc::new(EngineShared {
                id: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
                registry,
                rules: RwLock::new(Arc::new(rules)),
                attached: Mutex::new(HashMap::new()),
                interceptors: InterceptorChain::new(),
                events,
                metrics,
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.shared.registry
    }

    pub fn metrics(&self) -> Arc<PolicyMetrics> {
        Arc::clone(&self.shared.metrics)
    }

    pub fn events(&self) -> broadcast::Receiver<PolicyEvent> {
        self.shared.events.subscribe()
    }

    /// Add an engine-level override, consulted before connection-level ones.
    pub fn register_interceptor(&self, interceptor: Arc<dyn Interceptor>) {
        self.shared.interceptors.register(interceptor);
    }

    pub fn is_attached(&self, handler: HandlerId) -> bool {
        self.shared.attached().contains_key(&handler)
    }

    pub fn attached_handlers(&self) -> Vec<HandlerId> {
        let mut v: Vec<HandlerId> = self.shared.attached().keys().copied().collect();
        v.sort();
        v
    }

    /// Publishes currently admitted for `handler`, if it is attached here.
    pub fn publications_in_flight(&self, handler: HandlerId) -> Option<usize> {
        self.shared
            .attached()
            .get(&handler)
            .map(|q| q.publications_in_flight())
    }

    pub fn attach(&self, conn: &Arc<dyn Connection>) -> Result<()> {
        let handler = conn.handler_id();
        let registry = &self.shared.registry;
        let mut attached = self.shared.attached();
        let rules = self.shared.rules();

        if conn.has_hooks() || attached.contains_key(&handler) || registry.is_bound(handler) {
            tracing::warn!(engine = self.shared.id, %handler, "connection already has access control");
            return Err(MqGuardError::AlreadyAttached);
        }
        let broker = conn.broker();
        if !Arc::ptr_eq(&broker.block_registry(), registry) {
            tracing::warn!(engine = self.shared.id, %handler, "engine registry is not the broker's block registry");
            return Err(MqGuardError::ForeignRegistry);
        }
        if conn.matcher_options() != rules.options() || registry.options() != rules.options() {
            tracing::warn!(engine = self.shared.id, %handler, "matcher options mismatch");
            return Err(MqGuardError::OptionsMismatch);
        }

        registry.bind(handler, Arc::downgrade(&self.shared))?;
        if let Err(e) = registry.add_patterns(handler, &rules.block) {
            registry.unbind(handler, &self.shared);
            return Err(e);
        }

        let quota = Arc::new(QuotaState::new());
        attached.insert(handler, Arc::clone(&quota));

        broker
            .filters()
            .register(BLOCK_FILTER_KEY, Arc::new(BlockFilter::new(Arc::clone(registry))));
        conn.set_hooks(Some(Arc::new(AttachedHooks {
            engine: Arc::clone(&self.shared),
            quota,
        })));

        self.shared.metrics.attached_connections.inc(&[]);
        tracing::info!(engine = self.shared.id, %handler, blocks = rules.block.len(), "attached");
        Ok(())
    }

    /// Release `conn`. Requests already admitted complete through the hooks
    /// they captured.
    pub fn detach(&self, conn: &Arc<dyn Connection>) -> Result<()> {
        let handler = conn.handler_id();
        let mut attached = self.shared.attached();
        if attached.remove(&handler).is_none() {
            return Err(MqGuardError::NotAttached);
        }

        conn.set_hooks(None);
        let rules = self.shared.rules();
        self.shared.registry.remove_patterns(handler, &rules.block);
        self.shared.registry.unbind(handler, &self.shared);

        self.shared.metrics.attached_connections.dec(&[]);
        tracing::info!(engine = self.shared.id, %handler, "detached");
        Ok(())
    }

    /// Replace the active rules without dropping attached connections.
    pub fn reset(&self, config: &PolicyConfig) -> Result<()> {
        let next = Rules::compile(config)?;
        let attached = self.shared.attached();
        let current = self.shared.rules();

        if !attached.is_empty() && next.options() != current.options() {
            tracing::warn!(engine = self.shared.id, "reset would change matcher options of attached connections");
            return Err(MqGuardError::OptionsMismatch);
        }

        let handlers: Vec<HandlerId> = attached.keys().copied().collect();
        self.shared
            .registry
            .replace_patterns(&handlers, &current.block, &next.block)?;

        *self.shared.rules.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(next);
        tracing::info!(engine = self.shared.id, connections = handlers.len(), "policy reset");
        Ok(())
    }

    /// Dry-run the shape and allow/disallow checks for one topic.
    /// Quotas and block rules are not evaluated; nothing is emitted.
    pub fn check(&self, op: Operation, topic: &str) -> Result<()> {
        let rules = self.shared.rules();
        rules.check_topic(op, topic)?;
        match op {
            Operation::Subscribe if !rules.subscribe.decide(topic) => Err(MqGuardError::Blocked(
                format!("blocked subscribe to topic: {topic}"),
            )),
            Operation::Publish if !rules.publish.decide(topic) => Err(MqGuardError::Blocked(
                format!("blocked publish to topic: {topic}"),
            )),
            _ => Ok(()),
        }
    }
}

impl Drop for PolicyEngine {
    fn drop(&mut self) {
        let attached = self.shared.attached().len();
        if attached > 0 {
            tracing::warn!(engine = self.shared.id, attached, "policy engine dropped while connections still attached");
        }
    }
}
