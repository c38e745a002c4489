//! Broker/connection collaborator contracts.
//!
//! The policy engine never owns a connection. It consumes these traits at the
//! boundary: the connection raises pre-request hooks, exposes its default
//! actions and a live view of its subscriptions, and the broker offers a
//! broker-wide delivery filter chain.

pub mod filter;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use mqguard_core::{MatcherOptions, MqGuardError, Result};

use crate::dispatch::Interceptor;
use crate::policy::BlockRegistry;

pub use filter::{DeliveryFilter, FilterChain};
pub use memory::{Delivery, MemoryBroker, MemoryConnection};

/// Inbound publish payload, consumed chunk by chunk.
pub type DataStream = BoxStream<'static, Result<Bytes>>;

/// Stable per-connection identity used as a block registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Options attached to a publish request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Deliver to at most one subscriber.
    pub single: bool,
}

/// Broker-wide services shared by every connection of one broker core.
pub trait Broker: Send + Sync {
    fn filters(&self) -> &FilterChain;

    /// The one block registry every engine on this broker must share.
    fn block_registry(&self) -> Arc<BlockRegistry>;
}

/// Interception points the engine installs on a connection.
#[async_trait]
pub trait RequestHooks: Send + Sync {
    async fn pre_subscribe(&self, conn: Arc<dyn Connection>, topic: String) -> Result<()>;

    async fn pre_unsubscribe(&self, conn: Arc<dyn Connection>, topic: String) -> Result<()>;

    async fn pre_publish(
        &self,
        conn: Arc<dyn Connection>,
        topic: String,
        data: DataStream,
        options: PublishOptions,
    ) -> Result<()>;
}

/// One client connection as seen by the policy engine.
#[async_trait]
pub trait Connection: Send + Sync {
    fn handler_id(&self) -> HandlerId;

    /// Tokenizer settings of the broker this connection belongs to.
    fn matcher_options(&self) -> &MatcherOptions;

    fn broker(&self) -> Arc<dyn Broker>;

    /// Live count of this connection's subscriptions.
    fn subscription_count(&self) -> usize;

    fn is_subscribed(&self, topic: &str) -> bool;

    /// Surface a non-fatal problem without closing the connection.
    fn warn(&self, err: &MqGuardError);

    /// Whether pre-request hooks are currently installed.
    fn has_hooks(&self) -> bool;

    /// Install (`Some`) or remove (`None`) pre-request hooks.
    fn set_hooks(&self, hooks: Option<Arc<dyn RequestHooks>>);

    /// Connection-level request overrides, consulted after engine-level ones.
    fn interceptors(&self) -> Vec<Arc<dyn Interceptor>>;

    async fn default_subscribe(&self, topic: &str) -> Result<()>;

    async fn default_unsubscribe(&self, topic: &str) -> Result<()>;

    async fn default_publish(
        &self,
        topic: &str,
        data: DataStream,
        options: PublishOptions,
    ) -> Result<()>;
}
