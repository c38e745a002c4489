use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use mqguard_core::Result;

use crate::broker::{Connection, DataStream, PublishOptions};

/// Result of offering a request to one interceptor.
pub enum Outcome<R> {
    /// The interceptor handled the request; its result completes it.
    Resolved(Result<()>),
    /// Not handled; the request moves on to the next stage.
    PassThrough(R),
}

#[derive(Debug, Clone)]
pub struct SubscribeRequest {
    pub topic: String,
}

#[derive(Debug, Clone)]
pub struct UnsubscribeRequest {
    pub topic: String,
}

pub struct PublishRequest {
    pub topic: String,
    pub data: DataStream,
    pub options: PublishOptions,
}

impl fmt::Debug for PublishRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishRequest")
            .field("topic", &self.topic)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Application override for admitted requests.
///
/// Every method passes through by default, so an implementor only overrides
/// the operations it cares about.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn subscribe(
        &self,
        _conn: &Arc<dyn Connection>,
        req: SubscribeRequest,
    ) -> Outcome<SubscribeRequest> {
        Outcome::PassThrough(req)
    }

    async fn unsubscribe(
        &self,
        _conn: &Arc<dyn Connection>,
        req: UnsubscribeRequest,
    ) -> Outcome<UnsubscribeRequest> {
        Outcome::PassThrough(req)
    }

    async fn publish(
        &self,
        _conn: &Arc<dyn Connection>,
        req: PublishRequest,
    ) -> Outcome<PublishRequest> {
        Outcome::PassThrough(req)
    }
}

/// Ordered list of interceptors.
#[derive(Default)]
pub struct InterceptorChain {
    entries: RwLock<Vec<Arc<dyn Interceptor>>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, interceptor: Arc<dyn Interceptor>) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(interceptor);
    }

    /// Copy of the current entries; no lock is held while they run.
    pub fn snapshot(&self) -> Vec<Arc<dyn Interceptor>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

pub async fn dispatch_subscribe(
    layers: &[Arc<dyn Interceptor>],
    conn: &Arc<dyn Connection>,
    mut req: SubscribeRequest,
) -> Result<()> {
    for layer in layers {
        match layer.subscribe(conn, req).await {
            Outcome::Resolved(res) => return res,
            Outcome::PassThrough(r) => req = r,
        }
    }
    conn.default_subscribe(&req.topic).await
}

pub async fn dispatch_unsubscribe(
    layers: &[Arc<dyn Interceptor>],
    conn: &Arc<dyn Connection>,
    mut req: UnsubscribeRequest,
) -> Result<()> {
    for layer in layers {
        match layer.unsubscribe(conn, req).await {
            Outcome::Resolved(res) => return res,
            Outcome::PassThrough(r) => req = r,
        }
    }
    conn.default_unsubscribe(&req.topic).await
}

pub async fn dispatch_publish(
    layers: &[Arc<dyn Interceptor>],
    conn: &Arc<dyn Connection>,
    mut req: PublishRequest,
) -> Result<()> {
    for layer in layers {
        match layer.publish(conn, req).await {
            Outcome::Resolved(res) => return res,
            Outcome::PassThrough(r) => req = r,
        }
    }
    conn.default_publish(&req.topic, req.data, req.options).await
}
