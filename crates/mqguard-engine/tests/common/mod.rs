//! Shared fixtures for engine integration tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};

use mqguard_core::MatcherOptions;
use mqguard_engine::broker::{Broker, Delivery, MemoryBroker, MemoryConnection};
use mqguard_engine::{config, BlockRegistry, Connection, PolicyConfig, PolicyEngine, PolicyEvent, PublishOptions};

pub fn policy(yaml: &str) -> PolicyConfig {
    config::load_from_str(yaml).unwrap().policy
}

pub fn as_dyn(conn: &Arc<MemoryConnection>) -> Arc<dyn Connection> {
    conn.clone()
}

/// One broker with its shared block registry.
pub struct Fixture {
    pub broker: Arc<MemoryBroker>,
    pub registry: Arc<BlockRegistry>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_options(MatcherOptions::default())
    }

    pub fn with_options(options: MatcherOptions) -> Self {
        let broker = MemoryBroker::new(options);
        let registry = broker.block_registry();
        Self { broker, registry }
    }

    pub fn engine(&self, yaml: &str) -> PolicyEngine {
        PolicyEngine::new(&policy(yaml), self.registry.clone()).unwrap()
    }

    pub fn connect(&self) -> (Arc<MemoryConnection>, mpsc::Receiver<Delivery>) {
        self.broker.connect()
    }
}

pub async fn publish(conn: &Arc<MemoryConnection>, topic: &str, body: &'static str) -> mqguard_core::Result<()> {
    conn.publish_chunks(topic, vec![Bytes::from_static(body.as_bytes())], PublishOptions::default())
        .await
}

/// Next delivery, or `None` if nothing arrives shortly.
pub async fn next_delivery(inbox: &mut mpsc::Receiver<Delivery>) -> Option<Delivery> {
    tokio::time::timeout(Duration::from_millis(200), inbox.recv())
        .await
        .ok()
        .flatten()
}

pub fn drain(events: &mut broadcast::Receiver<PolicyEvent>) -> Vec<PolicyEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = events.try_recv() {
        out.push(ev);
    }
    out
}
