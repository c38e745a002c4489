//! Subscribe/unsubscribe/publish interception end to end.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use bytes::Bytes;

use mqguard_core::{ClientCode, MatcherOptions};

use common::{as_dyn, drain, next_delivery, publish, Fixture};
use mqguard_engine::{Connection, HandlerId, PolicyEvent, PublishOptions};

#[tokio::test]
async fn empty_policy_allows_everything() {
    let fx = Fixture::new();
    let engine = fx.engine("version: 1\n");

    let mut conns = Vec::new();
    for _ in 0..3 {
        let (c, inbox) = fx.connect();
        engine.attach(&as_dyn(&c)).unwrap();
        c.subscribe("foo.bar").await.unwrap();
        conns.push((c, inbox));
    }

    for (c, _) in &conns {
        publish(c, "foo.bar", "bar").await.unwrap();
    }
    for (_, inbox) in conns.iter_mut() {
        for _ in 0..3 {
            let d = next_delivery(inbox).await.expect("delivery");
            assert_eq!(d.payload, Bytes::from_static(b"bar"));
        }
    }
    for (c, _) in &conns {
        c.unsubscribe("foo.bar").await.unwrap();
        assert_eq!(c.subscription_count(), 0);
    }
}

#[tokio::test]
async fn allow_and_disallow_scenario() {
    let fx = Fixture::new();
    let engine = fx.engine(
        r#"
version: 1
policy:
  subscribe: { allow: ["foo.#"] }
  publish: { allow: ["foo.bar.#"], disallow: ["foo.bar.reserved"] }
"#,
    );
    let mut events = engine.events();
    let (c, mut inbox) = fx.connect();
    engine.attach(&as_dyn(&c)).unwrap();

    let err = c.subscribe("test").await.unwrap_err();
    assert_eq!(err.to_string(), "blocked subscribe to topic: test");

    c.subscribe("foo.bar").await.unwrap();

    let err = publish(&c, "foo.bar.reserved", "x").await.unwrap_err();
    assert_eq!(err.to_string(), "blocked publish to topic: foo.bar.reserved");

    publish(&c, "foo.bar", "hello").await.unwrap();
    let d = next_delivery(&mut inbox).await.expect("delivered");
    assert_eq!(d.topic, "foo.bar");
    assert_eq!(d.payload, Bytes::from_static(b"hello"));

    let handler = c.handler_id();
    assert_eq!(
        drain(&mut events),
        vec![
            PolicyEvent::SubscribeBlocked { topic: "test".into(), handler },
            PolicyEvent::PublishBlocked { topic: "foo.bar.reserved".into(), handler },
        ]
    );
    assert_eq!(
        c.warnings(),
        vec![
            "blocked subscribe to topic: test".to_string(),
            "blocked publish to topic: foo.bar.reserved".to_string(),
        ]
    );
}

#[tokio::test]
async fn unsubscribe_is_never_pattern_blocked() {
    let fx = Fixture::new();
    let engine = fx.engine("version: 1\npolicy: { subscribe: { allow: [] } }\n");
    let (c, _inbox) = fx.connect();
    engine.attach(&as_dyn(&c)).unwrap();

    assert!(c.subscribe("foo").await.is_err());
    c.unsubscribe("foo").await.unwrap();
}

#[tokio::test]
async fn topic_length_limit() {
    let fx = Fixture::new();
    let engine = fx.engine("version: 1\npolicy: { max_topic_length: 2 }\n");
    let mut events = engine.events();
    let (c, _inbox) = fx.connect();
    engine.attach(&as_dyn(&c)).unwrap();

    assert!(c.subscribe("foo").await.is_err());
    assert!(publish(&c, "foo", "bar").await.is_err());
    assert!(c.unsubscribe("foo").await.is_err());
    c.subscribe("ab").await.unwrap();

    assert_eq!(
        c.warnings(),
        vec![
            "subscribe topic longer than 2".to_string(),
            "publish topic longer than 2".to_string(),
            "unsubscribe topic longer than 2".to_string(),
        ]
    );
    let evs = drain(&mut events);
    assert!(matches!(evs[0], PolicyEvent::SubscribeBlocked { .. }));
    assert!(matches!(evs[1], PolicyEvent::PublishBlocked { .. }));
    assert!(matches!(evs[2], PolicyEvent::UnsubscribeBlocked { .. }));
}

#[tokio::test]
async fn malformed_topic_is_prefixed_with_operation() {
    let fx = Fixture::with_options(MatcherOptions {
        max_wildcard_somes: 1,
        ..Default::default()
    });
    let engine = fx.engine("version: 1\npolicy: { matcher: { max_wildcard_somes: 1 } }\n");
    let (c, _inbox) = fx.connect();
    engine.attach(&as_dyn(&c)).unwrap();

    let err = c.subscribe("#.foo.#").await.unwrap_err();
    assert_eq!(err.to_string(), "subscribe topic invalid: too many wildcard somes");
    assert_eq!(err.client_code(), ClientCode::InvalidTopic);
    c.subscribe("foo.#").await.unwrap();
}

#[tokio::test]
async fn subscription_limit() {
    let fx = Fixture::new();
    let engine = fx.engine("version: 1\npolicy: { subscribe: { max_subscriptions: 1 } }\n");
    let (c, _inbox) = fx.connect();
    engine.attach(&as_dyn(&c)).unwrap();

    c.subscribe("foo").await.unwrap();
    // Re-subscribing to a topic already held does not count against the limit.
    c.subscribe("foo").await.unwrap();

    let err = c.subscribe("bar").await.unwrap_err();
    assert_eq!(err.to_string(), "subscription limit 1 already reached: bar");
    assert_eq!(c.warnings(), vec!["subscription limit 1 already reached: bar".to_string()]);

    c.unsubscribe("foo").await.unwrap();
    c.subscribe("bar").await.unwrap();
}

#[tokio::test]
async fn single_and_multi_restrictions() {
    let fx = Fixture::new();
    let engine = fx.engine("version: 1\npolicy: { publish: { disallow_single: true } }\n");
    let (c, _inbox) = fx.connect();
    engine.attach(&as_dyn(&c)).unwrap();

    let single = PublishOptions { single: true };
    let err = c
        .publish_chunks("foo", vec![Bytes::from_static(b"x")], single)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "blocked publish (single) to topic: foo");
    publish(&c, "foo", "x").await.unwrap();

    engine
        .reset(&common::policy("version: 1\npolicy: { publish: { disallow_multi: true } }\n"))
        .unwrap();
    let err = publish(&c, "foo", "x").await.unwrap_err();
    assert_eq!(err.to_string(), "blocked publish (multi) to topic: foo");
    c.publish_chunks("foo", vec![Bytes::from_static(b"x")], single)
        .await
        .unwrap();
}

#[tokio::test]
async fn reset_applies_to_attached_connections() {
    let fx = Fixture::new();
    let engine = fx.engine("version: 1\n");
    let (c, _inbox) = fx.connect();
    engine.attach(&as_dyn(&c)).unwrap();
    c.subscribe("foo").await.unwrap();

    engine
        .reset(&common::policy("version: 1\npolicy: { subscribe: { disallow: [\"bar.#\"] } }\n"))
        .unwrap();
    assert!(engine.is_attached(c.handler_id()));
    assert!(c.subscribe("bar.baz").await.is_err());
    c.subscribe("baz").await.unwrap();
}

#[tokio::test]
async fn unattached_connections_are_unaffected() {
    let fx = Fixture::new();
    let engine = fx.engine("version: 1\npolicy: { subscribe: { allow: [] }, publish: { allow: [] } }\n");
    let (guarded, _g) = fx.connect();
    let (free, mut inbox) = fx.connect();
    engine.attach(&as_dyn(&guarded)).unwrap();

    assert!(guarded.subscribe("foo").await.is_err());
    free.subscribe("foo").await.unwrap();
    publish(&free, "foo", "ok").await.unwrap();
    assert!(next_delivery(&mut inbox).await.is_some());
    assert_eq!(engine.attached_handlers(), vec![guarded.handler_id()]);
    assert!(free.warnings().is_empty());
    assert_ne!(free.handler_id(), HandlerId(0));
}
