#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use mqguard_engine::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
policy:
  subscribe:
    allow: ["foo.#"]
    max_subscription: 3 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "BAD_CONFIG");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert!(cfg.policy.subscribe.allow.is_none());
    assert!(cfg.policy.block.is_empty());
    assert_eq!(cfg.policy.matcher.separator, ".");
}

#[test]
fn full_config() {
    let ok = r#"
version: 1
policy:
  publish:
    allow: ["foo.bar.#"]
    disallow: ["foo.bar.reserved"]
    max_data_length: 1024
    max_publications: 4
    disallow_single: true
  subscribe:
    allow: []
    max_subscriptions: 10
  block: ["foo.secret"]
  max_topic_length: 64
  matcher:
    separator: "/"
    wildcard_one: "+"
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    let p = &cfg.policy;
    assert_eq!(p.publish.max_data_length, Some(1024));
    assert!(p.publish.disallow_single && !p.publish.disallow_multi);
    assert_eq!(p.subscribe.allow.as_deref(), Some(&[][..]));
    assert_eq!(p.matcher.wildcard_some, "#");
    assert_eq!(p.matcher.max_words, 100);
}

#[test]
fn rejects_wrong_version() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.to_string(), "bad config: unsupported config version 2");
}

#[test]
fn rejects_zero_limits() {
    let bad = "version: 1\npolicy: { publish: { max_publications: 0 } }\n";
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(err.to_string().contains("publish.max_publications"));
}

#[test]
fn rejects_clashing_matcher_tokens() {
    let bad = "version: 1\npolicy: { matcher: { separator: \"*\" } }\n";
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "BAD_CONFIG");
}

#[test]
fn rejects_pattern_over_word_limit() {
    let bad = r#"
version: 1
policy:
  block: ["a.b.c"]
  matcher: { max_words: 2 }
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.to_string(), "bad config: block pattern \"a.b.c\": too many words");
}

#[test]
fn unreadable_file_is_bad_config() {
    let err = config::load_from_file("does/not/exist.yaml").expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "BAD_CONFIG");
    assert!(err.to_string().starts_with("bad config: read config failed:"));
}
