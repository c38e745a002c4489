//! mqguard-check: dry-run a policy file against topics.
//!
//! Usage: `mqguard-check <config.yaml> <subscribe|unsubscribe|publish> <topic>...`
//! Prints one JSON line per topic and exits non-zero if any topic is denied.

use std::process::ExitCode;

use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

use mqguard_engine::{config, BlockRegistry, Operation, PolicyEngine};

fn parse_op(s: &str) -> Option<Operation> {
    match s {
        "subscribe" => Some(Operation::Subscribe),
        "unsubscribe" => Some(Operation::Unsubscribe),
        "publish" => Some(Operation::Publish),
        _ => None,
    }
}

fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (Some(path), Some(op)) = (args.first(), args.get(1).and_then(|s| parse_op(s))) else {
        eprintln!("usage: mqguard-check <config.yaml> <subscribe|unsubscribe|publish> <topic>...");
        return ExitCode::from(2);
    };

    let engine = match config::load_from_file(path).and_then(|cfg| {
        let registry = BlockRegistry::shared(cfg.policy.matcher.clone());
        PolicyEngine::new(&cfg.policy, registry)
    }) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!(%path, error = %e, "config load failed");
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    let mut denied = 0;
    for topic in &args[2..] {
        let line = match engine.check(op, topic) {
            Ok(()) => json!({ "op": op.as_str(), "topic": topic, "allowed": true }),
            Err(e) => {
                denied += 1;
                json!({
                    "op": op.as_str(),
                    "topic": topic,
                    "allowed": false,
                    "code": e.client_code().as_str(),
                    "reason": e.to_string(),
                })
            }
        };
        println!("{line}");
    }

    if denied > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
