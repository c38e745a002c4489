//! Policy config loader (strict parsing).

pub mod schema;

use std::fs;

use mqguard_core::error::{MqGuardError, Result};

pub use schema::{GuardConfig, PolicyConfig, PublishPolicy, SubscribePolicy};

pub fn load_from_file(path: &str) -> Result<GuardConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| MqGuardError::BadConfig(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<GuardConfig> {
    let cfg: GuardConfig = serde_yaml::from_str(s)
        .map_err(|e| MqGuardError::BadConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
