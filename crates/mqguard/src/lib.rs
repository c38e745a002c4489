//! mqguard: topic access control for publish/subscribe brokers.
//!
//! `core` holds the error type and the wildcard topic matcher; `engine` holds
//! the policy engine, its config loader and the broker collaborator traits.
//!
//! ```no_run
//! use mqguard::engine::{config, BlockRegistry, PolicyEngine};
//!
//! # fn main() -> mqguard::core::Result<()> {
//! let cfg = config::load_from_file("policy.yaml")?;
//! let registry = BlockRegistry::shared(cfg.policy.matcher.clone());
//! let engine = PolicyEngine::new(&cfg.policy, registry)?;
//! # drop(engine);
//! # Ok(())
//! # }
//! ```

pub mod core {
    pub use mqguard_core::*;
}

pub mod engine {
    pub use mqguard_engine::*;
}
