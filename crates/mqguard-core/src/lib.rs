//! mqguard core: transport-agnostic error types and the topic matcher capability.
//!
//! This crate defines the error surface and wildcard matching contract shared
//! by the policy engine and any broker integrating it. It has no async
//! runtime dependency, so a broker can embed the matcher on its own.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here.
//! All fallible paths must surface as `MqGuardError`/`Result` so a hostile
//! topic can never crash the broker.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod matcher;

pub use error::{ClientCode, MqGuardError, Result};
pub use matcher::{MatcherOptions, TopicMatcher, TopicTrie};
