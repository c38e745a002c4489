//! mqguard policy engine.
//!
//! Topic-based access control for a publish/subscribe broker: allow/disallow
//! pattern sets per operation, per-connection quotas, streamed payload
//! ceilings and delivery-time blocking. The engine attaches to live
//! connections through the collaborator traits in [`broker`] and can be
//! reconfigured or detached at runtime.

pub mod broker;
pub mod config;
pub mod dispatch;
pub mod obs;
pub mod policy;

pub use broker::{Connection, HandlerId, PublishOptions};
pub use config::{GuardConfig, PolicyConfig};
pub use policy::{BlockRegistry, Operation, PolicyEngine, PolicyEvent};
