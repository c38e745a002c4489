//! Policy layer (pattern sets, quotas, block registry, delivery filtering).
//!
//! Compiles policy configuration into matchers and counters that the
//! connection hooks and the broker's fan-out pipeline consult at runtime.

pub mod delivery;
pub mod engine;
pub mod limiter;
pub mod pattern_set;
pub mod quota;
pub mod registry;

pub use delivery::{BlockFilter, BLOCK_FILTER_KEY};
pub use engine::{Operation, PolicyEngine, PolicyEvent};
pub use limiter::LengthLimited;
pub use pattern_set::PatternSet;
pub use quota::{PublishTicket, QuotaState};
pub use registry::BlockRegistry;
