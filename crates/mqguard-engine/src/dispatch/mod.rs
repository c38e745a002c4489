//! Interceptor exports.
//!
//! Re-exports the interceptor trait, request types, and chain so downstream
//! consumers can depend on this module directly.

pub mod interceptor;

pub use interceptor::{
    dispatch_publish, dispatch_subscribe, dispatch_unsubscribe, Interceptor, InterceptorChain,
    Outcome, PublishRequest, SubscribeRequest, UnsubscribeRequest,
};
